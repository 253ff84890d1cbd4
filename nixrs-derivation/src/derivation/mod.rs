use std::fmt;
use std::io;

use thiserror::Error;

use crate::derived_path::OutputName;
use crate::hash;
use crate::store_path::{ParseStorePathError, StorePath, StorePathError};

mod aterm;
mod basic_derivation;
mod derivation_output;
mod hash_modulo;
mod wire;

pub use basic_derivation::{BasicDerivation, Derivation, InputDerivations};
pub use derivation_output::{DerivationOutput, DerivationOutputHash, output_path_name};
pub use hash_modulo::{
    DrvHashModulo, DrvHashes, HashModuloError, hash_derivation_modulo, hash_derivation_path,
    hash_placeholder, want_output,
};

/// Lookup of an output that the derivation does not declare.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct MissingOutputError {
    pub output: OutputName,
    pub drv_path: Option<StorePath>,
}

impl MissingOutputError {
    pub fn new(output: OutputName) -> Self {
        MissingOutputError {
            output,
            drv_path: None,
        }
    }

    pub fn with_drv_path(mut self, drv_path: &StorePath) -> Self {
        self.drv_path = Some(drv_path.clone());
        self
    }
}

impl fmt::Display for MissingOutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.drv_path {
            Some(drv_path) => write!(
                f,
                "derivation '{drv_path}' does not have an output named '{}'",
                self.output
            ),
            None => write!(f, "derivation does not have an output named '{}'", self.output),
        }
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ParseDerivationError {
    #[error("expected string '{expected}' at position {pos} of derivation")]
    Expected { expected: String, pos: usize },
    #[error("unterminated string at position {0} of derivation")]
    UnterminatedString(usize),
    #[error("bad path '{0}' in derivation")]
    BadPath(String),
    #[error("bad store path in derivation: {0}")]
    BadStorePath(
        #[from]
        #[source]
        ParseStorePathError,
    ),
    #[error("bad output name '{name}' in derivation: {error}")]
    BadOutputName {
        name: String,
        #[source]
        error: StorePathError,
    },
    #[error("bad hash in derivation: {0}")]
    BadHash(
        #[from]
        #[source]
        hash::ParseHashError,
    ),
    #[error("output '{0}' is neither input addressed nor fixed")]
    UnsupportedOutput(String),
    #[error("trailing data at position {0} of derivation")]
    TrailingData(usize),
}

impl ParseDerivationError {
    pub(crate) fn expected(expected: &str, pos: usize) -> Self {
        ParseDerivationError::Expected {
            expected: expected.to_string(),
            pos,
        }
    }
}

pub(crate) fn parse_output_name(name: &str) -> Result<OutputName, ParseDerivationError> {
    name.parse()
        .map_err(|error| ParseDerivationError::BadOutputName {
            name: name.to_string(),
            error,
        })
}

#[derive(Error, Debug)]
pub enum ReadDerivationError {
    #[error("{0}")]
    BadDerivation(
        #[from]
        #[source]
        ParseDerivationError,
    ),
    #[error("io error reading derivation {0}")]
    IO(
        #[from]
        #[source]
        io::Error,
    ),
}

impl From<ParseStorePathError> for ReadDerivationError {
    fn from(err: ParseStorePathError) -> Self {
        ReadDerivationError::BadDerivation(err.into())
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    pub use super::basic_derivation::proptest::*;
}

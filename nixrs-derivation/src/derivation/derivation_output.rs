use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::hash::{self, Hash};
use crate::store_path::{FileIngestionMethod, StoreDir, StorePath, StorePathError};

struct OutputPathName<'b> {
    drv_name: &'b str,
    output_name: &'b str,
}

impl fmt::Display for OutputPathName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.output_name != "out" {
            write!(f, "{}-{}", self.drv_name, self.output_name)
        } else {
            write!(f, "{}", self.drv_name)
        }
    }
}

/// Name of the store path for `output_name` of the derivation `drv_name`.
pub fn output_path_name<'s>(drv_name: &'s str, output_name: &'s str) -> impl fmt::Display + 's {
    OutputPathName {
        drv_name,
        output_name,
    }
}

/// Declared content hash of a fixed output.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct DerivationOutputHash {
    pub method: FileIngestionMethod,
    pub hash: Hash,
}

impl DerivationOutputHash {
    /// `r:sha256` for recursive hashes, `sha256` for flat ones.
    pub fn print_method_algo(&self) -> String {
        format!("{:#}{}", self.method, self.hash.algorithm())
    }

    /// Parses the hash algorithm and hex digest fields of an output.
    pub fn parse(method_algo: &str, hash: &str) -> Result<Self, hash::ParseHashError> {
        let (method, algo) = FileIngestionMethod::parse_prefix(method_algo);
        let algorithm = algo.parse::<hash::Algorithm>().map_err(|err| {
            hash::ParseHashError::new(method_algo, hash::ParseHashErrorKind::from(err))
        })?;
        let hash = Hash::parse_non_sri_unprefixed(hash, algorithm)?;
        Ok(DerivationOutputHash { method, hash })
    }
}

/// `r:sha256:<hex>` form, as used when hashing fixed outputs.
impl fmt::Display for DerivationOutputHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}{:x}", self.method, self.hash)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct DerivationOutput {
    pub path: StorePath,
    /// Present iff this is a fixed output.
    pub hash: Option<DerivationOutputHash>,
}

impl DerivationOutput {
    /// A regular output whose path is derived from the derivation's inputs.
    pub fn input_addressed(path: StorePath) -> DerivationOutput {
        DerivationOutput { path, hash: None }
    }

    /// A fixed output placed at the store's fixed-output path for `hash`.
    pub fn fixed(
        store_dir: &StoreDir,
        drv_name: &str,
        output_name: &str,
        method: FileIngestionMethod,
        hash: Hash,
    ) -> Result<DerivationOutput, StorePathError> {
        let name = output_path_name(drv_name, output_name).to_string();
        let path = store_dir.make_fixed_output_path(&name, method, &hash)?;
        Ok(DerivationOutput {
            path,
            hash: Some(DerivationOutputHash { method, hash }),
        })
    }

    pub fn is_fixed(&self) -> bool {
        self.hash.is_some()
    }

    /// The hash algorithm field as written in a derivation.
    pub fn hash_algo(&self) -> String {
        self.hash
            .as_ref()
            .map(DerivationOutputHash::print_method_algo)
            .unwrap_or_default()
    }

    /// The hex digest field as written in a derivation.
    pub fn hash_hex(&self) -> String {
        self.hash
            .as_ref()
            .map(|h| format!("{:#x}", h.hash))
            .unwrap_or_default()
    }
}

impl Serialize for DerivationOutput {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.hash.is_some() { 3 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("path", &self.path)?;
        if self.hash.is_some() {
            map.serialize_entry("hashAlgo", &self.hash_algo())?;
            map.serialize_entry("hash", &self.hash_hex())?;
        }
        map.end()
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    use ::proptest::prelude::*;

    use super::*;
    use crate::hash::proptest::arb_hash;

    impl Arbitrary for DerivationOutputHash {
        type Parameters = ();
        type Strategy = BoxedStrategy<DerivationOutputHash>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (any::<FileIngestionMethod>(), arb_hash())
                .prop_map(|(method, hash)| DerivationOutputHash { method, hash })
                .boxed()
        }
    }

    impl Arbitrary for DerivationOutput {
        type Parameters = ();
        type Strategy = BoxedStrategy<DerivationOutput>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            (any::<StorePath>(), any::<Option<DerivationOutputHash>>())
                .prop_map(|(path, hash)| DerivationOutput { path, hash })
                .boxed()
        }
    }
}

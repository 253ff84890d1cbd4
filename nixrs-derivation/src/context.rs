//! Dependencies carried by string values.
//!
//! Every element is encoded as text in one of three forms:
//!
//! * `<path>` for a plain store object,
//! * `=<drv path>` for a derivation and its entire build closure,
//! * `!<output>!<drv path>` for a single output of a derivation.
//!
//! Paths are store path base names, independent of the store directory.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::derived_path::{OutputName, SingleDerivedPath};
use crate::experimental::{ExperimentalFeature, ExperimentalFeatureSettings};
use crate::store_path::StorePath;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Bad String Context element: {msg}: {raw}")]
pub struct BadNixStringContextElem {
    pub raw: String,
    pub msg: String,
}

impl BadNixStringContextElem {
    fn new<M: fmt::Display>(raw: &str, msg: M) -> Self {
        BadNixStringContextElem {
            raw: raw.to_string(),
            msg: msg.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NixStringContextElem {
    /// Plain opaque path to some store object.
    Opaque(StorePath),
    /// Path to a derivation and its entire build closure, including all
    /// outputs of all derivations in that closure.
    DrvDeep(StorePath),
    /// A single output of a derivation.
    Built {
        drv_path: SingleDerivedPath,
        output: OutputName,
    },
}

pub type NixStringContext = BTreeSet<NixStringContextElem>;

impl NixStringContextElem {
    /// Decode a single context element.
    ///
    /// A `Built` element whose derivation is itself the output of another
    /// derivation needs [`ExperimentalFeature::DynamicDerivations`].
    pub fn parse(
        s: &str,
        xp_settings: &ExperimentalFeatureSettings,
    ) -> Result<NixStringContextElem, BadNixStringContextElem> {
        if s.is_empty() {
            return Err(BadNixStringContextElem::new(
                s,
                "String context element should never be an empty string",
            ));
        }
        if let Some(rest) = s.strip_prefix('!') {
            if !rest.contains('!') {
                return Err(BadNixStringContextElem::new(
                    s,
                    "String content element beginning with '!' should have a second '!'",
                ));
            }
            match parse_rest(s, rest, xp_settings)? {
                SingleDerivedPath::Built { drv_path, output } => Ok(NixStringContextElem::Built {
                    drv_path: *drv_path,
                    output,
                }),
                SingleDerivedPath::Opaque(path) => Ok(NixStringContextElem::Opaque(path)),
            }
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(NixStringContextElem::DrvDeep(parse_store_path(s, rest)?))
        } else if s.contains('!') {
            Err(BadNixStringContextElem::new(
                s,
                "String content element not beginning with '!' should not have a second '!'",
            ))
        } else {
            Ok(NixStringContextElem::Opaque(parse_store_path(s, s)?))
        }
    }

    /// Decode a collection of context elements into a [`NixStringContext`].
    pub fn parse_all<'a, I>(
        elems: I,
        xp_settings: &ExperimentalFeatureSettings,
    ) -> Result<NixStringContext, BadNixStringContextElem>
    where
        I: IntoIterator<Item = &'a str>,
    {
        elems
            .into_iter()
            .map(|s| NixStringContextElem::parse(s, xp_settings))
            .collect()
    }

    /// The store path that this element ultimately refers to.
    pub fn store_path(&self) -> &StorePath {
        match self {
            NixStringContextElem::Opaque(path) => path,
            NixStringContextElem::DrvDeep(drv_path) => drv_path,
            NixStringContextElem::Built { drv_path, .. } => drv_path.base_store_path(),
        }
    }
}

fn parse_store_path(raw: &str, s: &str) -> Result<StorePath, BadNixStringContextElem> {
    s.parse::<StorePath>()
        .map_err(|err| BadNixStringContextElem::new(raw, err))
}

fn parse_rest(
    raw: &str,
    s: &str,
    xp_settings: &ExperimentalFeatureSettings,
) -> Result<SingleDerivedPath, BadNixStringContextElem> {
    match s.split_once('!') {
        None => Ok(SingleDerivedPath::Opaque(parse_store_path(raw, s)?)),
        Some((output, rest)) => {
            let output = output.parse::<OutputName>().map_err(|err| {
                BadNixStringContextElem::new(raw, format!("invalid output name '{output}': {err}"))
            })?;
            let drv_path = parse_rest(raw, rest, xp_settings)?;
            if let SingleDerivedPath::Built { .. } = drv_path {
                xp_settings
                    .require(ExperimentalFeature::DynamicDerivations)
                    .map_err(|err| BadNixStringContextElem::new(raw, err))?;
            }
            Ok(SingleDerivedPath::Built {
                drv_path: Box::new(drv_path),
                output,
            })
        }
    }
}

struct DisplayRest<'a>(&'a SingleDerivedPath);

impl fmt::Display for DisplayRest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            SingleDerivedPath::Opaque(path) => write!(f, "{path}"),
            SingleDerivedPath::Built { drv_path, output } => {
                write!(f, "{output}!{}", DisplayRest(drv_path))
            }
        }
    }
}

impl fmt::Display for NixStringContextElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NixStringContextElem::Opaque(path) => write!(f, "{path}"),
            NixStringContextElem::DrvDeep(drv_path) => write!(f, "={drv_path}"),
            NixStringContextElem::Built { drv_path, output } => {
                write!(f, "!{output}!{}", DisplayRest(drv_path))
            }
        }
    }
}

impl Serialize for NixStringContextElem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    use ::proptest::prelude::*;

    use super::*;
    use crate::derived_path::proptest::arb_built_path;
    use crate::store_path::proptest::arb_drv_store_path;

    /// Context elements that parse without any experimental feature.
    pub fn arb_stable_context_elem() -> impl Strategy<Value = NixStringContextElem> {
        prop_oneof![
            any::<StorePath>().prop_map(NixStringContextElem::Opaque),
            arb_drv_store_path().prop_map(NixStringContextElem::DrvDeep),
            (arb_drv_store_path(), any::<OutputName>()).prop_map(|(drv_path, output)| {
                NixStringContextElem::Built {
                    drv_path: SingleDerivedPath::Opaque(drv_path),
                    output,
                }
            }),
        ]
    }

    impl Arbitrary for NixStringContextElem {
        type Parameters = ();
        type Strategy = BoxedStrategy<NixStringContextElem>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            prop_oneof![
                3 => arb_stable_context_elem(),
                1 => (arb_built_path(3), any::<OutputName>()).prop_map(|(drv_path, output)| {
                    NixStringContextElem::Built { drv_path, output }
                }),
            ]
            .boxed()
        }
    }
}

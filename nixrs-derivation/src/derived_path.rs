use std::fmt;
use std::str::FromStr;

use derive_more::Display;
use serde::{Serialize, Serializer};

use crate::store_path::{StorePath, StorePathError, into_name};

/// Name of a derivation output. Uses the same alphabet as store path names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub struct OutputName(String);

impl OutputName {
    pub fn is_default(&self) -> bool {
        self.0 == "out"
    }
}

impl AsRef<str> for OutputName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Default for OutputName {
    fn default() -> Self {
        OutputName("out".into())
    }
}

impl FromStr for OutputName {
    type Err = StorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = into_name(&s)?.to_string();
        Ok(OutputName(name))
    }
}

impl Serialize for OutputName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// A store path that either exists already or is the output of a
/// (possibly itself built) derivation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SingleDerivedPath {
    Opaque(StorePath),
    Built {
        drv_path: Box<SingleDerivedPath>,
        output: OutputName,
    },
}

impl SingleDerivedPath {
    /// The store path at the bottom of a chain of built outputs.
    pub fn base_store_path(&self) -> &StorePath {
        match self {
            SingleDerivedPath::Opaque(path) => path,
            SingleDerivedPath::Built { drv_path, .. } => drv_path.base_store_path(),
        }
    }
}

impl From<StorePath> for SingleDerivedPath {
    fn from(path: StorePath) -> Self {
        SingleDerivedPath::Opaque(path)
    }
}

impl fmt::Display for SingleDerivedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingleDerivedPath::Opaque(path) => write!(f, "{path}"),
            SingleDerivedPath::Built { drv_path, output } => write!(f, "{drv_path}^{output}"),
        }
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    use ::proptest::prelude::*;

    use super::*;
    use crate::store_path::proptest::{arb_drv_store_path, arb_output_name};

    impl Arbitrary for OutputName {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            arb_output_name().prop_map(OutputName).boxed()
        }
    }

    /// Derived paths whose innermost store path is a derivation.
    pub fn arb_built_path(depth: u32) -> impl Strategy<Value = SingleDerivedPath> {
        let leaf = arb_drv_store_path().prop_map(SingleDerivedPath::Opaque);
        leaf.prop_recursive(depth, depth, 1, |inner| {
            (any::<OutputName>(), inner).prop_map(|(output, drv_path)| SingleDerivedPath::Built {
                drv_path: Box::new(drv_path),
                output,
            })
        })
    }

    impl Arbitrary for SingleDerivedPath {
        type Parameters = ();
        type Strategy = BoxedStrategy<SingleDerivedPath>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            prop_oneof![
                4 => any::<StorePath>().prop_map(SingleDerivedPath::Opaque),
                1 => arb_built_path(3),
            ]
            .boxed()
        }
    }
}

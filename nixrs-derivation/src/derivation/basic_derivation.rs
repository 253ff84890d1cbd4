use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};

use serde::Serialize;

use crate::derived_path::OutputName;
use crate::store_path::{StorePath, StorePathSet};

use super::{DerivationOutput, MissingOutputError};

/// Outputs of other derivations that a derivation consumes, keyed by the
/// path of the derivation producing them.
pub type InputDerivations = BTreeMap<StorePath, BTreeSet<OutputName>>;

/// A fully resolved build step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicDerivation {
    pub outputs: BTreeMap<OutputName, DerivationOutput>,
    pub input_srcs: StorePathSet,
    pub platform: String,
    pub builder: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl BasicDerivation {
    pub fn find_output(&self, name: &OutputName) -> Result<&StorePath, MissingOutputError> {
        self.outputs
            .get(name)
            .map(|output| &output.path)
            .ok_or_else(|| MissingOutputError::new(name.clone()))
    }

    /// Whether the builder is one built into the build system itself.
    pub fn is_builtin(&self) -> bool {
        self.builder.starts_with("builtin:")
    }

    /// Whether every output declares its content hash up front.
    pub fn is_fixed_output(&self) -> bool {
        self.outputs.values().all(DerivationOutput::is_fixed)
    }

    pub fn output_paths(&self) -> StorePathSet {
        self.outputs
            .values()
            .map(|output| output.path.clone())
            .collect()
    }

    pub fn output_names(&self) -> BTreeSet<OutputName> {
        self.outputs.keys().cloned().collect()
    }
}

/// A build step together with the outputs of other derivations it consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Derivation {
    #[serde(flatten)]
    pub basic: BasicDerivation,
    pub input_drvs: InputDerivations,
}

impl Derivation {
    pub fn new(basic: BasicDerivation, input_drvs: InputDerivations) -> Derivation {
        Derivation { basic, input_drvs }
    }

    pub fn into_basic(self) -> BasicDerivation {
        self.basic
    }

    /// Every store path referenced by this derivation's inputs.
    pub fn references(&self) -> StorePathSet {
        let mut references = self.basic.input_srcs.clone();
        references.extend(self.input_drvs.keys().cloned());
        references
    }
}

impl From<BasicDerivation> for Derivation {
    fn from(basic: BasicDerivation) -> Self {
        Derivation {
            basic,
            input_drvs: InputDerivations::new(),
        }
    }
}

impl Deref for Derivation {
    type Target = BasicDerivation;

    fn deref(&self) -> &Self::Target {
        &self.basic
    }
}

impl DerefMut for Derivation {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.basic
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    use ::proptest::collection::{btree_map, btree_set, vec};
    use ::proptest::prelude::*;

    use super::*;
    use crate::store_path::proptest::arb_drv_store_path;

    /// Strings including the characters that are escaped in derivations.
    pub fn arb_drv_string() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 /.:=\"\\\\\n\r\t$-]{0,20}"
    }

    prop_compose! {
        pub fn arb_basic_derivation()
        (
            outputs in btree_map(any::<OutputName>(), any::<DerivationOutput>(), 1..5),
            input_srcs in btree_set(any::<StorePath>(), 0..5),
            platform in arb_drv_string(),
            builder in arb_drv_string(),
            args in vec(arb_drv_string(), 0..5),
            env in btree_map(arb_drv_string(), arb_drv_string(), 0..5),
        ) -> BasicDerivation
        {
            BasicDerivation {
                outputs, input_srcs, platform, builder, args, env,
            }
        }
    }

    prop_compose! {
        pub fn arb_derivation()
        (
            basic in arb_basic_derivation(),
            input_drvs in btree_map(arb_drv_store_path(), btree_set(any::<OutputName>(), 0..3), 0..4),
        ) -> Derivation
        {
            Derivation { basic, input_drvs }
        }
    }

    impl Arbitrary for BasicDerivation {
        type Parameters = ();
        type Strategy = BoxedStrategy<BasicDerivation>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            arb_basic_derivation().boxed()
        }
    }

    impl Arbitrary for Derivation {
        type Parameters = ();
        type Strategy = BoxedStrategy<Derivation>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            arb_derivation().boxed()
        }
    }
}

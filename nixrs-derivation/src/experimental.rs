use std::collections::BTreeSet;
use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum ExperimentalFeature {
    #[display("dynamic-derivations")]
    DynamicDerivations,
}

impl ExperimentalFeature {
    pub const ALL: [ExperimentalFeature; 1] = [ExperimentalFeature::DynamicDerivations];
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown experimental feature '{0}'")]
pub struct UnknownExperimentalFeature(String);

impl FromStr for ExperimentalFeature {
    type Err = UnknownExperimentalFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dynamic-derivations" => Ok(ExperimentalFeature::DynamicDerivations),
            _ => Err(UnknownExperimentalFeature(s.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error(
    "experimental Nix feature '{0}' is disabled; add '--extra-experimental-features {0}' to enable it"
)]
pub struct MissingExperimentalFeature(pub ExperimentalFeature);

/// The set of experimental features enabled for an evaluation or build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentalFeatureSettings {
    enabled: BTreeSet<ExperimentalFeature>,
}

impl ExperimentalFeatureSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(mut self, feature: ExperimentalFeature) -> Self {
        self.enabled.insert(feature);
        self
    }

    pub fn is_enabled(&self, feature: ExperimentalFeature) -> bool {
        self.enabled.contains(&feature)
    }

    pub fn require(&self, feature: ExperimentalFeature) -> Result<(), MissingExperimentalFeature> {
        if self.is_enabled(feature) {
            Ok(())
        } else {
            Err(MissingExperimentalFeature(feature))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ExperimentalFeature> + '_ {
        self.enabled.iter().copied()
    }
}

impl FromIterator<ExperimentalFeature> for ExperimentalFeatureSettings {
    fn from_iter<T: IntoIterator<Item = ExperimentalFeature>>(iter: T) -> Self {
        ExperimentalFeatureSettings {
            enabled: iter.into_iter().collect(),
        }
    }
}

/// Parses a list of feature names separated by whitespace or commas.
impl FromStr for ExperimentalFeatureSettings {
    type Err = UnknownExperimentalFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect()
    }
}

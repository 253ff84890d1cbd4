//! The store as seen by derivation I/O and the hash-modulo engine.

use std::future::Future;
use std::io;

use thiserror::Error;
use tracing::debug;

use crate::derivation::{Derivation, ParseDerivationError};
use crate::hash::Sha256;
use crate::store_path::{
    DRV_EXTENSION, StoreDir, StoreDirProvider, StorePath, StorePathError, StorePathSet,
};

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

#[macro_export]
macro_rules! flag_enum {
    (
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident {
            $( #[$if_meta:meta] )*
            $if:ident = false,
            $( #[$it_meta:meta] )*
            $it:ident = true$(,)?
        }
    ) => {
        $( #[$meta] )*
        $vis enum $name {
            $( #[$if_meta] )*
            $if,
            $( #[$it_meta] )*
            $it,
        }
        impl From<bool> for $name {
            fn from(v: bool) -> $name {
                if v {
                    $name::$it
                } else {
                    $name::$if
                }
            }
        }
        impl From<$name> for bool {
            fn from(v: $name) -> bool {
                match v {
                    $name::$it => true,
                    $name::$if => false,
                }
            }
        }
    };
}

flag_enum! {
    #[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
    pub enum RepairFlag {
        #[default]
        NoRepair = false,
        Repair = true,
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("path '{0}' is not valid")]
    InvalidPath(String),
    #[error("path '{0}' is not a derivation")]
    NotADerivation(String),
    #[error("error parsing derivation '{path}': {source}")]
    BadDerivation {
        path: String,
        #[source]
        source: ParseDerivationError,
    },
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    StorePath(
        #[from]
        #[source]
        StorePathError,
    ),
    #[error("cannot add '{0}' to a read-only store")]
    ReadOnly(String),
}

/// Store operations needed to persist derivations and to load the
/// derivations a hash computation depends on.
pub trait DerivationStore: StoreDirProvider + Send + Sync {
    fn read_derivation(
        &self,
        drv_path: &StorePath,
    ) -> impl Future<Output = Result<Derivation, StoreError>> + Send;

    /// Add a text file with the given references and return its path.
    fn add_text_to_store(
        &self,
        name: &str,
        contents: &str,
        references: &StorePathSet,
        repair: RepairFlag,
    ) -> impl Future<Output = Result<StorePath, StoreError>> + Send;

    fn is_read_only(&self) -> bool {
        false
    }
}

/// Parse `text` read from `drv_path`, annotating errors with the path.
pub fn parse_derivation(
    store_dir: &StoreDir,
    drv_path: &StorePath,
    text: &str,
) -> Result<Derivation, StoreError> {
    if !drv_path.is_derivation() {
        return Err(StoreError::NotADerivation(store_dir.print_path(drv_path)));
    }
    Derivation::parse(store_dir, text).map_err(|source| StoreError::BadDerivation {
        path: store_dir.print_path(drv_path),
        source,
    })
}

/// The path `drv` gets when written to a store under `name`.
pub fn compute_derivation_path(
    store_dir: &StoreDir,
    drv: &Derivation,
    name: &str,
) -> Result<StorePath, StorePathError> {
    let contents = drv.unparse(store_dir, false, None);
    let suffix = format!("{name}{DRV_EXTENSION}");
    store_dir.make_text_path(&suffix, Sha256::digest(&contents), &drv.references())
}

/// Persist `drv` as `<name>.drv` and return its path.
///
/// A read-only store only computes the path.
pub async fn write_derivation<S>(
    store: &S,
    drv: &Derivation,
    name: &str,
    repair: RepairFlag,
) -> Result<StorePath, StoreError>
where
    S: DerivationStore + ?Sized,
{
    let store_dir = store.store_dir();
    if store.is_read_only() {
        let path = compute_derivation_path(&store_dir, drv, name)?;
        debug!(path = %store_dir.display(&path), "Computed derivation path");
        Ok(path)
    } else {
        let references = drv.references();
        let suffix = format!("{name}{DRV_EXTENSION}");
        let contents = drv.unparse(&store_dir, false, None);
        let path = store
            .add_text_to_store(&suffix, &contents, &references, repair)
            .await?;
        debug!(path = %store_dir.display(&path), "Wrote derivation");
        Ok(path)
    }
}

#[cfg(test)]
mod unittests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::derivation::{BasicDerivation, DerivationOutput};
    use crate::{btree_map, btree_set};

    fn drv() -> Derivation {
        Derivation {
            basic: BasicDerivation {
                outputs: btree_map!(
                    "out" => DerivationOutput::input_addressed(
                        "7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-hello".parse().unwrap()
                    ),
                ),
                input_srcs: btree_set!("1w01xxn8f7s9s4n65ry6rwd7x9awf04s-builder.sh"),
                platform: "x86_64-linux".into(),
                builder: "/bin/sh".into(),
                args: vec!["builder.sh".into()],
                env: btree_map!("name" => "hello".to_string()),
            },
            input_drvs: btree_map!(
                "jw8chmp9sf8f7pw684cszp6pa2zmn0bx-bash.drv" => btree_set!("out"),
            ),
        }
    }

    #[test]
    fn repair_flag() {
        assert_eq!(RepairFlag::from(true), RepairFlag::Repair);
        assert!(!bool::from(RepairFlag::default()));
    }

    #[tokio::test]
    async fn write_then_read() {
        let store = MemoryStore::new(StoreDir::default());
        let drv = drv();
        let path = write_derivation(&store, &drv, "hello", RepairFlag::NoRepair)
            .await
            .unwrap();
        assert_eq!(path.name().as_ref(), "hello.drv");
        assert_eq!(
            path,
            compute_derivation_path(&StoreDir::default(), &drv, "hello").unwrap()
        );
        assert_eq!(store.read_derivation(&path).await.unwrap(), drv);
    }

    #[tokio::test]
    async fn read_only_store_computes_path() {
        let store = MemoryStore::new(StoreDir::default()).read_only(true);
        let path = write_derivation(&store, &drv(), "hello", RepairFlag::NoRepair)
            .await
            .unwrap();
        assert_eq!(
            path,
            compute_derivation_path(&StoreDir::default(), &drv(), "hello").unwrap()
        );
        assert!(matches!(
            store.read_derivation(&path).await,
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn derivation_path_depends_on_references() {
        let store_dir = StoreDir::default();
        let mut other = drv();
        other.input_drvs.clear();
        other.input_srcs.clear();
        other.args.clear();
        let a = compute_derivation_path(&store_dir, &drv(), "hello").unwrap();
        let b = compute_derivation_path(&store_dir, &other, "hello").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_derivation_annotates_path() {
        let store_dir = StoreDir::default();
        let path: StorePath = "7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-hello.drv".parse().unwrap();
        let err = parse_derivation(&store_dir, &path, "Derive(").unwrap_err();
        assert_eq!(
            err.to_string(),
            "error parsing derivation '/nix/store/7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-hello.drv': expected string '[' at position 7 of derivation"
        );
        let path: StorePath = "7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-hello".parse().unwrap();
        let err = parse_derivation(&store_dir, &path, "Derive(").unwrap_err();
        assert!(matches!(err, StoreError::NotADerivation(_)));
    }
}

//! Derivation hashes modulo fixed-output derivations.
//!
//! The hash of a regular derivation is computed over its canonical text
//! with the input derivations replaced by their own hashes. Fixed-output
//! derivations are replaced by hashes of their declared content, so changes
//! to how a fixed output is fetched do not change anything depending on it.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::{BoxFuture, FutureExt as _};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::base32;
use crate::derived_path::OutputName;
use crate::hash::{Hash, Sha256};
use crate::store::{DerivationStore, StoreError};
use crate::store_path::StorePath;

use super::{Derivation, MissingOutputError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DrvHashModulo {
    /// Hash of a regular derivation.
    Hash(Hash),
    /// Hash of each output of a fixed-output derivation.
    CaOutputHashes(BTreeMap<OutputName, Hash>),
}

/// Memoized results of [`hash_derivation_path`], keyed by derivation path.
///
/// Entries are only ever added. Share one value (by reference or in an
/// `Arc`) between all computations of a session.
#[derive(Debug, Default)]
pub struct DrvHashes {
    hashes: Mutex<BTreeMap<StorePath, DrvHashModulo>>,
}

impl DrvHashes {
    pub fn new() -> DrvHashes {
        DrvHashes::default()
    }

    pub fn get(&self, drv_path: &StorePath) -> Option<DrvHashModulo> {
        self.hashes.lock().get(drv_path).cloned()
    }

    /// Store `hash` for `drv_path` unless an entry exists already. Returns
    /// the entry that ends up stored.
    pub fn insert(&self, drv_path: StorePath, hash: DrvHashModulo) -> DrvHashModulo {
        self.hashes.lock().entry(drv_path).or_insert(hash).clone()
    }

    pub fn len(&self) -> usize {
        self.hashes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.lock().is_empty()
    }
}

#[derive(Error, Debug)]
pub enum HashModuloError {
    #[error("derivation '{0}' depends on itself")]
    Cycle(StorePath),
    #[error("fixed-output derivation has no outputs")]
    NoOutputs,
    #[error(transparent)]
    MissingOutput(#[from] MissingOutputError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Whether `output` is in `wanted`. An empty set wants every output.
pub fn want_output(output: &OutputName, wanted: &BTreeSet<OutputName>) -> bool {
    wanted.is_empty() || wanted.contains(output)
}

/// Stand-in for the path of `output_name` before that path is known.
pub fn hash_placeholder(output_name: &str) -> String {
    let digest = Sha256::digest(format!("nix-output:{output_name}"));
    format!("/{}", base32::encode_string(digest.digest_bytes()))
}

/// Hash `drv`, loading and hashing the derivations it depends on through
/// `store`.
pub async fn hash_derivation_modulo<S>(
    store: &S,
    drv_hashes: &DrvHashes,
    drv: &Derivation,
    mask_outputs: bool,
) -> Result<DrvHashModulo, HashModuloError>
where
    S: DerivationStore,
{
    let mut visited = BTreeSet::new();
    hash_modulo(store, drv_hashes, drv, mask_outputs, &mut visited).await
}

/// Hash the derivation stored at `drv_path`, consulting and filling
/// `drv_hashes`.
pub async fn hash_derivation_path<S>(
    store: &S,
    drv_hashes: &DrvHashes,
    drv_path: &StorePath,
) -> Result<DrvHashModulo, HashModuloError>
where
    S: DerivationStore,
{
    let mut visited = BTreeSet::new();
    path_modulo(store, drv_hashes, drv_path, &mut visited).await
}

fn path_modulo<'a, S>(
    store: &'a S,
    drv_hashes: &'a DrvHashes,
    drv_path: &'a StorePath,
    visited: &'a mut BTreeSet<StorePath>,
) -> BoxFuture<'a, Result<DrvHashModulo, HashModuloError>>
where
    S: DerivationStore,
{
    async move {
        if let Some(hash) = drv_hashes.get(drv_path) {
            trace!(path = %drv_path, "Derivation hash is cached");
            return Ok(hash);
        }
        if !visited.insert(drv_path.clone()) {
            return Err(HashModuloError::Cycle(drv_path.clone()));
        }
        let res = match store.read_derivation(drv_path).await {
            Ok(drv) => hash_modulo(store, drv_hashes, &drv, false, visited).await,
            Err(err) => Err(err.into()),
        };
        visited.remove(drv_path);
        let hash = res?;
        debug!(path = %drv_path, ?hash, "Computed derivation hash");
        Ok(drv_hashes.insert(drv_path.clone(), hash))
    }
    .boxed()
}

async fn hash_modulo<S>(
    store: &S,
    drv_hashes: &DrvHashes,
    drv: &Derivation,
    mask_outputs: bool,
    visited: &mut BTreeSet<StorePath>,
) -> Result<DrvHashModulo, HashModuloError>
where
    S: DerivationStore,
{
    if drv.is_fixed_output() {
        if drv.outputs.is_empty() {
            return Err(HashModuloError::NoOutputs);
        }
        let mut output_hashes = BTreeMap::new();
        for (name, output) in drv.outputs.iter() {
            if let Some(output_hash) = output.hash.as_ref() {
                let hash = Sha256::digest(format!("fixed:out:{output_hash}"));
                output_hashes.insert(name.clone(), hash.into());
            }
        }
        return Ok(DrvHashModulo::CaOutputHashes(output_hashes));
    }

    let mut inputs: BTreeMap<String, BTreeSet<OutputName>> = BTreeMap::new();
    for (drv_path, wanted) in drv.input_drvs.iter() {
        match path_modulo(store, drv_hashes, drv_path, visited).await? {
            DrvHashModulo::Hash(hash) => {
                inputs
                    .entry(format!("{hash:#x}"))
                    .or_default()
                    .extend(wanted.iter().cloned());
            }
            DrvHashModulo::CaOutputHashes(output_hashes) => {
                if let Some(missing) = wanted.iter().find(|o| !output_hashes.contains_key(*o)) {
                    return Err(MissingOutputError::new(missing.clone())
                        .with_drv_path(drv_path)
                        .into());
                }
                for (name, hash) in output_hashes.iter() {
                    if want_output(name, wanted) {
                        inputs
                            .entry(format!("{hash:#x}"))
                            .or_default()
                            .insert(OutputName::default());
                    }
                }
            }
        }
    }

    let text = drv.unparse(&store.store_dir(), mask_outputs, Some(&inputs));
    Ok(DrvHashModulo::Hash(Sha256::digest(text).into()))
}

#[cfg(test)]
mod unittests {
    use std::sync::Arc;

    use hex_literal::hex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::derivation::{BasicDerivation, DerivationOutput};
    use crate::hash::Algorithm;
    use crate::store::{MemoryStore, RepairFlag, compute_derivation_path, write_derivation};
    use crate::store_path::{FileIngestionMethod, StoreDir};
    use crate::test::CountingStore;
    use crate::{btree_map, btree_set};

    const ABC_SHA256: Hash = Hash::new(
        Algorithm::SHA256,
        &hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"),
    );

    fn fixed(builder: &str) -> Derivation {
        let output = DerivationOutput::fixed(
            &StoreDir::default(),
            "source",
            "out",
            FileIngestionMethod::Recursive,
            ABC_SHA256,
        )
        .unwrap();
        BasicDerivation {
            outputs: btree_map!("out" => output),
            platform: "x86_64-linux".into(),
            builder: builder.into(),
            args: vec!["fetch".into()],
            env: btree_map!("url" => format!("https://example.org/{builder}")),
            ..Default::default()
        }
        .into()
    }

    fn regular(input: &StorePath, wanted: &[&str]) -> Derivation {
        let wanted: BTreeSet<OutputName> = wanted.iter().map(|o| o.parse().unwrap()).collect();
        Derivation {
            basic: BasicDerivation {
                outputs: btree_map!(
                    "out" => DerivationOutput::input_addressed(
                        "7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-hello".parse().unwrap()
                    ),
                ),
                platform: "x86_64-linux".into(),
                builder: "/bin/sh".into(),
                args: vec!["-c".into(), "echo".into()],
                env: btree_map!(
                    "out" => "/nix/store/7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-hello".to_string()
                ),
                ..Default::default()
            },
            input_drvs: [(input.clone(), wanted)].into_iter().collect(),
        }
    }

    async fn add(store: &MemoryStore, drv: &Derivation, name: &str) -> StorePath {
        write_derivation(store, drv, name, RepairFlag::NoRepair)
            .await
            .unwrap()
    }

    #[test]
    fn want_output_policy() {
        let out: OutputName = "out".parse().unwrap();
        assert!(want_output(&out, &btree_set!()));
        assert!(!want_output(&out, &btree_set!("bin")));
        assert!(want_output(&out, &btree_set!("bin", "out")));
    }

    #[rstest]
    #[case::out("out", "/1rz4g4znpzjwh1xymhjpm42vipw92pr73vdgl6xs1hycac8kf2n9")]
    #[case::dev("dev", "/02qcpld1y6xhs5gz9bchpxaw0xdhmsp5dv88lh25r2ss44kh8dxz")]
    #[case::empty("", "/171rf4jhx57xqz3p7swniwkig249cif71pa08p80mgaf0mqz5bmr")]
    fn placeholder(#[case] output: &str, #[case] expected: &str) {
        assert_eq!(hash_placeholder(output), expected);
        assert_eq!(hash_placeholder(output), hash_placeholder(output));
    }

    #[test_log::test(tokio::test)]
    async fn fixed_output_hash() {
        let store = MemoryStore::new(StoreDir::default());
        let drv_hashes = DrvHashes::new();
        let res = hash_derivation_modulo(&store, &drv_hashes, &fixed("fetch-a"), true)
            .await
            .unwrap();
        let expected = Hash::new(
            Algorithm::SHA256,
            &hex!("c82c4a253720933429c9bc30e5feee15ab7951e1bc3146ae7cbfaf72920fbb56"),
        );
        assert_eq!(
            res,
            DrvHashModulo::CaOutputHashes(btree_map!("out" => expected))
        );
        let other = hash_derivation_modulo(&store, &drv_hashes, &fixed("fetch-b"), false)
            .await
            .unwrap();
        assert_eq!(other, res);
        assert!(drv_hashes.is_empty());
    }

    #[tokio::test]
    async fn multiple_fixed_outputs() {
        let store = MemoryStore::new(StoreDir::default());
        let flat = DerivationOutput::fixed(
            &StoreDir::default(),
            "source",
            "doc",
            FileIngestionMethod::Flat,
            ABC_SHA256,
        )
        .unwrap();
        let mut drv = fixed("fetch");
        drv.outputs.insert("doc".parse().unwrap(), flat);
        let res = hash_derivation_modulo(&store, &DrvHashes::new(), &drv, false)
            .await
            .unwrap();
        let flat_hash = Hash::new(
            Algorithm::SHA256,
            &hex!("cb1204dddcfa41bf8c2a3a45d72c682e1f5e4d022361c4abd55cbd7dd1f70421"),
        );
        match res {
            DrvHashModulo::CaOutputHashes(hashes) => {
                assert_eq!(hashes.len(), 2);
                assert_eq!(hashes[&"doc".parse::<OutputName>().unwrap()], flat_hash);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn regular_hash_substitutes_fixed_inputs() {
        let store = MemoryStore::new(StoreDir::default());
        let drv_hashes = DrvHashes::new();
        let fetch = add(&store, &fixed("fetch-a"), "source").await;
        let drv = regular(&fetch, &["out"]);
        let res = hash_derivation_modulo(&store, &drv_hashes, &drv, true)
            .await
            .unwrap();
        let expected = Hash::new(
            Algorithm::SHA256,
            &hex!("6d760cd73c4432f8db709dce3395a344603eeddf707c5cef81985d51c6f86f12"),
        );
        assert_eq!(res, DrvHashModulo::Hash(expected));
        assert_eq!(drv_hashes.len(), 1);
        assert!(matches!(
            drv_hashes.get(&fetch),
            Some(DrvHashModulo::CaOutputHashes(_))
        ));

        let unmasked = hash_derivation_modulo(&store, &drv_hashes, &drv, false)
            .await
            .unwrap();
        assert_ne!(unmasked, res);
    }

    #[tokio::test]
    async fn fixed_input_builder_change_is_invisible() {
        let store = MemoryStore::new(StoreDir::default());
        let drv_hashes = DrvHashes::new();
        let fetch_a = add(&store, &fixed("fetch-a"), "source").await;
        let fetch_b = add(&store, &fixed("fetch-b"), "source").await;
        assert_ne!(fetch_a, fetch_b);

        let a = regular(&fetch_a, &["out"]);
        let b = regular(&fetch_b, &["out"]);
        let hash_a = hash_derivation_modulo(&store, &drv_hashes, &a, true).await.unwrap();
        let hash_b = hash_derivation_modulo(&store, &drv_hashes, &b, true).await.unwrap();
        assert_eq!(hash_a, hash_b);
    }

    #[tokio::test]
    async fn regular_input_change_is_visible() {
        let store = MemoryStore::new(StoreDir::default());
        let drv_hashes = DrvHashes::new();
        let fetch = add(&store, &fixed("fetch-a"), "source").await;
        let mid_a = add(&store, &regular(&fetch, &["out"]), "mid").await;
        let mut changed = regular(&fetch, &["out"]);
        changed.builder = "/bin/bash".into();
        let mid_b = add(&store, &changed, "mid").await;

        let hash_a = hash_derivation_modulo(&store, &drv_hashes, &regular(&mid_a, &["out"]), true)
            .await
            .unwrap();
        let hash_b = hash_derivation_modulo(&store, &drv_hashes, &regular(&mid_b, &["out"]), true)
            .await
            .unwrap();
        assert_ne!(hash_a, hash_b);
    }

    #[tokio::test]
    async fn deterministic() {
        let store = MemoryStore::new(StoreDir::default());
        let fetch = add(&store, &fixed("fetch-a"), "source").await;
        let drv = regular(&fetch, &["out"]);
        let first = hash_derivation_modulo(&store, &DrvHashes::new(), &drv, true)
            .await
            .unwrap();
        let second = hash_derivation_modulo(&store, &DrvHashes::new(), &drv.clone(), true)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn memoized_paths_are_not_read_again() {
        let store = MemoryStore::new(StoreDir::default());
        let fetch = add(&store, &fixed("fetch-a"), "source").await;
        let left = add(&store, &regular(&fetch, &["out"]), "left").await;
        let mut right_drv = regular(&fetch, &[]);
        right_drv.args.push("right".into());
        let right = add(&store, &right_drv, "right").await;
        let mut top = regular(&left, &["out"]);
        top.input_drvs.insert(right.clone(), btree_set!("out"));
        let top = add(&store, &top, "top").await;

        let store = CountingStore::new(store);
        let drv_hashes = DrvHashes::new();
        let first = hash_derivation_path(&store, &drv_hashes, &top).await.unwrap();
        assert_eq!(store.reads(), 4);
        assert_eq!(drv_hashes.len(), 4);

        let second = hash_derivation_path(&store, &drv_hashes, &top).await.unwrap();
        assert_eq!(store.reads(), 4);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cycle_is_detected() {
        let store_dir = StoreDir::default();
        let store = MemoryStore::new(store_dir.clone());
        let a: StorePath = "7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-a.drv".parse().unwrap();
        let b: StorePath = "ivz5kvk528akza21x33r8jn2wl8bpsw3-b.drv".parse().unwrap();
        store.insert_derivation(a.clone(), &regular(&b, &["out"]));
        store.insert_derivation(b.clone(), &regular(&a, &["out"]));

        let drv_hashes = DrvHashes::new();
        let err = hash_derivation_path(&store, &drv_hashes, &a).await.unwrap_err();
        match err {
            HashModuloError::Cycle(path) => assert_eq!(path, a),
            other => panic!("unexpected error {other}"),
        }
        assert!(drv_hashes.is_empty());
    }

    #[tokio::test]
    async fn missing_fixed_output() {
        let store = MemoryStore::new(StoreDir::default());
        let drv_hashes = DrvHashes::new();
        let fetch = add(&store, &fixed("fetch-a"), "source").await;
        let top = add(&store, &regular(&fetch, &["dev"]), "top").await;
        let err = hash_derivation_path(&store, &drv_hashes, &top).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("derivation '{fetch}' does not have an output named 'dev'")
        );
        assert!(drv_hashes.get(&top).is_none());
        assert!(drv_hashes.get(&fetch).is_some());
    }

    #[tokio::test]
    async fn no_outputs() {
        let store = MemoryStore::new(StoreDir::default());
        let err = hash_derivation_modulo(&store, &DrvHashes::new(), &Derivation::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, HashModuloError::NoOutputs));
    }

    #[tokio::test]
    async fn missing_input_is_a_store_error() {
        let store = MemoryStore::new(StoreDir::default());
        let missing: StorePath = "7h7qgvs4kgzsn8a6rb273saxyqh4jxlz-a.drv".parse().unwrap();
        let err = hash_derivation_modulo(&store, &DrvHashes::new(), &regular(&missing, &[]), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HashModuloError::Store(StoreError::InvalidPath(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_computations_agree() {
        let store = Arc::new(MemoryStore::new(StoreDir::default()));
        let fetch = add(&store, &fixed("fetch-a"), "source").await;
        let top = add(&store, &regular(&fetch, &["out"]), "top").await;
        let drv_hashes = Arc::new(DrvHashes::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let drv_hashes = drv_hashes.clone();
            let top = top.clone();
            tasks.push(tokio::spawn(async move {
                hash_derivation_path(&*store, &drv_hashes, &top).await.unwrap()
            }));
        }
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(drv_hashes.get(&top), Some(results[0].clone()));
        assert_eq!(drv_hashes.len(), 2);
    }

    #[tokio::test]
    async fn stored_path_matches_computed_path() {
        let store = MemoryStore::new(StoreDir::default());
        let drv = fixed("fetch-a");
        let path = add(&store, &drv, "source").await;
        assert_eq!(
            path,
            compute_derivation_path(&StoreDir::default(), &drv, "source").unwrap()
        );
    }
}

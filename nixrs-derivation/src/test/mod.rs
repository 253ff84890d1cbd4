//! Helpers for tests of this crate and of crates using it.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::derivation::Derivation;
use crate::store::{DerivationStore, RepairFlag, StoreError};
use crate::store_path::{StoreDir, StoreDirProvider, StorePath, StorePathSet};

/// Build a `BTreeMap` parsing every key with `FromStr`.
#[macro_export]
macro_rules! btree_map {
    () => { std::collections::BTreeMap::new() };
    ($($k:expr => $v:expr),+ $(,)?) => {{
        let mut ret = std::collections::BTreeMap::new();
        $(
            ret.insert($k.parse().unwrap(), $v);
        )+
        ret
    }};
}

/// Build a `BTreeSet` parsing every element with `FromStr`.
#[macro_export]
macro_rules! btree_set {
    () => { std::collections::BTreeSet::new() };
    ($($v:expr),+ $(,)?) => {{
        let mut ret = std::collections::BTreeSet::new();
        $(
            ret.insert($v.parse().unwrap());
        )+
        ret
    }};
}

/// Store wrapper counting the derivations read through it.
#[derive(Debug)]
pub struct CountingStore<S> {
    store: S,
    reads: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(store: S) -> Self {
        CountingStore {
            store,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.store
    }
}

impl<S: StoreDirProvider> StoreDirProvider for CountingStore<S> {
    fn store_dir(&self) -> StoreDir {
        self.store.store_dir()
    }
}

impl<S: DerivationStore> DerivationStore for CountingStore<S> {
    async fn read_derivation(&self, drv_path: &StorePath) -> Result<Derivation, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.store.read_derivation(drv_path).await
    }

    async fn add_text_to_store(
        &self,
        name: &str,
        contents: &str,
        references: &StorePathSet,
        repair: RepairFlag,
    ) -> Result<StorePath, StoreError> {
        self.store
            .add_text_to_store(name, contents, references, repair)
            .await
    }

    fn is_read_only(&self) -> bool {
        self.store.is_read_only()
    }
}

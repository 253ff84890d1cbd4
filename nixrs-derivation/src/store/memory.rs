use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::{debug, instrument, trace};

use crate::derivation::Derivation;
use crate::hash::Sha256;
use crate::store_path::{StoreDir, StoreDirProvider, StorePath, StorePathSet};

use super::{DerivationStore, RepairFlag, StoreError, parse_derivation};

/// A store keeping text files in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    store_dir: StoreDir,
    read_only: bool,
    contents: RwLock<BTreeMap<StorePath, String>>,
}

impl MemoryStore {
    pub fn new(store_dir: StoreDir) -> MemoryStore {
        MemoryStore {
            store_dir,
            read_only: false,
            contents: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn read_only(mut self, read_only: bool) -> MemoryStore {
        self.read_only = read_only;
        self
    }

    /// Place `contents` at `path` without checking that the path matches.
    pub fn insert(&self, path: StorePath, contents: String) {
        self.contents.write().insert(path, contents);
    }

    /// Place `drv` at `path` without checking that the path matches.
    pub fn insert_derivation(&self, path: StorePath, drv: &Derivation) {
        let text = drv.unparse(&self.store_dir, false, None);
        self.insert(path, text);
    }

    pub fn contains(&self, path: &StorePath) -> bool {
        self.contents.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.contents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.read().is_empty()
    }
}

impl StoreDirProvider for MemoryStore {
    fn store_dir(&self) -> StoreDir {
        self.store_dir.clone()
    }
}

impl DerivationStore for MemoryStore {
    #[instrument(skip(self, drv_path), fields(path = %drv_path))]
    async fn read_derivation(&self, drv_path: &StorePath) -> Result<Derivation, StoreError> {
        let text = self
            .contents
            .read()
            .get(drv_path)
            .cloned()
            .ok_or_else(|| StoreError::InvalidPath(self.store_dir.print_path(drv_path)))?;
        debug!("Read derivation");
        parse_derivation(&self.store_dir, drv_path, &text)
    }

    #[instrument(skip(self, contents, references))]
    async fn add_text_to_store(
        &self,
        name: &str,
        contents: &str,
        references: &StorePathSet,
        repair: RepairFlag,
    ) -> Result<StorePath, StoreError> {
        let path =
            self.store_dir
                .make_text_path(name, Sha256::digest(contents), references)?;
        if self.read_only {
            return Err(StoreError::ReadOnly(self.store_dir.print_path(&path)));
        }
        let mut store = self.contents.write();
        if repair == RepairFlag::Repair || !store.contains_key(&path) {
            trace!(path = %path, "Adding text");
            store.insert(path.clone(), contents.to_string());
        }
        Ok(path)
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

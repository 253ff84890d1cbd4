use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::derivation::Derivation;
use crate::hash::Sha256;
use crate::store_path::{StoreDir, StoreDirProvider, StorePath, StorePathSet};

use super::{DerivationStore, RepairFlag, StoreError, parse_derivation};

/// A store backed by a plain directory of files named by their store path
/// base names.
#[derive(Debug, Clone)]
pub struct DirStore {
    store_dir: StoreDir,
    root: PathBuf,
    read_only: bool,
}

impl DirStore {
    /// A store whose files live directly in `store_dir`.
    pub fn new(store_dir: StoreDir) -> DirStore {
        let root = PathBuf::from(store_dir.to_str());
        DirStore::with_root(store_dir, root)
    }

    /// A store for paths in `store_dir` whose files live in `root`.
    pub fn with_root<P: Into<PathBuf>>(store_dir: StoreDir, root: P) -> DirStore {
        DirStore {
            store_dir,
            root: root.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> DirStore {
        self.read_only = read_only;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn real_path(&self, path: &StorePath) -> PathBuf {
        self.root.join(path.to_string())
    }

    fn io_error(&self, path: &StorePath, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.store_dir.print_path(path),
            source,
        }
    }
}

impl StoreDirProvider for DirStore {
    fn store_dir(&self) -> StoreDir {
        self.store_dir.clone()
    }
}

impl DerivationStore for DirStore {
    #[instrument(skip(self, drv_path), fields(path = %drv_path))]
    async fn read_derivation(&self, drv_path: &StorePath) -> Result<Derivation, StoreError> {
        let real_path = self.real_path(drv_path);
        let text = match tokio::fs::read_to_string(&real_path).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::InvalidPath(self.store_dir.print_path(drv_path)));
            }
            Err(err) => return Err(self.io_error(drv_path, err)),
        };
        debug!(file = ?real_path, "Read derivation");
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
        let path = self
            .store_dir
            .make_text_path(name, Sha256::digest(contents), references)?;
        if self.read_only {
            return Err(StoreError::ReadOnly(self.store_dir.print_path(&path)));
        }
        let real_path = self.real_path(&path);
        let exists = tokio::fs::try_exists(&real_path)
            .await
            .map_err(|err| self.io_error(&path, err))?;
        if repair == RepairFlag::Repair || !exists {
            tokio::fs::create_dir_all(&self.root)
                .await
                .map_err(|err| self.io_error(&path, err))?;
            tokio::fs::write(&real_path, contents)
                .await
                .map_err(|err| self.io_error(&path, err))?;
            debug!(file = ?real_path, "Wrote text file");
        }
        Ok(path)
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

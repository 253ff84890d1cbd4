use std::collections::BTreeSet;

mod content_address;
mod path;
mod store_dir;

pub use content_address::FileIngestionMethod;
pub use path::{
    DRV_EXTENSION, ParseStorePathError, StorePath, StorePathError, StorePathHash, StorePathName,
    into_name,
};
pub use store_dir::{StoreDir, StoreDirProvider};

pub type StorePathSet = BTreeSet<StorePath>;

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    pub use super::path::proptest::*;
}

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::trace;

use super::{FileIngestionMethod, ParseStorePathError, StorePath, StorePathError, StorePathSet};
use crate::hash::{self, Sha256};

/// Store directory.
/// Since the [`StorePath`] abstraction is only a hash and a name we need this
/// to convert the path to a complete store path string.
///
/// ```
/// use nixrs_derivation::store_path::StoreDir;
/// let store = StoreDir::new("/nix/store").unwrap();
/// let path = store.parse_path("/nix/store/55xkmqns51sw7nrgykp5vnz36w4fr3cw-nix-2.1.3").unwrap();
/// assert_eq!("55xkmqns51sw7nrgykp5vnz36w4fr3cw-nix-2.1.3", path.to_string());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreDir(Arc<str>);

impl StoreDir {
    /// Create a new StoreDir from given path.
    /// Fails when the path is not absolute. A trailing `/` is dropped.
    pub fn new<S: AsRef<str>>(path: S) -> Result<StoreDir, StorePathError> {
        let path = path.as_ref();
        if !Path::new(path).is_absolute() {
            return Err(StorePathError::NonAbsolute(PathBuf::from(path)));
        }
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
        Ok(StoreDir(Arc::from(trimmed)))
    }

    pub fn to_str(&self) -> &str {
        &self.0
    }

    /// Returns an object that implements [`Display`] for printing a [`StorePath`] complete
    /// with the store directory.
    ///
    /// [`Display`]: fmt::Display
    pub fn display<'a>(&'a self, path: &'a StorePath) -> impl fmt::Display + 'a {
        DisplayStorePath {
            store_dir: self,
            path,
        }
    }

    /// Returns a [`String`] with the full path for the provided [`StorePath`].
    pub fn print_path(&self, path: &StorePath) -> String {
        self.display(path).to_string()
    }

    /// Parses a full path `s` in this store to a [`StorePath`].
    pub fn parse_path(&self, s: &str) -> Result<StorePath, ParseStorePathError> {
        let base_name = self
            .strip_store(s)
            .map_err(|error| ParseStorePathError::new(s, error))?;
        base_name
            .parse::<StorePath>()
            .map_err(|err| ParseStorePathError::new(s, err.error))
    }

    fn strip_store<'s>(&self, s: &'s str) -> Result<&'s str, StorePathError> {
        if !Path::new(s).is_absolute() {
            return Err(StorePathError::NotInStore(PathBuf::from(s)));
        }
        s.strip_prefix(self.to_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StorePathError::NotInStore(PathBuf::from(s)))
    }

    /// Compute the store path of an object given its type, a hash and a name.
    ///
    /// The fingerprint that is hashed is `<type>:<algo>:<hex>:<store dir>:<name>`.
    pub fn make_store_path(
        &self,
        path_type: &str,
        hash: &hash::Hash,
        name: &str,
    ) -> Result<StorePath, StorePathError> {
        let fingerprint = format!("{path_type}:{hash:x}:{self}:{name}");
        trace!(fingerprint, "Computing store path");
        StorePath::from_hash(&Sha256::digest(fingerprint), name)
    }

    /// Path of a text object (like a `.drv` file) with the given sha256 of its
    /// contents and references.
    pub fn make_text_path(
        &self,
        name: &str,
        hash: Sha256,
        references: &StorePathSet,
    ) -> Result<StorePath, StorePathError> {
        // References are stuffed into the type since putting them in the
        // fingerprint itself would be ambiguous.
        let mut path_type = String::from("text");
        for reference in references {
            path_type.push(':');
            path_type.push_str(&self.print_path(reference));
        }
        self.make_store_path(&path_type, &hash.into(), name)
    }

    /// Path of a fixed-output object without references.
    pub fn make_fixed_output_path(
        &self,
        name: &str,
        method: FileIngestionMethod,
        hash: &hash::Hash,
    ) -> Result<StorePath, StorePathError> {
        if method == FileIngestionMethod::Recursive && hash.algorithm() == hash::Algorithm::SHA256
        {
            self.make_store_path("source", hash, name)
        } else {
            let inner = Sha256::digest(format!("fixed:out:{}{hash:x}:", method.prefix()));
            trace!("Output hash {inner:x}");
            self.make_store_path("output:out", &inner.into(), name)
        }
    }
}

struct DisplayStorePath<'a> {
    store_dir: &'a StoreDir,
    path: &'a StorePath,
}

impl fmt::Display for DisplayStorePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_dir, self.path)
    }
}

impl Default for StoreDir {
    fn default() -> Self {
        StoreDir(Arc::from("/nix/store"))
    }
}

impl FromStr for StoreDir {
    type Err = StorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreDir::new(s)
    }
}

impl AsRef<str> for StoreDir {
    fn as_ref(&self) -> &str {
        self.to_str()
    }
}

impl AsRef<Path> for StoreDir {
    fn as_ref(&self) -> &Path {
        Path::new(self.to_str())
    }
}

impl fmt::Display for StoreDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

pub trait StoreDirProvider {
    /// Root path of this store
    fn store_dir(&self) -> StoreDir;
}

impl StoreDirProvider for StoreDir {
    fn store_dir(&self) -> StoreDir {
        self.clone()
    }
}

impl<T: ?Sized + StoreDirProvider> StoreDirProvider for Arc<T> {
    fn store_dir(&self) -> StoreDir {
        (**self).store_dir()
    }
}

impl<T: ?Sized + StoreDirProvider> StoreDirProvider for &T {
    fn store_dir(&self) -> StoreDir {
        (**self).store_dir()
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    use ::proptest::prelude::*;

    use super::*;

    impl Arbitrary for StoreDir {
        type Parameters = ();
        type Strategy = BoxedStrategy<StoreDir>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            "(/[a-z0-9]{1,10}){1,3}"
                .prop_map(|path| StoreDir(Arc::from(path.as_str())))
                .boxed()
        }
    }
}

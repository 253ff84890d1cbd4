use std::fmt;
use std::hash as std_hash;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::base32;
use crate::hash;

/// Extension of derivation files in the store.
pub const DRV_EXTENSION: &str = ".drv";

/// Base name of an object in the store: a 20 byte digest and a name.
///
/// `Display` prints the base name `<hash>-<name>`. Printing the full path
/// needs the [`StoreDir`](super::StoreDir) the path lives in.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath {
    hash: StorePathHash,
    name: StorePathName,
}

impl StorePath {
    fn from_bytes(buf: &[u8]) -> Result<Self, StorePathError> {
        if buf.len() < STORE_PATH_HASH_ENCODED_SIZE + 1 {
            return Err(StorePathError::HashLength);
        }
        if buf[STORE_PATH_HASH_ENCODED_SIZE] != b'-' {
            return Err(StorePathError::Symbol(
                STORE_PATH_HASH_ENCODED_SIZE as u8,
                buf[STORE_PATH_HASH_ENCODED_SIZE],
            ));
        }
        let hash = StorePathHash::decode_digest(&buf[..STORE_PATH_HASH_ENCODED_SIZE])?;
        let name = buf[(STORE_PATH_HASH_ENCODED_SIZE + 1)..]
            .try_into()
            .map_err(|err| {
                StorePathError::adjust_index(STORE_PATH_HASH_ENCODED_SIZE as u8 + 1, err)
            })?;
        Ok(StorePath { hash, name })
    }

    pub fn from_hash(hash: &hash::Sha256, name: &str) -> Result<Self, StorePathError> {
        Ok(StorePath {
            hash: StorePathHash::new_from_hash(hash),
            name: name.parse()?,
        })
    }

    pub fn name(&self) -> &StorePathName {
        &self.name
    }

    pub fn hash(&self) -> &StorePathHash {
        &self.hash
    }

    /// Whether this path names a derivation file.
    pub fn is_derivation(&self) -> bool {
        self.name.ends_with(DRV_EXTENSION)
    }

    /// Name of the derivation stored at this path, that is the path name
    /// without its `.drv` extension.
    pub fn derivation_name(&self) -> Option<&str> {
        self.name.strip_suffix(DRV_EXTENSION)
    }
}

impl fmt::Debug for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StorePath")
            .field(&format_args!("{self}"))
            .finish()
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.name)
    }
}

impl Serialize for StorePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("invalid store path '{path}': {error}")]
pub struct ParseStorePathError {
    pub path: String,
    pub error: StorePathError,
}

impl ParseStorePathError {
    pub fn new(path: &str, error: StorePathError) -> ParseStorePathError {
        ParseStorePathError {
            path: path.to_owned(),
            error,
        }
    }
}

impl FromStr for StorePath {
    type Err = ParseStorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorePath::from_bytes(s.as_bytes()).map_err(|error| ParseStorePathError::new(s, error))
    }
}

const STORE_PATH_HASH_SIZE: usize = 20;
const STORE_PATH_HASH_ENCODED_SIZE: usize = base32::encode_len(STORE_PATH_HASH_SIZE);

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StorePathHash([u8; STORE_PATH_HASH_SIZE]);

impl StorePathHash {
    pub fn new(value: [u8; STORE_PATH_HASH_SIZE]) -> StorePathHash {
        StorePathHash(value)
    }

    /// Compress a sha256 digest into a store path hash by folding it with xor.
    pub fn new_from_hash(hash: &hash::Sha256) -> Self {
        let mut digest = [0u8; STORE_PATH_HASH_SIZE];
        for (i, item) in hash.as_ref().iter().enumerate() {
            let idx = i % STORE_PATH_HASH_SIZE;
            digest[idx] ^= item;
        }
        StorePathHash(digest)
    }

    pub fn decode_digest(data: &[u8]) -> Result<StorePathHash, StorePathError> {
        if data.len() != base32::encode_len(STORE_PATH_HASH_SIZE) {
            return Err(StorePathError::HashLength);
        }
        let mut hash_output = [0u8; STORE_PATH_HASH_SIZE];
        base32::decode_mut(data, &mut hash_output).map_err(|err| {
            StorePathError::Symbol(err.error.position as u8, data[err.error.position])
        })?;
        Ok(StorePathHash::new(hash_output))
    }
}

impl fmt::Debug for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePathHash({})", self)
    }
}

impl fmt::Display for StorePathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut output = [0u8; base32::encode_len(STORE_PATH_HASH_SIZE)];
        base32::encode_mut(&self.0, &mut output);

        // SAFETY: Nix Base32 is a subset of ASCII, which guarantees valid UTF-8.
        let s = unsafe { std::str::from_utf8_unchecked(&output) };
        f.write_str(s)
    }
}

impl FromStr for StorePathHash {
    type Err = StorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorePathHash::decode_digest(s.as_bytes())
    }
}

impl std_hash::Hash for StorePathHash {
    fn hash<H: std_hash::Hasher>(&self, state: &mut H) {
        for c in self.0.iter().rev() {
            c.hash(state);
        }
    }
}

impl Ord for StorePathHash {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for StorePathHash {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl AsRef<[u8]> for StorePathHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq<[u8; STORE_PATH_HASH_SIZE]> for StorePathHash {
    fn eq(&self, other: &[u8; STORE_PATH_HASH_SIZE]) -> bool {
        self.0 == *other
    }
}

const NAME_LOOKUP: [bool; 256] = {
    let mut ret = [false; 256];
    let mut idx = 0usize;
    while idx < u8::MAX as usize {
        let ch = idx as u8;
        ret[idx] = matches!(ch, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'+' | b'-' | b'_' | b'?' | b'=' | b'.');
        idx += 1;
    }
    ret
};
pub(crate) const MAX_NAME_LEN: usize = 211;

/// Validate `s` as a store path name (also used for output names).
pub fn into_name<V: AsRef<[u8]>>(s: &V) -> Result<&str, StorePathError> {
    let s = s.as_ref();
    if s.is_empty() || s.len() > MAX_NAME_LEN {
        return Err(StorePathError::NameLength);
    }

    for (idx, ch) in s.iter().enumerate() {
        if !NAME_LOOKUP[*ch as usize] {
            return Err(StorePathError::Symbol(idx as u8, *ch));
        }
    }

    // SAFETY: We checked above that it is a subset of ASCII, which guarantees valid UTF-8.
    let ret = unsafe { std::str::from_utf8_unchecked(s) };
    Ok(ret)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePathName(String);

impl fmt::Display for StorePathName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&[u8]> for StorePathName {
    type Error = StorePathError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let name = into_name(&value)?;
        Ok(StorePathName(name.into()))
    }
}

impl FromStr for StorePathName {
    type Err = StorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.as_bytes().try_into()
    }
}

impl AsRef<str> for StorePathName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for StorePathName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<str> for StorePathName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StorePathName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StorePathError {
    #[error("store directory {0:?} is not absolute")]
    NonAbsolute(PathBuf),
    #[error("path {0:?} is not in store")]
    NotInStore(PathBuf),
    #[error("invalid store path hash length")]
    HashLength,
    #[error("invalid store path name length")]
    NameLength,
    #[error("invalid store path {ch} symbol at {0}", ch = char::from_u32(*.1 as u32).map(|c| c.to_string()).unwrap_or_else(|| .1.to_string()))]
    Symbol(u8, u8),
}

impl StorePathError {
    fn adjust_index(prefix: u8, other: StorePathError) -> StorePathError {
        match other {
            StorePathError::Symbol(old, ch) => StorePathError::Symbol(prefix + old, ch),
            c => c,
        }
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    use super::*;
    use ::proptest::{arbitrary::Arbitrary, prelude::*};

    pub fn arb_output_name() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9+\\-_?=][a-zA-Z0-9+\\-_?=.]{0,13}"
    }

    impl Arbitrary for StorePathHash {
        type Parameters = ();
        type Strategy = BoxedStrategy<StorePathHash>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            any::<[u8; STORE_PATH_HASH_SIZE]>()
                .prop_map(StorePathHash)
                .boxed()
        }
    }

    pub fn arb_store_path_name(
        max: u8,
        extension: Option<String>,
    ) -> impl Strategy<Value = StorePathName> {
        "[a-zA-Z0-9+\\-_?=][a-zA-Z0-9+\\-_?=.]{0,210}".prop_map(move |mut s| {
            let len = extension.as_ref().map(|e| e.len() + 1).unwrap_or(0) as u8;
            let max = max.min(MAX_NAME_LEN as u8 - len) - 1;
            if s.len() > max as usize {
                s.truncate(max as usize);
            }
            if let Some(ext) = extension.as_ref() {
                s.push('.');
                s.push_str(ext);
            }
            StorePathName(s)
        })
    }

    impl Arbitrary for StorePathName {
        type Parameters = Option<String>;
        type Strategy = BoxedStrategy<StorePathName>;

        fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
            arb_store_path_name(MAX_NAME_LEN as u8, args).boxed()
        }
    }

    pub fn arb_store_path(max: u8, extension: Option<String>) -> impl Strategy<Value = StorePath> {
        (any::<StorePathHash>(), arb_store_path_name(max, extension))
            .prop_map(|(hash, name)| StorePath { hash, name })
    }

    pub fn arb_drv_store_path() -> impl Strategy<Value = StorePath> {
        arb_store_path(MAX_NAME_LEN as u8 - 4 - 15, Some("drv".into()))
    }

    impl Arbitrary for StorePath {
        type Parameters = Option<String>;
        type Strategy = BoxedStrategy<StorePath>;
        fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
            arb_store_path(MAX_NAME_LEN as u8, args).boxed()
        }
    }
}

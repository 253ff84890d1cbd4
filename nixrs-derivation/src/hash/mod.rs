use std::fmt as sfmt;
use std::str::FromStr;

use derive_more::Display;
use ring::digest;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::base32;

mod fmt;

pub use fmt::{Base16, Base32, Base64, Encoding, ParseHashError, ParseHashErrorKind, Sri};

const MD5_SIZE: usize = 128 / 8;
const SHA1_SIZE: usize = 160 / 8;
const SHA256_SIZE: usize = 256 / 8;
const SHA512_SIZE: usize = 512 / 8;
const LARGEST_ALGORITHM: Algorithm = Algorithm::SHA512;

/// A digest algorithm.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Display, Default)]
pub enum Algorithm {
    #[display("md5")]
    MD5,
    #[display("sha1")]
    SHA1,
    #[default]
    #[display("sha256")]
    SHA256,
    #[display("sha512")]
    SHA512,
}

impl Algorithm {
    /// Returns the size in bytes of this hash.
    #[inline]
    pub const fn size(&self) -> usize {
        match &self {
            Algorithm::MD5 => MD5_SIZE,
            Algorithm::SHA1 => SHA1_SIZE,
            Algorithm::SHA256 => SHA256_SIZE,
            Algorithm::SHA512 => SHA512_SIZE,
        }
    }

    /// Returns the length of a base-16 representation of this hash.
    #[inline]
    pub const fn base16_len(&self) -> usize {
        self.size() * 2
    }

    /// Returns the length of a base-32 representation of this hash.
    #[inline]
    pub const fn base32_len(&self) -> usize {
        base32::encode_len(self.size())
    }

    /// Returns the length of a base-64 representation of this hash.
    #[inline]
    pub const fn base64_len(&self) -> usize {
        ((4 * self.size() / 3) + 3) & !3
    }

    #[inline]
    fn digest_algorithm(&self) -> &'static digest::Algorithm {
        match self {
            Algorithm::SHA1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Algorithm::SHA256 => &digest::SHA256,
            Algorithm::SHA512 => &digest::SHA512,
            Algorithm::MD5 => unreachable!("md5 is computed by the md5 crate"),
        }
    }

    /// Returns the digest of `data` using the given digest algorithm.
    ///
    /// ```
    /// # use nixrs_derivation::hash::Algorithm;
    /// let hash = Algorithm::SHA256.digest("abc");
    ///
    /// assert_eq!("sha256:1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s", hash.to_string());
    /// ```
    pub fn digest<B: AsRef<[u8]>>(&self, data: B) -> Hash {
        let mut ctx = Context::new(*self);
        ctx.update(data);
        ctx.finish()
    }
}

#[derive(Error, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
#[error("unknown hash algorithm '{0}'")]
pub struct UnknownAlgorithm(String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sha256") {
            Ok(Algorithm::SHA256)
        } else if s.eq_ignore_ascii_case("sha512") {
            Ok(Algorithm::SHA512)
        } else if s.eq_ignore_ascii_case("sha1") {
            Ok(Algorithm::SHA1)
        } else if s.eq_ignore_ascii_case("md5") {
            Ok(Algorithm::MD5)
        } else {
            Err(UnknownAlgorithm(s.to_owned()))
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("hash has wrong length {length} != {} for hash type '{algorithm}'", algorithm.size())]
pub struct InvalidHashError {
    algorithm: Algorithm,
    length: usize,
}

/// A digest together with the algorithm that produced it.
///
/// `Display` prints `<algorithm>:<nix base-32>`, the form Nix uses in most
/// user facing places, while `{:x}` prints `<algorithm>:<hex>` and `{:#x}`
/// the bare hex digest.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Hash {
    algorithm: Algorithm,
    data: [u8; LARGEST_ALGORITHM.size()],
}

impl Hash {
    pub const fn new(algorithm: Algorithm, hash: &[u8]) -> Hash {
        let mut data = [0u8; LARGEST_ALGORITHM.size()];
        let (hash_data, _postfix) = data.split_at_mut(algorithm.size());
        hash_data.copy_from_slice(hash);
        Hash { algorithm, data }
    }

    pub fn from_slice(algorithm: Algorithm, hash: &[u8]) -> Result<Hash, InvalidHashError> {
        if hash.len() != algorithm.size() {
            return Err(InvalidHashError {
                algorithm,
                length: hash.len(),
            });
        }
        Ok(Hash::new(algorithm, hash))
    }

    #[inline]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[inline]
    pub fn digest_bytes(&self) -> &[u8] {
        &self.data[0..(self.algorithm.size())]
    }
}

impl std::ops::Deref for Hash {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.digest_bytes()
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.digest_bytes()
    }
}

impl sfmt::LowerHex for Hash {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        if !f.alternate() {
            write!(f, "{}:", self.algorithm)?;
        }
        for val in self.digest_bytes() {
            write!(f, "{val:02x}")?;
        }
        Ok(())
    }
}

impl sfmt::Display for Hash {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        sfmt::Display::fmt(&self.as_base32(), f)
    }
}

impl sfmt::Debug for Hash {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        f.debug_struct("Hash")
            .field("algorithm", &self.algorithm)
            .field("data", &format_args!("{:#}", self.as_base32()))
            .finish()
    }
}

impl FromStr for Hash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::parse_any_prefixed(s)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A sha256 digest, the only algorithm store paths are computed with.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Sha256([u8; Algorithm::SHA256.size()]);

impl Sha256 {
    pub const fn new(digest: &[u8]) -> Self {
        let mut data = [0u8; Algorithm::SHA256.size()];
        data.copy_from_slice(digest);
        Self(data)
    }

    /// Returns the digest of `data` using sha256
    ///
    /// ```
    /// # use nixrs_derivation::hash::Sha256;
    /// let hash = Sha256::digest("abc");
    ///
    /// assert_eq!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad", format!("{hash:x}"));
    /// ```
    pub fn digest<B: AsRef<[u8]>>(data: B) -> Self {
        let digest = digest::digest(&digest::SHA256, data.as_ref());
        Sha256::new(digest.as_ref())
    }

    #[inline]
    pub fn digest_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Sha256 {
    fn as_ref(&self) -> &[u8] {
        self.digest_bytes()
    }
}

impl From<Sha256> for Hash {
    fn from(value: Sha256) -> Self {
        Hash::new(Algorithm::SHA256, value.as_ref())
    }
}

impl TryFrom<Hash> for Sha256 {
    type Error = ParseHashErrorKind;

    fn try_from(value: Hash) -> Result<Self, Self::Error> {
        if value.algorithm() != Algorithm::SHA256 {
            return Err(ParseHashErrorKind::TypeMismatch {
                expected: Algorithm::SHA256,
                actual: value.algorithm(),
            });
        }
        Ok(Self::new(value.as_ref()))
    }
}

impl sfmt::LowerHex for Sha256 {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        for val in self.0.iter() {
            write!(f, "{val:02x}")?;
        }
        Ok(())
    }
}

impl sfmt::Debug for Sha256 {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        write!(f, "Sha256({self:x})")
    }
}

#[derive(Clone)]
enum InnerContext {
    MD5(md5::Context),
    Ring(digest::Context),
}

/// A context for multi-step (Init-Update-Finish) digest calculation.
///
/// ```
/// use nixrs_derivation::hash;
///
/// let one_shot = hash::Algorithm::SHA256.digest("hello, world");
///
/// let mut ctx = hash::Context::new(hash::Algorithm::SHA256);
/// ctx.update("hello");
/// ctx.update(", ");
/// ctx.update("world");
/// let multi_path = ctx.finish();
///
/// assert_eq!(one_shot, multi_path);
/// ```
#[derive(Clone)]
pub struct Context(Algorithm, InnerContext);

impl Context {
    /// Constructs a new context with `algorithm`.
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::MD5 => Context(algorithm, InnerContext::MD5(md5::Context::new())),
            _ => Context(
                algorithm,
                InnerContext::Ring(digest::Context::new(algorithm.digest_algorithm())),
            ),
        }
    }

    /// Update the digest with all the data in `data`.
    pub fn update<D: AsRef<[u8]>>(&mut self, data: D) {
        let data = data.as_ref();
        match &mut self.1 {
            InnerContext::MD5(ctx) => ctx.consume(data),
            InnerContext::Ring(ctx) => ctx.update(data),
        }
    }

    /// Finalizes the digest calculation and returns the [`Hash`] value.
    pub fn finish(self) -> Hash {
        match self.1 {
            InnerContext::MD5(ctx) => Hash::new(self.0, ctx.compute().as_ref()),
            InnerContext::Ring(ctx) => Hash::new(self.0, ctx.finish().as_ref()),
        }
    }

    /// The algorithm that this context is using.
    pub fn algorithm(&self) -> Algorithm {
        self.0
    }
}

impl sfmt::Debug for Context {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        f.debug_tuple("Context").field(&self.0).finish()
    }
}

#[cfg(any(test, feature = "test"))]
pub mod proptest {
    use ::proptest::prelude::*;

    use super::*;

    impl Arbitrary for Algorithm {
        type Parameters = ();
        type Strategy = BoxedStrategy<Algorithm>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            prop_oneof![
                Just(Algorithm::MD5),
                Just(Algorithm::SHA1),
                Just(Algorithm::SHA256),
                Just(Algorithm::SHA512),
            ]
            .boxed()
        }
    }

    impl Arbitrary for Hash {
        type Parameters = Algorithm;
        type Strategy = BoxedStrategy<Hash>;

        fn arbitrary_with(algorithm: Self::Parameters) -> Self::Strategy {
            any::<[u8; LARGEST_ALGORITHM.size()]>()
                .prop_map(move |data| Hash::new(algorithm, &data[..algorithm.size()]))
                .boxed()
        }
    }

    pub fn arb_hash() -> impl Strategy<Value = Hash> {
        any::<Algorithm>().prop_flat_map(any_with::<Hash>)
    }
}

#[cfg(test)]
mod unittests {
    use hex_literal::hex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    /// value taken from: https://tools.ietf.org/html/rfc1321
    const MD5_ABC: Hash = Hash::new(Algorithm::MD5, &hex!("900150983cd24fb0d6963f7d28e17f72"));

    /// value taken from: https://tools.ietf.org/html/rfc3174
    const SHA1_ABC: Hash = Hash::new(
        Algorithm::SHA1,
        &hex!("a9993e364706816aba3e25717850c26c9cd0d89d"),
    );

    /// value taken from: https://tools.ietf.org/html/rfc4634
    const SHA256_ABC: Hash = Hash::new(
        Algorithm::SHA256,
        &hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"),
    );
    /// value taken from: https://tools.ietf.org/html/rfc4634
    const SHA256_LONG: Hash = Hash::new(
        Algorithm::SHA256,
        &hex!("248d6a61d20638b8e5c026930c3e6039a33ce45964ff2167f6ecedd419db06c1"),
    );

    /// value taken from: https://tools.ietf.org/html/rfc4634
    const SHA512_ABC: Hash = Hash::new(
        Algorithm::SHA512,
        &hex!(
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        ),
    );

    #[rstest]
    #[case::md5(Algorithm::MD5, 16, 32, 26, 24)]
    #[case::sha1(Algorithm::SHA1, 20, 40, 32, 28)]
    #[case::sha256(Algorithm::SHA256, 32, 64, 52, 44)]
    #[case::sha512(Algorithm::SHA512, 64, 128, 103, 88)]
    fn algorithm_size(
        #[case] algorithm: Algorithm,
        #[case] size: usize,
        #[case] base16_len: usize,
        #[case] base32_len: usize,
        #[case] base64_len: usize,
    ) {
        assert_eq!(algorithm.size(), size, "mismatched size");
        assert_eq!(algorithm.base16_len(), base16_len, "mismatched base16_len");
        assert_eq!(algorithm.base32_len(), base32_len, "mismatched base32_len");
        assert_eq!(algorithm.base64_len(), base64_len, "mismatched base64_len");
    }

    #[rstest]
    #[case::md5("md5", Algorithm::MD5)]
    #[case::sha1("sha1", Algorithm::SHA1)]
    #[case::sha256("sha256", Algorithm::SHA256)]
    #[case::sha512("sha512", Algorithm::SHA512)]
    #[case::sha256_upper("SHA256", Algorithm::SHA256)]
    #[case::sha1_mixed("ShA1", Algorithm::SHA1)]
    fn algorithm_from_str(#[case] input: &str, #[case] expected: Algorithm) {
        let actual = input.parse().unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn unknown_algorithm() {
        assert_eq!(
            Err(UnknownAlgorithm("test".into())),
            "test".parse::<Algorithm>()
        );
    }

    #[rstest]
    #[case::md5_abc(&MD5_ABC, "abc")]
    #[case::sha1_abc(&SHA1_ABC, "abc")]
    #[case::sha256_abc(&SHA256_ABC, "abc")]
    #[case::sha256_long(&SHA256_LONG, "abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq")]
    #[case::sha512_abc(&SHA512_ABC, "abc")]
    fn test_digest(#[case] expected: &Hash, #[case] input: &str) {
        let actual = expected.algorithm().digest(input);
        assert_eq!(actual, *expected);
    }

    #[test]
    fn sha256_matches_hash() {
        let hash: Hash = Sha256::digest("abc").into();
        assert_eq!(hash, SHA256_ABC);
        assert_eq!(Sha256::try_from(SHA256_ABC), Ok(Sha256::digest("abc")));
        assert!(Sha256::try_from(SHA1_ABC).is_err());
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(
            format!("{SHA256_ABC:x}"),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            format!("{SHA256_ABC:#x}"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn serialize_json() {
        let json = serde_json::to_string(&SHA256_ABC).unwrap();
        assert_eq!(
            json,
            "\"sha256:1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s\""
        );
    }
}

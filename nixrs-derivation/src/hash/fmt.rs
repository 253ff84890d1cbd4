use std::fmt as sfmt;

use data_encoding::{BASE64, DecodeError, DecodeKind, HEXLOWER_PERMISSIVE};
use derive_more::Display;
use thiserror::Error;

use crate::base32;

use super::{Algorithm, Hash, InvalidHashError, LARGEST_ALGORITHM, UnknownAlgorithm};

#[derive(Display, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Encoding {
    #[display("hex")]
    Hex,
    #[display("nixbase32")]
    NixBase32,
    #[display("base64")]
    Base64,
}

#[derive(Display, Debug, PartialEq, Clone)]
pub enum ParseHashErrorKind {
    #[display("has {_0}")]
    Algorithm(UnknownAlgorithm),
    #[display("is not SRI")]
    NotSRI,
    #[display("should have type '{expected}' but got '{actual}'")]
    TypeMismatch {
        expected: Algorithm,
        actual: Algorithm,
    },
    #[display("does not include a type, nor is the type otherwise known from context")]
    MissingType,
    #[display("has {_1} when decoding as {_0}")]
    BadEncoding(Encoding, DecodeError),
    #[display("has wrong length for hash type '{_0}'")]
    WrongHashLength(Algorithm),
}

#[derive(Error, Debug, PartialEq, Clone)]
#[error("hash '{hash}' {kind}")]
pub struct ParseHashError {
    hash: String,
    kind: ParseHashErrorKind,
}

impl ParseHashError {
    pub(crate) fn new<S: Into<String>>(hash: S, kind: ParseHashErrorKind) -> Self {
        ParseHashError {
            kind,
            hash: hash.into(),
        }
    }

    pub fn kind(&self) -> &ParseHashErrorKind {
        &self.kind
    }
}

impl From<UnknownAlgorithm> for ParseHashErrorKind {
    fn from(value: UnknownAlgorithm) -> Self {
        Self::Algorithm(value)
    }
}

impl From<InvalidHashError> for ParseHashErrorKind {
    fn from(value: InvalidHashError) -> Self {
        Self::WrongHashLength(value.algorithm)
    }
}

fn decode_digest(
    rest: &str,
    algorithm: Algorithm,
    is_sri: bool,
) -> Result<Hash, ParseHashErrorKind> {
    let mut data = [0u8; LARGEST_ALGORITHM.size()];
    let input = rest.as_bytes();
    if !is_sri && input.len() == algorithm.base16_len() {
        HEXLOWER_PERMISSIVE
            .decode_mut(input, &mut data[..algorithm.size()])
            .map_err(|err| ParseHashErrorKind::BadEncoding(Encoding::Hex, err.error))?;
    } else if !is_sri && input.len() == algorithm.base32_len() {
        base32::decode_mut(input, &mut data[..algorithm.size()])
            .map_err(|err| ParseHashErrorKind::BadEncoding(Encoding::NixBase32, err.error))?;
    } else if is_sri || input.len() == algorithm.base64_len() {
        let mut buf = [0u8; LARGEST_ALGORITHM.base64_len()];
        let len = BASE64
            .decode_len(input.len())
            .map_err(|err| ParseHashErrorKind::BadEncoding(Encoding::Base64, err))?;
        if len > buf.len() {
            return Err(ParseHashErrorKind::WrongHashLength(algorithm));
        }
        let written = BASE64
            .decode_mut(input, &mut buf[..len])
            .map_err(|err| ParseHashErrorKind::BadEncoding(Encoding::Base64, err.error))?;
        if written != algorithm.size() {
            return Err(ParseHashErrorKind::BadEncoding(
                Encoding::Base64,
                DecodeError {
                    position: 0,
                    kind: DecodeKind::Length,
                },
            ));
        }
        data[..written].copy_from_slice(&buf[..written]);
    } else {
        return Err(ParseHashErrorKind::WrongHashLength(algorithm));
    }
    Ok(Hash::new(algorithm, &data[..algorithm.size()]))
}

impl Hash {
    /// Parse a hash that must carry its algorithm as `<type>:<digest>` or as a
    /// Subresource Integrity expression `<type>-<base64>`.
    pub fn parse_any_prefixed(s: &str) -> Result<Hash, ParseHashError> {
        Hash::parse_any(s, None)
    }

    /// Parse `[<type>:]<base16|base32|base64>` or `<type>-<base64>`.
    ///
    /// When the type prefix is missing `algorithm` decides how the digest is
    /// read. When both are present they have to agree.
    pub fn parse_any(s: &str, algorithm: Option<Algorithm>) -> Result<Hash, ParseHashError> {
        let parsed = if let Some((prefix, rest)) = s.split_once(':') {
            Some((prefix, rest, false))
        } else {
            s.split_once('-').map(|(prefix, rest)| (prefix, rest, true))
        };
        let res = match (parsed, algorithm) {
            (Some((prefix, rest, is_sri)), expected) => prefix
                .parse::<Algorithm>()
                .map_err(ParseHashErrorKind::from)
                .and_then(|actual| match expected {
                    Some(expected) if expected != actual => {
                        Err(ParseHashErrorKind::TypeMismatch { expected, actual })
                    }
                    _ => decode_digest(rest, actual, is_sri),
                }),
            (None, Some(algorithm)) => decode_digest(s, algorithm, false),
            (None, None) => Err(ParseHashErrorKind::MissingType),
        };
        res.map_err(|kind| ParseHashError::new(s, kind))
    }

    /// Parse a plain digest that must not have any prefix indicating the type.
    pub fn parse_non_sri_unprefixed(s: &str, algorithm: Algorithm) -> Result<Hash, ParseHashError> {
        decode_digest(s, algorithm, false).map_err(|kind| ParseHashError::new(s, kind))
    }

    /// Parse a Subresource Integrity hash expression `<type>-<base64>`.
    pub fn parse_sri(s: &str) -> Result<Hash, ParseHashError> {
        let (prefix, rest) = s
            .split_once('-')
            .ok_or_else(|| ParseHashError::new(s, ParseHashErrorKind::NotSRI))?;
        prefix
            .parse::<Algorithm>()
            .map_err(ParseHashErrorKind::from)
            .and_then(|algorithm| decode_digest(rest, algorithm, true))
            .map_err(|kind| ParseHashError::new(s, kind))
    }

    #[inline]
    pub fn as_base16(&self) -> Base16<'_> {
        Base16(self)
    }

    #[inline]
    pub fn as_base32(&self) -> Base32<'_> {
        Base32(self)
    }

    #[inline]
    pub fn as_base64(&self) -> Base64<'_> {
        Base64(self)
    }

    #[inline]
    pub fn as_sri(&self) -> Sri<'_> {
        Sri(self)
    }
}

/// Hex display, `{:#}` leaves out the algorithm prefix.
#[derive(Debug, Clone, Copy)]
pub struct Base16<'h>(&'h Hash);
impl sfmt::Display for Base16<'_> {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        if f.alternate() {
            write!(f, "{:#x}", self.0)
        } else {
            write!(f, "{:x}", self.0)
        }
    }
}

/// Nix base-32 display, `{:#}` leaves out the algorithm prefix.
#[derive(Debug, Clone, Copy)]
pub struct Base32<'h>(&'h Hash);
impl sfmt::Display for Base32<'_> {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        let mut buf = [0u8; LARGEST_ALGORITHM.base32_len()];
        let output = &mut buf[..self.0.algorithm().base32_len()];
        base32::encode_mut(self.0.as_ref(), output);

        // SAFETY: Nix Base32 is a subset of ASCII, which guarantees valid UTF-8.
        let s = unsafe { std::str::from_utf8_unchecked(output) };
        if f.alternate() {
            f.write_str(s)
        } else {
            write!(f, "{}:{}", self.0.algorithm(), s)
        }
    }
}

/// Base-64 display, `{:#}` leaves out the algorithm prefix.
#[derive(Debug, Clone, Copy)]
pub struct Base64<'h>(&'h Hash);
impl sfmt::Display for Base64<'_> {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        let mut buf = [0u8; LARGEST_ALGORITHM.base64_len()];
        let output = &mut buf[..self.0.algorithm().base64_len()];
        BASE64.encode_mut(self.0.as_ref(), output);

        // SAFETY: base64 is a subset of ASCII, which guarantees valid UTF-8.
        let s = unsafe { std::str::from_utf8_unchecked(output) };
        if f.alternate() {
            f.write_str(s)
        } else {
            write!(f, "{}:{}", self.0.algorithm(), s)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sri<'h>(&'h Hash);
impl sfmt::Display for Sri<'_> {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        write!(f, "{}-{:#}", self.0.algorithm(), self.0.as_base64())
    }
}

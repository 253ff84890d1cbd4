//! Nix flavoured base-32.
//!
//! Uses the alphabet `0123456789abcdfghijklmnpqrsvwxyz` (no `e`, `o`, `u`
//! or `t`) and emits the least significant bits first, reading the output
//! back to front.

use data_encoding::{DecodeError, DecodeKind, DecodePartial};

const BASE32_CHARS: [u8; 32] = *b"0123456789abcdfghijklmnpqrsvwxyz";
const BASE32_CHARS_REVERSE: [u8; 256] = {
    let mut ret = [0xFFu8; 256];
    let mut idx = 0u8;
    while idx < 32 {
        let ch = BASE32_CHARS[idx as usize];
        ret[ch as usize] = idx;
        idx += 1;
    }
    ret
};

/// Number of characters needed to encode `len` bytes.
pub const fn encode_len(len: usize) -> usize {
    (8 * len).div_ceil(5)
}

const fn decode_len_internal(len: usize) -> (usize, usize) {
    let trail = len * 5 % 8;
    (len - trail / 5, 5 * len / 8)
}

/// Number of bytes decoded from `len` characters.
///
/// Panics when `len` is not a length [`encode_len`] can produce.
pub const fn decode_len(len: usize) -> usize {
    let (ilen, olen) = decode_len_internal(len);
    if ilen != len {
        panic!("Invalid base32 length");
    }
    olen
}

/// Encode `input` into `output`, which must be exactly
/// [`encode_len`]`(input.len())` long.
pub fn encode_mut(input: &[u8], output: &mut [u8]) {
    assert_eq!(output.len(), encode_len(input.len()));
    input
        .chunks(5)
        .zip(output.rchunks_mut(8))
        .for_each(|(input, output)| {
            let mut x = 0u64;
            for (i, input) in input.iter().enumerate() {
                x |= u64::from(*input) << (8 * i);
            }
            for (i, output) in output.iter_mut().rev().enumerate() {
                let y = x >> (5 * i);
                *output = BASE32_CHARS[(y & 0x1f) as usize];
            }
        });
}

// Fails if there are non-zero trailing bits.
fn check_trail(input: &[u8]) -> Result<(), DecodePartial> {
    let trail = 5 * input.len() % 8;
    if trail == 0 {
        return Ok(());
    }
    let mut mask = (1 << trail) - 1;
    mask <<= 5 - trail;
    if BASE32_CHARS_REVERSE[input[0] as usize] & mask != 0 {
        fail(0, DecodeKind::Trailing)
    } else {
        Ok(())
    }
}

fn fail(pos: usize, kind: DecodeKind) -> Result<(), DecodePartial> {
    Err(DecodePartial {
        read: pos / 8 * 8,
        written: pos / 8 * 5,
        error: DecodeError {
            position: pos,
            kind,
        },
    })
}

/// Decode `input` into `output`, which must be exactly
/// [`decode_len`]`(input.len())` long.
pub fn decode_mut(input: &[u8], output: &mut [u8]) -> Result<(), DecodePartial> {
    assert_eq!(output.len(), decode_len(input.len()));
    let input_len = input.len();
    for ((chunk, input), output) in input.rchunks(8).enumerate().zip(output.chunks_mut(5)) {
        let mut x = 0u64;
        for j in 0..input.len() {
            let y = BASE32_CHARS_REVERSE[input[input.len() - j - 1] as usize];
            if y >= 1 << 5 {
                fail(input_len - (chunk * 8 + j) - 1, DecodeKind::Symbol)?;
            }
            x |= u64::from(y) << (5 * j);
        }
        for (j, output) in output.iter_mut().enumerate() {
            *output = (x >> (8 * j) & 0xff) as u8;
        }
    }
    check_trail(input)
}

/// Encode `input` into a newly allocated string.
pub fn encode_string(input: &[u8]) -> String {
    let mut output = vec![0u8; encode_len(input.len())];
    encode_mut(input, &mut output);
    // SAFETY: Nix Base32 is a subset of ASCII, which guarantees valid UTF-8.
    unsafe { String::from_utf8_unchecked(output) }
}

#[cfg(test)]
mod unittests {
    use hex_literal::hex;
    use proptest::{prop_assert_eq, proptest};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty("", &[])]
    #[case::one_0("00", &hex!("00"))]
    #[case::one_1f("0z", &hex!("1f"))]
    #[case::one_2f("1g", &hex!("2f"))]
    #[case::two("0bqz", &hex!("1f2f"))]
    #[case::three("gy003", &hex!("0300 FF"))]
    #[case::five("aqs14005", &hex!("0500 1234 56"))]
    #[case::nine("3gbr6kqaqs14009", &hex!("0900 1234 5678 9ABC DE"))]
    #[case::store_path_hash("x0xf8v9fxf3jk8zln1cwlsrmhqvp0f88", &hex!("0839 7037 8635 6bca 59b0 f4a3 2987 eb2e 6de4 3ae8"))]
    #[case::sha256_abc("1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s", &hex!("ba78 16bf 8f01 cfea 4141 40de 5dae 2223 b003 61a3 9617 7a9c b410 ff61 f200 15ad"))]
    fn encode_decode_vectors(#[case] encoded: &str, #[case] data: &[u8]) {
        assert_eq!(encode_string(data), encoded);

        let mut output = vec![0u8; decode_len(encoded.len())];
        decode_mut(encoded.as_bytes(), &mut output).unwrap();
        assert_eq!(output, data);
    }

    #[rstest]
    #[case::invalid_trailer_1("zz", fail(0, DecodeKind::Trailing))]
    #[case::invalid_trailer_2("c0", fail(0, DecodeKind::Trailing))]
    #[case::invalid_char_0("|czz0", fail(0, DecodeKind::Symbol))]
    #[case::invalid_char_4("czz0|", fail(4, DecodeKind::Symbol))]
    #[case::excluded_letter("czze0", fail(3, DecodeKind::Symbol))]
    #[case::invalid_char_chunk_2("c|zzzzzzzzz0", fail(1, DecodeKind::Symbol))]
    fn decode_errors(#[case] data: &str, #[case] expected: Result<(), DecodePartial>) {
        let mut output = vec![0u8; decode_len(data.len())];
        assert_eq!(decode_mut(data.as_bytes(), &mut output), expected);
    }

    proptest! {
        #[test]
        fn proptest_roundtrip(data: Vec<u8>) {
            let encoded = encode_string(&data);
            let mut decoded = vec![0u8; decode_len(encoded.len())];
            decode_mut(encoded.as_bytes(), &mut decoded).unwrap();
            prop_assert_eq!(data, decoded);
        }
    }
}

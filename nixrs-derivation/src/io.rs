//! Nix wire framing over tokio readers and writers.
//!
//! Integers are u64 little endian. Strings are their length followed by the
//! bytes and zero padding up to a multiple of 8. Collections are their
//! element count followed by the elements.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const ZEROS: [u8; 8] = [0u8; 8];

pub const fn calc_aligned(len: u64) -> u64 {
    len.wrapping_add(7) & !7
}

pub const fn calc_padding(len: u64) -> usize {
    let aligned = calc_aligned(len);
    aligned.wrapping_sub(len) as usize
}

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

pub trait AsyncSource {
    fn read_usize(&mut self) -> impl Future<Output = io::Result<usize>> + Send;
    fn read_padding(&mut self, size: u64) -> impl Future<Output = io::Result<()>> + Send;
    fn read_string(&mut self) -> impl Future<Output = io::Result<String>> + Send;
    fn read_string_coll<C>(&mut self) -> impl Future<Output = io::Result<C>> + Send
    where
        C: FromIterator<String> + Send;
}

impl<R> AsyncSource for R
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    fn read_usize(&mut self) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            let value = self.read_u64_le().await?;
            usize::try_from(value).map_err(invalid_data)
        }
    }

    fn read_padding(&mut self, size: u64) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            let padding = calc_padding(size);
            if padding > 0 {
                let mut buf = [0u8; 8];
                self.read_exact(&mut buf[..padding]).await?;
                if buf.iter().any(|b| *b != 0) {
                    return Err(invalid_data("non-zero padding"));
                }
            }
            Ok(())
        }
    }

    fn read_string(&mut self) -> impl Future<Output = io::Result<String>> + Send {
        async move {
            let len = self.read_u64_le().await?;
            let mut buf = Vec::new();
            let read = (&mut *self).take(len).read_to_end(&mut buf).await?;
            if (read as u64) < len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "string is truncated",
                ));
            }
            self.read_padding(len).await?;
            String::from_utf8(buf).map_err(invalid_data)
        }
    }

    fn read_string_coll<C>(&mut self) -> impl Future<Output = io::Result<C>> + Send
    where
        C: FromIterator<String> + Send,
    {
        async move {
            let count = self.read_usize().await?;
            let mut items = Vec::new();
            for _ in 0..count {
                items.push(self.read_string().await?);
            }
            Ok(items.into_iter().collect())
        }
    }
}

pub trait AsyncSink {
    fn write_usize(&mut self, value: usize) -> impl Future<Output = io::Result<()>> + Send;
    fn write_string(&mut self, s: &str) -> impl Future<Output = io::Result<()>> + Send;
    fn write_string_coll<I>(&mut self, coll: I) -> impl Future<Output = io::Result<()>> + Send
    where
        I: IntoIterator + Send,
        I::IntoIter: ExactSizeIterator + Send,
        I::Item: AsRef<str> + Send;
}

impl<W> AsyncSink for W
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    fn write_usize(&mut self, value: usize) -> impl Future<Output = io::Result<()>> + Send {
        self.write_u64_le(value as u64)
    }

    fn write_string(&mut self, s: &str) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            let len = s.len() as u64;
            self.write_u64_le(len).await?;
            self.write_all(s.as_bytes()).await?;
            let padding = calc_padding(len);
            if padding > 0 {
                self.write_all(&ZEROS[..padding]).await?;
            }
            Ok(())
        }
    }

    fn write_string_coll<I>(&mut self, coll: I) -> impl Future<Output = io::Result<()>> + Send
    where
        I: IntoIterator + Send,
        I::IntoIter: ExactSizeIterator + Send,
        I::Item: AsRef<str> + Send,
    {
        async move {
            let it = coll.into_iter();
            self.write_usize(it.len()).await?;
            for item in it {
                self.write_string(item.as_ref()).await?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod unittests {
    use std::collections::BTreeSet;

    use hex_literal::hex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty("", &hex!("0000 0000 0000 0000"))]
    #[case::one("a", &hex!("0100 0000 0000 0000 6100 0000 0000 0000"))]
    #[case::three("abc", &hex!("0300 0000 0000 0000 6162 6300 0000 0000"))]
    #[case::aligned("12345678", &hex!("0800 0000 0000 0000 3132 3334 3536 3738"))]
    #[tokio::test]
    async fn string_framing(#[case] value: &str, #[case] bytes: &[u8]) {
        let mut buf = Vec::new();
        buf.write_string(value).await.unwrap();
        assert_eq!(buf, bytes);

        let mut source = bytes;
        assert_eq!(source.read_string().await.unwrap(), value);
        assert!(source.is_empty());
    }

    #[tokio::test]
    async fn string_collection() {
        let mut buf = Vec::new();
        buf.write_string_coll(["b", "a"]).await.unwrap();
        assert_eq!(
            buf,
            hex!("0200 0000 0000 0000 0100 0000 0000 0000 6200 0000 0000 0000 0100 0000 0000 0000 6100 0000 0000 0000")
        );
        let mut source = &buf[..];
        let read: BTreeSet<String> = source.read_string_coll().await.unwrap();
        assert_eq!(read, BTreeSet::from(["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn bad_padding() {
        let bytes = hex!("0100 0000 0000 0000 6100 0000 0000 0001");
        let mut source = &bytes[..];
        let err = source.read_string().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated_string() {
        let bytes = hex!("1000 0000 0000 0000 6162 63");
        let mut source = &bytes[..];
        let err = source.read_string().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn padding() {
        assert_eq!(calc_padding(0), 0);
        assert_eq!(calc_padding(1), 7);
        assert_eq!(calc_padding(8), 0);
        assert_eq!(calc_padding(13), 3);
        assert_eq!(calc_aligned(13), 16);
    }
}

//! Length-prefixed big-integer codec used by the handshake.
//!
//! Wire form: a 4-byte little-endian unsigned length `nB`, followed by the
//! `nB` little-endian magnitude bytes of the integer. Zero encodes as a
//! single zero byte. Reads refuse lengths above [`MAX_INT_BYTES`] so a
//! hostile peer cannot make us allocate unbounded memory.

use num_bigint::BigUint;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ChannelError;

/// Upper bound on a serialized integer's magnitude, in bytes.
pub const MAX_INT_BYTES: usize = 1024;

/// Write one length-prefixed integer. `write_all` retries transient
/// interruptions and partial transfers, so the encoding never lands short.
pub async fn write_uint<W>(writer: &mut W, x: &BigUint) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin + Send,
{
    // to_bytes_le() yields [0] for zero, so the length is never 0.
    let bytes = x.to_bytes_le();
    writer.write_all(&(bytes.len() as u32).to_le_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed integer, failing with `OversizedInteger` if the
/// announced length exceeds [`MAX_INT_BYTES`].
pub async fn read_uint<R>(reader: &mut R) -> Result<BigUint, ChannelError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut lenb = [0u8; 4];
    reader.read_exact(&mut lenb).await?;
    let len = u32::from_le_bytes(lenb) as usize;

    if len > MAX_INT_BYTES {
        return Err(ChannelError::OversizedInteger(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(BigUint::from_bytes_le(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Zero;

    async fn roundtrip(x: &BigUint) -> BigUint {
        let mut buf = Vec::new();
        write_uint(&mut buf, x).await.unwrap();
        read_uint(&mut buf.as_slice()).await.unwrap()
    }

    #[tokio::test]
    async fn roundtrips_small_and_large_values() {
        for x in [
            BigUint::from(1u32),
            BigUint::from(255u32),
            BigUint::from(256u32),
            BigUint::from(u64::MAX),
            BigUint::from_bytes_le(&[0xab; 300]),
        ] {
            assert_eq!(roundtrip(&x).await, x);
        }
    }

    #[tokio::test]
    async fn zero_encodes_as_one_zero_byte() {
        let mut buf = Vec::new();
        write_uint(&mut buf, &BigUint::zero()).await.unwrap();
        assert_eq!(buf, vec![1, 0, 0, 0, 0]);
        assert!(roundtrip(&BigUint::zero()).await.is_zero());
    }

    #[tokio::test]
    async fn maximum_length_is_accepted() {
        let x = BigUint::from_bytes_le(&[0xff; MAX_INT_BYTES]);
        assert_eq!(roundtrip(&x).await, x);
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_INT_BYTES as u32) + 1).to_le_bytes());
        buf.extend_from_slice(&[0u8; MAX_INT_BYTES + 1]);
        let err = read_uint(&mut buf.as_slice()).await.unwrap_err();
        assert!(matches!(err, ChannelError::OversizedInteger(n) if n == MAX_INT_BYTES + 1));
    }

    #[tokio::test]
    async fn truncated_stream_is_an_io_error() {
        let mut buf = Vec::new();
        write_uint(&mut buf, &BigUint::from(u64::MAX)).await.unwrap();
        buf.truncate(buf.len() - 3);
        let err = read_uint(&mut buf.as_slice()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Io(_)));
    }
}

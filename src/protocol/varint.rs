// (c) 2024 Ross Younger

//! QUIC variable-length integers
//!
//! The encoding is the one defined in [RFC 9000 section 16](https://www.rfc-editor.org/rfc/rfc9000#section-16):
//! the two most significant bits of the first byte give the encoded length (1, 2, 4 or 8 bytes),
//! the remaining bits hold the value in network byte order.

use bytes::{Buf, BufMut};
use tokio::io::{AsyncRead, AsyncReadExt as _};

/// Largest value that can be encoded
pub const MAX: u64 = (1 << 62) - 1;

/// Errors that can arise when handling variable-length integers
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VarIntError {
    /// The value does not fit in 62 bits
    #[error("value {0} is too large for a variable-length integer")]
    Overflow(u64),
    /// The buffer ended part way through an integer
    #[error("buffer ended inside a variable-length integer")]
    UnexpectedEnd,
}

/// Number of bytes needed to encode `value`
pub fn encoded_len(value: u64) -> Result<usize, VarIntError> {
    if value < (1 << 6) {
        Ok(1)
    } else if value < (1 << 14) {
        Ok(2)
    } else if value < (1 << 30) {
        Ok(4)
    } else if value <= MAX {
        Ok(8)
    } else {
        Err(VarIntError::Overflow(value))
    }
}

/// Appends the minimal encoding of `value` to `buf`
#[allow(clippy::cast_possible_truncation)] // each arm is range checked by encoded_len
pub fn encode<B: BufMut>(value: u64, buf: &mut B) -> Result<(), VarIntError> {
    match encoded_len(value)? {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16(0x4000 | value as u16),
        4 => buf.put_u32(0x8000_0000 | value as u32),
        _ => buf.put_u64(0xc000_0000_0000_0000 | value),
    }
    Ok(())
}

/// Decodes an integer from the front of `buf`, advancing it.
///
/// Non-minimal encodings are accepted.
pub fn decode<B: Buf>(buf: &mut B) -> Result<u64, VarIntError> {
    if !buf.has_remaining() {
        return Err(VarIntError::UnexpectedEnd);
    }
    let len = 1usize << (buf.chunk()[0] >> 6);
    if buf.remaining() < len {
        return Err(VarIntError::UnexpectedEnd);
    }
    Ok(match len {
        1 => u64::from(buf.get_u8() & 0x3f),
        2 => u64::from(buf.get_u16() & 0x3fff),
        4 => u64::from(buf.get_u32() & 0x3fff_ffff),
        _ => buf.get_u64() & MAX,
    })
}

/// Reads a single integer from an async reader.
///
/// End of stream part way through is reported as [`std::io::ErrorKind::UnexpectedEof`].
pub async fn read<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> std::io::Result<u64> {
    let first = reader.read_u8().await?;
    let len = 1usize << (first >> 6);
    let mut bytes = [0u8; 8];
    bytes[0] = first & 0x3f;
    let _ = reader.read_exact(&mut bytes[1..len]).await?;
    Ok(bytes[..len]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

#[cfg(test)]
mod test {
    use super::{MAX, VarIntError, decode, encode, encoded_len, read};
    use pretty_assertions::assert_eq;

    fn encoded(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode(value, &mut buf).unwrap();
        buf
    }

    #[test]
    fn length_boundaries() {
        for (value, len) in [
            (0, 1),
            (63, 1),
            (64, 2),
            (16383, 2),
            (16384, 4),
            ((1 << 30) - 1, 4),
            (1 << 30, 8),
            (MAX, 8),
        ] {
            assert_eq!(encoded_len(value), Ok(len), "value {value}");
            assert_eq!(encoded(value).len(), len, "value {value}");
        }
        assert_eq!(encoded_len(MAX + 1), Err(VarIntError::Overflow(MAX + 1)));
        assert_eq!(
            encode(u64::MAX, &mut Vec::new()),
            Err(VarIntError::Overflow(u64::MAX))
        );
    }

    #[test]
    fn rfc9000_sample_values() {
        // RFC 9000 appendix A.1
        let samples: [(&[u8], u64); 5] = [
            (
                &[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c],
                151_288_809_941_952_652,
            ),
            (&[0x9d, 0x7f, 0x3e, 0x7d], 494_878_333),
            (&[0x7b, 0xbd], 15293),
            (&[0x25], 37),
            (&[0x40, 0x25], 37),
        ];
        for (mut wire, value) in samples {
            assert_eq!(decode(&mut wire), Ok(value));
            assert!(wire.is_empty());
        }
        assert_eq!(encoded(15293), vec![0x7b, 0xbd]);
    }

    #[test]
    fn webtransport_signal_encoding() {
        assert_eq!(encoded(0x41), vec![0x40, 0x41]);
    }

    #[test]
    fn truncated_input() {
        let mut empty: &[u8] = &[];
        assert_eq!(decode(&mut empty), Err(VarIntError::UnexpectedEnd));
        let mut short: &[u8] = &[0x9d, 0x7f];
        assert_eq!(decode(&mut short), Err(VarIntError::UnexpectedEnd));
    }

    #[tokio::test]
    async fn async_read() {
        let mut wire: &[u8] = &[0x40, 0x41, 0x9d, 0x7f, 0x3e, 0x7d, 0x7b];
        assert_eq!(read(&mut wire).await.unwrap(), 0x41);
        assert_eq!(read(&mut wire).await.unwrap(), 494_878_333);
        let err = read(&mut wire).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}

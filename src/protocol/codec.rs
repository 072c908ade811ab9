//! Protocol codec for the primitive wire types
//!
//! VarInt and VarLong carry 7 data bits per byte, least significant group
//! first, with bit 7 set on every byte except the last. Strings are a VarInt
//! byte length followed by the UTF-8 bytes.
//!
//! Decoders read from any `AsyncRead` supplied by the caller. Encoders append
//! to an in-memory buffer that the caller writes out in one piece.

use bytes::{BufMut, BytesMut};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest packet body accepted (the largest 3-byte VarInt)
pub const MAX_PACKET_LENGTH: usize = 2_097_151;

const VARINT_MAX_BYTES: usize = 5;
const VARLONG_MAX_BYTES: usize = 10;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("VarInt is too big (more than 5 bytes)")]
    MalformedVarInt,

    #[error("VarLong is too big (more than 10 bytes)")]
    MalformedVarLong,

    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Truncated string: expected {expected} bytes, got {actual}")]
    TruncatedString { expected: usize, actual: usize },

    #[error("Negative string length: {0}")]
    NegativeLength(i32),

    #[error("Invalid packet length: {0}")]
    InvalidPacketLength(i32),

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            CodecError::UnexpectedEof
        } else {
            CodecError::Io(err)
        }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Read a VarInt, one byte at a time
pub async fn read_varint<R>(reader: &mut R) -> CodecResult<i32>
where
    R: AsyncRead + Unpin,
{
    let mut value: u32 = 0;

    for i in 0..VARINT_MAX_BYTES {
        let byte = reader.read_u8().await?;
        value |= ((byte & SEGMENT_BITS) as u32) << (7 * i);

        if byte & CONTINUE_BIT == 0 {
            return Ok(value as i32);
        }
    }

    Err(CodecError::MalformedVarInt)
}

/// Read a VarLong, one byte at a time
pub async fn read_varlong<R>(reader: &mut R) -> CodecResult<i64>
where
    R: AsyncRead + Unpin,
{
    let mut value: u64 = 0;

    for i in 0..VARLONG_MAX_BYTES {
        let byte = reader.read_u8().await?;
        value |= ((byte & SEGMENT_BITS) as u64) << (7 * i);

        if byte & CONTINUE_BIT == 0 {
            return Ok(value as i64);
        }
    }

    Err(CodecError::MalformedVarLong)
}

/// Append a VarInt to the buffer
pub fn write_varint<B: BufMut>(value: i32, buf: &mut B) {
    // Shift as unsigned so negative values terminate after 5 bytes
    let mut value = value as u32;

    loop {
        if value & !(SEGMENT_BITS as u32) == 0 {
            buf.put_u8(value as u8);
            return;
        }

        buf.put_u8((value as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        value >>= 7;
    }
}

/// Append a VarLong to the buffer
pub fn write_varlong<B: BufMut>(value: i64, buf: &mut B) {
    let mut value = value as u64;

    loop {
        if value & !(SEGMENT_BITS as u64) == 0 {
            buf.put_u8(value as u8);
            return;
        }

        buf.put_u8((value as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        value >>= 7;
    }
}

/// Number of bytes `write_varint` emits for `value`
pub fn varint_len(value: i32) -> usize {
    match value as u32 {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    }
}

/// Read a length-prefixed string
///
/// Invalid UTF-8 is replaced with U+FFFD rather than rejected.
pub async fn read_string<R>(reader: &mut R) -> CodecResult<String>
where
    R: AsyncRead + Unpin,
{
    let length = read_varint(reader).await?;
    let expected = usize::try_from(length).map_err(|_| CodecError::NegativeLength(length))?;

    let mut bytes = Vec::new();
    (&mut *reader)
        .take(expected as u64)
        .read_to_end(&mut bytes)
        .await?;

    if bytes.len() < expected {
        return Err(CodecError::TruncatedString {
            expected,
            actual: bytes.len(),
        });
    }

    Ok(match String::from_utf8(bytes) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

/// Append a length-prefixed string to the buffer
pub fn write_string<B: BufMut>(value: &str, buf: &mut B) {
    write_varint(value.len() as i32, buf);
    buf.put_slice(value.as_bytes());
}

/// Append a complete frame: `length | id | payload`
pub fn write_packet(id: i32, payload: &[u8], buf: &mut BytesMut) {
    let length = varint_len(id) + payload.len();

    buf.reserve(varint_len(length as i32) + length);
    write_varint(length as i32, buf);
    write_varint(id, buf);
    buf.put_slice(payload);
}

/// Read one frame body (packet id + payload) using its declared length
///
/// Returns `Ok(None)` if the stream ends cleanly before the next frame.
pub async fn read_frame<R>(reader: &mut R, max_length: usize) -> CodecResult<Option<BytesMut>>
where
    R: AsyncRead + Unpin,
{
    let first = match reader.read_u8().await {
        Ok(byte) => byte,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let length = if first & CONTINUE_BIT == 0 {
        first as i32
    } else {
        let head = [first];
        let mut chained = (&head[..]).chain(&mut *reader);
        read_varint(&mut chained).await?
    };

    let length = usize::try_from(length)
        .ok()
        .filter(|len| *len <= max_length)
        .ok_or(CodecError::InvalidPacketLength(length))?;

    let mut body = BytesMut::zeroed(length);
    reader.read_exact(&mut body).await?;

    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_varint(value: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(value, &mut buf);
        buf
    }

    fn encode_varlong(value: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varlong(value, &mut buf);
        buf
    }

    #[tokio::test]
    async fn test_varint_roundtrip() {
        let values = [0, 1, 127, 128, 255, 25565, 2_097_151, i32::MAX, -1, i32::MIN];

        for value in values {
            let bytes = encode_varint(value);
            let decoded = read_varint(&mut &bytes[..]).await.unwrap();
            assert_eq!(decoded, value);
            assert_eq!(bytes.len(), varint_len(value), "length of {}", value);
        }
    }

    #[test]
    fn test_varint_known_encodings() {
        assert_eq!(encode_varint(0), [0x00]);
        assert_eq!(encode_varint(300), [0xAC, 0x02]);
        assert_eq!(encode_varint(25565), [0xDD, 0xC7, 0x01]);
        assert_eq!(encode_varint(i32::MAX), [0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(encode_varint(-1), [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(encode_varint(i32::MIN), [0x80, 0x80, 0x80, 0x80, 0x08]);
    }

    #[test]
    fn test_varint_byte_lengths() {
        assert_eq!(encode_varint(0).len(), 1);
        assert_eq!(encode_varint(127).len(), 1);
        assert_eq!(encode_varint(128).len(), 2);
        assert_eq!(encode_varint(16383).len(), 2);
        assert_eq!(encode_varint(16384).len(), 3);
        assert_eq!(encode_varint(i32::MAX).len(), 5);
        assert_eq!(encode_varint(-1).len(), 5);
    }

    #[tokio::test]
    async fn test_varlong_roundtrip() {
        let values = [0, 1, 127, 128, 2_147_483_648, i64::MAX, -1, i64::MIN];

        for value in values {
            let bytes = encode_varlong(value);
            let decoded = read_varlong(&mut &bytes[..]).await.unwrap();
            assert_eq!(decoded, value);
        }

        assert_eq!(encode_varlong(-1).len(), 10);
        assert_eq!(encode_varlong(i64::MIN).len(), 10);
        assert_eq!(encode_varlong(i64::MAX).len(), 9);
    }

    #[tokio::test]
    async fn test_varint_overflow_rejected() {
        let bytes = [0x80u8; 5];
        let err = read_varint(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(err, CodecError::MalformedVarInt));

        // Trailing bytes must not be consumed past the limit
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut reader = &bytes[..];
        assert!(matches!(
            read_varint(&mut reader).await,
            Err(CodecError::MalformedVarInt)
        ));
        assert_eq!(reader, &[0x01]);
    }

    #[tokio::test]
    async fn test_varlong_overflow_rejected() {
        let bytes = [0xFFu8; 10];
        let err = read_varlong(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(err, CodecError::MalformedVarLong));
    }

    #[tokio::test]
    async fn test_varint_eof() {
        let err = read_varint(&mut &[0x80u8, 0x80][..]).await.unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof));

        let err = read_varint(&mut &[0u8; 0][..]).await.unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_string_roundtrip() {
        let long = "a".repeat(300);

        for value in ["", "localhost", "héllo ✓ 日本語", long.as_str()] {
            let mut buf = BytesMut::new();
            write_string(value, &mut buf);

            let mut reader = &buf[..];
            let decoded = read_string(&mut reader).await.unwrap();
            assert_eq!(decoded, value);
            assert!(reader.is_empty());
        }
    }

    #[tokio::test]
    async fn test_string_prefix_counts_bytes() {
        let mut buf = BytesMut::new();
        write_string("✓", &mut buf);
        assert_eq!(&buf[..], &[0x03, 0xE2, 0x9C, 0x93]);
    }

    #[tokio::test]
    async fn test_truncated_string() {
        let bytes = [0x05, b'a', b'b'];
        let err = read_string(&mut &bytes[..]).await.unwrap_err();

        match err {
            CodecError::TruncatedString { expected, actual } => {
                assert_eq!(expected, 5);
                assert_eq!(actual, 2);
            }
            other => panic!("Wrong error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_negative_string_length() {
        let bytes = encode_varint(-1);
        let err = read_string(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(err, CodecError::NegativeLength(-1)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let bytes = [0x03, b'o', 0xFF, b'k'];
        let decoded = read_string(&mut &bytes[..]).await.unwrap();
        assert_eq!(decoded, "o\u{FFFD}k");
    }

    #[test]
    fn test_write_packet() {
        let mut buf = BytesMut::new();
        write_packet(0x01, &0x1122334455667788i64.to_be_bytes(), &mut buf);

        assert_eq!(
            &buf[..],
            &[0x09, 0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
        );
    }

    #[tokio::test]
    async fn test_read_frame() {
        let mut wire = BytesMut::new();
        write_packet(0x00, &[], &mut wire);
        write_packet(0x01, &[0xAA; 200], &mut wire);

        let mut reader = &wire[..];
        let first = read_frame(&mut reader, MAX_PACKET_LENGTH).await.unwrap().unwrap();
        assert_eq!(&first[..], &[0x00]);

        let second = read_frame(&mut reader, MAX_PACKET_LENGTH).await.unwrap().unwrap();
        assert_eq!(second.len(), 201);
        assert_eq!(second[0], 0x01);

        assert!(read_frame(&mut reader, MAX_PACKET_LENGTH).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_bad_length() {
        let bytes = encode_varint(-5);
        let err = read_frame(&mut &bytes[..], MAX_PACKET_LENGTH).await.unwrap_err();
        assert!(matches!(err, CodecError::InvalidPacketLength(-5)));

        let bytes = encode_varint(64);
        let err = read_frame(&mut &bytes[..], 16).await.unwrap_err();
        assert!(matches!(err, CodecError::InvalidPacketLength(64)));
    }

    #[tokio::test]
    async fn test_read_frame_truncated() {
        let err = read_frame(&mut &[0x80u8][..], MAX_PACKET_LENGTH).await.unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof));

        let err = read_frame(&mut &[0x04u8, 0x00][..], MAX_PACKET_LENGTH).await.unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof));
    }
}

//! Wire framing for the two transports browserd speaks.
//!
//! Local clients and the extension channel speak line-delimited JSON: one
//! UTF-8 JSON object per line. Host-messaging query mode speaks
//! length-prefixed JSON: a 4-byte little-endian length followed by exactly
//! that many UTF-8 JSON bytes. Both framings share one invariant: a
//! malformed frame never panics the caller, it produces a [`CodecError`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected rather than buffered without bound.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame exceeds {MAX_FRAME_BYTES} byte limit ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("invalid utf-8 in frame")]
    InvalidUtf8,
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("peer closed the connection")]
    Eof,
}

/// Read one line-delimited JSON frame, deserializing it as `T`.
///
/// Returns `Ok(None)` on clean EOF (no bytes read before the stream closed).
pub async fn read_line_frame<R, T>(reader: &mut R) -> Result<Option<T>, CodecError>
where
    R: AsyncBufReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    if trimmed.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(trimmed.len()));
    }
    let value = serde_json::from_str(trimmed)?;
    Ok(Some(value))
}

/// Write one line-delimited JSON frame.
pub async fn write_line_frame<W, T>(writer: &mut W, value: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = serde_json::to_vec(value)?;
    if encoded.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(encoded.len()));
    }
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON frame (4-byte little-endian length, then
/// that many UTF-8 JSON bytes), deserializing it as `T`.
///
/// Returns `Ok(None)` on clean EOF before any header bytes arrive.
pub async fn read_len_prefixed_frame<R, T>(reader: &mut R) -> Result<Option<T>, CodecError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut payload).await?;
    }
    let text = std::str::from_utf8(&payload).map_err(|_| CodecError::InvalidUtf8)?;
    let value = serde_json::from_str(text)?;
    Ok(Some(value))
}

/// Write one length-prefixed JSON frame.
pub async fn write_len_prefixed_frame<W, T>(writer: &mut W, value: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = serde_json::to_vec(value)?;
    if encoded.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(encoded.len()));
    }
    let len = encoded.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tokio::io::BufReader;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        ok: bool,
    }

    #[tokio::test]
    async fn line_frame_round_trip() {
        let mut buf = Vec::new();
        write_line_frame(&mut buf, &Ping { ok: true }).await.unwrap();
        assert_eq!(buf.last(), Some(&b'\n'));

        let mut reader = BufReader::new(buf.as_slice());
        let decoded: Ping = read_line_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, Ping { ok: true });
    }

    #[tokio::test]
    async fn line_frame_eof_returns_none() {
        let mut reader = BufReader::new(&[][..]);
        let decoded: Option<Ping> = read_line_frame(&mut reader).await.unwrap();
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn line_frame_invalid_json_is_typed_error() {
        let mut reader = BufReader::new(b"{not json}\n".as_slice());
        let result: Result<Option<Ping>, _> = read_line_frame(&mut reader).await;
        assert!(matches!(result, Err(CodecError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn len_prefixed_round_trip() {
        let mut buf = Vec::new();
        write_len_prefixed_frame(&mut buf, &Ping { ok: false })
            .await
            .unwrap();

        let mut cursor = buf.as_slice();
        let decoded: Ping = read_len_prefixed_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(decoded, Ping { ok: false });
    }

    #[tokio::test]
    async fn len_prefixed_eof_returns_none() {
        let mut cursor: &[u8] = &[];
        let decoded: Option<Ping> = read_len_prefixed_frame(&mut cursor).await.unwrap();
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn len_prefixed_rejects_oversized_frame() {
        let mut buf = Vec::new();
        let len = (MAX_FRAME_BYTES as u32) + 1;
        buf.extend_from_slice(&len.to_le_bytes());
        let mut cursor = buf.as_slice();
        let result: Result<Option<Ping>, _> = read_len_prefixed_frame(&mut cursor).await;
        assert!(matches!(result, Err(CodecError::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn multiple_line_frames_in_sequence() {
        let mut buf = Vec::new();
        write_line_frame(&mut buf, &Ping { ok: true }).await.unwrap();
        write_line_frame(&mut buf, &Ping { ok: false }).await.unwrap();

        let mut reader = BufReader::new(buf.as_slice());
        let first: Ping = read_line_frame(&mut reader).await.unwrap().unwrap();
        let second: Ping = read_line_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, Ping { ok: true });
        assert_eq!(second, Ping { ok: false });
    }
}

//! Content-Length framing codec
//!
//! Reads and writes length-prefixed JSON-RPC messages over a pair of byte
//! streams. A frame is a block of ASCII `Name: Value` header lines separated
//! by CRLF, terminated by an empty CRLF line, followed by exactly
//! `Content-Length` bytes of UTF-8 JSON:
//!
//! ```text
//! Content-Length: <N>\r\n
//! \r\n
//! <N bytes of UTF-8 JSON>
//! ```
//!
//! Only `Content-Length` is required; other headers are tolerated and
//! ignored. Header names are matched case-insensitively on read and written
//! exactly as `Content-Length`.
//!
//! The send loop is the single writer of the output stream, so each
//! [`write_message`] call is atomic with respect to other messages.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{LspLinkError, Result};
use crate::types::OutboundMessage;

/// Read one framed message and return its payload as a JSON string.
///
/// # Errors
///
/// Returns [`LspLinkError::TransportClosed`] when the stream ends at a frame
/// boundary or inside the header block, and [`LspLinkError::BadFrame`] when
/// `Content-Length` is missing or non-integer, when the payload is truncated,
/// or when the payload is not valid UTF-8.
pub async fn read_message<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let header_block = read_header_block(reader).await?;
    let headers = parse_headers(&header_block);

    let length = headers
        .get("content-length")
        .ok_or_else(|| LspLinkError::BadFrame("missing Content-Length header".to_string()))?;
    let length: usize = length.parse().map_err(|_| {
        LspLinkError::BadFrame(format!("non-integer Content-Length: {length:?}"))
    })?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await.map_err(|e| {
        LspLinkError::BadFrame(format!("truncated payload (expected {length} bytes): {e}"))
    })?;

    let text = String::from_utf8(payload)
        .map_err(|_| LspLinkError::BadFrame("payload is not valid UTF-8".to_string()))?;
    Ok(text)
}

/// Serialize `message` and write it as one frame, then flush.
///
/// # Errors
///
/// Returns [`LspLinkError::Serialization`] if the envelope cannot be
/// serialized and [`LspLinkError::Io`] on write failure.
pub async fn write_message<W>(writer: &mut W, message: &OutboundMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_string(message).map_err(LspLinkError::Serialization)?;
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());

    writer
        .write_all(header.as_bytes())
        .await
        .map_err(LspLinkError::Io)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(LspLinkError::Io)?;
    writer.flush().await.map_err(LspLinkError::Io)?;
    Ok(())
}

/// Accumulate bytes until the CRLFCRLF terminator and return the header
/// block without the terminator.
async fn read_header_block<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut block: Vec<u8> = Vec::with_capacity(64);
    let mut byte = [0u8; 1];

    loop {
        let n = reader.read(&mut byte).await.map_err(LspLinkError::Io)?;
        if n == 0 {
            if block.is_empty() {
                return Err(
                    LspLinkError::TransportClosed("stream ended between frames".to_string())
                        .into(),
                );
            }
            return Err(LspLinkError::TransportClosed(
                "stream ended inside a header block".to_string(),
            )
            .into());
        }

        block.push(byte[0]);
        if block.ends_with(b"\r\n\r\n") {
            block.truncate(block.len() - 4);
            return Ok(block);
        }
    }
}

/// Parse a header block into a lowercase-name → value map.
///
/// Lines are split on the first `:` only; whitespace is trimmed on both
/// sides; lines without a `:` are skipped.
fn parse_headers(block: &[u8]) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let text = String::from_utf8_lossy(block);

    for line in text.split("\r\n") {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(
            name.trim().to_ascii_lowercase(),
            value.trim().to_string(),
        );
    }

    headers
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JsonRpcMessage;
    use std::io::Cursor;

    fn frame(payload: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", payload.len(), payload).into_bytes()
    }

    #[tokio::test]
    async fn test_read_message_basic_frame() {
        let mut input = Cursor::new(frame(r#"{"jsonrpc":"2.0","method":"ping"}"#));
        let text = read_message(&mut input).await.unwrap();
        assert_eq!(text, r#"{"jsonrpc":"2.0","method":"ping"}"#);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_json_bytes() {
        let message = OutboundMessage::Message(JsonRpcMessage::request(
            serde_json::json!("9"),
            "workspace/symbol",
            Some(serde_json::json!({"query": "größe"})),
        ));
        let expected = serde_json::to_string(&message).unwrap();

        let mut wire: Vec<u8> = Vec::new();
        write_message(&mut wire, &message).await.unwrap();

        let mut reader = Cursor::new(wire);
        let text = read_message(&mut reader).await.unwrap();
        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn test_write_declares_byte_length_not_char_length() {
        // Multibyte payloads must be framed by byte count.
        let message = OutboundMessage::Message(JsonRpcMessage::notification(
            "window/showMessage",
            Some(serde_json::json!({"message": "héllo"})),
        ));
        let mut wire: Vec<u8> = Vec::new();
        write_message(&mut wire, &message).await.unwrap();

        let text = String::from_utf8(wire.clone()).unwrap();
        let header_end = text.find("\r\n\r\n").unwrap();
        let declared: usize = text["Content-Length: ".len()..header_end]
            .trim()
            .parse()
            .unwrap();
        assert_eq!(declared, wire.len() - header_end - 4);
    }

    #[tokio::test]
    async fn test_read_tolerates_extra_headers_and_any_case() {
        let payload = r#"{"jsonrpc":"2.0","method":"ping"}"#;
        let raw = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\ncontent-length: {}\r\n\r\n{}",
            payload.len(),
            payload
        );
        let mut input = Cursor::new(raw.into_bytes());
        let text = read_message(&mut input).await.unwrap();
        assert_eq!(text, payload);
    }

    #[tokio::test]
    async fn test_read_skips_malformed_header_lines() {
        let payload = r#"{}"#;
        let raw = format!(
            "garbage line without a colon\r\nContent-Length: {}\r\n\r\n{}",
            payload.len(),
            payload
        );
        let mut input = Cursor::new(raw.into_bytes());
        let text = read_message(&mut input).await.unwrap();
        assert_eq!(text, payload);
    }

    #[tokio::test]
    async fn test_read_rejects_missing_content_length() {
        let mut input = Cursor::new(b"Content-Type: text/plain\r\n\r\n{}".to_vec());
        let err = read_message(&mut input).await.unwrap_err();
        let err = err.downcast::<LspLinkError>().unwrap();
        assert!(matches!(err, LspLinkError::BadFrame(_)), "got: {err}");
        assert!(err.to_string().contains("Content-Length"));
    }

    #[tokio::test]
    async fn test_read_rejects_non_integer_content_length() {
        let mut input = Cursor::new(b"Content-Length: twelve\r\n\r\n{}".to_vec());
        let err = read_message(&mut input).await.unwrap_err();
        let err = err.downcast::<LspLinkError>().unwrap();
        assert!(matches!(err, LspLinkError::BadFrame(_)));
    }

    #[tokio::test]
    async fn test_eof_between_frames_is_transport_closed() {
        let mut input = Cursor::new(Vec::new());
        let err = read_message(&mut input).await.unwrap_err();
        let err = err.downcast::<LspLinkError>().unwrap();
        assert!(matches!(err, LspLinkError::TransportClosed(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_eof_inside_header_block_is_transport_closed() {
        let mut input = Cursor::new(b"Content-Len".to_vec());
        let err = read_message(&mut input).await.unwrap_err();
        let err = err.downcast::<LspLinkError>().unwrap();
        assert!(matches!(err, LspLinkError::TransportClosed(_)));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_bad_frame() {
        let mut input = Cursor::new(b"Content-Length: 999999999\r\n\r\n{}".to_vec());
        let err = read_message(&mut input).await.unwrap_err();
        let err = err.downcast::<LspLinkError>().unwrap();
        assert!(matches!(err, LspLinkError::BadFrame(_)), "got: {err}");
        assert!(err.to_string().contains("truncated"));
    }

    #[tokio::test]
    async fn test_two_frames_back_to_back() {
        let mut bytes = frame(r#"{"a":1}"#);
        bytes.extend(frame(r#"{"b":2}"#));
        let mut input = Cursor::new(bytes);

        assert_eq!(read_message(&mut input).await.unwrap(), r#"{"a":1}"#);
        assert_eq!(read_message(&mut input).await.unwrap(), r#"{"b":2}"#);
    }

    #[test]
    fn test_parse_headers_trims_whitespace() {
        let headers = parse_headers(b"Content-Length:   42  \r\nX-Extra: a:b:c");
        assert_eq!(headers["content-length"], "42");
        // Split happens on the first colon only.
        assert_eq!(headers["x-extra"], "a:b:c");
    }
}

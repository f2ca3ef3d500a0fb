//! Framed message codec for the browser native-messaging channel.
//!
//! ## Wire format
//!
//! One frame = 4-byte little-endian `u32` length prefix + UTF-8 JSON body of
//! exactly that many bytes. The byte order is fixed little-endian regardless
//! of host architecture. Requests are JSON objects carrying an `action`
//! string; responses are JSON objects carrying a `success` boolean.
//!
//! A short read of the length prefix means the peer closed the channel and is
//! reported as end-of-stream, not an error. Everything else that fails mid-
//! frame (truncated body, oversize length, invalid JSON) is fatal to the
//! channel.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum frame size for sanity checking (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One protocol message: an unordered string-keyed JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(serde_json::Map<String, Value>);

impl Message {
    /// Build from a `serde_json::json!` object literal. Panics only on a
    /// non-object value, which in this crate is always a programmer error.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Message(map),
            other => panic!("protocol messages are JSON objects, got {}", other),
        }
    }

    /// The request's `action` tag, when present and a string.
    pub fn action(&self) -> Option<&str> {
        self.get_str("action")
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("channel io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too large: {len} bytes (max {MAX_FRAME_SIZE})")]
    FrameTooLarge { len: usize },
    #[error("frame body is not valid UTF-8 JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Encode a message to bytes with length prefix.
///
/// Format: 4-byte little-endian length + JSON bytes.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(message)?;

    let len = u32::try_from(json.len())
        .map_err(|_| ProtocolError::FrameTooLarge { len: json.len() })?;
    if json.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { len: json.len() });
    }

    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&json);

    Ok(buf)
}

/// Decode a message from bytes (without length prefix).
pub fn decode_frame(bytes: &[u8]) -> Result<Message, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// A framed request/response channel over a reader/writer pair.
///
/// The host wraps stdin/stdout; tests wrap in-memory buffers.
pub struct FramedChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> FramedChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        FramedChannel { reader, writer }
    }

    /// Read one frame. `Ok(None)` means the peer closed the stream before a
    /// full length prefix arrived (graceful shutdown). Any failure after the
    /// prefix is a fatal [`ProtocolError`].
    pub fn read_frame(&mut self) -> Result<Option<Message>, ProtocolError> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(ProtocolError::Io(e)),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        // Sanity check
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { len });
        }

        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;

        decode_frame(&buf).map(Some)
    }

    /// Write one frame and flush. The flush is mandatory: the extension
    /// blocks on the reply and a buffered write never arrives.
    pub fn write_frame(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let encoded = encode_frame(message)?;
        self.writer.write_all(&encoded)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn frame_round_trips_through_encode_decode() {
        let message = Message::from_value(json!({
            "action": "launch",
            "connectionFile": "session.vnc",
            "svnContent": "[connection]\nhost=10.0.0.5",
        }));

        let encoded = encode_frame(&message).unwrap();
        let decoded = decode_frame(&encoded[4..]).unwrap();

        assert_eq!(decoded, message, "decode(encode(m)) must equal m");
    }

    #[test]
    fn length_prefix_is_little_endian_byte_count() {
        let message = Message::from_value(json!({"action": "ping"}));
        let encoded = encode_frame(&message).unwrap();

        let len = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(
            len as usize,
            encoded.len() - 4,
            "prefix must equal payload byte length"
        );
    }

    #[test]
    fn channel_round_trips_a_written_frame() {
        let message = Message::from_value(json!({"success": true, "message": "pong"}));
        let mut wire = Vec::new();
        FramedChannel::new(Cursor::new(Vec::new()), &mut wire)
            .write_frame(&message)
            .unwrap();

        let mut channel = FramedChannel::new(Cursor::new(wire), Vec::new());
        let read_back = channel.read_frame().unwrap();

        assert_eq!(read_back, Some(message));
    }

    #[test]
    fn empty_stream_reads_as_end_of_stream() {
        let mut channel = FramedChannel::new(Cursor::new(Vec::new()), Vec::new());
        let result = channel.read_frame().unwrap();
        assert!(result.is_none(), "empty stream is a graceful close");
    }

    #[test]
    fn short_prefix_reads_as_end_of_stream() {
        // Peer died after two prefix bytes; not an error, just closure.
        let mut channel = FramedChannel::new(Cursor::new(vec![0x02, 0x00]), Vec::new());
        let result = channel.read_frame().unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn truncated_body_is_a_protocol_error() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&100u32.to_le_bytes());
        wire.extend_from_slice(b"{\"action\"");

        let mut channel = FramedChannel::new(Cursor::new(wire), Vec::new());
        let result = channel.read_frame();

        assert!(
            matches!(result, Err(ProtocolError::Io(_))),
            "truncated body must be fatal, got {:?}",
            result
        );
    }

    #[test]
    fn oversize_length_is_rejected_before_allocation() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(u32::MAX).to_le_bytes());

        let mut channel = FramedChannel::new(Cursor::new(wire), Vec::new());
        let result = channel.read_frame();

        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn invalid_json_body_is_a_protocol_error() {
        let body = b"not json at all";
        let mut wire = Vec::new();
        wire.extend_from_slice(&(body.len() as u32).to_le_bytes());
        wire.extend_from_slice(body);

        let mut channel = FramedChannel::new(Cursor::new(wire), Vec::new());
        let result = channel.read_frame();

        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn unicode_payload_survives_round_trip() {
        let message = Message::from_value(json!({"action": "ping", "note": "héllo ✓"}));
        let encoded = encode_frame(&message).unwrap();

        let mut channel = FramedChannel::new(Cursor::new(encoded), Vec::new());
        let decoded = channel.read_frame().unwrap();

        assert_eq!(decoded, Some(message));
    }
}

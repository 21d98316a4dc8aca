//! Frame layout: fixed header, delimiter-separated body.
//!
//! Header (17 bytes, big-endian):
//!
//! ```text
//! op code   u32
//! msg id    u64
//! body len  u32
//! terminator 0x0A
//! ```
//!
//! The body is the operation's fields in schema order, joined by the
//! reserved delimiter byte.  A zero-field body is empty.

use crate::{FIELD_DELIMITER, Op, Payload, WireError};

/// Header size on the wire.
pub const HEADER_LEN: usize = 17;

/// Byte closing every header.  A mismatch means the stream is corrupt.
pub const HEADER_TERMINATOR: u8 = 0x0A;

/// One unit of wire traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_id: u64,
    pub payload: Payload,
}

impl Frame {
    pub fn new(msg_id: u64, payload: Payload) -> Frame {
        Frame { msg_id, payload }
    }

    pub fn op(&self) -> Op {
        self.payload.op()
    }

    /// Serialize header and body into one buffer.
    ///
    /// Rejects any field containing the delimiter byte; a frame written with
    /// one would decode into the wrong schema on the far side.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let fields = self.payload.encode_fields();
        for field in &fields {
            if field.bytes().any(|b| b == FIELD_DELIMITER) {
                return Err(WireError::ReservedByte);
            }
        }
        let delimiter = (FIELD_DELIMITER as char).to_string();
        let body = fields.join(&delimiter);
        let body_len = u32::try_from(body.len()).map_err(|_| WireError::BodyTooLarge)?;

        let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
        buf.extend_from_slice(&self.op().code().to_be_bytes());
        buf.extend_from_slice(&self.msg_id.to_be_bytes());
        buf.extend_from_slice(&body_len.to_be_bytes());
        buf.push(HEADER_TERMINATOR);
        buf.extend_from_slice(body.as_bytes());
        Ok(buf)
    }

    /// Rebuild a frame from a parsed header and its body bytes.
    pub fn decode(header: Header, body: &[u8]) -> Result<Frame, WireError> {
        let op = Op::from_code(header.op_code).ok_or(WireError::UnknownOp(header.op_code))?;
        let body = core::str::from_utf8(body).map_err(|_| WireError::ConnectionClosed)?;
        let fields: Vec<&str> = if body.is_empty() {
            Vec::new()
        } else {
            body.split(FIELD_DELIMITER as char).collect()
        };
        let payload = Payload::decode_fields(op, &fields)?;
        Ok(Frame { msg_id: header.msg_id, payload })
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub op_code: u32,
    pub msg_id: u64,
    pub body_len: u32,
}

impl Header {
    /// Parse the fixed-size header.  Any structural defect is unrecoverable.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Header, WireError> {
        if bytes[HEADER_LEN - 1] != HEADER_TERMINATOR {
            return Err(WireError::ConnectionClosed);
        }
        Ok(Header {
            op_code: u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            msg_id: u64::from_be_bytes(bytes[4..12].try_into().unwrap()),
            body_len: u32::from_be_bytes(bytes[12..16].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_is_identity() {
        let frame = Frame::new(
            42,
            Payload::SendMsg {
                recipient: "bob".into(),
                message: "a message with spaces".into(),
            },
        );
        let bytes = frame.encode().unwrap();
        let header = Header::parse(bytes[..HEADER_LEN].try_into().unwrap()).unwrap();
        assert_eq!(header.op_code, 5);
        assert_eq!(header.msg_id, 42);
        assert_eq!(header.body_len as usize, bytes.len() - HEADER_LEN);
        let decoded = Frame::decode(header, &bytes[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn empty_body_operations_encode_to_header_only() {
        let frame = Frame::new(7, Payload::GetPrimary);
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
    }

    #[test]
    fn delimiter_in_a_field_is_rejected() {
        let frame = Frame::new(
            1,
            Payload::CreateAccount { username: "al\u{1f}ice".into() },
        );
        assert!(matches!(frame.encode(), Err(WireError::ReservedByte)));
    }

    #[test]
    fn bad_terminator_fails_header_parse() {
        let frame = Frame::new(9, Payload::Ack);
        let mut bytes = frame.encode().unwrap();
        bytes[HEADER_LEN - 1] = 0xFF;
        let result = Header::parse(bytes[..HEADER_LEN].try_into().unwrap());
        assert!(matches!(result, Err(WireError::ConnectionClosed)));
    }

    #[test]
    fn unknown_op_code_fails_decode() {
        let header = Header { op_code: 99, msg_id: 0, body_len: 0 };
        assert!(matches!(
            Frame::decode(header, b""),
            Err(WireError::UnknownOp(99))
        ));
    }

    #[test]
    fn record_separator_survives_bulk_fields() {
        let frame = Frame::new(
            3,
            Payload::UpdateMessageState {
                add_one: false,
                recipient: "bob".into(),
                sender: "alice\rcarol".into(),
                message: "first\rsecond".into(),
            },
        );
        let bytes = frame.encode().unwrap();
        let header = Header::parse(bytes[..HEADER_LEN].try_into().unwrap()).unwrap();
        let decoded = Frame::decode(header, &bytes[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, frame);
    }
}

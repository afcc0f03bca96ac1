//! Frame header layout for `detectEdges` calls.
//!
//! Every frame on the data pipe starts with 11 big-endian bytes:
//! ```text
//! method_id u16 | flags u8 | request_id u32 | payload_length u32
//! ```
//!
//! A call is one `request_id`. The parent sends `REQUEST_PART` frames, each
//! carrying one MsgPack [`Part`](crate::message::Part), then a `REQUEST_END`.
//! The worker answers on the same id with `STREAM_CHUNK` frames closed by
//! `STREAM_END_RESPONSE`, or with a single `ERROR_RESPONSE`.

use crate::error::{EdgeStreamError, Result};

pub const HEADER_SIZE: usize = 11;

/// Default cap on one inbound frame payload (1 GiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Highest cap a config may set (`i32::MAX`).
pub const ABSOLUTE_MAX_PAYLOAD_SIZE: u32 = 2_147_483_647;

/// Method id the parent uses to cancel a call.
pub const ABORT_METHOD_ID: u16 = 0xFFFF;

/// Never valid on the wire.
pub const RESERVED_METHOD_ID: u16 = 0;

pub const DETECT_EDGES_METHOD_ID: u16 = 1;

/// Method name announced in the `$init` schema.
pub const DETECT_EDGES_METHOD_NAME: &str = "detectEdges";

/// Flag bits and the combinations a call uses.
pub mod flags {
    /// Set on everything the worker sends.
    pub const DIRECTION_TO_PARENT: u8 = 0b0000_0001;
    pub const IS_RESPONSE: u8 = 0b0000_0010;
    /// Terminal failure; the payload is a MsgPack `Status`.
    pub const IS_ERROR: u8 = 0b0000_0100;
    /// Frame belongs to a request or response stream.
    pub const IS_STREAM: u8 = 0b0000_1000;
    /// Last frame of its stream.
    pub const STREAM_END: u8 = 0b0001_0000;

    /// Bits 5-7, must be zero.
    pub const RESERVED_MASK: u8 = 0b1110_0000;

    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    // parent -> worker

    /// One request part (0x08).
    pub const REQUEST_PART: u8 = IS_STREAM;
    /// End of the parent's input (0x18). May carry a final part.
    pub const REQUEST_END: u8 = IS_STREAM | STREAM_END;

    // worker -> parent

    /// Call failed (0x07).
    pub const ERROR_RESPONSE: u8 = DIRECTION_TO_PARENT | IS_RESPONSE | IS_ERROR;
    /// One slice of the edge map (0x0B).
    pub const STREAM_CHUNK: u8 = DIRECTION_TO_PARENT | IS_RESPONSE | IS_STREAM;
    /// Edge map complete, empty payload (0x1B).
    pub const STREAM_END_RESPONSE: u8 = DIRECTION_TO_PARENT | IS_RESPONSE | IS_STREAM | STREAM_END;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// `DETECT_EDGES_METHOD_ID` for call frames, `ABORT_METHOD_ID` to cancel.
    pub method_id: u16,
    pub flags: u8,
    /// Call the frame belongs to.
    pub request_id: u32,
    pub payload_length: u32,
}

impl Header {
    pub fn new(method_id: u16, flags: u8, request_id: u32, payload_length: u32) -> Self {
        Self {
            method_id,
            flags,
            request_id,
            payload_length,
        }
    }

    /// ```
    /// use edgestream::protocol::{Header, flags};
    ///
    /// let header = Header::new(1, flags::STREAM_CHUNK, 42, 100);
    /// assert_eq!(header.encode().len(), 11);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Write the header into the first `HEADER_SIZE` bytes of `buf`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..2].copy_from_slice(&self.method_id.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.request_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// `None` until `HEADER_SIZE` bytes are available.
    ///
    /// ```
    /// use edgestream::protocol::Header;
    ///
    /// let bytes = [0, 1, 0x08, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.request_id, 42);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            method_id: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            request_id: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        })
    }

    /// Reject headers that would desynchronize the pipe. Any failure here
    /// ends the connection, not just the call.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.method_id == RESERVED_METHOD_ID {
            return Err(EdgeStreamError::Protocol(format!(
                "method id 0 on call {}",
                self.request_id
            )));
        }

        if self.payload_length > max_payload_size {
            return Err(EdgeStreamError::Protocol(format!(
                "frame payload of {} bytes exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(EdgeStreamError::Protocol(format!(
                "reserved flag bits set: {:#04x}",
                self.flags
            )));
        }

        Ok(())
    }

    #[inline]
    pub fn is_abort(&self) -> bool {
        self.method_id == ABORT_METHOD_ID
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_ERROR)
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_STREAM)
    }

    #[inline]
    pub fn is_stream_end(&self) -> bool {
        flags::has_flag(self.flags, flags::STREAM_END)
    }

    #[inline]
    pub fn is_to_parent(&self) -> bool {
        flags::has_flag(self.flags, flags::DIRECTION_TO_PARENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header::new(0x0102, 0x03, 0x04050607, 0x08090A0B);
        let bytes = header.encode();

        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; HEADER_SIZE - 1];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_validate_method_id_zero_rejected() {
        let header = Header::new(RESERVED_METHOD_ID, flags::REQUEST_PART, 1, 0);
        let result = header.validate(DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("method id 0"));
    }

    #[test]
    fn test_validate_abort_allowed() {
        let header = Header::new(ABORT_METHOD_ID, 0, 7, 0);
        assert!(header.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_ok());
        assert!(header.is_abort());
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header::new(DETECT_EDGES_METHOD_ID, flags::REQUEST_PART, 1, 4096);
        let result = header.validate(2048);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_reserved_bits_must_be_zero() {
        let header = Header::new(DETECT_EDGES_METHOD_ID, 0b0010_0000, 1, 0);
        let result = header.validate(DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("reserved flag bits"));
    }

    #[test]
    fn test_flag_combinations() {
        assert_eq!(flags::REQUEST_PART, 0x08);
        assert_eq!(flags::REQUEST_END, 0x18);
        assert_eq!(flags::ERROR_RESPONSE, 0x07);
        assert_eq!(flags::STREAM_CHUNK, 0x0B);
        assert_eq!(flags::STREAM_END_RESPONSE, 0x1B);
        for combo in [
            flags::REQUEST_PART,
            flags::REQUEST_END,
            flags::ERROR_RESPONSE,
            flags::STREAM_CHUNK,
            flags::STREAM_END_RESPONSE,
        ] {
            assert_eq!(combo & flags::RESERVED_MASK, 0);
        }
    }

    #[test]
    fn test_request_end_accessors() {
        let header = Header::new(DETECT_EDGES_METHOD_ID, flags::REQUEST_END, 9, 0);

        assert!(header.is_stream());
        assert!(header.is_stream_end());
        assert!(!header.is_response());
        assert!(!header.is_to_parent());
        assert!(!header.is_error());
    }
}

//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary framing that carries the
//! `detectEdges` call over the data plane:
//! - 11-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    flags, Header, ABORT_METHOD_ID, ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_PAYLOAD_SIZE,
    DETECT_EDGES_METHOD_ID, DETECT_EDGES_METHOD_NAME, HEADER_SIZE, RESERVED_METHOD_ID,
};

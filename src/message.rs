//! Logical messages of the `detectEdges` call.
//!
//! Inbound parts are MsgPack-encoded as an externally tagged union so they
//! stay readable by the parent's `@msgpack/msgpack` decoder:
//!
//! ```text
//! {"image_chunk": {"content": <bin>}}
//! {"parameters":  {"minThreshold": <i32>, "maxThreshold": <i32>}}
//! ```
//!
//! Output chunks travel as raw frame payloads; failures as a MsgPack [`Status`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One message of the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Part {
    /// Fragment of the input image. Stream order is the only assembly order.
    #[serde(rename = "image_chunk")]
    DataChunk(DataChunk),
    /// Transform tuning parameters (last one wins).
    #[serde(rename = "parameters")]
    ControlParameters(ControlParameters),
}

impl Part {
    /// Build a data chunk part.
    pub fn data(content: impl Into<Bytes>) -> Self {
        Part::DataChunk(DataChunk {
            content: content.into(),
        })
    }

    /// Build a control parameters part.
    pub fn parameters(min_threshold: i32, max_threshold: i32) -> Self {
        Part::ControlParameters(ControlParameters::new(min_threshold, max_threshold))
    }
}

/// Opaque fragment of the input payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChunk {
    /// Fragment bytes.
    pub content: Bytes,
}

/// Edge detection thresholds, passed to the transform uninterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlParameters {
    /// Lower hysteresis threshold.
    pub min_threshold: i32,
    /// Upper hysteresis threshold.
    pub max_threshold: i32,
}

impl ControlParameters {
    pub fn new(min_threshold: i32, max_threshold: i32) -> Self {
        Self {
            min_threshold,
            max_threshold,
        }
    }
}

/// Fully reassembled input of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledRequest {
    /// Concatenation of all data chunks in arrival order (may be empty).
    pub payload: Bytes,
    /// Last parameters observed.
    pub params: ControlParameters,
}

/// One bounded fragment of the output payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Fragment bytes, never longer than the emitter's chunk size.
    pub content: Bytes,
}

impl OutputChunk {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Category of a terminal failure, numbered like common RPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum StatusCode {
    Cancelled = 1,
    InvalidArgument = 3,
    ResourceExhausted = 8,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            1 => StatusCode::Cancelled,
            3 => StatusCode::InvalidArgument,
            8 => StatusCode::ResourceExhausted,
            12 => StatusCode::Unimplemented,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            other => return Err(format!("unknown status code {}", other)),
        })
    }
}

/// Terminal failure signal sent in an error frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

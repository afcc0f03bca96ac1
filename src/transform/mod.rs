//! The processing collaborator invoked once per session.
//!
//! A [`Transform`] is a pure, fallible function of the reassembled payload and
//! the last parameters. Sessions run it on the blocking thread pool, so it may
//! be CPU heavy. Threshold validation, if any, belongs to the implementation.

mod edges;

use bytes::Bytes;
use thiserror::Error;

use crate::message::ControlParameters;

pub use edges::EdgeDetector;

/// Failure of a transform.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The payload is not a decodable image.
    #[error("invalid image data provided: {0}")]
    InvalidImage(String),

    /// The result could not be encoded.
    #[error("failed to encode result: {0}")]
    Encode(String),
}

/// Converts a complete payload into a complete output payload.
pub trait Transform: Send + Sync + 'static {
    fn apply(&self, payload: &[u8], params: ControlParameters) -> Result<Bytes, TransformError>;
}

impl<F> Transform for F
where
    F: Fn(&[u8], ControlParameters) -> Result<Bytes, TransformError> + Send + Sync + 'static,
{
    fn apply(&self, payload: &[u8], params: ControlParameters) -> Result<Bytes, TransformError> {
        self(payload, params)
    }
}

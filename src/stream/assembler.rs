//! Reassembly of the inbound part stream.
//!
//! Data chunks carry no offset metadata, so they are appended strictly in the
//! order they are observed. Parameters may arrive at any position; the last
//! one observed wins. Completion is decided by the caller reaching
//! end-of-input, not by [`ChunkAssembler::is_ready`].

use bytes::{Bytes, BytesMut};

use crate::error::MissingParametersError;
use crate::message::{AssembledRequest, ControlParameters, Part};

/// Accumulates one session's inbound parts into an [`AssembledRequest`].
///
/// No size cap is enforced here; frame-level limits live in the
/// [`FrameBuffer`](crate::protocol::FrameBuffer).
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    payload: BytesMut,
    params: Option<ControlParameters>,
    chunks: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inbound part.
    pub fn observe(&mut self, part: Part) {
        match part {
            Part::DataChunk(chunk) => {
                self.payload.extend_from_slice(&chunk.content);
                self.chunks += 1;
            }
            Part::ControlParameters(params) => {
                if let Some(previous) = self.params.replace(params) {
                    tracing::debug!(?previous, current = ?params, "parameters replaced");
                }
            }
        }
    }

    /// True once parameters have been observed at least once.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.params.is_some()
    }

    /// Bytes accumulated so far.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Number of data chunks observed so far.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Produce the assembled request once end-of-input has been reached.
    ///
    /// # Errors
    ///
    /// Returns [`MissingParametersError`] if no parameters were ever observed.
    pub fn finalize(self) -> Result<AssembledRequest, MissingParametersError> {
        let params = self.params.ok_or(MissingParametersError)?;
        let payload: Bytes = self.payload.freeze();
        Ok(AssembledRequest { payload, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_concatenate_in_order_around_parameters() {
        let mut assembler = ChunkAssembler::new();
        assembler.observe(Part::data(&b"AAAA"[..]));
        assembler.observe(Part::parameters(50, 150));
        assembler.observe(Part::data(&b"BBBB"[..]));
        assembler.observe(Part::data(&b"C"[..]));

        assert_eq!(assembler.chunk_count(), 3);
        assert_eq!(assembler.payload_len(), 9);

        let request = assembler.finalize().unwrap();
        assert_eq!(&request.payload[..], b"AAAABBBBC");
        assert_eq!(request.params, ControlParameters::new(50, 150));
    }

    #[test]
    fn test_last_parameters_win() {
        let mut assembler = ChunkAssembler::new();
        assembler.observe(Part::parameters(1, 2));
        assembler.observe(Part::data(&b"x"[..]));
        assembler.observe(Part::parameters(3, 4));

        let request = assembler.finalize().unwrap();
        assert_eq!(request.params, ControlParameters::new(3, 4));
    }

    #[test]
    fn test_ready_is_independent_of_data() {
        let mut assembler = ChunkAssembler::new();
        assert!(!assembler.is_ready());

        assembler.observe(Part::data(&b"abc"[..]));
        assert!(!assembler.is_ready());

        assembler.observe(Part::parameters(0, 0));
        assert!(assembler.is_ready());
    }

    #[test]
    fn test_missing_parameters() {
        let mut assembler = ChunkAssembler::new();
        assembler.observe(Part::data(&b"only data"[..]));

        assert_eq!(assembler.finalize(), Err(MissingParametersError));
    }

    #[test]
    fn test_empty_payload_is_legal() {
        let mut assembler = ChunkAssembler::new();
        assembler.observe(Part::parameters(10, 20));

        let request = assembler.finalize().unwrap();
        assert!(request.payload.is_empty());
    }

    #[test]
    fn test_empty_data_chunks_are_counted_but_add_nothing() {
        let mut assembler = ChunkAssembler::new();
        assembler.observe(Part::data(Bytes::new()));
        assembler.observe(Part::data(&b"z"[..]));
        assembler.observe(Part::parameters(1, 1));

        assert_eq!(assembler.chunk_count(), 2);
        assert_eq!(&assembler.finalize().unwrap().payload[..], b"z");
    }
}

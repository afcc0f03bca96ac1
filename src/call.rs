//! Parent-side helpers for one `detectEdges` call.
//!
//! The worker never uses these; they exist for hosts written in Rust, for the
//! demo and for tests.
//!
//! ```
//! use edgestream::call::RequestEncoder;
//! use edgestream::message::ControlParameters;
//! use edgestream::protocol::FrameBuffer;
//!
//! let bytes = RequestEncoder::new(7)
//!     .encode(&[0u8; 5000], ControlParameters::new(100, 200))
//!     .unwrap();
//!
//! // parameters, three data chunks, end-of-input
//! let frames = FrameBuffer::new().push(&bytes).unwrap();
//! assert_eq!(frames.len(), 5);
//! assert!(frames[4].is_stream_end());
//! ```

use bytes::{Bytes, BytesMut};

use crate::codec::MsgPackCodec;
use crate::error::{EdgeStreamError, Result};
use crate::message::{ControlParameters, Part, Status};
use crate::protocol::{build_frame, flags, Frame, Header, ABORT_METHOD_ID, DETECT_EDGES_METHOD_ID};
use crate::stream::{ChunkEmitter, DEFAULT_CHUNK_SIZE};

/// Outcome of a call: the reassembled output or the failure status.
pub type CallResult = std::result::Result<Bytes, Status>;

/// Encodes the request frames of one call.
#[derive(Debug, Clone)]
pub struct RequestEncoder {
    method_id: u16,
    request_id: u32,
    chunk_size: usize,
}

impl RequestEncoder {
    pub fn new(request_id: u32) -> Self {
        Self {
            method_id: DETECT_EDGES_METHOD_ID,
            request_id,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Size of the data chunks the image is split into. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Address another method id.
    pub fn with_method(mut self, method_id: u16) -> Self {
        self.method_id = method_id;
        self
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// One part frame.
    pub fn part(&self, part: &Part) -> Result<Vec<u8>> {
        let payload = MsgPackCodec::encode(part)?;
        let header = Header::new(
            self.method_id,
            flags::REQUEST_PART,
            self.request_id,
            payload.len() as u32,
        );
        Ok(build_frame(&header, &payload))
    }

    /// The end-of-input frame.
    pub fn end(&self) -> Vec<u8> {
        let header = Header::new(self.method_id, flags::REQUEST_END, self.request_id, 0);
        header.encode().to_vec()
    }

    /// The abort frame.
    pub fn abort(&self) -> Vec<u8> {
        Header::new(ABORT_METHOD_ID, 0, self.request_id, 0)
            .encode()
            .to_vec()
    }

    /// A whole request: parameters first, then the image in data chunks,
    /// then end-of-input.
    pub fn encode(&self, image: &[u8], params: ControlParameters) -> Result<Vec<u8>> {
        let mut out = self.part(&Part::ControlParameters(params))?;

        for chunk in ChunkEmitter::new(Bytes::copy_from_slice(image), self.chunk_size) {
            out.extend(self.part(&Part::data(chunk.content))?);
        }

        out.extend(self.end());
        Ok(out)
    }
}

/// Collects the response frames of one call.
#[derive(Debug, Default)]
pub struct ResponseCollector {
    request_id: u32,
    chunks: Vec<Bytes>,
    done: bool,
}

impl ResponseCollector {
    pub fn new(request_id: u32) -> Self {
        Self {
            request_id,
            ..Self::default()
        }
    }

    /// Output chunks received so far, in order.
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one response frame.
    ///
    /// Frames of other calls are ignored. Returns the call outcome once the
    /// terminal frame arrives.
    pub fn push(&mut self, frame: &Frame) -> Result<Option<CallResult>> {
        if frame.request_id() != self.request_id || !frame.is_response() {
            return Ok(None);
        }
        if self.done {
            return Err(EdgeStreamError::Protocol(format!(
                "frame after end of call {}",
                self.request_id
            )));
        }

        if frame.is_error() {
            self.done = true;
            let status: Status = MsgPackCodec::decode(frame.payload())?;
            return Ok(Some(Err(status)));
        }

        if frame.is_stream_end() {
            self.done = true;
            let total = self.chunks.iter().map(Bytes::len).sum();
            let mut payload = BytesMut::with_capacity(total);
            for chunk in &self.chunks {
                payload.extend_from_slice(chunk);
            }
            return Ok(Some(Ok(payload.freeze())));
        }

        if frame.is_stream() {
            self.chunks.push(frame.payload.clone());
            return Ok(None);
        }

        Err(EdgeStreamError::Protocol(format!(
            "unexpected response flags {:#04x}",
            frame.header.flags
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StatusCode;
    use crate::protocol::FrameBuffer;

    fn response(flags: u8, request_id: u32, payload: &[u8]) -> Frame {
        Frame::new(
            Header::new(DETECT_EDGES_METHOD_ID, flags, request_id, payload.len() as u32),
            Bytes::copy_from_slice(payload),
        )
    }

    #[test]
    fn test_encode_sends_parameters_first() {
        let bytes = RequestEncoder::new(3)
            .with_chunk_size(4)
            .encode(b"AAAABBBBC", ControlParameters::new(50, 150))
            .unwrap();
        let frames = FrameBuffer::new().push(&bytes).unwrap();

        assert_eq!(frames.len(), 5);
        let parts: Vec<Part> = frames[..4]
            .iter()
            .map(|f| MsgPackCodec::decode(f.payload()).unwrap())
            .collect();
        assert_eq!(parts[0], Part::parameters(50, 150));
        assert_eq!(parts[1], Part::data(&b"AAAA"[..]));
        assert_eq!(parts[3], Part::data(&b"C"[..]));

        for frame in &frames {
            assert_eq!(frame.request_id(), 3);
            assert_eq!(frame.method_id(), DETECT_EDGES_METHOD_ID);
        }
        assert_eq!(frames[4].header.flags, flags::REQUEST_END);
        assert!(frames[4].payload().is_empty());
    }

    #[test]
    fn test_empty_image_is_parameters_and_end() {
        let bytes = RequestEncoder::new(1)
            .encode(&[], ControlParameters::new(1, 2))
            .unwrap();
        assert_eq!(FrameBuffer::new().push(&bytes).unwrap().len(), 2);
    }

    #[test]
    fn test_abort_frame() {
        let frames = FrameBuffer::new()
            .push(&RequestEncoder::new(9).abort())
            .unwrap();
        assert!(frames[0].is_abort());
        assert_eq!(frames[0].request_id(), 9);
    }

    #[test]
    fn test_collect_chunks() {
        let mut collector = ResponseCollector::new(2);

        assert!(collector
            .push(&response(flags::STREAM_CHUNK, 2, b"AAA"))
            .unwrap()
            .is_none());
        assert!(collector
            .push(&response(flags::STREAM_CHUNK, 4, b"other call"))
            .unwrap()
            .is_none());
        collector
            .push(&response(flags::STREAM_CHUNK, 2, b"AB"))
            .unwrap();

        let outcome = collector
            .push(&response(flags::STREAM_END_RESPONSE, 2, b""))
            .unwrap()
            .unwrap();
        assert_eq!(outcome.unwrap(), Bytes::from_static(b"AAAAB"));
        assert_eq!(collector.chunks().len(), 2);
        assert!(collector.is_done());
    }

    #[test]
    fn test_collect_error() {
        let status = Status::new(StatusCode::Internal, "processing failed: boom");
        let payload = MsgPackCodec::encode(&status).unwrap();

        let mut collector = ResponseCollector::new(2);
        let outcome = collector
            .push(&response(flags::ERROR_RESPONSE, 2, &payload))
            .unwrap()
            .unwrap();

        assert_eq!(outcome.unwrap_err(), status);
    }

    #[test]
    fn test_frame_after_end_is_protocol_error() {
        let mut collector = ResponseCollector::new(1);
        collector
            .push(&response(flags::STREAM_END_RESPONSE, 1, b""))
            .unwrap();

        assert!(collector
            .push(&response(flags::STREAM_CHUNK, 1, b"late"))
            .is_err());
    }
}

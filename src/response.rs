//! Outbound side of a call over the frame writer.
//!
//! A [`ResponseStream`] turns session output into response frames:
//! - each output chunk becomes a `STREAM_CHUNK` frame carrying the raw bytes
//! - successful completion is one `STREAM_END_RESPONSE` frame, always empty
//! - failure is one `ERROR_RESPONSE` frame with a MsgPack [`Status`]

use bytes::Bytes;

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::message::{OutputChunk, Status};
use crate::protocol::{flags, Header};
use crate::stream::{BoxFuture, ChunkSink};
use crate::writer::{OutboundFrame, WriterHandle};

/// Build the error frame for a call.
pub fn error_frame(method_id: u16, request_id: u32, status: &Status) -> Result<OutboundFrame> {
    let payload = Bytes::from(MsgPackCodec::encode(status)?);
    let header = Header::new(
        method_id,
        flags::ERROR_RESPONSE,
        request_id,
        payload.len() as u32,
    );
    Ok(OutboundFrame::new(&header, payload))
}

/// Response frames of one call.
#[derive(Clone)]
pub struct ResponseStream {
    method_id: u16,
    request_id: u32,
    writer: WriterHandle,
}

impl ResponseStream {
    pub fn new(method_id: u16, request_id: u32, writer: WriterHandle) -> Self {
        Self {
            method_id,
            request_id,
            writer,
        }
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    async fn send(&self, frame_flags: u8, payload: Bytes) -> Result<()> {
        let header = Header::new(
            self.method_id,
            frame_flags,
            self.request_id,
            payload.len() as u32,
        );
        self.writer.send(OutboundFrame::new(&header, payload)).await
    }
}

impl ChunkSink for ResponseStream {
    fn send_chunk(&mut self, chunk: OutputChunk) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.send(flags::STREAM_CHUNK, chunk.content))
    }

    fn finish(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.send(flags::STREAM_END_RESPONSE, Bytes::new()))
    }

    fn fail(&mut self, status: Status) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let frame = error_frame(self.method_id, self.request_id, &status)?;
            self.writer.send(frame).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StatusCode;
    use crate::protocol::{FrameBuffer, DETECT_EDGES_METHOD_ID};
    use crate::writer::{spawn_writer_task, WriterConfig};
    use tokio::io::{duplex, AsyncReadExt};

    async fn written_frames<F>(f: F) -> Vec<crate::protocol::Frame>
    where
        F: FnOnce(ResponseStream) -> BoxFuture<'static, ()>,
    {
        let (client, mut server) = duplex(64 * 1024);
        let (writer, task) = spawn_writer_task(client, &WriterConfig::default());

        f(ResponseStream::new(DETECT_EDGES_METHOD_ID, 5, writer)).await;
        task.await.unwrap().unwrap();

        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();
        FrameBuffer::new().push(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_chunks_then_end() {
        let frames = written_frames(|mut stream| {
            Box::pin(async move {
                stream
                    .send_chunk(OutputChunk::new(Bytes::from_static(b"AAA")))
                    .await
                    .unwrap();
                stream
                    .send_chunk(OutputChunk::new(Bytes::from_static(b"BB")))
                    .await
                    .unwrap();
                stream.finish().await.unwrap();
            })
        })
        .await;

        assert_eq!(frames.len(), 3);
        for frame in &frames {
            assert_eq!(frame.request_id(), 5);
            assert_eq!(frame.method_id(), DETECT_EDGES_METHOD_ID);
            assert!(frame.header.is_to_parent());
        }
        assert_eq!(frames[0].header.flags, flags::STREAM_CHUNK);
        assert_eq!(frames[0].payload(), b"AAA");
        assert_eq!(frames[1].payload(), b"BB");
        assert_eq!(frames[2].header.flags, flags::STREAM_END_RESPONSE);
        assert!(frames[2].payload().is_empty());
    }

    #[tokio::test]
    async fn test_fail_writes_status() {
        let frames = written_frames(|mut stream| {
            Box::pin(async move {
                stream
                    .fail(Status::new(StatusCode::InvalidArgument, "missing"))
                    .await
                    .unwrap();
            })
        })
        .await;

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.flags, flags::ERROR_RESPONSE);

        let status: Status = MsgPackCodec::decode(frames[0].payload()).unwrap();
        assert_eq!(status.code, StatusCode::InvalidArgument);
        assert_eq!(status.message, "missing");
    }

    #[test]
    fn test_error_frame_length_matches_payload() {
        let frame = error_frame(1, 9, &Status::new(StatusCode::Unimplemented, "nope")).unwrap();
        let header = Header::decode(&frame.header).unwrap();

        assert_eq!(header.payload_length as usize, frame.payload.len());
        assert_eq!(header.request_id, 9);
        assert!(header.is_error());
    }
}

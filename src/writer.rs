//! Dedicated writer task for outbound frames.
//!
//! Sessions never touch the pipe. They queue frames on an mpsc channel and a
//! single task drains it, batching whatever is ready into one vectored write.
//!
//! ```text
//! Session 1 ─┐
//! Session 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Pipe
//! Session N ─┘
//! ```
//!
//! Frames of one session stay in the order they were queued. Frames of
//! different sessions may interleave.

use std::io::IoSlice;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backpressure::{BackpressureController, DEFAULT_MAX_PENDING, DEFAULT_TIMEOUT};
use crate::error::{EdgeStreamError, Result};
use crate::protocol::{Header, HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the pipe.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header (11 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes (empty for STREAM_END).
    pub payload: Bytes,
}

impl OutboundFrame {
    #[inline]
    pub fn new(header: &Header, payload: Bytes) -> Self {
        Self {
            header: header.encode(),
            payload,
        }
    }

    #[inline]
    pub fn empty(header: &Header) -> Self {
        Self::new(header, Bytes::new())
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Frames queued but not yet written before producers have to wait.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// How long a producer waits for the queue to drain.
    #[serde(with = "millis")]
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_TIMEOUT,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Handle for queueing frames on the writer task.
///
/// Cheap to clone; every session holds one.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    budget: BackpressureController,
}

impl WriterHandle {
    /// Queue a frame, waiting while the outbound budget is exhausted.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        let slot = self.budget.reserve().await?;

        self.tx
            .send(frame)
            .await
            .map_err(|_| EdgeStreamError::ConnectionClosed)?;
        slot.disarm();
        Ok(())
    }

    /// Queue a frame without waiting.
    ///
    /// Used for error responses on the read loop, which must not stall
    /// behind a slow session.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        let slot = self.budget.try_reserve()?;

        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EdgeStreamError::BackpressureTimeout,
            mpsc::error::TrySendError::Closed(_) => EdgeStreamError::ConnectionClosed,
        })?;
        slot.disarm();
        Ok(())
    }

    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.budget.is_active()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.budget.pending_count()
    }
}

/// Spawn the writer task and return a handle for queueing frames.
///
/// The task ends cleanly once every handle is dropped and the queue is
/// drained, or with an error when the pipe fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: &WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let budget = BackpressureController::new(
        config.max_pending_frames,
        config.backpressure_timeout,
    );

    let handle = WriterHandle {
        tx,
        budget: budget.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, writer, budget));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    budget: BackpressureController,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let count = batch.len();
        let result = write_batch(&mut writer, &batch).await;
        batch.clear();
        budget.release_many(count);

        if let Err(e) = result {
            tracing::error!(error = %e, "writer task failed");
            return Err(e);
        }
    }

    tracing::debug!("writer channel closed");
    Ok(())
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(EdgeStreamError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after the first `skip_bytes`.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.header[..], &frame.payload[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}

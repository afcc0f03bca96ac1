//! One request/response exchange: receive, process, emit.
//!
//! ```text
//! Receiving ──eof──► Processing ──ok──► Emitting ──exhausted──► Done
//!     │                  │                  │
//!     └──────────────────┴──────────────────┴──────► Failed
//! ```
//!
//! The session is written against the [`PartSource`] and [`ChunkSink`]
//! seams; those two and the transform are its only suspension points, so the
//! state machine runs the same over a pipe, a channel or a test double.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use super::{ChunkAssembler, ChunkEmitter};
use crate::error::{Result, SessionError};
use crate::message::{AssembledRequest, OutputChunk, Part, Status};
use crate::transform::Transform;

/// Boxed future used at the session seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Inbound side of a session.
pub trait PartSource: Send {
    /// Wait for the next part. `Ok(None)` is a graceful end-of-input.
    fn next_part(&mut self) -> BoxFuture<'_, std::result::Result<Option<Part>, SessionError>>;
}

/// Outbound side of a session.
pub trait ChunkSink: Send {
    /// Send one output chunk, waiting until the transport accepts it.
    fn send_chunk(&mut self, chunk: OutputChunk) -> BoxFuture<'_, Result<()>>;

    /// Signal successful completion of the output stream.
    fn finish(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Signal terminal failure of the call.
    fn fail(&mut self, status: Status) -> BoxFuture<'_, Result<()>>;
}

/// Parts queued by a reader; the queue closing is end-of-input.
impl PartSource for mpsc::Receiver<std::result::Result<Part, SessionError>> {
    fn next_part(&mut self) -> BoxFuture<'_, std::result::Result<Option<Part>, SessionError>> {
        Box::pin(async move { self.recv().await.transpose() })
    }
}

/// Lifecycle of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Receiving,
    Processing,
    Emitting,
    Done,
    Failed,
}

impl SessionState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

/// Cancels the paired [`CancelSignal`] when triggered or dropped.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Observed by a session at each suspension point.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// Resolves once cancelled or once the handle is gone.
    pub async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|cancelled| *cancelled).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Create a connected cancellation pair.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

/// Orchestrates one call from first inbound part to terminal signal.
pub struct StreamSession {
    request_id: u32,
    transform: Arc<dyn Transform>,
    chunk_size: usize,
    cancel: Option<CancelSignal>,
    state: SessionState,
}

impl StreamSession {
    /// Create a session in the `Receiving` state.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(request_id: u32, transform: Arc<dyn Transform>, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be greater than zero");
        Self {
            request_id,
            transform,
            chunk_size,
            cancel: None,
            state: SessionState::Receiving,
        }
    }

    /// Attach a cancellation signal.
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to a terminal state.
    ///
    /// Every failure except cancellation is reported once through
    /// [`ChunkSink::fail`]. Output chunks are only sent after the transform
    /// succeeded; a cancelled session sends nothing further.
    pub async fn run<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
    ) -> std::result::Result<(), SessionError>
    where
        S: PartSource + ?Sized,
        K: ChunkSink + ?Sized,
    {
        let outcome = self.drive(source, sink).await;

        match &outcome {
            Ok(()) => self.transition(SessionState::Done),
            Err(SessionError::Cancelled) => {
                self.transition(SessionState::Failed);
                tracing::debug!(request_id = self.request_id, "session cancelled");
            }
            Err(err) => {
                self.transition(SessionState::Failed);
                tracing::warn!(request_id = self.request_id, "session failed: {}", err);
                if let Err(e) = sink.fail(err.status()).await {
                    tracing::warn!(
                        request_id = self.request_id,
                        "could not deliver failure status: {}",
                        e
                    );
                }
            }
        }

        outcome
    }

    async fn drive<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
    ) -> std::result::Result<(), SessionError>
    where
        S: PartSource + ?Sized,
        K: ChunkSink + ?Sized,
    {
        let mut cancel = self.cancel.take();

        let mut assembler = ChunkAssembler::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return Err(SessionError::Cancelled),
                next = source.next_part() => next?,
            };
            match next {
                Some(part) => assembler.observe(part),
                None => break,
            }
        }

        tracing::debug!(
            request_id = self.request_id,
            chunks = assembler.chunk_count(),
            bytes = assembler.payload_len(),
            "end of input"
        );
        let request = assembler.finalize()?;

        self.transition(SessionState::Processing);
        let output = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return Err(SessionError::Cancelled),
            output = process(self.transform.clone(), request) => output?,
        };

        self.transition(SessionState::Emitting);
        for chunk in ChunkEmitter::new(output, self.chunk_size) {
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => return Err(SessionError::Cancelled),
                sent = sink.send_chunk(chunk) => sent?,
            }
        }

        sink.finish().await?;
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            request_id = self.request_id,
            from = ?self.state,
            to = ?next,
            "session transition"
        );
        self.state = next;
    }
}

async fn cancelled(signal: &mut Option<CancelSignal>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Run the transform once on the blocking pool.
async fn process(
    transform: Arc<dyn Transform>,
    request: AssembledRequest,
) -> std::result::Result<Bytes, SessionError> {
    let AssembledRequest { payload, params } = request;

    match tokio::task::spawn_blocking(move || transform.apply(&payload, params)).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(SessionError::Processing(e.to_string())),
        Err(e) if e.is_panic() => Err(SessionError::Processing("transform panicked".into())),
        Err(_) => Err(SessionError::Processing("transform task aborted".into())),
    }
}

//! Server builder and connection loop.
//!
//! The [`ServerBuilder`] configures the transform and the limits, and
//! [`Server`] runs the lifecycle:
//! 1. Bind a pipe listener
//! 2. Send `$init` via stdout
//! 3. Accept the parent connection
//! 4. Demultiplex request frames into one [`StreamSession`] per call
//!
//! # Example
//!
//! ```ignore
//! use edgestream::{EdgeDetector, Server};
//!
//! #[tokio::main]
//! async fn main() -> edgestream::Result<()> {
//!     let server = Server::builder()
//!         .transform(EdgeDetector::new())
//!         .max_concurrent_sessions(4)
//!         .start()
//!         .await?;
//!
//!     server.wait_for_shutdown().await
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::codec::MsgPackCodec;
use crate::config::ServerConfig;
use crate::control::{build_init_message, write_stdout_line, InitSchema};
use crate::error::{EdgeStreamError, Result, SessionError};
use crate::message::{Part, Status, StatusCode};
use crate::protocol::{Frame, FrameBuffer};
use crate::response::{error_frame, ResponseStream};
use crate::stream::{cancellation, CancelHandle, StreamSession};
use crate::transform::{EdgeDetector, Transform};
use crate::transport::bind_fresh;
use crate::writer::{spawn_writer_task, WriterHandle};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Builder for configuring and starting a [`Server`].
pub struct ServerBuilder {
    transform: Arc<dyn Transform>,
    config: ServerConfig,
}

impl ServerBuilder {
    /// A builder serving [`EdgeDetector`] with the default configuration.
    pub fn new() -> Self {
        Self {
            transform: Arc::new(EdgeDetector::new()),
            config: ServerConfig::default(),
        }
    }

    /// Replace the transform run by every session.
    pub fn transform<T: Transform>(mut self, transform: T) -> Self {
        self.transform = Arc::new(transform);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the worker pool size.
    ///
    /// Calls that arrive while every slot is taken are rejected with
    /// `ResourceExhausted`.
    /// Default: 10
    pub fn max_concurrent_sessions(mut self, limit: usize) -> Self {
        self.config.max_concurrent_sessions = limit;
        self
    }

    /// Set the maximum size of one output chunk.
    ///
    /// Default: 2048
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set how many parts may wait for one session before the reader blocks.
    ///
    /// Default: 64
    pub fn session_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.session_queue_capacity = capacity;
        self
    }

    /// Set the largest accepted inbound frame payload.
    ///
    /// Default: 1 GB
    pub fn max_frame_payload(mut self, limit: u32) -> Self {
        self.config.max_frame_payload = limit;
        self
    }

    /// Set the maximum pending outbound frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.writer.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.writer.backpressure_timeout = timeout;
        self
    }

    /// Bind a fresh pipe, announce it with `$init` and serve the parent that
    /// connects to it.
    pub async fn start(self) -> Result<Server> {
        self.config.validate()?;

        let listener = bind_fresh().await?;
        let init = build_init_message(listener.path(), &InitSchema::edge_worker())?;
        write_stdout_line(&init)?;
        tracing::info!(pipe = listener.path(), "waiting for parent connection");

        let stream = listener.accept().await?;
        tracing::info!("parent connected");

        self.serve(stream)
    }

    /// Serve an already connected stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn serve<IO>(self, io: IO) -> Result<Server>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.config.validate()?;

        let (reader, write_half) = tokio::io::split(io);
        let (writer, writer_task) = spawn_writer_task(write_half, &self.config.writer);
        let pool = Arc::new(Semaphore::new(self.config.max_concurrent_sessions));

        let dispatcher = Dispatcher::new(
            self.transform,
            self.config.clone(),
            writer.clone(),
            pool.clone(),
        );
        let read_task = tokio::spawn(dispatcher.run(reader, self.config.max_frame_payload));

        Ok(Server {
            pool,
            max_sessions: self.config.max_concurrent_sessions,
            writer,
            read_task,
            writer_task,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running worker bound to one parent connection.
pub struct Server {
    pool: Arc<Semaphore>,
    max_sessions: usize,
    writer: WriterHandle,
    read_task: JoinHandle<Result<()>>,
    writer_task: JoinHandle<Result<()>>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Sessions currently holding a worker pool slot.
    pub fn active_sessions(&self) -> usize {
        self.max_sessions - self.pool.available_permits()
    }

    /// Get the current backpressure status.
    pub fn is_backpressure_active(&self) -> bool {
        self.writer.is_backpressure_active()
    }

    /// Get the current pending frame count.
    pub fn pending_frames(&self) -> usize {
        self.writer.pending_count()
    }

    /// Wait until the parent disconnects and queued frames are flushed.
    ///
    /// Returns the error that ended the connection, if any.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let Server {
            writer,
            read_task,
            writer_task,
            ..
        } = self;
        drop(writer);

        let outcome = read_task.await.map_err(join_error)?;

        match writer_task.await.map_err(join_error)? {
            Ok(()) => tracing::debug!("writer drained"),
            Err(e) => tracing::debug!(error = %e, "writer ended with error"),
        }

        outcome
    }
}

fn join_error(e: tokio::task::JoinError) -> EdgeStreamError {
    EdgeStreamError::Io(std::io::Error::other(e))
}

type PartSender = mpsc::Sender<std::result::Result<Part, SessionError>>;

/// Routing state of one `request_id`.
enum Call {
    /// A session is running. `parts` is `None` once end-of-input was seen.
    Active {
        serial: u64,
        parts: Option<PartSender>,
        cancel: CancelHandle,
    },
    /// Refused or aborted; frames are dropped until its end-of-input.
    Discarding,
}

/// Read side of the connection: owns the call table.
struct Dispatcher {
    transform: Arc<dyn Transform>,
    config: ServerConfig,
    schema: InitSchema,
    writer: WriterHandle,
    pool: Arc<Semaphore>,
    calls: HashMap<u32, Call>,
    next_serial: u64,
    finished_tx: mpsc::UnboundedSender<(u32, u64)>,
    finished_rx: mpsc::UnboundedReceiver<(u32, u64)>,
}

impl Dispatcher {
    fn new(
        transform: Arc<dyn Transform>,
        config: ServerConfig,
        writer: WriterHandle,
        pool: Arc<Semaphore>,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            transform,
            config,
            schema: InitSchema::edge_worker(),
            writer,
            pool,
            calls: HashMap::new(),
            next_serial: 0,
            finished_tx,
            finished_rx,
        }
    }

    async fn run<R>(mut self, mut reader: R, max_frame_payload: u32) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame_buffer = FrameBuffer::with_max_payload(max_frame_payload);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let outcome = loop {
            tokio::select! {
                biased;
                Some((request_id, serial)) = self.finished_rx.recv() => {
                    self.on_finished(request_id, serial);
                }
                read = reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => break Ok(()),
                        Ok(n) => n,
                        Err(e) => break Err(EdgeStreamError::Io(e)),
                    };
                    let frames = match frame_buffer.push(&buf[..n]) {
                        Ok(frames) => frames,
                        Err(e) => break Err(e),
                    };
                    for frame in frames {
                        self.dispatch(frame).await;
                    }
                }
            }
        };

        match &outcome {
            Ok(()) => tracing::info!("parent disconnected"),
            Err(e) => tracing::error!(error = %e, "connection failed"),
        }
        self.cancel_all();
        outcome
    }

    async fn dispatch(&mut self, frame: Frame) {
        let request_id = frame.request_id();

        if frame.is_abort() {
            self.abort(request_id);
            return;
        }

        if frame.is_response() {
            tracing::warn!(request_id, "unexpected response frame from parent");
            return;
        }

        let input_closed = matches!(
            self.calls.get(&request_id),
            Some(Call::Active { parts: None, .. })
        );
        if input_closed {
            // A finished call whose completion has not been collected yet;
            // the id is being reused.
            self.calls.remove(&request_id);
        }

        if !self.calls.contains_key(&request_id) {
            self.open(&frame);
        }

        let end = frame.is_stream_end();
        let Some(Call::Active {
            parts: parts @ Some(_),
            ..
        }) = self.calls.get_mut(&request_id)
        else {
            if end {
                self.calls.remove(&request_id);
            }
            return;
        };

        if !frame.payload.is_empty() {
            let part = MsgPackCodec::decode::<Part>(&frame.payload).map_err(|e| {
                tracing::warn!(request_id, error = %e, "malformed part");
                SessionError::Transport(format!("malformed part: {e}"))
            });
            if let Some(tx) = parts {
                if tx.send(part).await.is_err() {
                    tracing::debug!(request_id, "session no longer reading, part dropped");
                }
            }
        }

        if end {
            // Closing the queue is the session's end-of-input.
            *parts = None;
        }
    }

    /// Start routing a new call, or record why it is refused.
    fn open(&mut self, frame: &Frame) {
        let request_id = frame.request_id();
        let method_id = frame.method_id();

        if !self.schema.serves(method_id) {
            tracing::warn!(request_id, method_id, "unknown method");
            self.reject(
                frame,
                Status::new(
                    StatusCode::Unimplemented,
                    format!("unknown method id {method_id}"),
                ),
            );
            return;
        }

        if !frame.is_stream() {
            self.reject(
                frame,
                Status::new(
                    StatusCode::InvalidArgument,
                    "detectEdges expects a request stream",
                ),
            );
            return;
        }

        let permit = match self.pool.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    request_id,
                    limit = self.config.max_concurrent_sessions,
                    "worker pool exhausted, rejecting call"
                );
                self.reject(
                    frame,
                    Status::new(
                        StatusCode::ResourceExhausted,
                        "too many concurrent sessions",
                    ),
                );
                return;
            }
        };

        let serial = self.next_serial;
        self.next_serial += 1;

        let (parts, rx) = mpsc::channel(self.config.session_queue_capacity);
        let (cancel, signal) = cancellation();
        let session = StreamSession::new(request_id, self.transform.clone(), self.config.chunk_size)
            .with_cancel(signal);
        let sink = ResponseStream::new(method_id, request_id, self.writer.clone());

        tokio::spawn(run_session(
            session,
            rx,
            sink,
            permit,
            serial,
            self.finished_tx.clone(),
        ));
        tracing::debug!(request_id, "call opened");

        self.calls.insert(
            request_id,
            Call::Active {
                serial,
                parts: Some(parts),
                cancel,
            },
        );
    }

    /// Answer a refused call once and drop the rest of its frames.
    fn reject(&mut self, frame: &Frame, status: Status) {
        let request_id = frame.request_id();

        match error_frame(frame.method_id(), request_id, &status) {
            Ok(out) => {
                if let Err(EdgeStreamError::BackpressureTimeout) = self.writer.try_send(out) {
                    // The outbound queue is full; deliver without stalling the reader.
                    if let Ok(out) = error_frame(frame.method_id(), request_id, &status) {
                        let writer = self.writer.clone();
                        tokio::spawn(async move {
                            if let Err(e) = writer.send(out).await {
                                tracing::warn!(request_id, error = %e, "rejection not delivered");
                            }
                        });
                    }
                }
            }
            Err(e) => tracing::error!(request_id, error = %e, "could not encode rejection"),
        }

        if frame.is_stream() && !frame.is_stream_end() {
            self.calls.insert(request_id, Call::Discarding);
        }
    }

    fn abort(&mut self, request_id: u32) {
        match self.calls.remove(&request_id) {
            Some(Call::Active { parts, cancel, .. }) => {
                tracing::debug!(request_id, "call aborted");
                cancel.cancel();
                if parts.is_some() {
                    self.calls.insert(request_id, Call::Discarding);
                }
            }
            Some(Call::Discarding) => {
                self.calls.insert(request_id, Call::Discarding);
            }
            None => tracing::debug!(request_id, "abort for unknown call"),
        }
    }

    fn on_finished(&mut self, request_id: u32, serial: u64) {
        let input_open = match self.calls.get(&request_id) {
            Some(Call::Active { serial: s, parts, .. }) if *s == serial => parts.is_some(),
            _ => return,
        };
        if input_open {
            // Failed before END; the parent is still streaming this call.
            tracing::debug!(request_id, "call finished early, discarding until end");
            self.calls.insert(request_id, Call::Discarding);
        } else {
            self.calls.remove(&request_id);
        }
    }

    fn cancel_all(&mut self) {
        let live = self.calls.len();
        for (_, call) in self.calls.drain() {
            if let Call::Active { cancel, .. } = call {
                cancel.cancel();
            }
        }
        if live > 0 {
            tracing::debug!(calls = live, "cancelled live calls");
        }
    }
}

async fn run_session(
    mut session: StreamSession,
    mut parts: mpsc::Receiver<std::result::Result<Part, SessionError>>,
    mut sink: ResponseStream,
    permit: OwnedSemaphorePermit,
    serial: u64,
    finished: mpsc::UnboundedSender<(u32, u64)>,
) {
    let request_id = session.request_id();

    match session.run(&mut parts, &mut sink).await {
        Ok(()) => tracing::debug!(request_id, "call completed"),
        Err(SessionError::Cancelled) => {}
        Err(e) => tracing::debug!(request_id, code = ?e.code(), "call failed"),
    }

    drop(permit);
    let _ = finished.send((request_id, serial));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let builder = Server::builder()
            .max_concurrent_sessions(3)
            .chunk_size(512)
            .session_queue_capacity(8)
            .max_frame_payload(1 << 20)
            .max_pending_frames(2048)
            .channel_capacity(512)
            .backpressure_timeout(Duration::from_secs(10));

        assert_eq!(builder.config.max_concurrent_sessions, 3);
        assert_eq!(builder.config.chunk_size, 512);
        assert_eq!(builder.config.session_queue_capacity, 8);
        assert_eq!(builder.config.max_frame_payload, 1 << 20);
        assert_eq!(builder.config.writer.max_pending_frames, 2048);
        assert_eq!(builder.config.writer.channel_capacity, 512);
        assert_eq!(
            builder.config.writer.backpressure_timeout,
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_serve_rejects_invalid_config() {
        let (io, _peer) = tokio::io::duplex(64);
        let result = Server::builder().chunk_size(0).serve(io);

        assert!(matches!(result, Err(EdgeStreamError::Config(_))));
    }

    #[tokio::test]
    async fn test_shutdown_when_peer_closes() {
        let (io, peer) = tokio::io::duplex(64);
        let server = Server::builder().serve(io).unwrap();
        assert_eq!(server.active_sessions(), 0);
        assert_eq!(server.pending_frames(), 0);

        drop(peer);
        server.wait_for_shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_protocol_error_ends_connection() {
        use crate::protocol::{flags, Header};
        use tokio::io::AsyncWriteExt;

        let (io, mut peer) = tokio::io::duplex(1024);
        let server = Server::builder().max_frame_payload(16).serve(io).unwrap();

        let header = Header::new(1, flags::REQUEST_PART, 1, 1024);
        peer.write_all(&header.encode()).await.unwrap();

        let err = server.wait_for_shutdown().await.unwrap_err();
        assert!(matches!(err, EdgeStreamError::Protocol(_)));
    }
}

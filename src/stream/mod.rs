//! Streaming core - reassembly, processing and re-emission of one call.
//!
//! ```text
//! inbound parts ─► ChunkAssembler ─► (payload, params) ─► Transform
//!                                                             │
//! outbound chunks ◄─────────────── ChunkEmitter ◄── output ◄──┘
//! ```
//!
//! [`StreamSession`] drives the pipeline and maps failures to one terminal
//! [`Status`](crate::message::Status).

mod assembler;
mod emitter;
mod session;

pub use assembler::ChunkAssembler;
pub use emitter::{ChunkEmitter, DEFAULT_CHUNK_SIZE};
pub use session::{
    cancellation, BoxFuture, CancelHandle, CancelSignal, ChunkSink, PartSource, SessionState,
    StreamSession,
};

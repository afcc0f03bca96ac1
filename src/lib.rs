//! # edgestream
//!
//! Edge-detection worker speaking a chunked, bidirectional streaming protocol.
//!
//! A parent process streams an image to the worker as a sequence of parts
//! (data chunks plus one set of thresholds). The worker reassembles it, runs
//! the transform and streams the result back in bounded chunks.
//!
//! ## Architecture
//!
//! - **Control Plane** (stdio): one JSON `$init` line announcing the pipe
//! - **Data Plane** (named pipe / Unix socket): framed binary protocol,
//!   one call per `request_id`, many calls multiplexed on one connection
//! - **Sessions**: [`stream::StreamSession`] drives one call through
//!   `Receiving → Processing → Emitting → Done`, independent of the transport
//!
//! ## Example
//!
//! ```ignore
//! use edgestream::Server;
//!
//! #[tokio::main]
//! async fn main() -> edgestream::Result<()> {
//!     let server = Server::builder().chunk_size(2048).start().await?;
//!     server.wait_for_shutdown().await
//! }
//! ```

pub mod call;
pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod message;
pub mod protocol;
pub mod response;
pub mod stream;
pub mod transform;
pub mod transport;
pub mod writer;

mod backpressure;
mod server;

pub use config::ServerConfig;
pub use error::{EdgeStreamError, Result, SessionError};
pub use message::{ControlParameters, OutputChunk, Part, Status, StatusCode};
pub use server::{Server, ServerBuilder};
pub use transform::{EdgeDetector, Transform, TransformError};

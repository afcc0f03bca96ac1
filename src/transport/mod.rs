//! Data-plane transport: Unix Domain Sockets on Unix, Named Pipes on Windows.

mod pipe;

pub use pipe::{bind_fresh, generate_pipe_path, PipeListener, PipeStream};

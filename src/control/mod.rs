//! Control plane: the `$init` handshake over stdout.
//!
//! 1. Worker binds a pipe listener
//! 2. Worker writes `$init` to stdout
//! 3. Parent connects to the pipe
//! 4. Framed binary traffic begins on the data plane

mod init;
mod stdio;

pub use init::{build_init_message, InitSchema, MethodSchema, ResponseType, PROTOCOL_VERSION};
pub use stdio::{write_line, write_stdout_line};

//! Platform-specific pipe listener.
//!
//! - Unix: Unix Domain Socket in the temp directory
//! - Windows: Named Pipe
//!
//! The worker serves exactly one parent, so the listener accepts a single
//! connection and is then dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

const PIPE_PREFIX: &str = "edgestream";

static PIPE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a unique pipe path for this process.
///
/// Format:
/// - Unix: `$TMPDIR/edgestream-{pid}-{nonce}.sock`
/// - Windows: `\\.\pipe\edgestream-{pid}-{nonce}`
pub fn generate_pipe_path() -> String {
    let pid = std::process::id();
    let nonce = nonce();

    #[cfg(unix)]
    {
        std::env::temp_dir()
            .join(format!("{PIPE_PREFIX}-{pid}-{nonce:x}.sock"))
            .to_string_lossy()
            .into_owned()
    }

    #[cfg(windows)]
    {
        format!(r"\\.\pipe\{PIPE_PREFIX}-{pid}-{nonce:x}")
    }
}

/// Time-seeded value, distinct for every call within the process.
fn nonce() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = PIPE_SEQ.fetch_add(1, Ordering::Relaxed);

    nanos.wrapping_mul(0x517c_c1b7_2722_0a95) ^ seq.rotate_left(48)
}

#[cfg(unix)]
mod unix_impl {
    use std::path::Path;

    use tokio::net::{UnixListener, UnixStream};

    use crate::error::Result;

    /// Connected data-plane stream.
    pub type PipeStream = UnixStream;

    /// Unix Domain Socket listener; removes its socket file on drop.
    pub struct PipeListener {
        listener: UnixListener,
        path: String,
    }

    impl PipeListener {
        /// Bind to a socket path, replacing a stale socket file.
        pub async fn bind(path: &str) -> Result<Self> {
            if Path::new(path).exists() {
                std::fs::remove_file(path)?;
            }

            let listener = UnixListener::bind(path)?;
            tracing::debug!(path, "pipe listener bound");

            Ok(Self {
                listener,
                path: path.to_string(),
            })
        }

        pub async fn accept(&self) -> Result<PipeStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(stream)
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(windows)]
mod windows_impl {
    use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};

    use crate::error::Result;

    /// Connected data-plane stream.
    pub type PipeStream = NamedPipeServer;

    /// Windows Named Pipe listener.
    ///
    /// The first instance is created on bind so the name is reserved before
    /// `$init` announces it.
    pub struct PipeListener {
        server: tokio::sync::Mutex<Option<NamedPipeServer>>,
        path: String,
    }

    impl PipeListener {
        pub async fn bind(path: &str) -> Result<Self> {
            let server = ServerOptions::new()
                .first_pipe_instance(true)
                .create(path)?;
            tracing::debug!(path, "named pipe created");

            Ok(Self {
                server: tokio::sync::Mutex::new(Some(server)),
                path: path.to_string(),
            })
        }

        pub async fn accept(&self) -> Result<PipeStream> {
            let server = match self.server.lock().await.take() {
                Some(server) => server,
                None => ServerOptions::new().create(&self.path)?,
            };
            server.connect().await?;
            Ok(server)
        }

        pub fn path(&self) -> &str {
            &self.path
        }
    }
}

#[cfg(unix)]
pub use unix_impl::{PipeListener, PipeStream};

#[cfg(windows)]
pub use windows_impl::{PipeListener, PipeStream};

/// Bind a listener on a freshly generated path.
pub async fn bind_fresh() -> Result<PipeListener> {
    PipeListener::bind(&generate_pipe_path()).await
}

//! Edge worker - serves `detectEdges` to the parent process over a pipe.
//!
//! stdout carries the `$init` line only; every log line goes to stderr.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use edgestream::{EdgeDetector, Server, ServerConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "edge-worker")]
#[command(about = "Chunked streaming edge-detection worker")]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long, env = "EDGESTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Sessions processed at the same time
    #[arg(long, env = "EDGESTREAM_MAX_SESSIONS")]
    max_sessions: Option<usize>,

    /// Maximum size of one output chunk in bytes
    #[arg(long, env = "EDGESTREAM_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Parts buffered per session before the reader waits
    #[arg(long, env = "EDGESTREAM_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Largest accepted inbound frame payload in bytes
    #[arg(long, env = "EDGESTREAM_MAX_FRAME_PAYLOAD")]
    max_frame_payload: Option<u32>,

    /// Outbound frames queued before sessions wait
    #[arg(long, env = "EDGESTREAM_MAX_PENDING_FRAMES")]
    max_pending_frames: Option<usize>,

    /// How long a session waits on a full outbound queue, in milliseconds
    #[arg(long, env = "EDGESTREAM_BACKPRESSURE_TIMEOUT_MS")]
    backpressure_timeout_ms: Option<u64>,

    /// JPEG quality of the returned edge map (1-100)
    #[arg(long, default_value = "95", env = "EDGESTREAM_JPEG_QUALITY")]
    jpeg_quality: u8,

    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                ServerConfig::from_json(&json)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => ServerConfig::default(),
        };

        if let Some(n) = self.max_sessions {
            config.max_concurrent_sessions = n;
        }
        if let Some(n) = self.chunk_size {
            config.chunk_size = n;
        }
        if let Some(n) = self.queue_capacity {
            config.session_queue_capacity = n;
        }
        if let Some(n) = self.max_frame_payload {
            config.max_frame_payload = n;
        }
        if let Some(n) = self.max_pending_frames {
            config.writer.max_pending_frames = n;
        }
        if let Some(ms) = self.backpressure_timeout_ms {
            config.writer.backpressure_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = args.server_config()?;
    info!(
        max_sessions = config.max_concurrent_sessions,
        chunk_size = config.chunk_size,
        "starting edge worker"
    );

    let server = Server::builder()
        .transform(EdgeDetector::new().with_quality(args.jpeg_quality))
        .config(config)
        .start()
        .await
        .context("starting server")?;

    tokio::select! {
        result = server.wait_for_shutdown() => {
            result.context("connection to parent failed")?;
            info!("parent closed the connection, exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, exiting");
        }
    }

    Ok(())
}

//! Detect Edges - parent side of a `detectEdges` call.
//!
//! Spawns the worker, waits for its `$init` line, connects to the announced
//! pipe, streams an image and writes the returned edge map.
//!
//! # Running
//!
//! ```text
//! cargo build --bin edge-worker
//! cargo run --example detect_edges -- photo.png edges.jpg
//! ```
//!
//! Optional third and fourth arguments set the Canny thresholds
//! (default 100 and 200). `EDGE_WORKER` overrides the worker path.

use std::process::Stdio;

use anyhow::{bail, Context, Result};
use edgestream::call::{RequestEncoder, ResponseCollector};
use edgestream::message::ControlParameters;
use edgestream::protocol::FrameBuffer;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (input, output) = match (args.first(), args.get(1)) {
        (Some(input), Some(output)) => (input.clone(), output.clone()),
        _ => bail!("usage: detect_edges <input image> <output.jpg> [min] [max]"),
    };
    let min = args.get(2).map(|s| s.parse::<i32>()).transpose()?.unwrap_or(100);
    let max = args.get(3).map(|s| s.parse::<i32>()).transpose()?.unwrap_or(200);

    let image = tokio::fs::read(&input)
        .await
        .with_context(|| format!("reading {input}"))?;

    let worker = std::env::var("EDGE_WORKER").unwrap_or_else(|_| "target/debug/edge-worker".into());
    let mut child = Command::new(&worker)
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning {worker}"))?;

    // Control plane: the first stdout line is $init.
    let stdout = child.stdout.take().context("worker stdout not captured")?;
    let mut line = String::new();
    BufReader::new(stdout).read_line(&mut line).await?;
    let init: serde_json::Value = serde_json::from_str(&line).context("parsing $init")?;
    let pipe = init["params"]["pipe"]
        .as_str()
        .context("$init without pipe path")?
        .to_string();
    tracing::info!(%pipe, "worker ready");

    let mut conn = connect(&pipe).await?;

    let request_id = 1;
    let request = RequestEncoder::new(request_id).encode(&image, ControlParameters::new(min, max))?;
    conn.write_all(&request).await?;

    let mut collector = ResponseCollector::new(request_id);
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; 64 * 1024];

    let outcome = 'read: loop {
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            bail!("worker closed the connection before answering");
        }
        for frame in frames.push(&buf[..n])? {
            if let Some(outcome) = collector.push(&frame)? {
                break 'read outcome;
            }
        }
    };

    match outcome {
        Ok(edges) => {
            tokio::fs::write(&output, &edges).await?;
            tracing::info!(
                chunks = collector.chunks().len(),
                bytes = edges.len(),
                "edge map written to {}",
                output
            );
        }
        Err(status) => bail!("worker reported {status}"),
    }

    drop(conn);
    child.wait().await?;
    Ok(())
}

#[cfg(unix)]
async fn connect(pipe: &str) -> Result<tokio::net::UnixStream> {
    Ok(tokio::net::UnixStream::connect(pipe).await?)
}

#[cfg(windows)]
async fn connect(pipe: &str) -> Result<tokio::net::windows::named_pipe::NamedPipeClient> {
    Ok(tokio::net::windows::named_pipe::ClientOptions::new().open(pipe)?)
}

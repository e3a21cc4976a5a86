//! Client dispatcher: single-shot and batch drivers
//!
//! Both modes write newline-terminated command lines into the daemon's
//! socket and demultiplex the frame stream coming back. The stream is a
//! merged view: frames of concurrent commands interleave arbitrarily and
//! are not attributed to the command that produced them.

use std::io::Write;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio_util::codec::FramedRead;

use remote_protocol::{Frame, FrameCodec};

use crate::spawn::connect_or_spawn;

/// Execute one command and exit with its remote status.
///
/// The process terminates as soon as the Exit frame arrives; frames of
/// other sessions past it are irrelevant to a single-shot client.
pub async fn run_single(identity: &str, args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("no command provided");
    }

    let stream = connect_or_spawn(identity).await?;
    let (read_half, mut write_half) = stream.into_split();

    let cmd = args.join(" ");
    write_half
        .write_all(format!("{cmd}\n").as_bytes())
        .await
        .context("sending command")?;

    let mut frames = FramedRead::new(read_half, FrameCodec::new());
    while let Some(frame) = frames.next().await {
        match frame.context("reading response")? {
            Frame::Stdout(data) => write_stream(&mut std::io::stdout(), &data)?,
            Frame::Stderr(data) => write_stream(&mut std::io::stderr(), &data)?,
            Frame::Exit(code) => std::process::exit(code as i32),
        }
    }

    bail!("connection closed before exit status")
}

/// Feed stdin lines to the daemon and print the merged frame stream.
///
/// Exits cleanly when the daemon closes its side after the last
/// in-flight command; nonzero command statuses are reported inline on
/// stderr rather than ending the run.
pub async fn run_batch(identity: &str) -> Result<()> {
    let stream = connect_or_spawn(identity).await?;
    let (read_half, write_half) = stream.into_split();

    let producer = tokio::spawn(send_stdin_lines(write_half));

    let mut frames = FramedRead::new(read_half, FrameCodec::new());
    while let Some(frame) = frames.next().await {
        match frame.context("reading response")? {
            Frame::Stdout(data) => write_stream(&mut std::io::stdout(), &data)?,
            Frame::Stderr(data) => write_stream(&mut std::io::stderr(), &data)?,
            Frame::Exit(code) if code != 0 => eprintln!("[Exit {code}]"),
            Frame::Exit(_) => {}
        }
    }

    // The daemon closed its side; if stdin is still open there is
    // nobody left to read what the producer would send.
    producer.abort();
    let _ = producer.await;
    Ok(())
}

/// Forward nonempty stdin lines, then half-close to signal
/// end-of-stream to the daemon
async fn send_stdin_lines(mut write_half: OwnedWriteHalf) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let cmd = line.trim();
                if cmd.is_empty() {
                    continue;
                }
                if let Err(e) = write_half.write_all(format!("{cmd}\n").as_bytes()).await {
                    tracing::warn!("failed to send command: {e}");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("stdin read error: {e}");
                break;
            }
        }
    }
    if let Err(e) = write_half.shutdown().await {
        tracing::warn!("failed to half-close socket: {e}");
    }
}

fn write_stream(out: &mut impl Write, data: &[u8]) -> Result<()> {
    out.write_all(data)?;
    out.flush()?;
    Ok(())
}

//! The request I/O pump.
//!
//! One cooperative loop multiplexes the stdin feed, the child's output
//! streams, and SIGCHLD. Protocol version two streams every chunk as a
//! tagged frame; version one accumulates into a capped buffer that is
//! returned with the exit status. Reaping the child does not end the
//! pump: output still sitting in kernel buffers is drained with
//! nonblocking passes until one comes up empty.

use std::io;

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{debug, warn};

use remex_protocol::{ClientStream, ErrorCode, OutputStream, MAX_OUTPUT, MAX_OUTPUT_V1};
use remex_unix::process::canonical_status;

use super::Process;
use crate::errors::{EngineError, Result};

/// Per-request SIGCHLD funnel.
///
/// Created before the child is forked so an early exit cannot be missed.
/// Signal delivery is process-wide; deliveries for other children are
/// ignored by the reap check, which keeps concurrent engine instances
/// separable.
pub(crate) struct SigChld {
    inner: Signal,
}

impl SigChld {
    pub(crate) fn new() -> Result<Self> {
        signal(SignalKind::child())
            .map(|inner| SigChld { inner })
            .map_err(|source| EngineError::Signal { source })
    }

    async fn recv(&mut self) {
        self.inner.recv().await;
    }
}

/// Output disposition for the request.
///
/// `Accumulate` switches to `Discard` when the version one cap is
/// reached: the first `MAX_OUTPUT_V1` bytes are frozen and everything
/// after is drained and thrown away while the child keeps running.
enum OutputMode {
    Streamed,
    Accumulate(Vec<u8>),
    Discard(Vec<u8>),
}

enum ReadOutcome {
    Data,
    Eof,
    /// Connection reset: stop both reading and writing this endpoint,
    /// silently.
    PeerGone,
    Broke,
}

struct StdinFeed {
    wr: OwnedWriteHalf,
    data: Vec<u8>,
    pos: usize,
}

/// Drive the child's I/O until it has been reaped and its buffered output
/// drained, or an unrecoverable error breaks the loop. Returns true on
/// success; on failure any error frame owed to the client has already
/// been sent, and the caller still reaps and cleans up.
pub(crate) async fn pump<C: ClientStream>(
    client: &mut C,
    process: &mut Process,
    sigchld: &mut SigChld,
) -> bool {
    let mut mode = if client.protocol().streams_output() {
        OutputMode::Streamed
    } else {
        OutputMode::Accumulate(Vec::new())
    };

    let Some(stdinout) = process.stdinout.take() else {
        warn!("process has no stdin/stdout channel");
        return false;
    };
    let (mut stdout_rd, stdin_wr) = stdinout.into_split();
    let mut stderr_rd = process.stderr.take();

    // With no input to feed, the write half stays open but idle (the
    // child's stdin is /dev/null) and closes with the channel.
    let mut feed = match process.stdin_payload.take() {
        Some(data) => Some(StdinFeed {
            wr: stdin_wr,
            data,
            pos: 0,
        }),
        None => None,
    };

    let mut rbuf = vec![0u8; MAX_OUTPUT];
    let mut ebuf = vec![0u8; MAX_OUTPUT];
    let mut stdout_open = true;
    let mut stderr_open = stderr_rd.is_some();
    let mut broke = false;

    // Blocking phase: wait on all sources until the child is reaped or an
    // error breaks the loop.
    while !process.reaped && !broke {
        tokio::select! {
            res = stdout_rd.read(&mut rbuf), if stdout_open => {
                match handle_read(client, res, &rbuf, OutputStream::Stdout, &mut mode).await {
                    ReadOutcome::Data => {}
                    ReadOutcome::Eof => stdout_open = false,
                    ReadOutcome::PeerGone => {
                        stdout_open = false;
                        feed = None;
                    }
                    ReadOutcome::Broke => broke = true,
                }
            }
            res = read_stderr(&mut stderr_rd, &mut ebuf), if stderr_open => {
                match handle_read(client, res, &ebuf, OutputStream::Stderr, &mut mode).await {
                    ReadOutcome::Data => {}
                    ReadOutcome::Eof | ReadOutcome::PeerGone => stderr_open = false,
                    ReadOutcome::Broke => broke = true,
                }
            }
            res = write_feed(&mut feed), if feed.is_some() => {
                match res {
                    Ok(written) => {
                        let finished = match feed.as_mut() {
                            Some(f) => {
                                f.pos += written;
                                f.pos >= f.data.len()
                            }
                            None => false,
                        };
                        if finished {
                            // Input delivered: shut down our write half so
                            // the child sees EOF on its next read.
                            if let Some(f) = feed.take() {
                                let mut wr = f.wr;
                                if let Err(e) = wr.shutdown().await {
                                    warn!("cannot shut down input side of process socket pair: {e}");
                                    let _ = client
                                        .send_error(ErrorCode::Internal, "Internal failure")
                                        .await;
                                    broke = true;
                                }
                            }
                        }
                    }
                    Err(e) if peer_gone(&e) => {
                        // The child went away without reading its input.
                        stdout_open = false;
                        feed = None;
                    }
                    Err(e) => {
                        warn!("write to standard input failed: {e}");
                        let _ = client
                            .send_error(ErrorCode::Internal, "Internal failure")
                            .await;
                        broke = true;
                    }
                }
            }
            _ = sigchld.recv() => {
                try_reap(process);
            }
        }
    }

    // Nonblocking drain: the exit status can arrive while output is still
    // sitting in kernel buffers. Keep taking passes over the live streams
    // until one produces nothing.
    if process.reaped && !broke {
        loop {
            let mut saw_output = false;

            if stdout_open && !broke {
                match stdout_rd.try_read(&mut rbuf) {
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    res => match handle_read(client, res, &rbuf, OutputStream::Stdout, &mut mode)
                        .await
                    {
                        ReadOutcome::Data => saw_output = true,
                        ReadOutcome::Eof | ReadOutcome::PeerGone => stdout_open = false,
                        ReadOutcome::Broke => broke = true,
                    },
                }
            }

            if stderr_open && !broke {
                if let Some(stderr) = stderr_rd.as_mut() {
                    match stderr.try_read(&mut ebuf) {
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        res => match handle_read(client, res, &ebuf, OutputStream::Stderr, &mut mode)
                            .await
                        {
                            ReadOutcome::Data => saw_output = true,
                            ReadOutcome::Eof | ReadOutcome::PeerGone => stderr_open = false,
                            ReadOutcome::Broke => broke = true,
                        },
                    }
                }
            }

            if !saw_output || broke {
                break;
            }
        }
    }

    // Whatever is still buffered for protocol version one becomes the
    // final output.
    process.output = match mode {
        OutputMode::Streamed => Vec::new(),
        OutputMode::Accumulate(acc) => acc,
        OutputMode::Discard(kept) => kept,
    };

    !broke
}

async fn read_stderr(stderr: &mut Option<UnixStream>, buf: &mut [u8]) -> io::Result<usize> {
    match stderr {
        Some(stream) => stream.read(buf).await,
        // Unreachable under the select guard.
        None => std::future::pending().await,
    }
}

async fn write_feed(feed: &mut Option<StdinFeed>) -> io::Result<usize> {
    match feed {
        Some(f) => f.wr.write(&f.data[f.pos..]).await,
        // Unreachable under the select guard.
        None => std::future::pending().await,
    }
}

/// Handle one read result from a child stream: forward, accumulate, or
/// classify the failure.
async fn handle_read<C: ClientStream>(
    client: &mut C,
    res: io::Result<usize>,
    buf: &[u8],
    stream: OutputStream,
    mode: &mut OutputMode,
) -> ReadOutcome {
    match res {
        Ok(0) => ReadOutcome::Eof,
        Ok(n) => match mode {
            OutputMode::Streamed => {
                if client.send_output(stream, &buf[..n]).await.is_err() {
                    // The transport failed; no error frame is owed on a
                    // channel we can no longer write.
                    debug!("cannot send output to client, aborting");
                    ReadOutcome::Broke
                } else {
                    ReadOutcome::Data
                }
            }
            OutputMode::Accumulate(acc) => {
                acc.extend_from_slice(&buf[..n]);
                if acc.len() >= MAX_OUTPUT_V1 {
                    let mut kept = std::mem::take(acc);
                    kept.truncate(MAX_OUTPUT_V1);
                    *mode = OutputMode::Discard(kept);
                }
                ReadOutcome::Data
            }
            OutputMode::Discard(_) => ReadOutcome::Data,
        },
        Err(e) if peer_gone(&e) => ReadOutcome::PeerGone,
        Err(e) => {
            warn!("read from process failed: {e}");
            let _ = client
                .send_error(ErrorCode::Internal, "Internal failure")
                .await;
            ReadOutcome::Broke
        }
    }
}

fn peer_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}

/// Reap the child if it was the process that exited; deliveries for other
/// children and stop/continue events are ignored.
fn try_reap(process: &mut Process) {
    match waitpid(process.pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => {}
        Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
            process.status = canonical_status(status);
            process.reaped = true;
        }
        Ok(_) => {}
        Err(e) => debug!("waitpid on child {} failed: {e}", process.pid),
    }
}

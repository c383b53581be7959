//! Child process lifecycle: launching and the I/O pump.

mod pump;
mod spawn;

pub(crate) use pump::{pump, SigChld};
pub(crate) use spawn::{spawn_child, SpawnParams};

use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use tokio::net::UnixStream;
use tracing::warn;

use remex_unix::process::canonical_status;

/// A launched child and its parent-side endpoints.
///
/// The parent holds exactly the parent ends of the socket pairs; the
/// child ends are closed before the pump starts. For protocol version one
/// `stdinout` carries stdin, stdout, and stderr; for version two stderr
/// has its own channel.
pub(crate) struct Process {
    pub pid: Pid,
    /// Canonical exit status; meaningful once `reaped` is true.
    pub status: i32,
    pub reaped: bool,
    /// Bytes to feed to the child's stdin, if the rule designated one of
    /// the arguments for it.
    pub stdin_payload: Option<Vec<u8>>,
    /// Combined stdin/stdout channel.
    pub stdinout: Option<UnixStream>,
    /// Separate stderr channel (protocol version two and later).
    pub stderr: Option<UnixStream>,
    /// Accumulated output for protocol version one, filled by the pump.
    pub output: Vec<u8>,
}

impl Process {
    /// Reap the child if the pump has not, blocking until it exits. The
    /// pump closes the parent-side channels before this runs, so a child
    /// blocked on I/O sees EOF or EPIPE and can finish.
    pub fn reap_blocking(&mut self) {
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    self.status = canonical_status(status);
                    self.reaped = true;
                    return;
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    warn!("cannot reap child process {}: {e}", self.pid);
                    return;
                }
            }
        }
    }
}

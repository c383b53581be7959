//! Process helpers shared by the launcher and the pump.

use nix::sys::wait::WaitStatus;

/// Close every file descriptor in `[low, high)`.
///
/// Host libraries that do not set close-on-exec can leak descriptors into
/// the child; the launcher sweeps the low fd range between fork and exec.
/// Only `close(2)` is called, so this is safe after fork.
pub fn close_fd_range(low: i32, high: i32) {
    for fd in low..high {
        // SAFETY: close is async-signal-safe; a descriptor that is not
        // open fails with EBADF, which is ignored. The caller must not
        // use any descriptor in the range after the sweep.
        unsafe {
            libc::close(fd);
        }
    }
}

/// Collapse a raw wait status into the form sent on the wire: the exit
/// code for a normal exit, `-1` for anything else (killed by a signal,
/// core dumped).
pub fn canonical_status(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        _ => -1,
    }
}

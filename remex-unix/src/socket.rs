//! Stream socket pairs for child process stdio.
//!
//! The I/O pump writes input and reads output on the same descriptor and
//! shuts down just the write half to signal EOF to the child, so the
//! stdin/stdout channel must be a bidirectional socket rather than a pipe.

use std::os::fd::OwnedFd;

use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};

/// Create a connected `AF_UNIX` stream socket pair, both ends marked
/// close-on-exec so concurrent launches cannot leak each other's
/// endpoints. `dup2` onto the child's standard descriptors clears the
/// flag on the copies that must survive exec.
pub fn stream_socketpair() -> nix::Result<(OwnedFd, OwnedFd)> {
    socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        SockFlag::SOCK_CLOEXEC,
    )
}

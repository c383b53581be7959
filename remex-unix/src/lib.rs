//! Unix plumbing for the remex server.
//!
//! Socket pairs for child stdio, the low-descriptor sweep run between
//! fork and exec, and the privilege drop applied when a rule names a
//! run-as user.

#[cfg(not(unix))]
compile_error!("remex-unix requires a unix target");

pub mod identity;
pub mod process;
pub mod socket;

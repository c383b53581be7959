//! Server-side command execution engine for the remex remote command
//! service.
//!
//! A request that has already been authenticated at the transport layer
//! is resolved against a rule table, validated, launched as a child
//! process under a controlled environment and identity, and its output
//! streamed back through the client's protocol version. Transport,
//! configuration parsing, and ACL evaluation are collaborators consumed
//! through the seams in [`remex_protocol`] and [`acl`].

#[cfg(not(unix))]
compile_error!("remex-server requires a unix target");

pub mod acl;
mod audit;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod errors;
mod process;

pub use acl::{AclGate, StaticAcl};
pub use config::{Config, Rule, RunAs};
pub use dispatch::run_command;
pub use errors::{EngineError, Result};

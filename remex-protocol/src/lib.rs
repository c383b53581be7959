//! Protocol vocabulary shared by the remex server and its transports.
//!
//! The engine never touches the wire. This crate defines what it needs to
//! know about the protocol (versions, stream tags, error codes, output
//! caps) and the [`ClientStream`] seam through which frames are handed to
//! the session layer.

pub mod client;
pub mod protocol;

pub use client::ClientStream;
pub use protocol::{ErrorCode, OutputStream, ProtocolVersion, MAX_OUTPUT, MAX_OUTPUT_V1};

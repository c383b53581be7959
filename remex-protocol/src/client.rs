use std::io;

use crate::protocol::{ErrorCode, OutputStream, ProtocolVersion};

/// Transport seam between the execution engine and the session layer.
///
/// Authentication, token framing, and encryption all live on the other
/// side of this trait. The engine only needs the authenticated peer
/// identity, the negotiated protocol version, and the four message
/// primitives below. Sends are ordered, and the engine guarantees that
/// the final frame of a successful request is a status frame.
#[allow(async_fn_in_trait)]
pub trait ClientStream {
    /// Authenticated principal of the peer.
    fn user(&self) -> &str;

    /// Peer IP address in presentation form.
    fn ip_address(&self) -> &str;

    /// Peer DNS name, when known.
    fn hostname(&self) -> Option<&str>;

    /// Negotiated protocol version.
    fn protocol(&self) -> ProtocolVersion;

    /// Send one tagged output frame (protocol version two and later).
    async fn send_output(&mut self, stream: OutputStream, data: &[u8]) -> io::Result<()>;

    /// Send the final status frame (protocol version two and later).
    async fn send_status(&mut self, status: i32) -> io::Result<()>;

    /// Send the combined output and status message (protocol version one).
    async fn send_output_v1(&mut self, output: &[u8], status: i32) -> io::Result<()>;

    /// Send an error frame.
    async fn send_error(&mut self, code: ErrorCode, message: &str) -> io::Result<()>;
}

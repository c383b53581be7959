use serde::{Deserialize, Serialize};

/// Maximum payload of a single output frame (protocol version two and
/// later). One readable event on a child stream emits at most this many
/// bytes to the client.
pub const MAX_OUTPUT: usize = 64 * 1024;

/// Total output cap for a protocol version one request. The first
/// `MAX_OUTPUT_V1` bytes are returned with the exit status; anything
/// beyond is discarded while the command keeps running.
pub const MAX_OUTPUT_V1: usize = 32 * 1024;

/// Negotiated wire protocol version.
///
/// Version one returns merged stdout and stderr once, at command
/// completion, together with the exit status. Version two and later
/// stream tagged output frames per stream and finish with a separate
/// status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion(u32);

impl ProtocolVersion {
    pub const V1: ProtocolVersion = ProtocolVersion(1);
    pub const V2: ProtocolVersion = ProtocolVersion(2);

    /// Wrap a negotiated version number. Versions below one do not exist
    /// on the wire and are clamped up.
    pub fn new(version: u32) -> Self {
        ProtocolVersion(version.max(1))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Whether output is streamed as tagged frames (version two and
    /// later) rather than buffered until completion.
    pub fn streams_output(self) -> bool {
        self.0 >= 2
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stream tag carried on version two output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Tag octet on the wire: 1 for stdout, 2 for stderr.
    pub fn wire_tag(self) -> u8 {
        match self {
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes delivered to the client in error frames. The enum
/// discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    /// Server-side failure not attributable to the request.
    Internal = 1,
    /// Malformed request: empty argv, or a nul octet in a position that
    /// forbids one.
    BadCommand = 4,
    /// No configured rule matches the request.
    UnknownCommand = 5,
    /// A rule matched but the client may not run it.
    Access = 6,
    /// Help request carried more arguments than a command and subcommand.
    TooManyArgs = 7,
    /// Help was requested for a rule with no help subcommand.
    NoHelp = 9,
}

impl ErrorCode {
    pub fn wire_code(self) -> u32 {
        self as u32
    }
}

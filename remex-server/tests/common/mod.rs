//! Shared fixtures: a frame-collecting client and script-backed rules.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;

use remex_protocol::{ClientStream, ErrorCode, OutputStream, ProtocolVersion};
use remex_server::Rule;

pub const TEST_USER: &str = "tester@EXAMPLE.ORG";

/// One frame captured by the mock transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Output(OutputStream, Vec<u8>),
    Status(i32),
    OutputV1(Vec<u8>, i32),
    Error(ErrorCode, String),
}

/// In-memory client: records every frame the engine sends, in order.
pub struct MockClient {
    protocol: ProtocolVersion,
    pub frames: Vec<Frame>,
}

impl MockClient {
    pub fn v1() -> Self {
        MockClient {
            protocol: ProtocolVersion::V1,
            frames: Vec::new(),
        }
    }

    pub fn v2() -> Self {
        MockClient {
            protocol: ProtocolVersion::V2,
            frames: Vec::new(),
        }
    }

    /// Concatenated payload of all frames tagged with `stream`.
    pub fn stream_bytes(&self, stream: OutputStream) -> Vec<u8> {
        let mut out = Vec::new();
        for frame in &self.frames {
            if let Frame::Output(tag, data) = frame {
                if *tag == stream {
                    out.extend_from_slice(data);
                }
            }
        }
        out
    }

    pub fn stdout_bytes(&self) -> Vec<u8> {
        self.stream_bytes(OutputStream::Stdout)
    }

    pub fn stderr_bytes(&self) -> Vec<u8> {
        self.stream_bytes(OutputStream::Stderr)
    }

    /// The status frames seen (protocol two and later).
    pub fn statuses(&self) -> Vec<i32> {
        self.frames
            .iter()
            .filter_map(|f| match f {
                Frame::Status(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// The single final status (protocol two), asserting it terminates
    /// the frame sequence.
    pub fn final_status(&self) -> i32 {
        match self.frames.last() {
            Some(Frame::Status(s)) => *s,
            other => panic!("last frame is not a status frame: {other:?}"),
        }
    }

    /// The combined output and status message (protocol one), asserting
    /// it terminates the frame sequence.
    pub fn v1_result(&self) -> (Vec<u8>, i32) {
        match self.frames.last() {
            Some(Frame::OutputV1(data, s)) => (data.clone(), *s),
            other => panic!("last frame is not a v1 output message: {other:?}"),
        }
    }

    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.frames
            .iter()
            .filter_map(|f| match f {
                Frame::Error(code, _) => Some(*code),
                _ => None,
            })
            .collect()
    }
}

impl ClientStream for MockClient {
    fn user(&self) -> &str {
        TEST_USER
    }

    fn ip_address(&self) -> &str {
        "192.0.2.3"
    }

    fn hostname(&self) -> Option<&str> {
        Some("client.example.org")
    }

    fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    async fn send_output(&mut self, stream: OutputStream, data: &[u8]) -> io::Result<()> {
        self.frames.push(Frame::Output(stream, data.to_vec()));
        Ok(())
    }

    async fn send_status(&mut self, status: i32) -> io::Result<()> {
        self.frames.push(Frame::Status(status));
        Ok(())
    }

    async fn send_output_v1(&mut self, output: &[u8], status: i32) -> io::Result<()> {
        self.frames.push(Frame::OutputV1(output.to_vec(), status));
        Ok(())
    }

    async fn send_error(&mut self, code: ErrorCode, message: &str) -> io::Result<()> {
        self.frames.push(Frame::Error(code, message.to_string()));
        Ok(())
    }
}

/// Write an executable `/bin/sh` script into `dir` and return its path.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A rule with open access and no extras.
pub fn rule(command: &str, subcommand: &str, program: &Path) -> Rule {
    Rule {
        command: command.to_string(),
        subcommand: subcommand.to_string(),
        program: program.to_path_buf(),
        acl: vec!["ANYUSER".to_string()],
        run_as: None,
        stdin_arg: 0,
        summary: None,
        help: None,
        logmask: Vec::new(),
    }
}

/// Build a request from string tokens.
pub fn req(parts: &[&str]) -> Vec<Vec<u8>> {
    parts.iter().map(|p| p.as_bytes().to_vec()).collect()
}

/// Install a tracing subscriber once, honoring `RUST_LOG`.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

use std::fmt::Write as _;

use thiserror::Error;

/// Render a rule-table parse error with the failing field path and the
/// line/column of the offending YAML, when either is known.
fn format_rule_error(e: &serde_path_to_error::Error<serde_yaml::Error>) -> String {
    let mut out = String::new();
    let path = e.path().to_string();
    if !path.is_empty() {
        let _ = write!(out, "{path}: ");
    }
    if let Some(loc) = e.inner().location() {
        let _ = write!(out, "line {}, column {}: ", loc.line(), loc.column());
    }
    let _ = write!(out, "{}", e.inner());
    out
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to parse rule table:\n  {}", format_rule_error(.source))]
    RuleParse {
        #[source]
        source: serde_path_to_error::Error<serde_yaml::Error>,
    },

    #[error("cannot create {purpose} socket pair: {source}")]
    SocketPair {
        purpose: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("cannot fork: {source}")]
    Fork {
        #[source]
        source: nix::Error,
    },

    #[error("cannot prepare child process: {0}")]
    ChildSetup(String),

    #[error("cannot set up process channel: {source}")]
    Channel {
        #[source]
        source: std::io::Error,
    },

    #[error("cannot register child-exit handler: {source}")]
    Signal {
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;

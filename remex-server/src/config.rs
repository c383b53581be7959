//! The rule table consumed by the dispatcher.
//!
//! Rules are produced by the configuration layer; the engine only sees
//! the resolved form. Matching supports two sentinels: `ALL` matches any
//! token at its position (including a missing command), `EMPTY` matches
//! only absence. Table order is authoritative — the first matching rule
//! wins.

use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::{EngineError, Result};

/// Wildcard sentinel: matches any token at its position.
pub const MATCH_ALL: &str = "ALL";

/// Absence sentinel: matches only a missing token.
pub const MATCH_EMPTY: &str = "EMPTY";

/// Identity a command runs under when a rule requests a privilege drop.
/// Applied in the child, before exec, when `uid` is non-zero.
#[derive(Debug, Clone, Deserialize)]
pub struct RunAs {
    pub user: String,
    pub uid: u32,
    pub gid: u32,
}

/// One configured command binding.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    /// Command match key: a literal token, `ALL`, or `EMPTY`.
    pub command: String,
    /// Subcommand match key: a literal token, `ALL`, or `EMPTY`.
    pub subcommand: String,
    /// Absolute path of the executable.
    pub program: PathBuf,
    /// Opaque ACL entries; only the `AclGate` interprets these.
    #[serde(default)]
    pub acl: Vec<String>,
    /// Drop to this identity before exec.
    #[serde(default)]
    pub run_as: Option<RunAs>,
    /// Argument fed to the child's stdin instead of appearing in argv:
    /// 0 = none, -1 = the last argument, N = 1-based position N.
    #[serde(default)]
    pub stdin_arg: i64,
    /// Subcommand invoked to produce this rule's line in a summary listing.
    #[serde(default)]
    pub summary: Option<String>,
    /// Subcommand invoked for `help <command>` requests.
    #[serde(default)]
    pub help: Option<String>,
    /// Argument chunk positions masked in the audit log (0 = command).
    #[serde(default)]
    pub logmask: Vec<usize>,
}

impl Rule {
    /// Whether this rule matches the given command and subcommand tokens.
    pub fn matches(&self, command: Option<&str>, subcommand: Option<&str>) -> bool {
        let cmd_ok = self.command == MATCH_ALL
            || command.is_some_and(|c| self.command == c)
            || (command.is_none() && self.command == MATCH_EMPTY);
        let sub_ok = self.subcommand == MATCH_ALL
            || subcommand.is_some_and(|s| self.subcommand == s)
            || (subcommand.is_none() && self.subcommand == MATCH_EMPTY);
        cmd_ok && sub_ok
    }
}

/// A parsed rule table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub rules: Vec<Rule>,
}

impl Config {
    /// Find the first rule matching a command and subcommand.
    pub fn resolve(&self, command: Option<&str>, subcommand: Option<&str>) -> Option<&Rule> {
        self.rules.iter().find(|r| r.matches(command, subcommand))
    }

    /// Parse a rule table from YAML, reporting the failing field path on
    /// error. Hosts that keep rule tables in another format can build
    /// `Config` values directly.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let de = serde_yaml::Deserializer::from_str(input);
        serde_path_to_error::deserialize(de).map_err(|source| EngineError::RuleParse { source })
    }
}

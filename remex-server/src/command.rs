//! Request validation and argv assembly.
//!
//! A request arrives as ordered opaque byte chunks: chunk 0 is the
//! command, chunk 1 (if present) the subcommand, and chunks from 1 on
//! become argv positions. The command and subcommand may never contain a
//! nul octet; other arguments may only when they are the one a rule feeds
//! to the child's stdin.

use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

use crate::config::Rule;

/// The argv and optional stdin payload for a child about to be launched.
/// `argv[0]` is the basename of the rule's program.
#[derive(Debug)]
pub struct CommandLine {
    pub argv: Vec<OsString>,
    /// Raw bytes piped to the child's stdin, spliced out of argv.
    pub stdin_payload: Option<Vec<u8>>,
}

/// Basename of a program path: the part after the final `/`, or the whole
/// string when there is none.
pub fn program_basename(program: &Path) -> OsString {
    let bytes = program.as_os_str().as_bytes();
    let start = bytes
        .iter()
        .rposition(|&b| b == b'/')
        .map_or(0, |slash| slash + 1);
    OsString::from_vec(bytes[start..].to_vec())
}

/// Reject nul octets in the command and subcommand chunks. Returns the
/// offending chunk index.
pub fn validate_command_tokens(chunks: &[Vec<u8>]) -> Result<(), usize> {
    for (i, chunk) in chunks.iter().take(2).enumerate() {
        if chunk.contains(&0) {
            return Err(i);
        }
    }
    Ok(())
}

/// Reject nul octets in argument chunks (positions 1 and up), honoring
/// the stdin exemptions of the matched rule: a positive `stdin_arg`
/// exempts its position on normal dispatches, and `stdin_arg == -1`
/// exempts the final argument. With no matched rule every argument is
/// checked.
pub fn validate_arguments(
    chunks: &[Vec<u8>],
    rule: Option<&Rule>,
    help: bool,
) -> Result<(), usize> {
    for i in 1..chunks.len() {
        if let Some(rule) = rule {
            if !help && rule.stdin_arg == i as i64 {
                continue;
            }
            if i == chunks.len() - 1 && rule.stdin_arg == -1 {
                continue;
            }
        }
        if chunks[i].contains(&0) {
            return Err(i);
        }
    }
    Ok(())
}

/// Resolve a rule's stdin designation against the actual argument count.
/// Returns 0 when no argument goes to stdin (position 0 is the command
/// and never an argument).
fn resolve_stdin_position(rule: &Rule, chunk_count: usize) -> usize {
    match rule.stdin_arg {
        -1 => chunk_count - 1,
        n if n > 0 => n as usize,
        _ => 0,
    }
}

/// Assemble the argv for a normal command dispatch. The chunk designated
/// by the rule's `stdin_arg` is captured as the stdin payload and removed
/// from argv; empty chunks elsewhere become empty argument strings.
pub fn build_command_argv(rule: &Rule, chunks: &[Vec<u8>]) -> CommandLine {
    let stdin_pos = resolve_stdin_position(rule, chunks.len());
    let mut argv = vec![program_basename(&rule.program)];
    let mut stdin_payload = None;
    for (i, chunk) in chunks.iter().enumerate().skip(1) {
        if i == stdin_pos {
            stdin_payload = Some(chunk.clone());
            continue;
        }
        argv.push(OsString::from_vec(chunk.clone()));
    }
    CommandLine {
        argv,
        stdin_payload,
    }
}

/// Assemble the argv for a help dispatch: the matched rule's help
/// subcommand in argv[1], the client's original topic (if any) in argv[2].
pub fn build_help_argv(rule: &Rule, help_subcommand: &str, topic: Option<&str>) -> CommandLine {
    let mut argv = vec![
        program_basename(&rule.program),
        OsString::from(help_subcommand),
    ];
    if let Some(topic) = topic {
        argv.push(OsString::from(topic));
    }
    CommandLine {
        argv,
        stdin_payload: None,
    }
}

/// Assemble the argv for one summary invocation.
pub fn build_summary_argv(rule: &Rule, summary: &str) -> CommandLine {
    CommandLine {
        argv: vec![program_basename(&rule.program), OsString::from(summary)],
        stdin_payload: None,
    }
}

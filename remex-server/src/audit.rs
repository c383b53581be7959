//! Command audit logging.
//!
//! Every dispatched request is logged exactly once, after rule
//! resolution, so the matched rule's `logmask` can hide sensitive
//! argument positions.

use tracing::info;

use crate::config::Rule;

const MASKED: &str = "**MASKED**";

/// Render one argv chunk for the audit line. Bytes are decoded lossily
/// and control characters replaced, so a binary argument cannot corrupt
/// the log.
fn render_chunk(chunk: &[u8]) -> String {
    String::from_utf8_lossy(chunk)
        .chars()
        .map(|c| if c.is_control() { '.' } else { c })
        .collect()
}

/// Log a command line on behalf of `user`, masking argument positions the
/// rule marks as sensitive.
pub(crate) fn log_command(argv: &[Vec<u8>], rule: Option<&Rule>, user: &str) {
    let rendered: Vec<String> = argv
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            if rule.is_some_and(|r| r.logmask.contains(&i)) {
                MASKED.to_owned()
            } else {
                render_chunk(chunk)
            }
        })
        .collect();
    info!(target: "audit", "COMMAND from {user}: {}", rendered.join(" "));
}

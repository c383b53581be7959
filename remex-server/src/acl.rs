//! Authorization seam.
//!
//! ACL evaluation lives outside the engine. The dispatcher asks exactly
//! one question — may this user run this rule? — and never sends command
//! output before it has been answered.

use crate::config::Rule;

/// ACL entry admitting any authenticated principal.
pub const ANY_USER: &str = "ANYUSER";

/// Decides whether a user may run a rule.
pub trait AclGate {
    fn permit(&self, rule: &Rule, user: &str) -> bool;
}

/// Allow-list gate over a rule's own `acl` entries: the user is admitted
/// when an entry names them, or when an entry is the `ANYUSER` sentinel.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAcl;

impl AclGate for StaticAcl {
    fn permit(&self, rule: &Rule, user: &str) -> bool {
        rule.acl.iter().any(|entry| entry == ANY_USER || entry == user)
    }
}

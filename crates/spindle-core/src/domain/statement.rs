//! Statement text and its execution mode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution mode of a statement: a static property of its text, not
/// something the caller configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// Produces an ordered sequence of rows.
    Query,
    /// Produces a mutation summary (last insert id + rows changed).
    Mutate,
}

/// One SQL statement as submitted by a caller. Parameters travel separately
/// and are always bound, never spliced into the text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement(String);

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify by the leading keyword: `SELECT` (case-insensitive, after
    /// leading whitespace) runs in query mode, everything else mutates.
    pub fn kind(&self) -> StatementKind {
        let head = self.0.trim_start();
        match head.get(..6) {
            Some(prefix) if prefix.eq_ignore_ascii_case("SELECT") => StatementKind::Query,
            _ => StatementKind::Mutate,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

//! Endpoint selection error types.
//!
//! A selection miss (no eligible agent) is *not* an error — it is the
//! `Ok(None)` / empty-list outcome callers must expect. The variants here
//! are fatal configuration errors: the caller asked for a combination the
//! selector has no rule for, and retrying will not help.

use thiserror::Error;

/// Result type alias for endpoint selection operations.
pub type SelectionResult<T> = Result<T, SelectionError>;

/// Fatal configuration errors raised during endpoint selection.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no selection rule for store role: {0}")]
    UnsupportedRole(String),

    #[error("no selection rule for store scope: {0}")]
    UnsupportedScope(String),
}

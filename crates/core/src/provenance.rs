//! Best-effort metadata collection.
//!
//! Version strings and statistics are collected at backup time from
//! sources that may be unavailable. Collectors return
//! `Result<T, CollectError>`; the caller decides what to fall back to.

/// Placeholder recorded when a version string cannot be collected.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Failure to collect a piece of backup metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("not available: {0}")]
    Unavailable(String),
}

/// Version fallback policy: use the collected value, or [`UNKNOWN_VERSION`]
/// when collection failed or produced an empty string.
pub fn version_or_placeholder(collected: &Result<String, CollectError>) -> String {
    match collected {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => UNKNOWN_VERSION.to_string(),
    }
}

//! Reactive Error Types
//!
//! Structured errors using `exn` for automatic location tracking, following
//! the same shape as the other crates in this workspace.

use derive_more::{Display, Error};

/// A reactive-layer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for reactive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The subscription was unmounted; no further control messages are
    /// accepted and no further results will be delivered.
    #[display("live query subscription cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

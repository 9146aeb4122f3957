//! Error kinds
//!
//! `StorageError` (`#[non_exhaustive]`, `thiserror`-derived,
//! `#[from] rusqlite::Error`) composes with every other layer's errors
//! (retain, recall, consolidation, async operations) into one top-level
//! `BankError`.

use thiserror::Error;

use crate::storage::StorageError;

/// Maximum length an error message may reach before persistence.
pub const MAX_ERROR_MESSAGE_LEN: usize = 5000;

/// Truncate an error message to [`MAX_ERROR_MESSAGE_LEN`] characters.
pub fn truncate_error_message(msg: &str) -> String {
    if msg.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        msg.to_string()
    } else {
        msg.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
    }
}

/// Top-level error type returned by every public operation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BankError {
    /// Schema violation on input: empty content, invalid config combinations,
    /// missing required fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// Bank/memory/mental-model/directive/entity/operation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Dedup short-circuit during retain; informational, not an error to
    /// the caller, but modeled as a variant so callers can match on it.
    #[error("duplicate detected: {0}")]
    DuplicateDetected(String),

    /// Extraction/consolidation/reflect LLM call failed or returned
    /// unparseable output.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector/FTS/row mismatch detected.
    #[error("index inconsistency: {0}")]
    IndexInconsistency(String),

    /// Cooperatively aborted by the async operation registry.
    #[error("operation cancelled")]
    Cancelled,

    /// Event stream or HTTP-layer errors; surfaced as non-fatal to the
    /// memory core.
    #[error("transport error: {0}")]
    Transport(String),

    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Propagated from the storage layer.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Underlying JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BankError {
    /// Error message truncated to the persistence limit.
    pub fn truncated_message(&self) -> String {
        truncate_error_message(&self.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BankError::NotFound(_) | BankError::Storage(StorageError::NotFound(_)))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, BankError::Validation(_))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_messages() {
        let long = "x".repeat(MAX_ERROR_MESSAGE_LEN + 500);
        let truncated = truncate_error_message(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_MESSAGE_LEN);
    }

    #[test]
    fn short_messages_untouched() {
        assert_eq!(truncate_error_message("hello"), "hello");
    }
}

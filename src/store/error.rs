//! Error types for document store operations.

use thiserror::Error;

/// Error type for document store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport or backend failure. Callers decide whether to retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// No document stored under the key.
    #[error("Document not found: {collection}/{key}")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// Key that was requested.
        key: String,
    },

    /// A stored document cannot take the requested edit (e.g. array op on a scalar).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error from `SQLite`.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    /// Creates a [`StoreError::NotFound`] for a collection/key pair.
    #[must_use]
    pub fn not_found(collection: &str, key: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    /// Returns whether this error means the document does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_error_display() {
        let err = StoreError::Unavailable("connection reset".to_string());
        assert_eq!(err.to_string(), "Store unavailable: connection reset");
    }

    #[test]
    fn not_found_error_display() {
        let err = StoreError::not_found("circles", "abc");
        assert_eq!(err.to_string(), "Document not found: circles/abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn invalid_document_is_not_not_found() {
        let err = StoreError::InvalidDocument("members is not an array".to_string());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "Invalid document: members is not an array");
    }
}

//! Error types shared by the storage and session layers

/// Standard result type for storage-backed operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by the key-value collaborator or the stores built on it
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend failed: {message}")]
    Backend { message: String },

    #[error("stored value for `{key}` is corrupt: {message}")]
    Corrupt { key: String, message: String },
}

impl StoreError {
    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a corrupt-value error for a specific key
    pub fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            message: message.into(),
        }
    }
}

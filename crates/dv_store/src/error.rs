use thiserror::Error;

use dv_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Decryption failed for one stored record. Identifies the record,
    /// deliberately not the key.
    #[error("Cannot decrypt entry {entry_id} — check your passphrase")]
    EntryDecrypt {
        entry_id: String,
        #[source]
        source: CryptoError,
    },

    #[error("Record not found: {0}")]
    NotFound(String),

    /// Unique-constraint violation on the remote backend.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// The remote backend rejected the caller's credentials.
    #[error("Permission denied by backend: {0}")]
    Permission(String),

    /// Transient connectivity failure — the only retryable class.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Any other remote failure, with the original message for diagnostics.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Migration aborted on its first failing record. LocalStore is left
    /// intact, so no data is lost.
    #[error("Migration failed at entry {entry_id}: {source}")]
    Migration {
        entry_id: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the caller may retry the same call unchanged.
    /// Only transient backend unavailability qualifies; everything else
    /// needs a different key, different input, or operator attention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("Malformed envelope: expected <hex-iv>:<ciphertext>")]
    MalformedEnvelope,

    #[error("Decryption failed (wrong key or corrupted data)")]
    Decryption,

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

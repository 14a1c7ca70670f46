//! dv_crypto — DreamVault client-side encryption primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Every sensitive field is encrypted on the caller's device before it
//!   crosses the trust boundary; the remote store only ever sees envelopes.
//! - Zeroize derived key material on drop.
//! - Pure functions: no ambient state, no IO.
//!
//! # Module layout
//! - `cipher` — PBKDF2 key derivation, envelope encrypt/decrypt, digests
//! - `error`  — unified error type

pub mod cipher;
pub mod error;

pub use cipher::DerivedKey;
pub use error::CryptoError;

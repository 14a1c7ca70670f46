//! dv_store — encrypted dual-backend persistence for DreamVault
//!
//! # Encryption strategy
//! The remote relational store never sees plaintext. Sensitive columns
//! (dream text, interpretation, tag/emotion elements) are stored as
//! `iv:ciphertext` envelopes produced by `dv_crypto`; non-sensitive
//! metadata (ids, dates, timestamps, tier) stays in plaintext to allow
//! efficient queries. The on-device fallback store keeps plain JSON —
//! the device itself is the trust boundary there.
//!
//! # Backends
//! One of two backends is selected once at construction and fixed for the
//! process lifetime:
//! - [`RemoteStore`] — Postgres via sqlx, soft deletes, server-side
//!   timestamps, SQL aggregate stats.
//! - [`LocalStore`] — JSON files in a data directory, hard deletes.
//!
//! [`JournalStore`] is the single backend-agnostic handle, including the
//! one-shot local→remote migration.

pub mod codec;
pub mod collab;
pub mod error;
pub mod facade;
pub mod keys;
pub mod local;
pub mod models;
pub mod remote;

pub use error::StoreError;
pub use facade::{JournalStore, StoreMode};
pub use keys::KeyManager;
pub use local::LocalStore;
pub use remote::{RemoteConfig, RemoteStore};

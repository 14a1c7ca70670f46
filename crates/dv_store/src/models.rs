//! Domain models and database row models.
//!
//! `Entry` is the plaintext domain object the application works with;
//! `EntryRow` is its encrypted wire/row form — the only shape the remote
//! backend ever sees.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ── Users ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Premium,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "free" => Ok(SubscriptionTier::Free),
            "pro" => Ok(SubscriptionTier::Pro),
            "premium" => Ok(SubscriptionTier::Premium),
            other => Err(StoreError::Backend(format!(
                "unknown subscription tier {other:?}"
            ))),
        }
    }
}

/// Owner profile. No secret fields — stored in plaintext on both backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Unique reference to the external identity provider.
    pub auth_id: String,
    pub subscription_tier: SubscriptionTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub auth_id: String,
    pub subscription_tier: SubscriptionTier,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub subscription_tier: Option<SubscriptionTier>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub auth_id: String,
    pub subscription_tier: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, StoreError> {
        Ok(User {
            subscription_tier: SubscriptionTier::parse(&row.subscription_tier)?,
            id: row.id,
            email: row.email,
            auth_id: row.auth_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ── Entries ───────────────────────────────────────────────────────────────────

/// One journal record, decrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Opaque stable identifier, assigned at creation.
    pub id: String,
    /// Owner reference — never encrypted, used for query routing.
    pub user_id: String,
    /// Calendar date the dream occurred on (not a timestamp). Clear-text.
    pub occurred_on: NaiveDate,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub emotions: Vec<String>,
    /// Store-assigned; callers never set these.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation payload. Id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub user_id: String,
    pub occurred_on: NaiveDate,
    pub content: String,
    pub tags: Vec<String>,
    pub emotions: Vec<String>,
}

/// Partial update — merge semantics. Absent fields are left untouched in
/// storage (their ciphertext is not re-encrypted).
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub occurred_on: Option<NaiveDate>,
    pub content: Option<String>,
    pub interpretation: Option<String>,
    pub tags: Option<Vec<String>>,
    pub emotions: Option<Vec<String>>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.occurred_on.is_none()
            && self.content.is_none()
            && self.interpretation.is_none()
            && self.tags.is_none()
            && self.emotions.is_none()
    }
}

/// Encrypted wire/row form of an [`Entry`] — what crosses the trust
/// boundary and lands in the `dream_entries` relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EntryRow {
    pub id: String,
    pub user_id: String,
    pub occurred_on: NaiveDate,
    /// Envelope-encrypted dream text.
    pub content_enc: String,
    /// Envelope-encrypted interpretation; absent stays absent.
    pub interpretation_enc: Option<String>,
    /// Each element is its own envelope, so a corrupt element is isolated.
    pub tags_enc: Vec<String>,
    pub emotions_enc: Vec<String>,
    /// Soft-delete flag — remote representation only.
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Encrypted form of an [`EntryPatch`]. Only present fields are sent.
#[derive(Debug, Clone, Default)]
pub struct EncryptedPatch {
    pub occurred_on: Option<NaiveDate>,
    pub content_enc: Option<String>,
    pub interpretation_enc: Option<String>,
    pub tags_enc: Option<Vec<String>>,
    pub emotions_enc: Option<Vec<String>>,
}

// ── Key info ──────────────────────────────────────────────────────────────────

/// Salt record for per-user key derivation. The derived key itself is
/// never persisted anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub user_id: String,
    pub salt: String,
    pub derived_at: DateTime<Utc>,
}

// ── Stats ─────────────────────────────────────────────────────────────────────

/// Aggregate counts over a user's live (non-deleted) entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryStats {
    pub total: i64,
    pub with_interpretation: i64,
    pub this_month: i64,
    pub this_week: i64,
    pub oldest: Option<NaiveDate>,
    pub newest: Option<NaiveDate>,
}

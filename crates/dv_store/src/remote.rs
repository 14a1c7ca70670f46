//! Remote relational backend over Postgres via sqlx.
//!
//! Operates exclusively on the encrypted representation ([`EntryRow`]) —
//! plaintext never reaches this module. Deletes are soft: rows are flagged
//! `is_deleted` and excluded from every read server-side, but never
//! destroyed. `updated_at` is always assigned here, overwriting anything a
//! caller might supply.

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::codec::NewEntryRow;
use crate::error::StoreError;
use crate::models::{EncryptedPatch, EntryRow, EntryStats, NewUser, User, UserPatch, UserRow};

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub database_url: String,
}

/// Central remote handle. Cheap to clone (pool is Arc internally).
#[derive(Clone)]
pub struct RemoteStore {
    pool: PgPool,
}

impl RemoteStore {
    /// Connect and run pending schema migrations.
    pub async fn connect(config: &RemoteConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await
            .map_err(map_sqlx)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;

        tracing::info!("connected to remote journal database");
        Ok(Self { pool })
    }

    // ── Entries ──────────────────────────────────────────────────────────────

    /// Insert an encrypted entry. Timestamps are server-assigned.
    pub async fn create_entry(&self, row: &NewEntryRow) -> Result<EntryRow, StoreError> {
        sqlx::query_as::<_, EntryRow>(
            "INSERT INTO dream_entries \
                 (id, user_id, occurred_on, content_enc, tags_enc, emotions_enc) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING *",
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(row.occurred_on)
        .bind(&row.content_enc)
        .bind(&row.tags_enc)
        .bind(&row.emotions_enc)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    /// A user's live entries, newest-created first. Soft-deleted rows are
    /// filtered out server-side.
    pub async fn list_entries(&self, user_id: &str) -> Result<Vec<EntryRow>, StoreError> {
        sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM dream_entries \
             WHERE user_id = $1 AND NOT is_deleted \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    /// Apply an encrypted partial update. Absent fields keep their stored
    /// ciphertext byte-for-byte.
    pub async fn update_entry(
        &self,
        id: &str,
        patch: &EncryptedPatch,
    ) -> Result<EntryRow, StoreError> {
        sqlx::query_as::<_, EntryRow>(
            "UPDATE dream_entries SET \
                 occurred_on        = COALESCE($2, occurred_on), \
                 content_enc        = COALESCE($3, content_enc), \
                 interpretation_enc = COALESCE($4, interpretation_enc), \
                 tags_enc           = COALESCE($5, tags_enc), \
                 emotions_enc       = COALESCE($6, emotions_enc), \
                 updated_at         = now() \
             WHERE id = $1 AND NOT is_deleted \
             RETURNING *",
        )
        .bind(id)
        .bind(patch.occurred_on)
        .bind(&patch.content_enc)
        .bind(&patch.interpretation_enc)
        .bind(&patch.tags_enc)
        .bind(&patch.emotions_enc)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    /// Soft delete. The row stays on the server but disappears from reads.
    pub async fn delete_entry(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE dream_entries SET is_deleted = TRUE, updated_at = now() \
             WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    pub async fn stats(&self, user_id: &str) -> Result<EntryStats, StoreError> {
        sqlx::query_as::<_, StatsRow>(
            "SELECT count(*)                                                        AS total, \
                    count(*) FILTER (WHERE interpretation_enc IS NOT NULL)          AS with_interpretation, \
                    count(*) FILTER (WHERE created_at >= date_trunc('month', now())) AS this_month, \
                    count(*) FILTER (WHERE created_at >= date_trunc('week', now()))  AS this_week, \
                    min(occurred_on)                                                AS oldest, \
                    max(occurred_on)                                                AS newest \
             FROM dream_entries \
             WHERE user_id = $1 AND NOT is_deleted",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
        .map(StatsRow::into_stats)
    }

    // ── Users ────────────────────────────────────────────────────────────────

    pub async fn create_user(&self, new: &NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, email, auth_id, subscription_tier) \
             VALUES ($1, $2, $3, $4) \
             RETURNING *",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&new.email)
        .bind(&new.auth_id)
        .bind(new.subscription_tier.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?
        .try_into()
    }

    pub async fn user_by_auth_id(&self, auth_id: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE auth_id = $1")
            .bind(auth_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .map(User::try_from)
            .transpose()
    }

    pub async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<User, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "UPDATE users SET \
                 email             = COALESCE($2, email), \
                 subscription_tier = COALESCE($3, subscription_tier), \
                 updated_at        = now() \
             WHERE id = $1 \
             RETURNING *",
        )
        .bind(id)
        .bind(&patch.email)
        .bind(patch.subscription_tier.map(|t| t.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| StoreError::NotFound(id.to_owned()))?
        .try_into()
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total: i64,
    with_interpretation: i64,
    this_month: i64,
    this_week: i64,
    oldest: Option<chrono::NaiveDate>,
    newest: Option<chrono::NaiveDate>,
}

impl StatsRow {
    fn into_stats(self) -> EntryStats {
        EntryStats {
            total: self.total,
            with_interpretation: self.with_interpretation,
            this_month: self.this_month,
            this_week: self.this_week,
            oldest: self.oldest,
            newest: self.newest,
        }
    }
}

/// Map sqlx failures onto the store taxonomy.
///
/// Only connectivity problems are retryable; constraint and permission
/// failures need caller/operator attention, everything else keeps the
/// original message for diagnostics.
fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(code) => classify_sqlstate(code, db.message()),
            None => StoreError::Backend(db.message().to_owned()),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => StoreError::Unavailable(err.to_string()),
        sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

fn classify_sqlstate(code: &str, message: &str) -> StoreError {
    match code {
        // unique_violation
        "23505" => StoreError::Duplicate(message.to_owned()),
        // insufficient_privilege / invalid_authorization_specification /
        // invalid_password
        "42501" | "28000" | "28P01" => StoreError::Permission(message.to_owned()),
        // connection_exception class
        _ if code.starts_with("08") => StoreError::Unavailable(message.to_owned()),
        _ => StoreError::Backend(format!("{code}: {message}")),
    }
}

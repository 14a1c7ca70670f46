//! Backend-agnostic persistence facade.
//!
//! The backend is chosen once at construction — `Remote` when a database
//! URL is configured, `Local` otherwise — and never re-evaluated, so a
//! session cannot silently fall back mid-flight. In remote mode every
//! sensitive field passes through the record codec before leaving the
//! device; in local mode entries are stored as plaintext JSON (the device
//! is the trust boundary).
//!
//! A [`LocalStore`] handle exists in both modes: it is the fallback
//! backend in local mode and the migration source in remote mode.

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::codec::{self, NewEntryRow};
use crate::collab::{InterpretationContext, Interpreter};
use crate::error::StoreError;
use crate::local::LocalStore;
use crate::models::{
    EncryptedPatch, Entry, EntryPatch, EntryRow, EntryStats, NewEntry, NewUser, User, UserPatch,
};
use crate::remote::{RemoteConfig, RemoteStore};

const ENV_DATABASE_URL: &str = "DREAMVAULT_DATABASE_URL";
const ENV_DATA_DIR: &str = "DREAMVAULT_DATA_DIR";
const DEFAULT_DATA_DIR: &str = ".dreamvault";

/// Backend selection, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub enum StoreMode {
    Remote {
        config: RemoteConfig,
        /// Still needed in remote mode: migration source and salt registry.
        data_dir: PathBuf,
    },
    Local {
        data_dir: PathBuf,
    },
}

impl StoreMode {
    /// Remote when `DREAMVAULT_DATABASE_URL` is set and non-empty,
    /// local fallback otherwise.
    pub fn from_env() -> Self {
        let data_dir = std::env::var(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        match std::env::var(ENV_DATABASE_URL) {
            Ok(url) if !url.trim().is_empty() => StoreMode::Remote {
                config: RemoteConfig { database_url: url },
                data_dir,
            },
            _ => StoreMode::Local { data_dir },
        }
    }
}

enum Backend {
    Remote(RemoteStore),
    Local,
}

pub struct JournalStore {
    backend: Backend,
    local: LocalStore,
}

impl JournalStore {
    pub async fn open(mode: StoreMode) -> Result<Self, StoreError> {
        match mode {
            StoreMode::Remote { config, data_dir } => {
                let remote = RemoteStore::connect(&config).await?;
                tracing::info!("journal store opened in remote mode");
                Ok(Self {
                    backend: Backend::Remote(remote),
                    local: LocalStore::new(data_dir),
                })
            }
            StoreMode::Local { data_dir } => {
                tracing::info!(dir = %data_dir.display(), "journal store opened in local mode");
                Ok(Self {
                    backend: Backend::Local,
                    local: LocalStore::new(data_dir),
                })
            }
        }
    }

    pub async fn from_env() -> Result<Self, StoreError> {
        Self::open(StoreMode::from_env()).await
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.backend, Backend::Remote(_))
    }

    // ── Entry CRUD ───────────────────────────────────────────────────────────

    /// Create an entry. The facade assigns the id; timestamps come from
    /// the selected store. In remote mode the payload is encrypted before
    /// it leaves the device.
    pub async fn create_entry(&self, new: NewEntry, key: &str) -> Result<Entry, StoreError> {
        if new.content.trim().is_empty() {
            return Err(StoreError::InvalidInput("entry content must not be empty".into()));
        }

        match &self.backend {
            Backend::Remote(remote) => {
                let id = Uuid::new_v4().to_string();
                let row = codec::encrypt_new_entry(&id, &new, key)?;
                let stored = remote.create_entry(&row).await?;
                codec::decrypt_row(&stored, key)
            }
            Backend::Local => self.local.create_entry(new).await,
        }
    }

    /// A user's entries, newest-created first, decrypted.
    pub async fn list_entries(&self, user_id: &str, key: &str) -> Result<Vec<Entry>, StoreError> {
        match &self.backend {
            Backend::Remote(remote) => remote
                .list_entries(user_id)
                .await?
                .iter()
                .map(|row| codec::decrypt_row(row, key))
                .collect(),
            Backend::Local => self.local.list_entries(user_id).await,
        }
    }

    /// Partial update with merge semantics — only supplied fields change;
    /// everything else keeps its stored bytes.
    pub async fn update_entry(
        &self,
        id: &str,
        patch: EntryPatch,
        key: &str,
    ) -> Result<Entry, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::InvalidInput("update patch has no fields".into()));
        }

        match &self.backend {
            Backend::Remote(remote) => {
                let encrypted = codec::encrypt_patch(&patch, key)?;
                let stored = remote.update_entry(id, &encrypted).await?;
                codec::decrypt_row(&stored, key)
            }
            Backend::Local => self.local.update_entry(id, patch).await,
        }
    }

    /// Soft delete remotely, hard delete locally.
    pub async fn delete_entry(&self, id: &str) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Remote(remote) => remote.delete_entry(id).await,
            Backend::Local => self.local.delete_entry(id).await,
        }
    }

    pub async fn stats(&self, user_id: &str) -> Result<EntryStats, StoreError> {
        match &self.backend {
            Backend::Remote(remote) => remote.stats(user_id).await,
            Backend::Local => self.local.stats(user_id).await,
        }
    }

    // ── Interpretation ───────────────────────────────────────────────────────

    /// Encrypt an interpreter result into the entry. The collaborator's
    /// plaintext output never reaches the remote store unencrypted.
    pub async fn attach_interpretation(
        &self,
        id: &str,
        interpretation: &str,
        key: &str,
    ) -> Result<Entry, StoreError> {
        if interpretation.trim().is_empty() {
            return Err(StoreError::InvalidInput("interpretation must not be empty".into()));
        }
        let patch = EntryPatch {
            interpretation: Some(interpretation.to_owned()),
            ..Default::default()
        };
        self.update_entry(id, patch, key).await
    }

    /// Run the AI collaborator over a decrypted entry and persist its
    /// (re-encrypted) result.
    pub async fn generate_interpretation(
        &self,
        interpreter: &dyn Interpreter,
        entry: &Entry,
        key: &str,
    ) -> Result<Entry, StoreError> {
        let context = InterpretationContext {
            tags: entry.tags.clone(),
            emotions: entry.emotions.clone(),
        };
        let text = interpreter
            .interpret(&entry.content, &context)
            .await
            .map_err(|e| StoreError::Backend(format!("interpreter failed: {e}")))?;
        self.attach_interpretation(&entry.id, &text, key).await
    }

    // ── Users ────────────────────────────────────────────────────────────────

    pub async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        match &self.backend {
            Backend::Remote(remote) => remote.create_user(&new).await,
            Backend::Local => self.local.create_user(new).await,
        }
    }

    pub async fn user_by_auth_id(&self, auth_id: &str) -> Result<Option<User>, StoreError> {
        match &self.backend {
            Backend::Remote(remote) => remote.user_by_auth_id(auth_id).await,
            Backend::Local => self.local.user_by_auth_id(auth_id).await,
        }
    }

    pub async fn update_user(&self, id: &str, patch: UserPatch) -> Result<User, StoreError> {
        match &self.backend {
            Backend::Remote(remote) => remote.update_user(id, &patch).await,
            Backend::Local => self.local.update_user(id, patch).await,
        }
    }

    // ── Migration ────────────────────────────────────────────────────────────

    /// One-shot migration of the local entry collection into the remote
    /// store. Remote mode only.
    ///
    /// Per-record all-or-nothing: the first failing record aborts the rest
    /// and leaves the local collection untouched, so a retry re-attempts
    /// from the current local contents. Records already inserted before
    /// the failure are NOT rolled back remotely, so a retry can duplicate
    /// them — there is no migrated-marker. Only on total success is the
    /// local collection cleared.
    ///
    /// Callers should not interleave other writes with an in-flight
    /// migration; nothing guards against it.
    pub async fn migrate(&self, user_id: &str, key: &str) -> Result<usize, StoreError> {
        let remote = match &self.backend {
            Backend::Remote(remote) => remote,
            Backend::Local => {
                return Err(StoreError::InvalidInput(
                    "migration requires the remote backend".into(),
                ))
            }
        };
        run_migration(remote, &self.local, user_id, key).await
    }
}

/// Remote-side operations migration depends on. Factored out so the
/// all-or-nothing semantics are testable without a live database.
#[async_trait]
pub(crate) trait MigrationTarget {
    async fn insert_entry(&self, row: &NewEntryRow) -> Result<EntryRow, StoreError>;
    async fn attach_interpretation(
        &self,
        id: &str,
        patch: &EncryptedPatch,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl MigrationTarget for RemoteStore {
    async fn insert_entry(&self, row: &NewEntryRow) -> Result<EntryRow, StoreError> {
        self.create_entry(row).await
    }

    async fn attach_interpretation(
        &self,
        id: &str,
        patch: &EncryptedPatch,
    ) -> Result<(), StoreError> {
        self.update_entry(id, patch).await.map(|_| ())
    }
}

pub(crate) async fn run_migration<T: MigrationTarget + Sync>(
    target: &T,
    local: &LocalStore,
    user_id: &str,
    key: &str,
) -> Result<usize, StoreError> {
    let entries = local.list_entries(user_id).await?;
    if entries.is_empty() {
        tracing::info!(user_id, "nothing to migrate");
        return Ok(0);
    }
    tracing::info!(user_id, count = entries.len(), "starting local→remote migration");

    for entry in &entries {
        migrate_one(target, entry, key).await.map_err(|source| {
            tracing::warn!(entry_id = %entry.id, error = %source, "migration aborted");
            StoreError::Migration {
                entry_id: entry.id.clone(),
                source: Box::new(source),
            }
        })?;
        tracing::debug!(entry_id = %entry.id, "entry migrated");
    }

    local.clear_entries().await?;
    tracing::info!(user_id, count = entries.len(), "migration complete, local collection cleared");
    Ok(entries.len())
}

/// Insert the encrypted entry, then attach its interpretation as a
/// dependent second write. A crash between the two leaves a remote record
/// without its interpretation.
async fn migrate_one<T: MigrationTarget + Sync>(
    target: &T,
    entry: &Entry,
    key: &str,
) -> Result<(), StoreError> {
    let new = NewEntry {
        user_id: entry.user_id.clone(),
        occurred_on: entry.occurred_on,
        content: entry.content.clone(),
        tags: entry.tags.clone(),
        emotions: entry.emotions.clone(),
    };
    // Keep the local id so the follow-up update targets the right row.
    let row = codec::encrypt_new_entry(&entry.id, &new, key)?;
    target.insert_entry(&row).await?;

    if let Some(interpretation) = &entry.interpretation {
        let patch = codec::encrypt_patch(
            &EntryPatch {
                interpretation: Some(interpretation.clone()),
                ..Default::default()
            },
            key,
        )?;
        target.attach_interpretation(&entry.id, &patch).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryRow;
    use chrono::{NaiveDate, Utc};
    use std::sync::Mutex;

    /// In-memory stand-in for the remote side of a migration.
    struct FakeRemote {
        rows: Mutex<Vec<EntryRow>>,
        fail_on_content: Option<String>,
    }

    impl FakeRemote {
        fn new(fail_on_content: Option<&str>) -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                fail_on_content: fail_on_content.map(str::to_owned),
            }
        }
    }

    #[async_trait]
    impl MigrationTarget for FakeRemote {
        async fn insert_entry(&self, row: &NewEntryRow) -> Result<EntryRow, StoreError> {
            if let Some(marker) = &self.fail_on_content {
                let content = dv_crypto::cipher::decrypt(&row.content_enc, "k1").unwrap();
                if &content == marker {
                    return Err(StoreError::Unavailable("connection reset".into()));
                }
            }
            let now = Utc::now();
            let stored = EntryRow {
                id: row.id.clone(),
                user_id: row.user_id.clone(),
                occurred_on: row.occurred_on,
                content_enc: row.content_enc.clone(),
                interpretation_enc: None,
                tags_enc: row.tags_enc.clone(),
                emotions_enc: row.emotions_enc.clone(),
                is_deleted: false,
                created_at: now,
                updated_at: now,
            };
            self.rows.lock().unwrap().push(stored.clone());
            Ok(stored)
        }

        async fn attach_interpretation(
            &self,
            id: &str,
            patch: &EncryptedPatch,
        ) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
            row.interpretation_enc = patch.interpretation_enc.clone();
            Ok(())
        }
    }

    async fn seed_local(local: &LocalStore, contents: &[&str]) {
        for content in contents {
            local
                .create_entry(NewEntry {
                    user_id: "u-1".into(),
                    occurred_on: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
                    content: (*content).into(),
                    tags: vec!["flying".into()],
                    emotions: vec![],
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn migration_moves_everything_and_clears_local() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        seed_local(&local, &["one", "two", "three"]).await;
        local
            .update_entry(
                &local.list_entries("u-1").await.unwrap()[0].id,
                EntryPatch {
                    interpretation: Some("a meaning".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let remote = FakeRemote::new(None);
        let migrated = run_migration(&remote, &local, "u-1", "k1").await.unwrap();
        assert_eq!(migrated, 3);

        // Local collection is gone; remote holds decryptable copies.
        assert!(local.list_entries("u-1").await.unwrap().is_empty());
        let rows = remote.rows.lock().unwrap();
        assert_eq!(rows.len(), 3);
        let mut contents: Vec<String> = rows
            .iter()
            .map(|r| codec::decrypt_row(r, "k1").unwrap().content)
            .collect();
        contents.sort();
        assert_eq!(contents, ["one", "three", "two"]);
        // The dependent second write landed.
        assert_eq!(rows.iter().filter(|r| r.interpretation_enc.is_some()).count(), 1);
    }

    #[tokio::test]
    async fn migration_failure_leaves_local_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        seed_local(&local, &["one", "two", "three"]).await;

        // Listing is newest-first, so "two" is the middle record.
        let remote = FakeRemote::new(Some("two"));
        let err = run_migration(&remote, &local, "u-1", "k1").await.unwrap_err();
        match &err {
            StoreError::Migration { source, .. } => assert!(source.is_retryable()),
            other => panic!("expected Migration, got {other:?}"),
        }

        // All three local entries survive; the remote kept what landed
        // before the abort (known duplication gap on retry).
        assert_eq!(local.list_entries("u-1").await.unwrap().len(), 3);
        assert_eq!(remote.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn migration_of_empty_collection_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        let remote = FakeRemote::new(None);
        assert_eq!(run_migration(&remote, &local, "u-1", "k1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn local_mode_rejects_migration() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::open(StoreMode::Local {
            data_dir: dir.path().to_path_buf(),
        })
        .await
        .unwrap();
        assert!(matches!(
            store.migrate("u-1", "k1").await,
            Err(StoreError::InvalidInput(_))
        ));
    }
}

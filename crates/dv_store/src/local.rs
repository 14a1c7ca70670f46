//! On-device fallback store — plain JSON files in the data directory.
//!
//! Entries are stored decrypted here: the device is the trust boundary,
//! and there is no remote operator to hide anything from. Deletes are
//! hard deletes (no soft-delete flag locally).
//!
//! Methods are `async` only for interface uniformity with the remote
//! store; the underlying file IO is synchronous in effect.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Entry, EntryPatch, EntryStats, NewEntry, NewUser, User, UserPatch};

const ENTRIES_FILE: &str = "entries.json";
const PROFILE_FILE: &str = "profile.json";

#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
}

impl LocalStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // ── Entries ──────────────────────────────────────────────────────────────

    /// Create an entry, assigning its id and timestamps.
    pub async fn create_entry(&self, new: NewEntry) -> Result<Entry, StoreError> {
        let now = Utc::now();
        let entry = Entry {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            occurred_on: new.occurred_on,
            content: new.content,
            interpretation: None,
            tags: new.tags,
            emotions: new.emotions,
            created_at: now,
            updated_at: now,
        };

        let mut entries = self.load_entries()?;
        entries.insert(0, entry.clone());
        self.save_entries(&entries)?;
        Ok(entry)
    }

    /// All of a user's entries, newest-created first.
    pub async fn list_entries(&self, user_id: &str) -> Result<Vec<Entry>, StoreError> {
        let mut entries: Vec<Entry> = self
            .load_entries()?
            .into_iter()
            .filter(|e| e.user_id == user_id)
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// Merge a partial update into an entry. `updated_at` is store-assigned.
    pub async fn update_entry(&self, id: &str, patch: EntryPatch) -> Result<Entry, StoreError> {
        let mut entries = self.load_entries()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;

        if let Some(occurred_on) = patch.occurred_on {
            entry.occurred_on = occurred_on;
        }
        if let Some(content) = patch.content {
            entry.content = content;
        }
        if let Some(interpretation) = patch.interpretation {
            entry.interpretation = Some(interpretation);
        }
        if let Some(tags) = patch.tags {
            entry.tags = tags;
        }
        if let Some(emotions) = patch.emotions {
            entry.emotions = emotions;
        }
        entry.updated_at = Utc::now();

        let updated = entry.clone();
        self.save_entries(&entries)?;
        Ok(updated)
    }

    /// Hard delete — the record is gone for good.
    pub async fn delete_entry(&self, id: &str) -> Result<(), StoreError> {
        let mut entries = self.load_entries()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        self.save_entries(&entries)
    }

    pub async fn stats(&self, user_id: &str) -> Result<EntryStats, StoreError> {
        let entries = self.list_entries(user_id).await?;

        let today = Utc::now().date_naive();
        // Weeks start Monday, matching the remote `date_trunc('week', …)`.
        let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        let month_start = today.with_day(1).unwrap_or(today);

        Ok(EntryStats {
            total: entries.len() as i64,
            with_interpretation: entries.iter().filter(|e| e.interpretation.is_some()).count()
                as i64,
            this_month: entries
                .iter()
                .filter(|e| e.created_at.date_naive() >= month_start)
                .count() as i64,
            this_week: entries
                .iter()
                .filter(|e| e.created_at.date_naive() >= week_start)
                .count() as i64,
            oldest: entries.iter().map(|e| e.occurred_on).min(),
            newest: entries.iter().map(|e| e.occurred_on).max(),
        })
    }

    /// Drop the whole entry collection. Called after a fully successful
    /// migration to the remote store.
    pub async fn clear_entries(&self) -> Result<(), StoreError> {
        match fs::remove_file(self.data_dir.join(ENTRIES_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ── User profile ─────────────────────────────────────────────────────────

    pub async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: new.email,
            auth_id: new.auth_id,
            subscription_tier: new.subscription_tier,
            created_at: now,
            updated_at: now,
        };
        self.write_json(PROFILE_FILE, &user)?;
        Ok(user)
    }

    pub async fn user_by_auth_id(&self, auth_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read_json::<User>(PROFILE_FILE)?
            .filter(|u| u.auth_id == auth_id))
    }

    pub async fn update_user(&self, id: &str, patch: UserPatch) -> Result<User, StoreError> {
        let mut user = self
            .read_json::<User>(PROFILE_FILE)?
            .filter(|u| u.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;

        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(tier) = patch.subscription_tier {
            user.subscription_tier = tier;
        }
        user.updated_at = Utc::now();
        self.write_json(PROFILE_FILE, &user)?;
        Ok(user)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn load_entries(&self) -> Result<Vec<Entry>, StoreError> {
        Ok(self.read_json::<Vec<Entry>>(ENTRIES_FILE)?.unwrap_or_default())
    }

    fn save_entries(&self, entries: &[Entry]) -> Result<(), StoreError> {
        self.write_json(ENTRIES_FILE, &entries)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        file: &str,
    ) -> Result<Option<T>, StoreError> {
        match fs::read(self.data_dir.join(file)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_json<T: serde::Serialize>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)?;
        fs::write(self.data_dir.join(file), serde_json::to_vec_pretty(value)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubscriptionTier;
    use chrono::NaiveDate;

    fn new_entry(user_id: &str, content: &str) -> NewEntry {
        NewEntry {
            user_id: user_id.into(),
            occurred_on: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            content: content.into(),
            tags: vec!["flying".into()],
            emotions: vec!["joy".into()],
        }
    }

    #[tokio::test]
    async fn create_then_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let first = store.create_entry(new_entry("u-1", "first")).await.unwrap();
        let second = store.create_entry(new_entry("u-1", "second")).await.unwrap();
        store.create_entry(new_entry("u-other", "not mine")).await.unwrap();

        let listed = store.list_entries("u-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn update_merges_and_bumps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let entry = store.create_entry(new_entry("u-1", "original")).await.unwrap();
        let patch = EntryPatch {
            interpretation: Some("a fresh start".into()),
            ..Default::default()
        };
        let updated = store.update_entry(&entry.id, patch).await.unwrap();

        assert_eq!(updated.content, "original"); // untouched
        assert_eq!(updated.interpretation.as_deref(), Some("a fresh start"));
        assert!(updated.updated_at >= entry.updated_at);
        assert_eq!(updated.created_at, entry.created_at);
    }

    #[tokio::test]
    async fn delete_is_hard() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let entry = store.create_entry(new_entry("u-1", "gone soon")).await.unwrap();
        store.delete_entry(&entry.id).await.unwrap();

        assert!(store.list_entries("u-1").await.unwrap().is_empty());
        assert!(matches!(
            store.delete_entry(&entry.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stats_count_interpretations_and_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let a = store.create_entry(new_entry("u-1", "one")).await.unwrap();
        store.create_entry(new_entry("u-1", "two")).await.unwrap();
        store
            .update_entry(
                &a.id,
                EntryPatch {
                    interpretation: Some("meaning".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stats = store.stats("u-1").await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.with_interpretation, 1);
        // Both created just now — inside the current week and month.
        assert_eq!(stats.this_week, 2);
        assert_eq!(stats.this_month, 2);
        assert_eq!(stats.oldest, Some(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()));
        assert_eq!(stats.newest, stats.oldest);
    }

    #[tokio::test]
    async fn clear_entries_empties_the_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        store.create_entry(new_entry("u-1", "soon migrated")).await.unwrap();
        store.clear_entries().await.unwrap();
        assert!(store.list_entries("u-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn profile_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let user = store
            .create_user(NewUser {
                email: "a@example.com".into(),
                auth_id: "auth-1".into(),
                subscription_tier: SubscriptionTier::Free,
            })
            .await
            .unwrap();

        assert_eq!(
            store.user_by_auth_id("auth-1").await.unwrap().unwrap().id,
            user.id
        );
        assert!(store.user_by_auth_id("auth-2").await.unwrap().is_none());

        let updated = store
            .update_user(
                &user.id,
                UserPatch {
                    subscription_tier: Some(SubscriptionTier::Pro),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.subscription_tier, SubscriptionTier::Pro);
        assert_eq!(updated.email, "a@example.com");
    }
}

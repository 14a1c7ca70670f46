//! Record codec — maps plaintext entries to/from their encrypted row form.
//!
//! Encryption decisions live here and nowhere else:
//! - `content` is always encrypted;
//! - `interpretation` only when present (absent stays absent — no
//!   encrypted null markers);
//! - `tags` / `emotions` element-wise, so one corrupt element does not
//!   take the whole list down;
//! - `id`, `user_id`, `occurred_on` and timestamps stay clear.
//!
//! Duplicates within a tag/emotion list carry no meaning and are dropped
//! (order-preserving) before encryption.

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::models::{EncryptedPatch, Entry, EntryPatch, EntryRow, NewEntry};

/// Encrypted creation payload for the remote backend. Timestamps are
/// store-assigned on insert.
#[derive(Debug, Clone)]
pub struct NewEntryRow {
    pub id: String,
    pub user_id: String,
    pub occurred_on: NaiveDate,
    pub content_enc: String,
    pub tags_enc: Vec<String>,
    pub emotions_enc: Vec<String>,
}

/// Encrypt a creation payload. The id is assigned by the facade.
pub fn encrypt_new_entry(id: &str, new: &NewEntry, key: &str) -> Result<NewEntryRow, StoreError> {
    Ok(NewEntryRow {
        id: id.to_owned(),
        user_id: new.user_id.clone(),
        occurred_on: new.occurred_on,
        content_enc: dv_crypto::cipher::encrypt(&new.content, key)?,
        tags_enc: encrypt_elements(&new.tags, key)?,
        emotions_enc: encrypt_elements(&new.emotions, key)?,
    })
}

/// Encrypt a full entry into its row form. Used by migration, where the
/// plaintext entry (including its local timestamps) already exists.
pub fn encrypt_entry(entry: &Entry, key: &str) -> Result<EntryRow, StoreError> {
    Ok(EntryRow {
        id: entry.id.clone(),
        user_id: entry.user_id.clone(),
        occurred_on: entry.occurred_on,
        content_enc: dv_crypto::cipher::encrypt(&entry.content, key)?,
        interpretation_enc: entry
            .interpretation
            .as_deref()
            .map(|text| dv_crypto::cipher::encrypt(text, key))
            .transpose()?,
        tags_enc: encrypt_elements(&entry.tags, key)?,
        emotions_enc: encrypt_elements(&entry.emotions, key)?,
        is_deleted: false,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    })
}

/// Decrypt a stored row back into the domain entry.
///
/// Any failing field aborts the whole record with an error naming the
/// record, not the key.
pub fn decrypt_row(row: &EntryRow, key: &str) -> Result<Entry, StoreError> {
    let wrap = |source: StoreError| match source {
        StoreError::Crypto(e) => StoreError::EntryDecrypt {
            entry_id: row.id.clone(),
            source: e,
        },
        other => other,
    };

    Ok(Entry {
        id: row.id.clone(),
        user_id: row.user_id.clone(),
        occurred_on: row.occurred_on,
        content: dv_crypto::cipher::decrypt(&row.content_enc, key)
            .map_err(StoreError::from)
            .map_err(wrap)?,
        interpretation: row
            .interpretation_enc
            .as_deref()
            .map(|envelope| dv_crypto::cipher::decrypt(envelope, key))
            .transpose()
            .map_err(StoreError::from)
            .map_err(wrap)?,
        tags: decrypt_elements(&row.tags_enc, key).map_err(wrap)?,
        emotions: decrypt_elements(&row.emotions_enc, key).map_err(wrap)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Encrypt only the fields present in a partial update. Omitted fields are
/// never re-encrypted, so their stored ciphertext stays byte-identical.
pub fn encrypt_patch(patch: &EntryPatch, key: &str) -> Result<EncryptedPatch, StoreError> {
    Ok(EncryptedPatch {
        occurred_on: patch.occurred_on,
        content_enc: patch
            .content
            .as_deref()
            .map(|text| dv_crypto::cipher::encrypt(text, key))
            .transpose()?,
        interpretation_enc: patch
            .interpretation
            .as_deref()
            .map(|text| dv_crypto::cipher::encrypt(text, key))
            .transpose()?,
        tags_enc: patch
            .tags
            .as_deref()
            .map(|tags| encrypt_elements(tags, key))
            .transpose()?,
        emotions_enc: patch
            .emotions
            .as_deref()
            .map(|emotions| encrypt_elements(emotions, key))
            .transpose()?,
    })
}

fn encrypt_elements(elements: &[String], key: &str) -> Result<Vec<String>, StoreError> {
    dedup(elements)
        .into_iter()
        .map(|element| dv_crypto::cipher::encrypt(element, key).map_err(StoreError::from))
        .collect()
}

fn decrypt_elements(envelopes: &[String], key: &str) -> Result<Vec<String>, StoreError> {
    envelopes
        .iter()
        .map(|envelope| dv_crypto::cipher::decrypt(envelope, key).map_err(StoreError::from))
        .collect()
}

/// Order-preserving dedup; first occurrence wins.
fn dedup(elements: &[String]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    elements
        .iter()
        .map(String::as_str)
        .filter(|e| seen.insert(*e))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_entry() -> Entry {
        Entry {
            id: "e-1".into(),
            user_id: "u-1".into(),
            occurred_on: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            content: "I was flying over mountains".into(),
            interpretation: None,
            tags: vec![],
            emotions: vec![],
            created_at: Utc.with_ymd_and_hms(2024, 3, 14, 8, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 14, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn entry_roundtrip_preserves_absent_and_empty() {
        let entry = sample_entry();
        let row = encrypt_entry(&entry, "k1").unwrap();

        assert!(row.interpretation_enc.is_none()); // absent stays absent
        assert!(row.tags_enc.is_empty());
        assert_ne!(row.content_enc, entry.content);

        let back = decrypt_row(&row, "k1").unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn clear_fields_stay_clear() {
        let mut entry = sample_entry();
        entry.tags = vec!["flying".into(), "mountains".into()];
        let row = encrypt_entry(&entry, "k1").unwrap();

        assert_eq!(row.id, entry.id);
        assert_eq!(row.user_id, entry.user_id);
        assert_eq!(row.occurred_on, entry.occurred_on);
        assert_eq!(row.created_at, entry.created_at);
        // every element individually enveloped
        assert_eq!(row.tags_enc.len(), 2);
        for envelope in &row.tags_enc {
            assert!(envelope.contains(':'));
        }
    }

    #[test]
    fn interpretation_encrypted_when_present() {
        let mut entry = sample_entry();
        entry.interpretation = Some("a yearning for freedom".into());
        let row = encrypt_entry(&entry, "k1").unwrap();
        let envelope = row.interpretation_enc.as_deref().unwrap();
        assert_ne!(envelope, "a yearning for freedom");

        let back = decrypt_row(&row, "k1").unwrap();
        assert_eq!(back.interpretation.as_deref(), Some("a yearning for freedom"));
    }

    #[test]
    fn tag_lists_are_deduplicated() {
        let mut entry = sample_entry();
        entry.tags = vec!["water".into(), "falling".into(), "water".into()];
        let row = encrypt_entry(&entry, "k1").unwrap();
        assert_eq!(row.tags_enc.len(), 2);

        let back = decrypt_row(&row, "k1").unwrap();
        assert_eq!(back.tags, vec!["water".to_string(), "falling".to_string()]);
    }

    #[test]
    fn wrong_key_names_the_record() {
        let row = encrypt_entry(&sample_entry(), "k1").unwrap();
        match decrypt_row(&row, "k2") {
            Err(StoreError::EntryDecrypt { entry_id, .. }) => assert_eq!(entry_id, "e-1"),
            other => panic!("expected EntryDecrypt, got {other:?}"),
        }
    }

    #[test]
    fn patch_encodes_only_present_fields() {
        let patch = EntryPatch {
            tags: Some(vec!["storm".into()]),
            ..Default::default()
        };
        let enc = encrypt_patch(&patch, "k1").unwrap();
        assert!(enc.content_enc.is_none());
        assert!(enc.interpretation_enc.is_none());
        assert!(enc.occurred_on.is_none());
        assert!(enc.emotions_enc.is_none());
        assert_eq!(enc.tags_enc.as_ref().unwrap().len(), 1);
    }
}

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};

use super::{Entries, SignStore};
use crate::{
    error::{Result, SignError},
    types::SignRecording,
};

/// Owner used for recordings made without an authenticated caller.
pub const ANONYMOUS_OWNER: &str = "anonymous";

#[derive(Clone, Debug, PartialEq)]
pub struct StoredRecord {
    pub recording: SignRecording,
    pub created_at: DateTime<Utc>,
}

/// External persistent store keyed by (owner, word).
pub trait RecordStore: Send + Sync {
    fn upsert(&self, owner: &str, recording: &SignRecording) -> Result<()>;
    fn delete(&self, owner: &str, word: &str) -> Result<()>;
    fn find(&self, owner: &str, word: &str) -> Result<Option<StoredRecord>>;
    fn all(&self) -> Result<Vec<StoredRecord>>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<HashMap<(String, String), StoredRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<(String, String), StoredRecord>>> {
        self.records
            .lock()
            .map_err(|_| SignError::Integrity("record store lock poisoned".into()))
    }
}

impl RecordStore for MemoryRecordStore {
    fn upsert(&self, owner: &str, recording: &SignRecording) -> Result<()> {
        let mut records = self.lock()?;
        let key = (owner.to_string(), recording.word.clone());
        let created_at = records
            .get(&key)
            .map(|existing| existing.created_at)
            .unwrap_or(recording.updated_at);
        records.insert(
            key,
            StoredRecord {
                recording: recording.clone(),
                created_at,
            },
        );
        Ok(())
    }

    fn delete(&self, owner: &str, word: &str) -> Result<()> {
        self.lock()?.remove(&(owner.to_string(), word.to_string()));
        Ok(())
    }

    fn find(&self, owner: &str, word: &str) -> Result<Option<StoredRecord>> {
        Ok(self
            .lock()?
            .get(&(owner.to_string(), word.to_string()))
            .cloned())
    }

    fn all(&self) -> Result<Vec<StoredRecord>> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

/// Keeps a `RecordStore` in step with the index.
pub struct ExternalMirror<R> {
    store: R,
}

impl<R: RecordStore> ExternalMirror<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }
}

fn owner_of(record: &SignRecording) -> &str {
    record.owner.as_deref().unwrap_or(ANONYMOUS_OWNER)
}

impl<R: RecordStore> SignStore for ExternalMirror<R> {
    fn name(&self) -> &'static str {
        "record store"
    }

    fn load(&self) -> Result<Vec<SignRecording>> {
        let mut records = self.store.all()?;
        // Newest last so it wins when the same word has several owners.
        records.sort_by_key(|stored| stored.recording.updated_at);
        Ok(records.into_iter().map(|stored| stored.recording).collect())
    }

    fn put(
        &self,
        record: &SignRecording,
        previous: Option<&SignRecording>,
        _snapshot: &Entries,
    ) -> Result<()> {
        self.store.upsert(owner_of(record), record)?;
        // One record per word: a new owner takes the word over.
        if let Some(previous) = previous.filter(|prev| owner_of(prev) != owner_of(record)) {
            self.store.delete(owner_of(previous), &previous.word)?;
        }
        Ok(())
    }

    fn remove(&self, record: &SignRecording, _snapshot: &Entries) -> Result<()> {
        self.store.delete(owner_of(record), &record.word)
    }
}

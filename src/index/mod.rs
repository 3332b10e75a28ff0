//! The authoritative word → recording index.
//!
//! `SignIndex` owns the in-memory map and pushes every change through its
//! backing stores before the new map becomes visible. Readers never observe
//! a half-applied change.

mod mapping_file;
mod record_store;

use std::{
    collections::BTreeMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

pub use mapping_file::MappingFileStore;
pub use record_store::{ANONYMOUS_OWNER, ExternalMirror, MemoryRecordStore, RecordStore, StoredRecord};

use crate::{
    error::{Result, SignError},
    types::SignRecording,
};

pub type Entries = BTreeMap<String, SignRecording>;

/// A durable copy of the index.
pub trait SignStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recordings this store currently holds.
    fn load(&self) -> Result<Vec<SignRecording>>;

    /// `record` was inserted, replacing `previous` if the word was already
    /// indexed; `snapshot` is the full index after the change.
    fn put(
        &self,
        record: &SignRecording,
        previous: Option<&SignRecording>,
        snapshot: &Entries,
    ) -> Result<()>;

    /// `record` was removed; `snapshot` is the full index after the change.
    fn remove(&self, record: &SignRecording, snapshot: &Entries) -> Result<()>;
}

pub struct SignIndex {
    entries: RwLock<Entries>,
    primary: Box<dyn SignStore>,
    mirrors: Vec<Box<dyn SignStore>>,
}

impl SignIndex {
    /// Loads membership from `primary`; mirrors only fill in owner and timestamps.
    pub fn open(primary: Box<dyn SignStore>, mirrors: Vec<Box<dyn SignStore>>) -> Result<Self> {
        let mut entries: Entries = primary
            .load()?
            .into_iter()
            .map(|record| (record.word.clone(), record))
            .collect();

        for mirror in &mirrors {
            for stored in mirror.load()? {
                if let Some(entry) = entries.get_mut(&stored.word) {
                    entry.owner = stored.owner.or(entry.owner.take());
                    entry.updated_at = stored.updated_at;
                }
            }
        }

        log::info!(
            "sign index opened from {} with {} words",
            primary.name(),
            entries.len()
        );

        Ok(Self {
            entries: RwLock::new(entries),
            primary,
            mirrors,
        })
    }

    pub fn get(&self, word: &str) -> Result<Option<SignRecording>> {
        Ok(self.read()?.get(word).cloned())
    }

    pub fn contains(&self, word: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(word))
    }

    pub fn list(&self) -> Result<Vec<SignRecording>> {
        Ok(self.read()?.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn put(&self, record: SignRecording) -> Result<()> {
        let mut guard = self.write()?;
        let mut next = guard.clone();
        let previous = next.insert(record.word.clone(), record.clone());

        self.each_store(|store| store.put(&record, previous.as_ref(), &next))?;
        *guard = next;
        log::info!("indexed '{}'", record.word);
        Ok(())
    }

    /// Removes `word`, returning the recording it pointed to.
    pub fn remove(&self, word: &str) -> Result<SignRecording> {
        let mut guard = self.write()?;
        let mut next = guard.clone();
        let record = next.remove(word).ok_or_else(|| SignError::NotFound {
            word: word.to_string(),
        })?;

        self.each_store(|store| store.remove(&record, &next))?;
        *guard = next;
        log::info!("removed '{word}' from index");
        Ok(record)
    }

    fn each_store(&self, mut apply: impl FnMut(&dyn SignStore) -> Result<()>) -> Result<()> {
        for store in std::iter::once(&self.primary).chain(self.mirrors.iter()) {
            if let Err(err) = apply(store.as_ref()) {
                log::error!("sign store {} rejected update: {err}", store.name());
                return Err(err);
            }
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Entries>> {
        self.entries
            .read()
            .map_err(|_| SignError::Integrity("sign index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Entries>> {
        self.entries
            .write()
            .map_err(|_| SignError::Integrity("sign index lock poisoned".into()))
    }
}

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entries, SignStore};
use crate::{
    assets::write_atomic,
    error::{Result, SignError},
    types::SignRecording,
};

#[derive(Debug, Serialize, Deserialize)]
struct MappingEntry {
    video: PathBuf,
    landmarks: PathBuf,
}

/// `{"word": {"video": ..., "landmarks": ...}}`, rewritten in full on every change.
#[derive(Clone, Debug)]
pub struct MappingFileStore {
    path: PathBuf,
}

impl MappingFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_snapshot(&self, snapshot: &Entries) -> Result<()> {
        let mapping: BTreeMap<&str, MappingEntry> = snapshot
            .iter()
            .map(|(word, record)| {
                (
                    word.as_str(),
                    MappingEntry {
                        video: record.video.clone(),
                        landmarks: record.landmarks.clone(),
                    },
                )
            })
            .collect();
        let bytes = serde_json::to_vec_pretty(&mapping).map_err(SignError::integrity)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

impl SignStore for MappingFileStore {
    fn name(&self) -> &'static str {
        "mapping file"
    }

    fn load(&self) -> Result<Vec<SignRecording>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mapping: BTreeMap<String, MappingEntry> =
            serde_json::from_slice(&bytes).map_err(|err| {
                SignError::Integrity(format!(
                    "malformed word mapping {}: {err}",
                    self.path.display()
                ))
            })?;

        Ok(mapping
            .into_iter()
            .map(|(word, entry)| SignRecording {
                updated_at: modified_at(&entry.landmarks),
                word,
                video: entry.video,
                landmarks: entry.landmarks,
                owner: None,
            })
            .collect())
    }

    fn put(
        &self,
        _record: &SignRecording,
        _previous: Option<&SignRecording>,
        snapshot: &Entries,
    ) -> Result<()> {
        self.write_snapshot(snapshot)
    }

    fn remove(&self, _record: &SignRecording, snapshot: &Entries) -> Result<()> {
        self.write_snapshot(snapshot)
    }
}

fn modified_at(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Annotator, reorder};
use crate::error::{Result, SignError};

/// One text → gloss translation, kept per owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub owner: String,
    pub text: String,
    pub gloss: String,
    pub timestamp: DateTime<Utc>,
}

pub trait TranslationLog: Send + Sync {
    fn append(&self, translation: Translation) -> Result<()>;
    fn history(&self, owner: &str) -> Result<Vec<Translation>>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryTranslationLog {
    entries: Arc<Mutex<Vec<Translation>>>,
}

impl MemoryTranslationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranslationLog for MemoryTranslationLog {
    fn append(&self, translation: Translation) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| SignError::Integrity("translation log lock poisoned".into()))?
            .push(translation);
        Ok(())
    }

    fn history(&self, owner: &str) -> Result<Vec<Translation>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| SignError::Integrity("translation log lock poisoned".into()))?;
        Ok(entries
            .iter()
            .filter(|entry| entry.owner == owner)
            .cloned()
            .collect())
    }
}

/// Translation log kept in a JSON-lines file, appended once per translation.
#[derive(Debug)]
pub struct FileTranslationLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTranslationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| SignError::Integrity("translation log lock poisoned".into()))
    }
}

impl TranslationLog for FileTranslationLog {
    fn append(&self, translation: Translation) -> Result<()> {
        let _guard = self.guard()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(&translation).map_err(SignError::integrity)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn history(&self, owner: &str) -> Result<Vec<Translation>> {
        let _guard = self.guard()?;
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: Translation = serde_json::from_str(line).map_err(|err| {
                SignError::Integrity(format!(
                    "{} line {}: {err}",
                    self.path.display(),
                    line_no + 1
                ))
            })?;
            if entry.owner == owner {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

pub struct Translator<A, L> {
    annotator: A,
    log: L,
}

impl<A: Annotator, L: TranslationLog> Translator<A, L> {
    pub fn new(annotator: A, log: L) -> Self {
        Self { annotator, log }
    }

    pub fn translate(&self, owner: &str, text: &str) -> Result<Translation> {
        if text.trim().is_empty() {
            return Err(SignError::Validation("text is required".into()));
        }

        let tokens = self
            .annotator
            .annotate(text)
            .map_err(|err| SignError::Validation(format!("could not annotate text: {err:#}")))?;
        let gloss = reorder(&tokens).to_string();
        log::debug!("translated {} tokens for {owner}: {gloss}", tokens.len());

        let translation = Translation {
            owner: owner.to_string(),
            text: text.to_string(),
            gloss,
            timestamp: Utc::now(),
        };
        self.log.append(translation.clone())?;
        Ok(translation)
    }

    pub fn history(&self, owner: &str) -> Result<Vec<Translation>> {
        self.log.history(owner)
    }
}

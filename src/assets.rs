//! On-disk layout and codecs for per-word assets.
//!
//! Landmark assets are JSON arrays of frames, each frame an array of hands,
//! each hand exactly 21 `{x, y, z}` objects.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::{
    error::{Result, SignError},
    types::{LandmarkSequence, MAX_HANDS},
};

const VIDEO_DIR: &str = "videos";
const LANDMARK_DIR: &str = "landmarks";
const ANIMATION_DIR: &str = "animations";
const VIDEO_EXT: &str = "mp4";
const LANDMARK_EXT: &str = "json";

/// Trims and lower-cases a word, rejecting anything unusable as a file name.
pub fn normalize_word(raw: &str) -> Result<String> {
    let word = raw.trim().to_lowercase();
    if word.is_empty() {
        return Err(SignError::Validation("word is required".into()));
    }
    if word == "." || word == ".." || word.contains(['/', '\\', '\0']) {
        return Err(SignError::Validation(format!(
            "word '{word}' contains path characters"
        )));
    }
    if word.chars().any(char::is_control) {
        return Err(SignError::Validation(format!(
            "word '{}' contains control characters",
            word.escape_debug()
        )));
    }
    Ok(word)
}

/// Where the assets for each word live under the data directory.
#[derive(Clone, Debug)]
pub struct AssetLayout {
    root: PathBuf,
}

impl AssetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn video_path(&self, word: &str) -> PathBuf {
        self.root
            .join(VIDEO_DIR)
            .join(format!("{word}.{VIDEO_EXT}"))
    }

    pub fn landmark_path(&self, word: &str) -> PathBuf {
        self.root
            .join(LANDMARK_DIR)
            .join(format!("{word}.{LANDMARK_EXT}"))
    }

    pub fn animation_path(&self, word: &str) -> PathBuf {
        self.root
            .join(ANIMATION_DIR)
            .join(format!("{word}.{VIDEO_EXT}"))
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [VIDEO_DIR, LANDMARK_DIR, ANIMATION_DIR] {
            fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }
}

/// Sibling path used while a file is being written.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Writes `bytes` next to `path` and renames into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = partial_path(path);
    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

pub fn write_landmarks(path: &Path, sequence: &LandmarkSequence) -> Result<()> {
    validate_landmarks(sequence)?;
    let bytes = serde_json::to_vec(sequence).map_err(SignError::integrity)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Reads and validates a landmark asset. Every failure is an integrity error.
pub fn read_landmarks(path: &Path) -> Result<LandmarkSequence> {
    let bytes = fs::read(path).map_err(|err| {
        SignError::Integrity(format!(
            "cannot read landmark asset {}: {err}",
            path.display()
        ))
    })?;
    let sequence = parse_landmarks(&bytes).map_err(|err| match err {
        SignError::Integrity(msg) => SignError::Integrity(format!("{}: {msg}", path.display())),
        other => other,
    })?;
    Ok(sequence)
}

pub fn parse_landmarks(bytes: &[u8]) -> Result<LandmarkSequence> {
    let sequence: LandmarkSequence = serde_json::from_slice(bytes)
        .map_err(|err| SignError::Integrity(format!("malformed landmark asset: {err}")))?;
    validate_landmarks(&sequence)?;
    Ok(sequence)
}

pub fn validate_landmarks(sequence: &LandmarkSequence) -> Result<()> {
    for (frame_idx, frame) in sequence.frames.iter().enumerate() {
        if frame.hands.len() > MAX_HANDS {
            return Err(SignError::Integrity(format!(
                "frame {frame_idx} has {} hands, at most {MAX_HANDS} allowed",
                frame.hands.len()
            )));
        }
        if let Some(hand_idx) = frame.hands.iter().position(|hand| !hand.is_finite()) {
            return Err(SignError::Integrity(format!(
                "frame {frame_idx} hand {hand_idx} has a non-finite coordinate"
            )));
        }
    }
    Ok(())
}

/// Removes an asset; a file that is already gone counts as removed.
pub fn remove_asset(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("removed asset {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SignError::Integrity(format!(
            "failed to remove {}: {err}",
            path.display()
        ))),
    }
}

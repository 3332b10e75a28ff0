use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    model_download::{default_handpose_estimator_model_path, default_palm_detector_model_path},
    types::Resolution,
};

pub const DEFAULT_CONFIG_FILE: &str = "signlang.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub render: RenderConfig,
    pub models: ModelConfig,
    pub video: VideoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub mapping_file: String,
    /// Per-owner gloss history, one JSON object per line.
    pub translation_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub countdown_ms: u64,
    pub duration_ms: u64,
    /// Draw detected skeletons onto the recorded footage.
    pub annotate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub handpose_estimator: PathBuf,
    pub palm_detector: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Explicit ffmpeg binary; looked up on PATH when unset.
    pub ffmpeg_path: Option<PathBuf>,
    /// Encoder arguments placed before the output path.
    pub encoder_args: Option<Vec<String>>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            mapping_file: "words.json".to_string(),
            translation_log: "translations.jsonl".to_string(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: 640,
            height: 480,
            fps: 20,
            countdown_ms: 3_000,
            duration_ms: 5_000,
            annotate: true,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 20,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            handpose_estimator: default_handpose_estimator_model_path(),
            palm_detector: default_palm_detector_model_path(),
        }
    }
}

impl StorageConfig {
    pub fn mapping_path(&self) -> PathBuf {
        self.data_dir.join(&self.mapping_file)
    }

    pub fn translation_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.translation_log)
    }
}

impl CaptureConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl RenderConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.capture.width > 0 && self.capture.height > 0,
            "capture resolution must be non-zero"
        );
        anyhow::ensure!(self.capture.fps > 0, "capture fps must be non-zero");
        anyhow::ensure!(
            self.render.width > 0 && self.render.height > 0,
            "render resolution must be non-zero"
        );
        anyhow::ensure!(self.render.fps > 0, "render fps must be non-zero");
        anyhow::ensure!(
            !self.storage.mapping_file.trim().is_empty(),
            "storage.mapping_file must not be empty"
        );
        Ok(())
    }
}

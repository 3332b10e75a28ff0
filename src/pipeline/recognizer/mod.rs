mod common;
mod ort;
mod palm;

use std::path::PathBuf;

use anyhow::Result;

pub use self::ort::OrtHandDetector;
pub use self::palm::PalmRegion;

use crate::{
    config::ModelConfig,
    model_download::{ModelKind, ensure_model_ready},
    types::{CameraFrame, HandFrame},
};

/// Finds up to two hands in an image. An empty frame means nothing was found.
pub trait HandDetector: Send {
    fn detect(&mut self, frame: &CameraFrame) -> Result<HandFrame>;
}

#[derive(Clone, Debug)]
pub struct RecognizerBackend {
    handpose_estimator_model_path: PathBuf,
    palm_detector_model_path: PathBuf,
}

impl RecognizerBackend {
    pub fn new(models: &ModelConfig) -> Self {
        Self {
            handpose_estimator_model_path: models.handpose_estimator.clone(),
            palm_detector_model_path: models.palm_detector.clone(),
        }
    }

    pub fn label(&self) -> &'static str {
        "ort"
    }

    /// Makes sure both models are on disk, downloading them if needed.
    pub fn prepare_models(&self) -> Result<()> {
        ensure_model_ready(
            ModelKind::HandposeEstimator,
            &self.handpose_estimator_model_path,
            |_evt| {},
        )?;
        ensure_model_ready(
            ModelKind::PalmDetector,
            &self.palm_detector_model_path,
            |_evt| {},
        )?;
        Ok(())
    }

    pub fn load(&self) -> Result<OrtHandDetector> {
        log::info!("starting handpose backend: {}", self.label());
        self.prepare_models()?;
        OrtHandDetector::new(
            &self.handpose_estimator_model_path,
            &self.palm_detector_model_path,
        )
    }
}

impl Default for RecognizerBackend {
    fn default() -> Self {
        Self::new(&ModelConfig::default())
    }
}

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandDetector,
    common::{self, INPUT_SIZE},
    palm::{PalmDetector, PalmDetectorConfig, PalmRegion, crop_from_palm, strongest_regions},
};
use crate::types::{CameraFrame, Hand, HandFrame, MAX_HANDS};

/// Handpose confidence below which a crop is treated as "no hand".
const MIN_HAND_CONFIDENCE: f32 = 0.2;

/// Palm detection followed by one handpose pass per palm, at most two hands.
pub struct OrtHandDetector {
    handpose: Session,
    palm_detector: PalmDetector,
}

impl OrtHandDetector {
    pub fn new(handpose_model: &Path, palm_model: &Path) -> Result<Self> {
        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(handpose_model)
            .with_context(|| format!("failed to load ORT session from {}", handpose_model.display()))?;

        let palm_detector = PalmDetector::new(palm_model, PalmDetectorConfig::default())?;

        log::info!(
            "handpose ORT backend ready using {} and palm detector {}",
            handpose_model.display(),
            palm_model.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
        })
    }

    fn estimate(&mut self, frame: &CameraFrame, palm: &PalmRegion) -> Result<Option<Hand>> {
        let (center, side, angle) = crop_from_palm(palm);
        let (input, transform) = common::rotated_crop_tensor(frame, center, side, angle, INPUT_SIZE)?;
        let outputs = self
            .handpose
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flattened)?;

        let confidence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };
        if confidence * palm.score < MIN_HAND_CONFIDENCE {
            return Ok(None);
        }

        let normalized: Vec<[f32; 3]> = landmarks
            .into_iter()
            .map(|point| transform.normalize(point))
            .collect();
        Ok(Hand::from_points(&normalized).filter(Hand::is_finite))
    }
}

impl HandDetector for OrtHandDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<HandFrame> {
        let palms = self.palm_detector.detect(frame)?;
        let mut hands = Vec::with_capacity(MAX_HANDS);
        for palm in strongest_regions(&palms, MAX_HANDS) {
            match self.estimate(frame, palm) {
                Ok(Some(hand)) => hands.push(hand),
                Ok(None) => {}
                Err(err) => log::warn!("handpose inference failed: {err:?}"),
            }
        }
        Ok(HandFrame::new(hands))
    }
}

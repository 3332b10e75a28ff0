mod anchors;

use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anchors::{NUM_ANCHORS, anchors};
use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{LetterboxInfo, PALM_INPUT_SIZE, letterbox_tensor};
use crate::types::CameraFrame;

/// Keypoints the palm detector reports per box.
const PALM_KEYPOINTS: usize = 7;
/// Box (cx, cy, w, h) followed by keypoint (x, y) pairs.
const PALM_FEATURES: usize = 4 + PALM_KEYPOINTS * 2;

#[derive(Clone, Debug, PartialEq)]
pub struct PalmRegion {
    /// `[x1, y1, x2, y2]` in source pixels.
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 32,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load palm detector from {}", model_path.display()))?;

        Ok(Self { session, cfg })
    }

    pub fn detect(&mut self, frame: &CameraFrame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = letterbox_tensor(frame, PALM_INPUT_SIZE)?;
        let outputs = self
            .session
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let boxes = boxes
            .as_slice()
            .ok_or_else(|| anyhow!("palm boxes not contiguous"))?;
        let scores = scores
            .as_slice()
            .ok_or_else(|| anyhow!("palm scores not contiguous"))?;

        decode_palms(boxes, scores, &letterbox, &self.cfg)
    }
}

/// Turns raw SSD outputs into source-space palm regions after NMS.
///
/// `boxes` is `[anchors × PALM_FEATURES]` and `scores` is `[anchors]` (logits).
fn decode_palms(
    boxes: &[f32],
    scores: &[f32],
    letterbox: &LetterboxInfo,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    if scores.is_empty() || boxes.len() % scores.len() != 0 {
        return Err(anyhow!(
            "palm outputs disagree: {} box values for {} scores",
            boxes.len(),
            scores.len()
        ));
    }
    let features = boxes.len() / scores.len();
    if features < PALM_FEATURES {
        return Err(anyhow!("palm box feature dimension too small: {features}"));
    }

    let input = PALM_INPUT_SIZE as f32;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let bias = (letterbox.pad_x / letterbox.scale, letterbox.pad_y / letterbox.scale);
    let to_source = |nx: f32, ny: f32| (nx * scale - bias.0, ny * scale - bias.1);
    let max_x = letterbox.orig_w.saturating_sub(1) as f32;
    let max_y = letterbox.orig_h.saturating_sub(1) as f32;

    let mut candidates = Vec::new();
    for (idx, (&logit, anchor)) in scores
        .iter()
        .zip(anchors())
        .take(NUM_ANCHORS)
        .enumerate()
    {
        let score = sigmoid(logit);
        if score < cfg.score_threshold {
            continue;
        }

        let f = &boxes[idx * features..idx * features + PALM_FEATURES];
        let cx = f[0] / input + anchor[0];
        let cy = f[1] / input + anchor[1];
        let (hw, hh) = (f[2] / input / 2.0, f[3] / input / 2.0);

        let (x1, y1) = to_source(cx - hw, cy - hh);
        let (x2, y2) = to_source(cx + hw, cy + hh);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let keypoints = f[4..]
            .chunks_exact(2)
            .map(|kp| to_source(kp[0] / input + anchor[0], kp[1] / input + anchor[1]))
            .collect();

        candidates.push(PalmRegion {
            bbox: [
                x1.clamp(0.0, max_x),
                y1.clamp(0.0, max_y),
                x2.clamp(0.0, max_x),
                y2.clamp(0.0, max_y),
            ],
            keypoints,
            score,
        });
    }

    Ok(nms(candidates, cfg.nms_threshold, cfg.top_k))
}

/// The `n` highest-scoring regions, best first.
pub fn strongest_regions(regions: &[PalmRegion], n: usize) -> Vec<&PalmRegion> {
    let mut sorted: Vec<&PalmRegion> = regions.iter().collect();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    sorted.truncate(n);
    sorted
}

/// Center, side length and rotation of the handpose crop for a palm.
pub fn crop_from_palm(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let [x1, y1, x2, y2] = region.bbox;
    let center = if region.keypoints.is_empty() {
        ((x1 + x2) * 0.5, (y1 + y2) * 0.5)
    } else {
        mean(&region.keypoints)
    };

    let span = if region.keypoints.is_empty() {
        0.0
    } else {
        let (min_x, max_x, min_y, max_y) = region.keypoints.iter().fold(
            (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
            |acc, &(x, y)| (acc.0.min(x), acc.1.max(x), acc.2.min(y), acc.3.max(y)),
        );
        (max_x - min_x).max(max_y - min_y)
    };
    // Generous margin so extended fingers stay inside the crop.
    let side = (x2 - x1).abs().max((y2 - y1).abs()).max(span).max(80.0) * 2.4;

    (center, side, estimate_orientation(region))
}

/// Principal axis of the palm keypoints, rotated so fingers point up.
pub fn estimate_orientation(region: &PalmRegion) -> f32 {
    if region.keypoints.len() < 2 {
        return 0.0;
    }

    let (mx, my) = mean(&region.keypoints);
    let n = region.keypoints.len() as f32;
    let (xx, xy, yy) = region
        .keypoints
        .iter()
        .fold((0.0f32, 0.0f32, 0.0f32), |acc, &(x, y)| {
            let (dx, dy) = (x - mx, y - my);
            (acc.0 + dx * dx, acc.1 + dx * dy, acc.2 + dy * dy)
        });
    let (xx, xy, yy) = (xx / n, xy / n, yy / n);

    let half_trace = (xx + yy) * 0.5;
    let det = xx * yy - xy * xy;
    let lambda = (half_trace + (half_trace * half_trace - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if xy.abs() > 1e-6 {
        (lambda - yy, xy)
    } else if xx >= yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}

fn mean(points: &[(f32, f32)]) -> (f32, f32) {
    let n = points.len().max(1) as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |acc, &(x, y)| (acc.0 + x, acc.1 + y));
    (sx / n, sy / n)
}

fn nms(mut candidates: Vec<PalmRegion>, threshold: f32, top_k: usize) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if keep.len() >= top_k {
            break;
        }
        if keep.iter().all(|k| iou(&candidate.bbox, &k.bbox) < threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

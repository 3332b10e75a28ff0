use std::{path::PathBuf, time::Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of keypoints in one tracked hand skeleton.
pub const NUM_LANDMARKS: usize = 21;

/// Most hands the detector reports for a single image.
pub const MAX_HANDS: usize = 2;

/// One camera image in RGBA8 layout.
#[derive(Clone, Debug)]
pub struct CameraFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

/// One normalized keypoint: `x`/`y` in [0,1] image space, `z` relative depth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Exactly 21 landmarks in skeletal order, wrist first and pinky tip last.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hand {
    pub landmarks: [Landmark; NUM_LANDMARKS],
}

impl Hand {
    pub fn new(landmarks: [Landmark; NUM_LANDMARKS]) -> Self {
        Self { landmarks }
    }

    /// Builds a hand from a detector output, rejecting anything that is not 21 points.
    pub fn from_points(points: &[[f32; 3]]) -> Option<Self> {
        if points.len() != NUM_LANDMARKS {
            return None;
        }
        let mut landmarks = [Landmark::default(); NUM_LANDMARKS];
        for (slot, [x, y, z]) in landmarks.iter_mut().zip(points.iter().copied()) {
            *slot = Landmark::new(x, y, z);
        }
        Some(Self { landmarks })
    }

    pub fn wrist(&self) -> Landmark {
        self.landmarks[0]
    }

    pub fn is_finite(&self) -> bool {
        self.landmarks.iter().all(Landmark::is_finite)
    }
}

/// Hands detected in one captured image. An empty frame means "no detection".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandFrame {
    pub hands: Vec<Hand>,
}

impl HandFrame {
    pub fn new(hands: Vec<Hand>) -> Self {
        Self { hands }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSequence {
    pub frames: Vec<HandFrame>,
}

impl LandmarkSequence {
    pub fn new(frames: Vec<HandFrame>) -> Self {
        Self { frames }
    }

    pub fn push(&mut self, frame: HandFrame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames that carry at least one hand; these are the ones playback draws.
    pub fn populated_frames(&self) -> impl Iterator<Item = &HandFrame> {
        self.frames.iter().filter(|frame| !frame.is_empty())
    }
}

/// Stored assets for one word.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignRecording {
    pub word: String,
    pub video: PathBuf,
    pub landmarks: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

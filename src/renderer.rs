//! Turns a landmark asset into a skeleton-only playback video.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::{
    assets::{AssetLayout, normalize_word, partial_path, read_landmarks},
    config::RenderConfig,
    error::{Result, SignError},
    index::SignIndex,
    pipeline::{SkeletonStyle, VideoSink, skeleton::draw_hand},
    types::{HandFrame, LandmarkSequence},
};

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

pub struct AnimationRenderer {
    sink: Arc<dyn VideoSink>,
    layout: AssetLayout,
    settings: RenderConfig,
}

impl AnimationRenderer {
    pub fn new(sink: Arc<dyn VideoSink>, layout: AssetLayout, settings: RenderConfig) -> Self {
        Self {
            sink,
            layout,
            settings,
        }
    }

    /// Renders the asset at `landmark_path` to `animations/<word>.mp4`.
    ///
    /// The asset is read and validated before anything is written.
    pub fn render(&self, landmark_path: &Path, word: &str) -> Result<PathBuf> {
        let word = normalize_word(word)?;
        let sequence = read_landmarks(landmark_path)?;
        let frames = self.render_frames(&sequence);
        if frames.is_empty() {
            return Err(SignError::Integrity(format!(
                "{} contains no frames with hands",
                landmark_path.display()
            )));
        }

        let output = self.layout.animation_path(&word);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = partial_path(&output);
        if let Err(err) = self.encode(&tmp_path, &frames) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
        fs::rename(&tmp_path, &output)?;

        log::info!(
            "rendered '{word}' ({} frames at {} fps) to {}",
            frames.len(),
            self.settings.fps,
            output.display()
        );
        Ok(output)
    }

    /// Renders the landmark asset the index holds for `word`.
    pub fn render_word(&self, word: &str, index: &SignIndex) -> Result<PathBuf> {
        let word = normalize_word(word)?;
        let record = index
            .get(&word)?
            .ok_or_else(|| SignError::NotFound { word: word.clone() })?;
        self.render(&record.landmarks, &word)
    }

    /// One canvas per frame that has at least one hand, in order.
    pub fn render_frames(&self, sequence: &LandmarkSequence) -> Vec<RgbaImage> {
        let resolution = self.settings.resolution();
        let populated: Vec<&HandFrame> = sequence.populated_frames().collect();
        populated
            .par_iter()
            .map(|frame| draw_frame(frame, resolution.width, resolution.height))
            .collect()
    }

    fn encode(&self, path: &Path, frames: &[RgbaImage]) -> Result<()> {
        let mut writer = self
            .sink
            .create(path, self.settings.resolution(), self.settings.fps)
            .map_err(SignError::device)?;
        for frame in frames {
            writer.write_frame(frame).map_err(SignError::device)?;
        }
        writer.finish().map_err(SignError::device)?;
        Ok(())
    }
}

fn draw_frame(frame: &HandFrame, width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);
    for hand in &frame.hands {
        draw_hand(&mut canvas, width, height, hand, &SkeletonStyle::PLAYBACK);
    }
    canvas
}

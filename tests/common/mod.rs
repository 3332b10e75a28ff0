//! Scripted stand-ins for the camera, hand detector and video encoder.

#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use anyhow::{Result, anyhow};
use image::RgbaImage;
use signlang::{
    GestureRecorder, SignIndex,
    assets::AssetLayout,
    config::CaptureConfig,
    index::{ExternalMirror, MappingFileStore, MemoryRecordStore, SignStore},
    pipeline::{CaptureBackend, CaptureDevice, FrameRead, HandDetector, VideoSink, VideoWriter},
    types::{CameraFrame, Hand, HandFrame, Landmark, NUM_LANDMARKS, Resolution},
};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

#[derive(Clone, Default)]
pub struct DeviceCounters {
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl DeviceCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Camera yielding `frames` images before every further read fails.
/// `None` never runs dry. Reads listed in `undecodable` (zero-based) return
/// a frame that cannot be decoded and do not use up the budget.
pub struct FakeCamera {
    pub frames: Option<usize>,
    pub undecodable: Vec<usize>,
    pub fail_open: bool,
    pub counters: DeviceCounters,
}

impl FakeCamera {
    pub fn with_frames(frames: usize) -> Self {
        Self {
            frames: Some(frames),
            undecodable: Vec::new(),
            fail_open: false,
            counters: DeviceCounters::default(),
        }
    }

    pub fn endless() -> Self {
        Self {
            frames: None,
            ..Self::with_frames(0)
        }
    }

    pub fn undecodable_at(mut self, reads: &[usize]) -> Self {
        self.undecodable = reads.to_vec();
        self
    }

    pub fn broken() -> Self {
        Self {
            fail_open: true,
            ..Self::with_frames(0)
        }
    }
}

impl CaptureBackend for FakeCamera {
    fn open(&self) -> Result<Box<dyn CaptureDevice>> {
        if self.fail_open {
            return Err(anyhow!("no camera attached"));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDevice {
            remaining: self.frames,
            undecodable: self.undecodable.clone(),
            reads: 0,
            counters: self.counters.clone(),
        }))
    }

    fn label(&self) -> String {
        "fake camera".into()
    }
}

struct FakeDevice {
    remaining: Option<usize>,
    undecodable: Vec<usize>,
    reads: usize,
    counters: DeviceCounters,
}

impl CaptureDevice for FakeDevice {
    fn read_frame(&mut self) -> Result<FrameRead> {
        let read = self.reads;
        self.reads += 1;
        if self.undecodable.contains(&read) {
            return Ok(FrameRead::Undecodable(anyhow!("corrupt MJPEG payload")));
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(anyhow!("camera unplugged"));
            }
            *remaining -= 1;
        }
        // Twice the canonical size so the resize path runs.
        let (width, height) = (WIDTH * 2, HEIGHT * 2);
        Ok(FrameRead::Frame(CameraFrame {
            rgba: vec![90; (width * height * 4) as usize],
            width,
            height,
            timestamp: Instant::now(),
        }))
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy)]
pub enum DetectorScript {
    /// One hand in every frame.
    AlwaysHand,
    /// No hands in every third frame, starting with the first.
    GapEveryThird,
    /// Every call errors.
    Failing,
}

pub struct ScriptedDetector {
    script: DetectorScript,
    calls: usize,
}

impl ScriptedDetector {
    pub fn boxed(script: DetectorScript) -> Box<dyn HandDetector> {
        Box::new(Self { script, calls: 0 })
    }
}

pub fn sample_hand(shift: f32) -> Hand {
    let mut landmarks = [Landmark::default(); NUM_LANDMARKS];
    for (i, lm) in landmarks.iter_mut().enumerate() {
        *lm = Landmark::new(0.3 + shift + i as f32 * 0.015, 0.25 + i as f32 * 0.02, -0.01);
    }
    Hand::new(landmarks)
}

impl HandDetector for ScriptedDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<HandFrame> {
        assert_eq!((frame.width, frame.height), (WIDTH, HEIGHT));
        let call = self.calls;
        self.calls += 1;
        match self.script {
            DetectorScript::AlwaysHand => Ok(HandFrame::new(vec![sample_hand(0.0)])),
            DetectorScript::GapEveryThird if call % 3 == 0 => Ok(HandFrame::empty()),
            DetectorScript::GapEveryThird => Ok(HandFrame::new(vec![
                sample_hand(0.0),
                sample_hand(0.2),
            ])),
            DetectorScript::Failing => Err(anyhow!("model not loaded")),
        }
    }
}

/// Encoder that writes a text summary instead of video. Each output carries
/// a run number so successive recordings differ byte-wise.
#[derive(Clone, Default)]
pub struct TextSink {
    pub fail_create: bool,
    pub runs: Arc<AtomicUsize>,
    pub finished: Arc<Mutex<Vec<(PathBuf, u64)>>>,
}

impl TextSink {
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }
}

impl VideoSink for TextSink {
    fn create(
        &self,
        path: &Path,
        resolution: Resolution,
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>> {
        if self.fail_create {
            return Err(anyhow!("encoder missing"));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, b"")?;
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TextWriter {
            path: path.to_path_buf(),
            header: format!("run {run} {}x{} @{fps}", resolution.width, resolution.height),
            frames: 0,
            finished: self.finished.clone(),
        }))
    }
}

struct TextWriter {
    path: PathBuf,
    header: String,
    frames: u64,
    finished: Arc<Mutex<Vec<(PathBuf, u64)>>>,
}

impl VideoWriter for TextWriter {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        assert_eq!(frame.dimensions(), (WIDTH, HEIGHT));
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        fs::write(&self.path, format!("{} frames {}", self.header, self.frames))?;
        self.finished
            .lock()
            .unwrap()
            .push((self.path.clone(), self.frames));
        Ok(self.frames)
    }
}

pub fn capture_config(duration_ms: u64) -> CaptureConfig {
    CaptureConfig {
        width: WIDTH,
        height: HEIGHT,
        fps: 100,
        countdown_ms: 0,
        duration_ms,
        ..CaptureConfig::default()
    }
}

pub fn open_index(data_dir: &Path) -> Arc<SignIndex> {
    let primary = MappingFileStore::new(data_dir.join("words.json"));
    let mirrors: Vec<Box<dyn SignStore>> =
        vec![Box::new(ExternalMirror::new(MemoryRecordStore::new()))];
    Arc::new(SignIndex::open(Box::new(primary), mirrors).unwrap())
}

pub struct Harness {
    pub recorder: GestureRecorder,
    pub index: Arc<SignIndex>,
    pub layout: AssetLayout,
    pub counters: DeviceCounters,
    pub sink: TextSink,
}

pub fn harness(
    data_dir: &Path,
    camera: FakeCamera,
    script: DetectorScript,
    sink: TextSink,
    settings: CaptureConfig,
) -> Harness {
    let index = open_index(data_dir);
    let layout = AssetLayout::new(data_dir);
    let counters = camera.counters.clone();
    let recorder = GestureRecorder::new(
        settings,
        layout.clone(),
        index.clone(),
        Arc::new(camera),
        ScriptedDetector::boxed(script),
        Arc::new(sink.clone()),
    );
    Harness {
        recorder,
        index,
        layout,
        counters,
        sink,
    }
}

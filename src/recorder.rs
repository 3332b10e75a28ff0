//! Records a word's gesture: camera footage plus per-frame hand landmarks.
//!
//! A capture runs on its own worker thread and walks
//! `Idle → OpeningDevice → Countdown → Capturing → Finalizing → Persisted`.
//! Only one capture may hold the camera at a time.

use std::{
    fs,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use image::RgbaImage;

use crate::{
    assets::{AssetLayout, normalize_word, partial_path, remove_asset, write_landmarks},
    config::CaptureConfig,
    error::{Result, SignError},
    index::SignIndex,
    pipeline::{
        CaptureBackend, CaptureDevice, FrameRead, HandDetector, SkeletonStyle, VideoSink, VideoWriter,
        frame::{prepare_capture_frame, to_camera_frame},
        skeleton::draw_hand,
    },
    types::{HandFrame, LandmarkSequence, SignRecording},
};

const CANCEL_POLL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    OpeningDevice,
    Countdown,
    Capturing,
    Finalizing,
    Persisted,
    DeviceError,
    Cancelled,
    /// Capture or persistence failed after the device was open.
    Failed,
}

impl CaptureState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CaptureState::Persisted
                | CaptureState::DeviceError
                | CaptureState::Cancelled
                | CaptureState::Failed
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureEvent {
    State(CaptureState),
    Frame { index: usize, hands: usize },
}

#[derive(Clone, Debug)]
pub struct CaptureRequest {
    pub word: String,
    pub owner: Option<String>,
    pub overwrite: bool,
}

impl CaptureRequest {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            owner: None,
            overwrite: false,
        }
    }

    #[must_use]
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Single-owner claim on the physical camera.
#[derive(Clone, Debug, Default)]
struct DeviceLock {
    busy: Arc<AtomicBool>,
}

impl DeviceLock {
    fn try_acquire(&self) -> Option<DeviceLease> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DeviceLease {
                busy: self.busy.clone(),
            })
    }
}

struct DeviceLease {
    busy: Arc<AtomicBool>,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

pub struct GestureRecorder {
    settings: CaptureConfig,
    layout: AssetLayout,
    index: Arc<SignIndex>,
    camera: Arc<dyn CaptureBackend>,
    detector: Arc<Mutex<Box<dyn HandDetector>>>,
    sink: Arc<dyn VideoSink>,
    device_lock: DeviceLock,
}

impl GestureRecorder {
    pub fn new(
        settings: CaptureConfig,
        layout: AssetLayout,
        index: Arc<SignIndex>,
        camera: Arc<dyn CaptureBackend>,
        detector: Box<dyn HandDetector>,
        sink: Arc<dyn VideoSink>,
    ) -> Self {
        Self {
            settings,
            layout,
            index,
            camera,
            detector: Arc::new(Mutex::new(detector)),
            sink,
            device_lock: DeviceLock::default(),
        }
    }

    pub fn index(&self) -> &Arc<SignIndex> {
        &self.index
    }

    pub fn lookup(&self, word: &str) -> Result<Option<SignRecording>> {
        self.index.get(&normalize_word(word)?)
    }

    pub fn list(&self) -> Result<Vec<SignRecording>> {
        self.index.list()
    }

    /// Records synchronously: `start` followed by `wait`.
    pub fn record(&self, request: CaptureRequest) -> Result<SignRecording> {
        self.start(request)?.wait()
    }

    /// Validates the request and launches the capture worker.
    ///
    /// Conflicts, busy devices and failed asset removal are reported here,
    /// before any device access.
    pub fn start(&self, request: CaptureRequest) -> Result<CaptureTask> {
        let word = normalize_word(&request.word)?;

        // The conflict check must see everything the previous holder indexed.
        let lease = self
            .device_lock
            .try_acquire()
            .ok_or_else(|| SignError::Device("capture device is busy".into()))?;

        let existing = self.index.get(&word)?;
        if existing.is_some() && !request.overwrite {
            return Err(SignError::Conflict { word });
        }

        if let Some(existing) = &existing {
            log::info!("overwriting '{word}', removing previous assets");
            // Nothing is deleted yet if this fails, so the entry stays valid.
            remove_asset(&existing.video)?;
        }

        let replaced = existing.is_some();
        self.launch(word.clone(), request.owner, existing, lease)
            .inspect_err(|_| {
                if replaced {
                    drop_stale_entry(&self.index, &word);
                }
            })
    }

    fn launch(
        &self,
        word: String,
        owner: Option<String>,
        existing: Option<SignRecording>,
        lease: DeviceLease,
    ) -> Result<CaptureTask> {
        if let Some(existing) = &existing {
            remove_asset(&existing.landmarks)?;
        }
        self.layout.ensure_dirs()?;

        let (events_tx, events_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let session = CaptureSession {
            word: word.clone(),
            owner,
            replaced: existing.is_some(),
            video_path: self.layout.video_path(&word),
            landmark_path: self.layout.landmark_path(&word),
            settings: self.settings.clone(),
            index: self.index.clone(),
            camera: self.camera.clone(),
            detector: self.detector.clone(),
            sink: self.sink.clone(),
            stop: stop.clone(),
            events: events_tx,
            _lease: lease,
        };
        session.emit(CaptureEvent::State(CaptureState::Idle));

        let handle = thread::Builder::new()
            .name(format!("capture-{word}"))
            .spawn(move || session.run())?;

        Ok(CaptureTask {
            word,
            stop,
            events: events_rx,
            handle: Some(handle),
        })
    }

    /// Deletes a word's assets and index entry.
    pub fn delete(&self, word: &str) -> Result<SignRecording> {
        delete_recording(&self.index, &self.layout, word)
    }
}

/// Removes the video, landmark and playback assets for `word`, then its index
/// entry. Assets that are already gone count as removed.
pub fn delete_recording(index: &SignIndex, layout: &AssetLayout, word: &str) -> Result<SignRecording> {
    let word = normalize_word(word)?;
    let record = index
        .get(&word)?
        .ok_or_else(|| SignError::NotFound { word: word.clone() })?;

    remove_asset(&record.video)?;
    let removed = remove_asset(&record.landmarks)
        .and_then(|()| remove_asset(&layout.animation_path(&word)));
    if let Err(err) = removed {
        drop_stale_entry(index, &word);
        return Err(err);
    }
    index.remove(&word)
}

/// Forgets `word` after some of its assets were already deleted, so the index
/// never points at missing files.
fn drop_stale_entry(index: &SignIndex, word: &str) {
    match index.remove(word) {
        Ok(_) | Err(SignError::NotFound { .. }) => {
            log::warn!("dropped index entry for '{word}' after partial asset removal");
        }
        Err(err) => log::error!("failed to drop stale entry for '{word}': {err}"),
    }
}

/// Handle to a running capture.
#[derive(Debug)]
pub struct CaptureTask {
    word: String,
    stop: Arc<AtomicBool>,
    events: Receiver<CaptureEvent>,
    handle: Option<thread::JoinHandle<Result<SignRecording>>>,
}

impl CaptureTask {
    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn events(&self) -> &Receiver<CaptureEvent> {
        &self.events
    }

    /// Asks the worker to stop; takes effect during countdown or capture.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    pub fn wait(mut self) -> Result<SignRecording> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| SignError::Device("capture already joined".into()))?;
        handle
            .join()
            .map_err(|_| SignError::Device(format!("capture worker for '{}' panicked", self.word)))?
    }
}

impl Drop for CaptureTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::SeqCst);
            let _ = handle.join();
        }
    }
}

struct CaptureSession {
    word: String,
    owner: Option<String>,
    /// Previous assets were deleted for an overwrite.
    replaced: bool,
    video_path: PathBuf,
    landmark_path: PathBuf,
    settings: CaptureConfig,
    index: Arc<SignIndex>,
    camera: Arc<dyn CaptureBackend>,
    detector: Arc<Mutex<Box<dyn HandDetector>>>,
    sink: Arc<dyn VideoSink>,
    stop: Arc<AtomicBool>,
    events: Sender<CaptureEvent>,
    _lease: DeviceLease,
}

enum CaptureOutcome {
    Completed(LandmarkSequence),
    Cancelled,
}

impl CaptureSession {
    fn run(self) -> Result<SignRecording> {
        self.emit_state(CaptureState::OpeningDevice);
        let partial_video = partial_path(&self.video_path);

        let (mut device, mut writer) = match self.open_device(&partial_video) {
            Ok(opened) => opened,
            Err(err) => {
                log::error!("capture for '{}' could not open device: {err}", self.word);
                self.discard(&partial_video, CaptureState::DeviceError);
                return Err(err);
            }
        };

        self.emit_state(CaptureState::Countdown);
        log::info!(
            "capture for '{}' starts in {:?}",
            self.word,
            self.settings.countdown()
        );
        if !self.sleep_unless_stopped(self.settings.countdown()) {
            drop(device);
            drop(writer);
            return self.cancelled(&partial_video);
        }

        self.emit_state(CaptureState::Capturing);
        let captured = self.capture(device.as_mut(), writer.as_mut());
        // Camera goes back first; the writer still has to flush.
        drop(device);

        let sequence = match captured {
            Ok(CaptureOutcome::Completed(sequence)) => sequence,
            Ok(CaptureOutcome::Cancelled) => {
                drop(writer);
                return self.cancelled(&partial_video);
            }
            Err(err) => {
                drop(writer);
                self.discard(&partial_video, CaptureState::Failed);
                return Err(err);
            }
        };

        self.emit_state(CaptureState::Finalizing);
        match self.finalize(writer, &partial_video, sequence) {
            Ok(record) => {
                self.emit_state(CaptureState::Persisted);
                Ok(record)
            }
            Err(err) => {
                self.discard(&partial_video, CaptureState::Failed);
                Err(err)
            }
        }
    }

    fn open_device(
        &self,
        partial_video: &std::path::Path,
    ) -> Result<(Box<dyn CaptureDevice>, Box<dyn VideoWriter>)> {
        let device = self.camera.open().map_err(SignError::device)?;
        // On failure the device is dropped, and with it released, before returning.
        let writer = self
            .sink
            .create(
                partial_video,
                self.settings.resolution(),
                self.settings.fps,
            )
            .map_err(SignError::device)?;
        Ok((device, writer))
    }

    fn capture(
        &self,
        device: &mut dyn CaptureDevice,
        writer: &mut dyn VideoWriter,
    ) -> Result<CaptureOutcome> {
        let mut detector = self
            .detector
            .lock()
            .map_err(|_| SignError::Device("hand detector unavailable".into()))?;

        let resolution = self.settings.resolution();
        let frame_interval = Duration::from_secs_f64(1.0 / f64::from(self.settings.fps.max(1)));
        let started = Instant::now();
        let deadline = started + self.settings.duration();
        let mut sequence = LandmarkSequence::default();
        let mut written = 0usize;

        while Instant::now() < deadline {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(CaptureOutcome::Cancelled);
            }

            let raw = match device.read_frame() {
                Ok(FrameRead::Frame(frame)) => frame,
                Ok(FrameRead::Undecodable(err)) => {
                    log::warn!("skipping undecodable camera frame: {err:#}");
                    continue;
                }
                Err(err) => {
                    log::warn!(
                        "camera read failed for '{}', ending capture after {written} frames: {err:#}",
                        self.word
                    );
                    break;
                }
            };

            let mut image: RgbaImage = match prepare_capture_frame(&raw, resolution) {
                Ok(image) => image,
                Err(err) => {
                    log::warn!("dropping unusable camera frame: {err:#}");
                    continue;
                }
            };

            let detected = detector
                .detect(&to_camera_frame(&image, &raw))
                .unwrap_or_else(|err| {
                    log::warn!("hand detection failed: {err:#}");
                    HandFrame::empty()
                });

            if self.settings.annotate {
                let (width, height) = image.dimensions();
                for hand in &detected.hands {
                    draw_hand(&mut image, width, height, hand, &SkeletonStyle::OVERLAY);
                }
            }

            writer.write_frame(&image).map_err(SignError::device)?;
            written += 1;

            let hands = detected.hands.len();
            if !detected.is_empty() {
                sequence.push(detected);
            }
            self.emit(CaptureEvent::Frame {
                index: written - 1,
                hands,
            });

            // Hold the writer's frame rate when the camera delivers faster.
            let next_due = started + frame_interval * written as u32;
            let now = Instant::now();
            if next_due > now {
                let pause = next_due.min(deadline).saturating_duration_since(now);
                if !self.sleep_unless_stopped(pause) {
                    return Ok(CaptureOutcome::Cancelled);
                }
            }
        }

        log::info!(
            "captured {written} frames for '{}', {} with hands",
            self.word,
            sequence.len()
        );
        Ok(CaptureOutcome::Completed(sequence))
    }

    fn finalize(
        &self,
        writer: Box<dyn VideoWriter>,
        partial_video: &std::path::Path,
        sequence: LandmarkSequence,
    ) -> Result<SignRecording> {
        writer.finish().map_err(SignError::device)?;
        fs::rename(partial_video, &self.video_path)?;
        write_landmarks(&self.landmark_path, &sequence)?;

        let record = SignRecording {
            word: self.word.clone(),
            video: self.video_path.clone(),
            landmarks: self.landmark_path.clone(),
            owner: self.owner.clone(),
            updated_at: Utc::now(),
        };
        self.index.put(record.clone())?;
        log::info!(
            "stored '{}' at {} and {}",
            self.word,
            self.video_path.display(),
            self.landmark_path.display()
        );
        Ok(record)
    }

    fn cancelled(&self, partial_video: &std::path::Path) -> Result<SignRecording> {
        log::info!("capture for '{}' cancelled", self.word);
        self.discard(partial_video, CaptureState::Cancelled);
        Err(SignError::Cancelled {
            word: self.word.clone(),
        })
    }

    /// Cleans up after an unsuccessful capture and reports the terminal state.
    fn discard(&self, partial_video: &std::path::Path, state: CaptureState) {
        if let Err(err) = remove_asset(partial_video) {
            log::warn!("{err}");
        }
        if self.replaced {
            drop_stale_entry(&self.index, &self.word);
        }
        self.emit_state(state);
    }

    /// Sleeps for `duration`; returns false if a stop was requested meanwhile.
    fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        let until = Instant::now() + duration;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            thread::sleep((until - now).min(CANCEL_POLL));
        }
    }

    fn emit_state(&self, state: CaptureState) {
        log::debug!("capture '{}' → {state:?}", self.word);
        self.emit(CaptureEvent::State(state));
    }

    fn emit(&self, event: CaptureEvent) {
        let _ = self.events.send(event);
    }
}

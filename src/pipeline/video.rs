//! Video encoding through an `ffmpeg` subprocess fed raw RGBA frames on stdin.

use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStderr, ChildStdin, Command, Stdio},
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;

use crate::types::Resolution;

/// An open encoder. Dropping it without `finish` abandons the output.
pub trait VideoWriter {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()>;

    /// Flushes and closes the output, returning the number of frames written.
    fn finish(self: Box<Self>) -> Result<u64>;
}

pub trait VideoSink: Send + Sync {
    fn create(&self, path: &Path, resolution: Resolution, fps: u32)
    -> Result<Box<dyn VideoWriter>>;
}

const DEFAULT_ENCODER_ARGS: &[&str] = &[
    "-c:v",
    "libx264",
    "-pix_fmt",
    "yuv420p",
    "-movflags",
    "+faststart",
];

#[derive(Clone, Debug)]
pub struct FfmpegSink {
    ffmpeg_path: PathBuf,
    encoder_args: Vec<String>,
}

impl FfmpegSink {
    /// Uses the `ffmpeg` found on PATH.
    pub fn new() -> Self {
        let ffmpeg_path = which::which("ffmpeg").unwrap_or_else(|_| PathBuf::from("ffmpeg"));
        Self {
            ffmpeg_path,
            encoder_args: DEFAULT_ENCODER_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    #[must_use]
    pub fn with_encoder_args(mut self, args: Vec<String>) -> Self {
        self.encoder_args = args;
        self
    }

    fn build_args(&self, path: &Path, resolution: Resolution, fps: u32) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push("-s".to_string());
        args.push(format!("{}x{}", resolution.width, resolution.height));
        args.push("-r".to_string());
        args.push(fps.to_string());
        args.extend(["-i", "pipe:0"].iter().map(|s| s.to_string()));
        args.extend(self.encoder_args.iter().cloned());
        // Output names may carry a temporary suffix, so the container is explicit.
        args.extend(["-f", "mp4"].iter().map(|s| s.to_string()));
        args.push(path.to_string_lossy().to_string());
        args
    }
}

impl Default for FfmpegSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSink for FfmpegSink {
    fn create(
        &self,
        path: &Path,
        resolution: Resolution,
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.build_args(path, resolution, fps))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start {}", self.ffmpeg_path.display()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdin unavailable"))?;
        let stderr = child.stderr.take().map(drain_stderr);

        log::debug!(
            "ffmpeg writer opened for {} ({}x{} @ {fps}fps)",
            path.display(),
            resolution.width,
            resolution.height
        );

        Ok(Box::new(FfmpegWriter {
            child: Some(child),
            stdin: Some(stdin),
            stderr,
            path: path.to_path_buf(),
            resolution,
            frames: 0,
        }))
    }
}

struct FfmpegWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    /// Collects ffmpeg's diagnostics so a full pipe never stalls the encoder.
    stderr: Option<JoinHandle<String>>,
    path: PathBuf,
    resolution: Resolution,
    frames: u64,
}

impl VideoWriter for FfmpegWriter {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        if frame.dimensions() != (self.resolution.width, self.resolution.height) {
            return Err(anyhow!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.resolution.width,
                self.resolution.height
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg writer already closed"))?;
        stdin
            .write_all(frame.as_raw())
            .with_context(|| format!("ffmpeg stopped accepting frames for {}", self.path.display()))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| anyhow!("ffmpeg writer already closed"))?;

        let status = child.wait().context("failed to wait for ffmpeg")?;
        let stderr = self
            .stderr
            .take()
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(anyhow!(
                "ffmpeg exited with {status} while writing {}: {}",
                self.path.display(),
                stderr.trim()
            ));
        }

        log::debug!("wrote {} frames to {}", self.frames, self.path.display());
        Ok(self.frames)
    }
}

fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut output = String::new();
        let _ = pipe.read_to_string(&mut output);
        output
    })
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            if let Some(reader) = self.stderr.take() {
                let _ = reader.join();
            }
            log::debug!("abandoned ffmpeg writer for {}", self.path.display());
        }
    }
}

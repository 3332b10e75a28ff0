use anyhow::Result;

use crate::types::CameraFrame;

/// One successful read from a capture device.
#[derive(Debug)]
pub enum FrameRead {
    Frame(CameraFrame),
    /// The device delivered a frame that could not be decoded. The stream
    /// itself is still usable.
    Undecodable(anyhow::Error),
}

/// An opened camera. Dropping it releases the device.
pub trait CaptureDevice {
    /// `Err` means the stream is gone; a bad frame is `Ok(FrameRead::Undecodable)`.
    fn read_frame(&mut self) -> Result<FrameRead>;
}

/// Opens capture devices. Devices are opened on the capture worker thread.
pub trait CaptureBackend: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureDevice>>;

    fn label(&self) -> String;
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: u32,
    pub label: String,
}

#[cfg(feature = "camera-nokhwa")]
pub use self::native::{NokhwaBackend, available_cameras};

#[cfg(not(feature = "camera-nokhwa"))]
pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    Err(anyhow::anyhow!(
        "built without a camera backend; enable the camera-nokhwa feature"
    ))
}

#[cfg(feature = "camera-nokhwa")]
mod native {
    use std::time::Instant;

    use anyhow::{Context, Result, anyhow};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        query,
        utils::{ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType},
    };

    use super::{CameraDevice, CaptureBackend, CaptureDevice, FrameRead};
    use crate::{pipeline::rgba_converter, types::CameraFrame};

    // Prefer pixel formats that are widely supported on macOS (the built-in cameras
    // often reject YUYV even though Nokhwa reports it).
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    fn requested_formats() -> [RequestedFormat<'static>; 3] {
        [
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
        let cameras = query(ApiBackend::Auto)?;
        Ok(cameras
            .into_iter()
            .filter_map(|info| {
                let index = info.index().as_index().ok()?;
                Some(CameraDevice {
                    index,
                    label: format_camera_label(&info),
                })
            })
            .collect())
    }

    fn format_camera_label(info: &CameraInfo) -> String {
        info.human_name()
    }

    fn build_camera(index: CameraIndex) -> Result<Camera> {
        let mut last_err = None;

        for requested in requested_formats() {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
    }

    #[derive(Clone, Debug)]
    pub struct NokhwaBackend {
        index: u32,
    }

    impl NokhwaBackend {
        pub fn new(index: u32) -> Self {
            Self { index }
        }
    }

    impl CaptureBackend for NokhwaBackend {
        fn open(&self) -> Result<Box<dyn CaptureDevice>> {
            let camera = build_camera(CameraIndex::Index(self.index))
                .with_context(|| format!("failed to open camera {}", self.index))?;
            log::info!("camera {} opened ({})", self.index, camera.info().human_name());
            Ok(Box::new(NokhwaDevice { camera }))
        }

        fn label(&self) -> String {
            format!("camera {}", self.index)
        }
    }

    struct NokhwaDevice {
        camera: Camera,
    }

    impl CaptureDevice for NokhwaDevice {
        fn read_frame(&mut self) -> Result<FrameRead> {
            let frame = self.camera.frame().context("camera frame read failed")?;
            let converted = match rgba_converter::convert_camera_frame(&frame) {
                Ok(converted) => converted,
                Err(err) => {
                    return Ok(FrameRead::Undecodable(
                        err.context("failed to decode camera frame"),
                    ));
                }
            };

            Ok(FrameRead::Frame(CameraFrame {
                rgba: converted.rgba,
                width: converted.width,
                height: converted.height,
                timestamp: Instant::now(),
            }))
        }
    }

    impl Drop for NokhwaDevice {
        fn drop(&mut self) {
            if let Err(err) = self.camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err:?}");
            }
            log::debug!("camera released");
        }
    }
}

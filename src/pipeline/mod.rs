pub mod camera;
pub mod frame;
pub mod recognizer;
pub mod rgba_converter;
pub mod skeleton;
pub mod video;

// Re-exports for convenience
pub use camera::{CameraDevice, CaptureBackend, CaptureDevice, FrameRead, available_cameras};
#[cfg(feature = "camera-nokhwa")]
pub use camera::NokhwaBackend;
pub use recognizer::{HandDetector, OrtHandDetector, RecognizerBackend};
pub use skeleton::{CONNECTIONS, SkeletonStyle};
pub use video::{FfmpegSink, VideoSink, VideoWriter};

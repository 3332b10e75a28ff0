//! Sign-language tooling: English → gloss reordering, gesture recording with
//! hand landmarks, and skeleton playback rendering.

pub mod assets;
pub mod config;
pub mod error;
pub mod gloss;
pub mod index;
pub mod model_download;
pub mod pipeline;
pub mod recorder;
pub mod renderer;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, SignError};
pub use gloss::{AnnotatedToken, Annotator, GlossSequence, reorder};
pub use index::SignIndex;
pub use recorder::{CaptureEvent, CaptureRequest, CaptureState, CaptureTask, GestureRecorder};
pub use renderer::AnimationRenderer;
pub use types::{Hand, HandFrame, Landmark, LandmarkSequence, SignRecording};

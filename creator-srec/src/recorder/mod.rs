//! Live recording: locks, capture engine, sessions and post-processing.

pub mod engine;
pub mod lock;
mod postprocess;
mod session;

pub use engine::{CaptureRequest, FfmpegEngine, MediaEngine};
pub use lock::{LockDir, RecordingLock};
pub use session::{Recorder, RecorderDeps, RecordingRequest, SessionOutcome};

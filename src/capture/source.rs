//! Collaborator seams for frame capture and landmark detection.

use crate::capture::types::DetectorEvent;
use crossbeam_channel::Sender;

/// Errors raised by a capture source.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid recording at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Errors raised by a landmark detector.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Landmark detector is already running")]
    AlreadyRunning,
    #[error("Landmark detector is not ready")]
    NotReady,
    #[error("Landmark detector failed: {0}")]
    Backend(String),
}

/// A live frame source, such as a camera.
pub trait CaptureSource {
    /// Acquire the device. Called once per initialization.
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Whether frames can currently be produced.
    fn is_ready(&self) -> bool;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Release the device.
    fn close(&mut self);
}

/// A landmark detector that processes frames from the capture source.
///
/// Once started, the detector reports one [`DetectorEvent`] per processed
/// frame through `events`. Detectors that run on their own threads must only
/// ever deliver through the sender; the receiving side is the single consumer
/// that serializes processing.
pub trait LandmarkDetector {
    /// Whether the detection model has finished loading.
    fn is_ready(&self) -> bool;

    fn start(&mut self, events: Sender<DetectorEvent>) -> Result<(), DetectorError>;

    /// Stop delivering events. Must be safe to call when not running.
    fn stop(&mut self);
}

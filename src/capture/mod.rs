//! Frame capture and landmark detection collaborators.
//!
//! The camera and the landmark model are external to the agent. This module
//! defines the seams the monitor talks to, the landmark types that cross them,
//! and two concrete collaborators: a file-backed replay and a remote inbox for
//! landmarks pushed by a client.

pub mod remote;
pub mod replay;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use remote::{PushError, RemoteCapture, RemoteDetector, RemoteInbox};
pub use replay::{
    load_recording, parse_recording, replay, RecordedFrame, ReplayCapture, ReplayDetector,
};
pub use source::{CaptureError, CaptureSource, DetectorError, LandmarkDetector};
pub use types::{DetectorEvent, Landmark, LandmarkFrame, LandmarkSet};

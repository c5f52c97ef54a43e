//! Collaborators for landmarks pushed by a remote client.
//!
//! Used when the camera and landmark model live elsewhere (for example in a
//! browser front-end) and only the detected landmarks are sent to this agent.

use crate::capture::source::{CaptureError, CaptureSource, DetectorError, LandmarkDetector};
use crate::capture::types::DetectorEvent;
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::Arc;

/// Why a pushed event was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("no monitoring run is accepting frames")]
    NotMonitoring,
    #[error("frame queue is full")]
    QueueFull,
}

/// Cloneable handle used by producers to push events to the detector.
#[derive(Clone, Default)]
pub struct RemoteInbox {
    sink: Arc<RwLock<Option<Sender<DetectorEvent>>>>,
}

impl RemoteInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an event into the running monitor's queue.
    pub fn push(&self, event: DetectorEvent) -> Result<(), PushError> {
        let sink = self.sink.read();
        let sender = sink.as_ref().ok_or(PushError::NotMonitoring)?;
        sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => PushError::QueueFull,
            TrySendError::Disconnected(_) => PushError::NotMonitoring,
        })
    }

    /// Whether a monitoring run is currently accepting events.
    pub fn is_accepting(&self) -> bool {
        self.sink.read().is_some()
    }
}

impl std::fmt::Debug for RemoteInbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInbox")
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

/// Detector whose events come from a [`RemoteInbox`].
pub struct RemoteDetector {
    inbox: RemoteInbox,
}

impl RemoteDetector {
    pub fn new(inbox: RemoteInbox) -> Self {
        Self { inbox }
    }

    pub fn inbox(&self) -> RemoteInbox {
        self.inbox.clone()
    }
}

impl LandmarkDetector for RemoteDetector {
    fn is_ready(&self) -> bool {
        true
    }

    fn start(&mut self, events: Sender<DetectorEvent>) -> Result<(), DetectorError> {
        let mut sink = self.inbox.sink.write();
        if sink.is_some() {
            return Err(DetectorError::AlreadyRunning);
        }
        *sink = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        self.inbox.sink.write().take();
    }
}

/// Capture source for a remote client; the device lives on the client side.
#[derive(Debug, Default)]
pub struct RemoteCapture {
    opened: bool,
    paused: bool,
}

impl RemoteCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl CaptureSource for RemoteCapture {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.opened = true;
        self.paused = false;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.opened
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_requires_running_detector() {
        let inbox = RemoteInbox::new();
        let mut detector = RemoteDetector::new(inbox.clone());
        assert_eq!(
            inbox.push(DetectorEvent::NoSubject),
            Err(PushError::NotMonitoring)
        );

        let (tx, rx) = crossbeam_channel::bounded(1);
        detector.start(tx).unwrap();
        assert!(inbox.is_accepting());
        inbox.push(DetectorEvent::NoSubject).unwrap();
        assert_eq!(inbox.push(DetectorEvent::NoSubject), Err(PushError::QueueFull));
        assert_eq!(rx.try_recv().unwrap(), DetectorEvent::NoSubject);

        detector.stop();
        assert!(!inbox.is_accepting());
        assert_eq!(
            inbox.push(DetectorEvent::NoSubject),
            Err(PushError::NotMonitoring)
        );
    }

    #[test]
    fn test_remote_capture_lifecycle() {
        let mut capture = RemoteCapture::new();
        assert!(!capture.is_ready());
        capture.open().unwrap();
        assert!(capture.is_ready());
        capture.pause();
        assert!(capture.is_paused());
        capture.resume();
        assert!(!capture.is_paused());
        capture.close();
        assert!(!capture.is_ready());
    }
}

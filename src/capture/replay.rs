//! File-backed capture and detection for offline runs.
//!
//! A recording is a JSON-lines file with one record per processed frame:
//!
//! ```text
//! {"timestamp":"2024-05-01T09:00:00Z","landmarks":{"nose":{"x":0.5,"y":0.3,"visibility":0.9}, ...}}
//! {"timestamp":"2024-05-01T09:00:00.5Z","landmarks":null}
//! ```
//!
//! A `null` landmark set means no subject was found in that frame. Blank lines
//! and lines starting with `#` are ignored.
//!
//! Replayed frames are re-stamped onto the wall clock, keeping the recorded
//! spacing, so the rest of the pipeline sees them as live frames.

use crate::capture::source::{CaptureError, CaptureSource, DetectorError, LandmarkDetector};
use crate::capture::types::{DetectorEvent, LandmarkFrame, LandmarkSet};
use chrono::{DateTime, Utc};
use crossbeam_channel::{SendTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest pause honored between two recorded frames when pacing in real time.
const MAX_REPLAY_GAP: Duration = Duration::from_secs(5);

/// Granularity of the worker's stop checks.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// One record of a landmark recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub landmarks: Option<LandmarkSet>,
}

/// Parse a JSON-lines recording.
pub fn parse_recording<R: BufRead>(reader: R) -> Result<Vec<RecordedFrame>, CaptureError> {
    let mut frames = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let frame = serde_json::from_str(trimmed).map_err(|e| CaptureError::Parse {
            line: index + 1,
            message: e.to_string(),
        })?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Load a JSON-lines recording from disk.
pub fn load_recording(path: &Path) -> Result<Vec<RecordedFrame>, CaptureError> {
    let file = std::fs::File::open(path)?;
    parse_recording(std::io::BufReader::new(file))
}

type SharedFrames = Arc<Mutex<VecDeque<RecordedFrame>>>;

/// Capture side of a replay: owns loading the recording.
pub struct ReplayCapture {
    path: PathBuf,
    frames: SharedFrames,
    opened: bool,
    paused: bool,
}

/// Detection side of a replay: streams recorded landmarks on a worker thread.
pub struct ReplayDetector {
    frames: SharedFrames,
    realtime: bool,
    running: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Create a capture/detector pair replaying the recording at `path`.
///
/// With `realtime` the worker sleeps for the recorded gap between frames;
/// otherwise frames are delivered as fast as the consumer accepts them.
pub fn replay(path: impl Into<PathBuf>, realtime: bool) -> (ReplayCapture, ReplayDetector) {
    let frames: SharedFrames = Arc::new(Mutex::new(VecDeque::new()));
    let capture = ReplayCapture {
        path: path.into(),
        frames: frames.clone(),
        opened: false,
        paused: false,
    };
    let detector = ReplayDetector {
        frames,
        realtime,
        running: Arc::new(AtomicBool::new(false)),
        exhausted: Arc::new(AtomicBool::new(false)),
        worker: None,
    };
    (capture, detector)
}

impl ReplayCapture {
    /// Number of recorded frames not yet delivered.
    pub fn remaining(&self) -> usize {
        self.frames.lock().len()
    }
}

impl CaptureSource for ReplayCapture {
    fn open(&mut self) -> Result<(), CaptureError> {
        let recording = load_recording(&self.path)?;
        if recording.is_empty() {
            return Err(CaptureError::Unavailable(format!(
                "recording {:?} contains no frames",
                self.path
            )));
        }
        tracing::debug!(frames = recording.len(), path = ?self.path, "Loaded recording");
        *self.frames.lock() = recording.into();
        self.opened = true;
        self.paused = false;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.opened && !self.paused
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn close(&mut self) {
        self.frames.lock().clear();
        self.opened = false;
    }
}

impl ReplayDetector {
    /// Whether every recorded frame has been delivered.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }
}

impl LandmarkDetector for ReplayDetector {
    fn is_ready(&self) -> bool {
        true
    }

    fn start(&mut self, events: Sender<DetectorEvent>) -> Result<(), DetectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(DetectorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);
        self.exhausted.store(false, Ordering::SeqCst);

        let worker = ReplayWorker {
            frames: self.frames.clone(),
            realtime: self.realtime,
            running: self.running.clone(),
            exhausted: self.exhausted.clone(),
            events,
        };
        self.worker = Some(thread::spawn(move || worker.run()));
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ReplayDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReplayWorker {
    frames: SharedFrames,
    realtime: bool,
    running: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
    events: Sender<DetectorEvent>,
}

impl ReplayWorker {
    fn run(self) {
        // Re-stamp relative to where this run picks up in the recording.
        let origin_wall = Utc::now();
        let origin_recorded = self.frames.lock().front().map(|f| f.timestamp);
        let mut previous: Option<DateTime<Utc>> = None;

        while self.running.load(Ordering::SeqCst) {
            let next = self.frames.lock().pop_front();
            let Some(frame) = next else {
                self.exhausted.store(true, Ordering::SeqCst);
                tracing::info!("Recording exhausted");
                break;
            };

            if self.realtime {
                if let Some(prev) = previous {
                    let gap = (frame.timestamp - prev)
                        .to_std()
                        .unwrap_or_default()
                        .min(MAX_REPLAY_GAP);
                    if !self.sleep_while_running(gap) {
                        self.frames.lock().push_front(frame);
                        break;
                    }
                }
            }
            previous = Some(frame.timestamp);

            let offset = frame.timestamp - origin_recorded.unwrap_or(frame.timestamp);
            let event = match frame.landmarks.clone() {
                Some(landmarks) => {
                    DetectorEvent::Landmarks(LandmarkFrame::at(origin_wall + offset, landmarks))
                }
                None => DetectorEvent::NoSubject,
            };

            if !self.deliver(event) {
                self.frames.lock().push_front(frame);
                break;
            }
        }
    }

    /// Returns false if stopped before the full duration elapsed.
    fn sleep_while_running(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if !self.running.load(Ordering::SeqCst) {
                return false;
            }
            let step = remaining.min(STOP_CHECK_INTERVAL);
            thread::sleep(step);
            remaining -= step;
        }
        self.running.load(Ordering::SeqCst)
    }

    /// Returns false if the event could not be delivered.
    fn deliver(&self, mut event: DetectorEvent) -> bool {
        loop {
            match self.events.send_timeout(event, STOP_CHECK_INTERVAL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        return false;
                    }
                    event = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::Landmark;
    use std::io::Write;

    fn recording_line(offset_ms: i64, landmarks: Option<LandmarkSet>) -> String {
        let base: DateTime<Utc> = "2024-05-01T09:00:00Z".parse().unwrap();
        serde_json::to_string(&RecordedFrame {
            timestamp: base + chrono::Duration::milliseconds(offset_ms),
            landmarks,
        })
        .unwrap()
    }

    fn upright() -> LandmarkSet {
        LandmarkSet {
            nose: Some(Landmark::new(0.5, 0.3, 0.9)),
            left_ear: Some(Landmark::new(0.55, 0.3, 0.9)),
            right_ear: Some(Landmark::new(0.45, 0.3, 0.9)),
            left_shoulder: Some(Landmark::new(0.65, 0.6, 0.9)),
            right_shoulder: Some(Landmark::new(0.35, 0.6, 0.9)),
        }
    }

    #[test]
    fn test_parse_recording_skips_comments_and_blanks() {
        let text = format!(
            "# session\n{}\n\n{}\n",
            recording_line(0, Some(upright())),
            recording_line(500, None)
        );
        let frames = parse_recording(text.as_bytes()).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].landmarks.is_some());
        assert!(frames[1].landmarks.is_none());
    }

    #[test]
    fn test_parse_recording_reports_line_number() {
        let text = format!("{}\nnot json\n", recording_line(0, None));
        match parse_recording(text.as_bytes()) {
            Err(CaptureError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_replay_delivers_frames_with_recorded_spacing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", recording_line(0, Some(upright()))).unwrap();
        writeln!(file, "{}", recording_line(750, None)).unwrap();
        writeln!(file, "{}", recording_line(1500, Some(upright()))).unwrap();

        let (mut capture, mut detector) = replay(file.path(), false);
        capture.open().unwrap();
        assert!(capture.is_ready());
        assert_eq!(capture.remaining(), 3);

        let (tx, rx) = crossbeam_channel::unbounded();
        detector.start(tx).unwrap();

        let mut events = Vec::new();
        for _ in 0..3 {
            events.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        detector.stop();
        assert!(detector.is_exhausted());

        let (first, third) = match (&events[0], &events[2]) {
            (DetectorEvent::Landmarks(a), DetectorEvent::Landmarks(b)) => (a, b),
            other => panic!("unexpected events: {other:?}"),
        };
        assert_eq!(events[1], DetectorEvent::NoSubject);
        assert_eq!((third.timestamp - first.timestamp).num_milliseconds(), 1500);
    }

    #[test]
    fn test_empty_recording_fails_to_open() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (mut capture, _detector) = replay(file.path(), false);
        assert!(matches!(
            capture.open(),
            Err(CaptureError::Unavailable(_))
        ));
        assert!(!capture.is_ready());
    }

    #[test]
    fn test_detector_rejects_double_start() {
        let (_capture, mut detector) = replay("unused.jsonl", true);
        let (tx, _rx) = crossbeam_channel::unbounded();
        detector.start(tx.clone()).unwrap();
        assert!(matches!(
            detector.start(tx),
            Err(DetectorError::AlreadyRunning)
        ));
        detector.stop();
    }
}

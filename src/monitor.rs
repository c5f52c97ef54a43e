//! Monitoring lifecycle controller.
//!
//! The monitor owns the capture source, the landmark detector and the
//! actuator, and drives the pipeline
//!
//! ```text
//! detector ──▶ queue ──▶ analyze ──▶ gate ──▶ escalation ──▶ actuator
//! ```
//!
//! on the caller's thread. Detectors deliver through a bounded crossbeam
//! channel and the monitor is its only consumer, so samples are processed
//! one at a time in arrival order.
//!
//! Lifecycle:
//!
//! ```text
//! UNINITIALIZED ──▶ INITIALIZING ──▶ READY ──▶ MONITORING ⇄ PAUSED ──▶ STOPPED
//!                        │                          │
//!                        └──────────▶ FAILED ◀──────┘
//! ```

use crate::actuator::{dispatch, Actuator};
use crate::capture::{CaptureSource, DetectorEvent, LandmarkDetector, LandmarkFrame};
use crate::config::{Config, ReminderSettings};
use crate::core::escalation::{EscalationMachine, ReminderAction, ReminderLevel};
use crate::core::gate::{GateDecision, SampleGate};
use crate::core::geometry::{analyze, ClassifierThresholds, PostureSample};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Detector events buffered before the detector has to wait.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Granularity of cancellation checks while waiting for the detector.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle state of a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Uninitialized,
    Initializing,
    Ready,
    Monitoring,
    Paused,
    Stopped,
    Failed,
}

impl MonitorState {
    pub fn as_str(self) -> &'static str {
        match self {
            MonitorState::Uninitialized => "uninitialized",
            MonitorState::Initializing => "initializing",
            MonitorState::Ready => "ready",
            MonitorState::Monitoring => "monitoring",
            MonitorState::Paused => "paused",
            MonitorState::Stopped => "stopped",
            MonitorState::Failed => "failed",
        }
    }

    /// Whether a run is in progress (monitoring or paused).
    pub fn is_running(self) -> bool {
        matches!(self, MonitorState::Monitoring | MonitorState::Paused)
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the monitor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    #[error("Failed to initialize capture: {0}")]
    CaptureInit(String),
    #[error("Landmark detector not ready after {attempts} attempts")]
    DetectorInitTimeout { attempts: u32 },
    #[error("Detection failed: {0}")]
    Detection(String),
    #[error("Initialization cancelled")]
    Cancelled,
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: MonitorState,
    },
}

/// Tunables for initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Delay between detector readiness checks
    pub init_poll_interval: Duration,
    /// Waits between readiness checks before giving up
    pub init_max_attempts: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            init_poll_interval: Duration::from_millis(500),
            init_max_attempts: 20,
        }
    }
}

/// Snapshot returned by [`Monitor::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub is_monitoring: bool,
    pub bad_posture_duration_secs: f64,
    pub current_reminder_level: ReminderLevel,
    pub in_cooldown: bool,
    pub next_reminder_at: Option<DateTime<Utc>>,
    pub usage_mode: crate::config::UsageMode,
    pub last_sample: Option<PostureSample>,
    pub run_id: Option<Uuid>,
}

type ErrorCallback = Box<dyn FnMut(&MonitorError) + Send>;

/// Lifecycle controller for one capture source, detector and actuator.
pub struct Monitor<C, D, A> {
    capture: C,
    detector: D,
    actuator: A,
    options: MonitorOptions,
    state: MonitorState,
    thresholds: ClassifierThresholds,
    gate: SampleGate,
    machine: EscalationMachine,
    channel: Option<(Sender<DetectorEvent>, Receiver<DetectorEvent>)>,
    last_sample: Option<PostureSample>,
    run_id: Option<Uuid>,
    log: SharedTransparencyLog,
    on_error: Option<ErrorCallback>,
}

impl<C, D, A> Monitor<C, D, A>
where
    C: CaptureSource,
    D: LandmarkDetector,
    A: Actuator,
{
    pub fn new(capture: C, detector: D, actuator: A, config: &Config) -> Self {
        Self {
            capture,
            detector,
            actuator,
            options: MonitorOptions::default(),
            state: MonitorState::Uninitialized,
            thresholds: config.thresholds,
            gate: SampleGate::new(),
            machine: EscalationMachine::new(config.reminder.clone()),
            channel: None,
            last_sample: None,
            run_id: None,
            log: create_shared_log(),
            on_error: None,
        }
    }

    pub fn with_options(mut self, options: MonitorOptions) -> Self {
        self.options = options;
        self
    }

    /// Register the callback invoked once per fatal error.
    pub fn on_error<F>(&mut self, callback: F)
    where
        F: FnMut(&MonitorError) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
    }

    /// Acquire the capture source and wait for the detector to become ready.
    ///
    /// Readiness is re-checked after each of up to `init_max_attempts`
    /// waits of `init_poll_interval`. Setting `cancel` aborts the wait; the
    /// monitor then returns to UNINITIALIZED.
    pub fn initialize(&mut self, cancel: &AtomicBool) -> Result<(), MonitorError> {
        match self.state {
            MonitorState::Uninitialized | MonitorState::Stopped | MonitorState::Failed => {}
            state => {
                return Err(MonitorError::InvalidState {
                    action: "initialize",
                    state,
                })
            }
        }

        self.state = MonitorState::Initializing;
        tracing::info!("Initializing posture monitor");

        if let Err(e) = self.capture.open() {
            return Err(self.fail(MonitorError::CaptureInit(e.to_string())));
        }

        let mut attempts = 0;
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(self.cancel_initialization());
            }
            if self.capture.is_ready() && self.detector.is_ready() {
                break;
            }

            // One final check follows the last wait.
            if attempts >= self.options.init_max_attempts {
                return Err(self.fail(MonitorError::DetectorInitTimeout { attempts }));
            }
            tracing::debug!(attempt = attempts + 1, "Landmark detector not ready yet");

            if !sleep_unless_cancelled(self.options.init_poll_interval, cancel) {
                return Err(self.cancel_initialization());
            }
            attempts += 1;
        }

        self.state = MonitorState::Ready;
        tracing::info!("Posture monitor ready");
        Ok(())
    }

    /// Wire the pipeline and begin a fresh run.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.state != MonitorState::Ready {
            return Err(MonitorError::InvalidState {
                action: "start",
                state: self.state,
            });
        }

        let (sender, receiver) = bounded(EVENT_QUEUE_CAPACITY);
        if let Err(e) = self.detector.start(sender.clone()) {
            return Err(self.fail(MonitorError::Detection(e.to_string())));
        }
        self.channel = Some((sender, receiver));

        self.gate.reset();
        self.machine.reset();
        self.last_sample = None;
        self.log.reset();
        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.state = MonitorState::Monitoring;

        tracing::info!(%run_id, mode = %self.machine.settings().usage_mode, "Monitoring started");
        Ok(())
    }

    /// Suspend capture. The escalation session is kept.
    pub fn pause(&mut self) -> Result<(), MonitorError> {
        match self.state {
            MonitorState::Paused => return Ok(()),
            MonitorState::Monitoring => {}
            state => {
                return Err(MonitorError::InvalidState {
                    action: "pause",
                    state,
                })
            }
        }

        self.detector.stop();
        self.capture.pause();
        if let Some((_, receiver)) = &self.channel {
            let discarded = receiver.try_iter().count();
            if discarded > 0 {
                tracing::debug!(discarded, "Discarded queued events on pause");
            }
        }
        self.state = MonitorState::Paused;
        tracing::info!("Monitoring paused");
        Ok(())
    }

    /// Continue a paused run where it left off.
    pub fn resume(&mut self) -> Result<(), MonitorError> {
        match self.state {
            MonitorState::Monitoring => return Ok(()),
            MonitorState::Paused => {}
            state => {
                return Err(MonitorError::InvalidState {
                    action: "resume",
                    state,
                })
            }
        }

        self.capture.resume();
        let Some(sender) = self.channel.as_ref().map(|(sender, _)| sender.clone()) else {
            return Err(self.fail(MonitorError::Detection(
                "event channel missing on resume".to_string(),
            )));
        };
        if let Err(e) = self.detector.start(sender) {
            return Err(self.fail(MonitorError::Detection(e.to_string())));
        }
        self.state = MonitorState::Monitoring;
        tracing::info!("Monitoring resumed");
        Ok(())
    }

    /// Tear down the pipeline and discard the escalation session.
    ///
    /// Does nothing unless the monitor is ready, monitoring or paused.
    pub fn stop(&mut self) {
        match self.state {
            MonitorState::Ready | MonitorState::Monitoring | MonitorState::Paused => {}
            _ => return,
        }

        self.teardown();
        self.state = MonitorState::Stopped;
        tracing::info!("Monitoring stopped");
    }

    /// Swap reminder settings and thresholds; applies from the next sample.
    pub fn update_settings(&mut self, settings: ReminderSettings, thresholds: ClassifierThresholds) {
        if settings != *self.machine.settings() {
            tracing::info!(mode = %settings.usage_mode, "Reminder settings updated");
        }
        self.machine.update_settings(settings);
        self.thresholds = thresholds;
    }

    /// Wait up to `timeout` for one detector event and process it.
    ///
    /// When nothing arrives, or while paused, the cooldown deadline is
    /// checked against the wall clock instead.
    pub fn poll(&mut self, timeout: Duration) -> Result<(), MonitorError> {
        match self.state {
            MonitorState::Monitoring => {}
            MonitorState::Paused => {
                thread::sleep(timeout);
                self.tick(Utc::now());
                return Ok(());
            }
            state => return Err(MonitorError::InvalidState { action: "poll", state }),
        }

        let received = match &self.channel {
            Some((_, receiver)) => receiver.recv_timeout(timeout),
            None => Err(RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(event) => self.handle_event(event),
            Err(RecvTimeoutError::Timeout) => {
                self.tick(Utc::now());
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.fail(MonitorError::Detection(
                "detector event channel disconnected".to_string(),
            ))),
        }
    }

    /// Process one detector event. Events outside MONITORING are dropped.
    pub fn handle_event(&mut self, event: DetectorEvent) -> Result<(), MonitorError> {
        if self.state != MonitorState::Monitoring {
            tracing::debug!(state = %self.state, "Dropping detector event");
            return Ok(());
        }

        match event {
            DetectorEvent::Landmarks(frame) => {
                self.process_frame(&frame);
                Ok(())
            }
            DetectorEvent::NoSubject => {
                self.log.record_no_subject();
                Ok(())
            }
            DetectorEvent::Error(message) => Err(self.fail(MonitorError::Detection(message))),
        }
    }

    /// Classify, gate and escalate one landmark frame. Returns the reminders
    /// that were dispatched.
    fn process_frame(&mut self, frame: &LandmarkFrame) -> Vec<ReminderAction> {
        let sample = analyze(frame, &self.thresholds);
        let decision = self.gate.admit(&sample);
        self.log.record_frame(decision);

        if decision != GateDecision::Accepted {
            tracing::debug!(?decision, confidence = sample.confidence, "Sample dropped");
            return Vec::new();
        }
        tracing::debug!(
            status = %sample.status,
            head = sample.head_tilt_angle,
            shoulders = sample.shoulder_tilt_angle,
            "Sample accepted"
        );

        self.last_sample = Some(sample);
        self.actuator.broadcast_status(&sample);

        let was_cooling_down = self.machine.session().in_cooldown();
        let actions = self.machine.observe(sample.status, sample.timestamp);
        if self.machine.session().in_cooldown() && !was_cooling_down {
            self.log.record_cooldown();
        }

        for action in &actions {
            self.log.record_reminder(action);
            dispatch(&mut self.actuator, action);
        }
        actions
    }

    /// Expire the cooldown if its deadline has passed by `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        self.state.is_running() && self.machine.tick(now)
    }

    pub fn status(&self) -> MonitorStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> MonitorStatus {
        let session = self.machine.session();
        let duration = session.bad_posture_duration(now);
        MonitorStatus {
            state: self.state,
            is_monitoring: self.state == MonitorState::Monitoring,
            bad_posture_duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            current_reminder_level: session.current_level(),
            in_cooldown: session.in_cooldown(),
            next_reminder_at: self.machine.next_reminder_at(),
            usage_mode: self.machine.settings().usage_mode,
            last_sample: self.last_sample,
            run_id: self.run_id,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Detector events waiting to be processed.
    pub fn pending_events(&self) -> usize {
        self.channel
            .as_ref()
            .map(|(_, receiver)| receiver.len())
            .unwrap_or(0)
    }

    pub fn log(&self) -> SharedTransparencyLog {
        self.log.clone()
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    fn teardown(&mut self) {
        self.detector.stop();
        self.capture.close();
        self.channel = None;
        self.gate.reset();
        self.machine.reset();
    }

    fn cancel_initialization(&mut self) -> MonitorError {
        self.capture.close();
        self.state = MonitorState::Uninitialized;
        tracing::info!("Initialization cancelled");
        MonitorError::Cancelled
    }

    /// Move to FAILED and surface `error` to the callback and the actuator.
    fn fail(&mut self, error: MonitorError) -> MonitorError {
        tracing::error!(state = %self.state, "{}", error);
        self.teardown();
        self.state = MonitorState::Failed;

        if let Some(callback) = self.on_error.as_mut() {
            callback(&error);
        }
        self.actuator.notify_error(&error.to_string());
        error
    }
}

/// Returns false if `cancel` was set before `duration` elapsed.
fn sleep_unless_cancelled(duration: Duration, cancel: &AtomicBool) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(CANCEL_CHECK_INTERVAL);
        thread::sleep(step);
        remaining -= step;
    }
    !cancel.load(Ordering::SeqCst)
}

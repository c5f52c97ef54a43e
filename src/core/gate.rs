//! Rate and quality filter between classification and escalation.
//!
//! Samples below a fixed confidence floor are dropped. Accepted samples are
//! spaced by an interval that depends on the last accepted status: while
//! posture is good one sample per second is enough, once it degrades the
//! gate lets samples through twice as often.

use crate::core::geometry::{PostureSample, PostureStatus};
use chrono::{DateTime, Duration, Utc};

/// Samples with a lower confidence are dropped.
pub const MIN_CONFIDENCE: f64 = 0.30;

/// Minimum spacing after an accepted good sample (milliseconds).
pub const GOOD_POSTURE_INTERVAL_MS: i64 = 1000;

/// Minimum spacing after an accepted warning or danger sample (milliseconds).
pub const BAD_POSTURE_INTERVAL_MS: i64 = 500;

/// Outcome of offering a sample to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accepted,
    LowConfidence,
    TooSoon,
}

/// Confidence floor plus adaptive minimum interval.
#[derive(Debug, Clone, Default)]
pub struct SampleGate {
    last_accepted: Option<(DateTime<Utc>, PostureStatus)>,
}

impl SampleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `sample` reaches the escalation state machine.
    ///
    /// Only accepted samples update the gate's bookkeeping.
    pub fn admit(&mut self, sample: &PostureSample) -> GateDecision {
        if sample.confidence < MIN_CONFIDENCE {
            return GateDecision::LowConfidence;
        }

        if let Some((last_time, last_status)) = self.last_accepted {
            if sample.timestamp - last_time < Self::min_interval(last_status) {
                return GateDecision::TooSoon;
            }
        }

        self.last_accepted = Some((sample.timestamp, sample.status));
        GateDecision::Accepted
    }

    /// Minimum spacing required after a sample with `status` was accepted.
    pub fn min_interval(status: PostureStatus) -> Duration {
        match status {
            PostureStatus::Good => Duration::milliseconds(GOOD_POSTURE_INTERVAL_MS),
            PostureStatus::Warning | PostureStatus::Danger => {
                Duration::milliseconds(BAD_POSTURE_INTERVAL_MS)
            }
        }
    }

    /// Time of the last accepted sample.
    pub fn last_accepted_at(&self) -> Option<DateTime<Utc>> {
        self.last_accepted.map(|(time, _)| time)
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

//! Transparency log for a monitoring run.
//!
//! This module tracks what the agent did with camera-derived data during the
//! current run without storing any of it. Counters are kept in memory only
//! and reset with each run.

use crate::core::escalation::{ReminderAction, ReminderLevel};
use crate::core::gate::GateDecision;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Processing statistics for the current run.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Landmark frames classified
    frames_analyzed: AtomicU64,
    /// Frames in which no subject was detected
    no_subject_frames: AtomicU64,
    /// Samples that reached the escalation state machine
    samples_accepted: AtomicU64,
    /// Samples dropped for low confidence
    dropped_low_confidence: AtomicU64,
    /// Samples dropped by the rate limit
    dropped_too_soon: AtomicU64,
    icon_reminders: AtomicU64,
    popup_reminders: AtomicU64,
    audio_reminders: AtomicU64,
    /// Number of times a cooldown started
    cooldowns_entered: AtomicU64,
    /// Run start time
    session_start: RwLock<DateTime<Utc>>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            frames_analyzed: AtomicU64::new(0),
            no_subject_frames: AtomicU64::new(0),
            samples_accepted: AtomicU64::new(0),
            dropped_low_confidence: AtomicU64::new(0),
            dropped_too_soon: AtomicU64::new(0),
            icon_reminders: AtomicU64::new(0),
            popup_reminders: AtomicU64::new(0),
            audio_reminders: AtomicU64::new(0),
            cooldowns_entered: AtomicU64::new(0),
            session_start: RwLock::new(Utc::now()),
        }
    }

    /// Record a classified frame and what the gate decided.
    pub fn record_frame(&self, decision: GateDecision) {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
        let counter = match decision {
            GateDecision::Accepted => &self.samples_accepted,
            GateDecision::LowConfidence => &self.dropped_low_confidence,
            GateDecision::TooSoon => &self.dropped_too_soon,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame without a subject.
    pub fn record_no_subject(&self) {
        self.no_subject_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatched reminder. Notifications ride along with audio and
    /// are not counted separately.
    pub fn record_reminder(&self, action: &ReminderAction) {
        let counter = match action {
            ReminderAction::ShowIcon { .. } => &self.icon_reminders,
            ReminderAction::ShowPopup { .. } => &self.popup_reminders,
            ReminderAction::PlayAudio { .. } => &self.audio_reminders,
            ReminderAction::Notify { .. } => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the start of a cooldown.
    pub fn record_cooldown(&self) {
        self.cooldowns_entered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        let session_start = *self.session_start.read();
        TransparencyStats {
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            no_subject_frames: self.no_subject_frames.load(Ordering::Relaxed),
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            dropped_low_confidence: self.dropped_low_confidence.load(Ordering::Relaxed),
            dropped_too_soon: self.dropped_too_soon.load(Ordering::Relaxed),
            icon_reminders: self.icon_reminders.load(Ordering::Relaxed),
            popup_reminders: self.popup_reminders.load(Ordering::Relaxed),
            audio_reminders: self.audio_reminders.load(Ordering::Relaxed),
            cooldowns_entered: self.cooldowns_entered.load(Ordering::Relaxed),
            session_start,
            session_duration_secs: (Utc::now() - session_start).num_seconds().max(0) as u64,
        }
    }

    /// Reminders fired at `level` so far.
    pub fn reminders_at(&self, level: ReminderLevel) -> u64 {
        let stats = self.stats();
        match level {
            ReminderLevel::None => 0,
            ReminderLevel::Icon => stats.icon_reminders,
            ReminderLevel::Popup => stats.popup_reminders,
            ReminderLevel::Audio => stats.audio_reminders,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Frames analyzed: {}\n\
             - Frames without a subject: {}\n\
             - Samples accepted: {}\n\
             - Samples dropped (low confidence): {}\n\
             - Samples dropped (rate limit): {}\n\
             - Reminders: {} icon, {} popup, {} audio\n\
             - Cooldowns entered: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - No video frames stored or transmitted\n\
             - Only five landmark positions processed per frame\n\
             - Statistics discarded when the session ends",
            stats.frames_analyzed,
            stats.no_subject_frames,
            stats.samples_accepted,
            stats.dropped_low_confidence,
            stats.dropped_too_soon,
            stats.icon_reminders,
            stats.popup_reminders,
            stats.audio_reminders,
            stats.cooldowns_entered,
            stats.session_duration_secs
        )
    }

    /// Reset all counters and restart the session clock.
    pub fn reset(&self) {
        *self.session_start.write() = Utc::now();
        for counter in [
            &self.frames_analyzed,
            &self.no_subject_frames,
            &self.samples_accepted,
            &self.dropped_low_confidence,
            &self.dropped_too_soon,
            &self.icon_reminders,
            &self.popup_reminders,
            &self.audio_reminders,
            &self.cooldowns_entered,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub frames_analyzed: u64,
    pub no_subject_frames: u64,
    pub samples_accepted: u64,
    pub dropped_low_confidence: u64,
    pub dropped_too_soon: u64,
    pub icon_reminders: u64,
    pub popup_reminders: u64,
    pub audio_reminders: u64,
    pub cooldowns_entered: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

//! Reminder actuators.
//!
//! Actuators receive fire-and-forget requests from the monitor. Nothing in
//! the core waits for an acknowledgement, so implementations must not block
//! for long and must swallow their own delivery failures.

use crate::core::escalation::ReminderAction;
use crate::core::geometry::{PostureSample, PostureStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of messages a [`QueueActuator`] holds before dropping the oldest.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Sink for reminder, error and status messages.
pub trait Actuator {
    /// Update the status indicator.
    fn show_icon(&mut self, status: PostureStatus);

    /// Show a popup; `enhanced` popups are more prominent.
    fn show_popup(&mut self, status: PostureStatus, message: &str, enhanced: bool);

    fn play_audio(&mut self, sound_id: &str, volume: f32);

    /// Best-effort system notification.
    fn notify(&mut self, title: &str, message: &str);

    /// Report a fatal monitoring error to the user.
    fn notify_error(&mut self, message: &str);

    /// Publish the latest classified sample.
    fn broadcast_status(&mut self, sample: &PostureSample);
}

/// Route one reminder action to the matching actuator call.
pub fn dispatch<A: Actuator + ?Sized>(actuator: &mut A, action: &ReminderAction) {
    match action {
        ReminderAction::ShowIcon { status } => actuator.show_icon(*status),
        ReminderAction::ShowPopup {
            status,
            message,
            enhanced,
        } => actuator.show_popup(*status, message, *enhanced),
        ReminderAction::PlayAudio {
            sound_id, volume, ..
        } => actuator.play_audio(sound_id, *volume),
        ReminderAction::Notify { title, message } => actuator.notify(title, message),
    }
}

/// Prints reminders to stdout.
#[derive(Debug, Default)]
pub struct ConsoleActuator {
    verbose: bool,
    last_icon: Option<PostureStatus>,
}

impl ConsoleActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print every classified sample.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn stamp() -> String {
        Utc::now().format("%H:%M:%S").to_string()
    }
}

impl Actuator for ConsoleActuator {
    fn show_icon(&mut self, status: PostureStatus) {
        // The icon is refreshed on every good sample; only print changes.
        if self.last_icon == Some(status) {
            return;
        }
        self.last_icon = Some(status);
        println!("[{}] Posture: {}", Self::stamp(), status);
    }

    fn show_popup(&mut self, status: PostureStatus, message: &str, enhanced: bool) {
        let marker = if enhanced { "!!" } else { "!" };
        println!("[{}] {marker} {} posture: {message}", Self::stamp(), status);
    }

    fn play_audio(&mut self, sound_id: &str, volume: f32) {
        println!(
            "[{}] Playing '{sound_id}' at {:.0}% volume",
            Self::stamp(),
            volume * 100.0
        );
    }

    fn notify(&mut self, title: &str, message: &str) {
        println!("[{}] {title}: {message}", Self::stamp());
    }

    fn notify_error(&mut self, message: &str) {
        eprintln!("[{}] Monitoring error: {message}", Self::stamp());
    }

    fn broadcast_status(&mut self, sample: &PostureSample) {
        if self.verbose {
            println!(
                "[{}] {} head {:.1}° shoulders {:.1}° confidence {:.2}",
                sample.timestamp.format("%H:%M:%S%.3f"),
                sample.status,
                sample.head_tilt_angle,
                sample.shoulder_tilt_angle,
                sample.confidence
            );
        }
    }
}

/// A message waiting to be picked up by a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Reminder(ReminderAction),
    Error {
        message: String,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Default)]
struct QueueInner {
    messages: VecDeque<OutboundMessage>,
    latest_sample: Option<PostureSample>,
    dropped: u64,
}

/// Buffers outbound messages for clients to drain.
///
/// Clones share the same queue. Status broadcasts do not queue; only the
/// latest sample is kept.
#[derive(Debug, Clone)]
pub struct QueueActuator {
    inner: Arc<Mutex<QueueInner>>,
    capacity: usize,
}

impl QueueActuator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            capacity: capacity.max(1),
        }
    }

    /// Take all queued messages, oldest first.
    pub fn drain(&self) -> Vec<OutboundMessage> {
        self.inner.lock().messages.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latest_sample(&self) -> Option<PostureSample> {
        self.inner.lock().latest_sample
    }

    /// Messages discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    fn push(&self, message: OutboundMessage) {
        let mut inner = self.inner.lock();
        if inner.messages.len() >= self.capacity {
            inner.messages.pop_front();
            inner.dropped += 1;
        }
        inner.messages.push_back(message);
    }
}

impl Default for QueueActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl Actuator for QueueActuator {
    fn show_icon(&mut self, status: PostureStatus) {
        self.push(OutboundMessage::Reminder(ReminderAction::ShowIcon { status }));
    }

    fn show_popup(&mut self, status: PostureStatus, message: &str, enhanced: bool) {
        self.push(OutboundMessage::Reminder(ReminderAction::ShowPopup {
            status,
            message: message.to_string(),
            enhanced,
        }));
    }

    fn play_audio(&mut self, sound_id: &str, volume: f32) {
        // The status is not part of the audio request; use the last sample's.
        let status = self
            .latest_sample()
            .map(|sample| sample.status)
            .unwrap_or(PostureStatus::Warning);
        self.push(OutboundMessage::Reminder(ReminderAction::PlayAudio {
            status,
            sound_id: sound_id.to_string(),
            volume,
        }));
    }

    fn notify(&mut self, title: &str, message: &str) {
        self.push(OutboundMessage::Reminder(ReminderAction::Notify {
            title: title.to_string(),
            message: message.to_string(),
        }));
    }

    fn notify_error(&mut self, message: &str) {
        self.push(OutboundMessage::Error {
            message: message.to_string(),
            at: Utc::now(),
        });
    }

    fn broadcast_status(&mut self, sample: &PostureSample) {
        self.inner.lock().latest_sample = Some(*sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: PostureStatus) -> PostureSample {
        PostureSample {
            status,
            head_tilt_angle: 15.0,
            shoulder_tilt_angle: 2.0,
            confidence: 0.9,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_dispatch_routes_every_action() {
        let mut queue = QueueActuator::new();
        queue.broadcast_status(&sample(PostureStatus::Danger));

        let actions = vec![
            ReminderAction::ShowIcon {
                status: PostureStatus::Danger,
            },
            ReminderAction::ShowPopup {
                status: PostureStatus::Danger,
                message: "Sit up".to_string(),
                enhanced: true,
            },
            ReminderAction::PlayAudio {
                status: PostureStatus::Danger,
                sound_id: "gentle-chime".to_string(),
                volume: 0.3,
            },
            ReminderAction::Notify {
                title: "Posture reminder".to_string(),
                message: "Sit up".to_string(),
            },
        ];
        for action in &actions {
            dispatch(&mut queue, action);
        }

        let drained: Vec<OutboundMessage> = queue.drain();
        let expected: Vec<OutboundMessage> =
            actions.into_iter().map(OutboundMessage::Reminder).collect();
        assert_eq!(drained, expected);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let mut queue = QueueActuator::with_capacity(2);
        queue.show_icon(PostureStatus::Good);
        queue.show_icon(PostureStatus::Warning);
        queue.show_icon(PostureStatus::Danger);

        assert_eq!(queue.dropped(), 1);
        let drained = queue.drain();
        assert_eq!(
            drained[0],
            OutboundMessage::Reminder(ReminderAction::ShowIcon {
                status: PostureStatus::Warning
            })
        );
    }

    #[test]
    fn test_clones_share_queue() {
        let queue = QueueActuator::new();
        let mut writer = queue.clone();
        writer.notify_error("camera unplugged");
        writer.broadcast_status(&sample(PostureStatus::Good));

        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.latest_sample().map(|s| s.status),
            Some(PostureStatus::Good)
        );
        assert!(matches!(
            &queue.drain()[0],
            OutboundMessage::Error { message, .. } if message == "camera unplugged"
        ));
    }

    #[test]
    fn test_outbound_message_json_shape() {
        let message = OutboundMessage::Reminder(ReminderAction::ShowIcon {
            status: PostureStatus::Warning,
        });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "reminder");
        assert_eq!(json["action"], "show_icon");
        assert_eq!(json["status"], "warning");
    }

    #[test]
    fn test_console_actuator_accepts_all_calls() {
        let mut console = ConsoleActuator::new().verbose(true);
        console.show_icon(PostureStatus::Good);
        console.show_icon(PostureStatus::Good);
        console.show_popup(PostureStatus::Warning, "Lift your head", false);
        console.play_audio("gentle-chime", 0.3);
        console.notify("Posture reminder", "Sit up");
        console.broadcast_status(&sample(PostureStatus::Warning));
        assert_eq!(console.last_icon, Some(PostureStatus::Good));
    }
}

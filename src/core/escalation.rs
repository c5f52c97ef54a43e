//! Reminder escalation state machine.
//!
//! An *episode* opens on the first bad-posture sample and fires an icon
//! reminder immediately. While bad posture persists, the usage mode's policy
//! table decides which stronger reminder fires once enough time has passed.
//! Reaching the policy's terminal level starts a cooldown during which bad
//! samples are observed but ignored. A single good sample, or the end of the
//! cooldown, closes the episode.
//!
//! Transitions are pure functions over an [`EscalationSession`] value:
//!
//! ```text
//! (session, status, settings, now) -> (session', actions)
//! ```
//!
//! The cooldown is a deadline stored in the session rather than a live timer,
//! so cancelling it is just clearing the field.

use crate::config::{ReminderSettings, ReminderTimingConfig, UsageMode, MAX_DELAY_SECS};
use crate::core::advice;
use crate::core::geometry::PostureStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reminder strength. Ordered; never decreases within an episode.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReminderLevel {
    #[default]
    None = 0,
    Icon = 1,
    Popup = 2,
    Audio = 3,
}

impl ReminderLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ReminderLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReminderLevel::None => "none",
            ReminderLevel::Icon => "icon",
            ReminderLevel::Popup => "popup",
            ReminderLevel::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// Fire `level` once bad posture has lasted `delay_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStep {
    pub delay_secs: u64,
    pub level: ReminderLevel,
}

impl PolicyStep {
    pub fn new(delay_secs: u64, level: ReminderLevel) -> Self {
        Self { delay_secs, level }
    }

    /// Delay as a duration, capped at [`MAX_DELAY_SECS`].
    pub fn delay(&self) -> Duration {
        Duration::seconds(self.delay_secs.min(MAX_DELAY_SECS) as i64)
    }
}

/// Ordered escalation steps for one usage mode.
///
/// The icon reminder at the start of an episode is implicit and not part of
/// the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    steps: Vec<PolicyStep>,
}

impl EscalationPolicy {
    pub fn new(mut steps: Vec<PolicyStep>) -> Self {
        steps.sort_by_key(|step| (step.delay_secs, step.level));
        Self { steps }
    }

    /// Built-in table for `mode`. Custom mode uses the caller's steps.
    pub fn for_mode(
        mode: UsageMode,
        timing: &ReminderTimingConfig,
        custom_steps: &[PolicyStep],
    ) -> Self {
        let first = timing.first_warning_delay_secs;
        match mode {
            // Popup is skipped to avoid interrupting focused work.
            UsageMode::ComputerWork | UsageMode::StudyReading => {
                Self::new(vec![PolicyStep::new(first, ReminderLevel::Audio)])
            }
            UsageMode::Silent => Self::new(vec![PolicyStep::new(first, ReminderLevel::Popup)]),
            UsageMode::Custom => Self::new(custom_steps.to_vec()),
        }
    }

    pub fn steps(&self) -> &[PolicyStep] {
        &self.steps
    }

    /// Highest level this policy can reach; icon when the table is empty.
    pub fn terminal_level(&self) -> ReminderLevel {
        self.steps
            .iter()
            .map(|step| step.level)
            .max()
            .unwrap_or(ReminderLevel::Icon)
            .max(ReminderLevel::Icon)
    }

    /// Highest level whose delay has been reached after `elapsed`.
    pub fn target_level(&self, elapsed: Duration) -> ReminderLevel {
        self.steps
            .iter()
            .filter(|step| elapsed >= step.delay())
            .map(|step| step.level)
            .max()
            .unwrap_or(ReminderLevel::None)
    }

    /// The earliest step that would raise the level above `level`.
    pub fn next_step_after(&self, level: ReminderLevel) -> Option<PolicyStep> {
        self.steps.iter().find(|step| step.level > level).copied()
    }
}

/// State of the current escalation episode.
///
/// Either idle (no start, level none, no cooldown) or active. The start time
/// and level are only ever set and cleared together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscalationSession {
    bad_posture_start: Option<DateTime<Utc>>,
    current_level: ReminderLevel,
    cooldown_deadline: Option<DateTime<Utc>>,
}

impl EscalationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.bad_posture_start.is_some()
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_deadline.is_some()
    }

    pub fn current_level(&self) -> ReminderLevel {
        self.current_level
    }

    pub fn bad_posture_start(&self) -> Option<DateTime<Utc>> {
        self.bad_posture_start
    }

    pub fn cooldown_deadline(&self) -> Option<DateTime<Utc>> {
        self.cooldown_deadline
    }

    /// How long the current episode has lasted at `now`; zero when idle.
    pub fn bad_posture_duration(&self, now: DateTime<Utc>) -> Duration {
        match self.bad_posture_start {
            Some(start) if now > start => now - start,
            _ => Duration::zero(),
        }
    }
}

/// A reminder the actuators should render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReminderAction {
    ShowIcon {
        status: PostureStatus,
    },
    ShowPopup {
        status: PostureStatus,
        message: String,
        enhanced: bool,
    },
    PlayAudio {
        status: PostureStatus,
        sound_id: String,
        volume: f32,
    },
    /// Best-effort system notification accompanying an audio reminder
    Notify { title: String, message: String },
}

impl ReminderAction {
    /// Level this action belongs to.
    pub fn level(&self) -> ReminderLevel {
        match self {
            ReminderAction::ShowIcon { .. } => ReminderLevel::Icon,
            ReminderAction::ShowPopup { .. } => ReminderLevel::Popup,
            ReminderAction::PlayAudio { .. } | ReminderAction::Notify { .. } => {
                ReminderLevel::Audio
            }
        }
    }
}

/// Advance `session` by one accepted sample observed at `now`.
pub fn step(
    session: EscalationSession,
    status: PostureStatus,
    settings: &ReminderSettings,
    now: DateTime<Utc>,
) -> (EscalationSession, Vec<ReminderAction>) {
    let session = expire_cooldown(session, now);

    if !status.is_bad() {
        // Hard reset; also cancels a pending cooldown.
        return (
            EscalationSession::default(),
            vec![ReminderAction::ShowIcon { status }],
        );
    }

    if session.in_cooldown() {
        return (session, Vec::new());
    }

    let Some(start) = session.bad_posture_start else {
        let opened = EscalationSession {
            bad_posture_start: Some(now),
            current_level: ReminderLevel::Icon,
            cooldown_deadline: None,
        };
        return (opened, reminder_actions(ReminderLevel::Icon, status, settings));
    };

    let policy = settings.policy();
    let target = policy.target_level(now - start);
    if target <= session.current_level {
        return (session, Vec::new());
    }

    let mut next = session;
    next.current_level = target;
    if target == policy.terminal_level() {
        let deadline = now
            .checked_add_signed(settings.timing.cooldown_period())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        next.cooldown_deadline = Some(deadline);
    }
    (next, reminder_actions(target, status, settings))
}

/// Close the episode if its cooldown has run out by `now`.
pub fn expire_cooldown(session: EscalationSession, now: DateTime<Utc>) -> EscalationSession {
    match session.cooldown_deadline {
        Some(deadline) if now >= deadline => EscalationSession::default(),
        _ => session,
    }
}

/// Actions requested when `level` fires for `status`.
pub fn reminder_actions(
    level: ReminderLevel,
    status: PostureStatus,
    settings: &ReminderSettings,
) -> Vec<ReminderAction> {
    match level {
        ReminderLevel::None => Vec::new(),
        ReminderLevel::Icon => vec![ReminderAction::ShowIcon { status }],
        ReminderLevel::Popup => {
            let enhanced = settings.usage_mode == UsageMode::Silent;
            let message = if enhanced {
                advice::enhanced_advice(status)
            } else {
                advice::gentle_advice(status)
            };
            vec![ReminderAction::ShowPopup {
                status,
                message: message.to_string(),
                enhanced,
            }]
        }
        ReminderLevel::Audio => vec![
            ReminderAction::PlayAudio {
                status,
                sound_id: settings.sound.clone(),
                volume: settings.volume,
            },
            ReminderAction::Notify {
                title: advice::NOTIFICATION_TITLE.to_string(),
                message: advice::notification_message(status).to_string(),
            },
        ],
    }
}

/// Owns the live session and the settings it is evaluated against.
#[derive(Debug, Clone)]
pub struct EscalationMachine {
    session: EscalationSession,
    settings: ReminderSettings,
}

impl EscalationMachine {
    pub fn new(settings: ReminderSettings) -> Self {
        Self {
            session: EscalationSession::default(),
            settings,
        }
    }

    /// Feed one accepted sample; returns the reminders to dispatch.
    pub fn observe(&mut self, status: PostureStatus, now: DateTime<Utc>) -> Vec<ReminderAction> {
        let before = self.session;
        let (after, actions) = step(before, status, &self.settings, now);
        self.session = after;

        if after.current_level != before.current_level {
            tracing::info!(
                from = %before.current_level,
                to = %after.current_level,
                %status,
                mode = %self.settings.usage_mode,
                "Reminder level changed"
            );
        }
        if after.in_cooldown() && !before.in_cooldown() {
            tracing::info!(
                until = %after.cooldown_deadline.unwrap_or(now),
                "Entered reminder cooldown"
            );
        }
        actions
    }

    /// Expire the cooldown if its deadline has passed. Returns true if the
    /// episode was closed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let expired = expire_cooldown(self.session, now);
        if expired != self.session {
            tracing::info!("Reminder cooldown ended");
            self.session = expired;
            return true;
        }
        false
    }

    /// Swap settings; applies from the next sample on.
    pub fn update_settings(&mut self, settings: ReminderSettings) {
        self.settings = settings;
    }

    pub fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    pub fn session(&self) -> &EscalationSession {
        &self.session
    }

    /// When the next policy step would fire if bad posture continues.
    pub fn next_reminder_at(&self) -> Option<DateTime<Utc>> {
        if self.session.in_cooldown() {
            return None;
        }
        let start = self.session.bad_posture_start?;
        self.settings
            .policy()
            .next_step_after(self.session.current_level)
            .and_then(|step| start.checked_add_signed(step.delay()))
    }

    pub fn reset(&mut self) {
        self.session = EscalationSession::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: f64) -> DateTime<Utc> {
        let base: DateTime<Utc> = "2024-05-01T09:00:00Z".parse().unwrap();
        base + Duration::milliseconds((secs * 1000.0) as i64)
    }

    fn settings(mode: UsageMode) -> ReminderSettings {
        ReminderSettings {
            usage_mode: mode,
            ..ReminderSettings::default()
        }
    }

    fn levels(actions: &[ReminderAction]) -> Vec<ReminderLevel> {
        actions.iter().map(ReminderAction::level).collect()
    }

    #[test]
    fn test_policy_tables() {
        let timing = ReminderTimingConfig::default();
        let computer = EscalationPolicy::for_mode(UsageMode::ComputerWork, &timing, &[]);
        assert_eq!(computer.terminal_level(), ReminderLevel::Audio);
        assert_eq!(computer.target_level(Duration::seconds(4)), ReminderLevel::None);
        assert_eq!(computer.target_level(Duration::seconds(5)), ReminderLevel::Audio);

        let silent = EscalationPolicy::for_mode(UsageMode::Silent, &timing, &[]);
        assert_eq!(silent.terminal_level(), ReminderLevel::Popup);
        assert_eq!(silent.target_level(Duration::hours(2)), ReminderLevel::Popup);

        let custom = EscalationPolicy::for_mode(UsageMode::Custom, &timing, &[]);
        assert_eq!(custom.terminal_level(), ReminderLevel::Icon);
        assert_eq!(custom.target_level(Duration::hours(2)), ReminderLevel::None);
    }

    #[test]
    fn test_computer_work_skips_popup() {
        let settings = settings(UsageMode::ComputerWork);
        let session = EscalationSession::new();

        let (session, actions) = step(session, PostureStatus::Warning, &settings, at(0.0));
        assert_eq!(actions, vec![ReminderAction::ShowIcon { status: PostureStatus::Warning }]);
        assert_eq!(session.current_level(), ReminderLevel::Icon);
        assert_eq!(session.bad_posture_start(), Some(at(0.0)));

        let (session, actions) = step(session, PostureStatus::Warning, &settings, at(4.5));
        assert!(actions.is_empty());

        let (session, actions) = step(session, PostureStatus::Warning, &settings, at(5.0));
        assert_eq!(levels(&actions), vec![ReminderLevel::Audio, ReminderLevel::Audio]);
        assert!(matches!(
            &actions[0],
            ReminderAction::PlayAudio { sound_id, volume, .. }
                if sound_id == "gentle-chime" && (*volume - 0.3).abs() < f32::EPSILON
        ));
        assert!(matches!(&actions[1], ReminderAction::Notify { .. }));
        assert_eq!(session.current_level(), ReminderLevel::Audio);
        assert!(session.in_cooldown());
        assert_eq!(session.cooldown_deadline(), Some(at(5.0 + 300.0)));

        let (session, actions) = step(session, PostureStatus::Danger, &settings, at(6.0));
        assert!(actions.is_empty());
        assert_eq!(session.current_level(), ReminderLevel::Audio);
    }

    #[test]
    fn test_study_reading_escalates_to_audio() {
        let settings = settings(UsageMode::StudyReading);
        let (session, _) = step(EscalationSession::new(), PostureStatus::Danger, &settings, at(0.0));
        let (session, actions) = step(session, PostureStatus::Danger, &settings, at(7.0));
        assert_eq!(actions[0].level(), ReminderLevel::Audio);
        assert!(session.in_cooldown());
    }

    #[test]
    fn test_silent_mode_never_plays_audio() {
        let settings = settings(UsageMode::Silent);
        let (session, _) = step(EscalationSession::new(), PostureStatus::Warning, &settings, at(0.0));
        let (mut session, actions) = step(session, PostureStatus::Warning, &settings, at(5.0));
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            ReminderAction::ShowPopup {
                enhanced, message, ..
            } => {
                assert!(*enhanced);
                assert_eq!(message, advice::enhanced_advice(PostureStatus::Warning));
            }
            other => panic!("expected popup, got {other:?}"),
        }
        assert!(session.in_cooldown());

        // Keep slouching for an hour, sampling twice a second.
        let mut t = 5.5;
        while t < 3600.0 {
            let (next, actions) = step(session, PostureStatus::Warning, &settings, at(t));
            assert!(actions.iter().all(|a| a.level() < ReminderLevel::Audio));
            session = next;
            t += 0.5;
        }
    }

    #[test]
    fn test_custom_mode_stays_at_icon() {
        let settings = settings(UsageMode::Custom);
        let (session, actions) = step(EscalationSession::new(), PostureStatus::Danger, &settings, at(0.0));
        assert_eq!(levels(&actions), vec![ReminderLevel::Icon]);
        let (session, actions) = step(session, PostureStatus::Danger, &settings, at(600.0));
        assert!(actions.is_empty());
        assert_eq!(session.current_level(), ReminderLevel::Icon);
        assert!(!session.in_cooldown());
    }

    #[test]
    fn test_custom_steps_are_followed() {
        let settings = ReminderSettings {
            usage_mode: UsageMode::Custom,
            custom_policy: vec![
                PolicyStep::new(10, ReminderLevel::Audio),
                PolicyStep::new(3, ReminderLevel::Popup),
            ],
            ..ReminderSettings::default()
        };
        let (session, _) = step(EscalationSession::new(), PostureStatus::Warning, &settings, at(0.0));
        let (session, actions) = step(session, PostureStatus::Warning, &settings, at(3.0));
        assert!(matches!(
            actions[0],
            ReminderAction::ShowPopup { enhanced: false, .. }
        ));
        assert!(!session.in_cooldown());
        let (session, actions) = step(session, PostureStatus::Warning, &settings, at(10.0));
        assert_eq!(actions[0].level(), ReminderLevel::Audio);
        assert!(session.in_cooldown());
    }

    #[test]
    fn test_late_sample_jumps_to_highest_reached_level() {
        let settings = ReminderSettings {
            usage_mode: UsageMode::Custom,
            custom_policy: vec![
                PolicyStep::new(3, ReminderLevel::Popup),
                PolicyStep::new(10, ReminderLevel::Audio),
            ],
            ..ReminderSettings::default()
        };
        let (session, _) = step(EscalationSession::new(), PostureStatus::Warning, &settings, at(0.0));
        let (session, actions) = step(session, PostureStatus::Warning, &settings, at(12.0));
        assert_eq!(actions[0].level(), ReminderLevel::Audio);
        assert_eq!(session.current_level(), ReminderLevel::Audio);
    }

    #[test]
    fn test_good_sample_resets_everything() {
        let settings = settings(UsageMode::ComputerWork);
        let (session, _) = step(EscalationSession::new(), PostureStatus::Warning, &settings, at(0.0));
        let (session, _) = step(session, PostureStatus::Warning, &settings, at(5.0));
        assert!(session.in_cooldown());

        let (session, actions) = step(session, PostureStatus::Good, &settings, at(6.0));
        assert_eq!(actions, vec![ReminderAction::ShowIcon { status: PostureStatus::Good }]);
        assert_eq!(session, EscalationSession::default());
        assert!(!session.is_active());
        assert_eq!(session.current_level(), ReminderLevel::None);
        assert!(!session.in_cooldown());
    }

    #[test]
    fn test_good_sample_while_idle_still_updates_icon() {
        let settings = settings(UsageMode::ComputerWork);
        let (session, actions) = step(EscalationSession::new(), PostureStatus::Good, &settings, at(0.0));
        assert_eq!(actions.len(), 1);
        assert_eq!(session, EscalationSession::default());
    }

    #[test]
    fn test_cancelled_cooldown_does_not_fire_later() {
        let mut machine = EscalationMachine::new(settings(UsageMode::ComputerWork));
        machine.observe(PostureStatus::Warning, at(0.0));
        machine.observe(PostureStatus::Warning, at(5.0));
        assert!(machine.session().in_cooldown());

        machine.observe(PostureStatus::Good, at(10.0));
        // A fresh episode starts before the old deadline would have passed.
        machine.observe(PostureStatus::Warning, at(20.0));
        assert!(!machine.tick(at(305.0)));
        assert!(machine.session().is_active());
        assert_eq!(machine.session().bad_posture_start(), Some(at(20.0)));
    }

    #[test]
    fn test_cooldown_expiry_matches_good_reset() {
        let settings = settings(UsageMode::ComputerWork);
        let (session, _) = step(EscalationSession::new(), PostureStatus::Warning, &settings, at(0.0));
        let (in_cooldown, _) = step(session, PostureStatus::Warning, &settings, at(5.0));

        let expired = expire_cooldown(in_cooldown, at(305.0));
        let (good_reset, _) = step(in_cooldown, PostureStatus::Good, &settings, at(100.0));
        assert_eq!(expired, good_reset);
        assert_eq!(expire_cooldown(in_cooldown, at(304.9)), in_cooldown);
    }

    #[test]
    fn test_bad_sample_after_cooldown_opens_new_episode() {
        let settings = settings(UsageMode::ComputerWork);
        let (session, _) = step(EscalationSession::new(), PostureStatus::Warning, &settings, at(0.0));
        let (session, _) = step(session, PostureStatus::Warning, &settings, at(5.0));
        let (session, actions) = step(session, PostureStatus::Warning, &settings, at(306.0));
        assert_eq!(levels(&actions), vec![ReminderLevel::Icon]);
        assert_eq!(session.bad_posture_start(), Some(at(306.0)));
        assert!(!session.in_cooldown());
    }

    #[test]
    fn test_machine_tick_expires_cooldown() {
        let mut machine = EscalationMachine::new(settings(UsageMode::Silent));
        machine.observe(PostureStatus::Danger, at(0.0));
        machine.observe(PostureStatus::Danger, at(5.0));
        assert!(!machine.tick(at(100.0)));
        assert!(machine.tick(at(305.0)));
        assert_eq!(*machine.session(), EscalationSession::default());
    }

    #[test]
    fn test_next_reminder_at() {
        let mut machine = EscalationMachine::new(settings(UsageMode::ComputerWork));
        assert_eq!(machine.next_reminder_at(), None);
        machine.observe(PostureStatus::Warning, at(0.0));
        assert_eq!(machine.next_reminder_at(), Some(at(5.0)));
        machine.observe(PostureStatus::Warning, at(5.0));
        assert_eq!(machine.next_reminder_at(), None);
    }

    #[test]
    fn test_settings_update_applies_to_open_episode() {
        let mut machine = EscalationMachine::new(settings(UsageMode::ComputerWork));
        machine.observe(PostureStatus::Warning, at(0.0));
        machine.update_settings(settings(UsageMode::Silent));
        let actions = machine.observe(PostureStatus::Warning, at(5.0));
        assert!(matches!(
            actions[0],
            ReminderAction::ShowPopup { enhanced: true, .. }
        ));
    }

    #[test]
    fn test_oversized_timing_saturates() {
        let mut settings = settings(UsageMode::ComputerWork);
        settings.timing.first_warning_delay_secs = u64::MAX;
        settings.timing.cooldown_period_mins = 200_000_000_000;

        let (session, _) = step(EscalationSession::new(), PostureStatus::Warning, &settings, at(0.0));
        let (session, actions) = step(session, PostureStatus::Warning, &settings, at(0.5));
        assert!(actions.is_empty());
        assert_eq!(session.current_level(), ReminderLevel::Icon);

        let late = at(0.0) + Duration::seconds(MAX_DELAY_SECS as i64);
        let (session, actions) = step(session, PostureStatus::Warning, &settings, late);
        assert_eq!(levels(&actions), vec![ReminderLevel::Audio, ReminderLevel::Audio]);
        assert_eq!(
            session.cooldown_deadline(),
            Some(late + Duration::minutes(crate::config::MAX_COOLDOWN_MINS as i64))
        );
    }

    #[test]
    fn test_cooldown_deadline_saturates_at_calendar_end() {
        let settings = settings(UsageMode::ComputerWork);
        let near_end = DateTime::<Utc>::MAX_UTC - Duration::seconds(10);
        let start = near_end - Duration::seconds(5);
        let (session, _) = step(EscalationSession::new(), PostureStatus::Danger, &settings, start);
        let (session, _) = step(session, PostureStatus::Danger, &settings, near_end);
        assert_eq!(session.cooldown_deadline(), Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_zero_duration_before_episode() {
        let session = EscalationSession::new();
        assert_eq!(session.bad_posture_duration(at(10.0)), Duration::zero());
    }
}

//! Configuration for the Posture Guardian agent.
//!
//! This is the settings store: usage mode, reminder timing, sound
//! preferences and classifier thresholds. A running agent re-reads the file
//! periodically, so `pause`, `resume` and `mode` take effect without a
//! restart.

use crate::core::escalation::{EscalationPolicy, PolicyStep};
use crate::core::geometry::ClassifierThresholds;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Longest escalation delay honoured; larger values are clamped.
pub const MAX_DELAY_SECS: u64 = 24 * 60 * 60;

/// Longest cooldown honoured; larger values are clamped.
pub const MAX_COOLDOWN_MINS: u64 = 24 * 60;

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reminder policy and preferences
    pub reminder: ReminderSettings,

    /// Angle thresholds for posture classification
    pub thresholds: ClassifierThresholds,

    /// Whether monitoring is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reminder: ReminderSettings::default(),
            thresholds: ClassifierThresholds::default(),
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.reminder.clamp_to_limits();
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("posture-guardian")
            .join("config.json")
    }
}

/// Which reminder policy applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMode {
    /// Icon, then sound; no popups to interrupt focused work
    #[default]
    ComputerWork,
    /// Icon, then sound
    StudyReading,
    /// Icon, then an enhanced popup; never sound
    Silent,
    /// Icon only, unless custom policy steps are configured
    Custom,
}

impl UsageMode {
    pub const ALL: [UsageMode; 4] = [
        UsageMode::ComputerWork,
        UsageMode::StudyReading,
        UsageMode::Silent,
        UsageMode::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UsageMode::ComputerWork => "computer_work",
            UsageMode::StudyReading => "study_reading",
            UsageMode::Silent => "silent",
            UsageMode::Custom => "custom",
        }
    }
}

impl fmt::Display for UsageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "computer_work" | "computer" | "work" => Ok(UsageMode::ComputerWork),
            "study_reading" | "study" | "reading" => Ok(UsageMode::StudyReading),
            "silent" => Ok(UsageMode::Silent),
            "custom" => Ok(UsageMode::Custom),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Delays driving the escalation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderTimingConfig {
    /// Continuous bad posture before the first escalation (seconds)
    pub first_warning_delay_secs: u64,
    /// Additional delay before a second escalation (seconds)
    pub second_warning_delay_secs: u64,
    /// Quiet period after the terminal reminder (minutes)
    pub cooldown_period_mins: u64,
}

impl Default for ReminderTimingConfig {
    fn default() -> Self {
        Self {
            first_warning_delay_secs: 5,
            second_warning_delay_secs: 5,
            cooldown_period_mins: 5,
        }
    }
}

impl ReminderTimingConfig {
    pub fn cooldown_period(&self) -> Duration {
        Duration::minutes(self.cooldown_period_mins.min(MAX_COOLDOWN_MINS) as i64)
    }

    /// Copy with every delay within the supported range.
    pub fn clamped(self) -> Self {
        Self {
            first_warning_delay_secs: self.first_warning_delay_secs.min(MAX_DELAY_SECS),
            second_warning_delay_secs: self.second_warning_delay_secs.min(MAX_DELAY_SECS),
            cooldown_period_mins: self.cooldown_period_mins.min(MAX_COOLDOWN_MINS),
        }
    }
}

/// Everything the escalation state machine reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    pub usage_mode: UsageMode,
    pub timing: ReminderTimingConfig,
    /// Sound played for audio reminders
    pub sound: String,
    /// Audio reminder volume (0-1)
    pub volume: f32,
    /// Escalation steps used in custom mode
    pub custom_policy: Vec<PolicyStep>,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            usage_mode: UsageMode::default(),
            timing: ReminderTimingConfig::default(),
            sound: "gentle-chime".to_string(),
            volume: 0.3,
            custom_policy: Vec::new(),
        }
    }
}

impl ReminderSettings {
    /// Escalation table for the active mode.
    pub fn policy(&self) -> EscalationPolicy {
        EscalationPolicy::for_mode(self.usage_mode, &self.timing, &self.custom_policy)
    }

    /// Clamp volume, delays and the cooldown into their supported ranges.
    pub fn clamp_to_limits(&mut self) {
        self.volume = self.volume.clamp(0.0, 1.0);
        self.timing = self.timing.clamped();
        for step in &mut self.custom_policy {
            step.delay_secs = step.delay_secs.min(MAX_DELAY_SECS);
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unknown usage mode '{0}' (expected computer_work, study_reading, silent or custom)")]
    UnknownMode(String),
}

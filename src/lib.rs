//! Posture Guardian - privacy-first sitting posture monitor.
//!
//! This library classifies sitting posture from a handful of body landmarks
//! and escalates reminders while bad posture persists, with strong privacy
//! guarantees.
//!
//! # Privacy Guarantees
//!
//! - **No video**: Frames stay with the capture source; only landmark
//!   coordinates reach the agent
//! - **Five points only**: Nose, ears and shoulders; nothing else is read
//! - **No history**: Samples are discarded once the state machine has seen them
//! - **Transparency**: Processing is counted and auditable per session
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Posture Guardian                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  Detector   │──▶│  Geometry   │──▶│ Sample Gate │        │
//! │  │ (landmarks) │   │ (classify)  │   │ (conf/rate) │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │         │                                    │               │
//! │         ▼                                    ▼               │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │Transparency │   │  Actuator   │◀──│ Escalation  │        │
//! │  │    Log      │   │ (reminders) │   │  (session)  │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use posture_guardian::{capture, ConsoleActuator, Config, Monitor};
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! let (source, detector) = capture::replay("session.jsonl", true);
//! let mut monitor = Monitor::new(source, detector, ConsoleActuator::new(), &Config::default());
//!
//! monitor.initialize(&AtomicBool::new(false)).expect("initialization failed");
//! monitor.start().expect("failed to start monitoring");
//! while monitor.poll(Duration::from_millis(100)).is_ok() {
//!     if monitor.detector().is_exhausted() && monitor.pending_events() == 0 {
//!         break;
//!     }
//! }
//! monitor.stop();
//! ```

pub mod actuator;
pub mod capture;
pub mod config;
pub mod core;
pub mod monitor;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use actuator::{Actuator, ConsoleActuator, OutboundMessage, QueueActuator};
pub use capture::{CaptureSource, DetectorEvent, LandmarkDetector, LandmarkFrame, LandmarkSet};
pub use config::{Config, ReminderSettings, ReminderTimingConfig, UsageMode};
pub use core::{
    analyze, ClassifierThresholds, EscalationMachine, PostureSample, PostureStatus,
    ReminderAction, ReminderLevel, SampleGate,
};
pub use monitor::{Monitor, MonitorError, MonitorOptions, MonitorState, MonitorStatus};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║             POSTURE GUARDIAN - PRIVACY DECLARATION               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent watches your sitting posture and reminds you to      ║
║  sit up straight.                                                ║
║                                                                  ║
║  ✓ WHAT WE PROCESS:                                              ║
║    • Positions of your nose, ears and shoulders                  ║
║    • How confident the detector is about those positions         ║
║                                                                  ║
║  ✗ WHAT WE NEVER DO:                                             ║
║    • Store or transmit camera images                             ║
║    • Identify you or anyone else in the frame                    ║
║    • Keep a history of your posture                              ║
║    • Send anything off this machine                              ║
║                                                                  ║
║  Each landmark sample is discarded as soon as it has been        ║
║  classified. Session counters are cleared when you stop.         ║
║                                                                  ║
║  You can view the current settings anytime with:                 ║
║    posture-guardian status                                       ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

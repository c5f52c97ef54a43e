//! Core functionality for the Posture Guardian agent.
//!
//! This module contains:
//! - Landmark geometry analysis and posture classification
//! - The sample gate filtering classified samples by confidence and rate
//! - The reminder escalation state machine
//! - Reminder message text

pub mod advice;
pub mod escalation;
pub mod gate;
pub mod geometry;

// Re-export commonly used types
pub use escalation::{
    EscalationMachine, EscalationPolicy, EscalationSession, PolicyStep, ReminderAction,
    ReminderLevel,
};
pub use gate::{GateDecision, SampleGate, MIN_CONFIDENCE};
pub use geometry::{analyze, ClassifierThresholds, PostureSample, PostureStatus};

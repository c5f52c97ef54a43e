//! Transparency module for the Posture Guardian agent.
//!
//! This module provides tools for tracking and exposing what the agent does
//! with camera-derived data, supporting user trust.

pub mod log;

// Re-export commonly used types
pub use log::{create_shared_log, SharedTransparencyLog, TransparencyLog, TransparencyStats};

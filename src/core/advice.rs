//! Reminder message text.

use crate::core::geometry::PostureStatus;

/// Title used for system notifications.
pub const NOTIFICATION_TITLE: &str = "Posture reminder";

/// Gentle popup text used outside silent mode.
pub fn gentle_advice(status: PostureStatus) -> &'static str {
    match status {
        PostureStatus::Warning => "Small adjustment: lift your head and relax your shoulders.",
        PostureStatus::Danger => "Please adjust your posture now to take the strain off your neck.",
        PostureStatus::Good => "Consider adjusting your posture.",
    }
}

/// Larger, more insistent popup text used in silent mode, where the popup is
/// the strongest reminder available.
pub fn enhanced_advice(status: PostureStatus) -> &'static str {
    match status {
        PostureStatus::Warning => {
            "Watch your posture!\nSit back and lift your chest.\nYou have been leaning for a while."
        }
        PostureStatus::Danger => {
            "Urgent reminder!\nCorrect your posture right away.\nProtect your neck and spine."
        }
        PostureStatus::Good => "Please mind your posture!",
    }
}

/// Body of the system notification sent alongside an audio reminder.
pub fn notification_message(status: PostureStatus) -> &'static str {
    match status {
        PostureStatus::Danger => "Please adjust your posture now to take the strain off your neck.",
        _ => "Consider adjusting your posture to stay healthy.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhanced_advice_differs_from_gentle() {
        for status in [PostureStatus::Warning, PostureStatus::Danger] {
            assert_ne!(gentle_advice(status), enhanced_advice(status));
            assert!(!notification_message(status).is_empty());
        }
    }
}

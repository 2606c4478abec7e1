//! Priority classification.
//!
//! [`classify`] is the only place a raw task priority becomes a
//! [`MessagePriority`]; lanes are derived from the class, never from the raw value.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{MAX_TASK_PRIORITY, MIN_TASK_PRIORITY, PRIORITY_LANES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Urgent = 3,
    Critical = 4,
}

impl MessagePriority {
    /// Classes from the most to the least urgent, in dequeue order
    pub const DESCENDING: [MessagePriority; PRIORITY_LANES] = [
        MessagePriority::Critical,
        MessagePriority::Urgent,
        MessagePriority::High,
        MessagePriority::Normal,
        MessagePriority::Low,
    ];

    /// Lane index in a route (0 = lowest)
    pub fn lane(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessagePriority::Low => "low",
            MessagePriority::Normal => "normal",
            MessagePriority::High => "high",
            MessagePriority::Urgent => "urgent",
            MessagePriority::Critical => "critical",
        }
    }
}

impl fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a task priority (1 = low .. 5 = critical) to its message class.
///
/// Out-of-range values clamp: 0 is `Low`, anything above 5 is `Critical`.
pub fn classify(priority: u8) -> MessagePriority {
    match priority.clamp(MIN_TASK_PRIORITY, MAX_TASK_PRIORITY) {
        1 => MessagePriority::Low,
        2 => MessagePriority::Normal,
        3 => MessagePriority::High,
        4 => MessagePriority::Urgent,
        _ => MessagePriority::Critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_maps_every_priority() {
        assert_eq!(classify(1), MessagePriority::Low);
        assert_eq!(classify(2), MessagePriority::Normal);
        assert_eq!(classify(3), MessagePriority::High);
        assert_eq!(classify(4), MessagePriority::Urgent);
        assert_eq!(classify(5), MessagePriority::Critical);
    }

    #[test]
    fn test_classify_clamps_out_of_range() {
        assert_eq!(classify(0), MessagePriority::Low);
        assert_eq!(classify(6), MessagePriority::Critical);
        assert_eq!(classify(u8::MAX), MessagePriority::Critical);
    }

    #[test]
    fn test_lanes_are_dense_and_ordered() {
        let lanes: Vec<usize> = MessagePriority::DESCENDING.iter().map(|p| p.lane()).collect();
        assert_eq!(lanes, vec![4, 3, 2, 1, 0]);
        assert!(MessagePriority::Critical > MessagePriority::Low);
    }
}

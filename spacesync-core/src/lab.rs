use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timeofday::{self, TimeRange};

/// A recurring slot during which a batch sits in a lab, leaving `room_id` free.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabWindow {
    pub id: String,
    pub batch: String,
    pub day: String,
    pub time: String,
    pub room_id: String,
    pub lab_location: String,
    pub updated_at: DateTime<Utc>,
}

impl LabWindow {
    pub fn window_id(batch: &str, day: &str, time: &str) -> String {
        format!("{}_{}_{}", batch, day, time)
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
            .collect()
    }

    pub fn is_on(&self, day: &str) -> bool {
        self.day.trim().eq_ignore_ascii_case(day.trim())
    }

    pub fn range(&self) -> Result<TimeRange, timeofday::TimeParseError> {
        TimeRange::parse(&self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_id_is_normalized() {
        assert_eq!(
            LabWindow::window_id("S4 CSE A", "Monday", "2:00 to 5:00"),
            "s4_cse_a_monday_2_00_to_5_00"
        );
    }

    #[test]
    fn test_day_match_ignores_case() {
        let window = LabWindow {
            id: "x".into(),
            batch: "C2A".into(),
            day: "Friday".into(),
            time: "12:30 to 15:30".into(),
            room_id: "LAB1".into(),
            lab_location: "CS Lab 2".into(),
            updated_at: Utc::now(),
        };
        assert!(window.is_on("friday"));
        assert!(!window.is_on("Monday"));
    }
}

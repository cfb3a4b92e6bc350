use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use spacesync_core::LabWindow;

/// One lab session as reported by the parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimetableEntry {
    pub batch: String,
    pub day: String,
    pub time: String,
    /// The classroom the batch leaves empty while in the lab.
    pub classroom: String,
    pub lab_location: String,
}

pub const REQUIRED_FIELDS: [&str; 5] = ["batch", "day", "time", "classroom", "lab_location"];

impl TimetableEntry {
    fn from_object(obj: &Map<String, Value>) -> Result<Self, String> {
        let field = |name: &str| -> Result<String, String> {
            match obj.get(name) {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
                Some(Value::String(_)) => Err(format!("field '{}' is blank", name)),
                Some(other) => Err(format!("field '{}' is not a string: {}", name, other)),
                None => Err(format!("field '{}' is missing", name)),
            }
        };

        Ok(Self {
            batch: field("batch")?,
            day: field("day")?,
            time: field("time")?,
            classroom: field("classroom")?,
            lab_location: field("lab_location")?,
        })
    }

    pub fn window_id(&self) -> String {
        LabWindow::window_id(&self.batch, &self.day, &self.time)
    }

    pub fn to_lab_window(&self, now: DateTime<Utc>) -> LabWindow {
        LabWindow {
            id: self.window_id(),
            batch: self.batch.clone(),
            day: self.day.clone(),
            time: self.time.clone(),
            room_id: self.classroom.clone(),
            lab_location: self.lab_location.clone(),
            updated_at: now,
        }
    }
}

/// Keeps the entries that satisfy the schema. Anything else is logged and dropped.
pub fn validate_entries(raw: &[Value]) -> Vec<TimetableEntry> {
    raw.iter()
        .enumerate()
        .filter_map(|(i, value)| {
            let parsed = match value {
                Value::Object(obj) => TimetableEntry::from_object(obj),
                other => Err(format!("expected an object, got {}", other)),
            };
            match parsed {
                Ok(entry) => Some(entry),
                Err(reason) => {
                    warn!("Skipping timetable entry {}: {}", i, reason);
                    None
                }
            }
        })
        .collect()
}

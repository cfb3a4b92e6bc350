use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Available,
    Occupied,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Occupied => "occupied",
        }
    }

    /// Rooms seeded before status tracking carry no status at all; those read as available.
    pub fn from_stored(value: Option<&str>) -> Result<Self, String> {
        match value {
            None => Ok(RoomStatus::Available),
            Some(s) => s.parse(),
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(RoomStatus::Available),
            "occupied" => Ok(RoomStatus::Occupied),
            other => Err(format!("unknown room status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: Uuid,
    pub room_id: String,
    #[serde(default)]
    pub status: RoomStatus,
    pub current_booking_id: Option<Uuid>,
    #[serde(default)]
    pub synced_from_timetable: bool,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id: room_id.into(),
            status: RoomStatus::Available,
            current_booking_id: None,
            synced_from_timetable: false,
            created_at: Utc::now(),
        }
    }

    pub fn from_timetable(room_id: impl Into<String>) -> Self {
        Self {
            synced_from_timetable: true,
            ..Self::new(room_id)
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == RoomStatus::Available
    }

    pub fn is_held_by(&self, booking_id: Uuid) -> bool {
        self.current_booking_id == Some(booking_id)
    }

    pub fn occupy(&mut self, booking_id: Uuid) {
        self.status = RoomStatus::Occupied;
        self.current_booking_id = Some(booking_id);
    }

    pub fn release(&mut self) {
        self.status = RoomStatus::Available;
        self.current_booking_id = None;
    }
}

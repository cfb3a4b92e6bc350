use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::identity::Role;

pub const DEFAULT_DURATION_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Active,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Active)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BookingStatus::Active),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "expired" => Ok(BookingStatus::Expired),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// Who ended a booking early, and why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cancellation {
    pub cancelled_by: String,
    pub cancelled_at: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    /// Business key of the room, not its storage id.
    pub room_id: String,
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_role: Role,
    pub purpose: Option<String>,
    pub start_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: BookingStatus,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancellation_note: Option<String>,
}

impl Booking {
    pub fn new_active(
        room_id: &str,
        user_id: &str,
        user_email: Option<String>,
        user_role: Role,
        purpose: Option<String>,
        now: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            user_email,
            user_role,
            purpose,
            start_time: now,
            expires_at: now + Duration::minutes(duration_minutes),
            status: BookingStatus::Active,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_note: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at <= now
    }

    /// Active and inside its `[start_time, expires_at]` window at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.start_time <= now && now <= self.expires_at
    }

    pub fn apply_finish(&mut self, status: BookingStatus, cancellation: Option<&Cancellation>) {
        self.status = status;
        if let Some(c) = cancellation {
            self.cancelled_at = Some(c.cancelled_at);
            self.cancelled_by = Some(c.cancelled_by.clone());
            self.cancellation_note = c.note.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking_at(now: DateTime<Utc>, minutes: i64) -> Booking {
        Booking::new_active("B201", "user-1", None, Role::ClubLead, None, now, minutes)
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let booking = booking_at(now, 30);

        assert!(!booking.is_expired_at(now + Duration::minutes(30) - Duration::milliseconds(1)));
        assert!(booking.is_expired_at(now + Duration::minutes(30)));
    }

    #[test]
    fn test_live_window_is_inclusive() {
        let now = Utc::now();
        let booking = booking_at(now, 30);

        assert!(booking.is_live_at(now));
        assert!(booking.is_live_at(booking.expires_at));
        assert!(!booking.is_live_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_finish_records_cancellation() {
        let now = Utc::now();
        let mut booking = booking_at(now, 30);
        let cancellation = Cancellation {
            cancelled_by: "admin-1".to_string(),
            cancelled_at: now,
            note: Some("projector broken".to_string()),
        };

        booking.apply_finish(BookingStatus::Cancelled, Some(&cancellation));

        assert!(booking.status.is_terminal());
        assert_eq!(booking.cancelled_by.as_deref(), Some("admin-1"));
        assert_eq!(booking.cancellation_note.as_deref(), Some("projector broken"));
    }
}

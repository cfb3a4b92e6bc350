use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use spacesync_core::booking::DEFAULT_DURATION_MINUTES;
use spacesync_core::pii::Masked;
use spacesync_core::{Booking, CoreError, CoreResult, Role, Store, StoreError};

#[derive(Debug, Clone)]
pub struct BookingRequest {
    /// Business key of the room.
    pub room_id: String,
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_role: Role,
    pub duration_minutes: Option<i64>,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct BookingLimits {
    pub default_duration_minutes: i64,
    pub max_duration_minutes: i64,
}

impl Default for BookingLimits {
    fn default() -> Self {
        Self {
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
            max_duration_minutes: 480,
        }
    }
}

/// Occupies a room and records the booking in one transaction.
pub struct BookingTransactor {
    store: Arc<dyn Store>,
    limits: BookingLimits,
}

impl BookingTransactor {
    pub fn new(store: Arc<dyn Store>, limits: BookingLimits) -> Self {
        Self { store, limits }
    }

    pub async fn book(&self, req: BookingRequest) -> CoreResult<Booking> {
        self.book_at(req, Utc::now()).await
    }

    pub async fn book_at(&self, req: BookingRequest, now: DateTime<Utc>) -> CoreResult<Booking> {
        let room_id = req.room_id.trim();
        let user_id = req.user_id.trim();
        if room_id.is_empty() || user_id.is_empty() {
            return Err(CoreError::Validation("roomId and userId are required".to_string()));
        }
        let duration = self.duration(req.duration_minutes)?;

        let occupied = |err: StoreError| match err {
            StoreError::Conflict(_) => CoreError::RoomOccupied(room_id.to_string()),
            other => other.into(),
        };

        let mut tx = self.store.begin().await?;

        let room = tx
            .room_for_update(room_id)
            .await?
            .ok_or_else(|| CoreError::RoomNotFound(room_id.to_string()))?;

        if !room.is_available() {
            debug!("Room {} held by {:?}, rejecting booking", room_id, room.current_booking_id);
            return Err(CoreError::RoomOccupied(room_id.to_string()));
        }

        let booking = Booking::new_active(
            &room.room_id,
            user_id,
            req.user_email,
            req.user_role,
            req.purpose.filter(|p| !p.trim().is_empty()),
            now,
            duration,
        );

        tx.insert_booking(&booking).await.map_err(occupied)?;
        tx.occupy_room(&room.room_id, booking.id).await?;
        tx.commit().await.map_err(occupied)?;

        if let Some(email) = booking.user_email.as_deref() {
            info!(
                "Booking {} confirmed: room {} for {} until {}",
                booking.id, booking.room_id, Masked(email), booking.expires_at
            );
        } else {
            info!("Booking {} confirmed: room {} until {}", booking.id, booking.room_id, booking.expires_at);
        }

        Ok(booking)
    }

    fn duration(&self, requested: Option<i64>) -> CoreResult<i64> {
        let minutes = requested.unwrap_or(self.limits.default_duration_minutes);
        if minutes < 1 || minutes > self.limits.max_duration_minutes {
            return Err(CoreError::Validation(format!(
                "duration must be between 1 and {} minutes",
                self.limits.max_duration_minutes
            )));
        }
        Ok(minutes)
    }
}

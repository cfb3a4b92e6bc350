use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use spacesync_core::{
    Booking, BookingStatus, Cancellation, CoreError, CoreResult, Requester, Role, Store,
};

#[derive(Debug, Clone, Serialize)]
pub struct MarkFreeOutcome {
    pub room_id: String,
    /// False when the room was already free.
    pub was_occupied: bool,
    pub cancelled_booking: Option<Uuid>,
}

/// Ends bookings early: owner/admin cancellation and rep/admin "mark free".
pub struct BookingCanceller {
    store: Arc<dyn Store>,
}

impl BookingCanceller {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn cancel(&self, booking_id: Uuid, requester: &Requester) -> CoreResult<Booking> {
        self.cancel_at(booking_id, requester, Utc::now()).await
    }

    pub async fn cancel_at(
        &self,
        booking_id: Uuid,
        requester: &Requester,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        // The room row is locked before the booking row, so look the room up first
        let room_id = self
            .store
            .get_booking(booking_id)
            .await?
            .map(|b| b.room_id)
            .ok_or_else(|| CoreError::BookingNotFound(booking_id.to_string()))?;

        let mut tx = self.store.begin().await?;
        let room = tx.room_for_update(&room_id).await?;

        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or_else(|| CoreError::BookingNotFound(booking_id.to_string()))?;

        if booking.user_id != requester.uid && !requester.is_admin() {
            return Err(CoreError::Forbidden(
                "You can only cancel your own bookings".to_string(),
            ));
        }
        if !booking.is_active() {
            return Err(CoreError::InvalidState(format!(
                "booking {} is {}",
                booking.id,
                booking.status.as_str()
            )));
        }

        let cancellation = Cancellation {
            cancelled_by: requester.uid.clone(),
            cancelled_at: now,
            note: None,
        };
        tx.finish_booking(booking.id, BookingStatus::Cancelled, Some(&cancellation))
            .await?;

        match room {
            Some(_) => {
                if !tx.release_room(&booking.room_id, Some(booking.id)).await? {
                    debug!("Room {} no longer held by booking {}", booking.room_id, booking.id);
                }
            }
            None => warn!("Booking {} points at missing room {}", booking.id, booking.room_id),
        }

        tx.commit().await?;

        booking.apply_finish(BookingStatus::Cancelled, Some(&cancellation));
        info!("Booking {} cancelled by {}", booking.id, requester.uid);
        Ok(booking)
    }

    /// Frees a room regardless of who booked it, cancelling the booking that held it.
    pub async fn mark_free(
        &self,
        room_id: &str,
        requester: &Requester,
        notes: Option<String>,
    ) -> CoreResult<MarkFreeOutcome> {
        self.mark_free_at(room_id, requester, notes, Utc::now()).await
    }

    pub async fn mark_free_at(
        &self,
        room_id: &str,
        requester: &Requester,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<MarkFreeOutcome> {
        if !requester.has_role(&[Role::VerifiedRep, Role::Admin]) {
            return Err(CoreError::Forbidden(
                "Only verified reps and admins can mark rooms free".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;

        let room = tx
            .room_for_update(room_id)
            .await?
            .ok_or_else(|| CoreError::RoomNotFound(room_id.to_string()))?;

        let mut cancelled_booking = None;
        if let Some(booking_id) = room.current_booking_id {
            let cancellation = Cancellation {
                cancelled_by: requester.uid.clone(),
                cancelled_at: now,
                note: notes.filter(|n| !n.trim().is_empty()),
            };
            if tx
                .finish_booking(booking_id, BookingStatus::Cancelled, Some(&cancellation))
                .await?
            {
                cancelled_booking = Some(booking_id);
            }
        }

        let was_occupied = tx.release_room(&room.room_id, None).await?;
        if was_occupied {
            tx.commit().await?;
            info!(
                "Room {} marked free by {} (cancelled booking {:?})",
                room.room_id, requester.uid, cancelled_booking
            );
        } else {
            debug!("Room {} already free", room.room_id);
        }

        Ok(MarkFreeOutcome {
            room_id: room.room_id,
            was_occupied,
            cancelled_booking,
        })
    }
}

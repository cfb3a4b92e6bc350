use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use spacesync_core::{Booking, BookingStatus, CoreResult, Store, StoreResult, StoreTransaction};

/// Moves overdue active bookings to `expired` and frees the rooms they hold.
pub struct ExpirySweeper {
    store: Arc<dyn Store>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn sweep(&self) -> CoreResult<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// Returns the number of bookings expired by this pass. A booking that
    /// fails is rolled back on its own and left for the next pass.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let mut overdue = self.store.list_expired_bookings(now).await?;
        if overdue.is_empty() {
            return Ok(0);
        }
        // Same lock order as every other writer: rooms ascending, each before its booking
        overdue.sort_by(|a, b| a.room_id.cmp(&b.room_id).then(a.id.cmp(&b.id)));

        let mut tx = self.store.begin().await?;
        let mut expired = 0;
        let mut failed = 0;

        for booking in &overdue {
            tx.savepoint().await?;
            match expire_one(tx.as_mut(), booking).await {
                Ok(true) => expired += 1,
                // Cancelled between the scan and the lock
                Ok(false) => debug!("Booking {} already finished, skipping", booking.id),
                Err(e) => {
                    failed += 1;
                    warn!("Failed to expire booking {}: {}", booking.id, e);
                    tx.rollback_to_savepoint().await?;
                }
            }
        }

        tx.commit().await?;

        if expired > 0 || failed > 0 {
            info!("Expired {} booking(s), {} failed", expired, failed);
        }
        Ok(expired)
    }
}

async fn expire_one(tx: &mut dyn StoreTransaction, booking: &Booking) -> StoreResult<bool> {
    let room = tx.room_for_update(&booking.room_id).await?;
    if !tx.finish_booking(booking.id, BookingStatus::Expired, None).await? {
        return Ok(false);
    }

    match room {
        Some(_) => {
            tx.release_room(&booking.room_id, Some(booking.id)).await?;
        }
        None => warn!(
            "Expired booking {} references missing room {}",
            booking.id, booking.room_id
        ),
    }
    Ok(true)
}

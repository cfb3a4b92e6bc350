use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

use spacesync_core::timeofday;
use spacesync_core::{CoreError, CoreResult, Room, Store};

/// Answers "which rooms are empty at this day and time" from the lab schedule.
///
/// A room is free when some batch is away in a lab at that moment and nobody
/// holds a live booking on it.
pub struct FreeRoomFinder {
    store: Arc<dyn Store>,
}

impl FreeRoomFinder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn find_free(&self, day: &str, time: &str) -> CoreResult<Vec<Room>> {
        self.find_free_at(day, time, Utc::now()).await
    }

    pub async fn find_free_at(&self, day: &str, time: &str, now: DateTime<Utc>) -> CoreResult<Vec<Room>> {
        if day.trim().is_empty() || time.trim().is_empty() {
            return Err(CoreError::Validation("day and time are required".to_string()));
        }
        let minutes = timeofday::to_minutes(time)
            .map_err(|e| CoreError::Validation(format!("invalid time '{}': {}", time, e)))?;

        let windows = self.store.list_lab_windows().await?;
        let mut candidates = BTreeSet::new();
        for window in windows.iter().filter(|w| w.is_on(day)) {
            match window.range() {
                Ok(range) if range.contains(minutes) => {
                    candidates.insert(window.room_id.trim().to_string());
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping lab window {} ({}): {}", window.id, window.time, e),
            }
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let booked: HashSet<String> = self
            .store
            .list_active_bookings()
            .await?
            .into_iter()
            .filter(|b| b.is_live_at(now))
            .map(|b| b.room_id)
            .collect();

        let rooms = self.store.list_rooms().await?;
        Ok(rooms
            .into_iter()
            .filter(|r| candidates.contains(&r.room_id) && !booked.contains(&r.room_id))
            .collect())
    }
}

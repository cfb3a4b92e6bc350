use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::info;

use spacesync_core::{CoreError, CoreResult, Room, Store, StoreError};

const DEMO_ROOMS: [&str; 3] = ["LH-301", "LH-304", "B201"];

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncStats {
    pub total_rooms_found: usize,
    pub new_rooms_created: usize,
    pub existing_rooms: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    pub stats: SyncStats,
    pub new_rooms: Vec<String>,
    pub existing_rooms: Vec<String>,
}

impl SyncReport {
    fn nothing_found(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            stats: SyncStats::default(),
            new_rooms: Vec::new(),
            existing_rooms: Vec::new(),
        }
    }
}

/// Rooms are created here and never deleted.
pub struct RoomRegistry {
    store: Arc<dyn Store>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_room(&self, room_id: &str) -> CoreResult<Room> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(CoreError::Validation("room_id is required".to_string()));
        }

        let room = Room::new(room_id);
        match self.store.insert_rooms(std::slice::from_ref(&room)).await {
            Ok(()) => {
                info!("Room {} created", room.room_id);
                Ok(room)
            }
            Err(StoreError::Conflict(_)) => Err(CoreError::AlreadyExists(room_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates the demo rooms that do not exist yet. Returns the ones created.
    pub async fn seed_rooms(&self) -> CoreResult<Vec<Room>> {
        let existing = self.existing_ids().await?;
        let rooms: Vec<Room> = DEMO_ROOMS
            .iter()
            .filter(|id| !existing.contains(**id))
            .map(|id| Room::new(*id))
            .collect();

        if !rooms.is_empty() {
            self.store.insert_rooms(&rooms).await?;
        }
        info!("Seeded {} room(s)", rooms.len());
        Ok(rooms)
    }

    /// Creates a room for every classroom the lab schedule mentions.
    pub async fn sync_from_lab_windows(&self) -> CoreResult<SyncReport> {
        let windows = self.store.list_lab_windows().await?;
        if windows.is_empty() {
            return Ok(SyncReport::nothing_found("No timetable data found"));
        }

        let found: BTreeSet<String> = windows
            .iter()
            .map(|w| w.room_id.trim())
            .filter(|id| !id.is_empty() && !id.to_lowercase().contains("lab"))
            .map(str::to_string)
            .collect();

        if found.is_empty() {
            return Ok(SyncReport::nothing_found(
                "No rooms found in timetable data. Only labs were detected.",
            ));
        }

        let existing = self.existing_ids().await?;
        let (existing_rooms, new_rooms): (Vec<String>, Vec<String>) =
            found.iter().cloned().partition(|id| existing.contains(id));

        if !new_rooms.is_empty() {
            let rooms: Vec<Room> = new_rooms.iter().map(Room::from_timetable).collect();
            self.store.insert_rooms(&rooms).await?;
        }
        info!(
            "Room sync: {} found, {} created, {} existing",
            found.len(),
            new_rooms.len(),
            existing_rooms.len()
        );

        Ok(SyncReport {
            success: true,
            message: "Rooms synced successfully from timetable".to_string(),
            stats: SyncStats {
                total_rooms_found: found.len(),
                new_rooms_created: new_rooms.len(),
                existing_rooms: existing_rooms.len(),
            },
            new_rooms,
            existing_rooms,
        })
    }

    async fn existing_ids(&self) -> CoreResult<HashSet<String>> {
        Ok(self
            .store
            .list_rooms()
            .await?
            .into_iter()
            .map(|r| r.room_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spacesync_core::repository::{LabWindowRepository, RoomRepository};
    use spacesync_core::LabWindow;
    use spacesync_store::MemoryStore;

    fn window(batch: &str, room_id: &str) -> LabWindow {
        LabWindow {
            id: LabWindow::window_id(batch, "Monday", "9:30 to 11:30"),
            batch: batch.to_string(),
            day: "Monday".to_string(),
            time: "9:30 to 11:30".to_string(),
            room_id: room_id.to_string(),
            lab_location: "CCF Lab".to_string(),
            updated_at: Utc::now(),
        }
    }

    fn registry() -> (MemoryStore, RoomRegistry) {
        let store = MemoryStore::new();
        let registry = RoomRegistry::new(Arc::new(store.clone()));
        (store, registry)
    }

    #[tokio::test]
    async fn test_create_room_rejects_duplicates_and_blanks() {
        let (_store, registry) = registry();

        let room = registry.create_room(" B201 ").await.unwrap();
        assert_eq!(room.room_id, "B201");
        assert!(room.is_available());

        let err = registry.create_room("B201").await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists(_)));
        let err = registry.create_room("   ").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_seed_skips_existing_rooms() {
        let (store, registry) = registry();
        registry.create_room("B201").await.unwrap();

        let seeded = registry.seed_rooms().await.unwrap();
        let ids: Vec<&str> = seeded.iter().map(|r| r.room_id.as_str()).collect();
        assert_eq!(ids, vec!["LH-301", "LH-304"]);

        assert!(registry.seed_rooms().await.unwrap().is_empty());
        assert_eq!(store.list_rooms().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sync_creates_missing_classrooms_only() {
        let (store, registry) = registry();
        registry.create_room("B201").await.unwrap();
        store
            .upsert_lab_windows(&[
                window("C2A", "B201"),
                window("C2B", " B202 "),
                window("C2C", "ITLAB"),
                window("C2D", "Physics Lab"),
                window("C2E", ""),
            ])
            .await
            .unwrap();

        let report = registry.sync_from_lab_windows().await.unwrap();

        assert!(report.success);
        assert_eq!(
            report.stats,
            SyncStats { total_rooms_found: 2, new_rooms_created: 1, existing_rooms: 1 }
        );
        assert_eq!(report.new_rooms, vec!["B202".to_string()]);
        assert_eq!(report.existing_rooms, vec!["B201".to_string()]);

        let synced = store.find_room("B202").await.unwrap().unwrap();
        assert!(synced.synced_from_timetable);
        assert!(synced.is_available());
    }

    #[tokio::test]
    async fn test_sync_without_usable_windows_reports_failure() {
        let (store, registry) = registry();

        let report = registry.sync_from_lab_windows().await.unwrap();
        assert!(!report.success);
        assert_eq!(report.message, "No timetable data found");

        store.upsert_lab_windows(&[window("C2C", "ITLAB")]).await.unwrap();
        let report = registry.sync_from_lab_windows().await.unwrap();
        assert!(!report.success);
        assert_eq!(report.stats, SyncStats::default());
    }
}

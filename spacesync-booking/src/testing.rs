use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use spacesync_core::repository::{
    BookingRepository, LabWindowRepository, ProfileRepository, RoomRepository,
};
use spacesync_core::{
    Booking, BookingStatus, Cancellation, LabWindow, Requester, Role, Room, Store, StoreError,
    StoreResult, StoreTransaction, UserProfile,
};
use spacesync_store::MemoryStore;

use crate::transactor::BookingRequest;

pub(crate) async fn store_with_rooms(ids: &[&str]) -> (MemoryStore, Arc<dyn Store>) {
    let store = MemoryStore::new();
    let rooms: Vec<Room> = ids.iter().map(|id| Room::new(*id)).collect();
    store.insert_rooms(&rooms).await.unwrap();
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    (store, shared)
}

pub(crate) fn request(room_id: &str, user_id: &str) -> BookingRequest {
    BookingRequest {
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
        user_email: Some(format!("{}@campus.edu", user_id)),
        user_role: Role::ClubLead,
        duration_minutes: None,
        purpose: Some("club meeting".to_string()),
    }
}

pub(crate) fn requester(uid: &str, role: Role) -> Requester {
    Requester {
        uid: uid.to_string(),
        email: None,
        role,
        batch: None,
    }
}

/// occupied <=> current_booking_id names an active booking for the same room,
/// and no room has more than one active booking.
pub(crate) async fn assert_consistent(store: &MemoryStore) {
    let rooms = store.list_rooms().await.unwrap();
    let bookings = store.list_bookings().await.unwrap();

    let mut active_per_room: HashMap<&str, usize> = HashMap::new();
    for b in bookings.iter().filter(|b| b.is_active()) {
        *active_per_room.entry(b.room_id.as_str()).or_default() += 1;
    }
    for (room_id, count) in &active_per_room {
        assert!(*count <= 1, "room {} has {} active bookings", room_id, count);
    }

    for room in &rooms {
        let held = room
            .current_booking_id
            .and_then(|id| bookings.iter().find(|b| b.id == id))
            .filter(|b| b.is_active() && b.room_id == room.room_id);
        assert_eq!(
            !room.is_available(),
            held.is_some(),
            "room {} status {:?} vs booking {:?}",
            room.room_id,
            room.status,
            room.current_booking_id
        );
        if room.is_available() {
            assert_eq!(room.current_booking_id, None, "free room {} still points at a booking", room.room_id);
        }
    }
}

/// Wraps a [`MemoryStore`], records the rows each transaction touches in
/// order (`room:<key>` / `booking:<id>`) and can fail `finish_booking` for
/// one booking id.
#[derive(Clone)]
pub(crate) struct RecordingStore {
    inner: MemoryStore,
    fail_on: Option<Uuid>,
    touched: Arc<Mutex<Vec<String>>>,
}

impl RecordingStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_on: None,
            touched: Arc::default(),
        }
    }

    pub(crate) fn failing_on(mut self, booking_id: Uuid) -> Self {
        self.fail_on = Some(booking_id);
        self
    }

    pub(crate) fn touched(&self) -> Vec<String> {
        self.touched.lock().unwrap().clone()
    }
}

/// Every booking row is touched after its room row, and rooms are touched in
/// ascending key order.
pub(crate) fn assert_lock_order(touched: &[String], booking_rooms: &HashMap<String, String>) {
    let mut last_room: Option<&str> = None;
    for (i, entry) in touched.iter().enumerate() {
        if let Some(room) = entry.strip_prefix("room:") {
            if let Some(prev) = last_room {
                assert!(prev <= room, "room {} locked after {} in {:?}", room, prev, touched);
            }
            last_room = Some(room);
        } else if let Some(booking) = entry.strip_prefix("booking:") {
            let room = &booking_rooms[booking];
            let room_entry = format!("room:{}", room);
            assert!(
                touched[..i].contains(&room_entry),
                "booking {} touched before room {} in {:?}",
                booking,
                room,
                touched
            );
        }
    }
}

#[async_trait]
impl RoomRepository for RecordingStore {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        self.inner.list_rooms().await
    }

    async fn get_room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        self.inner.get_room(id).await
    }

    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        self.inner.find_room(room_id).await
    }

    async fn insert_rooms(&self, rooms: &[Room]) -> StoreResult<()> {
        self.inner.insert_rooms(rooms).await
    }
}

#[async_trait]
impl BookingRepository for RecordingStore {
    async fn list_bookings(&self) -> StoreResult<Vec<Booking>> {
        self.inner.list_bookings().await
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        self.inner.list_bookings_for_user(user_id).await
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.inner.get_booking(id).await
    }

    async fn list_active_bookings(&self) -> StoreResult<Vec<Booking>> {
        self.inner.list_active_bookings().await
    }

    async fn list_expired_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        self.inner.list_expired_bookings(now).await
    }
}

#[async_trait]
impl LabWindowRepository for RecordingStore {
    async fn list_lab_windows(&self) -> StoreResult<Vec<LabWindow>> {
        self.inner.list_lab_windows().await
    }

    async fn upsert_lab_windows(&self, windows: &[LabWindow]) -> StoreResult<()> {
        self.inner.upsert_lab_windows(windows).await
    }
}

#[async_trait]
impl ProfileRepository for RecordingStore {
    async fn get_profile(&self, uid: &str) -> StoreResult<Option<UserProfile>> {
        self.inner.get_profile(uid).await
    }

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<UserProfile>> {
        self.inner.find_profile_by_email(email).await
    }

    async fn list_profiles(&self) -> StoreResult<Vec<UserProfile>> {
        self.inner.list_profiles().await
    }

    async fn save_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        self.inner.save_profile(profile).await
    }

    async fn touch_last_login(&self, uid: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.inner.touch_last_login(uid, at).await
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(RecordingTransaction {
            inner: self.inner.begin().await?,
            fail_on: self.fail_on,
            touched: self.touched.clone(),
        }))
    }
}

struct RecordingTransaction {
    inner: Box<dyn StoreTransaction>,
    fail_on: Option<Uuid>,
    touched: Arc<Mutex<Vec<String>>>,
}

impl RecordingTransaction {
    fn touch(&self, entry: String) {
        self.touched.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl StoreTransaction for RecordingTransaction {
    async fn savepoint(&mut self) -> StoreResult<()> {
        self.inner.savepoint().await
    }

    async fn rollback_to_savepoint(&mut self) -> StoreResult<()> {
        self.inner.rollback_to_savepoint().await
    }

    async fn room_for_update(&mut self, room_id: &str) -> StoreResult<Option<Room>> {
        self.touch(format!("room:{}", room_id));
        self.inner.room_for_update(room_id).await
    }

    async fn booking_for_update(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.touch(format!("booking:{}", id));
        self.inner.booking_for_update(id).await
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.touch(format!("booking:{}", booking.id));
        self.inner.insert_booking(booking).await
    }

    async fn occupy_room(&mut self, room_id: &str, booking_id: Uuid) -> StoreResult<()> {
        self.touch(format!("room:{}", room_id));
        self.inner.occupy_room(room_id, booking_id).await
    }

    async fn release_room(&mut self, room_id: &str, held_by: Option<Uuid>) -> StoreResult<bool> {
        self.touch(format!("room:{}", room_id));
        self.inner.release_room(room_id, held_by).await
    }

    async fn finish_booking(
        &mut self,
        id: Uuid,
        status: BookingStatus,
        cancellation: Option<&Cancellation>,
    ) -> StoreResult<bool> {
        self.touch(format!("booking:{}", id));
        if self.fail_on == Some(id) {
            return Err(StoreError::Backend(format!("write to booking {} failed", id)));
        }
        self.inner.finish_booking(id, status, cancellation).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }
}

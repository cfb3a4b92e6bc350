use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use spacesync_core::repository::{
    BookingRepository, LabWindowRepository, ProfileRepository, RoomRepository, Store, StoreError,
    StoreResult, StoreTransaction,
};
use spacesync_core::{Booking, BookingStatus, Cancellation, LabWindow, Room, UserProfile};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Keyed by business key.
    rooms: BTreeMap<String, Room>,
    bookings: HashMap<Uuid, Booking>,
    lab_windows: BTreeMap<String, LabWindow>,
    profiles: HashMap<String, UserProfile>,
}

impl MemoryState {
    fn has_other_active_booking(&self, booking: &Booking) -> bool {
        self.bookings
            .values()
            .any(|b| b.id != booking.id && b.room_id == booking.room_id && b.is_active())
    }
}

/// Process-local store. Transactions run one at a time against a private copy
/// of the state, which replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed write batches so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn sorted_bookings<'a>(iter: impl Iterator<Item = &'a Booking>) -> Vec<Booking> {
    let mut bookings: Vec<Booking> = iter.cloned().collect();
    bookings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    bookings
}

#[async_trait]
impl RoomRepository for MemoryStore {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        Ok(self.state.lock().await.rooms.values().cloned().collect())
    }

    async fn get_room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        Ok(self.state.lock().await.rooms.values().find(|r| r.id == id).cloned())
    }

    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        Ok(self.state.lock().await.rooms.get(room_id).cloned())
    }

    async fn insert_rooms(&self, rooms: &[Room]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for (i, room) in rooms.iter().enumerate() {
            let repeated = rooms[..i].iter().any(|r| r.room_id == room.room_id);
            if repeated || state.rooms.contains_key(&room.room_id) {
                return Err(StoreError::Conflict(format!("duplicate room_id {}", room.room_id)));
            }
        }
        for room in rooms {
            state.rooms.insert(room.room_id.clone(), room.clone());
        }
        self.record_write();
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn list_bookings(&self) -> StoreResult<Vec<Booking>> {
        Ok(sorted_bookings(self.state.lock().await.bookings.values()))
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(sorted_bookings(state.bookings.values().filter(|b| b.user_id == user_id)))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn list_active_bookings(&self) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(sorted_bookings(state.bookings.values().filter(|b| b.is_active())))
    }

    async fn list_expired_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(sorted_bookings(state.bookings.values().filter(|b| b.is_expired_at(now))))
    }
}

#[async_trait]
impl LabWindowRepository for MemoryStore {
    async fn list_lab_windows(&self) -> StoreResult<Vec<LabWindow>> {
        Ok(self.state.lock().await.lab_windows.values().cloned().collect())
    }

    async fn upsert_lab_windows(&self, windows: &[LabWindow]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for w in windows {
            state.lab_windows.insert(w.id.clone(), w.clone());
        }
        self.record_write();
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn get_profile(&self, uid: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.state.lock().await.profiles.get(uid).cloned())
    }

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<UserProfile>> {
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .values()
            .find(|p| p.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .cloned())
    }

    async fn list_profiles(&self) -> StoreResult<Vec<UserProfile>> {
        let state = self.state.lock().await;
        let mut profiles: Vec<UserProfile> = state.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(profiles)
    }

    async fn save_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.profiles.insert(profile.uid.clone(), profile.clone());
        self.record_write();
        Ok(())
    }

    async fn touch_last_login(&self, uid: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(profile) = state.profiles.get_mut(uid) {
            profile.last_login = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            savepoint: None,
            writes: self.writes.clone(),
        }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    savepoint: Option<MemoryState>,
    writes: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn savepoint(&mut self) -> StoreResult<()> {
        self.savepoint = Some(self.working.clone());
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> StoreResult<()> {
        let saved = self
            .savepoint
            .clone()
            .ok_or_else(|| StoreError::Backend("no savepoint to roll back to".to_string()))?;
        self.working = saved;
        Ok(())
    }

    async fn room_for_update(&mut self, room_id: &str) -> StoreResult<Option<Room>> {
        Ok(self.working.rooms.get(room_id).cloned())
    }

    async fn booking_for_update(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.working.bookings.get(&id).cloned())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        if self.working.bookings.contains_key(&booking.id) {
            return Err(StoreError::Conflict(format!("booking {} exists", booking.id)));
        }
        if booking.is_active() && self.working.has_other_active_booking(booking) {
            return Err(StoreError::Conflict(format!(
                "room {} already has an active booking",
                booking.room_id
            )));
        }
        self.working.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn occupy_room(&mut self, room_id: &str, booking_id: Uuid) -> StoreResult<()> {
        if let Some(room) = self.working.rooms.get_mut(room_id) {
            room.occupy(booking_id);
        }
        Ok(())
    }

    async fn release_room(&mut self, room_id: &str, held_by: Option<Uuid>) -> StoreResult<bool> {
        let Some(room) = self.working.rooms.get_mut(room_id) else {
            return Ok(false);
        };
        let matches = match held_by {
            Some(booking_id) => room.is_held_by(booking_id),
            None => !room.is_available() || room.current_booking_id.is_some(),
        };
        if matches {
            room.release();
        }
        Ok(matches)
    }

    async fn finish_booking(
        &mut self,
        id: Uuid,
        status: BookingStatus,
        cancellation: Option<&Cancellation>,
    ) -> StoreResult<bool> {
        match self.working.bookings.get_mut(&id) {
            Some(booking) if booking.is_active() => {
                booking.apply_finish(status, cancellation);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working, writes, .. } = *self;
        *guard = working;
        writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

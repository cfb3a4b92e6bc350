use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, Cancellation};
use crate::identity::UserProfile;
use crate::lab::LabWindow;
use crate::room::Room;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    /// A write lost against a concurrent one (unique index, serialization failure).
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository trait for room records
#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;

    async fn get_room(&self, id: Uuid) -> StoreResult<Option<Room>>;

    /// Lookup by business key.
    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>>;

    /// Inserts all rooms in one batch; a duplicate business key fails the whole batch.
    async fn insert_rooms(&self, rooms: &[Room]) -> StoreResult<()>;
}

/// Repository trait for booking reads. Writes go through [`StoreTransaction`].
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn list_bookings(&self) -> StoreResult<Vec<Booking>>;

    async fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn list_active_bookings(&self) -> StoreResult<Vec<Booking>>;

    /// Active bookings with `expires_at <= now`.
    async fn list_expired_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;
}

#[async_trait]
pub trait LabWindowRepository: Send + Sync {
    async fn list_lab_windows(&self) -> StoreResult<Vec<LabWindow>>;

    /// Insert-or-replace by window id, in one batch.
    async fn upsert_lab_windows(&self, windows: &[LabWindow]) -> StoreResult<()>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, uid: &str) -> StoreResult<Option<UserProfile>>;

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<UserProfile>>;

    async fn list_profiles(&self) -> StoreResult<Vec<UserProfile>>;

    async fn save_profile(&self, profile: &UserProfile) -> StoreResult<()>;

    async fn touch_last_login(&self, uid: &str, at: DateTime<Utc>) -> StoreResult<()>;
}

/// The full storage collaborator: plain reads plus atomic multi-record transactions.
#[async_trait]
pub trait Store: RoomRepository + BookingRepository + LabWindowRepository + ProfileRepository {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// An open read-modify-write transaction over rooms and bookings.
///
/// Reads take the records they return out of reach of concurrent transactions
/// until commit. Dropping the transaction without committing discards every write.
///
/// Callers lock a room before any booking that references it, and several
/// rooms in ascending `room_id` order.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Marks a point that [`rollback_to_savepoint`](Self::rollback_to_savepoint)
    /// can return to. A new savepoint replaces the previous one.
    async fn savepoint(&mut self) -> StoreResult<()>;

    /// Discards every write since the last savepoint, keeping the transaction usable.
    async fn rollback_to_savepoint(&mut self) -> StoreResult<()>;

    async fn room_for_update(&mut self, room_id: &str) -> StoreResult<Option<Room>>;

    async fn booking_for_update(&mut self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn occupy_room(&mut self, room_id: &str, booking_id: Uuid) -> StoreResult<()>;

    /// Frees the room. With `held_by`, only when the room still points at that
    /// booking. Returns whether a row changed; freeing a free room is not an error.
    async fn release_room(&mut self, room_id: &str, held_by: Option<Uuid>) -> StoreResult<bool>;

    /// Moves an active booking to a terminal status. Returns false when the
    /// booking had already left the active state.
    async fn finish_booking(
        &mut self,
        id: Uuid,
        status: BookingStatus,
        cancellation: Option<&Cancellation>,
    ) -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

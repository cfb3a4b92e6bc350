pub mod booking;
pub mod identity;
pub mod lab;
pub mod pii;
pub mod repository;
pub mod room;
pub mod timeofday;

pub use booking::{Booking, BookingStatus, Cancellation};
pub use identity::{Requester, Role, UserProfile};
pub use lab::LabWindow;
pub use repository::{Store, StoreError, StoreResult, StoreTransaction};
pub use room::{Room, RoomStatus};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),
    #[error("Booking not found: {0}")]
    BookingNotFound(String),
    #[error("Room is already occupied: {0}")]
    RoomOccupied(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Room already exists: {0}")]
    AlreadyExists(String),
    #[error("Booking is no longer active: {0}")]
    InvalidState(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Upstream(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

pub mod cancellation;
pub mod expiry;
pub mod finder;
pub mod transactor;

pub use cancellation::{BookingCanceller, MarkFreeOutcome};
pub use expiry::ExpirySweeper;
pub use finder::FreeRoomFinder;
pub use transactor::{BookingLimits, BookingRequest, BookingTransactor};

#[cfg(test)]
pub(crate) mod testing;

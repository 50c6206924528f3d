use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::location::LocationSample;
use crate::ride::Ride;
use crate::search::{RideListing, RideSearch};
use crate::views::{BookingDetail, PassengerBooking, RideBooking};
use crate::CoreError;

/// Failure kinds reported by a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Foreign key violated: {0}")]
    ForeignKeyViolation(String),
    /// Transient: pool exhaustion, I/O, deadlock or serialization failure.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            // The only unique constraint the core writes against is the
            // one-active-booking-per-passenger index.
            StoreError::UniqueViolation(msg) => CoreError::DuplicateBooking(msg),
            StoreError::ForeignKeyViolation(msg) => CoreError::NotFound(msg),
            StoreError::Unavailable(msg) => CoreError::Unavailable(msg),
            StoreError::Backend(msg) => CoreError::InternalError(msg),
        }
    }
}

/// Persistence contract for rides, bookings and location history.
///
/// Reads here run outside any transaction. Anything that touches
/// `available_seats` or booking status goes through [`RideStore::begin`].
#[async_trait]
pub trait RideStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn insert_ride(&self, ride: &Ride) -> StoreResult<()>;

    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>>;

    /// The ride joined with its driver summary.
    async fn get_ride_listing(&self, id: Uuid) -> StoreResult<Option<RideListing>>;

    /// Eligible rides joined with their driver summary, departure ascending.
    async fn search_rides(&self, search: &RideSearch) -> StoreResult<Vec<RideListing>>;

    /// Departure descending.
    async fn list_rides_by_driver(&self, driver_id: Uuid) -> StoreResult<Vec<Ride>>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// The booking joined with its ride, the ride's driver and the passenger.
    async fn get_booking_detail(&self, id: Uuid) -> StoreResult<Option<BookingDetail>>;

    /// With ride summary and driver contact, latest departure first.
    async fn list_bookings_by_passenger(&self, passenger_id: Uuid) -> StoreResult<Vec<PassengerBooking>>;

    /// With passenger summary, newest booking first.
    async fn list_bookings_by_ride(&self, ride_id: Uuid) -> StoreResult<Vec<RideBooking>>;

    /// Whether the passenger holds any booking on the ride that is not cancelled.
    async fn has_uncancelled_booking(&self, ride_id: Uuid, passenger_id: Uuid) -> StoreResult<bool>;

    async fn append_location(&self, sample: &LocationSample) -> StoreResult<()>;

    /// Newest first, at most `limit` samples.
    async fn recent_locations(&self, ride_id: Uuid, limit: i64) -> StoreResult<Vec<LocationSample>>;
}

/// An open store transaction.
///
/// Dropping it without [`StoreTx::commit`] discards every write made through it.
#[async_trait]
pub trait StoreTx: Send {
    /// Reads a ride and holds its row lock until the transaction ends.
    async fn lock_ride(&mut self, id: Uuid) -> StoreResult<Option<Ride>>;

    /// Writes every mutable ride column from `ride`.
    async fn update_ride(&mut self, ride: &Ride) -> StoreResult<()>;

    /// Adds `delta` to `available_seats` when the result stays within
    /// `0..=total_seats`; returns the new count, or `None` when the bound
    /// would be crossed (or the ride is gone).
    async fn adjust_available_seats(&mut self, ride_id: Uuid, delta: i32) -> StoreResult<Option<i32>>;

    async fn delete_ride(&mut self, id: Uuid) -> StoreResult<bool>;

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// The passenger's non-cancelled booking on the ride, if any.
    async fn find_uncancelled_booking(&mut self, ride_id: Uuid, passenger_id: Uuid) -> StoreResult<Option<Booking>>;

    /// Active bookings on a ride, locked.
    async fn active_bookings_for_ride(&mut self, ride_id: Uuid) -> StoreResult<Vec<Booking>>;

    /// Fails with [`StoreError::UniqueViolation`] when the passenger already
    /// holds a non-cancelled booking on the ride.
    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn set_booking_status(&mut self, id: Uuid, status: BookingStatus, at: DateTime<Utc>) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;
}

pub mod booking;
pub mod geo;
pub mod identity;
pub mod location;
pub mod repository;
pub mod ride;
pub mod search;
pub mod views;

pub use booking::{Booking, BookingStatus, NewBooking, ParticipantRole};
pub use geo::{BoundingBox, GeoPoint};
pub use identity::Principal;
pub use location::{LocationSample, LocationUpdate};
pub use repository::{RideStore, StoreError, StoreResult, StoreTx};
pub use ride::{NewRide, Ride, RideStatus, RideUpdate};
pub use search::{DriverSummary, RideListing, RideSearch};
pub use views::{
    BookingDetail, DriverContact, PassengerBooking, PassengerSummary, RideBooking, RideSummary, UserProfile,
};

/// Failure taxonomy shared by every core operation.
///
/// Each variant is reported to callers under a stable identifier (see
/// [`CoreError::code`]); none of them is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity {
        requested: i32,
        available: i32,
    },
    #[error("Duplicate booking: {0}")]
    DuplicateBooking(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Store unavailable, retry later: {0}")]
    Unavailable(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    /// Stable wire identifier for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::InvalidOperation(_) => "invalid_operation",
            CoreError::InsufficientCapacity { .. } => "insufficient_capacity",
            CoreError::DuplicateBooking(_) => "duplicate_booking",
            CoreError::InvalidState(_) => "invalid_state",
            CoreError::Unavailable(_) => "unavailable",
            CoreError::ValidationError(_) => "validation",
            CoreError::InternalError(_) => "internal",
        }
    }

    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Unavailable(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            CoreError::NotFound("x".into()),
            CoreError::Forbidden("x".into()),
            CoreError::InvalidOperation("x".into()),
            CoreError::InsufficientCapacity { requested: 2, available: 1 },
            CoreError::DuplicateBooking("x".into()),
            CoreError::InvalidState("x".into()),
            CoreError::Unavailable("x".into()),
            CoreError::ValidationError("x".into()),
            CoreError::InternalError("x".into()),
        ];

        let mut codes: Vec<&str> = errors.iter().map(CoreError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(CoreError::Unavailable("pool timed out".into()).is_retryable());
        assert!(!CoreError::InsufficientCapacity { requested: 1, available: 0 }.is_retryable());
    }
}

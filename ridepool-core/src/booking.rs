use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::{CoreError, CoreResult};

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// Which side of a booking is acting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    Driver,
    Passenger,
}

/// Who may trigger a given transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Allowed {
    DriverOnly,
    Either,
}

const BOOKING_TRANSITIONS: &[(BookingStatus, BookingStatus, Allowed)] = &[
    (BookingStatus::Pending, BookingStatus::Confirmed, Allowed::DriverOnly),
    (BookingStatus::Pending, BookingStatus::Cancelled, Allowed::Either),
    (BookingStatus::Confirmed, BookingStatus::Completed, Allowed::Either),
    (BookingStatus::Confirmed, BookingStatus::Cancelled, Allowed::Either),
];

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Active bookings count against ride capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Validates `self -> next` for the given actor against the transition table.
    ///
    /// Unknown edges (including anything out of a terminal state) are
    /// `InvalidState`; a known edge the actor may not trigger is `Forbidden`.
    pub fn check_transition(&self, next: BookingStatus, actor: ParticipantRole) -> CoreResult<()> {
        let edge = BOOKING_TRANSITIONS
            .iter()
            .find(|(from, to, _)| *from == *self && *to == next);

        match edge {
            None => Err(CoreError::InvalidState(format!(
                "cannot move booking from {} to {}",
                self, next
            ))),
            Some((_, _, Allowed::DriverOnly)) if actor != ParticipantRole::Driver => Err(
                CoreError::Forbidden(format!("only the driver can move a booking to {}", next)),
            ),
            Some(_) => Ok(()),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::InternalError(format!("unknown booking status '{}'", other))),
        }
    }
}

/// A passenger's reservation of seats on one ride.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub seats_booked: i32,
    /// Frozen at creation: `seats_booked * price_per_seat_cents` of the ride at that time.
    pub total_price_cents: i64,
    pub pickup: Option<GeoPoint>,
    pub dropoff: Option<GeoPoint>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Fails with `ValidationError` when the total price does not fit in cents.
    pub fn new(passenger_id: Uuid, input: NewBooking, price_per_seat_cents: i64) -> CoreResult<Self> {
        let total_price_cents = i64::from(input.seats_booked)
            .checked_mul(price_per_seat_cents)
            .ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "total price overflows for {} seats at {} cents",
                    input.seats_booked, price_per_seat_cents
                ))
            })?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            ride_id: input.ride_id,
            passenger_id,
            seats_booked: input.seats_booked,
            total_price_cents,
            pickup: input.pickup,
            dropoff: input.dropoff,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }
}

/// Input for reserving seats on a ride.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub ride_id: Uuid,
    pub seats_booked: i32,
    #[serde(default)]
    pub pickup: Option<GeoPoint>,
    #[serde(default)]
    pub dropoff: Option<GeoPoint>,
}

impl NewBooking {
    pub fn validate(&self) -> CoreResult<()> {
        if self.seats_booked < 1 {
            return Err(CoreError::ValidationError(format!(
                "seats_booked must be positive, got {}",
                self.seats_booked
            )));
        }
        if let Some(pickup) = &self.pickup {
            pickup.validate()?;
        }
        if let Some(dropoff) = &self.dropoff {
            dropoff.validate()?;
        }
        Ok(())
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::{CoreError, CoreResult};

/// Ride status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

/// Every legal ride transition. Only the owning driver may trigger them.
const RIDE_TRANSITIONS: &[(RideStatus, RideStatus)] = &[
    (RideStatus::Scheduled, RideStatus::InProgress),
    (RideStatus::Scheduled, RideStatus::Cancelled),
    (RideStatus::InProgress, RideStatus::Completed),
    (RideStatus::InProgress, RideStatus::Cancelled),
];

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Scheduled => "scheduled",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        RIDE_TRANSITIONS.contains(&(*self, next))
    }

    /// Validates `self -> next`. Re-applying the current status is accepted.
    pub fn check_transition(&self, next: RideStatus) -> CoreResult<()> {
        if *self == next || self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidState(format!("cannot move ride from {} to {}", self, next)))
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(RideStatus::Scheduled),
            "in_progress" => Ok(RideStatus::InProgress),
            "completed" => Ok(RideStatus::Completed),
            "cancelled" => Ok(RideStatus::Cancelled),
            other => Err(CoreError::InternalError(format!("unknown ride status '{}'", other))),
        }
    }
}

/// A ride offer published by a driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ride {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub total_seats: i32,
    pub available_seats: i32,
    /// Minor currency units.
    pub price_per_seat_cents: i64,
    pub status: RideStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn new(driver_id: Uuid, input: NewRide) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            driver_id,
            origin: input.origin,
            destination: input.destination,
            departure_time: input.departure_time,
            arrival_time: input.arrival_time,
            total_seats: input.total_seats,
            available_seats: input.total_seats,
            price_per_seat_cents: input.price_per_seat_cents,
            status: RideStatus::Scheduled,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seats currently held by active bookings.
    pub fn booked_seats(&self) -> i32 {
        self.total_seats - self.available_seats
    }
}

/// Input for publishing a ride.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRide {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub departure_time: DateTime<Utc>,
    #[serde(default)]
    pub arrival_time: Option<DateTime<Utc>>,
    pub total_seats: i32,
    pub price_per_seat_cents: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRide {
    pub fn validate(&self) -> CoreResult<()> {
        self.origin.validate()?;
        self.destination.validate()?;
        validate_seats_and_price(Some(self.total_seats), Some(self.price_per_seat_cents))?;
        if let Some(arrival) = self.arrival_time {
            if arrival < self.departure_time {
                return Err(CoreError::ValidationError("arrival precedes departure".to_string()));
            }
        }
        Ok(())
    }
}

/// Partial ride update; absent fields keep their prior value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RideUpdate {
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub total_seats: Option<i32>,
    pub price_per_seat_cents: Option<i64>,
    pub status: Option<RideStatus>,
    pub notes: Option<String>,
}

impl RideUpdate {
    pub fn is_empty(&self) -> bool {
        self.departure_time.is_none()
            && self.arrival_time.is_none()
            && self.total_seats.is_none()
            && self.price_per_seat_cents.is_none()
            && self.status.is_none()
            && self.notes.is_none()
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.is_empty() {
            return Err(CoreError::ValidationError("no fields to update".to_string()));
        }
        validate_seats_and_price(self.total_seats, self.price_per_seat_cents)
    }
}

fn validate_seats_and_price(total_seats: Option<i32>, price_cents: Option<i64>) -> CoreResult<()> {
    if let Some(seats) = total_seats {
        if seats < 1 {
            return Err(CoreError::ValidationError(format!("total_seats must be positive, got {}", seats)));
        }
    }
    if let Some(price) = price_cents {
        if price < 0 {
            return Err(CoreError::ValidationError("price_per_seat must not be negative".to_string()));
        }
    }
    Ok(())
}

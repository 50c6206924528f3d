use std::sync::Arc;

use chrono::Utc;
use ridepool_core::{
    Booking, BookingDetail, BookingStatus, CoreError, CoreResult, NewBooking, ParticipantRole, PassengerBooking,
    Principal, Ride, RideBooking, RideStatus, RideStore, StoreTx,
};
use ridepool_rides::{finish, release_seats, reserve_seats};
use uuid::Uuid;

use crate::access::ride_participant;

/// Owns booking records and the seat-reservation protocol.
///
/// Every write runs in one store transaction that locks the ride row first
/// and the booking row second, so the seat counter and booking status always
/// change together.
pub struct BookingReservationEngine {
    store: Arc<dyn RideStore>,
}

impl BookingReservationEngine {
    pub fn new(store: Arc<dyn RideStore>) -> Self {
        Self { store }
    }

    /// Reserve seats on a scheduled ride for `principal`.
    ///
    /// Duplicate attempts by the same passenger are caught after the ride
    /// lock; the store's uniqueness constraint catches any that race past it.
    pub async fn create_booking(&self, principal: &Principal, input: NewBooking) -> CoreResult<Booking> {
        input.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = reserve(tx.as_mut(), principal.user_id, input).await;
        let booking = finish(tx, outcome).await?;

        tracing::info!(
            booking_id = %booking.id,
            ride_id = %booking.ride_id,
            seats = booking.seats_booked,
            "Booking created"
        );
        Ok(booking)
    }

    /// Move a booking to `next` on behalf of its passenger or the ride's driver.
    ///
    /// Entering `cancelled` returns the booking's seats to the ride in the same
    /// transaction. `cancelled` is terminal, so seats come back at most once.
    pub async fn cancel_or_update_status(
        &self,
        booking_id: Uuid,
        requester_id: Uuid,
        next: BookingStatus,
    ) -> CoreResult<Booking> {
        // Unlocked read for the ride id only; the ride must be locked before
        // the booking.
        let ride_id = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?
            .ride_id;

        let mut tx = self.store.begin().await?;
        let outcome = transition(tx.as_mut(), ride_id, booking_id, requester_id, next).await;
        let booking = finish(tx, outcome).await?;

        tracing::info!(booking_id = %booking.id, status = %booking.status, "Booking status changed");
        Ok(booking)
    }

    /// Each booking with its ride and the driver's contact, latest departure first.
    pub async fn list_for_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<PassengerBooking>> {
        Ok(self.store.list_bookings_by_passenger(passenger_id).await?)
    }

    /// Every booking on a ride with its passenger, newest first. Driver only.
    pub async fn list_for_ride(&self, ride_id: Uuid, requester_id: Uuid) -> CoreResult<Vec<RideBooking>> {
        match self.store.get_ride(ride_id).await? {
            Some(ride) if ride.driver_id == requester_id => {}
            _ => {
                return Err(CoreError::Forbidden(format!(
                    "not authorized to view bookings of ride {}",
                    ride_id
                )))
            }
        }
        Ok(self.store.list_bookings_by_ride(ride_id).await?)
    }

    /// A booking with ride, driver and passenger, visible to its passenger and
    /// the ride's driver.
    pub async fn get(&self, booking_id: Uuid, requester_id: Uuid) -> CoreResult<BookingDetail> {
        let detail = self
            .store
            .get_booking_detail(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?;

        if requester_id != detail.ride.driver_id && requester_id != detail.booking.passenger_id {
            return Err(CoreError::Forbidden(format!("not authorized for booking {}", booking_id)));
        }
        Ok(detail)
    }

    /// The ride, when `user_id` is its driver or holds a non-cancelled booking on it.
    pub async fn authorize_viewer(&self, ride_id: Uuid, user_id: Uuid) -> CoreResult<Ride> {
        let (ride, _) = ride_participant(self.store.as_ref(), ride_id, user_id).await?;
        Ok(ride)
    }
}

fn role_of(ride: &Ride, booking: &Booking, requester_id: Uuid) -> CoreResult<ParticipantRole> {
    if requester_id == ride.driver_id {
        Ok(ParticipantRole::Driver)
    } else if requester_id == booking.passenger_id {
        Ok(ParticipantRole::Passenger)
    } else {
        Err(CoreError::Forbidden(format!("not authorized for booking {}", booking.id)))
    }
}

async fn reserve(tx: &mut dyn StoreTx, passenger_id: Uuid, input: NewBooking) -> CoreResult<Booking> {
    let ride = match tx.lock_ride(input.ride_id).await? {
        Some(ride) if ride.status == RideStatus::Scheduled => ride,
        _ => {
            return Err(CoreError::NotFound(format!(
                "ride {} not found or not open for booking",
                input.ride_id
            )))
        }
    };

    if ride.driver_id == passenger_id {
        return Err(CoreError::InvalidOperation("drivers cannot book their own rides".to_string()));
    }
    if tx.find_uncancelled_booking(ride.id, passenger_id).await?.is_some() {
        return Err(CoreError::DuplicateBooking(format!("passenger already booked ride {}", ride.id)));
    }
    if input.seats_booked > ride.available_seats {
        return Err(CoreError::InsufficientCapacity {
            requested: input.seats_booked,
            available: ride.available_seats,
        });
    }

    let booking = Booking::new(passenger_id, input, ride.price_per_seat_cents)?;
    tx.insert_booking(&booking).await?;
    reserve_seats(tx, ride.id, booking.seats_booked).await?;
    Ok(booking)
}

async fn transition(
    tx: &mut dyn StoreTx,
    ride_id: Uuid,
    booking_id: Uuid,
    requester_id: Uuid,
    next: BookingStatus,
) -> CoreResult<Booking> {
    let ride = tx
        .lock_ride(ride_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?;
    let mut booking = tx
        .lock_booking(booking_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))?;

    let role = role_of(&ride, &booking, requester_id)?;
    if let Err(err) = booking.status.check_transition(next, role) {
        tracing::warn!(booking_id = %booking_id, from = %booking.status, to = %next, "Rejected booking transition");
        return Err(err);
    }

    if next == BookingStatus::Cancelled {
        release_seats(tx, ride_id, booking.seats_booked).await?;
    }

    let now = Utc::now();
    tx.set_booking_status(booking_id, next, now).await?;
    booking.status = next;
    booking.updated_at = now;
    Ok(booking)
}

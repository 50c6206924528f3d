use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use ridepool_core::geo::validate_coordinates;
use ridepool_core::{
    BookingStatus, BoundingBox, CoreError, CoreResult, NewRide, Principal, Ride, RideListing,
    RideSearch, RideStatus, RideStore, RideUpdate, StoreTx,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::inventory::release_seats;
use crate::txn::finish;

const DEFAULT_BOX_HALF_SPAN: f64 = 0.5;

/// Search filters as they arrive from a client: optional centre points that
/// are widened into boxes by the manager's configured half span.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub date: Option<NaiveDate>,
    pub seats: Option<i32>,
    pub origin_lat: Option<f64>,
    pub origin_lng: Option<f64>,
    pub dest_lat: Option<f64>,
    pub dest_lng: Option<f64>,
}

/// Owns ride records, their capacity counters and the ride status machine.
pub struct RideLifecycleManager {
    store: Arc<dyn RideStore>,
    box_half_span: f64,
}

impl RideLifecycleManager {
    pub fn new(store: Arc<dyn RideStore>) -> Self {
        Self {
            store,
            box_half_span: DEFAULT_BOX_HALF_SPAN,
        }
    }

    pub fn with_box_half_span(mut self, degrees: f64) -> Self {
        self.box_half_span = degrees;
        self
    }

    /// Publish a new ride. Only principals flagged as drivers may do so.
    pub async fn create(&self, principal: &Principal, input: NewRide) -> CoreResult<Ride> {
        if !principal.is_driver {
            return Err(CoreError::Forbidden("only drivers can create rides".to_string()));
        }
        input.validate()?;

        let ride = Ride::new(principal.user_id, input);
        self.store.insert_ride(&ride).await?;

        tracing::info!(ride_id = %ride.id, driver_id = %ride.driver_id, seats = ride.total_seats, "Ride created");
        Ok(ride)
    }

    pub async fn get(&self, ride_id: Uuid) -> CoreResult<Ride> {
        self.store
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {}", ride_id)))
    }

    /// The ride with its driver summary.
    pub async fn get_listing(&self, ride_id: Uuid) -> CoreResult<RideListing> {
        self.store
            .get_ride_listing(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {}", ride_id)))
    }

    /// Scheduled rides with enough free seats, departure ascending.
    pub async fn search(&self, filters: RideSearch) -> CoreResult<Vec<RideListing>> {
        if filters.seats_needed < 1 {
            return Err(CoreError::ValidationError(format!(
                "seats must be positive, got {}",
                filters.seats_needed
            )));
        }
        Ok(self.store.search_rides(&filters).await?)
    }

    /// Like [`search`](Self::search), building boxes around the given points.
    /// A point missing either coordinate is ignored.
    pub async fn search_near(&self, params: SearchParams) -> CoreResult<Vec<RideListing>> {
        let filters = RideSearch {
            date: params.date,
            seats_needed: params.seats.unwrap_or(1),
            origin_box: self.box_around(params.origin_lat, params.origin_lng)?,
            dest_box: self.box_around(params.dest_lat, params.dest_lng)?,
        };
        self.search(filters).await
    }

    fn box_around(&self, lat: Option<f64>, lng: Option<f64>) -> CoreResult<Option<BoundingBox>> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => {
                validate_coordinates(lat, lng)?;
                Ok(Some(BoundingBox::around(lat, lng, self.box_half_span)))
            }
            _ => Ok(None),
        }
    }

    /// Departure descending.
    pub async fn list_by_driver(&self, driver_id: Uuid) -> CoreResult<Vec<Ride>> {
        Ok(self.store.list_rides_by_driver(driver_id).await?)
    }

    /// Apply a partial update as the ride's driver.
    ///
    /// The ride row stays locked from read to write. A missing ride and a
    /// ride owned by someone else both come back as `Forbidden`. Cancelling
    /// the ride cancels its active bookings and hands their seats back in
    /// the same transaction.
    pub async fn update(&self, ride_id: Uuid, driver_id: Uuid, changes: RideUpdate) -> CoreResult<Ride> {
        changes.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = apply_update(tx.as_mut(), ride_id, driver_id, changes).await;
        let ride = finish(tx, outcome).await?;

        tracing::info!(ride_id = %ride.id, status = %ride.status, available = ride.available_seats, "Ride updated");
        Ok(ride)
    }

    /// Delete an owned ride that no longer has active bookings.
    pub async fn delete(&self, ride_id: Uuid, driver_id: Uuid) -> CoreResult<()> {
        let mut tx = self.store.begin().await?;
        let outcome = delete_owned(tx.as_mut(), ride_id, driver_id).await;
        finish(tx, outcome).await?;

        tracing::info!(ride_id = %ride_id, "Ride deleted");
        Ok(())
    }
}

async fn lock_owned(tx: &mut dyn StoreTx, ride_id: Uuid, driver_id: Uuid) -> CoreResult<Ride> {
    match tx.lock_ride(ride_id).await? {
        Some(ride) if ride.driver_id == driver_id => Ok(ride),
        _ => Err(CoreError::Forbidden(format!("ride {} not found or not owned by caller", ride_id))),
    }
}

async fn apply_update(
    tx: &mut dyn StoreTx,
    ride_id: Uuid,
    driver_id: Uuid,
    changes: RideUpdate,
) -> CoreResult<Ride> {
    let mut ride = lock_owned(tx, ride_id, driver_id).await?;
    let previous_status = ride.status;

    if let Some(next) = changes.status {
        ride.status.check_transition(next)?;
        ride.status = next;
    }
    if let Some(total_seats) = changes.total_seats {
        let booked = ride.booked_seats();
        if total_seats < booked {
            return Err(CoreError::InvalidOperation(format!(
                "cannot resize ride to {} seats while {} are booked",
                total_seats, booked
            )));
        }
        ride.available_seats = resized_available_seats(ride.total_seats, ride.available_seats, total_seats);
        ride.total_seats = total_seats;
    }
    if let Some(departure_time) = changes.departure_time {
        ride.departure_time = departure_time;
    }
    if let Some(arrival_time) = changes.arrival_time {
        ride.arrival_time = Some(arrival_time);
    }
    if let Some(arrival) = ride.arrival_time {
        if arrival < ride.departure_time {
            return Err(CoreError::ValidationError("arrival precedes departure".to_string()));
        }
    }
    if let Some(price) = changes.price_per_seat_cents {
        ride.price_per_seat_cents = price;
    }
    if let Some(notes) = changes.notes {
        ride.notes = Some(notes);
    }
    ride.updated_at = Utc::now();

    // Write the ride before releasing seats; the release adjusts the stored
    // counter and must not be overwritten by this snapshot.
    tx.update_ride(&ride).await?;

    if ride.status == RideStatus::Cancelled && previous_status != RideStatus::Cancelled {
        let bookings = tx.active_bookings_for_ride(ride_id).await?;
        for booking in &bookings {
            tx.set_booking_status(booking.id, BookingStatus::Cancelled, ride.updated_at)
                .await?;
            release_seats(tx, ride_id, booking.seats_booked).await?;
        }
        if !bookings.is_empty() {
            tracing::info!(ride_id = %ride_id, bookings = bookings.len(), "Cancelled bookings of cancelled ride");
            ride = tx
                .lock_ride(ride_id)
                .await?
                .ok_or_else(|| CoreError::InternalError(format!("ride {} vanished mid-update", ride_id)))?;
        }
    }

    Ok(ride)
}

async fn delete_owned(tx: &mut dyn StoreTx, ride_id: Uuid, driver_id: Uuid) -> CoreResult<()> {
    lock_owned(tx, ride_id, driver_id).await?;

    let active = tx.active_bookings_for_ride(ride_id).await?;
    if !active.is_empty() {
        return Err(CoreError::InvalidState(format!(
            "ride {} still has {} active bookings",
            ride_id,
            active.len()
        )));
    }

    if !tx.delete_ride(ride_id).await? {
        return Err(CoreError::Forbidden(format!("ride {} not found or not owned by caller", ride_id)));
    }
    Ok(())
}

/// Capacity after resizing a ride from `old_total` to `new_total` seats,
/// keeping the seats already booked.
pub fn resized_available_seats(old_total: i32, old_available: i32, new_total: i32) -> i32 {
    let booked = old_total - old_available;
    (new_total - booked).max(0)
}

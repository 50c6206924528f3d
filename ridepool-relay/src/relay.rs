use std::sync::Arc;

use chrono::Utc;
use ridepool_bookings::BookingReservationEngine;
use ridepool_core::{CoreError, CoreResult, LocationSample, LocationUpdate, RideStatus, RideStore};
use uuid::Uuid;

use crate::channels::{ChannelRegistry, Subscription};

const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// Accepts driver position reports, keeps their history and relays them live.
///
/// Reads and subscriptions are open to the ride's driver and to passengers
/// holding a booking on it that is not cancelled. Authorization is checked
/// when a subscriber joins, not for every relayed sample.
pub struct LocationRelay {
    store: Arc<dyn RideStore>,
    bookings: Arc<BookingReservationEngine>,
    channels: Arc<ChannelRegistry>,
    history_limit: i64,
}

impl LocationRelay {
    pub fn new(
        store: Arc<dyn RideStore>,
        bookings: Arc<BookingReservationEngine>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        Self {
            store,
            bookings,
            channels,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: i64) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Record a position for a ride in progress and relay it to subscribers.
    pub async fn record_sample(&self, driver_id: Uuid, update: LocationUpdate) -> CoreResult<LocationSample> {
        update.validate()?;

        let ride = match self.store.get_ride(update.ride_id).await? {
            Some(ride) if ride.driver_id == driver_id => ride,
            _ => {
                return Err(CoreError::Forbidden(format!(
                    "not authorized to report location for ride {}",
                    update.ride_id
                )))
            }
        };
        if ride.status != RideStatus::InProgress {
            return Err(CoreError::InvalidState(format!(
                "ride {} is {}, location is only tracked in progress",
                ride.id, ride.status
            )));
        }

        let sample = LocationSample::stamp(&update, Utc::now());
        self.store.append_location(&sample).await?;
        let delivered = self.channels.publish(&sample);

        tracing::debug!(ride_id = %ride.id, delivered, "Location recorded");
        Ok(sample)
    }

    /// Newest first, capped at the configured history limit.
    pub async fn history(&self, ride_id: Uuid, requester_id: Uuid, limit: Option<i64>) -> CoreResult<Vec<LocationSample>> {
        self.bookings.authorize_viewer(ride_id, requester_id).await?;

        let limit = limit.unwrap_or(self.history_limit).clamp(1, self.history_limit);
        Ok(self.store.recent_locations(ride_id, limit).await?)
    }

    pub async fn current(&self, ride_id: Uuid, requester_id: Uuid) -> CoreResult<LocationSample> {
        self.bookings.authorize_viewer(ride_id, requester_id).await?;

        self.store
            .recent_locations(ride_id, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound(format!("no location data for ride {}", ride_id)))
    }

    /// Join the ride's live channel, gated like [`history`](Self::history).
    /// Finished rides have no channel to join.
    pub async fn subscribe(&self, ride_id: Uuid, requester_id: Uuid) -> CoreResult<Subscription> {
        let ride = self.bookings.authorize_viewer(ride_id, requester_id).await?;
        if ride.status.is_terminal() {
            return Err(CoreError::InvalidState(format!("ride {} is {}", ride_id, ride.status)));
        }

        let subscription = self.channels.join(ride_id);

        // A ride that ended after the check above has already had its channel
        // closed; the one just joined would never be. Dropping the
        // subscription on these paths removes it again.
        match self.store.get_ride(ride_id).await? {
            Some(ride) if !ride.status.is_terminal() => Ok(subscription),
            Some(ride) => {
                tracing::debug!(ride_id = %ride_id, status = %ride.status, "Ride ended while joining");
                Err(CoreError::InvalidState(format!("ride {} is {}", ride_id, ride.status)))
            }
            None => Err(CoreError::Forbidden(format!("not a participant of ride {}", ride_id))),
        }
    }

    /// Tear down the ride's channel once it reaches a terminal status.
    pub fn end_ride(&self, ride_id: Uuid) {
        if self.channels.close(ride_id) {
            tracing::info!(ride_id = %ride_id, "Live channel closed");
        }
    }
}

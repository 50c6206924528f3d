use std::sync::Arc;

use ridepool_bookings::BookingReservationEngine;
use ridepool_core::RideStore;
use ridepool_relay::{ChannelRegistry, LocationRelay};
use ridepool_rides::RideLifecycleManager;
use ridepool_store::app_config::{RateLimitConfig, RelayConfig, SearchConfig};
use ridepool_store::RedisClient;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub rides: Arc<RideLifecycleManager>,
    pub bookings: Arc<BookingReservationEngine>,
    pub relay: Arc<LocationRelay>,
    /// `None` disables rate limiting.
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wires the three core components over one store.
    pub fn new(store: Arc<dyn RideStore>, auth: AuthConfig, relay: &RelayConfig, search: &SearchConfig) -> Self {
        let bookings = Arc::new(BookingReservationEngine::new(store.clone()));
        let channels = ChannelRegistry::new(relay.channel_capacity);

        Self {
            rides: Arc::new(RideLifecycleManager::new(store.clone()).with_box_half_span(search.box_half_span_degrees)),
            relay: Arc::new(
                LocationRelay::new(store, bookings.clone(), channels).with_history_limit(relay.history_limit),
            ),
            bookings,
            redis: None,
            rate_limit: RateLimitConfig::default(),
            auth,
        }
    }

    pub fn with_rate_limit(mut self, redis: RedisClient, limits: RateLimitConfig) -> Self {
        self.redis = Some(Arc::new(redis));
        self.rate_limit = limits;
        self
    }
}

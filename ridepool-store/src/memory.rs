use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::{
    Booking, BookingDetail, BookingStatus, LocationSample, PassengerBooking, Ride, RideBooking, RideListing,
    RideSearch, RideStore, RideSummary, StoreError, StoreResult, StoreTx, UserProfile,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    rides: HashMap<Uuid, Ride>,
    bookings: HashMap<Uuid, Booking>,
}

/// In-process store with the same transactional semantics as the SQL store.
///
/// A transaction holds the store-wide lock for its whole lifetime and works
/// on a private copy that replaces the shared state on commit, so concurrent
/// transactions are fully serialized and an uncommitted one leaves no trace.
/// Registered profiles stand in for the gateway-owned users table.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    locations: Arc<Mutex<HashMap<Uuid, Vec<LocationSample>>>>,
    users: Arc<RwLock<HashMap<Uuid, UserProfile>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_user(&self, user_id: Uuid, profile: UserProfile) {
        self.users.write().await.insert(user_id, profile);
    }

    async fn profile(&self, user_id: Uuid) -> UserProfile {
        self.users.read().await.get(&user_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            working,
            deleted_rides: Vec::new(),
            locations: self.locations.clone(),
        }))
    }

    async fn insert_ride(&self, ride: &Ride) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.rides.contains_key(&ride.id) {
            return Err(StoreError::UniqueViolation(format!("ride {} exists", ride.id)));
        }
        state.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        Ok(self.state.lock().await.rides.get(&id).cloned())
    }

    async fn get_ride_listing(&self, id: Uuid) -> StoreResult<Option<RideListing>> {
        let Some(ride) = self.get_ride(id).await? else {
            return Ok(None);
        };
        Ok(Some(RideListing {
            driver: self.profile(ride.driver_id).await.driver_summary(),
            ride,
        }))
    }

    async fn search_rides(&self, search: &RideSearch) -> StoreResult<Vec<RideListing>> {
        let mut rides: Vec<Ride> = {
            let state = self.state.lock().await;
            state.rides.values().filter(|r| search.matches(r)).cloned().collect()
        };
        rides.sort_by_key(|r| r.departure_time);

        let users = self.users.read().await;
        Ok(rides
            .into_iter()
            .map(|ride| RideListing {
                driver: users.get(&ride.driver_id).map(UserProfile::driver_summary).unwrap_or_default(),
                ride,
            })
            .collect())
    }

    async fn list_rides_by_driver(&self, driver_id: Uuid) -> StoreResult<Vec<Ride>> {
        let state = self.state.lock().await;
        let mut rides: Vec<Ride> = state
            .rides
            .values()
            .filter(|r| r.driver_id == driver_id)
            .cloned()
            .collect();
        rides.sort_by(|a, b| b.departure_time.cmp(&a.departure_time));
        Ok(rides)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn get_booking_detail(&self, id: Uuid) -> StoreResult<Option<BookingDetail>> {
        let joined = {
            let state = self.state.lock().await;
            state
                .bookings
                .get(&id)
                .and_then(|b| state.rides.get(&b.ride_id).map(|r| (b.clone(), RideSummary::from(r))))
        };
        let Some((booking, ride)) = joined else {
            return Ok(None);
        };
        Ok(Some(BookingDetail {
            driver: self.profile(ride.driver_id).await.driver_contact(),
            passenger: self.profile(booking.passenger_id).await.passenger_summary(),
            ride,
            booking,
        }))
    }

    async fn list_bookings_by_passenger(&self, passenger_id: Uuid) -> StoreResult<Vec<PassengerBooking>> {
        let mut joined: Vec<(Booking, RideSummary)> = {
            let state = self.state.lock().await;
            newest_first(state.bookings.values().filter(|b| b.passenger_id == passenger_id))
                .into_iter()
                .filter_map(|b| state.rides.get(&b.ride_id).map(|r| (b, RideSummary::from(r))))
                .collect()
        };
        // Stable: bookings on the same departure stay newest first.
        joined.sort_by(|a, b| b.1.departure_time.cmp(&a.1.departure_time));

        let users = self.users.read().await;
        Ok(joined
            .into_iter()
            .map(|(booking, ride)| PassengerBooking {
                driver: users.get(&ride.driver_id).map(UserProfile::driver_contact).unwrap_or_default(),
                ride,
                booking,
            })
            .collect())
    }

    async fn list_bookings_by_ride(&self, ride_id: Uuid) -> StoreResult<Vec<RideBooking>> {
        let bookings = {
            let state = self.state.lock().await;
            newest_first(state.bookings.values().filter(|b| b.ride_id == ride_id))
        };
        let users = self.users.read().await;
        Ok(bookings
            .into_iter()
            .map(|booking| RideBooking {
                passenger: users
                    .get(&booking.passenger_id)
                    .map(UserProfile::passenger_summary)
                    .unwrap_or_default(),
                booking,
            })
            .collect())
    }

    async fn has_uncancelled_booking(&self, ride_id: Uuid, passenger_id: Uuid) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .any(|b| b.ride_id == ride_id && b.passenger_id == passenger_id && !b.is_cancelled()))
    }

    async fn append_location(&self, sample: &LocationSample) -> StoreResult<()> {
        // Held across the push so a committed delete cannot orphan the sample.
        let state = self.state.lock().await;
        if !state.rides.contains_key(&sample.ride_id) {
            return Err(StoreError::ForeignKeyViolation(format!("ride {} does not exist", sample.ride_id)));
        }
        self.locations
            .lock()
            .await
            .entry(sample.ride_id)
            .or_default()
            .push(sample.clone());
        drop(state);
        Ok(())
    }

    async fn recent_locations(&self, ride_id: Uuid, limit: i64) -> StoreResult<Vec<LocationSample>> {
        let locations = self.locations.lock().await;
        let mut samples = locations.get(&ride_id).cloned().unwrap_or_default();
        // Stable sort keeps insertion order among equal timestamps; reverse
        // afterwards so the latest append wins ties.
        samples.sort_by_key(|s| s.timestamp);
        samples.reverse();
        samples.truncate(limit.max(0) as usize);
        Ok(samples)
    }
}

fn newest_first<'a>(bookings: impl Iterator<Item = &'a Booking>) -> Vec<Booking> {
    let mut out: Vec<Booking> = bookings.cloned().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out
}

pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
    deleted_rides: Vec<Uuid>,
    locations: Arc<Mutex<HashMap<Uuid, Vec<LocationSample>>>>,
}

impl MemoryTx {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.guard.is_none() {
            return Err(StoreError::Backend("transaction already finished".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_ride(&mut self, id: Uuid) -> StoreResult<Option<Ride>> {
        self.ensure_open()?;
        Ok(self.working.rides.get(&id).cloned())
    }

    async fn update_ride(&mut self, ride: &Ride) -> StoreResult<()> {
        self.ensure_open()?;
        match self.working.rides.get_mut(&ride.id) {
            Some(existing) => {
                *existing = ride.clone();
                Ok(())
            }
            None => Err(StoreError::ForeignKeyViolation(format!("ride {} does not exist", ride.id))),
        }
    }

    async fn adjust_available_seats(&mut self, ride_id: Uuid, delta: i32) -> StoreResult<Option<i32>> {
        self.ensure_open()?;
        let Some(ride) = self.working.rides.get_mut(&ride_id) else {
            return Ok(None);
        };
        let next = ride.available_seats + delta;
        if next < 0 || next > ride.total_seats {
            return Ok(None);
        }
        ride.available_seats = next;
        ride.updated_at = Utc::now();
        Ok(Some(next))
    }

    async fn delete_ride(&mut self, id: Uuid) -> StoreResult<bool> {
        self.ensure_open()?;
        if self.working.rides.remove(&id).is_none() {
            return Ok(false);
        }
        self.working.bookings.retain(|_, b| b.ride_id != id);
        self.deleted_rides.push(id);
        Ok(true)
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.ensure_open()?;
        Ok(self.working.bookings.get(&id).cloned())
    }

    async fn find_uncancelled_booking(&mut self, ride_id: Uuid, passenger_id: Uuid) -> StoreResult<Option<Booking>> {
        self.ensure_open()?;
        Ok(self
            .working
            .bookings
            .values()
            .find(|b| b.ride_id == ride_id && b.passenger_id == passenger_id && !b.is_cancelled())
            .cloned())
    }

    async fn active_bookings_for_ride(&mut self, ride_id: Uuid) -> StoreResult<Vec<Booking>> {
        self.ensure_open()?;
        Ok(self
            .working
            .bookings
            .values()
            .filter(|b| b.ride_id == ride_id && b.is_active())
            .cloned()
            .collect())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.ensure_open()?;
        if !self.working.rides.contains_key(&booking.ride_id) {
            return Err(StoreError::ForeignKeyViolation(format!("ride {} does not exist", booking.ride_id)));
        }
        let duplicate = self.working.bookings.values().any(|b| {
            b.ride_id == booking.ride_id && b.passenger_id == booking.passenger_id && !b.is_cancelled()
        });
        if duplicate && !booking.is_cancelled() {
            return Err(StoreError::UniqueViolation(format!(
                "passenger {} already holds an active booking on ride {}",
                booking.passenger_id, booking.ride_id
            )));
        }
        self.working.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn set_booking_status(&mut self, id: Uuid, status: BookingStatus, at: DateTime<Utc>) -> StoreResult<()> {
        self.ensure_open()?;
        match self.working.bookings.get_mut(&id) {
            Some(booking) => {
                booking.status = status;
                booking.updated_at = at;
                Ok(())
            }
            None => Err(StoreError::ForeignKeyViolation(format!("booking {} does not exist", id))),
        }
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))?;
        *guard = std::mem::take(&mut self.working);

        if !self.deleted_rides.is_empty() {
            let mut locations = self.locations.lock().await;
            for id in self.deleted_rides.drain(..) {
                locations.remove(&id);
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.guard.take();
        self.working = MemoryState::default();
        self.deleted_rides.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridepool_core::{GeoPoint, NewBooking, NewRide};

    fn ride(total_seats: i32) -> Ride {
        Ride::new(
            Uuid::new_v4(),
            NewRide {
                origin: GeoPoint::new(40.71, -74.0, "Manhattan"),
                destination: GeoPoint::new(42.36, -71.06, "Boston"),
                departure_time: Utc::now(),
                arrival_time: None,
                total_seats,
                price_per_seat_cents: 1000,
                notes: None,
            },
        )
    }

    fn booking(ride: &Ride, passenger_id: Uuid) -> Booking {
        Booking::new(
            passenger_id,
            NewBooking {
                ride_id: ride.id,
                seats_booked: 1,
                pickup: None,
                dropoff: None,
            },
            ride.price_per_seat_cents,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        let ride = ride(2);
        store.insert_ride(&ride).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            assert_eq!(tx.adjust_available_seats(ride.id, -1).await.unwrap(), Some(1));
            tx.insert_booking(&booking(&ride, Uuid::new_v4())).await.unwrap();
            // dropped without commit
        }

        let stored = store.get_ride(ride.id).await.unwrap().unwrap();
        assert_eq!(stored.available_seats, 2);
        assert!(store.list_bookings_by_ride(ride.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let ride = ride(2);
        store.insert_ride(&ride).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.adjust_available_seats(ride.id, -2).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_ride(ride.id).await.unwrap().unwrap().available_seats, 0);
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_seat_adjustment_is_bounded() {
        let store = MemoryStore::new();
        let ride = ride(2);
        store.insert_ride(&ride).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.adjust_available_seats(ride.id, -3).await.unwrap(), None);
        assert_eq!(tx.adjust_available_seats(ride.id, 1).await.unwrap(), None);
        assert_eq!(tx.adjust_available_seats(Uuid::new_v4(), -1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_one_active_booking_per_passenger() {
        let store = MemoryStore::new();
        let ride = ride(3);
        store.insert_ride(&ride).await.unwrap();
        let passenger = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let first = booking(&ride, passenger);
        tx.insert_booking(&first).await.unwrap();
        let err = tx.insert_booking(&booking(&ride, passenger)).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));

        // A cancelled booking frees the slot.
        tx.set_booking_status(first.id, BookingStatus::Cancelled, Utc::now()).await.unwrap();
        tx.insert_booking(&booking(&ride, passenger)).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_cascades_to_history() {
        let store = MemoryStore::new();
        let ride = ride(1);
        store.insert_ride(&ride).await.unwrap();
        store
            .append_location(&LocationSample {
                ride_id: ride.id,
                latitude: 40.7,
                longitude: -74.0,
                speed: None,
                heading: None,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_ride(ride.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(store.get_ride(ride.id).await.unwrap().is_none());
        assert!(store.recent_locations(ride.id, 100).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_samples_racing_a_delete_are_not_orphaned() {
        let store = MemoryStore::new();
        let ride = ride(3);
        store.insert_ride(&ride).await.unwrap();
        let ride_id = ride.id;

        let appenders: Vec<_> = (0..32_i32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append_location(&LocationSample {
                            ride_id,
                            latitude: 40.7 + f64::from(i) * 0.001,
                            longitude: -74.0,
                            speed: None,
                            heading: None,
                            timestamp: Utc::now(),
                        })
                        .await
                })
            })
            .collect();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_ride(ride.id).await.unwrap());
        tx.commit().await.unwrap();

        for appender in appenders {
            match appender.await.unwrap() {
                Ok(()) | Err(StoreError::ForeignKeyViolation(_)) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(store.recent_locations(ride.id, 100).await.unwrap().is_empty());
    }
}

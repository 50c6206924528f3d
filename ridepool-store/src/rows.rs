use chrono::{DateTime, Utc};
use ridepool_core::{
    Booking, BookingDetail, DriverContact, DriverSummary, GeoPoint, LocationSample, PassengerBooking,
    PassengerSummary, Ride, RideBooking, RideListing, RideSummary, StoreError,
};
use uuid::Uuid;

pub(crate) const RIDE_COLUMNS: &str = "id, driver_id, origin_lat, origin_lng, origin_address, \
     destination_lat, destination_lng, destination_address, departure_time, arrival_time, \
     total_seats, available_seats, price_per_seat_cents, status, notes, created_at, updated_at";

pub(crate) const BOOKING_COLUMNS: &str = "id, ride_id, passenger_id, seats_booked, total_price_cents, \
     pickup_lat, pickup_lng, pickup_address, dropoff_lat, dropoff_lng, dropoff_address, \
     status, created_at, updated_at";

/// Rides joined as `r`, drivers as `d`, passengers as `p`. Users are left
/// joined; a missing profile decodes as empty names.
pub(crate) const DRIVER_SUMMARY_SELECT: &str = "COALESCE(d.first_name, '') AS first_name, \
     COALESCE(d.last_name, '') AS last_name, d.rating, d.car_model, d.car_plate";

pub(crate) const RIDE_SUMMARY_SELECT: &str = "r.driver_id AS ride_driver_id, \
     r.origin_address AS ride_origin_address, r.destination_address AS ride_destination_address, \
     r.departure_time AS ride_departure_time, r.status AS ride_status";

pub(crate) const DRIVER_CONTACT_SELECT: &str = "COALESCE(d.first_name, '') AS driver_first_name, \
     COALESCE(d.last_name, '') AS driver_last_name, d.phone AS driver_phone, \
     d.car_model AS driver_car_model, d.car_plate AS driver_car_plate";

pub(crate) const PASSENGER_SELECT: &str = "COALESCE(p.first_name, '') AS passenger_first_name, \
     COALESCE(p.last_name, '') AS passenger_last_name, p.phone AS passenger_phone, \
     p.rating AS passenger_rating";

/// `columns` with every name qualified by `alias`.
pub(crate) fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(sqlx::FromRow)]
pub(crate) struct RideRow {
    id: Uuid,
    driver_id: Uuid,
    origin_lat: f64,
    origin_lng: f64,
    origin_address: Option<String>,
    destination_lat: f64,
    destination_lng: f64,
    destination_address: Option<String>,
    departure_time: DateTime<Utc>,
    arrival_time: Option<DateTime<Utc>>,
    total_seats: i32,
    available_seats: i32,
    price_per_seat_cents: i64,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RideRow> for Ride {
    type Error = StoreError;

    fn try_from(row: RideRow) -> Result<Self, Self::Error> {
        Ok(Ride {
            id: row.id,
            driver_id: row.driver_id,
            origin: GeoPoint {
                lat: row.origin_lat,
                lng: row.origin_lng,
                address: row.origin_address,
            },
            destination: GeoPoint {
                lat: row.destination_lat,
                lng: row.destination_lng,
                address: row.destination_address,
            },
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            total_seats: row.total_seats,
            available_seats: row.available_seats,
            price_per_seat_cents: row.price_per_seat_cents,
            status: row.status.parse().map_err(|e| StoreError::Backend(format!("{}", e)))?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ListingRow {
    #[sqlx(flatten)]
    ride: RideRow,
    first_name: String,
    last_name: String,
    rating: Option<f64>,
    car_model: Option<String>,
    car_plate: Option<String>,
}

impl TryFrom<ListingRow> for RideListing {
    type Error = StoreError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        Ok(RideListing {
            ride: row.ride.try_into()?,
            driver: DriverSummary {
                first_name: row.first_name,
                last_name: row.last_name,
                rating: row.rating,
                car_model: row.car_model,
                car_plate: row.car_plate,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookingRow {
    id: Uuid,
    ride_id: Uuid,
    passenger_id: Uuid,
    seats_booked: i32,
    total_price_cents: i64,
    pickup_lat: Option<f64>,
    pickup_lng: Option<f64>,
    pickup_address: Option<String>,
    dropoff_lat: Option<f64>,
    dropoff_lng: Option<f64>,
    dropoff_address: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn optional_point(lat: Option<f64>, lng: Option<f64>, address: Option<String>) -> Option<GeoPoint> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng, address }),
        _ => None,
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            ride_id: row.ride_id,
            passenger_id: row.passenger_id,
            seats_booked: row.seats_booked,
            total_price_cents: row.total_price_cents,
            pickup: optional_point(row.pickup_lat, row.pickup_lng, row.pickup_address),
            dropoff: optional_point(row.dropoff_lat, row.dropoff_lng, row.dropoff_address),
            status: row.status.parse().map_err(|e| StoreError::Backend(format!("{}", e)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RideSummaryRow {
    ride_driver_id: Uuid,
    ride_origin_address: Option<String>,
    ride_destination_address: Option<String>,
    ride_departure_time: DateTime<Utc>,
    ride_status: String,
}

impl RideSummaryRow {
    fn into_summary(self, ride_id: Uuid) -> Result<RideSummary, StoreError> {
        Ok(RideSummary {
            id: ride_id,
            driver_id: self.ride_driver_id,
            origin_address: self.ride_origin_address,
            destination_address: self.ride_destination_address,
            departure_time: self.ride_departure_time,
            status: self.ride_status.parse().map_err(|e| StoreError::Backend(format!("{}", e)))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DriverContactRow {
    driver_first_name: String,
    driver_last_name: String,
    driver_phone: Option<String>,
    driver_car_model: Option<String>,
    driver_car_plate: Option<String>,
}

impl From<DriverContactRow> for DriverContact {
    fn from(row: DriverContactRow) -> Self {
        DriverContact {
            first_name: row.driver_first_name,
            last_name: row.driver_last_name,
            phone: row.driver_phone,
            car_model: row.driver_car_model,
            car_plate: row.driver_car_plate,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PassengerRow {
    passenger_first_name: String,
    passenger_last_name: String,
    passenger_phone: Option<String>,
    passenger_rating: Option<f64>,
}

impl From<PassengerRow> for PassengerSummary {
    fn from(row: PassengerRow) -> Self {
        PassengerSummary {
            first_name: row.passenger_first_name,
            last_name: row.passenger_last_name,
            phone: row.passenger_phone,
            rating: row.passenger_rating,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PassengerBookingRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    #[sqlx(flatten)]
    ride: RideSummaryRow,
    #[sqlx(flatten)]
    driver: DriverContactRow,
}

impl TryFrom<PassengerBookingRow> for PassengerBooking {
    type Error = StoreError;

    fn try_from(row: PassengerBookingRow) -> Result<Self, Self::Error> {
        let booking = Booking::try_from(row.booking)?;
        Ok(PassengerBooking {
            ride: row.ride.into_summary(booking.ride_id)?,
            driver: row.driver.into(),
            booking,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RideBookingRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    #[sqlx(flatten)]
    passenger: PassengerRow,
}

impl TryFrom<RideBookingRow> for RideBooking {
    type Error = StoreError;

    fn try_from(row: RideBookingRow) -> Result<Self, Self::Error> {
        Ok(RideBooking {
            booking: row.booking.try_into()?,
            passenger: row.passenger.into(),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookingDetailRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    #[sqlx(flatten)]
    ride: RideSummaryRow,
    #[sqlx(flatten)]
    driver: DriverContactRow,
    #[sqlx(flatten)]
    passenger: PassengerRow,
}

impl TryFrom<BookingDetailRow> for BookingDetail {
    type Error = StoreError;

    fn try_from(row: BookingDetailRow) -> Result<Self, Self::Error> {
        let booking = Booking::try_from(row.booking)?;
        Ok(BookingDetail {
            ride: row.ride.into_summary(booking.ride_id)?,
            driver: row.driver.into(),
            passenger: row.passenger.into(),
            booking,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LocationRow {
    ride_id: Uuid,
    latitude: f64,
    longitude: f64,
    speed: Option<f64>,
    heading: Option<f64>,
    timestamp: DateTime<Utc>,
}

impl From<LocationRow> for LocationSample {
    fn from(row: LocationRow) -> Self {
        LocationSample {
            ride_id: row.ride_id,
            latitude: row.latitude,
            longitude: row.longitude,
            speed: row.speed,
            heading: row.heading,
            timestamp: row.timestamp,
        }
    }
}

pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridepool_core::{BookingStatus, RideStatus};

    fn booking_row(status: &str) -> BookingRow {
        let now = Utc::now();
        BookingRow {
            id: Uuid::new_v4(),
            ride_id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            seats_booked: 2,
            total_price_cents: 5000,
            pickup_lat: Some(40.7),
            pickup_lng: Some(-74.0),
            pickup_address: Some("Penn Station".to_string()),
            dropoff_lat: None,
            dropoff_lng: None,
            dropoff_address: Some("ignored without coordinates".to_string()),
            status: status.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_booking_row_decodes_status_and_points() {
        let booking = Booking::try_from(booking_row("confirmed")).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.pickup.unwrap().address.as_deref(), Some("Penn Station"));
        assert!(booking.dropoff.is_none());
    }

    #[test]
    fn test_unknown_status_is_a_backend_error() {
        let err = Booking::try_from(booking_row("EXPIRED")).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_qualified_columns() {
        assert_eq!(qualified("id, ride_id,status", "b"), "b.id, b.ride_id, b.status");
    }

    #[test]
    fn test_passenger_booking_row_uses_booking_ride_id() {
        let booking = booking_row("pending");
        let ride_id = booking.ride_id;
        let row = PassengerBookingRow {
            booking,
            ride: RideSummaryRow {
                ride_driver_id: Uuid::new_v4(),
                ride_origin_address: Some("Union Station".to_string()),
                ride_destination_address: None,
                ride_departure_time: Utc::now(),
                ride_status: "completed".to_string(),
            },
            driver: DriverContactRow {
                driver_first_name: "Rosa".to_string(),
                driver_last_name: "Ng".to_string(),
                driver_phone: Some("555-0188".to_string()),
                driver_car_model: None,
                driver_car_plate: None,
            },
        };

        let view = PassengerBooking::try_from(row).unwrap();
        assert_eq!(view.ride.id, ride_id);
        assert_eq!(view.ride.status, RideStatus::Completed);
        assert_eq!(view.driver.phone.as_deref(), Some("555-0188"));
    }

    #[test]
    fn test_ride_row_decodes() {
        let now = Utc::now();
        let row = RideRow {
            id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            origin_lat: 40.7,
            origin_lng: -74.0,
            origin_address: None,
            destination_lat: 42.3,
            destination_lng: -71.0,
            destination_address: None,
            departure_time: now,
            arrival_time: None,
            total_seats: 4,
            available_seats: 1,
            price_per_seat_cents: 1200,
            status: "in_progress".to_string(),
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let ride = Ride::try_from(row).unwrap();
        assert_eq!(ride.status, RideStatus::InProgress);
        assert_eq!(ride.booked_seats(), 3);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::{
    Booking, BookingDetail, BookingStatus, LocationSample, PassengerBooking, Ride, RideBooking, RideListing,
    RideSearch, RideStore, StoreError, StoreResult, StoreTx,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::database::classify_error;
use crate::rows::{
    convert_all, qualified, BookingDetailRow, BookingRow, ListingRow, LocationRow, PassengerBookingRow,
    RideBookingRow, RideRow, BOOKING_COLUMNS, DRIVER_CONTACT_SELECT, DRIVER_SUMMARY_SELECT, PASSENGER_SELECT,
    RIDE_COLUMNS, RIDE_SUMMARY_SELECT,
};

/// PostgreSQL-backed store. Seat and status mutations run inside
/// transactions that hold `FOR UPDATE` row locks on the ride being changed.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RideStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(classify_error)?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }

    async fn insert_ride(&self, ride: &Ride) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rides (id, driver_id, origin_lat, origin_lng, origin_address,
                destination_lat, destination_lng, destination_address, departure_time, arrival_time,
                total_seats, available_seats, price_per_seat_cents, status, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(ride.id)
        .bind(ride.driver_id)
        .bind(ride.origin.lat)
        .bind(ride.origin.lng)
        .bind(ride.origin.address.as_deref())
        .bind(ride.destination.lat)
        .bind(ride.destination.lng)
        .bind(ride.destination.address.as_deref())
        .bind(ride.departure_time)
        .bind(ride.arrival_time)
        .bind(ride.total_seats)
        .bind(ride.available_seats)
        .bind(ride.price_per_seat_cents)
        .bind(ride.status.as_str())
        .bind(ride.notes.as_deref())
        .bind(ride.created_at)
        .bind(ride.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify_error)?;
        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        let sql = format!("SELECT {} FROM rides WHERE id = $1", RIDE_COLUMNS);
        let row = sqlx::query_as::<_, RideRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_error)?;
        row.map(Ride::try_from).transpose()
    }

    async fn get_ride_listing(&self, id: Uuid) -> StoreResult<Option<RideListing>> {
        let sql = format!(
            "SELECT {}, {} FROM rides r LEFT JOIN users d ON r.driver_id = d.id WHERE r.id = $1",
            qualified(RIDE_COLUMNS, "r"),
            DRIVER_SUMMARY_SELECT
        );
        let row = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_error)?;
        row.map(RideListing::try_from).transpose()
    }

    async fn search_rides(&self, search: &RideSearch) -> StoreResult<Vec<RideListing>> {
        // Placeholder geography: plain coordinate ranges, no spatial index.
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {}, {} FROM rides r LEFT JOIN users d ON r.driver_id = d.id \
             WHERE r.status = 'scheduled' AND r.available_seats >= ",
            qualified(RIDE_COLUMNS, "r"),
            DRIVER_SUMMARY_SELECT
        ));
        qb.push_bind(search.seats_needed);

        if let Some(date) = search.date {
            qb.push(" AND (r.departure_time AT TIME ZONE 'UTC')::date = ");
            qb.push_bind(date);
        }
        if let Some(bbox) = &search.origin_box {
            qb.push(" AND r.origin_lat BETWEEN ").push_bind(bbox.min_lat);
            qb.push(" AND ").push_bind(bbox.max_lat);
            qb.push(" AND r.origin_lng BETWEEN ").push_bind(bbox.min_lng);
            qb.push(" AND ").push_bind(bbox.max_lng);
        }
        if let Some(bbox) = &search.dest_box {
            qb.push(" AND r.destination_lat BETWEEN ").push_bind(bbox.min_lat);
            qb.push(" AND ").push_bind(bbox.max_lat);
            qb.push(" AND r.destination_lng BETWEEN ").push_bind(bbox.min_lng);
            qb.push(" AND ").push_bind(bbox.max_lng);
        }
        qb.push(" ORDER BY r.departure_time ASC");

        let rows = qb
            .build_query_as::<ListingRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(classify_error)?;
        convert_all(rows)
    }

    async fn list_rides_by_driver(&self, driver_id: Uuid) -> StoreResult<Vec<Ride>> {
        let sql = format!(
            "SELECT {} FROM rides WHERE driver_id = $1 ORDER BY departure_time DESC",
            RIDE_COLUMNS
        );
        let rows = sqlx::query_as::<_, RideRow>(&sql)
            .bind(driver_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_error)?;
        convert_all(rows)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn get_booking_detail(&self, id: Uuid) -> StoreResult<Option<BookingDetail>> {
        let sql = format!(
            "SELECT {}, {}, {}, {} FROM bookings b \
             JOIN rides r ON b.ride_id = r.id \
             LEFT JOIN users d ON r.driver_id = d.id \
             LEFT JOIN users p ON b.passenger_id = p.id \
             WHERE b.id = $1",
            qualified(BOOKING_COLUMNS, "b"),
            RIDE_SUMMARY_SELECT,
            DRIVER_CONTACT_SELECT,
            PASSENGER_SELECT
        );
        let row = sqlx::query_as::<_, BookingDetailRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_error)?;
        row.map(BookingDetail::try_from).transpose()
    }

    async fn list_bookings_by_passenger(&self, passenger_id: Uuid) -> StoreResult<Vec<PassengerBooking>> {
        let sql = format!(
            "SELECT {}, {}, {} FROM bookings b \
             JOIN rides r ON b.ride_id = r.id \
             LEFT JOIN users d ON r.driver_id = d.id \
             WHERE b.passenger_id = $1 \
             ORDER BY r.departure_time DESC, b.created_at DESC",
            qualified(BOOKING_COLUMNS, "b"),
            RIDE_SUMMARY_SELECT,
            DRIVER_CONTACT_SELECT
        );
        let rows = sqlx::query_as::<_, PassengerBookingRow>(&sql)
            .bind(passenger_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_error)?;
        convert_all(rows)
    }

    async fn list_bookings_by_ride(&self, ride_id: Uuid) -> StoreResult<Vec<RideBooking>> {
        let sql = format!(
            "SELECT {}, {} FROM bookings b \
             LEFT JOIN users p ON b.passenger_id = p.id \
             WHERE b.ride_id = $1 \
             ORDER BY b.created_at DESC",
            qualified(BOOKING_COLUMNS, "b"),
            PASSENGER_SELECT
        );
        let rows = sqlx::query_as::<_, RideBookingRow>(&sql)
            .bind(ride_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_error)?;
        convert_all(rows)
    }

    async fn has_uncancelled_booking(&self, ride_id: Uuid, passenger_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE ride_id = $1 AND passenger_id = $2 \
             AND status <> 'cancelled')",
        )
        .bind(ride_id)
        .bind(passenger_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_error)?;
        Ok(exists)
    }

    async fn append_location(&self, sample: &LocationSample) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO location_tracking (ride_id, latitude, longitude, speed, heading, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(sample.ride_id)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.speed)
        .bind(sample.heading)
        .bind(sample.timestamp)
        .execute(&self.pool)
        .await
        .map_err(classify_error)?;
        Ok(())
    }

    async fn recent_locations(&self, ride_id: Uuid, limit: i64) -> StoreResult<Vec<LocationSample>> {
        let rows = sqlx::query_as::<_, LocationRow>(
            "SELECT ride_id, latitude, longitude, speed, heading, timestamp \
             FROM location_tracking WHERE ride_id = $1 \
             ORDER BY timestamp DESC, id DESC LIMIT $2",
        )
        .bind(ride_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_error)?;
        Ok(rows.into_iter().map(LocationSample::from).collect())
    }
}

/// Open database transaction. Dropping it unfinished rolls back.
pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_ride(&mut self, id: Uuid) -> StoreResult<Option<Ride>> {
        let sql = format!("SELECT {} FROM rides WHERE id = $1 FOR UPDATE", RIDE_COLUMNS);
        let row = sqlx::query_as::<_, RideRow>(&sql)
            .bind(id)
            .fetch_optional(self.conn()?)
            .await
            .map_err(classify_error)?;
        row.map(Ride::try_from).transpose()
    }

    async fn update_ride(&mut self, ride: &Ride) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE rides
            SET departure_time = $2,
                arrival_time = $3,
                total_seats = $4,
                available_seats = $5,
                price_per_seat_cents = $6,
                status = $7,
                notes = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(ride.id)
        .bind(ride.departure_time)
        .bind(ride.arrival_time)
        .bind(ride.total_seats)
        .bind(ride.available_seats)
        .bind(ride.price_per_seat_cents)
        .bind(ride.status.as_str())
        .bind(ride.notes.as_deref())
        .bind(ride.updated_at)
        .execute(self.conn()?)
        .await
        .map_err(classify_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ForeignKeyViolation(format!("ride {} does not exist", ride.id)));
        }
        Ok(())
    }

    async fn adjust_available_seats(&mut self, ride_id: Uuid, delta: i32) -> StoreResult<Option<i32>> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE rides
            SET available_seats = available_seats + $2, updated_at = NOW()
            WHERE id = $1 AND available_seats + $2 BETWEEN 0 AND total_seats
            RETURNING available_seats
            "#,
        )
        .bind(ride_id)
        .bind(delta)
        .fetch_optional(self.conn()?)
        .await
        .map_err(classify_error)
    }

    async fn delete_ride(&mut self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM rides WHERE id = $1")
            .bind(id)
            .execute(self.conn()?)
            .await
            .map_err(classify_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1 FOR UPDATE", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(self.conn()?)
            .await
            .map_err(classify_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_uncancelled_booking(&mut self, ride_id: Uuid, passenger_id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE ride_id = $1 AND passenger_id = $2 \
             AND status <> 'cancelled'",
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(ride_id)
            .bind(passenger_id)
            .fetch_optional(self.conn()?)
            .await
            .map_err(classify_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn active_bookings_for_ride(&mut self, ride_id: Uuid) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE ride_id = $1 AND status IN ('pending', 'confirmed') \
             ORDER BY created_at FOR UPDATE",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(ride_id)
            .fetch_all(self.conn()?)
            .await
            .map_err(classify_error)?;
        convert_all(rows)
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        let pickup = booking.pickup.as_ref();
        let dropoff = booking.dropoff.as_ref();
        sqlx::query(
            r#"
            INSERT INTO bookings (id, ride_id, passenger_id, seats_booked, total_price_cents,
                pickup_lat, pickup_lng, pickup_address, dropoff_lat, dropoff_lng, dropoff_address,
                status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(booking.id)
        .bind(booking.ride_id)
        .bind(booking.passenger_id)
        .bind(booking.seats_booked)
        .bind(booking.total_price_cents)
        .bind(pickup.map(|p| p.lat))
        .bind(pickup.map(|p| p.lng))
        .bind(pickup.and_then(|p| p.address.as_deref()))
        .bind(dropoff.map(|p| p.lat))
        .bind(dropoff.map(|p| p.lng))
        .bind(dropoff.and_then(|p| p.address.as_deref()))
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(self.conn()?)
        .await
        .map_err(classify_error)?;
        Ok(())
    }

    async fn set_booking_status(&mut self, id: Uuid, status: BookingStatus, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(at)
            .execute(self.conn()?)
            .await
            .map_err(classify_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ForeignKeyViolation(format!("booking {} does not exist", id)));
        }
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))?;
        tx.commit().await.map_err(classify_error)
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(classify_error),
            None => Ok(()),
        }
    }
}

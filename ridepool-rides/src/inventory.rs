//! Seat inventory primitives.
//!
//! Both functions run inside a caller-owned transaction, so the seat change
//! commits or rolls back together with whatever booking write accompanies it.

use ridepool_core::{CoreError, CoreResult, StoreTx};
use uuid::Uuid;

/// Takes `count` seats off the ride. Returns the remaining capacity.
pub async fn reserve_seats(tx: &mut dyn StoreTx, ride_id: Uuid, count: i32) -> CoreResult<i32> {
    if count < 1 {
        return Err(CoreError::ValidationError(format!("cannot reserve {} seats", count)));
    }

    match tx.adjust_available_seats(ride_id, -count).await? {
        Some(remaining) => Ok(remaining),
        None => {
            // Bound refused; report what is actually left.
            let ride = tx
                .lock_ride(ride_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("ride {}", ride_id)))?;
            Err(CoreError::InsufficientCapacity {
                requested: count,
                available: ride.available_seats,
            })
        }
    }
}

/// Returns `count` seats to the ride. Returns the new capacity.
///
/// Releasing more seats than are booked would push capacity past
/// `total_seats`; that is refused as `InvalidState`.
pub async fn release_seats(tx: &mut dyn StoreTx, ride_id: Uuid, count: i32) -> CoreResult<i32> {
    if count < 1 {
        return Err(CoreError::ValidationError(format!("cannot release {} seats", count)));
    }

    tx.adjust_available_seats(ride_id, count).await?.ok_or_else(|| {
        CoreError::InvalidState(format!("releasing {} seats would exceed the capacity of ride {}", count, ride_id))
    })
}

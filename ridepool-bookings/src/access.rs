use ridepool_core::{CoreError, CoreResult, ParticipantRole, Ride, RideStore};
use uuid::Uuid;

/// Resolves `user_id`'s role on a ride: its driver, or a passenger holding a
/// booking on it that is not cancelled.
///
/// Anyone else, including callers asking about a ride that does not exist,
/// gets `Forbidden`.
pub async fn ride_participant(
    store: &dyn RideStore,
    ride_id: Uuid,
    user_id: Uuid,
) -> CoreResult<(Ride, ParticipantRole)> {
    let ride = store.get_ride(ride_id).await?.ok_or_else(|| not_a_participant(ride_id))?;

    if ride.driver_id == user_id {
        return Ok((ride, ParticipantRole::Driver));
    }
    if store.has_uncancelled_booking(ride_id, user_id).await? {
        return Ok((ride, ParticipantRole::Passenger));
    }
    Err(not_a_participant(ride_id))
}

fn not_a_participant(ride_id: Uuid) -> CoreError {
    CoreError::Forbidden(format!("not a participant of ride {}", ride_id))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use ridepool_core::{NewRide, Principal, RideUpdate};
use ridepool_rides::SearchParams;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/rides", axum::routing::post(create_ride))
        .route("/api/rides/search", get(search_rides))
        .route("/api/rides/my-rides", get(my_rides))
        .route(
            "/api/rides/{id}",
            get(get_ride).put(update_ride).delete(delete_ride),
        )
}

/// POST /api/rides
async fn create_ride(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<NewRide>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let ride = state.rides.create(&principal, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Ride created successfully", "ride": ride })),
    ))
}

/// GET /api/rides/search?date=&seats=&origin_lat=&origin_lng=&dest_lat=&dest_lng=
async fn search_rides(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, AppError> {
    let rides = state.rides.search_near(params).await?;
    Ok(Json(json!({ "rides": rides })))
}

/// GET /api/rides/my-rides
async fn my_rides(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Value>, AppError> {
    let rides = state.rides.list_by_driver(principal.user_id).await?;
    Ok(Json(json!({ "rides": rides })))
}

/// GET /api/rides/{id}
async fn get_ride(State(state): State<AppState>, Path(ride_id): Path<Uuid>) -> Result<Json<Value>, AppError> {
    let ride = state.rides.get_listing(ride_id).await?;
    Ok(Json(json!(ride)))
}

/// PUT /api/rides/{id}
/// A terminal status also shuts the ride's live channel.
async fn update_ride(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(ride_id): Path<Uuid>,
    Json(req): Json<RideUpdate>,
) -> Result<Json<Value>, AppError> {
    let ride = state.rides.update(ride_id, principal.user_id, req).await?;
    if ride.status.is_terminal() {
        state.relay.end_ride(ride.id);
    }
    Ok(Json(json!({ "message": "Ride updated successfully", "ride": ride })))
}

/// DELETE /api/rides/{id}
async fn delete_ride(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.rides.delete(ride_id, principal.user_id).await?;
    state.relay.end_ride(ride_id);
    Ok(Json(json!({ "message": "Ride deleted successfully" })))
}

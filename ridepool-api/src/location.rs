use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::{Stream, StreamExt};
use ridepool_core::{LocationUpdate, Principal};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/location/update", post(update_location))
        .route("/api/location/ride/{ride_id}/history", get(history))
        .route("/api/location/ride/{ride_id}/current", get(current))
        .route("/api/location/ride/{ride_id}/live", get(live))
}

/// POST /api/location/update
async fn update_location(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<LocationUpdate>,
) -> Result<Json<Value>, AppError> {
    let sample = state.relay.record_sample(principal.user_id, req).await?;
    Ok(Json(json!({ "message": "Location updated successfully", "location": sample })))
}

/// GET /api/location/ride/{ride_id}/history
async fn history(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(ride_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let locations = state.relay.history(ride_id, principal.user_id, query.limit).await?;
    Ok(Json(json!({ "locations": locations })))
}

/// GET /api/location/ride/{ride_id}/current
async fn current(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let sample = state.relay.current(ride_id, principal.user_id).await?;
    Ok(Json(json!(sample)))
}

/// GET /api/location/ride/{ride_id}/live
/// Server-sent `location-update` events until the ride ends or the client
/// disconnects; disconnecting leaves the channel.
async fn live(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(ride_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let subscription = state.relay.subscribe(ride_id, principal.user_id).await?;

    let stream = subscription
        .into_stream()
        .map(|sample| Event::default().event("location-update").json_data(&sample));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

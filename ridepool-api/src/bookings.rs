use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use ridepool_core::{BookingStatus, NewBooking, Principal};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/my-bookings", get(my_bookings))
        .route("/api/bookings/ride/{ride_id}", get(ride_bookings))
        .route("/api/bookings/{id}", get(get_booking))
        .route("/api/bookings/{id}/status", patch(update_status))
}

/// POST /api/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking = state.bookings.create_booking(&principal, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Booking created successfully", "booking": booking })),
    ))
}

/// GET /api/bookings/my-bookings
async fn my_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Value>, AppError> {
    let bookings = state.bookings.list_for_passenger(principal.user_id).await?;
    Ok(Json(json!({ "bookings": bookings })))
}

/// GET /api/bookings/ride/{ride_id}
async fn ride_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let bookings = state.bookings.list_for_ride(ride_id, principal.user_id).await?;
    Ok(Json(json!({ "bookings": bookings })))
}

/// GET /api/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let booking = state.bookings.get(booking_id, principal.user_id).await?;
    Ok(Json(json!(booking)))
}

/// PATCH /api/bookings/{id}/status
async fn update_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = state
        .bookings
        .cancel_or_update_status(booking_id, principal.user_id, req.status)
        .await?;
    Ok(Json(json!({ "message": "Booking status updated successfully", "booking": booking })))
}

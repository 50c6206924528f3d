use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use futures_util::StreamExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use ridepool_api::{app, middleware::Claims, AppState, AuthConfig};
use ridepool_core::UserProfile;
use ridepool_store::app_config::{RelayConfig, SearchConfig};
use ridepool_store::MemoryStore;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-secret";

struct TestApp {
    router: Router,
    store: MemoryStore,
}

fn test_app() -> TestApp {
    let store = MemoryStore::new();
    let state = AppState::new(
        Arc::new(store.clone()),
        AuthConfig {
            secret: SECRET.to_string(),
        },
        &RelayConfig::default(),
        &SearchConfig::default(),
    );
    TestApp {
        router: app(state),
        store,
    }
}

fn token(user_id: Uuid, is_driver: bool) -> String {
    let claims = Claims {
        sub: user_id,
        is_driver,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn send(router: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn ride_body(total_seats: i32, price_per_seat_cents: i64) -> Value {
    json!({
        "origin": { "lat": 40.7128, "lng": -74.0060, "address": "New York" },
        "destination": { "lat": 39.9526, "lng": -75.1652, "address": "Philadelphia" },
        "departure_time": "2026-11-21T08:00:00Z",
        "total_seats": total_seats,
        "price_per_seat_cents": price_per_seat_cents,
        "notes": "One stop in Trenton"
    })
}

async fn create_ride(router: &Router, driver: &str, total_seats: i32, price: i64) -> String {
    let (status, body) = send(router, Method::POST, "/api/rides", Some(driver), Some(ride_body(total_seats, price))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["ride"]["id"].as_str().unwrap().to_string()
}

async fn available_seats(router: &Router, token: &str, ride_id: &str) -> i64 {
    let (status, body) = send(router, Method::GET, &format!("/api/rides/{}", ride_id), Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    body["available_seats"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = test_app();
    let (status, body) = send(&app.router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_api_requires_valid_token() {
    let app = test_app();

    let (status, body) = send(&app.router, Method::GET, "/api/rides/my-rides", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = send(&app.router, Method::GET, "/api/rides/my-rides", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = encode(
        &Header::default(),
        &Claims {
            sub: Uuid::new_v4(),
            is_driver: true,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        },
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();
    let (status, _) = send(&app.router, Method::GET, "/api/rides/my-rides", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_booking_flow_over_http() {
    let app = test_app();
    let driver = token(Uuid::new_v4(), true);
    let p = token(Uuid::new_v4(), false);
    let q = token(Uuid::new_v4(), false);
    let late = token(Uuid::new_v4(), false);

    let ride_id = create_ride(&app.router, &driver, 3, 1000).await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/bookings",
        Some(&p),
        Some(json!({ "ride_id": ride_id, "seats_booked": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["booking"]["status"], "pending");
    assert_eq!(body["booking"]["total_price_cents"], 2000);
    let b1 = body["booking"]["id"].as_str().unwrap().to_string();
    assert_eq!(available_seats(&app.router, &p, &ride_id).await, 1);

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/bookings",
        Some(&p),
        Some(json!({ "ride_id": ride_id, "seats_booked": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "duplicate_booking");

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/bookings",
        Some(&q),
        Some(json!({ "ride_id": ride_id, "seats_booked": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/bookings",
        Some(&late),
        Some(json!({ "ride_id": ride_id, "seats_booked": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_capacity");

    let (status, body) = send(
        &app.router,
        Method::PATCH,
        &format!("/api/bookings/{}/status", b1),
        Some(&driver),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "cancelled");
    assert_eq!(available_seats(&app.router, &driver, &ride_id).await, 2);

    let (status, body) = send(
        &app.router,
        Method::PATCH,
        &format!("/api/bookings/{}/status", b1),
        Some(&p),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");
    assert_eq!(available_seats(&app.router, &driver, &ride_id).await, 2);

    let (status, body) = send(&app.router, Method::GET, "/api/bookings/my-bookings", Some(&p), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bookings"].as_array().unwrap().len(), 1);
    assert_eq!(body["bookings"][0]["status"], "cancelled");
    assert_eq!(body["bookings"][0]["ride"]["id"], ride_id.as_str());
    assert!(body["bookings"][0]["driver"].is_object());

    let (status, body) = send(&app.router, Method::GET, &format!("/api/bookings/ride/{}", ride_id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bookings"].as_array().unwrap().len(), 2);
    assert!(body["bookings"][0]["passenger"].is_object());

    let (status, body) = send(&app.router, Method::GET, &format!("/api/bookings/{}", b1), Some(&p), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], b1.as_str());
    assert_eq!(body["ride"]["id"], ride_id.as_str());
    assert!(body["passenger"].is_object());

    let (status, _) = send(&app.router, Method::GET, &format!("/api/bookings/ride/{}", ride_id), Some(&q), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app.router, Method::GET, &format!("/api/bookings/{}", b1), Some(&q), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ride_management_over_http() {
    let app = test_app();
    let driver_id = Uuid::new_v4();
    let driver = token(driver_id, true);
    let passenger = token(Uuid::new_v4(), false);
    app.store
        .register_user(
            driver_id,
            UserProfile {
                first_name: "Sam".to_string(),
                last_name: "Rivera".to_string(),
                phone: Some("555-0142".to_string()),
                rating: Some(4.6),
                car_model: Some("Prius".to_string()),
                car_plate: Some("RDE-204".to_string()),
            },
        )
        .await;

    let (status, body) = send(&app.router, Method::POST, "/api/rides", Some(&passenger), Some(ride_body(3, 1000))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, body) = send(&app.router, Method::POST, "/api/rides", Some(&driver), Some(ride_body(0, 1000))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let ride_id = create_ride(&app.router, &driver, 3, 1000).await;

    let (status, body) = send(
        &app.router,
        Method::GET,
        "/api/rides/search?date=2026-11-21&seats=2&origin_lat=40.8&origin_lng=-74.1",
        Some(&passenger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rides = body["rides"].as_array().unwrap();
    assert_eq!(rides.len(), 1);
    assert_eq!(rides[0]["id"], ride_id.as_str());
    assert_eq!(rides[0]["driver"]["first_name"], "Sam");
    assert!(rides[0]["driver"].get("phone").is_none());

    let (status, body) = send(&app.router, Method::GET, &format!("/api/rides/{}", ride_id), Some(&passenger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], ride_id.as_str());
    assert_eq!(body["driver"]["car_plate"], "RDE-204");

    let (status, body) = send(&app.router, Method::GET, "/api/rides/search?seats=4", Some(&passenger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["rides"].as_array().unwrap().is_empty());

    let (status, body) = send(
        &app.router,
        Method::PUT,
        &format!("/api/rides/{}", ride_id),
        Some(&driver),
        Some(json!({ "total_seats": 5, "notes": "Bigger car" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ride"]["total_seats"], 5);
    assert_eq!(body["ride"]["available_seats"], 5);
    assert_eq!(body["ride"]["notes"], "Bigger car");

    let (status, _) = send(
        &app.router,
        Method::PUT,
        &format!("/api/rides/{}", Uuid::new_v4()),
        Some(&driver),
        Some(json!({ "notes": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app.router, Method::GET, "/api/rides/my-rides", Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rides"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app.router, Method::DELETE, &format!("/api/rides/{}", ride_id), Some(&passenger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app.router, Method::DELETE, &format!("/api/rides/{}", ride_id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, Method::GET, &format!("/api/rides/{}", ride_id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_location_tracking_over_http() {
    let app = test_app();
    let driver = token(Uuid::new_v4(), true);
    let passenger = token(Uuid::new_v4(), false);
    let stranger = token(Uuid::new_v4(), false);

    let ride_id = create_ride(&app.router, &driver, 2, 1500).await;
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/bookings",
        Some(&passenger),
        Some(json!({ "ride_id": ride_id, "seats_booked": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let report = |latitude: f64| json!({ "ride_id": ride_id, "latitude": latitude, "longitude": -74.5, "speed": 60.0 });

    let (status, body) = send(&app.router, Method::POST, "/api/location/update", Some(&driver), Some(report(40.5))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");

    let (status, _) = send(
        &app.router,
        Method::PUT,
        &format!("/api/rides/{}", ride_id),
        Some(&driver),
        Some(json!({ "status": "in_progress" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for latitude in [40.5, 40.4, 40.3] {
        let (status, _) = send(&app.router, Method::POST, "/api/location/update", Some(&driver), Some(report(latitude))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = send(&app.router, Method::POST, "/api/location/update", Some(&passenger), Some(report(40.2))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app.router,
        Method::GET,
        &format!("/api/location/ride/{}/current", ride_id),
        Some(&passenger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["latitude"], 40.3);

    let (status, body) = send(
        &app.router,
        Method::GET,
        &format!("/api/location/ride/{}/history?limit=2", ride_id),
        Some(&driver),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locations"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app.router,
        Method::GET,
        &format!("/api/location/ride/{}/history", ride_id),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_live_channel_streams_samples() {
    let app = test_app();
    let driver = token(Uuid::new_v4(), true);
    let passenger = token(Uuid::new_v4(), false);
    let stranger = token(Uuid::new_v4(), false);

    let ride_id = create_ride(&app.router, &driver, 2, 1500).await;
    send(
        &app.router,
        Method::POST,
        "/api/bookings",
        Some(&passenger),
        Some(json!({ "ride_id": ride_id, "seats_booked": 1 })),
    )
    .await;
    send(
        &app.router,
        Method::PUT,
        &format!("/api/rides/{}", ride_id),
        Some(&driver),
        Some(json!({ "status": "in_progress" })),
    )
    .await;

    let live_uri = format!("/api/location/ride/{}/live", ride_id);

    // Same gate as history/current.
    let (status, _) = send(&app.router, Method::GET, &live_uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .uri(&live_uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", passenger))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let mut events = response.into_body().into_data_stream();

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/location/update",
        Some(&driver),
        Some(json!({ "ride_id": ride_id, "latitude": 40.1, "longitude": -74.9 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frame = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains("event: location-update"));
    assert!(text.contains("\"latitude\":40.1"));

    // Completing the ride ends the stream.
    send(
        &app.router,
        Method::PUT,
        &format!("/api/rides/{}", ride_id),
        Some(&driver),
        Some(json!({ "status": "completed" })),
    )
    .await;
    let end = tokio::time::timeout(Duration::from_secs(5), events.next()).await.unwrap();
    assert!(end.is_none());
}

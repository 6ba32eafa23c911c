use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use hibiscus_api::middleware::AdminClaims;
use hibiscus_api::{app, AppState, AuthConfig};
use hibiscus_booking::BookingManager;
use hibiscus_dispatch::{DispatchService, TrackingService};
use hibiscus_notify::providers::Outbox;
use hibiscus_notify::NotificationDispatcher;
use hibiscus_pricing::{PricingConfig, PricingEngine};
use hibiscus_store::app_config::{BusinessRules, NotificationsConfig};
use hibiscus_store::{InMemoryBookingRepository, InMemoryDriverRepository, InMemorySessionStore};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "api-test-secret";
const CUSTOMER: &str = "ana@example.com";

struct TestApp {
    router: Router,
    outbox: Arc<Outbox>,
}

fn test_app() -> TestApp {
    let bookings = Arc::new(InMemoryBookingRepository::new());
    let drivers = Arc::new(InMemoryDriverRepository::new());
    let sessions = Arc::new(InMemorySessionStore::new());
    let outbox = Arc::new(Outbox::new());
    let rules = BusinessRules::default();
    let settings = NotificationsConfig {
        admin_email: "admin@hibiscus.test".into(),
        ..NotificationsConfig::default()
    };
    let notifier = NotificationDispatcher::new(settings, rules.utc_offset_hours)
        .with_email(outbox.clone())
        .with_sms(outbox.clone())
        .with_calendar(outbox.clone());

    let manager = BookingManager::new(
        bookings.clone(),
        notifier.clone(),
        PricingEngine::new(PricingConfig::default()),
        rules.clone(),
    );
    let tracking = TrackingService::new(
        bookings.clone(),
        drivers.clone(),
        sessions.clone(),
        notifier.clone(),
        rules.clone(),
        tokio::sync::broadcast::channel(16).0,
    );
    let dispatch = DispatchService::new(bookings, drivers.clone(), sessions, notifier, rules);

    let state = AppState {
        bookings: Arc::new(manager),
        dispatch: Arc::new(dispatch),
        tracking: Arc::new(tracking),
        drivers,
        redis: None,
        auth: AuthConfig {
            secret: SECRET.to_string(),
        },
    };
    TestApp {
        router: app(state),
        outbox,
    }
}

fn token(role: &str) -> String {
    let claims = AdminClaims {
        sub: "admin-1".into(),
        email: Some("ops@hibiscus.test".into()),
        role: role.into(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
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
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn booking_body() -> Value {
    json!({
        "name": "Ana Lee",
        "email": CUSTOMER,
        "phone": "021555123",
        "pickup_address": "1 Queen St, Auckland",
        "dropoff_address": "Auckland Airport",
        "date": "2030-01-10",
        "time": "06:30",
        "passengers": 2,
        "distance_km": 20.0
    })
}

async fn create_booking(router: &Router) -> Value {
    let (status, body) = call(router, Method::POST, "/api/bookings", None, Some(booking_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

async fn create_driver(router: &Router, admin: &str) -> String {
    let (status, driver) = call(
        router,
        Method::POST,
        "/api/drivers",
        Some(admin),
        Some(json!({ "name": "Raj", "phone": "0211111111", "email": "raj@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    driver["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = call(&app.router, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_calculate_price() {
    let app = test_app();
    let (status, body) = call(
        &app.router,
        Method::POST,
        "/api/calculate-price",
        None,
        Some(json!({ "distance_km": 15.0, "passengers": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ratePerKm"], 12.0);
    assert_eq!(body["totalPrice"], 180.0);
}

#[tokio::test]
async fn test_calculate_price_needs_distance_or_addresses() {
    let app = test_app();
    let (status, body) = call(
        &app.router,
        Method::POST,
        "/api/calculate-price",
        None,
        Some(json!({ "passengers": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("distance_km"));
}

#[tokio::test]
async fn test_public_booking_cannot_set_status_or_fare() {
    let app = test_app();
    let mut body = booking_body();
    body["status"] = json!("confirmed");
    body["payment_status"] = json!("paid");
    body["total_price"] = json!(1.0);

    let (status, created) = call(&app.router, Method::POST, "/api/bookings", None, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["booking_ref"], "H1");
    assert_eq!(created["status"], "pending");
    assert_eq!(created["payment_status"], "unpaid");
    assert_ne!(created["total_price"], 1.0);
    assert!(app.outbox.emails_to(CUSTOMER).is_empty());
}

#[tokio::test]
async fn test_admin_routes_require_admin_token() {
    let app = test_app();
    create_booking(&app.router).await;

    let (status, _) = call(&app.router, Method::GET, "/api/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app.router, Method::GET, "/api/bookings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app.router, Method::GET, "/api/bookings", Some(&token("DRIVER")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = call(&app.router, Method::GET, "/api/bookings", Some(&token("ADMIN")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_booking_is_404() {
    let app = test_app();
    let uri = format!("/api/bookings/{}", Uuid::new_v4());
    let (status, body) = call(&app.router, Method::GET, &uri, Some(&token("ADMIN")), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Booking not found");
}

#[tokio::test]
async fn test_delete_restore_round_trip() {
    let app = test_app();
    let admin = token("SUPER_ADMIN");
    let booking = create_booking(&app.router).await;
    let id = booking["id"].as_str().unwrap();

    let uri = format!("/api/bookings/{}", id);
    let (status, deleted) = call(&app.router, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["deleted_by"], "ops@hibiscus.test");

    let (_, trash) = call(&app.router, Method::GET, "/api/bookings/deleted/list", Some(&admin), None).await;
    assert_eq!(trash.as_array().unwrap().len(), 1);

    let (status, restored) = call(
        &app.router,
        Method::POST,
        &format!("/api/bookings/restore/{}", id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["status"], "pending");
    assert!(restored["deleted_at"].is_null());

    let (status, _) = call(
        &app.router,
        Method::DELETE,
        &format!("/api/bookings/permanent/{}", id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resend_respects_cooldown() {
    let app = test_app();
    let admin = token("ADMIN");
    let booking = create_booking(&app.router).await;
    let uri = format!("/api/bookings/{}/resend-email", booking["id"].as_str().unwrap());

    let (status, sent) = call(&app.router, Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["channels_sent"], json!(["email"]));

    let (status, body) = call(&app.router, Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("minute"));

    let (status, _) = call(&app.router, Method::POST, &format!("{}?force=true", uri), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.outbox.emails_to(CUSTOMER).len(), 2);
}

#[tokio::test]
async fn test_driver_accepts_job_over_http() {
    let app = test_app();
    let admin = token("ADMIN");
    let booking = create_booking(&app.router).await;
    let id = booking["id"].as_str().unwrap();
    let driver_id = create_driver(&app.router, &admin).await;

    let (status, assignment) = call(
        &app.router,
        Method::POST,
        &format!("/api/bookings/{}/assign-driver", id),
        Some(&admin),
        Some(json!({ "driver_id": driver_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assignment["tracking_status"], "pending_driver_acceptance");
    let acceptance = assignment["acceptance_token"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app.router,
        Method::GET,
        &format!("/api/driver/job/{}?token=WRONG", id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, job) = call(
        &app.router,
        Method::GET,
        &format!("/api/driver/job/{}?token={}", id, acceptance),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["customer_phone"], "021555123");

    let respond = format!("/api/driver/job/{}/respond", id);
    let answer = json!({ "token": acceptance, "accepted": true });
    let (status, first) = call(&app.router, Method::POST, &respond, None, Some(answer.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "accepted");

    let (_, second) = call(&app.router, Method::POST, &respond, None, Some(answer)).await;
    assert_eq!(second["status"], "already_responded");
}

#[tokio::test]
async fn test_auto_dispatch_without_drivers() {
    let app = test_app();
    let booking = create_booking(&app.router).await;
    let (status, body) = call(
        &app.router,
        Method::POST,
        &format!("/api/bookings/{}/auto-dispatch", booking["id"].as_str().unwrap()),
        Some(&token("ADMIN")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "No drivers available");
}

#[tokio::test]
async fn test_tracking_lifecycle() {
    let app = test_app();
    let admin = token("ADMIN");
    let booking = create_booking(&app.router).await;
    let id = booking["id"].as_str().unwrap();
    let driver_id = create_driver(&app.router, &admin).await;
    let pair = json!({ "booking_id": id, "driver_id": driver_id });

    let (status, started) = call(&app.router, Method::POST, "/api/tracking/start", None, Some(pair)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(started["tracking_url"].as_str().unwrap().ends_with("H1"));

    let location = json!({ "booking_id": id, "driver_id": driver_id, "lat": -36.85, "lng": 174.76 });
    let (status, outcome) = call(
        &app.router,
        Method::POST,
        "/api/tracking/update-location",
        None,
        Some(location),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(outcome["eta_minutes"].is_null());
    assert_eq!(outcome["sms_sent"], false);

    let (_, info) = call(&app.router, Method::GET, "/api/tracking/H1", None, None).await;
    assert_eq!(info["live"], true);
    assert_eq!(info["tracking_status"], "driver_on_way");

    let stop = format!("/api/tracking/stop/{}", id);
    let (status, _) = call(&app.router, Method::POST, &stop, None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app.router, Method::POST, &stop, None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, info) = call(&app.router, Method::GET, "/api/tracking/H1", None, None).await;
    assert_eq!(info["live"], false);
    assert_eq!(info["tracking_status"], "arrived");
}

#[tokio::test]
async fn test_update_location_without_session() {
    let app = test_app();
    let location = json!({ "booking_id": "b-1", "driver_id": "d-1", "lat": -36.85, "lng": 174.76 });
    let (status, _) = call(
        &app.router,
        Method::POST,
        "/api/tracking/update-location",
        None,
        Some(location),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payments_without_gateway() {
    let app = test_app();
    let booking = create_booking(&app.router).await;
    let id = booking["id"].as_str().unwrap();

    let (status, _) = call(
        &app.router,
        Method::POST,
        "/api/payment/create-checkout",
        None,
        Some(json!({ "booking_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, view) = call(&app.router, Method::GET, &format!("/api/payment/status/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["payment_status"], "unpaid");

    let ignored = json!({
        "id": "evt_1",
        "type": "checkout.session.expired",
        "data": { "object": { "id": "cs_1" } }
    });
    let (status, _) = call(&app.router, Method::POST, "/api/webhook/stripe", None, Some(ignored)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_driver_crud() {
    let app = test_app();
    let admin = token("ADMIN");
    let id = create_driver(&app.router, &admin).await;
    let uri = format!("/api/drivers/{}", id);

    let (status, updated) = call(
        &app.router,
        Method::PUT,
        &uri,
        Some(&admin),
        Some(json!({ "vehicle": "Toyota Hiace", "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["vehicle"], "Toyota Hiace");
    assert_eq!(updated["active"], false);

    let (status, _) = call(&app.router, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app.router, Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

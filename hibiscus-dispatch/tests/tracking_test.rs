use async_trait::async_trait;
use hibiscus_core::repository::{BookingRepository, DriverRepository, SessionStore};
use hibiscus_core::routing::{Coordinates, RouteEstimator};
use hibiscus_core::{
    Booking, CoreError, CoreResult, Driver, GeoPoint, SessionStatus, TrackingSession, TrackingStatus,
};
use hibiscus_dispatch::TrackingService;
use hibiscus_notify::providers::Outbox;
use hibiscus_notify::NotificationDispatcher;
use hibiscus_store::app_config::{BusinessRules, NotificationsConfig};
use hibiscus_store::{InMemoryBookingRepository, InMemoryDriverRepository, InMemorySessionStore};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const CUSTOMER_PHONE: &str = "021555123";

/// Replays a fixed list of ETAs, one per call.
struct ScriptedRoute(Mutex<VecDeque<i64>>);

impl ScriptedRoute {
    fn new(etas: &[i64]) -> Self {
        Self(Mutex::new(etas.iter().copied().collect()))
    }
}

#[async_trait]
impl RouteEstimator for ScriptedRoute {
    async fn eta_minutes(&self, _from: Coordinates, _to: &str) -> CoreResult<i64> {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::upstream("script exhausted"))
    }
}

struct BrokenRoute;

#[async_trait]
impl RouteEstimator for BrokenRoute {
    async fn eta_minutes(&self, _from: Coordinates, _to: &str) -> CoreResult<i64> {
        Err(CoreError::upstream("REQUEST_DENIED"))
    }
}

struct SlowRoute;

#[async_trait]
impl RouteEstimator for SlowRoute {
    async fn eta_minutes(&self, _from: Coordinates, _to: &str) -> CoreResult<i64> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(3)
    }
}

/// Session store whose next pair lookup hands back its snapshot late, so a
/// location update can run in between.
struct LaggingSessions {
    inner: Arc<InMemorySessionStore>,
    lag_next_lookup: AtomicBool,
}

#[async_trait]
impl SessionStore for LaggingSessions {
    async fn get(&self, tracking_id: &str) -> CoreResult<Option<TrackingSession>> {
        self.inner.get(tracking_id).await
    }

    async fn put(&self, session: TrackingSession) -> CoreResult<()> {
        self.inner.put(session).await
    }

    async fn delete(&self, tracking_id: &str) -> CoreResult<Option<TrackingSession>> {
        self.inner.delete(tracking_id).await
    }

    async fn activate(&self, tracking_id: &str) -> CoreResult<bool> {
        self.inner.activate(tracking_id).await
    }

    async fn find_by_pair(&self, booking_id: &str, driver_id: &str) -> CoreResult<Option<TrackingSession>> {
        let found = self.inner.find_by_pair(booking_id, driver_id).await?;
        if self.lag_next_lookup.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(found)
    }

    async fn find_by_booking(&self, booking_id: &str) -> CoreResult<Vec<TrackingSession>> {
        self.inner.find_by_booking(booking_id).await
    }

    async fn record_location(&self, tracking_id: &str, location: GeoPoint) -> CoreResult<Option<TrackingSession>> {
        self.inner.record_location(tracking_id, location).await
    }

    async fn record_eta(&self, tracking_id: &str, eta_minutes: i64) -> CoreResult<()> {
        self.inner.record_eta(tracking_id, eta_minutes).await
    }

    async fn claim_proximity(&self, tracking_id: &str) -> CoreResult<bool> {
        self.inner.claim_proximity(tracking_id).await
    }
}

struct Harness {
    bookings: Arc<InMemoryBookingRepository>,
    drivers: Arc<InMemoryDriverRepository>,
    sessions: Arc<InMemorySessionStore>,
    lagging: Arc<LaggingSessions>,
    outbox: Arc<Outbox>,
    driver: Driver,
    service: TrackingService,
}

async fn harness(route: Option<Arc<dyn RouteEstimator>>, rules: BusinessRules) -> Harness {
    let bookings = Arc::new(InMemoryBookingRepository::new());
    let drivers = Arc::new(InMemoryDriverRepository::new());
    let sessions = Arc::new(InMemorySessionStore::new());
    let outbox = Arc::new(Outbox::new());

    let booking: Booking = serde_json::from_value(serde_json::json!({
        "id": "b1",
        "booking_ref": "H5",
        "name": "Ana Lee",
        "email": "ana@example.com",
        "phone": CUSTOMER_PHONE,
        "pickup_address": "1 Queen St, Auckland",
        "dropoff_address": "Auckland Airport",
        "date": "2030-01-10",
        "time": "06:30",
        "passengers": 1,
        "pricing": null,
        "total_price": 100.0,
        "status": "confirmed",
        "created_at": "2026-10-01T00:00:00Z",
        "updated_at": null
    }))
    .unwrap();
    bookings.insert(&booking).await.unwrap();
    let driver = Driver::new("Sam Tui".into(), "0210001".into(), "sam@drivers.test".into());
    drivers.create(&driver).await.unwrap();

    let (events, _) = broadcast::channel(16);
    let lagging = Arc::new(LaggingSessions {
        inner: sessions.clone(),
        lag_next_lookup: AtomicBool::new(false),
    });
    let notifier = NotificationDispatcher::new(NotificationsConfig::default(), 12).with_sms(outbox.clone());
    let mut service = TrackingService::new(
        bookings.clone(),
        drivers.clone(),
        lagging.clone(),
        notifier,
        rules,
        events,
    );
    if let Some(route) = route {
        service = service.with_route_estimator(route);
    }
    Harness {
        bookings,
        drivers,
        sessions,
        lagging,
        outbox,
        driver,
        service,
    }
}

#[tokio::test]
async fn test_proximity_sms_fires_once() {
    let route = Arc::new(ScriptedRoute::new(&[15, 9, 12, 7]));
    let h = harness(Some(route), BusinessRules::default()).await;
    h.service.start("b1", &h.driver.id).await.unwrap();

    let mut flags = Vec::new();
    for step in 0..4 {
        let outcome = h
            .service
            .update_location("b1", &h.driver.id, -36.85 + step as f64 * 0.001, 174.76)
            .await
            .unwrap();
        flags.push(outcome.sms_sent);
    }

    assert_eq!(flags, vec![false, true, true, true]);
    let sms = h.outbox.sms_to(CUSTOMER_PHONE);
    assert_eq!(sms.len(), 1);
    assert!(sms[0].body.contains("approximately 9 minutes"));
}

#[tokio::test]
async fn test_restart_during_proximity_claim_sends_once() {
    let route = Arc::new(ScriptedRoute::new(&[5, 4, 3]));
    let h = harness(Some(route), BusinessRules::default()).await;
    h.service.start("b1", &h.driver.id).await.unwrap();

    h.lagging.lag_next_lookup.store(true, Ordering::SeqCst);
    let (restarted, update) = tokio::join!(h.service.start("b1", &h.driver.id), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.service.update_location("b1", &h.driver.id, -36.85, 174.76).await
    });
    restarted.unwrap();
    assert!(update.unwrap().sms_sent);

    let session = h.sessions.find_by_pair("b1", &h.driver.id).await.unwrap().unwrap();
    assert!(session.proximity_sms_sent);
    assert_eq!(session.status, SessionStatus::Active);

    h.service
        .update_location("b1", &h.driver.id, -36.851, 174.76)
        .await
        .unwrap();
    assert_eq!(h.outbox.sms_to(CUSTOMER_PHONE).len(), 1);
}

#[tokio::test]
async fn test_new_driver_ends_previous_session() {
    let route = Arc::new(ScriptedRoute::new(&[5]));
    let h = harness(Some(route), BusinessRules::default()).await;
    let kim = Driver::new("Kim Ora".into(), "0210009".into(), "kim@drivers.test".into());
    h.drivers.create(&kim).await.unwrap();

    h.service.start("b1", &h.driver.id).await.unwrap();
    let handover = h.service.start("b1", &kim.id).await.unwrap();

    let sessions = h.sessions.find_by_booking("b1").await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].driver_id, kim.id);

    let stale = h.service.update_location("b1", &h.driver.id, -36.85, 174.76).await;
    assert!(matches!(stale, Err(CoreError::NotFound(_))));
    assert!(h.outbox.sms_to(CUSTOMER_PHONE).is_empty());

    let leg = h.bookings.get("b1").await.unwrap().unwrap().outbound().cloned().unwrap();
    assert_eq!(leg.driver_id.as_deref(), Some(kim.id.as_str()));
    assert_eq!(leg.tracking_id.as_deref(), Some(handover.tracking_id.as_str()));
}

#[tokio::test]
async fn test_location_requires_session() {
    let h = harness(None, BusinessRules::default()).await;
    let err = h
        .service
        .update_location("b1", &h.driver.id, -36.85, 174.76)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn test_eta_failure_still_records_location() {
    let h = harness(Some(Arc::new(BrokenRoute)), BusinessRules::default()).await;
    h.service.start("b1", &h.driver.id).await.unwrap();

    let outcome = h
        .service
        .update_location("b1", &h.driver.id, -36.85, 174.76)
        .await
        .unwrap();
    assert!(outcome.eta_minutes.is_none());
    assert!(!outcome.sms_sent);

    let booking = h.bookings.get("b1").await.unwrap().unwrap();
    let location = booking.outbound().unwrap().driver_location.unwrap();
    assert_eq!(location.lat, -36.85);
}

#[tokio::test]
async fn test_slow_eta_is_abandoned() {
    let rules = BusinessRules {
        eta_timeout_seconds: 0,
        ..BusinessRules::default()
    };
    let h = harness(Some(Arc::new(SlowRoute)), rules).await;
    h.service.start("b1", &h.driver.id).await.unwrap();

    let outcome = h
        .service
        .update_location("b1", &h.driver.id, -36.85, 174.76)
        .await
        .unwrap();
    assert!(outcome.eta_minutes.is_none());
    assert!(h.outbox.sms().is_empty());
}

#[tokio::test]
async fn test_start_marks_driver_on_way() {
    let h = harness(None, BusinessRules::default()).await;
    let start = h.service.start("b1", &h.driver.id).await.unwrap();
    assert!(start.tracking_url.ends_with("/H5"));

    let leg = h.bookings.get("b1").await.unwrap().unwrap().outbound().cloned().unwrap();
    assert_eq!(leg.tracking_status, Some(TrackingStatus::DriverOnWay));
    assert_eq!(leg.tracking_id.as_deref(), Some(start.tracking_id.as_str()));

    // Starting again keeps a single session for the pair
    let again = h.service.start("b1", &h.driver.id).await.unwrap();
    assert_eq!(again.tracking_id, start.tracking_id);
    assert_eq!(h.sessions.find_by_booking("b1").await.unwrap().len(), 1);

    let missing = h.service.start("b1", "ghost").await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let h = harness(None, BusinessRules::default()).await;
    h.service.start("b1", &h.driver.id).await.unwrap();

    h.service.stop("b1").await.unwrap();
    assert!(h.sessions.find_by_booking("b1").await.unwrap().is_empty());
    let leg = h.bookings.get("b1").await.unwrap().unwrap().outbound().cloned().unwrap();
    assert_eq!(leg.tracking_status, Some(TrackingStatus::Arrived));

    h.service.stop("b1").await.unwrap();
    h.service.stop("no-such-booking").await.unwrap();

    let after = h.service.update_location("b1", &h.driver.id, -36.85, 174.76).await;
    assert!(matches!(after, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_tracking_info_by_any_reference() {
    let route = Arc::new(ScriptedRoute::new(&[14]));
    let h = harness(Some(route), BusinessRules::default()).await;
    let start = h.service.start("b1", &h.driver.id).await.unwrap();
    h.service
        .update_location("b1", &h.driver.id, -36.85, 174.76)
        .await
        .unwrap();

    for reference in ["H5", "b1", start.tracking_id.as_str()] {
        let info = h.service.tracking_info(reference).await.unwrap();
        assert_eq!(info.booking_ref, "H5");
        assert!(info.live);
        assert_eq!(info.eta_minutes, Some(14));
        assert_eq!(info.driver.as_ref().unwrap().name, "Sam Tui");
    }

    // The mirrored snapshot survives the session
    h.service.stop("b1").await.unwrap();
    let info = h.service.tracking_info("H5").await.unwrap();
    assert!(!info.live);
    assert_eq!(info.eta_minutes, Some(14));
    assert_eq!(info.tracking_status, Some(TrackingStatus::Arrived));

    assert!(matches!(
        h.service.tracking_info("H404").await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_updates_are_broadcast() {
    let route = Arc::new(ScriptedRoute::new(&[20]));
    let h = harness(Some(route), BusinessRules::default()).await;
    let mut rx = h.service.subscribe();
    h.service.start("b1", &h.driver.id).await.unwrap();

    h.service
        .update_location("b1", &h.driver.id, -36.85, 174.76)
        .await
        .unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.booking_id, "b1");
    assert_eq!(event.latitude, Some(-36.85));
    assert_eq!(event.eta_minutes, Some(20));

    h.service.stop("b1").await.unwrap();
    assert_eq!(rx.recv().await.unwrap().status, "arrived");
}

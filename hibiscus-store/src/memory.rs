//! Process-local backends. Used when no database is configured and by tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hibiscus_core::repository::{
    BookingMark, BookingRepository, DriverRepository, LegGuard, SessionStore,
};
use hibiscus_core::{
    Booking, CoreError, CoreResult, DispatchLeg, Driver, GeoPoint, Leg, SessionStatus,
    TrackingSession, TrackingStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Insertion order breaks ties between identical `created_at` stamps.
#[derive(Clone)]
struct Entry {
    seq: u64,
    booking: Booking,
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    active: RwLock<HashMap<String, Entry>>,
    deleted: RwLock<HashMap<String, Entry>>,
    seq: AtomicU64,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first(mut entries: Vec<Entry>) -> Vec<Booking> {
        entries.sort_by(|a, b| {
            b.booking
                .created_at
                .cmp(&a.booking.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries.into_iter().map(|e| e.booking).collect()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, booking: &Booking) -> CoreResult<()> {
        let mut active = self.active.write().await;
        if active.contains_key(&booking.id) {
            return Err(CoreError::Conflict(format!("booking {} exists", booking.id)));
        }
        if active.values().any(|e| e.booking.booking_ref == booking.booking_ref) {
            return Err(CoreError::Conflict(format!(
                "reference {} is taken",
                booking.booking_ref
            )));
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        active.insert(
            booking.id.clone(),
            Entry {
                seq,
                booking: booking.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<Booking>> {
        Ok(self.active.read().await.get(id).map(|e| e.booking.clone()))
    }

    async fn find_by_reference(&self, booking_ref: &str) -> CoreResult<Option<Booking>> {
        Ok(self
            .active
            .read()
            .await
            .values()
            .find(|e| e.booking.booking_ref == booking_ref)
            .map(|e| e.booking.clone()))
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> CoreResult<Option<Booking>> {
        Ok(self
            .active
            .read()
            .await
            .values()
            .find(|e| {
                e.booking
                    .legs
                    .values()
                    .any(|leg| leg.tracking_id.as_deref() == Some(tracking_id))
            })
            .map(|e| e.booking.clone()))
    }

    async fn list(&self) -> CoreResult<Vec<Booking>> {
        let entries = self.active.read().await.values().cloned().collect();
        Ok(Self::newest_first(entries))
    }

    async fn list_by_date(&self, date: NaiveDate) -> CoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .active
            .read()
            .await
            .values()
            .filter(|e| e.booking.date == date)
            .map(|e| e.booking.clone())
            .collect();
        bookings.sort_by(|a, b| a.time.cmp(&b.time));
        Ok(bookings)
    }

    async fn latest_reference(&self) -> CoreResult<Option<String>> {
        let active = self.active.read().await;
        let deleted = self.deleted.read().await;
        Ok(active
            .values()
            .chain(deleted.values())
            .max_by(|a, b| {
                a.booking
                    .created_at
                    .cmp(&b.booking.created_at)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|e| e.booking.booking_ref.clone()))
    }

    async fn save(&self, booking: &Booking) -> CoreResult<bool> {
        let mut active = self.active.write().await;
        match active.get_mut(&booking.id) {
            Some(entry) => {
                let stored = std::mem::replace(&mut entry.booking, booking.clone());
                entry.booking.legs = stored.legs;
                entry.booking.notifications = stored.notifications;
                entry.booking.payment = stored.payment;
                entry.booking.calendar_event_id = stored.calendar_event_id;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn apply_mark(&self, booking_id: &str, mark: &BookingMark) -> CoreResult<bool> {
        let mut active = self.active.write().await;
        match active.get_mut(booking_id) {
            Some(entry) => {
                mark.apply(&mut entry.booking);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_leg(&self, booking_id: &str, leg: Leg, value: &DispatchLeg) -> CoreResult<bool> {
        let mut active = self.active.write().await;
        match active.get_mut(booking_id) {
            Some(entry) => {
                entry.booking.legs.insert(leg, value.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_leg(
        &self,
        booking_id: &str,
        leg: Leg,
        guard: &LegGuard,
        value: &DispatchLeg,
    ) -> CoreResult<bool> {
        let mut active = self.active.write().await;
        let Some(entry) = active.get_mut(booking_id) else {
            return Ok(false);
        };
        let Some(current) = entry.booking.legs.get(&leg) else {
            return Ok(false);
        };
        if !current.token_matches(&guard.expected_token) {
            return Ok(false);
        }
        if guard.require_unanswered && current.driver_accepted.is_some() {
            return Ok(false);
        }
        entry.booking.legs.insert(leg, value.clone());
        Ok(true)
    }

    async fn set_leg_tracking(
        &self,
        booking_id: &str,
        leg: Leg,
        tracking_id: Option<&str>,
        status: TrackingStatus,
        driver: Option<(&str, &str)>,
    ) -> CoreResult<bool> {
        let mut active = self.active.write().await;
        let Some(entry) = active.get_mut(booking_id) else {
            return Ok(false);
        };
        let stored = entry.booking.leg_mut(leg);
        stored.tracking_status = Some(status);
        if let Some(tracking_id) = tracking_id {
            stored.tracking_id = Some(tracking_id.to_string());
        }
        if let Some((driver_id, driver_name)) = driver {
            stored.driver_id = Some(driver_id.to_string());
            stored.driver_name = Some(driver_name.to_string());
        }
        Ok(true)
    }

    async fn record_driver_position(
        &self,
        booking_id: &str,
        location: &GeoPoint,
        eta_minutes: Option<i64>,
    ) -> CoreResult<bool> {
        let mut active = self.active.write().await;
        let Some(outbound) = active
            .get_mut(booking_id)
            .and_then(|e| e.booking.legs.get_mut(&Leg::Outbound))
        else {
            return Ok(false);
        };
        outbound.driver_location = Some(*location);
        outbound.driver_eta_minutes = eta_minutes;
        Ok(true)
    }

    async fn soft_delete(
        &self,
        id: &str,
        deleted_by: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Booking>> {
        let mut active = self.active.write().await;
        let Some(mut entry) = active.remove(id) else {
            return Ok(None);
        };
        entry.booking.mark_deleted(deleted_by, at);
        let booking = entry.booking.clone();
        self.deleted.write().await.insert(id.to_string(), entry);
        Ok(Some(booking))
    }

    async fn list_deleted(&self) -> CoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .deleted
            .read()
            .await
            .values()
            .map(|e| e.booking.clone())
            .collect();
        bookings.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        Ok(bookings)
    }

    async fn restore(&self, id: &str, at: DateTime<Utc>) -> CoreResult<Option<Booking>> {
        let mut active = self.active.write().await;
        let Some(mut entry) = self.deleted.write().await.remove(id) else {
            return Ok(None);
        };
        entry.booking.mark_restored(at);
        let booking = entry.booking.clone();
        active.insert(id.to_string(), entry);
        Ok(Some(booking))
    }

    async fn purge(&self, id: &str) -> CoreResult<bool> {
        Ok(self.deleted.write().await.remove(id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryDriverRepository {
    drivers: RwLock<HashMap<String, Driver>>,
}

impl InMemoryDriverRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DriverRepository for InMemoryDriverRepository {
    async fn create(&self, driver: &Driver) -> CoreResult<()> {
        let mut drivers = self.drivers.write().await;
        if drivers.contains_key(&driver.id) {
            return Err(CoreError::Conflict(format!("driver {} exists", driver.id)));
        }
        drivers.insert(driver.id.clone(), driver.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<Driver>> {
        Ok(self.drivers.read().await.get(id).cloned())
    }

    async fn list(&self) -> CoreResult<Vec<Driver>> {
        let mut drivers: Vec<Driver> = self.drivers.read().await.values().cloned().collect();
        drivers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(drivers)
    }

    async fn save(&self, driver: &Driver) -> CoreResult<bool> {
        let mut drivers = self.drivers.write().await;
        match drivers.get_mut(&driver.id) {
            Some(existing) => {
                *existing = driver.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> CoreResult<bool> {
        Ok(self.drivers.write().await.remove(id).is_some())
    }
}

/// Sessions behind a map lock, each with its own mutex so updates to one
/// session are serialised without blocking the others.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<TrackingSession>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, tracking_id: &str) -> Option<Arc<Mutex<TrackingSession>>> {
        self.sessions.read().await.get(tracking_id).cloned()
    }

    async fn snapshot_all(&self) -> Vec<TrackingSession> {
        let handles: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.lock().await.clone());
        }
        out
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, tracking_id: &str) -> CoreResult<Option<TrackingSession>> {
        match self.handle(tracking_id).await {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, session: TrackingSession) -> CoreResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.tracking_id.clone(), Arc::new(Mutex::new(session)));
        Ok(())
    }

    async fn delete(&self, tracking_id: &str) -> CoreResult<Option<TrackingSession>> {
        let removed = self.sessions.write().await.remove(tracking_id);
        match removed {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn activate(&self, tracking_id: &str) -> CoreResult<bool> {
        let Some(handle) = self.handle(tracking_id).await else {
            return Ok(false);
        };
        handle.lock().await.status = SessionStatus::Active;
        Ok(true)
    }

    async fn find_by_pair(
        &self,
        booking_id: &str,
        driver_id: &str,
    ) -> CoreResult<Option<TrackingSession>> {
        Ok(self
            .snapshot_all()
            .await
            .into_iter()
            .find(|s| s.matches(booking_id, driver_id)))
    }

    async fn find_by_booking(&self, booking_id: &str) -> CoreResult<Vec<TrackingSession>> {
        Ok(self
            .snapshot_all()
            .await
            .into_iter()
            .filter(|s| s.booking_id == booking_id)
            .collect())
    }

    async fn record_location(
        &self,
        tracking_id: &str,
        location: GeoPoint,
    ) -> CoreResult<Option<TrackingSession>> {
        let Some(handle) = self.handle(tracking_id).await else {
            return Ok(None);
        };
        let mut session = handle.lock().await;
        session.last_location = Some(location);
        if session.status == SessionStatus::PendingAcceptance {
            session.status = SessionStatus::Active;
        }
        Ok(Some(session.clone()))
    }

    async fn record_eta(&self, tracking_id: &str, eta_minutes: i64) -> CoreResult<()> {
        if let Some(handle) = self.handle(tracking_id).await {
            handle.lock().await.current_eta_minutes = Some(eta_minutes);
        }
        Ok(())
    }

    async fn claim_proximity(&self, tracking_id: &str) -> CoreResult<bool> {
        let Some(handle) = self.handle(tracking_id).await else {
            return Ok(false);
        };
        let mut session = handle.lock().await;
        if session.proximity_sms_sent {
            return Ok(false);
        }
        session.proximity_sms_sent = true;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hibiscus_core::models::LegOffer;
    use hibiscus_shared::Masked;

    fn booking(reference: &str) -> Booking {
        serde_json::from_value(serde_json::json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "booking_ref": reference,
            "name": "Ana Lee",
            "email": "ana@example.com",
            "phone": "021000000",
            "pickup_address": "1 Queen St, Auckland",
            "dropoff_address": "Auckland Airport",
            "date": "2026-11-02",
            "time": "06:30",
            "passengers": 2,
            "pricing": null,
            "total_price": 120.0,
            "created_at": Utc::now(),
            "updated_at": null
        }))
        .unwrap()
    }

    fn session(id: &str) -> TrackingSession {
        TrackingSession {
            tracking_id: id.into(),
            booking_id: "b1".into(),
            booking_ref: "H1".into(),
            driver_id: "d1".into(),
            driver_name: "Sam".into(),
            driver_phone: Masked("0210001".into()),
            vehicle: "Toyota Hiace".into(),
            pickup_address: "1 Queen St".into(),
            customer_name: "Ana".into(),
            customer_phone: Masked("0210002".into()),
            started_at: Utc::now(),
            last_location: None,
            current_eta_minutes: None,
            proximity_sms_sent: false,
            status: SessionStatus::PendingAcceptance,
        }
    }

    #[tokio::test]
    async fn test_duplicate_reference_conflicts() {
        let repo = InMemoryBookingRepository::new();
        repo.insert(&booking("H1")).await.unwrap();
        let err = repo.insert(&booking("H1")).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_latest_reference_counts_deleted() {
        let repo = InMemoryBookingRepository::new();
        repo.insert(&booking("H1")).await.unwrap();
        let second = booking("H2");
        repo.insert(&second).await.unwrap();
        repo.soft_delete(&second.id, "admin", Utc::now()).await.unwrap();

        assert_eq!(repo.latest_reference().await.unwrap().as_deref(), Some("H2"));
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let repo = InMemoryBookingRepository::new();
        let mut b = booking("H1");
        b.status = hibiscus_core::BookingStatus::Confirmed;
        repo.insert(&b).await.unwrap();

        let deleted = repo.soft_delete(&b.id, "admin", Utc::now()).await.unwrap().unwrap();
        assert_eq!(deleted.deleted_by.as_deref(), Some("admin"));
        assert!(repo.get(&b.id).await.unwrap().is_none());
        assert_eq!(repo.list_deleted().await.unwrap().len(), 1);

        let restored = repo.restore(&b.id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(restored.status, hibiscus_core::BookingStatus::Pending);
        assert!(restored.deleted_at.is_none());
        assert!(restored.restored_at.is_some());
        assert!(repo.list_deleted().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_leg_guard() {
        let repo = InMemoryBookingRepository::new();
        let mut b = booking("H1");
        b.leg_mut(Leg::Outbound).assign(
            LegOffer {
                driver_id: "d1".into(),
                driver_name: "Sam".into(),
                payout: 96.0,
                notes: None,
                token: "TOKEN123".into(),
                tracking_id: None,
                auto_dispatched: false,
            },
            Utc::now(),
        );
        repo.insert(&b).await.unwrap();

        let guard = LegGuard {
            expected_token: "TOKEN123".into(),
            require_unanswered: true,
        };
        let mut accepted = b.outbound().unwrap().clone();
        accepted.accept(Utc::now());

        assert!(repo.update_leg(&b.id, Leg::Outbound, &guard, &accepted).await.unwrap());
        // Second answer loses the race
        assert!(!repo.update_leg(&b.id, Leg::Outbound, &guard, &accepted).await.unwrap());

        let wrong = LegGuard {
            expected_token: "WRONG".into(),
            require_unanswered: false,
        };
        assert!(!repo.update_leg(&b.id, Leg::Outbound, &wrong, &accepted).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_keeps_stored_legs() {
        let repo = InMemoryBookingRepository::new();
        let b = booking("H1");
        repo.insert(&b).await.unwrap();

        let mut leg = DispatchLeg::default();
        leg.driver_id = Some("d1".into());
        assert!(repo.set_leg(&b.id, Leg::Outbound, &leg).await.unwrap());

        // A stale copy without legs must not wipe the assignment
        let mut stale = b.clone();
        stale.notes = "gate 4".into();
        assert!(repo.save(&stale).await.unwrap());

        let stored = repo.get(&b.id).await.unwrap().unwrap();
        assert_eq!(stored.notes, "gate 4");
        assert_eq!(stored.outbound().unwrap().driver_id.as_deref(), Some("d1"));

        // Nor the stamps recorded since it was read
        let stamp = BookingMark::SmsSent("2026-11-01T10:00:00+00:00".into());
        assert!(repo.apply_mark(&b.id, &stamp).await.unwrap());
        assert!(repo.save(&stale).await.unwrap());
        let stored = repo.get(&b.id).await.unwrap().unwrap();
        assert!(stored.notifications.last_sms_sent.is_some());
    }

    #[tokio::test]
    async fn test_marks_keep_concurrent_stamps() {
        let repo = InMemoryBookingRepository::new();
        let b = booking("H1");
        repo.insert(&b).await.unwrap();

        let email = BookingMark::EmailSent("2026-11-01T10:00:00+00:00".into());
        let sms = BookingMark::SmsSent("2026-11-01T10:00:01+00:00".into());
        assert!(repo.apply_mark(&b.id, &email).await.unwrap());
        assert!(repo.apply_mark(&b.id, &sms).await.unwrap());
        assert!(!repo.apply_mark("missing", &sms).await.unwrap());

        let stored = repo.get(&b.id).await.unwrap().unwrap();
        assert!(stored.notifications.last_email_sent.is_some());
        assert!(stored.notifications.last_sms_sent.is_some());
    }

    #[tokio::test]
    async fn test_leg_tracking_keeps_response() {
        let repo = InMemoryBookingRepository::new();
        let mut b = booking("H1");
        b.leg_mut(Leg::Outbound).assign(
            LegOffer {
                driver_id: "d1".into(),
                driver_name: "Sam".into(),
                payout: 96.0,
                notes: None,
                token: "TOKEN123".into(),
                tracking_id: None,
                auto_dispatched: false,
            },
            Utc::now(),
        );
        b.leg_mut(Leg::Outbound).accept(Utc::now());
        repo.insert(&b).await.unwrap();

        assert!(repo
            .set_leg_tracking(&b.id, Leg::Outbound, Some("t1"), TrackingStatus::DriverOnWay, None)
            .await
            .unwrap());

        let leg = repo.get(&b.id).await.unwrap().unwrap().outbound().unwrap().clone();
        assert_eq!(leg.tracking_id.as_deref(), Some("t1"));
        assert_eq!(leg.tracking_status, Some(TrackingStatus::DriverOnWay));
        assert_eq!(leg.driver_accepted, Some(true));
        assert!(leg.accepted_at.is_some());
        assert_eq!(leg.acceptance_token.as_deref(), Some("TOKEN123"));
    }

    #[tokio::test]
    async fn test_activate_keeps_proximity_claim() {
        let store = InMemorySessionStore::new();
        store.put(session("t1")).await.unwrap();
        assert!(store.claim_proximity("t1").await.unwrap());

        assert!(store.activate("t1").await.unwrap());
        let stored = store.get("t1").await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert!(stored.proximity_sms_sent);
        assert!(!store.activate("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_proximity_once() {
        let store = InMemorySessionStore::new();
        store.put(session("t1")).await.unwrap();

        assert!(store.claim_proximity("t1").await.unwrap());
        assert!(!store.claim_proximity("t1").await.unwrap());
        assert!(store.get("t1").await.unwrap().unwrap().proximity_sms_sent);
    }

    #[tokio::test]
    async fn test_location_promotes_pending_session() {
        let store = InMemorySessionStore::new();
        store.put(session("t1")).await.unwrap();

        let point = GeoPoint {
            lat: -36.85,
            lng: 174.76,
            updated_at: Utc::now(),
        };
        let updated = store.record_location("t1", point).await.unwrap().unwrap();
        assert_eq!(updated.status, SessionStatus::Active);
        assert_eq!(updated.last_location, Some(point));
        assert!(store.record_location("missing", point).await.unwrap().is_none());
        assert_eq!(store.find_by_pair("b1", "d1").await.unwrap().unwrap().tracking_id, "t1");
    }
}

use chrono::{DateTime, Utc};
use hibiscus_core::repository::{BookingRepository, DriverRepository, SessionStore};
use hibiscus_core::routing::{Coordinates, RouteEstimator};
use hibiscus_core::{
    Booking, CoreError, CoreResult, Driver, GeoPoint, Leg, SessionStatus, TrackingSession,
    TrackingStatus,
};
use hibiscus_notify::NotificationDispatcher;
use hibiscus_shared::models::events::TrackingUpdateEvent;
use hibiscus_store::app_config::BusinessRules;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{DriverView, LocationOutcome, TrackingInfo, TrackingStart};

pub(crate) fn new_session(
    booking: &Booking,
    driver: &Driver,
    status: SessionStatus,
    now: DateTime<Utc>,
) -> TrackingSession {
    TrackingSession {
        tracking_id: Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        booking_ref: booking.booking_ref.clone(),
        driver_id: driver.id.clone(),
        driver_name: driver.name.clone(),
        driver_phone: driver.phone.clone(),
        vehicle: driver.vehicle_or_default().to_string(),
        pickup_address: booking.pickup_address.clone(),
        customer_name: booking.name.clone(),
        customer_phone: booking.phone.clone(),
        started_at: now,
        last_location: None,
        current_eta_minutes: None,
        proximity_sms_sent: false,
        status,
    }
}

/// Live driver tracking for the outbound leg.
///
/// Sessions live in the injected `SessionStore`; the booking only carries a
/// mirror of the latest position and ETA.
pub struct TrackingService {
    bookings: Arc<dyn BookingRepository>,
    drivers: Arc<dyn DriverRepository>,
    sessions: Arc<dyn SessionStore>,
    notifier: NotificationDispatcher,
    route: Option<Arc<dyn RouteEstimator>>,
    rules: BusinessRules,
    events: broadcast::Sender<TrackingUpdateEvent>,
}

impl TrackingService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        drivers: Arc<dyn DriverRepository>,
        sessions: Arc<dyn SessionStore>,
        notifier: NotificationDispatcher,
        rules: BusinessRules,
        events: broadcast::Sender<TrackingUpdateEvent>,
    ) -> Self {
        Self {
            bookings,
            drivers,
            sessions,
            notifier,
            route: None,
            rules,
            events,
        }
    }

    pub fn with_route_estimator(mut self, route: Arc<dyn RouteEstimator>) -> Self {
        self.route = Some(route);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingUpdateEvent> {
        self.events.subscribe()
    }

    fn publish(&self, session: &TrackingSession, status: &str) {
        let event = TrackingUpdateEvent {
            booking_id: session.booking_id.clone(),
            tracking_id: session.tracking_id.clone(),
            latitude: session.last_location.map(|l| l.lat),
            longitude: session.last_location.map(|l| l.lng),
            eta_minutes: session.current_eta_minutes,
            status: status.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Driver pressed "On my way". Reuses the pair's session when one exists
    /// so the proximity flag survives a restart of the driver's app. Sessions
    /// other drivers hold on the booking are ended.
    pub async fn start(&self, booking_id: &str, driver_id: &str) -> CoreResult<TrackingStart> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking"))?;
        let driver = self
            .drivers
            .get(driver_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Driver"))?;

        for other in self.sessions.find_by_booking(booking_id).await? {
            if other.driver_id != driver.id && self.sessions.delete(&other.tracking_id).await?.is_some() {
                info!("Ended tracking {} held by {}", other.tracking_id, other.driver_name);
            }
        }

        let mut reused = None;
        if let Some(session) = self.sessions.find_by_pair(booking_id, driver_id).await? {
            if self.sessions.activate(&session.tracking_id).await? {
                reused = Some(session.tracking_id);
            }
        }
        let tracking_id = match reused {
            Some(tracking_id) => tracking_id,
            None => {
                let session = new_session(&booking, &driver, SessionStatus::Active, Utc::now());
                let tracking_id = session.tracking_id.clone();
                self.sessions.put(session).await?;
                tracking_id
            }
        };

        self.bookings
            .set_leg_tracking(
                booking_id,
                Leg::Outbound,
                Some(tracking_id.as_str()),
                TrackingStatus::DriverOnWay,
                Some((driver.id.as_str(), driver.name.as_str())),
            )
            .await?;

        info!("Tracking {} started for {} by {}", tracking_id, booking.booking_ref, driver.name);
        Ok(TrackingStart {
            tracking_url: self.notifier.tracking_url(&booking.booking_ref),
            tracking_id,
        })
    }

    async fn estimate(&self, from: Coordinates, to_address: &str) -> Option<i64> {
        let route = self.route.as_ref()?;
        if to_address.trim().is_empty() {
            return None;
        }
        let timeout = Duration::from_secs(self.rules.eta_timeout_seconds);
        match tokio::time::timeout(timeout, route.eta_minutes(from, to_address)).await {
            Ok(Ok(minutes)) => Some(minutes),
            Ok(Err(e)) => {
                error!("ETA calculation failed: {}", e);
                None
            }
            Err(_) => {
                warn!("ETA calculation timed out after {:?}", timeout);
                None
            }
        }
    }

    /// Record a position, refresh the ETA and fire the one-shot proximity SMS.
    pub async fn update_location(
        &self,
        booking_id: &str,
        driver_id: &str,
        lat: f64,
        lng: f64,
    ) -> CoreResult<LocationOutcome> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(CoreError::Validation("coordinates out of range".into()));
        }
        let session = self
            .sessions
            .find_by_pair(booking_id, driver_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Tracking session"))?;

        let location = GeoPoint {
            lat,
            lng,
            updated_at: Utc::now(),
        };
        let mut session = self
            .sessions
            .record_location(&session.tracking_id, location)
            .await?
            .ok_or_else(|| CoreError::not_found("Tracking session"))?;

        let mut sms_sent = session.proximity_sms_sent;
        if let Some(eta) = self.estimate(Coordinates { lat, lng }, &session.pickup_address).await {
            self.sessions.record_eta(&session.tracking_id, eta).await?;
            session.current_eta_minutes = Some(eta);
            info!("ETA {} min for tracking {}", eta, session.tracking_id);

            if eta <= self.rules.proximity_threshold_minutes
                && self.sessions.claim_proximity(&session.tracking_id).await?
            {
                sms_sent = true;
                if !self.notifier.send_proximity_sms(&session, eta).await {
                    warn!("Proximity SMS for {} was not delivered", session.booking_ref);
                }
            }
        }

        self.bookings
            .record_driver_position(booking_id, &location, session.current_eta_minutes)
            .await?;
        self.publish(&session, "driver_on_way");

        Ok(LocationOutcome {
            tracking_id: session.tracking_id,
            eta_minutes: session.current_eta_minutes,
            sms_sent,
        })
    }

    /// End tracking for a booking and mark the outbound leg arrived.
    /// Unknown bookings and missing sessions are not an error.
    pub async fn stop(&self, booking_id: &str) -> CoreResult<()> {
        for session in self.sessions.find_by_booking(booking_id).await? {
            if let Some(mut removed) = self.sessions.delete(&session.tracking_id).await? {
                removed.status = SessionStatus::Arrived;
                self.publish(&removed, "arrived");
            }
        }

        let marked = self
            .bookings
            .set_leg_tracking(booking_id, Leg::Outbound, None, TrackingStatus::Arrived, None)
            .await?;
        if marked {
            info!("Tracking stopped for booking {}", booking_id);
        }
        Ok(())
    }

    async fn resolve(&self, reference: &str) -> CoreResult<Booking> {
        if let Some(booking) = self.bookings.find_by_reference(reference).await? {
            return Ok(booking);
        }
        if let Some(booking) = self.bookings.get(reference).await? {
            return Ok(booking);
        }
        self.bookings
            .find_by_tracking_id(reference)
            .await?
            .ok_or_else(|| CoreError::not_found("Tracking"))
    }

    /// Customer view by booking reference, booking id or tracking id.
    pub async fn tracking_info(&self, reference: &str) -> CoreResult<TrackingInfo> {
        let booking = self.resolve(reference).await?;
        let leg = booking.outbound().cloned().unwrap_or_default();
        let live = match leg.tracking_id.as_deref() {
            Some(tracking_id) => self.sessions.get(tracking_id).await?,
            None => None,
        };
        let driver = match leg.driver_id.as_deref() {
            Some(driver_id) => self.drivers.get(driver_id).await?,
            None => None,
        };

        let driver_view = match (&driver, &live) {
            (Some(d), _) => Some(DriverView {
                id: Some(d.id.clone()),
                name: d.name.clone(),
                phone: d.phone.clone(),
                vehicle: d.vehicle_or_default().to_string(),
            }),
            (None, Some(s)) => Some(DriverView {
                id: Some(s.driver_id.clone()),
                name: s.driver_name.clone(),
                phone: s.driver_phone.clone(),
                vehicle: s.vehicle.clone(),
            }),
            (None, None) => None,
        };

        Ok(TrackingInfo {
            booking_id: booking.id,
            booking_ref: booking.booking_ref,
            customer_name: booking.name,
            pickup_address: booking.pickup_address,
            dropoff_address: booking.dropoff_address,
            pickup_date: booking.date,
            pickup_time: booking.time,
            tracking_status: leg.tracking_status,
            driver: driver_view,
            location: live
                .as_ref()
                .and_then(|s| s.last_location)
                .or(leg.driver_location),
            eta_minutes: live
                .as_ref()
                .and_then(|s| s.current_eta_minutes)
                .or(leg.driver_eta_minutes),
            started_at: live.as_ref().map(|s| s.started_at),
            live: live.is_some(),
        })
    }
}

use chrono::{DateTime, Duration, NaiveDate, Utc};
use hibiscus_core::payment::PaymentGateway;
use hibiscus_core::reference::next_reference;
use hibiscus_core::repository::{BookingMark, BookingRepository};
use hibiscus_core::routing::DistanceLookup;
use hibiscus_core::{Booking, BookingStatus, CoreError, CoreResult, PaymentStatus};
use hibiscus_notify::{calendar, NotificationDispatcher};
use hibiscus_pricing::{round_money, PriceBreakdown, PricingEngine};
use hibiscus_store::app_config::BusinessRules;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{BookingUpdate, NewBooking, PriceRequest};

/// Hours from `now` until the booking's pickup, negative once it has passed.
pub fn hours_until_pickup(booking: &Booking, now: DateTime<Utc>, utc_offset_hours: i32) -> Option<f64> {
    let pickup = calendar::pickup_instant(booking, utc_offset_hours)?;
    Some((pickup - now).num_seconds() as f64 / 3600.0)
}

/// Manages the booking lifecycle: intake, edits, soft deletion and the
/// notification fan-out that goes with each step.
pub struct BookingManager {
    pub(crate) bookings: Arc<dyn BookingRepository>,
    pub(crate) notifier: NotificationDispatcher,
    pub(crate) pricing: PricingEngine,
    pub(crate) rules: BusinessRules,
    pub(crate) distance: Option<Arc<dyn DistanceLookup>>,
    pub(crate) payments: Option<Arc<dyn PaymentGateway>>,
    pub(crate) currency: String,
}

impl BookingManager {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        notifier: NotificationDispatcher,
        pricing: PricingEngine,
        rules: BusinessRules,
    ) -> Self {
        Self {
            bookings,
            notifier,
            pricing,
            rules,
            distance: None,
            payments: None,
            currency: "nzd".to_string(),
        }
    }

    pub fn with_distance_lookup(mut self, lookup: Arc<dyn DistanceLookup>) -> Self {
        self.distance = Some(lookup);
        self
    }

    pub fn with_payment_gateway(mut self, gateway: Arc<dyn PaymentGateway>, currency: &str) -> Self {
        self.payments = Some(gateway);
        self.currency = currency.to_lowercase();
        self
    }

    pub fn rules(&self) -> &BusinessRules {
        &self.rules
    }

    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Calendar date of tomorrow in business-local time
    pub fn business_tomorrow(&self, now: DateTime<Utc>) -> NaiveDate {
        let local = now.with_timezone(&calendar::business_offset(self.rules.utc_offset_hours));
        local.date_naive() + Duration::days(1)
    }

    async fn resolve_distance(
        &self,
        distance_km: Option<f64>,
        pickup: Option<&str>,
        dropoff: Option<&str>,
    ) -> CoreResult<f64> {
        if let Some(km) = distance_km {
            if !km.is_finite() || km < 0.0 {
                return Err(CoreError::Validation("distance_km must be a positive number".into()));
            }
            return Ok(km);
        }
        let (Some(pickup), Some(dropoff)) = (pickup, dropoff) else {
            return Err(CoreError::Validation(
                "distance_km or both addresses are required".into(),
            ));
        };
        let Some(lookup) = &self.distance else {
            return Err(CoreError::UpstreamUnavailable(
                "distance lookup not configured".into(),
            ));
        };
        lookup.distance_km(pickup, dropoff).await
    }

    /// Fare for a trip. Looks up the road distance when it is not supplied.
    pub async fn quote(&self, request: &PriceRequest) -> CoreResult<PriceBreakdown> {
        if request.passengers == 0 {
            return Err(CoreError::Validation("passengers must be at least 1".into()));
        }
        let distance = self
            .resolve_distance(
                request.distance_km,
                request.pickup_address.as_deref(),
                request.dropoff_address.as_deref(),
            )
            .await?;
        Ok(self.pricing.calculate(
            distance,
            request.passengers,
            request.vip_pickup,
            request.oversized_luggage,
        ))
    }

    fn validate(request: &NewBooking) -> CoreResult<()> {
        if request.name.trim().is_empty() {
            return Err(CoreError::Validation("name is required".into()));
        }
        if request.pickup_address.trim().is_empty() || request.dropoff_address.trim().is_empty() {
            return Err(CoreError::Validation("pickup and dropoff addresses are required".into()));
        }
        if request.passengers == 0 {
            return Err(CoreError::Validation("passengers must be at least 1".into()));
        }
        if let Some(total) = request.total_price {
            if !total.is_finite() || total < 0.0 {
                return Err(CoreError::Validation("total_price must not be negative".into()));
            }
        }
        Ok(())
    }

    /// Computed fare, or `None` when an admin override stands in for it.
    async fn price_new_booking(&self, request: &NewBooking) -> CoreResult<Option<PriceBreakdown>> {
        let distance = self
            .resolve_distance(
                request.distance_km,
                Some(&request.pickup_address),
                Some(&request.dropoff_address),
            )
            .await;
        match distance {
            Ok(km) => Ok(Some(self.pricing.calculate(
                km,
                request.passengers,
                request.options.vip_pickup,
                request.options.oversized_luggage,
            ))),
            Err(e) if request.total_price.is_some() => {
                warn!("No fare breakdown for admin-priced booking: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Insert under the next free reference, retrying on collisions.
    pub(crate) async fn insert_with_reference(&self, booking: &mut Booking) -> CoreResult<()> {
        let latest = self.bookings.latest_reference().await?;
        let mut candidate = next_reference(latest.as_deref());

        for attempt in 0..=self.rules.reference_retry_limit {
            booking.booking_ref = candidate.clone();
            match self.bookings.insert(booking).await {
                Ok(()) => return Ok(()),
                Err(CoreError::Conflict(reason)) => {
                    warn!("Reference {} collided (attempt {}): {}", candidate, attempt + 1, reason);
                    candidate = next_reference(Some(&candidate));
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::Conflict("could not allocate a booking reference".into()))
    }

    pub(crate) fn urgent_hours(&self, booking: &Booking, now: DateTime<Utc>) -> Option<f64> {
        let hours = hours_until_pickup(booking, now, self.rules.utc_offset_hours)?;
        (hours > 0.0 && hours <= self.rules.urgent_window_hours).then_some(hours)
    }

    /// Customer email + SMS, stamping each channel that went out.
    pub(crate) async fn send_customer_confirmation(&self, booking: &mut Booking, now: DateTime<Utc>) -> (bool, bool) {
        let emailed = self.notifier.send_customer_confirmation_email(booking).await;
        if emailed {
            self.record_mark(booking, BookingMark::EmailSent(now.to_rfc3339())).await;
        }
        let texted = self.notifier.send_customer_confirmation_sms(booking).await;
        if texted {
            self.record_mark(booking, BookingMark::SmsSent(now.to_rfc3339())).await;
        }
        (emailed, texted)
    }

    pub(crate) async fn sync_calendar(&self, booking: &mut Booking) {
        if let Some(event_id) = self.notifier.sync_calendar(booking).await {
            self.record_mark(booking, BookingMark::CalendarEvent(event_id)).await;
        }
    }

    /// Stamp bookkeeping on the local copy and write just those keys. The main
    /// change already succeeded, so storage failures are only logged.
    pub(crate) async fn record_mark(&self, booking: &mut Booking, mark: BookingMark) {
        mark.apply(booking);
        match self.bookings.apply_mark(&booking.id, &mark).await {
            Ok(true) => {}
            Ok(false) => warn!("Booking {} vanished before {:?} was recorded", booking.booking_ref, mark),
            Err(e) => error!("Failed to record {:?} for {}: {}", mark, booking.booking_ref, e),
        }
    }

    pub async fn create_booking(&self, request: NewBooking) -> CoreResult<Booking> {
        Self::validate(&request)?;
        let now = Utc::now();
        let pricing = self.price_new_booking(&request).await?;
        let total_price = match (request.total_price, &pricing) {
            (Some(total), _) => round_money(total),
            (None, Some(p)) => p.total_price,
            (None, None) => return Err(CoreError::Validation("no price could be determined".into())),
        };

        let mut booking = Booking {
            id: Uuid::new_v4().to_string(),
            booking_ref: String::new(),
            name: request.name.trim().to_string(),
            email: request.email,
            phone: request.phone,
            pickup_address: request.pickup_address,
            dropoff_address: request.dropoff_address,
            date: request.date,
            time: request.time,
            passengers: request.passengers,
            notes: request.notes,
            service_type: request.service_type,
            options: request.options,
            flight: request.flight,
            pricing,
            total_price,
            status: request.status,
            payment_status: request.payment_status,
            legs: Default::default(),
            notifications: Default::default(),
            payment: Default::default(),
            calendar_event_id: None,
            created_at: now,
            updated_at: None,
            deleted_at: None,
            deleted_by: None,
            restored_at: None,
        };
        if booking.pickup_time().is_none() {
            warn!("Booking for {} has unreadable pickup time {:?}", booking.date, booking.time);
        }

        self.insert_with_reference(&mut booking).await?;
        info!("Booking {} created ({}, ${:.2})", booking.booking_ref, booking.status, booking.total_price);

        self.notifier.send_admin_new_booking(&booking).await;
        if let Some(hours) = self.urgent_hours(&booking, now) {
            warn!("Urgent booking {}: pickup in {:.1}h", booking.booking_ref, hours);
            self.notifier.send_urgent_alert(&booking, hours).await;
        }
        if booking.status == BookingStatus::Confirmed && booking.payment_status == PaymentStatus::Paid {
            self.send_customer_confirmation(&mut booking, now).await;
        }
        self.sync_calendar(&mut booking).await;

        Ok(booking)
    }

    pub async fn get_booking(&self, id: &str) -> CoreResult<Booking> {
        self.bookings
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking"))
    }

    /// Active bookings, newest first
    pub async fn list_bookings(&self) -> CoreResult<Vec<Booking>> {
        self.bookings.list().await
    }

    async fn store_edit(&self, mut booking: Booking, was_confirmed: bool) -> CoreResult<Booking> {
        booking.touch(Utc::now());
        if !self.bookings.save(&booking).await? {
            return Err(CoreError::not_found("Booking"));
        }
        if !was_confirmed && booking.status == BookingStatus::Confirmed {
            info!("Booking {} confirmed", booking.booking_ref);
            self.sync_calendar(&mut booking).await;
        }
        Ok(booking)
    }

    /// Partial edit. The fare is only replaced when given explicitly.
    pub async fn update_booking(&self, id: &str, update: BookingUpdate) -> CoreResult<Booking> {
        let mut booking = self.get_booking(id).await?;
        let was_confirmed = booking.status == BookingStatus::Confirmed;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(CoreError::Validation("name must not be empty".into()));
            }
            booking.name = name.trim().to_string();
        }
        if let Some(passengers) = update.passengers {
            if passengers == 0 {
                return Err(CoreError::Validation("passengers must be at least 1".into()));
            }
            booking.passengers = passengers;
        }
        if let Some(total) = update.total_price {
            if !total.is_finite() || total < 0.0 {
                return Err(CoreError::Validation("total_price must not be negative".into()));
            }
            booking.total_price = round_money(total);
        }
        if let Some(pricing) = update.pricing {
            if update.total_price.is_none() {
                booking.total_price = pricing.total_price;
            }
            booking.pricing = Some(pricing);
        }
        if let Some(email) = update.email {
            booking.email = email;
        }
        if let Some(phone) = update.phone {
            booking.phone = phone;
        }
        if let Some(pickup) = update.pickup_address {
            booking.pickup_address = pickup;
        }
        if let Some(dropoff) = update.dropoff_address {
            booking.dropoff_address = dropoff;
        }
        if let Some(date) = update.date {
            booking.date = date;
        }
        if let Some(time) = update.time {
            booking.time = time;
        }
        if let Some(notes) = update.notes {
            booking.notes = notes;
        }
        if let Some(service_type) = update.service_type {
            booking.service_type = Some(service_type);
        }
        if let Some(options) = update.options {
            booking.options = options;
        }
        if let Some(flight) = update.flight {
            booking.flight = flight;
        }
        if let Some(status) = update.status {
            booking.status = status;
        }
        if let Some(payment_status) = update.payment_status {
            booking.payment_status = payment_status;
        }

        self.store_edit(booking, was_confirmed).await
    }

    /// Status patch. Entering `confirmed` puts the trip on the shared calendar.
    pub async fn update_status(
        &self,
        id: &str,
        status: Option<BookingStatus>,
        payment_status: Option<PaymentStatus>,
    ) -> CoreResult<Booking> {
        if status.is_none() && payment_status.is_none() {
            return Err(CoreError::Validation("nothing to update".into()));
        }
        let mut booking = self.get_booking(id).await?;
        let was_confirmed = booking.status == BookingStatus::Confirmed;
        if let Some(status) = status {
            booking.status = status;
        }
        if let Some(payment_status) = payment_status {
            booking.payment_status = payment_status;
        }
        self.store_edit(booking, was_confirmed).await
    }

    /// Copy trip and contact details into a fresh pending booking.
    pub async fn duplicate_booking(&self, id: &str) -> CoreResult<Booking> {
        let source = self.get_booking(id).await?;
        let notes = if source.notes.is_empty() {
            format!("Duplicated from {}.", source.booking_ref)
        } else {
            format!("Duplicated from {}. {}", source.booking_ref, source.notes)
        };

        let mut copy = Booking {
            id: Uuid::new_v4().to_string(),
            booking_ref: String::new(),
            notes,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            legs: Default::default(),
            notifications: Default::default(),
            payment: Default::default(),
            calendar_event_id: None,
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
            deleted_by: None,
            restored_at: None,
            ..source
        };
        self.insert_with_reference(&mut copy).await?;
        info!("Booking {} duplicated from {}", copy.booking_ref, id);
        Ok(copy)
    }

    /// Soft delete. The customer is told the trip is cancelled.
    pub async fn delete_booking(&self, id: &str, deleted_by: &str) -> CoreResult<Booking> {
        let booking = self.get_booking(id).await?;
        if booking.status != BookingStatus::Test {
            self.notifier.send_cancellation(&booking).await;
        }
        let deleted = self
            .bookings
            .soft_delete(id, deleted_by, Utc::now())
            .await?
            .ok_or_else(|| CoreError::not_found("Booking"))?;
        info!("Booking {} deleted by {}", deleted.booking_ref, deleted_by);
        Ok(deleted)
    }

    /// Most recently deleted first
    pub async fn list_deleted(&self) -> CoreResult<Vec<Booking>> {
        self.bookings.list_deleted().await
    }

    pub async fn restore_booking(&self, id: &str) -> CoreResult<Booking> {
        let restored = self
            .bookings
            .restore(id, Utc::now())
            .await?
            .ok_or_else(|| CoreError::not_found("Deleted booking"))?;
        info!("Booking {} restored", restored.booking_ref);
        Ok(restored)
    }

    pub async fn purge_booking(&self, id: &str) -> CoreResult<()> {
        if !self.bookings.purge(id).await? {
            return Err(CoreError::not_found("Deleted booking"));
        }
        info!("Deleted booking {} purged", id);
        Ok(())
    }
}

use chrono::Utc;
use hibiscus_core::models::LegOffer;
use hibiscus_core::repository::{BookingRepository, DriverRepository, LegGuard, SessionStore};
use hibiscus_core::{
    Booking, CoreError, CoreResult, DispatchLeg, Driver, Leg, SessionStatus, TrackingStatus,
};
use hibiscus_notify::{JobOffer, NotificationDispatcher};
use hibiscus_pricing::round_money;
use hibiscus_store::app_config::BusinessRules;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{AssignRequest, Assignment, JobView, RespondOutcome, RespondStatus};
use crate::tracking::new_session;

const TOKEN_LENGTH: usize = 12;

fn acceptance_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

fn leg_label(leg: Leg) -> &'static str {
    match leg {
        Leg::Outbound => "Outbound",
        Leg::Return => "Return",
    }
}

/// Pickup and dropoff as seen by the driver of `leg`.
fn leg_route(booking: &Booking, leg: Leg) -> (String, String) {
    match leg {
        Leg::Outbound => (booking.pickup_address.clone(), booking.dropoff_address.clone()),
        Leg::Return => (booking.dropoff_address.clone(), booking.pickup_address.clone()),
    }
}

/// Driver assignment and the accept/decline handshake, per leg.
///
/// Each leg moves `unassigned -> pending_acceptance -> accepted` or back to
/// unassigned through a decline. The booking document is only touched
/// through single-leg writes so the two legs never clobber each other.
pub struct DispatchService {
    bookings: Arc<dyn BookingRepository>,
    drivers: Arc<dyn DriverRepository>,
    sessions: Arc<dyn SessionStore>,
    notifier: NotificationDispatcher,
    rules: BusinessRules,
}

impl DispatchService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        drivers: Arc<dyn DriverRepository>,
        sessions: Arc<dyn SessionStore>,
        notifier: NotificationDispatcher,
        rules: BusinessRules,
    ) -> Self {
        Self {
            bookings,
            drivers,
            sessions,
            notifier,
            rules,
        }
    }

    async fn booking(&self, booking_id: &str) -> CoreResult<Booking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking"))
    }

    async fn driver(&self, driver_id: &str) -> CoreResult<Driver> {
        self.drivers
            .get(driver_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Driver"))
    }

    /// Drop the live session hanging off a leg, if any.
    async fn drop_session(&self, leg: Option<&DispatchLeg>) -> CoreResult<()> {
        if let Some(tracking_id) = leg.and_then(|l| l.tracking_id.as_deref()) {
            if self.sessions.delete(tracking_id).await?.is_some() {
                info!("Tracking session {} removed", tracking_id);
            }
        }
        Ok(())
    }

    /// Default payout is the leg fare times the payout ratio.
    fn payout_for(&self, booking: &Booking, leg: Leg, override_payout: Option<f64>) -> f64 {
        match override_payout {
            Some(payout) => round_money(payout),
            None => round_money(booking.leg_price(leg) * self.rules.driver_payout_ratio),
        }
    }

    async fn place_offer(
        &self,
        booking: &Booking,
        driver: &Driver,
        leg: Leg,
        request: &AssignRequest,
        auto_dispatched: bool,
    ) -> CoreResult<Assignment> {
        if booking.is_cancelled() {
            return Err(CoreError::Conflict(format!("{} is cancelled", booking.booking_ref)));
        }
        if !driver.active {
            return Err(CoreError::Conflict(format!("driver {} is inactive", driver.name)));
        }
        if let Some(payout) = request.driver_payout {
            if !payout.is_finite() || payout < 0.0 {
                return Err(CoreError::Validation("driver_payout must not be negative".into()));
            }
        }

        let now = Utc::now();
        let payout = self.payout_for(booking, leg, request.driver_payout);
        let token = acceptance_token();
        let notes = request
            .notes_to_driver
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        // Any earlier offer on this leg is overwritten along with its session
        let previous = booking.leg(leg);
        if previous.is_some_and(DispatchLeg::is_assigned) {
            warn!("Reassigning {} leg of {}", leg, booking.booking_ref);
        }
        self.drop_session(previous).await?;

        let tracking_id = match leg {
            Leg::Outbound => {
                if let Some(stale) = self.sessions.find_by_pair(&booking.id, &driver.id).await? {
                    self.sessions.delete(&stale.tracking_id).await?;
                }
                let session = new_session(booking, driver, SessionStatus::PendingAcceptance, now);
                let tracking_id = session.tracking_id.clone();
                self.sessions.put(session).await?;
                Some(tracking_id)
            }
            Leg::Return => None,
        };

        let mut dispatch = DispatchLeg::default();
        dispatch.assign(
            LegOffer {
                driver_id: driver.id.clone(),
                driver_name: driver.name.clone(),
                payout,
                notes: notes.clone(),
                token: token.clone(),
                tracking_id: tracking_id.clone(),
                auto_dispatched,
            },
            now,
        );
        if !self.bookings.set_leg(&booking.id, leg, &dispatch).await? {
            return Err(CoreError::not_found("Booking"));
        }
        info!(
            "Driver {} offered {} leg of {} (${:.2}, auto={})",
            driver.name, leg, booking.booking_ref, payout, auto_dispatched
        );

        let (pickup_address, dropoff_address) = leg_route(booking, leg);
        let offer = JobOffer {
            booking_id: booking.id.clone(),
            booking_ref: booking.booking_ref.clone(),
            leg_label: leg_label(leg).to_string(),
            driver_name: driver.name.clone(),
            driver_email: Some(driver.email.expose().clone()).filter(|e| !e.is_empty()),
            driver_phone: Some(driver.phone.expose().clone()).filter(|p| !p.is_empty()),
            date: booking.date,
            time: booking.time.clone(),
            pickup_address,
            dropoff_address,
            passengers: booking.passengers,
            customer_name: booking.name.clone(),
            payout,
            notes,
            accept_url: self.job_url(&booking.id, leg, &token),
            auto_dispatched,
        };
        self.notifier.send_job_offer(&offer).await;

        Ok(Assignment {
            booking_id: booking.id.clone(),
            booking_ref: booking.booking_ref.clone(),
            leg,
            driver_id: driver.id.clone(),
            driver_name: driver.name.clone(),
            driver_payout: payout,
            acceptance_token: token,
            tracking_id,
            tracking_status: TrackingStatus::PendingDriverAcceptance,
            auto_dispatched,
        })
    }

    fn job_url(&self, booking_id: &str, leg: Leg, token: &str) -> String {
        let url = self.notifier.job_url(booking_id, token);
        match leg {
            Leg::Outbound => url,
            Leg::Return => format!("{}&leg=return", url),
        }
    }

    /// Offer `leg` to a driver. The return leg needs a return-trip booking.
    pub async fn assign(&self, booking_id: &str, leg: Leg, request: &AssignRequest) -> CoreResult<Assignment> {
        let booking = self.booking(booking_id).await?;
        let driver = self.driver(&request.driver_id).await?;
        if leg == Leg::Return && !booking.options.return_trip {
            return Err(CoreError::Validation(format!(
                "{} does not have a return trip",
                booking.booking_ref
            )));
        }
        self.place_offer(&booking, &driver, leg, request, false).await
    }

    /// Driver's answer to a job offer.
    ///
    /// The write is conditional on the token still matching and no answer
    /// being stored, so a double-tapped link records exactly one response.
    pub async fn respond(
        &self,
        booking_id: &str,
        leg: Leg,
        token: &str,
        accepted: bool,
        decline_reason: Option<String>,
    ) -> CoreResult<RespondOutcome> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Job"))?;
        let current = booking
            .leg(leg)
            .filter(|l| l.token_matches(token))
            .ok_or_else(|| CoreError::Unauthorized("invalid token".into()))?;

        let already = RespondOutcome {
            status: RespondStatus::AlreadyResponded,
            booking_ref: booking.booking_ref.clone(),
            leg,
        };
        if current.driver_accepted.is_some() {
            return Ok(already);
        }

        let driver_name = current.driver_name.clone().unwrap_or_else(|| "Driver".to_string());
        let now = Utc::now();
        let mut next = current.clone();
        let reason = decline_reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        if accepted {
            next.accept(now);
        } else {
            next.decline(reason.clone(), now);
        }

        let guard = LegGuard {
            expected_token: token.to_string(),
            require_unanswered: true,
        };
        if !self.bookings.update_leg(booking_id, leg, &guard, &next).await? {
            // Lost a race: either another response won or the job was reassigned
            let latest = self.bookings.get(booking_id).await?;
            let still_ours = latest
                .as_ref()
                .and_then(|b| b.leg(leg))
                .is_some_and(|l| l.token_matches(token));
            if still_ours {
                return Ok(already);
            }
            return Err(CoreError::Unauthorized("invalid token".into()));
        }

        if !accepted {
            self.drop_session(Some(current)).await?;
        }
        info!(
            "Driver {} {} {} leg of {}",
            driver_name,
            if accepted { "ACCEPTED" } else { "DECLINED" },
            leg,
            booking.booking_ref
        );
        self.notifier
            .send_driver_response(&booking, &driver_name, accepted, reason.as_deref())
            .await;

        Ok(RespondOutcome {
            status: if accepted {
                RespondStatus::Accepted
            } else {
                RespondStatus::Declined
            },
            booking_ref: booking.booking_ref,
            leg,
        })
    }

    /// Admin override: wipe every assignment field on the leg.
    pub async fn unassign(&self, booking_id: &str, leg: Leg) -> CoreResult<String> {
        let booking = self.booking(booking_id).await?;
        self.drop_session(booking.leg(leg)).await?;
        if !self.bookings.set_leg(booking_id, leg, &DispatchLeg::default()).await? {
            return Err(CoreError::not_found("Booking"));
        }
        let driver = booking
            .leg(leg)
            .and_then(|l| l.driver_name.as_deref())
            .unwrap_or("Driver");
        info!("Driver {} unassigned from {} leg of {}", driver, leg, booking.booking_ref);
        Ok(booking.booking_ref)
    }

    /// Active drivers without an accepted job on the booking's date.
    ///
    /// This is a same-day approximation, not a time-window overlap check.
    pub async fn available_drivers(&self, booking_id: &str) -> CoreResult<Vec<Driver>> {
        let booking = self.booking(booking_id).await?;
        self.available_on(&booking).await
    }

    async fn available_on(&self, booking: &Booking) -> CoreResult<Vec<Driver>> {
        let same_day = self.bookings.list_by_date(booking.date).await?;
        let busy: HashSet<String> = same_day
            .iter()
            .filter(|b| !b.is_cancelled())
            .flat_map(|b| b.legs.values())
            .filter(|l| l.driver_accepted == Some(true))
            .filter_map(|l| l.driver_id.clone())
            .collect();

        let drivers = self.drivers.list_active().await?;
        Ok(drivers.into_iter().filter(|d| !busy.contains(&d.id)).collect())
    }

    /// Offer the outbound leg to the first available driver.
    pub async fn auto_dispatch(&self, booking_id: &str) -> CoreResult<Assignment> {
        let booking = self.booking(booking_id).await?;
        if booking.outbound().is_some_and(DispatchLeg::is_assigned) {
            return Err(CoreError::Conflict(format!(
                "{} already has a driver assigned",
                booking.booking_ref
            )));
        }
        let driver = self
            .available_on(&booking)
            .await?
            .into_iter()
            .next()
            .ok_or(CoreError::NoDriversAvailable)?;

        let request = AssignRequest {
            driver_id: driver.id.clone(),
            driver_payout: None,
            notes_to_driver: Some("Please respond ASAP".to_string()),
        };
        self.place_offer(&booking, &driver, Leg::Outbound, &request, true).await
    }

    /// Driver-facing job view. A supplied token must be the current one.
    pub async fn job_details(&self, booking_id: &str, leg: Leg, token: Option<&str>) -> CoreResult<JobView> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Job"))?;
        let dispatch = booking.leg(leg).cloned().unwrap_or_default();

        let verified = match token {
            Some(token) if !dispatch.token_matches(token) => {
                return Err(CoreError::Unauthorized("invalid token".into()))
            }
            Some(_) => true,
            None => false,
        };

        let (pickup_address, dropoff_address) = leg_route(&booking, leg);
        Ok(JobView {
            booking_id: booking.id,
            booking_ref: booking.booking_ref,
            leg,
            date: booking.date,
            time: booking.time,
            pickup_address,
            dropoff_address,
            passengers: booking.passengers,
            customer_name: booking.name,
            customer_phone: verified.then_some(booking.phone),
            driver_payout: dispatch.driver_payout,
            driver_notes: dispatch.driver_notes.clone(),
            driver_accepted: dispatch.driver_accepted,
            state: dispatch.state(),
            tracking_status: dispatch.tracking_status,
            flight: booking.flight,
        })
    }
}

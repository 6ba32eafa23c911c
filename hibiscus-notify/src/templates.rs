//! Message bodies for every email and SMS the business sends.

use chrono::NaiveDate;
use hibiscus_core::{Booking, TrackingSession};

use crate::dispatcher::JobOffer;

/// `27/12/2025`
pub fn format_date_nz(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// `27/12/2025 (Saturday)`
pub fn format_date_with_day(date: NaiveDate) -> String {
    date.format("%d/%m/%Y (%A)").to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

fn money(amount: f64) -> String {
    format!("${:.2}", amount)
}

fn wrap(title: &str, accent: &str, inner: &str) -> String {
    format!(
        r#"<div style="max-width: 600px; margin: 0 auto; padding: 20px; font-family: Arial, sans-serif;">
  <h2 style="color: {accent}; margin-bottom: 20px;">{title}</h2>
  <div style="background: #f9f9f9; padding: 20px; border-radius: 8px; border-left: 4px solid {accent};">
{inner}
  </div>
</div>"#
    )
}

fn row(label: &str, value: &str) -> String {
    format!("    <p><strong>{}:</strong> {}</p>\n", label, value)
}

fn trip_rows(booking: &Booking) -> String {
    let mut rows = String::new();
    rows.push_str(&row("Pickup", &booking.pickup_address));
    rows.push_str(&row("Drop-off", &booking.dropoff_address));
    rows.push_str(&row(
        "Date/Time",
        &format!("{} at {}", format_date_with_day(booking.date), booking.time),
    ));
    rows.push_str(&row("Passengers", &booking.passengers.to_string()));
    rows
}

fn flight_rows(booking: &Booking) -> String {
    let flight = &booking.flight;
    let mut rows = String::new();
    if flight.departure_flight_number.is_some() || flight.departure_time.is_some() {
        rows.push_str(&row(
            "Departure Flight",
            &format!(
                "{} at {}",
                flight.departure_flight_number.as_deref().unwrap_or("N/A"),
                flight.departure_time.as_deref().unwrap_or("N/A")
            ),
        ));
    }
    if flight.arrival_flight_number.is_some() || flight.arrival_time.is_some() {
        rows.push_str(&row(
            "Arrival Flight",
            &format!(
                "{} at {}",
                flight.arrival_flight_number.as_deref().unwrap_or("N/A"),
                flight.arrival_time.as_deref().unwrap_or("N/A")
            ),
        ));
    }
    rows
}

pub fn customer_confirmation_email(booking: &Booking, business_phone: &str) -> (String, String) {
    let subject = format!("Your Transfer is Confirmed - {}", booking.booking_ref);
    let mut inner = String::new();
    inner.push_str(&format!("    <p>Hi {},</p>\n", booking.first_name()));
    inner.push_str("    <p>Thank you for booking with Hibiscus to Airport. Your transfer is confirmed.</p>\n");
    inner.push_str(&row("Booking Reference", &booking.booking_ref));
    inner.push_str(&trip_rows(booking));
    inner.push_str(&flight_rows(booking));
    inner.push_str(&row("Total", &format!("{} NZD", money(booking.total_price))));
    inner.push_str(&format!("    <p>Questions? Call us on {}.</p>\n", business_phone));
    (subject, wrap("Booking Confirmed", "#D4AF37", &inner))
}

pub fn customer_confirmation_sms(booking: &Booking, business_phone: &str) -> String {
    format!(
        "HIBISCUS TO AIRPORT\nTransfer CONFIRMED\n\nRef: {}\n{}, {}\n{} to {}\n{} passengers | {}\n\nQuestions? {}\nhibiscustoairport.co.nz",
        booking.booking_ref,
        format_date_with_day(booking.date),
        booking.time,
        booking.pickup_address,
        booking.dropoff_address,
        booking.passengers,
        money(booking.total_price),
        business_phone,
    )
}

pub fn admin_new_booking_email(booking: &Booking) -> (String, String) {
    let subject = format!("New Booking - {}", booking.booking_ref);
    let mut inner = String::new();
    inner.push_str(&row("Reference", &booking.booking_ref));
    inner.push_str(&row("Customer", &booking.name));
    inner.push_str(&row("Phone", booking.phone.expose()));
    inner.push_str(&row("Email", booking.email.expose()));
    inner.push_str(&trip_rows(booking));
    inner.push_str(&flight_rows(booking));
    inner.push_str(&row("Total Price", &format!("{} NZD", money(booking.total_price))));
    inner.push_str(&row("Payment Status", &booking.payment_status.to_string().to_uppercase()));
    inner.push_str(&row("Booking Status", &booking.status.to_string().to_uppercase()));
    if !booking.notes.is_empty() {
        inner.push_str(&row("Notes", &booking.notes));
    }
    (subject, wrap("New Booking Received", "#D4AF37", &inner))
}

pub fn admin_new_booking_sms(booking: &Booking) -> String {
    format!(
        "NEW BOOKING!\n\nRef: {}\n{}\n{} at {}\n{} pax | {}\n\nFrom: {}\nTo: {}\n\nLogin to admin to manage.",
        booking.booking_ref,
        booking.name,
        format_date_nz(booking.date),
        booking.time,
        booking.passengers,
        money(booking.total_price),
        truncate(&booking.pickup_address, 40),
        truncate(&booking.dropoff_address, 40),
    )
}

pub fn urgent_admin_email(booking: &Booking, hours_until: f64) -> (String, String) {
    let hours = hours_until.floor() as i64;
    let subject = format!("URGENT BOOKING - {} - {}hrs NOTICE!", booking.booking_ref, hours);
    let mut inner = String::new();
    inner.push_str(&format!("    <p><strong>Only {} hours until pickup!</strong></p>\n", hours));
    inner.push_str(&row("Reference", &booking.booking_ref));
    inner.push_str(&row("Customer", &booking.name));
    inner.push_str(&row("Phone", booking.phone.expose()));
    inner.push_str(&trip_rows(booking));
    inner.push_str(&row("Total Price", &format!("{} NZD", money(booking.total_price))));
    inner.push_str("    <p><strong>ACTION REQUIRED: Assign driver immediately!</strong></p>\n");
    (subject, wrap("URGENT BOOKING", "#DC2626", &inner))
}

pub fn urgent_admin_sms(booking: &Booking, hours_until: f64) -> String {
    format!(
        "URGENT BOOKING!\n\nONLY {}hrs NOTICE!\n\nRef: {}\n{}\n{}\n\n{} at {}\n{} pax | {}\n\nFrom: {}\nTo: {}\n\nACTION REQUIRED NOW!",
        hours_until.floor() as i64,
        booking.booking_ref,
        booking.name,
        booking.phone.expose(),
        format_date_nz(booking.date),
        booking.time,
        booking.passengers,
        money(booking.total_price),
        truncate(&booking.pickup_address, 35),
        truncate(&booking.dropoff_address, 35),
    )
}

pub fn cancellation_email(booking: &Booking, business_phone: &str) -> (String, String) {
    let subject = format!("Booking Cancelled - {}", booking.booking_ref);
    let mut inner = String::new();
    inner.push_str("    <p>Your booking with Hibiscus to Airport has been cancelled.</p>\n");
    inner.push_str(&row("Booking Reference", &booking.booking_ref));
    inner.push_str(&row("Name", &booking.name));
    inner.push_str(&row("Pickup", &booking.pickup_address));
    inner.push_str(&row("Drop-off", &booking.dropoff_address));
    inner.push_str(&row(
        "Date & Time",
        &format!("{} at {}", format_date_nz(booking.date), booking.time),
    ));
    inner.push_str(&format!(
        "    <p>Questions about this cancellation, or want to rebook? Call {}.</p>\n",
        business_phone
    ));
    (subject, wrap("Booking Cancelled", "#DC143C", &inner))
}

pub fn cancellation_sms(booking: &Booking, business_phone: &str) -> String {
    format!(
        "Hibiscus to Airport - Booking Cancelled\nRef: {}\nDate: {} at {}\n\nYour booking has been cancelled. Contact us if you have questions: {}",
        booking.booking_ref,
        format_date_nz(booking.date),
        booking.time,
        business_phone,
    )
}

pub fn driver_job_email(offer: &JobOffer) -> (String, String) {
    let prefix = if offer.auto_dispatched { "AUTO-DISPATCH " } else { "" };
    let subject = format!(
        "{}NEW JOB: {} - {}",
        prefix,
        offer.booking_ref,
        money(offer.payout)
    );
    let mut inner = String::new();
    inner.push_str(&format!("    <p>Hi {},</p>\n", offer.driver_name));
    inner.push_str("    <p>You have been assigned a new job. Please review the details below and accept or decline.</p>\n");
    inner.push_str(&row("Your Payout", &money(offer.payout)));
    inner.push_str(&row("Trip", &offer.leg_label));
    inner.push_str(&row("Date", &format_date_with_day(offer.date)));
    inner.push_str(&row("Pickup Time", &offer.time));
    inner.push_str(&row("Pickup", &offer.pickup_address));
    inner.push_str(&row("Drop-off", &offer.dropoff_address));
    inner.push_str(&row("Passengers", &offer.passengers.to_string()));
    inner.push_str(&row("Customer", &offer.customer_name));
    if let Some(notes) = offer.notes.as_deref().filter(|n| !n.is_empty()) {
        inner.push_str(&row("Notes", notes));
    }
    inner.push_str(&format!(
        "    <p><a href=\"{}\">VIEW JOB &amp; RESPOND</a></p>\n",
        offer.accept_url
    ));
    (subject, wrap("New Job Available", "#f59e0b", &inner))
}

pub fn driver_job_sms(offer: &JobOffer) -> String {
    let prefix = if offer.auto_dispatched { "AUTO-DISPATCH " } else { "" };
    format!(
        "{}NEW JOB - {} ({})\n\nDate: {} at {}\nFrom: {}\nTo: {}\nPayout: {}\n\nClick to accept/decline:\n{}",
        prefix,
        offer.booking_ref,
        offer.leg_label,
        format_date_nz(offer.date),
        offer.time,
        truncate(&offer.pickup_address, 40),
        truncate(&offer.dropoff_address, 40),
        money(offer.payout),
        offer.accept_url,
    )
}

pub fn driver_response_email(
    booking: &Booking,
    driver_name: &str,
    accepted: bool,
    reason: Option<&str>,
) -> (String, String) {
    if accepted {
        let subject = format!("Driver ACCEPTED: {}", booking.booking_ref);
        let body = format!(
            "<p><strong>{}</strong> has ACCEPTED job <strong>{}</strong></p><p>Pickup: {} at {}</p>",
            driver_name,
            booking.booking_ref,
            format_date_nz(booking.date),
            booking.time
        );
        (subject, body)
    } else {
        let subject = format!("Driver DECLINED: {}", booking.booking_ref);
        let body = format!(
            "<p><strong>{}</strong> has DECLINED job <strong>{}</strong></p><p>Reason: {}</p><p>Please assign another driver.</p>",
            driver_name,
            booking.booking_ref,
            reason.filter(|r| !r.is_empty()).unwrap_or("No reason given")
        );
        (subject, body)
    }
}

pub fn proximity_sms(session: &TrackingSession, tracking_url: &str, eta_minutes: i64) -> String {
    let first_name = session
        .customer_name
        .split_whitespace()
        .next()
        .unwrap_or("there");
    format!(
        "Hi {}! Your driver {} is approximately {} minutes away. Track live: {}",
        first_name, session.driver_name, eta_minutes, tracking_url
    )
}

pub fn reminder_email(booking: &Booking, business_phone: &str) -> (String, String) {
    let subject = format!("Reminder: Your Airport Transfer Tomorrow - {}", booking.booking_ref);
    let mut inner = String::new();
    inner.push_str(&format!("    <p>Hi {},</p>\n", booking.name));
    inner.push_str("    <p>Just a friendly reminder that your airport transfer is scheduled for <strong>tomorrow</strong>.</p>\n");
    inner.push_str(&row("Booking Reference", &booking.booking_ref));
    inner.push_str(&trip_rows(booking));
    inner.push_str("    <p><strong>Please be ready 5-10 minutes before your pickup time.</strong> Your driver will contact you when they are on their way.</p>\n");
    inner.push_str(&format!("    <p>Need to make changes? Call {}.</p>\n", business_phone));
    (subject, wrap("Transfer Reminder", "#f59e0b", &inner))
}

pub fn reminder_sms(booking: &Booking, business_phone: &str) -> String {
    format!(
        "REMINDER: Your airport transfer is tomorrow!\n\nRef: {}\nPickup: {} at {}\nFrom: {}\n\nBe ready 5-10 mins early.\nQuestions? {}",
        booking.booking_ref,
        format_date_nz(booking.date),
        booking.time,
        truncate(&booking.pickup_address, 50),
        business_phone,
    )
}

pub fn payment_link_email(booking: &Booking, payment_url: &str) -> (String, String) {
    let subject = format!("Complete Your Payment - {}", booking.booking_ref);
    let mut inner = String::new();
    inner.push_str(&format!("    <p>Hi {},</p>\n", booking.first_name()));
    inner.push_str("    <p>Please complete payment to confirm your airport transfer.</p>\n");
    inner.push_str(&row("Booking Reference", &booking.booking_ref));
    inner.push_str(&trip_rows(booking));
    inner.push_str(&row("Amount Due", &format!("{} NZD", money(booking.total_price))));
    inner.push_str(&format!("    <p><a href=\"{}\">PAY NOW</a></p>\n", payment_url));
    (subject, wrap("Payment Required", "#D4AF37", &inner))
}

pub fn payment_link_sms(booking: &Booking, payment_url: &str) -> String {
    format!(
        "Hibiscus to Airport\nRef: {}\nAmount due: {}\n\nPay securely here:\n{}",
        booking.booking_ref,
        money(booking.total_price),
        payment_url,
    )
}

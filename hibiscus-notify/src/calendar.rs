//! Business-local pickup times, iCalendar invites and calendar events.

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use hibiscus_core::notify::CalendarEvent;
use hibiscus_core::Booking;

const PRODID: &str = "-//Hibiscus to Airport//Booking System//EN";

/// Transfers are blocked out for an hour on the shared calendar.
const EVENT_DURATION_MINUTES: i64 = 60;

pub fn business_offset(utc_offset_hours: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or(Utc.fix())
}

/// Pickup moment of a booking whose date and time are in business-local time.
pub fn pickup_instant(booking: &Booking, utc_offset_hours: i32) -> Option<DateTime<Utc>> {
    let time = booking.pickup_time()?;
    let local = booking.date.and_time(time);
    business_offset(utc_offset_hours)
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn event_description(booking: &Booking) -> String {
    let notes = if booking.notes.is_empty() { "N/A" } else { booking.notes.as_str() };
    format!(
        "Booking Ref: {}\nCustomer: {}\nPhone: {}\nPickup: {}\nDropoff: {}\nPassengers: {}\nNotes: {}",
        booking.booking_ref,
        booking.name,
        booking.phone.expose(),
        booking.pickup_address,
        booking.dropoff_address,
        booking.passengers,
        notes,
    )
}

pub fn calendar_event(booking: &Booking, utc_offset_hours: i32) -> Option<CalendarEvent> {
    let start = pickup_instant(booking, utc_offset_hours)?;
    Some(CalendarEvent {
        summary: format!("Airport Transfer - {} ({})", booking.name, booking.booking_ref),
        description: event_description(booking),
        location: booking.pickup_address.clone(),
        start,
        end: start + chrono::Duration::minutes(EVENT_DURATION_MINUTES),
    })
}

fn ics_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

fn ics_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// `invite.ics` attached to the customer confirmation. `None` when the pickup
/// time cannot be read.
pub fn calendar_invite(booking: &Booking, utc_offset_hours: i32) -> Option<String> {
    let event = calendar_event(booking, utc_offset_hours)?;
    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", PRODID),
        "METHOD:REQUEST".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@hibiscustoairport.co.nz", booking.id),
        format!("DTSTAMP:{}", ics_stamp(Utc::now())),
        format!("DTSTART:{}", ics_stamp(event.start)),
        format!("DTEND:{}", ics_stamp(event.end)),
        format!("SUMMARY:{}", ics_escape(&event.summary)),
        format!("DESCRIPTION:{}", ics_escape(&event.description)),
        format!("LOCATION:{}", ics_escape(&event.location)),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];
    Some(lines.join("\r\n") + "\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(time: &str) -> Booking {
        serde_json::from_value(serde_json::json!({
            "id": "b-1",
            "booking_ref": "H12",
            "name": "Ana Lee",
            "email": "ana@example.com",
            "phone": "021555123",
            "pickup_address": "1 Queen St, Auckland",
            "dropoff_address": "Auckland Airport",
            "date": "2026-11-02",
            "time": time,
            "passengers": 2,
            "pricing": null,
            "total_price": 120.0,
            "created_at": "2026-10-01T00:00:00Z",
            "updated_at": null
        }))
        .unwrap()
    }

    #[test]
    fn test_pickup_instant_applies_offset() {
        let at = pickup_instant(&booking("06:30"), 13).unwrap();
        assert_eq!(at.to_rfc3339(), "2026-11-01T17:30:00+00:00");
    }

    #[test]
    fn test_unreadable_time_yields_none() {
        assert!(pickup_instant(&booking("early"), 13).is_none());
        assert!(calendar_invite(&booking("early"), 13).is_none());
    }

    #[test]
    fn test_invite_contains_event() {
        let ics = calendar_invite(&booking("06:30"), 13).unwrap();
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("DTSTART:20261101T173000Z"));
        assert!(ics.contains("LOCATION:1 Queen St\\, Auckland"));
        assert!(ics.contains("Booking Ref: H12"));
    }
}

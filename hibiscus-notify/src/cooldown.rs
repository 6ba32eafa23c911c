use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Customer notification channel selectable on resend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Both,
}

impl Channel {
    pub fn includes_email(self) -> bool {
        matches!(self, Channel::Email | Channel::Both)
    }

    pub fn includes_sms(self) -> bool {
        matches!(self, Channel::Sms | Channel::Both)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Both => "both",
        };
        f.write_str(s)
    }
}

/// Whether a channel may send again, and if not how many whole minutes to wait.
///
/// A missing stamp allows sending. A stamp that cannot be parsed also allows
/// sending: bad data must never block a legitimate resend.
pub fn check_notification_cooldown(
    last_sent: Option<&str>,
    cooldown_minutes: i64,
    now: DateTime<Utc>,
) -> (bool, i64) {
    let Some(raw) = last_sent.map(str::trim).filter(|s| !s.is_empty()) else {
        return (true, 0);
    };

    let Some(sent_at) = parse_stamp(raw) else {
        tracing::warn!("Unparseable notification stamp {:?}, allowing send", raw);
        return (true, 0);
    };

    let elapsed = (now - sent_at).num_milliseconds() as f64 / 60_000.0;
    let cooldown = cooldown_minutes as f64;
    if elapsed < cooldown {
        let remaining = (cooldown - elapsed).ceil() as i64 + 1;
        return (false, remaining);
    }
    (true, 0)
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_stamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stamp(at: DateTime<Utc>) -> String {
        at.to_rfc3339()
    }

    #[test]
    fn test_no_previous_send() {
        assert_eq!(check_notification_cooldown(None, 5, Utc::now()), (true, 0));
        assert_eq!(check_notification_cooldown(Some(""), 5, Utc::now()), (true, 0));
    }

    #[test]
    fn test_recent_send_is_blocked() {
        let now = Utc::now();
        let last = stamp(now - Duration::minutes(2));
        let (can_send, remaining) = check_notification_cooldown(Some(&last), 5, now);
        assert!(!can_send);
        assert_eq!(remaining, 4);
    }

    #[test]
    fn test_fractional_elapsed_rounds_up() {
        let now = Utc::now();
        let last = stamp(now - Duration::seconds(150));
        assert_eq!(check_notification_cooldown(Some(&last), 5, now), (false, 4));
    }

    #[test]
    fn test_expired_cooldown_allows() {
        let now = Utc::now();
        let last = stamp(now - Duration::minutes(6));
        assert_eq!(check_notification_cooldown(Some(&last), 5, now), (true, 0));
    }

    #[test]
    fn test_garbage_stamp_is_permissive() {
        assert_eq!(
            check_notification_cooldown(Some("yesterday-ish"), 5, Utc::now()),
            (true, 0)
        );
    }

    #[test]
    fn test_naive_stamp_read_as_utc() {
        let now = Utc::now();
        let last = (now - Duration::minutes(1))
            .naive_utc()
            .format("%Y-%m-%dT%H:%M:%S%.f")
            .to_string();
        let (can_send, _) = check_notification_cooldown(Some(&last), 5, now);
        assert!(!can_send);
    }

    #[test]
    fn test_channel_membership() {
        assert!(Channel::Both.includes_email() && Channel::Both.includes_sms());
        assert!(!Channel::Email.includes_sms());
        assert!(!Channel::Sms.includes_email());
    }
}

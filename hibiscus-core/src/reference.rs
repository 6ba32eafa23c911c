//! Human-readable booking references: `H1`, `H2`, ...

pub const REFERENCE_PREFIX: char = 'H';

pub fn format_reference(number: u64) -> String {
    format!("{}{}", REFERENCE_PREFIX, number)
}

pub fn parse_reference(reference: &str) -> Option<u64> {
    reference
        .trim()
        .strip_prefix(REFERENCE_PREFIX)
        .and_then(|digits| digits.parse::<u64>().ok())
}

/// Next reference after the most recently created one.
///
/// No stored reference yields `H1`. A malformed one also yields `H1` rather
/// than failing booking creation; the unique index on references turns any
/// resulting collision into a retry.
pub fn next_reference(last: Option<&str>) -> String {
    match last.map(parse_reference) {
        Some(Some(n)) => format_reference(n + 1),
        Some(None) => {
            tracing::warn!("Unparseable booking reference {:?}, restarting at H1", last);
            format_reference(1)
        }
        None => format_reference(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reference() {
        assert_eq!(next_reference(None), "H1");
    }

    #[test]
    fn test_increments_last_reference() {
        assert_eq!(next_reference(Some("H7")), "H8");
        assert_eq!(next_reference(Some("H999")), "H1000");
    }

    #[test]
    fn test_malformed_reference_falls_back() {
        assert_eq!(next_reference(Some("BOOK-7")), "H1");
        assert_eq!(next_reference(Some("H")), "H1");
        assert_eq!(next_reference(Some("Hx2")), "H1");
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("H42"), Some(42));
        assert_eq!(parse_reference("42"), None);
    }
}

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps customer contact data so it is masked in Debug/Display output.
///
/// Serialization passes the real value through: the wrapper exists to keep
/// phone numbers and emails out of `tracing` output, not out of API responses.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Masked(value)
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Masked(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_debug_but_serializes() {
        let phone = Masked::from("+6421743321");
        assert_eq!(format!("{:?}", phone), "********");
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"+6421743321\"");

        let back: Masked<String> = serde_json::from_str("\"a@b.nz\"").unwrap();
        assert_eq!(back.expose(), "a@b.nz");
    }
}

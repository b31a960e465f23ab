//! Application identifiers.

use std::fmt;
use std::str::FromStr;

use crate::{IdError, Ulid};

/// Identifier of a submitted application, formatted as `app_{ulid}`.
///
/// The ULID is time-ordered, so `Ord` on `ApplicationId` follows submission
/// order for IDs minted by the same clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicationId(Ulid);

impl ApplicationId {
    /// The prefix for application IDs.
    pub const PREFIX: &'static str = "app";

    /// Creates a new ID with a fresh ULID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates an ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the timestamp portion of the ULID in milliseconds.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    /// Parses an ID in the format `app_{ulid}`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((prefix, ulid_str)) = s.split_once('_') else {
            return Err(IdError::MissingSeparator);
        };

        if prefix != Self::PREFIX {
            return Err(IdError::InvalidPrefix {
                expected: Self::PREFIX,
                actual: prefix.to_string(),
            });
        }

        ulid_str
            .parse::<Ulid>()
            .map(Self)
            .map_err(|e| IdError::InvalidUlid(e.to_string()))
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl FromStr for ApplicationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ApplicationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ApplicationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_id_roundtrip() {
        let id = ApplicationId::new();
        let s = id.to_string();
        assert!(s.starts_with("app_"));
        let parsed: ApplicationId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_application_id_invalid_prefix() {
        let result: Result<ApplicationId, _> = "org_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            IdError::InvalidPrefix { expected: "app", .. }
        ));
    }

    #[test]
    fn test_application_id_missing_separator() {
        let result: Result<ApplicationId, _> = "app01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(result.unwrap_err(), IdError::MissingSeparator));
    }

    #[test]
    fn test_application_id_invalid_ulid() {
        let result: Result<ApplicationId, _> = "app_invalid".parse();
        assert!(matches!(result.unwrap_err(), IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_application_id_json_roundtrip() {
        let id = ApplicationId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ApplicationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_application_id_sortable() {
        let id1 = ApplicationId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = ApplicationId::new();
        assert!(id1 < id2);
    }
}

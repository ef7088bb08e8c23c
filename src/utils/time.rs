//! Serde helpers for the unix-second timestamps carried by response envelopes.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;

/// Deserialize a unix timestamp in whole seconds into an OffsetDateTime.
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = i64::deserialize(deserializer)?;
    OffsetDateTime::from_unix_timestamp(seconds).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime as a unix timestamp in whole seconds.
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_i64(datetime.unix_timestamp())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use time::macros::datetime;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Stamped {
        #[serde(with = "crate::utils::time")]
        created: OffsetDateTime,
    }

    #[test]
    fn unix_seconds_round_trip() {
        let parsed: Stamped = serde_json::from_str(r#"{"created": 1762669782}"#).unwrap();
        assert_eq!(parsed.created, datetime!(2025-11-09 06:29:42 UTC));

        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json, serde_json::json!({"created": 1762669782}));
    }

    #[test]
    fn rejects_non_integer_timestamp() {
        let parsed = serde_json::from_str::<Stamped>(r#"{"created": "yesterday"}"#);
        assert!(parsed.is_err());
    }
}

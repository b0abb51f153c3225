//! Duration parsing and serde codecs shared by retry policy, plugin
//! timeouts, and config file values.
//!
//! Config and CLI surfaces accept both human-readable durations (`"2s"`,
//! `"500ms"`, `"2m"`) and raw milliseconds, so a single value can be typed
//! either by hand in a TOML file or round-tripped from a JSON document.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Parses a duration from a human-readable string (`humantime` grammar,
/// e.g. `"2s"`, `"500ms"`, `"1m30s"`).
pub fn parse(text: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(text)
}

/// Formats a duration the way `humantime` would for display purposes
/// (CLI help text, audit log messages).
pub fn format(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Deserializes a `Duration` from either a string (human-readable) or a
/// `u64` (milliseconds).
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        String(String),
        Millis(u64),
    }

    match Helper::deserialize(deserializer)? {
        Helper::String(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
        Helper::Millis(ms) => Ok(Duration::from_millis(ms)),
    }
}

/// Serializes a `Duration` as milliseconds so it round-trips through
/// [`deserialize`] regardless of which branch a document took on the way in.
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// `serde(with = "relicta_duration::option")` for `Option<Duration>` fields.
pub mod option {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            None,
            String(String),
            Millis(u64),
        }

        match Option::<Helper>::deserialize(deserializer)? {
            None | Some(Helper::None) => Ok(None),
            Some(Helper::String(s)) => humantime::parse_duration(&s)
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
            Some(Helper::Millis(ms)) => Ok(Some(Duration::from_millis(ms))),
        }
    }

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(serialize_with = "serialize", deserialize_with = "deserialize")]
        delay: Duration,
    }

    #[test]
    fn parses_human_readable() {
        assert_eq!(parse("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn deserializes_from_string_or_millis() {
        let from_string: Wrapper = serde_json::from_str(r#"{"delay":"2s"}"#).unwrap();
        let from_millis: Wrapper = serde_json::from_str(r#"{"delay":2000}"#).unwrap();
        assert_eq!(from_string.delay, from_millis.delay);
    }

    #[test]
    fn serializes_as_millis() {
        let w = Wrapper {
            delay: Duration::from_secs(2),
        };
        assert_eq!(serde_json::to_string(&w).unwrap(), r#"{"delay":2000}"#);
    }

    #[test]
    fn rejects_garbage_string() {
        let err = serde_json::from_str::<Wrapper>(r#"{"delay":"not-a-duration"}"#);
        assert!(err.is_err());
    }
}

//! Header helpers: the `Retry-After` hint and the TOML representation of
//! header maps used by identity profiles.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,
}

/// Parse the "Retry-After" header as specified per
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
pub(crate) fn parse_retry_after(value: &HeaderValue) -> Result<Duration, RetryAfterParseError> {
    let value = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)?;

    // RFC 7231: Retry-After = HTTP-date / delay-seconds
    value.trim().parse::<u64>().map(Duration::from_secs).or_else(|_| {
        httpdate::parse_http_date(value.trim())
            .map(|s| {
                s.duration_since(SystemTime::now())
                    // a date in the past means "retry now"
                    .unwrap_or(Duration::ZERO)
            })
            .map_err(|_| RetryAfterParseError::ValueError(value.into()))
    })
}

/// The `Retry-After` hint of a response, if present and well-formed
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?;
    match parse_retry_after(value) {
        Ok(delay) => Some(delay),
        Err(e) => {
            log::debug!("Ignoring Retry-After header: {e}");
            None
        }
    }
}

/// Deserialize a header map from a TOML table of `name = "value"` pairs
pub(crate) fn deserialize_headers<'de, D>(deserializer: D) -> Result<HeaderMap, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let map = BTreeMap::<String, String>::deserialize(deserializer)?;
    let mut header_map = HeaderMap::new();

    for (name, value) in map {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("Invalid header name '{name}': {e}")))?;
        let header_value = HeaderValue::from_str(&value).map_err(|e| {
            serde::de::Error::custom(format!("Invalid header value '{value}': {e}"))
        })?;
        header_map.insert(header_name, header_value);
    }

    Ok(header_map)
}

/// Serialize a header map as a table of `name = "value"` pairs
pub(crate) fn serialize_headers<S>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let map = headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().map_err(|e| {
                <S::Error as serde::ser::Error>::custom(format!(
                    "Header '{name}' is not valid UTF-8: {e}"
                ))
            })?;
            Ok((name.as_str(), value))
        })
        .collect::<Result<BTreeMap<&str, &str>, S::Error>>()?;
    map.serialize(serializer)
}

/// `serde(with = ...)` adapter for a single header value stored as a string
pub(crate) mod header_value {
    use http::HeaderValue;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        value: &HeaderValue,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let value = value.to_str().map_err(|e| {
            <S::Error as serde::ser::Error>::custom(format!("Header value is not valid UTF-8: {e}"))
        })?;
        serializer.serialize_str(value)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HeaderValue, D::Error> {
        let value = String::deserialize(deserializer)?;
        HeaderValue::from_str(&value).map_err(|e| {
            serde::de::Error::custom(format!("Invalid header value '{value}': {e}"))
        })
    }
}

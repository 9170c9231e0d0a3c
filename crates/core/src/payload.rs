//! Opaque payload encoding.
//!
//! Job parameters, invocation data and job results are stored as JSON text.
//! Storage backends never look inside these payloads.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode a value as a payload.
pub fn to_payload<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string(value)
}

/// Decode a payload.
pub fn from_payload<T>(payload: &str) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned,
{
    serde_json::from_str(payload)
}

/// Decode a payload that may be absent.
///
/// An absent payload yields `T::default()`; only a present but malformed
/// payload is an error.
pub fn from_optional_payload<T>(payload: Option<&str>) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned + Default,
{
    match payload {
        Some(p) => from_payload(p),
        None => Ok(T::default()),
    }
}

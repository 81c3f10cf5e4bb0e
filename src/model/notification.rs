//! Object-created notifications consumed from the queue

use log::warn;
use serde::Deserialize;

use crate::errors::{PipelineError, PipelineResult};

/// Identifier used when a notification has no key
pub const UNKNOWN_KEY: &str = "Unknown";

/// An object-store event
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NotificationEvent {
    #[serde(rename = "EventName", default)]
    pub event_name: Option<String>,
    #[serde(rename = "Key", default)]
    pub key: Option<String>,
}

impl NotificationEvent {
    /// Parses a raw queue payload
    pub fn parse(payload: &[u8]) -> PipelineResult<Self> {
        serde_json::from_slice(payload).map_err(|e| PipelineError::MalformedMessage(e.to_string()))
    }

    /// Event name, or `"Unknown"`
    pub fn event_name(&self) -> &str {
        self.event_name.as_deref().unwrap_or(UNKNOWN_KEY)
    }

    /// Document identifier derived from the object key
    pub fn identifier(&self) -> String {
        match &self.key {
            Some(key) => identifier_from_key(key),
            None => {
                warn!("Notification without Key, looking up '{}'", UNKNOWN_KEY);
                UNKNOWN_KEY.to_string()
            }
        }
    }
}

/// Last path segment of `key` without its final extension
///
/// `new/abc.tif` gives `abc`, `a/b.c.tif` gives `b.c`, `abc` stays `abc`.
pub fn identifier_from_key(key: &str) -> String {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    match file_name.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => file_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_last_segment_without_extension() {
        assert_eq!(identifier_from_key("agro-photos/new/abc.tif"), "abc");
        assert_eq!(identifier_from_key("new/photo.v2.tiff"), "photo.v2");
        assert_eq!(identifier_from_key("abc"), "abc");
        assert_eq!(identifier_from_key("dir/"), "");
    }

    #[test]
    fn parses_minio_payload() {
        let event = NotificationEvent::parse(br#"{"EventName":"s3:ObjectCreated:Put","Key":"agro-photos/new/abc.tif","Records":[]}"#).unwrap();
        assert_eq!(event.event_name(), "s3:ObjectCreated:Put");
        assert_eq!(event.identifier(), "abc");
    }

    #[test]
    fn missing_key_uses_sentinel() {
        let event = NotificationEvent::parse(br#"{"EventName":"x"}"#).unwrap();
        assert_eq!(event.identifier(), "Unknown");
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(NotificationEvent::parse(b"not json"), Err(PipelineError::MalformedMessage(_))));
        assert!(matches!(NotificationEvent::parse(b"[1,2]"), Err(PipelineError::MalformedMessage(_))));
    }
}

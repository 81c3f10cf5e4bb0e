//! Completion event published once a document's bands are available

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Tells downstream consumers that a photo's layers are ready
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionEvent {
    #[serde(rename = "photoId")]
    pub photo_id: String,
    #[serde(rename = "contourId")]
    pub contour_id: String,
    #[serde(serialize_with = "serialize_utc")]
    pub date: DateTime<Utc>,
    pub extension: String,
}

impl CompletionEvent {
    /// JSON payload for the results topic
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// ISO-8601 with a `Z` suffix and fractional seconds only when present
fn serialize_utc<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serialises_with_zulu_suffix() {
        let event = CompletionEvent {
            photo_id: "abc".into(),
            contour_id: "c-1".into(),
            date: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            extension: "tif".into(),
        };
        let json: serde_json::Value = serde_json::from_slice(&event.to_payload().unwrap()).unwrap();
        assert_eq!(json["photoId"], "abc");
        assert_eq!(json["contourId"], "c-1");
        assert_eq!(json["date"], "2024-05-01T10:00:00Z");
        assert_eq!(json["extension"], "tif");
    }
}

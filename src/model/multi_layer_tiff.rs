//! Document shape understood by the multi-layer TIFF worker

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::errors::{PipelineError, PipelineResult};
use crate::model::document::ProcessingDocument;

/// One declared layer
///
/// Documents list layers either as bare names or as `{index, name}` objects.
/// Extraction is positional in both cases.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LayerSpec {
    Name(String),
    Indexed {
        #[serde(default, deserialize_with = "lenient_index")]
        index: Option<String>,
        name: String,
    },
}

impl LayerSpec {
    /// Output name of the layer
    pub fn name(&self) -> &str {
        match self {
            LayerSpec::Name(name) => name,
            LayerSpec::Indexed { name, .. } => name,
        }
    }

    /// Declared band index, if the document gave one
    pub fn declared_index(&self) -> Option<&str> {
        match self {
            LayerSpec::Name(_) => None,
            LayerSpec::Indexed { index, .. } => index.as_deref(),
        }
    }
}

/// Worker-level view of a processing document
#[derive(Debug, Clone, PartialEq)]
pub struct MultiLayerTiff {
    pub photo_extension: String,
    pub layers: Vec<LayerSpec>,
    pub contour_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Stored shape; `photoExtension` and the generic `extension` may both appear
#[derive(Deserialize)]
struct StoredFields {
    #[serde(rename = "photoExtension", default, deserialize_with = "lenient_string")]
    photo_extension: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    extension: Option<String>,
    #[serde(default)]
    layers: Vec<LayerSpec>,
    #[serde(rename = "contourId", default, deserialize_with = "lenient_string")]
    contour_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    date: Option<DateTime<Utc>>,
}

impl MultiLayerTiff {
    /// Interprets a document
    ///
    /// # Arguments
    /// * `id` - Identifier, for error reporting
    /// * `document` - The document with its type tag already removed
    pub fn from_document(id: &str, document: &ProcessingDocument) -> PipelineResult<Self> {
        let stored: StoredFields = serde_json::from_value(Value::Object(document.fields().clone()))
            .map_err(|e| PipelineError::InvalidDocument { id: id.to_string(), reason: e.to_string() })?;

        let declared = stored.photo_extension
            .or(stored.extension)
            .ok_or_else(|| PipelineError::InvalidDocument {
                id: id.to_string(),
                reason: "missing field `photoExtension`".to_string(),
            })?;

        let extension = declared.trim_start_matches('.').to_string();
        if extension.is_empty() || extension.contains('/') {
            return Err(PipelineError::InvalidDocument {
                id: id.to_string(),
                reason: format!("unusable photo extension '{}'", declared),
            });
        }

        Ok(MultiLayerTiff {
            photo_extension: extension,
            layers: stored.layers,
            contour_id: stored.contour_id,
            date: stored.date,
        })
    }

    /// Layer names in declaration order
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(LayerSpec::name).collect()
    }
}

/// Accepts a string or a number
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Object(map)) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

fn lenient_index<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer)
}

/// Accepts RFC 3339, naive date-times and dates (taken as UTC), epoch
/// milliseconds, and Mongo extended JSON `{"$date": ...}`
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_date))
}

/// Parses one of the date encodings found in stored documents
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => n.as_i64().and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(map) => map.get("$date").and_then(parse_date),
        _ => None,
    }
}

//! Processing document as stored in the metadata store

use serde_json::{Map, Value};

/// Field carrying the worker type tag
pub const TYPE_FIELD: &str = "type";
/// Type reported when the document carries none
pub const UNKNOWN_TYPE: &str = "unknown";

/// A metadata document: an open JSON object
///
/// Only `_id` and `type` mean anything outside the worker; the rest is
/// interpreted by whichever worker the type selects.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessingDocument {
    fields: Map<String, Value>,
}

impl ProcessingDocument {
    /// Wraps a JSON object
    pub fn new(fields: Map<String, Value>) -> Self {
        ProcessingDocument { fields }
    }

    /// Builds a document from any JSON value; non-objects yield `None`
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(ProcessingDocument { fields }),
            _ => None,
        }
    }

    /// The stored identifier, if any
    pub fn id(&self) -> Option<&str> {
        self.fields.get("_id").and_then(Value::as_str)
    }

    /// Reads a field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field
    pub fn insert(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    /// Removes the type tag and returns it
    ///
    /// A missing or non-string tag reads as `"unknown"`.
    pub fn take_type(&mut self) -> String {
        match self.fields.remove(TYPE_FIELD) {
            Some(Value::String(kind)) => kind,
            _ => UNKNOWN_TYPE.to_string(),
        }
    }

    /// The fields as a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Borrowed view of the fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

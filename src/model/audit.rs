//! Audit trail entries

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one dispatched document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Partial,
    Failure,
}

/// One audit entry, published per dispatched document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub service: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub outputs: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

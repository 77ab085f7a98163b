//! Core client library for the equipment analytics dashboard.
//!
//! Holds the wire types exchanged with the analytics backend, the API client
//! and its credential session, the pure view models used by every front end,
//! and the small UI state machines (auth forms, upload control, history panel,
//! app shell) that the web and command-line clients drive.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

pub mod client;
pub mod credential;
pub mod state;
pub mod view;

pub use client::{ApiClient, DEFAULT_BASE_URL};
pub use credential::{CredentialStore, MemoryStore, Session, CREDENTIAL_KEY};
#[cfg(not(target_arch = "wasm32"))]
pub use credential::FileStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EqvizError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("credential storage error: {0}")]
    Storage(String),
}

impl EqvizError {
    /// Message suitable for showing to the user, without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            EqvizError::Auth(msg)
            | EqvizError::Validation(msg)
            | EqvizError::Network(msg)
            | EqvizError::Storage(msg) => msg,
        }
    }
}

impl From<reqwest::Error> for EqvizError {
    fn from(err: reqwest::Error) -> Self {
        EqvizError::Network(err.to_string())
    }
}

impl From<std::io::Error> for EqvizError {
    fn from(err: std::io::Error) -> Self {
        EqvizError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for EqvizError {
    fn from(err: serde_json::Error) -> Self {
        EqvizError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EqvizError>;

/// Backend handle for one uploaded dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub u64);

impl DatasetId {
    /// File name used when downloading the report of the current dataset.
    pub fn report_file_name(self) -> String {
        format!("report_{}.pdf", self.0)
    }

    /// File name used when downloading a report from the history panel.
    pub fn history_report_file_name(self) -> String {
        format!("Dataset_{}_Report.pdf", self.0)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One preview row: column name to raw cell value.
pub type PreviewRow = Map<String, JsonValue>;

/// Category name to count, in the order the backend reported them.
pub type Distribution = IndexMap<String, u64>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub avg_flowrate: Option<f64>,
    #[serde(default)]
    pub avg_pressure: Option<f64>,
    #[serde(default)]
    pub avg_temperature: Option<f64>,
    #[serde(default)]
    pub type_distribution: Option<Distribution>,
    #[serde(default)]
    pub equipment_distribution: Option<Distribution>,
    #[serde(default)]
    pub preview_columns: Vec<String>,
    #[serde(default)]
    pub data_preview: Option<Vec<PreviewRow>>,
    #[serde(default)]
    pub flowrate_list: Vec<f64>,
    #[serde(default)]
    pub pressure_list: Vec<f64>,
    #[serde(default)]
    pub temperature_list: Vec<f64>,
}

impl Summary {
    /// Category counts, whichever of the two backend field names carries them.
    /// `equipment_distribution` wins when both are present.
    pub fn distribution(&self) -> Option<&Distribution> {
        self.equipment_distribution
            .as_ref()
            .or(self.type_distribution.as_ref())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub summary: Summary,
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: DatasetId,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// RFC 3339, or a naive timestamp taken as UTC. Anything else reads as `None`
/// so one odd row cannot fail the whole history listing.
fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<JsonValue>::deserialize(deserializer)?;
    let Some(JsonValue::String(text)) = raw else {
        return Ok(None);
    };
    if let Ok(at) = DateTime::parse_from_rfc3339(&text) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    Ok(text
        .parse::<NaiveDateTime>()
        .ok()
        .map(|naive| naive.and_utc()))
}

impl HistoryEntry {
    pub fn label(&self) -> String {
        format!("Dataset-report {}", self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub success: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_accepts_equipment_distribution() {
        let summary: Summary = serde_json::from_value(json!({
            "total_count": 4,
            "equipment_distribution": { "Pump": 3, "Valve": 1 }
        }))
        .unwrap();
        let dist = summary.distribution().unwrap();
        assert_eq!(dist.get("Pump"), Some(&3));
        assert_eq!(dist.get("Valve"), Some(&1));
    }

    #[test]
    fn test_summary_with_both_distribution_fields() {
        let summary: Summary = serde_json::from_value(json!({
            "type_distribution": { "Pump": 3, "Valve": 1 },
            "equipment_distribution": { "Pump": 2, "Valve": 2 }
        }))
        .unwrap();
        let dist = summary.distribution().unwrap();
        assert_eq!(dist.get("Pump"), Some(&2));
        assert_eq!(dist.get("Valve"), Some(&2));
    }

    #[test]
    fn test_summary_keeps_backend_category_order() {
        let summary: Summary = serde_json::from_str(
            r#"{"type_distribution": {"Valve": 1, "Pump": 3, "Compressor": 2}}"#,
        )
        .unwrap();
        let keys: Vec<_> = summary.distribution().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["Valve", "Pump", "Compressor"]);
    }

    #[test]
    fn test_summary_missing_fields_default() {
        let summary: Summary = serde_json::from_value(json!({})).unwrap();
        assert_eq!(summary, Summary::default());
        assert!(summary.data_preview.is_none());
    }

    #[test]
    fn test_dataset_report_names() {
        let id = DatasetId(17);
        assert_eq!(id.report_file_name(), "report_17.pdf");
        assert_eq!(id.history_report_file_name(), "Dataset_17_Report.pdf");
    }

    #[test]
    fn test_history_entry_parses_backend_row() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "id": 9,
            "user": 2,
            "file": "datasets/sample.csv",
            "filename": "sample.csv",
            "summary": {},
            "uploaded_at": "2025-01-20T08:15:00.123456Z"
        }))
        .unwrap();
        assert_eq!(entry.id, DatasetId(9));
        assert_eq!(entry.filename.as_deref(), Some("sample.csv"));
        assert!(entry.uploaded_at.is_some());
        assert_eq!(entry.label(), "Dataset-report 9");
    }

    #[test]
    fn test_history_timestamps_parse_leniently() {
        let entries: Vec<HistoryEntry> = serde_json::from_value(json!([
            { "id": 9, "uploaded_at": "2025-01-20T08:15:00.123456" },
            { "id": 10, "uploaded_at": "yesterday" },
            { "id": 11, "uploaded_at": null },
            { "id": 12 }
        ]))
        .unwrap();
        assert_eq!(entries.len(), 4);
        let naive = entries[0].uploaded_at.unwrap();
        assert_eq!(naive.format("%Y-%m-%d %H:%M").to_string(), "2025-01-20 08:15");
        assert!(entries[1..].iter().all(|e| e.uploaded_at.is_none()));
    }

    #[test]
    fn test_error_message_strips_category() {
        let err = EqvizError::Validation("Only CSV files allowed!".into());
        assert_eq!(err.message(), "Only CSV files allowed!");
        assert_eq!(err.to_string(), "validation failed: Only CSV files allowed!");
    }
}

use serde::{Deserialize, Serialize};
use surrealdb::sql::Datetime;

use crate::types::{ChronicleId, CompositionId, FileId};

/// Persisted representation of a chronicle.
///
/// Rows are selected with `record::id(id) AS id`, so `id` carries only the
/// key part of the record id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChronicleRecord {
    pub id: ChronicleId,
    pub title: String,
    pub description: String,
    /// Recognition language used when generating compositions.
    pub language: String,
    pub created_at: Option<Datetime>,
}

/// Persisted representation of an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub chronicle_id: ChronicleId,
    pub mime: String,
    pub name: String,
    /// Location on disk; never exposed over HTTP.
    #[serde(skip_serializing)]
    pub path: String,
    pub url: String,
    pub thumb_name: String,
    #[serde(skip_serializing)]
    pub thumb_path: String,
    pub thumb_url: String,
    pub created_at: Option<Datetime>,
}

/// Payload used when inserting a new file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCreate {
    pub mime: String,
    pub name: String,
    pub path: String,
    pub url: String,
    pub thumb_name: String,
    pub thumb_path: String,
    pub thumb_url: String,
}

/// Lifecycle of a composition row.
///
/// A composition starts `Pending` and moves exactly once to either `Ready`
/// or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionStatus {
    Pending,
    Ready,
    Failed,
}

impl CompositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Persisted representation of a composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub id: CompositionId,
    pub chronicle_id: ChronicleId,
    pub title: String,
    /// Schema version of the document stored in `data`.
    pub version: u32,
    pub status: CompositionStatus,
    /// Encoded composition document, present only when `status` is ready.
    #[serde(default)]
    pub data: Option<String>,
    /// Failure reason, present only when `status` is failed.
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: Option<Datetime>,
    #[serde(default)]
    pub completed_at: Option<Datetime>,
}

impl CompositionRecord {
    pub fn is_ready(&self) -> bool {
        self.status == CompositionStatus::Ready
    }
}

/// Result row of `SELECT count() AS total ... GROUP ALL`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CountRow {
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&CompositionStatus::Ready).unwrap(), "\"ready\"");
        let status: CompositionStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, CompositionStatus::Failed);
        assert_eq!(CompositionStatus::Pending.as_str(), "pending");
    }

    #[test]
    fn test_file_record_hides_paths() {
        let record = FileRecord {
            id: FileId::new("f1"),
            chronicle_id: ChronicleId::new("c1"),
            mime: "audio/mpeg".to_string(),
            name: "a.mp3".to_string(),
            path: "uploads/a.mp3".to_string(),
            url: "/uploads/a.mp3".to_string(),
            thumb_name: "a.jpg".to_string(),
            thumb_path: "uploads/a.jpg".to_string(),
            thumb_url: "/uploads/a.jpg".to_string(),
            created_at: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("path").is_none());
        assert!(json.get("thumb_path").is_none());
        assert_eq!(json["url"], "/uploads/a.mp3");
    }
}

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use storage::FileRow;

pub use providers::ClassificationResult;

/// Persisted outcome of organizing one file, keyed by its destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_path: PathBuf,
    pub original_path: PathBuf,
    pub mime_type: String,
    pub category: String,
    pub label: String,
    pub confidence: f32,
    pub size: u64,
    pub created_date: String,
    pub classified_date: String,
    pub metadata: serde_json::Value,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        Self {
            file_path: PathBuf::from(row.file_path),
            original_path: PathBuf::from(row.original_path.unwrap_or_default()),
            mime_type: row.mime_type.unwrap_or_default(),
            category: row.category.unwrap_or_default(),
            label: row.ai_label.unwrap_or_default(),
            confidence: row.confidence.unwrap_or_default() as f32,
            size: row.size.unwrap_or_default().max(0) as u64,
            created_date: row.created_date.unwrap_or_default(),
            classified_date: row.classified_date.unwrap_or_default(),
            metadata: row
                .metadata
                .and_then(|m| serde_json::from_str(&m).ok())
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Resolved target of a move, before it happens.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationPlan {
    pub directory: PathBuf,
    pub file_name: String,
    /// Folder label actually used as a subfolder, if any.
    pub label: Option<String>,
    /// Whether `directory` existed when the plan was made.
    pub directory_existed: bool,
}

impl DestinationPlan {
    pub fn target(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

pub fn timestamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

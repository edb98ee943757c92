use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row of the `files` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileRow {
    pub id: i64,
    pub file_path: String,
    pub original_path: Option<String>,
    pub mime_type: Option<String>,
    pub category: Option<String>,
    pub ai_label: Option<String>,
    pub confidence: Option<f64>,
    pub size: Option<i64>,
    pub created_date: Option<String>,
    pub classified_date: Option<String>,
    pub metadata: Option<String>,
}

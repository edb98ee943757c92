use crate::models::FileRecord;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;
use storage::FileRow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to open index at {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("index query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("metadata is not serializable: {0}")]
    Metadata(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_files: u64,
    pub categories: BTreeMap<String, u64>,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub record: FileRecord,
    pub score: u32,
}

/// Durable record of organized files, keyed by destination path.
///
/// Every call checks a connection out of the pool and returns it when done, so
/// nothing holds the database across a move's retry sleeps.
#[derive(Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Opens (creating if needed) the store and applies the schema. Safe to call
    /// against an existing store.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        let location = path.to_string_lossy().to_string();
        let open_err = |e: anyhow::Error| IndexError::Open {
            path: location.clone(),
            reason: format!("{e:#}"),
        };
        let pool = storage::connect(&location).await.map_err(open_err)?;
        storage::migrate(&pool).await.map_err(open_err)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, record: &FileRecord) -> Result<(), IndexError> {
        let metadata = serde_json::to_string(&record.metadata)?;
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO files (file_path, original_path, mime_type, category, ai_label,
                               confidence, size, created_date, classified_date, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(file_path) DO UPDATE SET
                original_path=excluded.original_path,
                mime_type=excluded.mime_type,
                category=excluded.category,
                ai_label=excluded.ai_label,
                confidence=excluded.confidence,
                size=excluded.size,
                created_date=excluded.created_date,
                classified_date=excluded.classified_date,
                metadata=excluded.metadata
            "#,
        )
        .bind(record.file_path.to_string_lossy())
        .bind(record.original_path.to_string_lossy())
        .bind(&record.mime_type)
        .bind(&record.category)
        .bind(&record.label)
        .bind(record.confidence as f64)
        .bind(record.size as i64)
        .bind(&record.created_date)
        .bind(&record.classified_date)
        .bind(metadata)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get(&self, file_path: &Path) -> Result<Option<FileRecord>, IndexError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_path = ?1")
            .bind(file_path.to_string_lossy())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(FileRecord::from))
    }

    pub async fn count(&self) -> Result<u64, IndexError> {
        let mut conn = self.pool.acquire().await?;
        let n: i64 = sqlx::query("SELECT COUNT(*) FROM files")
            .fetch_one(&mut *conn)
            .await?
            .get(0);
        Ok(n.max(0) as u64)
    }

    pub async fn stats(&self) -> Result<IndexStats, IndexError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            "SELECT COALESCE(category, ''), COUNT(*), COALESCE(SUM(size), 0) FROM files GROUP BY category",
        )
        .fetch_all(&mut *conn)
        .await?;
        let mut stats = IndexStats::default();
        for row in rows {
            let category: String = row.get(0);
            let count: i64 = row.get(1);
            let size: i64 = row.get(2);
            stats.total_files += count.max(0) as u64;
            stats.total_size_bytes += size.max(0) as u64;
            *stats.categories.entry(category).or_default() += count.max(0) as u64;
        }
        stats.total_size_mb =
            (stats.total_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        Ok(stats)
    }

    /// Case-insensitive token search over label, category and path.
    ///
    /// Each token scores 3 for a label hit, 2 for a category hit and 1 for a
    /// path hit; a label equal to the whole query adds 5. Ties go to the most
    /// recently classified record. An empty query lists the newest records.
    ///
    /// Tokens are literal substrings. SQLite only folds ASCII case, so the SQL
    /// prefilter is used for ASCII queries and the final match is always done
    /// here with Unicode lowercasing.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        let prefilter = !tokens.is_empty() && tokens.iter().all(|t| t.is_ascii());
        let mut sql = String::from("SELECT * FROM files");
        if prefilter {
            let clauses: Vec<String> = (0..tokens.len())
                .map(|i| {
                    let p = i + 1;
                    format!(
                        "(ai_label LIKE ?{p} ESCAPE '\\' OR category LIKE ?{p} ESCAPE '\\' \
                         OR file_path LIKE ?{p} ESCAPE '\\')"
                    )
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" OR "));
        }
        sql.push_str(" ORDER BY classified_date DESC");

        let mut q = sqlx::query_as::<_, FileRow>(&sql);
        if prefilter {
            for token in &tokens {
                q = q.bind(format!("%{}%", escape_like(token)));
            }
        }
        let rows = {
            let mut conn = self.pool.acquire().await?;
            q.fetch_all(&mut *conn).await?
        };

        let whole = tokens.join(" ");
        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .map(FileRecord::from)
            .map(|record| {
                let label = record.label.to_lowercase();
                let category = record.category.to_lowercase();
                let path = record.file_path.to_string_lossy().to_lowercase();
                let mut score = 0;
                for token in &tokens {
                    if label.contains(token.as_str()) {
                        score += 3;
                    }
                    if category.contains(token.as_str()) {
                        score += 2;
                    }
                    if path.contains(token.as_str()) {
                        score += 1;
                    }
                }
                if !whole.is_empty() && label == whole {
                    score += 5;
                }
                SearchHit { record, score }
            })
            .filter(|hit| tokens.is_empty() || hit.score > 0)
            .collect();
        // stable sort keeps the recency order among equal scores
        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Escapes LIKE wildcards so a token matches only itself.
fn escape_like(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

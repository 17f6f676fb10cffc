//! SQLite-backed vector index.
//!
//! Passages and their embeddings live in SQLite; search is brute-force cosine
//! similarity over every stored vector.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use super::store::{check_dimension, LabelCounts, NewPassage, PassageMatch, VectorIndex};
use crate::analysis::{AnalysisError, ComplianceLabel, ReferencePassage};
use crate::vector_math;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    dimension: usize,
    db_path: PathBuf,
}

impl SqliteVectorIndex {
    /// Opens (or creates) the index at `db_path`.
    ///
    /// An existing index built with a different embedding dimension is
    /// rejected with a configuration error.
    pub async fn open(db_path: PathBuf, dimension: usize) -> Result<Self, AnalysisError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AnalysisError::configuration(format!(
                    "failed to create index directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(AnalysisError::index_unavailable)?;

        let index = Self {
            pool,
            dimension,
            db_path,
        };
        index.init_schema().await?;
        index.check_stored_dimension().await?;
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<(), AnalysisError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS reference_passages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                passage_id TEXT NOT NULL UNIQUE,
                text TEXT NOT NULL,
                label TEXT NOT NULL,
                rationale TEXT NOT NULL DEFAULT '',
                source TEXT,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(AnalysisError::index_unavailable)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(AnalysisError::index_unavailable)?;

        Ok(())
    }

    fn decode_row_embedding(&self, row: &SqliteRow) -> Result<Vec<f32>, AnalysisError> {
        let bytes: Vec<u8> = row
            .try_get("embedding")
            .map_err(AnalysisError::index_unavailable)?;
        match vector_math::decode_embedding(&bytes) {
            Some(embedding) if embedding.len() == self.dimension => Ok(embedding),
            _ => {
                let seq: i64 = row.try_get("seq").unwrap_or_default();
                tracing::error!(
                    "Stored embedding for seq {} is {} bytes, expected {}",
                    seq,
                    bytes.len(),
                    self.dimension * 4
                );
                Err(AnalysisError::index_unavailable("corrupt embedding"))
            }
        }
    }

    async fn check_stored_dimension(&self) -> Result<(), AnalysisError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dimension'")
                .fetch_optional(&self.pool)
                .await
                .map_err(AnalysisError::index_unavailable)?;

        match stored {
            Some(value) => {
                let stored_dim: usize = value.parse().map_err(|_| {
                    AnalysisError::configuration(format!("corrupt index dimension '{}'", value))
                })?;
                if stored_dim != self.dimension {
                    return Err(AnalysisError::configuration(format!(
                        "index {} was built with dimension {}, embedder produces {}",
                        self.db_path.display(),
                        stored_dim,
                        self.dimension
                    )));
                }
            }
            None => {
                sqlx::query(
                    "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
                     VALUES ('dimension', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                )
                .bind(self.dimension.to_string())
                .execute(&self.pool)
                .await
                .map_err(AnalysisError::index_unavailable)?;
            }
        }
        Ok(())
    }

    fn row_to_passage(row: &SqliteRow) -> Result<ReferencePassage, AnalysisError> {
        let label: String = row.get("label");
        let seq: i64 = row.get("seq");
        Ok(ReferencePassage {
            id: row.get("passage_id"),
            text: row.get("text"),
            label: label
                .parse()
                .map_err(|_| AnalysisError::index_unavailable(format!("corrupt label '{}'", label)))?,
            rationale: row.get("rationale"),
            source: row.get("source"),
            seq: seq as u64,
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<PassageMatch>, AnalysisError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT seq, passage_id, text, label, rationale, source, embedding
             FROM reference_passages
             ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AnalysisError::index_unavailable)?;

        let embeddings = rows
            .iter()
            .map(|row| self.decode_row_embedding(row))
            .collect::<Result<Vec<_>, _>>()?;

        let ranked = vector_math::rank_descending_by_cosine(vector, &embeddings)?;
        ranked
            .into_iter()
            .take(k)
            .map(|(idx, similarity)| {
                Ok(PassageMatch {
                    passage: Self::row_to_passage(&rows[idx])?,
                    similarity,
                })
            })
            .collect()
    }

    async fn insert(
        &self,
        passage: NewPassage,
        embedding: Vec<f32>,
    ) -> Result<ReferencePassage, AnalysisError> {
        passage.validate()?;
        check_dimension(self.dimension, &embedding)?;

        let id = passage.resolved_id();
        let blob = vector_math::encode_embedding(&embedding);

        let row = sqlx::query(
            "INSERT INTO reference_passages (passage_id, text, label, rationale, source, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(passage_id) DO UPDATE SET
                text = excluded.text,
                label = excluded.label,
                rationale = excluded.rationale,
                source = excluded.source,
                embedding = excluded.embedding
             RETURNING seq, passage_id, text, label, rationale, source",
        )
        .bind(&id)
        .bind(&passage.text)
        .bind(passage.label.as_str())
        .bind(&passage.rationale)
        .bind(&passage.source)
        .bind(&blob)
        .fetch_one(&self.pool)
        .await
        .map_err(AnalysisError::index_unavailable)?;

        Self::row_to_passage(&row)
    }

    async fn count(&self) -> Result<usize, AnalysisError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reference_passages")
            .fetch_one(&self.pool)
            .await
            .map_err(AnalysisError::index_unavailable)?;
        Ok(count as usize)
    }

    async fn label_counts(&self) -> Result<LabelCounts, AnalysisError> {
        let rows = sqlx::query("SELECT label, COUNT(*) AS n FROM reference_passages GROUP BY label")
            .fetch_all(&self.pool)
            .await
            .map_err(AnalysisError::index_unavailable)?;

        let mut counts = LabelCounts::default();
        for row in &rows {
            let label: String = row.get("label");
            let n: i64 = row.get("n");
            if let Ok(label) = label.parse::<ComplianceLabel>() {
                counts.add(label, n as usize);
            }
        }
        Ok(counts)
    }
}

use std::collections::HashSet;

use pgvector::Vector;

use super::Database;
use crate::models::ArchItem;
use crate::models::DistillRow;
use crate::models::EmbeddedRow;
use crate::models::NewArchItem;
use crate::models::ReviewRecord;
use crate::Result;

/// Identity key of an incoming record, matching the uniqueness contract of
/// `arch_items`.
pub type ItemKey = (String, i32, String, String);

impl Database {
    /// Partition incoming records against `arch_items` in one round trip.
    ///
    /// Loads the batch into a temp table and anti-joins on the identity
    /// tuple, so the cost is independent of the incoming size. Returns the
    /// set of keys not yet present in the store.
    pub async fn find_new_keys(&self, records: &[ReviewRecord]) -> Result<HashSet<ItemKey>> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r"
            CREATE TEMP TABLE tmp_incoming (
                repo TEXT,
                pr INTEGER,
                filepath TEXT,
                comment TEXT
            ) ON COMMIT DROP
            ",
        )
        .execute(&mut *tx)
        .await?;

        let repos: Vec<&str> = records.iter().map(|r| r.repo.as_str()).collect();
        let prs: Vec<i32> = records.iter().map(|r| r.pr_number).collect();
        let paths: Vec<&str> = records.iter().map(|r| r.file_path.as_str()).collect();
        let comments: Vec<&str> = records.iter().map(|r| r.comment_body.as_str()).collect();

        sqlx::query(
            r"
            INSERT INTO tmp_incoming (repo, pr, filepath, comment)
            SELECT * FROM UNNEST($1::text[], $2::int[], $3::text[], $4::text[])
            ",
        )
        .bind(&repos)
        .bind(&prs)
        .bind(&paths)
        .bind(&comments)
        .execute(&mut *tx)
        .await?;

        let rows: Vec<(String, i32, String, String)> = sqlx::query_as(
            r"
            SELECT t.repo, t.pr, t.filepath, t.comment
            FROM tmp_incoming t
            LEFT JOIN arch_items a
              ON a.repo = t.repo
             AND a.pr = t.pr
             AND a.filepath = t.filepath
             AND a.comment = t.comment
            WHERE a.id IS NULL
            ",
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(rows.into_iter().collect())
    }

    /// Insert one enriched item. The single statement is its own
    /// transaction, so an interrupted run leaves a consistent store.
    pub async fn insert_arch_item(&self, item: &NewArchItem) -> Result<i32> {
        let concerns = serde_json::to_value(&item.concerns)?;
        let id: (i32,) = sqlx::query_as(
            r"
            INSERT INTO arch_items
            (repo, pr, filepath, comment, diff, concerns, arch_summary, evidence, embedding)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            ",
        )
        .bind(&item.repo)
        .bind(item.pr)
        .bind(&item.filepath)
        .bind(&item.comment)
        .bind(&item.diff)
        .bind(&concerns)
        .bind(&item.arch_summary)
        .bind(&item.evidence)
        .bind(Vector::from(item.embedding.clone()))
        .fetch_one(self.pool())
        .await?;

        Ok(id.0)
    }

    /// Rows whose embedding is missing, for Backfill.
    pub async fn rows_missing_embedding(&self) -> Result<Vec<ArchItem>> {
        let rows = sqlx::query_as::<_, ArchItem>(
            r"
            SELECT id, repo, pr, filepath, comment, diff,
                   concerns, arch_summary, evidence, embedding
            FROM arch_items
            WHERE embedding IS NULL
            ORDER BY id
            ",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Populate an embedding only when none exists. Returns false when the
    /// row already had one (or vanished), so repair never overwrites.
    pub async fn set_embedding_if_null(&self, id: i32, embedding: Vec<f32>) -> Result<bool> {
        let result =
            sqlx::query("UPDATE arch_items SET embedding = $2 WHERE id = $1 AND embedding IS NULL")
                .bind(id)
                .bind(Vector::from(embedding))
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All rows in insertion order, projected for chunked distillation.
    pub async fn load_distill_rows(&self) -> Result<Vec<DistillRow>> {
        let rows = sqlx::query_as::<_, DistillRow>(
            "SELECT concerns, arch_summary, evidence FROM arch_items ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Rows with embeddings, in insertion order, for clustered distillation.
    pub async fn load_embedded_rows(&self) -> Result<Vec<EmbeddedRow>> {
        let rows = sqlx::query_as::<_, EmbeddedRow>(
            r"
            SELECT id, concerns, arch_summary, evidence, embedding
            FROM arch_items
            WHERE embedding IS NOT NULL
            ORDER BY id
            ",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn count_items(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM arch_items")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}

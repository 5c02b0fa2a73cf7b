use std::collections::BTreeMap;

use super::Database;
use crate::config::AppConfig;
use crate::Result;
use crate::ReviewRagError;

/// One divergence between the declared schema and the live table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub column: String,
    pub expected: String,
    pub actual: String,
}

/// Declared column types of `arch_items`, rendered the way Postgres
/// `format_type` reports them. The vector dimension is parameterized on the
/// configured embedding dimension.
pub fn declared_schema(dimension: usize) -> Vec<(&'static str, String)> {
    vec![
        ("repo", "text".to_string()),
        ("pr", "integer".to_string()),
        ("filepath", "text".to_string()),
        ("comment", "text".to_string()),
        ("diff", "text".to_string()),
        ("concerns", "jsonb".to_string()),
        ("arch_summary", "text".to_string()),
        ("evidence", "text".to_string()),
        ("embedding", format!("vector({dimension})")),
    ]
}

impl Database {
    async fn table_exists(&self) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = 'public'
                AND table_name = 'arch_items'
            )
            ",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    /// Live column types via pg_attribute, so the vector dimension is the
    /// real one and not an assumption.
    async fn fetch_live_schema(&self) -> Result<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r"
            SELECT a.attname, format_type(a.atttypid, a.atttypmod)
            FROM pg_attribute a
            JOIN pg_class c ON a.attrelid = c.oid
            JOIN pg_namespace n ON c.relnamespace = n.oid
            WHERE c.relname = 'arch_items'
              AND n.nspname = 'public'
              AND a.attnum > 0
              AND NOT a.attisdropped
            ",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Compare the live table against the declared schema. Returns one entry
    /// per divergent or missing column; empty means the schema is valid.
    pub async fn validate_schema(&self, dimension: usize) -> Result<Vec<SchemaMismatch>> {
        if !self.table_exists().await? {
            return Err(ReviewRagError::Custom(
                "Table arch_items does not exist. Run `reviewrag migrate-schema` first."
                    .to_string(),
            ));
        }

        let actual = self.fetch_live_schema().await?;
        let mut mismatches = Vec::new();

        for (column, expected) in declared_schema(dimension) {
            let live = actual.get(column).cloned();
            match live {
                Some(live_type) if live_type == expected => {}
                Some(live_type) => mismatches.push(SchemaMismatch {
                    column: column.to_string(),
                    expected,
                    actual: live_type,
                }),
                None => mismatches.push(SchemaMismatch {
                    column: column.to_string(),
                    expected,
                    actual: "<missing>".to_string(),
                }),
            }
        }

        Ok(mismatches)
    }

    /// Apply the minimal DDL to converge the live table on the declared
    /// schema. Never drops data implicitly; a vector dimension change nulls
    /// the column content, to be repaired by a subsequent Backfill.
    pub async fn migrate_schema(&self, config: &AppConfig) -> Result<()> {
        let dimension = config.embedding_dimension();

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(self.pool())
            .await?;

        if !self.table_exists().await? {
            tracing::info!("arch_items missing, creating table");
            sqlx::query(sqlx::AssertSqlSafe(format!(
                r"
                CREATE TABLE arch_items (
                    id SERIAL PRIMARY KEY,
                    repo TEXT,
                    pr INTEGER,
                    filepath TEXT,
                    comment TEXT,
                    diff TEXT,
                    concerns JSONB,
                    arch_summary TEXT,
                    evidence TEXT,
                    embedding VECTOR({dimension})
                )
                "
            )))
            .execute(self.pool())
            .await?;

            self.create_indexes(config).await?;
            return Ok(());
        }

        let actual = self.fetch_live_schema().await?;

        for (column, want) in declared_schema(dimension) {
            match actual.get(column) {
                None => {
                    tracing::info!("Adding missing column {} {}", column, want);
                    sqlx::query(sqlx::AssertSqlSafe(format!("ALTER TABLE arch_items ADD COLUMN {column} {want}")))
                        .execute(self.pool())
                        .await?;
                }
                Some(live) if *live != want => {
                    tracing::info!("Fixing column {}: {} -> {}", column, live, want);
                    if want.starts_with("vector") {
                        // Existing vectors of another dimension cannot be
                        // cast; the column is nulled and Backfill restores
                        // the embeddings.
                        sqlx::query(sqlx::AssertSqlSafe(format!(
                            "ALTER TABLE arch_items ALTER COLUMN {column} TYPE {want} USING NULL"
                        )))
                        .execute(self.pool())
                        .await?;
                    } else {
                        sqlx::query(sqlx::AssertSqlSafe(format!(
                            "ALTER TABLE arch_items ALTER COLUMN {column} TYPE {want} USING {column}::{want}"
                        )))
                        .execute(self.pool())
                        .await?;
                    }
                }
                Some(_) => {}
            }
        }

        self.create_indexes(config).await?;
        Ok(())
    }

    async fn create_indexes(&self, config: &AppConfig) -> Result<()> {
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_arch_items_repo_pr ON arch_items(repo, pr)")
            .execute(self.pool())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_arch_items_concerns ON arch_items USING GIN (concerns)",
        )
        .execute(self.pool())
        .await?;

        if config.vector_indexes_enabled() {
            // IVFFlat wants populated data to pick list centroids; failure
            // here is not fatal.
            let lists = config.vector_index_lists();
            sqlx::query(sqlx::AssertSqlSafe(format!(
                "CREATE INDEX IF NOT EXISTS idx_arch_items_embedding ON arch_items \
                 USING ivfflat (embedding vector_cosine_ops) WITH (lists = {lists})"
            )))
            .execute(self.pool())
            .await
            .ok();
        }

        tracing::debug!("Essential indexes ensured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_schema_parameterizes_dimension() {
        let schema = declared_schema(768);
        let embedding = schema.iter().find(|(c, _)| *c == "embedding").unwrap();
        assert_eq!(embedding.1, "vector(768)");

        let schema = declared_schema(384);
        let embedding = schema.iter().find(|(c, _)| *c == "embedding").unwrap();
        assert_eq!(embedding.1, "vector(384)");
    }

    #[test]
    fn test_declared_schema_covers_all_store_columns() {
        let names: Vec<&str> = declared_schema(768).iter().map(|(c, _)| *c).collect();
        assert_eq!(
            names,
            vec![
                "repo",
                "pr",
                "filepath",
                "comment",
                "diff",
                "concerns",
                "arch_summary",
                "evidence",
                "embedding"
            ]
        );
    }
}

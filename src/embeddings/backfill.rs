//! Backfill embeddings for rows that are missing one.

use std::time::Instant;

use tracing::info;
use tracing::warn;

use super::EmbeddingClient;
use crate::database::Database;
use crate::errors::Result;
use crate::errors::ReviewRagError;
use crate::models::ArchItem;

/// Statistics from a backfill run
#[derive(Debug, Default)]
pub struct BackfillStats {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Canonical textual rendering of a row for embedding. Field labels keep
/// the fields distinguishable to the model.
fn render_item(item: &ArchItem) -> String {
    format!(
        "Repo: {repo}\nPR: {pr}\nFile: {filepath}\n\nComment: {comment}\nDiff: {diff}\n\nArchitectural Summary: {summary}\nEvidence: {evidence}",
        repo = item.repo,
        pr = item.pr,
        filepath = item.filepath,
        comment = item.comment,
        diff = item.diff,
        summary = item.arch_summary.as_deref().unwrap_or(""),
        evidence = item.evidence.as_deref().unwrap_or(""),
    )
}

/// Generate embeddings for every row where the embedding is null. Rows that
/// gained an embedding since the scan are left untouched.
pub async fn run_backfill(
    db: &Database,
    embedder: &EmbeddingClient,
    dimension: usize,
) -> Result<BackfillStats> {
    let started = Instant::now();
    info!("Starting embeddings backfill");

    let rows = db.rows_missing_embedding().await?;
    let mut stats = BackfillStats {
        total: rows.len(),
        ..Default::default()
    };
    info!("Found {} rows without embeddings", rows.len());

    for item in &rows {
        let snippet = render_item(item);
        match embedder.generate(&snippet).await {
            Ok(vector) => {
                if vector.len() != dimension {
                    return Err(ReviewRagError::Config(format!(
                        "Embedding model returned dimension {}, schema declares {}",
                        vector.len(),
                        dimension
                    )));
                }
                if db.set_embedding_if_null(item.id, vector).await? {
                    stats.updated += 1;
                } else {
                    stats.skipped += 1;
                }
            }
            Err(e) => {
                warn!("Failed to backfill embedding for item {}: {}", item.id, e);
                stats.failed += 1;
            }
        }
    }

    info!(
        "Backfill complete: {} updated, {} skipped, {} failed",
        stats.updated, stats.skipped, stats.failed
    );

    println!(
        "Backfilled {} of {} rows ({} skipped, {} failed) in {:.1}s",
        stats.updated,
        stats.total,
        stats.skipped,
        stats.failed,
        started.elapsed().as_secs_f64()
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_item_labels_fields() {
        let item = ArchItem {
            id: 1,
            repo: "acme/operator".to_string(),
            pr: 7,
            filepath: "pkg/api/types.go".to_string(),
            comment: "breaks compat".to_string(),
            diff: "@@ -1 +1 @@".to_string(),
            concerns: None,
            arch_summary: Some("Changing this field breaks older clients.".to_string()),
            evidence: None,
            embedding: None,
        };

        let rendered = render_item(&item);
        assert!(rendered.contains("Repo: acme/operator"));
        assert!(rendered.contains("PR: 7"));
        assert!(rendered.contains("Comment: breaks compat"));
        assert!(rendered.contains("Architectural Summary: Changing this field"));
        assert!(rendered.contains("Evidence: "));
    }
}

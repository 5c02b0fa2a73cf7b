//! Store-backed scenarios. These need a live PostgreSQL instance with the
//! pgvector extension and a config.toml pointing at it, so they are ignored
//! by default:
//!
//!   cargo test -- --ignored

use pgvector::Vector;
use reviewrag::config::AppConfig;
use reviewrag::database::Database;
use reviewrag::models::NewArchItem;
use reviewrag::models::ReviewRecord;
use reviewrag::Result;

const TEST_REPO: &str = "reviewrag-test/operator";

async fn setup_test_db() -> Result<Database> {
    let config = AppConfig::load()?;
    let db = Database::from_config(&config).await?;
    db.migrate_schema(&config).await?;

    sqlx::query("DELETE FROM arch_items WHERE repo = $1")
        .bind(TEST_REPO)
        .execute(db.pool())
        .await?;

    Ok(db)
}

fn record(pr: i32, comment: &str) -> ReviewRecord {
    ReviewRecord {
        repo: TEST_REPO.to_string(),
        pr_number: pr,
        file_path: "pkg/api/types.go".to_string(),
        line_start: Some(1),
        line_end: Some(2),
        diff_context: String::new(),
        comment_body: comment.to_string(),
        thread_json: serde_json::Value::Null,
    }
}

fn item(pr: i32, comment: &str, dimension: usize) -> NewArchItem {
    NewArchItem {
        repo: TEST_REPO.to_string(),
        pr,
        filepath: "pkg/api/types.go".to_string(),
        comment: comment.to_string(),
        diff: String::new(),
        concerns: vec!["correctness".to_string()],
        arch_summary: "Changing this field breaks older clients.".to_string(),
        evidence: String::new(),
        embedding: vec![0.1; dimension],
    }
}

#[tokio::test]
#[ignore] // Requires a live database
async fn test_anti_join_detects_only_unseen_records() -> Result<()> {
    let config = AppConfig::load()?;
    let db = setup_test_db().await?;
    let dimension = config.embedding_dimension();

    db.insert_arch_item(&item(1, "breaks backward compat", dimension))
        .await?;

    let records = vec![
        record(1, "breaks backward compat"),
        record(2, "validation is too loose"),
    ];
    let new_keys = db.find_new_keys(&records).await?;

    assert_eq!(new_keys.len(), 1);
    assert!(new_keys.contains(&(
        TEST_REPO.to_string(),
        2,
        "pkg/api/types.go".to_string(),
        "validation is too loose".to_string()
    )));

    // A second pass over the same file finds nothing new.
    db.insert_arch_item(&item(2, "validation is too loose", dimension))
        .await?;
    let second = db.find_new_keys(&records).await?;
    assert!(second.is_empty());

    Ok(())
}

#[tokio::test]
#[ignore] // Requires a live database
async fn test_identity_is_unique_across_inserts() -> Result<()> {
    let config = AppConfig::load()?;
    let db = setup_test_db().await?;
    let dimension = config.embedding_dimension();

    // Two records differing only in comment produce two rows; re-detecting
    // the same batch produces zero new keys.
    db.insert_arch_item(&item(3, "first comment", dimension))
        .await?;
    db.insert_arch_item(&item(3, "second comment", dimension))
        .await?;

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM arch_items WHERE repo = $1 AND pr = 3")
            .bind(TEST_REPO)
            .fetch_one(db.pool())
            .await?;
    assert_eq!(count, 2);

    let records = vec![record(3, "first comment"), record(3, "second comment")];
    assert!(db.find_new_keys(&records).await?.is_empty());

    Ok(())
}

#[tokio::test]
#[ignore] // Requires a live database
async fn test_backfill_update_never_overwrites() -> Result<()> {
    let config = AppConfig::load()?;
    let db = setup_test_db().await?;
    let dimension = config.embedding_dimension();

    // Row with an embedding: the guarded update must refuse.
    let id = db
        .insert_arch_item(&item(4, "already embedded", dimension))
        .await?;
    assert!(!db.set_embedding_if_null(id, vec![0.9; dimension]).await?);

    // Row without an embedding: the guarded update fills it once.
    sqlx::query(
        "INSERT INTO arch_items (repo, pr, filepath, comment, diff, concerns, arch_summary, evidence) \
         VALUES ($1, 5, 'f', 'missing embedding', '', '[]'::jsonb, 'summary', '')",
    )
    .bind(TEST_REPO)
    .execute(db.pool())
    .await?;

    let bare = db.rows_missing_embedding().await?;
    let target = bare
        .iter()
        .find(|r| r.repo == TEST_REPO && r.pr == 5)
        .expect("null-embedding row present");
    assert!(db
        .set_embedding_if_null(target.id, vec![0.5; dimension])
        .await?);
    assert!(!db
        .set_embedding_if_null(target.id, vec![0.7; dimension])
        .await?);

    let stored: Option<Vector> =
        sqlx::query_scalar("SELECT embedding FROM arch_items WHERE id = $1")
            .bind(target.id)
            .fetch_one(db.pool())
            .await?;
    let stored = stored.expect("embedding populated");
    assert_eq!(stored.as_slice()[0], 0.5);

    Ok(())
}

#[tokio::test]
#[ignore] // Requires a live database
async fn test_schema_validation_round_trip() -> Result<()> {
    let config = AppConfig::load()?;
    let db = setup_test_db().await?;

    // Converged schema validates clean.
    assert!(db
        .validate_schema(config.embedding_dimension())
        .await?
        .is_empty());

    // Validating against a different declared dimension flags the
    // embedding column.
    let other = config.embedding_dimension() / 2;
    let mismatches = db.validate_schema(other).await?;
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].column, "embedding");
    assert_eq!(mismatches[0].expected, format!("vector({other})"));

    Ok(())
}

//! Enrich stage: dedup staged records against the store, then classify,
//! summarize, and embed each new one.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::database::Database;
use crate::embeddings::EmbeddingClient;
use crate::llm::json_extract;
use crate::llm::prompts;
use crate::llm::LlmClient;
use crate::models::NewArchItem;
use crate::models::ReviewRecord;
use crate::Result;
use crate::ReviewRagError;

lazy_static! {
    static ref FENCED_CODE: Regex = Regex::new(r"(?s)```.*?```").unwrap();
    static ref QUOTED_LINE: Regex = Regex::new(r"(?m)^>.*$").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Strip fenced code blocks and quoted lines, collapse whitespace.
///
/// Code already lives in the record's diff context; what gets embedded is
/// the natural-language reasoning. Reducing an already-reduced comment is a
/// no-op: stripping can surface a `>` at line start, so the passes repeat
/// until the text is stable.
pub fn reduce_comment(comment: &str) -> String {
    let mut current = comment.trim().to_string();
    loop {
        let next = reduce_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn reduce_once(comment: &str) -> String {
    let no_code = FENCED_CODE.replace_all(comment, "");
    let no_quotes = QUOTED_LINE.replace_all(&no_code, "");
    WHITESPACE.replace_all(&no_quotes, " ").trim().to_string()
}

/// Keep only tags present in the controlled vocabulary, preserving order
/// and dropping repeats.
fn retain_vocabulary(tags: Vec<String>, vocabulary: &[String]) -> Vec<String> {
    let known: HashSet<&str> = vocabulary.iter().map(|s| s.as_str()).collect();
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| known.contains(t.as_str()) && seen.insert(t.clone()))
        .collect()
}

/// Load the record file. A truncated final line is ignored; a corrupt
/// interior line means the file is not an append-only Collect product and
/// is fatal.
pub fn load_records(path: &Path) -> Result<Vec<ReviewRecord>> {
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let mut records = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ReviewRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) if idx + 1 == lines.len() => {
                warn!("Ignoring truncated final line of {}: {}", path.display(), e);
            }
            Err(e) => {
                return Err(ReviewRagError::Config(format!(
                    "Corrupt record file {} at line {}: {e}",
                    path.display(),
                    idx + 1
                )));
            }
        }
    }

    Ok(records)
}

/// Collapse duplicate identities within one file, keeping first occurrence.
fn dedupe_in_file(records: Vec<ReviewRecord>) -> Vec<ReviewRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            let (repo, pr, path, comment) = r.identity();
            seen.insert((repo.to_string(), pr, path.to_string(), comment.to_string()))
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct EnrichStats {
    pub loaded: usize,
    pub new: usize,
    pub inserted: usize,
    pub skipped_llm: usize,
    pub skipped_embedding: usize,
    pub parse_fallbacks: usize,
}

/// Per-run instrumentation log. Timings go to a timestamped file so the
/// console stays clean.
struct StageLog {
    path: PathBuf,
    file: std::fs::File,
}

impl StageLog {
    fn create() -> Result<Self> {
        std::fs::create_dir_all("logs")?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = PathBuf::from(format!("logs/enrich_{stamp}.log"));
        let file = std::fs::File::create(&path)?;
        Ok(Self { path, file })
    }

    fn log(&mut self, msg: &str) {
        let _ = writeln!(self.file, "{msg}");
    }
}

pub async fn run(
    config: &AppConfig,
    db: &Database,
    llm: &LlmClient,
    embedder: &EmbeddingClient,
    input: &Path,
) -> Result<EnrichStats> {
    let started = Instant::now();
    let mut log = StageLog::create()?;
    log.log(&format!(
        "=== Enrich run started at {} ===",
        chrono::Local::now()
    ));
    log.log(&format!("Input file: {}", input.display()));

    let t_load = Instant::now();
    let records = dedupe_in_file(load_records(input)?);
    let mut stats = EnrichStats {
        loaded: records.len(),
        ..Default::default()
    };
    log.log(&format!(
        "Loaded {} records in {:.3}s",
        records.len(),
        t_load.elapsed().as_secs_f64()
    ));

    let t_dedup = Instant::now();
    let new_keys = db.find_new_keys(&records).await?;
    let mut new_records: Vec<ReviewRecord> = records
        .into_iter()
        .filter(|r| {
            let (repo, pr, path, comment) = r.identity();
            new_keys.contains(&(repo.to_string(), pr, path.to_string(), comment.to_string()))
        })
        .collect();
    log.log(&format!(
        "New records detected: {} ({:.3}s)",
        new_records.len(),
        t_dedup.elapsed().as_secs_f64()
    ));

    let limit = config.batch.comments_limit;
    if new_records.len() > limit {
        log.log(&format!("Capping batch to comments_limit={limit}"));
        new_records.truncate(limit);
    }
    stats.new = new_records.len();

    if new_records.is_empty() {
        log.log("No new records. Exiting.");
        println!("Found 0 new records\nNothing new.");
        return Ok(stats);
    }

    println!("Found {} new records.", new_records.len());

    let vocabulary = config.architectural_concerns();
    let dimension = config.embedding_dimension();
    let total = new_records.len();

    for (idx, record) in new_records.iter().enumerate() {
        log.log(&format!("\nProcessing record {}/{}", idx + 1, total));
        let t_rec = Instant::now();

        let reduced = reduce_comment(&record.comment_body);

        // Classification: an upstream failure skips the record; a parse
        // failure only empties the tag set.
        let t_classify = Instant::now();
        let concerns = match llm
            .complete(
                &prompts::classify_concerns(vocabulary, &reduced),
                prompts::CLASSIFY_MAX_TOKENS,
            )
            .await
        {
            Ok(text) => match json_extract::extract_array_of::<String>(&text) {
                Ok(tags) => retain_vocabulary(tags, vocabulary),
                Err(e) => {
                    warn!("Classification output unparseable, using empty set: {}", e);
                    stats.parse_fallbacks += 1;
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(
                    "Skipping record {}#{} ({}): classification failed: {}",
                    record.repo, record.pr_number, record.file_path, e
                );
                log.log(&format!("  classification failed: {e}"));
                stats.skipped_llm += 1;
                continue;
            }
        };
        log.log(&format!(
            "  classify_concerns(): {:.3}s",
            t_classify.elapsed().as_secs_f64()
        ));

        let t_summary = Instant::now();
        let summary = match llm
            .complete(
                &prompts::arch_summary(&record.diff_context, &reduced, &concerns),
                prompts::SUMMARY_MAX_TOKENS,
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "Skipping record {}#{} ({}): summarization failed: {}",
                    record.repo, record.pr_number, record.file_path, e
                );
                log.log(&format!("  summarization failed: {e}"));
                stats.skipped_llm += 1;
                continue;
            }
        };
        log.log(&format!(
            "  generate_summary(): {:.3}s",
            t_summary.elapsed().as_secs_f64()
        ));

        // The summary, not the raw comment, is what gets embedded.
        let t_embed = Instant::now();
        let embedding = match embedder.generate(&summary).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(
                    "Skipping record {}#{} ({}): embedding failed: {}",
                    record.repo, record.pr_number, record.file_path, e
                );
                log.log(&format!("  embedding failed: {e}"));
                stats.skipped_embedding += 1;
                continue;
            }
        };
        if embedding.len() != dimension {
            // A model/schema dimension disagreement poisons every record;
            // abort the run.
            return Err(ReviewRagError::Config(format!(
                "Embedding model returned dimension {}, schema declares {}",
                embedding.len(),
                dimension
            )));
        }
        log.log(&format!(
            "  embed(): {:.3}s",
            t_embed.elapsed().as_secs_f64()
        ));

        let item = NewArchItem {
            repo: record.repo.clone(),
            pr: record.pr_number,
            filepath: record.file_path.clone(),
            comment: record.comment_body.clone(),
            diff: record.diff_context.clone(),
            concerns,
            arch_summary: summary,
            evidence: String::new(),
            embedding,
        };

        let t_insert = Instant::now();
        let id = db.insert_arch_item(&item).await?;
        log.log(&format!(
            "  insert(): {:.3}s (id={id})",
            t_insert.elapsed().as_secs_f64()
        ));

        stats.inserted += 1;
        log.log(&format!(
            "Total per-record time: {:.3}s",
            t_rec.elapsed().as_secs_f64()
        ));
    }

    let elapsed = started.elapsed().as_secs_f64();
    log.log(&format!("\n=== Finished at {} ===", chrono::Local::now()));
    log.log(&format!("Total runtime: {elapsed:.3}s"));

    info!(
        "Enrich complete: {} inserted, {} skipped",
        stats.inserted,
        stats.skipped_llm + stats.skipped_embedding
    );
    println!(
        "Done. Added {} new records ({} skipped: llm {}, embedding {}; {} empty classifications) in {:.1}s",
        stats.inserted,
        stats.skipped_llm + stats.skipped_embedding,
        stats.skipped_llm,
        stats.skipped_embedding,
        stats.parse_fallbacks,
        elapsed
    );
    println!("Instrumentation log created at:\n  {}", log.path.display());

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_strips_fenced_code() {
        let comment = "Please avoid this:\n```go\nfunc bad() {}\n```\nIt breaks compat.";
        assert_eq!(
            reduce_comment(comment),
            "Please avoid this: It breaks compat."
        );
    }

    #[test]
    fn test_reduce_strips_quoted_lines() {
        let comment = "> bot: previous message\nActual reply about the api design";
        assert_eq!(reduce_comment(comment), "Actual reply about the api design");
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let comments = [
            "Please avoid this:\n```go\nfunc bad() {}\n```\nIt breaks compat.",
            "> quoted\n\n\nlots   of\twhitespace",
            "already reduced text",
            // Stripping the fence surfaces a leading ">" here.
            "```a```\n> rest of quote",
            "",
        ];
        for comment in comments {
            let once = reduce_comment(comment);
            assert_eq!(reduce_comment(&once), once);
        }
    }

    #[test]
    fn test_retain_vocabulary_drops_unknown_tags() {
        let vocab = vec!["correctness".to_string(), "upgrade-safety".to_string()];
        let tags = vec![
            "Correctness".to_string(),
            "made-up-concern".to_string(),
            "upgrade-safety".to_string(),
            "correctness".to_string(),
        ];
        assert_eq!(
            retain_vocabulary(tags, &vocab),
            vec!["correctness", "upgrade-safety"]
        );
    }

    #[test]
    fn test_load_records_ignores_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let full = r#"{"repo":"a/b","pr_number":1,"file_path":"f","line_start":null,"line_end":null,"diff_context":"","comment_body":"breaks compat","thread_json":{}}"#;
        std::fs::write(&path, format!("{full}\n{{\"repo\":\"a/b\",\"pr_num")).unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pr_number, 1);
    }

    #[test]
    fn test_load_records_rejects_corrupt_interior_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let full = r#"{"repo":"a/b","pr_number":1,"file_path":"f","line_start":null,"line_end":null,"diff_context":"","comment_body":"breaks compat","thread_json":{}}"#;
        std::fs::write(&path, format!("not json\n{full}\n")).unwrap();

        assert!(load_records(&path).is_err());
    }

    #[test]
    fn test_dedupe_in_file_keeps_first() {
        let record = |comment: &str| ReviewRecord {
            repo: "a/b".to_string(),
            pr_number: 1,
            file_path: "f".to_string(),
            line_start: None,
            line_end: None,
            diff_context: String::new(),
            comment_body: comment.to_string(),
            thread_json: serde_json::Value::Null,
        };

        let deduped = dedupe_in_file(vec![record("x"), record("y"), record("x")]);
        assert_eq!(deduped.len(), 2);
    }
}

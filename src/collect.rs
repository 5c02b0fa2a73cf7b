//! Collect stage: pull review comments from the code host, keyword-filter
//! for architecture relevance, and append them to the record file.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::github::GitHubClient;
use crate::models::ReviewRecord;
use crate::Result;

/// Keywords per search query, respecting the host's query-operator cap.
pub const SEARCH_GROUP_SIZE: usize = 5;

/// How PRs are selected for collection.
#[derive(Debug, Clone, Copy)]
pub enum CollectMode {
    /// One specific PR.
    SinglePr(i32),
    /// Every merged PR of the repository.
    AllMerged,
    /// Merged PRs found via keyword search.
    KeywordSearch,
}

#[derive(Debug, Default)]
pub struct CollectStats {
    pub records_written: usize,
    pub prs_processed: usize,
    pub prs_skipped: usize,
}

/// True when any configured keyword occurs in the comment as a
/// case-insensitive substring. `keywords` must already be lowercased.
/// Filtering is per comment; the PR title/body does not rescue a comment
/// with no keyword of its own.
fn relevant_comment(body: &str, keywords: &[String]) -> bool {
    let lowered = body.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k.as_str()))
}

pub async fn run(
    config: &AppConfig,
    repos: &[String],
    mode: CollectMode,
    token: Option<String>,
    output: &Path,
) -> Result<CollectStats> {
    let started = Instant::now();
    let client = GitHubClient::new(token)?;
    let keywords = config.keyword_vocabulary();

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output)?;
    let mut writer = std::io::BufWriter::new(file);

    let mut stats = CollectStats::default();

    for repo in repos {
        info!("Processing repository: {}", repo);

        let numbers: Vec<i32> = match mode {
            CollectMode::SinglePr(number) => vec![number],
            CollectMode::AllMerged => {
                let merged = client.list_merged_prs(repo).await?;
                info!("Found {} merged PRs in {}", merged.len(), repo);
                merged.into_iter().map(|pr| pr.number).collect()
            }
            CollectMode::KeywordSearch => {
                let numbers = client.search_pr_numbers(repo, &keywords).await?;
                info!(
                    "Found {} PRs across grouped keyword searches in {}",
                    numbers.len(),
                    repo
                );
                numbers
            }
        };

        for number in numbers {
            match collect_pr(&client, repo, number, &keywords, &mut writer).await {
                Ok(written) => {
                    stats.prs_processed += 1;
                    stats.records_written += written;
                }
                Err(e) => {
                    warn!("Skipping PR #{} in {}: {}", number, repo, e);
                    stats.prs_skipped += 1;
                }
            }
        }
    }

    writer.flush()?;

    println!(
        "Collected {} records from {} PRs ({} skipped) in {:.1}s",
        stats.records_written,
        stats.prs_processed,
        stats.prs_skipped,
        started.elapsed().as_secs_f64()
    );

    Ok(stats)
}

/// Collect one PR's review comments; each kept comment becomes one record
/// line, independently parseable.
async fn collect_pr(
    client: &GitHubClient,
    repo: &str,
    number: i32,
    keywords: &[String],
    writer: &mut impl Write,
) -> Result<usize> {
    info!("Collecting PR #{} from {}", number, repo);

    let comments = client.list_review_comments(repo, number).await?;
    let mut written = 0;

    for comment in comments {
        if !relevant_comment(&comment.body, keywords) {
            continue;
        }

        let record = ReviewRecord {
            repo: repo.to_string(),
            pr_number: number,
            file_path: comment.path.unwrap_or_default(),
            line_start: comment.original_line,
            line_end: comment.line,
            diff_context: comment.diff_hunk.unwrap_or_default(),
            comment_body: comment.body,
            thread_json: comment.raw,
        };

        writeln!(writer, "{}", serde_json::to_string(&record)?)?;
        written += 1;
    }

    info!("PR #{}: wrote {} records", number, written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec![
            "refactor".to_string(),
            "backward".to_string(),
            "compat".to_string(),
        ]
    }

    #[test]
    fn test_relevance_is_case_insensitive_substring() {
        assert!(relevant_comment("This breaks Backward Compat", &keywords()));
        assert!(relevant_comment("needs a refactoring pass", &keywords()));
        assert!(!relevant_comment("🎉🎉", &keywords()));
        assert!(!relevant_comment("looks good to me", &keywords()));
    }

    #[test]
    fn test_filter_is_comment_level_only() {
        // A PR titled "refactor the operator" changes nothing: each comment
        // stands on its own text, so a non-matching comment is dropped.
        let bodies = ["this breaks backward compat", "🎉🎉", "compat concern here"];
        let kept: Vec<&str> = bodies
            .iter()
            .copied()
            .filter(|b| relevant_comment(b, &keywords()))
            .collect();
        assert_eq!(kept, vec!["this breaks backward compat", "compat concern here"]);
        assert!(!relevant_comment("nice catch", &keywords()));
    }
}

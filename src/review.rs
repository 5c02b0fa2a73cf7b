//! Review stage: apply the distilled guideline corpus to a new diff.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use crate::github::GitHubClient;
use crate::llm::prompts;
use crate::llm::LlmClient;
use crate::Result;
use crate::ReviewRagError;

lazy_static! {
    static ref PR_URL: Regex = Regex::new(r"github\.com/([^/]+)/([^/]+)/pull/(\d+)").unwrap();
}

/// Extract (owner, repo, number) from a pull-request URL. Returns None for
/// anything that does not look like one, in which case the argument is a
/// file path.
pub fn parse_pr_url(input: &str) -> Option<(String, String, i32)> {
    let captures = PR_URL.captures(input)?;
    let number: i32 = captures.get(3)?.as_str().parse().ok()?;
    Some((
        captures.get(1)?.as_str().to_string(),
        captures.get(2)?.as_str().to_string(),
        number,
    ))
}

/// Resolve the diff: fetch from the host for PR URLs, read from disk
/// otherwise. Both failure modes are fatal to the invocation.
async fn get_diff(target: &str) -> Result<String> {
    if let Some((owner, repo, number)) = parse_pr_url(target) {
        let token = std::env::var("GITHUB_TOKEN").ok();
        if token.is_none() {
            eprintln!("Warning: GITHUB_TOKEN not set. API rate limits may apply.");
        }

        let full_repo = format!("{owner}/{repo}");
        eprintln!("Fetching PR #{number} from {full_repo}...");
        let client = GitHubClient::new(token)?;
        let diff = client.fetch_pr_diff(&full_repo, number).await?;
        eprintln!("Fetched {} characters of diff", diff.len());
        return Ok(diff);
    }

    let path = Path::new(target);
    std::fs::read_to_string(path)
        .map_err(|e| ReviewRagError::Custom(format!("Cannot read diff file {target}: {e}")))
}

pub async fn run(llm: &LlmClient, target: &str, guidelines_path: &Path) -> Result<()> {
    let started = std::time::Instant::now();
    let content = std::fs::read_to_string(guidelines_path).map_err(|e| {
        ReviewRagError::Custom(format!(
            "Cannot read guidelines file {}: {e}",
            guidelines_path.display()
        ))
    })?;
    let guidelines: serde_json::Value = serde_json::from_str(&content)?;
    if !guidelines.is_array() {
        return Err(ReviewRagError::Config(format!(
            "Guidelines file {} is not a JSON array",
            guidelines_path.display()
        )));
    }
    info!(
        "Loaded {} guidelines from {}",
        guidelines.as_array().map(Vec::len).unwrap_or(0),
        guidelines_path.display()
    );

    let diff = get_diff(target).await?;

    let prompt = prompts::review(&serde_json::to_string_pretty(&guidelines)?, &diff);
    let review = llm.complete(&prompt, prompts::REVIEW_MAX_TOKENS).await?;

    println!("{review}");
    // stdout carries the review itself; the summary goes to stderr.
    eprintln!(
        "Reviewed {} diff characters against {} guidelines in {:.1}s",
        diff.len(),
        guidelines.as_array().map(Vec::len).unwrap_or(0),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_url() {
        assert_eq!(
            parse_pr_url("https://github.com/acme/operator/pull/123"),
            Some(("acme".to_string(), "operator".to_string(), 123))
        );
    }

    #[test]
    fn test_parse_url_with_suffix_and_no_scheme() {
        assert_eq!(
            parse_pr_url("github.com/acme/operator/pull/123/files"),
            Some(("acme".to_string(), "operator".to_string(), 123))
        );
    }

    #[test]
    fn test_non_urls_are_file_paths() {
        assert_eq!(parse_pr_url("path/to/changes.diff"), None);
        assert_eq!(parse_pr_url("https://github.com/acme/operator/issues/5"), None);
    }
}

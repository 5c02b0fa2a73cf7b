//! Code-host API client used by Collect and Review.

use serde::Deserialize;
use tracing::debug;

use crate::errors::Result;
use crate::errors::ReviewRagError;

const GITHUB_API: &str = "https://api.github.com";

/// Pull request fields the pipeline consumes; everything else upstream is
/// ignored at the boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: i32,
    #[serde(default)]
    pub merged_at: Option<String>,
}

/// One review comment, with the raw upstream object kept for audit.
#[derive(Debug, Clone)]
pub struct ReviewComment {
    pub body: String,
    pub path: Option<String>,
    pub original_line: Option<i32>,
    pub line: Option<i32>,
    pub diff_hunk: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ReviewCommentFields {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    original_line: Option<i32>,
    #[serde(default)]
    line: Option<i32>,
    #[serde(default)]
    diff_hunk: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: i32,
}

/// Thin client over the GitHub REST API.
pub struct GitHubClient {
    token: Option<String>,
    client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("reviewrag")
            .build()
            .map_err(|e| ReviewRagError::Http(e.to_string()))?;

        Ok(Self { token, client })
    }

    fn request(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(url).header("Accept", accept);
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("token {token}"));
        }
        builder
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        debug!("GET {}", url);
        let response = self
            .request(url, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ReviewRagError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ReviewRagError::GitHub(format!("{status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| ReviewRagError::GitHub(format!("Failed to parse response: {e}")))
    }

    /// Review comments of one PR, paginated. Comments without a body are
    /// dropped at the boundary.
    pub async fn list_review_comments(
        &self,
        repo: &str,
        number: i32,
    ) -> Result<Vec<ReviewComment>> {
        let mut comments = Vec::new();
        let mut page = 1;

        loop {
            let url = format!(
                "{GITHUB_API}/repos/{repo}/pulls/{number}/comments?per_page=100&page={page}"
            );
            let value = self.get_json(&url).await?;
            let items = match value {
                serde_json::Value::Array(items) => items,
                other => {
                    return Err(ReviewRagError::GitHub(format!(
                        "Unexpected comment list shape: {other}"
                    )))
                }
            };
            if items.is_empty() {
                break;
            }

            for raw in items {
                let fields: ReviewCommentFields = serde_json::from_value(raw.clone())
                    .map_err(|e| ReviewRagError::GitHub(format!("Unexpected comment shape: {e}")))?;
                let Some(body) = fields.body else { continue };
                comments.push(ReviewComment {
                    body,
                    path: fields.path,
                    original_line: fields.original_line,
                    line: fields.line,
                    diff_hunk: fields.diff_hunk,
                    raw,
                });
            }
            page += 1;
        }

        Ok(comments)
    }

    /// All merged PRs of a repository, via paginated enumeration of closed
    /// PRs.
    pub async fn list_merged_prs(&self, repo: &str) -> Result<Vec<PullRequest>> {
        let mut merged = Vec::new();
        let mut page = 1;

        loop {
            let url = format!("{GITHUB_API}/repos/{repo}/pulls?state=closed&per_page=100&page={page}");
            let value = self.get_json(&url).await?;
            let items = match value {
                serde_json::Value::Array(items) => items,
                other => {
                    return Err(ReviewRagError::GitHub(format!(
                        "Unexpected pull list shape: {other}"
                    )))
                }
            };
            if items.is_empty() {
                break;
            }

            for item in items {
                let pr: PullRequest = serde_json::from_value(item).map_err(|e| {
                    ReviewRagError::GitHub(format!("Unexpected pull request shape: {e}"))
                })?;
                if pr.merged_at.is_some() {
                    merged.push(pr);
                }
            }
            page += 1;
        }

        Ok(merged)
    }

    /// Search merged PRs matching any keyword, using multiple OR-grouped
    /// queries to stay under the search operator cap. Returns a deduplicated,
    /// sorted PR number set.
    pub async fn search_pr_numbers(&self, repo: &str, keywords: &[String]) -> Result<Vec<i32>> {
        let mut numbers = std::collections::BTreeSet::new();

        for group in keywords.chunks(crate::collect::SEARCH_GROUP_SIZE) {
            let grouped = group
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(" OR ");
            let query = format!("repo:{repo} is:pr is:merged ({grouped})");
            let url = format!("{GITHUB_API}/search/issues");

            debug!("Searching PRs: {}", query);
            let response = self
                .request(&url, "application/vnd.github+json")
                .query(&[("q", query.as_str())])
                .send()
                .await
                .map_err(|e| ReviewRagError::Http(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(ReviewRagError::GitHub(format!("{status}: {body}")));
            }

            let result: SearchResponse = response
                .json()
                .await
                .map_err(|e| ReviewRagError::GitHub(format!("Failed to parse response: {e}")))?;

            for item in result.items {
                numbers.insert(item.number);
            }
        }

        Ok(numbers.into_iter().collect())
    }

    /// Fetch the unified diff of a PR using the diff-content accept header.
    pub async fn fetch_pr_diff(&self, repo: &str, number: i32) -> Result<String> {
        let url = format!("{GITHUB_API}/repos/{repo}/pulls/{number}");
        let response = self
            .request(&url, "application/vnd.github.v3.diff")
            .send()
            .await
            .map_err(|e| ReviewRagError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ReviewRagError::GitHub(format!("{status}: {body}")));
        }

        response
            .text()
            .await
            .map_err(|e| ReviewRagError::Http(e.to_string()))
    }
}

use pgvector::Vector;
use serde::Deserialize;
use serde::Serialize;
use sqlx::FromRow;

/// One collected review comment, staged as a line in the record file.
///
/// Field names match the wire format of the record file; `thread_json`
/// preserves the full upstream comment object for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub repo: String,
    pub pr_number: i32,
    #[serde(default)]
    pub file_path: String,
    pub line_start: Option<i32>,
    pub line_end: Option<i32>,
    #[serde(default)]
    pub diff_context: String,
    pub comment_body: String,
    #[serde(default)]
    pub thread_json: serde_json::Value,
}

impl ReviewRecord {
    /// Identity tuple; duplicates are collapsed on it at ingestion.
    pub fn identity(&self) -> (&str, i32, &str, &str) {
        (
            &self.repo,
            self.pr_number,
            &self.file_path,
            &self.comment_body,
        )
    }
}

/// Enriched store record (`arch_items` row).
#[derive(Debug, Clone, FromRow)]
pub struct ArchItem {
    pub id: i32,
    pub repo: String,
    pub pr: i32,
    pub filepath: String,
    pub comment: String,
    pub diff: String,
    pub concerns: Option<serde_json::Value>,
    pub arch_summary: Option<String>,
    pub evidence: Option<String>,
    pub embedding: Option<Vector>,
}

/// Insert request for a fully enriched record.
#[derive(Debug, Clone)]
pub struct NewArchItem {
    pub repo: String,
    pub pr: i32,
    pub filepath: String,
    pub comment: String,
    pub diff: String,
    pub concerns: Vec<String>,
    pub arch_summary: String,
    pub evidence: String,
    pub embedding: Vec<f32>,
}

/// Projection used by chunked distillation.
#[derive(Debug, Clone, FromRow)]
pub struct DistillRow {
    pub concerns: Option<serde_json::Value>,
    pub arch_summary: Option<String>,
    pub evidence: Option<String>,
}

/// Projection used by clustered distillation; only rows with a non-null
/// embedding are loaded.
#[derive(Debug, Clone, FromRow)]
pub struct EmbeddedRow {
    pub id: i32,
    pub concerns: Option<serde_json::Value>,
    pub arch_summary: Option<String>,
    pub evidence: Option<String>,
    pub embedding: Vector,
}

/// One distilled guideline; the consumable artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guideline {
    pub concern: String,
    pub guideline: String,
    #[serde(default)]
    pub rationale: String,
    /// Free-shaped: the model may emit a string or an array of patterns.
    #[serde(default)]
    pub examples: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<i64>,
}

/// Normalize a stored `concerns` column value to a list of tags.
///
/// The column may hold a JSON array, a JSON string containing an encoded
/// array, or a bare string label.
pub fn concerns_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        None => Vec::new(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                if let Ok(serde_json::Value::Array(items)) =
                    serde_json::from_str::<serde_json::Value>(trimmed)
                {
                    return items
                        .iter()
                        .map(|v| match v {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect();
                }
            }
            vec![trimmed.to_string()]
        }
        Some(other) => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let line = r#"{"repo":"acme/operator","pr_number":42,"file_path":"pkg/api/types.go","line_start":10,"line_end":12,"diff_context":"","comment_body":"this breaks backward compat","thread_json":{"id":1}}"#;
        let record: ReviewRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.repo, "acme/operator");
        assert_eq!(record.pr_number, 42);
        assert_eq!(
            record.identity(),
            (
                "acme/operator",
                42,
                "pkg/api/types.go",
                "this breaks backward compat"
            )
        );
    }

    #[test]
    fn test_concerns_list_shapes() {
        let arr = serde_json::json!(["correctness", "upgrade-safety"]);
        assert_eq!(
            concerns_list(Some(&arr)),
            vec!["correctness", "upgrade-safety"]
        );

        let encoded = serde_json::json!("[\"correctness\"]");
        assert_eq!(concerns_list(Some(&encoded)), vec!["correctness"]);

        let bare = serde_json::json!("correctness");
        assert_eq!(concerns_list(Some(&bare)), vec!["correctness"]);

        assert!(concerns_list(None).is_empty());
    }

    #[test]
    fn test_guideline_optional_cluster_id() {
        let g = Guideline {
            concern: "upgrade-safety".to_string(),
            guideline: "Gate schema changes behind a feature flag".to_string(),
            rationale: String::new(),
            examples: serde_json::Value::Null,
            cluster_id: None,
        };
        let out = serde_json::to_string(&g).unwrap();
        assert!(!out.contains("cluster_id"));

        let tagged: Guideline = serde_json::from_str(
            r#"{"concern":"correctness","guideline":"x","rationale":"y","examples":[],"cluster_id":3}"#,
        )
        .unwrap();
        assert_eq!(tagged.cluster_id, Some(3));
    }
}

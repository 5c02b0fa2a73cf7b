//! Prompt builders for each LLM call the pipeline makes.

/// Token budgets per call type. Distillation chunks are small, so the
/// larger budget is safe.
pub const CLASSIFY_MAX_TOKENS: u32 = 500;
pub const SUMMARY_MAX_TOKENS: u32 = 600;
pub const DISTILL_MAX_TOKENS: u32 = 4000;
pub const REVIEW_MAX_TOKENS: u32 = 3000;

/// Ask which concerns from the controlled vocabulary apply to a comment.
/// The response is expected to be a JSON array of strings; anything outside
/// the vocabulary is discarded by the caller.
pub fn classify_concerns(vocabulary: &[String], comment: &str) -> String {
    let options = vocabulary
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an experienced Kubernetes/OpenShift architect.

Given the following PR review comment, identify which architectural concerns apply.
Possible concerns (pick any that fit):

{options}

Return ONLY a JSON array of strings, e.g.:

["correctness", "upgrade-safety"]

Comment:
{comment}
"#
    )
}

/// Ask for a short architectural summary of why the comment matters.
pub fn arch_summary(diff: &str, comment: &str, concerns: &[String]) -> String {
    format!(
        r#"You are an expert Kubernetes/OpenShift architectural reviewer.

Summarize the architectural significance of this PR review comment, focusing on:
- correctness
- upgrade-safety
- maintainability
- ease-of-use
- performance tradeoffs
- extensibility

Write 4-6 sentences, plain text, no bullet points, no JSON.

---
Diff context:
{diff}

---
Comment:
{comment}

---
Concerns (heuristic labels):
{concerns:?}
"#
    )
}

/// Distill one contiguous chunk of enriched signals into guidelines.
pub fn chunk_distill(context_json: &str) -> String {
    format!(
        r#"You are a senior cloud-native architect.

Using the following PR-derived architectural signals, generate ONLY a JSON array.
No markdown. No explanation. Only valid JSON.

Each element MUST be an object with fields:
  concern
  guideline
  rationale
  examples

HARD LENGTH LIMITS (do not exceed):
- guideline: max 125 words
- rationale: max 240 words
- examples: max 430 words
If needed, shorten aggressively. Do NOT produce long paragraphs.
Output must always be a SMALL JSON array.

Input data:
{context_json}
"#
    )
}

/// Distill one semantic cluster into guidelines bound to its themes.
pub fn cluster_distill(context_json: &str) -> String {
    format!(
        r#"You are a senior Kubernetes / OpenShift architect.

You are given a cluster of PR review comments that are semantically similar.
From these, derive cluster-level architectural guidelines.

Requirements:
- Focus ONLY on themes present in this cluster (do NOT invent unrelated topics).
- Merge duplicate ideas into a single guideline where possible.
- Be concrete and actionable (think of this as an internal architecture handbook).
- Emphasize upgrade-safety, maintainability, ease-of-use, performance tradeoffs,
  correctness, extensibility, and API/validation contracts as applicable.

Output format:
Return ONLY a JSON array. No markdown, no prose, no explanation.
Each element MUST be an object with fields:
  concern    - short label for the primary concern
  guideline  - clear directive phrased as a rule
  rationale  - 2-4 sentences explaining why this matters
  examples   - concrete examples or patterns from the input situations

Here is the input cluster data as JSON:

{context_json}
"#
    )
}

/// Review a diff against the full guideline corpus.
pub fn review(guidelines_json: &str, diff: &str) -> String {
    format!(
        r#"You are an expert Kubernetes/OpenShift architect.

Using the following guidelines:
{guidelines_json}

Review this diff:
{diff}

Return a markdown architectural review.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prompt_lists_vocabulary() {
        let vocab = vec!["upgrade-safety".to_string(), "correctness".to_string()];
        let prompt = classify_concerns(&vocab, "breaks compat");
        assert!(prompt.contains("- upgrade-safety"));
        assert!(prompt.contains("- correctness"));
        assert!(prompt.contains("breaks compat"));
    }

    #[test]
    fn test_review_prompt_embeds_corpus_and_diff() {
        let prompt = review("[{\"concern\":\"x\"}]", "diff --git a/f b/f");
        assert!(prompt.contains("[{\"concern\":\"x\"}]"));
        assert!(prompt.contains("diff --git"));
    }
}

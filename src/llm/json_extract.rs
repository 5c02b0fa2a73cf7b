//! Extraction of JSON arrays from raw model output.
//!
//! Model responses may wrap the payload in Markdown fences or prepend
//! prose. The extractor strips fences, finds the first top-level array by
//! bracket-depth counting (string literals and escapes honored), and parses
//! the slice.

use crate::errors::Result;
use crate::errors::ReviewRagError;

const EXCERPT_LIMIT: usize = 500;

/// Remove code fences and stray backtick markers.
fn clean_output(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn excerpt(text: &str) -> String {
    let mut end = EXCERPT_LIMIT.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Extract and parse the first top-level JSON array in `text`.
pub fn extract_json_array(text: &str) -> Result<serde_json::Value> {
    let cleaned = clean_output(text);

    let start = cleaned.find('[').ok_or_else(|| ReviewRagError::JsonExtraction {
        reason: "no '[' found in output".to_string(),
        excerpt: excerpt(&cleaned),
    })?;

    let bytes = cleaned.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &cleaned[start..=i];
                    return serde_json::from_str(candidate).map_err(|e| {
                        ReviewRagError::JsonExtraction {
                            reason: format!("array slice did not parse: {e}"),
                            excerpt: excerpt(candidate),
                        }
                    });
                }
            }
            _ => {}
        }
    }

    Err(ReviewRagError::JsonExtraction {
        reason: "no matching ']' found".to_string(),
        excerpt: excerpt(&cleaned),
    })
}

/// Extract a JSON array and deserialize its elements.
pub fn extract_array_of<T: serde::de::DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let value = extract_json_array(text)?;
    serde_json::from_value(value.clone()).map_err(|e| ReviewRagError::JsonExtraction {
        reason: format!("array elements did not match expected shape: {e}"),
        excerpt: excerpt(&value.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_array() {
        let value = extract_json_array(r#"["a", "b"]"#).unwrap();
        assert_eq!(value, serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_fenced_array_with_preface() {
        let input = "Here are the concerns:\n```json\n[\"correctness\"]\n```\nHope that helps!";
        let value = extract_json_array(input).unwrap();
        assert_eq!(value, serde_json::json!(["correctness"]));
    }

    #[test]
    fn test_prefix_and_suffix_around_array() {
        let input = "prefix text [1, [2, 3], 4] suffix text";
        let value = extract_json_array(input).unwrap();
        assert_eq!(value, serde_json::json!([1, [2, 3], 4]));
    }

    #[test]
    fn test_brackets_inside_strings_are_ignored() {
        let input = r#"noise ["a ] tricky [ string", "plain"] trailing"#;
        let value = extract_json_array(input).unwrap();
        assert_eq!(value, serde_json::json!(["a ] tricky [ string", "plain"]));
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let input = r#"[ "she said \"]\" loudly" ]"#;
        let value = extract_json_array(input).unwrap();
        assert_eq!(value, serde_json::json!(["she said \"]\" loudly"]));
    }

    #[test]
    fn test_missing_array_is_an_error() {
        let err = extract_json_array("no array here").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("no '['"));
        assert!(message.contains("no array here"));
    }

    #[test]
    fn test_unterminated_array_is_an_error() {
        let err = extract_json_array("[1, 2").unwrap_err();
        assert!(err.to_string().contains("no matching ']'"));
    }

    #[test]
    fn test_malformed_slice_reports_excerpt() {
        let err = extract_json_array("[1, 2,,]").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("did not parse"));
        assert!(message.contains("[1, 2,,]"));
    }

    #[test]
    fn test_typed_extraction() {
        #[derive(serde::Deserialize)]
        struct Entry {
            concern: String,
        }
        let entries: Vec<Entry> =
            extract_array_of("```json\n[{\"concern\": \"correctness\"}]\n```").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].concern, "correctness");
    }
}

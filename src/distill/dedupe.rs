//! Offline dedupe pass over a guideline file: drops exact and
//! high-similarity duplicates, keeping the better-explained entry.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::info;

use crate::models::Guideline;
use crate::Result;

/// Normalized edit similarity in [0, 1] over lowercased text.
fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Indices to remove, descending. First occurrence wins on exact matches;
/// on a similar pair the entry with the longer rationale survives.
fn find_duplicates(guidelines: &[Guideline], threshold: f64) -> Vec<usize> {
    let mut to_remove: BTreeSet<usize> = BTreeSet::new();
    let n = guidelines.len();

    for i in 0..n {
        if to_remove.contains(&i) {
            continue;
        }
        for j in (i + 1)..n {
            if to_remove.contains(&j) {
                continue;
            }

            let g1 = &guidelines[i].guideline;
            let g2 = &guidelines[j].guideline;
            if g1.is_empty() || g2.is_empty() {
                continue;
            }

            if g1 == g2 {
                info!("Found exact duplicate: #{} == #{}", i, j);
                to_remove.insert(j);
                continue;
            }

            let sim = similarity_ratio(g1, g2);
            if sim >= threshold {
                info!("Found similar pair ({:.0}%): #{} ~ #{}", sim * 100.0, i, j);
                if guidelines[j].rationale.len() > guidelines[i].rationale.len() {
                    to_remove.insert(i);
                    break;
                }
                to_remove.insert(j);
            }
        }
    }

    to_remove.into_iter().rev().collect()
}

/// Deduplicate `input` into `output`. Returns (original count, removed
/// count). With `dry_run` set, only reports what would be removed.
pub fn run_dedupe(
    input: &Path,
    output: &Path,
    threshold: f64,
    dry_run: bool,
) -> Result<(usize, usize)> {
    info!("Loading guidelines from {}", input.display());
    let content = std::fs::read_to_string(input)?;
    let mut guidelines: Vec<Guideline> = serde_json::from_str(&content)?;
    let original_count = guidelines.len();
    info!("Loaded {} guidelines", original_count);

    let to_remove = find_duplicates(&guidelines, threshold);

    if dry_run {
        for &idx in to_remove.iter().rev() {
            let g = &guidelines[idx];
            println!(
                "[dry-run] would remove #{idx}: {} - {}",
                g.concern,
                g.guideline.chars().take(80).collect::<String>()
            );
        }
        println!(
            "[dry-run] would reduce: {} -> {} guidelines",
            original_count,
            original_count - to_remove.len()
        );
        return Ok((original_count, to_remove.len()));
    }

    for idx in &to_remove {
        guidelines.remove(*idx);
    }

    super::write_guidelines(output, &guidelines)?;
    println!(
        "Deduplication complete: {} -> {} guidelines ({} removed) -> {}",
        original_count,
        guidelines.len(),
        to_remove.len(),
        output.display()
    );

    Ok((original_count, to_remove.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guideline(text: &str, rationale: &str) -> Guideline {
        Guideline {
            concern: "correctness".to_string(),
            guideline: text.to_string(),
            rationale: rationale.to_string(),
            examples: serde_json::Value::Null,
            cluster_id: None,
        }
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity_ratio("abc", "abc"), 1.0);
        assert_eq!(similarity_ratio("ABC", "abc"), 1.0);
        assert!(similarity_ratio("abc", "xyz") < 0.5);
        assert_eq!(similarity_ratio("", ""), 1.0);
    }

    #[test]
    fn test_exact_duplicates_removed() {
        let gs = vec![
            guideline("Validate CRD fields", "short"),
            guideline("Validate CRD fields", "short"),
            guideline("Document upgrade paths", "short"),
        ];
        assert_eq!(find_duplicates(&gs, 0.85), vec![1]);
    }

    #[test]
    fn test_similar_pair_keeps_longer_rationale() {
        let gs = vec![
            guideline("Always validate CRD fields strictly", "brief"),
            guideline(
                "Always validate CRD fields strictly.",
                "a much longer and more detailed rationale",
            ),
        ];
        // Entry 0 is removed because entry 1 explains more.
        assert_eq!(find_duplicates(&gs, 0.85), vec![0]);
    }

    #[test]
    fn test_distinct_guidelines_survive() {
        let gs = vec![
            guideline("Validate CRD fields", "r"),
            guideline("Prefer additive API changes", "r"),
        ];
        assert!(find_duplicates(&gs, 0.85).is_empty());
    }

    #[test]
    fn test_dry_run_leaves_input_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("guidelines.json");
        let output = dir.path().join("deduped.json");
        let gs = vec![guideline("a rule", "r"), guideline("a rule", "r")];
        std::fs::write(&input, serde_json::to_string(&gs).unwrap()).unwrap();

        let (original, removed) = run_dedupe(&input, &output, 0.85, true).unwrap();
        assert_eq!((original, removed), (2, 1));
        assert!(!output.exists());
    }
}

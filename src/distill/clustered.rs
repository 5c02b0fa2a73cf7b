//! Clustered distillation: group embedded rows semantically, then distill
//! each cluster with a theme-bound prompt.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use tracing::info;
use tracing::warn;

use super::kmeans;
use crate::config::AppConfig;
use crate::database::Database;
use crate::llm::json_extract;
use crate::llm::prompts;
use crate::llm::LlmClient;
use crate::models::concerns_list;
use crate::models::EmbeddedRow;
use crate::models::Guideline;
use crate::Result;

/// Stepwise cluster-count rule.
pub fn choose_cluster_count(n: usize) -> usize {
    if n <= 10 {
        3
    } else if n <= 40 {
        5
    } else if n <= 120 {
        7
    } else {
        (n / 20).clamp(8, 12)
    }
}

/// Tally embedding dimensions and pick the modal one. Equal counts break
/// toward the larger dimension.
pub fn modal_dimension(dims: &[usize]) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &d in dims {
        *counts.entry(d).or_insert(0) += 1;
    }
    let mut best: Option<(usize, usize)> = None;
    for (dim, count) in counts {
        match best {
            Some((_, best_count)) if count < best_count => {}
            _ => best = Some((dim, count)),
        }
    }
    best.map(|(dim, _)| dim)
}

pub async fn run_clustered(
    config: &AppConfig,
    db: &Database,
    llm: &LlmClient,
    output: &Path,
) -> Result<()> {
    let started = Instant::now();
    info!("Loading rows with embeddings from arch_items");
    let rows = db.load_embedded_rows().await?;
    info!("Loaded {} rows", rows.len());

    if rows.is_empty() {
        println!("No rows with embeddings found. Nothing to distill.");
        return Ok(());
    }

    // Dimension reconciliation: tolerate rows from a mid-flight schema
    // migration by keeping only the modal dimension.
    let dims: Vec<usize> = rows.iter().map(|r| r.embedding.as_slice().len()).collect();
    let Some(target_dim) = modal_dimension(&dims) else {
        println!("No rows with embeddings found. Nothing to distill.");
        return Ok(());
    };

    let mut dim_counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &d in &dims {
        *dim_counts.entry(d).or_insert(0) += 1;
    }
    info!("Embedding dimension distribution: {:?}", dim_counts);
    for (dim, count) in &dim_counts {
        if *dim != target_dim {
            info!("skipped {} of dimension {}", count, dim);
        }
    }

    let kept: Vec<&EmbeddedRow> = rows
        .iter()
        .filter(|r| r.embedding.as_slice().len() == target_dim)
        .collect();
    info!(
        "Kept {} items with dim={}, skipped {} mismatched items",
        kept.len(),
        target_dim,
        rows.len() - kept.len()
    );

    if kept.len() < 2 {
        println!("Not enough consistent embedded items to cluster.");
        return Ok(());
    }

    let vectors: Vec<Vec<f32>> = kept.iter().map(|r| r.embedding.to_vec()).collect();
    let k = choose_cluster_count(vectors.len());
    info!("Clustering {} items into {} clusters", vectors.len(), k);

    let assignments = kmeans::cluster(&vectors, k);

    let mut clusters: BTreeMap<usize, Vec<&EmbeddedRow>> = BTreeMap::new();
    for (row, &label) in kept.iter().zip(&assignments) {
        clusters.entry(label).or_default().push(row);
    }
    info!("Formed {} clusters", clusters.len());

    let max_items = config.distill.max_cluster_items.max(1);
    let mut all_guidelines: Vec<Guideline> = Vec::new();
    let mut skipped_clusters = 0;

    // Ascending label order keeps log output reproducible.
    for (label, members) in &clusters {
        info!("Processing cluster {} with {} items", label, members.len());

        let members: &[&EmbeddedRow] = if members.len() > max_items {
            info!("Cluster {} truncated to {} items for prompt", label, max_items);
            &members[..max_items]
        } else {
            members.as_slice()
        };

        let context: Vec<serde_json::Value> = members
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "concerns": concerns_list(r.concerns.as_ref()),
                    "summary": r.arch_summary.as_deref().unwrap_or(""),
                    "evidence": r.evidence.as_deref().unwrap_or(""),
                })
            })
            .collect();

        let prompt = prompts::cluster_distill(&serde_json::to_string_pretty(&context)?);
        let raw = match llm.complete(&prompt, prompts::DISTILL_MAX_TOKENS).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping cluster {}: LLM call failed: {}", label, e);
                skipped_clusters += 1;
                continue;
            }
        };

        match json_extract::extract_array_of::<Guideline>(&raw) {
            Ok(mut guidelines) => {
                for g in &mut guidelines {
                    g.cluster_id = Some(*label as i64);
                }
                info!(
                    "Cluster {}: extracted {} guidelines",
                    label,
                    guidelines.len()
                );
                all_guidelines.extend(guidelines);
            }
            Err(e) => {
                warn!("Skipping cluster {}: {}", label, e);
                skipped_clusters += 1;
            }
        }
    }

    super::write_guidelines(output, &all_guidelines)?;

    info!(
        "Saved {} guidelines to {}",
        all_guidelines.len(),
        output.display()
    );
    println!(
        "Distilled {} guidelines from {} clusters ({} skipped) in {:.1}s -> {}",
        all_guidelines.len(),
        clusters.len(),
        skipped_clusters,
        started.elapsed().as_secs_f64(),
        output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_count_steps() {
        assert_eq!(choose_cluster_count(1), 3);
        assert_eq!(choose_cluster_count(10), 3);
        assert_eq!(choose_cluster_count(11), 5);
        assert_eq!(choose_cluster_count(40), 5);
        assert_eq!(choose_cluster_count(41), 7);
        assert_eq!(choose_cluster_count(120), 7);
        assert_eq!(choose_cluster_count(121), 8);
        assert_eq!(choose_cluster_count(200), 10);
        assert_eq!(choose_cluster_count(500), 12);
    }

    #[test]
    fn test_modal_dimension_majority() {
        let dims = [vec![768; 30], vec![384; 5]].concat();
        assert_eq!(modal_dimension(&dims), Some(768));
    }

    #[test]
    fn test_modal_dimension_uniform_keeps_everything() {
        let dims = vec![768; 12];
        assert_eq!(modal_dimension(&dims), Some(768));
        assert_eq!(dims.iter().filter(|&&d| d == 768).count(), 12);
    }

    #[test]
    fn test_modal_dimension_tie_breaks_to_larger() {
        let dims = [vec![384; 4], vec![768; 4]].concat();
        assert_eq!(modal_dimension(&dims), Some(768));
    }

    #[test]
    fn test_modal_dimension_empty() {
        assert_eq!(modal_dimension(&[]), None);
    }
}

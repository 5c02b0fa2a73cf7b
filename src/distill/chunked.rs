//! Chunked distillation: contiguous fixed-size chunks, one LLM call each.
//!
//! No semantic grouping; cross-chunk duplication is expected and handled by
//! the separate dedupe pass or human curation.

use std::path::Path;
use std::time::Instant;

use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::database::Database;
use crate::llm::json_extract;
use crate::llm::prompts;
use crate::llm::LlmClient;
use crate::models::concerns_list;
use crate::models::Guideline;
use crate::Result;

pub async fn run_chunked(
    config: &AppConfig,
    db: &Database,
    llm: &LlmClient,
    output: &Path,
) -> Result<()> {
    let started = Instant::now();
    info!("Loading rows from arch_items");
    let rows = db.load_distill_rows().await?;
    info!("Loaded {} rows", rows.len());

    let chunk_size = config.distill.chunk_size.max(1);
    let mut all_guidelines: Vec<Guideline> = Vec::new();
    let mut skipped_chunks = 0;

    for (chunk_id, chunk) in rows.chunks(chunk_size).enumerate() {
        info!(
            "Processing chunk {} with {} rows",
            chunk_id + 1,
            chunk.len()
        );

        let context: Vec<serde_json::Value> = chunk
            .iter()
            .map(|r| {
                serde_json::json!({
                    "concerns": concerns_list(r.concerns.as_ref()),
                    "summary": r.arch_summary.as_deref().unwrap_or(""),
                    "evidence": r.evidence.as_deref().unwrap_or(""),
                })
            })
            .collect();

        let prompt = prompts::chunk_distill(&serde_json::to_string_pretty(&context)?);
        let raw = match llm.complete(&prompt, prompts::DISTILL_MAX_TOKENS).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping chunk {}: LLM call failed: {}", chunk_id + 1, e);
                skipped_chunks += 1;
                continue;
            }
        };

        match json_extract::extract_array_of::<Guideline>(&raw) {
            Ok(guidelines) => {
                info!(
                    "Chunk {}: extracted {} guidelines",
                    chunk_id + 1,
                    guidelines.len()
                );
                all_guidelines.extend(guidelines);
            }
            Err(e) => {
                warn!("Skipping chunk {}: {}", chunk_id + 1, e);
                skipped_chunks += 1;
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
        "Distilled {} guidelines from {} rows ({} chunks skipped) in {:.1}s -> {}",
        all_guidelines.len(),
        rows.len(),
        skipped_chunks,
        started.elapsed().as_secs_f64(),
        output.display()
    );

    Ok(())
}

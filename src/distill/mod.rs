//! Distillation: many-to-few synthesis of enriched records into guidelines.

mod chunked;
mod clustered;
mod dedupe;
mod kmeans;

pub use chunked::run_chunked;
pub use clustered::run_clustered;
pub use dedupe::run_dedupe;

use std::path::Path;

use crate::models::Guideline;
use crate::Result;

/// Write the guideline corpus as a single pretty-printed JSON array.
fn write_guidelines(path: &Path, guidelines: &[Guideline]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(guidelines)?)?;
    Ok(())
}

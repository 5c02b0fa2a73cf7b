//! Text-embedding access and embedding repair.

mod backfill;
mod client;

pub use backfill::run_backfill;
pub use backfill::BackfillStats;
pub use client::EmbeddingClient;
pub use client::EmbeddingProvider;

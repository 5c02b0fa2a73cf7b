use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use reviewrag::collect;
use reviewrag::collect::CollectMode;
use reviewrag::config::AppConfig;
use reviewrag::database::Database;
use reviewrag::distill;
use reviewrag::embeddings::run_backfill;
use reviewrag::embeddings::EmbeddingClient;
use reviewrag::enrich;
use reviewrag::llm::LlmClient;
use reviewrag::review;
use reviewrag::Result;
use reviewrag::ReviewRagError;

#[derive(Parser)]
#[command(name = "reviewrag")]
#[command(about = "Distills PR review history into architectural guidelines and reviews new diffs against them")]
#[command(version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect review comments from the code host into the record file
    Collect {
        /// Repository to collect from (can be given multiple times)
        #[arg(long)]
        repo: Vec<String>,
        /// Comma-separated list of repositories
        #[arg(long)]
        repos: Option<String>,
        /// Code-host access token (falls back to GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// Specific PR number (single repository only)
        #[arg(long)]
        pr: Option<i32>,
        /// Collect from every merged PR
        #[arg(long)]
        all_merged: bool,
        /// Collect from merged PRs found via keyword search
        #[arg(long)]
        search_arch_prs: bool,
        /// Record file to append to
        #[arg(long, default_value = "data/pr_records.jsonl")]
        output: PathBuf,
    },
    /// Enrich new records from the record file into the store
    Enrich {
        /// Record file produced by collect
        #[arg(default_value = "data/pr_records.jsonl")]
        input: PathBuf,
    },
    /// Generate embeddings for rows that are missing one
    Backfill,
    /// Distill guidelines with the chunked strategy
    Distill {
        #[arg(short, long, default_value = "data/guidelines.json")]
        output: PathBuf,
        /// Rows per LLM call (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Distill guidelines with the embedding-clustering strategy
    DistillClustered {
        #[arg(short, long, default_value = "data/guidelines_clustered.json")]
        output: PathBuf,
    },
    /// Remove duplicate guidelines from a guideline file
    Dedupe {
        #[arg(long, default_value = "data/guidelines.json")]
        input: PathBuf,
        #[arg(long, default_value = "data/guidelines_deduped.json")]
        output: PathBuf,
        /// Similarity threshold for duplicates (0-1)
        #[arg(long, default_value = "0.85")]
        threshold: f64,
        /// Show what would be removed without modifying files
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare the live store schema against the declared one
    ValidateSchema,
    /// Apply the minimal DDL to converge the store on the declared schema
    MigrateSchema,
    /// Review a diff (PR URL or local file) against the guideline corpus
    Review {
        /// Pull-request URL or path to a diff file
        target: String,
        /// Guideline corpus to apply
        #[arg(long, default_value = "data/guidelines_clustered.json")]
        guidelines: PathBuf,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    reviewrag::logging::init_logging(&level)?;

    match cli.command {
        Commands::Collect {
            repo,
            repos,
            token,
            pr,
            all_merged,
            search_arch_prs,
            output,
        } => {
            let mut all_repos = repo;
            if let Some(list) = repos {
                all_repos.extend(list.split(',').map(|r| r.trim().to_string()));
            }
            if all_repos.is_empty() {
                return Err(ReviewRagError::Config(
                    "Must specify at least one repository via --repo or --repos".to_string(),
                ));
            }

            let mode = match (pr, all_merged, search_arch_prs) {
                (Some(n), false, false) => {
                    if all_repos.len() > 1 {
                        return Err(ReviewRagError::Config(
                            "--pr can only be used with a single repository".to_string(),
                        ));
                    }
                    CollectMode::SinglePr(n)
                }
                (None, true, false) => CollectMode::AllMerged,
                (None, false, true) => CollectMode::KeywordSearch,
                _ => {
                    return Err(ReviewRagError::Config(
                        "Specify exactly one of --pr, --all-merged, --search-arch-prs".to_string(),
                    ))
                }
            };

            let token = token.or_else(|| std::env::var("GITHUB_TOKEN").ok());
            collect::run(&config, &all_repos, mode, token, &output).await?;
        }
        Commands::Enrich { input } => {
            let db = Database::from_config(&config).await?;
            let llm = LlmClient::from_config(&config)?;
            let embedder = EmbeddingClient::from_config(&config)?;
            enrich::run(&config, &db, &llm, &embedder, &input).await?;
        }
        Commands::Backfill => {
            let db = Database::from_config(&config).await?;
            let embedder = EmbeddingClient::from_config(&config)?;
            run_backfill(&db, &embedder, config.embedding_dimension()).await?;
        }
        Commands::Distill { output, chunk_size } => {
            if let Some(size) = chunk_size {
                config.distill.chunk_size = size;
            }
            let db = Database::from_config(&config).await?;
            let llm = LlmClient::from_config(&config)?;
            distill::run_chunked(&config, &db, &llm, &output).await?;
        }
        Commands::DistillClustered { output } => {
            let db = Database::from_config(&config).await?;
            let llm = LlmClient::from_config(&config)?;
            distill::run_clustered(&config, &db, &llm, &output).await?;
        }
        Commands::Dedupe {
            input,
            output,
            threshold,
            dry_run,
        } => {
            distill::run_dedupe(&input, &output, threshold, dry_run)?;
        }
        Commands::ValidateSchema => {
            let db = Database::from_config(&config).await?;
            let mismatches = db.validate_schema(config.embedding_dimension()).await?;
            if mismatches.is_empty() {
                println!("Schema is valid.");
            } else {
                println!("SCHEMA MISMATCHES FOUND:\n");
                println!("{:<16} {:<16} {:<16}", "Column", "Expected", "Actual");
                println!("{:-<16} {:-<16} {:-<16}", "", "", "");
                for m in &mismatches {
                    println!("{:<16} {:<16} {:<16}", m.column, m.expected, m.actual);
                }
                println!("\nRun: reviewrag migrate-schema to fix.");
                return Err(ReviewRagError::SchemaMismatch {
                    count: mismatches.len(),
                });
            }
        }
        Commands::MigrateSchema => {
            let db = Database::from_config(&config).await?;
            db.migrate_schema(&config).await?;
            println!("Migration complete.");
        }
        Commands::Review { target, guidelines } => {
            let llm = LlmClient::from_config(&config)?;
            review::run(&llm, &target, &guidelines).await?;
        }
        Commands::Config => {
            print_config(&config);
        }
    }

    Ok(())
}

fn print_config(config: &AppConfig) {
    println!("ReviewRAG Configuration:");
    println!();

    println!("Database:");
    println!("  URL: {}", mask_database_url(config.database_url()));
    println!("  Max connections: {}", config.max_connections());
    println!("  Connection timeout: {}s", config.connection_timeout());
    println!();

    println!("Logging:");
    println!("  Level: {}", config.logging.level);
    println!();

    println!("Embeddings:");
    println!("  Provider: {}", config.embeddings.provider);
    println!("  Model: {}", config.embedding_model());
    println!("  Endpoint: {}", config.embeddings.endpoint);
    println!("  Dimension: {}", config.embedding_dimension());
    println!();

    println!("LLM:");
    println!("  Project: {}", config.llm.project);
    println!("  Region: {}", config.llm.region);
    println!("  Model: {}", config.llm.model);
    println!();

    println!("Concerns:");
    for concern in config.architectural_concerns() {
        let keywords = config
            .concerns
            .keywords
            .get(concern)
            .map(|ks| ks.join(", "))
            .unwrap_or_default();
        println!("  {concern}: [{keywords}]");
    }
    println!();

    println!("Batch:");
    println!("  Comments limit: {}", config.batch.comments_limit);
    println!();

    println!("Distill:");
    println!("  Chunk size: {}", config.distill.chunk_size);
    println!("  Max cluster items: {}", config.distill.max_cluster_items);
    println!();

    println!("Performance:");
    println!("  Vector indexes: {}", config.vector_indexes_enabled());
    println!("  Vector index lists: {}", config.vector_index_lists());
}

/// Mask database URL for display (hide password)
fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            format!(
                "{}://{}@{}:{}",
                parsed.scheme(),
                parsed.username(),
                host,
                parsed.port().unwrap_or(5432)
            )
        } else {
            "***masked***".to_string()
        }
    } else {
        "***invalid***".to_string()
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewRagError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("GitHub API error: {0}")]
    GitHub(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON extraction failed: {reason}; offending text: {excerpt}")]
    JsonExtraction { reason: String, excerpt: String },

    #[error("Schema mismatch in {count} column(s); run `reviewrag migrate-schema`")]
    SchemaMismatch { count: usize },

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, ReviewRagError>;

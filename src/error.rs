use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database error: {0}")]
    AsyncDatabase(#[from] tokio_rusqlite::Error),

    /// A schema step could not be applied; the database is left at the
    /// previous version and the process must not continue.
    #[error("Migration to schema version {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: tokio_rusqlite::Error,
    },

    #[error("Transaction rolled back: {0}")]
    Transaction(#[source] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("OPML error: {0}")]
    Opml(#[from] opml::Error),

    #[error("[{0}] already exists")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Mastodon API error: {0}")]
    Social(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Errors that concern a single feed, source or candidate and must not
    /// stop a run over the remaining ones.
    pub fn is_local(&self) -> bool {
        !matches!(self, AppError::Migration { .. } | AppError::Config(_))
    }
}

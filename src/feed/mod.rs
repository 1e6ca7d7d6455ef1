pub mod fetcher;
pub mod health;
pub mod ingest;
pub mod opml;

pub use fetcher::FeedFetcher;
pub use health::{Backoff, Health};
pub use ingest::Ingestor;

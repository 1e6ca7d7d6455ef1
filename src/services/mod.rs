pub mod campaign;
pub mod content_fetcher;
pub mod hackernews;
pub mod mastodon;
pub mod rss_cache;
pub mod selector;
pub mod suggestions;

pub use content_fetcher::ContentFetcher;
pub use hackernews::HackerNewsClient;
pub use mastodon::MastodonClient;
pub use rss_cache::RssCache;
pub use selector::Selector;
pub use suggestions::SuggestionPipeline;

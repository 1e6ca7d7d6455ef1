use chrono::{DateTime, Utc};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::fetcher::{FeedFetcher, FetchMode, ParsedFeed};
use crate::feed::opml;
use crate::ident::derive_id;
use crate::models::{Source, SourceKind, Suggestion};

use super::hackernews::{self, HackerNewsClient};
use super::mastodon::MastodonClient;

/// Mines sources for candidate feeds and queues them for moderation.
#[derive(Clone)]
pub struct SuggestionPipeline {
    repo: Repository,
    fetcher: FeedFetcher,
    mastodon: MastodonClient,
    hackernews: HackerNewsClient,
}

impl SuggestionPipeline {
    pub fn new(
        repo: Repository,
        fetcher: FeedFetcher,
        mastodon: MastodonClient,
        hackernews: HackerNewsClient,
    ) -> Self {
        Self {
            repo,
            fetcher,
            mastodon,
            hackernews,
        }
    }

    /// Read a source and suggest every new candidate in it. Returns how many
    /// suggestions were created; candidates that fail are skipped.
    pub async fn fetch_source(&self, source: &Source) -> Result<usize> {
        let candidates = self.source_candidates(source).await?;
        tracing::debug!("[{}] {} candidates", source.id, candidates.len());
        Ok(self.suggest_candidates(&candidates).await)
    }

    /// Suggest the sites linked from a HackerNews thread.
    pub async fn add_hackernews(&self, thread: &str) -> Result<usize> {
        let thread_id = hackernews::thread_id(thread)?;
        let item = self.hackernews.fetch_thread(thread_id).await?;
        let candidates = hackernews::linked_sites(&item);
        tracing::debug!("HN thread {}: {} linked sites", thread_id, candidates.len());
        Ok(self.suggest_candidates(&candidates).await)
    }

    pub async fn source_candidates(&self, source: &Source) -> Result<Vec<String>> {
        match source.kind {
            SourceKind::Feed => {
                let parsed = self.fetcher.fetch_feed(&source.url, FetchMode::Force).await?;
                Ok(entry_candidates(&parsed))
            }
            SourceKind::List => Ok(list_candidates(&self.fetcher.fetch_text(&source.url).await?)),
            SourceKind::Opml => opml::feed_urls(&self.fetcher.fetch_text(&source.url).await?),
        }
    }

    async fn suggest_candidates(&self, candidates: &[String]) -> usize {
        let mut count = 0;
        for url in candidates {
            match self.suggest_candidate(url).await {
                Ok(suggestion) => {
                    tracing::info!("[{}] suggested {}", suggestion.id, suggestion.url);
                    count += 1;
                }
                Err(e) => tracing::debug!("{}: {}", url, e),
            }
        }
        count
    }

    /// Evaluate one candidate URL. The candidate is marked as seen before
    /// anything else, so it is never looked at again even if resolving it
    /// fails.
    pub async fn suggest_candidate(&self, url: &str) -> Result<Suggestion> {
        self.mark_seen(url).await?;
        self.suggest_feed(url).await
    }

    pub async fn mark_seen(&self, url: &str) -> Result<()> {
        let id = derive_id(url);
        if !self.repo.mark_suggestion_seen(&id).await? {
            return Err(AppError::Duplicate(id));
        }
        Ok(())
    }

    /// Suggest the feed of a site or feed URL, as submitted by a visitor.
    pub async fn suggest_feed(&self, url: &str) -> Result<Suggestion> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AppError::Validation(format!(
                "`{url}` is not an http(s) URL"
            )));
        }

        let parsed = self.fetcher.fetch_feed(url, FetchMode::Discover).await?;
        self.ensure_new(&derive_id(&parsed.feed_url)).await?;

        let social = if parsed.homepage.is_empty() {
            None
        } else {
            match self.mastodon.profile(&parsed.homepage).await {
                Ok(social) => social,
                Err(e) => {
                    tracing::debug!("Profile lookup for {} failed: {}", parsed.homepage, e);
                    None
                }
            }
        };

        self.store_suggestion(&parsed, social, Utc::now()).await
    }

    pub async fn store_suggestion(
        &self,
        parsed: &ParsedFeed,
        social: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Suggestion> {
        let suggestion = Suggestion {
            id: derive_id(&parsed.feed_url),
            url: parsed.feed_url.clone(),
            homepage: parsed.homepage.clone(),
            title: parsed.title.clone(),
            social,
            added: now,
        };

        self.ensure_new(&suggestion.id).await?;
        self.repo.insert_suggestion(&suggestion).await?;
        Ok(suggestion)
    }

    /// Fail with a duplicate error if a feed or suggestion has this ID.
    async fn ensure_new(&self, id: &str) -> Result<()> {
        if self.repo.feed_exists(id).await? || self.repo.suggestion_exists(id).await? {
            return Err(AppError::Duplicate(id.to_string()));
        }
        Ok(())
    }
}

/// Permalinks of a feed's entries.
pub fn entry_candidates(parsed: &ParsedFeed) -> Vec<String> {
    parsed
        .entries
        .iter()
        .map(|entry| entry.url.trim())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// Non-blank lines of a plain text link list.
pub fn list_candidates(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

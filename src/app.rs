use std::fmt;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::config::Config;
use crate::db::{Repository, Store};
use crate::error::{AppError, Result};
use crate::feed::{Backoff, FeedFetcher, Health, Ingestor};
use crate::ident::derive_id;
use crate::models::{Feed, Post, SeenList, Source, SourceKind, Stats, Suggestion};
use crate::services::campaign::campaign_url;
use crate::services::mastodon::format_post;
use crate::services::rss_cache::{CacheStatus, ChannelInfo};
use crate::services::{
    ContentFetcher, HackerNewsClient, MastodonClient, RssCache, Selector, SuggestionPipeline,
};

/// Runtime options that may be changed with [`App::set_option`].
pub const OPTION_KEYS: &[&str] = &["mastodon_instance", "mastodon_token"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Feed,
    Source,
}

/// Result of refreshing one feed or reading one source during an update.
#[derive(Debug)]
pub struct Outcome {
    pub target: Target,
    pub id: String,
    pub label: String,
    /// Items stored for a feed, suggestions created for a source.
    pub result: Result<usize>,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = match self.target {
            Target::Feed => "items",
            Target::Source => "new suggestions",
        };
        match &self.result {
            Ok(n) => write!(f, "[{}] {}: {} {}", self.id, self.label, n, noun),
            Err(e) => write!(f, "[{}] {}: error: {}", self.id, self.label, e),
        }
    }
}

/// Whatever an ID turned out to belong to.
#[derive(Debug)]
pub enum Inspection {
    Feed {
        feed: Feed,
        items: i64,
        health: Health,
        next_due: Option<DateTime<Utc>>,
    },
    Source(Source),
    Suggestion(Suggestion),
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inspection::Feed {
                feed,
                items,
                health,
                next_due,
            } => {
                writeln!(f, "Feed       {}", feed.id)?;
                writeln!(f, "Title      {}", feed.title)?;
                writeln!(f, "URL        {}", feed.url)?;
                writeln!(f, "Homepage   {}", feed.homepage)?;
                writeln!(f, "Social     {}", feed.social.as_deref().unwrap_or("-"))?;
                writeln!(f, "Added      {}", feed.added.format("%Y-%m-%d %H:%M"))?;
                match feed.fetched {
                    Some(t) => writeln!(f, "Fetched    {}", t.format("%Y-%m-%d %H:%M"))?,
                    None => writeln!(f, "Fetched    never")?,
                }
                match next_due {
                    Some(t) => writeln!(f, "Next fetch {}", t.format("%Y-%m-%d %H:%M"))?,
                    None => writeln!(f, "Next fetch now")?,
                }
                writeln!(f, "Items      {items}")?;
                write!(f, "Health     {health}")?;
                if !feed.last_error.is_empty() {
                    write!(f, "\nLast error {}", feed.last_error)?;
                }
                Ok(())
            }
            Inspection::Source(source) => {
                writeln!(f, "Source     {}", source.id)?;
                writeln!(f, "Kind       {}", source.kind)?;
                writeln!(f, "URL        {}", source.url)?;
                write!(f, "Added      {}", source.added.format("%Y-%m-%d %H:%M"))
            }
            Inspection::Suggestion(s) => {
                writeln!(f, "Suggestion {}", s.id)?;
                writeln!(f, "Title      {}", s.title)?;
                writeln!(f, "URL        {}", s.url)?;
                writeln!(f, "Homepage   {}", s.homepage)?;
                writeln!(f, "Social     {}", s.social.as_deref().unwrap_or("-"))?;
                write!(f, "Added      {}", s.added.format("%Y-%m-%d %H:%M"))
            }
        }
    }
}

/// Every operation of the service, shared by the command line and the web
/// front end.
pub struct App {
    config: Config,
    repo: Repository,
    ingestor: Ingestor,
    selector: Selector,
    pipeline: SuggestionPipeline,
    mastodon: MastodonClient,
    rss: RssCache,
    backoff: Backoff,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Store::open(&config.db_path).await?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Store) -> Result<Self> {
        let repo = Repository::new(store);
        let fetcher = FeedFetcher::new(&config)?;
        let mastodon = MastodonClient::new(&config)?;

        let ingestor = Ingestor::new(repo.clone(), fetcher.clone(), config.same_domain_only);
        let selector = Selector::new(repo.clone(), config.lookback(), config.quarantine_threshold);
        let pipeline = SuggestionPipeline::new(
            repo.clone(),
            fetcher,
            mastodon.clone(),
            HackerNewsClient::new(&config)?,
        );
        let rss = RssCache::new(
            selector.clone(),
            ContentFetcher::new(&config)?,
            &config.cache_dir,
            ChannelInfo::from(&config),
        );
        let backoff = Backoff::new(config.base_interval());

        Ok(Self {
            config,
            repo,
            ingestor,
            selector,
            pipeline,
            mastodon,
            rss,
            backoff,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // Feeds

    pub async fn add_feed(&self, url: &str) -> Result<Feed> {
        self.ingestor.add_feed(url, None).await
    }

    /// Refresh every feed that is due, then read every source.
    ///
    /// Failures of a single feed or source become its outcome; only errors
    /// that make the whole run pointless are returned.
    pub async fn update(&self) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::new();
        let now = Utc::now();

        for mut feed in self.repo.get_feeds_shuffled().await? {
            if !self.backoff.is_due(feed.fetched, feed.errors, now) {
                tracing::debug!("[{}] not due", feed.id);
                continue;
            }

            match self.ingestor.fetch_feed_items(&mut feed).await {
                Err(e) if !e.is_local() => return Err(e),
                result => outcomes.push(Outcome {
                    target: Target::Feed,
                    id: feed.id,
                    label: feed.title,
                    result,
                }),
            }
        }

        for source in self.repo.get_all_sources().await? {
            match self.pipeline.fetch_source(&source).await {
                Err(e) if !e.is_local() => return Err(e),
                result => outcomes.push(Outcome {
                    target: Target::Source,
                    id: source.id,
                    label: source.url,
                    result,
                }),
            }
        }

        Ok(outcomes)
    }

    pub async fn inspect(&self, id: &str) -> Result<Inspection> {
        if let Some(feed) = self.repo.get_feed(id).await? {
            return Ok(Inspection::Feed {
                items: self.repo.item_count(&feed.id).await?,
                health: feed.health(self.config.quarantine_threshold),
                next_due: self.backoff.next_due(feed.fetched, feed.errors),
                feed,
            });
        }
        if let Some(source) = self.repo.get_source(id).await? {
            return Ok(Inspection::Source(source));
        }
        if let Some(suggestion) = self.repo.get_suggestion(id).await? {
            return Ok(Inspection::Suggestion(suggestion));
        }
        Err(AppError::NotFound(id.to_string()))
    }

    pub async fn delete_feed(&self, id: &str) -> Result<()> {
        if !self.repo.delete_feed(id).await? {
            return Err(AppError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Make an errored feed due again on the next update.
    pub async fn reset_feed(&self, id: &str) -> Result<Feed> {
        let mut feed = self
            .repo
            .get_feed(id)
            .await?
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        feed.reset_errors();
        self.repo.save_feed_health(&feed).await?;
        Ok(feed)
    }

    pub async fn export(&self) -> Result<Vec<Feed>> {
        self.repo.get_all_feeds().await
    }

    pub async fn stats(&self) -> Result<Stats> {
        self.repo.stats(Utc::now() - self.config.lookback()).await
    }

    // Sources and suggestions

    pub async fn sources(&self) -> Result<Vec<Source>> {
        self.repo.get_all_sources().await
    }

    pub async fn add_source(&self, url: &str, kind: SourceKind) -> Result<Source> {
        let url = url.trim();
        let source = Source {
            id: derive_id(url),
            url: url.to_string(),
            kind,
            added: Utc::now(),
        };
        self.repo.insert_source(&source).await?;
        Ok(source)
    }

    pub async fn suggestions(&self) -> Result<Vec<Suggestion>> {
        self.repo.get_all_suggestions().await
    }

    pub async fn suggest(&self, url: &str) -> Result<Suggestion> {
        self.pipeline.suggest_feed(url).await
    }

    /// Subscribe to a suggested feed. The suggestion is removed once the
    /// feed exists.
    pub async fn approve(&self, id: &str) -> Result<Feed> {
        let suggestion = self
            .repo
            .get_suggestion(id)
            .await?
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        self.ingestor
            .add_feed(&suggestion.url, suggestion.social)
            .await
    }

    pub async fn reject(&self, id: &str) -> Result<()> {
        if !self.repo.delete_suggestion(id).await? {
            return Err(AppError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn add_hackernews(&self, thread: &str) -> Result<usize> {
        self.pipeline.add_hackernews(thread).await
    }

    // Social

    /// Look up profiles for feeds that have none. Returns the feeds a handle
    /// was found for.
    pub async fn find_profiles(&self) -> Result<Vec<(Feed, String)>> {
        let feeds = self.repo.get_feeds_without_social().await?;
        tracing::debug!("Looking up profiles of {} feeds", feeds.len());

        let lookups: Vec<_> = stream::iter(feeds)
            .map(|feed| async move {
                match self.mastodon.profile(&feed.homepage).await {
                    Ok(Some(handle)) => Some((feed, handle)),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::debug!("[{}] profile lookup failed: {}", feed.id, e);
                        None
                    }
                }
            })
            .buffer_unordered(5)
            .filter_map(|r| async { r })
            .collect()
            .await;

        for (feed, handle) in &lookups {
            self.repo.set_feed_social(&feed.id, handle).await?;
        }
        Ok(lookups)
    }

    /// Announce a random post on Mastodon; returns the status URL.
    pub async fn post_random(&self) -> Result<String> {
        let instance = self.required_option("mastodon_instance").await?;
        let token = self.required_option("mastodon_token").await?;

        let post = self
            .selector
            .select_one(&[])
            .await?
            .ok_or_else(|| AppError::NotFound("no recent posts".to_string()))?;
        let link = campaign_url(&post.item_url, &self.config.campaign_source, "mastodon");

        self.mastodon
            .post_status(&format_post(&post, &link), &instance, &token)
            .await
    }

    async fn required_option(&self, key: &str) -> Result<String> {
        match self.repo.store().get_opt(key).await? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(AppError::Validation(format!(
                "option `{key}` is not set"
            ))),
        }
    }

    pub async fn set_option(&self, key: &str, value: &str) -> Result<()> {
        if !OPTION_KEYS.contains(&key) {
            return Err(AppError::Validation(format!(
                "unknown option `{key}` (expected one of: {})",
                OPTION_KEYS.join(", ")
            )));
        }
        self.repo.store().set_opt(key, value.trim()).await
    }

    // Random posts

    /// A random post the visitor has not seen yet. Its ID is added to `seen`.
    pub async fn random(&self, seen: &mut SeenList) -> Result<Option<Post>> {
        let post = self.selector.select_one(seen.ids()).await?;
        if let Some(post) = &post {
            seen.push(post.item_id);
        }
        Ok(post)
    }

    pub async fn random_many(&self, n: usize) -> Result<Vec<Post>> {
        self.selector.select_many(&[], n).await
    }

    pub async fn last_seen(&self, seen: &SeenList) -> Result<Vec<Post>> {
        self.repo.get_posts_by_ids(seen.ids()).await
    }

    // Generated RSS

    pub async fn regenerate_rss(&self, force: bool) -> Result<Vec<(u32, u32, CacheStatus)>> {
        self.rss.create_all(force).await
    }

    pub async fn rss(&self, freq: i64, num: i64) -> Result<String> {
        self.rss.get_feed(freq, num).await
    }
}

use chrono::{DateTime, Utc};
use url::Url;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::ident::derive_id;
use crate::models::{Feed, NewItem};

use super::fetcher::{FeedFetcher, FetchMode, ParsedEntry, ParsedFeed};

/// Fetches feeds and stores their items, keeping each feed's health fields
/// up to date.
#[derive(Clone)]
pub struct Ingestor {
    repo: Repository,
    fetcher: FeedFetcher,
    same_domain_only: bool,
}

impl Ingestor {
    pub fn new(repo: Repository, fetcher: FeedFetcher, same_domain_only: bool) -> Self {
        Self {
            repo,
            fetcher,
            same_domain_only,
        }
    }

    /// Subscribe to the feed at `url`, which may also be a page announcing
    /// its feed. The entries already fetched are stored right away.
    pub async fn add_feed(&self, url: &str, social: Option<String>) -> Result<Feed> {
        let parsed = self.fetcher.fetch_feed(url, FetchMode::Discover).await?;
        self.add_parsed(parsed, social, Utc::now()).await
    }

    pub async fn add_parsed(
        &self,
        parsed: ParsedFeed,
        social: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Feed> {
        let mut feed = Feed {
            id: derive_id(&parsed.feed_url),
            url: parsed.feed_url.clone(),
            homepage: parsed.homepage.clone(),
            title: parsed.title.clone(),
            social,
            added: now,
            fetched: None,
            errors: 0,
            last_error: String::new(),
        };

        if self.repo.feed_exists(&feed.id).await? {
            return Err(AppError::Duplicate(feed.id));
        }
        self.repo.insert_feed(&feed).await?;
        self.repo.delete_suggestion(&feed.id).await?;

        // The feed stays subscribed even if its first batch is unusable;
        // the failure is kept in its health fields.
        if let Err(e) = self.ingest(&mut feed, Ok(parsed), now).await {
            tracing::warn!("[{}] first fetch failed: {}", feed.id, e);
        }

        Ok(feed)
    }

    /// Fetch the feed's current entries and store the new ones.
    ///
    /// The feed's health fields are updated and saved whatever happens; an
    /// error is returned only after that.
    pub async fn fetch_feed_items(&self, feed: &mut Feed) -> Result<usize> {
        let parsed = self.fetcher.fetch_feed(&feed.url, FetchMode::Force).await;
        self.ingest(feed, parsed, Utc::now()).await
    }

    pub async fn ingest(
        &self,
        feed: &mut Feed,
        parsed: Result<ParsedFeed>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let result = match parsed {
            Ok(parsed) if parsed.entries.is_empty() => {
                Err(AppError::Fetch("no items found".to_string()))
            }
            Ok(parsed) => {
                let items = prepare_items(feed, &parsed.entries, now, self.same_domain_only);
                let count = items.len();
                match self.repo.store_items(items).await {
                    Ok(inserted) => {
                        tracing::debug!("[{}] {} of {} items are new", feed.id, inserted, count);
                        Ok(count)
                    }
                    Err(e) => Err(AppError::Transaction(e)),
                }
            }
            Err(AppError::Fetch(message)) => Err(AppError::Fetch(message)),
            Err(e) => Err(AppError::Fetch(e.to_string())),
        };

        match &result {
            Ok(_) => feed.record_success(now),
            Err(e) => feed.record_failure(&e.to_string(), now),
        }

        if let Err(e) = self.repo.save_feed_health(feed).await {
            tracing::error!("[{}] could not save feed health: {}", feed.id, e);
            if result.is_ok() {
                return Err(e);
            }
        }

        result
    }
}

/// Turn parsed entries into storable items.
///
/// Entries without a permalink or title are dropped, future or missing dates
/// become `now`, and with `same_domain_only` links to other hosts are dropped.
pub fn prepare_items(
    feed: &Feed,
    entries: &[ParsedEntry],
    now: DateTime<Utc>,
    same_domain_only: bool,
) -> Vec<NewItem> {
    let feed_hosts: Vec<String> = [feed.url.as_str(), feed.homepage.as_str()]
        .into_iter()
        .filter_map(host_of)
        .collect();

    entries
        .iter()
        .filter(|entry| !entry.url.trim().is_empty() && !entry.title.trim().is_empty())
        .filter(|entry| {
            !same_domain_only
                || host_of(&entry.url).is_some_and(|host| feed_hosts.contains(&host))
        })
        .map(|entry| NewItem {
            feed_id: feed.id.clone(),
            url: entry.url.trim().to_string(),
            title: entry.title.trim().to_string(),
            published: entry.published.map_or(now, |published| published.min(now)),
        })
        .collect()
}

/// Lowercased host without a leading `www.`.
fn host_of(url: &str) -> Option<String> {
    let url = Url::parse(url.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::repository::tests::{feed, repository};
    use crate::feed::fetcher::parse_document;
    use crate::feed::fetcher::tests::RSS;

    async fn ingestor() -> Ingestor {
        let fetcher = FeedFetcher::new(&Config::default()).unwrap();
        Ingestor::new(repository().await, fetcher, true)
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn entry(url: &str, title: &str) -> ParsedEntry {
        ParsedEntry {
            url: url.to_string(),
            title: title.to_string(),
            published: None,
        }
    }

    #[test]
    fn incomplete_and_foreign_entries_are_dropped() {
        let feed = feed("https://www.a.example/feed.xml");
        let entries = vec![
            entry("https://a.example/ok", "Ok"),
            entry("", "No link"),
            entry("https://a.example/untitled", "  "),
            entry("https://elsewhere.example/post", "Link post"),
        ];

        let items = prepare_items(&feed, &entries, fixed_now(), true);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://a.example/ok");
        assert_eq!(items[0].published, fixed_now());

        let items = prepare_items(&feed, &entries, fixed_now(), false);
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn future_dates_are_clamped_to_now() {
        let ingestor = ingestor().await;
        let parsed = parse_document(RSS.as_bytes(), "https://a.example/feed.xml").unwrap();
        let now = fixed_now();

        let feed = ingestor.add_parsed(parsed, None, now).await.unwrap();
        assert_eq!(feed.errors, 0);
        assert_eq!(feed.fetched, Some(now));

        let posts = ingestor.repo.get_posts_by_ids(&[1, 2, 3]).await.unwrap();
        assert_eq!(posts.len(), 3);
        let future = posts
            .iter()
            .find(|p| p.item_url == "https://a.example/future")
            .unwrap();
        assert_eq!(future.published, now);
        let first = posts
            .iter()
            .find(|p| p.item_url == "https://a.example/first")
            .unwrap();
        assert!(first.published < now);
    }

    #[tokio::test]
    async fn refetching_is_idempotent() {
        let ingestor = ingestor().await;
        let parsed = parse_document(RSS.as_bytes(), "https://a.example/feed.xml").unwrap();
        let mut feed = ingestor
            .add_parsed(parsed.clone(), None, fixed_now())
            .await
            .unwrap();

        let count = ingestor.ingest(&mut feed, Ok(parsed), fixed_now()).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(ingestor.repo.item_count(&feed.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failure_is_recorded_before_it_is_returned() {
        let ingestor = ingestor().await;
        let parsed = parse_document(RSS.as_bytes(), "https://a.example/feed.xml").unwrap();
        let mut feed = ingestor.add_parsed(parsed, None, fixed_now()).await.unwrap();

        let err = ingestor
            .ingest(&mut feed, Err(AppError::Fetch("HTTP 503".into())), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));

        let stored = ingestor.repo.get_feed(&feed.id).await.unwrap().unwrap();
        assert_eq!(stored.errors, 1);
        assert!(stored.last_error.contains("HTTP 503"));
        // Items from the earlier fetch are untouched.
        assert_eq!(ingestor.repo.item_count(&feed.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_feed_is_a_fetch_error() {
        let ingestor = ingestor().await;
        let parsed = parse_document(RSS.as_bytes(), "https://a.example/feed.xml").unwrap();
        let mut feed = ingestor.add_parsed(parsed.clone(), None, fixed_now()).await.unwrap();

        let empty = ParsedFeed {
            entries: Vec::new(),
            ..parsed
        };
        let err = ingestor.ingest(&mut feed, Ok(empty), fixed_now()).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
        assert_eq!(feed.errors, 1);
    }

    #[tokio::test]
    async fn adding_twice_is_a_duplicate() {
        let ingestor = ingestor().await;
        let parsed = parse_document(RSS.as_bytes(), "https://a.example/feed.xml").unwrap();
        ingestor.add_parsed(parsed.clone(), None, fixed_now()).await.unwrap();

        let same_feed_over_http = ParsedFeed {
            feed_url: "http://A.example/feed.xml".to_string(),
            ..parsed
        };
        let err = ingestor
            .add_parsed(same_feed_over_http, None, fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
    }
}

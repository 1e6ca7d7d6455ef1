use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use rss::{ChannelBuilder, GuidBuilder, ItemBuilder, SourceBuilder};

use crate::config::Config;
use crate::error::Result;
use crate::models::Post;

use super::campaign::campaign_url;
use super::content_fetcher::ContentFetcher;
use super::selector::Selector;

/// Regeneration period in days, and the item counts offered for it.
pub const CADENCES: &[(u32, &[u32])] = &[(1, &[1, 3, 5, 10, 20, 25]), (7, &[5, 10, 15, 25])];

/// Extra posts drawn so a few unreadable articles don't shrink the feed.
const SPARE_POSTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Created(PathBuf),
    /// The cached file is still valid for this long.
    Fresh(Duration),
}

/// Channel-level metadata of the generated feeds.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub title: String,
    pub link: String,
    pub campaign_source: String,
}

impl From<&Config> for ChannelInfo {
    fn from(config: &Config) -> Self {
        Self {
            title: config.site_title.clone(),
            link: config.site_url.clone(),
            campaign_source: config.campaign_source.clone(),
        }
    }
}

/// Map a requested `(freq, num)` onto an offered cadence.
pub fn normalize(freq: i64, num: i64) -> (u32, u32) {
    let (freq, counts) = CADENCES
        .iter()
        .find(|(days, _)| i64::from(*days) == freq.max(1))
        .unwrap_or(&CADENCES[0]);

    let mut num = num.max(1);
    while num >= 1 {
        if counts.iter().any(|&c| i64::from(c) == num) {
            return (*freq, num as u32);
        }
        num -= 1;
    }
    (*freq, counts.iter().copied().min().unwrap_or(1))
}

pub fn cache_path(cache_dir: &Path, freq: u32, num: u32) -> PathBuf {
    cache_dir.join(format!("{freq}.{num}.xml"))
}

/// File cache of generated "random posts" RSS feeds.
#[derive(Clone)]
pub struct RssCache {
    selector: Selector,
    content: ContentFetcher,
    cache_dir: PathBuf,
    channel: ChannelInfo,
}

impl RssCache {
    pub fn new(
        selector: Selector,
        content: ContentFetcher,
        cache_dir: impl Into<PathBuf>,
        channel: ChannelInfo,
    ) -> Self {
        Self {
            selector,
            content,
            cache_dir: cache_dir.into(),
            channel,
        }
    }

    /// Regenerate the feed for a cadence unless its file is still fresh.
    pub async fn create_feed(&self, freq: u32, num: u32, force: bool) -> Result<CacheStatus> {
        let path = cache_path(&self.cache_dir, freq, num);
        let validity = Duration::from_secs(u64::from(freq) * 24 * 60 * 60);

        if !force {
            if let Some(age) = file_age(&path).await {
                if age < validity {
                    return Ok(CacheStatus::Fresh(validity - age));
                }
            }
        }

        let wanted = num as usize;
        let posts = self.selector.select_many(&[], wanted + SPARE_POSTS).await?;

        let mut entries = Vec::with_capacity(wanted);
        for post in posts {
            if entries.len() == wanted {
                break;
            }
            match self.content.fetch_summary(&post.item_url).await {
                Ok(summary) => entries.push((post, summary)),
                Err(e) => tracing::debug!("Skipping {}: {}", post.item_url, e),
            }
        }

        let xml = build_channel(&self.channel, &entries, Utc::now());
        write_atomic(&path, &xml).await?;
        tracing::info!("Wrote {} items to {}", entries.len(), path.display());

        Ok(CacheStatus::Created(path))
    }

    /// Contents of the feed closest to the requested cadence, generated on
    /// first request.
    pub async fn get_feed(&self, freq: i64, num: i64) -> Result<String> {
        let (freq, num) = normalize(freq, num);
        let path = cache_path(&self.cache_dir, freq, num);

        if tokio::fs::metadata(&path).await.is_err() {
            self.create_feed(freq, num, false).await?;
        }

        Ok(tokio::fs::read_to_string(&path).await?)
    }

    /// Refresh every cadence; returns what happened to each file.
    pub async fn create_all(&self, force: bool) -> Result<Vec<(u32, u32, CacheStatus)>> {
        let mut statuses = Vec::new();
        for (freq, counts) in CADENCES {
            for &num in *counts {
                let status = self.create_feed(*freq, num, force).await?;
                statuses.push((*freq, num, status));
            }
        }
        Ok(statuses)
    }
}

async fn file_age(path: &Path) -> Option<Duration> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default(),
    )
}

async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("xml.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Render posts and their summaries as an RSS 2.0 document. Items are dated
/// one second apart, newest first, so readers keep the drawn order.
pub fn build_channel(
    info: &ChannelInfo,
    entries: &[(Post, String)],
    now: DateTime<Utc>,
) -> String {
    let mut channel = ChannelBuilder::default();
    channel
        .title(info.title.clone())
        .link(info.link.clone())
        .description(format!("Random posts from {}", info.title))
        .last_build_date(Some(now.to_rfc2822()))
        .generator(Some(format!("feed-roulette {}", env!("CARGO_PKG_VERSION"))));

    for (i, (post, summary)) in entries.iter().enumerate() {
        let pub_date = now - chrono::Duration::seconds(i as i64);
        let link = campaign_url(&post.item_url, &info.campaign_source, "rss");

        channel.item(
            ItemBuilder::default()
                .title(Some(format!("🎲 {}", post.item_title)))
                .link(Some(link))
                .description(Some(summary.clone()))
                .author(Some(post.feed_title.clone()))
                .guid(Some(
                    GuidBuilder::default()
                        .value(format!("{}-{}", post.feed_id, post.item_id))
                        .permalink(false)
                        .build(),
                ))
                .pub_date(Some(pub_date.to_rfc2822()))
                .source(Some(
                    SourceBuilder::default()
                        .url(campaign_url(&post.feed_url, &info.campaign_source, "rss"))
                        .title(Some(post.feed_title.clone()))
                        .build(),
                ))
                .build(),
        );
    }

    channel.build().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::db::repository::tests::repository;

    fn info() -> ChannelInfo {
        ChannelInfo {
            title: "Roulette".to_string(),
            link: "https://roulette.example/".to_string(),
            campaign_source: "roulette".to_string(),
        }
    }

    fn post(item_id: i64, title: &str) -> Post {
        Post {
            item_id,
            item_url: format!("https://a.example/{item_id}"),
            item_title: title.to_string(),
            published: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            feed_id: "abc".to_string(),
            feed_url: "https://a.example/feed.xml".to_string(),
            feed_title: "A".to_string(),
            homepage: "https://a.example/".to_string(),
            social: None,
        }
    }

    async fn cache(dir: &Path) -> RssCache {
        let config = Config::default();
        let selector = Selector::new(repository().await, config.lookback(), 5);
        RssCache::new(selector, ContentFetcher::new(&config).unwrap(), dir, info())
    }

    #[test]
    fn requests_snap_to_offered_cadences() {
        assert_eq!(normalize(1, 10), (1, 10));
        assert_eq!(normalize(1, 4), (1, 3));
        assert_eq!(normalize(1, 100), (1, 25));
        assert_eq!(normalize(0, 0), (1, 1));
        assert_eq!(normalize(-3, 5), (1, 5));
        assert_eq!(normalize(3, 5), (1, 5));
        assert_eq!(normalize(7, 12), (7, 10));
        assert_eq!(normalize(7, 3), (7, 5));
    }

    #[test]
    fn cache_file_name_carries_cadence() {
        assert_eq!(
            cache_path(Path::new("/tmp/rss"), 7, 15),
            PathBuf::from("/tmp/rss/7.15.xml")
        );
    }

    #[test]
    fn channel_items_are_tagged_and_spaced() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let entries = vec![
            (post(1, "First & best"), "Summary one".to_string()),
            (post(2, "Second"), "Summary two".to_string()),
        ];

        let xml = build_channel(&info(), &entries, now);
        let channel = rss::Channel::read_from(xml.as_bytes()).unwrap();

        assert_eq!(channel.title(), "Roulette");
        assert_eq!(channel.items().len(), 2);

        let first = &channel.items()[0];
        assert_eq!(first.title(), Some("🎲 First & best"));
        assert_eq!(
            first.link(),
            Some("https://a.example/1?utm_source=roulette&utm_medium=rss")
        );
        assert_eq!(first.description(), Some("Summary one"));
        assert_eq!(first.guid().map(|g| g.value()), Some("abc-1"));
        assert_eq!(first.pub_date(), Some(now.to_rfc2822().as_str()));
        assert_eq!(first.author(), Some("A"));

        let source = first.source().unwrap();
        assert_eq!(source.title(), Some("A"));
        assert_eq!(
            source.url(),
            "https://a.example/feed.xml?utm_source=roulette&utm_medium=rss"
        );

        let second_date = channel.items()[1].pub_date().unwrap();
        let second_date = DateTime::parse_from_rfc2822(second_date).unwrap();
        assert_eq!(now - second_date.with_timezone(&Utc), chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn fresh_file_is_not_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path()).await;
        let path = cache_path(dir.path(), 1, 5);
        std::fs::write(&path, "cached").unwrap();

        let status = cache.create_feed(1, 5, false).await.unwrap();
        assert!(matches!(status, CacheStatus::Fresh(left) if left.as_secs() > 23 * 60 * 60));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "cached");
    }

    #[tokio::test]
    async fn forced_regeneration_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path()).await;
        let path = cache_path(dir.path(), 1, 5);
        std::fs::write(&path, "cached").unwrap();

        let status = cache.create_feed(1, 5, true).await.unwrap();
        assert_eq!(status, CacheStatus::Created(path.clone()));

        let channel = rss::Channel::read_from(std::fs::read(&path).unwrap().as_slice()).unwrap();
        assert!(channel.items().is_empty());
    }

    #[tokio::test]
    async fn missing_feed_is_created_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path()).await;

        let xml = cache.get_feed(1, 4).await.unwrap();
        assert!(xml.contains("<title>Roulette</title>"));
        assert!(cache_path(dir.path(), 1, 3).exists());
    }
}

use chrono::{DateTime, Utc};
use feed_rs::model::Link;
use feed_rs::parser;
use regex::Regex;
use reqwest::Client;

use crate::config::Config;
use crate::error::{AppError, Result};

/// How to treat the URL handed to [`FeedFetcher::fetch_feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// The URL must be a feed document.
    Force,
    /// The URL may be a web page announcing its feed with a `<link>` tag.
    Discover,
}

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    /// URL the feed document was actually read from.
    pub feed_url: String,
    pub homepage: String,
    pub title: String,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub url: String,
    pub title: String,
    pub published: Option<DateTime<Utc>>,
}

struct Page {
    final_url: String,
    content_type: String,
    body: Vec<u8>,
}

pub fn http_client(config: &Config) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(concat!("feed-roulette/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

#[derive(Clone)]
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
        })
    }

    pub async fn fetch_feed(&self, url: &str, mode: FetchMode) -> Result<ParsedFeed> {
        let page = self.fetch_page(url).await?;

        if mode == FetchMode::Force {
            return parse_document(&page.body, &page.final_url);
        }

        // Try parsing as RSS/Atom feed first
        if let Ok(feed) = parse_document(&page.body, &page.final_url) {
            return Ok(feed);
        }

        if page.content_type.contains("html") || looks_like_html(&page.body) {
            let html = String::from_utf8_lossy(&page.body);
            if let Some(feed_url) = find_feed_link(&html, &page.final_url) {
                tracing::debug!("Discovered feed {} on {}", feed_url, page.final_url);
                let feed_page = self.fetch_page(&feed_url).await?;
                return parse_document(&feed_page.body, &feed_page.final_url);
            }
        }

        Err(AppError::Fetch(format!(
            "Could not find an RSS/Atom feed at {url}"
        )))
    }

    async fn fetch_page(&self, url: &str) -> Result<Page> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "Failed to fetch {url}: HTTP {}",
                response.status()
            )));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.bytes().await?.to_vec();

        Ok(Page {
            final_url,
            content_type,
            body,
        })
    }

    /// Fetch a URL as plain text.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "Failed to fetch {url}: HTTP {}",
                response.status()
            )));
        }

        Ok(response.text().await?)
    }
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Parse an RSS/Atom/JSON feed document read from `feed_url`.
pub fn parse_document(bytes: &[u8], feed_url: &str) -> Result<ParsedFeed> {
    let feed = parser::parse(bytes)?;

    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();
    let homepage = page_link(&feed.links)
        .map(|href| resolve_url(href, feed_url))
        .unwrap_or_default();

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| ParsedEntry {
            url: page_link(&entry.links)
                .map(|href| resolve_url(href.trim(), feed_url))
                .unwrap_or_default(),
            title: entry
                .title
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default(),
            published: entry.published.or(entry.updated),
        })
        .collect();

    Ok(ParsedFeed {
        feed_url: feed_url.to_string(),
        homepage,
        title,
        entries,
    })
}

/// The link pointing at the human readable page rather than the feed itself.
fn page_link(links: &[Link]) -> Option<&str> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| {
            links
                .iter()
                .find(|l| !matches!(l.rel.as_deref(), Some("self" | "hub" | "enclosure")))
        })
        .map(|l| l.href.as_str())
}

/// Search HTML for RSS/Atom feed links
pub fn find_feed_link(html: &str, base_url: &str) -> Option<String> {
    // Look for <link rel="alternate" type="application/rss+xml" href="...">
    // or <link rel="alternate" type="application/atom+xml" href="...">
    let link_re = Regex::new(
        r#"<link[^>]*rel=["']alternate["'][^>]*type=["']application/(rss|atom)\+xml["'][^>]*href=["']([^"']+)["']"#,
    )
    .ok()?;

    // Also try reverse order (type before rel)
    let link_re2 = Regex::new(
        r#"<link[^>]*type=["']application/(rss|atom)\+xml["'][^>]*href=["']([^"']+)["']"#,
    )
    .ok()?;

    let href = link_re
        .captures(html)
        .or_else(|| link_re2.captures(html))
        .and_then(|cap| cap.get(2))
        .map(|m| m.as_str().to_string())?;

    Some(resolve_url(&href, base_url))
}

/// Resolve a potentially relative URL against a base URL
pub fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_string()
}

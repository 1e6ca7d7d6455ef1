use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::feed::fetcher::http_client;

const HN_API_URL: &str = "https://hn.algolia.com/api/v1/items";

/// A story or comment with its whole reply tree.
#[derive(Debug, Deserialize)]
pub struct HnItem {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<HnItem>,
}

#[derive(Clone)]
pub struct HackerNewsClient {
    client: Client,
}

impl HackerNewsClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
        })
    }

    pub async fn fetch_thread(&self, thread_id: u64) -> Result<HnItem> {
        let response = self
            .client
            .get(format!("{HN_API_URL}/{thread_id}"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "Failed to load HN thread {thread_id}: HTTP {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

/// Accept either a bare item ID or an `item?id=` URL.
pub fn thread_id(input: &str) -> Result<u64> {
    let input = input.trim();
    if let Ok(id) = input.parse() {
        return Ok(id);
    }

    Url::parse(input)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "id")
                .and_then(|(_, value)| value.parse().ok())
        })
        .ok_or_else(|| AppError::Validation(format!("`{input}` is not a HackerNews thread")))
}

/// Distinct site roots linked from the story and any comment, in thread
/// order. Links back to HackerNews itself are ignored.
pub fn linked_sites(item: &HnItem) -> Vec<String> {
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    collect_links(item, &anchor, &mut links);

    let mut sites: Vec<String> = Vec::new();
    for link in links {
        if let Some(root) = site_root(&link) {
            if !sites.contains(&root) {
                sites.push(root);
            }
        }
    }
    sites
}

/// Story URL and comment `href`s, depth first. Comment text is HTML, so
/// attributes are read through the parser to get entities decoded.
fn collect_links(item: &HnItem, anchor: &Selector, links: &mut Vec<String>) {
    if let Some(url) = &item.url {
        links.push(url.clone());
    }
    if let Some(text) = &item.text {
        let fragment = Html::parse_fragment(text);
        links.extend(
            fragment
                .select(anchor)
                .filter_map(|a| a.value().attr("href"))
                .map(str::to_string),
        );
    }
    for child in &item.children {
        collect_links(child, anchor, links);
    }
}

fn site_root(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    if host.ends_with("ycombinator.com") {
        return None;
    }
    Some(format!("{}://{}/", url.scheme(), host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_id_from_number_or_url() {
        assert_eq!(thread_id("36575081").unwrap(), 36575081);
        assert_eq!(
            thread_id("https://news.ycombinator.com/item?id=36575081").unwrap(),
            36575081
        );
        assert!(matches!(thread_id("ask hn"), Err(AppError::Validation(_))));
    }

    #[test]
    fn sites_are_collected_from_the_whole_tree() {
        let thread: HnItem = serde_json::from_str(
            r#"{
                "url": null,
                "text": "Ask HN: Share your personal blog",
                "children": [
                    {"text": "Mine: <a href=\"https:&#x2F;&#x2F;a.example&#x2F;posts&#x2F;\" rel=\"nofollow\">a.example</a>",
                     "children": [
                        {"text": "Nice! Also <a href=\"https:&#x2F;&#x2F;a.example&#x2F;about\">this</a>",
                         "children": []}
                     ]},
                    {"text": "<a href=\"http:&#x2F;&#x2F;b.example\">b</a> and <a href=\"https:&#x2F;&#x2F;news.ycombinator.com&#x2F;item?id=1\">old</a>",
                     "children": []},
                    {"text": null, "children": []}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            linked_sites(&thread),
            vec!["https://a.example/", "http://b.example/"]
        );
    }

    #[test]
    fn numeric_entities_in_links_are_decoded() {
        let thread: HnItem = serde_json::from_str(
            r#"{
                "text": "<a href=\"https:&#47;&#47;d.example&#47;\">d</a> and <a href=\"https&#x3A;&#x2F;&#x2F;e.example\">e</a>",
                "children": []
            }"#,
        )
        .unwrap();

        assert_eq!(
            linked_sites(&thread),
            vec!["https://d.example/", "https://e.example/"]
        );
    }
}

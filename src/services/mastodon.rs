use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::feed::fetcher::{http_client, resolve_url};
use crate::models::Post;

#[derive(Debug, Deserialize)]
pub struct Actor {
    pub url: String,
    #[serde(default)]
    pub attachment: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    url: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct MastodonClient {
    client: Client,
}

impl MastodonClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
        })
    }

    /// Find the verified profile of a site: the page must link the profile
    /// with `rel="me"` and the profile must link back to the page.
    pub async fn profile(&self, homepage: &str) -> Result<Option<String>> {
        let Some(simplified) = simplify_homepage(homepage) else {
            return Ok(None);
        };

        let html = self.client.get(homepage).send().await?.text().await?;

        for link in rel_me_links(&html, homepage) {
            let actor = match self.fetch_actor(&link).await {
                Ok(actor) => actor,
                Err(e) => {
                    tracing::debug!("No profile at {}: {}", link, e);
                    continue;
                }
            };

            if let Some(handle) = handle_from_actor(&actor, &simplified) {
                return Ok(Some(handle));
            }
        }

        Ok(None)
    }

    async fn fetch_actor(&self, profile_url: &str) -> Result<Actor> {
        let response = self
            .client
            .get(format!("{}.json", profile_url.trim_end_matches('/')))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Social(format!("HTTP {}", response.status())));
        }

        Ok(response.json().await?)
    }

    /// Publish a status; returns the URL of the new status.
    pub async fn post_status(&self, status: &str, instance: &str, token: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/v1/statuses", instance.trim_end_matches('/')))
            .bearer_auth(token)
            .form(&[
                ("status", status),
                ("language", "en"),
                ("visibility", "public"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<StatusResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(StatusResponse { url: Some(url), .. }) if status.is_success() => Ok(url),
            Some(StatusResponse {
                error: Some(error), ..
            }) => Err(AppError::Social(error)),
            _ => Err(AppError::Social(format!("HTTP {status}: {body}"))),
        }
    }
}

/// Host and path of a homepage without scheme or trailing slash, the form
/// profile metadata usually shows it in.
pub fn simplify_homepage(homepage: &str) -> Option<String> {
    let url = Url::parse(homepage.trim()).ok()?;
    let host = url.host_str()?;
    Some(format!("{}{}", host, url.path().trim_end_matches('/')))
}

/// Targets of all `<a rel="me">` links on a page.
pub fn rel_me_links(html: &str, base_url: &str) -> Vec<String> {
    let (Ok(anchor_re), Ok(href_re)) = (
        Regex::new(r#"(?i)<a\s[^>]*\brel=["'][^"']*\bme\b[^"']*["'][^>]*>"#),
        Regex::new(r#"(?i)\bhref=["']([^"']+)["']"#),
    ) else {
        return Vec::new();
    };

    anchor_re
        .find_iter(html)
        .filter_map(|anchor| href_re.captures(anchor.as_str()))
        .filter_map(|cap| cap.get(1))
        .map(|href| resolve_url(href.as_str(), base_url))
        .collect()
}

/// `user@instance` if one of the actor's profile fields mentions the site.
pub fn handle_from_actor(actor: &Actor, simplified_homepage: &str) -> Option<String> {
    let needle = simplified_homepage.to_lowercase();
    let backlinked = actor
        .attachment
        .iter()
        .any(|a| a.kind == "PropertyValue" && a.value.to_lowercase().contains(&needle));
    if !backlinked {
        return None;
    }

    let url = Url::parse(&actor.url).ok()?;
    Some(format!("{}@{}", url.path().trim_matches('/'), url.host_str()?))
}

/// Status text announcing a random post.
pub fn format_post(post: &Post, link: &str) -> String {
    let mut text = format!("{} ({})", post.item_title, post.published.format("%Y-%m-%d"));
    if let Some(social) = &post.social {
        text.push_str(&format!(" by {social}"));
    }
    text.push_str(&format!("\n\n{link}"));
    text.push_str(&format!("\n\n🎲 {}-{}", post.feed_id, post.item_id));
    text.push_str("\n#blog #blogging #blogpost #random");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn homepage_is_simplified() {
        assert_eq!(
            simplify_homepage("https://a.example/blog/").as_deref(),
            Some("a.example/blog")
        );
        assert_eq!(simplify_homepage("https://a.example").as_deref(), Some("a.example"));
        assert_eq!(simplify_homepage("not a url"), None);
    }

    #[test]
    fn rel_me_anchors_are_found() {
        let html = r#"
            <a href="https://a.example/about">About</a>
            <a rel="me" href="https://mastodon.social/@alice">Mastodon</a>
            <a href="https://hachyderm.io/@alice" rel="nofollow me">Alt</a>
        "#;
        assert_eq!(
            rel_me_links(html, "https://a.example/"),
            vec!["https://mastodon.social/@alice", "https://hachyderm.io/@alice"]
        );
    }

    #[test]
    fn handle_requires_backlink() {
        let actor: Actor = serde_json::from_str(
            r#"{
                "url": "https://mastodon.social/@alice",
                "attachment": [
                    {"type": "PropertyValue", "name": "Blog",
                     "value": "<a href=\"https://A.example/blog\" rel=\"me\">a.example/blog</a>"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            handle_from_actor(&actor, "a.example/blog").as_deref(),
            Some("@alice@mastodon.social")
        );
        assert_eq!(handle_from_actor(&actor, "b.example"), None);
    }

    #[test]
    fn post_text_has_date_handle_and_marker() {
        let post = Post {
            item_id: 42,
            item_url: "https://a.example/post".to_string(),
            item_title: "Hello".to_string(),
            published: Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap(),
            feed_id: "abc".to_string(),
            feed_url: "https://a.example/feed.xml".to_string(),
            feed_title: "A".to_string(),
            homepage: "https://a.example/".to_string(),
            social: Some("@alice@mastodon.social".to_string()),
        };

        let text = format_post(&post, "https://a.example/post?utm_medium=mastodon");
        assert!(text.starts_with("Hello (2024-03-05) by @alice@mastodon.social\n\n"));
        assert!(text.contains("https://a.example/post?utm_medium=mastodon"));
        assert!(text.contains("🎲 abc-42"));
    }
}

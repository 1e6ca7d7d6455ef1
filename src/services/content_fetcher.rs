use regex::Regex;
use reqwest::Client;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::feed::fetcher::http_client;

const SUMMARY_CHARS: usize = 500;

/// Pulls a short readable summary out of an article page.
#[derive(Clone)]
pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
        })
    }

    pub async fn fetch_summary(&self, article_url: &str) -> Result<String> {
        let response = self.client.get(article_url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "Failed to fetch {article_url}: HTTP {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        summarize_html(&html)
            .ok_or_else(|| AppError::Fetch(format!("No readable content at {article_url}")))
    }
}

/// The longer of the article body text and the meta description, cut to
/// 500 characters.
pub fn summarize_html(html: &str) -> Option<String> {
    let text = extract_text(html).unwrap_or_default();
    let description = meta_description(html).unwrap_or_default();

    let summary = if text.chars().count() > description.chars().count() {
        text
    } else {
        description
    };

    if summary.is_empty() {
        return None;
    }
    Some(truncate(&summary, SUMMARY_CHARS))
}

/// Plain text of the page's `<article>` (or `<main>`, or the whole page).
fn extract_text(html: &str) -> Option<String> {
    let body = ["article", "main"]
        .iter()
        .filter_map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}[\s>].*?</{tag}>"))
                .ok()?
                .find(html)
                .map(|m| m.as_str())
        })
        .next()
        .unwrap_or(html);

    let text = match html2text::from_read(body.as_bytes(), 10_000) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return None;
        }
    };

    // Clean up the text - remove excessive whitespace
    let cleaned = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    (!cleaned.is_empty()).then_some(cleaned)
}

fn meta_description(html: &str) -> Option<String> {
    let patterns = [
        r#"(?i)<meta[^>]*name=["'](?:og:)?description["'][^>]*content=["']([^"']*)["']"#,
        r#"(?i)<meta[^>]*property=["']og:description["'][^>]*content=["']([^"']*)["']"#,
        r#"(?i)<meta[^>]*content=["']([^"']*)["'][^>]*name=["']description["']"#,
    ];

    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok()?.captures(html))
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .find(|d| !d.is_empty())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

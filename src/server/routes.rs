use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Result};
use axum::{Form, Json};
use serde::Deserialize;

use crate::app::App;
use crate::models::SeenList;
use crate::server::convert_errors;

const SEEN_COOKIE: &str = "seen";
const SEEN_COOKIE_MAX_AGE: u32 = 60 * 60 * 24 * 365;

const DEFAULT_RSS_FREQ: i64 = 1;
const DEFAULT_RSS_NUM: i64 = 5;

/// The visitor's seen list from the request cookies.
fn seen_from_headers(headers: &HeaderMap) -> SeenList {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == SEEN_COOKIE)
        .map(|(_, value)| SeenList::parse(&value.replace("%2C", ",")))
        .unwrap_or_default()
}

fn seen_cookie(seen: &SeenList) -> String {
    format!("{SEEN_COOKIE}={seen}; Max-Age={SEEN_COOKIE_MAX_AGE}; Path=/; SameSite=Lax")
}

/// Redirect to a random post the visitor has not been sent to before.
pub async fn random(State(app): State<Arc<App>>, headers: HeaderMap) -> Result<impl IntoResponse> {
    let mut seen = seen_from_headers(&headers);
    let post = convert_errors(app.random(&mut seen)).await?;
    let post = post.ok_or((StatusCode::NOT_FOUND, "No posts yet"))?;

    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, post.item_url),
            (header::SET_COOKIE, seen_cookie(&seen)),
        ],
    ))
}

pub async fn seen(State(app): State<Arc<App>>, headers: HeaderMap) -> Result<impl IntoResponse> {
    let seen = seen_from_headers(&headers);
    let posts = convert_errors(app.last_seen(&seen)).await?;
    Ok(Json(posts))
}

#[derive(Debug, Deserialize)]
pub struct SuggestForm {
    #[serde(default)]
    suggest: String,
    /// Hidden field; only bots fill it in.
    #[serde(default)]
    title: String,
}

pub async fn suggest(
    State(app): State<Arc<App>>,
    Form(form): Form<SuggestForm>,
) -> Result<impl IntoResponse> {
    if !form.title.is_empty() {
        tracing::debug!("Ignoring suggestion with filled honeypot: {}", form.suggest);
        return Ok((StatusCode::ACCEPTED, "Thanks for your suggestion".to_string()));
    }

    let suggestion = convert_errors(app.suggest(&form.suggest)).await?;
    tracing::info!("[{}] suggested {}", suggestion.id, suggestion.url);

    let name = if suggestion.title.is_empty() {
        suggestion.url
    } else {
        suggestion.title
    };
    Ok((
        StatusCode::ACCEPTED,
        format!("Thanks for suggesting {name}. It will be reviewed soon."),
    ))
}

pub async fn export(State(app): State<Arc<App>>) -> Result<impl IntoResponse> {
    let feeds = convert_errors(app.export()).await?;
    Ok(Json(feeds))
}

#[derive(Debug, Deserialize)]
pub struct RssQuery {
    freq: Option<i64>,
    num: Option<i64>,
}

pub async fn rss(
    State(app): State<Arc<App>>,
    Query(query): Query<RssQuery>,
) -> Result<impl IntoResponse> {
    let xml = convert_errors(app.rss(
        query.freq.unwrap_or(DEFAULT_RSS_FREQ),
        query.num.unwrap_or(DEFAULT_RSS_NUM),
    ))
    .await?;

    Ok(([(header::CONTENT_TYPE, "application/rss+xml")], xml))
}

pub async fn stats(State(app): State<Arc<App>>) -> Result<impl IntoResponse> {
    let stats = convert_errors(app.stats()).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn seen_list_is_read_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; seen=3,2,junk,1; other=x"),
        );
        assert_eq!(seen_from_headers(&headers).ids(), &[3, 2, 1]);
    }

    #[test]
    fn missing_cookie_means_nothing_seen() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert!(seen_from_headers(&headers).is_empty());
        assert!(seen_from_headers(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn cookie_keeps_newest_first() {
        let mut seen = SeenList::parse("2,1");
        seen.push(3);
        assert_eq!(
            seen_cookie(&seen),
            "seen=3,2,1; Max-Age=31536000; Path=/; SameSite=Lax"
        );
    }
}

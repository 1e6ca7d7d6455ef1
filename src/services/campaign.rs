use url::Url;

/// Tag an outgoing link so site owners can see where the visit came from.
/// Unparseable URLs are returned unchanged.
pub fn campaign_url(link: &str, source: &str, medium: &str) -> String {
    let Ok(mut url) = Url::parse(link) else {
        return link.to_string();
    };
    url.query_pairs_mut()
        .append_pair("utm_source", source)
        .append_pair("utm_medium", medium);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_are_appended() {
        assert_eq!(
            campaign_url("https://a.example/post", "roulette", "rss"),
            "https://a.example/post?utm_source=roulette&utm_medium=rss"
        );
        assert_eq!(
            campaign_url("https://a.example/?p=1#top", "roulette", "mastodon"),
            "https://a.example/?p=1&utm_source=roulette&utm_medium=mastodon#top"
        );
    }

    #[test]
    fn garbage_passes_through() {
        assert_eq!(campaign_url("/relative", "r", "rss"), "/relative");
    }
}

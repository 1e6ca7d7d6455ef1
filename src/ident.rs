use sha2::{Digest, Sha256};

/// Derive the stable identifier for a feed, source or suggestion URL.
///
/// The scheme is ignored, so `http://`, `https://` and bare URLs of the same
/// resource share one identifier. Identifiers double as dedup keys.
pub fn derive_id(url: &str) -> String {
    let url = url.trim();
    let url = strip_scheme(url).trim().to_lowercase();

    hex::encode(Sha256::digest(url.as_bytes()))
}

fn strip_scheme(url: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if url.len() >= scheme.len()
            && url.is_char_boundary(scheme.len())
            && url[..scheme.len()].eq_ignore_ascii_case(scheme)
        {
            return &url[scheme.len()..];
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_and_case_do_not_matter() {
        let id = derive_id("http://x.com/a");
        assert_eq!(id, derive_id("https://x.com/a"));
        assert_eq!(id, derive_id("X.COM/a"));
        assert_eq!(id, derive_id("  HTTPS://x.com/a \n"));
    }

    #[test]
    fn repeated_calls_agree() {
        let url = "https://blog.example.org/feed.xml";
        assert_eq!(derive_id(url), derive_id(url));
        assert_eq!(derive_id(url).len(), 64);
    }

    #[test]
    fn different_paths_differ() {
        assert_ne!(derive_id("x.com/a"), derive_id("x.com/b"));
    }

    #[test]
    fn only_leading_scheme_is_stripped() {
        assert_ne!(
            derive_id("x.com/?u=https://y.com"),
            derive_id("x.com/?u=y.com")
        );
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How a source lists its candidate feed URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A syndication feed whose entries link to candidate sites.
    Feed,
    /// Plain text, one URL per line.
    List,
    /// An OPML directory; every outline's `xmlUrl` is a candidate.
    Opml,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::List => "list",
            SourceKind::Opml => "opml",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" => Ok(SourceKind::Feed),
            "list" => Ok(SourceKind::List),
            "opml" => Ok(SourceKind::Opml),
            other => Err(AppError::Validation(format!(
                "unknown source kind `{other}` (expected feed, list or opml)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub url: String,
    pub kind: SourceKind,
    pub added: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub url: String,
    pub homepage: String,
    pub title: String,
    pub social: Option<String>,
    pub added: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("OPML".parse::<SourceKind>().unwrap(), SourceKind::Opml);
        assert_eq!(" list ".parse::<SourceKind>().unwrap(), SourceKind::List);
        assert!(matches!(
            "csv".parse::<SourceKind>(),
            Err(AppError::Validation(_))
        ));
    }
}

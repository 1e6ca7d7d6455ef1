use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An item joined with the feed it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub item_id: i64,
    pub item_url: String,
    pub item_title: String,
    pub published: DateTime<Utc>,
    pub feed_id: String,
    pub feed_url: String,
    pub feed_title: String,
    pub homepage: String,
    pub social: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub feeds: i64,
    pub items: i64,
    pub recent_items: i64,
    pub errored_feeds: i64,
    pub suggestions: i64,
}

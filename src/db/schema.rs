/// One version-tagged schema step.
pub struct Migration {
    pub version: u32,
    pub sql: &'static str,
}

/// Schema history, strictly ascending by version. Never edit a released step;
/// append a new one instead.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
-- feeds table
CREATE TABLE feeds (
    id TEXT NOT NULL PRIMARY KEY,
    url TEXT NOT NULL,
    homepage TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    added INTEGER NOT NULL,
    fetched INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    last_error TEXT NOT NULL DEFAULT ''
);

-- items table
CREATE TABLE items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    published INTEGER NOT NULL,
    UNIQUE(feed_id, url)
);
"#,
    },
    Migration {
        version: 2,
        sql: r#"
-- feeds waiting for moderation
CREATE TABLE suggestions (
    id TEXT NOT NULL PRIMARY KEY,
    url TEXT NOT NULL,
    homepage TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    added INTEGER NOT NULL
);

-- candidate URLs already looked at by the suggestion pipeline
CREATE TABLE seen_suggestions (
    id TEXT NOT NULL PRIMARY KEY
);
"#,
    },
    Migration {
        version: 3,
        sql: r#"
-- bulk suppliers of candidate feeds
CREATE TABLE sources (
    id TEXT NOT NULL PRIMARY KEY,
    url TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('feed', 'list', 'opml')),
    added INTEGER NOT NULL
);
"#,
    },
    Migration {
        version: 4,
        sql: r#"
ALTER TABLE feeds ADD COLUMN social TEXT;
ALTER TABLE suggestions ADD COLUMN social TEXT;
"#,
    },
    Migration {
        version: 5,
        sql: r#"
CREATE INDEX idx_items_feed_published ON items(feed_id, published);
CREATE INDEX idx_items_published ON items(published);
CREATE INDEX idx_feeds_errors ON feeds(errors);
"#,
    },
];

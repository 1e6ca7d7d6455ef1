use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::Row;

use crate::error::{AppError, Result};
use crate::models::{Feed, NewItem, Post, Source, SourceKind, Stats, Suggestion};

use super::store::{save_record_in, OnConflict, Store};

const FEED_COLUMNS: &str =
    "id, url, homepage, title, social, added, fetched, errors, last_error";

const POST_SELECT: &str = r#"SELECT i.id, i.url, i.title, i.published,
                                    f.id, f.url, f.title, f.homepage, f.social
                               FROM items i
                               JOIN feeds f ON f.id = i.feed_id"#;

/// Items of feeds below the error threshold, published after a cutoff and
/// not in an exclusion list (JSON array).
const ELIGIBLE_ITEMS: &str = r#"f.errors < ?1
                            AND i.published > ?2
                            AND i.id NOT IN (SELECT value FROM json_each(?3))"#;

#[derive(Clone)]
pub struct Repository {
    store: Store,
}

impl Repository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // Feed operations

    pub async fn get_feed(&self, id: &str) -> Result<Option<Feed>> {
        self.store
            .query_row(
                format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"),
                vec![text(id)],
                feed_from_row,
            )
            .await
    }

    pub async fn feed_exists(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .store
            .query_value("SELECT 1 FROM feeds WHERE id = ?1".to_string(), vec![text(id)])
            .await?;
        Ok(found.is_some())
    }

    pub async fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        self.store
            .query_all(
                format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY title COLLATE NOCASE"),
                vec![],
                feed_from_row,
            )
            .await
    }

    /// All feeds in random order, so a run that dies halfway does not starve
    /// the same feeds every time.
    pub async fn get_feeds_shuffled(&self) -> Result<Vec<Feed>> {
        self.store
            .query_all(
                format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY random()"),
                vec![],
                feed_from_row,
            )
            .await
    }

    pub async fn get_feeds_without_social(&self) -> Result<Vec<Feed>> {
        self.store
            .query_all(
                format!(
                    "SELECT {FEED_COLUMNS} FROM feeds
                      WHERE (social IS NULL OR social = '') AND homepage != ''"
                ),
                vec![],
                feed_from_row,
            )
            .await
    }

    pub async fn insert_feed(&self, feed: &Feed) -> Result<()> {
        let inserted = self
            .store
            .save_record(
                "feeds",
                vec![
                    ("id", text(&feed.id)),
                    ("url", text(&feed.url)),
                    ("homepage", text(&feed.homepage)),
                    ("title", text(&feed.title)),
                    ("social", opt_text(feed.social.as_deref())),
                    ("added", timestamp(feed.added)),
                    ("fetched", Value::Integer(feed.fetched.map_or(0, |t| t.timestamp()))),
                    ("errors", Value::Integer(i64::from(feed.errors))),
                    ("last_error", text(&feed.last_error)),
                ],
                OnConflict::Ignore,
            )
            .await?;

        if inserted == 0 {
            return Err(AppError::Duplicate(feed.id.clone()));
        }
        Ok(())
    }

    /// Persist the fetch bookkeeping of a feed. Items are left alone.
    pub async fn save_feed_health(&self, feed: &Feed) -> Result<()> {
        self.store
            .exec(
                "UPDATE feeds SET fetched = ?1, errors = ?2, last_error = ?3 WHERE id = ?4",
                vec![
                    Value::Integer(feed.fetched.map_or(0, |t| t.timestamp())),
                    Value::Integer(i64::from(feed.errors)),
                    text(&feed.last_error),
                    text(&feed.id),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn set_feed_social(&self, id: &str, handle: &str) -> Result<()> {
        self.store
            .exec(
                "UPDATE feeds SET social = ?1 WHERE id = ?2",
                vec![text(handle), text(id)],
            )
            .await?;
        Ok(())
    }

    /// Delete a feed and, through the foreign key, all of its items.
    pub async fn delete_feed(&self, id: &str) -> Result<bool> {
        let count = self
            .store
            .exec("DELETE FROM feeds WHERE id = ?1", vec![text(id)])
            .await?;
        Ok(count > 0)
    }

    // Item operations

    /// Insert items in one transaction, skipping (feed, url) pairs that are
    /// already stored. Returns how many rows were new.
    pub async fn store_items(
        &self,
        items: Vec<NewItem>,
    ) -> std::result::Result<usize, tokio_rusqlite::Error> {
        self.store
            .transaction(move |tx| {
                let mut inserted = 0;
                for item in &items {
                    inserted += save_record_in(
                        tx,
                        "items",
                        &[
                            ("feed_id", text(&item.feed_id)),
                            ("url", text(&item.url)),
                            ("title", text(&item.title)),
                            ("published", timestamp(item.published)),
                        ],
                        OnConflict::Ignore,
                    )?;
                }
                Ok(inserted)
            })
            .await
    }

    pub async fn item_count(&self, feed_id: &str) -> Result<i64> {
        let count = self
            .store
            .query_value(
                "SELECT COUNT(*) FROM items WHERE feed_id = ?1".to_string(),
                vec![text(feed_id)],
            )
            .await?;
        Ok(count.unwrap_or(0))
    }

    // Random selection

    /// Pick a random feed among those owning at least one eligible item.
    pub async fn random_feed_id(
        &self,
        excluded: &[i64],
        published_after: DateTime<Utc>,
        error_threshold: u32,
    ) -> Result<Option<String>> {
        self.store
            .query_value(
                format!(
                    "SELECT feed_id FROM (
                         SELECT DISTINCT i.feed_id AS feed_id
                           FROM items i
                           JOIN feeds f ON f.id = i.feed_id
                          WHERE {ELIGIBLE_ITEMS}
                     )
                     ORDER BY random()
                     LIMIT 1"
                ),
                eligible_params(excluded, published_after, error_threshold)?,
            )
            .await
    }

    /// Pick a random eligible item of one feed.
    pub async fn random_post_of_feed(
        &self,
        feed_id: &str,
        excluded: &[i64],
        published_after: DateTime<Utc>,
        error_threshold: u32,
    ) -> Result<Option<Post>> {
        let mut params = eligible_params(excluded, published_after, error_threshold)?;
        params.push(text(feed_id));

        self.store
            .query_row(
                format!(
                    "{POST_SELECT}
                      WHERE {ELIGIBLE_ITEMS}
                        AND i.feed_id = ?4
                   ORDER BY random()
                      LIMIT 1"
                ),
                params,
                post_from_row,
            )
            .await
    }

    /// Posts for the given item IDs, in the order of `ids`. Unknown IDs are
    /// skipped.
    pub async fn get_posts_by_ids(&self, ids: &[i64]) -> Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let posts = self
            .store
            .query_all(
                format!("{POST_SELECT} WHERE i.id IN (SELECT value FROM json_each(?1))"),
                vec![Value::Text(serde_json::to_string(ids)?)],
                post_from_row,
            )
            .await?;

        Ok(ids
            .iter()
            .filter_map(|id| posts.iter().find(|p| p.item_id == *id).cloned())
            .collect())
    }

    pub async fn stats(&self, recent_after: DateTime<Utc>) -> Result<Stats> {
        let stats = self
            .store
            .query_row(
                "SELECT (SELECT COUNT(*) FROM feeds),
                        (SELECT COUNT(*) FROM items),
                        (SELECT COUNT(*) FROM items WHERE published > ?1),
                        (SELECT COUNT(*) FROM feeds WHERE errors > 0),
                        (SELECT COUNT(*) FROM suggestions)"
                    .to_string(),
                vec![timestamp(recent_after)],
                |row| {
                    Ok(Stats {
                        feeds: row.get(0)?,
                        items: row.get(1)?,
                        recent_items: row.get(2)?,
                        errored_feeds: row.get(3)?,
                        suggestions: row.get(4)?,
                    })
                },
            )
            .await?;
        Ok(stats.unwrap_or_default())
    }

    // Source operations

    pub async fn insert_source(&self, source: &Source) -> Result<()> {
        let inserted = self
            .store
            .save_record(
                "sources",
                vec![
                    ("id", text(&source.id)),
                    ("url", text(&source.url)),
                    ("kind", text(source.kind.as_str())),
                    ("added", timestamp(source.added)),
                ],
                OnConflict::Ignore,
            )
            .await?;

        if inserted == 0 {
            return Err(AppError::Duplicate(source.id.clone()));
        }
        Ok(())
    }

    pub async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        self.store
            .query_row(
                "SELECT id, url, kind, added FROM sources WHERE id = ?1".to_string(),
                vec![text(id)],
                source_from_row,
            )
            .await
    }

    pub async fn get_all_sources(&self) -> Result<Vec<Source>> {
        self.store
            .query_all(
                "SELECT id, url, kind, added FROM sources ORDER BY added".to_string(),
                vec![],
                source_from_row,
            )
            .await
    }

    // Suggestion operations

    pub async fn insert_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        let inserted = self
            .store
            .save_record(
                "suggestions",
                vec![
                    ("id", text(&suggestion.id)),
                    ("url", text(&suggestion.url)),
                    ("homepage", text(&suggestion.homepage)),
                    ("title", text(&suggestion.title)),
                    ("social", opt_text(suggestion.social.as_deref())),
                    ("added", timestamp(suggestion.added)),
                ],
                OnConflict::Ignore,
            )
            .await?;

        if inserted == 0 {
            return Err(AppError::Duplicate(suggestion.id.clone()));
        }
        Ok(())
    }

    pub async fn suggestion_exists(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .store
            .query_value(
                "SELECT 1 FROM suggestions WHERE id = ?1".to_string(),
                vec![text(id)],
            )
            .await?;
        Ok(found.is_some())
    }

    pub async fn get_suggestion(&self, id: &str) -> Result<Option<Suggestion>> {
        self.store
            .query_row(
                "SELECT id, url, homepage, title, social, added FROM suggestions WHERE id = ?1"
                    .to_string(),
                vec![text(id)],
                suggestion_from_row,
            )
            .await
    }

    pub async fn get_all_suggestions(&self) -> Result<Vec<Suggestion>> {
        self.store
            .query_all(
                "SELECT id, url, homepage, title, social, added FROM suggestions ORDER BY added"
                    .to_string(),
                vec![],
                suggestion_from_row,
            )
            .await
    }

    pub async fn delete_suggestion(&self, id: &str) -> Result<bool> {
        let count = self
            .store
            .exec("DELETE FROM suggestions WHERE id = ?1", vec![text(id)])
            .await?;
        Ok(count > 0)
    }

    /// Record a candidate URL ID as looked at. Returns `false` if it already
    /// was.
    pub async fn mark_suggestion_seen(&self, id: &str) -> Result<bool> {
        let inserted = self
            .store
            .save_record("seen_suggestions", vec![("id", text(id))], OnConflict::Ignore)
            .await?;
        Ok(inserted > 0)
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text(s: Option<&str>) -> Value {
    s.filter(|s| !s.is_empty())
        .map_or(Value::Null, |s| Value::Text(s.to_string()))
}

fn timestamp(dt: DateTime<Utc>) -> Value {
    Value::Integer(dt.timestamp())
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn eligible_params(
    excluded: &[i64],
    published_after: DateTime<Utc>,
    error_threshold: u32,
) -> Result<Vec<Value>> {
    Ok(vec![
        Value::Integer(i64::from(error_threshold)),
        timestamp(published_after),
        Value::Text(serde_json::to_string(excluded)?),
    ])
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    let fetched: i64 = row.get(6)?;
    Ok(Feed {
        id: row.get(0)?,
        url: row.get(1)?,
        homepage: row.get(2)?,
        title: row.get(3)?,
        social: row.get::<_, Option<String>>(4)?.filter(|s| !s.is_empty()),
        added: from_timestamp(row.get(5)?),
        fetched: (fetched > 0).then(|| from_timestamp(fetched)),
        errors: row.get(7)?,
        last_error: row.get(8)?,
    })
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        item_id: row.get(0)?,
        item_url: row.get(1)?,
        item_title: row.get(2)?,
        published: from_timestamp(row.get(3)?),
        feed_id: row.get(4)?,
        feed_url: row.get(5)?,
        feed_title: row.get(6)?,
        homepage: row.get(7)?,
        social: row.get::<_, Option<String>>(8)?.filter(|s| !s.is_empty()),
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    let kind: String = row.get(2)?;
    let kind = kind.parse::<SourceKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Source {
        id: row.get(0)?,
        url: row.get(1)?,
        kind,
        added: from_timestamp(row.get(3)?),
    })
}

fn suggestion_from_row(row: &Row) -> rusqlite::Result<Suggestion> {
    Ok(Suggestion {
        id: row.get(0)?,
        url: row.get(1)?,
        homepage: row.get(2)?,
        title: row.get(3)?,
        social: row.get::<_, Option<String>>(4)?.filter(|s| !s.is_empty()),
        added: from_timestamp(row.get(5)?),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ident::derive_id;

    pub(crate) async fn repository() -> Repository {
        Repository::new(Store::open_in_memory().await.unwrap())
    }

    pub(crate) fn feed(url: &str) -> Feed {
        Feed {
            id: derive_id(url),
            url: url.to_string(),
            homepage: url.trim_end_matches("feed.xml").to_string(),
            title: url.to_string(),
            social: None,
            added: Utc::now(),
            fetched: None,
            errors: 0,
            last_error: String::new(),
        }
    }

    pub(crate) fn item(feed: &Feed, url: &str, published: DateTime<Utc>) -> NewItem {
        NewItem {
            feed_id: feed.id.clone(),
            url: url.to_string(),
            title: format!("Post {url}"),
            published,
        }
    }

    #[tokio::test]
    async fn duplicate_feed_is_rejected() {
        let repo = repository().await;
        let feed = feed("https://a.example/feed.xml");

        repo.insert_feed(&feed).await.unwrap();
        let err = repo.insert_feed(&feed).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(id) if id == feed.id));
    }

    #[tokio::test]
    async fn storing_items_twice_keeps_one_copy() {
        let repo = repository().await;
        let feed = feed("https://a.example/feed.xml");
        repo.insert_feed(&feed).await.unwrap();

        let now = Utc::now();
        let items = vec![
            item(&feed, "https://a.example/1", now),
            item(&feed, "https://a.example/2", now),
        ];
        assert_eq!(repo.store_items(items.clone()).await.unwrap(), 2);
        assert_eq!(repo.store_items(items).await.unwrap(), 0);
        assert_eq!(repo.item_count(&feed.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn deleting_feed_cascades_to_items() {
        let repo = repository().await;
        let feed = feed("https://a.example/feed.xml");
        repo.insert_feed(&feed).await.unwrap();
        repo.store_items(vec![item(&feed, "https://a.example/1", Utc::now())])
            .await
            .unwrap();

        assert!(repo.delete_feed(&feed.id).await.unwrap());
        assert_eq!(repo.item_count(&feed.id).await.unwrap(), 0);
        assert!(!repo.delete_feed(&feed.id).await.unwrap());
    }

    #[tokio::test]
    async fn health_update_round_trips() {
        let repo = repository().await;
        let mut feed = feed("https://a.example/feed.xml");
        repo.insert_feed(&feed).await.unwrap();

        let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        feed.record_failure("HTTP 404", now);
        repo.save_feed_health(&feed).await.unwrap();

        let stored = repo.get_feed(&feed.id).await.unwrap().unwrap();
        assert_eq!(stored.errors, 1);
        assert_eq!(stored.last_error, "HTTP 404");
        assert_eq!(stored.fetched, Some(now));
    }

    #[tokio::test]
    async fn seen_marks_are_write_once() {
        let repo = repository().await;
        assert!(repo.mark_suggestion_seen("abc").await.unwrap());
        assert!(!repo.mark_suggestion_seen("abc").await.unwrap());
    }

    #[tokio::test]
    async fn posts_by_ids_follow_requested_order() {
        let repo = repository().await;
        let feed = feed("https://a.example/feed.xml");
        repo.insert_feed(&feed).await.unwrap();
        let now = Utc::now();
        repo.store_items(vec![
            item(&feed, "https://a.example/1", now),
            item(&feed, "https://a.example/2", now),
        ])
        .await
        .unwrap();

        let posts = repo.get_posts_by_ids(&[2, 999, 1]).await.unwrap();
        let ids: Vec<i64> = posts.iter().map(|p| p.item_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}

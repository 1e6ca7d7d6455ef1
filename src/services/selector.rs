use chrono::{Duration, Utc};

use crate::db::Repository;
use crate::error::Result;
use crate::models::Post;

/// Hands out random posts, giving every qualifying feed the same chance no
/// matter how much it publishes.
///
/// A draw first picks a feed among those with at least one eligible item,
/// then an item of that feed. Eligible means: not excluded, published within
/// the lookback window, and the feed is not quarantined.
#[derive(Clone)]
pub struct Selector {
    repo: Repository,
    lookback: Duration,
    error_threshold: u32,
}

impl Selector {
    pub fn new(repo: Repository, lookback: Duration, error_threshold: u32) -> Self {
        Self {
            repo,
            lookback,
            error_threshold,
        }
    }

    /// One random post not in `excluded`. When everything recent has been
    /// excluded the draw is repeated without exclusions, so a visitor who
    /// has seen it all still gets something.
    pub async fn select_one(&self, excluded: &[i64]) -> Result<Option<Post>> {
        if let Some(post) = self.draw(excluded).await? {
            return Ok(Some(post));
        }
        if excluded.is_empty() {
            return Ok(None);
        }
        self.draw(&[]).await
    }

    /// Up to `n` pairwise distinct random posts.
    pub async fn select_many(&self, excluded: &[i64], n: usize) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = Vec::with_capacity(n);
        let mut excluded = excluded.to_vec();

        while posts.len() < n {
            let mut post = self.draw(&excluded).await?;
            if post.is_none() {
                let batch: Vec<i64> = posts.iter().map(|p| p.item_id).collect();
                if batch.len() < excluded.len() {
                    post = self.draw(&batch).await?;
                }
            }

            let Some(post) = post else {
                break;
            };
            excluded.push(post.item_id);
            posts.push(post);
        }

        Ok(posts)
    }

    async fn draw(&self, excluded: &[i64]) -> Result<Option<Post>> {
        let published_after = Utc::now() - self.lookback;

        let Some(feed_id) = self
            .repo
            .random_feed_id(excluded, published_after, self.error_threshold)
            .await?
        else {
            return Ok(None);
        };

        self.repo
            .random_post_of_feed(&feed_id, excluded, published_after, self.error_threshold)
            .await
    }
}

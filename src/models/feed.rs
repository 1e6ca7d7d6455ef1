use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::health::Health;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub url: String,
    pub homepage: String,
    pub title: String,
    pub social: Option<String>,
    pub added: DateTime<Utc>,
    /// Last fetch attempt, successful or not. `None` if never fetched.
    pub fetched: Option<DateTime<Utc>>,
    pub errors: u32,
    pub last_error: String,
}

impl Feed {
    pub fn health(&self, quarantine_threshold: u32) -> Health {
        Health::classify(self.errors, quarantine_threshold)
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.errors = 0;
        self.last_error.clear();
        self.fetched = Some(now);
    }

    pub fn record_failure(&mut self, message: &str, now: DateTime<Utc>) {
        self.errors = self.errors.saturating_add(1);
        self.last_error = message.to_string();
        self.fetched = Some(now);
    }

    /// Force the feed to be retried on the next update run.
    ///
    /// The counter is set to 1 rather than 0 so a reset feed is still listed
    /// as errored until a fetch actually succeeds.
    pub fn reset_errors(&mut self) {
        self.errors = 1;
        self.last_error = "to be retried".to_string();
        self.fetched = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub feed_id: String,
    pub url: String,
    pub title: String,
    pub published: DateTime<Utc>,
}

use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use tracing::warn;

use crate::{models::notification::StoredNotification, stores::CacheStore, utils::with_timeout};

/// The last `cap` notifications of each user, most recent first.
#[derive(Clone)]
pub struct HistoryStore {
    cache: Arc<dyn CacheStore>,
    cap: usize,
    call_timeout: Duration,
}

impl HistoryStore {
    pub fn new(cache: Arc<dyn CacheStore>, cap: usize, call_timeout: Duration) -> Self {
        Self {
            cache,
            cap,
            call_timeout,
        }
    }

    pub async fn store(
        &self,
        user_id: i64,
        notification: &StoredNotification,
    ) -> Result<(), Error> {
        let value = serde_json::to_string(notification)
            .map_err(|e| anyhow!("Failed to serialize notification: {}", e))?;

        with_timeout(
            self.call_timeout,
            "history write",
            self.cache.push_and_trim(&history_key(user_id), value, self.cap),
        )
        .await
    }

    /// Entries that no longer decode are skipped.
    pub async fn notifications(&self, user_id: i64) -> Result<Vec<StoredNotification>, Error> {
        let key = history_key(user_id);
        let raw = with_timeout(self.call_timeout, "history read", self.cache.range(&key)).await?;

        Ok(raw
            .iter()
            .filter_map(|entry| match serde_json::from_str(entry) {
                Ok(notification) => Some(notification),
                Err(e) => {
                    warn!(error = %e, key = %key, "Skipping malformed stored notification");
                    None
                }
            })
            .collect())
    }
}

pub fn history_key(user_id: i64) -> String {
    format!("notifications:{}", user_id)
}

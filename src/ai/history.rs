use chrono::{NaiveDateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;

use crate::ai::intent::Intent;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub content: String,
    #[schema(value_type = Option<String>)]
    pub intent: Option<Intent>,
    #[schema(format = "date-time", value_type = String)]
    pub at: NaiveDateTime,
}

impl ChatEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            intent: None,
            at: Utc::now().naive_utc(),
        }
    }

    pub fn assistant(content: impl Into<String>, intent: Intent) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            intent: Some(intent),
            at: Utc::now().naive_utc(),
        }
    }
}

/// Per-user conversation buffer. Each user keeps at most `limit` entries,
/// oldest dropped first; idle users expire after the TTL.
#[derive(Clone)]
pub struct ChatHistory {
    cache: Cache<u64, VecDeque<ChatEntry>>,
    limit: usize,
}

impl ChatHistory {
    pub fn new(limit: usize, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_idle(ttl)
                .build(),
            limit: limit.max(1),
        }
    }

    /// Appends atomically per user, so concurrent turns never drop each other.
    pub async fn push(&self, user_id: u64, entries: impl IntoIterator<Item = ChatEntry>) {
        let entries: Vec<ChatEntry> = entries.into_iter().collect();
        let limit = self.limit;
        self.cache
            .entry(user_id)
            .and_upsert_with(|current| {
                let mut buf = current.map(|e| e.into_value()).unwrap_or_default();
                for entry in entries {
                    if buf.len() == limit {
                        buf.pop_front();
                    }
                    buf.push_back(entry);
                }
                std::future::ready(buf)
            })
            .await;
    }

    pub async fn get(&self, user_id: u64) -> Vec<ChatEntry> {
        self.cache
            .get(&user_id)
            .await
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub async fn clear(&self, user_id: u64) {
        self.cache.invalidate(&user_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn keeps_only_the_most_recent_entries() {
        let history = ChatHistory::new(20, Duration::from_secs(60));
        for i in 0..25 {
            history.push(1, [ChatEntry::user(format!("m{i}"))]).await;
        }

        let entries = history.get(1).await;
        assert_eq!(entries.len(), 20);
        assert_eq!(entries.first().unwrap().content, "m5");
        assert_eq!(entries.last().unwrap().content, "m24");
    }

    #[actix_web::test]
    async fn users_are_isolated_and_clearable() {
        let history = ChatHistory::new(4, Duration::from_secs(60));
        history
            .push(
                1,
                [
                    ChatEntry::user("hi"),
                    ChatEntry::assistant("Hello!", Intent::Greeting),
                ],
            )
            .await;
        history.push(2, [ChatEntry::user("bye")]).await;

        assert_eq!(history.get(1).await.len(), 2);
        assert_eq!(history.get(2).await.len(), 1);

        history.clear(1).await;
        assert!(history.get(1).await.is_empty());
        assert_eq!(history.get(2).await.len(), 1);
    }

    #[actix_web::test]
    async fn zero_limit_still_keeps_the_last_entry() {
        let history = ChatHistory::new(0, Duration::from_secs(60));
        history.push(9, [ChatEntry::user("a"), ChatEntry::user("b")]).await;
        let entries = history.get(9).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "b");
    }

    #[actix_web::test]
    async fn concurrent_pushes_keep_every_entry() {
        let history = ChatHistory::new(50, Duration::from_secs(60));
        let pushes = (0..16).map(|i| {
            let history = history.clone();
            async move {
                history
                    .push(3, [ChatEntry::user(format!("q{i}")), ChatEntry::assistant("ok", Intent::Help)])
                    .await
            }
        });
        futures::future::join_all(pushes).await;

        let entries = history.get(3).await;
        assert_eq!(entries.len(), 32);
        // each turn's pair stays adjacent
        for pair in entries.chunks(2) {
            assert_eq!(pair[0].role, ChatRole::User);
            assert_eq!(pair[1].role, ChatRole::Assistant);
        }
    }
}

use anyhow::Result;
use futures_util::{TryStreamExt, stream::TryChunksError};
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::utils::email_filter::normalize;

/// Canonical addresses known to be registered. Absence proves nothing.
pub static EMAIL_CACHE: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(500_000)
        .time_to_live(Duration::from_secs(86400)) // 24h TTL
        .build()
});

pub async fn mark_taken(email: &str) {
    EMAIL_CACHE.insert(normalize(email), ()).await;
}

/// Forget an email, e.g. after the account is deleted
pub async fn forget(email: &str) {
    EMAIL_CACHE.invalidate(&normalize(email)).await;
}

/// true when the address, or an alias of it, is known to be registered
pub fn is_taken(email: &str) -> bool {
    EMAIL_CACHE.contains_key(&normalize(email))
}

/// Load the addresses of users seen in the last `days` days.
pub async fn warmup_email_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut chunks = sqlx::query_scalar::<_, String>(
        r#"
        SELECT email
        FROM users
        WHERE last_login_at >= NOW() - INTERVAL ? DAY
        ORDER BY last_login_at DESC
        "#,
    )
    .bind(days)
    .fetch(pool)
    .try_chunks(batch_size.max(1));

    let mut total = 0usize;
    while let Some(batch) = chunks.try_next().await.map_err(|TryChunksError(_, e)| e)? {
        total += batch.len();
        futures::future::join_all(batch.iter().map(String::as_str).map(mark_taken)).await;
    }

    log::info!(
        "Email cache warmup complete: {} recent users (last {} days)",
        total,
        days
    );
    Ok(())
}

use anyhow::Result;
use autoscale_cuckoo_filter::CuckooFilter;
use futures::{TryStreamExt, stream::TryChunksError};
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::{PoisonError, RwLock};

/// Expected capacity and false-positive rate.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Domains delivering to the same mailboxes as another domain.
const DOMAIN_ALIASES: &[(&str, &str)] = &[("googlemail.com", "gmail.com")];

static EMAIL_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

/// Canonical `local@domain`: trimmed and case-folded, the domain without a
/// trailing root dot and with known aliases collapsed. `None` unless the
/// input has exactly one `@`, no whitespace and no empty domain labels.
pub fn canonicalize(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.contains(char::is_whitespace) {
        return None;
    }
    let (local, domain) = email.split_once('@')?;
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    if domain.split('.').any(str::is_empty) {
        return None;
    }
    let domain = DOMAIN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == domain)
        .map_or(domain, |(_, canonical)| canonical);
    Some(format!("{local}@{domain}"))
}

/// Lookup key for an address; malformed input is only trimmed and lowercased
/// so it can never collide with a canonical one.
#[inline]
pub fn normalize(email: &str) -> String {
    canonicalize(email).unwrap_or_else(|| email.trim().to_lowercase())
}

/// Check if an email might be registered (false positives possible)
pub fn might_exist(email: &str) -> bool {
    EMAIL_FILTER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&normalize(email))
}

pub fn insert(email: &str) {
    insert_batch(&[normalize(email)]);
}

/// Remove an email from the filter, e.g. after the account is deleted
pub fn remove(email: &str) {
    EMAIL_FILTER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&normalize(email));
}

/// Streams every registered address into the filter, `batch_size` per write lock.
pub async fn warmup_email_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut chunks = sqlx::query_scalar::<_, String>("SELECT email FROM users")
        .fetch(pool)
        .map_ok(|email| normalize(&email))
        .try_chunks(batch_size.max(1));

    let mut total = 0usize;
    while let Some(batch) = chunks.try_next().await.map_err(|TryChunksError(_, e)| e)? {
        total += batch.len();
        insert_batch(&batch);
    }

    log::info!("Email filter warmup complete: {} users", total);
    Ok(())
}

/// Insert already normalized emails under one lock
fn insert_batch(emails: &[String]) {
    let mut filter = EMAIL_FILTER.write().unwrap_or_else(PoisonError::into_inner);
    for email in emails {
        filter.add(email);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_folds_case_and_domain_aliases() {
        assert_eq!(canonicalize("  Jane.Doe@Example.COM ").as_deref(), Some("jane.doe@example.com"));
        assert_eq!(canonicalize("jane@example.com.").as_deref(), Some("jane@example.com"));
        assert_eq!(canonicalize("Jane@GoogleMail.com").as_deref(), Some("jane@gmail.com"));
        // subaddresses are distinct accounts
        assert_eq!(canonicalize("jane+hr@gmail.com").as_deref(), Some("jane+hr@gmail.com"));
    }

    #[test]
    fn malformed_addresses_have_no_canonical_form() {
        for bad in ["", "jane", "@example.com", "jane@", "jane@.", "a@b@c.com", "ja ne@x.io", "jane@x..io"] {
            assert_eq!(canonicalize(bad), None, "{bad}");
        }
        assert_eq!(normalize("  NOT-AN-EMAIL "), "not-an-email");
    }

    #[test]
    fn aliases_share_one_filter_entry() {
        insert("Filter.Test@googlemail.com");
        assert!(might_exist("filter.test@gmail.com"));
        assert!(might_exist("  FILTER.TEST@GMAIL.COM. "));
    }

    #[test]
    fn removed_email_is_gone() {
        insert("filter.removed@example.com");
        remove("Filter.Removed@Example.com");
        assert!(!might_exist("filter.removed@example.com"));
    }
}

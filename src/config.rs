use anyhow::{Context, Result, anyhow};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_face_login_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub reports_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: tracing::Level,

    /// Maximum number of chat turns kept per user
    pub chat_history_limit: usize,
    pub chat_history_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{key} must be set"))
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            server_addr: lookup("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", true)?,
            access_token_ttl: parse_or(&lookup, "ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parse_or(&lookup, "REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: parse_or(&lookup, "RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: parse_or(&lookup, "RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: parse_or(&lookup, "RATE_REFRESH_PER_MIN", 30)?,
            rate_face_login_per_min: parse_or(&lookup, "RATE_FACE_LOGIN_PER_MIN", 30)?,
            rate_protected_per_min: parse_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            reports_dir: lookup("REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("reports")),
            log_dir: lookup("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            log_level: parse_or(&lookup, "LOG_LEVEL", tracing::Level::INFO)?,

            chat_history_limit: parse_or(&lookup, "CHAT_HISTORY_LIMIT", 20)?,
            chat_history_ttl_secs: parse_or(&lookup, "CHAT_HISTORY_TTL", 86_400)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "mysql://u:p@localhost/att"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(cfg.server_addr, "127.0.0.1:8080");
        assert_eq!(cfg.access_token_ttl, 900);
        assert_eq!(cfg.refresh_token_ttl, 604_800);
        assert_eq!(cfg.api_prefix, "/api");
        assert_eq!(cfg.chat_history_limit, 20);
        assert_eq!(cfg.log_level, tracing::Level::INFO);
        assert!(cfg.run_migrations);
        assert_eq!(cfg.reports_dir, PathBuf::from("reports"));
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("DATABASE_URL", "mysql://x")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn blank_required_value_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "  "),
            ("JWT_SECRET", "s"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn unparsable_number_names_the_key() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "mysql://x"),
            ("JWT_SECRET", "s"),
            ("ACCESS_TOKEN_TTL", "fifteen"),
        ]))
        .unwrap_err();
        assert!(format!("{err:#}").contains("ACCESS_TOKEN_TTL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "mysql://x"),
            ("JWT_SECRET", "s"),
            ("LOG_LEVEL", "debug"),
            ("RUN_MIGRATIONS", "false"),
            ("CHAT_HISTORY_LIMIT", "5"),
            ("API_PREFIX", "/v2"),
        ]))
        .unwrap();

        assert_eq!(cfg.log_level, tracing::Level::DEBUG);
        assert!(!cfg.run_migrations);
        assert_eq!(cfg.chat_history_limit, 5);
        assert_eq!(cfg.api_prefix, "/v2");
    }
}

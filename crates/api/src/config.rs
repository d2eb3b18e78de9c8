use std::path::PathBuf;
use std::str::FromStr;

use tribunal_core::permissions::{AuthorityConfig, DEFAULT_MIN_CREATE_LEVEL};

use crate::auth::jwt::JwtConfig;

/// Where proposals are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Whole collection as one JSON document.
    Json { path: PathBuf },
    Postgres { database_url: String },
}

/// Downstream content API endpoints. Absent means the pipeline is disabled.
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    pub submit_url: String,
    pub inject_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` (`pretty` or `json`, default `pretty`).
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref().map(str::trim) {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long background tasks get to drain after the server stops.
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub store: StoreBackend,
    pub authority_emails: Vec<String>,
    pub authority_user_ids: Vec<String>,
    pub min_create_level: u8,
    pub integration: Option<IntegrationConfig>,
    pub notify_webhook_urls: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                          |
    /// |----------------------------|----------------------------------|
    /// | `HOST`                     | `0.0.0.0`                        |
    /// | `PORT`                     | `3000`                           |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`          |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                             |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                             |
    /// | `JWT_SECRET`               | required                         |
    /// | `STORE_BACKEND`            | `json` (`json` or `postgres`)    |
    /// | `PROPOSAL_STORE_PATH`      | `data/proposals.json`            |
    /// | `DATABASE_URL`             | required for `postgres`          |
    /// | `AUTHORITY_EMAILS`         | empty                            |
    /// | `AUTHORITY_USER_IDS`       | empty                            |
    /// | `MIN_CREATE_LEVEL`         | `5`                              |
    /// | `CONTENT_API_SUBMIT_URL`   | unset (pipeline disabled)        |
    /// | `CONTENT_API_INJECT_URL`   | unset (pipeline disabled)        |
    /// | `CONTENT_API_TIMEOUT_SECS` | `10`                             |
    /// | `NOTIFY_WEBHOOK_URLS`      | empty                            |
    ///
    /// # Panics
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_parse("PORT", 3000);

        let cors_origins = match std::env::var("CORS_ORIGINS") {
            Ok(raw) => split_list(&raw),
            Err(_) => vec!["http://localhost:5173".to_string()],
        };

        let request_timeout_secs: u64 = env_parse("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = env_parse("SHUTDOWN_TIMEOUT_SECS", 30);

        let store = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "json".into())
            .trim()
        {
            "json" => StoreBackend::Json {
                path: std::env::var("PROPOSAL_STORE_PATH")
                    .unwrap_or_else(|_| "data/proposals.json".into())
                    .into(),
            },
            "postgres" => StoreBackend::Postgres {
                database_url: std::env::var("DATABASE_URL")
                    .expect("DATABASE_URL must be set when STORE_BACKEND=postgres"),
            },
            other => panic!("STORE_BACKEND must be 'json' or 'postgres', got '{other}'"),
        };

        let min_create_level: u8 = env_parse("MIN_CREATE_LEVEL", DEFAULT_MIN_CREATE_LEVEL);
        assert!(
            (1..=6).contains(&min_create_level),
            "MIN_CREATE_LEVEL must be between 1 and 6"
        );

        let integration = match (
            env_non_empty("CONTENT_API_SUBMIT_URL"),
            env_non_empty("CONTENT_API_INJECT_URL"),
        ) {
            (Some(submit_url), Some(inject_url)) => Some(IntegrationConfig {
                submit_url,
                inject_url,
                timeout_secs: env_parse("CONTENT_API_TIMEOUT_SECS", 10),
            }),
            (None, None) => None,
            _ => panic!("CONTENT_API_SUBMIT_URL and CONTENT_API_INJECT_URL must be set together"),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt: JwtConfig::from_env(),
            store,
            authority_emails: env_list("AUTHORITY_EMAILS"),
            authority_user_ids: env_list("AUTHORITY_USER_IDS"),
            min_create_level,
            integration,
            notify_webhook_urls: env_list("NOTIFY_WEBHOOK_URLS"),
        }
    }

    pub fn authority_config(&self) -> AuthorityConfig {
        AuthorityConfig::new(
            &self.authority_emails,
            &self.authority_user_ids,
            self.min_create_level,
        )
    }
}

/// Split a comma-separated value, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|raw| split_list(&raw))
        .unwrap_or_default()
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} is invalid: {e}")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_drops_blanks() {
        assert_eq!(
            split_list(" a@b.c, ,D@E.f ,"),
            vec!["a@b.c".to_string(), "D@E.f".to_string()]
        );
        assert!(split_list("").is_empty());
    }
}

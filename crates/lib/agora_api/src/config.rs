//! API server configuration.

use std::time::Duration;

use agora_core::auth::BlacklistPolicy;
use agora_core::auth::jwt::resolve_jwt_secret;

/// Optional administrator account created at startup.
#[derive(Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Redis connection URL.
    pub redis_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Deadline for a single cache call.
    pub cache_timeout: Duration,
    /// Reject tokens when the blacklist cannot be consulted.
    pub blacklist_fail_closed: bool,
    pub admin: Option<AdminBootstrap>,
    pub token_purge_interval: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("cache_timeout", &self.cache_timeout)
            .field("blacklist_fail_closed", &self.blacklist_fail_closed)
            .field("admin", &self.admin)
            .field("token_purge_interval", &self.token_purge_interval)
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                        | Default                           |
    /// |---------------------------------|-----------------------------------|
    /// | `BIND_ADDR`                     | `127.0.0.1:3100`                  |
    /// | `DATABASE_URL`                  | `postgres://localhost:5432/agora` |
    /// | `REDIS_URL`                     | `redis://127.0.0.1:6379`          |
    /// | `JWT_SECRET` / `AUTH_SECRET`    | generated & persisted to file     |
    /// | `CACHE_TIMEOUT_MS`              | `2000`                            |
    /// | `BLACKLIST_FAIL_CLOSED`         | `false`                           |
    /// | `ADMIN_USERNAME` / `ADMIN_EMAIL` / `ADMIN_PASSWORD` | unset (no bootstrap) |
    /// | `TOKEN_PURGE_INTERVAL_SECS`     | `86400`                           |
    pub fn from_env() -> Self {
        let admin = match (
            env_nonempty("ADMIN_USERNAME"),
            env_nonempty("ADMIN_EMAIL"),
            env_nonempty("ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(AdminBootstrap {
                username,
                email,
                password,
            }),
            _ => None,
        };

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/agora".into()),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_secret: resolve_jwt_secret(),
            cache_timeout: Duration::from_millis(env_parse("CACHE_TIMEOUT_MS", 2000)),
            blacklist_fail_closed: std::env::var("BLACKLIST_FAIL_CLOSED")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            admin,
            token_purge_interval: Duration::from_secs(env_parse(
                "TOKEN_PURGE_INTERVAL_SECS",
                86_400,
            )),
        }
    }

    pub fn blacklist_policy(&self) -> BlacklistPolicy {
        if self.blacklist_fail_closed {
            BlacklistPolicy::FailClosed
        } else {
            BlacklistPolicy::FailOpen
        }
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(name, value = %raw, default, "ignoring unparseable setting");
            default
        }),
        Err(_) => default,
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn debug_hides_secrets() {
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".into(),
            pg_connection_url: "postgres://u:hunter2@db/agora".into(),
            redis_url: "redis://127.0.0.1:6379".into(),
            jwt_secret: "top-secret".into(),
            cache_timeout: Duration::from_secs(2),
            blacklist_fail_closed: false,
            admin: Some(AdminBootstrap {
                username: "admin".into(),
                email: "admin@x.com".into(),
                password: "adminpw1".into(),
            }),
            token_purge_interval: Duration::from_secs(60),
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("top-secret"));
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("adminpw1"));
        assert_eq!(config.blacklist_policy(), BlacklistPolicy::FailOpen);
    }
}

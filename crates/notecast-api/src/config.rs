//! Server configuration, read from `NOTECAST_*` environment variables.

use std::path::PathBuf;

use anyhow::{Context, bail};
use tracing::warn;

/// JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Production,
    Development,
}

impl RunMode {
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub mode: RunMode,
    pub media_dir: PathBuf,
    /// Base URL stored media links are built from.
    pub public_url: String,
    pub mail_webhook: Option<String>,
    pub mail_from: String,
    /// UTC hour the daily digest goes out.
    pub digest_hour: u32,
    /// Accounts promoted to admin at startup.
    pub admin_emails: Vec<String>,
}

impl ApiConfig {
    /// Reads configuration from the process environment.
    ///
    /// | Variable                  | Default                  |
    /// |---------------------------|--------------------------|
    /// | `NOTECAST_HOST`           | `0.0.0.0`                |
    /// | `NOTECAST_PORT`           | `3000`                   |
    /// | `NOTECAST_DB_PATH`        | `notecast.db`            |
    /// | `NOTECAST_JWT_SECRET`     | required in production   |
    /// | `NOTECAST_TOKEN_TTL_SECS` | `2592000` (30 days)      |
    /// | `NOTECAST_ENV`            | `production`             |
    /// | `NOTECAST_MEDIA_DIR`      | `./media`                |
    /// | `NOTECAST_PUBLIC_URL`     | `http://localhost:3000`  |
    /// | `NOTECAST_MAIL_WEBHOOK`   | unset (mail is logged)   |
    /// | `NOTECAST_MAIL_FROM`      | `Notecast`               |
    /// | `NOTECAST_DIGEST_HOUR`    | `4`                      |
    /// | `NOTECAST_ADMIN_EMAILS`   | empty                    |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading through `lookup` instead of the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mode = match var("NOTECAST_ENV", "production").as_str() {
            "production" => RunMode::Production,
            "development" => RunMode::Development,
            other => bail!("NOTECAST_ENV must be 'production' or 'development', got '{}'", other),
        };

        let jwt_secret = lookup("NOTECAST_JWT_SECRET").unwrap_or_default();
        let jwt_secret = if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            if mode == RunMode::Production {
                bail!("NOTECAST_JWT_SECRET is unset or still a placeholder");
            }
            warn!("NOTECAST_JWT_SECRET not set, using the development secret");
            DEV_SECRET.to_string()
        } else {
            jwt_secret
        };

        let port: u16 = var("NOTECAST_PORT", "3000")
            .parse()
            .context("NOTECAST_PORT must be a port number")?;

        let ttl_secs: i64 = var("NOTECAST_TOKEN_TTL_SECS", "2592000")
            .parse()
            .context("NOTECAST_TOKEN_TTL_SECS must be a number of seconds")?;
        if ttl_secs <= 0 {
            bail!("NOTECAST_TOKEN_TTL_SECS must be positive");
        }

        let digest_hour: u32 = var("NOTECAST_DIGEST_HOUR", "4")
            .parse()
            .context("NOTECAST_DIGEST_HOUR must be an hour (0-23)")?;
        if digest_hour > 23 {
            bail!("NOTECAST_DIGEST_HOUR must be between 0 and 23");
        }

        let admin_emails = lookup("NOTECAST_ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            host: var("NOTECAST_HOST", "0.0.0.0"),
            port,
            db_path: var("NOTECAST_DB_PATH", "notecast.db").into(),
            jwt_secret,
            token_ttl: chrono::Duration::seconds(ttl_secs),
            mode,
            media_dir: var("NOTECAST_MEDIA_DIR", "./media").into(),
            public_url: var("NOTECAST_PUBLIC_URL", "http://localhost:3000"),
            mail_webhook: lookup("NOTECAST_MAIL_WEBHOOK").filter(|u| !u.is_empty()),
            mail_from: var("NOTECAST_MAIL_FROM", "Notecast"),
            digest_hour,
            admin_emails,
        })
    }
}

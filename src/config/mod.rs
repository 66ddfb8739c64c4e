//! Configuration module for wplive.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::errors::AppError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// sqlx connection URL (`mysql://...` or `sqlite:...`)
    pub database_url: String,
    /// Table prefix, `wp` by default
    pub table_prefix: String,
    /// Schema qualifier prepended to every table name
    pub database: Option<String>,
    /// Multisite blog id appended to the prefix
    pub blog_id: Option<i64>,
    /// Delay between two polls
    pub poll_interval: Duration,
    /// Option names to load; all options when unset
    pub option_keys: Option<Vec<String>>,
    /// Post meta keys to load with every post
    pub postmeta_keys: Vec<String>,
    /// Offset used to bucket posts into archive months
    pub archive_offset: FixedOffset,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/wordpress.sqlite?mode=rwc".to_string(),
            table_prefix: "wp".to_string(),
            database: None,
            blog_id: None,
            poll_interval: Duration::from_secs(60),
            option_keys: None,
            postmeta_keys: Vec::new(),
            archive_offset: Utc.fix(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let database_url = env::var("WP_DATABASE_URL").unwrap_or(defaults.database_url);
        let table_prefix = env::var("WP_TABLE_PREFIX").unwrap_or(defaults.table_prefix);
        let database = env::var("WP_DATABASE").ok().filter(|s| !s.is_empty());

        let blog_id = match env::var("WP_BLOG_ID") {
            Ok(value) => Some(parse_number::<i64>("WP_BLOG_ID", &value)?),
            Err(_) => None,
        };

        let poll_interval = match env::var("WP_POLL_INTERVAL_SECS") {
            Ok(value) => Duration::from_secs(parse_number("WP_POLL_INTERVAL_SECS", &value)?),
            Err(_) => defaults.poll_interval,
        };

        let option_keys = env::var("WP_OPTION_KEYS").ok().map(|s| split_list(&s));
        let postmeta_keys = env::var("WP_POSTMETA_KEYS")
            .map(|s| split_list(&s))
            .unwrap_or_default();

        let archive_offset = match env::var("WP_ARCHIVE_UTC_OFFSET_SECS") {
            Ok(value) => {
                let secs = parse_number::<i32>("WP_ARCHIVE_UTC_OFFSET_SECS", &value)?;
                FixedOffset::east_opt(secs).ok_or_else(|| {
                    AppError::Config(format!("WP_ARCHIVE_UTC_OFFSET_SECS out of range: {}", secs))
                })?
            }
            Err(_) => defaults.archive_offset,
        };

        let log_level = env::var("WP_LOG_LEVEL").unwrap_or(defaults.log_level);
        let log_format = match env::var("WP_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("text") | Err(_) => LogFormat::Text,
            Ok(other) => {
                return Err(AppError::Config(format!(
                    "Invalid WP_LOG_FORMAT: {} (expected text or json)",
                    other
                )))
            }
        };

        Ok(Self {
            database_url,
            table_prefix,
            database,
            blog_id,
            poll_interval,
            option_keys,
            postmeta_keys,
            archive_offset,
            log_level,
            log_format,
        })
    }

    /// Prefix of the network-wide tables: `[<database>.]<prefix>`.
    pub fn network_prefix(&self) -> String {
        match &self.database {
            Some(database) => format!("{}.{}", database, self.table_prefix),
            None => self.table_prefix.clone(),
        }
    }

    /// Full table prefix: `[<database>.]<prefix>[_<blog id>]`.
    pub fn qualified_prefix(&self) -> String {
        let mut prefix = self.network_prefix();
        if let Some(id) = self.blog_id {
            prefix.push_str(&format!("_{}", id));
        }
        prefix
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("Invalid {}: {}", name, value)))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

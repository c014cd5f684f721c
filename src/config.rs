//! Runtime configuration.
//!
//! Every value has a default; environment variables prefixed with
//! `STOCKSCREENER_` override them at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const APP_DIR: &str = "stockscreener";

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file holding the watchlist table.
    pub db_path: PathBuf,
    /// File that receives log records while the UI owns the terminal.
    pub log_path: PathBuf,
    /// Interval between target-price checks.
    pub check_interval: Duration,
    /// Timeout applied to every market-data request.
    pub http_timeout: Duration,
    /// How long fetched quote metadata stays valid.
    pub cache_ttl: Duration,
    /// Maximum number of symbols kept in the metadata cache.
    pub cache_capacity: usize,
    /// Market-data API root.
    pub base_url: String,
    pub user_agent: String,
    /// Environment overrides that failed to parse and were ignored, as
    /// `KEY='value'`. Logged once the logger is up.
    pub rejected: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_path: data_dir.join("watchlist.db"),
            log_path: data_dir.join("stockscreener.log"),
            check_interval: Duration::from_secs(60),
            http_timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(15 * 60),
            cache_capacity: 256,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36".to_string(),
            rejected: Vec::new(),
        }
    }
}

impl Config {
    /// Defaults overlaid with any `STOCKSCREENER_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(path) = env_var("STOCKSCREENER_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(path) = env_var("STOCKSCREENER_LOG_PATH") {
            config.log_path = PathBuf::from(path);
        }
        if let Some(secs) = config.parse_env::<u64>("STOCKSCREENER_CHECK_INTERVAL_SECS") {
            config.check_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = config.parse_env::<u64>("STOCKSCREENER_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = config.parse_env::<u64>("STOCKSCREENER_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = config.parse_env::<usize>("STOCKSCREENER_CACHE_CAPACITY") {
            config.cache_capacity = capacity.max(1);
        }
        if let Some(url) = env_var("STOCKSCREENER_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        config
    }

    fn parse_env<T: std::str::FromStr>(&mut self, key: &str) -> Option<T> {
        let raw = env_var(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.rejected.push(format!("{}='{}'", key, raw));
                None
            }
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub backend: StorageBackend,
    pub timeout_ms: u64,
}

impl Default for Storage {
    fn default() -> Self {
        Storage {
            backend: StorageBackend::Postgres,
            timeout_ms: 5_000,
        }
    }
}

impl Storage {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Rewards {
    pub daily_bonus: i64,
    pub welcome_bonus: i64,
}

impl Default for Rewards {
    fn default() -> Self {
        Rewards {
            daily_bonus: 10,
            welcome_bonus: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Leaderboard {
    pub default_limit: u32,
    pub max_limit: u32,
    pub refresh_secs: u64,
}

impl Default for Leaderboard {
    fn default() -> Self {
        Leaderboard {
            default_limit: 10,
            max_limit: 100,
            refresh_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct History {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for History {
    fn default() -> Self {
        History {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Per-client fixed window in front of every route.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
    /// Key clients by the last `X-Forwarded-For` hop instead of the peer address.
    pub trust_proxy: bool,
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit {
            enabled: true,
            max_requests: 100,
            window_secs: 15 * 60,
            trust_proxy: false,
        }
    }
}

impl RateLimit {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: Storage,
    pub postgres: Option<Postgres>,
    #[serde(default)]
    pub rewards: Rewards,
    #[serde(default)]
    pub leaderboard: Leaderboard,
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub rate_limit: RateLimit,
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("VITACOIN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageBackend::Postgres && self.postgres.is_none() {
            return Err(ConfigError::Message(
                "postgres.url is required for the postgres storage backend".to_string(),
            ));
        }
        if self.rewards.daily_bonus <= 0 {
            return Err(ConfigError::Message(
                "rewards.daily_bonus must be positive".to_string(),
            ));
        }
        if self.rewards.welcome_bonus < 0 {
            return Err(ConfigError::Message(
                "rewards.welcome_bonus must not be negative".to_string(),
            ));
        }
        if self.leaderboard.max_limit == 0 || self.history.max_page_size == 0 {
            return Err(ConfigError::Message(
                "leaderboard.max_limit and history.max_page_size must be positive".to_string(),
            ));
        }
        if !(1..=self.leaderboard.max_limit).contains(&self.leaderboard.default_limit) {
            return Err(ConfigError::Message(format!(
                "leaderboard.default_limit must be between 1 and {}",
                self.leaderboard.max_limit
            )));
        }
        if !(1..=self.history.max_page_size).contains(&self.history.default_page_size) {
            return Err(ConfigError::Message(format!(
                "history.default_page_size must be between 1 and {}",
                self.history.max_page_size
            )));
        }
        if self.rate_limit.enabled
            && (self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0)
        {
            return Err(ConfigError::Message(
                "rate_limit.max_requests and rate_limit.window_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

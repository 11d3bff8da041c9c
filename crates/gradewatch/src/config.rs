use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

pub const DEFAULT_REFRESH_MIN_SECS: u64 = 300;
pub const DEFAULT_REFRESH_MAX_SECS: u64 = 600;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_STATE_FILE: &str = "seen.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Refresh minimum ({min}s) cannot exceed refresh maximum ({max}s)")]
    RefreshRange { min: u64, max: u64 },
    #[error("Failure threshold must be greater than 0")]
    FailureThreshold,
}

/// Settings for one watcher run, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub login_url: String,
    pub username: String,
    pub password: String,
    pub target_term: String,
    pub refresh_min_secs: u64,
    pub refresh_max_secs: u64,
    pub discord_webhook: String,
    pub state_file: PathBuf,
    pub webdriver_url: String,
    pub headless: bool,
    pub failure_threshold: u32,
    pub retry_delay: Duration,
}

impl Config {
    pub fn validate(self) -> Result<Self, ConfigError> {
        let required = [
            ("LOGIN_URL", &self.login_url),
            ("USER", &self.username),
            ("PASS", &self.password),
            ("TARGET_TERM_TEXT", &self.target_term),
            ("DISCORD_WEBHOOK", &self.discord_webhook),
        ];
        if let Some((name, _)) = required.into_iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConfigError::Missing(name));
        }
        if self.refresh_min_secs > self.refresh_max_secs {
            return Err(ConfigError::RefreshRange {
                min: self.refresh_min_secs,
                max: self.refresh_max_secs,
            });
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::FailureThreshold);
        }
        Ok(self)
    }

    /// A uniformly random wait between the configured refresh bounds.
    pub fn refresh_interval(&self) -> Duration {
        let secs = rand::rng().random_range(self.refresh_min_secs..=self.refresh_max_secs);
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        login_url: "https://reg.example.ac.th/login".to_string(),
        username: "6401234567".to_string(),
        password: "secret".to_string(),
        target_term: "ภาคการศึกษาที่ 1/2568".to_string(),
        refresh_min_secs: DEFAULT_REFRESH_MIN_SECS,
        refresh_max_secs: DEFAULT_REFRESH_MAX_SECS,
        discord_webhook: "https://discord.com/api/webhooks/1/abc".to_string(),
        state_file: PathBuf::from(DEFAULT_STATE_FILE),
        webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
        headless: true,
        failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        retry_delay: DEFAULT_RETRY_DELAY,
    }
}

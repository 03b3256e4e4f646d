use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub telegram_api_url: String,
    pub image_path: PathBuf,
    pub max_jitter: Duration,
    pub phone_lookup: bool,
    pub phone_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment and `.env`
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_token = lookup("TOKEN").unwrap_or_default();
        if telegram_token.trim().is_empty() {
            bail!("TOKEN must be set");
        }

        Ok(Self {
            telegram_token,
            telegram_api_url: lookup("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            image_path: lookup("IMAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("images/image.png")),
            max_jitter: Duration::from_secs(
                lookup("POLL_JITTER_SECS")
                    .unwrap_or_else(|| "120".to_string())
                    .parse()
                    .context("POLL_JITTER_SECS must be a number of seconds")?,
            ),
            phone_lookup: lookup("PHONE_LOOKUP")
                .unwrap_or_else(|| "true".to_string())
                .parse()
                .context("PHONE_LOOKUP must be true or false")?,
            phone_timeout: Duration::from_secs(
                lookup("PHONE_LOOKUP_TIMEOUT_SECS")
                    .unwrap_or_else(|| "20".to_string())
                    .parse()
                    .context("PHONE_LOOKUP_TIMEOUT_SECS must be a number of seconds")?,
            ),
        })
    }
}

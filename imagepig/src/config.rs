use serde::Deserialize;
use std::{fmt, fs, path::Path, time::Duration};

use crate::{Error, Result};

pub const API_URL: &str = "https://api.imagepig.com";
pub const MAX_ATTEMPTS: u32 = 10;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: String,
    /// Base URL every endpoint is appended to. Trailing slashes are ignored.
    pub api_url: String,
    /// Fail on non-200 API responses instead of handing them back.
    pub raise_on_http_error: bool,
    /// Download attempts for an image that is not there yet, at least one.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: API_URL.to_owned(),
            raise_on_http_error: true,
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn raise_on_http_error(mut self, raise: bool) -> Self {
        self.raise_on_http_error = raise;
        self
    }

    /// `max_attempts` below one is raised to one.
    pub fn retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("raise_on_http_error", &self.raise_on_http_error)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawConfig {
    api_key: String,
    api_url: Option<String>,
    raise_on_http_error: Option<bool>,
    max_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
}

pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let s = fs::read_to_string(path)?;
    from_str(&s)
}

pub fn from_str(s: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(s)?;
    let mut config = Config::new(raw.api_key);
    if let Some(api_url) = raw.api_url {
        config = config.api_url(api_url);
    }
    if let Some(raise) = raw.raise_on_http_error {
        config.raise_on_http_error = raise;
    }
    if let Some(max_attempts) = raw.max_attempts {
        if max_attempts == 0 {
            return Err(Error::InvalidArgument("max_attempts must be at least 1".into()));
        }
        config.max_attempts = max_attempts;
    }
    if let Some(ms) = raw.retry_delay_ms {
        config.retry_delay = Duration::from_millis(ms);
    }
    Ok(config)
}

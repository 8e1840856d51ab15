use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

pub const APP_NAME: &str = "chatai";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5678";
pub const DEFAULT_CHAT_ENDPOINT: &str = "/webhook/chat";

const ENV_BACKEND_URL: &str = "CHATAI_BACKEND_URL";
const ENV_CHAT_ENDPOINT: &str = "CHATAI_CHAT_ENDPOINT";
const ENV_TIMEOUT_SECS: &str = "CHATAI_TIMEOUT_SECS";
const ENV_DATA_DIR: &str = "CHATAI_DATA_DIR";

/// Where the webhook lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeConfig {
    pub backend_url: String,
    pub chat_endpoint: String,
    /// `None` leaves the transport's own behaviour in charge.
    pub timeout: Option<Duration>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            chat_endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            timeout: None,
        }
    }
}

impl ExchangeConfig {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            ..Default::default()
        }
    }

    /// Full webhook URL: the endpoint path appended verbatim to the base.
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.backend_url, self.chat_endpoint)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.chat_url())
            .with_context(|| format!("Invalid chat URL: {}", self.chat_url()))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Unsupported scheme '{}' in chat URL", url.scheme());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub data_dir: PathBuf,
}

impl AppConfig {
    /// Read configuration from the environment, using the built-in default
    /// for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut exchange = match non_empty(ENV_BACKEND_URL) {
            Some(url) => ExchangeConfig::new(url),
            None => ExchangeConfig::default(),
        };
        if let Some(endpoint) = non_empty(ENV_CHAT_ENDPOINT) {
            exchange.chat_endpoint = endpoint;
        }
        if let Some(secs) = non_empty(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", ENV_TIMEOUT_SECS))?;
            exchange.timeout = Some(Duration::from_secs(secs));
        }
        exchange.validate()?;

        let data_dir = match non_empty(ENV_DATA_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(&lookup)?,
        };

        Ok(Self { exchange, data_dir })
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", APP_NAME))
    }
}

fn default_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    let base = match lookup("XDG_DATA_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let Some(home) = lookup("HOME") else {
                bail!("Neither {}, XDG_DATA_HOME nor HOME is set", ENV_DATA_DIR);
            };
            PathBuf::from(home).join(".local/share")
        }
    };
    Ok(base.join(APP_NAME))
}

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::time::Duration;

use crate::errors::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RATE_LIMIT: u32 = 50;
const DEFAULT_AUTH_HEADER: &str = "x-api-key";
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// The remote service a client talks to.
///
/// The profile only decides the default base URL and which environment
/// variable prefix is consulted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// The print/mail API (postcards, letters, templates).
    PrintMail,
    /// The streaming-avatar API (streaming sessions).
    StreamingAvatar,
}

impl Service {
    /// Base URL used when none is configured.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Service::PrintMail => "https://api.postgrid.com/print-mail/v1",
            Service::StreamingAvatar => "https://api.heygen.com/v1",
        }
    }

    /// Prefix for service-specific variables, e.g. `PRINTMAIL_API_KEY`.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Service::PrintMail => "PRINTMAIL",
            Service::StreamingAvatar => "STREAMING",
        }
    }
}

/// Resolved client configuration. Immutable once built.
#[derive(Clone)]
pub struct Config {
    /// Sent on every request in `auth_header`.
    pub api_key: String,
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Extra attempts after the first one for transient failures.
    pub max_retries: u32,
    /// Requests per rolling window. `0` turns local throttling off.
    pub rate_limit: u32,
    /// Length of the rolling rate-limit window.
    pub rate_limit_window: Duration,
    /// Header that carries the API key.
    pub auth_header: String,
    /// Delay before the first retry; doubled for each later one.
    pub retry_base_delay: Duration,
    /// Upper bound for any retry delay.
    pub retry_max_delay: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("rate_limit", &self.rate_limit)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("auth_header", &self.auth_header)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("retry_max_delay", &self.retry_max_delay)
            .finish()
    }
}

impl Config {
    /// Start building a configuration for `service`.
    pub fn builder(service: Service) -> ConfigBuilder {
        ConfigBuilder::new(service)
    }

    /// Load everything from the environment (and `.env`, if present).
    pub fn from_env(service: Service) -> Result<Self> {
        ConfigBuilder::new(service).build()
    }
}

/// Collects explicit settings; anything left unset is read from the
/// environment, then falls back to the service defaults.
///
/// Lookup order per setting: explicit value, `<PREFIX>_<NAME>`, `<NAME>`,
/// default.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    service: Service,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    rate_limit: Option<u32>,
    rate_limit_window: Duration,
    auth_header: String,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
}

impl ConfigBuilder {
    /// Nothing set explicitly yet.
    pub fn new(service: Service) -> Self {
        Self {
            service,
            api_key: None,
            base_url: None,
            timeout: None,
            max_retries: None,
            rate_limit: None,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }

    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the service's default base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Per-request timeout (defaults to 30 seconds).
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    /// Retries for transient failures (defaults to 3).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Requests allowed per window (one minute unless overridden).
    pub fn rate_limit(mut self, per_window: u32) -> Self {
        self.rate_limit = Some(per_window);
        self
    }

    /// Length of the rolling window (defaults to one minute).
    pub fn rate_limit_window(mut self, window: Duration) -> Self {
        self.rate_limit_window = window;
        self
    }

    /// Header carrying the API key (defaults to `x-api-key`).
    pub fn auth_header(mut self, name: impl Into<String>) -> Self {
        self.auth_header = name.into();
        self
    }

    /// First retry delay and the cap for the doubling backoff.
    pub fn retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    /// Resolve against the process environment, then a `.env` file in the
    /// working directory if there is one.
    ///
    /// The file is only read; the process environment is never modified.
    /// A malformed file is an [`Error::Config`].
    pub fn build(self) -> Result<Config> {
        let file = read_dotenv()?;
        self.build_with(|name| std::env::var(name).ok().or_else(|| file.get(name).cloned()))
    }

    /// Resolve against an arbitrary variable lookup.
    pub fn build_with<F>(self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = self.service.env_prefix();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let var = |name: &str| get(&format!("{prefix}_{name}")).or_else(|| get(name));

        let api_key = self.api_key.or_else(|| var("API_KEY")).ok_or_else(|| {
            Error::Config(format!(
                "API key is required. Set it on the builder or via the \
                 {prefix}_API_KEY or API_KEY environment variable."
            ))
        })?;

        let base_url = self
            .base_url
            .or_else(|| var("BASE_URL"))
            .unwrap_or_else(|| self.service.default_base_url().to_string());

        let timeout = match self.timeout {
            Some(t) => t,
            None => var("TIMEOUT")
                .map(|v| parse_number::<u64>("TIMEOUT", &v).map(Duration::from_secs))
                .transpose()?
                .unwrap_or(DEFAULT_TIMEOUT),
        };

        let max_retries = match self.max_retries {
            Some(n) => n,
            None => var("MAX_RETRIES")
                .map(|v| parse_number("MAX_RETRIES", &v))
                .transpose()?
                .unwrap_or(DEFAULT_MAX_RETRIES),
        };

        let rate_limit = match self.rate_limit {
            Some(n) => n,
            None => var("RATE_LIMIT")
                .map(|v| parse_number("RATE_LIMIT", &v))
                .transpose()?
                .unwrap_or(DEFAULT_RATE_LIMIT),
        };

        if self.auth_header.is_empty() {
            return Err(Error::Config("auth header name must not be empty".into()));
        }

        Ok(Config {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries,
            rate_limit,
            rate_limit_window: self.rate_limit_window,
            auth_header: self.auth_header,
            retry_base_delay: self.retry_base_delay,
            retry_max_delay: self.retry_max_delay,
        })
    }
}

/// Variables from `.env`, or none when the file does not exist.
fn read_dotenv() -> Result<HashMap<String, String>> {
    match dotenvy::dotenv_iter() {
        Ok(iter) => collect_dotenv(iter),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(Error::Config(format!("cannot read .env file: {e}"))),
    }
}

fn collect_dotenv<R: Read>(iter: dotenvy::Iter<R>) -> Result<HashMap<String, String>> {
    iter.map(|item| item.map_err(|e| Error::Config(format!("invalid .env file: {e}"))))
        .collect()
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got {raw:?}")))
}

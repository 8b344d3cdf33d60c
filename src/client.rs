use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::{Config, ConfigBuilder, Service};
use crate::errors::{ApiError, Details, Error, Result};
use crate::rate_limit::RateLimiter;

/// Builder for constructing a [`Client`] with custom configuration.
///
/// Settings left unset are read from the environment (see
/// [`ConfigBuilder`]) and then fall back to the service defaults.
///
/// # Example
///
/// ```no_run
/// use printstream::{ClientBuilder, Service};
/// use std::time::Duration;
///
/// # fn example() -> printstream::Result<()> {
/// let client = ClientBuilder::new(Service::PrintMail)
///     .api_key("test_sk_abc123")
///     .max_retries(5)
///     .rate_limit(30)
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: ConfigBuilder,
}

impl ClientBuilder {
    /// Create a builder with the defaults of `service`.
    pub fn new(service: Service) -> Self {
        Self {
            config: ConfigBuilder::new(service),
        }
    }

    /// Set the API key (otherwise read from the environment).
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config = self.config.api_key(key);
        self
    }

    /// Override the service's default base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config = self.config.base_url(url);
        self
    }

    /// Per-request timeout (defaults to 30 seconds).
    pub fn timeout(mut self, d: Duration) -> Self {
        self.config = self.config.timeout(d);
        self
    }

    /// Retries for transient failures (defaults to 3).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config = self.config.max_retries(n);
        self
    }

    /// Requests per minute (defaults to 50, `0` disables throttling).
    pub fn rate_limit(mut self, per_minute: u32) -> Self {
        self.config = self.config.rate_limit(per_minute);
        self
    }

    /// Length of the rolling window the rate limit applies to.
    pub fn rate_limit_window(mut self, window: Duration) -> Self {
        self.config = self.config.rate_limit_window(window);
        self
    }

    /// Header carrying the API key (defaults to `x-api-key`).
    pub fn auth_header(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.auth_header(name);
        self
    }

    /// Initial retry delay and its cap (defaults to 1s and 30s).
    pub fn retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.config = self.config.retry_backoff(base, max);
        self
    }

    /// Resolve the configuration and open the HTTP session.
    ///
    /// Returns [`Error::Config`] if no API key is available.
    pub fn build(self) -> Result<Client> {
        Client::new(self.config.build()?)
    }
}

/// Extra per-request parameters for [`Client::send`].
///
/// ```
/// use printstream::RequestOptions;
/// use serde_json::json;
///
/// let opts = RequestOptions::new()
///     .query("limit", "10")
///     .query("skip", "20")
///     .body(json!({ "description": "spring campaign" }));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    body: Option<Value>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

impl RequestOptions {
    /// No body, query parameters or extra headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `body` as the JSON request body.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` and send it as the JSON request body.
    pub fn json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self> {
        Ok(self.body(serde_json::to_value(body)?))
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header on top of the client's defaults.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Async client for one of the remote APIs.
///
/// Cloning is cheap; clones share the connection pool and the rate-limit
/// budget. The HTTP session is released when the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// use printstream::{Client, ListResponse, Service};
/// use serde_json::Value;
///
/// # async fn example() -> printstream::Result<()> {
/// let client = Client::builder(Service::PrintMail).api_key("test_sk_abc123").build()?;
///
/// let page: ListResponse<Value> = client.get("/postcards").await?;
/// println!("{} of {} postcards", page.len(), page.total_count);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    config: Config,
    http: reqwest::Client,
    limiter: RateLimiter,
}

/// Why the previous attempt failed, kept until retries run out.
enum Failure {
    Api(ApiError),
    Transport(reqwest::Error),
}

impl Client {
    /// Shorthand for [`ClientBuilder::new`].
    pub fn builder(service: Service) -> ClientBuilder {
        ClientBuilder::new(service)
    }

    /// Build a client entirely from the environment.
    pub fn from_env(service: Service) -> Result<Self> {
        ClientBuilder::new(service).build()
    }

    /// Open an HTTP session for an already resolved configuration.
    pub fn new(config: Config) -> Result<Self> {
        Url::parse(&config.base_url)?;

        let name = HeaderName::from_bytes(config.auth_header.as_bytes())
            .map_err(|_| Error::Config(format!("invalid header name {:?}", config.auth_header)))?;
        let mut key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| Error::Config("API key contains invalid header characters".into()))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(name, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("printstream/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        let limiter = RateLimiter::new(config.rate_limit, config.rate_limit_window);

        tracing::debug!(
            base_url = %config.base_url,
            max_retries = config.max_retries,
            rate_limit = config.rate_limit,
            "Client session opened"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                limiter,
            }),
        })
    }

    /// The resolved configuration this client runs with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Drop this handle and log it.
    ///
    /// Equivalent to `drop(client)`. The HTTP session itself is released
    /// when the last clone goes away.
    pub fn close(self) {
        tracing::debug!(base_url = %self.inner.config.base_url, "Client handle closed");
    }

    /// `GET` an endpoint and parse the body into `T`.
    ///
    /// Use `serde_json::Value` for the raw body.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.send(Method::GET, endpoint, RequestOptions::new()).await
    }

    /// `POST` a JSON body and parse the response into `T`.
    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::POST, endpoint, RequestOptions::new().json(body)?)
            .await
    }

    /// `PUT` a JSON body and parse the response into `T`.
    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::PUT, endpoint, RequestOptions::new().json(body)?)
            .await
    }

    /// `DELETE` an endpoint.
    ///
    /// Empty bodies parse as JSON `null`, so `()` or `Option<_>` are the
    /// usual targets.
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.send(Method::DELETE, endpoint, RequestOptions::new())
            .await
    }

    /// Issue a request and translate the outcome.
    ///
    /// Success bodies are parsed into `T`; an empty body is JSON `null` and a
    /// non-JSON body is `{"text": "<body>"}`. Failure statuses become an
    /// [`ApiError`] of the matching kind.
    ///
    /// # Errors
    ///
    /// - [`Error::Api`] for any non-success status, after retries for 429
    ///   and 5xx.
    /// - [`Error::Api`] of the generic kind when transport failures outlast
    ///   the retries.
    /// - [`Error::Http`] if a success response's body cannot be read. The
    ///   request is not resent.
    /// - [`Error::InvalidUrl`] if `endpoint` cannot be joined to the base URL.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        opts: RequestOptions,
    ) -> Result<T> {
        let url = self.url(endpoint)?;
        let value = self.execute(method, url, &opts).await?;
        parse_target(value)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Absolute endpoints pass through untouched.
    fn url(&self, endpoint: &str) -> Result<Url> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(Url::parse(endpoint)?);
        }
        let path = endpoint.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", self.inner.config.base_url, path))?)
    }

    /// Dispatch with rate limiting and retries.
    ///
    /// 429, 5xx and failures to get any response are retried up to
    /// `max_retries` times with doubling delays; other statuses return at
    /// once. A success status is final even if its body cannot be read.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        opts: &RequestOptions,
    ) -> Result<Option<Value>> {
        let config = &self.inner.config;
        let mut last: Option<Failure> = None;
        let mut retry_after: Option<Duration> = None;

        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt, retry_after.take());
                tracing::warn!(
                    method = %method,
                    url = %url,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }

            self.inner.limiter.acquire().await;
            tracing::debug!(method = %method, url = %url, attempt, "Dispatching request");

            let mut req = self
                .inner
                .http
                .request(method.clone(), url.clone())
                .headers(opts.headers.clone());
            if !opts.query.is_empty() {
                req = req.query(&opts.query);
            }
            if let Some(ref body) = opts.body {
                req = req.json(body);
            }

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) if e.is_builder() => return Err(Error::Http(e)),
                Err(e) => {
                    last = Some(Failure::Transport(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                // The server already accepted the request; never resend it.
                return read_body(response).await.map_err(Error::Http);
            }

            retry_after = parse_retry_after(response.headers());
            let err = error_from_response(response, retry_after).await;
            if !err.is_retryable() {
                return Err(err.into());
            }
            last = Some(Failure::Api(err));
        }

        // All retries exhausted.
        Err(match last {
            Some(Failure::Api(err)) => err.into(),
            Some(Failure::Transport(e)) => {
                let mut details = Details::new();
                details.insert("cause".into(), Value::String(e.to_string()));
                ApiError::api()
                    .with_message("Max retries exceeded")
                    .with_details(details)
                    .with_source(e)
                    .into()
            }
            None => ApiError::api()
                .with_message("Request failed after multiple retries")
                .into(),
        })
    }

    /// Delay before retry number `attempt` (1-based).
    fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let config = &self.inner.config;
        let exp = attempt.saturating_sub(1).min(16);
        let computed = config
            .retry_base_delay
            .saturating_mul(1 << exp)
            .min(config.retry_max_delay);
        match retry_after {
            Some(hint) => hint.min(config.retry_max_delay).max(computed),
            None => computed,
        }
    }
}

/// Read a success body. Empty bodies are `None`.
async fn read_body(
    response: reqwest::Response,
) -> std::result::Result<Option<Value>, reqwest::Error> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(None);
    }

    if is_json {
        if let Ok(value) = serde_json::from_str(&text) {
            return Ok(Some(value));
        }
    }
    Ok(Some(json!({ "text": text })))
}

fn parse_target<T: DeserializeOwned>(value: Option<Value>) -> Result<T> {
    serde_json::from_value(value.unwrap_or(Value::Null)).map_err(|e| {
        tracing::error!(error = %e, "Failed to validate response");
        let mut details = Details::new();
        details.insert("errors".into(), Value::String(e.to_string()));
        ApiError::validation()
            .with_message("Invalid response format from API")
            .with_details(details)
            .into()
    })
}

/// `Retry-After` in delta-seconds form. HTTP dates are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Classify a failed response and carry its body along as details.
async fn error_from_response(
    response: reqwest::Response,
    retry_after: Option<Duration>,
) -> ApiError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let parsed: Option<Value> = serde_json::from_str(&text).ok();

    let mut err = ApiError::from_status(status);
    if let Some(message) = parsed.as_ref().and_then(error_message) {
        err = err.with_message(message);
    }

    let details = match parsed {
        Some(Value::Object(map)) => map,
        Some(other) => Details::from_iter([("body".to_string(), other)]),
        None if !text.trim().is_empty() => {
            Details::from_iter([("body".to_string(), Value::String(text))])
        }
        None => Details::new(),
    };
    err = err.with_details(details);

    // Server errors report 500; keep the real code for diagnostics.
    if err.status_code() != status {
        err.insert_detail("http_status", status);
    }
    if let Some(hint) = retry_after {
        err.insert_detail("retry_after", hint.as_secs());
    }
    err
}

/// `error.message`, then `error`, then `message`.
fn error_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| body.get("error").and_then(Value::as_str))
        .or_else(|| body.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> Client {
        ClientBuilder::new(Service::PrintMail)
            .api_key("test_sk")
            .base_url(base_url)
            .retry_backoff(Duration::from_secs(1), Duration::from_secs(8))
            .build()
            .unwrap()
    }

    #[test]
    fn url_joins_base_and_endpoint() {
        let c = client("https://api.example.com/print-mail/v1/");
        assert_eq!(
            c.url("/postcards").unwrap().as_str(),
            "https://api.example.com/print-mail/v1/postcards"
        );
        assert_eq!(
            c.url("letters/letter_1").unwrap().as_str(),
            "https://api.example.com/print-mail/v1/letters/letter_1"
        );
    }

    #[test]
    fn absolute_endpoint_passes_through() {
        let c = client("https://api.example.com/v1");
        assert_eq!(
            c.url("https://files.example.com/pdf/1").unwrap().as_str(),
            "https://files.example.com/pdf/1"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = ClientBuilder::new(Service::PrintMail)
            .api_key("k")
            .base_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn invalid_api_key_characters_are_a_config_error() {
        let err = ClientBuilder::new(Service::PrintMail)
            .api_key("bad\nkey")
            .base_url("https://api.example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let c = client("https://api.example.com");
        assert_eq!(c.backoff(1, None), Duration::from_secs(1));
        assert_eq!(c.backoff(2, None), Duration::from_secs(2));
        assert_eq!(c.backoff(3, None), Duration::from_secs(4));
        assert_eq!(c.backoff(5, None), Duration::from_secs(8));
        assert_eq!(c.backoff(40, None), Duration::from_secs(8));
    }

    #[test]
    fn backoff_honors_retry_after_within_cap() {
        let c = client("https://api.example.com");
        assert_eq!(c.backoff(1, Some(Duration::from_secs(5))), Duration::from_secs(5));
        assert_eq!(c.backoff(1, Some(Duration::from_secs(600))), Duration::from_secs(8));
        assert_eq!(c.backoff(3, Some(Duration::ZERO)), Duration::from_secs(4));
    }

    #[test]
    fn error_message_lookup_order() {
        let nested = json!({ "error": { "type": "invalid", "message": "to is required" } });
        assert_eq!(error_message(&nested).as_deref(), Some("to is required"));

        let flat = json!({ "error": "Invalid API key" });
        assert_eq!(error_message(&flat).as_deref(), Some("Invalid API key"));

        let plain = json!({ "message": "session closed" });
        assert_eq!(error_message(&plain).as_deref(), Some("session closed"));

        assert_eq!(error_message(&json!({ "code": 7 })), None);
    }

    #[test]
    fn empty_body_parses_as_none_or_unit() {
        let none: Option<Value> = parse_target(None).unwrap();
        assert!(none.is_none());
        parse_target::<()>(None).unwrap();
    }

    #[test]
    fn shape_mismatch_is_a_validation_error() {
        #[derive(Debug, serde::Deserialize)]
        struct Shape {
            #[allow(dead_code)]
            id: String,
        }

        let err = parse_target::<Shape>(Some(json!({ "name": "x" }))).unwrap_err();
        let api = err.as_api().unwrap();
        assert_eq!(api.kind(), crate::ErrorKind::Validation);
        assert_eq!(api.message(), "Invalid response format from API");
        assert!(api.details().contains_key("errors"));
    }
}

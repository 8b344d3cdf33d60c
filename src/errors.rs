use std::fmt;

use thiserror::Error;

/// Free-form diagnostic data attached to an [`ApiError`].
pub type Details = serde_json::Map<String, serde_json::Value>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The closed set of remote failure classes.
///
/// Each kind carries a fixed default status code and message. Use
/// [`ErrorKind::from_status`] to classify an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Catch-all for failures that fit no other class.
    Api,
    /// Missing or invalid credentials (HTTP 401).
    Authentication,
    /// Malformed request payload (HTTP 400).
    Validation,
    /// The caller exceeded its request quota (HTTP 429).
    RateLimit,
    /// The referenced resource does not exist (HTTP 404).
    NotFound,
    /// A streaming session does not exist. A specialization of `NotFound`.
    SessionNotFound,
    /// The remote service failed internally (HTTP 5xx).
    Server,
}

impl ErrorKind {
    /// Status code errors of this kind carry by default.
    ///
    /// ```
    /// use printstream::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::SessionNotFound.default_status(), 404);
    /// assert_eq!(ErrorKind::RateLimit.default_status(), 429);
    /// ```
    pub fn default_status(self) -> u16 {
        match self {
            ErrorKind::Api | ErrorKind::Server => 500,
            ErrorKind::Authentication => 401,
            ErrorKind::Validation => 400,
            ErrorKind::RateLimit => 429,
            ErrorKind::NotFound | ErrorKind::SessionNotFound => 404,
        }
    }

    /// Message used when none is supplied.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Api => "An unexpected error occurred with the remote API",
            ErrorKind::Authentication => "Authentication failed. Please check your API key.",
            ErrorKind::Validation => "Invalid request data",
            ErrorKind::RateLimit => "Rate limit exceeded. Please wait before making more requests.",
            ErrorKind::NotFound => "The requested resource was not found",
            ErrorKind::SessionNotFound => "The requested streaming session was not found",
            ErrorKind::Server => "The server encountered an error",
        }
    }

    /// Classify a non-success HTTP status code.
    ///
    /// 401, 400, 404 and 429 have dedicated kinds, any other status of 500 or
    /// above is [`ErrorKind::Server`], and everything else is the generic
    /// [`ErrorKind::Api`].
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Authentication,
            400 => ErrorKind::Validation,
            404 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimit,
            s if s >= 500 => ErrorKind::Server,
            _ => ErrorKind::Api,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Api => "api error",
            ErrorKind::Authentication => "authentication error",
            ErrorKind::Validation => "validation error",
            ErrorKind::RateLimit => "rate limit error",
            ErrorKind::NotFound => "not found",
            ErrorKind::SessionNotFound => "session not found",
            ErrorKind::Server => "server error",
        };
        f.write_str(name)
    }
}

/// A classified failure reported by one of the remote APIs.
///
/// The status code is fixed when the error is built. Only the generic kind
/// accepts a custom status, through [`ApiError::api_with_status`].
///
/// ```
/// use printstream::{ApiError, ErrorKind};
///
/// let err = ApiError::rate_limit().with_message("slow down");
/// assert_eq!(err.kind(), ErrorKind::RateLimit);
/// assert_eq!(err.status_code(), 429);
/// assert!(err.details().is_empty());
/// ```
#[derive(Error, Debug)]
#[error("{status_code}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    status_code: u16,
    details: Details,
    #[source]
    source: Option<BoxError>,
}

impl ApiError {
    fn of_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            status_code: kind.default_status(),
            details: Details::new(),
            source: None,
        }
    }

    /// Generic API error with status 500.
    pub fn api() -> Self {
        Self::of_kind(ErrorKind::Api)
    }

    /// Generic API error carrying an explicit status code.
    pub fn api_with_status(status_code: u16) -> Self {
        Self {
            status_code,
            ..Self::of_kind(ErrorKind::Api)
        }
    }

    /// Authentication error with status 401.
    pub fn authentication() -> Self {
        Self::of_kind(ErrorKind::Authentication)
    }

    /// Validation error with status 400.
    pub fn validation() -> Self {
        Self::of_kind(ErrorKind::Validation)
    }

    /// Rate limit error with status 429.
    pub fn rate_limit() -> Self {
        Self::of_kind(ErrorKind::RateLimit)
    }

    /// Not-found error with status 404.
    pub fn not_found() -> Self {
        Self::of_kind(ErrorKind::NotFound)
    }

    /// Missing streaming session, status 404.
    pub fn session_not_found() -> Self {
        Self::of_kind(ErrorKind::SessionNotFound)
    }

    /// Remote server failure with status 500.
    pub fn server() -> Self {
        Self::of_kind(ErrorKind::Server)
    }

    /// Build the error matching an HTTP status code. The generic kind keeps
    /// `status` verbatim; the dedicated kinds use their fixed status.
    pub fn from_status(status: u16) -> Self {
        match ErrorKind::from_status(status) {
            ErrorKind::Api => Self::api_with_status(status),
            kind => Self::of_kind(kind),
        }
    }

    /// Replace the default message. An empty string is kept as given.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Replace the (empty) details map.
    pub fn with_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }

    pub(crate) fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub(crate) fn insert_detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(key.to_string(), value.into());
    }

    /// Failure class to branch on.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status, fixed for every kind except the generic one.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Diagnostic data, usually the response body. Empty when absent.
    pub fn details(&self) -> &Details {
        &self.details
    }

    /// True for both `NotFound` and its `SessionNotFound` specialization.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound | ErrorKind::SessionNotFound)
    }

    /// True for the `RateLimit` kind.
    pub fn is_rate_limited(&self) -> bool {
        self.kind == ErrorKind::RateLimit
    }

    /// Whether the failure is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.status_code == 429 || self.status_code >= 500
    }
}

/// All errors returned by this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The remote API answered with a failure status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A transport-level failure that was not retried.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The base URL or endpoint could not be turned into a URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A request body could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The classified API error, if this is one.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }

    /// The API error kind, if this is an API error.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.as_api().map(ApiError::kind)
    }
}

/// A convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

//! # printstream
//!
//! Async Rust client bindings for the print/mail API (postcards, letters,
//! templates) and the streaming-avatar API (streaming sessions). Both share
//! one thin facade over `reqwest` that attaches the API key, throttles
//! outgoing requests, retries transient failures, and turns every failure
//! status into a typed [`ApiError`].
//!
//! ## Quick start
//!
//! ```no_run
//! use printstream::{Client, ErrorKind, Service};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> printstream::Result<()> {
//!     // Reads PRINTMAIL_API_KEY (or API_KEY) from the environment.
//!     let client = Client::from_env(Service::PrintMail)?;
//!
//!     let body = json!({ "to": "contact_123", "size": "6x4" });
//!     match client.post::<Value, _>("/postcards", &body).await {
//!         Ok(postcard) => println!("created {}", postcard["id"]),
//!         Err(e) if e.kind() == Some(ErrorKind::Validation) => {
//!             eprintln!("rejected: {e}");
//!         }
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Builder pattern
//!
//! ```no_run
//! use printstream::{ClientBuilder, Service};
//! use std::time::Duration;
//!
//! # fn example() -> printstream::Result<()> {
//! let client = ClientBuilder::new(Service::StreamingAvatar)
//!     .api_key("your_api_key")
//!     .base_url("https://custom.example.com/v1")
//!     .max_retries(5)
//!     .rate_limit(20)
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod errors;
mod models;
mod rate_limit;

pub use client::{Client, ClientBuilder, RequestOptions};
pub use config::{Config, ConfigBuilder, Service};
pub use errors::{ApiError, Details, Error, ErrorKind, Result};
pub use models::{ListResponse, Resource};

pub use reqwest::header::{HeaderName, HeaderValue};
pub use reqwest::Method;

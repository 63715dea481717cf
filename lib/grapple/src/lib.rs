//! Blocking HTTP client with a fluent request builder.
//!
//! Requests run on a private tokio runtime through a Tower middleware stack
//! (logging, redirects, cookies) over a pooled hyper connection client, with
//! optional HTTP, HTTPS and SOCKS5 proxies.
//!
//! # Example
//!
//! ```no_run
//! use grapple::prelude::*;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! # fn main() -> grapple::Result<()> {
//! let mut client = HttpClient::new();
//! let user: User = client
//!     .get("https://api.example.com/users/42")
//!     .header("Accept", "application/json")
//!     .send()?
//!     .json()?;
//!
//! client
//!     .post_json("https://api.example.com/users", &user)?
//!     .send()?;
//! # Ok(())
//! # }
//! ```

mod body;
mod client;
mod config;
mod connector;
pub mod middleware;
pub mod prelude;
mod response;
mod transport;

pub use client::{HttpClient, HttpClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_MAX_REDIRECTS};
pub use connector::{Proxy, ProxyKind};
pub use middleware::{DefaultRedirectPolicy, Jar, LogLevel, RedirectAction, RedirectPolicy};
pub use response::Response;
pub use transport::Transport;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use grapple_core::{
    Body, CharsetCase, ContentType, Error, Method, Request, Result, Values, basic_auth,
    from_json, normalize_url, to_form, to_json, to_xml,
};

// Re-export http types for status codes and headers
pub use grapple_core::{HeaderMap, StatusCode, header};
pub use url;

/// Send a GET request with a default client.
///
/// # Errors
///
/// Same as [`HttpClient::send`].
pub fn get(url: &str) -> Result<Response> {
    HttpClient::builder().build()?.get(url).send()
}

/// Send a HEAD request with a default client.
///
/// # Errors
///
/// Same as [`HttpClient::send`].
pub fn head(url: &str) -> Result<Response> {
    HttpClient::builder().build()?.head(url).send()
}

/// Send a POST request with a default client.
///
/// # Errors
///
/// Same as [`HttpClient::send`].
pub fn post(url: &str, content_type: &str, body: impl Into<Body>) -> Result<Response> {
    HttpClient::builder()
        .build()?
        .post(url, content_type, body)
        .send()
}

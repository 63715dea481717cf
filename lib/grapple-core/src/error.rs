//! Error types for grapple.

use derive_more::{Display, Error, From};

/// Main error type for grapple operations.
///
/// Malformed request URLs are not represented here when they come from the
/// fluent builder: that is treated as programmer misuse and panics. Every
/// other failure is a value the caller can inspect.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Network/connection errors (DNS, refused, reset).
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Proxy handshake failure (CONNECT refused, SOCKS5 negotiation error).
    #[display("proxy error: {_0}")]
    #[from(skip)]
    Proxy(#[error(not(source))] String),

    /// The round trip exceeded the configured timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// Malformed or unsupported proxy URL.
    #[display("invalid proxy: {_0}")]
    #[from(skip)]
    InvalidProxy(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// XML serialization error.
    #[display("XML serialization error: {_0}")]
    #[from(skip)]
    XmlSerialization(#[error(not(source))] String),

    /// Form URL-encoded serialization error.
    #[display("form serialization error: {_0}")]
    #[from]
    FormSerialization(serde_html_form::ser::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// Too many redirects.
    #[display("stopped after {count} redirects (max {max})")]
    #[from(skip)]
    TooManyRedirects {
        /// Number of requests already made in the chain.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Invalid redirect response (unparsable `Location`).
    #[display("invalid redirect: {_0}")]
    #[from(skip)]
    InvalidRedirect(#[error(not(source))] String),

    /// A custom redirect policy refused to follow.
    #[display("redirect rejected: {_0}")]
    #[from(skip)]
    RedirectRejected(#[error(not(source))] String),

    /// Reading the response body failed.
    #[display("failed to read response body: {_0}")]
    #[from(skip)]
    Body(#[error(not(source))] String),

    /// Filesystem or runtime I/O error.
    #[display("I/O error: {_0}")]
    #[from]
    Io(std::io::Error),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a proxy handshake error.
    #[must_use]
    pub fn proxy(message: impl Into<String>) -> Self {
        Self::Proxy(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an invalid proxy error.
    #[must_use]
    pub fn invalid_proxy(message: impl Into<String>) -> Self {
        Self::InvalidProxy(message.into())
    }

    /// Create an XML serialization error.
    #[must_use]
    pub fn xml_serialization(message: impl Into<String>) -> Self {
        Self::XmlSerialization(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an error for a redirect refused by a policy.
    #[must_use]
    pub fn redirect_rejected(message: impl Into<String>) -> Self {
        Self::RedirectRejected(message.into())
    }

    /// Create a body read error.
    #[must_use]
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body(message.into())
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if the error comes from redirect handling.
    #[must_use]
    pub const fn is_redirect(&self) -> bool {
        matches!(
            self,
            Self::TooManyRedirects { .. } | Self::InvalidRedirect(_) | Self::RedirectRejected(_)
        )
    }

    /// Returns `true` if a payload could not be serialized.
    ///
    /// Encoding errors happen before any network activity.
    #[must_use]
    pub const fn is_encoding(&self) -> bool {
        matches!(
            self,
            Self::JsonSerialization(_) | Self::XmlSerialization(_) | Self::FormSerialization(_)
        )
    }

    /// Returns `true` if this is a transport-level failure.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Tls(_) | Self::Proxy(_) | Self::Timeout
        ) || self.is_redirect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Timeout;
        assert_eq!(err.to_string(), "request timeout");

        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "connection error: failed to connect");

        let err = Error::TooManyRedirects { count: 10, max: 10 };
        assert_eq!(err.to_string(), "stopped after 10 redirects (max 10)");

        let err = Error::json_deserialization("user.address.city", "missing field `city`");
        assert_eq!(
            err.to_string(),
            "JSON deserialization error at 'user.address.city': missing field `city`"
        );
    }

    #[test]
    fn error_classification() {
        assert!(Error::Timeout.is_timeout());
        assert!(Error::Timeout.is_transport());
        assert!(Error::connection("refused").is_connection());
        assert!(Error::redirect_rejected("no").is_redirect());
        assert!(Error::TooManyRedirects { count: 10, max: 10 }.is_transport());
        assert!(Error::xml_serialization("bad").is_encoding());
        assert!(!Error::body("reset").is_transport());
        assert!(!Error::invalid_proxy("bad").is_transport());
    }

    #[test]
    fn error_from_io() {
        let err = Error::from(std::io::Error::other("disk full"));
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}

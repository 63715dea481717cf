//! HTTP response helper.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tokio::runtime::Runtime;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::{Error, Result, from_json};

/// A received response whose body is read at most once.
///
/// The first of [`bytes`](Self::bytes), [`text`](Self::text),
/// [`json`](Self::json) or [`download_file`](Self::download_file) consumes the
/// body and releases the connection; later reads see an empty body. Dropping
/// an unread response releases the connection as well.
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    url: Url,
    body: Option<Incoming>,
    runtime: Arc<Runtime>,
    deadline: Option<Instant>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("consumed", &self.body.is_none())
            .finish_non_exhaustive()
    }
}

impl Response {
    pub(crate) fn new(
        response: http::Response<Incoming>,
        url: Url,
        runtime: Arc<Runtime>,
        deadline: Option<Instant>,
    ) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            url,
            body: Some(body),
            runtime,
            deadline,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// HTTP version of the response.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// URL of the last request made, after redirects.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Check if the response is successful (2xx).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response is a redirect (3xx).
    #[must_use]
    pub fn is_redirection(&self) -> bool {
        self.status.is_redirection()
    }

    /// Check if the response is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Check if the response is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Returns `true` once the body has been read.
    #[must_use]
    pub const fn is_consumed(&self) -> bool {
        self.body.is_none()
    }

    /// Read the whole body.
    ///
    /// Returns empty bytes if the body was already read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Body`] if reading fails, or [`Error::Timeout`] when the
    /// client deadline passes during the read.
    pub fn bytes(&mut self) -> Result<Bytes> {
        let Some(body) = self.body.take() else {
            debug!(url = %self.url, "response body already consumed");
            return Ok(Bytes::new());
        };
        let deadline = self.deadline;

        self.runtime.block_on(async move {
            let collected = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, body.collect())
                    .await
                    .map_err(|_| Error::Timeout)?,
                None => body.collect().await,
            };
            collected.map(|c| c.to_bytes()).map_err(|e| {
                warn!(error = %e, "failed to read response body");
                Error::body(e.to_string())
            })
        })
    }

    /// Read the body as text, replacing invalid UTF-8 sequences.
    ///
    /// # Errors
    ///
    /// Same as [`bytes`](Self::bytes).
    pub fn text(&mut self) -> Result<String> {
        self.bytes()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Read errors as for [`bytes`](Self::bytes), or
    /// [`Error::JsonDeserialization`] with the path of the offending field.
    pub fn json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.bytes()?;
        from_json(&bytes)
    }

    /// Save the body to `path`, creating parent directories.
    ///
    /// The body is read before the file is touched, so a failed read leaves an
    /// existing file intact; otherwise it is truncated. Returns the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// Read errors as for [`bytes`](Self::bytes), or [`Error::Io`] for
    /// filesystem failures.
    pub fn download_file(&mut self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let bytes = self.bytes()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        file.flush()?;

        debug!(path = %path.display(), len = bytes.len(), "response saved");
        Ok(u64::try_from(bytes.len()).unwrap_or(u64::MAX))
    }
}

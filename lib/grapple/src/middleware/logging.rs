//! Round-trip logging with `tracing`.
//!
//! One `http_request` span per call to `send`, covering every redirect hop.
//! The summary events are emitted at the configured [`LogLevel`]; HTTP error
//! statuses and failures are always logged at `warn`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::transport::EffectiveUrl;
use crate::{Error, Request, Result};

/// Level of the request/response summary events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// `debug` events, request headers included.
    #[default]
    Debug,
    /// `info` events with method, URL and status only.
    Info,
}

/// Layer producing [`Logging`] services.
///
/// ```
/// use grapple::middleware::{LogLevel, LoggingLayer};
///
/// let layer = LoggingLayer::with_level(LogLevel::Info);
/// # let _ = layer;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    level: LogLevel,
}

impl LoggingLayer {
    /// Log summaries at `level`.
    #[must_use]
    pub const fn with_level(level: LogLevel) -> Self {
        Self { level }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            level: self.level,
        }
    }
}

/// Logs each round trip and the response it ends with.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    level: LogLevel,
}

impl<S, B> Service<Request> for Logging<S>
where
    S: Service<Request, Response = http::Response<B>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = http::Response<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let method = request.method();
        let url = request.url().clone();
        let level = self.level;
        let span = info_span!("http_request", %method, %url);

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                match level {
                    LogLevel::Debug => debug!(
                        headers = ?request.headers(),
                        content_length = request.content_length(),
                        "sending request"
                    ),
                    LogLevel::Info => info!("sending request"),
                }

                let start = Instant::now();
                let result = inner.call(request).await;
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) => {
                        let status = response.status().as_u16();
                        let final_url = response
                            .extensions()
                            .get::<EffectiveUrl>()
                            .map_or(&url, |effective| &effective.0);
                        if response.status().is_client_error() || response.status().is_server_error()
                        {
                            warn!(status, %final_url, elapsed_ms, "HTTP error status");
                        } else if level == LogLevel::Debug {
                            debug!(
                                status,
                                version = ?response.version(),
                                %final_url,
                                elapsed_ms,
                                "request completed"
                            );
                        } else {
                            info!(status, %final_url, elapsed_ms, "request completed");
                        }
                    }
                    Err(err) => warn!(error = %err, elapsed_ms, "request failed"),
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_is_debug() {
        assert_eq!(LoggingLayer::default().level, LogLevel::Debug);
    }

    #[test]
    fn layer_keeps_level() {
        let service = LoggingLayer::with_level(LogLevel::Info).layer(());
        assert_eq!(service.level, LogLevel::Info);
    }
}

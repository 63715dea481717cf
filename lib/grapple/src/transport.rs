//! Transport: runtime, connection pool, proxy, cookie jar and redirect policy.
//!
//! A [`Transport`] drives the async hyper client from blocking code. It owns a
//! current-thread tokio runtime and runs every round trip through the
//! middleware stack with `block_on`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::header::{AUTHORIZATION, PROXY_AUTHORIZATION};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use percent_encoding::percent_decode_str;
use tokio::runtime::Runtime;
use tokio::time::Instant;
use tower::{ServiceBuilder, ServiceExt};
use tower_service::Service;
use tracing::{debug, warn};
use url::Url;

use crate::body::{RequestBody, into_request_body};
use crate::connector::{Proxy, ProxyConnectError, ProxyConnector, https_connector};
use crate::middleware::{
    CookieJarLayer, DefaultRedirectPolicy, FollowRedirectLayer, Jar, LoggingLayer, RedirectPolicy,
};
use crate::{ClientConfig, Error, Request, Response, Result, basic_auth};

type HyperClient = Client<HttpsConnector<ProxyConnector>, RequestBody>;

/// URL a response was received from, set on every hop.
#[derive(Debug, Clone)]
pub(crate) struct EffectiveUrl(pub(crate) Url);

/// Single-hop client: converts the request and sends it with hyper.
#[derive(Clone)]
struct RawHyperClient {
    inner: HyperClient,
    proxy: Option<Proxy>,
}

impl RawHyperClient {
    /// Build a hyper request from a grapple request.
    fn build_hyper_request(&self, request: Request) -> Result<http::Request<RequestBody>> {
        let (method, mut url, mut headers, body) = request.into_parts();

        // Userinfo in the URL becomes basic auth unless set explicitly
        if !url.username().is_empty() {
            if !headers.contains_key(AUTHORIZATION) {
                let user = percent_decode_str(url.username()).decode_utf8_lossy();
                let password =
                    percent_decode_str(url.password().unwrap_or_default()).decode_utf8_lossy();
                headers.insert(AUTHORIZATION, basic_auth(&user, &password)?);
            }
            let _ = url.set_username("");
            let _ = url.set_password(None);
        }
        url.set_fragment(None);

        if let Some(auth) = self
            .proxy
            .as_ref()
            .filter(|proxy| proxy.forwards(&url))
            .and_then(Proxy::authorization)
        {
            headers.insert(PROXY_AUTHORIZATION, auth);
        }

        let mut http_request = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str())
            .body(into_request_body(body))
            .map_err(|e| Error::invalid_request(e.to_string()))?;
        *http_request.headers_mut() = headers;

        Ok(http_request)
    }

    async fn execute(self, request: Request) -> Result<http::Response<Incoming>> {
        let url = request.url().clone();
        let hyper_request = self.build_hyper_request(request)?;

        let mut response = self
            .inner
            .request(hyper_request)
            .await
            .map_err(Self::map_hyper_error)?;

        response.extensions_mut().insert(EffectiveUrl(url));
        Ok(response)
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = error_chain(&err);

        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            if cause.is::<ProxyConnectError>() {
                return Error::proxy(msg);
            }
            source = cause.source();
        }

        let lower = msg.to_lowercase();
        if lower.contains("ssl") || lower.contains("tls") || lower.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

/// Render an error with its sources, `outer: inner: ...`.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

impl Service<Request> for RawHyperClient {
    type Response = http::Response<Incoming>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let client = self.clone();
        Box::pin(client.execute(request))
    }
}

/// Connection pool and per-client settings.
///
/// Cloning is cheap: clones share the runtime, the connection pool and the
/// cookie jar, while proxy, timeout and redirect policy changes stay local to
/// the clone they are made on.
#[derive(Clone)]
pub struct Transport {
    runtime: Arc<Runtime>,
    config: ClientConfig,
    client: HyperClient,
    proxy: Option<Proxy>,
    jar: Option<Jar>,
    redirect: Arc<dyn RedirectPolicy>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .field("proxy", &self.proxy)
            .field("cookie_jar", &self.jar.is_some())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a transport with its own runtime and connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the runtime cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let redirect = Arc::new(DefaultRedirectPolicy::new(config.max_redirects));
        let client = build_client(&config, None);

        Ok(Self {
            runtime: Arc::new(runtime),
            config,
            client,
            proxy: None,
            jar: None,
            redirect,
        })
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Round-trip timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.config.timeout
    }

    /// Set or clear the round-trip timeout.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.config.timeout = timeout;
    }

    /// Configured proxy, if any.
    #[must_use]
    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    /// Route connections through the proxy at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProxy`] and leaves the transport unchanged if
    /// the URL is malformed or its scheme unsupported.
    pub fn set_proxy(&mut self, url: &str) -> Result<()> {
        let proxy = Proxy::parse(url, self.config.lenient_proxy)?;
        debug!(proxy = %proxy, kind = %proxy.kind(), "using proxy");
        self.client = build_client(&self.config, Some(proxy.clone()));
        self.proxy = Some(proxy);
        Ok(())
    }

    /// Go back to direct connections.
    pub fn clear_proxy(&mut self) {
        if self.proxy.take().is_some() {
            self.client = build_client(&self.config, None);
        }
    }

    /// Cookie jar, if enabled.
    #[must_use]
    pub fn cookie_jar(&self) -> Option<&Jar> {
        self.jar.as_ref()
    }

    /// Enable the cookie jar; keeps the existing one if already enabled.
    pub fn enable_cookie_jar(&mut self) -> &Jar {
        self.jar.get_or_insert_with(Jar::new)
    }

    /// Replace the redirect policy.
    pub fn set_redirect_policy(&mut self, policy: impl RedirectPolicy + 'static) {
        self.redirect = Arc::new(policy);
    }

    pub(crate) fn set_shared_redirect_policy(&mut self, policy: Arc<dyn RedirectPolicy>) {
        self.redirect = policy;
    }

    /// Perform one round trip, following redirects.
    ///
    /// # Errors
    ///
    /// Transport failures, redirect policy errors and [`Error::Timeout`].
    pub fn execute(&self, request: Request) -> Result<Response> {
        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        let requested = request.url().clone();

        let service = ServiceBuilder::new()
            .layer(LoggingLayer::with_level(self.config.log_level))
            .layer(FollowRedirectLayer::new(Arc::clone(&self.redirect)))
            .layer(CookieJarLayer::new(self.jar.clone()))
            .service(RawHyperClient {
                inner: self.client.clone(),
                proxy: self.proxy.clone(),
            });

        let mut response = self.runtime.block_on(async {
            let round_trip = service.oneshot(request);
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, round_trip)
                    .await
                    .map_err(|_| {
                        warn!(url = %requested, "request timed out");
                        Error::Timeout
                    })?,
                None => round_trip.await,
            }
        })?;

        let url = response
            .extensions_mut()
            .remove::<EffectiveUrl>()
            .map_or(requested, |effective| effective.0);
        Ok(Response::new(
            response,
            url,
            Arc::clone(&self.runtime),
            deadline,
        ))
    }
}

fn build_client(config: &ClientConfig, proxy: Option<Proxy>) -> HyperClient {
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_idle_per_host)
        .pool_timer(TokioTimer::new())
        .build(https_connector(config, proxy))
}

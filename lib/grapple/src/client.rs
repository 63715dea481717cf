//! Fluent blocking HTTP client.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use grapple_core::{CharsetCase, ContentType, Values, to_form, to_json, to_xml};
use http::HeaderMap;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use serde::Serialize;
use tracing::debug;

use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::middleware::{LogLevel, RedirectPolicy};
use crate::{Body, Error, Method, Request, Response, Result, Transport};

/// A blocking HTTP client holding one request under construction.
///
/// Call a method helper (`get`, `post_json`, ...) to start a request, chain
/// mutators, then [`send`](Self::send) it. Query and form parameters collected
/// with [`query`](Self::query) and [`param`](Self::param) persist across sends
/// until [`reset`](Self::reset).
///
/// # Example
///
/// ```no_run
/// use grapple::HttpClient;
///
/// # fn main() -> grapple::Result<()> {
/// let mut client = HttpClient::new();
/// let mut response = client
///     .get("httpbin.org/get")
///     .query_set("page", "2")
///     .user_agent("grapple")
///     .send()?;
///
/// println!("{}", response.text()?);
/// # Ok(())
/// # }
/// ```
///
/// # Panics
///
/// Request mutators panic when no request was started, and method helpers
/// panic when the URL cannot be parsed. Both are programming errors.
#[derive(Debug)]
pub struct HttpClient {
    transport: Transport,
    request: Option<Request>,
    query: Values,
    params: Values,
    error: Option<Error>,
}

impl HttpClient {
    /// Create a client with default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the transport runtime cannot be created; use
    /// [`HttpClient::builder`] to handle that error.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if the transport runtime cannot be created.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        match Transport::new(config) {
            Ok(transport) => Self::with_transport(transport),
            Err(err) => panic!("failed to create HTTP transport: {err}"),
        }
    }

    /// Create a client sending through an existing transport.
    ///
    /// Pass a clone of another client's transport to share its connection
    /// pool and cookie jar.
    #[must_use]
    pub fn with_transport(transport: Transport) -> Self {
        Self {
            transport,
            request: None,
            query: Values::new(),
            params: Values::new(),
            error: None,
        }
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// The client transport.
    #[must_use]
    pub const fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Mutable access to the client transport.
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// The request under construction, if any.
    #[must_use]
    pub const fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Clear the query and form parameter collections.
    pub fn reset(&mut self) -> &mut Self {
        self.query.clear();
        self.params.clear();
        self
    }

    // ========================================================================
    // Method + URL
    // ========================================================================

    fn open(&mut self, method: Method, url: &str) -> &mut Self {
        let request = Request::new(method, url)
            .unwrap_or_else(|err| panic!("invalid request URL {url:?}: {err}"));
        self.request = Some(request);
        self.error = None;
        self
    }

    /// Start a GET request.
    pub fn get(&mut self, url: &str) -> &mut Self {
        self.open(Method::Get, url)
    }

    /// Start a HEAD request.
    pub fn head(&mut self, url: &str) -> &mut Self {
        self.open(Method::Head, url)
    }

    /// Start a PUT request.
    pub fn put(&mut self, url: &str) -> &mut Self {
        self.open(Method::Put, url)
    }

    /// Start a PATCH request.
    pub fn patch(&mut self, url: &str) -> &mut Self {
        self.open(Method::Patch, url)
    }

    /// Start a DELETE request.
    pub fn delete(&mut self, url: &str) -> &mut Self {
        self.open(Method::Delete, url)
    }

    /// Start an OPTIONS request.
    pub fn options(&mut self, url: &str) -> &mut Self {
        self.open(Method::Options, url)
    }

    /// Start a POST request with the given content type and body.
    pub fn post(&mut self, url: &str, content_type: &str, body: impl Into<Body>) -> &mut Self {
        self.open(Method::Post, url)
            .header(CONTENT_TYPE.as_str(), content_type)
            .body(body)
    }

    /// Start a form POST; the body is built from [`param`](Self::param) at send time.
    pub fn post_form(&mut self, url: &str) -> &mut Self {
        self.open(Method::Post, url)
            .header(CONTENT_TYPE.as_str(), ContentType::FormUrlEncoded.as_str())
    }

    /// Start a POST with `value` serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonSerialization`] without touching the request under
    /// construction.
    pub fn post_json<T: Serialize + ?Sized>(&mut self, url: &str, value: &T) -> Result<&mut Self> {
        let body = to_json(value)?;
        Ok(self.post_encoded(url, ContentType::Json, body))
    }

    /// Start a POST with `value` serialized as XML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::XmlSerialization`] without touching the request under
    /// construction.
    pub fn post_xml<T: Serialize + ?Sized>(&mut self, url: &str, value: &T) -> Result<&mut Self> {
        let body = to_xml(value)?;
        Ok(self.post_encoded(url, ContentType::Xml, body))
    }

    fn post_encoded(&mut self, url: &str, content_type: ContentType, body: Bytes) -> &mut Self {
        let content_type = content_type.header_value(self.charset_case());
        self.post(url, content_type, body)
    }

    fn charset_case(&self) -> CharsetCase {
        self.transport.config().charset_case
    }

    // ========================================================================
    // Request mutators
    // ========================================================================

    fn pending(&mut self, operation: &str) -> &mut Request {
        self.request.as_mut().unwrap_or_else(|| {
            panic!("HttpClient::{operation} called before a method and URL were set")
        })
    }

    /// Remember the first failed mutation; `send` reports it.
    fn record(&mut self, result: Result<()>) -> &mut Self {
        if let Err(err) = result {
            debug!(error = %err, "request mutation failed");
            self.error.get_or_insert(err);
        }
        self
    }

    /// Replace the body. The latest assignment wins.
    pub fn body(&mut self, body: impl Into<Body>) -> &mut Self {
        self.pending("body").set_body(body);
        self
    }

    /// Serialize `value` as a form body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FormSerialization`] without touching the request.
    pub fn form<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        let body = to_form(value)?;
        Ok(self
            .header(CONTENT_TYPE.as_str(), ContentType::FormUrlEncoded.as_str())
            .body(body))
    }

    /// Set a header, replacing existing values.
    ///
    /// An invalid name or value makes [`send`](Self::send) fail with
    /// [`Error::InvalidRequest`].
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        let result = self.pending("header").insert_header(name, value);
        self.record(result)
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.pending("headers_mut").headers_mut()
    }

    /// Add a cookie to the `Cookie` header.
    pub fn add_cookie(&mut self, name: &str, value: &str) -> &mut Self {
        let result = self.pending("add_cookie").add_cookie(name, value);
        self.record(result)
    }

    /// Set the `User-Agent` header.
    pub fn user_agent(&mut self, user_agent: &str) -> &mut Self {
        self.pending("user_agent");
        self.header(USER_AGENT.as_str(), user_agent)
    }

    /// Set the `Host` header, overriding the URL host.
    pub fn host(&mut self, host: &str) -> &mut Self {
        self.pending("host");
        self.header(HOST.as_str(), host)
    }

    /// Set `Authorization: Basic` credentials.
    pub fn basic_auth(&mut self, username: &str, password: &str) -> &mut Self {
        let result = self.pending("basic_auth").basic_auth(username, password);
        self.record(result)
    }

    /// Append a query parameter to the request URL.
    pub fn query_add(&mut self, key: &str, value: &str) -> &mut Self {
        self.pending("query_add").query_add(key, value);
        self
    }

    /// Set a query parameter on the request URL, replacing existing values.
    pub fn query_set(&mut self, key: &str, value: &str) -> &mut Self {
        self.pending("query_set").query_set(key, value);
        self
    }

    /// Remove a query parameter from the request URL.
    pub fn query_del(&mut self, key: &str) -> &mut Self {
        self.pending("query_del").query_del(key);
        self
    }

    /// First value of a query parameter of the request URL.
    #[must_use]
    pub fn query_get(&self, key: &str) -> Option<String> {
        self.request.as_ref()?.query_get(key)
    }

    /// Query parameters appended to the URL at send time.
    pub fn query(&mut self) -> &mut Values {
        &mut self.query
    }

    /// Form parameters sent as the body when no body was set.
    pub fn param(&mut self) -> &mut Values {
        &mut self.params
    }

    // ========================================================================
    // Transport configuration
    // ========================================================================

    /// Enable the cookie jar of this client's transport.
    pub fn use_cookie_jar(&mut self) -> &mut Self {
        self.transport.enable_cookie_jar();
        self
    }

    /// Set the round-trip timeout, body read included.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.transport.set_timeout(Some(timeout));
        self
    }

    /// Route requests through a proxy (`http`, `https`, `socks5`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProxy`] and keeps the current routing if the
    /// URL is malformed or its scheme unsupported.
    pub fn use_proxy(&mut self, url: &str) -> Result<&mut Self> {
        self.transport.set_proxy(url)?;
        Ok(self)
    }

    /// Connect directly again.
    pub fn clear_proxy(&mut self) -> &mut Self {
        self.transport.clear_proxy();
        self
    }

    /// Replace the redirect policy.
    pub fn set_check_redirect(&mut self, policy: impl RedirectPolicy + 'static) -> &mut Self {
        self.transport.set_redirect_policy(policy);
        self
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Send the request under construction.
    ///
    /// The client-level query parameters are appended to the URL, and the form
    /// parameters become the body when no body was set. The request is
    /// consumed; the parameter collections are kept. After a failed mutation
    /// the request is kept, so it can be corrected and sent again.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] without a started request or after a failed
    /// mutation; otherwise transport, redirect and timeout errors.
    pub fn send(&mut self) -> Result<Response> {
        let mut request = self
            .request
            .take()
            .ok_or_else(|| Error::invalid_request("no request to send: call get/post/... first"))?;
        if let Some(err) = self.error.take() {
            self.request = Some(request);
            return Err(err);
        }

        request.append_raw_query(&self.query.encode());
        if !self.params.is_empty() && request.body().is_empty() {
            request.set_body(self.params.encode());
        }

        self.transport.execute(request)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`HttpClient`].
///
/// # Example
///
/// ```
/// use grapple::HttpClient;
/// use std::time::Duration;
///
/// let client = HttpClient::builder()
///     .timeout(Duration::from_secs(5))
///     .cookie_jar(true)
///     .build()
///     .expect("client");
/// assert!(client.transport().cookie_jar().is_some());
/// ```
#[derive(Default)]
pub struct HttpClientBuilder {
    config: ClientConfigBuilder,
    cookie_jar: bool,
    proxy: Option<String>,
    redirect_policy: Option<Arc<dyn RedirectPolicy>>,
}

impl std::fmt::Debug for HttpClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientBuilder")
            .field("config", &self.config)
            .field("cookie_jar", &self.cookie_jar)
            .field("proxy", &self.proxy)
            .field("redirect_policy", &self.redirect_policy.is_some())
            .finish()
    }
}

impl HttpClientBuilder {
    // ========================================================================
    // Core Configuration
    // ========================================================================

    /// Set the round-trip timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Disable the round-trip timeout.
    #[must_use]
    pub fn no_timeout(mut self) -> Self {
        self.config = self.config.no_timeout();
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the TCP keepalive interval.
    #[must_use]
    pub fn tcp_keepalive(mut self, interval: Duration) -> Self {
        self.config = self.config.tcp_keepalive(interval);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Set the redirect cap of the default redirect policy.
    #[must_use]
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config = self.config.max_redirects(max);
        self
    }

    /// Set the charset casing of the JSON content type.
    #[must_use]
    pub fn charset_case(mut self, case: CharsetCase) -> Self {
        self.config = self.config.charset_case(case);
        self
    }

    /// Set whether scheme-less proxy strings are accepted.
    #[must_use]
    pub fn lenient_proxy(mut self, lenient: bool) -> Self {
        self.config = self.config.lenient_proxy(lenient);
        self
    }

    /// Set the level of request/response log events.
    #[must_use]
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config = self.config.log_level(level);
        self
    }

    // ========================================================================
    // Transport features
    // ========================================================================

    /// Enable or disable the cookie jar.
    #[must_use]
    pub const fn cookie_jar(mut self, enabled: bool) -> Self {
        self.cookie_jar = enabled;
        self
    }

    /// Route requests through a proxy; validated by [`build`](Self::build).
    #[must_use]
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    /// Replace the default redirect policy.
    #[must_use]
    pub fn redirect_policy(mut self, policy: impl RedirectPolicy + 'static) -> Self {
        self.redirect_policy = Some(Arc::new(policy));
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the client.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidProxy`] for a bad proxy URL, [`Error::Io`] if the
    /// runtime cannot be created.
    pub fn build(self) -> Result<HttpClient> {
        let mut transport = Transport::new(self.config.build())?;
        if self.cookie_jar {
            transport.enable_cookie_jar();
        }
        if let Some(proxy) = &self.proxy {
            transport.set_proxy(proxy)?;
        }
        if let Some(policy) = self.redirect_policy {
            transport.set_shared_redirect_policy(policy);
        }
        Ok(HttpClient::with_transport(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProxyKind;

    #[test]
    fn client_default() {
        let client = HttpClient::new();
        assert_eq!(client.transport().timeout(), Some(Duration::from_secs(30)));
        assert!(client.request().is_none());
    }

    #[test]
    fn client_builder() {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(60))
            .pool_idle_per_host(16)
            .proxy("socks5://127.0.0.1:1080")
            .build()
            .expect("client");

        let config = client.transport().config();
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.pool_idle_per_host, 16);
        assert_eq!(
            client.transport().proxy().map(crate::Proxy::kind),
            Some(ProxyKind::Socks5)
        );
    }

    #[test]
    fn builder_rejects_bad_proxy() {
        let err = HttpClient::builder()
            .proxy("gopher://proxy")
            .build()
            .expect_err("bad proxy");
        assert!(matches!(err, Error::InvalidProxy(_)));
    }

    #[test]
    fn url_without_scheme_defaults_to_http() {
        let mut client = HttpClient::new();
        client.get("example.com/path");
        let request = client.request().expect("pending request");
        assert_eq!(request.url().as_str(), "http://example.com/path");
        assert_eq!(request.method(), Method::Get);
    }

    #[test]
    #[should_panic(expected = "invalid request URL")]
    fn invalid_url_panics() {
        HttpClient::new().get("http://exa mple.com");
    }

    #[test]
    #[should_panic(expected = "HttpClient::header called before a method and URL were set")]
    fn mutator_without_request_panics() {
        HttpClient::new().header("X-Trace", "1");
    }

    #[test]
    fn send_without_request_is_an_error() {
        let err = HttpClient::new().send().expect_err("nothing to send");
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn invalid_header_fails_at_send() {
        let mut client = HttpClient::new();
        let err = client
            .get("127.0.0.1:9")
            .header("bad header", "x")
            .send()
            .expect_err("invalid header");
        assert!(matches!(err, Error::InvalidRequest(_)));

        let kept = client.request().expect("request kept after failed mutation");
        assert_eq!(kept.url().as_str(), "http://127.0.0.1:9/");
        assert!(kept.header("bad header").is_none());
    }

    #[test]
    fn query_helpers_edit_request_url() {
        let mut client = HttpClient::new();
        client
            .get("example.com/search")
            .query_set("q", "one")
            .query_set("q", "two")
            .query_add("tag", "a")
            .query_add("tag", "b");

        assert_eq!(client.query_get("q").as_deref(), Some("two"));
        let url = client.request().expect("request").url().clone();
        assert_eq!(url.query(), Some("q=two&tag=a&tag=b"));

        client.query_del("tag");
        assert!(client.query_get("tag").is_none());
    }

    #[test]
    fn post_json_sets_content_type() {
        #[derive(Serialize)]
        struct Item {
            id: u32,
        }

        let mut client = HttpClient::new();
        client
            .post_json("example.com/items", &Item { id: 1 })
            .expect("serializable");
        let request = client.request().expect("request");
        assert_eq!(
            request.header("content-type"),
            Some("application/json;charset=UTF-8")
        );
        assert_eq!(
            request.body().as_bytes().map(|b| &b[..]),
            Some(br#"{"id":1}"#.as_slice())
        );
    }

    #[test]
    fn post_json_lower_case_charset() {
        let mut client = HttpClient::builder()
            .charset_case(CharsetCase::Lower)
            .build()
            .expect("client");
        client
            .post_json("example.com/items", &[1, 2])
            .expect("serializable");
        assert_eq!(
            client.request().and_then(|r| r.header("content-type")),
            Some("application/json; charset=utf-8")
        );
    }

    #[test]
    fn post_json_failure_keeps_previous_request() {
        let mut client = HttpClient::new();
        client.get("example.com/previous");

        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1_u8], 1);
        let err = client
            .post_json("example.com/items", &bad)
            .expect_err("non-string key");

        assert!(err.is_encoding());
        let request = client.request().expect("untouched");
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.url().path(), "/previous");
    }

    #[test]
    fn latest_body_wins() {
        let mut client = HttpClient::new();
        client
            .put("example.com/doc")
            .body("first")
            .body(vec![1_u8, 2, 3]);
        assert_eq!(client.request().and_then(Request::content_length), Some(3));
    }

    #[test]
    fn reset_clears_parameter_collections() {
        let mut client = HttpClient::new();
        client.query().add("a", "1");
        client.param().add("b", "2");
        client.reset();
        assert!(client.query().is_empty());
        assert!(client.param().is_empty());
    }

    #[test]
    fn invalid_proxy_keeps_transport() {
        let mut client = HttpClient::new();
        client.use_proxy("http://127.0.0.1:3128").expect("valid proxy");

        let err = client.use_proxy("ftp://127.0.0.1:21").expect_err("unsupported");
        assert!(matches!(err, Error::InvalidProxy(_)));
        let proxy = client.transport().proxy().expect("previous proxy kept");
        assert_eq!(proxy.uri().host(), Some("127.0.0.1"));
        assert_eq!(proxy.uri().port_u16(), Some(3128));

        client.clear_proxy();
        assert!(client.transport().proxy().is_none());
    }
}

//! HTTP request descriptor.
//!
//! A [`Request`] is the mutable, in-progress representation of a request
//! before it is sent: method, URL, headers and a single [`Body`].
//!
//! # Example
//!
//! ```
//! use grapple_core::{Method, Request};
//!
//! let mut request = Request::new(Method::Get, "api.example.com/users").expect("valid URL");
//! request.query_set("page", "1");
//! request.insert_header("Accept", "application/json").expect("valid header");
//!
//! assert_eq!(request.url().as_str(), "http://api.example.com/users?page=1");
//! ```

use base64::Engine;
use http::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::{Body, Error, Method, Result, Values};

/// Parse a request URL, defaulting the scheme to `http`.
///
/// - `//host/path` becomes `http://host/path`
/// - `host/path` (no leading `scheme://`) becomes `http://host/path`
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the result is not a valid URL.
///
/// # Example
///
/// ```
/// use grapple_core::normalize_url;
///
/// let url = normalize_url("localhost:8080/ping").expect("valid URL");
/// assert_eq!(url.as_str(), "http://localhost:8080/ping");
/// ```
pub fn normalize_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let url = if raw.starts_with("//") {
        Url::parse(&format!("http:{raw}"))?
    } else if has_scheme(raw) {
        Url::parse(raw)?
    } else {
        Url::parse(&format!("http://{raw}"))?
    };
    Ok(url)
}

/// Whether `raw` starts with `scheme://`.
fn has_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// `Basic <base64(username:password)>` header value, marked sensitive.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if the credentials contain characters
/// not allowed in a header value.
pub fn basic_auth(username: &str, password: &str) -> Result<HeaderValue> {
    let credentials = format!("{username}:{password}");
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
        .map_err(|e| Error::invalid_request(e.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// An HTTP request with method, URL, headers, and body.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Body,
}

impl Request {
    /// Creates a request, normalizing the URL with [`normalize_url`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the URL cannot be parsed.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        normalize_url(url).map(|url| Self::from_url(method, url))
    }

    /// Creates a request from an already parsed URL.
    #[must_use]
    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Mutable access to the URL.
    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header, if it is valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets a header, replacing existing values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an invalid name or value.
    pub fn insert_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Appends a header value, keeping existing ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an invalid name or value.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Adds `name=value` to the `Cookie` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the pair is not a valid header value.
    pub fn add_cookie(&mut self, name: &str, value: &str) -> Result<()> {
        let pair = format!("{name}={value}");
        let cookie = match self.header(COOKIE.as_str()) {
            Some(existing) if !existing.is_empty() => format!("{existing}; {pair}"),
            _ => pair,
        };
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| Error::invalid_request(format!("invalid cookie: {e}")))?;
        self.headers.insert(COOKIE, value);
        Ok(())
    }

    /// Sets `Authorization: Basic <base64(username:password)>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the credentials cannot be encoded as
    /// a header value.
    pub fn basic_auth(&mut self, username: &str, password: &str) -> Result<()> {
        let value = basic_auth(username, password)?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Takes the body out, leaving [`Body::Empty`].
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Declared body length, when statically known.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.body.content_length()
    }

    /// Query parameters of the URL.
    #[must_use]
    pub fn query(&self) -> Values {
        self.url.query().map(Values::parse).unwrap_or_default()
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_get(&self, key: &str) -> Option<String> {
        self.query().get(key).map(str::to_string)
    }

    /// Appends a query parameter value.
    pub fn query_add(&mut self, key: &str, value: &str) {
        let mut query = self.query();
        query.add(key, value);
        self.set_query(&query);
    }

    /// Sets a query parameter, replacing existing values.
    pub fn query_set(&mut self, key: &str, value: &str) {
        let mut query = self.query();
        query.set(key, value);
        self.set_query(&query);
    }

    /// Removes a query parameter.
    pub fn query_del(&mut self, key: &str) {
        let mut query = self.query();
        query.del(key);
        self.set_query(&query);
    }

    /// Replaces the whole query string with `values`, re-encoded.
    pub fn set_query(&mut self, values: &Values) {
        if values.is_empty() {
            self.url.set_query(None);
        } else {
            self.url.set_query(Some(&values.encode()));
        }
    }

    /// Appends an already encoded query fragment, joining with `&`.
    pub fn append_raw_query(&mut self, encoded: &str) {
        if encoded.is_empty() {
            return;
        }
        let query = match self.url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
            _ => encoded.to_string(),
        };
        self.url.set_query(Some(&query));
    }

    /// Clones the request unless its body is a one-shot reader.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        self.body.try_clone().map(|body| Self {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
        })
    }

    /// Clones method, URL and headers, with an empty body.
    #[must_use]
    pub fn clone_head(&self) -> Self {
        Self {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: Body::Empty,
        }
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, Url, HeaderMap, Body) {
        (self.method, self.url, self.headers, self.body)
    }

    /// Rebuild from parts.
    #[must_use]
    pub fn from_parts(method: Method, url: Url, headers: HeaderMap, body: Body) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::invalid_request(format!("invalid header name {name:?}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::invalid_request(format!("invalid value for header {name}: {e}")))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    fn request(url: &str) -> Request {
        Request::new(Method::Get, url).expect("valid URL")
    }

    #[test]
    fn scheme_defaults_to_http() {
        assert_eq!(request("example.com/a").url().scheme(), "http");
        assert_eq!(request("//example.com/a").url().as_str(), "http://example.com/a");
        assert_eq!(request("localhost:3000").url().as_str(), "http://localhost:3000/");
        assert_eq!(request("https://example.com").url().scheme(), "https");
    }

    #[test]
    fn nested_url_in_query_is_not_a_scheme() {
        let url = request("example.com/login?next=http://example.com/home").url().clone();
        check!(url.scheme() == "http");
        check!(url.host_str() == Some("example.com"));
        check!(url.query() == Some("next=http://example.com/home"));

        let url = request("example.com/r/http://other").url().clone();
        check!(url.path() == "/r/http://other");
        check!(request("svn+ssh://example.com/repo").url().scheme() == "svn+ssh");
    }

    #[test]
    fn invalid_url_is_an_error() {
        let err = Request::new(Method::Get, "http://exa mple.com").expect_err("invalid");
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn query_set_overwrites() {
        let mut request = request("example.com/search?q=old");
        request.query_set("q", "rust");
        request.query_set("q", "rust");
        assert_eq!(request.url().query(), Some("q=rust"));
        assert_eq!(request.query_get("q").as_deref(), Some("rust"));
    }

    #[test]
    fn query_add_appends() {
        let mut request = request("example.com/search");
        request.query_add("tag", "a");
        request.query_add("tag", "b c");
        assert_eq!(request.url().query(), Some("tag=a&tag=b+c"));
        assert_eq!(request.query().get_all("tag"), ["a", "b c"]);
    }

    #[test]
    fn query_del_removes_query_string() {
        let mut request = request("example.com/search?q=1");
        request.query_del("q");
        assert_eq!(request.url().query(), None);
        assert!(request.query_get("q").is_none());
    }

    #[test]
    fn append_raw_query_joins_with_ampersand() {
        let mut request = request("example.com/?a=1");
        request.append_raw_query("b=2");
        assert_eq!(request.url().query(), Some("a=1&b=2"));

        let mut request = self::request("example.com/");
        request.append_raw_query("b=2");
        assert_eq!(request.url().query(), Some("b=2"));
    }

    #[test]
    fn headers_are_case_insensitive() {
        let mut request = request("example.com");
        request.insert_header("X-Trace", "1").expect("header");
        request.append_header("x-trace", "2").expect("header");
        assert_eq!(request.header("x-TRACE"), Some("1"));
        assert_eq!(request.headers().get_all("X-Trace").iter().count(), 2);
        assert!(request.insert_header("bad header", "x").is_err());
    }

    #[test]
    fn cookies_accumulate() {
        let mut request = request("example.com");
        request.add_cookie("a", "1").expect("cookie");
        request.add_cookie("b", "2").expect("cookie");
        assert_eq!(request.header("cookie"), Some("a=1; b=2"));
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let mut request = request("example.com");
        request.basic_auth("user", "pass").expect("auth");
        // "user:pass" -> "dXNlcjpwYXNz"
        assert_eq!(request.header("authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn body_replaces_previous_and_reports_length() {
        let mut request = request("example.com");
        request.set_body("first");
        request.set_body(vec![1_u8, 2, 3]);
        assert_eq!(request.content_length(), Some(3));

        request.set_body(Body::reader(std::io::empty()));
        assert_eq!(request.content_length(), None);
        assert!(request.try_clone().is_none());
        assert!(request.clone_head().body().is_empty());
    }
}

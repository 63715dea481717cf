//! Cookie jar middleware.
//!
//! Attaches stored cookies to every hop and stores the `Set-Cookie` headers of
//! every response, redirects included.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};

use bytes::{BufMut, BytesMut};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use tower::{Layer, Service};
use tracing::debug;
use url::Url;

use crate::{Error, Request, Result};

/// In-memory cookie store shared by the clones of a transport.
///
/// # Example
///
/// ```
/// use grapple::Jar;
/// use grapple::url::Url;
///
/// let url = Url::parse("http://example.com/").expect("url");
/// let jar = Jar::new();
/// jar.add_cookie_str("session=abc; Path=/", &url);
///
/// let header = jar.cookies(&url).expect("cookie header");
/// assert_eq!(header, "session=abc");
/// ```
#[derive(Clone, Default)]
pub struct Jar(Arc<RwLock<cookie_store::CookieStore>>);

impl fmt::Debug for Jar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Jar").finish_non_exhaustive()
    }
}

impl Jar {
    /// Create an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a `Set-Cookie` style string as if received from `url`.
    pub fn add_cookie_str(&self, cookie: &str, url: &Url) {
        let cookies = cookie::Cookie::parse(cookie)
            .ok()
            .map(cookie::Cookie::into_owned)
            .into_iter();
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .store_response_cookies(cookies, url);
    }

    /// `Cookie` header value for a request to `url`, if any cookie matches.
    #[must_use]
    pub fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }

    /// Store the `Set-Cookie` headers of a response received from `url`.
    pub fn store(&self, url: &Url, headers: &HeaderMap) {
        let cookies: Vec<_> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| cookie::Cookie::parse(value).ok())
            .map(cookie::Cookie::into_owned)
            .collect();

        if cookies.is_empty() {
            return;
        }
        debug!(count = cookies.len(), url = %url, "storing cookies");
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .store_response_cookies(cookies.into_iter(), url);
    }

    /// Remove every stored cookie.
    pub fn clear(&self) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Join an existing `Cookie` header with the jar's cookies.
fn merge_cookie_header(existing: Option<&HeaderValue>, stored: HeaderValue) -> HeaderValue {
    let Some(existing) = existing.filter(|value| !value.is_empty()) else {
        return stored;
    };
    let mut merged = BytesMut::with_capacity(existing.len() + 2 + stored.len());
    merged.put_slice(existing.as_bytes());
    merged.put_slice(b"; ");
    merged.put_slice(stored.as_bytes());
    HeaderValue::from_maybe_shared(merged.freeze()).unwrap_or(stored)
}

/// Layer adding cookie jar support; a no-op without a jar.
#[derive(Debug, Clone, Default)]
pub struct CookieJarLayer {
    jar: Option<Jar>,
}

impl CookieJarLayer {
    /// Create a layer backed by `jar`.
    #[must_use]
    pub fn new(jar: Option<Jar>) -> Self {
        Self { jar }
    }
}

impl<S> Layer<S> for CookieJarLayer {
    type Service = CookieJar<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieJar {
            inner,
            jar: self.jar.clone(),
        }
    }
}

/// Service that sends and stores cookies.
#[derive(Debug, Clone)]
pub struct CookieJar<S> {
    inner: S,
    jar: Option<Jar>,
}

impl<S, B> Service<Request> for CookieJar<S>
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

    fn call(&mut self, mut request: Request) -> Self::Future {
        let Some(jar) = self.jar.clone() else {
            return Box::pin(self.inner.call(request));
        };
        let url = request.url().clone();
        if let Some(stored) = jar.cookies(&url) {
            let merged = merge_cookie_header(request.headers().get(COOKIE), stored);
            request.headers_mut().insert(COOKIE, merged);
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.call(request).await?;
            jar.store(&url, response.headers());
            Ok(response)
        })
    }
}

//! Follow redirect middleware.
//!
//! Follows 301, 302, 303, 307 and 308 responses carrying a `Location` header.
//! Before each hop the configured [`RedirectPolicy`] decides whether to follow,
//! stop and hand the 3xx to the caller, or fail.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::HeaderValue;
use http::header::{AUTHORIZATION, COOKIE, HOST, LOCATION, REFERER, WWW_AUTHENTICATE};
use tower::{Layer, Service};
use tracing::debug;
use url::Url;

use crate::config::DEFAULT_MAX_REDIRECTS;
use crate::{Error, Method, Request, Result};

/// Decision taken by a [`RedirectPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectAction {
    /// Send the next request.
    Follow,
    /// Return the redirect response to the caller without following it.
    Stop,
}

/// Decides what happens on each redirect.
///
/// `next` is the request about to be sent: method, URL and body are already
/// set for the new hop. Its headers are those of the first request plus
/// `Referer`; `Authorization`, `Cookie` and `WWW-Authenticate` are left out
/// when the new host is neither the first host nor one of its subdomains, and
/// `Host` is left out when the authority changes. `via` holds the requests
/// made so far, oldest first.
///
/// Any `Fn(&mut Request, &[Request]) -> Result<RedirectAction>` is a policy:
///
/// ```
/// use grapple::{RedirectAction, RedirectPolicy, Request};
///
/// let same_host = |next: &mut Request, via: &[Request]| -> grapple::Result<RedirectAction> {
///     let first = via.first().map(|r| r.url().host_str().map(str::to_string));
///     if first == Some(next.url().host_str().map(str::to_string)) {
///         Ok(RedirectAction::Follow)
///     } else {
///         Ok(RedirectAction::Stop)
///     }
/// };
/// fn accepts(_: impl RedirectPolicy) {}
/// accepts(same_host);
/// ```
pub trait RedirectPolicy: Send + Sync {
    /// Inspect, and optionally modify, the next request.
    ///
    /// # Errors
    ///
    /// An error aborts the round trip and is returned from `send`.
    fn check(&self, next: &mut Request, via: &[Request]) -> Result<RedirectAction>;
}

impl<F> RedirectPolicy for F
where
    F: Fn(&mut Request, &[Request]) -> Result<RedirectAction> + Send + Sync,
{
    fn check(&self, next: &mut Request, via: &[Request]) -> Result<RedirectAction> {
        self(next, via)
    }
}

/// Default policy: fail once `max` requests were made, otherwise copy every
/// header of the first request except `Referer`, credentials included.
///
/// `Host` is still only copied while the authority stays the same.
#[derive(Debug, Clone, Copy)]
pub struct DefaultRedirectPolicy {
    max: usize,
}

impl Default for DefaultRedirectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDIRECTS)
    }
}

impl DefaultRedirectPolicy {
    /// Create a policy with the given cap.
    #[must_use]
    pub const fn new(max: usize) -> Self {
        Self { max }
    }
}

impl RedirectPolicy for DefaultRedirectPolicy {
    fn check(&self, next: &mut Request, via: &[Request]) -> Result<RedirectAction> {
        if via.len() >= self.max {
            return Err(Error::TooManyRedirects {
                count: via.len(),
                max: self.max,
            });
        }
        if let Some(first) = via.first() {
            carry_headers(first, next, true);
        }
        Ok(RedirectAction::Follow)
    }
}

/// Copy the headers of `first` onto `next`, except `Referer`.
///
/// `Host` needs the same authority. Credentials need the same host or a
/// subdomain of it unless `keep_credentials` is set.
fn carry_headers(first: &Request, next: &mut Request, keep_credentials: bool) {
    let (from, to) = (first.url(), next.url());
    let same_authority =
        from.host_str() == to.host_str() && from.port_or_known_default() == to.port_or_known_default();
    let trusted = keep_credentials
        || match (to.host_str(), from.host_str()) {
            (Some(to), Some(from)) => is_domain_or_subdomain(to, from),
            _ => false,
        };

    for name in first.headers().keys() {
        let skip = *name == REFERER
            || (*name == HOST && !same_authority)
            || (!trusted && (*name == AUTHORIZATION || *name == COOKIE || *name == WWW_AUTHENTICATE));
        if skip {
            continue;
        }
        next.headers_mut().remove(name);
        for value in first.headers().get_all(name) {
            next.headers_mut().append(name.clone(), value.clone());
        }
    }
}

/// `sub` equals `parent` or ends with `.parent`.
fn is_domain_or_subdomain(sub: &str, parent: &str) -> bool {
    sub.eq_ignore_ascii_case(parent)
        || sub
            .len()
            .checked_sub(parent.len() + 1)
            .and_then(|dot| sub.get(dot..))
            .and_then(|tail| tail.strip_prefix('.'))
            .is_some_and(|tail| tail.eq_ignore_ascii_case(parent))
}

/// Layer that follows HTTP redirects.
#[derive(Clone)]
pub struct FollowRedirectLayer {
    policy: Arc<dyn RedirectPolicy>,
}

impl fmt::Debug for FollowRedirectLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FollowRedirectLayer").finish_non_exhaustive()
    }
}

impl Default for FollowRedirectLayer {
    fn default() -> Self {
        Self::new(Arc::new(DefaultRedirectPolicy::default()))
    }
}

impl FollowRedirectLayer {
    /// Create a layer deciding redirects with `policy`.
    #[must_use]
    pub fn new(policy: Arc<dyn RedirectPolicy>) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for FollowRedirectLayer {
    type Service = FollowRedirect<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FollowRedirect {
            inner,
            policy: Arc::clone(&self.policy),
        }
    }
}

/// Service that follows HTTP redirects.
#[derive(Clone)]
pub struct FollowRedirect<S> {
    inner: S,
    policy: Arc<dyn RedirectPolicy>,
}

impl<S: fmt::Debug> fmt::Debug for FollowRedirect<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FollowRedirect")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

/// Check if a status code is a followed redirect.
fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Resolve a redirect Location URL relative to the request URL.
fn resolve_redirect_url(base_url: &Url, location: &str) -> Result<Url> {
    base_url
        .join(location)
        .map_err(|e| Error::InvalidRedirect(format!("bad Location {location:?}: {e}")))
}

/// `Referer` for a hop from `previous` to `next`.
///
/// Credentials and fragment are stripped; nothing is sent on an
/// https to http downgrade.
fn referer(previous: &Url, next: &Url) -> Option<HeaderValue> {
    if previous.scheme() == "https" && next.scheme() == "http" {
        return None;
    }
    let mut referer = previous.clone();
    let _ = referer.set_username("");
    let _ = referer.set_password(None);
    referer.set_fragment(None);
    HeaderValue::from_str(referer.as_str()).ok()
}

impl<S, B> Service<Request> for FollowRedirect<S>
where
    S: Service<Request, Response = http::Response<B>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = http::Response<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let policy = Arc::clone(&self.policy);

        Box::pin(async move {
            let mut current_request = request;
            let mut via: Vec<Request> = Vec::new();

            loop {
                let replay = current_request.try_clone();
                let sent = current_request.clone_head();

                let response = inner.call(current_request).await?;

                let status = response.status().as_u16();
                if !is_redirect(status) {
                    return Ok(response);
                }

                // A 3xx without Location is handed back as-is
                let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                else {
                    return Ok(response);
                };
                let new_url = resolve_redirect_url(sent.url(), location)?;

                let new_method = sent.method().after_redirect(status);
                let mut next = Request::from_url(new_method, new_url);
                if Method::keeps_body_on_redirect(status) {
                    // Body must be re-sent; a consumed stream cannot be
                    let Some(mut replay) = replay else {
                        debug!(status, "redirect needs a replayable body, not following");
                        return Ok(response);
                    };
                    next.set_body(replay.take_body());
                }
                if let Some(referer) = referer(sent.url(), next.url()) {
                    next.headers_mut().insert(REFERER, referer);
                }

                via.push(sent);
                if let Some(first) = via.first() {
                    carry_headers(first, &mut next, false);
                }
                match policy.check(&mut next, &via)? {
                    RedirectAction::Follow => {}
                    RedirectAction::Stop => return Ok(response),
                }

                debug!(
                    status,
                    method = %next.method(),
                    url = %next.url(),
                    hop = via.len(),
                    "following redirect"
                );
                current_request = next;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> Request {
        Request::new(Method::Get, url).expect("valid URL")
    }

    #[test]
    fn is_redirect_true() {
        assert!(is_redirect(301));
        assert!(is_redirect(302));
        assert!(is_redirect(303));
        assert!(is_redirect(307));
        assert!(is_redirect(308));
    }

    #[test]
    fn is_redirect_false() {
        assert!(!is_redirect(200));
        assert!(!is_redirect(404));
        assert!(!is_redirect(500));
        assert!(!is_redirect(300)); // 300 Multiple Choices is not auto-followed
        assert!(!is_redirect(304)); // 304 Not Modified is not a redirect
    }

    #[test]
    fn resolve_absolute_url() {
        let base = Url::parse("https://example.com/path").expect("base url");
        let result = resolve_redirect_url(&base, "https://other.com/new").expect("resolve");
        assert_eq!(result.as_str(), "https://other.com/new");
    }

    #[test]
    fn resolve_relative_url() {
        let base = Url::parse("https://example.com/old/path").expect("base url");
        let result = resolve_redirect_url(&base, "/new/path").expect("resolve");
        assert_eq!(result.as_str(), "https://example.com/new/path");
    }

    #[test]
    fn resolve_relative_url_without_leading_slash() {
        let base = Url::parse("https://example.com/old/path").expect("base url");
        let result = resolve_redirect_url(&base, "sibling").expect("resolve");
        assert_eq!(result.as_str(), "https://example.com/old/sibling");
    }

    #[test]
    fn referer_strips_credentials_and_fragment() {
        let previous = Url::parse("http://user:pw@example.com/a?x=1#top").expect("url");
        let next = Url::parse("http://example.com/b").expect("url");
        let value = referer(&previous, &next).expect("referer");
        assert_eq!(value, "http://example.com/a?x=1");
    }

    #[test]
    fn referer_omitted_on_downgrade() {
        let previous = Url::parse("https://example.com/a").expect("url");
        let next = Url::parse("http://example.com/b").expect("url");
        assert!(referer(&previous, &next).is_none());
    }

    #[test]
    fn default_policy_copies_first_headers_but_referer() {
        let mut first = request("example.com/start");
        first.insert_header("X-Token", "abc").expect("header");
        first.append_header("Accept", "text/plain").expect("header");
        first.append_header("Accept", "text/html").expect("header");
        first.insert_header("Referer", "http://elsewhere/").expect("header");

        let mut next = request("example.com/next");
        next.insert_header("Referer", "http://example.com/start").expect("header");

        let action = DefaultRedirectPolicy::default()
            .check(&mut next, &[first])
            .expect("follow");

        assert_eq!(action, RedirectAction::Follow);
        assert_eq!(next.header("x-token"), Some("abc"));
        assert_eq!(next.headers().get_all("accept").iter().count(), 2);
        assert_eq!(next.header("referer"), Some("http://example.com/start"));
    }

    #[test]
    fn host_override_stays_on_its_authority() {
        let mut first = request("a.example.com/start");
        first.insert_header("Host", "vhost.example").expect("header");

        let mut same = request("a.example.com/next");
        DefaultRedirectPolicy::default()
            .check(&mut same, std::slice::from_ref(&first))
            .expect("follow");
        assert_eq!(same.header("host"), Some("vhost.example"));

        let mut other = request("b.example.com/next");
        DefaultRedirectPolicy::default()
            .check(&mut other, &[first])
            .expect("follow");
        assert_eq!(other.header("host"), None);
    }

    #[test]
    fn credentials_dropped_for_foreign_host() {
        let mut first = request("example.com/start");
        first.insert_header("Authorization", "Bearer t").expect("header");
        first.insert_header("Cookie", "a=1").expect("header");
        first.insert_header("User-Agent", "grapple").expect("header");

        let mut sub = request("api.example.com/next");
        carry_headers(&first, &mut sub, false);
        assert_eq!(sub.header("authorization"), Some("Bearer t"));

        let mut foreign = request("evil.test/next");
        carry_headers(&first, &mut foreign, false);
        assert_eq!(foreign.header("authorization"), None);
        assert_eq!(foreign.header("cookie"), None);
        assert_eq!(foreign.header("user-agent"), Some("grapple"));

        let mut kept = request("evil.test/next");
        carry_headers(&first, &mut kept, true);
        assert_eq!(kept.header("cookie"), Some("a=1"));
    }

    #[test]
    fn subdomain_matching() {
        assert!(is_domain_or_subdomain("example.com", "example.com"));
        assert!(is_domain_or_subdomain("api.Example.com", "example.com"));
        assert!(!is_domain_or_subdomain("badexample.com", "example.com"));
        assert!(!is_domain_or_subdomain("com", "example.com"));
    }

    #[test]
    fn default_policy_caps_chain() {
        let policy = DefaultRedirectPolicy::new(2);
        let via = [request("example.com/1"), request("example.com/2")];
        let mut next = request("example.com/3");

        let err = policy.check(&mut next, &via).expect_err("too many");
        assert!(matches!(err, Error::TooManyRedirects { count: 2, max: 2 }));
        assert!(policy.check(&mut next, &via[..1]).is_ok());
    }

    #[test]
    fn closures_are_policies() {
        let stop = |_: &mut Request, _: &[Request]| -> Result<RedirectAction> {
            Ok(RedirectAction::Stop)
        };
        let mut next = request("example.com");
        assert_eq!(stop.check(&mut next, &[]).expect("stop"), RedirectAction::Stop);
    }
}

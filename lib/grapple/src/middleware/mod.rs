//! Tower middleware layers of the transport.
//!
//! Every round trip runs through the same stack, outermost first:
//!
//! 1. [`LoggingLayer`] - logs requests/responses using `tracing`
//! 2. [`FollowRedirectLayer`] - follows 3xx responses under a [`RedirectPolicy`]
//! 3. [`CookieJarLayer`] - attaches and stores cookies on every hop
//!
//! The layers operate on [`Request`](crate::Request) and
//! `http::Response<B>`, so each one can be used on its own with any service
//! of that shape.

mod cookie_jar;
mod follow_redirect;
mod logging;

pub use cookie_jar::{CookieJar, CookieJarLayer, Jar};
pub use follow_redirect::{
    DefaultRedirectPolicy, FollowRedirect, FollowRedirectLayer, RedirectAction, RedirectPolicy,
};
pub use logging::{LogLevel, Logging, LoggingLayer};

// Re-export tower types for convenience
pub use tower::{Layer, ServiceBuilder};

//! Client configuration types.

use std::time::Duration;

use grapple_core::CharsetCase;

use crate::middleware::LogLevel;

/// Default maximum number of requests in a redirect chain.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for the whole round trip, body read included. `None` disables it.
    pub timeout: Option<Duration>,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// TCP keepalive interval.
    pub tcp_keepalive: Duration,
    /// Maximum idle connections per host.
    pub pool_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
    /// Redirect cap used by the default redirect policy.
    pub max_redirects: usize,
    /// Casing of the charset token in JSON content types.
    pub charset_case: CharsetCase,
    /// Accept proxy strings without a scheme, assuming `http://`.
    pub lenient_proxy: bool,
    /// Level of the request/response log events.
    pub log_level: LogLevel,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(10),
            tcp_keepalive: Duration::from_secs(30),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            charset_case: CharsetCase::Upper,
            lenient_proxy: true,
            log_level: LogLevel::Debug,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    timeout: Option<Option<Duration>>,
    connect_timeout: Option<Duration>,
    tcp_keepalive: Option<Duration>,
    pool_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
    max_redirects: Option<usize>,
    charset_case: Option<CharsetCase>,
    lenient_proxy: Option<bool>,
    log_level: Option<LogLevel>,
}

impl ClientConfigBuilder {
    /// Set the round-trip timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(Some(timeout));
        self
    }

    /// Disable the round-trip timeout.
    #[must_use]
    pub const fn no_timeout(mut self) -> Self {
        self.timeout = Some(None);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the TCP keepalive interval.
    #[must_use]
    pub const fn tcp_keepalive(mut self, interval: Duration) -> Self {
        self.tcp_keepalive = Some(interval);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = Some(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the redirect cap of the default redirect policy.
    #[must_use]
    pub const fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = Some(max);
        self
    }

    /// Set the charset casing of generated content types.
    #[must_use]
    pub const fn charset_case(mut self, case: CharsetCase) -> Self {
        self.charset_case = Some(case);
        self
    }

    /// Set whether scheme-less proxy strings are accepted.
    #[must_use]
    pub const fn lenient_proxy(mut self, lenient: bool) -> Self {
        self.lenient_proxy = Some(lenient);
        self
    }

    /// Set the level of request/response log events.
    #[must_use]
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            tcp_keepalive: self.tcp_keepalive.unwrap_or(defaults.tcp_keepalive),
            pool_idle_per_host: self
                .pool_idle_per_host
                .unwrap_or(defaults.pool_idle_per_host),
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(defaults.pool_idle_timeout),
            max_redirects: self.max_redirects.unwrap_or(defaults.max_redirects),
            charset_case: self.charset_case.unwrap_or(defaults.charset_case),
            lenient_proxy: self.lenient_proxy.unwrap_or(defaults.lenient_proxy),
            log_level: self.log_level.unwrap_or(defaults.log_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.pool_idle_per_host, 32);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.charset_case, CharsetCase::Upper);
        assert!(config.lenient_proxy);
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_per_host(16)
            .max_redirects(3)
            .charset_case(CharsetCase::Lower)
            .lenient_proxy(false)
            .build();

        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.pool_idle_per_host, 16);
        assert_eq!(config.max_redirects, 3);
        assert_eq!(config.charset_case, CharsetCase::Lower);
        assert!(!config.lenient_proxy);
        assert_eq!(config.tcp_keepalive, Duration::from_secs(30));
    }

    #[test]
    fn builder_can_disable_timeout() {
        let config = ClientConfig::builder().no_timeout().build();
        assert_eq!(config.timeout, None);
    }
}

//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use sechat::{Client, FileCredentialStore};
//!
//! # fn example() -> sechat::Result<()> {
//! let client = Client::builder()
//!     .message_cache_limit(500)
//!     .rate_limit_margin(Duration::from_millis(500))
//!     .credential_store(FileCredentialStore::new(".credentials"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{DEFAULT_MAX_REDIRECTS, Fetch, HttpTransport, Jar};
use crate::util::cache::DEFAULT_CACHE_LIMIT;

use super::core::Client;
use super::credentials::CredentialStore;
use super::queue::DEFAULT_RATE_LIMIT_MARGIN;

// ============================================================================
// Constants
// ============================================================================

/// Default chat host.
pub const DEFAULT_HOST: &str = "chat.stackexchange.com";

/// Default OpenID login page.
pub const DEFAULT_OPENID_LOGIN_URL: &str = "https://openid.stackexchange.com/account/login";

/// Parent domain of the per-site hosts used during login.
const DEFAULT_SITE_DOMAIN: &str = "stackexchange.com";

// ============================================================================
// ClientConfig
// ============================================================================

/// Resolved client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Chat host, without scheme.
    pub host: String,
    /// Parent domain of login sites (`{site}.{site_domain}`).
    pub site_domain: String,
    /// OpenID login page.
    pub openid_login_url: String,
    /// Default per-room message cache capacity.
    pub message_cache_limit: usize,
    /// Extra delay added to every rate-limit backoff.
    pub rate_limit_margin: Duration,
    /// Redirect bound of the default transport.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            site_domain: DEFAULT_SITE_DOMAIN.to_string(),
            openid_login_url: DEFAULT_OPENID_LOGIN_URL.to_string(),
            message_cache_limit: DEFAULT_CACHE_LIMIT,
            rate_limit_margin: DEFAULT_RATE_LIMIT_MARGIN,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl ClientConfig {
    /// Returns the chat origin, e.g. `https://chat.stackexchange.com`.
    #[inline]
    #[must_use]
    pub fn chat_base(&self) -> String {
        format!("https://{}", self.host)
    }

    /// Returns the origin of a login site, e.g. `https://meta.stackexchange.com`.
    #[inline]
    #[must_use]
    pub fn site_base(&self, site: &str) -> String {
        format!("https://{site}.{}", self.site_domain)
    }
}

// ============================================================================
// JoinOptions
// ============================================================================

/// Options for [`Client::join_room`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinOptions {
    /// Message cache capacity; the client default when `None`.
    pub message_cache_limit: Option<usize>,
}

impl JoinOptions {
    /// Creates default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the room's message cache capacity.
    #[inline]
    #[must_use]
    pub fn message_cache_limit(mut self, limit: usize) -> Self {
        self.message_cache_limit = Some(limit);
        self
    }
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ClientBuilder {
    /// Settings collected so far.
    config: ClientConfig,
    /// Where login sessions are persisted.
    credential_store: Option<Arc<dyn CredentialStore>>,
    /// Replacement for the default HTTP transport.
    fetcher: Option<Arc<dyn Fetch>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("credential_store", &self.credential_store.is_some())
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chat host (without scheme).
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the parent domain of login sites.
    #[inline]
    #[must_use]
    pub fn site_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.site_domain = domain.into();
        self
    }

    /// Sets the OpenID login page.
    #[inline]
    #[must_use]
    pub fn openid_login_url(mut self, url: impl Into<String>) -> Self {
        self.config.openid_login_url = url.into();
        self
    }

    /// Sets the default per-room message cache capacity.
    #[inline]
    #[must_use]
    pub fn message_cache_limit(mut self, limit: usize) -> Self {
        self.config.message_cache_limit = limit;
        self
    }

    /// Sets the delay added to every rate-limit backoff.
    #[inline]
    #[must_use]
    pub fn rate_limit_margin(mut self, margin: Duration) -> Self {
        self.config.rate_limit_margin = margin;
        self
    }

    /// Sets the redirect bound of the default transport.
    #[inline]
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    /// Persists login sessions in `store`.
    #[must_use]
    pub fn credential_store(mut self, store: impl CredentialStore + 'static) -> Self {
        self.credential_store = Some(Arc::new(store));
        self
    }

    /// Issues every request through `fetcher` instead of the default transport.
    ///
    /// The client's jar is then only filled by credential imports.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Client`] if the host is empty
    /// - [`Error::Http`] if the default transport cannot be initialized
    pub fn build(self) -> Result<Client> {
        self.validate()?;

        let jar = Arc::new(Jar::new());
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(
                HttpTransport::new(Arc::clone(&jar))?.with_max_redirects(self.config.max_redirects),
            ),
        };

        Ok(Client::new(self.config, jar, fetcher, self.credential_store))
    }

    /// Validates the collected settings.
    fn validate(&self) -> Result<()> {
        let host = self.config.host.trim();
        if host.is_empty() || host.contains("://") || host.contains('/') {
            return Err(Error::client(format!(
                "Invalid chat host {:?}. Use a bare host name such as \"{DEFAULT_HOST}\".",
                self.config.host
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.chat_base(), "https://chat.stackexchange.com");
        assert_eq!(config.site_base("meta"), "https://meta.stackexchange.com");
        assert_eq!(config.message_cache_limit, 10_000);
        assert_eq!(config.rate_limit_margin, Duration::from_millis(250));
        assert_eq!(config.max_redirects, 20);
    }

    #[test]
    fn test_setters() {
        let builder = ClientBuilder::new()
            .host("chat.meta.stackexchange.com")
            .message_cache_limit(5)
            .max_redirects(3);
        assert_eq!(builder.config.host, "chat.meta.stackexchange.com");
        assert_eq!(builder.config.message_cache_limit, 5);
        assert_eq!(builder.config.max_redirects, 3);
        assert!(builder.fetcher.is_none());
    }

    #[test]
    fn test_build_default_transport() {
        let client = tokio_test::assert_ok!(ClientBuilder::new().max_redirects(2).build());
        assert!(!client.is_logged_in());
        assert_eq!(client.config().host, DEFAULT_HOST);
    }

    #[test]
    fn test_invalid_host_rejected() {
        for host in ["", "https://chat.stackexchange.com", "chat.se/rooms"] {
            let error = tokio_test::assert_err!(ClientBuilder::new().host(host).build());
            assert!(matches!(error, Error::Client { .. }), "host {host:?}");
        }
    }

    #[test]
    fn test_join_options() {
        assert_eq!(JoinOptions::new().message_cache_limit, None);
        assert_eq!(JoinOptions::new().message_cache_limit(7).message_cache_limit, Some(7));
    }
}

//! Cookie-aware HTTP transport.
//!
//! Issues one request at a time through `reqwest`, with redirects and
//! cookie handling done here rather than by the HTTP library:
//!
//! 1. `Accept: */*` is added unless the caller set it
//! 2. `Cookie` is built from the [`Jar`] for the request host
//! 3. A form payload turns the request into a URL-encoded POST
//! 4. Every `Set-Cookie` in the response goes back into the jar
//! 5. Status 300/301/302 re-issues a plain GET to `Location`
//!
//! Redirect chains are bounded by `max_redirects`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

use super::jar::Jar;

// ============================================================================
// Constants
// ============================================================================

/// Default bound on redirect hops for one request.
pub const DEFAULT_MAX_REDIRECTS: usize = 20;

/// Content type of form payloads.
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// ============================================================================
// RequestOptions
// ============================================================================

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Form fields; when set the request is a POST.
    pub payload: Option<Vec<(String, String)>>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Overall timeout for this request (no timeout when `None`).
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Creates empty options (plain GET).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the form payload, making the request a POST.
    #[must_use]
    pub fn payload<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.payload = Some(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the URL-encoded form body, if a payload is set.
    #[must_use]
    pub fn encoded_payload(&self) -> Option<String> {
        self.payload.as_ref().map(|fields| encode_form(fields))
    }

    /// Returns `true` if a header with this name was set (case-insensitive).
    fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// HttpResponse
// ============================================================================

/// Final (non-redirect) response of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body decoded as text.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response.
    #[inline]
    #[must_use]
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }
}

// ============================================================================
// Fetch
// ============================================================================

/// Something that can perform an HTTP request.
///
/// [`HttpTransport`] is the real implementation; clients accept any
/// implementation so the session logic can run against scripted responses.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Performs a request and returns the final response.
    async fn fetch(&self, url: &str, options: RequestOptions) -> Result<HttpResponse>;
}

// ============================================================================
// HttpTransport
// ============================================================================

/// HTTP transport bound to one cookie jar.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    jar: Arc<Jar>,
    max_redirects: usize,
}

impl HttpTransport {
    /// Creates a transport storing cookies in `jar`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the TLS backend cannot be initialized.
    pub fn new(jar: Arc<Jar>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            jar,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        })
    }

    /// Sets the redirect bound.
    #[inline]
    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Returns the jar this transport reads and writes.
    #[inline]
    #[must_use]
    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    /// Performs a request, following redirects.
    ///
    /// A URL without scheme is treated as `http://`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the URL or a redirect target is invalid
    /// - [`Error::Http`] on connection or body read failure
    /// - [`Error::TooManyRedirects`] if the chain exceeds `max_redirects`
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        let mut target = resolve_url(url)?;
        let mut options = options;

        for hop in 0..=self.max_redirects {
            match self.send_once(&target, &options).await? {
                Outcome::Done(response) => return Ok(response),
                Outcome::Redirect(next) => {
                    debug!(hop, from = %target, to = %next, "Following redirect");
                    target = next;
                    options = RequestOptions {
                        timeout: options.timeout,
                        ..RequestOptions::default()
                    };
                }
            }
        }

        Err(Error::too_many_redirects(url, self.max_redirects))
    }

    /// Sends a single request without following redirects.
    async fn send_once(&self, url: &Url, options: &RequestOptions) -> Result<Outcome> {
        let domain = url.host_str().unwrap_or_default().to_string();
        let body = options.encoded_payload();
        let method = if body.is_some() {
            Method::POST
        } else {
            Method::GET
        };

        let mut builder = self.client.request(method.clone(), url.clone());

        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if !options.has_header(ACCEPT.as_str()) {
            builder = builder.header(ACCEPT, "*/*");
        }

        let cookies = self.jar.get_cookies(&domain);
        if !cookies.is_empty() {
            builder = builder.header(COOKIE, cookies);
        }

        if let Some(body) = body {
            if !body.is_empty() {
                builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
            }
            builder = builder.body(body);
        }

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        trace!(%method, %url, "Sending request");
        let response = builder.send().await?;
        let status = response.status();

        for header in response.headers().get_all(SET_COOKIE) {
            if let Ok(raw) = header.to_str() {
                self.jar.add_cookie(&domain, raw);
            }
        }

        if is_followed_redirect(status)
            && let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
        {
            return Ok(Outcome::Redirect(url.join(location)?));
        }

        let body = response.text().await?;
        trace!(status = status.as_u16(), bytes = body.len(), "Response received");

        Ok(Outcome::Done(HttpResponse::new(status.as_u16(), body)))
    }
}

#[async_trait]
impl Fetch for HttpTransport {
    async fn fetch(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(url, options).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Result of a single hop.
enum Outcome {
    Done(HttpResponse),
    Redirect(Url),
}

/// Only 300, 301 and 302 are followed; 303/307/308 are returned as-is.
#[inline]
fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 300..=302)
}

/// Parses `url`, defaulting the scheme to `http`.
pub(crate) fn resolve_url(url: &str) -> Result<Url> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(Url::parse(url)?)
    } else {
        Ok(Url::parse(&format!("http://{url}"))?)
    }
}

/// Encodes form fields as `application/x-www-form-urlencoded`.
pub(crate) fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// Tests
// ============================================================================

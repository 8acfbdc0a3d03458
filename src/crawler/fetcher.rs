//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Plain GET requests with redirect following
//! - Delegating client-rendered pages to a rendering service
//! - Error classification (timeout, connect, transport)
//!
//! Retries are not done here. A failed fetch is reported to the frontier,
//! which schedules the next attempt with backoff.

use crate::config::{Config, UserAgentConfig};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, FROM, RETRY_AFTER};
use reqwest::{redirect::Policy, Client};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed for one fetch
pub const MAX_REDIRECTS: usize = 10;

/// Body cap used when no configuration is given (10 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Retry-After ceiling used when no configuration is given
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// How a page should be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderHint {
    /// Plain HTTP GET
    Plain,
    /// Through the rendering service when one is configured
    Render,
}

/// A completed HTTP exchange, whatever its status
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// URL after redirects
    pub final_url: Url,
    pub elapsed: Duration,
    pub content_type: Option<String>,
    /// Parsed `Retry-After`, if the server sent one
    pub retry_after: Option<Duration>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Statuses worth another attempt later
    pub fn is_transient_status(&self) -> bool {
        self.status == 408 || self.status == 429 || (500..600).contains(&self.status)
    }

    /// Whether the body should be parsed as HTML
    ///
    /// Falls back to sniffing the first non-blank byte when the server sent no
    /// `Content-Type`.
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            Some(content_type) => {
                let mime = content_type
                    .split(';')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_ascii_lowercase();
                mime == "text/html" || mime == "application/xhtml+xml"
            }
            None => self
                .body
                .iter()
                .find(|b| !b.is_ascii_whitespace())
                .map(|b| *b == b'<')
                .unwrap_or(false),
        }
    }
}

/// Transport-level fetch failures; all of them are transient
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    fn from_reqwest(url: &Url, error: reqwest::Error) -> Self {
        let url = url.to_string();
        if error.is_timeout() {
            FetchError::Timeout { url }
        } else if error.is_connect() {
            FetchError::Connect {
                url,
                message: error.to_string(),
            }
        } else {
            FetchError::Transport {
                url,
                message: error.to_string(),
            }
        }
    }
}

/// Performs one network fetch
///
/// Implementations must be safe to call from many workers at once.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, hint: RenderHint) -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// The `User-Agent` follows `CrawlerName/Version (+ContactURL; ContactEmail)`
/// and every request carries a `From` header with the contact address.
///
/// # Example
///
/// ```no_run
/// use sumi_crawl::config::UserAgentConfig;
/// use sumi_crawl::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig::default();
/// let client = build_http_client(&config, Duration::from_secs(20)).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if let Ok(from) = HeaderValue::from_str(&config.contact_email) {
        headers.insert(FROM, from);
    }

    Client::builder()
        .user_agent(config.header_value())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default fetcher backed by reqwest
pub struct HttpFetcher {
    client: Client,
    render_endpoint: Option<Url>,
    max_body_bytes: usize,
    max_retry_after: Duration,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, config.crawler.fetch_timeout())?;
        let render_endpoint = if config.render.enabled {
            config
                .render
                .endpoint
                .as_deref()
                .and_then(|endpoint| Url::parse(endpoint).ok())
        } else {
            None
        };
        Ok(Self::with_client(client, render_endpoint)
            .with_limits(config.crawler.max_body_bytes, config.retry.max_delay()))
    }

    pub fn with_client(client: Client, render_endpoint: Option<Url>) -> Self {
        Self {
            client,
            render_endpoint,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
        }
    }

    /// Caps the body size kept per response and the honoured Retry-After
    pub fn with_limits(mut self, max_body_bytes: usize, max_retry_after: Duration) -> Self {
        self.max_body_bytes = max_body_bytes;
        self.max_retry_after = max_retry_after;
        self
    }

    /// The URL actually requested for the given hint
    fn request_url(&self, url: &Url, hint: RenderHint) -> Url {
        match (hint, &self.render_endpoint) {
            (RenderHint::Render, Some(endpoint)) => {
                let mut target = endpoint.clone();
                target.query_pairs_mut().append_pair("url", url.as_str());
                target
            }
            _ => url.clone(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, hint: RenderHint) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let target = self.request_url(url, hint);
        let via_renderer = target != *url;

        let mut response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&target, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after)
            .map(|wait| wait.min(self.max_retry_after));
        // The renderer answers for the page; keep the page's own URL as base
        let final_url = if via_renderer {
            url.clone()
        } else {
            response.url().clone()
        };

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(&target, e))?
        {
            let room = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                tracing::warn!(url = %url, limit = self.max_body_bytes, "Response body too large, truncating");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        tracing::trace!(url = %url, status, bytes = body.len(), ?hint, "Fetched");

        Ok(FetchResponse {
            status,
            body,
            final_url,
            elapsed: started.elapsed(),
            content_type,
            retry_after,
        })
    }
}

/// Parses a `Retry-After` value: delta-seconds or an HTTP date
///
/// Values are not capped here; `HttpFetcher` applies its configured ceiling.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

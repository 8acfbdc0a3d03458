//! Shared fixtures: test configuration, a scripted fetcher and run helpers

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sumi_crawl::config::{Config, RetryConfig};
use sumi_crawl::crawler::{
    CrawlContext, CrawlControl, CrawlReport, FetchError, FetchResponse, Fetcher, RenderHint,
};
use sumi_crawl::storage::SqliteFrontier;
use sumi_crawl::Coordinator;
use url::Url;

/// A fast, quiet configuration rooted at `dir`
pub fn test_config(dir: &Path, seeds: &[&str]) -> Config {
    let mut config = Config::default();
    config.seeds = seeds.iter().map(|s| s.to_string()).collect();

    config.crawler.max_pages = 100;
    config.crawler.max_depth = 2;
    config.crawler.workers = 4;
    config.crawler.fetch_timeout_sec = 5;

    config.politeness.min_delay_ms = 0;
    config.politeness.max_concurrency_per_domain = 2;
    config.politeness.robots_fetch_attempts = 1;
    config.politeness.robots_retry_delay_ms = 1;

    config.retry = RetryConfig {
        max_retries: 3,
        base_delay_ms: 10,
        max_delay_ms: 50,
        backoff_multiplier: 2.0,
    };

    config.output.data_root = dir.to_path_buf();
    config.output.checkpoint_interval_sec = 1;
    config.output.checkpoint_every_pages = 5;
    config
}

/// An HTML page linking to each of `links`
pub fn html_page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">link</a>\n", href))
        .collect();
    format!(
        "<!doctype html><html lang=\"en\"><head><title>{}</title></head><body><p>Some text.</p>{}</body></html>",
        title, anchors
    )
}

/// A canned reply
#[derive(Debug, Clone)]
pub enum Scripted {
    Html(String),
    Status(u16, Option<Duration>),
    Error,
}

/// In-process fetcher with per-URL scripts and a fetch log
///
/// Each URL plays its script in order and repeats the last entry. Unknown
/// URLs (robots.txt included) answer 404. robots.txt requests are not logged.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    latency: Duration,
    log: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn page(self, url: &str, body: String) -> Self {
        self.script(url, vec![Scripted::Html(body)])
    }

    pub fn robots(self, origin: &str, body: &str) -> Self {
        let url = format!("{}/robots.txt", origin.trim_end_matches('/'));
        self.script(&url, vec![Scripted::Html(body.to_string())])
    }

    pub fn script(self, url: &str, replies: Vec<Scripted>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
        self
    }

    /// Every non-robots fetch, in start order
    pub fn log(&self) -> Vec<(String, Instant)> {
        self.log.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    pub fn total_fetches(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> Scripted {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(replies) if replies.len() > 1 => replies.pop_front().unwrap(),
            Some(replies) => replies.front().cloned().unwrap_or(Scripted::Status(404, None)),
            None => Scripted::Status(404, None),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url, _hint: RenderHint) -> Result<FetchResponse, FetchError> {
        let key = url.to_string();
        let is_robots = url.path() == "/robots.txt";
        if !is_robots {
            self.log.lock().unwrap().push((key.clone(), Instant::now()));
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let reply = self.next_reply(&key);

        if !is_robots {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let (status, body, content_type, retry_after) = match reply {
            Scripted::Html(body) => (200, body, "text/html", None),
            Scripted::Status(status, retry_after) => (status, String::new(), "text/html", retry_after),
            Scripted::Error => {
                return Err(FetchError::Connect {
                    url: key,
                    message: "connection refused".to_string(),
                })
            }
        };

        Ok(FetchResponse {
            status,
            body: body.into_bytes(),
            final_url: url.clone(),
            elapsed: self.latency,
            content_type: Some(content_type.to_string()),
            retry_after,
        })
    }
}

pub fn open_frontier(config: &Config) -> SqliteFrontier {
    SqliteFrontier::open(&config.output.database_path(), config.retry.clone()).unwrap()
}

/// Runs one coordinator session against the scripted fetcher
pub async fn run_session(
    config: &Config,
    fetcher: Arc<ScriptedFetcher>,
    control: &CrawlControl,
    restart: bool,
) -> sumi_crawl::Result<CrawlReport> {
    let frontier = Arc::new(SqliteFrontier::open(
        &config.output.database_path(),
        config.retry.clone(),
    )?);
    let ctx = Arc::new(CrawlContext::new(config.clone(), frontier, fetcher));
    Coordinator::new(ctx, control).with_restart(restart).run().await
}

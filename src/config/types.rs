use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Crawl
///
/// Every section has defaults, so an empty file (or no file at all, with
/// seeds given on the command line) is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seed URLs the crawl starts from (depth 0)
    pub seeds: Vec<String>,
    pub crawler: CrawlerConfig,
    pub politeness: PolitenessConfig,
    pub retry: RetryConfig,
    pub scope: ScopeConfig,
    pub render: RenderConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Page budget: the crawl stops once this many pages are Done
    pub max_pages: u64,

    /// Maximum depth to crawl from seed URLs
    pub max_depth: u32,

    /// Size of the worker pool
    pub workers: usize,

    /// Maximum claimed records held back by politeness (0 = twice the workers)
    pub max_held: usize,

    /// Hard per-fetch timeout (seconds)
    pub fetch_timeout_sec: u64,

    /// URLs longer than this are rejected by the normalizer
    pub max_url_length: usize,

    /// At most this many links are taken from a single page
    pub max_links_per_page: usize,

    /// Persist HTML bodies into the content repository
    pub store_html: bool,

    /// Response bodies are truncated to this many bytes
    pub max_body_bytes: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 500,
            max_depth: 3,
            workers: 8,
            max_held: 0,
            fetch_timeout_sec: 20,
            max_url_length: 2048,
            max_links_per_page: 1000,
            store_html: true,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl CrawlerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_sec)
    }

    /// Effective bound on politeness-held records
    pub fn held_capacity(&self) -> usize {
        if self.max_held == 0 {
            self.workers.saturating_mul(2).max(1)
        } else {
            self.max_held
        }
    }
}

/// Per-domain politeness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Minimum time between two dispatches to the same domain (milliseconds)
    pub min_delay_ms: u64,

    /// Maximum concurrent fetches against one domain
    pub max_concurrency_per_domain: usize,

    /// Honour robots.txt rules
    pub respect_robots: bool,

    /// Treat an unreachable robots.txt as "allow all" instead of "disallow all"
    pub robots_fail_open: bool,

    /// Attempts made to fetch robots.txt before declaring it unreachable
    pub robots_fetch_attempts: u32,

    /// Pause between robots.txt attempts (milliseconds)
    pub robots_retry_delay_ms: u64,

    /// Ceiling applied to a robots.txt Crawl-delay (seconds)
    pub max_crawl_delay_sec: u64,

    /// How long a domain is held back after serving a CAPTCHA challenge (seconds)
    pub captcha_quarantine_sec: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1000,
            max_concurrency_per_domain: 2,
            respect_robots: true,
            robots_fail_open: true,
            robots_fetch_attempts: 3,
            robots_retry_delay_ms: 500,
            max_crawl_delay_sec: 60,
            captcha_quarantine_sec: 900,
        }
    }
}

impl PolitenessConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_crawl_delay(&self) -> Duration {
        Duration::from_secs(self.max_crawl_delay_sec)
    }

    pub fn captcha_quarantine(&self) -> Duration {
        Duration::from_secs(self.captcha_quarantine_sec)
    }
}

/// Retry and backoff configuration for failed fetches
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Failed attempts a URL may accumulate before it is terminal Failed
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,

    /// Upper bound for any retry delay (milliseconds)
    pub max_delay_ms: u64,

    /// Growth factor applied per attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Longest delay any retry (or a server's Retry-After) may impose
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay before the record becomes eligible again after its `attempt`-th failure
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Which domains the crawl is allowed to enter
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScopeConfig {
    /// Domain patterns ("example.com" or "*.example.com"); empty means the seed hosts
    pub allowed_domains: Vec<String>,

    /// Also admit subdomains of allowed hosts
    pub follow_subdomains: bool,

    /// Record out-of-scope links as graph edges
    pub record_out_of_scope: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            follow_subdomains: true,
            record_out_of_scope: true,
        }
    }
}

/// JS rendering delegation
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RenderConfig {
    /// Re-queue client-rendered pages for a rendering fetch
    pub enabled: bool,

    /// Rendering service, called as `GET <endpoint>?url=<page>`
    pub endpoint: Option<String>,

    /// Pages with less visible text than this are considered client-rendered
    pub min_text_length: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            min_text_length: 1000,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiCrawl".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.org/sumi-crawl".to_string(),
            contact_email: "crawler@example.org".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Root directory for state, content repository and reports
    pub data_root: PathBuf,

    /// Seconds between periodic checkpoints
    pub checkpoint_interval_sec: u64,

    /// Completed pages between periodic checkpoints
    pub checkpoint_every_pages: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./data"),
            checkpoint_interval_sec: 10,
            checkpoint_every_pages: 50,
        }
    }
}

impl OutputConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.data_root.join("state")
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir().join("frontier.db")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir().join("checkpoint.json")
    }

    pub fn repository_dir(&self) -> PathBuf {
        self.data_root.join("repository")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_root.join("reports")
    }
}

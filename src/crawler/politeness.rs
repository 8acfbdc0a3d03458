//! Per-domain politeness: robots.txt verdicts, dispatch spacing and
//! concurrency caps
//!
//! The coordinator asks for a reservation before dispatching a claimed record
//! and releases it when the worker reports back. Workers ask for the robots
//! verdict, which loads robots.txt on first contact with a domain.

use crate::config::Config;
use crate::crawler::Fetcher;
use crate::robots::{RobotsCache, RobotsRules, RobotsSettings};
use crate::state::{instant_after, DomainState, Reservation};
use crate::url::{domain_key, robots_path};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Shared politeness state for one crawl
pub struct PolitenessPolicy {
    robots: RobotsCache,
    domains: Mutex<HashMap<String, DomainState>>,
    min_delay: Duration,
    max_crawl_delay: Duration,
    captcha_quarantine: Duration,
    max_per_domain: usize,
    fetcher: Arc<dyn Fetcher>,
}

impl PolitenessPolicy {
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>) -> Self {
        let politeness = &config.politeness;
        let settings = RobotsSettings {
            enabled: politeness.respect_robots,
            user_agent: config.user_agent.crawler_name.clone(),
            fail_open: politeness.robots_fail_open,
            attempts: politeness.robots_fetch_attempts.max(1),
            retry_delay: Duration::from_millis(politeness.robots_retry_delay_ms),
            fetch_timeout: config.crawler.fetch_timeout(),
        };

        Self {
            robots: RobotsCache::new(settings),
            domains: Mutex::new(HashMap::new()),
            min_delay: politeness.min_delay(),
            max_crawl_delay: politeness.max_crawl_delay(),
            captcha_quarantine: politeness.captcha_quarantine(),
            max_per_domain: politeness.max_concurrency_per_domain.max(1),
            fetcher,
        }
    }

    fn domains(&self) -> MutexGuard<'_, HashMap<String, DomainState>> {
        // Counters and instants only; still consistent after a poisoning panic
        self.domains.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_rules(&self, domain: &str, state: &mut DomainState, rules: &RobotsRules) {
        state.robots_resolved = true;
        state.crawl_delay = rules.crawl_delay().map(|delay| {
            if delay > self.max_crawl_delay {
                tracing::info!(
                    domain,
                    declared_sec = delay.as_secs(),
                    ceiling_sec = self.max_crawl_delay.as_secs(),
                    "Crawl-delay above ceiling, clamping"
                );
            }
            delay.min(self.max_crawl_delay)
        });
    }

    /// Robots verdict for the URL, loading robots.txt on first contact
    ///
    /// The robots.txt request counts as a dispatch to the domain: the worker
    /// that sent it waits out the domain's interval before its page fetch.
    pub async fn may_fetch(&self, url: &Url) -> bool {
        let domain = domain_key(url);
        let lookup = self
            .robots
            .rules_for(&domain, url, self.fetcher.as_ref())
            .await;

        let spacing = {
            let mut domains = self.domains();
            let state = domains.entry(domain.clone()).or_default();
            if !state.robots_resolved {
                self.apply_rules(&domain, state, &lookup.rules);
            }
            if lookup.fetched {
                state.last_dispatch = Some(Instant::now());
                Some(state.min_interval(self.min_delay))
            } else {
                None
            }
        };

        let allowed = lookup.rules.is_allowed(&robots_path(url));
        if let Some(wait) = spacing.filter(|wait| allowed && !wait.is_zero()) {
            tracing::trace!(domain = %domain, wait_ms = wait.as_millis() as u64, "Spacing page fetch after robots.txt");
            tokio::time::sleep(wait).await;
            if let Some(state) = self.domains().get_mut(&domain) {
                state.last_dispatch = Some(Instant::now());
            }
        }
        allowed
    }

    /// Verdict from already-loaded rules; `None` when robots.txt is not yet known
    pub fn cached_verdict(&self, url: &Url) -> Option<bool> {
        let rules = self.robots.cached(&domain_key(url))?;
        Some(rules.is_allowed(&robots_path(url)))
    }

    /// Tries to take a dispatch slot for the domain now
    pub fn reserve(&self, domain: &str) -> Reservation {
        self.reserve_at(domain, Instant::now())
    }

    pub fn reserve_at(&self, domain: &str, now: Instant) -> Reservation {
        let cached = self.robots.cached(domain);
        let mut domains = self.domains();
        let state = domains.entry(domain.to_string()).or_default();
        if !state.robots_resolved {
            if let Some(rules) = cached {
                self.apply_rules(domain, state, &rules);
            }
        }
        state.try_reserve(now, self.min_delay, self.max_per_domain)
    }

    /// Returns a slot after the worker finished
    pub fn release(&self, domain: &str) {
        if let Some(state) = self.domains().get_mut(domain) {
            state.release();
        }
    }

    /// Holds the domain back for `duration` (429 handling)
    pub fn penalize(&self, domain: &str, duration: Duration) {
        let until = instant_after(Instant::now(), duration);
        self.domains()
            .entry(domain.to_string())
            .or_default()
            .penalize(until);
        tracing::debug!(domain, wait_ms = duration.as_millis() as u64, "Domain penalized");
    }

    /// Quarantines a domain that answered with a CAPTCHA challenge
    pub fn quarantine(&self, domain: &str) {
        tracing::warn!(
            domain,
            quarantine_sec = self.captcha_quarantine.as_secs(),
            "CAPTCHA challenge detected, quarantining domain"
        );
        self.penalize(domain, self.captcha_quarantine);
    }

    pub fn captcha_quarantine(&self) -> Duration {
        self.captcha_quarantine
    }

    pub fn in_flight(&self, domain: &str) -> usize {
        self.domains().get(domain).map(|s| s.in_flight).unwrap_or(0)
    }

    /// Earliest instant the domain accepts another dispatch
    pub fn next_allowed(&self, domain: &str) -> Option<Instant> {
        self.domains()
            .get(domain)
            .and_then(|s| s.next_allowed(self.min_delay))
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{FetchError, FetchResponse, RenderHint};
    use crate::state::WaitReason;
    use async_trait::async_trait;

    struct StaticRobots(&'static str);

    #[async_trait]
    impl Fetcher for StaticRobots {
        async fn fetch(&self, url: &Url, _hint: RenderHint) -> Result<FetchResponse, FetchError> {
            Ok(FetchResponse {
                status: 200,
                body: self.0.as_bytes().to_vec(),
                final_url: url.clone(),
                elapsed: Duration::ZERO,
                content_type: Some("text/plain".to_string()),
                retry_after: None,
            })
        }
    }

    fn policy(robots: &'static str, min_delay_ms: u64, per_domain: usize) -> PolitenessPolicy {
        let mut config = Config::default();
        config.politeness.min_delay_ms = min_delay_ms;
        config.politeness.max_concurrency_per_domain = per_domain;
        PolitenessPolicy::new(&config, Arc::new(StaticRobots(robots)))
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_may_fetch_honours_disallow() {
        let policy = policy("User-agent: *\nDisallow: /private/", 0, 2);
        assert_eq!(policy.cached_verdict(&url("https://example.com/private/a")), None);

        assert!(!policy.may_fetch(&url("https://example.com/private/a")).await);
        assert!(policy.may_fetch(&url("https://example.com/public")).await);
        assert_eq!(
            policy.cached_verdict(&url("https://example.com/private/b")),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_single_dispatch_until_robots_resolved() {
        let policy = policy("User-agent: *\nDisallow:", 0, 3);
        let now = Instant::now();

        assert!(policy.reserve_at("example.com", now).is_acquired());
        assert!(matches!(
            policy.reserve_at("example.com", now),
            Reservation::MustWait {
                reason: WaitReason::Concurrency,
                ..
            }
        ));

        policy.may_fetch(&url("https://example.com/")).await;
        let now = Instant::now();
        assert!(policy.reserve_at("example.com", now).is_acquired());
        assert!(policy.reserve_at("example.com", now).is_acquired());
        assert_eq!(policy.in_flight("example.com"), 3);
    }

    #[tokio::test]
    async fn test_crawl_delay_extends_interval() {
        let policy = policy("", 100, 1);
        policy.robots.insert(
            "example.com",
            RobotsRules::parse("User-agent: *\nCrawl-delay: 2", "SumiCrawl"),
        );

        let now = Instant::now();
        assert!(policy.reserve_at("example.com", now).is_acquired());
        policy.release("example.com");

        match policy.reserve_at("example.com", now + Duration::from_millis(500)) {
            Reservation::MustWait { wait, reason } => {
                assert_eq!(reason, WaitReason::Interval);
                assert_eq!(wait, Duration::from_millis(1500));
            }
            other => panic!("expected wait, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let policy = policy("", 1000, 1);
        let now = Instant::now();
        assert!(policy.reserve_at("a.example", now).is_acquired());
        assert!(policy.reserve_at("b.example", now).is_acquired());
        policy.release("a.example");
        assert!(!policy.reserve_at("a.example", now).is_acquired());
    }

    #[tokio::test]
    async fn test_penalty_blocks_dispatch() {
        let policy = policy("", 0, 1);
        policy.may_fetch(&url("https://example.com/")).await;
        policy.penalize("example.com", Duration::from_secs(30));
        assert!(!policy.reserve("example.com").is_acquired());
        assert!(policy.next_allowed("example.com").is_some());
    }

    #[tokio::test]
    async fn test_huge_penalty_does_not_overflow() {
        let policy = policy("", 0, 1);
        policy.penalize("example.com", Duration::from_secs(u64::MAX));
        policy.penalize("example.com", Duration::MAX);
        assert!(!policy.reserve("example.com").is_acquired());
    }

    #[tokio::test]
    async fn test_crawl_delay_clamped_to_ceiling() {
        let policy = policy("", 0, 1);
        policy.robots.insert(
            "example.com",
            RobotsRules::parse("User-agent: *\nCrawl-delay: 10000000000000000000", "SumiCrawl"),
        );

        let now = Instant::now();
        assert!(policy.reserve_at("example.com", now).is_acquired());
        policy.release("example.com");
        assert_eq!(
            policy.reserve_at("example.com", now),
            Reservation::MustWait {
                wait: Duration::from_secs(60),
                reason: WaitReason::Interval
            }
        );
    }

    #[tokio::test]
    async fn test_robots_request_counts_as_dispatch() {
        let policy = policy("User-agent: *\nDisallow:", 150, 2);

        let started = Instant::now();
        assert!(policy.may_fetch(&url("https://example.com/a")).await);
        assert!(started.elapsed() >= Duration::from_millis(140));
        assert!(matches!(
            policy.reserve("example.com"),
            Reservation::MustWait {
                reason: WaitReason::Interval,
                ..
            }
        ));

        // Rules are cached now; no further spacing inside may_fetch
        let started = Instant::now();
        assert!(policy.may_fetch(&url("https://example.com/b")).await);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_quarantine_holds_domain() {
        let policy = policy("", 0, 1);
        policy.may_fetch(&url("https://example.com/")).await;
        policy.quarantine("example.com");

        let wait = policy
            .next_allowed("example.com")
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap();
        assert!(wait > Duration::from_secs(800));
        assert!(!policy.reserve("example.com").is_acquired());
    }

    #[tokio::test]
    async fn test_release_unknown_domain_is_noop() {
        let policy = policy("", 0, 1);
        policy.release("never-seen.example");
        assert_eq!(policy.in_flight("never-seen.example"), 0);
    }
}

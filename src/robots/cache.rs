//! Per-domain robots.txt cache
//!
//! Rules are loaded lazily on the first request for a domain and kept for the
//! lifetime of the crawl process. Concurrent callers for the same domain
//! share one fetch.

use crate::crawler::{Fetcher, RenderHint};
use crate::robots::{RobotsOrigin, RobotsRules};
use crate::url::robots_url;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

/// How robots.txt is fetched and what happens when it cannot be
#[derive(Debug, Clone)]
pub struct RobotsSettings {
    /// When false every domain is allow-all and nothing is fetched
    pub enabled: bool,
    /// Token matched against `User-agent` lines
    pub user_agent: String,
    /// Allow everything when robots.txt stays unreachable (else disallow everything)
    pub fail_open: bool,
    pub attempts: u32,
    pub retry_delay: Duration,
    pub fetch_timeout: Duration,
}

type Slot = Arc<OnceCell<Arc<RobotsRules>>>;

/// Rules for a domain, and whether this lookup sent the robots.txt request
#[derive(Debug, Clone)]
pub struct RobotsLookup {
    pub rules: Arc<RobotsRules>,
    pub fetched: bool,
}

/// Cache of resolved robots rules keyed by domain key
pub struct RobotsCache {
    settings: RobotsSettings,
    entries: Mutex<HashMap<String, Slot>>,
}

impl RobotsCache {
    pub fn new(settings: RobotsSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the rules if they were already resolved for this domain
    pub fn cached(&self, domain: &str) -> Option<Arc<RobotsRules>> {
        if !self.settings.enabled {
            return Some(Arc::new(RobotsRules::allow_all(RobotsOrigin::Disabled)));
        }
        let entries = self.entries.lock().ok()?;
        entries.get(domain).and_then(|slot| slot.get().cloned())
    }

    /// Returns the rules for the URL's domain, fetching them on first use
    ///
    /// Exactly one concurrent caller per domain performs the load and sees
    /// `fetched == true`.
    pub async fn rules_for(&self, domain: &str, url: &Url, fetcher: &dyn Fetcher) -> RobotsLookup {
        if !self.settings.enabled {
            return RobotsLookup {
                rules: Arc::new(RobotsRules::allow_all(RobotsOrigin::Disabled)),
                fetched: false,
            };
        }

        let mut fetched = false;
        let loaded = &mut fetched;
        let slot = self.slot(domain);
        let rules = slot
            .get_or_init(|| async move {
                let rules = match robots_url(url) {
                    Some(location) => {
                        *loaded = true;
                        self.load(domain, &location, fetcher).await
                    }
                    None => RobotsRules::allow_all(RobotsOrigin::Missing),
                };
                Arc::new(rules)
            })
            .await
            .clone();

        RobotsLookup { rules, fetched }
    }

    fn slot(&self, domain: &str) -> Slot {
        match self.entries.lock() {
            Ok(mut entries) => entries
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone(),
            // A poisoned map only loses sharing; the caller still gets a
            // private cell and a correct answer.
            Err(_) => Arc::new(OnceCell::new()),
        }
    }

    async fn load(&self, domain: &str, location: &Url, fetcher: &dyn Fetcher) -> RobotsRules {
        let settings = &self.settings;

        for attempt in 1..=settings.attempts {
            let fetched = tokio::time::timeout(
                settings.fetch_timeout,
                fetcher.fetch(location, RenderHint::Plain),
            )
            .await;

            match fetched {
                Ok(Ok(response)) if response.is_success() => {
                    let body = String::from_utf8_lossy(&response.body);
                    let rules = RobotsRules::parse(&body, &settings.user_agent);
                    tracing::debug!(domain, crawl_delay = ?rules.crawl_delay(), "Loaded robots.txt");
                    return rules;
                }
                Ok(Ok(response)) if (400..500).contains(&response.status) => {
                    tracing::debug!(domain, status = response.status, "No robots.txt, allowing all");
                    return RobotsRules::allow_all(RobotsOrigin::Missing);
                }
                Ok(Ok(response)) => {
                    tracing::warn!(
                        domain,
                        attempt,
                        status = response.status,
                        "robots.txt fetch returned server error"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(domain, attempt, error = %e, "robots.txt fetch failed");
                }
                Err(_) => {
                    tracing::warn!(domain, attempt, "robots.txt fetch timed out");
                }
            }

            if attempt < settings.attempts {
                tokio::time::sleep(settings.retry_delay).await;
            }
        }

        if settings.fail_open {
            tracing::warn!(domain, "robots.txt unreachable, failing open (allow all)");
            RobotsRules::allow_all(RobotsOrigin::Unreachable)
        } else {
            tracing::warn!(domain, "robots.txt unreachable, failing closed (disallow all)");
            RobotsRules::disallow_all(RobotsOrigin::Unreachable)
        }
    }

    /// Installs rules directly, bypassing the fetch
    pub fn insert(&self, domain: &str, rules: RobotsRules) {
        let slot = self.slot(domain);
        if slot.set(Arc::new(rules)).is_err() {
            tracing::debug!(domain, "robots.txt already resolved, keeping cached rules");
        }
    }
}

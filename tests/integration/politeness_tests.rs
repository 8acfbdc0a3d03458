//! Per-domain politeness observed through the fetch log

use crate::support::{html_page, open_frontier, run_session, test_config, Scripted, ScriptedFetcher};
use std::sync::Arc;
use std::time::Duration;
use sumi_crawl::state::UrlStatus;
use sumi_crawl::storage::FrontierStore;
use sumi_crawl::{CrawlControl, TerminationReason};
use tempfile::TempDir;

const SITE: &str = "https://site.test";

fn site(path: &str) -> String {
    format!("{}{}", SITE, path)
}

/// A seed page linking to `count` leaf pages on the same host
fn fan_out(count: usize) -> ScriptedFetcher {
    let leaves: Vec<String> = (0..count).map(|i| format!("/leaf/{}", i)).collect();
    let hrefs: Vec<&str> = leaves.iter().map(|s| s.as_str()).collect();
    let mut fetcher = ScriptedFetcher::new().page(&site("/"), html_page("Home", &hrefs));
    for leaf in &leaves {
        fetcher = fetcher.page(&site(leaf), html_page(leaf, &[]));
    }
    fetcher
}

#[tokio::test]
async fn test_min_delay_spaces_same_domain_fetches() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &[&site("/")]);
    config.politeness.min_delay_ms = 200;
    config.politeness.max_concurrency_per_domain = 4;

    let fetcher = Arc::new(fan_out(3));
    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();
    assert_eq!(report.termination, TerminationReason::FrontierExhausted);

    let log = fetcher.log();
    assert_eq!(log.len(), 4);
    for pair in log.windows(2) {
        let gap = pair[1].1.duration_since(pair[0].1);
        assert!(
            gap >= Duration::from_millis(180),
            "fetches of {} and {} only {:?} apart",
            pair[0].0,
            pair[1].0,
            gap
        );
    }
}

#[tokio::test]
async fn test_per_domain_concurrency_cap_of_one() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &[&site("/")]);
    config.crawler.workers = 4;
    config.politeness.max_concurrency_per_domain = 1;

    let fetcher = Arc::new(fan_out(6).with_latency(Duration::from_millis(40)));
    run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();

    assert_eq!(fetcher.total_fetches(), 7);
    assert_eq!(fetcher.max_in_flight(), 1);
}

#[tokio::test]
async fn test_unreachable_robots_fail_closed_skips_domain() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &[&site("/")]);
    config.politeness.robots_fail_open = false;

    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .page(&site("/"), html_page("Home", &[]))
            .script(&site("/robots.txt"), vec![Scripted::Error]),
    );
    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();

    assert_eq!(report.termination, TerminationReason::FrontierExhausted);
    assert_eq!(fetcher.fetch_count(&site("/")), 0);

    let seed = open_frontier(&config).get(&site("/")).unwrap().unwrap();
    assert_eq!(seed.status, UrlStatus::Skipped);
}

#[tokio::test]
async fn test_unreachable_robots_fail_open_fetches() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&site("/")]);

    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .page(&site("/"), html_page("Home", &[]))
            .script(&site("/robots.txt"), vec![Scripted::Error]),
    );
    run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();

    assert_eq!(fetcher.fetch_count(&site("/")), 1);
}

#[tokio::test]
async fn test_too_many_requests_honors_retry_after() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&site("/")]);

    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .page(&site("/"), html_page("Home", &["/busy"]))
            .script(
                &site("/busy"),
                vec![
                    Scripted::Status(429, Some(Duration::from_millis(300))),
                    Scripted::Html(html_page("Busy", &[])),
                ],
            ),
    );
    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();
    assert_eq!(report.session.retries_scheduled, 1);

    let attempts: Vec<_> = fetcher
        .log()
        .into_iter()
        .filter(|(url, _)| url == &site("/busy"))
        .map(|(_, at)| at)
        .collect();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[1].duration_since(attempts[0]) >= Duration::from_millis(280));

    let busy = open_frontier(&config).get(&site("/busy")).unwrap().unwrap();
    assert_eq!(busy.status, UrlStatus::Done);
    assert_eq!(busy.retry_count, 1);
}

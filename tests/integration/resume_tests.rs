//! Stop, crash and resume across sessions on one data root

use crate::support::{html_page, open_frontier, run_session, test_config, ScriptedFetcher};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use sumi_crawl::checkpoint::CheckpointManager;
use sumi_crawl::state::UrlStatus;
use sumi_crawl::storage::{ClaimRequest, FrontierStore, SessionStatus};
use sumi_crawl::{CrawlControl, TerminationReason};
use tempfile::TempDir;
use tokio::time::sleep;
use url::Url;

const SITE: &str = "https://resume.test";

fn site(path: &str) -> String {
    format!("{}{}", SITE, path)
}

/// Seed plus `count` leaves, every page answering 200
fn site_with_leaves(count: usize) -> ScriptedFetcher {
    let leaves: Vec<String> = (0..count).map(|i| format!("/p{}", i)).collect();
    let hrefs: Vec<&str> = leaves.iter().map(|s| s.as_str()).collect();
    let mut fetcher = ScriptedFetcher::new().page(&site("/"), html_page("Home", &hrefs));
    for leaf in &leaves {
        fetcher = fetcher.page(&site(leaf), html_page(leaf, &[]));
    }
    fetcher
}

#[tokio::test]
async fn test_stop_then_resume_fetches_each_url_once() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &[&site("/")]);
    config.crawler.workers = 2;

    let fetcher = Arc::new(site_with_leaves(20).with_latency(Duration::from_millis(30)));
    let control = CrawlControl::new();

    let stopper = async {
        while fetcher.total_fetches() < 5 {
            sleep(Duration::from_millis(5)).await;
        }
        control.stop();
    };
    let (report, ()) = tokio::join!(
        run_session(&config, fetcher.clone(), &control, false),
        stopper
    );
    let report = report.unwrap();

    assert_eq!(report.termination, TerminationReason::StopRequested);
    assert_eq!(report.stats.in_flight, 0);
    assert!(report.stats.queued > 0);
    assert!(config.output.checkpoint_path().exists());
    let first_sessions = open_frontier(&config).sessions().unwrap();
    assert_eq!(first_sessions[0].status, SessionStatus::Interrupted);

    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();
    assert_eq!(report.termination, TerminationReason::FrontierExhausted);
    assert_eq!(report.stats.done, 21);

    assert_eq!(fetcher.fetch_count(&site("/")), 1);
    for i in 0..20 {
        assert_eq!(fetcher.fetch_count(&site(&format!("/p{}", i))), 1);
    }
    assert_eq!(open_frontier(&config).sessions().unwrap().len(), 2);
}

#[tokio::test]
async fn test_in_flight_records_survive_a_crash() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&site("/")]);

    {
        let frontier = open_frontier(&config);
        frontier
            .enqueue(&Url::parse(&site("/")).unwrap(), None, 0)
            .unwrap();
        frontier.begin_session("crashed").unwrap();
        let claimed = frontier
            .claim_next(&ClaimRequest {
                limit: 1,
                max_depth: 2,
                skip_domains: vec![],
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(claimed.len(), 1);
    }

    let fetcher = Arc::new(ScriptedFetcher::new().page(&site("/"), html_page("Home", &[])));
    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();

    assert_eq!(report.termination, TerminationReason::FrontierExhausted);
    assert_eq!(fetcher.fetch_count(&site("/")), 1);

    let frontier = open_frontier(&config);
    let seed = frontier.get(&site("/")).unwrap().unwrap();
    assert_eq!(seed.status, UrlStatus::Done);
    assert_eq!(seed.retry_count, 0);

    let sessions = frontier.sessions().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].status, SessionStatus::Interrupted);
    assert_eq!(sessions[1].status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_corrupt_checkpoint_falls_back_to_frontier() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&site("/")]);
    let fetcher = Arc::new(site_with_leaves(2));

    run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();
    std::fs::write(config.output.checkpoint_path(), b"{ not a checkpoint").unwrap();

    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();

    assert_eq!(report.termination, TerminationReason::FrontierExhausted);
    // Counters rebuilt from the frontier
    assert_eq!(report.session.pages_fetched, 3);
    assert_eq!(fetcher.total_fetches(), 3);

    let restored = CheckpointManager::from_config(&config.output).load().unwrap();
    assert_eq!(restored.map(|s| s.pages_fetched), Some(3));
}

#[tokio::test]
async fn test_budget_spans_sessions() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &[&site("/")]);
    config.crawler.max_pages = 3;
    let fetcher = Arc::new(site_with_leaves(10));

    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();
    assert_eq!(report.termination, TerminationReason::BudgetExhausted);
    assert_eq!(report.stats.done, 3);
    assert_eq!(fetcher.total_fetches(), 3);

    // Same budget: nothing left to spend
    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();
    assert_eq!(report.termination, TerminationReason::BudgetExhausted);
    assert_eq!(fetcher.total_fetches(), 3);

    config.crawler.max_pages = 6;
    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();
    assert_eq!(report.termination, TerminationReason::BudgetExhausted);
    assert_eq!(report.stats.done, 6);
    assert_eq!(fetcher.total_fetches(), 6);
}

#[tokio::test]
async fn test_paused_crawl_fetches_nothing_until_resumed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&site("/")]);
    let fetcher = Arc::new(site_with_leaves(2));
    let control = CrawlControl::new();
    control.pause();

    let observer = async {
        sleep(Duration::from_millis(200)).await;
        let while_paused = fetcher.total_fetches();
        control.resume();
        while_paused
    };
    let (report, while_paused) = tokio::join!(
        run_session(&config, fetcher.clone(), &control, false),
        observer
    );

    assert_eq!(while_paused, 0);
    assert_eq!(report.unwrap().termination, TerminationReason::FrontierExhausted);
    assert_eq!(fetcher.total_fetches(), 3);
}

#[tokio::test]
async fn test_restart_discards_previous_crawl() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&site("/")]);
    let fetcher = Arc::new(site_with_leaves(1));

    run_session(&config, fetcher.clone(), &CrawlControl::new(), false)
        .await
        .unwrap();
    assert_eq!(fetcher.fetch_count(&site("/")), 1);

    let report = run_session(&config, fetcher.clone(), &CrawlControl::new(), true)
        .await
        .unwrap();
    assert_eq!(report.termination, TerminationReason::FrontierExhausted);
    assert_eq!(report.session.pages_fetched, 2);
    assert_eq!(fetcher.fetch_count(&site("/")), 2);
    assert_eq!(open_frontier(&config).sessions().unwrap().len(), 1);
}

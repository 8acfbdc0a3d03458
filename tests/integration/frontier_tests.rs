//! Frontier properties against an on-disk database

use crate::support::test_config;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use sumi_crawl::config::RetryConfig;
use sumi_crawl::state::UrlStatus;
use sumi_crawl::storage::{ClaimRequest, EnqueueOutcome, FrontierStore, SqliteFrontier};
use tempfile::TempDir;
use url::Url;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn claim(limit: usize) -> ClaimRequest {
    ClaimRequest {
        limit,
        max_depth: 10,
        skip_domains: vec![],
        now: Utc::now(),
    }
}

#[test]
fn test_at_most_one_claim_across_handles_and_threads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("frontier.db");
    let first = Arc::new(SqliteFrontier::open(&path, RetryConfig::default()).unwrap());
    let second = Arc::new(SqliteFrontier::open(&path, RetryConfig::default()).unwrap());

    for i in 0..200 {
        first
            .enqueue(&url(&format!("https://example.com/page/{}", i)), None, 0)
            .unwrap();
    }

    let mut handles = Vec::new();
    for t in 0..8 {
        let store = if t % 2 == 0 { first.clone() } else { second.clone() };
        handles.push(std::thread::spawn(move || {
            let mut claimed = Vec::new();
            loop {
                let batch = store.claim_next(&claim(7)).unwrap();
                if batch.is_empty() {
                    break;
                }
                claimed.extend(batch.into_iter().map(|r| (r.id, r.lease.unwrap())));
            }
            claimed
        }));
    }

    let mut ids = HashSet::new();
    let mut leases = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for (id, lease) in handle.join().unwrap() {
            total += 1;
            ids.insert(id);
            leases.insert(lease);
        }
    }
    assert_eq!(total, 200);
    assert_eq!(ids.len(), 200);
    assert_eq!(leases.len(), 200);
    assert_eq!(first.stats().unwrap().in_flight, 200);
}

#[test]
fn test_depth_is_first_seen_and_never_rewritten() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[]);
    let frontier = SqliteFrontier::open(&config.output.database_path(), config.retry.clone()).unwrap();
    let page = url("https://example.com/deep");

    assert_eq!(frontier.enqueue(&page, None, 3).unwrap(), EnqueueOutcome::Inserted);
    assert_eq!(
        frontier.enqueue(&page, None, 5).unwrap(),
        EnqueueOutcome::Known { depth: 3 }
    );
    assert_eq!(
        frontier.enqueue(&page, Some("https://example.com/"), 1).unwrap(),
        EnqueueOutcome::Known { depth: 3 }
    );
    let record = frontier.get(page.as_str()).unwrap().unwrap();
    assert_eq!(record.depth, 3);
    assert_eq!(record.parent_url, None);
    assert_eq!(frontier.stats().unwrap().total, 1);
}

#[test]
fn test_crash_sweep_returns_every_in_flight_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frontier.db");

    {
        let frontier = SqliteFrontier::open(&path, RetryConfig::default()).unwrap();
        for i in 0..12 {
            frontier
                .enqueue(&url(&format!("https://example.com/{}", i)), None, 1)
                .unwrap();
        }
        let claimed = frontier.claim_next(&claim(10)).unwrap();
        assert_eq!(claimed.len(), 10);
        // Dropped without completing: a crash
    }

    let frontier = SqliteFrontier::open(&path, RetryConfig::default()).unwrap();
    assert_eq!(frontier.stats().unwrap().in_flight, 10);
    assert_eq!(frontier.recover_in_flight().unwrap(), 10);

    let stats = frontier.stats().unwrap();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.queued, 12);
    assert_eq!(stats.total, 12);
    assert!(frontier
        .records()
        .unwrap()
        .iter()
        .all(|r| r.status == UrlStatus::Queued && r.lease.is_none()));
}

#[test]
fn test_enqueue_is_idempotent_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frontier.db");
    let seed = url("https://example.com/");

    {
        let frontier = SqliteFrontier::open(&path, RetryConfig::default()).unwrap();
        assert!(frontier.enqueue(&seed, None, 0).unwrap().is_new());
    }
    let frontier = SqliteFrontier::open(&path, RetryConfig::default()).unwrap();
    assert!(!frontier.enqueue(&seed, None, 0).unwrap().is_new());
    assert_eq!(frontier.stats().unwrap().total, 1);
}

//! End-to-end crawls over real HTTP
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle through `sumi_crawl::crawl`.

use crate::support::{html_page, open_frontier, test_config};
use sumi_crawl::state::UrlStatus;
use sumi_crawl::storage::{FrontierStore, FsContentStore};
use sumi_crawl::{crawl, CrawlControl, CrawlOptions, TerminationReason};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_html(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_scope_and_depth_on_seed_page() {
    let server = MockServer::start().await;
    let root = format!("{}/", server.uri());

    let mut links = vec!["/a", "/b", "/c"];
    let off_domain: Vec<String> = (0..7)
        .map(|i| format!("https://other{}.example/page", i))
        .collect();
    links.extend(off_domain.iter().map(|s| s.as_str()));
    mount_html(&server, "/", html_page("Home", &links)).await;
    for leaf in ["/a", "/b", "/c"] {
        mount_html(&server, leaf, html_page(leaf, &["/deeper"])).await;
    }

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &[&root]);
    config.crawler.max_depth = 1;
    config.crawler.max_pages = 5;

    let report = crawl(config.clone(), CrawlOptions::default(), &CrawlControl::new())
        .await
        .unwrap();

    assert!(matches!(
        report.termination,
        TerminationReason::FrontierExhausted | TerminationReason::BudgetExhausted
    ));

    let frontier = open_frontier(&config);
    let records = frontier.records().unwrap();
    let depth_one: Vec<_> = records.iter().filter(|r| r.depth == 1).collect();
    assert_eq!(depth_one.len(), 3);
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.status == UrlStatus::Done));

    let out_of_scope = frontier
        .links()
        .unwrap()
        .into_iter()
        .filter(|l| !l.in_scope)
        .count();
    assert_eq!(out_of_scope, 7);

    assert_eq!(report.session.out_of_scope, 7);
    // Each leaf links one level too deep
    assert_eq!(report.session.depth_limited, 3);
    assert!(frontier.get(&format!("{}/deeper", server.uri())).unwrap().is_none());
}

#[tokio::test]
async fn test_robots_disallowed_path_is_never_fetched() {
    let server = MockServer::start().await;
    let root = format!("{}/", server.uri());

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/"))
        .mount(&server)
        .await;
    mount_html(&server, "/", html_page("Home", &["/private/x", "/public"])).await;
    mount_html(&server, "/public", html_page("Public", &[])).await;
    Mock::given(method("GET"))
        .and(path("/private/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&root]);
    let report = crawl(config.clone(), CrawlOptions::default(), &CrawlControl::new())
        .await
        .unwrap();
    assert_eq!(report.termination, TerminationReason::FrontierExhausted);

    let frontier = open_frontier(&config);
    let private = frontier
        .get(&format!("{}/private/x", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(private.status, UrlStatus::Skipped);
    assert_eq!(private.failure_reason.as_deref(), Some("robots_disallowed"));

    let public = frontier.get(&format!("{}/public", server.uri())).unwrap().unwrap();
    assert_eq!(public.status, UrlStatus::Done);
    assert_eq!(report.stats.skipped, 1);
}

#[tokio::test]
async fn test_retry_bound_stops_after_three_attempts() {
    let server = MockServer::start().await;
    let root = format!("{}/", server.uri());

    mount_html(&server, "/", html_page("Home", &["/flaky"])).await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&root]);
    let report = crawl(config.clone(), CrawlOptions::default(), &CrawlControl::new())
        .await
        .unwrap();
    assert_eq!(report.termination, TerminationReason::FrontierExhausted);

    let frontier = open_frontier(&config);
    let flaky = frontier.get(&format!("{}/flaky", server.uri())).unwrap().unwrap();
    assert_eq!(flaky.status, UrlStatus::Failed);
    assert_eq!(flaky.retry_count, 3);
    assert_eq!(flaky.http_status, Some(503));
    assert_eq!(report.session.retries_scheduled, 2);
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let server = MockServer::start().await;
    let root = format!("{}/", server.uri());

    mount_html(&server, "/", html_page("Home", &["/missing"])).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&root]);
    crawl(config.clone(), CrawlOptions::default(), &CrawlControl::new())
        .await
        .unwrap();

    let missing = open_frontier(&config)
        .get(&format!("{}/missing", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(missing.status, UrlStatus::Failed);
    assert_eq!(missing.retry_count, 1);
    assert_eq!(missing.http_status, Some(404));
}

#[tokio::test]
async fn test_content_and_reports_are_written() {
    let server = MockServer::start().await;
    let root = format!("{}/", server.uri());

    mount_html(&server, "/", html_page("Home", &["/report.pdf"])).await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[&root]);
    let report = crawl(config.clone(), CrawlOptions::default(), &CrawlControl::new())
        .await
        .unwrap();
    assert_eq!(report.session.non_html, 1);

    let frontier = open_frontier(&config);
    let home = frontier.get(&root).unwrap().unwrap();
    assert_eq!(home.title.as_deref(), Some("Home"));
    assert_eq!(home.language.as_deref(), Some("en"));
    let hash = home.content_hash.expect("html body is stored");
    let store = FsContentStore::new(config.output.repository_dir());
    assert!(store.path_for(&hash).exists());

    let pdf = frontier
        .get(&format!("{}/report.pdf", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(pdf.status, UrlStatus::Done);
    assert!(pdf.content_hash.is_none());

    let reports = config.output.reports_dir();
    assert!(reports.join("summary.json").exists());
    assert!(reports.join("summary.md").exists());
    let csv = std::fs::read_to_string(reports.join("graph_edges.csv")).unwrap();
    assert!(csv.contains("/report.pdf"));
    assert_eq!(pdf.body_bytes, Some(8));

    let crawled = std::fs::read_to_string(reports.join("crawled.csv")).unwrap();
    assert!(crawled.starts_with("url,parent_url,depth,status,"));
    assert!(crawled.contains(",1,done,200,\"application/pdf\",8,"));
    let jsonl = std::fs::read_to_string(reports.join("crawled.jsonl")).unwrap();
    assert_eq!(jsonl.lines().count(), 2);
    assert!(jsonl.contains(&format!("\"url\":\"{}\"", root)));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(reports.join("summary.json")).unwrap())
            .unwrap();
    assert!(summary["total_bytes"].as_u64().unwrap() > 8);
    assert!(summary["slowest_fetch"]["url"].is_string());

    let sessions = frontier.sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].termination_reason.as_deref(), Some("frontier_exhausted"));
}

//! Processing of one claimed URL
//!
//! A worker never touches the frontier. It turns a claimed record into an
//! `Outcome` and hands it back to the coordinator, which owns every state
//! transition.

use crate::crawler::{
    looks_client_rendered, looks_like_captcha, CrawlContext, FetchResponse, RenderHint,
};
use crate::storage::{Failure, FailureKind, Outcome, PageOutcome, SkipReason, UrlRecord};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{Id, JoinSet};
use url::Url;

/// What a finished worker reports to the coordinator
#[derive(Debug)]
pub struct WorkerResult {
    pub record: UrlRecord,
    pub domain: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Spawns a worker for `record` onto the pool, returning its task id
///
/// A panic inside the worker is reported as a transient failure so the
/// record is retried instead of stranded in flight.
pub fn spawn(workers: &mut JoinSet<WorkerResult>, ctx: Arc<CrawlContext>, record: UrlRecord) -> Id {
    let handle = workers.spawn(async move {
        let started = Instant::now();
        let outcome = match AssertUnwindSafe(process(&ctx, &record)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(url = %record.url, "Worker panicked");
                Outcome::Failed(Failure::transient("worker panicked"))
            }
        };
        WorkerResult {
            domain: record.domain.clone(),
            record,
            outcome,
            elapsed: started.elapsed(),
        }
    });
    handle.id()
}

/// Fetches, classifies and (for HTML) parses and stores one page
pub async fn process(ctx: &CrawlContext, record: &UrlRecord) -> Outcome {
    let url = match Url::parse(&record.url) {
        Ok(url) => url,
        Err(e) => return Outcome::Failed(Failure::permanent(format!("unparseable URL: {}", e), None)),
    };

    if !ctx.politeness.may_fetch(&url).await {
        tracing::debug!(url = %url, "Disallowed by robots.txt");
        return Outcome::Skipped(SkipReason::RobotsDisallowed);
    }

    let hint = if record.needs_render {
        RenderHint::Render
    } else {
        RenderHint::Plain
    };

    let timeout = ctx.config.crawler.fetch_timeout();
    let response = match tokio::time::timeout(timeout, ctx.fetcher.fetch(&url, hint)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::debug!(url = %url, error = %e, "Fetch failed");
            return Outcome::Failed(Failure::transient(e.to_string()));
        }
        Err(_) => {
            tracing::debug!(url = %url, timeout_sec = timeout.as_secs(), "Fetch timed out");
            return Outcome::Failed(Failure::transient("fetch timed out"));
        }
    };

    if response.is_html() && looks_like_captcha(&String::from_utf8_lossy(&response.body)) {
        ctx.politeness.quarantine(&record.domain);
        return Outcome::Failed(Failure {
            kind: FailureKind::Transient,
            reason: "captcha challenge".to_string(),
            http_status: Some(response.status),
            retry_after: Some(ctx.politeness.captcha_quarantine()),
        });
    }

    if !response.is_success() {
        return classify_error_status(ctx, record, &response);
    }

    let page = PageOutcome {
        http_status: response.status,
        final_url: response.final_url.to_string(),
        content_type: response.content_type.clone(),
        fetch_ms: response.elapsed.as_millis() as u64,
        body_bytes: response.body.len() as u64,
        ..PageOutcome::default()
    };

    if !response.is_html() {
        return Outcome::Done(PageOutcome {
            non_html: true,
            ..page
        });
    }

    process_html(ctx, hint, &response, page).await
}

fn classify_error_status(ctx: &CrawlContext, record: &UrlRecord, response: &FetchResponse) -> Outcome {
    let status = response.status;
    if response.is_transient_status() {
        if status == 429 {
            let hold = response
                .retry_after
                .unwrap_or_else(|| ctx.politeness.min_delay());
            ctx.politeness.penalize(&record.domain, hold);
        }
        return Outcome::Failed(Failure {
            kind: FailureKind::Transient,
            reason: format!("HTTP {}", status),
            http_status: Some(status),
            retry_after: response.retry_after,
        });
    }
    Outcome::Failed(Failure::permanent(format!("HTTP {}", status), Some(status)))
}

async fn process_html(
    ctx: &CrawlContext,
    hint: RenderHint,
    response: &FetchResponse,
    mut page: PageOutcome,
) -> Outcome {
    let body = String::from_utf8_lossy(&response.body);
    let metadata = ctx.parser.extract_metadata(&body);

    let render = &ctx.config.render;
    if render.enabled
        && hint == RenderHint::Plain
        && looks_client_rendered(&body, &metadata, render.min_text_length)
    {
        tracing::debug!(url = %response.final_url, text = metadata.text_length, "Page looks client-rendered");
        return Outcome::NeedsRender;
    }

    if ctx.config.crawler.store_html {
        let stored = match ctx.content.persist(&response.final_url, &response.body, &metadata).await {
            Ok(stored) => stored,
            Err(first) => {
                tracing::warn!(url = %response.final_url, error = %first, "Content write failed, retrying once");
                match ctx.content.persist(&response.final_url, &response.body, &metadata).await {
                    Ok(stored) => stored,
                    Err(e) => {
                        return Outcome::Failed(Failure {
                            kind: FailureKind::Storage,
                            reason: e.to_string(),
                            http_status: Some(response.status),
                            retry_after: None,
                        })
                    }
                }
            }
        };
        page.content_hash = Some(stored.hash);
        page.bytes_stored = stored.bytes_written;
    }

    let mut links = ctx.parser.extract_links(&body, &response.final_url);
    links.truncate(ctx.config.crawler.max_links_per_page);

    page.title = metadata.title;
    page.language = metadata.language;
    page.links = links;
    Outcome::Done(page)
}

//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator is the only component that mutates crawl state. It:
//! - Recovers the frontier and restores counters on start
//! - Claims eligible URLs and dispatches them under per-domain politeness
//! - Holds claims that must wait for a domain, up to a bounded capacity
//! - Applies worker outcomes to the frontier and extends it with new links
//! - Checkpoints periodically and decides when the session terminates
//!
//! Workers run on a `JoinSet`; the loop wakes on a worker result, the
//! earliest politeness or retry deadline, the checkpoint deadline, or a
//! control request.

use crate::checkpoint::CheckpointManager;
use crate::config::config_fingerprint;
use crate::crawler::control::ControlRequest;
use crate::crawler::worker::{self, WorkerResult};
use crate::crawler::{CrawlContext, CrawlControl};
use crate::state::{
    instant_after, Reservation, SessionPhase, SessionState, TerminationReason, WaitReason,
};
use crate::storage::{
    ClaimRequest, DiscoveredLink, Failure, FrontierStats, Outcome, PageOutcome, Resolution,
    SessionStatus, SkipReason, UrlRecord,
};
use crate::url::normalize;
use crate::{CrawlError, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{sleep, sleep_until, Instant};
use url::Url;

/// Poll interval used when nothing else can wake the loop
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Pages between two progress log lines
const PROGRESS_EVERY: u64 = 10;

/// Final account of a finished session
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub termination: TerminationReason,
    pub session: SessionState,
    pub stats: FrontierStats,
    pub elapsed_secs: f64,
}

/// A claimed record waiting for its domain to accept another dispatch
#[derive(Debug)]
struct HeldClaim {
    record: UrlRecord,
    not_before: Instant,
    reason: WaitReason,
    since: Instant,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    ctx: Arc<CrawlContext>,
    control: watch::Receiver<ControlRequest>,
    control_closed: bool,
    phase: SessionPhase,
    session: SessionState,
    workers: JoinSet<WorkerResult>,
    /// Claimed record behind each running worker task
    running: HashMap<Id, UrlRecord>,
    held: VecDeque<HeldClaim>,
    last_checkpoint: Instant,
    pages_since_checkpoint: u64,
    restart: bool,
    started: Instant,
}

impl Coordinator {
    pub fn new(ctx: Arc<CrawlContext>, control: &CrawlControl) -> Self {
        let max_pages = ctx.config.crawler.max_pages;
        Self {
            ctx,
            control: control.subscribe(),
            control_closed: false,
            phase: SessionPhase::Idle,
            session: SessionState::new(max_pages),
            workers: JoinSet::new(),
            running: HashMap::new(),
            held: VecDeque::new(),
            last_checkpoint: Instant::now(),
            pages_since_checkpoint: 0,
            restart: false,
            started: Instant::now(),
        }
    }

    /// Discards the frontier and checkpoint before starting
    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Runs the session to termination
    ///
    /// Per-URL problems never end the crawl. Errors returned here come from
    /// the frontier or from an invalid start (no seeds); the session row is
    /// marked failed before returning.
    pub async fn run(mut self) -> Result<CrawlReport> {
        match self.execute().await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!(error = %e, "Crawl aborted");
                self.abort().await;
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<CrawlReport> {
        self.start()?;

        let reason = loop {
            self.apply_control()?;
            if self.phase == SessionPhase::Stopping {
                break TerminationReason::StopRequested;
            }

            if self.phase == SessionPhase::Running {
                if let Some(reason) = self.check_termination()? {
                    break reason;
                }
                self.dispatch_held();
                self.claim_and_dispatch()?;
            }

            self.wait_for_event().await?;
        };

        self.shutdown(reason).await
    }

    fn start(&mut self) -> Result<()> {
        self.phase = self.phase.transition(SessionPhase::Running)?;
        let ctx = self.ctx.clone();
        let max_pages = ctx.config.crawler.max_pages;

        if self.restart {
            tracing::info!("Restart requested, clearing frontier and checkpoint");
            ctx.frontier.reset()?;
            ctx.checkpoints.clear()?;
        }

        let recovered = ctx.frontier.recover_in_flight()?;
        if recovered > 0 {
            tracing::info!(recovered, "Returned in-flight URLs from an earlier session to the queue");
        }

        let stats = ctx.frontier.stats()?;
        self.session = restore_session(&ctx.checkpoints, &stats, max_pages);

        let mut inserted = 0;
        for seed in &ctx.seeds {
            if ctx.frontier.enqueue(seed, None, 0)?.is_new() {
                inserted += 1;
            }
        }
        self.session.total_queued += inserted;

        if ctx.seeds.is_empty() && stats.total == 0 {
            return Err(CrawlError::NoSeeds);
        }

        self.session.session_id = ctx.frontier.begin_session(&config_fingerprint(&ctx.config))?;
        self.session.started_at = Utc::now();
        self.session.touch();
        self.last_checkpoint = Instant::now();
        self.started = Instant::now();

        tracing::info!(
            session = self.session.session_id,
            seeds = ctx.seeds.len(),
            new_seeds = inserted,
            known_urls = stats.total,
            already_done = self.session.pages_fetched,
            budget = max_pages,
            workers = ctx.config.crawler.workers,
            "Crawl session started"
        );
        Ok(())
    }

    fn apply_control(&mut self) -> Result<()> {
        let request = *self.control.borrow_and_update();
        let mut target = match request {
            ControlRequest::Run => SessionPhase::Running,
            ControlRequest::Pause => SessionPhase::Paused,
            ControlRequest::Stop => SessionPhase::Stopping,
        };
        // Nobody is left to resume a paused crawl
        if self.control_closed && target == SessionPhase::Paused {
            target = SessionPhase::Stopping;
        }

        if target != self.phase && self.phase.can_transition_to(target) {
            self.phase = self.phase.transition(target)?;
            tracing::info!(phase = %self.phase, in_flight = self.workers.len(), "Session phase changed");
        }
        Ok(())
    }

    fn check_termination(&mut self) -> Result<Option<TerminationReason>> {
        let config = &self.ctx.config.crawler;
        if self.session.is_budget_exhausted(config.max_pages) {
            return Ok(Some(TerminationReason::BudgetExhausted));
        }

        if !self.workers.is_empty() || !self.held.is_empty() {
            return Ok(None);
        }

        let stats = self.ctx.frontier.stats()?;
        if stats.queued == 0 {
            return Ok(Some(TerminationReason::FrontierExhausted));
        }
        if self.ctx.frontier.queued_beyond_depth(config.max_depth)? == stats.queued {
            return Ok(Some(TerminationReason::DepthExhausted));
        }
        Ok(None)
    }

    fn free_workers(&self) -> usize {
        self.ctx
            .config
            .crawler
            .workers
            .saturating_sub(self.workers.len())
    }

    fn claim_and_dispatch(&mut self) -> Result<()> {
        let config = &self.ctx.config.crawler;
        let outstanding = (self.workers.len() + self.held.len()) as u64;
        let remaining = config
            .max_pages
            .saturating_sub(self.session.pages_fetched)
            .saturating_sub(outstanding);
        let free_held = config.held_capacity().saturating_sub(self.held.len());
        let limit = self
            .free_workers()
            .min(free_held)
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if limit == 0 {
            return Ok(());
        }

        let skip_domains: Vec<String> = self
            .held
            .iter()
            .map(|claim| claim.record.domain.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let request = ClaimRequest {
            limit,
            max_depth: config.max_depth,
            skip_domains,
            now: Utc::now(),
        };
        let claimed = self.ctx.frontier.claim_next(&request)?;

        for record in claimed {
            self.session.last_claimed_seq = self.session.last_claimed_seq.max(record.id);
            self.dispatch(record)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, record: UrlRecord) -> Result<()> {
        // Rules already loaded: skip without spending a worker
        if let Ok(url) = Url::parse(&record.url) {
            if self.ctx.politeness.cached_verdict(&url) == Some(false) {
                tracing::debug!(url = %record.url, "Disallowed by robots.txt");
                let outcome = Outcome::Skipped(SkipReason::RobotsDisallowed);
                let resolution = self.ctx.frontier.complete(&record, &outcome, Utc::now())?;
                if resolution == Resolution::Skipped {
                    self.session.total_skipped += 1;
                }
                return Ok(());
            }
        }

        let now = Instant::now();
        match self.ctx.politeness.reserve_at(&record.domain, now) {
            Reservation::Acquired => self.spawn_worker(record),
            Reservation::MustWait { wait, reason } => {
                tracing::trace!(url = %record.url, wait_ms = wait.as_millis() as u64, ?reason, "Holding claim");
                self.held.push_back(HeldClaim {
                    record,
                    not_before: instant_after(now, wait),
                    reason,
                    since: now,
                });
            }
        }
        Ok(())
    }

    fn spawn_worker(&mut self, record: UrlRecord) {
        let id = worker::spawn(&mut self.workers, self.ctx.clone(), record.clone());
        self.running.insert(id, record);
    }

    /// Retries held claims whose wait has elapsed, in claim order
    fn dispatch_held(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut still_held = VecDeque::with_capacity(self.held.len());

        while let Some(mut claim) = self.held.pop_front() {
            let waiting_on_interval = claim.reason == WaitReason::Interval && claim.not_before > now;
            if waiting_on_interval || self.free_workers() == 0 {
                still_held.push_back(claim);
                continue;
            }

            match self.ctx.politeness.reserve_at(&claim.record.domain, now) {
                Reservation::Acquired => {
                    let waited = now.saturating_duration_since(claim.since);
                    self.session.politeness_wait_ms += waited.as_millis() as u64;
                    self.spawn_worker(claim.record);
                }
                Reservation::MustWait { wait, reason } => {
                    claim.not_before = instant_after(now, wait);
                    claim.reason = reason;
                    still_held.push_back(claim);
                }
            }
        }
        self.held = still_held;
    }

    /// Earliest instant something other than a worker or control change needs attention
    fn next_deadline(&self) -> Result<Option<Instant>> {
        let now = Instant::now();
        let mut deadline: Option<Instant> = None;

        if !self.ctx.checkpoints.interval().is_zero() {
            deadline = earliest(
                deadline,
                instant_after(self.last_checkpoint, self.ctx.checkpoints.interval()),
            );
        }

        if self.phase != SessionPhase::Running {
            return Ok(deadline);
        }

        for claim in &self.held {
            if claim.reason == WaitReason::Interval {
                deadline = earliest(deadline, claim.not_before);
            }
        }
        // Concurrency holds clear when a worker returns; poll when none is running
        if self.workers.is_empty() && !self.held.is_empty() {
            deadline = earliest(deadline, now + IDLE_POLL);
        }

        if self.free_workers() > 0 {
            if let Some(eligible) = self
                .ctx
                .frontier
                .next_eligible_at(self.ctx.config.crawler.max_depth)?
            {
                if let Ok(delta) = (eligible - Utc::now()).to_std() {
                    if !delta.is_zero() {
                        deadline = earliest(deadline, instant_after(now, delta));
                    }
                }
            }
        }

        Ok(deadline)
    }

    async fn wait_for_event(&mut self) -> Result<()> {
        let deadline = self.next_deadline()?;
        let has_workers = !self.workers.is_empty();
        let control_open = !self.control_closed;

        tokio::select! {
            Some(joined) = self.workers.join_next_with_id(), if has_workers => {
                self.handle_joined(joined)?;
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                self.maybe_checkpoint();
            }
            changed = self.control.changed(), if control_open => {
                if changed.is_err() {
                    tracing::debug!("Control handle dropped");
                    self.control_closed = true;
                }
            }
            else => {
                sleep(IDLE_POLL).await;
            }
        }
        Ok(())
    }

    fn handle_joined(
        &mut self,
        joined: std::result::Result<(Id, WorkerResult), JoinError>,
    ) -> Result<()> {
        match joined {
            Ok((id, result)) => {
                self.running.remove(&id);
                self.handle_result(result)
            }
            Err(e) => {
                tracing::error!(error = %e, "Worker task failed");
                let Some(record) = self.running.remove(&e.id()) else {
                    return Ok(());
                };
                // Charged as a transient failure so the domain slot is freed
                // and the record leaves InFlight
                self.handle_result(WorkerResult {
                    domain: record.domain.clone(),
                    record,
                    outcome: Outcome::Failed(Failure::transient(format!("worker task failed: {}", e))),
                    elapsed: Duration::ZERO,
                })
            }
        }
    }

    fn handle_result(&mut self, result: WorkerResult) -> Result<()> {
        let WorkerResult {
            record,
            domain,
            outcome,
            elapsed,
        } = result;
        self.ctx.politeness.release(&domain);

        let resolution = self.ctx.frontier.complete(&record, &outcome, Utc::now())?;
        match (resolution, &outcome) {
            (Resolution::Stale, _) => {
                tracing::warn!(url = %record.url, lease = ?record.lease, "Discarding outcome for a stale lease");
            }
            (Resolution::Done, Outcome::Done(page)) => {
                tracing::debug!(
                    url = %record.url,
                    status = page.http_status,
                    depth = record.depth,
                    links = page.links.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Fetched"
                );
                self.record_page(&record, page)?;
            }
            (Resolution::Skipped, _) => {
                self.session.total_skipped += 1;
            }
            (Resolution::Retry { retry_count, eligible_at }, _) => {
                self.session.retries_scheduled += 1;
                tracing::debug!(url = %record.url, retry_count, eligible_at, "Retry scheduled");
            }
            (Resolution::Failed { retry_count }, Outcome::Failed(failure)) => {
                self.session.total_failed += 1;
                tracing::warn!(
                    url = %record.url,
                    retry_count,
                    kind = ?failure.kind,
                    reason = %failure.reason,
                    "URL failed"
                );
            }
            (Resolution::Failed { .. }, _) => {
                self.session.total_failed += 1;
            }
            (Resolution::RenderRequeued, _) => {
                self.session.render_requeued += 1;
                tracing::debug!(url = %record.url, "Queued for rendering");
            }
            (Resolution::Done, _) => {}
        }

        self.session.touch();
        self.maybe_checkpoint();
        Ok(())
    }

    fn record_page(&mut self, record: &UrlRecord, page: &PageOutcome) -> Result<()> {
        let max_pages = self.ctx.config.crawler.max_pages;
        self.session.pages_fetched += 1;
        self.session.refresh_budget(max_pages);
        self.session.max_depth_reached = self.session.max_depth_reached.max(record.depth);
        self.session.bytes_stored += page.bytes_stored;
        if page.non_html {
            self.session.non_html += 1;
        }
        self.pages_since_checkpoint += 1;

        if self.session.pages_fetched % PROGRESS_EVERY == 0 {
            tracing::info!(
                done = self.session.pages_fetched,
                queued = self.session.total_queued,
                in_flight = self.workers.len(),
                failed = self.session.total_failed,
                budget_remaining = self.session.budget_remaining,
                "Crawl progress"
            );
        }

        if page.links.is_empty() {
            return Ok(());
        }

        let links = self.discover_links(record, page);
        let batch = self
            .ctx
            .frontier
            .enqueue_links(&record.url, record.depth + 1, &links)?;

        self.session.total_queued += batch.inserted;
        self.session.duplicate_links += batch.duplicates;
        self.session.links_discovered += batch.edges;
        Ok(())
    }

    /// Normalizes, deduplicates and classifies a page's raw links
    fn discover_links(&mut self, record: &UrlRecord, page: &PageOutcome) -> Vec<DiscoveredLink> {
        let config = &self.ctx.config;
        let base = Url::parse(&page.final_url)
            .or_else(|_| Url::parse(&record.url))
            .ok();
        let child_depth = record.depth + 1;

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for raw in &page.links {
            let url = match normalize(raw, base.as_ref(), config.crawler.max_url_length) {
                Ok(url) => url,
                Err(e) => {
                    self.session.invalid_urls += 1;
                    tracing::debug!(href = %raw, error = %e, "Dropping invalid link");
                    continue;
                }
            };
            if !seen.insert(url.as_str().to_string()) {
                self.session.duplicate_links += 1;
                continue;
            }

            let in_scope = self.ctx.scope.classify(&url).is_in_scope();
            if !in_scope {
                self.session.out_of_scope += 1;
                if !config.scope.record_out_of_scope {
                    continue;
                }
            }

            let follow = in_scope && child_depth <= config.crawler.max_depth;
            if in_scope && !follow {
                self.session.depth_limited += 1;
            }
            links.push(DiscoveredLink {
                url,
                in_scope,
                follow,
            });
        }
        links
    }

    fn maybe_checkpoint(&mut self) {
        let elapsed = self.last_checkpoint.elapsed();
        if !self.ctx.checkpoints.is_due(self.pages_since_checkpoint, elapsed) {
            return;
        }
        self.write_checkpoint();
    }

    fn write_checkpoint(&mut self) {
        self.session.touch();
        match self.ctx.checkpoints.save(&self.session) {
            Ok(()) => {
                self.last_checkpoint = Instant::now();
                self.pages_since_checkpoint = 0;
            }
            Err(e) => {
                // The frontier stays authoritative; only counters are at risk
                tracing::warn!(error = %e, "Failed to write checkpoint");
                self.last_checkpoint = Instant::now();
            }
        }
    }

    async fn shutdown(&mut self, reason: TerminationReason) -> Result<CrawlReport> {
        tracing::info!(%reason, in_flight = self.workers.len(), held = self.held.len(), "Stopping crawl");
        self.session.termination = Some(reason);
        if self.phase != SessionPhase::Stopping {
            self.phase = self.phase.transition(SessionPhase::Stopping)?;
        }

        for claim in self.held.drain(..) {
            self.ctx.frontier.release(&claim.record)?;
        }

        while let Some(joined) = self.workers.join_next_with_id().await {
            self.handle_joined(joined)?;
        }

        self.phase = self.phase.transition(SessionPhase::Stopped)?;
        self.write_checkpoint();

        let status = match reason {
            TerminationReason::StopRequested => SessionStatus::Interrupted,
            _ => SessionStatus::Completed,
        };
        self.ctx
            .frontier
            .finish_session(self.session.session_id, status, Some(reason))?;

        let stats = self.ctx.frontier.stats()?;
        let elapsed_secs = self.started.elapsed().as_secs_f64();
        tracing::info!(
            %reason,
            pages = self.session.pages_fetched,
            failed = stats.failed,
            skipped = stats.skipped,
            queued = stats.queued,
            elapsed_secs,
            "Crawl finished"
        );

        Ok(CrawlReport {
            termination: reason,
            session: self.session.clone(),
            stats,
            elapsed_secs,
        })
    }

    async fn abort(&mut self) {
        self.workers.shutdown().await;
        // Still InFlight in the frontier; the next start sweeps them back
        self.running.clear();
        if self.session.session_id == 0 {
            return;
        }
        if let Err(e) =
            self.ctx
                .frontier
                .finish_session(self.session.session_id, SessionStatus::Failed, None)
        {
            tracing::warn!(error = %e, "Could not mark session as failed");
        }
        self.write_checkpoint();
    }
}

fn earliest(current: Option<Instant>, at: Instant) -> Option<Instant> {
    Some(current.map_or(at, |current| current.min(at)))
}

/// Rebuilds the session counters for a (re)started crawl
///
/// A missing or unusable checkpoint is not fatal: the frontier alone yields
/// the per-status counts, and only the discovery counters are lost.
fn restore_session(checkpoints: &CheckpointManager, stats: &FrontierStats, max_pages: u64) -> SessionState {
    match checkpoints.load() {
        Ok(Some(mut state)) => {
            tracing::info!(
                pages = state.pages_fetched,
                path = %checkpoints.path().display(),
                "Resuming from checkpoint"
            );
            state.reconcile(stats, max_pages);
            state.termination = None;
            state
        }
        Ok(None) => SessionState::from_stats(stats, max_pages),
        Err(e) => {
            tracing::warn!(error = %e, "Checkpoint unusable, rebuilding counters from the frontier");
            SessionState::from_stats(stats, max_pages)
        }
    }
}

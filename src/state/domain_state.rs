use std::time::Duration;
use tokio::time::Instant;

/// Longest wait the scheduler represents (about 30 years); anything later is "never"
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `base + wait`, with the wait capped at `FAR_FUTURE` so the sum cannot overflow
pub fn instant_after(base: Instant, wait: Duration) -> Instant {
    base.checked_add(wait.min(FAR_FUTURE)).unwrap_or(base)
}

/// Why a domain cannot take another dispatch yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// The minimum interval (or a 429 penalty) has not elapsed
    Interval,
    /// The domain is at its in-flight cap; retry after a release
    Concurrency,
}

/// Result of asking a domain for a dispatch slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Acquired,
    MustWait { wait: Duration, reason: WaitReason },
}

impl Reservation {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// Tracks the politeness state of a domain during crawling
///
/// One instance exists per domain key. All fields are mutated under the
/// politeness mutex, so a reservation decision is a single O(1) step.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Fetches currently running against this domain
    pub in_flight: usize,

    /// When the last fetch to this domain was dispatched
    pub last_dispatch: Option<Instant>,

    /// Crawl-delay from robots.txt, once known
    pub crawl_delay: Option<Duration>,

    /// Whether robots.txt has been loaded for this domain
    pub robots_resolved: bool,

    /// No dispatch before this instant (set from HTTP 429 Retry-After)
    pub penalty_until: Option<Instant>,

    /// Total dispatches granted over the session
    pub dispatched: u64,
}

impl DomainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum spacing between two dispatches: max(min delay, crawl-delay)
    pub fn min_interval(&self, min_delay: Duration) -> Duration {
        match self.crawl_delay {
            Some(delay) => delay.max(min_delay),
            None => min_delay,
        }
    }

    /// In-flight cap for this domain
    ///
    /// Until robots.txt is resolved only one dispatch may run, so exactly one
    /// worker performs the robots load.
    pub fn concurrency_cap(&self, configured: usize) -> usize {
        if self.robots_resolved {
            configured.max(1)
        } else {
            1
        }
    }

    /// Earliest instant the next dispatch is permitted
    pub fn next_allowed(&self, min_delay: Duration) -> Option<Instant> {
        let by_interval = self
            .last_dispatch
            .map(|last| instant_after(last, self.min_interval(min_delay)));
        match (by_interval, self.penalty_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Atomically checks the cap and the interval, taking a slot if both allow it
    pub fn try_reserve(&mut self, now: Instant, min_delay: Duration, cap: usize) -> Reservation {
        if self.in_flight >= self.concurrency_cap(cap) {
            let wait = self
                .next_allowed(min_delay)
                .map(|at| at.saturating_duration_since(now))
                .filter(|wait| !wait.is_zero())
                .unwrap_or_else(|| self.min_interval(min_delay));
            return Reservation::MustWait {
                wait,
                reason: WaitReason::Concurrency,
            };
        }

        if let Some(at) = self.next_allowed(min_delay) {
            if at > now {
                return Reservation::MustWait {
                    wait: at - now,
                    reason: WaitReason::Interval,
                };
            }
        }

        self.in_flight += 1;
        self.last_dispatch = Some(now);
        self.dispatched += 1;
        Reservation::Acquired
    }

    /// Returns a slot taken by `try_reserve`
    pub fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Blocks dispatches until `until`; an earlier penalty never shortens a later one
    pub fn penalize(&mut self, until: Instant) {
        self.penalty_until = Some(match self.penalty_until {
            Some(existing) => existing.max(until),
            None => until,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(1000);

    fn resolved() -> DomainState {
        DomainState {
            robots_resolved: true,
            ..DomainState::new()
        }
    }

    #[test]
    fn test_first_reservation_acquired() {
        let mut state = resolved();
        let now = Instant::now();

        assert_eq!(state.try_reserve(now, DELAY, 2), Reservation::Acquired);
        assert_eq!(state.in_flight, 1);
        assert_eq!(state.last_dispatch, Some(now));
        assert_eq!(state.dispatched, 1);
    }

    #[test]
    fn test_interval_enforced() {
        let mut state = resolved();
        let now = Instant::now();
        state.try_reserve(now, DELAY, 2);

        let soon = now + Duration::from_millis(400);
        assert_eq!(
            state.try_reserve(soon, DELAY, 2),
            Reservation::MustWait {
                wait: Duration::from_millis(600),
                reason: WaitReason::Interval
            }
        );

        let later = now + Duration::from_millis(1000);
        assert!(state.try_reserve(later, DELAY, 2).is_acquired());
    }

    #[test]
    fn test_crawl_delay_extends_interval() {
        let mut state = resolved();
        state.crawl_delay = Some(Duration::from_secs(5));
        assert_eq!(state.min_interval(DELAY), Duration::from_secs(5));

        state.crawl_delay = Some(Duration::from_millis(10));
        assert_eq!(state.min_interval(DELAY), DELAY);
    }

    #[test]
    fn test_huge_crawl_delay_does_not_overflow() {
        let mut state = resolved();
        state.crawl_delay = Some(Duration::MAX);
        let now = Instant::now();

        assert!(state.try_reserve(now, DELAY, 2).is_acquired());
        match state.try_reserve(now, DELAY, 2) {
            Reservation::MustWait { wait, reason } => {
                assert_eq!(reason, WaitReason::Interval);
                assert_eq!(wait, FAR_FUTURE);
            }
            other => panic!("expected MustWait, got {:?}", other),
        }
    }

    #[test]
    fn test_instant_after_caps_wait() {
        let now = Instant::now();
        assert_eq!(instant_after(now, Duration::from_secs(1)), now + Duration::from_secs(1));
        assert_eq!(instant_after(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[test]
    fn test_concurrency_cap() {
        let mut state = resolved();
        let now = Instant::now();
        let zero = Duration::ZERO;

        assert!(state.try_reserve(now, zero, 2).is_acquired());
        assert!(state.try_reserve(now, zero, 2).is_acquired());
        match state.try_reserve(now, zero, 2) {
            Reservation::MustWait { reason, .. } => assert_eq!(reason, WaitReason::Concurrency),
            other => panic!("expected MustWait, got {:?}", other),
        }

        state.release();
        assert!(state.try_reserve(now, zero, 2).is_acquired());
    }

    #[test]
    fn test_unresolved_robots_caps_at_one() {
        let mut state = DomainState::new();
        let now = Instant::now();

        assert!(state.try_reserve(now, Duration::ZERO, 4).is_acquired());
        assert!(!state.try_reserve(now, Duration::ZERO, 4).is_acquired());

        state.robots_resolved = true;
        assert!(state.try_reserve(now, Duration::ZERO, 4).is_acquired());
    }

    #[test]
    fn test_penalty_blocks_dispatch() {
        let mut state = resolved();
        let now = Instant::now();
        state.penalize(now + Duration::from_secs(30));
        // A shorter penalty does not override the longer one
        state.penalize(now + Duration::from_secs(5));

        match state.try_reserve(now, Duration::ZERO, 2) {
            Reservation::MustWait { wait, reason } => {
                assert_eq!(reason, WaitReason::Interval);
                assert_eq!(wait, Duration::from_secs(30));
            }
            other => panic!("expected MustWait, got {:?}", other),
        }
    }

    #[test]
    fn test_release_saturates() {
        let mut state = DomainState::new();
        state.release();
        assert_eq!(state.in_flight, 0);
    }
}

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    max_requests: u32,
    window: Duration,
}

impl WindowPolicy {
    pub fn new(max_requests: u32, window: Duration) -> Option<Self> {
        (max_requests > 0 && !window.is_zero()).then_some(Self {
            max_requests,
            window,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

// per-key timestamp ledgers, oldest first
pub struct SlidingWindowCounter {
    window: Duration,
    ledgers: DashMap<String, VecDeque<Instant>>,
}

impl SlidingWindowCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            ledgers: DashMap::new(),
        }
    }

    pub fn prune(&self, key: &str, now: Instant) {
        if let Some(mut ledger) = self.ledgers.get_mut(key) {
            prune_ledger(&mut ledger, self.window, now);
        }
    }

    pub fn count(&self, key: &str, now: Instant) -> usize {
        self.ledgers
            .get_mut(key)
            .map(|mut ledger| {
                prune_ledger(&mut ledger, self.window, now);
                ledger.len()
            })
            .unwrap_or(0)
    }

    pub fn record(&self, key: &str, now: Instant) {
        self.with_ledger(key, |ledger| ledger.push_back(now));
    }

    // f runs under the key's shard lock
    pub(crate) fn with_ledger<R>(&self, key: &str, f: impl FnOnce(&mut VecDeque<Instant>) -> R) -> R {
        if let Some(mut ledger) = self.ledgers.get_mut(key) {
            return f(&mut ledger);
        }
        let mut ledger = self.ledgers.entry(key.to_owned()).or_default();
        f(&mut ledger)
    }

    // oldest live entry and live count, without touching the ledger
    fn live(&self, key: &str, now: Instant) -> (Option<Instant>, usize) {
        let Some(ledger) = self.ledgers.get(key) else {
            return (None, 0);
        };
        let expired = ledger
            .iter()
            .take_while(|&&t| now.saturating_duration_since(t) >= self.window)
            .count();
        (ledger.get(expired).copied(), ledger.len() - expired)
    }

    fn key_count(&self) -> usize {
        self.ledgers.len()
    }

    fn evict_empty(&self, now: Instant) -> usize {
        let before = self.ledgers.len();
        self.ledgers.retain(|_, ledger| {
            prune_ledger(ledger, self.window, now);
            !ledger.is_empty()
        });
        before.saturating_sub(self.ledgers.len())
    }
}

// Timestamps are appended in order, so expiry is always a prefix.
fn prune_ledger(ledger: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while ledger
        .front()
        .is_some_and(|&t| now.saturating_duration_since(t) >= window)
    {
        ledger.pop_front();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Option<Instant>,
}

pub struct RateLimiter {
    name: &'static str,
    policy: WindowPolicy,
    counter: SlidingWindowCounter,
}

impl RateLimiter {
    pub fn new(name: &'static str, policy: WindowPolicy) -> Self {
        Self {
            name,
            policy,
            counter: SlidingWindowCounter::new(policy.window()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.is_allowed_at(key, Instant::now())
    }

    pub fn is_allowed_at(&self, key: &str, now: Instant) -> bool {
        self.admit_at(key, now).allowed
    }

    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    // prune, check and record in one critical section
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let policy = self.policy;
        self.counter.with_ledger(key, |ledger| {
            prune_ledger(ledger, policy.window, now);
            let allowed = ledger.len() < policy.max_requests as usize;
            if allowed {
                ledger.push_back(now);
            }
            Admission {
                allowed,
                limit: policy.max_requests,
                remaining: remaining_slots(policy, ledger.len()),
                reset_at: ledger.front().map(|&oldest| oldest + policy.window),
            }
        })
    }

    pub fn reset_time(&self, key: &str) -> Option<Instant> {
        self.reset_time_at(key, Instant::now())
    }

    // oldest live timestamp plus the window, None once the window drained
    pub fn reset_time_at(&self, key: &str, now: Instant) -> Option<Instant> {
        let (oldest, _) = self.counter.live(key, now);
        oldest.map(|oldest| oldest + self.policy.window)
    }

    pub fn remaining(&self, key: &str) -> u32 {
        self.remaining_at(key, Instant::now())
    }

    pub fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        let (_, used) = self.counter.live(key, now);
        remaining_slots(self.policy, used)
    }

    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub fn evict_idle_at(&self, now: Instant) -> usize {
        self.counter.evict_empty(now)
    }

    pub fn tracked_keys(&self) -> usize {
        self.counter.key_count()
    }
}

fn remaining_slots(policy: WindowPolicy, used: usize) -> u32 {
    (policy.max_requests as usize).saturating_sub(used) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(max: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            "test",
            WindowPolicy::new(max, Duration::from_secs(window_secs)).unwrap(),
        )
    }

    #[test]
    fn policy_rejects_zero_values() {
        assert!(WindowPolicy::new(0, Duration::from_secs(1)).is_none());
        assert!(WindowPolicy::new(1, Duration::ZERO).is_none());
    }

    #[test]
    fn admits_exactly_capacity_within_window() {
        let limiter = limiter(5, 60);
        let start = Instant::now();

        for i in 0..5 {
            assert!(limiter.is_allowed_at("user:1", start + Duration::from_secs(i)));
        }
        assert!(!limiter.is_allowed_at("user:1", start + Duration::from_secs(10)));
        // The first entry expires exactly one window after it was recorded
        assert!(limiter.is_allowed_at("user:1", start + Duration::from_secs(60)));
        assert!(!limiter.is_allowed_at("user:1", start + Duration::from_secs(60)));
    }

    #[test]
    fn denial_records_nothing() {
        let limiter = limiter(1, 60);
        let start = Instant::now();

        assert!(limiter.is_allowed_at("k", start));
        assert!(!limiter.is_allowed_at("k", start + Duration::from_secs(30)));
        assert_eq!(limiter.reset_time("k"), Some(start + Duration::from_secs(60)));
        assert!(limiter.is_allowed_at("k", start + Duration::from_secs(60)));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(2, 60);
        let now = Instant::now();

        assert!(limiter.is_allowed_at("A", now));
        assert!(limiter.is_allowed_at("A", now));
        assert!(!limiter.is_allowed_at("A", now));
        assert!(limiter.is_allowed_at("B", now));
        assert_eq!(limiter.remaining("B"), 1);
    }

    #[test]
    fn reset_time_tracks_oldest_entry() {
        let limiter = limiter(3, 10);
        let start = Instant::now();
        assert_eq!(limiter.reset_time("k"), None);

        limiter.is_allowed_at("k", start);
        let first = limiter.reset_time("k").unwrap();
        limiter.is_allowed_at("k", start + Duration::from_secs(2));
        let second = limiter.reset_time("k").unwrap();
        assert!(second >= first);
        assert_eq!(first, start + Duration::from_secs(10));

        // After the first entry expires the reset moves to the second one
        limiter.is_allowed_at("k", start + Duration::from_secs(11));
        assert_eq!(limiter.reset_time("k"), Some(start + Duration::from_secs(12)));
    }

    #[test]
    fn counter_prunes_prefix_only() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(10));
        let start = Instant::now();
        counter.record("k", start);
        counter.record("k", start + Duration::from_secs(5));
        counter.record("k", start + Duration::from_secs(9));

        assert_eq!(counter.count("k", start + Duration::from_secs(9)), 3);
        assert_eq!(counter.count("k", start + Duration::from_secs(10)), 2);
        counter.prune("k", start + Duration::from_secs(19));
        assert_eq!(counter.count("k", start + Duration::from_secs(19)), 0);
        assert_eq!(counter.count("missing", start), 0);
    }

    #[test]
    fn admission_snapshot_counts_down() {
        let limiter = limiter(2, 60);
        let now = Instant::now();

        let first = limiter.admit_at("k", now);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.reset_at, Some(now + Duration::from_secs(60)));

        let second = limiter.admit_at("k", now);
        assert_eq!(second.remaining, 0);

        let third = limiter.admit_at("k", now);
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.limit, 2);
    }

    #[test]
    fn evict_idle_drops_drained_keys_only() {
        let limiter = limiter(5, 10);
        let start = Instant::now();
        limiter.is_allowed_at("old", start);
        limiter.is_allowed_at("fresh", start + Duration::from_secs(8));
        assert_eq!(limiter.tracked_keys(), 2);

        assert_eq!(limiter.evict_idle_at(start + Duration::from_secs(12)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.remaining_at("fresh", start + Duration::from_secs(12)), 4);
        assert_eq!(limiter.reset_time_at("old", start + Duration::from_secs(12)), None);
    }

    #[test]
    fn drained_window_reads_as_empty() {
        let limiter = limiter(2, 10);
        let start = Instant::now();
        limiter.is_allowed_at("k", start);
        limiter.is_allowed_at("k", start + Duration::from_secs(1));
        assert_eq!(limiter.remaining_at("k", start + Duration::from_secs(1)), 0);

        let later = start + Duration::from_secs(11);
        assert_eq!(limiter.reset_time_at("k", later), None);
        assert_eq!(limiter.remaining_at("k", later), 2);
        // reads leave the ledger alone
        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.is_allowed_at("k", later));
    }

    #[test]
    fn partly_drained_window_skips_expired_entries() {
        let limiter = limiter(3, 10);
        let start = Instant::now();
        limiter.is_allowed_at("k", start);
        limiter.is_allowed_at("k", start + Duration::from_secs(4));

        let now = start + Duration::from_secs(10);
        assert_eq!(limiter.remaining_at("k", now), 2);
        assert_eq!(limiter.reset_time_at("k", now), Some(start + Duration::from_secs(14)));
    }

    #[test]
    fn concurrent_callers_never_exceed_capacity() {
        const N: usize = 50;
        let limiter = Arc::new(limiter(N as u32, 60));

        let admitted = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2 * N)
                .map(|_| {
                    let limiter = Arc::clone(&limiter);
                    scope.spawn(move || limiter.is_allowed("shared"))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|allowed| *allowed)
                .count()
        });

        assert_eq!(admitted, N);
        assert_eq!(limiter.remaining("shared"), 0);
    }
}

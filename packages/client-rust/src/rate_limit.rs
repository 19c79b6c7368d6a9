//! Rate-limit bookkeeping shared by every bucket.
//!
//! [`RateLimitRegistry`] records which buckets are currently blocked and until
//! when. [`InvalidRequestTracker`] counts unauthorized and rate-limited
//! responses across the whole client.

use std::time::Duration;

use dashmap::DashMap;
use http::HeaderMap;
use parking_lot::Mutex;
use sonoran_core::{Operation, Service};
use tokio::time::Instant;

use crate::bucket::BucketKey;
use crate::error::DispatchError;

/// Header carrying the server's requested delay, in seconds.
pub const RETRY_AFTER: &str = "retry-after";
/// Fallback delay header, in seconds.
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
/// Longest delay honored from a rate-limit response.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// RateLimitState
// ---------------------------------------------------------------------------

/// An active rate limit on one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    pub bucket: BucketKey,
    /// Operation whose response triggered the limit.
    pub operation: Operation,
    /// Earliest instant the bucket may send again.
    pub resume_at: Instant,
    /// Delay the server asked for.
    pub retry_after: Duration,
}

impl RateLimitState {
    /// Time left until `resume_at`, zero once it has passed.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.resume_at.saturating_duration_since(now)
    }

    /// Error returned to callers refused because of this limit.
    pub(crate) fn rejection(&self) -> DispatchError {
        DispatchError::RateLimited {
            bucket: self.bucket.to_string(),
            resume_at: self.resume_at,
            retry_after: self.remaining(Instant::now()),
            cause: self.operation,
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitRegistry
// ---------------------------------------------------------------------------

/// Active rate limits keyed by bucket.
///
/// Entries past their `resume_at` are treated as absent and pruned lazily.
#[derive(Debug, Default)]
pub struct RateLimitRegistry {
    active: DashMap<BucketKey, RateLimitState>,
}

impl RateLimitRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a limit and returns the one now in force.
    ///
    /// An active limit is only ever extended: if the existing `resume_at` is
    /// later than the new one, the existing entry wins.
    pub fn set(&self, state: RateLimitState) -> RateLimitState {
        let now = Instant::now();
        let mut entry = self
            .active
            .entry(state.bucket.clone())
            .or_insert_with(|| state.clone());
        if entry.resume_at <= now || state.resume_at > entry.resume_at {
            *entry = state;
        }
        entry.clone()
    }

    /// The active limit on `bucket`, if any.
    pub fn get(&self, bucket: &BucketKey) -> Option<RateLimitState> {
        let now = Instant::now();
        let state = self.active.get(bucket).map(|entry| entry.value().clone())?;
        if state.resume_at > now {
            return Some(state);
        }
        self.active.remove_if(bucket, |_, s| s.resume_at <= now);
        None
    }

    #[must_use]
    pub fn is_active(&self, bucket: &BucketKey) -> bool {
        self.get(bucket).is_some()
    }

    /// Drops any limit on `bucket`.
    pub fn clear(&self, bucket: &BucketKey) {
        self.active.remove(bucket);
    }

    /// All limits still in force.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RateLimitState> {
        let now = Instant::now();
        self.active.retain(|_, s| s.resume_at > now);
        self.active.iter().map(|e| e.value().clone()).collect()
    }
}

/// Reads the delay requested by a rate-limit response.
///
/// `Retry-After` is preferred, then `X-RateLimit-Reset-After`; both are in
/// seconds and may be fractional. Falls back to `default` when neither parses.
/// The result never exceeds [`MAX_RETRY_DELAY`].
#[must_use]
pub fn retry_delay(headers: &HeaderMap, default: Duration) -> Duration {
    [RETRY_AFTER, RESET_AFTER]
        .into_iter()
        .find_map(|name| {
            let raw = headers.get(name)?.to_str().ok()?;
            let secs = raw.trim().parse::<f64>().ok()?;
            if secs.is_nan() || secs < 0.0 {
                return None;
            }
            Some(Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_DELAY))
        })
        .unwrap_or(default)
        .min(MAX_RETRY_DELAY)
}

/// `now + delay`, saturating at [`MAX_RETRY_DELAY`] past `now`.
#[must_use]
pub fn resume_at(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(MAX_RETRY_DELAY))
        .unwrap_or(now)
}

// ---------------------------------------------------------------------------
// InvalidRequestTracker
// ---------------------------------------------------------------------------

/// Warning raised every `interval`-th invalid response within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRequestWarning {
    /// Invalid responses seen in the current window.
    pub count: u32,
    /// Operation whose response crossed the interval.
    pub operation: Operation,
    pub service: Service,
    /// Time until the window resets.
    pub remaining: Duration,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts 401, 403 and 429 responses in a fixed window.
#[derive(Debug)]
pub struct InvalidRequestTracker {
    window: Duration,
    interval: u32,
    state: Mutex<Window>,
}

impl InvalidRequestTracker {
    #[must_use]
    pub fn new(window: Duration, interval: u32) -> Self {
        Self {
            window,
            interval: interval.max(1),
            state: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Statuses that count toward the invalid-request window.
    #[must_use]
    pub fn counts(status: u16) -> bool {
        matches!(status, 401 | 403 | 429)
    }

    /// Records a response status for `operation`, returning a warning when
    /// one is due.
    pub fn record(
        &self,
        status: u16,
        operation: Operation,
        service: Service,
    ) -> Option<InvalidRequestWarning> {
        if !Self::counts(status) {
            return None;
        }
        let now = Instant::now();
        let mut state = self.state.lock();
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }
        state.count += 1;
        if state.count % self.interval != 0 {
            return None;
        }
        Some(InvalidRequestWarning {
            count: state.count,
            operation,
            service,
            remaining: (state.started + self.window).saturating_duration_since(now),
        })
    }

    /// Invalid responses counted in the current window.
    #[must_use]
    pub fn count(&self) -> u32 {
        let state = self.state.lock();
        if state.started.elapsed() >= self.window {
            0
        } else {
            state.count
        }
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn key() -> BucketKey {
        BucketKey::new("general/get_account", Service::Cad)
    }

    fn limit(secs: u64) -> RateLimitState {
        RateLimitState {
            bucket: key(),
            operation: Operation::GetAccount,
            resume_at: Instant::now() + Duration::from_secs(secs),
            retry_after: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn limit_expires_with_time() {
        let registry = RateLimitRegistry::new();
        registry.set(limit(2));
        assert!(registry.is_active(&key()));
        assert_eq!(registry.snapshot().len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!registry.is_active(&key()));
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_at_never_moves_backwards() {
        let registry = RateLimitRegistry::new();
        let long = registry.set(limit(10));
        let effective = registry.set(limit(1));
        assert_eq!(effective.resume_at, long.resume_at);

        let longer = registry.set(limit(20));
        assert!(longer.resume_at > long.resume_at);

        registry.clear(&key());
        assert!(registry.get(&key()).is_none());
    }

    #[test]
    fn retry_delay_header_precedence() {
        let default = Duration::from_secs(1);
        let mut headers = HeaderMap::new();
        assert_eq!(retry_delay(&headers, default), default);

        headers.insert(RESET_AFTER, HeaderValue::from_static("2"));
        assert_eq!(retry_delay(&headers, default), Duration::from_secs(2));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("0.5"));
        assert_eq!(retry_delay(&headers, default), Duration::from_millis(500));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_delay(&headers, default), Duration::from_secs(2));
    }

    #[test]
    fn retry_delay_is_capped() {
        let default = Duration::from_secs(1);
        let mut headers = HeaderMap::new();
        for huge in ["1e19", "1e400", "inf", "86400"] {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(huge));
            assert_eq!(retry_delay(&headers, default), MAX_RETRY_DELAY, "{huge}");
        }
        headers.insert(RETRY_AFTER, HeaderValue::from_static("-5"));
        assert_eq!(retry_delay(&headers, default), default);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_at_never_overflows() {
        let now = Instant::now();
        assert_eq!(resume_at(now, Duration::from_secs(2)), now + Duration::from_secs(2));
        assert_eq!(resume_at(now, Duration::MAX), now + MAX_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_every_interval_within_window() {
        let tracker = InvalidRequestTracker::new(Duration::from_secs(600), 3);
        let op = Operation::GetAccount;
        assert!(tracker.record(200, op, Service::Cad).is_none());
        assert!(tracker.record(401, op, Service::Cad).is_none());
        assert!(tracker.record(403, op, Service::Cad).is_none());
        let warning = tracker.record(429, Operation::GetServers, Service::Cms).unwrap();
        assert_eq!(warning.count, 3);
        assert_eq!(warning.operation, Operation::GetServers);
        assert_eq!(warning.service, Service::Cms);
        assert_eq!(warning.remaining, Duration::from_secs(600));

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(tracker.count(), 0);
        assert!(tracker.record(401, op, Service::Cad).is_none());
        assert_eq!(tracker.count(), 1);
    }
}

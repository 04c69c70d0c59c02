//! Adaptive request pacing driven by the server's quota headers.

use super::CallScope;
use crate::config::DEFAULT_REQUESTS_PER_SECOND;
use crate::errors::CanvasResult;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Rate used while the quota is nearly exhausted.
pub const CRITICAL_RATE: f64 = 1.0;

/// Rate used while the quota is running low.
pub const WARNING_RATE: f64 = 2.0;

/// Quota fraction at or below which the critical tier applies.
pub const CRITICAL_THRESHOLD: f64 = 0.20;

/// Quota fraction at or below which the warning tier applies.
pub const WARNING_THRESHOLD: f64 = 0.50;

/// Discrete pacing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateTier {
    /// Remaining quota at or below 20%.
    Critical,
    /// Remaining quota at or below 50%.
    Warning,
    /// Plenty of quota left.
    Normal,
}

impl RateTier {
    /// Picks the tier for a remaining/total fraction.
    pub fn for_fraction(fraction: f64) -> Self {
        if fraction <= CRITICAL_THRESHOLD {
            Self::Critical
        } else if fraction <= WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

impl fmt::Display for RateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Warning => write!(f, "warning"),
            Self::Normal => write!(f, "normal"),
        }
    }
}

/// Single-slot token bucket.
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(refill_rate: f64) -> Self {
        Self {
            tokens: 1.0,
            capacity: 1.0,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes a token, or returns how long until one is available.
    fn try_acquire(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let needed = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(needed / self.refill_rate))
        }
    }

    fn set_rate(&mut self, rate: f64) {
        self.refill();
        self.refill_rate = rate;
    }
}

struct GovernorState {
    tier: RateTier,
    warning_shown: HashSet<RateTier>,
    bucket: TokenBucket,
}

/// Token-throttled gate whose rate follows the latest quota snapshot.
pub struct RateGovernor {
    normal_rate: f64,
    state: Mutex<GovernorState>,
    warnings_emitted: AtomicU64,
}

impl RateGovernor {
    /// Creates a governor whose normal tier runs at `normal_rate` requests/second.
    ///
    /// A zero, negative or non-finite rate falls back to
    /// [`DEFAULT_REQUESTS_PER_SECOND`].
    pub fn new(normal_rate: f64) -> Self {
        let normal_rate = if normal_rate.is_finite() && normal_rate > 0.0 {
            normal_rate
        } else {
            warn!(
                requested = normal_rate,
                fallback = DEFAULT_REQUESTS_PER_SECOND,
                "Invalid request rate, using default"
            );
            DEFAULT_REQUESTS_PER_SECOND
        };

        Self {
            normal_rate,
            state: Mutex::new(GovernorState {
                tier: RateTier::Normal,
                warning_shown: HashSet::new(),
                bucket: TokenBucket::new(normal_rate),
            }),
            warnings_emitted: AtomicU64::new(0),
        }
    }

    /// Rate for a tier. The throttled tiers never exceed the normal rate.
    pub fn rate_for(&self, tier: RateTier) -> f64 {
        match tier {
            RateTier::Critical => CRITICAL_RATE.min(self.normal_rate),
            RateTier::Warning => WARNING_RATE.min(self.normal_rate),
            RateTier::Normal => self.normal_rate,
        }
    }

    /// Gets the active tier.
    pub fn current_tier(&self) -> RateTier {
        self.state.lock().tier
    }

    /// Gets the active rate in requests per second.
    pub fn current_rate(&self) -> f64 {
        self.rate_for(self.current_tier())
    }

    /// Returns true if the warning for `tier` has been shown since the last
    /// return to normal.
    pub fn warning_shown(&self, tier: RateTier) -> bool {
        self.state.lock().warning_shown.contains(&tier)
    }

    /// Number of tier warnings emitted over the governor's lifetime.
    pub fn warnings_emitted(&self) -> u64 {
        self.warnings_emitted.load(Ordering::Relaxed)
    }

    /// Re-evaluates the tier from a quota snapshot. Returns the new tier if
    /// it changed.
    ///
    /// A non-positive or non-finite total means the quota is unknown and the
    /// call is a no-op.
    pub fn adjust(&self, remaining: f64, total: f64) -> Option<RateTier> {
        if !(total > 0.0) || !total.is_finite() || !remaining.is_finite() {
            return None;
        }

        let fraction = remaining / total;
        let tier = RateTier::for_fraction(fraction);
        let mut state = self.state.lock();
        let mut warned = false;

        if tier == RateTier::Normal {
            state.warning_shown.clear();
        } else if state.warning_shown.insert(tier) {
            warned = true;
            self.warnings_emitted.fetch_add(1, Ordering::Relaxed);
            warn!(
                tier = %tier,
                remaining,
                total,
                rate = self.rate_for(tier),
                "Request quota running low, slowing down"
            );
        }

        if state.tier == tier {
            return None;
        }

        let previous = state.tier;
        state.tier = tier;
        state.bucket.set_rate(self.rate_for(tier));

        if tier == RateTier::Normal {
            info!(from = %previous, rate = self.normal_rate, "Request quota recovered");
        } else if !warned {
            info!(
                from = %previous,
                to = %tier,
                rate = self.rate_for(tier),
                "Request rate tier changed"
            );
        }

        Some(tier)
    }

    /// Waits for a request slot at the current rate. Returns how long the
    /// caller was held back.
    pub async fn wait(&self, scope: &CallScope) -> CanvasResult<Duration> {
        let mut waited = Duration::ZERO;

        loop {
            scope.check()?;
            let delay = self.state.lock().bucket.try_acquire();
            match delay {
                None => return Ok(waited),
                Some(delay) => {
                    scope.sleep(delay).await?;
                    waited += delay;
                }
            }
        }
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_SECOND)
    }
}

impl fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateGovernor")
            .field("normal_rate", &self.normal_rate)
            .field("tier", &self.current_tier())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CanvasErrorKind;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_tier_boundaries() {
        let governor = RateGovernor::default();
        let cases = [
            (0.0, 1.0),
            (10.0, 1.0),
            (20.0, 1.0),
            (20.5, 2.0),
            (35.0, 2.0),
            (50.0, 2.0),
            (50.5, 5.0),
            (90.0, 5.0),
            (100.0, 5.0),
        ];

        for (remaining, expected) in cases {
            governor.adjust(remaining, 100.0);
            assert_eq!(governor.current_rate(), expected, "remaining={}", remaining);
        }
    }

    #[test]
    fn test_unknown_total_is_noop() {
        let governor = RateGovernor::default();
        governor.adjust(10.0, 100.0);
        assert_eq!(governor.current_tier(), RateTier::Critical);

        assert_eq!(governor.adjust(90.0, 0.0), None);
        assert_eq!(governor.adjust(90.0, -5.0), None);
        assert_eq!(governor.adjust(f64::NAN, 100.0), None);
        assert_eq!(governor.current_tier(), RateTier::Critical);
    }

    #[test]
    fn test_same_tier_does_not_rewarn() {
        let governor = RateGovernor::default();

        assert_eq!(governor.adjust(15.0, 100.0), Some(RateTier::Critical));
        assert_eq!(governor.adjust(10.0, 100.0), None);
        assert_eq!(governor.adjust(5.0, 100.0), None);

        assert_eq!(governor.warnings_emitted(), 1);
        assert!(governor.warning_shown(RateTier::Critical));
    }

    #[test]
    fn test_recovery_clears_warnings() {
        let governor = RateGovernor::default();

        governor.adjust(40.0, 100.0);
        governor.adjust(20.0, 100.0);
        assert!(governor.warning_shown(RateTier::Warning));
        assert!(governor.warning_shown(RateTier::Critical));
        assert_eq!(governor.warnings_emitted(), 2);

        assert_eq!(governor.adjust(70.0, 100.0), Some(RateTier::Normal));
        assert!(!governor.warning_shown(RateTier::Warning));
        assert!(!governor.warning_shown(RateTier::Critical));

        governor.adjust(10.0, 100.0);
        assert_eq!(governor.warnings_emitted(), 3);
    }

    #[test]
    fn test_throttled_rates_capped_by_normal() {
        let governor = RateGovernor::new(1.5);
        assert_eq!(governor.rate_for(RateTier::Warning), 1.5);
        assert_eq!(governor.rate_for(RateTier::Critical), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_rate_falls_back_to_default() {
        let scope = CallScope::new();

        for rate in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let governor = RateGovernor::new(rate);
            assert_eq!(governor.current_rate(), DEFAULT_REQUESTS_PER_SECOND);

            governor.wait(&scope).await.unwrap();
            let waited = governor.wait(&scope).await.unwrap();
            assert!(waited <= Duration::from_millis(210), "{:?}", waited);
        }
    }

    #[test]
    fn test_upgrade_within_throttled_tiers_reports_change() {
        let governor = RateGovernor::default();

        assert_eq!(governor.adjust(40.0, 100.0), Some(RateTier::Warning));
        assert_eq!(governor.adjust(10.0, 100.0), Some(RateTier::Critical));
        assert_eq!(governor.adjust(40.0, 100.0), Some(RateTier::Warning));

        // Moving back up to warning is a change but not a fresh warning.
        assert_eq!(governor.warnings_emitted(), 2);
        assert_eq!(governor.current_rate(), WARNING_RATE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_paces_requests() {
        let governor = RateGovernor::new(5.0);
        let scope = CallScope::new();

        let first = governor.wait(&scope).await.unwrap();
        assert_eq!(first, Duration::ZERO);

        let second = governor.wait(&scope).await.unwrap();
        assert!(second >= Duration::from_millis(190), "{:?}", second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_tier_waits_a_second() {
        let governor = RateGovernor::new(5.0);
        let scope = CallScope::new();
        governor.adjust(5.0, 100.0);

        governor.wait(&scope).await.unwrap();
        let waited = governor.wait(&scope).await.unwrap();
        assert!(waited >= Duration::from_millis(990), "{:?}", waited);
    }

    #[tokio::test]
    async fn test_wait_observes_cancellation() {
        let governor = RateGovernor::new(0.01);
        let token = CancellationToken::new();
        let scope = CallScope::with_token(token.clone());

        governor.wait(&scope).await.unwrap();
        token.cancel();
        let err = governor.wait(&scope).await.unwrap_err();
        assert_eq!(err.kind(), CanvasErrorKind::Cancelled);
    }
}

// =============================================================================
// Adaptive rate limiter — named budgets + exponential backoff on 429/418
// =============================================================================
//
// Each venue exposes a handful of independent weight budgets (market data,
// account, order placement, ...). `acquire` blocks the caller until the
// current window has room for `weight` more units; `handle_429` opens a
// global penalty box sized by exponential backoff with jitter, capped at
// 60s; a clean response after a penalty decays the backoff stage by one.
// =============================================================================

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Static configuration for one named budget.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// Maximum weight units spendable per window.
    pub max: u32,
    /// Window length.
    pub window: Duration,
}

impl Budget {
    pub const fn new(max: u32, window_secs: u64) -> Self {
        Self {
            max,
            window: Duration::from_secs(window_secs),
        }
    }
}

struct WindowState {
    budget: Budget,
    used: u32,
    reset_at: Instant,
}

struct LimiterState {
    windows: HashMap<String, WindowState>,
    backoff_until: Option<Instant>,
    backoff_stage: u32,
}

/// Process-local adaptive rate limiter. One instance must be shared (not
/// cloned-per-client) across every client talking to the same venue.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(budgets: impl IntoIterator<Item = (&'static str, Budget)>) -> Self {
        let now = Instant::now();
        let windows = budgets
            .into_iter()
            .map(|(name, budget)| {
                (
                    name.to_string(),
                    WindowState {
                        budget,
                        used: 0,
                        reset_at: now + budget.window,
                    },
                )
            })
            .collect();

        Self {
            state: Mutex::new(LimiterState {
                windows,
                backoff_until: None,
                backoff_stage: 0,
            }),
        }
    }

    /// Binance-shaped default: a 1200/min `market_data` budget, a 1200/min
    /// `account` budget, and a 300/10s `order` budget.
    pub fn binance_defaults() -> Self {
        Self::new([
            ("market_data", Budget::new(1200, 60)),
            ("account", Budget::new(1200, 60)),
            ("order", Budget::new(300, 10)),
        ])
    }

    /// Bybit-shaped default: generous per-endpoint budgets (V5 REST limits
    /// are per-key, not globally published, so these are conservative).
    pub fn bybit_defaults() -> Self {
        Self::new([
            ("market_data", Budget::new(600, 5)),
            ("account", Budget::new(600, 5)),
            ("order", Budget::new(100, 1)),
        ])
    }

    /// Block until `budget` has room for `weight` more units and any active
    /// global backoff has elapsed.
    pub async fn acquire(&self, budget: &str, weight: u32) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();

                if let Some(until) = state.backoff_until {
                    if now < until {
                        Some(until - now)
                    } else {
                        state.backoff_until = None;
                        None
                    }
                } else {
                    None
                }
            };
            if let Some(wait) = wait {
                warn!(budget, wait_ms = wait.as_millis() as u64, "rate-limit backoff active");
                tokio::time::sleep(wait).await;
                continue;
            }

            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();
                let Some(w) = state.windows.get_mut(budget) else {
                    return;
                };

                if now > w.reset_at {
                    w.used = 0;
                    w.reset_at = now + w.budget.window;
                }

                // Leave a 5% safety margin under the hard cap.
                let soft_cap = (w.budget.max as f64 * 0.95) as u32;
                if w.used + weight > soft_cap {
                    Some(w.reset_at.saturating_duration_since(now).max(Duration::from_millis(500)))
                } else {
                    w.used += weight;
                    None
                }
            };

            match wait {
                Some(wait) => {
                    debug!(budget, wait_ms = wait.as_millis() as u64, "local budget exhausted, sleeping");
                    tokio::time::sleep(wait).await;
                }
                None => return,
            }
        }
    }

    /// Parse venue-specific used-weight headers and fold them into the
    /// matching budget's local counter; warn once usage crosses 80%.
    pub fn update_from_headers(&self, budget: &str, used_weight: u32) {
        let mut state = self.state.lock();
        if let Some(w) = state.windows.get_mut(budget) {
            w.used = used_weight;
            if used_weight > (w.budget.max as f64 * 0.8) as u32 {
                warn!(budget, used_weight, max = w.budget.max, "rate-limit usage above 80%");
            }
        }
    }

    /// Register a 429/418 response: open the penalty box. `retry_after`
    /// overrides the computed backoff when the venue supplied one.
    pub fn handle_429(&self, retry_after: Option<Duration>) {
        let mut state = self.state.lock();
        state.backoff_stage += 1;
        let wait = match retry_after {
            Some(d) => d,
            None => {
                let jitter: f64 = rand::thread_rng().gen_range(0.1..1.0);
                let raw = 2f64.powi(state.backoff_stage as i32) + jitter;
                Duration::from_secs_f64(raw.min(60.0))
            }
        };
        state.backoff_until = Some(Instant::now() + wait);
        warn!(
            stage = state.backoff_stage,
            wait_secs = wait.as_secs_f64(),
            "rate-limit backoff triggered by 429/418"
        );
    }

    /// Decay the backoff stage by one after a clean response.
    pub fn reset_backoff(&self) {
        let mut state = self.state.lock();
        if state.backoff_stage > 0 {
            state.backoff_stage -= 1;
        }
    }

    pub fn backoff_stage(&self) -> u32 {
        self.state.lock().backoff_stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_within_budget_does_not_block() {
        let limiter = RateLimiter::new([("x", Budget::new(100, 60))]);
        let start = Instant::now();
        limiter.acquire("x", 10).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn handle_429_opens_backoff_and_escalates() {
        let limiter = RateLimiter::new([("x", Budget::new(100, 60))]);
        assert_eq!(limiter.backoff_stage(), 0);
        limiter.handle_429(None);
        assert_eq!(limiter.backoff_stage(), 1);
        limiter.handle_429(None);
        assert_eq!(limiter.backoff_stage(), 2);
    }

    #[test]
    fn reset_backoff_decays_one_stage_at_a_time() {
        let limiter = RateLimiter::new([("x", Budget::new(100, 60))]);
        limiter.handle_429(None);
        limiter.handle_429(None);
        assert_eq!(limiter.backoff_stage(), 2);
        limiter.reset_backoff();
        assert_eq!(limiter.backoff_stage(), 1);
        limiter.reset_backoff();
        assert_eq!(limiter.backoff_stage(), 0);
        limiter.reset_backoff();
        assert_eq!(limiter.backoff_stage(), 0);
    }

    #[test]
    fn retry_after_overrides_exponential_backoff() {
        let limiter = RateLimiter::new([("x", Budget::new(100, 60))]);
        limiter.handle_429(Some(Duration::from_secs(3)));
        let remaining = {
            let state = limiter.state.lock();
            state.backoff_until.unwrap() - Instant::now()
        };
        assert!(remaining <= Duration::from_secs(3));
        assert!(remaining > Duration::from_secs(2));
    }

    #[test]
    fn update_from_headers_sets_used_weight() {
        let limiter = RateLimiter::new([("market_data", Budget::new(1200, 60))]);
        limiter.update_from_headers("market_data", 900);
        let state = limiter.state.lock();
        assert_eq!(state.windows["market_data"].used, 900);
    }
}

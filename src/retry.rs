// src/retry.rs

//! Exponential backoff with jitter.
//!
//! Two retry scopes share this policy: the fallback chain retries a single
//! backend within its budget, and the orchestrator retries whole jobs after
//! the chain is exhausted. The scopes stay separate; this module only
//! computes delays.

use std::time::Duration;

use rand::Rng;

use crate::models::{BackendsConfig, JobsConfig};

/// Backoff policy: `initial * multiplier^attempt`, capped, with ±30% jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Delay ceiling.
    pub max_backoff: Duration,
    /// Exponential multiplier.
    pub multiplier: f64,
    /// Apply random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Per-backend policy used inside the fallback chain.
    pub fn for_backend(config: &BackendsConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.rate_limit_cooldown_secs),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Orchestrator-level policy applied between whole-job attempts.
    pub fn for_jobs(config: &JobsConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt as i32);
        let base = self.initial_backoff.as_millis() as f64 * exp;
        let capped = base.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(self.apply_jitter(capped) as u64)
    }

    fn apply_jitter(&self, millis: f64) -> f64 {
        if !self.jitter {
            return millis;
        }
        // ±30%, floor at zero
        let factor = 1.0 + rand::rng().random_range(-0.3..0.3);
        (millis * factor).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let p = policy(false);
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn delays_are_capped() {
        let p = policy(false);
        assert_eq!(p.delay_for(10), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_in_band() {
        let p = policy(true);
        for attempt in 0..4 {
            let base = policy(false).delay_for(attempt).as_millis() as f64;
            let jittered = p.delay_for(attempt).as_millis() as f64;
            assert!(jittered >= base * 0.69, "attempt {attempt}: {jittered} < {}", base * 0.69);
            assert!(jittered <= base * 1.31, "attempt {attempt}: {jittered} > {}", base * 1.31);
        }
    }
}

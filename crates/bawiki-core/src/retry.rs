//! Attempt ordering and backoff between in-place retries.
//!
//! The primary candidate gets `retry_budget + 1` attempts; every alternate
//! gets exactly one. [`AttemptPlan`] is the single source of that ordering.

use std::time::Duration;

/// Delay inserted between in-place retries of the primary candidate.
///
/// Fallback to an alternate candidate is never delayed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Same pause before every retry of the primary mirror.
    Fixed { delay: Duration },
    /// `base * factor^retry`, capped at `max`, optionally jittered by up to half.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Delay before the given retry (0-based: 0 is the first retry).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(retry.min(i32::MAX as u32) as i32);
                let seconds = base.as_secs_f64() * scale;
                let capped_seconds = seconds.min(max.as_secs_f64()).max(0.0);

                let mut delay = Duration::from_secs_f64(capped_seconds);

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms =
                        delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// One scheduled attempt: which candidate, and which try against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// Index into the candidate list.
    pub candidate: usize,
    /// 0 for the first try against this candidate.
    pub retry: u32,
}

/// Deterministic attempt order for a candidate list and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan {
    candidates: usize,
    retry_budget: u32,
}

impl AttemptPlan {
    pub const fn new(candidates: usize, retry_budget: u32) -> Self {
        Self {
            candidates,
            retry_budget,
        }
    }

    /// Total attempts: `(retry_budget + 1) + (candidates - 1)`, or 0 without candidates.
    pub fn len(&self) -> usize {
        if self.candidates == 0 {
            return 0;
        }
        (self.retry_budget as usize).saturating_add(self.candidates)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Attempt> {
        let primary_tries = if self.candidates == 0 {
            0
        } else {
            self.retry_budget.saturating_add(1)
        };
        let primary = (0..primary_tries).map(|retry| Attempt {
            candidate: 0,
            retry,
        });
        let alternates = (1..self.candidates).map(|candidate| Attempt {
            candidate,
            retry: 0,
        });
        primary.chain(alternates)
    }

    /// Upper bound on the time spent in attempts alone, excluding backoff.
    pub fn worst_case_latency(&self, per_attempt_timeout: Duration) -> Duration {
        let attempts = u32::try_from(self.len()).unwrap_or(u32::MAX);
        per_attempt_timeout.saturating_mul(attempts)
    }
}

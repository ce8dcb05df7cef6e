// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Retry policy enforcement for the send pipeline.
//!
//! A policy is a try limit plus a sleep rule evaluated over the timestamps
//! of every attempt made so far.  Per-request attempt state lives under a
//! ticket; dropping the ticket clears the state, which also covers callers
//! that are cancelled mid-retry.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::errors::{ZkError, ZkResult};

/// How long to sleep before the next attempt, as a function of the attempt
/// timestamps recorded so far.
#[derive(Debug, Clone)]
enum SleepRule {
    NoDelay,
    ExponentialBackoff { base: f64, maximum: Option<f64> },
    UntilElapsed { total: Duration },
}

pub struct RetryPolicy {
    try_limit: Option<usize>,
    rule: SleepRule,
    timings: DashMap<u64, Vec<Instant>>,
    next_ticket: AtomicU64,
}

/// Per-request attempt tracker.  Dropping it forgets the attempts.
pub struct RetryTicket<'a> {
    policy: &'a RetryPolicy,
    id: u64,
}

impl Drop for RetryTicket<'_> {
    fn drop(&mut self) {
        self.policy.timings.remove(&self.id);
    }
}

impl RetryPolicy {
    fn with_rule(try_limit: Option<usize>, rule: SleepRule) -> Self {
        Self {
            try_limit,
            rule,
            timings: DashMap::new(),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// A single attempt; the second `enforce` fails.
    pub fn once() -> Self {
        Self::n_times(1)
    }

    /// At most `n` attempts, with no delay between them.
    pub fn n_times(n: usize) -> Self {
        Self::with_rule(Some(n), SleepRule::NoDelay)
    }

    /// Unlimited attempts with no delay.
    pub fn forever() -> Self {
        Self::with_rule(None, SleepRule::NoDelay)
    }

    /// Unlimited attempts sleeping `base ^ attempts` seconds, optionally
    /// capped at `maximum` seconds.
    pub fn exponential_backoff(base: f64, maximum: Option<f64>) -> Self {
        Self::with_rule(None, SleepRule::ExponentialBackoff { base, maximum })
    }

    /// Retries until `total` has elapsed since the first attempt.
    pub fn until_elapsed(total: Duration) -> Self {
        Self::with_rule(None, SleepRule::UntilElapsed { total })
    }

    pub fn ticket(&self) -> RetryTicket<'_> {
        RetryTicket {
            policy: self,
            id: self.next_ticket.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Records an attempt and sleeps as the policy dictates.  The first
    /// attempt is always free.  Raises `FailedRetry` when the try limit is
    /// reached or the computed wait is negative.
    pub async fn enforce(&self, ticket: &RetryTicket<'_>) -> ZkResult<()> {
        let wait_seconds = {
            let mut attempts = self.timings.entry(ticket.id).or_default();
            attempts.push(Instant::now());

            if attempts.len() == 1 {
                return Ok(());
            }
            if let Some(limit) = self.try_limit
                && attempts.len() >= limit
            {
                return Err(ZkError::FailedRetry);
            }
            self.wait_seconds(&attempts)
        };

        match wait_seconds {
            None => Ok(()),
            Some(seconds) if seconds == 0.0 => Ok(()),
            Some(seconds) if seconds < 0.0 => Err(ZkError::FailedRetry),
            Some(seconds) => {
                debug!(seconds, "waiting until next try");
                sleep(Duration::from_secs_f64(seconds)).await;
                Ok(())
            },
        }
    }

    pub fn clear(&self, ticket: &RetryTicket<'_>) {
        self.timings.remove(&ticket.id);
    }

    fn wait_seconds(&self, attempts: &[Instant]) -> Option<f64> {
        match &self.rule {
            SleepRule::NoDelay => None,
            SleepRule::ExponentialBackoff { base, maximum } => {
                let mut wait = base.powi(attempts.len() as i32);
                if let Some(maximum) = maximum {
                    wait = wait.min(*maximum);
                }
                Some(wait)
            },
            SleepRule::UntilElapsed { total } => {
                let first = attempts.first().copied().unwrap_or_else(Instant::now);
                Some(total.as_secs_f64() - first.elapsed().as_secs_f64())
            },
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use rand::RngExt;
use tokio::time::Instant;

/// Locks a std mutex, recovering the guard when a panicking holder poisoned
/// it.  None of the guarded state in this crate can be left inconsistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Generates a random 16-byte identifier and returns its 32-char hex form.
///
/// Sequential recipes embed this in znode names to recognize their own
/// children among siblings.
pub fn generate_guid() -> String {
    let mut raw = [0u8; 16];
    rand::rng().fill(&mut raw);
    hex::encode(raw)
}

/// A monotonic deadline computed once from an optional timeout.
///
/// Recipes that wait several times in a row evaluate every wait against the
/// same instant, so successive waits cannot overrun the caller's budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn indefinite() -> Self {
        Self { at: None }
    }

    /// Remaining budget; `None` means unbounded, zero means already passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn has_passed(&self) -> bool {
        match self.at {
            None => false,
            Some(at) => at <= Instant::now(),
        }
    }

    pub fn is_indefinite(&self) -> bool {
        self.at.is_none()
    }
}

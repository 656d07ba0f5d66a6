// src/clock.rs
//! Clock capability, injected so tests can pin wall-clock reads instead of
//! reaching for `Utc::now()` directly.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Default clock backed by the system wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test double that returns a fixed, settable instant.
#[derive(Debug)]
pub struct FixedClock {
    ticks: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            ticks: AtomicI64::new(crate::ticks::to_ticks(at)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.ticks.store(crate::ticks::to_ticks(at), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        crate::ticks::from_ticks(self.ticks.load(Ordering::SeqCst))
    }
}

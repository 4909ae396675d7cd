//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the acomms runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Injectable monotonic time sources.
//!
//! Blackout windows, ack timeouts, time-to-live and priority aging all compare a stored
//! [`Instant`] against "now". Components take a [`SharedClock`] so tests can drive time
//! with a [`ManualClock`] instead of sleeping.
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of monotonic time.
pub trait Clock: Send + Sync + Debug {
    /// Current monotonic instant. Successive calls never go backwards.
    fn now(&self) -> Instant;
}

/// Reference-counted clock handle shared between components.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock backed implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    pub fn with_start(origin: Instant) -> Self {
        Self {
            origin,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move time forward by `delta`; clones observe the same offset.
    pub fn advance(&self, delta: Duration) {
        let mut elapsed = self.elapsed.lock();
        *elapsed = elapsed.saturating_add(delta);
    }

    /// Total time advanced since construction.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }
}

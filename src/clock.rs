//! clock.rs
//! Monotonic time source used for dt computation and message stamps.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

pub trait Clock: Send + Sync {
    /// Monotonic nanoseconds since an arbitrary, fixed origin.
    fn now_ns(&self) -> u64;

    #[inline]
    fn now_secs(&self) -> f64 {
        self.now_ns() as f64 * 1e-9
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall-independent clock backed by `Instant`.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Externally driven clock. Cloned handles share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    ns: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ns(&self, ns: u64) {
        self.ns.store(ns, Ordering::SeqCst);
    }

    pub fn set_secs(&self, secs: f64) {
        self.set_ns((secs * 1e9) as u64);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.ns.fetch_add((secs * 1e9) as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.ns.load(Ordering::SeqCst)
    }
}

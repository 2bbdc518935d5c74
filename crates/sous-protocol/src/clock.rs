//! Wall-clock port.
//!
//! The store stamps `last_tick_ms` and the driver measures elapsed time
//! through the same [`Clock`], so swapping the clock swaps time for both.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time from `chrono::Utc`. Not monotonic: if the system clock
/// steps backwards, elapsed time measures as zero (it saturates) and the
/// countdown stalls until the clock passes the last stored tick again.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Runs a base clock `speed` times faster from the moment it was created.
#[derive(Debug, Clone)]
pub struct ScaledClock {
    base: Arc<dyn Clock>,
    origin_ms: u64,
    speed: u32,
}

impl ScaledClock {
    pub fn new(base: Arc<dyn Clock>, speed: u32) -> Self {
        let origin_ms = base.now_ms();
        Self {
            base,
            origin_ms,
            speed: speed.max(1),
        }
    }
}

impl Clock for ScaledClock {
    fn now_ms(&self) -> u64 {
        let real_elapsed = self.base.now_ms().saturating_sub(self.origin_ms);
        self.origin_ms
            .saturating_add(real_elapsed.saturating_mul(u64::from(self.speed)))
    }
}

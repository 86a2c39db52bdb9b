use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use crate::error::{SimError, SimResult};

/// Timestep of the default clock, in seconds (0.1 ms).
pub const DEFAULT_DT: f64 = 1e-4;

static NEXT_CLOCK: AtomicU64 = AtomicU64::new(1);

static DEFAULT_CLOCK: LazyLock<Arc<Clock>> = LazyLock::new(|| {
    Arc::new(Clock {
        id: ClockId::next(),
        dt: DEFAULT_DT,
        tick: AtomicU64::new(0),
    })
});

/// Identity of a clock. Two objects share a time base iff their clock IDs
/// are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct ClockId(u64);

impl ClockId {
    fn next() -> Self {
        Self(NEXT_CLOCK.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clock#{}", self.0)
    }
}

/// Time base shared by scheduled objects: a fixed timestep and a monotonic
/// tick counter.
///
/// Clocks are shared behind `Arc`, so the counter is atomic; the scheduler
/// that owns the run is the only one expected to advance it.
#[derive(Debug)]
pub struct Clock {
    id: ClockId,
    dt: f64,
    tick: AtomicU64,
}

impl Clock {
    /// Create a clock at tick 0 with timestep `dt` seconds.
    pub fn new(dt: f64) -> SimResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::InvalidTimestep(dt));
        }
        Ok(Self {
            id: ClockId::next(),
            dt,
            tick: AtomicU64::new(0),
        })
    }

    /// Advance the clock by one tick. Returns the new tick number.
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Return the current tick number.
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Current time in seconds.
    pub fn t(&self) -> f64 {
        self.tick() as f64 * self.dt
    }

    /// Timestep in seconds.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Reset to tick 0.
    pub fn reinit(&self) {
        self.tick.store(0, Ordering::Release);
    }

    /// This clock's identity.
    pub fn id(&self) -> ClockId {
        self.id
    }
}

/// The process-wide default clock, used by objects built without one.
pub fn default_clock() -> Arc<Clock> {
    Arc::clone(&DEFAULT_CLOCK)
}

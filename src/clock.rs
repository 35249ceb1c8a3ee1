use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::*;

/// Logical (seconds, nanoseconds) time. Field order gives the derived
/// ordering the right lexicographic meaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimClock {
    seconds: u32,
    nanos: u32,
}

impl SimClock {
    pub const ZERO: SimClock = SimClock { seconds: 0, nanos: 0 };

    /// Build a clock value, carrying any nanosecond overflow into seconds
    pub fn new(seconds: u32, nanos: u64) -> Self {
        let mut clock = SimClock { seconds, nanos: 0 };
        clock.accrue(nanos);
        clock
    }

    pub fn from_nanos(total: u64) -> Self {
        SimClock::new(0, total)
    }

    #[inline]
    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    #[inline]
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    #[inline]
    pub fn as_nanos(&self) -> u64 {
        self.seconds as u64 * NANOS_PER_SECOND + self.nanos as u64
    }

    /// One dispatcher tick: 250ms split evenly across the active workers
    pub fn advance(&mut self, active_workers: usize) {
        let share = TICK_NANOS / active_workers.max(1) as u64;
        self.accrue(share);
    }

    /// Add a fixed delay (access cost, fault service, write-back)
    pub fn accrue(&mut self, nanos: u64) {
        let total = self.nanos as u64 + nanos;
        self.seconds = self.seconds.saturating_add((total / NANOS_PER_SECOND) as u32);
        self.nanos = (total % NANOS_PER_SECOND) as u32;
    }

    /// The value `nanos` later than `self`, leaving `self` alone
    pub fn after(&self, nanos: u64) -> SimClock {
        let mut later = *self;
        later.accrue(nanos);
        later
    }

    /// Nanoseconds from `earlier` to `self`, zero if `earlier` is ahead
    pub fn since(&self, earlier: SimClock) -> u64 {
        self.as_nanos().saturating_sub(earlier.as_nanos())
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:09}", self.seconds, self.nanos)
    }
}

/// Clock region shared with workers. Only the coordinator publishes into it;
/// workers just read it to stamp their own logging. The (seconds, nanoseconds)
/// pair is packed into one word so readers never observe a torn value.
#[derive(Debug, Default)]
pub struct ClockRegion {
    packed: AtomicU64,
}

impl ClockRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, clock: SimClock) {
        let packed = ((clock.seconds as u64) << 32) | clock.nanos as u64;
        self.packed.store(packed, Ordering::Release);
    }

    pub fn read(&self) -> SimClock {
        let packed = self.packed.load(Ordering::Acquire);
        SimClock {
            seconds: (packed >> 32) as u32,
            nanos: packed as u32,
        }
    }
}

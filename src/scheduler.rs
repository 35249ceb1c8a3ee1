use log::info;

use crate::clock::SimClock;
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::process::{ProcessSlot, SlotIndex};
use crate::state::SimulationState;
use crate::worker::{WorkerHandle, WorkerSpawner};

/// Decides when a new worker may start, measured on the simulated clock
#[derive(Debug, Clone)]
pub struct LaunchScheduler {
    total: u32,
    simultaneous: usize,
    interval_nanos: u64,
    last_launch: SimClock,
}

impl LaunchScheduler {
    pub fn new(total: u32, simultaneous: u32, interval_nanos: u64) -> Self {
        LaunchScheduler {
            total,
            simultaneous: simultaneous as usize,
            interval_nanos,
            last_launch: SimClock::ZERO,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(
            config.total_workers,
            config.simultaneous,
            config.launch_interval_nanos(),
        )
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Every worker has been launched
    pub fn exhausted(&self, state: &SimulationState) -> bool {
        state.stats.launched >= self.total
    }

    /// All three admission conditions hold
    pub fn ready(&self, state: &SimulationState) -> bool {
        !self.exhausted(state)
            && state.active_workers() < self.simultaneous
            && state.clock.since(self.last_launch) >= self.interval_nanos
    }

    /// Launch a worker into the first free slot if the scheduler allows it
    pub fn try_admit<S: WorkerSpawner + ?Sized>(
        &mut self,
        state: &mut SimulationState,
        spawner: &mut S,
    ) -> Result<Option<(SlotIndex, WorkerHandle)>> {
        if !self.ready(state) {
            return Ok(None);
        }
        let slot = state.processes.first_free().ok_or(SimError::ProcessTableFull)?;
        let handle = spawner.spawn()?;

        let now = state.clock;
        let pages = state.geometry.page_count;
        state.processes.occupy(slot, ProcessSlot::new(handle.pid, now, pages));
        state.stats.launched += 1;
        self.last_launch = now;

        info!(
            "OSS: Launched worker PID {} into {} at time {} ({} of {})",
            handle.pid, slot, now, state.stats.launched, self.total
        );
        Ok(Some((slot, handle)))
    }
}

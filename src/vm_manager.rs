//! The coordinator's dispatch loop.
//!
//! Each iteration ticks the simulated clock, drains every pending request,
//! finishes matured page loads, reaps workers that exited on their own,
//! ticks again, dumps the tables every half second of simulated time and
//! finally considers launching another worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::clock::{ClockRegion, SimClock};
use crate::config::SimConfig;
use crate::constants::*;
use crate::error::{Result, SimError};
use crate::io::{render_frame_table, render_process_table};
use crate::message::Message;
use crate::process::{Pid, SlotIndex};
use crate::scheduler::LaunchScheduler;
use crate::state::{SimulationState, Stats};
use crate::translation::{complete, resolve, Resolution};
use crate::worker::{Runtime, WorkerHandle};

pub struct VmManager {
    state: SimulationState,
    scheduler: LaunchScheduler,
    region: Arc<ClockRegion>,
    last_snapshot: SimClock,
    timeout: Duration,
}

impl VmManager {
    pub fn new(config: &SimConfig, region: Arc<ClockRegion>) -> Self {
        let state = SimulationState::new(config.geometry, config.table_size);
        region.publish(state.clock);
        VmManager {
            state,
            scheduler: LaunchScheduler::from_config(config),
            region,
            last_snapshot: SimClock::ZERO,
            timeout: config.timeout,
        }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Every worker has been launched and every one of them is gone
    pub fn is_finished(&self) -> bool {
        self.scheduler.exhausted(&self.state) && self.state.active_workers() == 0
    }

    /// Run until every worker finishes or the wall-clock timeout fires.
    /// Any failure, including the timeout, forcibly stops the remaining
    /// workers before returning.
    pub fn run<R: Runtime>(&mut self, runtime: &mut R) -> Result<Stats> {
        let started = Instant::now();
        while !self.is_finished() {
            if started.elapsed() >= self.timeout {
                error!(
                    "OSS: timeout with {} active workers at {}, terminating all",
                    self.state.active_workers(),
                    self.state.clock
                );
                self.abort(runtime);
                return Err(SimError::Timeout {
                    wall_secs: self.timeout.as_secs(),
                    clock: self.state.clock,
                });
            }
            if let Err(e) = self.step(runtime) {
                error!("OSS: {}", e);
                self.abort(runtime);
                return Err(e);
            }
        }
        Ok(self.state.stats)
    }

    /// One pass of the dispatch loop
    pub fn step<R: Runtime>(&mut self, runtime: &mut R) -> Result<()> {
        self.tick();
        let drained = self.drain(runtime)?;
        self.flush(runtime)?;
        self.reap(runtime);
        self.tick();
        self.snapshot_if_due();

        if self.scheduler.try_admit(&mut self.state, runtime)?.is_some() {
            debug!("{}", render_process_table(&self.state));
        }
        if drained == 0 {
            std::thread::yield_now();
        }
        Ok(())
    }

    fn tick(&mut self) {
        self.state.tick();
        self.region.publish(self.state.clock);
    }

    /// Handle every queued message; returns how many there were
    fn drain<R: Runtime>(&mut self, runtime: &mut R) -> Result<usize> {
        let mut handled = 0;
        while let Some(message) = runtime.try_receive() {
            handled += 1;
            if !message.is_request() {
                warn!("OSS: ignoring message tagged {} on the request queue", message.correlation);
                continue;
            }
            if message.is_terminate() && self.state.processes.find(message.pid).is_none() {
                // already reaped after it exited
                debug!("OSS: termination notice from PID {} after it was reaped", message.pid);
                continue;
            }

            // a termination notice carries the worker's final access
            let resolution = resolve(&mut self.state, &message)?;
            self.region.publish(self.state.clock);
            if message.is_terminate() {
                self.terminate(message.pid);
                continue;
            }
            if let Resolution::Hit { .. } = resolution {
                self.respond(
                    runtime,
                    Message::grant(message.pid, message.virtual_address, message.access),
                )?;
            }
        }
        Ok(handled)
    }

    /// Answer every page load whose completion time has passed
    fn flush<R: Runtime>(&mut self, runtime: &mut R) -> Result<()> {
        let now = self.state.clock;
        for request in self.state.blocked.take_due(now) {
            complete(&mut self.state, &request);
            info!(
                "OSS: Indicating to {} that {} has happened to address {}",
                request.slot, request.access, request.virtual_address
            );
            self.respond(
                runtime,
                Message::grant(request.pid, request.virtual_address, request.access),
            )?;
        }
        Ok(())
    }

    fn respond<R: Runtime>(&mut self, runtime: &mut R, grant: Message) -> Result<()> {
        runtime.send(grant)?;
        self.state.stats.messages_sent += 1;
        if let Some(slot) = self.state.processes.find(grant.pid) {
            if let Some(process) = self.state.processes.get_mut(slot) {
                process.messages_sent += 1;
            }
        }
        Ok(())
    }

    /// A worker announced its exit
    fn terminate(&mut self, pid: Pid) {
        let Some(slot) = self.state.processes.find(pid) else {
            return;
        };
        if let Some(process) = self.state.release_process(slot) {
            info!(
                "OSS: PID {} is terminating. Releasing all frames. Effective memory access time: {:.7} sec",
                pid,
                process.effective_access_secs()
            );
            self.state.stats.normal_terminations += 1;
        }
    }

    /// Clean up after workers that exited without saying so
    fn reap<R: Runtime>(&mut self, runtime: &mut R) {
        for handle in runtime.reap_exited() {
            if let Some(slot) = self.state.processes.find(handle.pid) {
                info!("OSS: Detected terminated child with PID {}", handle.pid);
                self.state.release_process(slot);
                self.state.stats.normal_terminations += 1;
            }
        }
    }

    fn snapshot_if_due(&mut self) {
        if self.state.clock.since(self.last_snapshot) >= SNAPSHOT_INTERVAL_NANOS {
            info!("{}", render_process_table(&self.state));
            info!("{}", render_frame_table(&self.state));
            self.last_snapshot = self.state.clock;
        }
    }

    /// Forced shutdown: stop every tracked worker, free every frame and
    /// throw away loads still in flight.
    pub fn abort<R: Runtime>(&mut self, runtime: &mut R) {
        let live: Vec<(SlotIndex, Pid)> = self
            .state
            .processes
            .iter()
            .map(|(slot, process)| (slot, process.pid))
            .collect();
        for (slot, pid) in live {
            let handle = WorkerHandle { pid };
            if runtime.is_alive(handle) {
                match runtime.terminate(handle) {
                    Ok(()) => info!("OSS: Successfully killed process {}", pid),
                    Err(e) => error!("OSS: unable to kill process {}: {}", pid, e),
                }
            }
            self.state.release_process(slot);
            self.state.stats.forced_terminations += 1;
        }

        let discarded = self.state.blocked.len();
        self.state.blocked.clear();
        if discarded > 0 {
            warn!("OSS: discarded {} page loads still in flight", discarded);
        }
        info!("OSS: Active children after abort: {}", self.state.active_workers());
    }
}

//! Worker processes and the capability the coordinator uses to manage them.
//!
//! Workers here are OS threads. Each one owns a response channel; all of them
//! share one request channel into the coordinator. Messages cross the
//! channels as fixed-size wire records.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::ClockRegion;
use crate::config::Geometry;
use crate::constants::*;
use crate::error::{Result, SimError};
use crate::message::{AccessKind, Message, Transport};
use crate::process::Pid;

type WireRecord = [i64; 5];

/// How often a blocked worker wakes to check whether it has been stopped
const STOP_POLL: Duration = Duration::from_millis(10);

/// Opaque reference to a spawned worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerHandle {
    pub pid: Pid,
}

/// Process lifecycle as seen by the coordinator
pub trait WorkerSpawner {
    fn spawn(&mut self) -> Result<WorkerHandle>;

    fn is_alive(&self, handle: WorkerHandle) -> bool;

    /// Ask a worker to stop immediately. Best effort.
    fn terminate(&mut self, handle: WorkerHandle) -> Result<()>;

    /// Workers that have exited since the last call
    fn reap_exited(&mut self) -> Vec<WorkerHandle>;
}

/// Everything the dispatcher needs from the outside world
pub trait Runtime: Transport + WorkerSpawner {}

impl<T: Transport + WorkerSpawner> Runtime for T {}

/// Access pattern of a generated worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerProfile {
    pub page_count: usize,
    pub page_size: usize,
    /// Percent of accesses that are reads
    pub read_percent: u32,
    /// Accesses before the first chance to terminate
    pub first_check: RangeInclusive<u32>,
    /// Accesses between later chances
    pub later_check: RangeInclusive<u32>,
    /// Percent chance to terminate at each check
    pub terminate_percent: u32,
}

impl WorkerProfile {
    pub fn for_geometry(geometry: &Geometry) -> Self {
        WorkerProfile {
            page_count: geometry.page_count,
            page_size: geometry.page_size,
            ..Self::default()
        }
    }
}

impl Default for WorkerProfile {
    fn default() -> Self {
        WorkerProfile {
            page_count: PAGE_COUNT,
            page_size: PAGE_SIZE,
            read_percent: 80,
            first_check: 20..=24,
            later_check: 1000..=1200,
            terminate_percent: 20,
        }
    }
}

/// Generates requests for one worker
struct Generator {
    pid: Pid,
    profile: WorkerProfile,
    rng: StdRng,
}

impl Generator {
    fn next_request(&mut self) -> Message {
        let page = self.rng.random_range(0..self.profile.page_count);
        let offset = self.rng.random_range(0..self.profile.page_size);
        let address = (page * self.profile.page_size + offset) as u32;
        let access = if self.rng.random_range(0..100) < self.profile.read_percent {
            AccessKind::Read
        } else {
            AccessKind::Write
        };
        Message::request(self.pid, address, access)
    }

    fn next_threshold(&mut self, first: bool) -> u32 {
        let range = if first {
            self.profile.first_check.clone()
        } else {
            self.profile.later_check.clone()
        };
        self.rng.random_range(range)
    }

    fn decides_to_stop(&mut self) -> bool {
        self.rng.random_range(0..100) < self.profile.terminate_percent
    }
}

fn run_worker(
    mut generator: Generator,
    requests: Sender<WireRecord>,
    responses: Receiver<WireRecord>,
    stop: Arc<AtomicBool>,
    clock: Arc<ClockRegion>,
) {
    let pid = generator.pid;
    let mut accesses = 0;
    let mut threshold = generator.next_threshold(true);

    loop {
        if stop.load(Ordering::Acquire) {
            debug!("Worker {} stopped by coordinator", pid);
            return;
        }

        let request = generator.next_request();
        if requests.send(request.encode()).is_err() {
            return;
        }
        if !await_grant(&responses, &stop) {
            return;
        }

        accesses += 1;
        debug!(
            "Worker {} accessCount: {} / {} at {}",
            pid,
            accesses,
            threshold,
            clock.read()
        );

        if accesses >= threshold {
            if generator.decides_to_stop() {
                debug!("Worker {} deciding to terminate", pid);
                let notice = Message::terminate(pid, request.virtual_address, request.access);
                let _ = requests.send(notice.encode());
                return;
            }
            accesses = 0;
            threshold = generator.next_threshold(false);
        }
    }
}

/// Block until the coordinator answers. False if stopped or disconnected.
fn await_grant(responses: &Receiver<WireRecord>, stop: &AtomicBool) -> bool {
    loop {
        match responses.recv_timeout(STOP_POLL) {
            Ok(_) => return true,
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

struct WorkerThread {
    responses: Sender<WireRecord>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Runs workers as threads and carries their messages over channels
pub struct ThreadRuntime {
    profile: WorkerProfile,
    clock: Arc<ClockRegion>,
    inbox: Receiver<WireRecord>,
    outbox: Sender<WireRecord>,
    workers: HashMap<Pid, WorkerThread>,
    next_pid: u32,
    rng: StdRng,
}

impl ThreadRuntime {
    pub fn new(profile: WorkerProfile, clock: Arc<ClockRegion>, seed: Option<u64>) -> Self {
        let (outbox, inbox) = mpsc::channel();
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        ThreadRuntime {
            profile,
            clock,
            inbox,
            outbox,
            workers: HashMap::new(),
            next_pid: REQUEST_TAG as u32 + 1,
            rng,
        }
    }

    pub fn live_workers(&self) -> usize {
        self.workers.len()
    }
}

impl Transport for ThreadRuntime {
    fn try_receive(&mut self) -> Option<Message> {
        while let Ok(raw) = self.inbox.try_recv() {
            match Message::decode(raw) {
                Ok(message) => return Some(message),
                Err(e) => warn!("OSS: dropping malformed message {:?}: {}", raw, e),
            }
        }
        None
    }

    fn send(&mut self, message: Message) -> Result<()> {
        let pid = u32::try_from(message.correlation)
            .map(Pid)
            .map_err(|_| SimError::Transport(format!("bad response tag {}", message.correlation)))?;
        let worker = self.workers.get(&pid).ok_or(SimError::NoSuchWorker(pid))?;
        if worker.responses.send(message.encode()).is_err() {
            // worker already gone; reaping will clean up after it
            warn!("OSS: response to PID {} dropped, worker has exited", pid);
        }
        Ok(())
    }
}

impl WorkerSpawner for ThreadRuntime {
    fn spawn(&mut self) -> Result<WorkerHandle> {
        let pid = Pid(self.next_pid);
        let (responses, inbox) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let generator = Generator {
            pid,
            profile: self.profile.clone(),
            rng: StdRng::seed_from_u64(self.rng.random()),
        };

        let requests = self.outbox.clone();
        let clock = Arc::clone(&self.clock);
        let worker_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("worker-{}", pid))
            .spawn(move || run_worker(generator, requests, inbox, worker_stop, clock))
            .map_err(|e| SimError::Spawn(e.to_string()))?;

        self.next_pid += 1;
        self.workers.insert(pid, WorkerThread { responses, stop, thread });
        Ok(WorkerHandle { pid })
    }

    fn is_alive(&self, handle: WorkerHandle) -> bool {
        self.workers
            .get(&handle.pid)
            .is_some_and(|worker| !worker.thread.is_finished())
    }

    fn terminate(&mut self, handle: WorkerHandle) -> Result<()> {
        let worker = self.workers.get(&handle.pid).ok_or(SimError::NoSuchWorker(handle.pid))?;
        worker.stop.store(true, Ordering::Release);
        Ok(())
    }

    fn reap_exited(&mut self) -> Vec<WorkerHandle> {
        let exited: Vec<Pid> = self
            .workers
            .iter()
            .filter(|(_, worker)| worker.thread.is_finished())
            .map(|(&pid, _)| pid)
            .collect();

        let mut reaped = Vec::with_capacity(exited.len());
        for pid in exited {
            if let Some(worker) = self.workers.remove(&pid) {
                if worker.thread.join().is_err() {
                    warn!("OSS: worker {} panicked", pid);
                }
                reaped.push(WorkerHandle { pid });
            }
        }
        reaped.sort_by_key(|handle| handle.pid);
        reaped
    }
}

impl Drop for ThreadRuntime {
    fn drop(&mut self) {
        for worker in self.workers.values() {
            worker.stop.store(true, Ordering::Release);
        }
        for (pid, worker) in self.workers.drain() {
            drop(worker.responses);
            if worker.thread.join().is_err() {
                warn!("OSS: worker {} panicked during shutdown", pid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn generator(seed: u64) -> Generator {
        Generator {
            pid: Pid(2),
            profile: WorkerProfile::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[test]
    fn test_generated_addresses_in_range() {
        let mut generator = generator(7);
        for _ in 0..1000 {
            let request = generator.next_request();
            assert!(request.is_request());
            assert!((request.virtual_address as usize) < ADDRESS_SPACE);
            assert_eq!(request.pid, Pid(2));
        }
    }

    #[test]
    fn test_generated_mix_is_mostly_reads() {
        let mut generator = generator(11);
        let reads = (0..10_000)
            .filter(|_| generator.next_request().access == AccessKind::Read)
            .count();
        assert!((7_000..9_000).contains(&reads), "reads = {}", reads);
    }

    #[test]
    fn test_thresholds_within_profile() {
        let mut generator = generator(3);
        for _ in 0..100 {
            assert!((20..=24).contains(&generator.next_threshold(true)));
            assert!((1000..=1200).contains(&generator.next_threshold(false)));
        }
    }

    #[test]
    fn test_same_seed_same_requests() {
        let mut a = generator(42);
        let mut b = generator(42);
        for _ in 0..50 {
            assert_eq!(a.next_request(), b.next_request());
        }
    }

    /// Answer every request until the worker says it is done
    fn serve_until_exit(runtime: &mut ThreadRuntime, pid: Pid) -> u32 {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut served = 0;
        loop {
            assert!(Instant::now() < deadline, "worker never terminated");
            let Some(message) = runtime.try_receive() else {
                thread::yield_now();
                continue;
            };
            assert_eq!(message.pid, pid);
            if message.is_terminate() {
                return served;
            }
            runtime
                .send(Message::grant(pid, message.virtual_address, message.access))
                .unwrap();
            served += 1;
        }
    }

    #[test]
    fn test_thread_worker_runs_to_termination() {
        let profile = WorkerProfile {
            first_check: 3..=3,
            terminate_percent: 100,
            ..WorkerProfile::default()
        };
        let mut runtime = ThreadRuntime::new(profile, Arc::new(ClockRegion::new()), Some(1));
        let handle = runtime.spawn().unwrap();
        assert_eq!(handle.pid, Pid(2));

        assert_eq!(serve_until_exit(&mut runtime, handle.pid), 3);

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut reaped = Vec::new();
        while reaped.is_empty() {
            assert!(Instant::now() < deadline, "worker never exited");
            reaped = runtime.reap_exited();
            thread::yield_now();
        }
        assert_eq!(reaped, vec![handle]);
        assert!(!runtime.is_alive(handle));
        assert_eq!(runtime.live_workers(), 0);
    }

    #[test]
    fn test_terminate_stops_blocked_worker() {
        let mut runtime =
            ThreadRuntime::new(WorkerProfile::default(), Arc::new(ClockRegion::new()), Some(9));
        let handle = runtime.spawn().unwrap();
        runtime.terminate(handle).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while runtime.is_alive(handle) {
            assert!(Instant::now() < deadline, "worker ignored stop");
            thread::sleep(STOP_POLL);
        }
        assert_eq!(runtime.reap_exited(), vec![handle]);
    }

    #[test]
    fn test_send_to_unknown_worker() {
        let mut runtime =
            ThreadRuntime::new(WorkerProfile::default(), Arc::new(ClockRegion::new()), Some(9));
        let err = runtime
            .send(Message::grant(Pid(50), 0, AccessKind::Read))
            .unwrap_err();
        assert!(matches!(err, SimError::NoSuchWorker(Pid(50))));
        assert!(runtime.terminate(WorkerHandle { pid: Pid(50) }).is_err());
    }
}

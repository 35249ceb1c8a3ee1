//! Property-based tests for the paging coordinator.
//!
//! Uses proptest to drive the fault engine, the deferred queue and the launch
//! scheduler through random operation sequences and checks the invariants
//! that must hold after every step.

use proptest::prelude::*;

use vm_paging_sim::blocked::BlockedRequest;
use vm_paging_sim::memory::FrameIndex;
use vm_paging_sim::message::{AccessKind, Message};
use vm_paging_sim::process::{Pid, ProcessSlot, SlotIndex};
use vm_paging_sim::scheduler::LaunchScheduler;
use vm_paging_sim::translation::{complete, resolve, Resolution};
use vm_paging_sim::worker::{WorkerHandle, WorkerSpawner};
use vm_paging_sim::{Geometry, SimClock, SimError, SimulationState, PAGE_SIZE, TICK_NANOS};

const FRAMES: usize = 4;
const PAGES: usize = 8;
const PROCS: usize = 3;

// ============================================================================
// Operation Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Access { proc: usize, page: usize, offset: usize, write: bool },
    Tick,
    Terminate { proc: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..PROCS, 0..PAGES, 0..PAGE_SIZE, any::<bool>())
            .prop_map(|(proc, page, offset, write)| Op::Access { proc, page, offset, write }),
        3 => Just(Op::Tick),
        1 => (0..PROCS).prop_map(|proc| Op::Terminate { proc }),
    ]
}

fn pid_of(proc: usize) -> Pid {
    Pid(2 + proc as u32)
}

fn fresh_state() -> SimulationState {
    let geometry = Geometry {
        frame_count: FRAMES,
        page_count: PAGES,
        page_size: PAGE_SIZE,
    };
    let mut state = SimulationState::new(geometry, PROCS);
    for proc in 0..PROCS {
        state
            .processes
            .occupy(SlotIndex(proc), ProcessSlot::new(pid_of(proc), SimClock::ZERO, PAGES));
    }
    state
}

fn access(proc: usize, page: usize, offset: usize, write: bool) -> Message {
    let kind = if write { AccessKind::Write } else { AccessKind::Read };
    Message::request(pid_of(proc), (page * PAGE_SIZE + offset) as u32, kind)
}

/// Apply one operation the way the dispatcher would. Returns the matured
/// loads so callers can inspect them.
fn apply(state: &mut SimulationState, op: &Op) -> Vec<BlockedRequest> {
    match *op {
        Op::Access { proc, page, offset, write } => {
            if state.processes.find(pid_of(proc)).is_some() {
                resolve(state, &access(proc, page, offset, write)).unwrap();
            }
            Vec::new()
        }
        Op::Tick => {
            state.tick();
            let due = state.blocked.take_due(state.clock);
            for request in &due {
                complete(state, request);
            }
            due
        }
        Op::Terminate { proc } => {
            if let Some(slot) = state.processes.find(pid_of(proc)) {
                state.release_process(slot);
            }
            Vec::new()
        }
    }
}

/// Frame the pool should pick as its LRU victim: oldest reference, lowest index
fn expected_victim(state: &SimulationState) -> FrameIndex {
    let mut best: Option<(FrameIndex, SimClock)> = None;
    for (index, frame) in state.frames.iter() {
        if best.is_none_or(|(_, oldest)| frame.last_reference < oldest) {
            best = Some((index, frame.last_reference));
        }
    }
    best.map(|(index, _)| index).unwrap()
}

// ============================================================================
// Frame / Page Table Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_page_tables_agree_with_frames(ops in prop::collection::vec(op(), 1..120)) {
        let mut state = fresh_state();
        for op in &ops {
            apply(&mut state, op);
            prop_assert_eq!(state.check_consistency(), Ok(()));
            prop_assert!(state.frames.occupied_count() <= FRAMES);
        }
    }

    #[test]
    fn prop_clock_never_goes_backwards(ops in prop::collection::vec(op(), 1..120)) {
        let mut state = fresh_state();
        let mut last = state.clock;
        for op in &ops {
            apply(&mut state, op);
            prop_assert!(state.clock >= last);
            last = state.clock;
        }
    }

    #[test]
    fn prop_eviction_picks_least_recent(ops in prop::collection::vec(op(), 1..80), page in 0..PAGES) {
        let mut state = fresh_state();
        for op in &ops {
            apply(&mut state, op);
        }
        // only a fault against a full pool evicts
        let Some(slot) = state.processes.find(pid_of(0)) else {
            return Ok(());
        };
        let resident = state.processes.get(slot).unwrap().page_table.get(page).is_some();
        if resident || state.frames.occupied_count() < FRAMES {
            return Ok(());
        }

        let victim = expected_victim(&state);
        match resolve(&mut state, &access(0, page, 0, false)).unwrap() {
            Resolution::Fault { frame, evicted, .. } => {
                prop_assert_eq!(frame, victim);
                prop_assert_eq!(evicted.map(|e| e.frame), Some(victim));
            }
            Resolution::Hit { .. } => prop_assert!(false, "expected a fault"),
        }
        prop_assert_eq!(state.check_consistency(), Ok(()));
    }

    #[test]
    fn prop_terminate_frees_everything(ops in prop::collection::vec(op(), 1..120), proc in 0..PROCS) {
        let mut state = fresh_state();
        for op in &ops {
            apply(&mut state, op);
        }
        let pid = pid_of(proc);
        if let Some(slot) = state.processes.find(pid) {
            let others = state.frames.iter()
                .filter(|(_, f)| f.mapping.is_some_and(|m| m.owner != pid))
                .count();
            state.release_process(slot);

            prop_assert!(state.frames.iter().all(|(_, f)| f.mapping.is_none_or(|m| m.owner != pid)));
            prop_assert_eq!(state.frames.occupied_count(), others);
            prop_assert!(state.blocked.iter().all(|r| r.pid != pid));
            prop_assert_eq!(state.processes.find(pid), None);
        }
    }

    #[test]
    fn prop_matured_loads_leave_the_queue(ops in prop::collection::vec(op(), 1..120)) {
        let mut state = fresh_state();
        for op in &ops {
            for request in apply(&mut state, op) {
                prop_assert!(request.completes_at <= state.clock);
            }
            if matches!(op, Op::Tick) {
                prop_assert!(state.blocked.iter().all(|r| r.completes_at > state.clock));
            }
        }
    }
}

// ============================================================================
// Write-back Cost
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_dirty_eviction_costs_more(pages in prop::collection::vec(0..PAGES, FRAMES)) {
        // fill the pool with distinct pages of process 0, then fault once more
        let mut distinct = pages.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assume!(distinct.len() == FRAMES);
        let extra = (0..PAGES).find(|p| !distinct.contains(p)).unwrap();

        let cost = |write: bool| {
            let mut state = fresh_state();
            for &page in &pages {
                resolve(&mut state, &access(0, page, 0, write)).unwrap();
            }
            let before = state.clock;
            resolve(&mut state, &access(1, extra, 0, false)).unwrap();
            state.clock.since(before)
        };

        let clean = cost(false);
        let dirty = cost(true);
        prop_assert_eq!(clean, 14_000_000);
        prop_assert_eq!(dirty, 28_000_000);
        prop_assert!(dirty > clean);
    }
}

// ============================================================================
// Launch Scheduler Properties
// ============================================================================

#[derive(Default)]
struct CountingSpawner {
    next: u32,
}

impl WorkerSpawner for CountingSpawner {
    fn spawn(&mut self) -> vm_paging_sim::Result<WorkerHandle> {
        self.next += 1;
        Ok(WorkerHandle { pid: Pid(1 + self.next) })
    }

    fn is_alive(&self, _handle: WorkerHandle) -> bool {
        true
    }

    fn terminate(&mut self, _handle: WorkerHandle) -> vm_paging_sim::Result<()> {
        Ok(())
    }

    fn reap_exited(&mut self) -> Vec<WorkerHandle> {
        Vec::new()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_admission_stays_within_bounds(
        total in 1u32..30,
        simultaneous in 1u32..10,
        interval_ms in 1u64..600,
        exits in prop::collection::vec(any::<bool>(), 1..200)
    ) {
        let mut scheduler = LaunchScheduler::new(total, simultaneous, interval_ms * 1_000_000);
        let mut state = SimulationState::new(Geometry::default(), 20);
        let mut spawner = CountingSpawner::default();
        let mut last_launch: Option<SimClock> = None;

        for exit in exits {
            state.tick();
            if scheduler.try_admit(&mut state, &mut spawner).unwrap().is_some() {
                if let Some(previous) = last_launch {
                    prop_assert!(state.clock.since(previous) >= interval_ms * 1_000_000);
                }
                last_launch = Some(state.clock);
            }
            prop_assert!(state.active_workers() <= simultaneous as usize);
            prop_assert!(state.stats.launched <= total);

            if exit {
                let oldest = state.processes.iter().map(|(slot, _)| slot).next();
                if let Some(slot) = oldest {
                    state.release_process(slot);
                }
            }
        }
    }
}

#[test]
fn test_unknown_pid_is_rejected() {
    let mut state = fresh_state();
    let request = Message::request(Pid(99), 0, AccessKind::Read);
    assert!(matches!(resolve(&mut state, &request), Err(SimError::UnknownProcess(Pid(99)))));
}

#[test]
fn test_clock_tick_splits_across_workers() {
    let mut state = fresh_state();
    let before = state.clock;
    state.tick();
    assert_eq!(state.clock.since(before), TICK_NANOS / PROCS as u64);
}

use std::collections::HashSet;

use crate::blocked::DeferredQueue;
use crate::clock::SimClock;
use crate::config::Geometry;
use crate::memory::FramePool;
use crate::process::{ProcessSlot, ProcessTable, SlotIndex};

/// Run-wide counters reported in the final summary
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub memory_accesses: u64,
    pub page_faults: u64,
    pub messages_sent: u64,
    pub launched: u32,
    pub normal_terminations: u32,
    pub forced_terminations: u32,
}

/// Everything the coordinator owns. Passed by `&mut` into each operation.
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub geometry: Geometry,
    pub clock: SimClock,
    pub frames: FramePool,
    pub processes: ProcessTable,
    pub blocked: DeferredQueue,
    pub stats: Stats,
}

impl SimulationState {
    pub fn new(geometry: Geometry, table_size: usize) -> Self {
        SimulationState {
            geometry,
            clock: SimClock::ZERO,
            frames: FramePool::new(geometry.frame_count),
            processes: ProcessTable::new(table_size),
            blocked: DeferredQueue::new(),
            stats: Stats::default(),
        }
    }

    #[inline]
    pub fn active_workers(&self) -> usize {
        self.processes.active_count()
    }

    /// One dispatcher tick of the simulated clock
    pub fn tick(&mut self) {
        let active = self.active_workers();
        self.clock.advance(active);
    }

    /// Tear down a process: free its frames, drop its pending loads and
    /// vacate the slot. Returns the final control block.
    pub fn release_process(&mut self, slot: SlotIndex) -> Option<ProcessSlot> {
        let mut process = self.processes.vacate(slot)?;
        self.frames.release_all_for(process.pid, &mut process.page_table);
        self.blocked.discard_for(process.pid);
        Some(process)
    }

    /// Check that page tables and frames agree in both directions and that
    /// no two frames back the same page.
    pub fn check_consistency(&self) -> Result<(), String> {
        for (slot, process) in self.processes.iter() {
            for (page, frame) in process.page_table.mapped() {
                if frame.0 >= self.frames.len() {
                    return Err(format!("{} page {} maps missing frame {}", slot, page, frame));
                }
                if !self.frames.get(frame).backs(process.pid, page) {
                    return Err(format!(
                        "{} page {} maps frame {} which holds {:?}",
                        slot,
                        page,
                        frame,
                        self.frames.get(frame).mapping
                    ));
                }
            }
        }

        let mut seen = HashSet::new();
        for (index, frame) in self.frames.iter() {
            let Some(mapping) = frame.mapping else { continue };
            if !seen.insert(mapping) {
                return Err(format!("frame {} duplicates {:?}", index, mapping));
            }
            let slot = self
                .processes
                .find(mapping.owner)
                .ok_or_else(|| format!("frame {} owned by dead process {}", index, mapping.owner))?;
            let mapped = self.processes.get(slot).and_then(|p| p.page_table.get(mapping.page));
            if mapped != Some(index) {
                return Err(format!(
                    "frame {} holds page {} of {} but the page table says {:?}",
                    index, mapping.page, mapping.owner, mapped
                ));
            }
        }
        Ok(())
    }
}

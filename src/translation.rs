use log::{info, warn};

use crate::blocked::BlockedRequest;
use crate::clock::SimClock;
use crate::config::Geometry;
use crate::constants::*;
use crate::error::{Result, SimError};
use crate::memory::FrameIndex;
use crate::message::Message;
use crate::process::{Pid, SlotIndex};
use crate::state::SimulationState;

/// A virtual address split into page number and offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub va: u32,
    pub page: usize,
    pub offset: usize,
}

impl VirtualAddress {
    pub fn from_raw(va: u32, page_size: usize) -> Self {
        let raw = va as usize;
        VirtualAddress {
            va,
            page: raw / page_size,
            offset: raw % page_size,
        }
    }

    /// Decompose `va`, or `None` if it lies outside the address space
    pub fn decompose(va: u32, geometry: &Geometry) -> Option<Self> {
        if (va as usize) < geometry.address_limit() {
            Some(Self::from_raw(va, geometry.page_size))
        } else {
            None
        }
    }
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VA({}) = (page={}, offset={})", self.va, self.page, self.offset)
    }
}

/// The frame a fault displaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub frame: FrameIndex,
    pub owner: Pid,
    pub page: usize,
    pub dirty: bool,
}

/// Outcome of resolving one access request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Page resident: answer the worker now
    Hit { slot: SlotIndex, frame: FrameIndex },
    /// Page loading: the worker is answered when the load completes
    Fault {
        slot: SlotIndex,
        frame: FrameIndex,
        evicted: Option<Eviction>,
        completes_at: SimClock,
    },
}

/// Resolve an access request against the frame pool.
///
/// On a hit the frame's recency (and dirty bit, for writes) is refreshed and
/// the clock pays the access cost. On a miss the clock pays the fault service
/// time, a frame is chosen (first free, else least recently referenced), a
/// dirty victim pays a write-back, and the new mapping is claimed at once
/// while the load itself is queued to finish `LOAD_NANOS` later.
pub fn resolve(state: &mut SimulationState, request: &Message) -> Result<Resolution> {
    let pid = request.pid;
    let slot = state.processes.find(pid).ok_or(SimError::UnknownProcess(pid))?;
    let va = VirtualAddress::decompose(request.virtual_address, &state.geometry).ok_or(
        SimError::AddressOutOfRange {
            pid,
            address: request.virtual_address,
            limit: state.geometry.address_limit(),
        },
    )?;
    let write = request.access.is_write();

    info!(
        "OSS: {} requesting {} of address {} at time {}",
        slot, request.access, va.va, state.clock
    );

    let resident = state
        .processes
        .get(slot)
        .and_then(|process| process.page_table.get(va.page))
        .filter(|&frame| state.frames.get(frame).backs(pid, va.page));

    if let Some(frame) = resident {
        let now = state.clock;
        state.frames.touch(frame, write, now);
        state.stats.memory_accesses += 1;
        if let Some(process) = state.processes.get_mut(slot) {
            process.memory_accesses += 1;
        }
        state.clock.accrue(ACCESS_NANOS);
        info!(
            "OSS: Address {} in frame {}, giving data to {} at time {}",
            va.va, frame, slot, state.clock
        );
        return Ok(Resolution::Hit { slot, frame });
    }

    info!("OSS: Address {} is not in a frame, pagefault", va.va);
    state.clock.accrue(FAULT_NANOS);
    state.stats.memory_accesses += 1;
    state.stats.page_faults += 1;
    if let Some(process) = state.processes.get_mut(slot) {
        process.page_faults += 1;
    }

    let (frame, evicted) = match state.frames.find_free() {
        Some(frame) => (frame, None),
        None => {
            let frame = state.frames.find_lru_victim().ok_or(SimError::EmptyFramePool)?;
            info!(
                "OSS: Clearing frame {} and swapping in {} page {}",
                frame, slot, va.page
            );
            (frame, evict(state, frame))
        }
    };

    let now = state.clock;
    let completes_at = now.after(LOAD_NANOS);
    state.frames.assign(frame, pid, va.page, write, now);
    if let Some(process) = state.processes.get_mut(slot) {
        process.page_table.map(va.page, frame);
    }
    state.blocked.push(BlockedRequest {
        pid,
        slot,
        page: va.page,
        virtual_address: va.va,
        access: request.access,
        frame,
        completes_at,
    });
    info!(
        "OSS: Queued page load for PID {} into frame {}, will unblock at {}",
        pid, frame, completes_at
    );

    Ok(Resolution::Fault {
        slot,
        frame,
        evicted,
        completes_at,
    })
}

/// Empty `frame` and unmap it from its former owner, paying the write-back
/// if it was dirty
fn evict(state: &mut SimulationState, frame: FrameIndex) -> Option<Eviction> {
    let old = state.frames.release(frame);
    if old.dirty {
        info!(
            "OSS: Dirty bit of frame {} set, adding additional time to the clock",
            frame
        );
        state.clock.accrue(WRITE_BACK_NANOS);
    }

    let mapping = old.mapping?;
    if let Some(owner) = state.processes.find(mapping.owner) {
        if let Some(process) = state.processes.get_mut(owner) {
            process.page_table.unmap(mapping.page);
        }
    }
    Some(Eviction {
        frame,
        owner: mapping.owner,
        page: mapping.page,
        dirty: old.dirty,
    })
}

/// Finish a matured page load. Returns false if the frame was reclaimed by
/// another fault while the load was in flight; the access still completes.
pub fn complete(state: &mut SimulationState, request: &BlockedRequest) -> bool {
    let now = state.clock;
    if state.frames.get(request.frame).backs(request.pid, request.page) {
        state.frames.touch(request.frame, request.access.is_write(), now);
        info!(
            "OSS: Finished page load for PID {} (page {}) into frame {}",
            request.pid, request.page, request.frame
        );
        true
    } else {
        warn!(
            "OSS: Frame {} was reclaimed before PID {} finished loading page {}",
            request.frame, request.pid, request.page
        );
        false
    }
}

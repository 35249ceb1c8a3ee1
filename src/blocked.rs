use crate::clock::SimClock;
use crate::memory::FrameIndex;
use crate::message::AccessKind;
use crate::process::{Pid, SlotIndex};

/// A page load in flight: the worker stays blocked until `completes_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedRequest {
    pub pid: Pid,
    pub slot: SlotIndex,
    pub page: usize,
    pub virtual_address: u32,
    pub access: AccessKind,
    pub frame: FrameIndex,
    pub completes_at: SimClock,
}

/// Pending page loads, kept in insertion order
#[derive(Debug, Default, Clone)]
pub struct DeferredQueue {
    pending: Vec<BlockedRequest>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn push(&mut self, request: BlockedRequest) {
        self.pending.push(request);
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockedRequest> {
        self.pending.iter()
    }

    /// Remove and return every entry due at `now`, in insertion order.
    /// Entries not yet due stay queued, also in order.
    pub fn take_due(&mut self, now: SimClock) -> Vec<BlockedRequest> {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|request| request.completes_at <= now);
        self.pending = waiting;
        due
    }

    /// Drop every load belonging to `pid`; returns how many were dropped
    pub fn discard_for(&mut self, pid: Pid) -> usize {
        let before = self.pending.len();
        self.pending.retain(|request| request.pid != pid);
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

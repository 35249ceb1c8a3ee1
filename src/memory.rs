use std::fmt;

use crate::clock::SimClock;
use crate::constants::*;
use crate::process::{PageTable, Pid};

/// Index of a frame in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameIndex(pub usize);

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which process page a frame currently backs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mapping {
    pub owner: Pid,
    pub page: usize,
}

/// One slot of simulated physical memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    pub mapping: Option<Mapping>,
    pub dirty: bool,
    pub last_reference: SimClock,
}

impl Frame {
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.mapping.is_some()
    }

    /// True if this frame is occupied by exactly `owner`'s `page`
    #[inline]
    pub fn backs(&self, owner: Pid, page: usize) -> bool {
        self.mapping == Some(Mapping { owner, page })
    }
}

/// Fixed pool of physical frames shared by every process
#[derive(Debug, Clone)]
pub struct FramePool {
    frames: Vec<Frame>,
}

impl FramePool {
    /// Create a pool of `size` empty frames
    pub fn new(size: usize) -> Self {
        FramePool {
            frames: vec![Frame::default(); size],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn get(&self, index: FrameIndex) -> &Frame {
        &self.frames[index.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameIndex, &Frame)> {
        self.frames.iter().enumerate().map(|(i, f)| (FrameIndex(i), f))
    }

    pub fn occupied_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_occupied()).count()
    }

    /// First unoccupied frame in index order
    pub fn find_free(&self) -> Option<FrameIndex> {
        self.frames.iter().position(|f| !f.is_occupied()).map(FrameIndex)
    }

    /// Frame with the oldest last reference. Strict comparison keeps the
    /// lowest index on ties. `None` only for an empty pool.
    pub fn find_lru_victim(&self) -> Option<FrameIndex> {
        let mut victim: Option<(FrameIndex, SimClock)> = None;
        for (index, frame) in self.iter() {
            match victim {
                Some((_, oldest)) if frame.last_reference >= oldest => {}
                _ => victim = Some((index, frame.last_reference)),
            }
        }
        victim.map(|(index, _)| index)
    }

    /// Record a hit: refresh recency and mark dirty on a write
    pub fn touch(&mut self, index: FrameIndex, write: bool, now: SimClock) {
        let frame = &mut self.frames[index.0];
        frame.last_reference = now;
        frame.dirty |= write;
    }

    /// Hand `index` to `owner`'s `page`
    pub fn assign(&mut self, index: FrameIndex, owner: Pid, page: usize, dirty: bool, now: SimClock) {
        self.frames[index.0] = Frame {
            mapping: Some(Mapping { owner, page }),
            dirty,
            last_reference: now,
        };
    }

    /// Clear a frame back to empty, returning what it held
    pub fn release(&mut self, index: FrameIndex) -> Frame {
        std::mem::take(&mut self.frames[index.0])
    }

    /// Free every frame mapped by `owner`'s page table and unmap the entries.
    /// Returns how many frames were freed.
    pub fn release_all_for(&mut self, owner: Pid, page_table: &mut PageTable) -> usize {
        let mut freed = 0;
        for page in 0..page_table.len() {
            if let Some(index) = page_table.get(page) {
                if self.get(index).backs(owner, page) {
                    self.release(index);
                    freed += 1;
                }
                page_table.unmap(page);
            }
        }
        freed
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(FRAME_COUNT)
    }
}

use std::fmt;

use crate::clock::SimClock;
use crate::constants::*;
use crate::memory::FrameIndex;

/// Identifier of a worker process. Never equal to the request tag, so a
/// response addressed by pid can't be mistaken for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into the process table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(pub usize);

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Flat per-process page table: page number -> frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTable {
    entries: Vec<Option<FrameIndex>>,
}

impl PageTable {
    /// A table with every page unmapped
    pub fn new(pages: usize) -> Self {
        PageTable {
            entries: vec![None; pages],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, page: usize) -> Option<FrameIndex> {
        self.entries[page]
    }

    pub fn map(&mut self, page: usize, frame: FrameIndex) {
        self.entries[page] = Some(frame);
    }

    pub fn unmap(&mut self, page: usize) {
        self.entries[page] = None;
    }

    /// (page, frame) for every mapped entry
    pub fn mapped(&self) -> impl Iterator<Item = (usize, FrameIndex)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(page, entry)| entry.map(|frame| (page, frame)))
    }
}

/// Process control block for one live worker
#[derive(Debug, Clone)]
pub struct ProcessSlot {
    pub pid: Pid,
    pub start_time: SimClock,
    pub messages_sent: u64,
    pub memory_accesses: u64,
    pub page_faults: u64,
    pub page_table: PageTable,
}

impl ProcessSlot {
    pub fn new(pid: Pid, start_time: SimClock, pages: usize) -> Self {
        ProcessSlot {
            pid,
            start_time,
            messages_sent: 0,
            memory_accesses: 0,
            page_faults: 0,
            page_table: PageTable::new(pages),
        }
    }

    /// Resident-access time this process has accumulated, in seconds
    pub fn effective_access_secs(&self) -> f64 {
        (self.memory_accesses * ACCESS_NANOS) as f64 / NANOS_PER_SECOND as f64
    }
}

/// Fixed-size table of process slots; `None` marks a free slot
#[derive(Debug, Clone)]
pub struct ProcessTable {
    slots: Vec<Option<ProcessSlot>>,
}

impl ProcessTable {
    pub fn new(size: usize) -> Self {
        ProcessTable {
            slots: vec![None; size],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn first_free(&self) -> Option<SlotIndex> {
        self.slots.iter().position(Option::is_none).map(SlotIndex)
    }

    pub fn find(&self, pid: Pid) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|slot| slot.pid == pid))
            .map(SlotIndex)
    }

    #[inline]
    pub fn get(&self, index: SlotIndex) -> Option<&ProcessSlot> {
        self.slots[index.0].as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, index: SlotIndex) -> Option<&mut ProcessSlot> {
        self.slots[index.0].as_mut()
    }

    /// Place `slot` at `index`, which must be free
    pub fn occupy(&mut self, index: SlotIndex, slot: ProcessSlot) {
        debug_assert!(self.slots[index.0].is_none(), "slot {} already occupied", index);
        self.slots[index.0] = Some(slot);
    }

    /// Free the slot, returning the control block that lived there
    pub fn vacate(&mut self, index: SlotIndex) -> Option<ProcessSlot> {
        self.slots[index.0].take()
    }

    /// Every occupied slot in index order
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &ProcessSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|slot| (SlotIndex(i), slot)))
    }

    /// Every slot including free ones, for table dumps
    pub fn entries(&self) -> impl Iterator<Item = (SlotIndex, Option<&ProcessSlot>)> {
        self.slots.iter().enumerate().map(|(i, s)| (SlotIndex(i), s.as_ref()))
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new(MAX_PROCS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_table_starts_unmapped() {
        let table = PageTable::new(PAGE_COUNT);
        assert_eq!(table.len(), PAGE_COUNT);
        assert!((0..PAGE_COUNT).all(|p| table.get(p).is_none()));
        assert_eq!(table.mapped().count(), 0);
    }

    #[test]
    fn test_page_table_map_unmap() {
        let mut table = PageTable::new(4);
        table.map(2, FrameIndex(17));
        table.map(0, FrameIndex(3));
        assert_eq!(table.get(2), Some(FrameIndex(17)));
        assert_eq!(
            table.mapped().collect::<Vec<_>>(),
            vec![(0, FrameIndex(3)), (2, FrameIndex(17))]
        );
        table.unmap(2);
        assert_eq!(table.get(2), None);
    }

    #[test]
    fn test_table_occupy_find_vacate() {
        let mut table = ProcessTable::new(3);
        assert_eq!(table.first_free(), Some(SlotIndex(0)));

        table.occupy(SlotIndex(0), ProcessSlot::new(Pid(10), SimClock::ZERO, 4));
        table.occupy(SlotIndex(1), ProcessSlot::new(Pid(11), SimClock::ZERO, 4));
        assert_eq!(table.active_count(), 2);
        assert_eq!(table.find(Pid(11)), Some(SlotIndex(1)));
        assert_eq!(table.find(Pid(12)), None);
        assert_eq!(table.first_free(), Some(SlotIndex(2)));

        let old = table.vacate(SlotIndex(0)).unwrap();
        assert_eq!(old.pid, Pid(10));
        assert_eq!(table.find(Pid(10)), None);
        // freed slot is reused first
        assert_eq!(table.first_free(), Some(SlotIndex(0)));
    }

    #[test]
    fn test_table_full() {
        let mut table = ProcessTable::new(1);
        table.occupy(SlotIndex(0), ProcessSlot::new(Pid(2), SimClock::ZERO, 1));
        assert_eq!(table.first_free(), None);
    }

    #[test]
    fn test_entries_include_free_slots() {
        let mut table = ProcessTable::new(3);
        table.occupy(SlotIndex(1), ProcessSlot::new(Pid(5), SimClock::ZERO, 1));
        let occupied: Vec<bool> = table.entries().map(|(_, s)| s.is_some()).collect();
        assert_eq!(occupied, vec![false, true, false]);
        assert_eq!(table.iter().count(), 1);
    }

    #[test]
    fn test_effective_access_time() {
        let mut slot = ProcessSlot::new(Pid(2), SimClock::ZERO, 1);
        assert_eq!(slot.effective_access_secs(), 0.0);
        slot.memory_accesses = 10_000_000;
        assert!((slot.effective_access_secs() - 1.0).abs() < 1e-12);
    }
}

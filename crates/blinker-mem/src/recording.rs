//! ---
//! blinker_section: "05-memory-resources"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Allocators and buffer management for configure-time memory."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Allocator wrapper that journals every allocate/free pair.
//!
//! Used by diagnostics builds and tests to check that each configure-time
//! allocation is matched by exactly one release.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::allocator::{MallocAllocator, MemoryBlock, ResourceAllocator};
use crate::MemError;

/// One allocator call as observed by [`RecordingAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationEvent {
    pub id: u32,
    pub size: usize,
    pub addr: usize,
}

#[derive(Debug, Default)]
struct Journal {
    allocations: Vec<AllocationEvent>,
    frees: Vec<AllocationEvent>,
}

/// Delegating allocator that records calls before forwarding them.
pub struct RecordingAllocator {
    inner: Arc<dyn ResourceAllocator>,
    journal: Mutex<Journal>,
}

impl RecordingAllocator {
    pub fn wrap(inner: Arc<dyn ResourceAllocator>) -> Self {
        Self {
            inner,
            journal: Mutex::new(Journal::default()),
        }
    }

    pub fn allocations(&self) -> Vec<AllocationEvent> {
        self.journal.lock().allocations.clone()
    }

    pub fn frees(&self) -> Vec<AllocationEvent> {
        self.journal.lock().frees.clone()
    }

    pub fn freed_bytes(&self) -> usize {
        self.journal.lock().frees.iter().map(|event| event.size).sum()
    }

    /// Bytes allocated and not yet freed.
    pub fn outstanding_bytes(&self) -> usize {
        let journal = self.journal.lock();
        let allocated: usize = journal.allocations.iter().map(|event| event.size).sum();
        let freed: usize = journal.frees.iter().map(|event| event.size).sum();
        allocated.saturating_sub(freed)
    }
}

impl Default for RecordingAllocator {
    fn default() -> Self {
        Self::wrap(Arc::new(MallocAllocator::new()))
    }
}

impl ResourceAllocator for RecordingAllocator {
    fn allocate(&self, id: u32, size: usize) -> Result<MemoryBlock, MemError> {
        let block = self.inner.allocate(id, size)?;
        self.journal.lock().allocations.push(AllocationEvent {
            id,
            size: block.len(),
            addr: block.addr(),
        });
        Ok(block)
    }

    fn free(&self, block: MemoryBlock) {
        self.journal.lock().frees.push(AllocationEvent {
            id: block.id(),
            size: block.len(),
            addr: block.addr(),
        });
        self.inner.free(block);
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::BudgetAllocator;

    #[test]
    fn failed_allocations_are_not_journaled() {
        let recorder = RecordingAllocator::wrap(Arc::new(BudgetAllocator::new(10)));
        assert!(recorder.allocate(1, 11).is_err());
        let block = recorder.allocate(1, 10).unwrap();
        assert_eq!(recorder.allocations().len(), 1);
        assert_eq!(recorder.outstanding_bytes(), 10);
        recorder.free(block);
        assert_eq!(recorder.outstanding_bytes(), 0);
        assert_eq!(recorder.name(), "budget");
    }
}

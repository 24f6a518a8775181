//! ---
//! blinker_section: "05-memory-resources"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Allocators and buffer management for configure-time memory."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::MemError;

/// Block of memory handed out by a [`ResourceAllocator`].
///
/// Blocks are moved back into [`ResourceAllocator::free`], so a block can only
/// be released once.
pub struct MemoryBlock {
    id: u32,
    bytes: Box<[u8]>,
}

impl MemoryBlock {
    fn new(id: u32, bytes: Box<[u8]>) -> Self {
        Self { id, bytes }
    }

    /// Identifier supplied by the requesting component.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Address of the first byte, used to correlate allocate/free pairs in diagnostics.
    pub fn addr(&self) -> usize {
        self.bytes.as_ptr() as usize
    }
}

impl fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("id", &self.id)
            .field("len", &self.bytes.len())
            .field("addr", &format_args!("{:#x}", self.addr()))
            .finish()
    }
}

/// Allocate/free primitive handed to components at configure time.
pub trait ResourceAllocator: Send + Sync {
    /// Return a block of at least `size` bytes or [`MemError::AllocationFailure`].
    fn allocate(&self, id: u32, size: usize) -> Result<MemoryBlock, MemError>;

    /// Release a block previously returned by [`ResourceAllocator::allocate`].
    fn free(&self, block: MemoryBlock);

    /// Human-readable allocator name for logging.
    fn name(&self) -> &'static str;
}

fn zeroed(id: u32, size: usize) -> Result<MemoryBlock, MemError> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(size)
        .map_err(|_| MemError::AllocationFailure { id, size })?;
    bytes.resize(size, 0);
    Ok(MemoryBlock::new(id, bytes.into_boxed_slice()))
}

/// Pass-through heap allocator. Performs no bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct MallocAllocator;

impl MallocAllocator {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceAllocator for MallocAllocator {
    fn allocate(&self, id: u32, size: usize) -> Result<MemoryBlock, MemError> {
        let block = zeroed(id, size)?;
        debug!(allocator = self.name(), id, size, "allocated block");
        Ok(block)
    }

    fn free(&self, block: MemoryBlock) {
        debug!(allocator = self.name(), id = block.id(), size = block.len(), "freed block");
        drop(block);
    }

    fn name(&self) -> &'static str {
        "malloc"
    }
}

/// Heap allocator capped at a fixed number of outstanding bytes.
#[derive(Debug)]
pub struct BudgetAllocator {
    budget: usize,
    outstanding: Mutex<usize>,
}

impl BudgetAllocator {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            outstanding: Mutex::new(0),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes handed out and not yet freed.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock()
    }
}

impl ResourceAllocator for BudgetAllocator {
    fn allocate(&self, id: u32, size: usize) -> Result<MemoryBlock, MemError> {
        let mut outstanding = self.outstanding.lock();
        let remaining = self.budget.saturating_sub(*outstanding);
        if size > remaining {
            warn!(
                allocator = self.name(),
                id,
                size,
                remaining,
                "allocation exceeds budget"
            );
            return Err(MemError::AllocationFailure { id, size });
        }
        let block = zeroed(id, size)?;
        *outstanding += size;
        debug!(allocator = self.name(), id, size, outstanding = *outstanding, "allocated block");
        Ok(block)
    }

    fn free(&self, block: MemoryBlock) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(block.len());
        debug!(
            allocator = self.name(),
            id = block.id(),
            size = block.len(),
            outstanding = *outstanding,
            "freed block"
        );
    }

    fn name(&self) -> &'static str {
        "budget"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malloc_returns_requested_size() {
        let allocator = MallocAllocator::new();
        let mut block = allocator.allocate(7, 128).unwrap();
        assert_eq!(block.id(), 7);
        assert_eq!(block.len(), 128);
        block.as_mut_slice()[0] = 0xAA;
        assert_eq!(block.as_slice()[0], 0xAA);
        allocator.free(block);
    }

    #[test]
    fn malloc_reports_impossible_request() {
        let allocator = MallocAllocator::new();
        let err = allocator.allocate(1, usize::MAX).unwrap_err();
        assert_eq!(
            err,
            MemError::AllocationFailure {
                id: 1,
                size: usize::MAX
            }
        );
    }

    #[test]
    fn budget_allocator_enforces_cap() {
        let allocator = BudgetAllocator::new(1000);
        let first = allocator.allocate(0, 600).unwrap();
        assert_eq!(allocator.outstanding(), 600);

        let err = allocator.allocate(0, 500).unwrap_err();
        assert!(matches!(err, MemError::AllocationFailure { size: 500, .. }));

        allocator.free(first);
        assert_eq!(allocator.outstanding(), 0);
        let second = allocator.allocate(0, 1000).unwrap();
        assert_eq!(second.len(), 1000);
        allocator.free(second);
    }
}

//! ---
//! blinker_section: "05-memory-resources"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Allocators and buffer management for configure-time memory."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::allocator::{MemoryBlock, ResourceAllocator};
use crate::ledger::{AllocatorResource, ResourceKind};
use crate::MemError;

/// Single working buffer owned by a component (e.g. a command sequencer's
/// sequence buffer).
pub struct ScratchBuffer {
    label: String,
    allocator: Arc<dyn ResourceAllocator>,
    block: Mutex<Option<MemoryBlock>>,
}

impl ScratchBuffer {
    pub fn allocate(
        id: u32,
        label: impl Into<String>,
        allocator: Arc<dyn ResourceAllocator>,
        size: usize,
    ) -> Result<Self, MemError> {
        let label = label.into();
        let block = allocator.allocate(id, size)?;
        info!(buffer = %label, id, size, allocator = allocator.name(), "buffer allocated");
        Ok(Self {
            label,
            allocator,
            block: Mutex::new(Some(block)),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Size of the held block; zero once deallocated.
    pub fn len(&self) -> usize {
        self.block.lock().as_ref().map(MemoryBlock::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` against the buffer contents, or `None` after deallocation.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        self.block
            .lock()
            .as_mut()
            .map(|block| f(block.as_mut_slice()))
    }

    pub fn deallocate(&self) -> Result<usize, MemError> {
        let Some(block) = self.block.lock().take() else {
            return Err(MemError::AlreadyReleased(self.label.clone()));
        };
        let size = block.len();
        self.allocator.free(block);
        info!(buffer = %self.label, size, "buffer deallocated");
        Ok(size)
    }
}

impl AllocatorResource for ScratchBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Buffer
    }

    fn release(&self) -> Result<usize, MemError> {
        self.deallocate()
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        if self.block.get_mut().is_some() {
            warn!(buffer = %self.label, "buffer dropped without deallocation");
        }
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("label", &self.label)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingAllocator;

    #[test]
    fn buffer_is_writable_until_deallocated() {
        let allocator = Arc::new(RecordingAllocator::default());
        let buffer = ScratchBuffer::allocate(0x500, "cmdSeq", allocator.clone(), 5 * 1024).unwrap();
        assert_eq!(buffer.len(), 5 * 1024);

        let written = buffer.with_bytes(|bytes| {
            bytes[..4].copy_from_slice(&[1, 2, 3, 4]);
            bytes[3]
        });
        assert_eq!(written, Some(4));

        assert_eq!(buffer.deallocate().unwrap(), 5 * 1024);
        assert!(buffer.with_bytes(|_| ()).is_none());
        assert!(buffer.is_empty());
        assert_eq!(allocator.frees()[0].addr, allocator.allocations()[0].addr);
    }

    #[test]
    fn double_deallocate_is_reported() {
        let allocator = Arc::new(RecordingAllocator::default());
        let buffer = ScratchBuffer::allocate(1, "seq", allocator.clone(), 16).unwrap();
        buffer.deallocate().unwrap();
        assert_eq!(
            buffer.deallocate().unwrap_err(),
            MemError::AlreadyReleased("seq".into())
        );
        assert_eq!(allocator.frees().len(), 1);
    }
}

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
use tracing::{debug, info, warn};

use crate::allocator::{MemoryBlock, ResourceAllocator};
use crate::ledger::{AllocatorResource, ResourceKind};
use crate::MemError;

/// Maximum number of bins a single pool may describe.
pub const MAX_BINS: usize = 10;

/// Fixed `(buffer_size, count)` descriptor for a class of equally-sized buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBin {
    pub buffer_size: usize,
    pub count: usize,
}

impl BufferBin {
    pub const fn new(buffer_size: usize, count: usize) -> Self {
        Self { buffer_size, count }
    }

    /// Bytes required to back every buffer in the bin.
    pub fn total_bytes(&self) -> Option<usize> {
        self.buffer_size.checked_mul(self.count)
    }

    fn is_empty(&self) -> bool {
        self.buffer_size == 0 || self.count == 0
    }
}

/// Buffer bins bound to an allocator.
///
/// Each non-empty bin is backed by exactly one allocation. Bin layout is fixed
/// once [`BufferPool::configure`] returns; memory is handed back by
/// [`BufferPool::cleanup`].
pub struct BufferPool {
    id: u32,
    label: String,
    bins: Vec<BufferBin>,
    allocator: Arc<dyn ResourceAllocator>,
    blocks: Mutex<Option<Vec<MemoryBlock>>>,
}

impl BufferPool {
    /// Allocate backing memory for `bins` from `allocator`.
    ///
    /// Empty bins (zero size or zero count) are kept in the layout but not
    /// allocated. If any allocation fails, blocks already obtained are freed
    /// before the error is returned.
    pub fn configure(
        id: u32,
        label: impl Into<String>,
        allocator: Arc<dyn ResourceAllocator>,
        bins: &[BufferBin],
    ) -> Result<Self, MemError> {
        let label = label.into();
        if bins.len() > MAX_BINS {
            return Err(MemError::TooManyBins {
                max: MAX_BINS,
                got: bins.len(),
            });
        }

        let mut blocks = Vec::with_capacity(bins.len());
        for (index, bin) in bins.iter().enumerate() {
            if bin.is_empty() {
                debug!(pool = %label, index, "skipping empty bin");
                continue;
            }
            let attempt = bin
                .total_bytes()
                .ok_or(MemError::BinOverflow {
                    index,
                    buffer_size: bin.buffer_size,
                    count: bin.count,
                })
                .and_then(|size| allocator.allocate(id, size));
            match attempt {
                Ok(block) => blocks.push(block),
                Err(err) => {
                    for block in blocks.drain(..) {
                        allocator.free(block);
                    }
                    warn!(pool = %label, index, error = %err, "buffer pool configuration failed");
                    return Err(err);
                }
            }
        }

        let total: usize = blocks.iter().map(MemoryBlock::len).sum();
        info!(
            pool = %label,
            id,
            bins = bins.len(),
            bytes = total,
            allocator = allocator.name(),
            "buffer pool configured"
        );

        Ok(Self {
            id,
            label,
            bins: bins.to_vec(),
            allocator,
            blocks: Mutex::new(Some(blocks)),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn bins(&self) -> &[BufferBin] {
        &self.bins
    }

    /// Number of buffers across all bins.
    pub fn buffer_count(&self) -> usize {
        self.bins
            .iter()
            .filter(|bin| !bin.is_empty())
            .map(|bin| bin.count)
            .sum()
    }

    /// Bytes currently held from the allocator; zero after cleanup.
    pub fn held_bytes(&self) -> usize {
        self.blocks
            .lock()
            .as_ref()
            .map(|blocks| blocks.iter().map(MemoryBlock::len).sum())
            .unwrap_or(0)
    }

    pub fn is_released(&self) -> bool {
        self.blocks.lock().is_none()
    }

    /// Return every bin's memory to the allocator and report the bytes released.
    ///
    /// A second call finds nothing to release and reports
    /// [`MemError::AlreadyReleased`].
    pub fn cleanup(&self) -> Result<usize, MemError> {
        let Some(blocks) = self.blocks.lock().take() else {
            return Err(MemError::AlreadyReleased(self.label.clone()));
        };
        let mut released = 0;
        for block in blocks {
            released += block.len();
            self.allocator.free(block);
        }
        info!(pool = %self.label, id = self.id, bytes = released, "buffer pool released");
        Ok(released)
    }
}

impl AllocatorResource for BufferPool {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::BufferPool
    }

    fn release(&self) -> Result<usize, MemError> {
        self.cleanup()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Some(blocks) = self.blocks.get_mut().as_ref() {
            if !blocks.is_empty() {
                warn!(pool = %self.label, blocks = blocks.len(), "buffer pool dropped without cleanup");
            }
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("bins", &self.bins)
            .field("held_bytes", &self.held_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::BudgetAllocator;
    use crate::recording::RecordingAllocator;

    #[test]
    fn single_bin_is_one_allocation_and_one_free() {
        let allocator = Arc::new(RecordingAllocator::default());
        let pool = BufferPool::configure(
            200,
            "fileUplinkBufferManager",
            allocator.clone(),
            &[BufferBin::new(3000, 30)],
        )
        .unwrap();

        let allocations = allocator.allocations();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].id, 200);
        assert_eq!(allocations[0].size, 90_000);
        assert_eq!(pool.held_bytes(), 90_000);
        assert_eq!(pool.buffer_count(), 30);

        assert_eq!(pool.cleanup().unwrap(), 90_000);
        let frees = allocator.frees();
        assert_eq!(frees.len(), 1);
        assert_eq!(frees[0].addr, allocations[0].addr);
        assert_eq!(frees[0].size, 90_000);
        assert!(pool.is_released());
    }

    #[test]
    fn cleanup_releases_sum_of_bins() {
        let allocator = Arc::new(RecordingAllocator::default());
        let bins = [
            BufferBin::new(64, 4),
            BufferBin::new(0, 10),
            BufferBin::new(1024, 2),
            BufferBin::new(16, 0),
        ];
        let pool = BufferPool::configure(1, "pool", allocator.clone(), &bins).unwrap();
        assert_eq!(allocator.allocations().len(), 2);

        let expected: usize = bins.iter().map(|bin| bin.buffer_size * bin.count).sum();
        assert_eq!(pool.cleanup().unwrap(), expected);
        assert_eq!(allocator.freed_bytes(), expected);
    }

    #[test]
    fn second_cleanup_is_reported() {
        let allocator = Arc::new(RecordingAllocator::default());
        let pool =
            BufferPool::configure(1, "pool", allocator.clone(), &[BufferBin::new(8, 8)]).unwrap();
        pool.cleanup().unwrap();
        assert_eq!(
            pool.cleanup().unwrap_err(),
            MemError::AlreadyReleased("pool".into())
        );
        assert_eq!(allocator.frees().len(), 1);
    }

    #[test]
    fn failed_bin_rolls_back_earlier_bins() {
        let allocator = Arc::new(BudgetAllocator::new(1000));
        let err = BufferPool::configure(
            3,
            "pool",
            allocator.clone(),
            &[BufferBin::new(100, 5), BufferBin::new(100, 6)],
        )
        .unwrap_err();
        assert_eq!(err, MemError::AllocationFailure { id: 3, size: 600 });
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn rejects_too_many_bins() {
        let allocator = Arc::new(RecordingAllocator::default());
        let bins = vec![BufferBin::new(1, 1); MAX_BINS + 1];
        let err = BufferPool::configure(0, "pool", allocator.clone(), &bins).unwrap_err();
        assert_eq!(
            err,
            MemError::TooManyBins {
                max: MAX_BINS,
                got: MAX_BINS + 1
            }
        );
        assert!(allocator.allocations().is_empty());
    }

    #[test]
    fn overflowing_bin_is_rejected() {
        let allocator = Arc::new(RecordingAllocator::default());
        let err = BufferPool::configure(0, "pool", allocator, &[BufferBin::new(usize::MAX, 2)])
            .unwrap_err();
        assert!(matches!(err, MemError::BinOverflow { index: 0, .. }));
    }
}

//! ---
//! blinker_section: "05-memory-resources"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Allocators and buffer management for configure-time memory."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Configure-time memory for LedBlinker components.
//!
//! Components receive a [`ResourceAllocator`] while being configured and use
//! it to back buffer pools and scratch buffers. Everything obtained is
//! tracked in a [`ResourceLedger`] and handed back during teardown.

pub mod allocator;
pub mod ledger;
pub mod pool;
pub mod recording;
pub mod scratch;

pub use allocator::{BudgetAllocator, MallocAllocator, MemoryBlock, ResourceAllocator};
pub use ledger::{AllocatorResource, ReleaseFailure, ReleaseSummary, ResourceKind, ResourceLedger};
pub use pool::{BufferBin, BufferPool, MAX_BINS};
pub use recording::{AllocationEvent, RecordingAllocator};
pub use scratch::ScratchBuffer;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemError {
    #[error("allocation of {size} bytes for id {id:#x} failed")]
    AllocationFailure { id: u32, size: usize },
    #[error("bin {index} overflows: {count} buffers of {buffer_size} bytes")]
    BinOverflow {
        index: usize,
        buffer_size: usize,
        count: usize,
    },
    #[error("buffer pool supports at most {max} bins, got {got}")]
    TooManyBins { max: usize, got: usize },
    #[error("resource {0} already released")]
    AlreadyReleased(String),
}

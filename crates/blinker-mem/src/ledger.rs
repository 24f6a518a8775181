//! ---
//! blinker_section: "05-memory-resources"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Allocators and buffer management for configure-time memory."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Acquisition ledger for configure-time memory.
//!
//! Every pool and buffer obtained while configuring components is recorded
//! here so teardown can release them in a fixed order: buffer pools first,
//! then individual buffers, each group newest first.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::MemError;

/// Category used to order releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    BufferPool,
    Buffer,
}

/// Memory-holding resource that can be released exactly once.
pub trait AllocatorResource: Send + Sync {
    fn label(&self) -> &str;
    fn kind(&self) -> ResourceKind;
    /// Return memory to the allocator, reporting the bytes released.
    fn release(&self) -> Result<usize, MemError>;
}

/// Release that did not succeed during [`ResourceLedger::release_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub label: String,
    pub kind: ResourceKind,
    pub error: MemError,
}

/// Outcome of draining the ledger.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseSummary {
    /// Labels in the order they were released.
    pub released: Vec<String>,
    pub bytes: usize,
    pub failures: Vec<ReleaseFailure>,
}

#[derive(Default)]
pub struct ResourceLedger {
    entries: Vec<Arc<dyn AllocatorResource>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, resource: Arc<dyn AllocatorResource>) {
        debug!(label = resource.label(), kind = ?resource.kind(), "resource recorded");
        self.entries.push(resource);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every recorded resource. Failures are collected, never short-circuit.
    pub fn release_all(&mut self) -> ReleaseSummary {
        let entries = std::mem::take(&mut self.entries);
        let mut summary = ReleaseSummary::default();
        for kind in [ResourceKind::BufferPool, ResourceKind::Buffer] {
            for resource in entries.iter().rev().filter(|entry| entry.kind() == kind) {
                match resource.release() {
                    Ok(bytes) => {
                        summary.bytes += bytes;
                        summary.released.push(resource.label().to_owned());
                    }
                    Err(error) => {
                        warn!(label = resource.label(), %error, "resource release failed");
                        summary.failures.push(ReleaseFailure {
                            label: resource.label().to_owned(),
                            kind,
                            error,
                        });
                    }
                }
            }
        }
        summary
    }
}

impl std::fmt::Debug for ResourceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| (entry.label(), entry.kind())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{BufferBin, BufferPool};
    use crate::recording::RecordingAllocator;
    use crate::scratch::ScratchBuffer;

    #[test]
    fn pools_release_before_buffers() {
        let allocator = Arc::new(RecordingAllocator::default());
        let mut ledger = ResourceLedger::new();
        ledger.record(Arc::new(
            ScratchBuffer::allocate(1, "seq", allocator.clone(), 32).unwrap(),
        ));
        ledger.record(Arc::new(
            BufferPool::configure(2, "poolA", allocator.clone(), &[BufferBin::new(10, 3)])
                .unwrap(),
        ));
        ledger.record(Arc::new(
            ScratchBuffer::allocate(3, "scratch", allocator.clone(), 8).unwrap(),
        ));
        ledger.record(Arc::new(
            BufferPool::configure(4, "poolB", allocator.clone(), &[BufferBin::new(4, 4)])
                .unwrap(),
        ));

        let summary = ledger.release_all();
        assert_eq!(summary.released, vec!["poolB", "poolA", "scratch", "seq"]);
        assert_eq!(summary.bytes, 32 + 30 + 8 + 16);
        assert!(summary.failures.is_empty());
        assert!(ledger.is_empty());
        assert_eq!(allocator.outstanding_bytes(), 0);
    }

    #[test]
    fn failures_do_not_stop_release() {
        let allocator = Arc::new(RecordingAllocator::default());
        let pool = Arc::new(
            BufferPool::configure(2, "pool", allocator.clone(), &[BufferBin::new(10, 1)]).unwrap(),
        );
        pool.cleanup().unwrap();

        let mut ledger = ResourceLedger::new();
        ledger.record(Arc::new(
            ScratchBuffer::allocate(1, "seq", allocator.clone(), 4).unwrap(),
        ));
        ledger.record(pool);

        let summary = ledger.release_all();
        assert_eq!(summary.released, vec!["seq"]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].kind, ResourceKind::BufferPool);
        assert_eq!(
            summary.failures[0].error,
            MemError::AlreadyReleased("pool".into())
        );
    }

    #[test]
    fn empty_ledger_releases_nothing() {
        let mut ledger = ResourceLedger::new();
        assert_eq!(ledger.release_all(), ReleaseSummary::default());
    }
}

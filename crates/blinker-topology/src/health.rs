//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::sync::Arc;

/// Health-check thresholds for one pinged component, counted in health cycles
/// without an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingEntry {
    pub name: String,
    pub warn_threshold: u32,
    pub fatal_threshold: u32,
}

impl PingEntry {
    pub fn new(name: impl Into<String>, warn_threshold: u32, fatal_threshold: u32) -> Self {
        Self {
            name: name.into(),
            warn_threshold,
            fatal_threshold,
        }
    }
}

/// Read-only ping table shared between the deployment context and the health component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingTable {
    entries: Arc<[PingEntry]>,
}

impl PingTable {
    pub fn new(entries: Vec<PingEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn entries(&self) -> &[PingEntry] {
        &self.entries
    }

    pub fn shared(&self) -> Arc<[PingEntry]> {
        Arc::clone(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of `name`; health output port indices follow this order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }
}

impl Default for PingTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<PingEntry> for PingTable {
    fn from_iter<I: IntoIterator<Item = PingEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_view_points_at_the_same_entries() {
        let table: PingTable = [PingEntry::new("rateGroup1", 3, 5), PingEntry::new("cmdSeq", 3, 5)]
            .into_iter()
            .collect();
        let view = table.shared();
        assert!(Arc::ptr_eq(&view, &table.shared()));
        assert_eq!(table.position("cmdSeq"), Some(1));
        assert_eq!(table.position("led"), None);
        assert_eq!(view[0].warn_threshold, 3);
    }
}

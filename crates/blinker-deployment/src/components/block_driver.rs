//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

use blinker_topology::{Component, OutputPorts, Pingable, Signal, PING_OUT};
use tracing::trace;

pub const CYCLE_IN: &str = "CycleIn";
pub const CYCLE_OUT: &str = "CycleOut";

/// Entry point of the synthetic clock into the topology. Forwards every tick.
#[derive(Debug, Default)]
pub struct BlockDriver {
    ticks: AtomicU64,
}

impl BlockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Component for BlockDriver {
    fn name(&self) -> &str {
        "blockDrv"
    }

    fn as_pingable(&self) -> Option<&dyn Pingable> {
        Some(self)
    }

    fn receive(&self, port: &str, _index: usize, signal: Signal, out: &OutputPorts) {
        if port != CYCLE_IN {
            return;
        }
        if let Signal::Cycle(tick) = signal {
            self.ticks.fetch_add(1, Ordering::Relaxed);
            trace!(tick, "cycle");
            out.emit(CYCLE_OUT, 0, Signal::Cycle(tick));
        }
    }
}

impl Pingable for BlockDriver {
    fn ping(&self, key: u32, out: &OutputPorts) {
        out.emit(PING_OUT, 0, Signal::Ping(key));
    }
}

//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Health monitor.
//!
//! Every schedule call the monitor pings each entry of the ping table on
//! `PingSend[i]` and expects the key back on `PingReturn[i]`. Entries that
//! have not answered accumulate missed cycles and escalate to a warning and
//! then to a fatal condition at their configured thresholds.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use blinker_topology::{
    Component, ComponentError, ConfigureContext, Configurable, OutputPorts, PingEntry, Signal,
};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::rate_group::SCHED_IN;

pub const PING_SEND: &str = "PingSend";
pub const PING_RETURN: &str = "PingReturn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    Ok,
    Warning,
    Fatal,
}

#[derive(Debug, Default, Clone, Copy)]
struct EntryState {
    awaiting: Option<u32>,
    missed: u32,
}

#[derive(Default)]
struct Monitor {
    entries: Option<Arc<[PingEntry]>>,
    states: Vec<EntryState>,
}

pub struct Health {
    watchdog_code: u32,
    monitor: Mutex<Monitor>,
    next_key: AtomicU32,
    fatal_count: AtomicU64,
    strokes: AtomicU64,
}

impl Health {
    pub fn new(watchdog_code: u32) -> Self {
        Self {
            watchdog_code,
            monitor: Mutex::new(Monitor::default()),
            next_key: AtomicU32::new(0),
            fatal_count: AtomicU64::new(0),
            strokes: AtomicU64::new(0),
        }
    }

    pub fn watchdog_code(&self) -> u32 {
        self.watchdog_code
    }

    /// Number of times an entry crossed its fatal threshold.
    pub fn fatal_count(&self) -> u64 {
        self.fatal_count.load(Ordering::Relaxed)
    }

    pub fn watchdog_strokes(&self) -> u64 {
        self.strokes.load(Ordering::Relaxed)
    }

    pub fn monitored(&self) -> usize {
        self.monitor.lock().states.len()
    }

    /// Current status of the entry named `name`, if it is monitored.
    pub fn status(&self, name: &str) -> Option<PingStatus> {
        let monitor = self.monitor.lock();
        let entries = monitor.entries.as_ref()?;
        let index = entries.iter().position(|entry| entry.name == name)?;
        let entry = &entries[index];
        let missed = monitor.states[index].missed;
        Some(if missed >= entry.fatal_threshold {
            PingStatus::Fatal
        } else if missed >= entry.warn_threshold {
            PingStatus::Warning
        } else {
            PingStatus::Ok
        })
    }

    fn run_cycle(&self, out: &OutputPorts) {
        let mut pings = Vec::new();
        {
            let mut monitor = self.monitor.lock();
            let Monitor { entries, states } = &mut *monitor;
            let Some(entries) = entries.as_ref() else {
                return;
            };
            for (index, (entry, state)) in entries.iter().zip(states.iter_mut()).enumerate() {
                if state.awaiting.is_none() {
                    let key = self.next_key.fetch_add(1, Ordering::Relaxed);
                    state.awaiting = Some(key);
                    pings.push((index, key));
                    continue;
                }
                state.missed = state.missed.saturating_add(1);
                if state.missed == entry.fatal_threshold {
                    self.fatal_count.fetch_add(1, Ordering::Relaxed);
                    error!(entry = %entry.name, missed = state.missed, "ping fatal threshold reached");
                } else if state.missed == entry.warn_threshold {
                    warn!(entry = %entry.name, missed = state.missed, "ping warning threshold reached");
                }
            }
        }

        // Answers can arrive synchronously, so no lock is held while pinging.
        for (index, key) in pings {
            out.emit(PING_SEND, index, Signal::Ping(key));
        }
        self.strokes.fetch_add(1, Ordering::Relaxed);
        trace!(code = self.watchdog_code, "watchdog stroke");
    }

    fn ping_returned(&self, index: usize, key: u32) {
        let mut monitor = self.monitor.lock();
        let Some(state) = monitor.states.get_mut(index) else {
            return;
        };
        if state.awaiting == Some(key) {
            state.awaiting = None;
            state.missed = 0;
        } else {
            debug!(index, key, "stale ping answer ignored");
        }
    }
}

impl Component for Health {
    fn name(&self) -> &str {
        "health"
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }

    fn receive(&self, port: &str, index: usize, signal: Signal, out: &OutputPorts) {
        match (port, signal) {
            (SCHED_IN, Signal::Schedule(_)) => self.run_cycle(out),
            (PING_RETURN, Signal::Ping(key)) => self.ping_returned(index, key),
            _ => {}
        }
    }
}

impl Configurable for Health {
    fn configure(&self, ctx: &mut ConfigureContext<'_>) -> Result<(), ComponentError> {
        let entries = ctx.ping_table().shared();
        let mut monitor = self.monitor.lock();
        monitor.states = vec![EntryState::default(); entries.len()];
        monitor.entries = Some(entries);
        debug!(
            entries = monitor.states.len(),
            code = self.watchdog_code,
            "health configured"
        );
        Ok(())
    }
}

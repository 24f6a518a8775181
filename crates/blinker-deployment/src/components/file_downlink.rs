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
use std::time::Duration;

use blinker_common::FileDownlinkConfig;
use blinker_topology::{
    Component, ComponentError, ConfigureContext, Configurable, OutputPorts, Pingable, Signal,
    PING_OUT,
};
use parking_lot::Mutex;
use tracing::info;

use super::rate_group::SCHED_IN;

/// Timing values the downlink runs with once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownlinkTiming {
    pub timeout: Duration,
    pub cooldown: Duration,
    pub cycle_time: Duration,
    pub file_queue_depth: u32,
}

/// File downlink shell: holds its timing and counts schedule calls.
pub struct FileDownlink {
    settings: FileDownlinkConfig,
    timing: Mutex<Option<DownlinkTiming>>,
    sched_calls: AtomicU64,
}

impl FileDownlink {
    pub fn new(settings: FileDownlinkConfig) -> Self {
        Self {
            settings,
            timing: Mutex::new(None),
            sched_calls: AtomicU64::new(0),
        }
    }

    pub fn timing(&self) -> Option<DownlinkTiming> {
        *self.timing.lock()
    }

    pub fn sched_calls(&self) -> u64 {
        self.sched_calls.load(Ordering::Relaxed)
    }
}

impl Component for FileDownlink {
    fn name(&self) -> &str {
        "fileDownlink"
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }

    fn as_pingable(&self) -> Option<&dyn Pingable> {
        Some(self)
    }

    fn receive(&self, port: &str, _index: usize, signal: Signal, _out: &OutputPorts) {
        if let (SCHED_IN, Signal::Schedule(_)) = (port, signal) {
            self.sched_calls.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Configurable for FileDownlink {
    fn configure(&self, _ctx: &mut ConfigureContext<'_>) -> Result<(), ComponentError> {
        let settings = &self.settings;
        if settings.cycle_time.is_zero() {
            return Err(ComponentError::InvalidParameter {
                name: "file_downlink.cycle_time",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if settings.file_queue_depth == 0 {
            return Err(ComponentError::InvalidParameter {
                name: "file_downlink.file_queue_depth",
                reason: "must be greater than zero".to_owned(),
            });
        }
        let timing = DownlinkTiming {
            timeout: settings.timeout,
            cooldown: settings.cooldown,
            cycle_time: settings.cycle_time,
            file_queue_depth: settings.file_queue_depth,
        };
        info!(
            timeout_ms = timing.timeout.as_millis() as u64,
            cooldown_ms = timing.cooldown.as_millis() as u64,
            cycle_time_ms = timing.cycle_time.as_millis() as u64,
            queue_depth = timing.file_queue_depth,
            "file downlink configured"
        );
        *self.timing.lock() = Some(timing);
        Ok(())
    }
}

impl Pingable for FileDownlink {
    fn ping(&self, key: u32, out: &OutputPorts) {
        out.emit(PING_OUT, 0, Signal::Ping(key));
    }
}

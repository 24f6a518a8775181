//! ---
//! blinker_section: "02-runtime"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Runtime helpers supporting the topology controller."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Synthetic periodic clock for targets without a timer interrupt.
//!
//! The driver sleeps between ticks without a wake-capable wait: [`SyntheticClockDriver::stop`]
//! only prevents the next tick, so a stopped driver may keep sleeping for up
//! to one full interval before [`SyntheticClockDriver::run`] returns.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

/// Name given to the thread started by [`SyntheticClockDriver::spawn`].
pub const CYCLE_THREAD_NAME: &str = "SyntheticCycle";

type TickHandler = Box<dyn Fn() + Send + Sync>;

pub struct SyntheticClockDriver {
    running: Mutex<bool>,
    tick: TickHandler,
}

impl SyntheticClockDriver {
    /// A new driver starts in the running state. Once stopped it cannot be restarted.
    pub fn new<F>(tick: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            running: Mutex::new(true),
            tick: Box::new(tick),
        }
    }

    /// Invoke the tick handler every `interval` on the calling thread until stopped.
    ///
    /// Returns the number of ticks delivered. A driver that is already stopped
    /// returns immediately without ticking.
    pub fn run(&self, interval: Duration) -> u64 {
        info!(interval_ms = interval.as_millis() as u64, "synthetic cycle started");
        let mut ticks = 0u64;
        loop {
            let running = *self.running.lock();
            if !running {
                break;
            }
            (self.tick)();
            ticks += 1;
            thread::sleep(interval);
        }
        info!(ticks, "synthetic cycle exited");
        ticks
    }

    /// Clear the running flag. Never blocks on the loop and may be called repeatedly.
    pub fn stop(&self) {
        let mut running = self.running.lock();
        if *running {
            debug!("synthetic cycle stop requested");
        }
        *running = false;
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    /// Run the driver on a dedicated thread named [`CYCLE_THREAD_NAME`].
    pub fn spawn(
        self: &Arc<Self>,
        interval: Duration,
    ) -> io::Result<thread::JoinHandle<u64>> {
        let driver = Arc::clone(self);
        thread::Builder::new()
            .name(CYCLE_THREAD_NAME.to_owned())
            .spawn(move || driver.run(interval))
    }
}

impl std::fmt::Debug for SyntheticClockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticClockDriver")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

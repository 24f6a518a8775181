//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Rate-group fan-out.
//!
//! [`RateGroupDriver`] divides the base cycle into one schedule per divisor.
//! Each [`ActiveRateGroup`] owns a thread and a bounded queue; it calls its
//! members in port order whenever its schedule fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use blinker_topology::{
    Component, ComponentError, OutputPorts, Pingable, Signal, StartContext, Startable, PING_OUT,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::block_driver::CYCLE_IN;

pub const RATE_GROUP_OUT: &str = "RateGroupOut";
pub const MEMBER_OUT: &str = "RateGroupMemberOut";
pub const SCHED_IN: &str = "SchedIn";

const QUEUE_DEPTH: usize = 10;

pub struct RateGroupDriver {
    divisors: Vec<u32>,
}

impl RateGroupDriver {
    pub fn new(divisors: Vec<u32>) -> Result<Self, ComponentError> {
        if divisors.is_empty() || divisors.contains(&0) {
            return Err(ComponentError::InvalidParameter {
                name: "rate_group_divisors",
                reason: format!("{divisors:?} must be non-empty and non-zero"),
            });
        }
        Ok(Self { divisors })
    }

    pub fn divisors(&self) -> &[u32] {
        &self.divisors
    }
}

impl Component for RateGroupDriver {
    fn name(&self) -> &str {
        "rateGroupDriver"
    }

    fn receive(&self, port: &str, _index: usize, signal: Signal, out: &OutputPorts) {
        let (CYCLE_IN, Signal::Cycle(tick)) = (port, signal) else {
            return;
        };
        for (index, divisor) in self.divisors.iter().enumerate() {
            let divisor = u64::from(*divisor);
            if tick % divisor == 0 {
                let context = u32::try_from(tick / divisor).unwrap_or(u32::MAX);
                out.emit(RATE_GROUP_OUT, index, Signal::Schedule(context));
            }
        }
    }
}

enum RateGroupMsg {
    Cycle(u32),
    Ping(u32),
    Quit,
}

struct GroupState {
    name: String,
    cycles: AtomicU64,
    dropped: AtomicU64,
}

impl GroupState {
    fn run(&self, inbox: Receiver<RateGroupMsg>, ports: OutputPorts) {
        let members = ports.fan_out(MEMBER_OUT);
        info!(rate_group = %self.name, members, "rate group running");
        while let Ok(msg) = inbox.recv() {
            match msg {
                RateGroupMsg::Cycle(context) => {
                    for member in 0..members {
                        ports.emit(MEMBER_OUT, member, Signal::Schedule(context));
                    }
                    self.cycles.fetch_add(1, Ordering::Relaxed);
                }
                RateGroupMsg::Ping(key) => {
                    ports.emit(PING_OUT, 0, Signal::Ping(key));
                }
                RateGroupMsg::Quit => break,
            }
        }
        debug!(
            rate_group = %self.name,
            cycles = self.cycles.load(Ordering::Relaxed),
            "rate group exited"
        );
    }
}

/// Rate group with its own thread. Members are called from that thread.
pub struct ActiveRateGroup {
    state: Arc<GroupState>,
    queue: Mutex<Option<SyncSender<RateGroupMsg>>>,
}

impl ActiveRateGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(GroupState {
                name: name.into(),
                cycles: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            queue: Mutex::new(None),
        }
    }

    /// Schedules that ran to completion.
    pub fn cycles(&self) -> u64 {
        self.state.cycles.load(Ordering::Relaxed)
    }

    /// Messages lost to a full queue.
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, msg: RateGroupMsg) {
        let queue = self.queue.lock();
        let Some(sender) = queue.as_ref() else {
            return;
        };
        match sender.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.state.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(rate_group = %self.state.name, "queue full, message dropped");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Component for ActiveRateGroup {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }

    fn as_pingable(&self) -> Option<&dyn Pingable> {
        Some(self)
    }

    fn receive(&self, port: &str, _index: usize, signal: Signal, _out: &OutputPorts) {
        if let (CYCLE_IN, Signal::Schedule(context)) = (port, signal) {
            self.enqueue(RateGroupMsg::Cycle(context));
        }
    }
}

impl Pingable for ActiveRateGroup {
    fn ping(&self, key: u32, _out: &OutputPorts) {
        self.enqueue(RateGroupMsg::Ping(key));
    }
}

impl Startable for ActiveRateGroup {
    fn start(&self, ctx: &mut StartContext<'_>) -> Result<(), ComponentError> {
        let (sender, inbox) = mpsc::sync_channel(QUEUE_DEPTH);
        let ports = ctx.ports();
        let state = Arc::clone(&self.state);
        *self.queue.lock() = Some(sender);
        ctx.spawn(&self.state.name, None, move || state.run(inbox, ports))
    }

    /// Queue a quit message and drop the sender; the thread drains and exits.
    fn stop(&self) -> Result<(), ComponentError> {
        if let Some(sender) = self.queue.lock().take() {
            let _ = sender.try_send(RateGroupMsg::Quit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_rejects_zero_divisor() {
        assert!(RateGroupDriver::new(vec![1, 0]).is_err());
        assert!(RateGroupDriver::new(Vec::new()).is_err());
        assert_eq!(RateGroupDriver::new(vec![1, 2, 4]).unwrap().divisors(), &[1, 2, 4]);
    }

    #[test]
    fn detached_group_ignores_signals_before_start() {
        let group = ActiveRateGroup::new("rateGroup1");
        group.receive(CYCLE_IN, 0, Signal::Schedule(1), &OutputPorts::detached(0));
        assert_eq!(group.cycles(), 0);
        assert_eq!(group.dropped(), 0);
        assert!(group.stop().is_ok());
    }
}

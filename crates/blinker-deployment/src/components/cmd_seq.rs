//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use blinker_mem::ScratchBuffer;
use blinker_topology::{
    CommandSpec, Component, ComponentError, ConfigureContext, Configurable, OutputPorts, Pingable,
    Signal, PING_OUT,
};
use parking_lot::Mutex;
use tracing::info;

use super::rate_group::SCHED_IN;

pub const CS_LOAD: CommandSpec = CommandSpec::new("CS_LOAD", 0);
pub const CS_CANCEL: CommandSpec = CommandSpec::new("CS_CANCEL", 1);

/// Command sequencer shell. Owns the sequence buffer; running sequences is
/// out of scope, so a loaded sequence is only held until cancelled.
pub struct CommandSequencer {
    buffer_size: usize,
    buffer: Mutex<Option<Arc<ScratchBuffer>>>,
    loaded: AtomicUsize,
    sched_calls: AtomicU64,
}

impl CommandSequencer {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            buffer: Mutex::new(None),
            loaded: AtomicUsize::new(0),
            sched_calls: AtomicU64::new(0),
        }
    }

    /// Capacity of the allocated sequence buffer; zero before configuration.
    pub fn capacity(&self) -> usize {
        self.buffer.lock().as_ref().map_or(0, |buffer| buffer.len())
    }

    pub fn loaded_bytes(&self) -> usize {
        self.loaded.load(Ordering::Relaxed)
    }

    pub fn sched_calls(&self) -> u64 {
        self.sched_calls.load(Ordering::Relaxed)
    }

    fn load(&self, sequence: &[u8]) -> Result<(), ComponentError> {
        let buffer = self.buffer.lock().clone().ok_or(ComponentError::NotConfigured)?;
        let copied = buffer.with_bytes(|bytes| {
            if sequence.len() > bytes.len() {
                return Err(ComponentError::InvalidArgument(format!(
                    "sequence of {} bytes exceeds {} byte buffer",
                    sequence.len(),
                    bytes.len()
                )));
            }
            bytes[..sequence.len()].copy_from_slice(sequence);
            Ok(sequence.len())
        });
        let copied = copied.ok_or(ComponentError::NotConfigured)??;
        self.loaded.store(copied, Ordering::Relaxed);
        info!(bytes = copied, "sequence loaded");
        Ok(())
    }
}

impl Component for CommandSequencer {
    fn name(&self) -> &str {
        "cmdSeq"
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }

    fn as_pingable(&self) -> Option<&dyn Pingable> {
        Some(self)
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![CS_LOAD, CS_CANCEL]
    }

    fn dispatch_command(&self, opcode: u32, args: &[u8]) -> Result<(), ComponentError> {
        match opcode {
            op if op == CS_LOAD.opcode => self.load(args),
            op if op == CS_CANCEL.opcode => {
                self.loaded.store(0, Ordering::Relaxed);
                info!("sequence cancelled");
                Ok(())
            }
            other => Err(ComponentError::UnknownCommand(other)),
        }
    }

    fn receive(&self, port: &str, _index: usize, signal: Signal, _out: &OutputPorts) {
        if let (SCHED_IN, Signal::Schedule(_)) = (port, signal) {
            self.sched_calls.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Configurable for CommandSequencer {
    fn configure(&self, ctx: &mut ConfigureContext<'_>) -> Result<(), ComponentError> {
        let buffer = ctx.allocate_buffer(self.buffer_size)?;
        *self.buffer.lock() = Some(buffer);
        Ok(())
    }
}

impl Pingable for CommandSequencer {
    fn ping(&self, key: u32, out: &OutputPorts) {
        out.emit(PING_OUT, 0, Signal::Ping(key));
    }
}

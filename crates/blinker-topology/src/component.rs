//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Component model.
//!
//! A component is an opaque unit with a name and, once ids are assigned, a
//! numeric id. What the controller may do with it is decided by the
//! capabilities it exposes: [`Configurable`], [`Startable`] and [`Pingable`].
//! Components are shared behind `Arc` and use interior mutability.

use std::sync::Arc;

use blinker_mem::MemError;
use blinker_rt::SpawnError;
use thiserror::Error;

use crate::context::{ConfigureContext, StartContext};
use crate::graph::OutputPorts;

pub type ComponentId = u32;

/// Input port every pingable component accepts health pings on.
pub const PING_IN: &str = "PingIn";
/// Output port a pingable component answers pings on.
pub const PING_OUT: &str = "PingOut";

/// Value carried across a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Synthetic clock tick with its sequence number.
    Cycle(u64),
    /// Rate-group schedule call with the rate-group context.
    Schedule(u32),
    /// Discrete output level, e.g. a GPIO write.
    Level(bool),
    /// Health ping carrying its key.
    Ping(u32),
    Bytes(Arc<[u8]>),
}

/// Command a component accepts. `opcode` is local to the component and is
/// offset by the component id at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub mnemonic: &'static str,
    pub opcode: u32,
}

impl CommandSpec {
    pub const fn new(mnemonic: &'static str, opcode: u32) -> Self {
        Self { mnemonic, opcode }
    }
}

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error(transparent)]
    Allocation(#[from] MemError),
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("component is not configured")]
    NotConfigured,
    #[error("stop failed: {0}")]
    StopFailed(String),
    #[error("unknown command opcode {0:#x}")]
    UnknownCommand(u32),
    #[error("invalid command argument: {0}")]
    InvalidArgument(String),
}

pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        None
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }

    fn as_pingable(&self) -> Option<&dyn Pingable> {
        None
    }

    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Execute a command by its local opcode.
    fn dispatch_command(&self, opcode: u32, _args: &[u8]) -> Result<(), ComponentError> {
        Err(ComponentError::UnknownCommand(opcode))
    }

    /// Handle a signal arriving on input `port[index]`.
    fn receive(&self, _port: &str, _index: usize, _signal: Signal, _out: &OutputPorts) {}
}

pub trait Configurable {
    /// Apply project parameters and acquire configure-time memory.
    fn configure(&self, ctx: &mut ConfigureContext<'_>) -> Result<(), ComponentError>;
}

pub trait Startable {
    /// Begin operation. Threads must be spawned through `ctx` so the
    /// controller can join them at teardown.
    fn start(&self, ctx: &mut StartContext<'_>) -> Result<(), ComponentError>;

    /// Ask the component's threads to exit. Must not block on them.
    fn stop(&self) -> Result<(), ComponentError>;
}

pub trait Pingable {
    /// Answer `key` on [`PING_OUT`], immediately or from the component's own thread.
    fn ping(&self, key: u32, out: &OutputPorts);
}

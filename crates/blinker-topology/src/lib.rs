//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Component registry, port wiring and the lifecycle controller that brings a
//! LedBlinker topology up and tears it down again.

pub mod commands;
pub mod component;
pub mod context;
pub mod controller;
pub mod error;
pub mod graph;
pub mod health;
pub mod phase;
pub mod registry;
pub mod report;

pub use commands::{CommandRegistry, RegisteredCommand};
pub use component::{
    CommandSpec, Component, ComponentError, ComponentId, Configurable, Pingable, Signal,
    Startable, PING_IN, PING_OUT,
};
pub use context::{
    ConfigureContext, DeploymentContext, StartContext, TopologyState, TransportSettings,
    DEFAULT_JOIN_TIMEOUT,
};
pub use controller::{PhaseHandler, PhaseScope, TopologyBuilder, TopologyController};
pub use error::{ConstructionError, TopologyError};
pub use graph::{Connection, ConnectionGraph, OutputPorts, PortAddr, PortSpec, WiredTopology};
pub use health::{PingEntry, PingTable};
pub use phase::{Advance, LifecyclePhase};
pub use registry::{ComponentRegistry, RegisteredComponent, ID_STRIDE};
pub use report::{BringUpReport, Notice, TeardownFailure, TeardownReport};

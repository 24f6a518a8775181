//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use blinker_rt::SpawnError;
use blinker_transport::TransportError;
use thiserror::Error;

use crate::component::ComponentError;
use crate::phase::LifecyclePhase;
use crate::report::TeardownReport;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("phase {requested} cannot follow {}", .current.map_or("nothing", LifecyclePhase::as_str))]
    PhaseOrder {
        current: Option<LifecyclePhase>,
        requested: LifecyclePhase,
    },
    #[error("component {0} declared twice")]
    DuplicateComponent(String),
    #[error("unknown component {0}")]
    UnknownComponent(String),
    #[error("no component id left for {0}")]
    IdSpaceExhausted(String),
    #[error("opcode {opcode:#x} of {component} already registered by {existing}")]
    DuplicateOpcode {
        opcode: u32,
        existing: String,
        component: String,
    },
    #[error("local opcode {opcode:#x} of {component} overflows the opcode space")]
    OpcodeOverflow { component: String, opcode: u32 },
    #[error("unknown command opcode {0:#x}")]
    UnknownCommand(u32),
    #[error("component {component} failed: {source}")]
    Component {
        component: String,
        #[source]
        source: ComponentError,
    },
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("topology has no clock target")]
    NoClockTarget,
    #[error("synthetic clock already started")]
    ClockAlreadyStarted,
    #[error("topology is not running")]
    NotRunning,
    #[error("topology already torn down")]
    AlreadyTornDown,
    #[error("{0}")]
    Hook(String),
}

impl TopologyError {
    pub fn component(component: impl Into<String>, source: ComponentError) -> Self {
        TopologyError::Component {
            component: component.into(),
            source,
        }
    }
}

/// Bring-up failure. The deployment was rolled back through teardown before
/// this was returned.
#[derive(Debug, Error)]
#[error("bring-up failed during {phase}: {cause}")]
pub struct ConstructionError {
    pub phase: LifecyclePhase,
    #[source]
    pub cause: TopologyError,
    pub rollback: TeardownReport,
}

//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! The LedBlinker deployment: its components and the topology that wires
//! them together.

pub mod components;
pub mod topology;

pub use topology::{rate_group_name, Deployment, DeploymentComponents};

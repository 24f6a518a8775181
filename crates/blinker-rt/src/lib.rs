//! ---
//! blinker_section: "02-runtime"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Runtime helpers supporting the topology controller."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
pub mod cycle;
pub mod threads;

pub use cycle::{SyntheticClockDriver, CYCLE_THREAD_NAME};
pub use threads::{JoinFailure, SpawnError, ThreadSet};

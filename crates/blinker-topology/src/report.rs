//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::phase::LifecyclePhase;

/// Informational outcome recorded during bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The auxiliary transport was omitted because the endpoint is incomplete.
    OptionalFeatureSkipped {
        feature: &'static str,
        host: Option<String>,
        port: u16,
    },
    TransportStarted {
        task: String,
        host: String,
        port: u16,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::OptionalFeatureSkipped { feature, host, port } => write!(
                f,
                "{feature} skipped (host {}, port {port})",
                host.as_deref().unwrap_or("unset")
            ),
            Notice::TransportStarted { task, host, port } => {
                write!(f, "transport task {task} started for {host}:{port}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BringUpReport {
    /// Phases executed by this call; phases already reached are not repeated.
    pub phases: Vec<LifecyclePhase>,
    pub components: usize,
    pub connections: usize,
    pub commands: usize,
    pub notices: Vec<Notice>,
}

impl BringUpReport {
    pub fn transport_started(&self) -> bool {
        self.notices
            .iter()
            .any(|notice| matches!(notice, Notice::TransportStarted { .. }))
    }

    pub fn transport_skipped(&self) -> bool {
        self.notices
            .iter()
            .any(|notice| matches!(notice, Notice::OptionalFeatureSkipped { .. }))
    }
}

/// Teardown step that failed. Teardown carries on past every one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeardownFailure {
    #[error("stopping {component} failed: {reason}")]
    StopFailed { component: String, reason: String },
    #[error("thread {thread} did not exit within {timeout:?}")]
    JoinTimeout { thread: String, timeout: Duration },
    #[error("thread {thread} panicked")]
    ThreadPanicked { thread: String },
    #[error("transport receive task: {0}")]
    Transport(String),
    #[error("releasing {resource} failed: {reason}")]
    ReleaseFailed { resource: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub components_stopped: usize,
    pub threads_joined: usize,
    /// Resources in the order they were released.
    pub released: Vec<String>,
    pub bytes_released: usize,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

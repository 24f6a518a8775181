//! ---
//! blinker_section: "03-transport"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Transport implementations for the auxiliary receive task."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Auxiliary transport for the LedBlinker deployment.
//!
//! The topology only drives the receive task's lifecycle: configure the
//! endpoint, start the task, stop it and join it. Framing of the bytes that
//! arrive is left to the installed receive handler.

pub mod tcp;

use std::time::Duration;

use thiserror::Error;

pub use tcp::{ReceiveHandler, TcpClientTransport};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport endpoint not configured")]
    NotConfigured,
    #[error("invalid endpoint {host}:{port}")]
    InvalidEndpoint { host: String, port: u16 },
    #[error("receive task {0} already running")]
    AlreadyRunning(String),
    #[error("transport is not connected")]
    NotConnected,
    #[error("failed to spawn receive task {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("receive task {name} did not exit within {timeout:?}")]
    JoinTimeout { name: String, timeout: Duration },
    #[error("receive task {name} panicked")]
    Panicked { name: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Receive-task lifecycle exposed to the topology controller.
///
/// Implementations use interior mutability so one instance can be shared
/// between the deployment context and the receive thread.
pub trait Transport: Send + Sync {
    /// Set the remote endpoint. Must precede [`Transport::start_receive_task`].
    fn configure(&self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Start the receive thread. `reconnect` keeps retrying the endpoint after
    /// connection loss; `priority` is advisory on hosts without RT scheduling.
    fn start_receive_task(
        &self,
        name: &str,
        reconnect: bool,
        priority: u32,
        stack_size: usize,
    ) -> Result<(), TransportError>;

    /// Ask the receive thread to exit. Never blocks.
    fn stop_receive_task(&self);

    /// Wait up to `timeout` for the receive thread. Succeeds trivially when
    /// no task was started.
    fn join_receive_task(&self, timeout: Duration) -> Result<(), TransportError>;
}

//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use blinker_mem::{BufferBin, BufferPool, ResourceAllocator, ResourceLedger, ScratchBuffer};
use blinker_rt::ThreadSet;
use blinker_transport::Transport;

use crate::component::{ComponentError, ComponentId};
use crate::graph::OutputPorts;
use crate::health::PingTable;

pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// How the auxiliary receive task is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub task_name: String,
    pub reconnect: bool,
    pub priority: u32,
    pub stack_size: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            task_name: "ReceiveTask".to_owned(),
            reconnect: true,
            priority: 100,
            stack_size: 64 * 1024,
        }
    }
}

/// Everything shared by one deployment: built once, passed by reference to
/// the controller for bring-up and teardown.
pub struct DeploymentContext {
    allocator: Arc<dyn ResourceAllocator>,
    transport: Option<Arc<dyn Transport>>,
    transport_settings: TransportSettings,
    ping_table: PingTable,
    join_timeout: Duration,
}

impl DeploymentContext {
    pub fn new(allocator: Arc<dyn ResourceAllocator>) -> Self {
        Self {
            allocator,
            transport: None,
            transport_settings: TransportSettings::default(),
            ping_table: PingTable::empty(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>, settings: TransportSettings) -> Self {
        self.transport = Some(transport);
        self.transport_settings = settings;
        self
    }

    pub fn with_ping_table(mut self, table: PingTable) -> Self {
        self.ping_table = table;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn allocator(&self) -> &Arc<dyn ResourceAllocator> {
        &self.allocator
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub fn transport_settings(&self) -> &TransportSettings {
        &self.transport_settings
    }

    pub fn ping_table(&self) -> &PingTable {
        &self.ping_table
    }

    /// Bound on the whole teardown join: component threads and the
    /// transport receive task draw from the same deadline.
    pub fn join_timeout(&self) -> Duration {
        self.join_timeout
    }
}

impl std::fmt::Debug for DeploymentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentContext")
            .field("allocator", &self.allocator.name())
            .field("transport", &self.transport.is_some())
            .field("transport_settings", &self.transport_settings)
            .field("ping_entries", &self.ping_table.len())
            .field("join_timeout", &self.join_timeout)
            .finish()
    }
}

/// Deployment state handed to bring-up and teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyState {
    pub host: Option<String>,
    pub port: u16,
}

impl TopologyState {
    pub fn new(host: Option<String>, port: u16) -> Self {
        Self { host, port }
    }

    /// Endpoint for the auxiliary transport; `None` unless both a host and a
    /// non-zero port are present.
    pub fn endpoint(&self) -> Option<(&str, u16)> {
        match self.host.as_deref() {
            Some(host) if !host.is_empty() && self.port != 0 => Some((host, self.port)),
            _ => None,
        }
    }
}

/// View handed to [`crate::Configurable::configure`].
///
/// Memory acquired here is recorded and released by the controller during
/// teardown; components keep their handles but must not release them.
pub struct ConfigureContext<'a> {
    component: ComponentId,
    name: &'a str,
    deployment: &'a DeploymentContext,
    ledger: &'a mut ResourceLedger,
}

impl<'a> ConfigureContext<'a> {
    pub(crate) fn new(
        component: ComponentId,
        name: &'a str,
        deployment: &'a DeploymentContext,
        ledger: &'a mut ResourceLedger,
    ) -> Self {
        Self {
            component,
            name,
            deployment,
            ledger,
        }
    }

    pub fn component_id(&self) -> ComponentId {
        self.component
    }

    pub fn component_name(&self) -> &str {
        self.name
    }

    pub fn allocator(&self) -> &Arc<dyn ResourceAllocator> {
        self.deployment.allocator()
    }

    pub fn ping_table(&self) -> &PingTable {
        self.deployment.ping_table()
    }

    /// Allocate a working buffer tagged with this component's id.
    pub fn allocate_buffer(&mut self, size: usize) -> Result<Arc<ScratchBuffer>, ComponentError> {
        let buffer = Arc::new(ScratchBuffer::allocate(
            self.component,
            self.name,
            Arc::clone(self.deployment.allocator()),
            size,
        )?);
        self.ledger.record(buffer.clone());
        Ok(buffer)
    }

    /// Back `bins` with allocator memory under pool id `pool_id`.
    pub fn setup_buffer_pool(
        &mut self,
        pool_id: u32,
        bins: &[BufferBin],
    ) -> Result<Arc<BufferPool>, ComponentError> {
        let pool = Arc::new(BufferPool::configure(
            pool_id,
            self.name,
            Arc::clone(self.deployment.allocator()),
            bins,
        )?);
        self.ledger.record(pool.clone());
        Ok(pool)
    }
}

/// View handed to [`crate::Startable::start`].
pub struct StartContext<'a> {
    name: &'a str,
    ports: OutputPorts,
    threads: &'a mut ThreadSet,
}

impl<'a> StartContext<'a> {
    pub(crate) fn new(name: &'a str, ports: OutputPorts, threads: &'a mut ThreadSet) -> Self {
        Self {
            name,
            ports,
            threads,
        }
    }

    pub fn component_name(&self) -> &str {
        self.name
    }

    /// Output ports for use from the component's own threads.
    pub fn ports(&self) -> OutputPorts {
        self.ports.clone()
    }

    /// Spawn a thread the controller will join at teardown.
    pub fn spawn<F>(
        &mut self,
        thread_name: &str,
        stack_size: Option<usize>,
        body: F,
    ) -> Result<(), ComponentError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.threads.spawn(thread_name, stack_size, body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_requires_host_and_port() {
        let host = Some("10.0.0.5".to_owned());
        assert_eq!(TopologyState::new(host.clone(), 50000).endpoint(), Some(("10.0.0.5", 50000)));
        assert_eq!(TopologyState::new(host, 0).endpoint(), None);
        assert_eq!(TopologyState::new(None, 50000).endpoint(), None);
        assert_eq!(TopologyState::new(None, 0).endpoint(), None);
        assert_eq!(TopologyState::new(Some(String::new()), 50000).endpoint(), None);
    }
}

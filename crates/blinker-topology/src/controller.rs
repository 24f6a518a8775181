//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Ordered bring-up and teardown of a deployment.
//!
//! [`TopologyController::bring_up`] walks the phases Constructed through
//! Started, entering each only when it directly follows the current phase
//! and skipping phases already reached, then optionally starts the
//! auxiliary transport and marks the deployment Running. Any failure rolls
//! the deployment back through [`TopologyController::tear_down`] before the
//! error is returned, so no half-running deployment survives.
//!
//! Teardown never stops at the first failure. It stops the clock, the
//! components and the transport, joins every thread with a bounded wait,
//! releases buffer pools and then buffers, and reports what went wrong.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use blinker_mem::ResourceLedger;
use blinker_rt::{JoinFailure, SyntheticClockDriver, ThreadSet, CYCLE_THREAD_NAME};
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::commands::CommandRegistry;
use crate::component::{Component, ComponentError, ComponentId, Signal};
use crate::context::{ConfigureContext, DeploymentContext, StartContext, TopologyState};
use crate::error::{ConstructionError, TopologyError};
use crate::graph::{ConnectionGraph, PortAddr, PortSpec, WiredComponent, WiredTopology};
use crate::phase::{Advance, LifecyclePhase};
use crate::registry::ComponentRegistry;
use crate::report::{BringUpReport, Notice, TeardownFailure, TeardownReport};

type ComponentFactory =
    Box<dyn FnOnce(&str) -> Result<Arc<dyn Component>, ComponentError> + Send>;

/// Extra work attached to a bring-up phase. Runs after the phase's built-in
/// step and before the phase is recorded as reached.
pub trait PhaseHandler: Send {
    fn run(&mut self, scope: &mut PhaseScope<'_>) -> Result<(), TopologyError>;
}

impl<F> PhaseHandler for F
where
    F: FnMut(&mut PhaseScope<'_>) -> Result<(), TopologyError> + Send,
{
    fn run(&mut self, scope: &mut PhaseScope<'_>) -> Result<(), TopologyError> {
        self(scope)
    }
}

/// What a [`PhaseHandler`] can see of the deployment.
pub struct PhaseScope<'a> {
    phase: LifecyclePhase,
    deployment: &'a DeploymentContext,
    registry: &'a ComponentRegistry,
    topology: Option<&'a Arc<WiredTopology>>,
}

impl<'a> PhaseScope<'a> {
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn deployment(&self) -> &DeploymentContext {
        self.deployment
    }

    pub fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.registry.get(name).map(|entry| Arc::clone(&entry.component))
    }

    pub fn component_id(&self, name: &str) -> Result<ComponentId, TopologyError> {
        self.registry.id_of(name)
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.registry.iter().map(|(name, _)| name).collect()
    }

    pub fn topology(&self) -> Option<&Arc<WiredTopology>> {
        self.topology
    }
}

/// Declarative description of a topology.
pub struct TopologyBuilder {
    name: String,
    base_id: ComponentId,
    factories: Vec<(String, ComponentFactory)>,
    connections: Vec<(PortSpec, PortSpec)>,
    clock_target: Option<PortSpec>,
    hooks: Vec<(LifecyclePhase, Box<dyn PhaseHandler>)>,
}

impl TopologyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_id: 0x0100,
            factories: Vec::new(),
            connections: Vec::new(),
            clock_target: None,
            hooks: Vec::new(),
        }
    }

    pub fn base_id(mut self, base_id: ComponentId) -> Self {
        self.base_id = base_id;
        self
    }

    /// Declare a component built during the Constructed phase.
    pub fn component<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce(&str) -> Result<Arc<dyn Component>, ComponentError> + Send + 'static,
    {
        self.factories.push((name.into(), Box::new(factory)));
        self
    }

    /// Declare an already-built component.
    pub fn instance(self, name: impl Into<String>, component: Arc<dyn Component>) -> Self {
        self.component(name, move |_: &str| Ok(component))
    }

    pub fn connect(mut self, from: PortSpec, to: PortSpec) -> Self {
        self.connections.push((from, to));
        self
    }

    /// Input port that receives [`Signal::Cycle`] from the synthetic clock.
    pub fn clock_target(mut self, target: PortSpec) -> Self {
        self.clock_target = Some(target);
        self
    }

    /// Attach `handler` to a bring-up phase. Handlers for the same phase run
    /// in registration order.
    pub fn on_phase<H>(mut self, phase: LifecyclePhase, handler: H) -> Self
    where
        H: PhaseHandler + 'static,
    {
        self.hooks.push((phase, Box::new(handler)));
        self
    }

    pub fn build(self) -> TopologyController {
        TopologyController {
            name: self.name,
            base_id: self.base_id,
            factories: self.factories,
            connections: self.connections,
            clock_target: self.clock_target,
            hooks: self.hooks,
            phase: None,
            registry: ComponentRegistry::new(),
            topology: None,
            commands: CommandRegistry::new(),
            ledger: ResourceLedger::new(),
            threads: ThreadSet::new(),
            started: Vec::new(),
            clock: None,
            transport_active: false,
        }
    }
}

/// Owns the phase state, every spawned thread and every configure-time
/// resource of one deployment.
pub struct TopologyController {
    name: String,
    base_id: ComponentId,
    factories: Vec<(String, ComponentFactory)>,
    connections: Vec<(PortSpec, PortSpec)>,
    clock_target: Option<PortSpec>,
    hooks: Vec<(LifecyclePhase, Box<dyn PhaseHandler>)>,
    phase: Option<LifecyclePhase>,
    registry: ComponentRegistry,
    topology: Option<Arc<WiredTopology>>,
    commands: CommandRegistry,
    ledger: ResourceLedger,
    threads: ThreadSet,
    started: Vec<String>,
    clock: Option<Arc<SyntheticClockDriver>>,
    transport_active: bool,
}

impl TopologyController {
    pub fn builder(name: impl Into<String>) -> TopologyBuilder {
        TopologyBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current phase; `None` before bring-up.
    pub fn phase(&self) -> Option<LifecyclePhase> {
        self.phase
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn topology(&self) -> Option<Arc<WiredTopology>> {
        self.topology.clone()
    }

    pub fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.registry.get(name).map(|entry| Arc::clone(&entry.component))
    }

    pub fn component_id(&self, name: &str) -> Result<ComponentId, TopologyError> {
        self.registry.id_of(name)
    }

    pub fn thread_names(&self) -> Vec<String> {
        self.threads.names().into_iter().map(str::to_owned).collect()
    }

    pub fn clock_running(&self) -> bool {
        self.clock.as_ref().map_or(false, |clock| clock.is_running())
    }

    pub fn bring_up(
        &mut self,
        ctx: &DeploymentContext,
        state: &TopologyState,
    ) -> Result<BringUpReport, ConstructionError> {
        if let Some(phase) = self.phase.filter(|phase| phase.is_teardown()) {
            return Err(ConstructionError {
                phase,
                cause: TopologyError::AlreadyTornDown,
                rollback: TeardownReport::default(),
            });
        }

        info!(topology = %self.name, allocator = ctx.allocator().name(), "bring-up started");
        let mut report = BringUpReport::default();
        for phase in LifecyclePhase::BRING_UP {
            match LifecyclePhase::check(self.phase, phase) {
                Advance::AlreadyReached => {
                    debug!(topology = %self.name, %phase, "phase already reached");
                    continue;
                }
                Advance::OutOfOrder => {
                    let cause = TopologyError::PhaseOrder {
                        current: self.phase,
                        requested: phase,
                    };
                    return Err(self.abort(ctx, state, phase, cause));
                }
                Advance::Enter => {}
            }

            let outcome = self
                .run_phase(phase, ctx)
                .and_then(|()| self.run_hooks(phase, ctx));
            if let Err(cause) = outcome {
                return Err(self.abort(ctx, state, phase, cause));
            }
            self.phase = Some(phase);
            report.phases.push(phase);
            info!(topology = %self.name, %phase, "phase complete");
        }

        if self.phase == Some(LifecyclePhase::Started) {
            match self.start_transport(ctx, state) {
                Ok(notice) => {
                    info!(topology = %self.name, %notice, "auxiliary transport");
                    report.notices.push(notice);
                }
                Err(cause) => return Err(self.abort(ctx, state, LifecyclePhase::Running, cause)),
            }
            self.phase = Some(LifecyclePhase::Running);
            report.phases.push(LifecyclePhase::Running);
        }

        report.components = self.registry.len();
        report.connections = self.topology.as_ref().map_or(0, |topology| topology.graph().len());
        report.commands = self.commands.len();
        info!(
            topology = %self.name,
            components = report.components,
            connections = report.connections,
            commands = report.commands,
            threads = self.threads.len(),
            "deployment running"
        );
        Ok(report)
    }

    fn abort(
        &mut self,
        ctx: &DeploymentContext,
        state: &TopologyState,
        phase: LifecyclePhase,
        cause: TopologyError,
    ) -> ConstructionError {
        error!(topology = %self.name, %phase, error = %cause, "bring-up failed; rolling back");
        let rollback = self.tear_down(ctx, state);
        ConstructionError {
            phase,
            cause,
            rollback,
        }
    }

    fn run_phase(&mut self, phase: LifecyclePhase, ctx: &DeploymentContext) -> Result<(), TopologyError> {
        match phase {
            LifecyclePhase::Constructed => self.construct(),
            LifecyclePhase::IdsAssigned => self.registry.assign_ids(self.base_id),
            LifecyclePhase::Wired => self.wire(),
            LifecyclePhase::CommandsRegistered => self.register_commands(),
            LifecyclePhase::Configured => self.configure(ctx),
            LifecyclePhase::Started => self.start_components(),
            _ => Err(TopologyError::PhaseOrder {
                current: self.phase,
                requested: phase,
            }),
        }
    }

    fn run_hooks(&mut self, phase: LifecyclePhase, ctx: &DeploymentContext) -> Result<(), TopologyError> {
        let mut scope = PhaseScope {
            phase,
            deployment: ctx,
            registry: &self.registry,
            topology: self.topology.as_ref(),
        };
        for (_, handler) in self.hooks.iter_mut().filter(|(hook_phase, _)| *hook_phase == phase) {
            handler.run(&mut scope)?;
        }
        Ok(())
    }

    fn construct(&mut self) -> Result<(), TopologyError> {
        for (name, factory) in std::mem::take(&mut self.factories) {
            let component = factory(&name).map_err(|source| TopologyError::component(&name, source))?;
            self.registry.insert(&name, component)?;
            debug!(topology = %self.name, component = %name, "component constructed");
        }
        Ok(())
    }

    fn resolve(&self, spec: &PortSpec) -> Result<PortAddr, TopologyError> {
        Ok(PortAddr {
            component: self.registry.id_of(&spec.component)?,
            port: spec.port.clone(),
            index: spec.index,
        })
    }

    fn wire(&mut self) -> Result<(), TopologyError> {
        let mut graph = ConnectionGraph::new();
        for (from, to) in &self.connections {
            graph.connect(self.resolve(from)?, self.resolve(to)?);
        }
        if let Some(target) = &self.clock_target {
            self.resolve(target)?;
        }

        let mut components = IndexMap::with_capacity(self.registry.len());
        for (name, entry) in self.registry.iter() {
            let id = self.registry.id_of(name)?;
            components.insert(
                id,
                WiredComponent {
                    name: name.to_owned(),
                    component: Arc::clone(&entry.component),
                },
            );
        }
        debug!(topology = %self.name, connections = graph.len(), "connection graph frozen");
        self.topology = Some(Arc::new(WiredTopology::new(components, graph)));
        Ok(())
    }

    fn register_commands(&mut self) -> Result<(), TopologyError> {
        for (name, entry) in self.registry.iter() {
            let Some(id) = entry.id else {
                return Err(TopologyError::UnknownComponent(name.to_owned()));
            };
            self.commands.register(id, name, &entry.component.commands())?;
        }
        Ok(())
    }

    fn configure(&mut self, ctx: &DeploymentContext) -> Result<(), TopologyError> {
        for (name, entry) in self.registry.iter() {
            let Some(configurable) = entry.component.as_configurable() else {
                continue;
            };
            let Some(id) = entry.id else {
                return Err(TopologyError::UnknownComponent(name.to_owned()));
            };
            let mut configure_ctx = ConfigureContext::new(id, name, ctx, &mut self.ledger);
            configurable
                .configure(&mut configure_ctx)
                .map_err(|source| TopologyError::component(name, source))?;
            debug!(topology = %self.name, component = %name, "component configured");
        }
        Ok(())
    }

    fn start_components(&mut self) -> Result<(), TopologyError> {
        let topology = self.topology.clone().ok_or(TopologyError::PhaseOrder {
            current: self.phase,
            requested: LifecyclePhase::Started,
        })?;
        for (name, entry) in self.registry.iter() {
            let Some(startable) = entry.component.as_startable() else {
                continue;
            };
            let Some(id) = entry.id else {
                return Err(TopologyError::UnknownComponent(name.to_owned()));
            };
            let mut start_ctx = StartContext::new(name, topology.ports(id), &mut self.threads);
            startable
                .start(&mut start_ctx)
                .map_err(|source| TopologyError::component(name, source))?;
            self.started.push(name.to_owned());
            debug!(topology = %self.name, component = %name, "component started");
        }
        Ok(())
    }

    fn start_transport(
        &mut self,
        ctx: &DeploymentContext,
        state: &TopologyState,
    ) -> Result<Notice, TopologyError> {
        let skipped = || Notice::OptionalFeatureSkipped {
            feature: "transport",
            host: state.host.clone(),
            port: state.port,
        };
        let Some((host, port)) = state.endpoint() else {
            return Ok(skipped());
        };
        let Some(transport) = ctx.transport() else {
            warn!(topology = %self.name, host, port, "endpoint given but deployment has no transport");
            return Ok(skipped());
        };

        let settings = ctx.transport_settings();
        transport.configure(host, port)?;
        transport.start_receive_task(
            &settings.task_name,
            settings.reconnect,
            settings.priority,
            settings.stack_size,
        )?;
        self.transport_active = true;
        Ok(Notice::TransportStarted {
            task: settings.task_name.clone(),
            host: host.to_owned(),
            port,
        })
    }

    /// Start the synthetic clock feeding the topology's clock target.
    pub fn start_clock(&mut self, interval: Duration) -> Result<(), TopologyError> {
        if self.phase != Some(LifecyclePhase::Running) {
            return Err(TopologyError::NotRunning);
        }
        if self.clock.is_some() {
            return Err(TopologyError::ClockAlreadyStarted);
        }
        let target = self.clock_target.as_ref().ok_or(TopologyError::NoClockTarget)?;
        let target = self.resolve(target)?;
        let topology = self.topology.as_ref().ok_or(TopologyError::NotRunning)?;

        let weak = Arc::downgrade(topology);
        let sequence = AtomicU64::new(0);
        let driver = Arc::new(SyntheticClockDriver::new(move || {
            let tick = sequence.fetch_add(1, Ordering::Relaxed);
            if let Some(topology) = weak.upgrade() {
                topology.deliver(&target, Signal::Cycle(tick));
            }
        }));
        let runner = Arc::clone(&driver);
        self.threads.spawn(CYCLE_THREAD_NAME, None, move || {
            runner.run(interval);
        })?;
        info!(topology = %self.name, interval_ms = interval.as_millis() as u64, "synthetic clock started");
        self.clock = Some(driver);
        Ok(())
    }

    /// Execute a command by its global opcode.
    pub fn dispatch_command(&self, opcode: u32, args: &[u8]) -> Result<(), TopologyError> {
        let command = self
            .commands
            .lookup(opcode)
            .ok_or(TopologyError::UnknownCommand(opcode))?;
        let topology = self.topology.as_ref().ok_or(TopologyError::NotRunning)?;
        let component = topology
            .component(command.component)
            .ok_or_else(|| TopologyError::UnknownComponent(command.component_name.clone()))?;
        info!(component = %command.component_name, mnemonic = command.spec.mnemonic, opcode, "dispatching command");
        component
            .dispatch_command(command.spec.opcode, args)
            .map_err(|source| TopologyError::component(&command.component_name, source))
    }

    /// Stop everything, join every thread and release every resource.
    ///
    /// Safe to call from any phase; a second call finds nothing to do.
    pub fn tear_down(&mut self, ctx: &DeploymentContext, state: &TopologyState) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.phase == Some(LifecyclePhase::Deallocated) {
            debug!(topology = %self.name, "teardown already complete");
            return report;
        }
        info!(topology = %self.name, from = ?self.phase, host = ?state.host, port = state.port, "teardown started");
        self.phase = Some(LifecyclePhase::Stopping);

        if let Some(clock) = &self.clock {
            clock.stop();
        }

        let started = std::mem::take(&mut self.started);
        for name in started.iter().rev() {
            let Some(startable) = self
                .registry
                .get(name)
                .and_then(|entry| entry.component.as_startable())
            else {
                continue;
            };
            match startable.stop() {
                Ok(()) => report.components_stopped += 1,
                Err(err) => {
                    warn!(topology = %self.name, component = %name, error = %err, "component stop failed");
                    report.failures.push(TeardownFailure::StopFailed {
                        component: name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let transport = ctx.transport().filter(|_| self.transport_active);
        if let Some(transport) = transport {
            transport.stop_receive_task();
        }
        self.phase = Some(LifecyclePhase::Stopped);

        // Component threads and the receive task share one join deadline.
        let deadline = Instant::now() + ctx.join_timeout();
        let spawned = self.threads.len();
        let mut timed_out = 0;
        for failure in self.threads.join_all(ctx.join_timeout()) {
            report.failures.push(match failure {
                JoinFailure::Timeout { name, timeout } => {
                    timed_out += 1;
                    TeardownFailure::JoinTimeout {
                        thread: name,
                        timeout,
                    }
                }
                JoinFailure::Panicked { name } => TeardownFailure::ThreadPanicked { thread: name },
            });
        }
        report.threads_joined = spawned - timed_out;

        if let Some(transport) = transport {
            match transport.join_receive_task(deadline.saturating_duration_since(Instant::now())) {
                Ok(()) => report.threads_joined += 1,
                Err(err) => {
                    warn!(topology = %self.name, error = %err, "transport receive task did not join");
                    report.failures.push(TeardownFailure::Transport(err.to_string()));
                }
            }
        }
        self.transport_active = false;

        let summary = self.ledger.release_all();
        report.bytes_released = summary.bytes;
        report.released = summary.released;
        report
            .failures
            .extend(summary.failures.into_iter().map(|failure| TeardownFailure::ReleaseFailed {
                resource: failure.label,
                reason: failure.error.to_string(),
            }));

        self.clock = None;
        self.topology = None;
        self.commands.clear();
        self.registry.clear();
        self.phase = Some(LifecyclePhase::Deallocated);

        if report.is_clean() {
            info!(
                topology = %self.name,
                threads = report.threads_joined,
                bytes = report.bytes_released,
                "teardown complete"
            );
        } else {
            warn!(
                topology = %self.name,
                failures = report.failures.len(),
                threads = report.threads_joined,
                bytes = report.bytes_released,
                "teardown completed with failures"
            );
        }
        report
    }
}

impl Drop for TopologyController {
    fn drop(&mut self) {
        if let Some(phase) = self.phase.filter(|phase| *phase != LifecyclePhase::Deallocated) {
            warn!(topology = %self.name, %phase, "controller dropped without teardown");
        }
    }
}

impl std::fmt::Debug for TopologyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyController")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("registry", &self.registry)
            .field("threads", &self.threads.len())
            .field("resources", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

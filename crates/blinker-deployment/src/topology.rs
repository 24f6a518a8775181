//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Assembly of the LedBlinker topology from an [`AppConfig`].
//!
//! The synthetic clock drives `blockDrv`, which feeds `rateGroupDriver`. Each
//! configured divisor gets an active rate group; the LED and the command
//! sequencer run on the first, the file downlink on the second and the
//! health monitor on the third (or the last one when fewer are configured).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use blinker_common::AppConfig;
use blinker_mem::{BudgetAllocator, MallocAllocator, ResourceAllocator};
use blinker_topology::{
    BringUpReport, Component, ConstructionError, DeploymentContext, LifecyclePhase, PhaseScope,
    PingEntry, PingTable, PortSpec, TeardownReport, TopologyController, TopologyError,
    TopologyState, TransportSettings, PING_IN, PING_OUT,
};
use blinker_transport::TcpClientTransport;
use tracing::{debug, info};

use crate::components::{
    ActiveRateGroup, BlockDriver, BufferManager, CommandSequencer, FileDownlink, GpioDriver,
    Health, Led, ParameterDb, RateGroupDriver, CYCLE_IN, CYCLE_OUT, GPIO_SET, GPIO_WRITE,
    MEMBER_OUT, PING_RETURN, PING_SEND, RATE_GROUP_OUT, SCHED_IN,
};

pub const BLOCK_DRIVER: &str = "blockDrv";
pub const RATE_GROUP_DRIVER: &str = "rateGroupDriver";
pub const CMD_SEQ: &str = "cmdSeq";
pub const FILE_DOWNLINK: &str = "fileDownlink";
pub const BUFFER_MANAGER: &str = "fileUplinkBufferManager";
pub const PRM_DB: &str = "prmDb";
pub const HEALTH: &str = "health";
pub const GPIO_DRIVER: &str = "gpioDriver";
pub const LED: &str = "led";

pub fn rate_group_name(index: usize) -> String {
    format!("rateGroup{}", index + 1)
}

/// Typed handles on the components of an assembled deployment.
pub struct DeploymentComponents {
    pub block_driver: Arc<BlockDriver>,
    pub rate_groups: Vec<Arc<ActiveRateGroup>>,
    pub cmd_seq: Arc<CommandSequencer>,
    pub file_downlink: Arc<FileDownlink>,
    pub buffer_manager: Arc<BufferManager>,
    pub prm_db: Arc<ParameterDb>,
    pub health: Arc<Health>,
    pub gpio: Arc<GpioDriver>,
    pub led: Arc<Led>,
}

pub struct Deployment {
    controller: TopologyController,
    context: DeploymentContext,
    state: TopologyState,
    components: DeploymentComponents,
    transport: Arc<TcpClientTransport>,
    cycle_interval: Duration,
}

/// Pinged components, in health port order.
fn ping_table(config: &AppConfig) -> PingTable {
    let settings = &config.components;
    let warn = settings.ping_warn_threshold;
    let fatal = settings.ping_fatal_threshold;
    [BLOCK_DRIVER, CMD_SEQ, FILE_DOWNLINK, PRM_DB]
        .into_iter()
        .map(str::to_owned)
        .chain((0..settings.rate_group_divisors.len()).map(rate_group_name))
        .map(|name| PingEntry::new(name, warn, fatal))
        .collect()
}

fn allocator(config: &AppConfig) -> Arc<dyn ResourceAllocator> {
    match config.memory.budget {
        Some(budget) => {
            info!(budget, "using budgeted allocator");
            Arc::new(BudgetAllocator::new(budget))
        }
        None => Arc::new(MallocAllocator::new()),
    }
}

impl Deployment {
    /// Build the controller, context and transport for `config`. Nothing runs
    /// until [`Deployment::bring_up`].
    pub fn assemble(config: &AppConfig) -> Result<Self> {
        config.validate().context("invalid deployment configuration")?;
        let settings = &config.components;
        let group_count = settings.rate_group_divisors.len();

        let components = DeploymentComponents {
            block_driver: Arc::new(BlockDriver::new()),
            rate_groups: (0..group_count)
                .map(|index| Arc::new(ActiveRateGroup::new(rate_group_name(index))))
                .collect(),
            cmd_seq: Arc::new(CommandSequencer::new(settings.cmd_seq_buffer_size)),
            file_downlink: Arc::new(FileDownlink::new(settings.file_downlink.clone())),
            buffer_manager: Arc::new(BufferManager::new(&settings.uplink_buffers)),
            prm_db: Arc::new(ParameterDb::new(&settings.prm_db_path)),
            health: Arc::new(Health::new(settings.health_watchdog_code)),
            gpio: Arc::new(GpioDriver::new(&settings.gpio_root, settings.led_pin)),
            led: Arc::new(Led::new(settings.led_blink_on_start)),
        };

        let table = ping_table(config);
        let divisors = settings.rate_group_divisors.clone();
        let mut builder = TopologyController::builder(&config.deployment.name)
            .base_id(config.deployment.base_id)
            .instance(BLOCK_DRIVER, components.block_driver.clone() as Arc<dyn Component>)
            .component(RATE_GROUP_DRIVER, move |_: &str| {
                Ok(Arc::new(RateGroupDriver::new(divisors)?) as Arc<dyn Component>)
            });
        for group in &components.rate_groups {
            builder = builder.instance(group.name(), group.clone() as Arc<dyn Component>);
        }
        builder = builder
            .instance(CMD_SEQ, components.cmd_seq.clone() as Arc<dyn Component>)
            .instance(FILE_DOWNLINK, components.file_downlink.clone() as Arc<dyn Component>)
            .instance(BUFFER_MANAGER, components.buffer_manager.clone() as Arc<dyn Component>)
            .instance(PRM_DB, components.prm_db.clone() as Arc<dyn Component>)
            .instance(HEALTH, components.health.clone() as Arc<dyn Component>)
            .instance(GPIO_DRIVER, components.gpio.clone() as Arc<dyn Component>)
            .instance(LED, components.led.clone() as Arc<dyn Component>)
            .clock_target(PortSpec::new(BLOCK_DRIVER, CYCLE_IN, 0))
            .connect(
                PortSpec::new(BLOCK_DRIVER, CYCLE_OUT, 0),
                PortSpec::new(RATE_GROUP_DRIVER, CYCLE_IN, 0),
            );

        for index in 0..group_count {
            builder = builder.connect(
                PortSpec::new(RATE_GROUP_DRIVER, RATE_GROUP_OUT, index),
                PortSpec::new(rate_group_name(index), CYCLE_IN, 0),
            );
        }

        let mut members = vec![0usize; group_count];
        let placement = [
            (LED, 0),
            (CMD_SEQ, 0),
            (FILE_DOWNLINK, (group_count - 1).min(1)),
            (HEALTH, (group_count - 1).min(2)),
        ];
        for (member, group) in placement {
            builder = builder.connect(
                PortSpec::new(rate_group_name(group), MEMBER_OUT, members[group]),
                PortSpec::new(member, SCHED_IN, 0),
            );
            members[group] += 1;
        }

        builder = builder.connect(
            PortSpec::new(LED, GPIO_SET, 0),
            PortSpec::new(GPIO_DRIVER, GPIO_WRITE, 0),
        );

        for (index, entry) in table.entries().iter().enumerate() {
            builder = builder
                .connect(
                    PortSpec::new(HEALTH, PING_SEND, index),
                    PortSpec::new(entry.name.as_str(), PING_IN, 0),
                )
                .connect(
                    PortSpec::new(entry.name.as_str(), PING_OUT, 0),
                    PortSpec::new(HEALTH, PING_RETURN, index),
                );
        }

        // Every pinged component must answer pings.
        builder = builder.on_phase(
            LifecyclePhase::Wired,
            |scope: &mut PhaseScope<'_>| -> Result<(), TopologyError> {
                for entry in scope.deployment().ping_table().entries() {
                    let component = scope
                        .component(&entry.name)
                        .ok_or_else(|| TopologyError::UnknownComponent(entry.name.clone()))?;
                    if component.as_pingable().is_none() {
                        return Err(TopologyError::Hook(format!(
                            "{} is in the ping table but does not answer pings",
                            entry.name
                        )));
                    }
                }
                Ok(())
            },
        );

        let transport = Arc::new(TcpClientTransport::new(Arc::new(|bytes: &[u8]| {
            debug!(bytes = bytes.len(), "uplink bytes received");
        })));
        let comm = &config.comm;
        let context = DeploymentContext::new(allocator(config))
            .with_transport(
                transport.clone(),
                TransportSettings {
                    task_name: comm.task_name.clone(),
                    reconnect: comm.reconnect,
                    priority: u32::from(comm.priority),
                    stack_size: comm.stack_size,
                },
            )
            .with_ping_table(table)
            .with_join_timeout(config.cycle.join_timeout);

        Ok(Self {
            controller: builder.build(),
            context,
            state: TopologyState::new(comm.host.clone(), comm.port),
            components,
            transport,
            cycle_interval: config.cycle.interval,
        })
    }

    pub fn bring_up(&mut self) -> Result<BringUpReport, ConstructionError> {
        self.controller.bring_up(&self.context, &self.state)
    }

    /// Start the synthetic clock at the configured interval.
    pub fn start_clock(&mut self) -> Result<(), TopologyError> {
        self.start_clock_with(self.cycle_interval)
    }

    pub fn start_clock_with(&mut self, interval: Duration) -> Result<(), TopologyError> {
        self.controller.start_clock(interval)
    }

    pub fn tear_down(&mut self) -> TeardownReport {
        self.controller.tear_down(&self.context, &self.state)
    }

    pub fn controller(&self) -> &TopologyController {
        &self.controller
    }

    pub fn context(&self) -> &DeploymentContext {
        &self.context
    }

    pub fn state(&self) -> &TopologyState {
        &self.state
    }

    pub fn components(&self) -> &DeploymentComponents {
        &self.components
    }

    pub fn transport(&self) -> &Arc<TcpClientTransport> {
        &self.transport
    }

    pub fn cycle_interval(&self) -> Duration {
        self.cycle_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_table_covers_every_pingable_component() {
        let mut config = AppConfig::default();
        config.components.rate_group_divisors = vec![1, 10];
        let table = ping_table(&config);
        let names: Vec<_> = table.entries().iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(
            names,
            ["blockDrv", "cmdSeq", "fileDownlink", "prmDb", "rateGroup1", "rateGroup2"]
        );
        assert_eq!(table.entries()[0].warn_threshold, 3);
        assert_eq!(table.entries()[0].fatal_threshold, 5);
    }

    #[test]
    fn assembly_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.components.rate_group_divisors = Vec::new();
        assert!(Deployment::assemble(&config).is_err());
    }
}

//! ---
//! blinker_section: "01-core-functionality"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Shared configuration and logging primitives."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Maximum number of bins a buffer manager accepts.
pub const MAX_BUFFER_BINS: usize = 10;

fn default_deployment_name() -> String {
    "LedBlinker".to_owned()
}

fn default_base_id() -> u32 {
    0x0100
}

fn default_comm_priority() -> u8 {
    100
}

fn default_stack_size() -> usize {
    64 * 1024
}

fn default_receive_task_name() -> String {
    "ReceiveTask".to_owned()
}

fn default_reconnect() -> bool {
    true
}

fn default_cycle_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_join_timeout() -> Duration {
    Duration::from_millis(3000)
}

fn default_cmd_seq_buffer_size() -> usize {
    5 * 1024
}

fn default_file_downlink_timing() -> Duration {
    Duration::from_millis(1000)
}

fn default_file_queue_depth() -> u32 {
    10
}

fn default_watchdog_code() -> u32 {
    0x123
}

fn default_uplink_store_size() -> usize {
    3000
}

fn default_uplink_queue_size() -> usize {
    30
}

fn default_uplink_manager_id() -> u32 {
    200
}

fn default_prm_db_path() -> PathBuf {
    PathBuf::from("PrmDb.dat")
}

fn default_rate_group_divisors() -> Vec<u32> {
    vec![1, 2, 4]
}

fn default_led_pin() -> u32 {
    13
}

fn default_gpio_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

fn default_true() -> bool {
    true
}

fn default_ping_warn_threshold() -> u32 {
    3
}

fn default_ping_fatal_threshold() -> u32 {
    5
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for the LedBlinker deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub comm: CommConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub components: ComponentsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "LED_BLINKER_CONFIG";

    /// Load configuration from disk, respecting the `LED_BLINKER_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Some(path) = Self::env_override() {
            let config = Self::from_path(&path)?;
            return Ok(LoadedAppConfig {
                config,
                source: Some(path),
            });
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Like [`AppConfig::load_with_source`] but falls back to defaults when no
    /// candidate exists. A file that exists but fails to parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        let any_present =
            Self::env_override().is_some() || candidates.iter().any(|c| c.as_ref().exists());
        if any_present {
            return Self::load_with_source(candidates);
        }
        let config = Self::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn env_override() -> Option<PathBuf> {
        std::env::var(Self::ENV_CONFIG_PATH)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.deployment.name.trim().is_empty() {
            return Err(anyhow!("deployment name must not be empty"));
        }
        if self.cycle.interval.is_zero() {
            return Err(anyhow!("cycle interval must be greater than zero"));
        }
        if self.cycle.join_timeout <= self.cycle.interval {
            return Err(anyhow!(
                "cycle join timeout {:?} must exceed the cycle interval {:?}",
                self.cycle.join_timeout,
                self.cycle.interval
            ));
        }
        if self.comm.stack_size == 0 {
            return Err(anyhow!("comm stack_size must be greater than zero"));
        }
        self.components.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_deployment_name")]
    pub name: String,
    /// First component id; each component gets its own block above it.
    #[serde(default = "default_base_id")]
    pub base_id: u32,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            name: default_deployment_name(),
            base_id: default_base_id(),
        }
    }
}

/// Remote endpoint and receive task settings for the uplink transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommConfig {
    #[serde(default)]
    pub host: Option<String>,
    /// Zero disables the transport.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_comm_priority")]
    pub priority: u8,
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
    #[serde(default = "default_receive_task_name")]
    pub task_name: String,
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 0,
            priority: default_comm_priority(),
            stack_size: default_stack_size(),
            task_name: default_receive_task_name(),
            reconnect: default_reconnect(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    #[serde(default = "default_cycle_interval", rename = "interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
    #[serde(default = "default_join_timeout", rename = "join_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub join_timeout: Duration,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval: default_cycle_interval(),
            join_timeout: default_join_timeout(),
        }
    }
}

/// Project-specific constants handed to components during configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentsConfig {
    #[serde(default = "default_cmd_seq_buffer_size")]
    pub cmd_seq_buffer_size: usize,
    #[serde(default)]
    pub file_downlink: FileDownlinkConfig,
    #[serde(default = "default_watchdog_code")]
    pub health_watchdog_code: u32,
    #[serde(default)]
    pub uplink_buffers: UplinkBufferConfig,
    #[serde(default = "default_prm_db_path")]
    pub prm_db_path: PathBuf,
    #[serde(default = "default_rate_group_divisors")]
    pub rate_group_divisors: Vec<u32>,
    #[serde(default = "default_led_pin")]
    pub led_pin: u32,
    /// Directory holding `gpio<N>/value` files for the LED pin.
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,
    #[serde(default = "default_true")]
    pub led_blink_on_start: bool,
    /// Health cycles without a ping answer before a warning.
    #[serde(default = "default_ping_warn_threshold")]
    pub ping_warn_threshold: u32,
    #[serde(default = "default_ping_fatal_threshold")]
    pub ping_fatal_threshold: u32,
}

impl ComponentsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rate_group_divisors.is_empty() {
            return Err(anyhow!("at least one rate group divisor is required"));
        }
        if self.rate_group_divisors.iter().any(|divisor| *divisor == 0) {
            return Err(anyhow!("rate group divisors must be non-zero"));
        }
        if self.ping_warn_threshold > self.ping_fatal_threshold {
            return Err(anyhow!(
                "ping warn threshold {} exceeds fatal threshold {}",
                self.ping_warn_threshold,
                self.ping_fatal_threshold
            ));
        }
        if self.uplink_buffers.bins.len() > MAX_BUFFER_BINS {
            return Err(anyhow!(
                "uplink buffer manager accepts at most {} bins, got {}",
                MAX_BUFFER_BINS,
                self.uplink_buffers.bins.len()
            ));
        }
        Ok(())
    }
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            cmd_seq_buffer_size: default_cmd_seq_buffer_size(),
            file_downlink: FileDownlinkConfig::default(),
            health_watchdog_code: default_watchdog_code(),
            uplink_buffers: UplinkBufferConfig::default(),
            prm_db_path: default_prm_db_path(),
            rate_group_divisors: default_rate_group_divisors(),
            led_pin: default_led_pin(),
            gpio_root: default_gpio_root(),
            led_blink_on_start: true,
            ping_warn_threshold: default_ping_warn_threshold(),
            ping_fatal_threshold: default_ping_fatal_threshold(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDownlinkConfig {
    #[serde(default = "default_file_downlink_timing", rename = "timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_file_downlink_timing", rename = "cooldown_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub cooldown: Duration,
    #[serde(default = "default_file_downlink_timing", rename = "cycle_time_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub cycle_time: Duration,
    #[serde(default = "default_file_queue_depth")]
    pub file_queue_depth: u32,
}

impl Default for FileDownlinkConfig {
    fn default() -> Self {
        Self {
            timeout: default_file_downlink_timing(),
            cooldown: default_file_downlink_timing(),
            cycle_time: default_file_downlink_timing(),
            file_queue_depth: default_file_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinConfig {
    pub buffer_size: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkBufferConfig {
    #[serde(default = "default_uplink_manager_id")]
    pub manager_id: u32,
    #[serde(default = "UplinkBufferConfig::default_bins")]
    pub bins: Vec<BinConfig>,
}

impl UplinkBufferConfig {
    fn default_bins() -> Vec<BinConfig> {
        vec![BinConfig {
            buffer_size: default_uplink_store_size(),
            count: default_uplink_queue_size(),
        }]
    }
}

impl Default for UplinkBufferConfig {
    fn default() -> Self {
        Self {
            manager_id: default_uplink_manager_id(),
            bins: Self::default_bins(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Upper bound on outstanding allocator bytes. Unset means plain heap.
    #[serde(default)]
    pub budget: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Rolling file output is disabled when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

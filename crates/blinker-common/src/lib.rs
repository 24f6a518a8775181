//! ---
//! blinker_section: "01-core-functionality"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Shared configuration and logging primitives."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Shared primitives for the LedBlinker workspace: TOML configuration loading
//! and tracing subscriber setup.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, BinConfig, CommConfig, ComponentsConfig, CycleConfig, DeploymentConfig,
    FileDownlinkConfig, LoadedAppConfig, LoggingConfig, MemoryConfig, UplinkBufferConfig,
};
pub use logging::{init_tracing, LogFormat};

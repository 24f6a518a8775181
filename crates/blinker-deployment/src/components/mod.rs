//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
//! Components of the LedBlinker deployment.

pub mod block_driver;
pub mod buffer_manager;
pub mod cmd_seq;
pub mod file_downlink;
pub mod gpio;
pub mod health;
pub mod led;
pub mod prm_db;
pub mod rate_group;

pub use block_driver::{BlockDriver, CYCLE_IN, CYCLE_OUT};
pub use buffer_manager::BufferManager;
pub use cmd_seq::{CommandSequencer, CS_CANCEL, CS_LOAD};
pub use file_downlink::{DownlinkTiming, FileDownlink};
pub use gpio::{GpioDriver, GPIO_WRITE};
pub use health::{Health, PingStatus, PING_RETURN, PING_SEND};
pub use led::{Led, BLINKING_ON_OFF, GPIO_SET};
pub use prm_db::ParameterDb;
pub use rate_group::{ActiveRateGroup, RateGroupDriver, MEMBER_OUT, RATE_GROUP_OUT, SCHED_IN};

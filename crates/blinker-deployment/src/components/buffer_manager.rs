//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::sync::Arc;

use blinker_common::UplinkBufferConfig;
use blinker_mem::{BufferBin, BufferPool};
use blinker_topology::{Component, ComponentError, ConfigureContext, Configurable};
use parking_lot::Mutex;
use tracing::info;

/// Buffer manager backing the file uplink. Its pool is sized from the
/// configured bins during configuration and handed back by the controller.
pub struct BufferManager {
    manager_id: u32,
    bins: Vec<BufferBin>,
    pool: Mutex<Option<Arc<BufferPool>>>,
}

impl BufferManager {
    pub fn new(settings: &UplinkBufferConfig) -> Self {
        Self {
            manager_id: settings.manager_id,
            bins: settings
                .bins
                .iter()
                .map(|bin| BufferBin::new(bin.buffer_size, bin.count))
                .collect(),
            pool: Mutex::new(None),
        }
    }

    pub fn manager_id(&self) -> u32 {
        self.manager_id
    }

    pub fn pool(&self) -> Option<Arc<BufferPool>> {
        self.pool.lock().clone()
    }
}

impl Component for BufferManager {
    fn name(&self) -> &str {
        "fileUplinkBufferManager"
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }
}

impl Configurable for BufferManager {
    fn configure(&self, ctx: &mut ConfigureContext<'_>) -> Result<(), ComponentError> {
        let pool = ctx.setup_buffer_pool(self.manager_id, &self.bins)?;
        info!(
            manager_id = self.manager_id,
            buffers = pool.buffer_count(),
            bytes = pool.held_bytes(),
            "buffer manager configured"
        );
        *self.pool.lock() = Some(pool);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinker_common::BinConfig;

    #[test]
    fn converts_configured_bins() {
        let settings = UplinkBufferConfig {
            manager_id: 200,
            bins: vec![
                BinConfig {
                    buffer_size: 3000,
                    count: 30,
                },
                BinConfig {
                    buffer_size: 64,
                    count: 4,
                },
            ],
        };
        let manager = BufferManager::new(&settings);
        assert_eq!(manager.manager_id(), 200);
        assert_eq!(manager.bins, vec![BufferBin::new(3000, 30), BufferBin::new(64, 4)]);
        assert!(manager.pool().is_none());
    }
}

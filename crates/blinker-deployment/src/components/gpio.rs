//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use blinker_topology::{Component, ComponentError, ConfigureContext, Configurable, OutputPorts, Signal};
use parking_lot::Mutex;
use tracing::{info, warn};

pub const GPIO_WRITE: &str = "GpioWrite";

/// Output pin driven through the sysfs `gpio<N>/value` file.
pub struct GpioDriver {
    value_path: PathBuf,
    pin: u32,
    file: Mutex<Option<File>>,
    level: Mutex<Option<bool>>,
}

impl GpioDriver {
    pub fn new(gpio_root: &Path, pin: u32) -> Self {
        Self {
            value_path: gpio_root.join(format!("gpio{pin}")).join("value"),
            pin,
            file: Mutex::new(None),
            level: Mutex::new(None),
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }

    /// Last level requested, whether or not the pin is open.
    pub fn level(&self) -> Option<bool> {
        *self.level.lock()
    }

    /// Open the pin. Failure leaves the driver closed and is not fatal.
    fn open(&self) {
        match OpenOptions::new().write(true).open(&self.value_path) {
            Ok(file) => {
                info!(pin = self.pin, path = %self.value_path.display(), "gpio opened");
                *self.file.lock() = Some(file);
            }
            Err(err) => {
                warn!(
                    pin = self.pin,
                    path = %self.value_path.display(),
                    error = %err,
                    "unable to open gpio, writes will be dropped"
                );
            }
        }
    }

    fn write(&self, level: bool) {
        *self.level.lock() = Some(level);
        let mut file = self.file.lock();
        let Some(file) = file.as_mut() else {
            return;
        };
        let result = file
            .seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(if level { b"1" } else { b"0" }))
            .and_then(|()| file.flush());
        if let Err(err) = result {
            warn!(pin = self.pin, error = %err, "gpio write failed");
        }
    }
}

impl Component for GpioDriver {
    fn name(&self) -> &str {
        "gpioDriver"
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }

    fn receive(&self, port: &str, _index: usize, signal: Signal, _out: &OutputPorts) {
        if let (GPIO_WRITE, Signal::Level(level)) = (port, signal) {
            self.write(level);
        }
    }
}

impl Configurable for GpioDriver {
    fn configure(&self, _ctx: &mut ConfigureContext<'_>) -> Result<(), ComponentError> {
        self.open();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_level_to_value_file() {
        let root = tempfile::tempdir().unwrap();
        let pin_dir = root.path().join("gpio13");
        std::fs::create_dir_all(&pin_dir).unwrap();
        std::fs::write(pin_dir.join("value"), b"0").unwrap();

        let driver = GpioDriver::new(root.path(), 13);
        driver.open();
        assert!(driver.is_open());
        let out = OutputPorts::detached(0);
        driver.receive(GPIO_WRITE, 0, Signal::Level(true), &out);
        assert_eq!(std::fs::read(pin_dir.join("value")).unwrap(), b"1");
        driver.receive(GPIO_WRITE, 0, Signal::Level(false), &out);
        assert_eq!(std::fs::read(pin_dir.join("value")).unwrap(), b"0");
        assert_eq!(driver.level(), Some(false));
    }

    #[test]
    fn missing_pin_only_records_level() {
        let root = tempfile::tempdir().unwrap();
        let driver = GpioDriver::new(root.path(), 21);
        driver.open();
        assert!(!driver.is_open());
        driver.receive(GPIO_WRITE, 0, Signal::Level(true), &OutputPorts::detached(0));
        assert_eq!(driver.level(), Some(true));
    }
}

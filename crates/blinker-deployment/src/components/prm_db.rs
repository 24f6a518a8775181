//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use blinker_topology::{
    Component, ComponentError, ConfigureContext, Configurable, OutputPorts, Pingable, Signal,
    PING_OUT,
};
use tracing::{info, warn};

/// Parameter database. Reads its backing file at configuration; the file
/// contents are kept opaque.
pub struct ParameterDb {
    path: PathBuf,
    loaded: AtomicUsize,
}

impl ParameterDb {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the parameter file read at configuration, zero when absent.
    pub fn loaded_bytes(&self) -> usize {
        self.loaded.load(Ordering::Relaxed)
    }

    fn read_parameters(&self) -> Result<(), ComponentError> {
        match std::fs::read(&self.path) {
            Ok(contents) => {
                info!(path = %self.path.display(), bytes = contents.len(), "parameters loaded");
                self.loaded.store(contents.len(), Ordering::Relaxed);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "parameter file not found, using defaults");
                self.loaded.store(0, Ordering::Relaxed);
                Ok(())
            }
            Err(source) => Err(ComponentError::Io {
                context: format!("unable to read parameter file {}", self.path.display()),
                source,
            }),
        }
    }
}

impl Component for ParameterDb {
    fn name(&self) -> &str {
        "prmDb"
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }

    fn as_pingable(&self) -> Option<&dyn Pingable> {
        Some(self)
    }
}

impl Configurable for ParameterDb {
    fn configure(&self, _ctx: &mut ConfigureContext<'_>) -> Result<(), ComponentError> {
        self.read_parameters()
    }
}

impl Pingable for ParameterDb {
    fn ping(&self, key: u32, out: &OutputPorts) {
        out.emit(PING_OUT, 0, Signal::Ping(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = ParameterDb::new(dir.path().join("PrmDb.dat"));
        db.read_parameters().unwrap();
        assert_eq!(db.loaded_bytes(), 0);
    }

    #[test]
    fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PrmDb.dat");
        std::fs::write(&path, [0xA5u8; 12]).unwrap();
        let db = ParameterDb::new(&path);
        db.read_parameters().unwrap();
        assert_eq!(db.loaded_bytes(), 12);
    }

    #[test]
    fn directory_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = ParameterDb::new(dir.path());
        assert!(matches!(db.read_parameters(), Err(ComponentError::Io { .. })));
    }
}

//! ---
//! blinker_section: "02-runtime"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Runtime helpers supporting the topology controller."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

const JOIN_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
#[error("failed to spawn thread {name}: {source}")]
pub struct SpawnError {
    pub name: String,
    #[source]
    pub source: std::io::Error,
}

/// Thread that did not join cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinFailure {
    #[error("thread {name} did not exit within {timeout:?}")]
    Timeout { name: String, timeout: Duration },
    #[error("thread {name} panicked")]
    Panicked { name: String },
}

impl JoinFailure {
    pub fn thread_name(&self) -> &str {
        match self {
            JoinFailure::Timeout { name, .. } | JoinFailure::Panicked { name } => name,
        }
    }
}

/// Tracks every thread spawned for a deployment so they can be joined together.
#[derive(Debug, Default)]
pub struct ThreadSet {
    handles: Vec<(String, JoinHandle<()>)>,
}

impl ThreadSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a named thread. `stack_size` of `None` keeps the platform default.
    pub fn spawn<F>(
        &mut self,
        name: impl Into<String>,
        stack_size: Option<usize>,
        body: F,
    ) -> Result<(), SpawnError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        let handle = builder.spawn(body).map_err(|source| SpawnError {
            name: name.clone(),
            source,
        })?;
        debug!(thread = %name, ?stack_size, "thread spawned");
        self.handles.push((name, handle));
        Ok(())
    }

    /// Adopt a thread spawned elsewhere.
    pub fn adopt(&mut self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.handles.push((name.into(), handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Join every tracked thread, waiting at most `timeout` overall.
    ///
    /// Threads still running at the deadline are detached and reported as
    /// [`JoinFailure::Timeout`]; the set is empty afterwards either way.
    pub fn join_all(&mut self, timeout: Duration) -> Vec<JoinFailure> {
        let deadline = Instant::now() + timeout;
        let mut pending = std::mem::take(&mut self.handles);
        let mut failures = Vec::new();

        loop {
            let mut still_running = Vec::with_capacity(pending.len());
            for (name, handle) in pending {
                if handle.is_finished() {
                    match handle.join() {
                        Ok(()) => debug!(thread = %name, "thread joined"),
                        Err(_) => {
                            warn!(thread = %name, "thread panicked");
                            failures.push(JoinFailure::Panicked { name });
                        }
                    }
                } else {
                    still_running.push((name, handle));
                }
            }
            pending = still_running;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(JOIN_POLL);
        }

        for (name, _detached) in pending {
            warn!(thread = %name, timeout_ms = timeout.as_millis() as u64, "thread join timed out");
            failures.push(JoinFailure::Timeout { name, timeout });
        }
        info!(failures = failures.len(), "thread set joined");
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn joins_finished_threads() {
        let mut set = ThreadSet::new();
        set.spawn("a", None, || {}).unwrap();
        set.spawn("b", Some(64 * 1024), || thread::sleep(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(set.names(), vec!["a", "b"]);
        assert!(set.join_all(Duration::from_secs(2)).is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn reports_panics_and_timeouts_without_stopping() {
        let release = Arc::new(AtomicBool::new(false));
        let mut set = ThreadSet::new();
        set.spawn("panics", None, || panic!("component failure")).unwrap();
        let flag = Arc::clone(&release);
        set.spawn("stuck", None, move || {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
        set.spawn("fine", None, || {}).unwrap();

        let failures = set.join_all(Duration::from_millis(200));
        release.store(true, Ordering::SeqCst);

        assert_eq!(failures.len(), 2);
        assert!(failures.contains(&JoinFailure::Panicked {
            name: "panics".into()
        }));
        assert!(failures.contains(&JoinFailure::Timeout {
            name: "stuck".into(),
            timeout: Duration::from_millis(200)
        }));
        assert!(set.is_empty());
    }

    #[test]
    fn adopted_threads_are_joined() {
        let mut set = ThreadSet::new();
        set.adopt("external", thread::spawn(|| {}));
        assert!(set.join_all(Duration::from_secs(1)).is_empty());
    }
}

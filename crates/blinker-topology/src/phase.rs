//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::fmt;

/// Lifecycle phases in the order a deployment passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecyclePhase {
    Constructed,
    IdsAssigned,
    Wired,
    CommandsRegistered,
    Configured,
    Started,
    Running,
    Stopping,
    Stopped,
    Deallocated,
}

/// Result of checking whether a phase may be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The phase is the immediate successor of the current one.
    Enter,
    /// The phase was already reached; running it again would repeat work.
    AlreadyReached,
    /// A prerequisite phase has not completed.
    OutOfOrder,
}

impl LifecyclePhase {
    pub const ALL: [LifecyclePhase; 10] = [
        LifecyclePhase::Constructed,
        LifecyclePhase::IdsAssigned,
        LifecyclePhase::Wired,
        LifecyclePhase::CommandsRegistered,
        LifecyclePhase::Configured,
        LifecyclePhase::Started,
        LifecyclePhase::Running,
        LifecyclePhase::Stopping,
        LifecyclePhase::Stopped,
        LifecyclePhase::Deallocated,
    ];

    /// Phases executed by bring-up, in order.
    pub const BRING_UP: [LifecyclePhase; 6] = [
        LifecyclePhase::Constructed,
        LifecyclePhase::IdsAssigned,
        LifecyclePhase::Wired,
        LifecyclePhase::CommandsRegistered,
        LifecyclePhase::Configured,
        LifecyclePhase::Started,
    ];

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self as usize + 1).copied()
    }

    pub fn predecessor(self) -> Option<Self> {
        (self as usize).checked_sub(1).map(|index| Self::ALL[index])
    }

    /// True once teardown has begun.
    pub fn is_teardown(self) -> bool {
        self >= LifecyclePhase::Stopping
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::Constructed => "constructed",
            LifecyclePhase::IdsAssigned => "ids-assigned",
            LifecyclePhase::Wired => "wired",
            LifecyclePhase::CommandsRegistered => "commands-registered",
            LifecyclePhase::Configured => "configured",
            LifecyclePhase::Started => "started",
            LifecyclePhase::Running => "running",
            LifecyclePhase::Stopping => "stopping",
            LifecyclePhase::Stopped => "stopped",
            LifecyclePhase::Deallocated => "deallocated",
        }
    }

    /// Decide whether `target` may run given the `current` phase (`None` before bring-up).
    pub fn check(current: Option<LifecyclePhase>, target: LifecyclePhase) -> Advance {
        if current.map_or(false, |phase| phase >= target) {
            Advance::AlreadyReached
        } else if current == target.predecessor() {
            Advance::Enter
        } else {
            Advance::OutOfOrder
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! ---
//! blinker_section: "06-deployment"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "LedBlinker deployment components."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use blinker_topology::{CommandSpec, Component, ComponentError, OutputPorts, Signal};
use tracing::{debug, info};

use super::rate_group::SCHED_IN;

pub const GPIO_SET: &str = "GpioSet";

pub const BLINKING_ON_OFF: CommandSpec = CommandSpec::new("BLINKING_ON_OFF", 0);

/// Toggles its GPIO output on every schedule call while blinking is enabled.
pub struct Led {
    blinking: AtomicBool,
    state: AtomicBool,
    transitions: AtomicU64,
}

impl Led {
    pub fn new(blinking: bool) -> Self {
        Self {
            blinking: AtomicBool::new(blinking),
            state: AtomicBool::new(false),
            transitions: AtomicU64::new(0),
        }
    }

    pub fn is_blinking(&self) -> bool {
        self.blinking.load(Ordering::Relaxed)
    }

    pub fn is_on(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }

    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    fn toggle(&self, out: &OutputPorts) {
        if !self.is_blinking() {
            return;
        }
        let on = !self.state.fetch_xor(true, Ordering::Relaxed);
        self.transitions.fetch_add(1, Ordering::Relaxed);
        debug!(on, "led toggled");
        out.emit(GPIO_SET, 0, Signal::Level(on));
    }
}

impl Component for Led {
    fn name(&self) -> &str {
        "led"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![BLINKING_ON_OFF]
    }

    fn dispatch_command(&self, opcode: u32, args: &[u8]) -> Result<(), ComponentError> {
        if opcode != BLINKING_ON_OFF.opcode {
            return Err(ComponentError::UnknownCommand(opcode));
        }
        let blinking = match args.first() {
            Some(0) => false,
            Some(1) => true,
            other => {
                return Err(ComponentError::InvalidArgument(format!(
                    "blinking state must be 0 or 1, got {other:?}"
                )))
            }
        };
        self.blinking.store(blinking, Ordering::Relaxed);
        info!(blinking, "blinking state changed");
        Ok(())
    }

    fn receive(&self, port: &str, _index: usize, signal: Signal, out: &OutputPorts) {
        if let (SCHED_IN, Signal::Schedule(_)) = (port, signal) {
            self.toggle(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_only_while_blinking() {
        let led = Led::new(true);
        let out = OutputPorts::detached(0);
        led.receive(SCHED_IN, 0, Signal::Schedule(0), &out);
        assert!(led.is_on());
        led.receive(SCHED_IN, 0, Signal::Schedule(1), &out);
        assert!(!led.is_on());

        led.dispatch_command(BLINKING_ON_OFF.opcode, &[0]).unwrap();
        led.receive(SCHED_IN, 0, Signal::Schedule(2), &out);
        assert!(!led.is_on());
        assert_eq!(led.transitions(), 2);
    }

    #[test]
    fn rejects_bad_blinking_argument() {
        let led = Led::new(false);
        assert!(matches!(
            led.dispatch_command(BLINKING_ON_OFF.opcode, &[2]),
            Err(ComponentError::InvalidArgument(_))
        ));
        assert!(matches!(
            led.dispatch_command(BLINKING_ON_OFF.opcode, &[]),
            Err(ComponentError::InvalidArgument(_))
        ));
        assert!(!led.is_blinking());
    }
}

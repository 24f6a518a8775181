//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use indexmap::IndexMap;
use tracing::debug;

use crate::component::{CommandSpec, ComponentId};
use crate::error::TopologyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredCommand {
    pub component: ComponentId,
    pub component_name: String,
    pub spec: CommandSpec,
}

/// Global opcode table. Each opcode is the owning component's id plus the
/// command's local opcode.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    by_opcode: IndexMap<u32, RegisteredCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        component: ComponentId,
        component_name: &str,
        specs: &[CommandSpec],
    ) -> Result<(), TopologyError> {
        for spec in specs {
            let opcode = component
                .checked_add(spec.opcode)
                .ok_or_else(|| TopologyError::OpcodeOverflow {
                    component: component_name.to_owned(),
                    opcode: spec.opcode,
                })?;
            if let Some(existing) = self.by_opcode.get(&opcode) {
                return Err(TopologyError::DuplicateOpcode {
                    opcode,
                    existing: existing.component_name.clone(),
                    component: component_name.to_owned(),
                });
            }
            debug!(component = component_name, mnemonic = spec.mnemonic, opcode, "command registered");
            self.by_opcode.insert(
                opcode,
                RegisteredCommand {
                    component,
                    component_name: component_name.to_owned(),
                    spec: *spec,
                },
            );
        }
        Ok(())
    }

    pub fn lookup(&self, opcode: u32) -> Option<&RegisteredCommand> {
        self.by_opcode.get(&opcode)
    }

    /// Global opcode for `component.mnemonic`.
    pub fn opcode_of(&self, component_name: &str, mnemonic: &str) -> Option<u32> {
        self.by_opcode
            .iter()
            .find(|(_, command)| {
                command.component_name == component_name && command.spec.mnemonic == mnemonic
            })
            .map(|(opcode, _)| *opcode)
    }

    pub fn len(&self) -> usize {
        self.by_opcode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_opcode.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_opcode.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_are_offset_by_component_id() {
        let mut registry = CommandRegistry::new();
        registry
            .register(0x0A00, "led", &[CommandSpec::new("BLINKING_ON_OFF", 0)])
            .unwrap();
        registry
            .register(0x0500, "cmdSeq", &[CommandSpec::new("CS_RUN", 0), CommandSpec::new("CS_CANCEL", 1)])
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.opcode_of("led", "BLINKING_ON_OFF"), Some(0x0A00));
        assert_eq!(registry.lookup(0x0501).unwrap().spec.mnemonic, "CS_CANCEL");
    }

    #[test]
    fn duplicate_opcode_is_rejected() {
        let mut registry = CommandRegistry::new();
        registry
            .register(0x100, "a", &[CommandSpec::new("A_ONE", 0x100)])
            .unwrap();
        let err = registry
            .register(0x200, "b", &[CommandSpec::new("B_ZERO", 0)])
            .unwrap_err();
        match err {
            TopologyError::DuplicateOpcode {
                opcode,
                existing,
                component,
            } => {
                assert_eq!(opcode, 0x200);
                assert_eq!(existing, "a");
                assert_eq!(component, "b");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

//! ---
//! blinker_section: "04-topology"
//! blinker_subsection: "module"
//! blinker_type: "source"
//! blinker_scope: "code"
//! blinker_description: "Topology construction, wiring, and lifecycle orchestration."
//! blinker_version: "v0.0.0-prealpha"
//! blinker_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::component::{Component, ComponentId};
use crate::error::TopologyError;

/// Spacing between consecutive component ids; leaves room for local opcodes.
pub const ID_STRIDE: ComponentId = 0x100;

pub struct RegisteredComponent {
    pub id: Option<ComponentId>,
    pub component: Arc<dyn Component>,
}

/// Components of one deployment in construction order.
#[derive(Default)]
pub struct ComponentRegistry {
    entries: IndexMap<String, RegisteredComponent>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, component: Arc<dyn Component>) -> Result<(), TopologyError> {
        if self.entries.contains_key(name) {
            return Err(TopologyError::DuplicateComponent(name.to_owned()));
        }
        self.entries
            .insert(name.to_owned(), RegisteredComponent { id: None, component });
        Ok(())
    }

    /// Give every component `base + position * ID_STRIDE`.
    pub fn assign_ids(&mut self, base: ComponentId) -> Result<(), TopologyError> {
        for (position, (name, entry)) in self.entries.iter_mut().enumerate() {
            let id = ComponentId::try_from(position)
                .ok()
                .and_then(|position| position.checked_mul(ID_STRIDE))
                .and_then(|offset| base.checked_add(offset))
                .ok_or_else(|| TopologyError::IdSpaceExhausted(name.clone()))?;
            debug!(component = %name, id, "id assigned");
            entry.id = Some(id);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredComponent> {
        self.entries.get(name)
    }

    pub fn id_of(&self, name: &str) -> Result<ComponentId, TopologyError> {
        self.entries
            .get(name)
            .and_then(|entry| entry.id)
            .ok_or_else(|| TopologyError::UnknownComponent(name.to_owned()))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &RegisteredComponent)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, entry)| (name, entry.id)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Component for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn ids_follow_construction_order() {
        let mut registry = ComponentRegistry::new();
        registry.insert("blockDrv", Arc::new(Named("blockDrv"))).unwrap();
        registry.insert("rateGroupDriver", Arc::new(Named("rateGroupDriver"))).unwrap();
        assert!(matches!(
            registry.id_of("blockDrv"),
            Err(TopologyError::UnknownComponent(_))
        ));

        registry.assign_ids(0x0100).unwrap();
        assert_eq!(registry.id_of("blockDrv").unwrap(), 0x0100);
        assert_eq!(registry.id_of("rateGroupDriver").unwrap(), 0x0200);
        let names: Vec<_> = registry.iter().rev().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["rateGroupDriver", "blockDrv"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ComponentRegistry::new();
        registry.insert("led", Arc::new(Named("led"))).unwrap();
        assert!(matches!(
            registry.insert("led", Arc::new(Named("led"))),
            Err(TopologyError::DuplicateComponent(name)) if name == "led"
        ));
    }

    #[test]
    fn id_overflow_is_reported() {
        let mut registry = ComponentRegistry::new();
        registry.insert("a", Arc::new(Named("a"))).unwrap();
        registry.insert("b", Arc::new(Named("b"))).unwrap();
        assert!(matches!(
            registry.assign_ids(u32::MAX - 1),
            Err(TopologyError::IdSpaceExhausted(name)) if name == "b"
        ));
    }
}

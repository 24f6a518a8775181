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
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use tracing::trace;

use crate::component::{Component, ComponentId, Signal, PING_IN};

/// Port named by component name, as declared in a topology plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortSpec {
    pub component: String,
    pub port: String,
    pub index: usize,
}

impl PortSpec {
    pub fn new(component: impl Into<String>, port: impl Into<String>, index: usize) -> Self {
        Self {
            component: component.into(),
            port: port.into(),
            index,
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}[{}]", self.component, self.port, self.index)
    }
}

/// Port resolved to a component id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortAddr {
    pub component: ComponentId,
    pub port: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub from: PortAddr,
    pub to: PortAddr,
}

/// Directed edges between component ports. Frozen once wiring completes.
#[derive(Debug, Default, Clone)]
pub struct ConnectionGraph {
    edges: IndexMap<PortAddr, Vec<PortAddr>>,
    len: usize,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, from: PortAddr, to: PortAddr) {
        self.edges.entry(from).or_default().push(to);
        self.len += 1;
    }

    pub fn targets(&self, from: &PortAddr) -> &[PortAddr] {
        self.edges.get(from).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        self.edges.iter().flat_map(|(from, targets)| {
            targets.iter().map(move |to| Connection {
                from: from.clone(),
                to: to.clone(),
            })
        })
    }
}

pub(crate) struct WiredComponent {
    pub name: String,
    pub component: Arc<dyn Component>,
}

/// Components plus the frozen connection graph, shared by every port handle.
pub struct WiredTopology {
    components: IndexMap<ComponentId, WiredComponent>,
    graph: ConnectionGraph,
}

impl WiredTopology {
    pub(crate) fn new(components: IndexMap<ComponentId, WiredComponent>, graph: ConnectionGraph) -> Self {
        Self { components, graph }
    }

    pub fn graph(&self) -> &ConnectionGraph {
        &self.graph
    }

    pub fn component(&self, id: ComponentId) -> Option<&Arc<dyn Component>> {
        self.components.get(&id).map(|wired| &wired.component)
    }

    pub fn component_name(&self, id: ComponentId) -> Option<&str> {
        self.components.get(&id).map(|wired| wired.name.as_str())
    }

    /// Output ports of component `id`.
    pub fn ports(self: &Arc<Self>, id: ComponentId) -> OutputPorts {
        OutputPorts {
            topology: Arc::downgrade(self),
            component: id,
        }
    }

    /// Hand `signal` to the component owning input `target`.
    ///
    /// Pings arriving on [`PING_IN`] go to the component's [`crate::Pingable`]
    /// capability; everything else goes to [`Component::receive`].
    pub fn deliver(self: &Arc<Self>, target: &PortAddr, signal: Signal) -> bool {
        let Some(wired) = self.components.get(&target.component) else {
            return false;
        };
        let out = self.ports(target.component);
        trace!(component = %wired.name, port = %target.port, index = target.index, "deliver");
        match (target.port.as_str(), &signal, wired.component.as_pingable()) {
            (PING_IN, Signal::Ping(key), Some(pingable)) => pingable.ping(*key, &out),
            _ => wired
                .component
                .receive(&target.port, target.index, signal, &out),
        }
        true
    }
}

impl fmt::Debug for WiredTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WiredTopology")
            .field(
                "components",
                &self.components.values().map(|wired| wired.name.as_str()).collect::<Vec<_>>(),
            )
            .field("connections", &self.graph.len())
            .finish()
    }
}

/// Handle a component uses to emit on its output ports.
///
/// Holds the topology weakly; once the topology is deallocated emits are dropped.
#[derive(Clone)]
pub struct OutputPorts {
    topology: Weak<WiredTopology>,
    component: ComponentId,
}

impl OutputPorts {
    /// Ports not attached to any topology. Every emit is dropped.
    pub fn detached(component: ComponentId) -> Self {
        Self {
            topology: Weak::new(),
            component,
        }
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// Send `signal` out of `port[index]`, returning how many inputs received it.
    pub fn emit(&self, port: &str, index: usize, signal: Signal) -> usize {
        let Some(topology) = self.topology.upgrade() else {
            return 0;
        };
        let from = PortAddr {
            component: self.component,
            port: port.to_owned(),
            index,
        };
        let mut delivered = 0;
        for target in topology.graph.targets(&from) {
            if topology.deliver(target, signal.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of indices of output `port` with at least one connection.
    pub fn fan_out(&self, port: &str) -> usize {
        let Some(topology) = self.topology.upgrade() else {
            return 0;
        };
        topology
            .graph
            .edges
            .keys()
            .filter(|from| from.component == self.component && from.port == port)
            .count()
    }
}

impl fmt::Debug for OutputPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPorts")
            .field("component", &self.component)
            .field("attached", &(self.topology.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, usize, Signal)>>,
    }

    impl Component for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn receive(&self, port: &str, index: usize, signal: Signal, _out: &OutputPorts) {
            self.seen.lock().push((port.to_owned(), index, signal));
        }
    }

    fn addr(component: ComponentId, port: &str, index: usize) -> PortAddr {
        PortAddr {
            component,
            port: port.to_owned(),
            index,
        }
    }

    #[test]
    fn emit_fans_out_to_every_target() {
        let left = Arc::new(Recorder::default());
        let right = Arc::new(Recorder::default());
        let mut components = IndexMap::new();
        components.insert(1, WiredComponent { name: "src".into(), component: Arc::new(Recorder::default()) });
        components.insert(2, WiredComponent { name: "left".into(), component: left.clone() });
        components.insert(3, WiredComponent { name: "right".into(), component: right.clone() });

        let mut graph = ConnectionGraph::new();
        graph.connect(addr(1, "Out", 0), addr(2, "In", 0));
        graph.connect(addr(1, "Out", 0), addr(3, "In", 4));
        graph.connect(addr(1, "Out", 1), addr(3, "Other", 0));
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.connections().count(), 3);

        let topology = Arc::new(WiredTopology::new(components, graph));
        let out = topology.ports(1);
        assert_eq!(out.fan_out("Out"), 2);
        assert_eq!(out.emit("Out", 0, Signal::Cycle(7)), 2);
        assert_eq!(out.emit("Unwired", 0, Signal::Cycle(8)), 0);

        assert_eq!(*left.seen.lock(), vec![("In".to_owned(), 0, Signal::Cycle(7))]);
        assert_eq!(*right.seen.lock(), vec![("In".to_owned(), 4, Signal::Cycle(7))]);
    }

    #[test]
    fn emit_after_topology_dropped_is_a_no_op() {
        let topology = Arc::new(WiredTopology::new(IndexMap::new(), ConnectionGraph::new()));
        let out = topology.ports(1);
        drop(topology);
        assert_eq!(out.emit("Out", 0, Signal::Level(true)), 0);
        assert_eq!(OutputPorts::detached(9).emit("Out", 0, Signal::Ping(1)), 0);
    }
}

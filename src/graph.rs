//! Owned report of one resolve call's construction tree.

use std::fmt;

use crate::context::NodeKind;
use crate::node::{GraphState, NodeId};
use crate::Lifespan;

/// One node of a [`DependencyGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEntry {
    /// Distance from the requested service, which sits at depth 0
    pub depth: usize,
    pub kind: NodeKind,
    pub service: String,
    pub implementation: Option<&'static str>,
    pub registration_name: Option<String>,
    pub lifespan: Option<Lifespan>,
    /// Parameter through which the parent asked for this node
    pub parameter: Option<String>,
    /// Served from a lifespan cache instead of being built
    pub cached: bool,
}

/// The construction tree of a resolve call, in depth-first order.
///
/// Decorators appear above the node they wrap.
///
/// ```rust
/// use graph_injector::{Container, Parameter, Registration};
/// use std::sync::Arc;
///
/// struct Clock;
/// struct Scheduler;
///
/// let container = Container::new();
/// container.register(Registration::value(Clock)).unwrap();
/// container
///     .register(Registration::factory(|_| Ok(Arc::new(Scheduler))).param(Parameter::service::<Clock>("clock")))
///     .unwrap();
///
/// let (_, graph) = container.resolve_graph::<Scheduler>().unwrap();
/// assert_eq!(graph.len(), 2);
/// assert!(graph.to_string().contains("(as `clock`)"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    entries: Vec<GraphEntry>,
}

impl DependencyGraph {
    pub(crate) fn from_state(state: &GraphState) -> Self {
        let mut entries = Vec::with_capacity(state.len());
        for child in &state.node(state.root()).children {
            visit(state, *child, 0, &mut entries);
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[GraphEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose implementation is `name`.
    pub fn built_from<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a GraphEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.implementation == Some(name))
    }
}

fn visit(state: &GraphState, id: NodeId, depth: usize, entries: &mut Vec<GraphEntry>) {
    let node = state.node(id);
    let registration = node.registration.as_deref();
    entries.push(GraphEntry {
        depth,
        kind: node.kind,
        service: node.service.to_string(),
        implementation: node.implementation.map(|i| i.name()),
        registration_name: registration.and_then(|r| r.name().map(str::to_string)),
        lifespan: registration.map(|r| r.lifespan()),
        parameter: node.parameter.clone(),
        cached: node.cached,
    });
    for child in node.decorated.iter().chain(node.children.iter()) {
        visit(state, *child, depth + 1, entries);
    }
}

impl fmt::Display for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{:indent$}", "", indent = entry.depth * 2)?;
            match entry.kind {
                NodeKind::Decorator => f.write_str("@ ")?,
                NodeKind::PreConfiguration => f.write_str("~ ")?,
                _ => {}
            }
            f.write_str(&entry.service)?;
            if let Some(implementation) = entry.implementation {
                if implementation != entry.service {
                    write!(f, " [{implementation}]")?;
                }
            }
            if let Some(name) = &entry.registration_name {
                write!(f, " name={name:?}")?;
            }
            if let Some(lifespan) = entry.lifespan {
                write!(f, " {lifespan:?}")?;
            }
            if let Some(parameter) = &entry.parameter {
                write!(f, " (as `{parameter}`)")?;
            }
            if entry.cached {
                f.write_str(" cached")?;
            }
        }
        Ok(())
    }
}

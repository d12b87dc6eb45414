//! The build graph.
//!
//! Derivations are stored in an arena and reference their inputs by id.
//! Ids double as the memoization key for hashing and instantiation, which
//! makes sharing explicit: a diamond-shaped graph holds a single node for
//! the shared dependency, and hashing it twice costs one traversal.
//!
//! Nodes are immutable once added, except for [`Graph::add_input`], which
//! appends a dependency edge after the fact. Every hashing or traversal
//! entry point borrows the graph shared, so the graph cannot change while
//! a computation over it is in flight.

use std::collections::HashSet;

use crate::{Derivation, DrvError};

/// Identifier of a derivation within its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrvId(u32);

/// An arena of derivations.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Derivation>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a derivation and return its id.
    pub fn add(&mut self, drv: Derivation) -> DrvId {
        let id = DrvId(self.nodes.len() as u32);
        self.nodes.push(drv);
        id
    }

    /// Add `input` as a dependency of `drv`.
    pub fn add_input(&mut self, drv: DrvId, input: DrvId) {
        self.nodes[drv.0 as usize].inputs.push(input);
    }

    /// Look up a derivation by id.
    pub fn get(&self, id: DrvId) -> &Derivation {
        &self.nodes[id.0 as usize]
    }

    /// Number of derivations in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no derivations.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Topologically order the subgraph reachable from `roots`.
///
/// Every input precedes its consumers, and each distinct derivation appears
/// exactly once. Fails with the offending name path when the graph is
/// cyclic.
pub fn topo_sort(graph: &Graph, roots: &[DrvId]) -> Result<Vec<DrvId>, DrvError> {
    let mut visited = HashSet::new();
    let mut stack = HashSet::new();
    let mut path = Vec::new();
    let mut order = Vec::new();
    for &root in roots {
        visit(graph, root, &mut visited, &mut stack, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit(
    graph: &Graph,
    id: DrvId,
    visited: &mut HashSet<DrvId>,
    stack: &mut HashSet<DrvId>,
    path: &mut Vec<String>,
    order: &mut Vec<DrvId>,
) -> Result<(), DrvError> {
    if stack.contains(&id) {
        let mut cycle = path.clone();
        cycle.push(graph.get(id).name.clone());
        return Err(DrvError::Cycle(cycle));
    }
    if visited.contains(&id) {
        return Ok(());
    }

    stack.insert(id);
    path.push(graph.get(id).name.clone());
    for &input in &graph.get(id).inputs {
        visit(graph, input, visited, stack, path, order)?;
    }
    path.pop();
    stack.remove(&id);

    visited.insert(id);
    order.push(id);
    Ok(())
}

/// The set of derivations transitively reachable from `root`, exclusive of
/// `root` itself.
///
/// Terminates on any graph; cyclic graphs simply yield the reachable set.
pub fn all_deps(graph: &Graph, root: DrvId) -> HashSet<DrvId> {
    let mut seen = HashSet::new();
    let mut worklist: Vec<DrvId> = graph.get(root).inputs.clone();
    while let Some(id) = worklist.pop() {
        if seen.insert(id) {
            worklist.extend(graph.get(id).inputs.iter().copied());
        }
    }
    seen.remove(&root);
    seen
}

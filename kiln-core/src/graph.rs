//! Task reference graph management using petgraph.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;

use crate::config::ActionKind;
use crate::error::{Error, Result};
use crate::registry::{ActionDef, Registry, Step, TaskDef};

/// Directed acyclic graph of task and action references.
///
/// An edge `a -> b` means task `a` names `b` somewhere in its steps.
/// Actions are leaves.
#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
    cached_topological_order: Vec<String>,
}

impl TaskGraph {
    /// Builds the graph from resolved tasks and actions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircularReference`] with the shortest cycle through
    /// the first task found to reach itself.
    pub fn new(
        tasks: &IndexMap<String, TaskDef>,
        actions: &IndexMap<String, ActionDef>,
    ) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for name in tasks.keys().chain(actions.keys()) {
            let node = graph.add_node(name.clone());
            node_map.insert(name.clone(), node);
        }

        for task in tasks.values() {
            let from_node = node_index(&node_map, &task.name, tasks, actions)?;
            let mut seen = HashSet::new();
            for step in &task.steps {
                for referenced in step.referenced_names() {
                    if !seen.insert(referenced) {
                        continue;
                    }
                    let to_node = node_index(&node_map, referenced, tasks, actions)?;
                    graph.add_edge(from_node, to_node, ());
                }
            }
        }

        let sorted = toposort(&graph, None)
            .map_err(|cycle| {
                let path = cycle_through(&graph, cycle.node_id());
                Error::CircularReference {
                    task: graph[cycle.node_id()].clone(),
                    path,
                }
            })?;

        let topological_order = sorted
            .into_iter()
            .rev()
            .map(|idx| graph[idx].clone())
            .collect();

        Ok(Self {
            graph,
            node_map,
            cached_topological_order: topological_order,
        })
    }

    /// Names in topological order: referenced steps before the tasks naming them.
    #[inline]
    pub fn topological_order(&self) -> &[String] {
        &self.cached_topological_order
    }

    /// Direct references of a task; empty for actions.
    pub fn dependencies(&self, name: &str) -> Result<Vec<String>> {
        let node = self.lookup(name)?;
        Ok(self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Tasks that name `name` directly.
    pub fn dependents(&self, name: &str) -> Result<Vec<String>> {
        let node = self.lookup(name)?;
        Ok(self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Every task and action reachable from `name`, including itself.
    pub fn reachable(&self, name: &str) -> Result<HashSet<String>> {
        let start = self.lookup(name)?;
        let mut dfs = Dfs::new(&self.graph, start);
        let mut reachable = HashSet::new();
        while let Some(node) = dfs.next(&self.graph) {
            reachable.insert(self.graph[node].clone());
        }
        Ok(reachable)
    }

    fn lookup(&self, name: &str) -> Result<NodeIndex> {
        self.node_map
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownStep {
                name: name.to_string(),
                available: self.cached_topological_order.join(", "),
            })
    }
}

fn node_index(
    node_map: &HashMap<String, NodeIndex>,
    name: &str,
    tasks: &IndexMap<String, TaskDef>,
    actions: &IndexMap<String, ActionDef>,
) -> Result<NodeIndex> {
    node_map.get(name).copied().ok_or_else(|| Error::UnknownStep {
        name: name.to_string(),
        available: tasks
            .keys()
            .chain(actions.keys())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Expanded execution plan for a single task, without running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNode {
    Task { name: String, children: Vec<PlanNode> },
    Action { name: String, kind: ActionKind },
    Parallel(Vec<PlanNode>),
}

impl PlanNode {
    /// Action names in the order a sequential run would reach them.
    pub fn actions(&self) -> Vec<&str> {
        match self {
            PlanNode::Action { name, .. } => vec![name.as_str()],
            PlanNode::Task { children, .. } | PlanNode::Parallel(children) => {
                children.iter().flat_map(PlanNode::actions).collect()
            }
        }
    }
}

/// Expands `name` into its plan tree.
///
/// # Errors
///
/// Returns [`Error::UnknownStep`] for an unknown name and
/// [`Error::CircularReference`] if expansion revisits a task on the stack.
pub fn plan(registry: &Registry, name: &str) -> Result<PlanNode> {
    let step = registry.resolve(name)?;
    let mut stack = Vec::new();
    expand(registry, &step, &mut stack)
}

fn expand(registry: &Registry, step: &Step, stack: &mut Vec<String>) -> Result<PlanNode> {
    match step {
        Step::Action(name) => {
            let action = registry.action(name).ok_or_else(|| Error::UnknownStep {
                name: name.clone(),
                available: registry.available(),
            })?;
            Ok(PlanNode::Action {
                name: name.clone(),
                kind: action.kind,
            })
        }
        Step::Task(name) => {
            if stack.iter().any(|n| n == name) {
                return Err(Error::revisited(stack, name));
            }
            let task = registry.task(name).ok_or_else(|| Error::UnknownStep {
                name: name.clone(),
                available: registry.available(),
            })?;
            stack.push(name.clone());
            let children = task
                .steps
                .iter()
                .map(|child| expand(registry, child, stack))
                .collect::<Result<Vec<_>>>();
            stack.pop();
            Ok(PlanNode::Task {
                name: name.clone(),
                children: children?,
            })
        }
        Step::Parallel(members) => members
            .iter()
            .map(|member| expand(registry, member, stack))
            .collect::<Result<Vec<_>>>()
            .map(PlanNode::Parallel),
    }
}

/// Names along the shortest cycle from `start` back to itself.
fn cycle_through(graph: &DiGraph<String, ()>, start: NodeIndex) -> Vec<String> {
    let mut previous: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            if next == start {
                let mut middle = Vec::new();
                let mut cursor = node;
                while cursor != start {
                    middle.push(graph[cursor].clone());
                    match previous.get(&cursor) {
                        Some(prev) => cursor = *prev,
                        None => break,
                    }
                }
                middle.reverse();

                let mut path = vec![graph[start].clone()];
                path.extend(middle);
                path.push(graph[start].clone());
                return path;
            }
            if !previous.contains_key(&next) {
                previous.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    vec![graph[start].clone()]
}

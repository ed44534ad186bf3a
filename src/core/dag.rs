//! Task registry backed by a DAG.
//!
//! Every registered task is a node; a composite task has an edge to each
//! task it runs. Composites may name tasks that are registered later, so the
//! edge is added whenever both ends exist. Registration rejects anything that
//! would make the graph cyclic.

use crate::core::task::{Stage, Step, TaskBody, TaskDef};
use crate::error::{Error, Result};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The set of named tasks known to a run.
pub struct TaskRegistry {
    /// Composition graph: edge `a -> b` means `a` runs `b`.
    graph: DiGraph<String, ()>,
    /// Index mapping from task name to NodeIndex for fast lookups.
    index: HashMap<String, NodeIndex>,
    defs: HashMap<String, TaskDef>,
    /// Registration order, used for listing.
    order: Vec<String>,
}

impl TaskRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            defs: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a leaf step under `name`.
    pub fn register(&mut self, name: &str, step: Arc<dyn Step>) -> Result<()> {
        self.insert(TaskDef::step(name, step))
    }

    /// Register a composite that runs `stages` in order.
    pub fn register_sequence(
        &mut self,
        name: &str,
        description: &str,
        stages: Vec<Stage>,
    ) -> Result<()> {
        self.insert(TaskDef::sequence(name, description, stages))
    }

    /// Register a prepared task definition.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A task with the same name is already registered
    /// - A composite has an empty stage or names itself
    /// - Adding the task's edges would create a cycle
    pub fn insert(&mut self, def: TaskDef) -> Result<()> {
        let name = def.name.clone();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTask(name));
        }

        if let TaskBody::Sequence { stages, .. } = &def.body {
            if stages.is_empty() || stages.iter().any(|s| s.tasks().is_empty()) {
                return Err(Error::Validation(format!(
                    "Composite task '{}' has an empty stage",
                    name
                )));
            }
        }
        let children: Vec<String> = def.children().iter().map(|c| c.to_string()).collect();
        if children.contains(&name) {
            return Err(Error::Validation(format!(
                "Composite task '{}' cannot run itself",
                name
            )));
        }

        // Composites already registered that will run the new task.
        let parents: Vec<NodeIndex> = self
            .defs
            .values()
            .filter(|d| d.children().contains(&name.as_str()))
            .filter_map(|d| self.index.get(&d.name).copied())
            .collect();
        let present_children: Vec<NodeIndex> = children
            .iter()
            .filter_map(|c| self.index.get(c).copied())
            .collect();

        // The new node would close a cycle if one of its children can already
        // reach one of its parents.
        for &child in &present_children {
            for &parent in &parents {
                if has_path_connecting(&self.graph, child, parent, None) {
                    return Err(Error::Validation(format!(
                        "Registering task '{}' would create a cycle",
                        name
                    )));
                }
            }
        }

        let node = self.graph.add_node(name.clone());
        for child in present_children {
            self.graph.update_edge(node, child, ());
        }
        for parent in parents {
            self.graph.update_edge(parent, node, ());
        }

        self.index.insert(name.clone(), node);
        self.defs.insert(name.clone(), def);
        self.order.push(name);
        Ok(())
    }

    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<&TaskDef> {
        self.defs.get(name)
    }

    /// Look up a task, failing with `UnknownTask` when absent.
    pub fn resolve(&self, name: &str) -> Result<&TaskDef> {
        self.get(name).ok_or_else(|| Error::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Tasks in registration order.
    pub fn tasks(&self) -> Vec<&TaskDef> {
        self.order.iter().filter_map(|n| self.defs.get(n)).collect()
    }

    /// Check that `name` and everything it transitively runs is registered.
    ///
    /// Called before a run starts so a typo in a composite fails the run
    /// before any step touches the filesystem.
    pub fn check_closure(&self, name: &str) -> Result<()> {
        let mut seen = HashSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let def = self.resolve(&current)?;
            stack.extend(def.children().iter().map(|c| c.to_string()));
        }
        Ok(())
    }

    /// Check every composite in the registry.
    pub fn validate(&self) -> Result<()> {
        for def in self.tasks() {
            for child in def.children() {
                if !self.contains(child) {
                    return Err(Error::Validation(format!(
                        "Task '{}' runs unknown task '{}'",
                        def.name, child
                    )));
                }
            }
        }
        Ok(())
    }

    /// Leaf steps `name` expands to, in execution order. Tasks of a
    /// concurrent stage are listed in declaration order.
    pub fn leaf_steps(&self, name: &str) -> Result<Vec<String>> {
        let def = self.resolve(name)?;
        if !def.is_composite() {
            return Ok(vec![def.name.clone()]);
        }
        let mut out = Vec::new();
        for child in def.children() {
            out.extend(self.leaf_steps(child)?);
        }
        Ok(out)
    }

    /// All tasks ordered so each composite comes after everything it runs.
    ///
    /// # Errors
    /// Returns an error if the graph contains a cycle (should never happen
    /// since `insert` validates against cycles).
    pub fn topological_order(&self) -> Result<Vec<&TaskDef>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let name = self
                .graph
                .node_weight(cycle.node_id())
                .map(String::as_str)
                .unwrap_or("unknown");
            Error::Validation(format!("Cycle detected at task: {}", name))
        })?;

        Ok(sorted
            .into_iter()
            .rev()
            .filter_map(|index| self.graph.node_weight(index))
            .filter_map(|name| self.defs.get(name))
            .collect())
    }

    /// Number of composition edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.order)
            .field("edges", &self.edge_count())
            .finish()
    }
}

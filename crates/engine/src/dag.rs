//! Dependency graph construction and level grouping.
//!
//! Edges come from explicit `depends_on` declarations and from an inferred
//! heuristic: a non-module resource depends on a module when the resource
//! name contains the module's name as a substring. The heuristic is brittle
//! on purpose-built names; callers relying on module outputs should also
//! declare `depends_on`.
//!
//! The node table is the only state shared between executor tasks; every
//! status transition goes through the mutex so readers never observe a
//! half-updated node.

use crate::error::EngineError;
use crate::model::ResourceInstance;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

/// Execution status of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed)
    }
}

/// One node of the dependency graph.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub id: String,
    pub instance: ResourceInstance,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub status: NodeStatus,
    pub error: Option<String>,
}

/// A directed acyclic graph over resource instances.
#[derive(Debug)]
pub struct Dag {
    nodes: Mutex<BTreeMap<String, DagNode>>,
}

impl Dag {
    /// Build the graph and validate it. Fails on unknown `depends_on`
    /// targets and on cycles.
    pub fn build(instances: &[ResourceInstance]) -> Result<Dag, EngineError> {
        let ids: HashSet<&str> = instances.iter().map(|i| i.id.as_str()).collect();

        // Edge lists are assembled first so the node table can be built in
        // one pass afterwards.
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        let mut add_edge = |from: &str, to: &str| {
            let deps = dependencies.entry(from.to_string()).or_default();
            if !deps.iter().any(|d| d == to) {
                deps.push(to.to_string());
                dependents
                    .entry(to.to_string())
                    .or_default()
                    .push(from.to_string());
            }
        };

        for instance in instances {
            for dep in &instance.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(EngineError::UnknownDependency {
                        resource: instance.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                add_edge(&instance.id, dep);
            }

            // Inferred edges: module instances come before resources whose
            // name mentions the module.
            if !instance.kind.starts_with("module:") {
                for module in instances {
                    if module.id == instance.id || !module.kind.starts_with("module:") {
                        continue;
                    }
                    let module_name = module.kind.trim_start_matches("module:");
                    if !module_name.is_empty() && instance.name.contains(module_name) {
                        add_edge(&instance.id, &module.id);
                    }
                }
            }
        }

        let mut nodes = BTreeMap::new();
        for instance in instances {
            nodes.insert(
                instance.id.clone(),
                DagNode {
                    id: instance.id.clone(),
                    instance: instance.clone(),
                    dependencies: dependencies.remove(&instance.id).unwrap_or_default(),
                    dependents: dependents.remove(&instance.id).unwrap_or_default(),
                    status: NodeStatus::Pending,
                    error: None,
                },
            );
        }

        let dag = Dag {
            nodes: Mutex::new(nodes),
        };
        dag.validate_acyclic()?;
        Ok(dag)
    }

    /// Depth-first cycle check with an explicit recursion stack.
    fn validate_acyclic(&self) -> Result<(), EngineError> {
        let nodes = self.nodes.lock().unwrap();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: HashSet<&str> = HashSet::new();

        fn visit<'a>(
            id: &'a str,
            nodes: &'a BTreeMap<String, DagNode>,
            visited: &mut HashSet<&'a str>,
            stack: &mut HashSet<&'a str>,
        ) -> bool {
            visited.insert(id);
            stack.insert(id);

            if let Some(node) = nodes.get(id) {
                for dep in &node.dependencies {
                    if !visited.contains(dep.as_str()) {
                        if visit(dep, nodes, visited, stack) {
                            return true;
                        }
                    } else if stack.contains(dep.as_str()) {
                        return true;
                    }
                }
            }

            stack.remove(id);
            false
        }

        for id in nodes.keys() {
            if !visited.contains(id.as_str())
                && visit(id, &nodes, &mut visited, &mut stack)
            {
                return Err(EngineError::CircularDependency(id.clone()));
            }
        }

        Ok(())
    }

    /// Group node ids into execution levels: every node's dependencies live
    /// in a strictly earlier level. Within a level, ids are in lexicographic
    /// order for deterministic enumeration.
    pub fn execution_order(&self) -> Vec<Vec<String>> {
        let nodes = self.nodes.lock().unwrap();
        let mut levels = Vec::new();
        let mut placed: HashSet<String> = HashSet::new();

        while placed.len() < nodes.len() {
            // BTreeMap iteration keeps each level sorted by id.
            let level: Vec<String> = nodes
                .values()
                .filter(|node| {
                    !placed.contains(&node.id)
                        && node.dependencies.iter().all(|dep| placed.contains(dep))
                })
                .map(|node| node.id.clone())
                .collect();

            if level.is_empty() {
                // Unreachable once validate_acyclic has passed.
                break;
            }

            placed.extend(level.iter().cloned());
            levels.push(level);
        }

        levels
    }

    /// Atomically transition a node's status.
    pub fn set_status(&self, id: &str, status: NodeStatus, error: Option<String>) {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(node) = nodes.get_mut(id) {
            node.status = status;
            node.error = error;
        }
    }

    pub fn node(&self, id: &str) -> Option<DagNode> {
        self.nodes.lock().unwrap().get(id).cloned()
    }

    pub fn status_of(&self, id: &str) -> Option<NodeStatus> {
        self.nodes.lock().unwrap().get(id).map(|n| n.status)
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().unwrap().is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.nodes
            .lock()
            .unwrap()
            .values()
            .all(|n| n.status.is_terminal())
    }

    pub fn has_failures(&self) -> bool {
        self.nodes
            .lock()
            .unwrap()
            .values()
            .any(|n| n.status == NodeStatus::Failed)
    }

    pub fn failed_nodes(&self) -> Vec<DagNode> {
        self.nodes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.status == NodeStatus::Failed)
            .cloned()
            .collect()
    }
}

//! Level-parallel execution of reconciliation plans.
//!
//! The executor walks the DAG's level grouping: within a level every node is
//! driven by an independent task on the rayon pool, and the next level starts
//! only when the previous one has fully terminated. A failed node poisons its
//! dependents, which are reported as skipped instead of being executed.
//! Dismantle consumes the same grouping in reverse.

use crate::dag::{Dag, NodeStatus};
use crate::drift::DriftResult;
use crate::model::{Change, ChangeKind};
use crate::provider::{CancelToken, ProviderRegistry};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A failure attached to one node.
#[derive(Debug, Clone)]
pub struct NodeError {
    pub id: String,
    pub message: String,
}

/// Timing and membership of one executed level.
#[derive(Debug, Clone)]
pub struct ExecutionLevel {
    pub index: usize,
    pub resources: Vec<String>,
    pub duration: Duration,
}

/// Outcome of a commit or dismantle run.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub success: bool,
    pub cancelled: bool,
    pub changes: Vec<Change>,
    pub skipped: Vec<String>,
    pub errors: Vec<NodeError>,
    pub levels: Vec<ExecutionLevel>,
    pub duration: Duration,
}

impl ExecutionReport {
    fn new() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }
}

/// Drives provider operations over a built DAG.
pub struct Executor<'a> {
    registry: &'a ProviderRegistry,
}

impl<'a> Executor<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Apply the drift-derived action per instance: create when absent,
    /// update when drifted, otherwise nothing.
    pub fn commit(
        &self,
        dag: &Dag,
        drift: &BTreeMap<String, DriftResult>,
        cancel: &CancelToken,
    ) -> ExecutionReport {
        let start = Instant::now();
        let mut report = ExecutionReport::new();

        for (index, level) in dag.execution_order().into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.success = false;
                break;
            }

            let level_start = Instant::now();
            let runnable = self.skim_blocked(dag, &level, &mut report);

            let results: Mutex<Vec<(String, Result<Option<Change>, String>)>> =
                Mutex::new(Vec::new());

            runnable.par_iter().for_each(|id| {
                let outcome = self.commit_node(dag, drift, id, cancel);
                results.lock().unwrap().push((id.clone(), outcome));
            });

            for (id, outcome) in results.into_inner().unwrap() {
                match outcome {
                    Ok(Some(change)) => report.changes.push(change),
                    Ok(None) => {}
                    Err(message) => {
                        report.success = false;
                        report.errors.push(NodeError { id, message });
                    }
                }
            }

            report.levels.push(ExecutionLevel {
                index,
                resources: level,
                duration: level_start.elapsed(),
            });
        }

        report.duration = start.elapsed();
        report
    }

    fn commit_node(
        &self,
        dag: &Dag,
        drift: &BTreeMap<String, DriftResult>,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<Option<Change>, String> {
        let Some(node) = dag.node(id) else {
            return Err(format!("node {id} not found"));
        };

        // No drift result means nothing was planned for this node.
        let Some(result) = drift.get(id) else {
            dag.set_status(id, NodeStatus::Completed, None);
            return Ok(None);
        };

        dag.set_status(id, NodeStatus::Running, None);

        let provider = match self.registry.for_instance(&node.instance) {
            Ok(provider) => provider,
            Err(err) => {
                let message = err.to_string();
                dag.set_status(id, NodeStatus::Failed, Some(message.clone()));
                return Err(message);
            }
        };

        let action = match &result.current_state {
            None => {
                log::info!("creating {id}");
                provider
                    .create(&node.instance, cancel)
                    .map(|_| Some(Change::new(ChangeKind::Create, &node.instance)))
            }
            Some(current) if result.has_drift => {
                log::info!("updating {id}");
                provider
                    .update(&node.instance, current, cancel)
                    .map(|_| Some(Change::new(ChangeKind::Update, &node.instance)))
            }
            Some(_) => Ok(None),
        };

        match action {
            Ok(change) => {
                dag.set_status(id, NodeStatus::Completed, None);
                Ok(change)
            }
            Err(err) => {
                let message = err.to_string();
                dag.set_status(id, NodeStatus::Failed, Some(message.clone()));
                Err(message)
            }
        }
    }

    /// Split a level into runnable nodes, marking the rest as skipped when a
    /// dependency did not complete.
    fn skim_blocked(
        &self,
        dag: &Dag,
        level: &[String],
        report: &mut ExecutionReport,
    ) -> Vec<String> {
        let mut runnable = Vec::with_capacity(level.len());
        for id in level {
            let Some(node) = dag.node(id) else {
                continue;
            };
            let blocked = node
                .dependencies
                .iter()
                .find(|dep| dag.status_of(dep) != Some(NodeStatus::Completed));
            match blocked {
                Some(dep) => {
                    dag.set_status(
                        id,
                        NodeStatus::Failed,
                        Some(format!("dependency {dep} did not complete")),
                    );
                    report.skipped.push(id.clone());
                    report.success = false;
                }
                None => runnable.push(id.clone()),
            }
        }
        runnable
    }

    /// Delete every node, walking levels in reverse so dependents go first.
    /// Without `force` a failing level stops the walk; with it the remaining
    /// levels still proceed.
    pub fn dismantle(
        &self,
        dag: &Dag,
        cancel: &CancelToken,
        force: bool,
    ) -> ExecutionReport {
        let start = Instant::now();
        let mut report = ExecutionReport::new();

        let mut order = dag.execution_order();
        order.reverse();

        for (index, level) in order.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.success = false;
                break;
            }

            let level_start = Instant::now();
            let results: Mutex<Vec<(String, Result<Change, String>)>> = Mutex::new(Vec::new());

            level.par_iter().for_each(|id| {
                let outcome = self.delete_node(dag, id, cancel);
                results.lock().unwrap().push((id.clone(), outcome));
            });

            let mut level_failed = false;
            for (id, outcome) in results.into_inner().unwrap() {
                match outcome {
                    Ok(change) => report.changes.push(change),
                    Err(message) => {
                        level_failed = true;
                        report.errors.push(NodeError { id, message });
                    }
                }
            }

            report.levels.push(ExecutionLevel {
                index,
                resources: level,
                duration: level_start.elapsed(),
            });

            if level_failed && !force {
                report.success = false;
                break;
            }
        }

        report.duration = start.elapsed();
        report
    }

    fn delete_node(&self, dag: &Dag, id: &str, cancel: &CancelToken) -> Result<Change, String> {
        let Some(node) = dag.node(id) else {
            return Err(format!("node {id} not found"));
        };

        dag.set_status(id, NodeStatus::Running, None);

        let provider = match self.registry.for_instance(&node.instance) {
            Ok(provider) => provider,
            Err(err) => {
                let message = err.to_string();
                dag.set_status(id, NodeStatus::Failed, Some(message.clone()));
                return Err(message);
            }
        };

        log::info!("deleting {id}");
        match provider.delete(&node.instance, cancel) {
            Ok(()) => {
                dag.set_status(id, NodeStatus::Completed, None);
                Ok(Change::new(ChangeKind::Delete, &node.instance))
            }
            Err(err) => {
                let message = err.to_string();
                dag.set_status(id, NodeStatus::Failed, Some(message.clone()));
                Err(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::{plan_changes, Detector};
    use crate::testutil::{instance, MemoryProvider};
    use serde_json::json;
    use std::sync::Arc;

    fn registry_with(provider: Arc<MemoryProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register("aws", provider);
        registry
    }

    fn detect(
        registry: &ProviderRegistry,
        instances: &[crate::model::ResourceInstance],
    ) -> BTreeMap<String, DriftResult> {
        Detector::new(registry)
            .detect_batch(instances, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn commit_creates_updates_and_skips_aligned() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed("aws:s3:bucket.drifted", json!({"versioning": false}));
        provider.seed("aws:s3:bucket.aligned", json!({"versioning": true}));
        let registry = registry_with(provider.clone());

        let instances = vec![
            instance("aws:s3:bucket", "missing", json!({"versioning": true})),
            instance("aws:s3:bucket", "drifted", json!({"versioning": true})),
            instance("aws:s3:bucket", "aligned", json!({"versioning": true})),
        ];
        let drift = detect(&registry, &instances);
        let dag = Dag::build(&instances).unwrap();

        let report = Executor::new(&registry).commit(&dag, &drift, &CancelToken::new());

        assert!(report.success);
        assert_eq!(report.changes.len(), 2);
        let calls = provider.calls();
        assert!(calls.contains(&"create aws:s3:bucket.missing".to_string()));
        assert!(calls.contains(&"update aws:s3:bucket.drifted".to_string()));
        assert_eq!(calls.len(), 2);
        assert!(dag.is_complete());
    }

    #[test]
    fn commit_is_idempotent() {
        let provider = Arc::new(MemoryProvider::new());
        let registry = registry_with(provider);

        let instances = vec![
            instance("aws:s3:bucket", "a", json!({"versioning": true})),
            instance("aws:ec2:instance", "b", json!({"instance_type": "t3.micro", "ami": "x"})),
        ];

        let drift = detect(&registry, &instances);
        let dag = Dag::build(&instances).unwrap();
        let report = Executor::new(&registry).commit(&dag, &drift, &CancelToken::new());
        assert!(report.success);
        assert_eq!(report.changes.len(), 2);

        // A second run sees no drift and plans nothing.
        let drift = detect(&registry, &instances);
        assert!(plan_changes(&instances, &drift).is_empty());

        let dag = Dag::build(&instances).unwrap();
        let report = Executor::new(&registry).commit(&dag, &drift, &CancelToken::new());
        assert!(report.success);
        assert!(report.changes.is_empty());
    }

    #[test]
    fn dependents_of_failed_nodes_are_skipped() {
        let provider = Arc::new(MemoryProvider::new());
        provider.fail("aws:s3:bucket.base");
        let registry = registry_with(provider.clone());

        let base = instance("aws:s3:bucket", "base", json!({"versioning": true}));
        let mut child = instance("aws:ec2:instance", "child", json!({"instance_type": "t3.micro", "ami": "x"}));
        child.depends_on = vec![base.id.clone()];
        let independent = instance("aws:s3:bucket", "other", json!({"versioning": true}));

        let instances = vec![base, child, independent];
        let drift = detect(&registry, &instances);
        let dag = Dag::build(&instances).unwrap();

        let report = Executor::new(&registry).commit(&dag, &drift, &CancelToken::new());

        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].id, "aws:s3:bucket.base");
        assert_eq!(report.skipped, vec!["aws:ec2:instance.child"]);

        // The unrelated resource is still applied.
        let calls = provider.calls();
        assert!(calls.contains(&"create aws:s3:bucket.other".to_string()));
        assert!(!calls.iter().any(|c| c.contains("child")));
    }

    #[test]
    fn cancellation_stops_before_any_work() {
        let provider = Arc::new(MemoryProvider::new());
        let registry = registry_with(provider.clone());
        let instances = vec![instance("aws:s3:bucket", "a", json!({}))];
        let drift = detect(&registry, &instances);
        let dag = Dag::build(&instances).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = Executor::new(&registry).commit(&dag, &drift, &cancel);

        assert!(report.cancelled);
        assert!(!report.success);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn dismantle_walks_levels_in_reverse() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed("aws:s3:bucket.base", json!({}));
        provider.seed("aws:ec2:instance.child", json!({}));
        let registry = registry_with(provider.clone());

        let base = instance("aws:s3:bucket", "base", json!({}));
        let mut child = instance("aws:ec2:instance", "child", json!({}));
        child.depends_on = vec![base.id.clone()];

        let dag = Dag::build(&[base, child]).unwrap();
        let report = Executor::new(&registry).dismantle(&dag, &CancelToken::new(), false);

        assert!(report.success);
        assert_eq!(
            provider.calls(),
            vec!["delete aws:ec2:instance.child", "delete aws:s3:bucket.base"]
        );
        assert!(report.changes.iter().all(|c| c.kind == ChangeKind::Delete));
    }

    #[test]
    fn dismantle_stops_at_failed_level_unless_forced() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed("aws:s3:bucket.base", json!({}));
        provider.seed("aws:ec2:instance.child", json!({}));
        provider.fail("aws:ec2:instance.child");
        let registry = registry_with(provider.clone());

        let base = instance("aws:s3:bucket", "base", json!({}));
        let mut child = instance("aws:ec2:instance", "child", json!({}));
        child.depends_on = vec![base.id.clone()];
        let instances = vec![base, child];

        let dag = Dag::build(&instances).unwrap();
        let report = Executor::new(&registry).dismantle(&dag, &CancelToken::new(), false);
        assert!(!report.success);
        assert!(!provider
            .calls()
            .contains(&"delete aws:s3:bucket.base".to_string()));

        // Forced: later levels proceed despite the failure.
        let dag = Dag::build(&instances).unwrap();
        let report = Executor::new(&registry).dismantle(&dag, &CancelToken::new(), true);
        assert!(report.success);
        assert_eq!(report.errors.len(), 1);
        assert!(provider
            .calls()
            .contains(&"delete aws:s3:bucket.base".to_string()));
    }
}

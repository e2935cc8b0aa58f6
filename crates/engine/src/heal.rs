//! Drift alignment.
//!
//! One alignment tick detects drift for every instance and dispatches on the
//! instance's drift policy: auto-heal applies create-or-update, notify-only
//! reports, and an absent policy reports with a note. Failures are
//! per-instance; one bad resource never aborts the tick. Callers running
//! continuously invoke a tick to completion before sleeping, so ticks cannot
//! overlap.

use crate::drift::Detector;
use crate::model::ResourceInstance;
use crate::provider::{CancelToken, ProviderRegistry};
use std::time::{Duration, Instant};

/// Alignment status strings are part of the structured output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignStatus {
    Aligned,
    Drifted,
    Healed,
    Error,
}

impl AlignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignStatus::Aligned => "aligned",
            AlignStatus::Drifted => "drifted",
            AlignStatus::Healed => "healed",
            AlignStatus::Error => "error",
        }
    }
}

/// Per-resource outcome of one tick.
#[derive(Debug, Clone)]
pub struct ResourceAlignment {
    pub name: String,
    pub status: AlignStatus,
    pub changes: Vec<String>,
    /// Set when the instance drifted and neither policy flag is enabled
    /// (whether the policy is absent or explicitly all-false).
    pub no_policy: bool,
    pub duration: Duration,
}

/// Outcome of one alignment tick.
#[derive(Debug, Clone, Default)]
pub struct AlignReport {
    pub success: bool,
    pub drift_detected: bool,
    pub actions_applied: usize,
    pub resources: Vec<ResourceAlignment>,
    pub duration: Duration,
}

/// Run a single alignment tick over the given instances.
pub fn align_tick(
    instances: &[ResourceInstance],
    registry: &ProviderRegistry,
    cancel: &CancelToken,
) -> AlignReport {
    let start = Instant::now();
    let detector = Detector::new(registry);
    let mut report = AlignReport {
        success: true,
        ..AlignReport::default()
    };

    for instance in instances {
        if cancel.is_cancelled() {
            report.success = false;
            break;
        }

        let resource_start = Instant::now();
        let drift = match detector.detect(instance, cancel) {
            Ok(drift) => drift,
            Err(err) => {
                report.success = false;
                report.resources.push(ResourceAlignment {
                    name: instance.id.clone(),
                    status: AlignStatus::Error,
                    changes: vec![err.to_string()],
                    no_policy: false,
                    duration: resource_start.elapsed(),
                });
                continue;
            }
        };

        if !drift.has_drift {
            report.resources.push(ResourceAlignment {
                name: instance.id.clone(),
                status: AlignStatus::Aligned,
                changes: Vec::new(),
                no_policy: false,
                duration: resource_start.elapsed(),
            });
            continue;
        }

        report.drift_detected = true;
        let policy = instance.drift_policy.unwrap_or_default();

        if policy.auto_heal {
            match detector.auto_heal(instance, &drift, cancel) {
                Ok(_) => {
                    report.actions_applied += 1;
                    report.resources.push(ResourceAlignment {
                        name: instance.id.clone(),
                        status: AlignStatus::Healed,
                        changes: drift.changes.clone(),
                        no_policy: false,
                        duration: resource_start.elapsed(),
                    });
                }
                Err(err) => {
                    report.success = false;
                    report.resources.push(ResourceAlignment {
                        name: instance.id.clone(),
                        status: AlignStatus::Error,
                        changes: vec![err.to_string()],
                        no_policy: false,
                        duration: resource_start.elapsed(),
                    });
                }
            }
        } else {
            // Absent policy and an explicit all-false policy both mean
            // "nothing opted in": report with the no-policy note. Only a
            // true notifyOnly flag is a deliberate watch request.
            report.resources.push(ResourceAlignment {
                name: instance.id.clone(),
                status: AlignStatus::Drifted,
                changes: drift.changes.clone(),
                no_policy: !policy.auto_heal && !policy.notify_only,
                duration: resource_start.elapsed(),
            });
        }
    }

    report.duration = start.elapsed();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DriftPolicy;
    use crate::testutil::{instance, MemoryProvider};
    use serde_json::json;
    use std::sync::Arc;

    fn registry_with(provider: Arc<MemoryProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register("aws", provider);
        registry
    }

    fn healing(mut inst: crate::model::ResourceInstance) -> crate::model::ResourceInstance {
        inst.drift_policy = Some(DriftPolicy {
            auto_heal: true,
            notify_only: false,
        });
        inst
    }

    #[test]
    fn heals_missing_drifted_and_leaves_aligned_alone() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed("aws:s3:bucket.drifted", json!({"versioning": false}));
        provider.seed("aws:s3:bucket.aligned", json!({"versioning": true}));
        let registry = registry_with(provider.clone());

        let instances = vec![
            healing(instance("aws:s3:bucket", "missing", json!({"versioning": true}))),
            healing(instance("aws:s3:bucket", "drifted", json!({"versioning": true}))),
            healing(instance("aws:s3:bucket", "aligned", json!({"versioning": true}))),
        ];

        let report = align_tick(&instances, &registry, &CancelToken::new());

        assert!(report.success);
        assert!(report.drift_detected);
        assert_eq!(report.actions_applied, 2);

        let by_name: std::collections::HashMap<_, _> = report
            .resources
            .iter()
            .map(|r| (r.name.as_str(), r.status))
            .collect();
        assert_eq!(by_name["aws:s3:bucket.missing"], AlignStatus::Healed);
        assert_eq!(by_name["aws:s3:bucket.drifted"], AlignStatus::Healed);
        assert_eq!(by_name["aws:s3:bucket.aligned"], AlignStatus::Aligned);

        let calls = provider.calls();
        assert!(calls.contains(&"create aws:s3:bucket.missing".to_string()));
        assert!(calls.contains(&"update aws:s3:bucket.drifted".to_string()));
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn notify_only_reports_without_acting() {
        let provider = Arc::new(MemoryProvider::new());
        let registry = registry_with(provider.clone());

        let mut inst = instance("aws:s3:bucket", "watched", json!({"versioning": true}));
        inst.drift_policy = Some(DriftPolicy {
            auto_heal: false,
            notify_only: true,
        });

        let report = align_tick(&[inst], &registry, &CancelToken::new());

        assert!(report.success);
        assert!(report.drift_detected);
        assert_eq!(report.actions_applied, 0);
        assert_eq!(report.resources[0].status, AlignStatus::Drifted);
        assert!(!report.resources[0].no_policy);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn missing_policy_is_flagged() {
        let registry = registry_with(Arc::new(MemoryProvider::new()));
        let inst = instance("aws:s3:bucket", "unmanaged", json!({"versioning": true}));

        let report = align_tick(&[inst], &registry, &CancelToken::new());

        assert_eq!(report.resources[0].status, AlignStatus::Drifted);
        assert!(report.resources[0].no_policy);
    }

    #[test]
    fn explicit_all_false_policy_is_flagged_like_no_policy() {
        let provider = Arc::new(MemoryProvider::new());
        let registry = registry_with(provider.clone());

        let mut inst = instance("aws:s3:bucket", "opted-out", json!({"versioning": true}));
        inst.drift_policy = Some(DriftPolicy {
            auto_heal: false,
            notify_only: false,
        });

        let report = align_tick(&[inst], &registry, &CancelToken::new());

        assert!(report.drift_detected);
        assert_eq!(report.actions_applied, 0);
        assert_eq!(report.resources[0].status, AlignStatus::Drifted);
        assert!(report.resources[0].no_policy);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn one_failing_instance_does_not_abort_the_tick() {
        let provider = Arc::new(MemoryProvider::new());
        provider.fail("aws:s3:bucket.bad");
        let registry = registry_with(provider.clone());

        let instances = vec![
            healing(instance("aws:s3:bucket", "bad", json!({"versioning": true}))),
            healing(instance("aws:s3:bucket", "good", json!({"versioning": true}))),
        ];

        let report = align_tick(&instances, &registry, &CancelToken::new());

        assert!(!report.success);
        assert_eq!(report.resources.len(), 2);
        let by_name: std::collections::HashMap<_, _> = report
            .resources
            .iter()
            .map(|r| (r.name.as_str(), r.status))
            .collect();
        assert_eq!(by_name["aws:s3:bucket.bad"], AlignStatus::Error);
        assert_eq!(by_name["aws:s3:bucket.good"], AlignStatus::Healed);
        assert!(provider
            .calls()
            .contains(&"create aws:s3:bucket.good".to_string()));
    }
}

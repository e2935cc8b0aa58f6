//! Drift detection.
//!
//! Drift is the structural difference between the desired properties of an
//! instance and the state the provider reports for it. An absent resource is
//! drift with empty differences (the create signal). Provider-populated
//! metadata that the user never declares is excluded from the comparison.

use crate::error::EngineError;
use crate::expr::values_equal;
use crate::model::{Change, ChangeKind, ChangeSummary, Properties, ResourceInstance};
use crate::provider::{CancelToken, ProviderRegistry};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Live-state fields that never count as drift when present only in the
/// provider's answer. The set is closed; extending it changes drift
/// semantics for every existing configuration.
pub const METADATA_FIELDS: [&str; 10] = [
    "arn",
    "id",
    "creation_date",
    "last_modified",
    "status",
    "state",
    "availability_zone",
    "instance_id",
    "vpc_id",
    "subnet_id",
];

fn is_metadata_field(name: &str) -> bool {
    METADATA_FIELDS.contains(&name)
}

/// How one property differs between current and desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    Added,
    Removed,
    Modified,
}

impl DriftKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftKind::Added => "added",
            DriftKind::Removed => "removed",
            DriftKind::Modified => "modified",
        }
    }
}

/// A single property-level difference.
#[derive(Debug, Clone)]
pub struct DriftDifference {
    pub property: String,
    pub current: Option<Value>,
    pub desired: Option<Value>,
    pub kind: DriftKind,
}

/// Drift detection result for one instance.
#[derive(Debug, Clone)]
pub struct DriftResult {
    pub has_drift: bool,
    /// Human-readable change descriptions, in property order.
    pub changes: Vec<String>,
    pub differences: BTreeMap<String, DriftDifference>,
    pub current_state: Option<Properties>,
    pub desired_state: Properties,
}

impl DriftResult {
    /// Whether the drift is the absence of the resource.
    pub fn is_missing(&self) -> bool {
        self.current_state.is_none()
    }
}

/// Detects drift by querying providers for live state.
pub struct Detector<'a> {
    registry: &'a ProviderRegistry,
}

impl<'a> Detector<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Detect drift for a single instance.
    pub fn detect(
        &self,
        instance: &ResourceInstance,
        cancel: &CancelToken,
    ) -> Result<DriftResult, EngineError> {
        let provider = self.registry.for_instance(instance)?;
        let current = provider.current_state(instance, cancel)?;

        let Some(current) = current else {
            return Ok(DriftResult {
                has_drift: true,
                changes: vec!["Resource does not exist".to_string()],
                differences: BTreeMap::new(),
                current_state: None,
                desired_state: instance.properties.clone(),
            });
        };

        let differences = compare_states(&current, &instance.properties);
        let changes = describe_differences(&differences);

        Ok(DriftResult {
            has_drift: !differences.is_empty(),
            changes,
            differences,
            current_state: Some(current),
            desired_state: instance.properties.clone(),
        })
    }

    /// Detect drift for many instances. Detection is independent per
    /// instance, so the batch runs on the rayon pool; results are keyed by
    /// instance id and therefore order-insensitive.
    pub fn detect_batch(
        &self,
        instances: &[ResourceInstance],
        cancel: &CancelToken,
    ) -> Result<BTreeMap<String, DriftResult>, EngineError> {
        let results = Mutex::new(BTreeMap::new());
        let first_error: Mutex<Option<EngineError>> = Mutex::new(None);

        instances.par_iter().for_each(|instance| {
            if first_error.lock().unwrap().is_some() {
                return;
            }
            match self.detect(instance, cancel) {
                Ok(result) => {
                    results.lock().unwrap().insert(instance.id.clone(), result);
                }
                Err(err) => {
                    first_error.lock().unwrap().get_or_insert(err);
                }
            }
        });

        if let Some(err) = first_error.into_inner().unwrap() {
            return Err(err);
        }
        Ok(results.into_inner().unwrap())
    }

    /// Apply create-or-update to eliminate drift, when the instance's policy
    /// allows it. Returns `true` when an action was taken.
    pub fn auto_heal(
        &self,
        instance: &ResourceInstance,
        drift: &DriftResult,
        cancel: &CancelToken,
    ) -> Result<bool, EngineError> {
        let auto_heal = instance
            .drift_policy
            .map(|p| p.auto_heal)
            .unwrap_or(false);
        if !auto_heal {
            return Ok(false);
        }

        let provider = self.registry.for_instance(instance)?;
        match &drift.current_state {
            None => {
                provider.create(instance, cancel)?;
                Ok(true)
            }
            Some(current) if drift.has_drift => {
                provider.update(instance, current, cancel)?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }
}

/// Structural comparison of current against desired state.
pub fn compare_states(
    current: &Properties,
    desired: &Properties,
) -> BTreeMap<String, DriftDifference> {
    let mut differences = BTreeMap::new();

    for (key, desired_value) in desired {
        match current.get(key) {
            None => {
                differences.insert(
                    key.clone(),
                    DriftDifference {
                        property: key.clone(),
                        current: None,
                        desired: Some(desired_value.clone()),
                        kind: DriftKind::Added,
                    },
                );
            }
            Some(current_value) if !values_equal(current_value, desired_value) => {
                differences.insert(
                    key.clone(),
                    DriftDifference {
                        property: key.clone(),
                        current: Some(current_value.clone()),
                        desired: Some(desired_value.clone()),
                        kind: DriftKind::Modified,
                    },
                );
            }
            Some(_) => {}
        }
    }

    for (key, current_value) in current {
        if desired.contains_key(key) || is_metadata_field(key) {
            continue;
        }
        differences.insert(
            key.clone(),
            DriftDifference {
                property: key.clone(),
                current: Some(current_value.clone()),
                desired: None,
                kind: DriftKind::Removed,
            },
        );
    }

    differences
}

fn describe_differences(differences: &BTreeMap<String, DriftDifference>) -> Vec<String> {
    differences
        .values()
        .map(|diff| match diff.kind {
            DriftKind::Added => format!(
                "Missing property: {} (expected: {})",
                diff.property,
                render(&diff.desired)
            ),
            DriftKind::Removed => format!(
                "Extra property: {} (current: {})",
                diff.property,
                render(&diff.current)
            ),
            DriftKind::Modified => format!(
                "Property {}: {} -> {}",
                diff.property,
                render(&diff.current),
                render(&diff.desired)
            ),
        })
        .collect()
}

fn render(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "<none>".to_string(),
    }
}

/// Derive the change set a commit would apply from batch drift results.
pub fn plan_changes(
    instances: &[ResourceInstance],
    results: &BTreeMap<String, DriftResult>,
) -> ChangeSummary {
    let mut summary = ChangeSummary::default();

    for instance in instances {
        let Some(result) = results.get(&instance.id) else {
            continue;
        };

        if result.current_state.is_none() {
            let mut change = Change::new(ChangeKind::Create, instance);
            change.new_values = instance.properties.clone();
            summary.push(change);
        } else if result.has_drift {
            let mut change = Change::new(ChangeKind::Update, instance);
            for diff in result.differences.values() {
                if let Some(current) = &diff.current {
                    change.old_values.insert(diff.property.clone(), current.clone());
                }
                if let Some(desired) = &diff.desired {
                    change.new_values.insert(diff.property.clone(), desired.clone());
                }
            }
            summary.push(change);
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderRegistry;
    use crate::testutil::{instance, props, MemoryProvider};
    use serde_json::json;
    use std::sync::Arc;

    fn registry_with(provider: Arc<MemoryProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register("aws", provider);
        registry
    }

    #[test]
    fn absent_resource_signals_create() {
        let registry = registry_with(Arc::new(MemoryProvider::new()));
        let detector = Detector::new(&registry);
        let inst = instance("aws:s3:bucket", "logs", json!({"versioning": true}));

        let result = detector.detect(&inst, &CancelToken::new()).unwrap();
        assert!(result.has_drift);
        assert!(result.is_missing());
        assert!(result.differences.is_empty());
    }

    #[test]
    fn modified_property_detected_and_metadata_ignored() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed(
            "aws:s3:bucket.b",
            json!({
                "versioning": false,
                "tags": {"Env": "prod"},
                "arn": "arn:aws:s3:::b"
            }),
        );
        let registry = registry_with(provider);
        let detector = Detector::new(&registry);
        let inst = instance(
            "aws:s3:bucket",
            "b",
            json!({"versioning": true, "tags": {"Env": "prod"}}),
        );

        let result = detector.detect(&inst, &CancelToken::new()).unwrap();
        assert!(result.has_drift);
        assert_eq!(result.differences.len(), 1);
        let diff = &result.differences["versioning"];
        assert_eq!(diff.kind, DriftKind::Modified);
        assert!(!result.differences.contains_key("arn"));
    }

    #[test]
    fn equal_states_have_no_drift() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed(
            "aws:s3:bucket.b",
            json!({"versioning": true, "tags": {"Env": "prod"}}),
        );
        let registry = registry_with(provider);
        let detector = Detector::new(&registry);
        let inst = instance(
            "aws:s3:bucket",
            "b",
            json!({"versioning": true, "tags": {"Env": "prod"}}),
        );

        let result = detector.detect(&inst, &CancelToken::new()).unwrap();
        assert!(!result.has_drift);
        assert!(result.differences.is_empty());
    }

    #[test]
    fn metadata_never_appears_in_removed_set() {
        let mut current = props(json!({"versioning": true}));
        for field in METADATA_FIELDS {
            current.insert(field.to_string(), json!("live-value"));
        }
        let desired = props(json!({"versioning": true}));

        let differences = compare_states(&current, &desired);
        assert!(differences.is_empty());
    }

    #[test]
    fn non_metadata_extra_property_is_removed_drift() {
        let current = props(json!({"versioning": true, "acl": "public-read"}));
        let desired = props(json!({"versioning": true}));

        let differences = compare_states(&current, &desired);
        assert_eq!(differences["acl"].kind, DriftKind::Removed);
    }

    #[test]
    fn desired_only_property_is_added_drift() {
        let current = props(json!({}));
        let desired = props(json!({"versioning": true}));

        let differences = compare_states(&current, &desired);
        assert_eq!(differences["versioning"].kind, DriftKind::Added);
    }

    #[test]
    fn numeric_values_compare_across_representations() {
        let current = props(json!({"allocated_storage": 20.0}));
        let desired = props(json!({"allocated_storage": 20}));
        assert!(compare_states(&current, &desired).is_empty());
    }

    #[test]
    fn batch_detection_covers_every_instance() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed("aws:s3:bucket.present", json!({"versioning": true}));
        let registry = registry_with(provider);
        let detector = Detector::new(&registry);

        let instances = vec![
            instance("aws:s3:bucket", "present", json!({"versioning": true})),
            instance("aws:s3:bucket", "missing", json!({"versioning": true})),
        ];
        let results = detector
            .detect_batch(&instances, &CancelToken::new())
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(!results["aws:s3:bucket.present"].has_drift);
        assert!(results["aws:s3:bucket.missing"].has_drift);
    }

    #[test]
    fn plan_changes_classifies_create_and_update() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed("aws:s3:bucket.drifted", json!({"versioning": false}));
        let registry = registry_with(provider);
        let detector = Detector::new(&registry);

        let instances = vec![
            instance("aws:s3:bucket", "missing", json!({"versioning": true})),
            instance("aws:s3:bucket", "drifted", json!({"versioning": true})),
        ];
        let results = detector
            .detect_batch(&instances, &CancelToken::new())
            .unwrap();
        let summary = plan_changes(&instances, &results);

        assert_eq!(summary.create, 1);
        assert_eq!(summary.update, 1);
        assert_eq!(summary.delete, 0);

        let update = summary
            .changes
            .iter()
            .find(|c| c.kind == ChangeKind::Update)
            .unwrap();
        assert_eq!(update.old_values["versioning"], json!(false));
        assert_eq!(update.new_values["versioning"], json!(true));
    }

    #[test]
    fn auto_heal_respects_policy() {
        use crate::model::DriftPolicy;

        let provider = Arc::new(MemoryProvider::new());
        let registry = registry_with(provider.clone());
        let detector = Detector::new(&registry);

        // Without a policy nothing happens.
        let inst = instance("aws:s3:bucket", "b", json!({"versioning": true}));
        let drift = detector.detect(&inst, &CancelToken::new()).unwrap();
        assert!(!detector.auto_heal(&inst, &drift, &CancelToken::new()).unwrap());
        assert!(provider.calls().is_empty());

        // With auto-heal, a missing resource is created.
        let mut inst = inst;
        inst.drift_policy = Some(DriftPolicy {
            auto_heal: true,
            notify_only: false,
        });
        assert!(detector.auto_heal(&inst, &drift, &CancelToken::new()).unwrap());
        assert_eq!(provider.calls(), vec!["create aws:s3:bucket.b"]);
        assert!(provider.state_of("aws:s3:bucket.b").is_some());
    }
}

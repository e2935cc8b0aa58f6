//! Declarative policy rules evaluated over expanded instances.
//!
//! Rules carry a predicate condition over the instance's kind, name,
//! properties, and tags. Error-severity violations gate the run: bootstrap
//! fails before any provider operation is issued.

use crate::model::ResourceInstance;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy rule name cannot be empty")]
    EmptyName,
    #[error("policy rule `{0}` has an empty condition")]
    EmptyCondition(String),
}

/// Violation severity; the exact strings are part of the output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single policy rule.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub condition: String,
    pub message: String,
}

/// A rule that fired against one instance.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyViolation {
    pub rule_name: String,
    pub resource_id: String,
    pub resource_kind: String,
    pub severity: Severity,
    pub message: String,
}

/// Evaluates a rule set against instances.
#[derive(Default)]
pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine preloaded with the built-in rule set.
    pub fn with_builtin_rules() -> Self {
        let mut engine = Self::new();
        for rule in builtin_rules() {
            // Built-in rules are well-formed by construction.
            let _ = engine.add_rule(rule);
        }
        engine
    }

    pub fn add_rule(&mut self, rule: PolicyRule) -> Result<(), PolicyError> {
        if rule.name.is_empty() {
            return Err(PolicyError::EmptyName);
        }
        if rule.condition.is_empty() {
            return Err(PolicyError::EmptyCondition(rule.name));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Evaluate every rule against one instance.
    pub fn evaluate_instance(&self, instance: &ResourceInstance) -> Vec<PolicyViolation> {
        self.rules
            .iter()
            .filter(|rule| condition_fires(&rule.condition, instance))
            .map(|rule| PolicyViolation {
                rule_name: rule.name.clone(),
                resource_id: instance.id.clone(),
                resource_kind: instance.kind.clone(),
                severity: rule.severity,
                message: rule.message.clone(),
            })
            .collect()
    }

    /// Evaluate the full rule set against every instance.
    pub fn evaluate(&self, instances: &[ResourceInstance]) -> Vec<PolicyViolation> {
        instances
            .iter()
            .flat_map(|instance| self.evaluate_instance(instance))
            .collect()
    }
}

/// Whether any violation carries error severity.
pub fn has_errors(violations: &[PolicyViolation]) -> bool {
    violations.iter().any(|v| v.severity == Severity::Error)
}

/// Group violations by severity for reporting.
pub fn by_severity(
    violations: &[PolicyViolation],
) -> BTreeMap<Severity, Vec<&PolicyViolation>> {
    let mut groups: BTreeMap<Severity, Vec<&PolicyViolation>> = BTreeMap::new();
    for violation in violations {
        groups.entry(violation.severity).or_default().push(violation);
    }
    groups
}

/// The built-in rule set.
pub fn builtin_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            name: "s3-versioning-enabled".into(),
            description: "S3 buckets should have versioning enabled".into(),
            severity: Severity::Warning,
            condition: "resource.kind == 'aws:s3:bucket' && !properties.versioning".into(),
            message: "S3 bucket should have versioning enabled for data protection".into(),
        },
        PolicyRule {
            name: "no-large-instances-in-dev".into(),
            // The predicate does not consult the environment despite the
            // name; it fires on t3.large in every environment.
            description: "Large instances should not be used (fires regardless of environment)"
                .into(),
            severity: Severity::Error,
            condition: "resource.kind == 'aws:ec2:instance' && properties.instance_type == 't3.large'"
                .into(),
            message: "Large instances are not allowed in development environments".into(),
        },
        PolicyRule {
            name: "resources-must-have-environment-tag".into(),
            description: "All resources must have an Environment tag".into(),
            severity: Severity::Warning,
            condition: "!tags.Environment".into(),
            message: "Resource must have an Environment tag for proper resource management"
                .into(),
        },
    ]
}

/// Dispatch a condition string against an instance. The recognised predicate
/// shapes match the built-in rules; an unrecognised condition never fires.
fn condition_fires(condition: &str, instance: &ResourceInstance) -> bool {
    if condition.contains("resource.kind == 'aws:s3:bucket' && !properties.versioning") {
        return instance.kind == "aws:s3:bucket"
            && !matches!(
                instance.properties.get("versioning"),
                Some(Value::Bool(true))
            );
    }

    if condition
        .contains("resource.kind == 'aws:ec2:instance' && properties.instance_type == 't3.large'")
    {
        return instance.kind == "aws:ec2:instance"
            && instance.properties.get("instance_type")
                == Some(&Value::String("t3.large".into()));
    }

    if condition.contains("!tags.Environment") {
        return match instance.properties.get("tags") {
            Some(Value::Object(tags)) => !tags.contains_key("Environment"),
            _ => true,
        };
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::instance;
    use serde_json::json;

    #[test]
    fn unversioned_bucket_fires_two_warnings() {
        let engine = PolicyEngine::with_builtin_rules();
        let inst = instance("aws:s3:bucket", "b", json!({"versioning": false}));

        let violations = engine.evaluate_instance(&inst);
        let names: Vec<_> = violations.iter().map(|v| v.rule_name.as_str()).collect();
        assert_eq!(
            names,
            ["s3-versioning-enabled", "resources-must-have-environment-tag"]
        );
        assert!(violations.iter().all(|v| v.severity == Severity::Warning));
        assert!(!has_errors(&violations));
    }

    #[test]
    fn versioned_tagged_bucket_is_clean() {
        let engine = PolicyEngine::with_builtin_rules();
        let inst = instance(
            "aws:s3:bucket",
            "b",
            json!({"versioning": true, "tags": {"Environment": "prod"}}),
        );
        assert!(engine.evaluate_instance(&inst).is_empty());
    }

    #[test]
    fn large_instance_is_an_error_in_any_environment() {
        let engine = PolicyEngine::with_builtin_rules();
        let inst = instance(
            "aws:ec2:instance",
            "web",
            json!({"instance_type": "t3.large", "tags": {"Environment": "prod"}}),
        );

        let violations = engine.evaluate_instance(&inst);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_name, "no-large-instances-in-dev");
        assert_eq!(violations[0].severity, Severity::Error);
        assert!(has_errors(&violations));
    }

    #[test]
    fn missing_tags_object_counts_as_missing_environment_tag() {
        let engine = PolicyEngine::with_builtin_rules();
        let inst = instance(
            "aws:ec2:instance",
            "web",
            json!({"instance_type": "t3.micro"}),
        );
        let violations = engine.evaluate_instance(&inst);
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].rule_name,
            "resources-must-have-environment-tag"
        );
    }

    #[test]
    fn gate_scenario_over_a_full_instance_set() {
        let engine = PolicyEngine::with_builtin_rules();

        // Warnings only: the gate stays open.
        let instances = vec![instance("aws:s3:bucket", "b", json!({"versioning": false}))];
        let violations = engine.evaluate(&instances);
        assert_eq!(violations.len(), 2);
        assert!(!has_errors(&violations));

        // Adding a large instance closes the gate.
        let mut instances = instances;
        instances.push(instance(
            "aws:ec2:instance",
            "big",
            json!({"instance_type": "t3.large", "tags": {"Environment": "dev"}}),
        ));
        let violations = engine.evaluate(&instances);
        assert!(has_errors(&violations));
    }

    #[test]
    fn grouping_by_severity() {
        let engine = PolicyEngine::with_builtin_rules();
        let instances = vec![
            instance("aws:s3:bucket", "b", json!({"versioning": false})),
            instance(
                "aws:ec2:instance",
                "big",
                json!({"instance_type": "t3.large", "tags": {"Environment": "dev"}}),
            ),
        ];
        let violations = engine.evaluate(&instances);
        let groups = by_severity(&violations);
        assert_eq!(groups[&Severity::Warning].len(), 2);
        assert_eq!(groups[&Severity::Error].len(), 1);
    }

    #[test]
    fn empty_rule_fields_are_rejected() {
        let mut engine = PolicyEngine::new();
        let err = engine
            .add_rule(PolicyRule {
                name: String::new(),
                description: String::new(),
                severity: Severity::Info,
                condition: "x".into(),
                message: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, PolicyError::EmptyName));

        let err = engine
            .add_rule(PolicyRule {
                name: "rule".into(),
                description: String::new(),
                severity: Severity::Info,
                condition: String::new(),
                message: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, PolicyError::EmptyCondition(_)));
    }
}

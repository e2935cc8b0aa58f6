//! Configuration and instance model.
//!
//! The decoded document keeps property trees as `serde_json::Value` so that
//! expression results (integers, booleans, sequences) can replace string
//! fields in place during evaluation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Generic property tree attached to resources and provider state.
pub type Properties = serde_json::Map<String, Value>;

/// The decoded top-level configuration document.
#[derive(Debug, Clone)]
pub struct Config {
    pub project: String,
    pub environment: String,
    pub variables: Properties,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub modules: BTreeMap<String, ModuleConfig>,
    pub resources: Vec<Resource>,
}

/// Raw decode target. Required fields are checked explicitly by the parser
/// so that a missing `project` reports as a configuration error rather than
/// a generic decode failure.
#[derive(Debug, Deserialize)]
pub(crate) struct RawConfig {
    pub project: Option<String>,
    pub environment: Option<String>,
    #[serde(default)]
    pub variables: Properties,
    pub providers: Option<BTreeMap<String, ProviderConfig>>,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleConfig>,
    pub resources: Option<Vec<Resource>>,
}

/// Per-provider connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub profile: String,
}

/// A reusable module reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub source: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub inputs: Properties,
}

/// A resource declaration as written in the document, before expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,
    pub name: String,
    /// Integer or expression; mutually exclusive with `for_each`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Value>,
    /// Sequence or expression resolving to one.
    #[serde(default, rename = "for_each", skip_serializing_if = "Option::is_none")]
    pub for_each: Option<Value>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, rename = "driftPolicy", skip_serializing_if = "Option::is_none")]
    pub drift_policy: Option<DriftPolicy>,
    #[serde(default, rename = "depends_on", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// How drift on a resource should be handled by `align`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DriftPolicy {
    #[serde(default, rename = "autoHeal")]
    pub auto_heal: bool,
    #[serde(default, rename = "notifyOnly")]
    pub notify_only: bool,
}

/// A fully-expanded, uniquely-identified unit of management.
///
/// The `id` is `kind + "." + name` and is unique across the expanded set.
/// All expressions are resolved by the time an instance exists.
#[derive(Debug, Clone)]
pub struct ResourceInstance {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub properties: Properties,
    pub drift_policy: Option<DriftPolicy>,
    pub depends_on: Vec<String>,
}

impl ResourceInstance {
    /// The provider owning this instance: the first dotted component of the
    /// kind triple (`aws:s3:bucket` -> `aws`).
    pub fn provider_name(&self) -> &str {
        provider_name(&self.kind)
    }
}

/// Extract the provider name from a resource kind.
pub fn provider_name(kind: &str) -> &str {
    kind.split(':').next().unwrap_or("")
}

/// The kind of change a reconciliation run applies to one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned or applied change.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub resource_id: String,
    pub resource_kind: String,
    pub resource_name: String,
    /// Current values of drifted properties, for updates.
    pub old_values: Properties,
    /// Desired values of drifted properties, for updates.
    pub new_values: Properties,
}

impl Change {
    pub fn new(kind: ChangeKind, instance: &ResourceInstance) -> Self {
        Self {
            kind,
            resource_id: instance.id.clone(),
            resource_kind: instance.kind.clone(),
            resource_name: instance.name.clone(),
            old_values: Properties::new(),
            new_values: Properties::new(),
        }
    }
}

/// Summary of the changes a run would apply.
#[derive(Debug, Clone, Default)]
pub struct ChangeSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub changes: Vec<Change>,
}

impl ChangeSummary {
    pub fn total(&self) -> usize {
        self.create + self.update + self.delete
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn push(&mut self, change: Change) {
        match change.kind {
            ChangeKind::Create => self.create += 1,
            ChangeKind::Update => self.update += 1,
            ChangeKind::Delete => self.delete += 1,
        }
        self.changes.push(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_name_from_kind() {
        assert_eq!(provider_name("aws:s3:bucket"), "aws");
        assert_eq!(provider_name("module:networking"), "module");
        assert_eq!(provider_name(""), "");
    }

    #[test]
    fn change_summary_counts() {
        let instance = ResourceInstance {
            id: "aws:s3:bucket.logs".into(),
            kind: "aws:s3:bucket".into(),
            name: "logs".into(),
            properties: Properties::new(),
            drift_policy: None,
            depends_on: Vec::new(),
        };

        let mut summary = ChangeSummary::default();
        summary.push(Change::new(ChangeKind::Create, &instance));
        summary.push(Change::new(ChangeKind::Update, &instance));
        summary.push(Change::new(ChangeKind::Update, &instance));

        assert_eq!(summary.create, 1);
        assert_eq!(summary.update, 2);
        assert_eq!(summary.delete, 0);
        assert_eq!(summary.total(), 3);
        assert!(!summary.is_empty());
    }

    #[test]
    fn drift_policy_decodes_camel_case() {
        let policy: DriftPolicy =
            serde_yaml::from_str("autoHeal: true\nnotifyOnly: false").unwrap();
        assert!(policy.auto_heal);
        assert!(!policy.notify_only);
    }
}

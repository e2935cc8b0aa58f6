//! Shared fixtures for engine tests: an in-memory provider and instance
//! builders. Compiled only for tests.

use crate::model::{Properties, ResourceInstance};
use crate::provider::{CancelToken, Provider, ProviderError};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// Build a `Properties` map from a JSON object literal.
pub(crate) fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object literal, got {other}"),
    }
}

/// Build a resource instance with the conventional `kind.name` id.
pub(crate) fn instance(kind: &str, name: &str, properties: Value) -> ResourceInstance {
    ResourceInstance {
        id: format!("{kind}.{name}"),
        kind: kind.to_string(),
        name: name.to_string(),
        properties: props(properties),
        drift_policy: None,
        depends_on: Vec::new(),
    }
}

/// In-memory provider backed by a mutex-guarded map, recording every call.
#[derive(Default)]
pub(crate) struct MemoryProvider {
    store: Mutex<BTreeMap<String, Properties>>,
    fail_ids: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed live state for an instance id.
    pub fn seed(&self, id: &str, properties: Value) {
        self.store
            .lock()
            .unwrap()
            .insert(id.to_string(), props(properties));
    }

    /// Make create/update/delete fail for the given instance id.
    pub fn fail(&self, id: &str) {
        self.fail_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn state_of(&self, id: &str) -> Option<Properties> {
        self.store.lock().unwrap().get(id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str, id: &str) {
        self.calls.lock().unwrap().push(format!("{op} {id}"));
    }

    fn check_fail(&self, op: &str, id: &str) -> Result<(), ProviderError> {
        if self.fail_ids.lock().unwrap().contains(id) {
            Err(ProviderError::Permanent(format!("{op} {id} failed")))
        } else {
            Ok(())
        }
    }
}

impl Provider for MemoryProvider {
    fn supported_kinds(&self) -> Vec<&'static str> {
        vec!["aws:s3:bucket", "aws:ec2:instance", "module:stack"]
    }

    fn validate(&self, _instance: &ResourceInstance) -> Result<(), ProviderError> {
        Ok(())
    }

    fn current_state(
        &self,
        instance: &ResourceInstance,
        cancel: &CancelToken,
    ) -> Result<Option<Properties>, ProviderError> {
        cancel.check()?;
        Ok(self.store.lock().unwrap().get(&instance.id).cloned())
    }

    fn create(
        &self,
        instance: &ResourceInstance,
        cancel: &CancelToken,
    ) -> Result<(), ProviderError> {
        cancel.check()?;
        self.check_fail("create", &instance.id)?;
        self.record("create", &instance.id);
        self.store
            .lock()
            .unwrap()
            .insert(instance.id.clone(), instance.properties.clone());
        Ok(())
    }

    fn update(
        &self,
        instance: &ResourceInstance,
        _current: &Properties,
        cancel: &CancelToken,
    ) -> Result<(), ProviderError> {
        cancel.check()?;
        self.check_fail("update", &instance.id)?;
        self.record("update", &instance.id);
        self.store
            .lock()
            .unwrap()
            .insert(instance.id.clone(), instance.properties.clone());
        Ok(())
    }

    fn delete(
        &self,
        instance: &ResourceInstance,
        cancel: &CancelToken,
    ) -> Result<(), ProviderError> {
        cancel.check()?;
        self.check_fail("delete", &instance.id)?;
        self.record("delete", &instance.id);
        self.store.lock().unwrap().remove(&instance.id);
        Ok(())
    }
}

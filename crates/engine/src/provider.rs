//! Provider contract.
//!
//! A provider owns every resource kind whose first dotted component matches
//! its registry name. Implementations translate instance properties into
//! cloud-API calls; the engine only sees this trait and the error taxonomy.

use crate::model::{provider_name, Properties, ResourceInstance};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by provider implementations.
///
/// The taxonomy drives retry behaviour: only [`ProviderError::Transient`] is
/// worth retrying. Authentication failures, remote validation errors, and
/// already-exists conflicts surface immediately.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("transient API error: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid configuration for {kind}: {message}")]
    InvalidConfiguration { kind: String, message: String },

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("unsupported resource kind `{0}`")]
    UnsupportedKind(String),

    #[error("permanent API error: {0}")]
    Permanent(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}

/// Cooperative cancellation shared between the driver and provider calls.
///
/// Providers check the token before network calls and between retry waits;
/// controllers check it between DAG nodes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Error out when cancellation was requested.
    pub fn check(&self) -> Result<(), ProviderError> {
        if self.is_cancelled() {
            Err(ProviderError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The contract every cloud adapter implements, keyed by resource kind.
pub trait Provider: Send + Sync {
    /// Resource kinds this provider owns, e.g. `aws:s3:bucket`.
    fn supported_kinds(&self) -> Vec<&'static str>;

    /// Pure, synchronous schema validation of the instance properties.
    fn validate(&self, instance: &ResourceInstance) -> Result<(), ProviderError>;

    /// Fetch the live state of the resource, or `None` when it does not exist.
    fn current_state(
        &self,
        instance: &ResourceInstance,
        cancel: &CancelToken,
    ) -> Result<Option<Properties>, ProviderError>;

    /// Create the resource.
    fn create(&self, instance: &ResourceInstance, cancel: &CancelToken)
        -> Result<(), ProviderError>;

    /// Reconcile observable differences; idempotent on re-apply.
    fn update(
        &self,
        instance: &ResourceInstance,
        current: &Properties,
        cancel: &CancelToken,
    ) -> Result<(), ProviderError>;

    /// Remove the resource. Deleting an absent resource is a success.
    fn delete(&self, instance: &ResourceInstance, cancel: &CancelToken)
        -> Result<(), ProviderError>;
}

/// Maps provider names to provider instances.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve the provider owning an instance; unknown providers are fatal.
    pub fn for_instance(
        &self,
        instance: &ResourceInstance,
    ) -> Result<Arc<dyn Provider>, crate::error::EngineError> {
        let name = provider_name(&instance.kind);
        self.get(name)
            .ok_or_else(|| crate::error::EngineError::UnknownProvider {
                provider: name.to_string(),
                resource: instance.id.clone(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

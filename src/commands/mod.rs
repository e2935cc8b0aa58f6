//! Command implementations.

pub mod align;
pub mod bootstrap;
pub mod commit;
pub mod dismantle;
pub mod docs;
pub mod preview;

use anyhow::Result;
use engine::{Config, EngineError, ProviderRegistry, ResourceInstance};
use std::sync::Arc;
use thiserror::Error;

/// A command that ran to completion but left failed resources behind.
#[derive(Debug, Error)]
#[error("{command} completed with errors")]
pub struct ExecutionFailed {
    pub command: &'static str,
}

/// Load and parse the configuration document.
pub fn load_config(path: &str) -> Result<Config> {
    let expanded = shellexpand::tilde(path);
    Ok(engine::parse_file(expanded.as_ref())?)
}

/// Build the provider registry from the document's `providers` mapping.
///
/// `AWS_REGION` and `AWS_PROFILE` override the decoded provider config.
pub fn build_registry(config: &Config) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    for (name, provider_config) in &config.providers {
        match name.as_str() {
            "aws" => {
                let region = std::env::var("AWS_REGION")
                    .unwrap_or_else(|_| provider_config.region.clone());
                let profile = std::env::var("AWS_PROFILE")
                    .ok()
                    .filter(|p| !p.is_empty())
                    .or_else(|| {
                        (!provider_config.profile.is_empty())
                            .then(|| provider_config.profile.clone())
                    });
                registry.register("aws", Arc::new(cloudkit::AwsProvider::new(region, profile)));
            }
            other => {
                return Err(EngineError::UnknownProvider {
                    provider: other.to_string(),
                    resource: "configuration".to_string(),
                }
                .into())
            }
        }
    }

    Ok(registry)
}

/// Validate every instance against its provider's schema.
pub fn validate_instances(
    registry: &ProviderRegistry,
    instances: &[ResourceInstance],
) -> Result<(), EngineError> {
    for instance in instances {
        let provider = registry.for_instance(instance)?;
        provider
            .validate(instance)
            .map_err(|source| EngineError::Validation {
                resource: instance.id.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Ask for confirmation unless `--auto-approve` was given.
pub fn confirm(prompt: &str, auto_approve: bool) -> Result<bool> {
    if auto_approve {
        return Ok(true);
    }
    Ok(dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

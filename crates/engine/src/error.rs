//! Engine error taxonomy.
//!
//! Errors are categorized so the CLI can map them to exit codes and decide
//! whether a failure happened before any side effect (configuration and
//! validation problems abort a command during bootstrap of the run).

use crate::expr::ExprError;
use crate::provider::ProviderError;
use std::path::PathBuf;
use thiserror::Error;

/// Broad classification used for exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Problems in the configuration document itself.
    Configuration,
    /// Provider registry or remote API failures.
    Provider,
    /// Per-resource schema or execution failures.
    Resource,
}

/// Errors produced by the reconciliation core.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read config file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Decode(#[from] serde_yaml::Error),

    #[error("missing required field `{0}` in configuration")]
    MissingField(&'static str),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error("resource `{resource}`: {message}")]
    InvalidResource { resource: String, message: String },

    #[error("duplicate resource instance id `{0}`")]
    DuplicateInstance(String),

    #[error("dependency `{dependency}` not found for resource `{resource}`")]
    UnknownDependency {
        resource: String,
        dependency: String,
    },

    #[error("circular dependency detected involving resource `{0}`")]
    CircularDependency(String),

    #[error("provider `{provider}` is not available (required by `{resource}`)")]
    UnknownProvider { provider: String, resource: String },

    #[error("invalid module `{module}`: {message}")]
    InvalidModule { module: String, message: String },

    #[error("validation failed for resource `{resource}`: {source}")]
    Validation {
        resource: String,
        source: ProviderError,
    },

    #[error("policy gate failed: {errors} error-severity violation(s)")]
    PolicyGate { errors: usize },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::ReadConfig { .. }
            | EngineError::Decode(_)
            | EngineError::MissingField(_)
            | EngineError::Expr(_)
            | EngineError::InvalidResource { .. }
            | EngineError::DuplicateInstance(_)
            | EngineError::UnknownDependency { .. }
            | EngineError::CircularDependency(_)
            | EngineError::UnknownProvider { .. }
            | EngineError::InvalidModule { .. }
            | EngineError::PolicyGate { .. } => ErrorCategory::Configuration,
            EngineError::Provider(_) => ErrorCategory::Provider,
            EngineError::Validation { .. } => ErrorCategory::Resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let err = EngineError::MissingField("project");
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = EngineError::Provider(ProviderError::Transient("timeout".into()));
        assert_eq!(err.category(), ErrorCategory::Provider);

        let err = EngineError::Validation {
            resource: "aws:s3:bucket.b".into(),
            source: ProviderError::InvalidConfiguration {
                kind: "aws:s3:bucket".into(),
                message: "bucket name is required".into(),
            },
        };
        assert_eq!(err.category(), ErrorCategory::Resource);
    }
}

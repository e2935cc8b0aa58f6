//! Named module references.
//!
//! Modules point at a reusable configuration source. Only local directory
//! sources are supported; remote fetching is a front-end concern.

use crate::error::EngineError;
use crate::model::Properties;
use std::collections::BTreeMap;
use std::path::Path;

/// A loaded module reference.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub source: String,
    pub version: String,
    pub inputs: Properties,
}

impl Module {
    /// Check the reference itself, without touching the filesystem.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.is_empty() {
            return Err(EngineError::InvalidModule {
                module: self.name.clone(),
                message: "module name is required".into(),
            });
        }
        if self.source.is_empty() {
            return Err(EngineError::InvalidModule {
                module: self.name.clone(),
                message: "module source is required".into(),
            });
        }
        Ok(())
    }

    /// Resolve the module source. Local paths must exist and be directories.
    pub fn load(&self) -> Result<(), EngineError> {
        if !(self.source.starts_with("./") || self.source.starts_with('/')) {
            return Err(EngineError::InvalidModule {
                module: self.name.clone(),
                message: format!("unsupported module source: {}", self.source),
            });
        }

        let path = Path::new(&self.source);
        if !path.exists() {
            return Err(EngineError::InvalidModule {
                module: self.name.clone(),
                message: format!("module source path does not exist: {}", self.source),
            });
        }
        if !path.is_dir() {
            return Err(EngineError::InvalidModule {
                module: self.name.clone(),
                message: format!("module source must be a directory: {}", self.source),
            });
        }
        Ok(())
    }
}

/// Registry of loaded modules, keyed by name.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Module>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Module) -> Result<(), EngineError> {
        module.validate()?;
        self.modules.insert(module.name.clone(), module);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, source: &str) -> Module {
        Module {
            name: name.into(),
            source: source.into(),
            version: "1.0.0".into(),
            inputs: Properties::new(),
        }
    }

    #[test]
    fn validation_requires_name_and_source() {
        assert!(module("", "./x").validate().is_err());
        assert!(module("net", "").validate().is_err());
        assert!(module("net", "./x").validate().is_ok());
    }

    #[test]
    fn remote_sources_are_unsupported() {
        let err = module("net", "git::https://example.com/net.git")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("unsupported module source"));
    }

    #[test]
    fn local_directory_loads() {
        let dir = std::env::temp_dir().join("runestone-module-test");
        std::fs::create_dir_all(&dir).unwrap();
        let m = module("net", dir.to_str().unwrap());
        assert!(m.load().is_ok());
    }

    #[test]
    fn missing_local_source_fails() {
        let err = module("net", "/definitely/not/here").load().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn registry_round_trip() {
        let mut registry = ModuleRegistry::new();
        registry.register(module("net", "./net")).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("net").is_some());
        assert!(registry.get("other").is_none());
    }
}

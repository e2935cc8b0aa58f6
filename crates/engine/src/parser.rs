//! Configuration parsing and the document-level expression pass.
//!
//! Parsing decodes the YAML document, checks the required top-level fields,
//! and runs one expression pass with the scope `{user variables, environment,
//! project}`. Provider fields must resolve at this point; resource fields may
//! reference per-iteration variables (`index`, `item`, `region`) and are kept
//! symbolic until expansion.

use crate::error::EngineError;
use crate::expr::{self, Mode, Scope};
use crate::model::{Config, RawConfig, Resource};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Parse a configuration file from disk.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config, EngineError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| EngineError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&text)
}

/// Parse a configuration document from a string.
pub fn parse_str(text: &str) -> Result<Config, EngineError> {
    let raw: RawConfig = serde_yaml::from_str(text)?;

    let project = raw.project.ok_or(EngineError::MissingField("project"))?;
    let environment = raw
        .environment
        .ok_or(EngineError::MissingField("environment"))?;
    let providers = raw.providers.ok_or(EngineError::MissingField("providers"))?;
    let resources = raw.resources.ok_or(EngineError::MissingField("resources"))?;

    let mut config = Config {
        project,
        environment,
        variables: raw.variables,
        providers,
        modules: raw.modules,
        resources,
    };

    process_expressions(&mut config)?;
    Ok(config)
}

/// The document-level variable scope: user variables plus the implicit
/// `environment` and `project` bindings.
pub fn document_scope(config: &Config) -> Scope {
    let mut scope = config.variables.clone();
    scope.insert(
        "environment".to_string(),
        Value::String(config.environment.clone()),
    );
    scope.insert("project".to_string(), Value::String(config.project.clone()));
    scope
}

fn process_expressions(config: &mut Config) -> Result<(), EngineError> {
    let scope = document_scope(config);

    // Provider fields cannot reference iteration variables; they resolve now.
    for provider in config.providers.values_mut() {
        if expr::contains_expression(&provider.region) {
            provider.region = eval_to_string(&provider.region, &scope, Mode::Strict)?;
        }
        if expr::contains_expression(&provider.profile) {
            provider.profile = eval_to_string(&provider.profile, &scope, Mode::Strict)?;
        }
    }

    for module in config.modules.values_mut() {
        let inputs = Value::Object(std::mem::take(&mut module.inputs));
        match expr::evaluate_value(&inputs, &scope, Mode::Defer)? {
            Value::Object(map) => module.inputs = map,
            other => {
                module.inputs = serde_json::Map::new();
                log::warn!("module inputs evaluated to a non-mapping value: {other}");
            }
        }
    }

    for resource in &mut config.resources {
        process_resource(resource, &scope)?;
    }

    Ok(())
}

fn process_resource(resource: &mut Resource, scope: &Scope) -> Result<(), EngineError> {
    if expr::contains_expression(&resource.name) {
        let value = expr::evaluate(&resource.name, scope, Mode::Defer)?;
        resource.name = expr::stringify(&value);
    }

    if let Some(count) = &resource.count {
        if let Value::String(s) = count {
            if expr::contains_expression(s) {
                resource.count = Some(expr::evaluate(s, scope, Mode::Defer)?);
            }
        }
    }

    if let Some(for_each) = &resource.for_each {
        if let Value::String(s) = for_each {
            if expr::contains_expression(s) {
                resource.for_each = Some(expr::evaluate(s, scope, Mode::Defer)?);
            }
        }
    }

    let properties = Value::Object(std::mem::take(&mut resource.properties));
    match expr::evaluate_value(&properties, scope, Mode::Defer)? {
        Value::Object(map) => resource.properties = map,
        _ => unreachable!("object evaluation preserves the mapping shape"),
    }

    for dep in &mut resource.depends_on {
        if expr::contains_expression(dep) {
            *dep = eval_to_string(dep, scope, Mode::Defer)?;
        }
    }

    Ok(())
}

fn eval_to_string(input: &str, scope: &Scope, mode: Mode) -> Result<String, EngineError> {
    let value = expr::evaluate(input, scope, mode)?;
    Ok(expr::stringify(&value))
}

//! Resource expansion.
//!
//! Each declaration yields zero or more concrete instances. `count = N`
//! evaluates the declaration N times with `index` bound to `0..N`; `for_each`
//! evaluates it once per item with `item` bound (and `region` additionally
//! bound for string items, since region lists are the overwhelmingly common
//! case). All remaining expressions must resolve here; an instance never
//! carries an unresolved `${...}`.

use crate::error::EngineError;
use crate::expr::{self, Mode, Scope};
use crate::model::{Config, Resource, ResourceInstance};
use crate::parser::document_scope;
use serde_json::Value;
use std::collections::HashSet;

/// Expand every declaration in the document, in source order.
///
/// Instance IDs must be unique across the whole expanded set.
pub fn expand(config: &Config) -> Result<Vec<ResourceInstance>, EngineError> {
    let scope = document_scope(config);
    let mut instances = Vec::new();
    let mut seen = HashSet::new();

    for resource in &config.resources {
        for instance in expand_resource(resource, &scope)? {
            if !seen.insert(instance.id.clone()) {
                return Err(EngineError::DuplicateInstance(instance.id));
            }
            instances.push(instance);
        }
    }

    Ok(instances)
}

fn expand_resource(
    resource: &Resource,
    scope: &Scope,
) -> Result<Vec<ResourceInstance>, EngineError> {
    if resource.count.is_some() && resource.for_each.is_some() {
        return Err(EngineError::InvalidResource {
            resource: resource.name.clone(),
            message: "`count` and `for_each` are mutually exclusive".into(),
        });
    }

    if let Some(count) = &resource.count {
        let count = resolve_count(resource, count, scope)?;
        let mut instances = Vec::with_capacity(count);
        for index in 0..count {
            let mut iteration = scope.clone();
            iteration.insert("index".to_string(), Value::from(index as i64));
            instances.push(materialize(resource, &iteration)?);
        }
        return Ok(instances);
    }

    if let Some(for_each) = &resource.for_each {
        let items = resolve_for_each(resource, for_each, scope)?;
        let mut instances = Vec::with_capacity(items.len());
        for item in items {
            let mut iteration = scope.clone();
            if let Value::String(s) = &item {
                iteration.insert("region".to_string(), Value::String(s.clone()));
            }
            iteration.insert("item".to_string(), item);
            instances.push(materialize(resource, &iteration)?);
        }
        return Ok(instances);
    }

    Ok(vec![materialize(resource, scope)?])
}

/// Produce one instance with every expression resolved in the given scope.
fn materialize(resource: &Resource, scope: &Scope) -> Result<ResourceInstance, EngineError> {
    let name = if expr::contains_expression(&resource.name) {
        expr::stringify(&expr::evaluate(&resource.name, scope, Mode::Strict)?)
    } else {
        resource.name.clone()
    };

    let properties = match expr::evaluate_value(
        &Value::Object(resource.properties.clone()),
        scope,
        Mode::Strict,
    )? {
        Value::Object(map) => map,
        _ => unreachable!("object evaluation preserves the mapping shape"),
    };

    let mut depends_on = Vec::with_capacity(resource.depends_on.len());
    for dep in &resource.depends_on {
        if expr::contains_expression(dep) {
            let value = expr::evaluate(dep, scope, Mode::Strict)?;
            depends_on.push(expr::stringify(&value));
        } else {
            depends_on.push(dep.clone());
        }
    }

    Ok(ResourceInstance {
        id: format!("{}.{}", resource.kind, name),
        kind: resource.kind.clone(),
        name,
        properties,
        drift_policy: resource.drift_policy,
        depends_on,
    })
}

fn resolve_count(
    resource: &Resource,
    count: &Value,
    scope: &Scope,
) -> Result<usize, EngineError> {
    let resolved = match count {
        Value::Number(_) => count.clone(),
        Value::String(s) => {
            if expr::contains_expression(s) {
                expr::evaluate(s, scope, Mode::Strict)?
            } else if let Ok(n) = s.parse::<i64>() {
                Value::from(n)
            } else {
                // A bare expression without the `${...}` wrapper.
                expr::eval_bare(s, scope)?
            }
        }
        _ => {
            return Err(EngineError::InvalidResource {
                resource: resource.name.clone(),
                message: "`count` must be an integer or expression".into(),
            })
        }
    };

    let n = resolved
        .as_i64()
        .ok_or_else(|| EngineError::InvalidResource {
            resource: resource.name.clone(),
            message: format!("`count` expression must evaluate to an integer, got {resolved}"),
        })?;

    if n < 0 {
        return Err(EngineError::InvalidResource {
            resource: resource.name.clone(),
            message: format!("`count` must be non-negative, got {n}"),
        });
    }

    Ok(n as usize)
}

fn resolve_for_each(
    resource: &Resource,
    for_each: &Value,
    scope: &Scope,
) -> Result<Vec<Value>, EngineError> {
    let resolved = match for_each {
        Value::Array(items) => return Ok(items.clone()),
        Value::String(s) => {
            if expr::contains_expression(s) {
                expr::evaluate(s, scope, Mode::Strict)?
            } else {
                // A plain string is treated as a single-item sequence.
                return Ok(vec![Value::String(s.clone())]);
            }
        }
        _ => {
            return Err(EngineError::InvalidResource {
                resource: resource.name.clone(),
                message: "`for_each` must be a sequence or expression".into(),
            })
        }
    };

    match resolved {
        Value::Array(items) => Ok(items),
        other => Err(EngineError::InvalidResource {
            resource: resource.name.clone(),
            message: format!("`for_each` expression must evaluate to a sequence, got {other}"),
        }),
    }
}

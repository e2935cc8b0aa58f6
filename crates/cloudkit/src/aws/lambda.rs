//! Lambda function glue.

use super::{invalid, optional_str, require_str};
use crate::awscli::AwsCli;
use engine::{Properties, ProviderError, ResourceInstance};
use serde_json::{json, Value};

pub fn validate(instance: &ResourceInstance) -> Result<(), ProviderError> {
    require_str(instance, "runtime")?;
    require_str(instance, "handler")?;
    Ok(())
}

pub fn current_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let Some(config) = cli.run_json_allow_missing(
        &[
            "lambda",
            "get-function-configuration",
            "--function-name",
            &instance.name,
        ],
        "get function configuration",
    )?
    else {
        return Ok(None);
    };

    let mut state = Properties::new();
    if let Some(arn) = config["FunctionArn"].as_str() {
        state.insert("arn".to_string(), json!(arn));
    }
    if let Some(runtime) = config["Runtime"].as_str() {
        state.insert("runtime".to_string(), json!(runtime));
    }
    if let Some(handler) = config["Handler"].as_str() {
        state.insert("handler".to_string(), json!(handler));
    }
    if let Some(role) = config["Role"].as_str() {
        state.insert("role".to_string(), json!(role));
    }
    if let Some(memory) = config["MemorySize"].as_i64() {
        state.insert("memory_size".to_string(), json!(memory));
    }
    if let Some(timeout) = config["Timeout"].as_i64() {
        state.insert("timeout".to_string(), json!(timeout));
    }
    if let Some(status) = config["State"].as_str() {
        state.insert("state".to_string(), json!(status));
    }

    Ok(Some(state))
}

pub fn create(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let runtime = require_str(instance, "runtime")?;
    let handler = require_str(instance, "handler")?;
    let role = optional_str(instance, "role")
        .ok_or_else(|| invalid(instance, "`role` is required to create a function"))?;
    let zip_file = optional_str(instance, "zip_file")
        .ok_or_else(|| invalid(instance, "`zip_file` is required to create a function"))?;

    let code = format!("fileb://{zip_file}");
    let memory = instance
        .properties
        .get("memory_size")
        .and_then(Value::as_i64)
        .map(|m| m.to_string());
    let timeout = instance
        .properties
        .get("timeout")
        .and_then(Value::as_i64)
        .map(|t| t.to_string());

    let mut args = vec![
        "lambda",
        "create-function",
        "--function-name",
        &instance.name,
        "--runtime",
        runtime,
        "--handler",
        handler,
        "--role",
        role,
        "--zip-file",
        &code,
    ];
    if let Some(memory) = &memory {
        args.extend(["--memory-size", memory.as_str()]);
    }
    if let Some(timeout) = &timeout {
        args.extend(["--timeout", timeout.as_str()]);
    }

    cli.run(&args, "create function")?;
    Ok(())
}

pub fn update(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    let runtime = require_str(instance, "runtime")?;
    let handler = require_str(instance, "handler")?;

    let memory = instance
        .properties
        .get("memory_size")
        .and_then(Value::as_i64)
        .filter(|m| current.get("memory_size").and_then(Value::as_i64) != Some(*m))
        .map(|m| m.to_string());
    let timeout = instance
        .properties
        .get("timeout")
        .and_then(Value::as_i64)
        .filter(|t| current.get("timeout").and_then(Value::as_i64) != Some(*t))
        .map(|t| t.to_string());

    let mut args = vec![
        "lambda",
        "update-function-configuration",
        "--function-name",
        &instance.name,
    ];

    let mut changed = false;
    if current.get("runtime").and_then(Value::as_str) != Some(runtime) {
        args.extend(["--runtime", runtime]);
        changed = true;
    }
    if current.get("handler").and_then(Value::as_str) != Some(handler) {
        args.extend(["--handler", handler]);
        changed = true;
    }
    if let Some(memory) = &memory {
        args.extend(["--memory-size", memory.as_str()]);
        changed = true;
    }
    if let Some(timeout) = &timeout {
        args.extend(["--timeout", timeout.as_str()]);
        changed = true;
    }

    if changed {
        cli.run(&args, "update function configuration")?;
    }
    Ok(())
}

pub fn delete(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let deleted = cli.run_allow_missing(
        &[
            "lambda",
            "delete-function",
            "--function-name",
            &instance.name,
        ],
        "delete function",
    )?;
    if deleted.is_none() {
        log::debug!("function {} already absent", instance.name);
    }
    Ok(())
}

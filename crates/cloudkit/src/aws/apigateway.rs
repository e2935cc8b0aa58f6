//! API Gateway REST API glue. APIs have no name-addressed lookup, so state
//! resolution scans the listing for a matching name.

use super::{invalid, optional_str};
use crate::awscli::AwsCli;
use engine::{Properties, ProviderError, ResourceInstance};
use serde_json::{json, Value};

pub fn validate(instance: &ResourceInstance) -> Result<(), ProviderError> {
    if instance.name.is_empty() {
        return Err(invalid(instance, "API Gateway name cannot be empty"));
    }
    Ok(())
}

pub fn current_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let listed = cli.run_json(&["apigateway", "get-rest-apis"], "get rest apis")?;

    let Some(api) = listed["items"].as_array().and_then(|items| {
        items
            .iter()
            .find(|api| api["name"].as_str() == Some(instance.name.as_str()))
    }) else {
        return Ok(None);
    };

    let mut state = Properties::new();
    if let Some(id) = api["id"].as_str() {
        state.insert("id".to_string(), json!(id));
    }
    if let Some(name) = api["name"].as_str() {
        state.insert("name".to_string(), json!(name));
    }
    if let Some(description) = api["description"].as_str() {
        state.insert("description".to_string(), json!(description));
    }

    Ok(Some(state))
}

pub fn create(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let mut args = vec![
        "apigateway",
        "create-rest-api",
        "--name",
        instance.name.as_str(),
    ];
    if let Some(description) = optional_str(instance, "description") {
        args.extend(["--description", description]);
    }
    cli.run(&args, "create rest api")?;
    Ok(())
}

pub fn update(
    _cli: &AwsCli,
    _instance: &ResourceInstance,
    _current: &Properties,
) -> Result<(), ProviderError> {
    // REST API settings are not reconciled in place.
    Ok(())
}

pub fn delete(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let Some(state) = current_state(cli, instance)? else {
        log::debug!("rest api {} already absent", instance.name);
        return Ok(());
    };
    let Some(api_id) = state.get("id").and_then(Value::as_str) else {
        return Ok(());
    };

    let deleted = cli.run_allow_missing(
        &["apigateway", "delete-rest-api", "--rest-api-id", api_id],
        "delete rest api",
    )?;
    if deleted.is_none() {
        log::debug!("rest api {} already absent", instance.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::test_instance;
    use serde_json::json;

    #[test]
    fn validate_only_needs_a_name() {
        let inst = test_instance("aws:apigateway:rest_api", "orders-api", json!({}));
        assert!(validate(&inst).is_ok());

        let inst = test_instance("aws:apigateway:rest_api", "", json!({}));
        assert!(validate(&inst).is_err());
    }
}

//! DynamoDB table glue.

use super::{optional_str, require_str};
use crate::awscli::AwsCli;
use engine::{Properties, ProviderError, ResourceInstance};
use serde_json::{json, Value};

const DEFAULT_BILLING_MODE: &str = "PAY_PER_REQUEST";

pub fn validate(instance: &ResourceInstance) -> Result<(), ProviderError> {
    require_str(instance, "hash_key")?;
    Ok(())
}

pub fn current_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let Some(described) = cli.run_json_allow_missing(
        &["dynamodb", "describe-table", "--table-name", &instance.name],
        "describe table",
    )?
    else {
        return Ok(None);
    };

    let table = &described["Table"];
    let mut state = Properties::new();

    if let Some(arn) = table["TableArn"].as_str() {
        state.insert("arn".to_string(), json!(arn));
    }
    if let Some(status) = table["TableStatus"].as_str() {
        state.insert("status".to_string(), json!(status));
    }

    let hash_key = table["KeySchema"]
        .as_array()
        .and_then(|schema| {
            schema
                .iter()
                .find(|k| k["KeyType"].as_str() == Some("HASH"))
        })
        .and_then(|k| k["AttributeName"].as_str());
    if let Some(hash_key) = hash_key {
        state.insert("hash_key".to_string(), json!(hash_key));
    }

    let billing_mode = table["BillingModeSummary"]["BillingMode"]
        .as_str()
        .unwrap_or("PROVISIONED");
    state.insert("billing_mode".to_string(), json!(billing_mode));

    Ok(Some(state))
}

pub fn create(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let hash_key = require_str(instance, "hash_key")?;
    let billing_mode = optional_str(instance, "billing_mode").unwrap_or(DEFAULT_BILLING_MODE);

    let attribute = format!("AttributeName={hash_key},AttributeType=S");
    let key_schema = format!("AttributeName={hash_key},KeyType=HASH");

    cli.run(
        &[
            "dynamodb",
            "create-table",
            "--table-name",
            &instance.name,
            "--attribute-definitions",
            &attribute,
            "--key-schema",
            &key_schema,
            "--billing-mode",
            billing_mode,
        ],
        "create table",
    )?;
    Ok(())
}

pub fn update(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    if let Some(desired) = optional_str(instance, "billing_mode") {
        let live = current.get("billing_mode").and_then(Value::as_str);
        if live != Some(desired) {
            cli.run(
                &[
                    "dynamodb",
                    "update-table",
                    "--table-name",
                    &instance.name,
                    "--billing-mode",
                    desired,
                ],
                "update table",
            )?;
        }
    }
    // The hash key is immutable; drift there requires replacement, which is
    // out of scope for in-place updates.
    Ok(())
}

pub fn delete(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let deleted = cli.run_allow_missing(
        &["dynamodb", "delete-table", "--table-name", &instance.name],
        "delete table",
    )?;
    if deleted.is_none() {
        log::debug!("table {} already absent", instance.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::test_instance;
    use serde_json::json;

    #[test]
    fn validate_requires_hash_key() {
        let inst = test_instance("aws:dynamodb:table", "events", json!({"hash_key": "pk"}));
        assert!(validate(&inst).is_ok());

        let inst = test_instance("aws:dynamodb:table", "events", json!({}));
        let err = validate(&inst).unwrap_err();
        assert!(err.to_string().contains("hash_key"));
    }
}

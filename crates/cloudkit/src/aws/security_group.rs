//! Security group glue. Groups are addressed by `group-name`; only tags can
//! be reconciled in place.

use super::{decode_ec2_tags, ec2_create_tags, invalid, optional_str, tags_of};
use crate::awscli::AwsCli;
use engine::{Properties, ProviderError, ResourceInstance};
use serde_json::{json, Value};

pub fn validate(instance: &ResourceInstance) -> Result<(), ProviderError> {
    if instance.name.is_empty() {
        return Err(invalid(instance, "security group name cannot be empty"));
    }
    match instance.properties.get("description") {
        Some(Value::String(s)) if !s.is_empty() => Ok(()),
        Some(_) => Err(invalid(instance, "description must be a non-empty string")),
        None => Err(invalid(instance, "description is required for security group")),
    }
}

pub fn current_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let filter = format!("Name=group-name,Values={}", instance.name);
    let described = cli.run_json(
        &["ec2", "describe-security-groups", "--filters", &filter],
        "describe security groups",
    )?;

    let Some(group) = described["SecurityGroups"].as_array().and_then(|g| g.first()) else {
        return Ok(None);
    };

    let mut state = Properties::new();
    if let Some(id) = group["GroupId"].as_str() {
        state.insert("group_id".to_string(), json!(id));
    }
    if let Some(name) = group["GroupName"].as_str() {
        state.insert("group_name".to_string(), json!(name));
    }
    if let Some(description) = group["Description"].as_str() {
        state.insert("description".to_string(), json!(description));
    }
    if let Some(vpc_id) = group["VpcId"].as_str() {
        state.insert("vpc_id".to_string(), json!(vpc_id));
    }
    let tags = decode_ec2_tags(&group["Tags"]);
    if !tags.is_empty() {
        state.insert("tags".to_string(), Value::Object(tags));
    }

    Ok(Some(state))
}

pub fn create(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let description = optional_str(instance, "description")
        .ok_or_else(|| invalid(instance, "description is required for security group"))?;

    let mut args = vec![
        "ec2",
        "create-security-group",
        "--group-name",
        instance.name.as_str(),
        "--description",
        description,
    ];
    if let Some(vpc_id) = optional_str(instance, "vpc_id") {
        args.extend(["--vpc-id", vpc_id]);
    }

    let created = cli.run_json(&args, "create security group")?;
    let group_id = created["GroupId"].as_str().ok_or_else(|| {
        ProviderError::Permanent("create-security-group returned no GroupId".into())
    })?;

    ec2_create_tags(cli, group_id, &tags_of(&instance.properties))
}

pub fn update(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    let desired_tags = tags_of(&instance.properties);
    let live_tags = tags_of(current);
    if !desired_tags.is_empty() && desired_tags != live_tags {
        let group_id = current.get("group_id").and_then(Value::as_str).ok_or_else(|| {
            ProviderError::Permanent(format!(
                "cannot update {}: live state has no group_id",
                instance.id
            ))
        })?;
        ec2_create_tags(cli, group_id, &desired_tags)?;
    }
    Ok(())
}

pub fn delete(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let Some(state) = current_state(cli, instance)? else {
        log::debug!("security group {} already absent", instance.name);
        return Ok(());
    };
    let Some(group_id) = state.get("group_id").and_then(Value::as_str) else {
        return Ok(());
    };

    let deleted = cli.run_allow_missing(
        &["ec2", "delete-security-group", "--group-id", group_id],
        "delete security group",
    )?;
    if deleted.is_none() {
        log::debug!("security group {} already absent", instance.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::test_instance;
    use serde_json::json;

    #[test]
    fn validate_requires_description() {
        let inst = test_instance(
            "aws:ec2:security_group",
            "web-sg",
            json!({"description": "web tier"}),
        );
        assert!(validate(&inst).is_ok());

        let inst = test_instance("aws:ec2:security_group", "web-sg", json!({}));
        assert!(validate(&inst)
            .unwrap_err()
            .to_string()
            .contains("description is required"));

        let inst = test_instance(
            "aws:ec2:security_group",
            "web-sg",
            json!({"description": ""}),
        );
        assert!(validate(&inst)
            .unwrap_err()
            .to_string()
            .contains("non-empty"));
    }
}

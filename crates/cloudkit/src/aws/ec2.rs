//! EC2 instance glue.
//!
//! Instances are addressed by their `Name` tag; terminated instances are
//! treated as absent.

use super::{decode_ec2_tags, ec2_create_tags, invalid, require_str, tag_shorthand, tags_of};
use crate::awscli::AwsCli;
use engine::{Properties, ProviderError, ResourceInstance};
use serde_json::{json, Value};

pub fn validate(instance: &ResourceInstance) -> Result<(), ProviderError> {
    require_str(instance, "instance_type")?;
    require_str(instance, "ami")?;
    if let Some(tags) = instance.properties.get("tags") {
        if !tags.is_object() {
            return Err(invalid(instance, "`tags` must be a mapping"));
        }
    }
    Ok(())
}

pub fn current_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let name_filter = format!("Name=tag:Name,Values={}", instance.name);
    let described = cli.run_json(
        &[
            "ec2",
            "describe-instances",
            "--filters",
            &name_filter,
            "Name=instance-state-name,Values=pending,running,stopping,stopped",
        ],
        "describe instances",
    )?;

    let Some(live) = described["Reservations"]
        .as_array()
        .and_then(|r| r.first())
        .and_then(|r| r["Instances"].as_array())
        .and_then(|i| i.first())
    else {
        return Ok(None);
    };

    let mut state = Properties::new();
    if let Some(instance_type) = live["InstanceType"].as_str() {
        state.insert("instance_type".to_string(), json!(instance_type));
    }
    if let Some(ami) = live["ImageId"].as_str() {
        state.insert("ami".to_string(), json!(ami));
    }
    if let Some(id) = live["InstanceId"].as_str() {
        state.insert("instance_id".to_string(), json!(id));
    }
    if let Some(status) = live["State"]["Name"].as_str() {
        state.insert("state".to_string(), json!(status));
    }
    if let Some(zone) = live["Placement"]["AvailabilityZone"].as_str() {
        state.insert("availability_zone".to_string(), json!(zone));
    }

    let tags = decode_ec2_tags(&live["Tags"]);
    if !tags.is_empty() {
        state.insert("tags".to_string(), Value::Object(tags));
    }

    Ok(Some(state))
}

pub fn create(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let instance_type = require_str(instance, "instance_type")?;
    let ami = require_str(instance, "ami")?;

    let mut tags = tags_of(&instance.properties);
    tags.insert("Name".to_string(), json!(instance.name));
    let tag_spec = format!("ResourceType=instance,Tags={}", tag_shorthand(&tags));

    cli.run(
        &[
            "ec2",
            "run-instances",
            "--image-id",
            ami,
            "--instance-type",
            instance_type,
            "--count",
            "1",
            "--tag-specifications",
            &tag_spec,
        ],
        "run instances",
    )?;
    Ok(())
}

pub fn update(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    let instance_id = current
        .get("instance_id")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::Permanent(format!(
                "cannot update {}: live state has no instance_id",
                instance.id
            ))
        })?;

    let desired_type = require_str(instance, "instance_type")?;
    let live_type = current.get("instance_type").and_then(Value::as_str);
    if live_type != Some(desired_type) {
        let attribute = format!("Value={desired_type}");
        cli.run(
            &[
                "ec2",
                "modify-instance-attribute",
                "--instance-id",
                instance_id,
                "--instance-type",
                &attribute,
            ],
            "modify instance attribute",
        )?;
    }

    let desired_tags = tags_of(&instance.properties);
    let live_tags = tags_of(current);
    if !desired_tags.is_empty() && desired_tags != live_tags {
        ec2_create_tags(cli, instance_id, &desired_tags)?;
    }

    Ok(())
}

pub fn delete(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    // Resolve the live instance id first; an absent instance is a no-op.
    let Some(state) = current_state(cli, instance)? else {
        log::debug!("instance {} already absent", instance.name);
        return Ok(());
    };
    let Some(instance_id) = state.get("instance_id").and_then(Value::as_str) else {
        return Ok(());
    };

    cli.run(
        &["ec2", "terminate-instances", "--instance-ids", instance_id],
        "terminate instances",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::test_instance;
    use serde_json::json;

    #[test]
    fn validate_requires_type_and_ami() {
        let inst = test_instance(
            "aws:ec2:instance",
            "web",
            json!({"instance_type": "t3.micro", "ami": "ami-x"}),
        );
        assert!(validate(&inst).is_ok());

        let inst = test_instance("aws:ec2:instance", "web", json!({"ami": "ami-x"}));
        let err = validate(&inst).unwrap_err();
        assert!(err.to_string().contains("instance_type"));

        let inst = test_instance("aws:ec2:instance", "web", json!({"instance_type": "t3.micro"}));
        let err = validate(&inst).unwrap_err();
        assert!(err.to_string().contains("ami"));
    }

    #[test]
    fn update_without_live_instance_id_is_permanent() {
        let cli = AwsCli::new("us-east-1", None);
        let inst = test_instance(
            "aws:ec2:instance",
            "web",
            json!({"instance_type": "t3.micro", "ami": "ami-x"}),
        );
        let err = update(&cli, &inst, &Properties::new()).unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }
}

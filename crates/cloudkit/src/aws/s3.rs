//! S3 bucket glue.

use super::{invalid, optional_bool, tag_shorthand, tags_of};
use crate::awscli::AwsCli;
use engine::{Properties, ProviderError, ResourceInstance};
use serde_json::{json, Value};

pub fn validate(instance: &ResourceInstance) -> Result<(), ProviderError> {
    if instance.name.is_empty() {
        return Err(invalid(instance, "bucket name is required"));
    }
    if let Some(versioning) = instance.properties.get("versioning") {
        if !versioning.is_boolean() {
            return Err(invalid(instance, "`versioning` must be a boolean"));
        }
    }
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
    let bucket = instance.name.as_str();

    let head = cli.run_allow_missing(
        &["s3api", "head-bucket", "--bucket", bucket],
        "head bucket",
    )?;
    if head.is_none() {
        return Ok(None);
    }

    let mut state = Properties::new();
    state.insert("arn".to_string(), json!(format!("arn:aws:s3:::{bucket}")));

    let versioning = cli.run_json(
        &["s3api", "get-bucket-versioning", "--bucket", bucket],
        "get bucket versioning",
    )?;
    let enabled = versioning["Status"].as_str() == Some("Enabled");
    state.insert("versioning".to_string(), json!(enabled));

    // An untagged bucket reports NoSuchTagSet rather than an empty set.
    match cli.run_json(
        &["s3api", "get-bucket-tagging", "--bucket", bucket],
        "get bucket tagging",
    ) {
        Ok(tagging) => {
            let mut tags = serde_json::Map::new();
            if let Some(tag_set) = tagging["TagSet"].as_array() {
                for tag in tag_set {
                    if let (Some(key), Some(value)) = (tag["Key"].as_str(), tag["Value"].as_str())
                    {
                        tags.insert(key.to_string(), json!(value));
                    }
                }
            }
            if !tags.is_empty() {
                state.insert("tags".to_string(), Value::Object(tags));
            }
        }
        Err(err) if err.to_string().contains("NoSuchTagSet") => {}
        Err(err) => return Err(err),
    }

    Ok(Some(state))
}

pub fn create(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let bucket = instance.name.as_str();

    let constraint;
    let mut args = vec!["s3api", "create-bucket", "--bucket", bucket];
    // us-east-1 rejects an explicit location constraint.
    if !cli.region().is_empty() && cli.region() != "us-east-1" {
        constraint = format!("LocationConstraint={}", cli.region());
        args.extend(["--create-bucket-configuration", constraint.as_str()]);
    }
    cli.run(&args, "create bucket")?;

    if optional_bool(instance, "versioning") == Some(true) {
        set_versioning(cli, bucket, true)?;
    }

    let tags = tags_of(&instance.properties);
    if !tags.is_empty() {
        put_tags(cli, bucket, &tags)?;
    }

    Ok(())
}

pub fn update(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    let bucket = instance.name.as_str();

    if let Some(desired) = optional_bool(instance, "versioning") {
        let live = current.get("versioning").and_then(Value::as_bool);
        if live != Some(desired) {
            set_versioning(cli, bucket, desired)?;
        }
    }

    let desired_tags = tags_of(&instance.properties);
    let live_tags = tags_of(current);
    if !desired_tags.is_empty() && desired_tags != live_tags {
        put_tags(cli, bucket, &desired_tags)?;
    }

    Ok(())
}

pub fn delete(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let deleted = cli.run_allow_missing(
        &["s3api", "delete-bucket", "--bucket", &instance.name],
        "delete bucket",
    )?;
    if deleted.is_none() {
        log::debug!("bucket {} already absent", instance.name);
    }
    Ok(())
}

fn set_versioning(cli: &AwsCli, bucket: &str, enabled: bool) -> Result<(), ProviderError> {
    let status = if enabled {
        "Status=Enabled"
    } else {
        "Status=Suspended"
    };
    cli.run(
        &[
            "s3api",
            "put-bucket-versioning",
            "--bucket",
            bucket,
            "--versioning-configuration",
            status,
        ],
        "put bucket versioning",
    )?;
    Ok(())
}

fn put_tags(
    cli: &AwsCli,
    bucket: &str,
    tags: &serde_json::Map<String, Value>,
) -> Result<(), ProviderError> {
    let tagging = format!("TagSet={}", tag_shorthand(tags));
    cli.run(
        &[
            "s3api",
            "put-bucket-tagging",
            "--bucket",
            bucket,
            "--tagging",
            &tagging,
        ],
        "put bucket tagging",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::test_instance;
    use serde_json::json;

    #[test]
    fn validate_accepts_typical_bucket() {
        let inst = test_instance(
            "aws:s3:bucket",
            "logs",
            json!({"versioning": true, "tags": {"Environment": "prod"}}),
        );
        assert!(validate(&inst).is_ok());
    }

    #[test]
    fn validate_rejects_non_boolean_versioning() {
        let inst = test_instance("aws:s3:bucket", "logs", json!({"versioning": "yes"}));
        let err = validate(&inst).unwrap_err();
        assert!(err.to_string().contains("versioning"));
    }

    #[test]
    fn validate_rejects_non_mapping_tags() {
        let inst = test_instance("aws:s3:bucket", "logs", json!({"tags": ["a", "b"]}));
        assert!(validate(&inst).is_err());
    }
}

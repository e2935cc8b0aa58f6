//! AWS provider: per-kind validation schemas and CLI-backed CRUD.

mod apigateway;
mod dynamodb;
mod ec2;
mod iam;
mod lambda;
mod rds;
mod s3;
mod security_group;
mod vpc;

use crate::awscli::AwsCli;
use crate::retry::{with_retry, RetryConfig};
use engine::{CancelToken, Properties, Provider, ProviderError, ResourceInstance};
use serde_json::Value;

/// Kinds this provider owns.
pub const SUPPORTED_KINDS: [&str; 13] = [
    "aws:s3:bucket",
    "aws:ec2:instance",
    "aws:ec2:vpc",
    "aws:ec2:subnet",
    "aws:ec2:internet_gateway",
    "aws:ec2:security_group",
    "aws:dynamodb:table",
    "aws:iam:user",
    "aws:iam:role",
    "aws:iam:policy",
    "aws:lambda:function",
    "aws:rds:instance",
    "aws:apigateway:rest_api",
];

pub struct AwsProvider {
    cli: AwsCli,
    retry: RetryConfig,
}

impl AwsProvider {
    pub fn new(region: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            cli: AwsCli::new(region, profile),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn unsupported(instance: &ResourceInstance) -> ProviderError {
        ProviderError::UnsupportedKind(instance.kind.clone())
    }
}

impl Provider for AwsProvider {
    fn supported_kinds(&self) -> Vec<&'static str> {
        SUPPORTED_KINDS.to_vec()
    }

    fn validate(&self, instance: &ResourceInstance) -> Result<(), ProviderError> {
        match instance.kind.as_str() {
            "aws:s3:bucket" => s3::validate(instance),
            "aws:ec2:instance" => ec2::validate(instance),
            "aws:ec2:vpc" => vpc::validate_vpc(instance),
            "aws:ec2:subnet" => vpc::validate_subnet(instance),
            "aws:ec2:internet_gateway" => vpc::validate_internet_gateway(instance),
            "aws:ec2:security_group" => security_group::validate(instance),
            "aws:dynamodb:table" => dynamodb::validate(instance),
            "aws:iam:user" => iam::validate_user(instance),
            "aws:iam:role" => iam::validate_role(instance),
            "aws:iam:policy" => iam::validate_policy(instance),
            "aws:lambda:function" => lambda::validate(instance),
            "aws:rds:instance" => rds::validate(instance),
            "aws:apigateway:rest_api" => apigateway::validate(instance),
            _ => Err(Self::unsupported(instance)),
        }
    }

    fn current_state(
        &self,
        instance: &ResourceInstance,
        cancel: &CancelToken,
    ) -> Result<Option<Properties>, ProviderError> {
        with_retry(&self.retry, cancel, || match instance.kind.as_str() {
            "aws:s3:bucket" => s3::current_state(&self.cli, instance),
            "aws:ec2:instance" => ec2::current_state(&self.cli, instance),
            "aws:ec2:vpc" => vpc::vpc_state(&self.cli, instance),
            "aws:ec2:subnet" => vpc::subnet_state(&self.cli, instance),
            "aws:ec2:internet_gateway" => vpc::internet_gateway_state(&self.cli, instance),
            "aws:ec2:security_group" => security_group::current_state(&self.cli, instance),
            "aws:dynamodb:table" => dynamodb::current_state(&self.cli, instance),
            "aws:iam:user" => iam::user_state(&self.cli, instance),
            "aws:iam:role" => iam::role_state(&self.cli, instance),
            "aws:iam:policy" => iam::policy_state(&self.cli, instance),
            "aws:lambda:function" => lambda::current_state(&self.cli, instance),
            "aws:rds:instance" => rds::current_state(&self.cli, instance),
            "aws:apigateway:rest_api" => apigateway::current_state(&self.cli, instance),
            _ => Err(Self::unsupported(instance)),
        })
    }

    fn create(
        &self,
        instance: &ResourceInstance,
        cancel: &CancelToken,
    ) -> Result<(), ProviderError> {
        with_retry(&self.retry, cancel, || match instance.kind.as_str() {
            "aws:s3:bucket" => s3::create(&self.cli, instance),
            "aws:ec2:instance" => ec2::create(&self.cli, instance),
            "aws:ec2:vpc" => vpc::create_vpc(&self.cli, instance),
            "aws:ec2:subnet" => vpc::create_subnet(&self.cli, instance),
            "aws:ec2:internet_gateway" => vpc::create_internet_gateway(&self.cli, instance),
            "aws:ec2:security_group" => security_group::create(&self.cli, instance),
            "aws:dynamodb:table" => dynamodb::create(&self.cli, instance),
            "aws:iam:user" => iam::create_user(&self.cli, instance),
            "aws:iam:role" => iam::create_role(&self.cli, instance),
            "aws:iam:policy" => iam::create_policy(&self.cli, instance),
            "aws:lambda:function" => lambda::create(&self.cli, instance),
            "aws:rds:instance" => rds::create(&self.cli, instance),
            "aws:apigateway:rest_api" => apigateway::create(&self.cli, instance),
            _ => Err(Self::unsupported(instance)),
        })
    }

    fn update(
        &self,
        instance: &ResourceInstance,
        current: &Properties,
        cancel: &CancelToken,
    ) -> Result<(), ProviderError> {
        with_retry(&self.retry, cancel, || match instance.kind.as_str() {
            "aws:s3:bucket" => s3::update(&self.cli, instance, current),
            "aws:ec2:instance" => ec2::update(&self.cli, instance, current),
            "aws:ec2:vpc" => vpc::update_vpc(&self.cli, instance, current),
            "aws:ec2:subnet" => vpc::update_subnet(&self.cli, instance, current),
            "aws:ec2:internet_gateway" => {
                vpc::update_internet_gateway(&self.cli, instance, current)
            }
            "aws:ec2:security_group" => security_group::update(&self.cli, instance, current),
            "aws:dynamodb:table" => dynamodb::update(&self.cli, instance, current),
            "aws:iam:user" => iam::update_user(&self.cli, instance, current),
            "aws:iam:role" => iam::update_role(&self.cli, instance, current),
            "aws:iam:policy" => iam::update_policy(&self.cli, instance, current),
            "aws:lambda:function" => lambda::update(&self.cli, instance, current),
            "aws:rds:instance" => rds::update(&self.cli, instance, current),
            "aws:apigateway:rest_api" => apigateway::update(&self.cli, instance, current),
            _ => Err(Self::unsupported(instance)),
        })
    }

    fn delete(
        &self,
        instance: &ResourceInstance,
        cancel: &CancelToken,
    ) -> Result<(), ProviderError> {
        with_retry(&self.retry, cancel, || match instance.kind.as_str() {
            "aws:s3:bucket" => s3::delete(&self.cli, instance),
            "aws:ec2:instance" => ec2::delete(&self.cli, instance),
            "aws:ec2:vpc" => vpc::delete_vpc(&self.cli, instance),
            "aws:ec2:subnet" => vpc::delete_subnet(&self.cli, instance),
            "aws:ec2:internet_gateway" => vpc::delete_internet_gateway(&self.cli, instance),
            "aws:ec2:security_group" => security_group::delete(&self.cli, instance),
            "aws:dynamodb:table" => dynamodb::delete(&self.cli, instance),
            "aws:iam:user" => iam::delete_user(&self.cli, instance),
            "aws:iam:role" => iam::delete_role(&self.cli, instance),
            "aws:iam:policy" => iam::delete_policy(&self.cli, instance),
            "aws:lambda:function" => lambda::delete(&self.cli, instance),
            "aws:rds:instance" => rds::delete(&self.cli, instance),
            "aws:apigateway:rest_api" => apigateway::delete(&self.cli, instance),
            _ => Err(Self::unsupported(instance)),
        })
    }
}

// ---------------------------------------------------------------------------
// Property access helpers shared by the service modules
// ---------------------------------------------------------------------------

pub(crate) fn invalid(instance: &ResourceInstance, message: impl Into<String>) -> ProviderError {
    ProviderError::InvalidConfiguration {
        kind: instance.kind.clone(),
        message: message.into(),
    }
}

/// A required string property; anything else is a schema violation.
pub(crate) fn require_str<'a>(
    instance: &'a ResourceInstance,
    key: &str,
) -> Result<&'a str, ProviderError> {
    match instance.properties.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(_) => Err(invalid(instance, format!("`{key}` must be a string"))),
        None => Err(invalid(instance, format!("`{key}` is required"))),
    }
}

pub(crate) fn optional_str<'a>(instance: &'a ResourceInstance, key: &str) -> Option<&'a str> {
    instance.properties.get(key).and_then(Value::as_str)
}

pub(crate) fn optional_bool(instance: &ResourceInstance, key: &str) -> Option<bool> {
    instance.properties.get(key).and_then(Value::as_bool)
}

pub(crate) fn tags_of(properties: &Properties) -> serde_json::Map<String, Value> {
    match properties.get("tags") {
        Some(Value::Object(tags)) => tags.clone(),
        _ => serde_json::Map::new(),
    }
}

/// Render tags in the CLI's `Key=...,Value=...` shorthand list form.
pub(crate) fn tag_shorthand(tags: &serde_json::Map<String, Value>) -> String {
    let rendered: Vec<String> = tags
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{{Key={key},Value={value}}}")
        })
        .collect();
    format!("[{}]", rendered.join(","))
}

/// Decode an EC2 `Tags` list into a map, dropping the addressing `Name` tag.
pub(crate) fn decode_ec2_tags(list: &Value) -> serde_json::Map<String, Value> {
    let mut tags = serde_json::Map::new();
    if let Some(items) = list.as_array() {
        for tag in items {
            if let (Some(key), Some(value)) = (tag["Key"].as_str(), tag["Value"].as_str()) {
                if key != "Name" {
                    tags.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
        }
    }
    tags
}

/// Apply tags to an EC2-family resource id via `create-tags`.
pub(crate) fn ec2_create_tags(
    cli: &AwsCli,
    resource_id: &str,
    tags: &serde_json::Map<String, Value>,
) -> Result<(), ProviderError> {
    if tags.is_empty() {
        return Ok(());
    }
    let rendered = tag_shorthand(tags);
    let tags_arg = rendered
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    cli.run(
        &[
            "ec2",
            "create-tags",
            "--resources",
            resource_id,
            "--tags",
            &tags_arg,
        ],
        "create tags",
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_instance(kind: &str, name: &str, properties: Value) -> ResourceInstance {
    let properties = match properties {
        Value::Object(map) => map,
        other => panic!("expected an object literal, got {other}"),
    };
    ResourceInstance {
        id: format!("{kind}.{name}"),
        kind: kind.to_string(),
        name: name.to_string(),
        properties,
        drift_policy: None,
        depends_on: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_dispatches_by_kind() {
        let provider = AwsProvider::new("us-east-1", None);

        let bucket = test_instance("aws:s3:bucket", "logs", json!({"versioning": true}));
        assert!(provider.validate(&bucket).is_ok());

        let vpc = test_instance("aws:ec2:vpc", "main", json!({"cidr_block": "10.0.0.0/16"}));
        assert!(provider.validate(&vpc).is_ok());

        let user = test_instance("aws:iam:user", "deployer", json!({}));
        assert!(provider.validate(&user).is_ok());

        let unknown = test_instance("aws:sqs:queue", "q", json!({}));
        let err = provider.validate(&unknown).unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedKind(_)));
    }

    #[test]
    fn supported_kinds_cover_the_registry() {
        let provider = AwsProvider::new("us-east-1", None);
        let kinds = provider.supported_kinds();
        assert_eq!(kinds.len(), SUPPORTED_KINDS.len());
        for kind in [
            "aws:ec2:instance",
            "aws:ec2:vpc",
            "aws:ec2:subnet",
            "aws:ec2:internet_gateway",
            "aws:ec2:security_group",
            "aws:iam:user",
            "aws:iam:policy",
            "aws:rds:instance",
            "aws:apigateway:rest_api",
        ] {
            assert!(kinds.contains(&kind), "missing {kind}");
        }
    }

    #[test]
    fn tag_shorthand_formatting() {
        let mut tags = serde_json::Map::new();
        tags.insert("Environment".to_string(), json!("prod"));
        tags.insert("Team".to_string(), json!("platform"));
        assert_eq!(
            tag_shorthand(&tags),
            "[{Key=Environment,Value=prod},{Key=Team,Value=platform}]"
        );
    }

    #[test]
    fn decode_ec2_tags_drops_the_name_tag() {
        let list = json!([
            {"Key": "Name", "Value": "web-0"},
            {"Key": "Environment", "Value": "prod"}
        ]);
        let tags = decode_ec2_tags(&list);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["Environment"], json!("prod"));
    }

    #[test]
    fn require_str_rejects_wrong_types() {
        let inst = test_instance("aws:ec2:instance", "web", json!({"instance_type": 5}));
        let err = require_str(&inst, "instance_type").unwrap_err();
        assert!(err.to_string().contains("must be a string"));

        let err = require_str(&inst, "ami").unwrap_err();
        assert!(err.to_string().contains("required"));
    }
}

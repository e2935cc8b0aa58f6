//! IAM user, role, and policy glue.
//!
//! IAM names share one character set and the same path rules; policies are
//! addressed by an ARN built from the caller's account id.

use super::{invalid, optional_str, tags_of};
use crate::awscli::AwsCli;
use engine::{Properties, ProviderError, ResourceInstance};
use serde_json::{json, Value};

/// AWS IAM name character set: alphanumerics plus `+=,.@-_`.
fn valid_iam_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+=,.@-_".contains(c))
}

fn validate_name(instance: &ResourceInstance, max_len: usize) -> Result<(), ProviderError> {
    if instance.name.is_empty() {
        return Err(invalid(instance, "name cannot be empty"));
    }
    if !valid_iam_name(&instance.name) {
        return Err(invalid(
            instance,
            format!(
                "invalid name '{}': must contain only alphanumeric characters and +=,.@-",
                instance.name
            ),
        ));
    }
    if instance.name.len() > max_len {
        return Err(invalid(
            instance,
            format!("name '{}' is too long (max {max_len} characters)", instance.name),
        ));
    }
    Ok(())
}

fn validate_path(instance: &ResourceInstance) -> Result<(), ProviderError> {
    if let Some(path) = optional_str(instance, "path") {
        if !path.starts_with('/') {
            return Err(invalid(instance, "path must start with /"));
        }
        if !path.ends_with('/') {
            return Err(invalid(instance, "path must end with /"));
        }
        if path.len() > 512 {
            return Err(invalid(instance, "path is too long (max 512 characters)"));
        }
    }
    Ok(())
}

/// A policy document property: a JSON string or an inline mapping.
fn validate_document(
    instance: &ResourceInstance,
    key: &str,
) -> Result<(), ProviderError> {
    match instance.properties.get(key) {
        Some(Value::String(s)) if !s.is_empty() => {
            serde_json::from_str::<Value>(s)
                .map_err(|e| invalid(instance, format!("invalid {key} JSON: {e}")))?;
            Ok(())
        }
        Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(invalid(
            instance,
            format!("`{key}` must be a policy document (JSON string or mapping)"),
        )),
        None => Err(invalid(instance, format!("`{key}` is required"))),
    }
}

fn document(instance: &ResourceInstance, key: &str) -> Result<String, ProviderError> {
    match instance.properties.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Object(map)) => Ok(Value::Object(map.clone()).to_string()),
        _ => Err(invalid(instance, format!("`{key}` is required"))),
    }
}

/// IAM tags in the CLI's `Key=...,Value=...` shorthand, one arg per tag.
fn tag_args(tags: &serde_json::Map<String, Value>) -> Vec<String> {
    tags.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("Key={key},Value={value}")
        })
        .collect()
}

fn decode_tag_list(list: &Value) -> serde_json::Map<String, Value> {
    let mut tags = serde_json::Map::new();
    if let Some(items) = list.as_array() {
        for tag in items {
            if let (Some(key), Some(value)) = (tag["Key"].as_str(), tag["Value"].as_str()) {
                tags.insert(key.to_string(), json!(value));
            }
        }
    }
    tags
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

pub fn validate_role(instance: &ResourceInstance) -> Result<(), ProviderError> {
    validate_name(instance, 64)?;
    validate_document(instance, "assume_role_policy")?;
    validate_path(instance)
}

pub fn role_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let Some(described) = cli.run_json_allow_missing(
        &["iam", "get-role", "--role-name", &instance.name],
        "get role",
    )?
    else {
        return Ok(None);
    };

    let role = &described["Role"];
    let mut state = Properties::new();

    if let Some(arn) = role["Arn"].as_str() {
        state.insert("arn".to_string(), json!(arn));
    }
    if let Some(path) = role["Path"].as_str() {
        state.insert("path".to_string(), json!(path));
    }
    if !role["AssumeRolePolicyDocument"].is_null() {
        state.insert(
            "assume_role_policy".to_string(),
            role["AssumeRolePolicyDocument"].clone(),
        );
    }

    Ok(Some(state))
}

pub fn create_role(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let doc = document(instance, "assume_role_policy")?;
    let mut args = vec![
        "iam",
        "create-role",
        "--role-name",
        &instance.name,
        "--assume-role-policy-document",
        &doc,
    ];
    if let Some(path) = optional_str(instance, "path") {
        args.extend(["--path", path]);
    }
    cli.run(&args, "create role")?;
    Ok(())
}

pub fn update_role(
    cli: &AwsCli,
    instance: &ResourceInstance,
    _current: &Properties,
) -> Result<(), ProviderError> {
    let doc = document(instance, "assume_role_policy")?;
    cli.run(
        &[
            "iam",
            "update-assume-role-policy",
            "--role-name",
            &instance.name,
            "--policy-document",
            &doc,
        ],
        "update assume role policy",
    )?;
    Ok(())
}

pub fn delete_role(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let deleted = cli.run_allow_missing(
        &["iam", "delete-role", "--role-name", &instance.name],
        "delete role",
    )?;
    if deleted.is_none() {
        log::debug!("role {} already absent", instance.name);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub fn validate_user(instance: &ResourceInstance) -> Result<(), ProviderError> {
    validate_name(instance, 64)?;
    validate_path(instance)
}

pub fn user_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let Some(described) = cli.run_json_allow_missing(
        &["iam", "get-user", "--user-name", &instance.name],
        "get user",
    )?
    else {
        return Ok(None);
    };

    let user = &described["User"];
    let mut state = Properties::new();

    if let Some(name) = user["UserName"].as_str() {
        state.insert("user_name".to_string(), json!(name));
    }
    if let Some(path) = user["Path"].as_str() {
        state.insert("path".to_string(), json!(path));
    }
    if let Some(id) = user["UserId"].as_str() {
        state.insert("id".to_string(), json!(id));
    }
    if let Some(arn) = user["Arn"].as_str() {
        state.insert("arn".to_string(), json!(arn));
    }
    if let Some(created) = user["CreateDate"].as_str() {
        state.insert("creation_date".to_string(), json!(created));
    }

    let listed = cli.run_json(
        &["iam", "list-user-tags", "--user-name", &instance.name],
        "list user tags",
    )?;
    let tags = decode_tag_list(&listed["Tags"]);
    if !tags.is_empty() {
        state.insert("tags".to_string(), Value::Object(tags));
    }

    Ok(Some(state))
}

pub fn create_user(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let mut args = vec!["iam", "create-user", "--user-name", instance.name.as_str()];
    if let Some(path) = optional_str(instance, "path") {
        args.extend(["--path", path]);
    }
    cli.run(&args, "create user")?;

    let tags = tags_of(&instance.properties);
    if !tags.is_empty() {
        tag_user(cli, &instance.name, &tags)?;
    }
    Ok(())
}

pub fn update_user(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    let desired_tags = tags_of(&instance.properties);
    let live_tags = tags_of(current);
    if !desired_tags.is_empty() && desired_tags != live_tags {
        tag_user(cli, &instance.name, &desired_tags)?;
    }
    Ok(())
}

pub fn delete_user(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let deleted = cli.run_allow_missing(
        &["iam", "delete-user", "--user-name", &instance.name],
        "delete user",
    )?;
    if deleted.is_none() {
        log::debug!("user {} already absent", instance.name);
    }
    Ok(())
}

fn tag_user(
    cli: &AwsCli,
    user: &str,
    tags: &serde_json::Map<String, Value>,
) -> Result<(), ProviderError> {
    let rendered = tag_args(tags);
    let mut args = vec!["iam", "tag-user", "--user-name", user, "--tags"];
    args.extend(rendered.iter().map(String::as_str));
    cli.run(&args, "tag user")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

pub fn validate_policy(instance: &ResourceInstance) -> Result<(), ProviderError> {
    validate_name(instance, 128)?;
    validate_document(instance, "policy")?;
    validate_path(instance)
}

/// Customer-managed policies are addressed by an ARN built from the account
/// id, the (defaulted) path, and the policy name.
fn policy_arn(cli: &AwsCli, instance: &ResourceInstance) -> Result<String, ProviderError> {
    let identity = cli.run_json(
        &["sts", "get-caller-identity"],
        "get caller identity",
    )?;
    let account = identity["Account"]
        .as_str()
        .ok_or_else(|| ProviderError::Permanent("caller identity has no account id".into()))?;
    let path = optional_str(instance, "path").unwrap_or("/");
    Ok(format!("arn:aws:iam::{account}:policy{path}{}", instance.name))
}

pub fn policy_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let arn = policy_arn(cli, instance)?;

    let Some(described) =
        cli.run_json_allow_missing(&["iam", "get-policy", "--policy-arn", &arn], "get policy")?
    else {
        return Ok(None);
    };

    let policy = &described["Policy"];
    let mut state = Properties::new();

    if let Some(name) = policy["PolicyName"].as_str() {
        state.insert("policy_name".to_string(), json!(name));
    }
    if let Some(path) = policy["Path"].as_str() {
        state.insert("path".to_string(), json!(path));
    }
    if let Some(id) = policy["PolicyId"].as_str() {
        state.insert("id".to_string(), json!(id));
    }
    if let Some(arn) = policy["Arn"].as_str() {
        state.insert("arn".to_string(), json!(arn));
    }
    if let Some(created) = policy["CreateDate"].as_str() {
        state.insert("creation_date".to_string(), json!(created));
    }
    if let Some(description) = policy["Description"].as_str() {
        state.insert("description".to_string(), json!(description));
    }

    // The document lives on the default policy version.
    if let Some(version) = policy["DefaultVersionId"].as_str() {
        let versioned = cli.run_json(
            &[
                "iam",
                "get-policy-version",
                "--policy-arn",
                &arn,
                "--version-id",
                version,
            ],
            "get policy version",
        )?;
        let doc = &versioned["PolicyVersion"]["Document"];
        if !doc.is_null() {
            state.insert("policy".to_string(), doc.clone());
        }
    }

    let listed = cli.run_json(
        &["iam", "list-policy-tags", "--policy-arn", &arn],
        "list policy tags",
    )?;
    let tags = decode_tag_list(&listed["Tags"]);
    if !tags.is_empty() {
        state.insert("tags".to_string(), Value::Object(tags));
    }

    Ok(Some(state))
}

pub fn create_policy(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let doc = document(instance, "policy")?;
    let mut args = vec![
        "iam",
        "create-policy",
        "--policy-name",
        &instance.name,
        "--policy-document",
        &doc,
    ];
    if let Some(path) = optional_str(instance, "path") {
        args.extend(["--path", path]);
    }
    if let Some(description) = optional_str(instance, "description") {
        args.extend(["--description", description]);
    }
    cli.run(&args, "create policy")?;
    Ok(())
}

pub fn update_policy(
    cli: &AwsCli,
    instance: &ResourceInstance,
    _current: &Properties,
) -> Result<(), ProviderError> {
    let arn = policy_arn(cli, instance)?;
    let doc = document(instance, "policy")?;
    cli.run(
        &[
            "iam",
            "create-policy-version",
            "--policy-arn",
            &arn,
            "--policy-document",
            &doc,
            "--set-as-default",
        ],
        "create policy version",
    )?;
    Ok(())
}

pub fn delete_policy(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let arn = policy_arn(cli, instance)?;
    let deleted = cli.run_allow_missing(
        &["iam", "delete-policy", "--policy-arn", &arn],
        "delete policy",
    )?;
    if deleted.is_none() {
        log::debug!("policy {} already absent", instance.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::test_instance;
    use serde_json::json;

    #[test]
    fn validate_role_accepts_string_or_mapping_policy() {
        let inst = test_instance(
            "aws:iam:role",
            "app",
            json!({"assume_role_policy": "{\"Version\": \"2012-10-17\"}"}),
        );
        assert!(validate_role(&inst).is_ok());

        let inst = test_instance(
            "aws:iam:role",
            "app",
            json!({"assume_role_policy": {"Version": "2012-10-17"}}),
        );
        assert!(validate_role(&inst).is_ok());
    }

    #[test]
    fn validate_role_rejects_missing_or_malformed_policy() {
        let inst = test_instance("aws:iam:role", "app", json!({}));
        assert!(validate_role(&inst).is_err());

        let inst = test_instance("aws:iam:role", "app", json!({"assume_role_policy": 5}));
        assert!(validate_role(&inst).is_err());

        let inst = test_instance(
            "aws:iam:role",
            "app",
            json!({"assume_role_policy": "not json at all"}),
        );
        assert!(validate_role(&inst)
            .unwrap_err()
            .to_string()
            .contains("JSON"));
    }

    #[test]
    fn iam_names_are_checked_for_charset_and_length() {
        let inst = test_instance(
            "aws:iam:user",
            "app/bad",
            json!({}),
        );
        assert!(validate_user(&inst).unwrap_err().to_string().contains("invalid name"));

        let long = "x".repeat(65);
        let inst = test_instance("aws:iam:user", &long, json!({}));
        assert!(validate_user(&inst).unwrap_err().to_string().contains("too long"));

        let inst = test_instance("aws:iam:user", "ci-deploy@prod", json!({}));
        assert!(validate_user(&inst).is_ok());
    }

    #[test]
    fn paths_must_be_slash_delimited() {
        let inst = test_instance("aws:iam:user", "app", json!({"path": "teams/"}));
        assert!(validate_user(&inst).unwrap_err().to_string().contains("start with /"));

        let inst = test_instance("aws:iam:user", "app", json!({"path": "/teams"}));
        assert!(validate_user(&inst).unwrap_err().to_string().contains("end with /"));

        let inst = test_instance("aws:iam:user", "app", json!({"path": "/teams/"}));
        assert!(validate_user(&inst).is_ok());
    }

    #[test]
    fn validate_policy_requires_document() {
        let inst = test_instance("aws:iam:policy", "readonly", json!({}));
        assert!(validate_policy(&inst)
            .unwrap_err()
            .to_string()
            .contains("policy"));

        let inst = test_instance(
            "aws:iam:policy",
            "readonly",
            json!({"policy": {"Version": "2012-10-17", "Statement": []}}),
        );
        assert!(validate_policy(&inst).is_ok());
    }

    #[test]
    fn mapping_policy_serialises_to_json() {
        let inst = test_instance(
            "aws:iam:role",
            "app",
            json!({"assume_role_policy": {"Version": "2012-10-17"}}),
        );
        let doc = document(&inst, "assume_role_policy").unwrap();
        assert_eq!(doc, r#"{"Version":"2012-10-17"}"#);
    }

    #[test]
    fn tag_args_render_shorthand() {
        let mut tags = serde_json::Map::new();
        tags.insert("Environment".to_string(), json!("prod"));
        assert_eq!(tag_args(&tags), vec!["Key=Environment,Value=prod"]);
    }
}

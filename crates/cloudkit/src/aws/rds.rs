//! RDS instance glue.

use super::{invalid, optional_str, require_str, tags_of};
use crate::awscli::AwsCli;
use engine::{Properties, ProviderError, ResourceInstance};
use serde_json::{json, Value};

const VALID_ENGINES: [&str; 9] = [
    "mysql",
    "postgres",
    "mariadb",
    "oracle-ee",
    "oracle-se2",
    "sqlserver-ex",
    "sqlserver-web",
    "sqlserver-se",
    "sqlserver-ee",
];

const DEFAULT_ALLOCATED_STORAGE: i64 = 20;

pub fn validate(instance: &ResourceInstance) -> Result<(), ProviderError> {
    if instance.name.is_empty() {
        return Err(invalid(instance, "RDS instance name cannot be empty"));
    }
    require_str(instance, "db_instance_class")?;
    let engine = require_str(instance, "engine")?;
    require_str(instance, "master_username")?;
    require_str(instance, "master_user_password")?;

    if !VALID_ENGINES.contains(&engine) {
        return Err(invalid(instance, format!("invalid engine type: {engine}")));
    }
    Ok(())
}

pub fn current_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let Some(described) = cli.run_json_allow_missing(
        &[
            "rds",
            "describe-db-instances",
            "--db-instance-identifier",
            &instance.name,
        ],
        "describe db instances",
    )?
    else {
        return Ok(None);
    };

    let Some(db) = described["DBInstances"].as_array().and_then(|d| d.first()) else {
        return Ok(None);
    };

    let mut state = Properties::new();
    if let Some(class) = db["DBInstanceClass"].as_str() {
        state.insert("db_instance_class".to_string(), json!(class));
    }
    if let Some(engine) = db["Engine"].as_str() {
        state.insert("engine".to_string(), json!(engine));
    }
    if let Some(version) = db["EngineVersion"].as_str() {
        state.insert("engine_version".to_string(), json!(version));
    }
    if let Some(status) = db["DBInstanceStatus"].as_str() {
        state.insert("status".to_string(), json!(status));
    }
    if let Some(storage) = db["AllocatedStorage"].as_i64() {
        state.insert("allocated_storage".to_string(), json!(storage));
    }
    if let Some(user) = db["MasterUsername"].as_str() {
        state.insert("master_username".to_string(), json!(user));
    }
    if let Some(db_name) = db["DBName"].as_str() {
        state.insert("db_name".to_string(), json!(db_name));
    }
    if let Some(retention) = db["BackupRetentionPeriod"].as_i64() {
        state.insert("backup_retention_period".to_string(), json!(retention));
    }

    let mut tags = serde_json::Map::new();
    if let Some(tag_list) = db["TagList"].as_array() {
        for tag in tag_list {
            if let (Some(key), Some(value)) = (tag["Key"].as_str(), tag["Value"].as_str()) {
                tags.insert(key.to_string(), json!(value));
            }
        }
    }
    if !tags.is_empty() {
        state.insert("tags".to_string(), Value::Object(tags));
    }

    Ok(Some(state))
}

pub fn create(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let class = require_str(instance, "db_instance_class")?;
    let engine = require_str(instance, "engine")?;
    let username = require_str(instance, "master_username")?;
    let password = require_str(instance, "master_user_password")?;

    let storage = instance
        .properties
        .get("allocated_storage")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_ALLOCATED_STORAGE)
        .to_string();
    let retention = instance
        .properties
        .get("backup_retention_period")
        .and_then(Value::as_i64)
        .map(|r| r.to_string());
    let tag_args: Vec<String> = tags_of(&instance.properties)
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("Key={key},Value={value}")
        })
        .collect();

    let mut args = vec![
        "rds",
        "create-db-instance",
        "--db-instance-identifier",
        instance.name.as_str(),
        "--db-instance-class",
        class,
        "--engine",
        engine,
        "--master-username",
        username,
        "--master-user-password",
        password,
        "--allocated-storage",
        storage.as_str(),
    ];
    if let Some(db_name) = optional_str(instance, "db_name") {
        args.extend(["--db-name", db_name]);
    }
    if let Some(version) = optional_str(instance, "engine_version") {
        args.extend(["--engine-version", version]);
    }
    if let Some(retention) = &retention {
        args.extend(["--backup-retention-period", retention.as_str()]);
    }
    if !tag_args.is_empty() {
        args.push("--tags");
        args.extend(tag_args.iter().map(String::as_str));
    }

    cli.run(&args, "create db instance")?;
    Ok(())
}

pub fn update(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    let class = require_str(instance, "db_instance_class")?;

    let storage = instance
        .properties
        .get("allocated_storage")
        .and_then(Value::as_i64)
        .filter(|s| current.get("allocated_storage").and_then(Value::as_i64) != Some(*s))
        .map(|s| s.to_string());
    let retention = instance
        .properties
        .get("backup_retention_period")
        .and_then(Value::as_i64)
        .filter(|r| {
            current.get("backup_retention_period").and_then(Value::as_i64) != Some(*r)
        })
        .map(|r| r.to_string());

    let mut args = vec![
        "rds",
        "modify-db-instance",
        "--db-instance-identifier",
        instance.name.as_str(),
        "--apply-immediately",
    ];

    let mut changed = false;
    if current.get("db_instance_class").and_then(Value::as_str) != Some(class) {
        args.extend(["--db-instance-class", class]);
        changed = true;
    }
    if let Some(storage) = &storage {
        args.extend(["--allocated-storage", storage.as_str()]);
        changed = true;
    }
    if let Some(retention) = &retention {
        args.extend(["--backup-retention-period", retention.as_str()]);
        changed = true;
    }

    if changed {
        cli.run(&args, "modify db instance")?;
    }
    Ok(())
}

pub fn delete(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let deleted = cli.run_allow_missing(
        &[
            "rds",
            "delete-db-instance",
            "--db-instance-identifier",
            &instance.name,
            "--skip-final-snapshot",
        ],
        "delete db instance",
    )?;
    if deleted.is_none() {
        log::debug!("db instance {} already absent", instance.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::test_instance;
    use serde_json::json;

    fn full_properties() -> Value {
        json!({
            "db_instance_class": "db.t3.micro",
            "engine": "postgres",
            "master_username": "admin",
            "master_user_password": "secret"
        })
    }

    #[test]
    fn validate_requires_connection_properties() {
        let inst = test_instance("aws:rds:instance", "app-db", full_properties());
        assert!(validate(&inst).is_ok());

        for missing in [
            "db_instance_class",
            "engine",
            "master_username",
            "master_user_password",
        ] {
            let mut props = full_properties();
            props.as_object_mut().unwrap().remove(missing);
            let inst = test_instance("aws:rds:instance", "app-db", props);
            assert!(
                validate(&inst).unwrap_err().to_string().contains(missing),
                "expected {missing} to be required"
            );
        }
    }

    #[test]
    fn validate_rejects_unknown_engines() {
        let mut props = full_properties();
        props.as_object_mut().unwrap()["engine"] = json!("cockroachdb");
        let inst = test_instance("aws:rds:instance", "app-db", props);
        assert!(validate(&inst)
            .unwrap_err()
            .to_string()
            .contains("invalid engine type"));
    }
}

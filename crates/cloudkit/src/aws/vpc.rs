//! VPC, subnet, and internet gateway glue.
//!
//! These EC2 networking resources are addressed by their `Name` tag. In-place
//! updates can only touch tags; CIDR or VPC membership changes require
//! replacement.

use super::{decode_ec2_tags, ec2_create_tags, invalid, optional_str, require_str, tags_of};
use crate::awscli::AwsCli;
use engine::{Properties, ProviderError, ResourceInstance};
use serde_json::{json, Value};
use std::net::IpAddr;

fn valid_cidr(cidr: &str) -> bool {
    let Some((addr, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => prefix <= 32,
        Ok(IpAddr::V6(_)) => prefix <= 128,
        Err(_) => false,
    }
}

fn validate_cidr(instance: &ResourceInstance, key: &str) -> Result<(), ProviderError> {
    let cidr = require_str(instance, key)?;
    if !valid_cidr(cidr) {
        return Err(invalid(instance, format!("invalid CIDR block '{cidr}'")));
    }
    Ok(())
}

fn name_filter(name: &str) -> String {
    format!("Name=tag:Name,Values={name}")
}

/// Desired tags plus the `Name` tag used for addressing.
fn tags_with_name(instance: &ResourceInstance) -> serde_json::Map<String, Value> {
    let mut tags = tags_of(&instance.properties);
    tags.insert("Name".to_string(), json!(instance.name));
    tags
}

fn live_id<'a>(
    instance: &ResourceInstance,
    current: &'a Properties,
    key: &str,
) -> Result<&'a str, ProviderError> {
    current.get(key).and_then(Value::as_str).ok_or_else(|| {
        ProviderError::Permanent(format!(
            "cannot update {}: live state has no {key}",
            instance.id
        ))
    })
}

fn update_tags_only(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
    id_key: &str,
) -> Result<(), ProviderError> {
    let desired_tags = tags_of(&instance.properties);
    let live_tags = tags_of(current);
    if !desired_tags.is_empty() && desired_tags != live_tags {
        let id = live_id(instance, current, id_key)?;
        ec2_create_tags(cli, id, &desired_tags)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// VPCs
// ---------------------------------------------------------------------------

pub fn validate_vpc(instance: &ResourceInstance) -> Result<(), ProviderError> {
    if instance.name.is_empty() {
        return Err(invalid(instance, "VPC name cannot be empty"));
    }
    validate_cidr(instance, "cidr_block")
}

pub fn vpc_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let filter = name_filter(&instance.name);
    let described = cli.run_json(
        &["ec2", "describe-vpcs", "--filters", &filter],
        "describe vpcs",
    )?;

    let Some(vpc) = described["Vpcs"].as_array().and_then(|v| v.first()) else {
        return Ok(None);
    };

    let mut state = Properties::new();
    if let Some(id) = vpc["VpcId"].as_str() {
        state.insert("vpc_id".to_string(), json!(id));
    }
    if let Some(cidr) = vpc["CidrBlock"].as_str() {
        state.insert("cidr_block".to_string(), json!(cidr));
    }
    if let Some(status) = vpc["State"].as_str() {
        state.insert("state".to_string(), json!(status));
    }
    let tags = decode_ec2_tags(&vpc["Tags"]);
    if !tags.is_empty() {
        state.insert("tags".to_string(), Value::Object(tags));
    }

    Ok(Some(state))
}

pub fn create_vpc(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let cidr = require_str(instance, "cidr_block")?;
    let created = cli.run_json(
        &["ec2", "create-vpc", "--cidr-block", cidr],
        "create vpc",
    )?;

    let vpc_id = created["Vpc"]["VpcId"]
        .as_str()
        .ok_or_else(|| ProviderError::Permanent("create-vpc returned no VpcId".into()))?;

    ec2_create_tags(cli, vpc_id, &tags_with_name(instance))
}

pub fn update_vpc(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    update_tags_only(cli, instance, current, "vpc_id")
}

pub fn delete_vpc(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let Some(state) = vpc_state(cli, instance)? else {
        log::debug!("vpc {} already absent", instance.name);
        return Ok(());
    };
    let Some(vpc_id) = state.get("vpc_id").and_then(Value::as_str) else {
        return Ok(());
    };

    let deleted = cli.run_allow_missing(
        &["ec2", "delete-vpc", "--vpc-id", vpc_id],
        "delete vpc",
    )?;
    if deleted.is_none() {
        log::debug!("vpc {} already absent", instance.name);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subnets
// ---------------------------------------------------------------------------

pub fn validate_subnet(instance: &ResourceInstance) -> Result<(), ProviderError> {
    if instance.name.is_empty() {
        return Err(invalid(instance, "subnet name cannot be empty"));
    }
    let vpc_id = require_str(instance, "vpc_id")?;
    if !vpc_id.starts_with("vpc-") {
        return Err(invalid(instance, format!("invalid vpc_id format: {vpc_id}")));
    }
    validate_cidr(instance, "cidr_block")
}

pub fn subnet_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let filter = name_filter(&instance.name);
    let described = cli.run_json(
        &["ec2", "describe-subnets", "--filters", &filter],
        "describe subnets",
    )?;

    let Some(subnet) = described["Subnets"].as_array().and_then(|s| s.first()) else {
        return Ok(None);
    };

    let mut state = Properties::new();
    if let Some(id) = subnet["SubnetId"].as_str() {
        state.insert("subnet_id".to_string(), json!(id));
    }
    if let Some(vpc_id) = subnet["VpcId"].as_str() {
        state.insert("vpc_id".to_string(), json!(vpc_id));
    }
    if let Some(cidr) = subnet["CidrBlock"].as_str() {
        state.insert("cidr_block".to_string(), json!(cidr));
    }
    if let Some(zone) = subnet["AvailabilityZone"].as_str() {
        state.insert("availability_zone".to_string(), json!(zone));
    }
    if let Some(status) = subnet["State"].as_str() {
        state.insert("state".to_string(), json!(status));
    }
    let tags = decode_ec2_tags(&subnet["Tags"]);
    if !tags.is_empty() {
        state.insert("tags".to_string(), Value::Object(tags));
    }

    Ok(Some(state))
}

pub fn create_subnet(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let vpc_id = require_str(instance, "vpc_id")?;
    let cidr = require_str(instance, "cidr_block")?;

    let mut args = vec![
        "ec2",
        "create-subnet",
        "--vpc-id",
        vpc_id,
        "--cidr-block",
        cidr,
    ];
    if let Some(zone) = optional_str(instance, "availability_zone") {
        args.extend(["--availability-zone", zone]);
    }

    let created = cli.run_json(&args, "create subnet")?;
    let subnet_id = created["Subnet"]["SubnetId"]
        .as_str()
        .ok_or_else(|| ProviderError::Permanent("create-subnet returned no SubnetId".into()))?;

    ec2_create_tags(cli, subnet_id, &tags_with_name(instance))
}

pub fn update_subnet(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    update_tags_only(cli, instance, current, "subnet_id")
}

pub fn delete_subnet(cli: &AwsCli, instance: &ResourceInstance) -> Result<(), ProviderError> {
    let Some(state) = subnet_state(cli, instance)? else {
        log::debug!("subnet {} already absent", instance.name);
        return Ok(());
    };
    let Some(subnet_id) = state.get("subnet_id").and_then(Value::as_str) else {
        return Ok(());
    };

    let deleted = cli.run_allow_missing(
        &["ec2", "delete-subnet", "--subnet-id", subnet_id],
        "delete subnet",
    )?;
    if deleted.is_none() {
        log::debug!("subnet {} already absent", instance.name);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Internet gateways
// ---------------------------------------------------------------------------

pub fn validate_internet_gateway(instance: &ResourceInstance) -> Result<(), ProviderError> {
    if instance.name.is_empty() {
        return Err(invalid(instance, "internet gateway name cannot be empty"));
    }
    Ok(())
}

pub fn internet_gateway_state(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<Option<Properties>, ProviderError> {
    let filter = name_filter(&instance.name);
    let described = cli.run_json(
        &["ec2", "describe-internet-gateways", "--filters", &filter],
        "describe internet gateways",
    )?;

    let Some(igw) = described["InternetGateways"]
        .as_array()
        .and_then(|g| g.first())
    else {
        return Ok(None);
    };

    let mut state = Properties::new();
    if let Some(id) = igw["InternetGatewayId"].as_str() {
        state.insert("internet_gateway_id".to_string(), json!(id));
    }
    let tags = decode_ec2_tags(&igw["Tags"]);
    if !tags.is_empty() {
        state.insert("tags".to_string(), Value::Object(tags));
    }

    Ok(Some(state))
}

pub fn create_internet_gateway(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<(), ProviderError> {
    let created = cli.run_json(&["ec2", "create-internet-gateway"], "create internet gateway")?;
    let igw_id = created["InternetGateway"]["InternetGatewayId"]
        .as_str()
        .ok_or_else(|| {
            ProviderError::Permanent("create-internet-gateway returned no InternetGatewayId".into())
        })?;

    ec2_create_tags(cli, igw_id, &tags_with_name(instance))
}

pub fn update_internet_gateway(
    cli: &AwsCli,
    instance: &ResourceInstance,
    current: &Properties,
) -> Result<(), ProviderError> {
    update_tags_only(cli, instance, current, "internet_gateway_id")
}

pub fn delete_internet_gateway(
    cli: &AwsCli,
    instance: &ResourceInstance,
) -> Result<(), ProviderError> {
    let Some(state) = internet_gateway_state(cli, instance)? else {
        log::debug!("internet gateway {} already absent", instance.name);
        return Ok(());
    };
    let Some(igw_id) = state.get("internet_gateway_id").and_then(Value::as_str) else {
        return Ok(());
    };

    let deleted = cli.run_allow_missing(
        &[
            "ec2",
            "delete-internet-gateway",
            "--internet-gateway-id",
            igw_id,
        ],
        "delete internet gateway",
    )?;
    if deleted.is_none() {
        log::debug!("internet gateway {} already absent", instance.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::test_instance;
    use serde_json::json;

    #[test]
    fn vpc_requires_a_valid_cidr() {
        let inst = test_instance("aws:ec2:vpc", "main", json!({"cidr_block": "10.0.0.0/16"}));
        assert!(validate_vpc(&inst).is_ok());

        let inst = test_instance("aws:ec2:vpc", "main", json!({}));
        assert!(validate_vpc(&inst).unwrap_err().to_string().contains("cidr_block"));

        let inst = test_instance("aws:ec2:vpc", "main", json!({"cidr_block": "10.0.0.0/40"}));
        assert!(validate_vpc(&inst).unwrap_err().to_string().contains("invalid CIDR"));

        let inst = test_instance("aws:ec2:vpc", "main", json!({"cidr_block": "not-a-cidr"}));
        assert!(validate_vpc(&inst).is_err());
    }

    #[test]
    fn subnet_requires_vpc_id_prefix_and_cidr() {
        let inst = test_instance(
            "aws:ec2:subnet",
            "public-a",
            json!({"vpc_id": "vpc-0abc", "cidr_block": "10.0.1.0/24"}),
        );
        assert!(validate_subnet(&inst).is_ok());

        let inst = test_instance(
            "aws:ec2:subnet",
            "public-a",
            json!({"vpc_id": "subnet-0abc", "cidr_block": "10.0.1.0/24"}),
        );
        assert!(validate_subnet(&inst)
            .unwrap_err()
            .to_string()
            .contains("invalid vpc_id"));

        let inst = test_instance("aws:ec2:subnet", "public-a", json!({"vpc_id": "vpc-0abc"}));
        assert!(validate_subnet(&inst)
            .unwrap_err()
            .to_string()
            .contains("cidr_block"));
    }

    #[test]
    fn internet_gateway_only_needs_a_name() {
        let inst = test_instance("aws:ec2:internet_gateway", "main-igw", json!({}));
        assert!(validate_internet_gateway(&inst).is_ok());
    }

    #[test]
    fn cidr_parsing_covers_v4_and_v6() {
        assert!(valid_cidr("10.0.0.0/16"));
        assert!(valid_cidr("2001:db8::/32"));
        assert!(!valid_cidr("10.0.0.0"));
        assert!(!valid_cidr("10.0.0.0/33"));
        assert!(!valid_cidr("2001:db8::/129"));
    }
}

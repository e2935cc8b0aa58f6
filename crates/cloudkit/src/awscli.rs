//! Thin runner around the `aws` CLI.
//!
//! Every invocation pins `--output json` and the configured region; the
//! profile is passed through when set. Failures are classified from stderr
//! into the provider error taxonomy.

use crate::error::{classify, is_not_found};
use engine::ProviderError;
use serde_json::Value;
use std::process::Command;

#[derive(Debug, Clone)]
pub struct AwsCli {
    bin: String,
    region: String,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(region: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            bin: "aws".to_string(),
            region: region.into(),
            profile: profile.filter(|p| !p.is_empty()),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Whether the CLI can be executed at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.bin)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn execute(&self, args: &[&str]) -> Result<std::process::Output, ProviderError> {
        let mut command = Command::new(&self.bin);
        command.args(args).args(["--output", "json"]);
        if !self.region.is_empty() {
            command.args(["--region", &self.region]);
        }
        if let Some(profile) = &self.profile {
            command.args(["--profile", profile]);
        }

        log::debug!("aws {}", args.join(" "));
        command
            .output()
            .map_err(|e| ProviderError::Permanent(format!("failed to execute aws CLI: {e}")))
    }

    /// Run a command, returning stdout on success.
    pub fn run(&self, args: &[&str], context: &str) -> Result<String, ProviderError> {
        let output = self.execute(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify(&stderr, context));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a command where a not-found failure means the resource is absent.
    pub fn run_allow_missing(
        &self,
        args: &[&str],
        context: &str,
    ) -> Result<Option<String>, ProviderError> {
        let output = self.execute(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found(&stderr) {
                return Ok(None);
            }
            return Err(classify(&stderr, context));
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()))
    }

    /// Run a command and decode its JSON output.
    pub fn run_json(&self, args: &[&str], context: &str) -> Result<Value, ProviderError> {
        let stdout = self.run(args, context)?;
        decode(&stdout, context)
    }

    /// JSON variant of [`AwsCli::run_allow_missing`].
    pub fn run_json_allow_missing(
        &self,
        args: &[&str],
        context: &str,
    ) -> Result<Option<Value>, ProviderError> {
        match self.run_allow_missing(args, context)? {
            Some(stdout) => decode(&stdout, context).map(Some),
            None => Ok(None),
        }
    }
}

fn decode(stdout: &str, context: &str) -> Result<Value, ProviderError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed)
        .map_err(|e| ProviderError::Permanent(format!("{context}: invalid JSON from aws CLI: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_decodes_to_null() {
        assert_eq!(decode("", "ctx").unwrap(), Value::Null);
        assert_eq!(decode("  \n", "ctx").unwrap(), Value::Null);
    }

    #[test]
    fn json_output_decodes() {
        let value = decode(r#"{"Buckets": []}"#, "ctx").unwrap();
        assert!(value["Buckets"].as_array().unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_a_permanent_error() {
        let err = decode("not-json", "list buckets").unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
        assert!(err.to_string().contains("list buckets"));
    }

    #[test]
    fn profile_is_normalised() {
        let cli = AwsCli::new("us-east-1", Some(String::new()));
        assert!(cli.profile.is_none());
        let cli = AwsCli::new("us-east-1", Some("prod".into()));
        assert_eq!(cli.profile.as_deref(), Some("prod"));
    }
}

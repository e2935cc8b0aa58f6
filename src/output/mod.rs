//! Result shapes and formatters for the structured command output.
//!
//! Every command emits a fixed shape; the JSON keys, severity strings, and
//! alignment status strings are a stable contract for tooling built on top.

mod human;
mod json;
mod markdown;

use clap::ValueEnum;
use engine::PolicyViolation;
use std::time::Duration;

pub use human::HumanFormatter;
pub use json::JsonFormatter;
pub use markdown::MarkdownFormatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Markdown,
}

/// Result of a bootstrap run.
#[derive(Debug, Default)]
pub struct BootstrapResult {
    pub success: bool,
    pub providers_installed: Vec<String>,
    pub resource_count: usize,
    pub modules_loaded: usize,
    pub policy_violations: Vec<PolicyViolation>,
    pub duration: Duration,
    pub error: Option<String>,
}

/// One planned change, for preview output.
#[derive(Debug, Clone)]
pub struct ChangeReport {
    /// `create`, `update`, or `delete`.
    pub kind: String,
    pub resource_kind: String,
    pub resource_name: String,
    pub description: String,
}

/// Drift findings for one resource.
#[derive(Debug, Clone)]
pub struct DriftReport {
    pub resource_name: String,
    pub has_drift: bool,
    pub changes: Vec<String>,
}

/// Result of a preview run.
#[derive(Debug, Default)]
pub struct PreviewResult {
    pub success: bool,
    pub changes: Vec<ChangeReport>,
    pub drift_results: Vec<DriftReport>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl PreviewResult {
    pub fn has_drift(&self) -> bool {
        self.drift_results.iter().any(|d| d.has_drift)
    }
}

/// One executed DAG level.
#[derive(Debug, Clone)]
pub struct LevelReport {
    /// 1-based level number.
    pub level: usize,
    pub resources: Vec<String>,
    pub duration: Duration,
}

/// Result of a commit run.
#[derive(Debug, Default)]
pub struct CommitResult {
    pub success: bool,
    pub resources_applied: usize,
    pub execution_levels: Vec<LevelReport>,
    pub total_duration: Duration,
    pub error: Option<String>,
}

/// Per-resource outcome of one alignment tick.
#[derive(Debug, Clone)]
pub struct ResourceReport {
    pub name: String,
    /// `aligned`, `drifted`, `healed`, or `error`.
    pub status: String,
    pub changes: Vec<String>,
    pub duration: Duration,
}

/// Result of one alignment tick.
#[derive(Debug, Default)]
pub struct AlignResult {
    pub success: bool,
    pub drift_detected: bool,
    pub actions_applied: usize,
    pub resources: Vec<ResourceReport>,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Renders command results in one output format.
pub trait Formatter {
    fn bootstrap(&self, result: &BootstrapResult) -> String;
    fn preview(&self, result: &PreviewResult) -> String;
    fn commit(&self, result: &CommitResult) -> String;
    fn align(&self, result: &AlignResult) -> String;
}

pub fn formatter_for(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Human => Box::new(HumanFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

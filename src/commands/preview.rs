//! `runestone preview` - report drift and planned changes, touch nothing.

use crate::cli::CommonArgs;
use crate::commands::{build_registry, load_config};
use crate::output::{
    formatter_for, ChangeReport, DriftReport, Formatter, OutputFormat, PreviewResult,
};
use crate::progress;
use anyhow::Result;
use engine::drift::plan_changes;
use engine::{CancelToken, ChangeKind, Detector, DriftResult, ResourceInstance};
use std::collections::BTreeMap;
use std::time::Instant;

pub fn run(args: &CommonArgs) -> Result<()> {
    let start = Instant::now();
    let human = args.output == OutputFormat::Human;
    let formatter = formatter_for(args.output);
    let mut result = PreviewResult::default();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(err) => return fail(formatter.as_ref(), result, start, err),
    };
    let registry = match build_registry(&config) {
        Ok(registry) => registry,
        Err(err) => return fail(formatter.as_ref(), result, start, err),
    };
    let instances = match engine::expand(&config) {
        Ok(instances) => instances,
        Err(err) => return fail(formatter.as_ref(), result, start, err.into()),
    };

    let spinner = human.then(|| progress::spinner("Inspecting live infrastructure..."));
    let detector = Detector::new(&registry);
    let drift = match detector.detect_batch(&instances, &CancelToken::new()) {
        Ok(drift) => drift,
        Err(err) => {
            if let Some(pb) = &spinner {
                progress::finish_error(pb, "Drift detection failed");
            }
            return fail(formatter.as_ref(), result, start, err.into());
        }
    };
    if let Some(pb) = &spinner {
        progress::finish_success(pb, &format!("Inspected {} resources", instances.len()));
    }

    let (changes, drift_results) = to_reports(&instances, &drift);
    result.changes = changes;
    result.drift_results = drift_results;
    result.success = true;
    result.duration = start.elapsed();

    print!("{}", formatter.preview(&result));
    Ok(())
}

/// Convert drift results into the output shapes, in instance order.
pub fn to_reports(
    instances: &[ResourceInstance],
    drift: &BTreeMap<String, DriftResult>,
) -> (Vec<ChangeReport>, Vec<DriftReport>) {
    let summary = plan_changes(instances, drift);
    let changes = summary
        .changes
        .iter()
        .map(|change| {
            let verb = match change.kind {
                ChangeKind::Create => "Create",
                ChangeKind::Update => "Update",
                ChangeKind::Delete => "Delete",
            };
            ChangeReport {
                kind: change.kind.as_str().to_string(),
                resource_kind: change.resource_kind.clone(),
                resource_name: change.resource_name.clone(),
                description: format!("{verb} {} {}", change.resource_kind, change.resource_name),
            }
        })
        .collect();

    let drift_results = instances
        .iter()
        .filter_map(|instance| {
            drift.get(&instance.id).map(|result| DriftReport {
                resource_name: instance.id.clone(),
                has_drift: result.has_drift,
                changes: result.changes.clone(),
            })
        })
        .collect();

    (changes, drift_results)
}

fn fail(
    formatter: &dyn Formatter,
    mut result: PreviewResult,
    start: Instant,
    err: anyhow::Error,
) -> Result<()> {
    result.success = false;
    result.error = Some(format!("{err:#}"));
    result.duration = start.elapsed();
    print!("{}", formatter.preview(&result));
    Err(err)
}

//! `runestone dismantle` - destroy managed resources, dependents first.

use crate::cli::DismantleArgs;
use crate::commands::{build_registry, confirm, load_config, ExecutionFailed};
use crate::ui;
use anyhow::Result;
use engine::{CancelToken, Dag, Detector, Executor, ResourceInstance};

pub fn run(args: &DismantleArgs) -> Result<()> {
    ui::header("Preparing to dismantle infrastructure");

    let config = load_config(&args.common.config)?;
    let registry = build_registry(&config)?;
    let instances = engine::expand(&config)?;

    // Only resources that actually exist can be deleted.
    let cancel = CancelToken::new();
    let detector = Detector::new(&registry);
    let drift = detector.detect_batch(&instances, &cancel)?;
    let existing: Vec<ResourceInstance> = instances
        .into_iter()
        .filter(|instance| {
            drift
                .get(&instance.id)
                .map(|result| result.current_state.is_some())
                .unwrap_or(false)
        })
        .collect();

    if existing.is_empty() {
        ui::success("No resources found to dismantle");
        return Ok(());
    }

    ui::section("The following resources will be destroyed");
    for instance in &existing {
        println!("  - {} ({})", instance.id, instance.kind);
    }
    println!();

    if !confirm(
        "This action cannot be undone. Do you want to proceed?",
        args.auto_approve,
    )? {
        ui::warn("Operation cancelled.");
        return Ok(());
    }

    let dag = Dag::build(&existing)?;
    let report = Executor::new(&registry).dismantle(&dag, &cancel, args.force);

    println!();
    if report.success {
        ui::success(&format!(
            "Dismantle complete ({} resource(s) destroyed)",
            report.changes.len()
        ));
    } else {
        ui::error("Dismantle completed with errors");
    }
    for change in &report.changes {
        ui::dim(&format!("- Deleted {}", change.resource_id));
    }
    for error in &report.errors {
        ui::error(&format!("{}: {}", error.id, error.message));
    }

    if !report.success {
        return Err(ExecutionFailed {
            command: "dismantle",
        }
        .into());
    }
    Ok(())
}

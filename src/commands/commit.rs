//! `runestone commit` - apply changes in dependency order.

use crate::cli::CommitArgs;
use crate::commands::{build_registry, confirm, load_config, ExecutionFailed};
use crate::output::{formatter_for, CommitResult, LevelReport, OutputFormat};
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use engine::drift::plan_changes;
use engine::{CancelToken, ChangeKind, Dag, Detector, Executor};
use std::time::Instant;

pub fn run(args: &CommitArgs) -> Result<()> {
    let start = Instant::now();
    let human = args.common.output == OutputFormat::Human;
    let formatter = formatter_for(args.common.output);

    if human {
        ui::header("Committing infrastructure changes");
    }

    let config = load_config(&args.common.config)?;
    let registry = build_registry(&config)?;
    let instances = engine::expand(&config)?;

    let detector = Detector::new(&registry);
    let cancel = CancelToken::new();
    let drift = detector.detect_batch(&instances, &cancel)?;
    let plan = plan_changes(&instances, &drift);

    if plan.is_empty() {
        if human {
            ui::success("No changes detected - infrastructure is up to date");
        } else {
            let result = CommitResult {
                success: true,
                total_duration: start.elapsed(),
                ..CommitResult::default()
            };
            print!("{}", formatter.commit(&result));
        }
        return Ok(());
    }

    if human {
        display_plan(&plan);
    }
    if !confirm("Do you want to apply these changes?", args.auto_approve)? {
        if human {
            ui::warn("Operation cancelled.");
        }
        return Ok(());
    }

    let dag = Dag::build(&instances)?;
    if args.graph && human {
        display_graph(&dag);
    }

    let report = Executor::new(&registry).commit(&dag, &drift, &cancel);

    let result = CommitResult {
        success: report.success,
        resources_applied: report.changes.len(),
        execution_levels: report
            .levels
            .iter()
            .map(|level| LevelReport {
                level: level.index + 1,
                resources: level.resources.clone(),
                duration: level.duration,
            })
            .collect(),
        total_duration: start.elapsed(),
        error: aggregate_errors(&report),
    };

    if human {
        display_outcome(&report);
    } else {
        print!("{}", formatter.commit(&result));
    }

    if !report.success {
        return Err(ExecutionFailed { command: "commit" }.into());
    }
    Ok(())
}

fn display_plan(plan: &engine::ChangeSummary) {
    ui::section("Planned changes");
    if plan.create > 0 {
        println!("  {} {} resource(s) will be created", "+".green(), plan.create);
    }
    if plan.update > 0 {
        println!("  {} {} resource(s) will be updated", "~".yellow(), plan.update);
    }
    if plan.delete > 0 {
        println!("  {} {} resource(s) will be removed", "-".red(), plan.delete);
    }
    println!();
    for change in &plan.changes {
        match change.kind {
            ChangeKind::Create => {
                println!("  {} Create {}", "+".green(), change.resource_id);
            }
            ChangeKind::Update => {
                println!("  {} Update {}", "~".yellow(), change.resource_id);
                for (property, desired) in &change.new_values {
                    match change.old_values.get(property) {
                        Some(current) => {
                            ui::dim(&format!("    {property}: {current} -> {desired}"));
                        }
                        None => ui::dim(&format!("    {property}: {desired} (new)")),
                    }
                }
            }
            ChangeKind::Delete => {
                println!("  {} Delete {}", "-".red(), change.resource_id);
            }
        }
    }
    println!();
}

fn display_graph(dag: &Dag) {
    ui::section("Execution plan (DAG)");
    for (index, level) in dag.execution_order().iter().enumerate() {
        println!("  Level {}: {}", index + 1, level.join(", "));
    }
    println!();
}

fn display_outcome(report: &engine::ExecutionReport) {
    println!();
    if report.success {
        ui::success(&format!(
            "Commit complete ({} change(s) applied)",
            report.changes.len()
        ));
    } else {
        ui::error("Commit completed with errors");
    }

    for change in &report.changes {
        let line = match change.kind {
            ChangeKind::Create => format!("{} Created {}", "+".green(), change.resource_id),
            ChangeKind::Update => format!("{} Updated {}", "~".yellow(), change.resource_id),
            ChangeKind::Delete => format!("{} Deleted {}", "-".red(), change.resource_id),
        };
        println!("  {line}");
    }
    for skipped in &report.skipped {
        println!("  {} Skipped {} (dependency failed)", "•".dimmed(), skipped);
    }
    for error in &report.errors {
        ui::error(&format!("{}: {}", error.id, error.message));
    }
}

fn aggregate_errors(report: &engine::ExecutionReport) -> Option<String> {
    if report.errors.is_empty() {
        return None;
    }
    let lines: Vec<String> = report
        .errors
        .iter()
        .map(|e| format!("{}: {}", e.id, e.message))
        .collect();
    Some(lines.join("; "))
}

//! `runestone align` - reconcile drift once or on an interval.
//!
//! Continuous mode runs a tick to completion and only then sleeps, so ticks
//! never overlap; a tick that outlasts the interval simply delays the next
//! one. Drift results are recomputed from scratch on every tick.

use crate::cli::AlignArgs;
use crate::commands::{build_registry, load_config};
use crate::output::{formatter_for, AlignResult, OutputFormat, ResourceReport};
use crate::ui;
use anyhow::Result;
use engine::{align_tick, AlignStatus, CancelToken};
use std::time::Instant;

pub fn run(args: &AlignArgs) -> Result<()> {
    if args.once {
        return run_tick(args);
    }

    let human = args.common.output == OutputFormat::Human;
    if human {
        ui::info(&format!(
            "Starting continuous alignment (interval: {:?})",
            args.interval
        ));
        ui::dim("Press Ctrl+C to stop");
    }

    loop {
        if let Err(err) = run_tick(args) {
            // Per-tick failures are reported and the loop keeps going.
            ui::error(&format!("Alignment failed: {err:#}"));
        }
        std::thread::sleep(args.interval);
    }
}

fn run_tick(args: &AlignArgs) -> Result<()> {
    let start = Instant::now();
    let human = args.common.output == OutputFormat::Human;
    let formatter = formatter_for(args.common.output);

    if human {
        println!();
        ui::info(&format!(
            "Aligning desired state with reality... ({})",
            chrono::Local::now().format("%H:%M:%S")
        ));
    }

    let config = load_config(&args.common.config)?;
    let registry = build_registry(&config)?;
    let instances = engine::expand(&config)?;

    let report = align_tick(&instances, &registry, &CancelToken::new());

    let result = AlignResult {
        success: report.success,
        drift_detected: report.drift_detected,
        actions_applied: report.actions_applied,
        resources: report
            .resources
            .iter()
            .map(|r| ResourceReport {
                name: r.name.clone(),
                status: r.status.as_str().to_string(),
                changes: r.changes.clone(),
                duration: r.duration,
            })
            .collect(),
        duration: start.elapsed(),
        error: None,
    };

    if human {
        display_tick(&report);
    } else {
        print!("{}", formatter.align(&result));
    }

    Ok(())
}

fn display_tick(report: &engine::AlignReport) {
    if !report.drift_detected {
        ui::success("Infrastructure aligned (no drift detected)");
        return;
    }

    for resource in &report.resources {
        match resource.status {
            AlignStatus::Aligned => {}
            AlignStatus::Healed => {
                ui::success(&format!("{} auto-healed", resource.name));
            }
            AlignStatus::Drifted if resource.no_policy => {
                ui::warn(&format!("{} has drift (no policy defined)", resource.name));
            }
            AlignStatus::Drifted => {
                ui::warn(&format!("{} has drift (notify-only policy)", resource.name));
                for change in &resource.changes {
                    ui::dim(&format!("  - {change}"));
                }
            }
            AlignStatus::Error => {
                ui::error(&format!(
                    "{}: {}",
                    resource.name,
                    resource.changes.join("; ")
                ));
            }
        }
    }

    let drifted = report
        .resources
        .iter()
        .filter(|r| r.status != AlignStatus::Aligned)
        .count();
    let errors = report
        .resources
        .iter()
        .filter(|r| r.status == AlignStatus::Error)
        .count();

    ui::info("Infrastructure alignment complete");
    ui::dim(&format!("{drifted} resource(s) with drift detected"));
    if report.actions_applied > 0 {
        ui::dim(&format!("{} resource(s) auto-healed", report.actions_applied));
    }
    if errors > 0 {
        ui::dim(&format!("{errors} error(s) during auto-heal"));
    }
}

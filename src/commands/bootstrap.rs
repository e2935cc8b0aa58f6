//! `runestone bootstrap` - install providers, load modules, validate.
//!
//! Bootstrap is the gate before anything touches a provider: configuration,
//! per-resource schemas, and policies are all checked here, and an
//! error-severity policy violation aborts the run.

use crate::cli::CommonArgs;
use crate::commands::{build_registry, load_config, validate_instances};
use crate::output::{formatter_for, BootstrapResult, Formatter, OutputFormat};
use crate::ui;
use anyhow::Result;
use engine::{by_severity, has_errors, EngineError, Module, ModuleRegistry, PolicyEngine, Severity};
use std::time::Instant;

pub fn run(args: &CommonArgs) -> Result<()> {
    let start = Instant::now();
    let human = args.output == OutputFormat::Human;
    let formatter = formatter_for(args.output);
    let mut result = BootstrapResult::default();

    if human {
        ui::header("Bootstrapping environment");
    }

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(err) => return fail(formatter.as_ref(), result, start, err),
    };

    let registry = match build_registry(&config) {
        Ok(registry) => registry,
        Err(err) => return fail(formatter.as_ref(), result, start, err),
    };
    for name in registry.names() {
        if human {
            ui::success(&format!("Installed provider {name}"));
        }
        result.providers_installed.push(name.to_string());
    }

    if human {
        ui::info("Validating configuration...");
    }
    let instances = match engine::expand(&config) {
        Ok(instances) => instances,
        Err(err) => return fail(formatter.as_ref(), result, start, err.into()),
    };
    result.resource_count = instances.len();

    if let Err(err) = validate_instances(&registry, &instances) {
        return fail(formatter.as_ref(), result, start, err.into());
    }
    if human {
        ui::success(&format!("Found {} resource instances", instances.len()));
        ui::info("Evaluating policies...");
    }

    let policy_engine = PolicyEngine::with_builtin_rules();
    let violations = policy_engine.evaluate(&instances);
    result.policy_violations = violations.clone();

    if human {
        if violations.is_empty() {
            ui::success("No policy violations found");
        } else {
            ui::warn(&format!("Found {} policy violations:", violations.len()));
            for (severity, group) in by_severity(&violations) {
                ui::dim(&format!("{}: {}", severity, group.len()));
                for violation in group {
                    ui::dim(&format!("  - {}: {}", violation.resource_id, violation.message));
                }
            }
        }
    }

    if has_errors(&violations) {
        let errors = violations
            .iter()
            .filter(|v| v.severity == Severity::Error)
            .count();
        return fail(
            formatter.as_ref(),
            result,
            start,
            EngineError::PolicyGate { errors }.into(),
        );
    }

    if !config.modules.is_empty() {
        if human {
            ui::info(&format!("Loading {} modules...", config.modules.len()));
        }
        let mut module_registry = ModuleRegistry::new();
        for (name, module_config) in &config.modules {
            let module = Module {
                name: name.clone(),
                source: module_config.source.clone(),
                version: module_config.version.clone(),
                inputs: module_config.inputs.clone(),
            };
            let loaded = module.load().and_then(|_| module_registry.register(module));
            if let Err(err) = loaded {
                return fail(formatter.as_ref(), result, start, err.into());
            }
            if human {
                ui::success(&format!("Module '{name}' loaded"));
            }
        }
        result.modules_loaded = module_registry.len();
    }

    result.success = true;
    result.duration = start.elapsed();

    if human {
        ui::success("Bootstrap complete!");
    } else {
        print!("{}", formatter.bootstrap(&result));
    }

    Ok(())
}

fn fail(
    formatter: &dyn Formatter,
    mut result: BootstrapResult,
    start: Instant,
    err: anyhow::Error,
) -> Result<()> {
    result.success = false;
    result.error = Some(format!("{err:#}"));
    result.duration = start.elapsed();
    print!("{}", formatter.bootstrap(&result));
    Err(err)
}

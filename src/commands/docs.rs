//! `runestone docs` - generate a Markdown reference for the configuration
//! format, supported resource kinds, and built-in policies.

use crate::cli::DocsArgs;
use crate::commands::load_config;
use crate::ui;
use anyhow::{Context, Result};
use std::fmt::Write as _;

pub fn run(args: &DocsArgs) -> Result<()> {
    let mut out = String::new();

    let _ = writeln!(out, "# Runestone Reference\n");
    let _ = writeln!(
        out,
        "Runestone reconciles a declarative YAML document against live cloud \
         state. No state file is kept between runs; every command re-derives \
         ground truth from the provider APIs.\n"
    );

    let _ = writeln!(out, "## Commands\n");
    let _ = writeln!(out, "| Command | Purpose |");
    let _ = writeln!(out, "|---------|---------|");
    let _ = writeln!(out, "| `bootstrap` | Install providers, load modules, validate configuration and policies |");
    let _ = writeln!(out, "| `preview` | Detect drift and show planned changes without applying |");
    let _ = writeln!(out, "| `commit` | Apply changes level-by-level in dependency order |");
    let _ = writeln!(out, "| `align` | Reconcile drift continuously or once (`--once`) |");
    let _ = writeln!(out, "| `dismantle` | Delete managed resources in reverse dependency order |");
    let _ = writeln!(out);

    let _ = writeln!(out, "## Configuration format\n");
    let _ = writeln!(out, "| Field | Required | Description |");
    let _ = writeln!(out, "|-------|----------|-------------|");
    let _ = writeln!(out, "| `project` | yes | Project name, bound as `${{project}}` |");
    let _ = writeln!(out, "| `environment` | yes | Environment name, bound as `${{environment}}` |");
    let _ = writeln!(out, "| `variables` | no | Mapping of user variables for expressions |");
    let _ = writeln!(out, "| `providers` | yes | Provider connection settings (`region`, `profile`) |");
    let _ = writeln!(out, "| `modules` | no | Named module references (`source`, `version`, `inputs`) |");
    let _ = writeln!(out, "| `resources` | yes | Ordered resource declarations |");
    let _ = writeln!(out);

    let _ = writeln!(out, "### Resource fields\n");
    let _ = writeln!(out, "| Field | Description |");
    let _ = writeln!(out, "|-------|-------------|");
    let _ = writeln!(out, "| `kind` | Dotted triple `provider:service:type`, e.g. `aws:s3:bucket` |");
    let _ = writeln!(out, "| `name` | Instance name; may contain `${{...}}` expressions |");
    let _ = writeln!(out, "| `count` | Expand N instances with `index` bound to `0..N` |");
    let _ = writeln!(out, "| `for_each` | Expand per item with `item` bound; string items also bind `region` |");
    let _ = writeln!(out, "| `properties` | Desired state; values may contain expressions |");
    let _ = writeln!(out, "| `driftPolicy` | `autoHeal` / `notifyOnly` behaviour for `align` |");
    let _ = writeln!(out, "| `depends_on` | Fully-qualified instance ids that must exist first |");
    let _ = writeln!(out);

    let _ = writeln!(out, "### Expressions\n");
    let _ = writeln!(
        out,
        "`${{...}}` fragments support variable references, comparisons, \
         `&&`/`||`/`!`, arithmetic, and the ternary `cond ? a : b`. A string \
         that is one whole fragment keeps the expression's native type:\n"
    );
    let _ = writeln!(out, "```yaml");
    let _ = writeln!(out, "instance_type: \"${{environment == 'prod' ? 't3.large' : 't3.micro'}}\"");
    let _ = writeln!(out, "name: \"web-${{index}}\"");
    let _ = writeln!(out, "```\n");

    let _ = writeln!(out, "## Supported resource kinds\n");
    for kind in cloudkit::SUPPORTED_KINDS {
        let _ = writeln!(out, "- `{kind}`");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Built-in policies\n");
    let _ = writeln!(out, "| Rule | Severity | Description |");
    let _ = writeln!(out, "|------|----------|-------------|");
    for rule in engine::builtin_rules() {
        let _ = writeln!(
            out,
            "| `{}` | {} | {} |",
            rule.name,
            rule.severity.as_str(),
            rule.description
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Environment variables\n");
    let _ = writeln!(out, "- `AWS_REGION`, `AWS_PROFILE` override the provider configuration");
    let _ = writeln!(out, "- `RUNESTONE_LOG_LEVEL` sets the log filter (`debug`, `info`, `warn`, `error`)");
    let _ = writeln!(out);

    let _ = writeln!(out, "## Exit codes\n");
    let _ = writeln!(out, "| Code | Meaning |");
    let _ = writeln!(out, "|------|---------|");
    let _ = writeln!(out, "| 0 | Success |");
    let _ = writeln!(out, "| 1 | General failure |");
    let _ = writeln!(out, "| 2 | Configuration error |");
    let _ = writeln!(out, "| 3 | Provider error |");
    let _ = writeln!(out, "| 4 | Resource error |");
    let _ = writeln!(out);

    // When the config parses, append a project-specific summary.
    if let Ok(config) = load_config(&args.config) {
        let _ = writeln!(out, "## Project: {}\n", config.project);
        let _ = writeln!(out, "Environment: `{}`\n", config.environment);
        if let Ok(instances) = engine::expand(&config) {
            let _ = writeln!(out, "| Instance | Kind |");
            let _ = writeln!(out, "|----------|------|");
            for instance in &instances {
                let _ = writeln!(out, "| `{}` | `{}` |", instance.id, instance.kind);
            }
            let _ = writeln!(out);
        }
    }

    match &args.out {
        Some(path) => {
            std::fs::write(path, &out)
                .with_context(|| format!("could not write {}", path.display()))?;
            ui::success(&format!("Documentation written to {}", path.display()));
        }
        None => print!("{out}"),
    }

    Ok(())
}

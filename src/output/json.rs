//! JSON output with fixed keys.

use super::{AlignResult, BootstrapResult, CommitResult, Formatter, PreviewResult};
use engine::has_errors;
use serde_json::{json, Map, Value};

pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn bootstrap(&self, result: &BootstrapResult) -> String {
        let violations: Vec<Value> = result
            .policy_violations
            .iter()
            .map(|v| {
                json!({
                    "resource_name": v.resource_id,
                    "rule_name": v.rule_name,
                    "message": v.message,
                    "severity": v.severity.as_str(),
                })
            })
            .collect();

        let mut output = to_map(json!({
            "success": result.success,
            "providers_installed": result.providers_installed,
            "resource_count": result.resource_count,
            "modules_loaded": result.modules_loaded,
            "policy_violations": violations,
            "duration_seconds": result.duration.as_secs_f64(),
            "has_errors": has_errors(&result.policy_violations),
        }));
        insert_error(&mut output, &result.error);
        render(output)
    }

    fn preview(&self, result: &PreviewResult) -> String {
        let changes: Vec<Value> = result
            .changes
            .iter()
            .map(|c| {
                json!({
                    "type": c.kind,
                    "resource_kind": c.resource_kind,
                    "resource_name": c.resource_name,
                    "description": c.description,
                })
            })
            .collect();
        let drift: Vec<Value> = result
            .drift_results
            .iter()
            .map(|d| {
                json!({
                    "resource_name": d.resource_name,
                    "has_drift": d.has_drift,
                    "changes": d.changes,
                })
            })
            .collect();

        let mut output = to_map(json!({
            "success": result.success,
            "changes_count": result.changes.len(),
            "changes": changes,
            "drift_results": drift,
            "duration_seconds": result.duration.as_secs_f64(),
            "has_drift": result.has_drift(),
        }));
        insert_error(&mut output, &result.error);
        render(output)
    }

    fn commit(&self, result: &CommitResult) -> String {
        let levels: Vec<Value> = result
            .execution_levels
            .iter()
            .map(|l| {
                json!({
                    "level": l.level,
                    "resources": l.resources,
                    "duration_seconds": l.duration.as_secs_f64(),
                })
            })
            .collect();

        let mut output = to_map(json!({
            "success": result.success,
            "resources_applied": result.resources_applied,
            "execution_levels": levels,
            "total_duration_seconds": result.total_duration.as_secs_f64(),
        }));
        insert_error(&mut output, &result.error);
        render(output)
    }

    fn align(&self, result: &AlignResult) -> String {
        let resources: Vec<Value> = result
            .resources
            .iter()
            .map(|r| {
                json!({
                    "name": r.name,
                    "status": r.status,
                    "changes": r.changes,
                    "duration_seconds": r.duration.as_secs_f64(),
                })
            })
            .collect();

        let mut output = to_map(json!({
            "success": result.success,
            "drift_detected": result.drift_detected,
            "actions_applied": result.actions_applied,
            "resources": resources,
            "duration_seconds": result.duration.as_secs_f64(),
        }));
        insert_error(&mut output, &result.error);
        render(output)
    }
}

fn to_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn insert_error(output: &mut Map<String, Value>, error: &Option<String>) {
    if let Some(error) = error {
        output.insert("error".to_string(), json!(error));
    }
}

fn render(output: Map<String, Value>) -> String {
    serde_json::to_string_pretty(&Value::Object(output)).unwrap_or_else(|_| "{}".to_string())
}

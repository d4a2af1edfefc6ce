//! Execution harness over the embedded JavaScript engine.
//!
//! Each run gets a fresh `boa_engine` context. The prelude from
//! `files/harness.js` is evaluated first (console capture, `ListNode` and
//! `TreeNode` constructors, the `__runCall` driver), then the candidate
//! source, then a driver call composed on this side. Everything crossing
//! the engine boundary is a string: arguments travel inside the driver
//! call as an escaped JSON literal, and the driver hands back a single
//! JSON envelope (result, mutated arguments, tracked globals, logs) as
//! the eval completion value. The prelude seals its own bindings, so
//! candidate code cannot rebind the driver it is judged through.
//!
//! The engine has no I/O surface (no filesystem, network, or process
//! access), so containment reduces to the resource budget, which the
//! executer enforces by wall clock.

use std::time::Instant;

use boa_engine::{Context, JsValue, Source};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::executer::{
    CompileResult, ExecutionLimits, ExecutionOutcome, ExecutionSpec, ExecutionStatus,
};

/// Prelude evaluated ahead of candidate code in every context
const HARNESS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/harness.js"));

/// Infrastructure failures of the harness itself. Failures attributable to
/// the candidate are folded into `ExecutionOutcome` instead.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Harness prelude failed to evaluate: {0}")]
    Harness(String),
}

/// Outcome envelope the prelude driver hands back as a JSON string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    result_defined: bool,
    #[serde(default)]
    mutated_args: Vec<Value>,
    #[serde(default)]
    tracked: Map<String, Value>,
    #[serde(default)]
    logs: Vec<Value>,
}

/// Run one function call in a fresh context. Only infrastructure failures
/// return `Err`; everything attributable to the candidate becomes part of
/// the outcome.
pub(crate) fn run_call(
    spec: &ExecutionSpec,
    limits: &ExecutionLimits,
) -> Result<ExecutionOutcome, SandboxError> {
    let mut context = Context::default();
    install_prelude(&mut context)?;

    // Top-level candidate code runs here; a throw counts against this case,
    // with whatever was logged up to the throw preserved.
    let start = Instant::now();
    if let Err(e) = context.eval(Source::from_bytes(spec.source.as_str())) {
        let logs = read_logs(&mut context);
        return Ok(degraded(
            ExecutionStatus::RuntimeError,
            e.to_string(),
            logs,
            start,
        ));
    }

    let driver = format!(
        "__runCall('{}')",
        escape_for_js_literal(&call_payload(spec, limits).to_string())
    );
    let completion = match context.eval(Source::from_bytes(&driver)) {
        Ok(value) => value,
        // The driver catches candidate throws itself, so an eval error here
        // means the candidate broke a global the driver runs through.
        Err(e) => {
            let logs = read_logs(&mut context);
            return Ok(degraded(
                ExecutionStatus::RuntimeError,
                e.to_string(),
                logs,
                start,
            ));
        }
    };
    let elapsed_ms = start.elapsed().as_millis() as u32;

    let envelope = match decode_envelope(&completion) {
        Ok(envelope) => envelope,
        Err(message) => {
            let logs = read_logs(&mut context);
            return Ok(degraded(
                ExecutionStatus::RuntimeError,
                format!("Execution envelope could not be decoded: {}", message),
                logs,
                start,
            ));
        }
    };
    let logs = envelope.logs.into_iter().map(render_log_line).collect();

    // The engine has no interruption point, so overruns that beat the outer
    // deadline surface here.
    if elapsed_ms > limits.time_ms {
        return Ok(ExecutionOutcome {
            status: ExecutionStatus::Timeout,
            result: None,
            logs,
            mutated_args: envelope.mutated_args,
            tracked: envelope.tracked,
            error: Some(format!(
                "Execution timed out after {}ms (limit {}ms)",
                elapsed_ms, limits.time_ms
            )),
            time_ms: elapsed_ms,
        });
    }

    let status = if envelope.ok {
        ExecutionStatus::Completed
    } else {
        ExecutionStatus::RuntimeError
    };
    let result = if envelope.ok && envelope.result_defined {
        Some(envelope.result)
    } else {
        None
    };
    Ok(ExecutionOutcome {
        status,
        result,
        logs,
        mutated_args: envelope.mutated_args,
        tracked: envelope.tracked,
        error: envelope.error,
        time_ms: elapsed_ms,
    })
}

/// Compile gate: evaluate the prelude plus the candidate source once and
/// probe that the target function exists and is callable.
pub(crate) fn check_source(
    source: &str,
    function_name: &str,
    limits: &ExecutionLimits,
) -> Result<CompileResult, SandboxError> {
    let mut context = Context::default();
    install_prelude(&mut context)?;

    let start = Instant::now();
    if let Err(e) = context.eval(Source::from_bytes(source)) {
        return Ok(CompileResult {
            success: false,
            message: Some(e.to_string()),
        });
    }
    if start.elapsed().as_millis() as u32 > limits.time_ms {
        return Ok(CompileResult {
            success: false,
            message: Some(format!("Compilation timed out after {}ms", limits.time_ms)),
        });
    }

    let probe = format!("__checkFunction('{}')", escape_for_js_literal(function_name));
    let verdict = match context.eval(Source::from_bytes(&probe)) {
        Ok(value) => value,
        Err(e) => {
            return Ok(CompileResult {
                success: false,
                message: Some(e.to_string()),
            })
        }
    };
    let verdict = verdict
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_default();
    let message = match verdict.as_str() {
        "ok" => None,
        "missing" => Some(format!("Function '{}' is not defined", function_name)),
        _ => Some(format!("'{}' is not a function", function_name)),
    };
    Ok(CompileResult {
        success: message.is_none(),
        message,
    })
}

fn install_prelude(context: &mut Context) -> Result<(), SandboxError> {
    context
        .eval(Source::from_bytes(HARNESS))
        .map_err(|e| SandboxError::Harness(e.to_string()))?;
    Ok(())
}

fn call_payload(spec: &ExecutionSpec, limits: &ExecutionLimits) -> Value {
    let types: Vec<String> = spec
        .args
        .iter()
        .map(|(ty, _)| String::from(ty.clone()))
        .collect();
    let args: Vec<Value> = spec.args.iter().map(|(_, value)| value.clone()).collect();
    json!({
        "functionName": spec.function_name,
        "args": args,
        "types": types,
        "returnType": String::from(spec.return_type.clone()),
        "tracked": spec.tracked,
        "maxOutputBytes": limits.max_output_bytes,
    })
}

// Single-quoted literal escape: backslashes first, then quotes.
fn escape_for_js_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

fn decode_envelope(completion: &JsValue) -> Result<Envelope, String> {
    let Some(text) = completion.as_string().map(|s| s.to_std_string_escaped()) else {
        return Err("driver returned a non-string".to_string());
    };
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON from driver: {}", e))
}

fn degraded(
    status: ExecutionStatus,
    message: String,
    logs: Vec<String>,
    start: Instant,
) -> ExecutionOutcome {
    ExecutionOutcome {
        status,
        result: None,
        logs,
        mutated_args: Vec::new(),
        tracked: Map::new(),
        error: Some(message),
        time_ms: start.elapsed().as_millis() as u32,
    }
}

/// Best-effort log readback for paths where the driver never ran.
fn read_logs(context: &mut Context) -> Vec<String> {
    let Ok(completion) = context.eval(Source::from_bytes("__encodeLogs()")) else {
        return Vec::new();
    };
    let Some(text) = completion.as_string().map(|s| s.to_std_string_escaped()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => items.into_iter().map(render_log_line).collect(),
        _ => Vec::new(),
    }
}

fn render_log_line(item: Value) -> String {
    match item {
        Value::String(line) => line,
        other => other.to_string(),
    }
}

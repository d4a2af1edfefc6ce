//! Submission runner: the compile gate, then the ordered per-case loop.
//!
//! Cases run strictly in authored order and a failure never aborts the
//! loop; runtime errors, timeouts, and wrong answers all land in that
//! case's entry while the remaining cases still run. Only compile failure
//! (or an infrastructure fault) short-circuits the whole run.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::executer::{compile_check, ExecutionSpec, SandboxedExecuter, TrustedExecuter};
use crate::judge;
use crate::problem::Problem;

/// Overall status of one submission run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Compilation succeeded and every case was attempted
    Ok,
    /// The run never reached the cases
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "ok"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of one judged case
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    /// 1-based case number
    pub case: usize,
    pub passed: bool,
    pub input: Vec<Value>,
    pub expected: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

/// Report for one submission
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub results: Vec<CaseResult>,
    /// Compile or infrastructure error when status is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Run a submission against every test case of a problem.
pub async fn run_tests(problem: &Problem, code: &str) -> Result<RunReport> {
    let compiled = compile_check(code, &problem.function_name).await?;
    if !compiled.success {
        info!(
            "Compile check failed for problem {}: {}",
            problem.id,
            compiled.message.as_deref().unwrap_or("unknown error")
        );
        return Ok(RunReport {
            status: RunStatus::Error,
            results: Vec::new(),
            message: compiled.message,
        });
    }

    let sandboxed = SandboxedExecuter::new();
    let trusted = TrustedExecuter::default();
    let judge_spec = problem.judge_spec();

    let mut results = Vec::with_capacity(problem.tests.len());
    for (idx, case) in problem.tests.iter().enumerate() {
        let args: Vec<_> = case
            .input
            .iter()
            .enumerate()
            .map(|(i, value)| (problem.param_type_at(i), value.clone()))
            .collect();

        let spec = ExecutionSpec::new(code, &problem.function_name)
            .with_args(args)
            .with_return_type(problem.return_type.clone());

        let outcome = sandboxed.execute(&spec).await?;

        let (passed, actual, error) = if outcome.is_success() {
            let judgement =
                judge::judge_case(&judge_spec, case, &outcome, &problem.return_type, &trusted)
                    .await;
            (judgement.passed, judgement.actual, judgement.error)
        } else {
            (false, None, outcome.error.clone())
        };

        debug!(
            "Case {}/{}: passed={}, time={}ms",
            idx + 1,
            problem.tests.len(),
            passed,
            outcome.time_ms
        );

        results.push(CaseResult {
            case: idx + 1,
            passed,
            input: case.input.clone(),
            expected: case.output.clone(),
            actual,
            error,
            logs: outcome.logs,
        });
    }

    Ok(RunReport {
        status: RunStatus::Ok,
        results,
        message: None,
    })
}

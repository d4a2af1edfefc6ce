//! Execution layer over the embedded JavaScript engine.
//!
//! `SandboxedExecuter` runs untrusted candidate code under the submission
//! profile; `TrustedExecuter` runs problem-authored scripts (custom
//! validators, test-case generators) under the more generous generator
//! profile. Both drive the same engine. The engine is synchronous, so each
//! run happens on a blocking thread under a wall-clock timeout; a run that
//! overshoots the outer deadline is abandoned and reported as a timeout.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{timeout, Duration};
use tracing::warn;

use crate::problem::ParamType;
use crate::profiles;
use crate::sandbox;

/// Grace period past the profile limit before a run is abandoned. The
/// engine has no interruption point, so short overshoots are measured
/// post-hoc instead of killed.
const TIMEOUT_SLACK_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The call completed and its result was captured
    Completed,
    /// Candidate code threw, or its output could not be captured
    RuntimeError,
    /// Wall-clock budget exhausted
    Timeout,
}

/// Resource budget for one run
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Wall-clock limit in milliseconds
    pub time_ms: u32,
    /// Upper bound on any single encoded value crossing out of the engine
    pub max_output_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits {
            time_ms: 5_000,
            max_output_bytes: 1 << 20,
        }
    }
}

/// Everything observed from one function call
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    /// Return value; None when the function returned undefined
    pub result: Option<Value>,
    /// Captured console output, oldest first
    pub logs: Vec<String>,
    /// Post-call wire snapshot of every argument, argument order preserved
    pub mutated_args: Vec<Value>,
    /// Requested globals captured after the call
    pub tracked: serde_json::Map<String, Value>,
    /// Failure description for RuntimeError and Timeout
    pub error: Option<String>,
    /// Wall time spent inside the call, in milliseconds
    pub time_ms: u32,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub(crate) fn timed_out(time_ms: u32) -> Self {
        ExecutionOutcome {
            status: ExecutionStatus::Timeout,
            result: None,
            logs: Vec::new(),
            mutated_args: Vec::new(),
            tracked: serde_json::Map::new(),
            error: Some(format!("Execution timed out after {}ms", time_ms)),
            time_ms,
        }
    }
}

/// One function call against candidate or problem-authored source
#[derive(Debug, Clone)]
pub struct ExecutionSpec {
    pub source: String,
    pub function_name: String,
    /// Wire arguments paired with their declared types
    pub args: Vec<(ParamType, Value)>,
    /// Drives result encoding (node returns are walked back to arrays)
    pub return_type: ParamType,
    /// Global variable names to capture after the call
    pub tracked: Vec<String>,
    /// None applies the executer's default profile
    pub limits: Option<ExecutionLimits>,
}

impl ExecutionSpec {
    pub fn new(source: impl Into<String>, function_name: impl Into<String>) -> Self {
        ExecutionSpec {
            source: source.into(),
            function_name: function_name.into(),
            args: Vec::new(),
            return_type: ParamType::Other,
            tracked: Vec::new(),
            limits: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = (ParamType, Value)>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_return_type(mut self, return_type: ParamType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_tracked(mut self, tracked: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tracked = tracked.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Common interface over the sandboxed and trusted execution paths
#[async_trait]
pub trait Executer: Send + Sync {
    async fn run(&self, spec: &ExecutionSpec) -> Result<ExecutionOutcome>;
}

/// Runs untrusted candidate code under the submission profile
#[derive(Default)]
pub struct SandboxedExecuter;

impl SandboxedExecuter {
    pub fn new() -> Self {
        SandboxedExecuter
    }

    pub async fn execute(&self, spec: &ExecutionSpec) -> Result<ExecutionOutcome> {
        let limits = spec
            .limits
            .clone()
            .unwrap_or_else(|| profiles::get_profiles().submission.clone());
        run_blocking(spec.clone(), limits).await
    }
}

/// Runs problem-authored scripts: custom validators and generators
pub struct TrustedExecuter {
    /// Applied when a spec carries no explicit limits
    default_limits: ExecutionLimits,
}

impl TrustedExecuter {
    pub fn new(default_limits: ExecutionLimits) -> Self {
        TrustedExecuter { default_limits }
    }

    pub async fn execute(&self, spec: &ExecutionSpec) -> Result<ExecutionOutcome> {
        let limits = spec
            .limits
            .clone()
            .unwrap_or_else(|| self.default_limits.clone());
        run_blocking(spec.clone(), limits).await
    }
}

impl Default for TrustedExecuter {
    fn default() -> Self {
        TrustedExecuter::new(profiles::get_profiles().generator.clone())
    }
}

#[async_trait]
impl Executer for SandboxedExecuter {
    async fn run(&self, spec: &ExecutionSpec) -> Result<ExecutionOutcome> {
        self.execute(spec).await
    }
}

#[async_trait]
impl Executer for TrustedExecuter {
    async fn run(&self, spec: &ExecutionSpec) -> Result<ExecutionOutcome> {
        self.execute(spec).await
    }
}

async fn run_blocking(spec: ExecutionSpec, limits: ExecutionLimits) -> Result<ExecutionOutcome> {
    let budget_ms = limits.time_ms as u64 + TIMEOUT_SLACK_MS;
    let handle = tokio::task::spawn_blocking(move || sandbox::run_call(&spec, &limits));

    match timeout(Duration::from_millis(budget_ms), handle).await {
        Ok(joined) => {
            let outcome = joined.map_err(|e| anyhow::anyhow!("Sandbox task failed: {}", e))??;
            Ok(outcome)
        }
        Err(_) => {
            // The blocking thread is still running; it is left to finish on
            // its own while the worker moves on.
            warn!("Execution abandoned after {}ms", budget_ms);
            Ok(ExecutionOutcome::timed_out(budget_ms as u32))
        }
    }
}

/// Result of the compile gate
#[derive(Debug)]
pub struct CompileResult {
    pub success: bool,
    pub message: Option<String>,
}

/// Evaluate the candidate source once and verify the target function
/// exists. Runs under the compile profile, so non-terminating top-level
/// code is caught here rather than on every case.
pub async fn compile_check(source: &str, function_name: &str) -> Result<CompileResult> {
    let limits = profiles::get_profiles().compile.clone();
    let budget_ms = limits.time_ms as u64 + TIMEOUT_SLACK_MS;
    let source = source.to_string();
    let function_name = function_name.to_string();

    let handle =
        tokio::task::spawn_blocking(move || sandbox::check_source(&source, &function_name, &limits));

    match timeout(Duration::from_millis(budget_ms), handle).await {
        Ok(joined) => {
            let checked = joined.map_err(|e| anyhow::anyhow!("Compile task failed: {}", e))??;
            Ok(checked)
        }
        Err(_) => {
            warn!("Compile check abandoned after {}ms", budget_ms);
            Ok(CompileResult {
                success: false,
                message: Some(format!("Compilation timed out after {}ms", budget_ms)),
            })
        }
    }
}

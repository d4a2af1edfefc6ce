//! Generator-function runner for admin tooling.
//!
//! An AI-authored generator proposes extra test cases for a problem. The
//! generator runs once under the trusted profile with a context object
//! describing the problem; its output is validated strictly and the whole
//! batch is rejected on any violation, so a partially-bad batch never
//! reaches the database. For void problems the expected outputs do not
//! come from the generator at all: the known-passing solution is run on
//! each generated input and its mutated first argument becomes the output.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::executer::{Executer, ExecutionSpec, ExecutionStatus};
use crate::problem::{ParamType, Problem, TestCase};

/// Cases kept from one generator run; the rest are dropped with a warning
pub const MAX_GENERATED_CASES: usize = 100;

/// Entry point a generator must define
pub const GENERATOR_FUNCTION: &str = "generateTestCases";

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Generator failed: {0}")]
    Execution(String),
    #[error("Generator timed out")]
    Timeout,
    #[error("Generator returned {0} instead of an array of test cases")]
    NotAnArray(String),
    #[error("Generated case {0} is malformed: {1}")]
    MalformedCase(usize, String),
    #[error("Generated case {0} has no usable output: {1}")]
    MissingOutput(usize, String),
    /// Executer fault, not the job's fault; re-raised instead of folded
    /// into an unsuccessful result
    #[error(transparent)]
    Infra(#[from] anyhow::Error),
}

/// Generation job received from the queue
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateJob {
    pub problem_id: i64,
    /// Generator source; must define `generateTestCases`
    pub generator_code: String,
    /// A solution known to pass this problem, ground truth for void outputs
    pub passing_code: String,
    /// Free-form constraints forwarded to the generator
    #[serde(default)]
    pub constraints: Option<Value>,
    /// Prose description forwarded to the generator
    #[serde(default)]
    pub problem_context: Option<String>,
    pub problem: Problem,
}

/// Result of one generation batch
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResult {
    pub problem_id: i64,
    pub success: bool,
    pub cases: Vec<TestCase>,
    /// True when the generator produced more cases than the cap
    #[serde(default)]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Process a generation job. Domain failures come back as an unsuccessful
/// result; executer faults propagate as `Err` for the worker loop to
/// report, the same split the judge path makes.
pub async fn process_generate_job<E: Executer>(
    job: &GenerateJob,
    trusted: &E,
) -> Result<GenerateResult> {
    info!(
        "Generating test cases for problem {} ({} existing)",
        job.problem_id,
        job.problem.tests.len()
    );
    match run_generator(job, trusted).await {
        Ok((cases, truncated)) => Ok(GenerateResult {
            problem_id: job.problem_id,
            success: true,
            cases,
            truncated,
            error_message: None,
        }),
        Err(GeneratorError::Infra(e)) => Err(e),
        Err(e) => {
            warn!("Generation failed for problem {}: {}", job.problem_id, e);
            Ok(GenerateResult {
                problem_id: job.problem_id,
                success: false,
                cases: Vec::new(),
                truncated: false,
                error_message: Some(e.to_string()),
            })
        }
    }
}

/// Run the generator and validate everything it produced. All-or-nothing:
/// the first violation rejects the batch.
pub async fn run_generator<E: Executer>(
    job: &GenerateJob,
    trusted: &E,
) -> Result<(Vec<TestCase>, bool), GeneratorError> {
    let context = json!({
        "existingTests": job.problem.tests,
        "constraints": job.constraints,
        "parameters": job.problem.parameters,
        "passingCode": job.passing_code,
        "problemContext": job.problem_context,
    });

    let spec = ExecutionSpec::new(&job.generator_code, GENERATOR_FUNCTION)
        .with_args([(ParamType::Other, context)]);

    let outcome = trusted.run(&spec).await?;

    if !outcome.is_success() {
        return Err(match outcome.status {
            ExecutionStatus::Timeout => GeneratorError::Timeout,
            _ => GeneratorError::Execution(
                outcome.error.unwrap_or_else(|| "unknown error".to_string()),
            ),
        });
    }

    let raw = match outcome.result {
        Some(Value::Array(items)) => items,
        Some(other) => return Err(GeneratorError::NotAnArray(json_type_name(&other).to_string())),
        None => return Err(GeneratorError::NotAnArray("undefined".to_string())),
    };

    let truncated = raw.len() > MAX_GENERATED_CASES;
    if truncated {
        warn!(
            "Generator for problem {} produced {} cases, keeping the first {}",
            job.problem_id,
            raw.len(),
            MAX_GENERATED_CASES
        );
    }

    let mut cases = Vec::with_capacity(raw.len().min(MAX_GENERATED_CASES));
    for (idx, item) in raw.into_iter().take(MAX_GENERATED_CASES).enumerate() {
        cases.push(validate_case(job, trusted, idx, item).await?);
    }

    Ok((cases, truncated))
}

async fn validate_case<E: Executer>(
    job: &GenerateJob,
    trusted: &E,
    idx: usize,
    item: Value,
) -> Result<TestCase, GeneratorError> {
    let Value::Object(mut fields) = item else {
        return Err(GeneratorError::MalformedCase(
            idx,
            format!("expected an object, got {}", json_type_name(&item)),
        ));
    };

    let input = match fields.remove("input") {
        Some(Value::Array(input)) => input,
        Some(other) => {
            return Err(GeneratorError::MalformedCase(
                idx,
                format!("'input' must be an array, got {}", json_type_name(&other)),
            ))
        }
        None => return Err(GeneratorError::MalformedCase(idx, "missing 'input'".to_string())),
    };

    if input.len() != job.problem.parameters.len() {
        return Err(GeneratorError::MalformedCase(
            idx,
            format!(
                "'input' has {} values for {} parameters",
                input.len(),
                job.problem.parameters.len()
            ),
        ));
    }

    let output = if job.problem.return_type == ParamType::Void {
        synthesize_output(job, trusted, idx, &input).await?
    } else {
        match fields.get("output") {
            Some(v) if !v.is_null() => v.clone(),
            _ => {
                return Err(GeneratorError::MissingOutput(
                    idx,
                    "'output' is required for non-void problems".to_string(),
                ))
            }
        }
    };

    Ok(TestCase { input, output })
}

/// Run the known-passing solution on a generated input and take its
/// mutated first argument as the expected output.
async fn synthesize_output<E: Executer>(
    job: &GenerateJob,
    trusted: &E,
    idx: usize,
    input: &[Value],
) -> Result<Value, GeneratorError> {
    let args: Vec<_> = input
        .iter()
        .enumerate()
        .map(|(i, value)| (job.problem.param_type_at(i), value.clone()))
        .collect();

    let spec = ExecutionSpec::new(&job.passing_code, &job.problem.function_name)
        .with_args(args)
        .with_return_type(job.problem.return_type.clone());

    let outcome = trusted.run(&spec).await?;

    if !outcome.is_success() {
        return Err(GeneratorError::MissingOutput(
            idx,
            outcome
                .error
                .unwrap_or_else(|| "the passing solution failed on this input".to_string()),
        ));
    }

    match outcome.mutated_args.into_iter().next() {
        Some(first) => Ok(first),
        None => Err(GeneratorError::MissingOutput(
            idx,
            "the problem takes no arguments to mutate".to_string(),
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! Per-case judging.
//!
//! The judge kind is a closed variant on the problem and dispatch is an
//! exhaustive match; there is no plugin surface. Numbers compare after
//! rounding to five decimal places, recursively through arrays and
//! objects, which also collapses the integer/float representation split
//! so `2` equals `2.0`.

use serde_json::{Map, Value};
use tracing::debug;

use crate::bridge;
use crate::executer::{ExecutionOutcome, ExecutionSpec, TrustedExecuter};
use crate::problem::{JudgeSpec, ParamType, TestCase};

const ROUNDING_SCALE: f64 = 100_000.0;

/// Name the validator entry point a custom-script judge must define
pub const VALIDATOR_FUNCTION: &str = "validate";

/// Verdict for one judged case
#[derive(Debug)]
pub struct Judgement {
    pub passed: bool,
    /// Value reported to the learner as "actual"
    pub actual: Option<Value>,
    /// Judge-level failure, distinct from a plain wrong answer
    pub error: Option<String>,
}

impl Judgement {
    fn decided(passed: bool, actual: Option<Value>) -> Self {
        Judgement {
            passed,
            actual,
            error: None,
        }
    }

    fn error(actual: Option<Value>, message: impl Into<String>) -> Self {
        Judgement {
            passed: false,
            actual,
            error: Some(message.into()),
        }
    }
}

/// Judge one completed execution against its test case.
pub async fn judge_case(
    judge: &JudgeSpec,
    case: &TestCase,
    outcome: &ExecutionOutcome,
    return_type: &ParamType,
    trusted: &TrustedExecuter,
) -> Judgement {
    match judge {
        JudgeSpec::ReturnValue => judge_return_value(case, outcome, return_type),
        JudgeSpec::MutatingArrayWithK {
            array_param_index,
            k_is_return_value,
            ignore_order,
        } => judge_mutating_array(
            case,
            outcome,
            *array_param_index,
            *k_is_return_value,
            *ignore_order,
        ),
        JudgeSpec::CustomScript { script } => {
            judge_custom_script(script, case, outcome, trusted).await
        }
    }
}

fn judge_return_value(
    case: &TestCase,
    outcome: &ExecutionOutcome,
    return_type: &ParamType,
) -> Judgement {
    // An undefined return is reported (and compared) as null.
    let actual = outcome.result.clone().unwrap_or(Value::Null);
    let expected = match bridge::normalize_wire(&case.output, return_type) {
        Ok(v) => v,
        Err(e) => {
            return Judgement::error(Some(actual), format!("Expected output is malformed: {}", e))
        }
    };
    let passed = values_equal(&actual, &expected);
    Judgement::decided(passed, Some(actual))
}

fn judge_mutating_array(
    case: &TestCase,
    outcome: &ExecutionOutcome,
    array_param_index: usize,
    k_is_return_value: bool,
    ignore_order: bool,
) -> Judgement {
    let Some(mutated) = outcome.mutated_args.get(array_param_index) else {
        return Judgement::error(
            None,
            format!("Judge misconfigured: no argument at index {}", array_param_index),
        );
    };
    let Value::Array(mutated) = mutated else {
        return Judgement::error(
            Some(mutated.clone()),
            format!(
                "Argument {} is not an array after execution",
                array_param_index
            ),
        );
    };

    let kept = if k_is_return_value {
        let k = match outcome.result.as_ref().and_then(|v| v.as_f64()) {
            Some(k) if k >= 0.0 => k as usize,
            _ => {
                return Judgement::error(
                    Some(Value::Array(mutated.clone())),
                    "Expected a non-negative numeric return value for k",
                )
            }
        };
        &mutated[..k.min(mutated.len())]
    } else {
        &mutated[..]
    };

    let actual = Value::Array(kept.to_vec());

    let Value::Array(expected) = &case.output else {
        return Judgement::error(Some(actual), "Expected output is not an array");
    };

    let passed = if ignore_order {
        multiset_equal(kept, expected)
    } else {
        kept.len() == expected.len() && kept.iter().zip(expected).all(|(a, b)| values_equal(a, b))
    };
    Judgement::decided(passed, Some(actual))
}

/// Run the problem's validator with (input, expected, actual, mutatedArgs)
/// and take the truthiness of whatever it returns. A throwing or missing
/// validator fails the case with a judge error rather than the whole run.
async fn judge_custom_script(
    script: &str,
    case: &TestCase,
    outcome: &ExecutionOutcome,
    trusted: &TrustedExecuter,
) -> Judgement {
    let actual = outcome.result.clone();
    let args = vec![
        (ParamType::Array, Value::Array(case.input.clone())),
        (ParamType::Other, case.output.clone()),
        (ParamType::Other, actual.clone().unwrap_or(Value::Null)),
        (ParamType::Array, Value::Array(outcome.mutated_args.clone())),
    ];
    let spec = ExecutionSpec::new(script, VALIDATOR_FUNCTION).with_args(args);

    match trusted.execute(&spec).await {
        Ok(run) if run.is_success() => {
            let verdict = run.result.as_ref().map(is_truthy).unwrap_or(false);
            Judgement::decided(verdict, actual)
        }
        Ok(run) => {
            let message = run.error.unwrap_or_else(|| "validator failed".to_string());
            Judgement::error(actual, format!("Validator error: {}", message))
        }
        Err(e) => {
            debug!("Validator infrastructure failure: {:#}", e);
            Judgement::error(actual, format!("Validator error: {:#}", e))
        }
    }
}

/// Deep equality with numeric rounding on both sides.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    canonical(a) == canonical(b)
}

/// JavaScript truthiness on a JSON value: the validator contract is "any
/// truthy value passes". NaN cannot appear here since JSON has no NaN.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64().map(round5).and_then(serde_json::Number::from_f64) {
            Some(rounded) => Value::Number(rounded),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect::<Map<String, Value>>(),
        ),
        _ => value.clone(),
    }
}

fn round5(x: f64) -> f64 {
    (x * ROUNDING_SCALE).round() / ROUNDING_SCALE
}

/// Order-insensitive comparison. Elements are counted by their canonical
/// JSON rendering (object keys are already sorted by the serializer).
fn multiset_equal(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
    for item in a {
        *counts.entry(canonical(item).to_string()).or_insert(0) += 1;
    }
    for item in b {
        match counts.get_mut(&canonical(item).to_string()) {
            Some(n) => *n -= 1,
            None => return false,
        }
    }
    counts.values().all(|n| *n == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executer::ExecutionStatus;
    use serde_json::json;

    fn completed(result: Option<Value>, mutated_args: Vec<Value>) -> ExecutionOutcome {
        ExecutionOutcome {
            status: ExecutionStatus::Completed,
            result,
            logs: Vec::new(),
            mutated_args,
            tracked: Map::new(),
            error: None,
            time_ms: 1,
        }
    }

    fn case(input: Value, output: Value) -> TestCase {
        TestCase {
            input: match input {
                Value::Array(items) => items,
                other => vec![other],
            },
            output,
        }
    }

    #[test]
    fn test_values_equal_rounds_to_five_decimals() {
        assert!(values_equal(&json!(0.3), &json!(0.300004)));
        assert!(!values_equal(&json!(0.3), &json!(0.30002)));
        assert!(values_equal(&json!(2), &json!(2.0)));
        assert!(values_equal(
            &json!([[1.000001], { "a": 2 }]),
            &json!([[1.0], { "a": 2.0000049 }])
        ));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(values_equal(&json!("1"), &json!("1")));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_multiset_equal() {
        let a = vec![json!(1), json!(2), json!(2), json!(3)];
        let b = vec![json!(3), json!(2), json!(1), json!(2)];
        assert!(multiset_equal(&a, &b));

        let c = vec![json!(1), json!(2), json!(3), json!(3)];
        assert!(!multiset_equal(&a, &c));
        assert!(!multiset_equal(&a, &a[..3].to_vec()));
    }

    #[tokio::test]
    async fn test_return_value_judge() {
        let trusted = TrustedExecuter::default();
        let case = case(json!([[2, 7], 9]), json!([0, 1]));

        let outcome = completed(Some(json!([0, 1])), vec![json!([2, 7]), json!(9)]);
        let judgement = judge_case(
            &JudgeSpec::ReturnValue,
            &case,
            &outcome,
            &ParamType::Array,
            &trusted,
        )
        .await;
        assert!(judgement.passed);
        assert_eq!(judgement.actual, Some(json!([0, 1])));

        let outcome = completed(Some(json!([1, 0])), vec![json!([2, 7]), json!(9)]);
        let judgement = judge_case(
            &JudgeSpec::ReturnValue,
            &case,
            &outcome,
            &ParamType::Array,
            &trusted,
        )
        .await;
        assert!(!judgement.passed);
        assert!(judgement.error.is_none());
    }

    #[tokio::test]
    async fn test_return_value_normalizes_tree_expected() {
        let trusted = TrustedExecuter::default();
        // Author wrote redundant trailing nulls; the engine never emits them.
        let case = case(json!([[1]]), json!([1, null, null]));
        let outcome = completed(Some(json!([1])), vec![json!([1])]);
        let judgement = judge_case(
            &JudgeSpec::ReturnValue,
            &case,
            &outcome,
            &ParamType::TreeNode,
            &trusted,
        )
        .await;
        assert!(judgement.passed);
    }

    #[tokio::test]
    async fn test_return_value_null_matches_empty_list() {
        let trusted = TrustedExecuter::default();
        let case = case(json!([[]]), Value::Null);
        let outcome = completed(Some(json!([])), vec![json!([])]);
        let judgement = judge_case(
            &JudgeSpec::ReturnValue,
            &case,
            &outcome,
            &ParamType::ListNode,
            &trusted,
        )
        .await;
        assert!(judgement.passed);
    }

    #[tokio::test]
    async fn test_mutating_array_with_k() {
        let trusted = TrustedExecuter::default();
        let judge = JudgeSpec::MutatingArrayWithK {
            array_param_index: 0,
            k_is_return_value: true,
            ignore_order: false,
        };
        let case = case(json!([[3, 2, 2, 3], 3]), json!([2, 2]));

        // Entries past k are garbage by contract and must be ignored.
        let outcome = completed(Some(json!(2)), vec![json!([2, 2, 99, 99]), json!(3)]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Number, &trusted).await;
        assert!(judgement.passed);
        assert_eq!(judgement.actual, Some(json!([2, 2])));

        // k larger than the array is clamped.
        let outcome = completed(Some(json!(10)), vec![json!([2, 2]), json!(3)]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Number, &trusted).await;
        assert!(judgement.passed);

        // Non-numeric k is a judge error, not a crash.
        let outcome = completed(Some(json!("two")), vec![json!([2, 2]), json!(3)]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Number, &trusted).await;
        assert!(!judgement.passed);
        assert!(judgement.error.is_some());
    }

    #[tokio::test]
    async fn test_mutating_array_ignore_order() {
        let trusted = TrustedExecuter::default();
        let judge = JudgeSpec::MutatingArrayWithK {
            array_param_index: 0,
            k_is_return_value: false,
            ignore_order: true,
        };
        let case = case(json!([[3, 1, 2]]), json!([1, 2, 3]));

        let outcome = completed(None, vec![json!([2, 3, 1])]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Void, &trusted).await;
        assert!(judgement.passed);

        let outcome = completed(None, vec![json!([2, 3, 3])]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Void, &trusted).await;
        assert!(!judgement.passed);
    }

    #[tokio::test]
    async fn test_mutating_array_non_array_argument() {
        let trusted = TrustedExecuter::default();
        let judge = JudgeSpec::MutatingArrayWithK {
            array_param_index: 0,
            k_is_return_value: false,
            ignore_order: false,
        };
        let case = case(json!([5]), json!([5]));
        let outcome = completed(None, vec![json!(5)]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Void, &trusted).await;
        assert!(!judgement.passed);
        assert!(judgement
            .error
            .as_deref()
            .is_some_and(|e| e.contains("not an array")));
    }

    #[tokio::test]
    async fn test_custom_script_judge() {
        let trusted = TrustedExecuter::default();
        let script = r#"
            function validate(input, expected, actual, mutatedArgs) {
                return actual === expected * 2;
            }
        "#;
        let judge = JudgeSpec::CustomScript {
            script: script.to_string(),
        };
        let case = case(json!([3]), json!(21));

        let outcome = completed(Some(json!(42)), vec![json!(3)]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Number, &trusted).await;
        assert!(judgement.passed);

        let outcome = completed(Some(json!(41)), vec![json!(3)]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Number, &trusted).await;
        assert!(!judgement.passed);
        assert!(judgement.error.is_none());
    }

    #[tokio::test]
    async fn test_custom_script_truthy_verdicts() {
        let trusted = TrustedExecuter::default();
        let script = "function validate() { return 'looks fine'; }";
        let judge = JudgeSpec::CustomScript {
            script: script.to_string(),
        };
        let case = case(json!([1]), json!(1));
        let outcome = completed(Some(json!(1)), vec![json!(1)]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Number, &trusted).await;
        assert!(judgement.passed);

        let script = "function validate() { return 0; }";
        let judge = JudgeSpec::CustomScript {
            script: script.to_string(),
        };
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Number, &trusted).await;
        assert!(!judgement.passed);
    }

    #[tokio::test]
    async fn test_custom_script_throw_is_judge_error() {
        let trusted = TrustedExecuter::default();
        let judge = JudgeSpec::CustomScript {
            script: "function validate() { throw new Error('bad validator'); }".to_string(),
        };
        let case = case(json!([1]), json!(1));
        let outcome = completed(Some(json!(1)), vec![json!(1)]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Number, &trusted).await;
        assert!(!judgement.passed);
        assert!(judgement
            .error
            .as_deref()
            .is_some_and(|e| e.contains("bad validator")));
    }

    #[tokio::test]
    async fn test_custom_script_missing_validate() {
        let trusted = TrustedExecuter::default();
        let judge = JudgeSpec::CustomScript {
            script: "function check() { return true; }".to_string(),
        };
        let case = case(json!([1]), json!(1));
        let outcome = completed(Some(json!(1)), vec![json!(1)]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Number, &trusted).await;
        assert!(!judgement.passed);
        assert!(judgement
            .error
            .as_deref()
            .is_some_and(|e| e.contains("not defined")));
    }

    #[tokio::test]
    async fn test_custom_script_sees_mutated_args() {
        let trusted = TrustedExecuter::default();
        let script = r#"
            function validate(input, expected, actual, mutatedArgs) {
                return mutatedArgs[0][0] === 9;
            }
        "#;
        let judge = JudgeSpec::CustomScript {
            script: script.to_string(),
        };
        let case = case(json!([[1, 2]]), Value::Null);
        let outcome = completed(None, vec![json!([9, 2])]);
        let judgement = judge_case(&judge, &case, &outcome, &ParamType::Void, &trusted).await;
        assert!(judgement.passed);
    }
}

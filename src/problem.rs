//! Problem model shared across the judging pipeline.
//!
//! Problems are authored in the web app and arrive inline on queue jobs,
//! which is why every wire name is camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a function parameter or return value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum ParamType {
    Number,
    String,
    Boolean,
    Array,
    ListNode,
    TreeNode,
    /// Return type of functions judged by argument mutation
    Void,
    /// Anything else is passed through untouched
    #[default]
    Other,
}

impl From<String> for ParamType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "number" => ParamType::Number,
            "string" => ParamType::String,
            "boolean" => ParamType::Boolean,
            "array" => ParamType::Array,
            "ListNode" => ParamType::ListNode,
            "TreeNode" => ParamType::TreeNode,
            "void" => ParamType::Void,
            _ => ParamType::Other,
        }
    }
}

impl From<ParamType> for String {
    fn from(t: ParamType) -> Self {
        match t {
            ParamType::Number => "number",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::ListNode => "ListNode",
            ParamType::TreeNode => "TreeNode",
            ParamType::Void => "void",
            ParamType::Other => "unknown",
        }
        .to_string()
    }
}

/// One declared function parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
}

/// One test case: positional arguments and the expected output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Vec<Value>,
    /// Absent on the wire means null (JSON cannot carry undefined)
    #[serde(default)]
    pub output: Value,
}

/// How a case is decided once the candidate function has run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JudgeSpec {
    /// Compare the return value against the expected output
    #[default]
    ReturnValue,
    /// Judge the post-call contents of an array argument
    #[serde(rename_all = "camelCase")]
    MutatingArrayWithK {
        #[serde(default)]
        array_param_index: usize,
        /// Truncate the mutated array to the first k = return-value elements
        #[serde(default)]
        k_is_return_value: bool,
        /// Compare as a multiset instead of element-wise
        #[serde(default)]
        ignore_order: bool,
    },
    /// Problem-authored validator script decides the case
    CustomScript { script: String },
}

/// A problem as the web app defines it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: i64,
    /// Name of the function the candidate must define
    pub function_name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub return_type: ParamType,
    /// None means the default return-value judge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeSpec>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl Problem {
    /// The judge to apply, defaulting to return-value comparison
    pub fn judge_spec(&self) -> JudgeSpec {
        self.judge.clone().unwrap_or_default()
    }

    /// Declared type of the parameter at `idx`; extra positional inputs
    /// beyond the declared list are passed through untouched
    pub fn param_type_at(&self, idx: usize) -> ParamType {
        self.parameters
            .get(idx)
            .map(|p| p.param_type.clone())
            .unwrap_or(ParamType::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_problem_deserialization() {
        let problem: Problem = serde_json::from_value(json!({
            "id": 42,
            "functionName": "twoSum",
            "parameters": [
                { "name": "nums", "type": "array" },
                { "name": "target", "type": "number" }
            ],
            "returnType": "array",
            "tests": [
                { "input": [[2, 7, 11, 15], 9], "output": [0, 1] }
            ]
        }))
        .unwrap();

        assert_eq!(problem.function_name, "twoSum");
        assert_eq!(problem.parameters.len(), 2);
        assert_eq!(problem.param_type_at(0), ParamType::Array);
        assert_eq!(problem.param_type_at(1), ParamType::Number);
        assert_eq!(problem.param_type_at(9), ParamType::Other);
        assert_eq!(problem.return_type, ParamType::Array);
        assert!(matches!(problem.judge_spec(), JudgeSpec::ReturnValue));
    }

    #[test]
    fn test_unknown_param_type_passes_through() {
        let param: Parameter =
            serde_json::from_value(json!({ "name": "grid", "type": "matrix" })).unwrap();
        assert_eq!(param.param_type, ParamType::Other);
    }

    #[test]
    fn test_judge_spec_tagged_variants() {
        let judge: JudgeSpec = serde_json::from_value(json!({
            "type": "mutating-array-with-k",
            "arrayParamIndex": 1,
            "kIsReturnValue": true
        }))
        .unwrap();

        match judge {
            JudgeSpec::MutatingArrayWithK {
                array_param_index,
                k_is_return_value,
                ignore_order,
            } => {
                assert_eq!(array_param_index, 1);
                assert!(k_is_return_value);
                assert!(!ignore_order);
            }
            other => panic!("unexpected judge: {:?}", other),
        }

        let judge: JudgeSpec = serde_json::from_value(json!({
            "type": "custom-script",
            "script": "function validate() { return true; }"
        }))
        .unwrap();
        assert!(matches!(judge, JudgeSpec::CustomScript { .. }));

        let judge: JudgeSpec = serde_json::from_value(json!({ "type": "return-value" })).unwrap();
        assert!(matches!(judge, JudgeSpec::ReturnValue));
    }

    #[test]
    fn test_test_case_output_defaults_to_null() {
        let case: TestCase = serde_json::from_value(json!({ "input": [1] })).unwrap();
        assert!(case.output.is_null());
    }

    #[test]
    fn test_void_return_type() {
        let problem: Problem = serde_json::from_value(json!({
            "id": 7,
            "functionName": "rotate",
            "parameters": [{ "name": "nums", "type": "array" }],
            "returnType": "void"
        }))
        .unwrap();
        assert_eq!(problem.return_type, ParamType::Void);
        assert!(problem.tests.is_empty());
    }
}

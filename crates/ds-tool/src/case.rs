use serde::{Deserialize, Serialize};

pub const TESTCASE_SCHEMA_V1: &str = "ds-tool-case.v1";
pub const TESTCASE_FILE: &str = "testcase.json";
pub const DEFAULT_SCRIPT: &str = "main.ds";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    /// Script file, relative to the case directory.
    #[serde(default = "default_script")]
    pub script: String,
    /// JSON object seeding the global namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globals: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(default)]
    pub expected_output: Vec<String>,
    /// Script-visible kind name, e.g. `NotFoundError`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_error: Option<String>,
}

fn default_script() -> String {
    DEFAULT_SCRIPT.to_string()
}

#[cfg(test)]
mod case_tests {
    use super::*;

    #[test]
    fn testcase_deserialize_applies_defaults() {
        let parsed: TestCase = serde_json::from_str(
            r#"{
  "schemaVersion": "ds-tool-case.v1",
  "expectedOutput": ["a"]
}"#,
        )
        .expect("testcase should deserialize");

        assert_eq!(parsed.schema_version, TESTCASE_SCHEMA_V1);
        assert_eq!(parsed.script, "main.ds");
        assert_eq!(parsed.expected_output, vec!["a"]);
        assert!(parsed.globals.is_none());
        assert!(parsed.max_steps.is_none());
        assert!(parsed.expected_error.is_none());
    }

    #[test]
    fn testcase_reads_optional_fields() {
        let parsed: TestCase = serde_json::from_str(
            r#"{
  "schemaVersion": "ds-tool-case.v1",
  "script": "other.ds",
  "globals": {"level": 2},
  "maxSteps": 40,
  "expectedError": "GuardError"
}"#,
        )
        .expect("testcase should deserialize");

        assert_eq!(parsed.script, "other.ds");
        assert_eq!(parsed.globals, Some(serde_json::json!({"level": 2})));
        assert_eq!(parsed.max_steps, Some(40));
        assert_eq!(parsed.expected_error.as_deref(), Some("GuardError"));
        assert!(parsed.expected_output.is_empty());
    }
}

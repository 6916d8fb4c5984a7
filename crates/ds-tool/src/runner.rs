use std::path::Path;

use ds_api::{run, CreateProcessOptions};
use ds_core::{ErrorKind, ScriptError};

use crate::source::{read_script, read_test_case};
use crate::{TestCase, ToolError, TESTCASE_FILE};

pub const DEFAULT_MAX_STEPS: usize = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub output: Vec<String>,
    pub error: Option<ScriptError>,
    pub steps: usize,
}

/// Runs the case's script. Script failures land in the report, only I/O
/// problems are errors here.
pub fn run_case(case_dir: &Path, case: &TestCase) -> Result<CaseReport, ToolError> {
    let source = read_script(case_dir, case)?;
    let report = run(CreateProcessOptions {
        source,
        globals_json: case.globals.clone(),
        max_steps: Some(case.max_steps.unwrap_or(DEFAULT_MAX_STEPS)),
        ..CreateProcessOptions::default()
    });
    Ok(CaseReport {
        output: report.output,
        error: report.error,
        steps: report.steps,
    })
}

pub fn assert_case(case_dir: &Path) -> Result<CaseReport, ToolError> {
    let case = read_test_case(&case_dir.join(TESTCASE_FILE))?;
    let report = run_case(case_dir, &case)?;

    match (&case.expected_error, &report.error) {
        (Some(expected), actual) => {
            let kind = ErrorKind::from_name(expected).ok_or_else(|| {
                ToolError::UnknownErrorKind {
                    name: expected.clone(),
                }
            })?;
            match actual {
                None => {
                    return Err(ToolError::MissingError {
                        expected: expected.clone(),
                    })
                }
                Some(error) if error.kind != kind => {
                    return Err(ToolError::ErrorKindMismatch {
                        expected: expected.clone(),
                        actual: error.to_string(),
                    })
                }
                Some(_) => {}
            }
        }
        (None, Some(error)) => return Err(ToolError::Script(error.clone())),
        (None, None) => {}
    }

    let lines = case.expected_output.len().max(report.output.len());
    for index in 0..lines {
        let expected = case.expected_output.get(index);
        let actual = report.output.get(index);
        if expected != actual {
            return Err(ToolError::OutputMismatch {
                index,
                expected: expected.cloned(),
                actual: actual.cloned(),
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod runner_tests {
    use super::*;

    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn case_dir(name: &str, script: &str, case: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("ds-tool-runner-{}-{}", name, nanos));
        fs::create_dir_all(&root).expect("root should be created");
        fs::write(root.join("main.ds"), script).expect("script should be written");
        fs::write(root.join(TESTCASE_FILE), case).expect("case should be written");
        root
    }

    #[test]
    fn assert_case_passes_on_matching_output() {
        let root = case_dir(
            "ok",
            "print \"a\"\nprint 1 + 1\n",
            r#"{"schemaVersion":"ds-tool-case.v1","expectedOutput":["a","2"]}"#,
        );
        let report = assert_case(&root).expect("case should pass");
        assert_eq!(report.steps, 2);
    }

    #[test]
    fn assert_case_reports_the_first_differing_line() {
        let root = case_dir(
            "mismatch",
            "print 1\nprint 2\n",
            r#"{"schemaVersion":"ds-tool-case.v1","expectedOutput":["1"]}"#,
        );
        match assert_case(&root).expect_err("extra line") {
            ToolError::OutputMismatch {
                index,
                expected,
                actual,
            } => {
                assert_eq!(index, 1);
                assert_eq!(expected, None);
                assert_eq!(actual.as_deref(), Some("2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn expected_errors_are_matched_by_kind_name() {
        let root = case_dir(
            "expected-error",
            "print 1\nx = nothing\n",
            r#"{"schemaVersion":"ds-tool-case.v1","expectedOutput":["1"],"expectedError":"NotFoundError"}"#,
        );
        let report = assert_case(&root).expect("error expected");
        assert_eq!(report.error.expect("error").kind, ErrorKind::NotFound);

        let wrong = case_dir(
            "wrong-kind",
            "x = nothing\n",
            r#"{"schemaVersion":"ds-tool-case.v1","expectedError":"TypeError"}"#,
        );
        assert!(matches!(
            assert_case(&wrong).expect_err("kind differs"),
            ToolError::ErrorKindMismatch { .. }
        ));

        let unknown = case_dir(
            "unknown-kind",
            "pass\n",
            r#"{"schemaVersion":"ds-tool-case.v1","expectedError":"Oops"}"#,
        );
        assert!(matches!(
            assert_case(&unknown).expect_err("unknown kind"),
            ToolError::UnknownErrorKind { .. }
        ));

        let missing = case_dir(
            "missing-error",
            "pass\n",
            r#"{"schemaVersion":"ds-tool-case.v1","expectedError":"Error"}"#,
        );
        assert!(matches!(
            assert_case(&missing).expect_err("no error"),
            ToolError::MissingError { .. }
        ));
    }

    #[test]
    fn unexpected_script_errors_fail_the_case() {
        let root = case_dir(
            "unexpected",
            "throw \"nope\"\n",
            r#"{"schemaVersion":"ds-tool-case.v1"}"#,
        );
        match assert_case(&root).expect_err("thrown") {
            ToolError::Script(error) => assert_eq!(error.message, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn max_steps_and_globals_reach_the_process() {
        let root = case_dir(
            "options",
            "while True: pass\n",
            r#"{"schemaVersion":"ds-tool-case.v1","maxSteps":25,"expectedError":"GuardError"}"#,
        );
        let report = assert_case(&root).expect("guard");
        assert_eq!(report.steps, 25);

        let seeded = case_dir(
            "globals",
            "print level + 1\n",
            r#"{"schemaVersion":"ds-tool-case.v1","globals":{"level":4},"expectedOutput":["5"]}"#,
        );
        assert_case(&seeded).expect("globals");
    }
}

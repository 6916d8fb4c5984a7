mod case;
mod runner;
mod source;

pub use case::{TestCase, DEFAULT_SCRIPT, TESTCASE_FILE, TESTCASE_SCHEMA_V1};
pub use runner::{assert_case, run_case, CaseReport, DEFAULT_MAX_STEPS};
pub use source::{discover_cases, read_script, read_test_case};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse testcase {path}: {source}")]
    ParseCase {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid testcase schema version \"{found}\", expected \"{expected}\".")]
    InvalidSchemaVersion { expected: String, found: String },
    #[error("No {file} found under {path}.")]
    NoCases { file: String, path: PathBuf },
    #[error("Unknown error kind \"{name}\" in expectedError.")]
    UnknownErrorKind { name: String },
    #[error("Script failed: {0}")]
    Script(#[from] ds_core::ScriptError),
    #[error("Expected {expected} but the script finished without an error.")]
    MissingError { expected: String },
    #[error("Expected {expected} but the script failed with {actual}.")]
    ErrorKindMismatch { expected: String, actual: String },
    #[error("Output mismatch at line {index}. expected={expected:?} actual={actual:?}")]
    OutputMismatch {
        index: usize,
        expected: Option<String>,
        actual: Option<String>,
    },
}

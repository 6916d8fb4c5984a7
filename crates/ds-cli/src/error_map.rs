use std::path::PathBuf;

use ds_core::ScriptError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("Source does not exist: {path}")]
    SourceNotFound { path: PathBuf },
    #[error("Source is not a directory: {path}")]
    SourceNotDir { path: PathBuf },
    #[error("Failed to read {path}: {source}")]
    SourceRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to scan scripts: {0}")]
    SourceScan(#[from] walkdir::Error),
    #[error("No .ds files under {path}")]
    SourceEmpty { path: PathBuf },
    #[error("Invalid globals JSON: {0}")]
    GlobalsJson(#[source] serde_json::Error),
    #[error("Invalid filter: {0}")]
    Filter(#[from] regex::Error),
    #[error("Failed to encode JSON: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CliError {
    /// Value of the `ERROR_KIND:` line: the script-visible kind name for
    /// script errors, a `CLI_*` code otherwise.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Script(error) => error.kind.name(),
            Self::SourceNotFound { .. } => "CLI_SOURCE_NOT_FOUND",
            Self::SourceNotDir { .. } => "CLI_SOURCE_NOT_DIR",
            Self::SourceRead { .. } => "CLI_SOURCE_READ",
            Self::SourceScan(_) => "CLI_SOURCE_SCAN",
            Self::SourceEmpty { .. } => "CLI_SOURCE_EMPTY",
            Self::GlobalsJson(_) => "CLI_GLOBALS_INVALID",
            Self::Filter(_) => "CLI_FILTER_INVALID",
            Self::Encode(_) => "CLI_ENCODE",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Script(error) => error.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Script(error) => error.span.as_ref().map(|span| span.start.line),
            _ => None,
        }
    }
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

pub(crate) fn emit_error(error: CliError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_KIND:{}", error.kind_name());
    if let Some(line) = error.line() {
        println!("ERROR_LINE:{}", line);
    }
    println!("ERROR_MSG_JSON:{}", json_string(&error.message()));
    1
}

#[cfg(test)]
mod error_map_tests {
    use super::*;
    use ds_core::{ErrorKind, SourceLocation, SourceSpan};

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(CliError::SourceEmpty {
            path: PathBuf::from("/tmp"),
        });
        assert_eq!(code, 1);
    }

    #[test]
    fn script_errors_report_their_kind_and_line() {
        let error = CliError::from(ScriptError::with_span(
            ErrorKind::NotFound,
            "Identifier \"x\" not found.",
            SourceSpan::at(SourceLocation { line: 3, column: 1 }),
        ));
        assert_eq!(error.kind_name(), "NotFoundError");
        assert_eq!(error.message(), "Identifier \"x\" not found.");
        assert_eq!(error.line(), Some(3));
    }

    #[test]
    fn cli_errors_keep_their_codes() {
        let read = CliError::SourceRead {
            path: PathBuf::from("a.ds"),
            source: std::io::Error::other("denied"),
        };
        assert_eq!(read.kind_name(), "CLI_SOURCE_READ");
        assert!(read.message().contains("a.ds"));
        assert_eq!(read.line(), None);

        let invalid = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        assert_eq!(CliError::GlobalsJson(invalid).kind_name(), "CLI_GLOBALS_INVALID");

        let filter = regex::Regex::new("(").expect_err("invalid regex");
        assert_eq!(CliError::from(filter).kind_name(), "CLI_FILTER_INVALID");
    }

    #[test]
    fn json_string_escapes() {
        assert_eq!(json_string("a \"b\"\n"), "\"a \\\"b\\\"\\n\"");
    }
}

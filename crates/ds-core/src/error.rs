use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SourceSpan;

/// Every failure the runtime can surface to a host or a script `catch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Syntax,
    Type,
    ModeViolation,
    ReadOnly,
    IllegalIndex,
    OutOfBounds,
    NotFound,
    Name,
    DuplicateArgument,
    MissingArgument,
    ArgumentCount,
    Arithmetic,
    Deserialization,
    Jump,
    Thrown,
    Guard,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 16] = [
        ErrorKind::Syntax,
        ErrorKind::Type,
        ErrorKind::ModeViolation,
        ErrorKind::ReadOnly,
        ErrorKind::IllegalIndex,
        ErrorKind::OutOfBounds,
        ErrorKind::NotFound,
        ErrorKind::Name,
        ErrorKind::DuplicateArgument,
        ErrorKind::MissingArgument,
        ErrorKind::ArgumentCount,
        ErrorKind::Arithmetic,
        ErrorKind::Deserialization,
        ErrorKind::Jump,
        ErrorKind::Thrown,
        ErrorKind::Guard,
    ];

    /// Name used by `catch` clauses and by the CLI error report.
    pub fn name(self) -> &'static str {
        match self {
            Self::Syntax => "SyntaxError",
            Self::Type => "TypeError",
            Self::ModeViolation => "ModeViolationError",
            Self::ReadOnly => "ReadOnlyError",
            Self::IllegalIndex => "IllegalIndexError",
            Self::OutOfBounds => "OutOfBoundsError",
            Self::NotFound => "NotFoundError",
            Self::Name => "NameError",
            Self::DuplicateArgument => "DuplicateArgumentError",
            Self::MissingArgument => "MissingArgumentError",
            Self::ArgumentCount => "ArgumentCountError",
            Self::Arithmetic => "ArithmeticError",
            Self::Deserialization => "DeserializationError",
            Self::Jump => "JumpError",
            Self::Thrown => "Error",
            Self::Guard => "GuardError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(kind: ErrorKind, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Some(span),
        }
    }

    /// Attaches `span` unless the error already points somewhere more precise.
    pub fn or_span(mut self, span: &SourceSpan) -> Self {
        if self.span.is_none() {
            self.span = Some(span.clone());
        }
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;
    use crate::types::SourceLocation;

    #[test]
    fn kind_names_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ErrorKind::from_name("NoSuchError"), None);
        assert_eq!(ErrorKind::Thrown.name(), "Error");
        assert_eq!(ErrorKind::from_name("NameError"), Some(ErrorKind::Name));
    }

    #[test]
    fn display_includes_kind_and_message() {
        let error = ScriptError::new(ErrorKind::NotFound, "Identifier \"x\" not found.");
        assert_eq!(error.to_string(), "NotFoundError: Identifier \"x\" not found.");
    }

    #[test]
    fn or_span_keeps_existing_location() {
        let inner = SourceSpan::at(SourceLocation { line: 3, column: 4 });
        let outer = SourceSpan::at(SourceLocation { line: 1, column: 1 });
        let error = ScriptError::with_span(ErrorKind::Syntax, "bad", inner.clone()).or_span(&outer);
        assert_eq!(error.span, Some(inner));

        let error = ScriptError::new(ErrorKind::Syntax, "bad").or_span(&outer);
        assert_eq!(error.span, Some(outer));
    }
}

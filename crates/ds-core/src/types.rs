use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ScriptError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn synthetic() -> Self {
        Self {
            start: SourceLocation { line: 1, column: 1 },
            end: SourceLocation { line: 1, column: 1 },
        }
    }

    pub fn at(location: SourceLocation) -> Self {
        Self {
            start: location,
            end: location,
        }
    }
}

pub type StatementId = usize;

/// Literal operand of an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Constant {
    None,
    Number(f64),
    Boolean(bool),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOperator {
    Negate,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    In,
}

/// One postfix instruction. Expressions are flat op lists so evaluation can
/// stop at a script call and continue from the same `pc` later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ExprOp {
    Push { value: Constant },
    Load { name: String },
    LoadRef { path: Vec<String> },
    Member { name: String },
    Index,
    Unary { operator: UnaryOperator },
    Binary { operator: BinaryOperator },
    /// Jumps keeping the operand when it is false, otherwise pops it.
    JumpIfFalse { target: usize },
    /// Jumps keeping the operand when it is true, otherwise pops it.
    JumpIfTrue { target: usize },
    MakeArray { count: usize },
    MakeDictionary { count: usize },
    Call { positional: usize, labels: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub ops: Vec<ExprOp>,
    pub location: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignOperator {
    /// `=`
    Set,
    /// `:=`
    Local,
    /// `?=`
    Weak,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StatementKind {
    Expression {
        expr: Expression,
    },
    /// With `indices > 0`, `value` evaluates to `[index_1, .., index_n, rhs]`.
    Assign {
        path: Vec<String>,
        operator: AssignOperator,
        indices: usize,
        value: Expression,
        constant: bool,
    },
    /// `args` evaluates to an array of the printed values.
    Print {
        args: Expression,
    },
    If {
        condition: Expression,
        then_body: Option<StatementId>,
        else_body: Option<StatementId>,
    },
    While {
        condition: Expression,
        body: Option<StatementId>,
    },
    For {
        variable: String,
        iterable: Expression,
        body: Option<StatementId>,
    },
    Break {
        count: usize,
    },
    Continue,
    Pass,
    Return {
        value: Option<Expression>,
    },
    Throw {
        value: Option<Expression>,
    },
    /// The statement following a try is always its first catch.
    Try {
        body: Option<StatementId>,
    },
    Catch {
        error_kind: Option<String>,
        variable: Option<String>,
        body: Option<StatementId>,
        chain_end: StatementId,
    },
    /// `defaults` evaluates to a dictionary of parameter name to default value.
    Def {
        name: String,
        params: Vec<String>,
        defaults: Expression,
        body: Option<StatementId>,
    },
    Record {
        path: Vec<String>,
    },
    Delete {
        paths: Vec<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub next: Option<StatementId>,
    pub location: SourceSpan,
}

/// A statement graph: statements reference each other by index and know only
/// their successor in normal flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub entry: Option<StatementId>,
}

impl Program {
    pub fn statement(&self, id: StatementId) -> Result<&Statement, ScriptError> {
        self.statements.get(id).ok_or_else(|| {
            ScriptError::new(
                ErrorKind::NotFound,
                format!("Statement #{} is not part of the program.", id),
            )
        })
    }

    pub fn next_of(&self, id: StatementId) -> Result<Option<StatementId>, ScriptError> {
        Ok(self.statement(id)?.next)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

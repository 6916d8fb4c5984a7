use ds_core::{
    AssignOperator, Constant, ErrorKind, ExprOp, Expression, ScriptError, SourceLocation,
    SourceSpan, StatementKind,
};
use ds_parser::{token_to_number, Token, TokenKind};

use crate::expr::{compile_expression, compile_list, span_of, syntax_error, ExprParser};

/// Parsed statement before it is laid out as a graph.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Simple {
        kind: StatementKind,
        span: SourceSpan,
    },
    If {
        branches: Vec<Branch>,
        else_body: Option<Vec<Node>>,
        span: SourceSpan,
    },
    While {
        condition: Expression,
        body: Vec<Node>,
        span: SourceSpan,
    },
    For {
        variable: String,
        iterable: Expression,
        body: Vec<Node>,
        span: SourceSpan,
    },
    Def {
        name: String,
        params: Vec<String>,
        defaults: Expression,
        body: Vec<Node>,
        span: SourceSpan,
    },
    Try {
        body: Vec<Node>,
        catches: Vec<CatchClause>,
        span: SourceSpan,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub condition: Expression,
    pub body: Vec<Node>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub(crate) struct CatchClause {
    pub error_kind: Option<String>,
    pub variable: Option<String>,
    pub body: Vec<Node>,
    pub span: SourceSpan,
}

/// A compound whose body is still being collected; closed by `end`.
#[derive(Debug)]
enum Open {
    Root,
    If {
        branches: Vec<Branch>,
        else_body: Option<Vec<Node>>,
        span: SourceSpan,
    },
    While {
        condition: Expression,
        span: SourceSpan,
    },
    For {
        variable: String,
        iterable: Expression,
        span: SourceSpan,
    },
    Def {
        name: String,
        params: Vec<String>,
        defaults: Expression,
        span: SourceSpan,
    },
    Try {
        body: Option<Vec<Node>>,
        catches: Vec<CatchClause>,
        span: SourceSpan,
    },
}

#[derive(Debug)]
struct Frame {
    open: Open,
    nodes: Vec<Node>,
    location: SourceLocation,
}

/// Builds the statement tree one token statement at a time, keeping a stack
/// of the compounds that still await their `end`.
#[derive(Debug)]
pub(crate) struct TreeBuilder {
    stack: Vec<Frame>,
}

enum Head<'t> {
    Block,
    Inline(&'t [Token]),
}

impl TreeBuilder {
    pub(crate) fn new() -> Self {
        Self {
            stack: vec![Frame {
                open: Open::Root,
                nodes: Vec::new(),
                location: SourceLocation { line: 1, column: 1 },
            }],
        }
    }

    pub(crate) fn finish(mut self) -> Result<Vec<Node>, ScriptError> {
        if self.stack.len() > 1 {
            let frame = self.stack.last().map(|frame| frame.location);
            return Err(ScriptError::with_span(
                ErrorKind::Syntax,
                "Compound statement is missing its 'end'.",
                SourceSpan::at(frame.unwrap_or(SourceLocation { line: 1, column: 1 })),
            ));
        }
        match self.stack.pop() {
            Some(frame) => Ok(frame.nodes),
            None => Ok(Vec::new()),
        }
    }

    fn top(&mut self) -> &mut Frame {
        let index = self.stack.len() - 1;
        &mut self.stack[index]
    }

    fn push_node(&mut self, node: Node) {
        self.top().nodes.push(node);
    }

    pub(crate) fn statement(&mut self, tokens: &[Token]) -> Result<(), ScriptError> {
        let Some(first) = tokens.first() else {
            return Ok(());
        };
        let location = first.location;
        let span = span_of(tokens);

        if first.kind == TokenKind::Keyword {
            match first.text.as_str() {
                "if" => return self.open_if(tokens, span),
                "elsif" => return self.elsif(tokens, span),
                "else" => return self.else_clause(tokens, span),
                "while" => {
                    let (head, body) = split_head(&tokens[1..]);
                    let condition = compile_expression(head, location)?;
                    return self.open(
                        Open::While { condition, span },
                        body,
                        location,
                    );
                }
                "for" => return self.open_for(tokens, span),
                "def" => return self.open_def(tokens, span),
                "try" => {
                    let (head, body) = split_head(&tokens[1..]);
                    expect_empty(head, location)?;
                    return self.open(
                        Open::Try {
                            body: None,
                            catches: Vec::new(),
                            span,
                        },
                        body,
                        location,
                    );
                }
                "catch" => return self.catch_clause(tokens, span),
                "end" => {
                    expect_empty(&tokens[1..], location)?;
                    return self.close(first);
                }
                _ => {}
            }
        }

        let node = simple_statement(tokens)?;
        self.push_node(node);
        Ok(())
    }

    /// Pushes a compound. An inline body completes it immediately.
    fn open(&mut self, open: Open, body: Head<'_>, location: SourceLocation) -> Result<(), ScriptError> {
        self.stack.push(Frame {
            open,
            nodes: Vec::new(),
            location,
        });
        if let Head::Inline(tokens) = body {
            self.inline_body(tokens, location)?;
            let frame = self.stack.pop();
            if let Some(frame) = frame {
                let node = close_frame(frame)?;
                self.push_node(node);
            }
        }
        Ok(())
    }

    fn inline_body(&mut self, tokens: &[Token], location: SourceLocation) -> Result<(), ScriptError> {
        if tokens.is_empty() {
            return Err(ScriptError::with_span(
                ErrorKind::Syntax,
                "Expected a statement after ':'.",
                SourceSpan::at(location),
            ));
        }
        if tokens[0].kind == TokenKind::Keyword
            && matches!(
                tokens[0].text.as_str(),
                "if" | "elsif" | "else" | "while" | "for" | "def" | "try" | "catch" | "end"
            )
        {
            return Err(syntax_error(
                tokens.first(),
                location,
                "Inline bodies must be simple statements.",
            ));
        }
        let node = simple_statement(tokens)?;
        self.push_node(node);
        Ok(())
    }

    fn close(&mut self, end: &Token) -> Result<(), ScriptError> {
        if self.stack.len() < 2 {
            return Err(syntax_error(Some(end), end.location, "'end' without an open compound."));
        }
        let frame = self.stack.pop();
        if let Some(frame) = frame {
            let node = close_frame(frame)?;
            self.push_node(node);
        }
        Ok(())
    }

    fn open_if(&mut self, tokens: &[Token], span: SourceSpan) -> Result<(), ScriptError> {
        let location = tokens[0].location;
        let (head, body) = split_head(&tokens[1..]);
        let condition = compile_expression(head, location)?;
        self.open(
            Open::If {
                branches: vec![Branch {
                    condition,
                    body: Vec::new(),
                    span: span.clone(),
                }],
                else_body: None,
                span,
            },
            body,
            location,
        )
    }

    /// Moves the innermost open `if` back on the stack, reopening an inline
    /// `if` that directly precedes this clause.
    fn reopen_if(&mut self, clause: &Token) -> Result<(), ScriptError> {
        if matches!(self.top().open, Open::If { .. }) {
            return Ok(());
        }
        let reopened = match self.top().nodes.pop() {
            Some(Node::If {
                branches,
                else_body: None,
                span,
            }) => Frame {
                location: span.start,
                open: Open::If {
                    branches,
                    else_body: None,
                    span,
                },
                nodes: Vec::new(),
            },
            Some(other) => {
                self.top().nodes.push(other);
                return Err(syntax_error(
                    Some(clause),
                    clause.location,
                    format!("'{}' without a matching 'if'.", clause.text),
                ));
            }
            None => {
                return Err(syntax_error(
                    Some(clause),
                    clause.location,
                    format!("'{}' without a matching 'if'.", clause.text),
                ))
            }
        };
        self.stack.push(reopened);
        Ok(())
    }

    fn elsif(&mut self, tokens: &[Token], span: SourceSpan) -> Result<(), ScriptError> {
        let clause = &tokens[0];
        let (head, body) = split_head(&tokens[1..]);
        let condition = compile_expression(head, clause.location)?;
        let inline_reopen = !matches!(self.top().open, Open::If { .. });
        self.reopen_if(clause)?;

        let frame = self.top();
        let collected = std::mem::take(&mut frame.nodes);
        let Open::If {
            branches,
            else_body,
            ..
        } = &mut frame.open
        else {
            return Err(syntax_error(Some(clause), clause.location, "'elsif' without a matching 'if'."));
        };
        if else_body.is_some() {
            return Err(syntax_error(Some(clause), clause.location, "'elsif' after 'else'."));
        }
        if let Some(last) = branches.last_mut() {
            if !inline_reopen {
                last.body = collected;
            }
        }
        branches.push(Branch {
            condition,
            body: Vec::new(),
            span,
        });
        self.clause_body(body, inline_reopen, clause.location)
    }

    fn else_clause(&mut self, tokens: &[Token], _span: SourceSpan) -> Result<(), ScriptError> {
        let clause = &tokens[0];
        let (head, body) = split_head(&tokens[1..]);
        expect_empty(head, clause.location)?;
        let inline_reopen = !matches!(self.top().open, Open::If { .. });
        self.reopen_if(clause)?;

        let frame = self.top();
        let collected = std::mem::take(&mut frame.nodes);
        let Open::If {
            branches,
            else_body,
            ..
        } = &mut frame.open
        else {
            return Err(syntax_error(Some(clause), clause.location, "'else' without a matching 'if'."));
        };
        if else_body.is_some() {
            return Err(syntax_error(Some(clause), clause.location, "Duplicate 'else'."));
        }
        if let Some(last) = branches.last_mut() {
            if !inline_reopen {
                last.body = collected;
            }
        }
        *else_body = Some(Vec::new());
        self.clause_body(body, inline_reopen, clause.location)
    }

    /// After a clause head: an inline body is added to the clause; a clause
    /// on a reopened inline compound closes it again right away.
    fn clause_body(&mut self, body: Head<'_>, reopened: bool, location: SourceLocation) -> Result<(), ScriptError> {
        match body {
            Head::Inline(tokens) => {
                self.inline_body(tokens, location)?;
                if reopened {
                    let frame = self.stack.pop();
                    if let Some(frame) = frame {
                        let node = close_frame(frame)?;
                        self.push_node(node);
                    }
                }
                Ok(())
            }
            Head::Block => Ok(()),
        }
    }

    fn open_for(&mut self, tokens: &[Token], span: SourceSpan) -> Result<(), ScriptError> {
        let location = tokens[0].location;
        let (head, body) = split_head(&tokens[1..]);
        let mut parser = ExprParser::new(head, Vec::new(), location);
        let variable = parser.expect_identifier()?;
        if !head.get(1).is_some_and(|token| token.is_keyword("in")) {
            return Err(parser.error("Expected 'in' after the loop variable."));
        }
        let iterable = compile_expression(&head[2..], location)?;
        self.open(
            Open::For {
                variable,
                iterable,
                span,
            },
            body,
            location,
        )
    }

    fn open_def(&mut self, tokens: &[Token], span: SourceSpan) -> Result<(), ScriptError> {
        let location = tokens[0].location;
        let (head, body) = split_head(&tokens[1..]);
        let mut parser = ExprParser::new(head, Vec::new(), location);
        let name = parser.expect_identifier()?;
        let mut params: Vec<String> = Vec::new();
        let mut default_count = 0;
        parser.expect_operator("(")?;
        if !parser.eat_operator(")") {
            loop {
                let param = parser.expect_identifier()?;
                if params.contains(&param) {
                    return Err(parser.error(format!("Parameter \"{}\" is declared twice.", param)));
                }
                if parser.eat_operator("=") {
                    parser.emit(ExprOp::Push {
                        value: Constant::Text(param.clone()),
                    });
                    parser.expression()?;
                    default_count += 1;
                }
                params.push(param);
                if parser.eat_operator(")") {
                    break;
                }
                parser.expect_operator(",")?;
            }
        }
        parser.expect_end()?;
        let mut ops = parser.into_ops();
        ops.push(ExprOp::MakeDictionary {
            count: default_count,
        });
        let defaults = Expression {
            ops,
            location: span.clone(),
        };
        self.open(
            Open::Def {
                name,
                params,
                defaults,
                span,
            },
            body,
            location,
        )
    }

    fn catch_clause(&mut self, tokens: &[Token], span: SourceSpan) -> Result<(), ScriptError> {
        let clause = &tokens[0];
        let (head, body) = split_head(&tokens[1..]);
        let (error_kind, variable) = parse_catch_head(head, clause.location)?;

        let reopened = !matches!(self.top().open, Open::Try { .. });
        if reopened {
            let frame = match self.top().nodes.pop() {
                Some(Node::Try {
                    body,
                    catches,
                    span,
                }) => Frame {
                    location: span.start,
                    open: Open::Try {
                        body: Some(body),
                        catches,
                        span,
                    },
                    nodes: Vec::new(),
                },
                other => {
                    if let Some(other) = other {
                        self.top().nodes.push(other);
                    }
                    return Err(syntax_error(Some(clause), clause.location, "'catch' without a matching 'try'."));
                }
            };
            self.stack.push(frame);
        }

        let frame = self.top();
        let collected = std::mem::take(&mut frame.nodes);
        if let Open::Try { body: try_body, catches, .. } = &mut frame.open {
            match try_body {
                None => *try_body = Some(collected),
                Some(_) => {
                    if let Some(previous) = catches.last_mut() {
                        if !reopened {
                            previous.body = collected;
                        }
                    }
                }
            }
            catches.push(CatchClause {
                error_kind,
                variable,
                body: Vec::new(),
                span,
            });
        }
        self.clause_body(body, reopened, clause.location)
    }
}

fn close_frame(frame: Frame) -> Result<Node, ScriptError> {
    let Frame { open, nodes, location } = frame;
    Ok(match open {
        Open::Root => {
            return Err(ScriptError::with_span(
                ErrorKind::Syntax,
                "Cannot close the top level.",
                SourceSpan::at(location),
            ))
        }
        Open::If {
            mut branches,
            else_body,
            span,
        } => match else_body {
            Some(_) => Node::If {
                branches,
                else_body: Some(nodes),
                span,
            },
            None => {
                if let Some(last) = branches.last_mut() {
                    last.body = nodes;
                }
                Node::If {
                    branches,
                    else_body: None,
                    span,
                }
            }
        },
        Open::While { condition, span } => Node::While {
            condition,
            body: nodes,
            span,
        },
        Open::For {
            variable,
            iterable,
            span,
        } => Node::For {
            variable,
            iterable,
            body: nodes,
            span,
        },
        Open::Def {
            name,
            params,
            defaults,
            span,
        } => Node::Def {
            name,
            params,
            defaults,
            body: nodes,
            span,
        },
        Open::Try {
            body,
            mut catches,
            span,
        } => match body {
            None => Node::Try {
                body: nodes,
                catches,
                span,
            },
            Some(body) => {
                if let Some(last) = catches.last_mut() {
                    last.body = nodes;
                }
                Node::Try {
                    body,
                    catches,
                    span,
                }
            }
        },
    })
}

/// Splits a compound head at its first top-level `:`. Brackets are already
/// balanced by the lexer.
fn split_head(tokens: &[Token]) -> (&[Token], Head<'_>) {
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::Bracket {
            match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                _ => depth = depth.saturating_sub(1),
            }
        } else if depth == 0 && token.is_operator(":") {
            return (&tokens[..index], Head::Inline(&tokens[index + 1..]));
        }
    }
    (tokens, Head::Block)
}

fn expect_empty(tokens: &[Token], location: SourceLocation) -> Result<(), ScriptError> {
    match tokens.first() {
        None => Ok(()),
        Some(token) => Err(syntax_error(
            Some(token),
            location,
            format!("Unexpected '{}'.", token.text),
        )),
    }
}

fn parse_catch_head(
    head: &[Token],
    location: SourceLocation,
) -> Result<(Option<String>, Option<String>), ScriptError> {
    if head.is_empty() {
        return Ok((None, None));
    }
    let mut parser = ExprParser::new(head, Vec::new(), location);
    let kind = parser.expect_identifier()?;
    if ErrorKind::from_name(&kind).is_none() {
        return Err(syntax_error(
            head.first(),
            location,
            format!("Unknown error kind \"{}\".", kind),
        ));
    }
    let variable = if parser.eat_operator(",") {
        Some(parser.expect_identifier()?)
    } else {
        None
    };
    parser.expect_end()?;
    Ok((Some(kind), variable))
}

const ASSIGN_OPERATORS: &[(&str, AssignOperator)] = &[
    ("=", AssignOperator::Set),
    (":=", AssignOperator::Local),
    ("?=", AssignOperator::Weak),
    ("+=", AssignOperator::Add),
    ("-=", AssignOperator::Subtract),
    ("*=", AssignOperator::Multiply),
    ("/=", AssignOperator::Divide),
    ("%=", AssignOperator::Modulo),
];

fn find_assignment(tokens: &[Token]) -> Option<(usize, AssignOperator)> {
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Bracket => match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                _ => depth = depth.saturating_sub(1),
            },
            TokenKind::Operator if depth == 0 => {
                if let Some((_, operator)) = ASSIGN_OPERATORS
                    .iter()
                    .find(|(text, _)| token.text == *text)
                {
                    return Some((index, *operator));
                }
            }
            _ => {}
        }
    }
    None
}

fn simple_statement(tokens: &[Token]) -> Result<Node, ScriptError> {
    let first = &tokens[0];
    let location = first.location;
    let span = span_of(tokens);
    let rest = &tokens[1..];

    let kind = if first.kind == TokenKind::Keyword {
        match first.text.as_str() {
            "print" => StatementKind::Print {
                args: compile_list(rest, location)?,
            },
            "pass" => {
                expect_empty(rest, location)?;
                StatementKind::Pass
            }
            "continue" => {
                expect_empty(rest, location)?;
                StatementKind::Continue
            }
            "break" => StatementKind::Break {
                count: break_count(rest, location)?,
            },
            "return" => StatementKind::Return {
                value: optional_expression(rest, location)?,
            },
            "throw" => StatementKind::Throw {
                value: optional_expression(rest, location)?,
            },
            "record" => {
                let mut parser = ExprParser::new(rest, Vec::new(), location);
                let path = parser.path()?;
                parser.expect_end()?;
                StatementKind::Record { path }
            }
            "del" => {
                let mut parser = ExprParser::new(rest, Vec::new(), location);
                let mut paths = vec![parser.path()?];
                while parser.eat_operator(",") {
                    paths.push(parser.path()?);
                }
                parser.expect_end()?;
                StatementKind::Delete { paths }
            }
            "const" => {
                let Some((index, operator)) = find_assignment(rest) else {
                    return Err(syntax_error(rest.first(), location, "Expected an assignment after 'const'."));
                };
                if operator != AssignOperator::Set {
                    return Err(syntax_error(
                        rest.get(index),
                        location,
                        "Constants are assigned with '='.",
                    ));
                }
                assignment(rest, index, operator, true, location)?
            }
            _ => expression_or_assignment(tokens, location)?,
        }
    } else {
        expression_or_assignment(tokens, location)?
    };
    Ok(Node::Simple { kind, span })
}

fn expression_or_assignment(tokens: &[Token], location: SourceLocation) -> Result<StatementKind, ScriptError> {
    match find_assignment(tokens) {
        Some((index, operator)) => assignment(tokens, index, operator, false, location),
        None => Ok(StatementKind::Expression {
            expr: compile_expression(tokens, location)?,
        }),
    }
}

/// `path[index]... op value`. With indices, the value expression yields
/// `[index_1, .., index_n, rhs]`.
fn assignment(
    tokens: &[Token],
    operator_index: usize,
    operator: AssignOperator,
    constant: bool,
    location: SourceLocation,
) -> Result<StatementKind, ScriptError> {
    let target = &tokens[..operator_index];
    let rhs = &tokens[operator_index + 1..];
    if target.is_empty() {
        return Err(syntax_error(tokens.first(), location, "Missing assignment target."));
    }
    if rhs.is_empty() {
        return Err(syntax_error(
            tokens.get(operator_index),
            location,
            "Missing value to assign.",
        ));
    }

    let mut parser = ExprParser::new(target, Vec::new(), location);
    let path = parser.path()?;
    let mut indices = 0;
    while parser.eat_operator("[") {
        parser.expression()?;
        parser.expect_operator("]")?;
        indices += 1;
    }
    parser.expect_end()?;
    if indices > 0 && matches!(operator, AssignOperator::Local | AssignOperator::Weak) {
        return Err(syntax_error(
            tokens.get(operator_index),
            location,
            "Element assignment cannot use ':=' or '?='.",
        ));
    }

    let mut parser = ExprParser::new(rhs, parser.into_ops(), location);
    parser.expression()?;
    parser.expect_end()?;
    let mut ops = parser.into_ops();
    if indices > 0 {
        ops.push(ExprOp::MakeArray { count: indices + 1 });
    }
    Ok(StatementKind::Assign {
        path,
        operator,
        indices,
        value: Expression {
            ops,
            location: span_of(tokens),
        },
        constant,
    })
}

fn optional_expression(tokens: &[Token], location: SourceLocation) -> Result<Option<Expression>, ScriptError> {
    if tokens.is_empty() {
        return Ok(None);
    }
    compile_expression(tokens, location).map(Some)
}

fn break_count(tokens: &[Token], location: SourceLocation) -> Result<usize, ScriptError> {
    match tokens {
        [] => Ok(1),
        [token] if token.kind == TokenKind::LiteralNumber => {
            let count = token_to_number(token)?;
            if count < 1.0 || count.fract() != 0.0 {
                return Err(syntax_error(Some(token), location, "Break count must be a positive integer."));
            }
            Ok(count as usize)
        }
        [token, ..] => Err(syntax_error(Some(token), location, "Break count must be a number literal.")),
    }
}

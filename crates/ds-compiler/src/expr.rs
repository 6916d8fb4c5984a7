use ds_core::{
    BinaryOperator, Constant, ErrorKind, ExprOp, Expression, ScriptError, SourceLocation,
    SourceSpan, UnaryOperator,
};
use ds_parser::{token_to_number, unescape_string_token, Token, TokenKind};

/// Recursive-descent expression compiler emitting flat postfix ops. Jump
/// targets are absolute positions in `ops`, so several expressions may be
/// compiled into one buffer.
pub(crate) struct ExprParser<'t> {
    tokens: &'t [Token],
    pos: usize,
    ops: Vec<ExprOp>,
    end_location: SourceLocation,
}

pub(crate) fn syntax_error(token: Option<&Token>, fallback: SourceLocation, message: impl Into<String>) -> ScriptError {
    let location = token.map(|token| token.location).unwrap_or(fallback);
    ScriptError::with_span(ErrorKind::Syntax, message, SourceSpan::at(location))
}

pub(crate) fn span_of(tokens: &[Token]) -> SourceSpan {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => SourceSpan {
            start: first.location,
            end: last.location,
        },
        _ => SourceSpan::synthetic(),
    }
}

/// Compiles `tokens` as one complete expression.
pub(crate) fn compile_expression(tokens: &[Token], context: SourceLocation) -> Result<Expression, ScriptError> {
    let mut parser = ExprParser::new(tokens, Vec::new(), context);
    parser.expression()?;
    parser.expect_end()?;
    Ok(Expression {
        ops: parser.into_ops(),
        location: span_of(tokens),
    })
}

/// Compiles a comma-separated list into one array-producing expression.
pub(crate) fn compile_list(tokens: &[Token], context: SourceLocation) -> Result<Expression, ScriptError> {
    let mut parser = ExprParser::new(tokens, Vec::new(), context);
    let mut count = 0;
    if !parser.at_end() {
        loop {
            parser.expression()?;
            count += 1;
            if !parser.eat_operator(",") {
                break;
            }
        }
    }
    parser.expect_end()?;
    let mut ops = parser.into_ops();
    ops.push(ExprOp::MakeArray { count });
    Ok(Expression {
        ops,
        location: span_of(tokens),
    })
}

impl<'t> ExprParser<'t> {
    pub(crate) fn new(tokens: &'t [Token], ops: Vec<ExprOp>, context: SourceLocation) -> Self {
        let end_location = tokens.last().map(|token| token.location).unwrap_or(context);
        Self {
            tokens,
            pos: 0,
            ops,
            end_location,
        }
    }

    pub(crate) fn emit(&mut self, op: ExprOp) {
        self.ops.push(op);
    }

    pub(crate) fn into_ops(self) -> Vec<ExprOp> {
        self.ops
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> ScriptError {
        syntax_error(self.peek(), self.end_location, message)
    }

    pub(crate) fn eat_operator(&mut self, operator: &str) -> bool {
        if self.peek().is_some_and(|token| token.is_operator(operator)) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|token| token.is_keyword(keyword)) {
            self.pos += 1;
            return true;
        }
        false
    }

    pub(crate) fn expect_operator(&mut self, operator: &str) -> Result<(), ScriptError> {
        if self.eat_operator(operator) {
            return Ok(());
        }
        Err(self.error(match self.peek() {
            Some(token) => format!("Expected '{}' but found '{}'.", operator, token.text),
            None => format!("Expected '{}' at end of statement.", operator),
        }))
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ScriptError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier => {
                self.pos += 1;
                Ok(token.text.clone())
            }
            Some(token) => Err(self.error(format!("Expected a name but found '{}'.", token.text))),
            None => Err(self.error("Expected a name at end of statement.")),
        }
    }

    pub(crate) fn expect_end(&self) -> Result<(), ScriptError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("Unexpected '{}'.", token.text))),
        }
    }

    /// `name(.name)*`
    pub(crate) fn path(&mut self) -> Result<Vec<String>, ScriptError> {
        let mut path = vec![self.expect_identifier()?];
        while self.peek().is_some_and(|token| token.is_operator("."))
            && self
                .peek_at(1)
                .is_some_and(|token| token.kind == TokenKind::Identifier)
        {
            self.pos += 1;
            path.push(self.expect_identifier()?);
        }
        Ok(path)
    }

    pub(crate) fn expression(&mut self) -> Result<(), ScriptError> {
        self.or_expression()
    }

    fn or_expression(&mut self) -> Result<(), ScriptError> {
        self.and_expression()?;
        while self.eat_keyword("or") {
            let jump = self.ops.len();
            self.ops.push(ExprOp::JumpIfTrue { target: 0 });
            self.and_expression()?;
            let end = self.ops.len();
            self.ops[jump] = ExprOp::JumpIfTrue { target: end };
        }
        Ok(())
    }

    fn and_expression(&mut self) -> Result<(), ScriptError> {
        self.not_expression()?;
        while self.eat_keyword("and") {
            let jump = self.ops.len();
            self.ops.push(ExprOp::JumpIfFalse { target: 0 });
            self.not_expression()?;
            let end = self.ops.len();
            self.ops[jump] = ExprOp::JumpIfFalse { target: end };
        }
        Ok(())
    }

    fn not_expression(&mut self) -> Result<(), ScriptError> {
        if self.eat_keyword("not") {
            self.not_expression()?;
            self.ops.push(ExprOp::Unary {
                operator: UnaryOperator::Not,
            });
            return Ok(());
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<(), ScriptError> {
        self.additive()?;
        loop {
            let operator = match self.peek() {
                Some(token) if token.is_keyword("in") => BinaryOperator::In,
                Some(token) if token.kind == TokenKind::Operator => match token.text.as_str() {
                    "==" => BinaryOperator::Equal,
                    "!=" => BinaryOperator::NotEqual,
                    "<" => BinaryOperator::Less,
                    "<=" => BinaryOperator::LessOrEqual,
                    ">" => BinaryOperator::Greater,
                    ">=" => BinaryOperator::GreaterOrEqual,
                    _ => break,
                },
                _ => break,
            };
            self.pos += 1;
            self.additive()?;
            self.ops.push(ExprOp::Binary { operator });
        }
        Ok(())
    }

    fn additive(&mut self) -> Result<(), ScriptError> {
        self.multiplicative()?;
        loop {
            let operator = if self.eat_operator("+") {
                BinaryOperator::Add
            } else if self.eat_operator("-") {
                BinaryOperator::Subtract
            } else {
                break;
            };
            self.multiplicative()?;
            self.ops.push(ExprOp::Binary { operator });
        }
        Ok(())
    }

    fn multiplicative(&mut self) -> Result<(), ScriptError> {
        self.unary()?;
        loop {
            let operator = if self.eat_operator("*") {
                BinaryOperator::Multiply
            } else if self.eat_operator("/") {
                BinaryOperator::Divide
            } else if self.eat_operator("%") {
                BinaryOperator::Modulo
            } else {
                break;
            };
            self.unary()?;
            self.ops.push(ExprOp::Binary { operator });
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<(), ScriptError> {
        if self.eat_operator("-") {
            self.unary()?;
            self.ops.push(ExprOp::Unary {
                operator: UnaryOperator::Negate,
            });
            return Ok(());
        }
        if self.eat_operator("+") {
            self.unary()?;
            self.ops.push(ExprOp::Unary {
                operator: UnaryOperator::Plus,
            });
            return Ok(());
        }
        if self.eat_operator("&") {
            let path = self.path()?;
            self.ops.push(ExprOp::LoadRef { path });
            return Ok(());
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<(), ScriptError> {
        self.primary()?;
        loop {
            if self.eat_operator("(") {
                self.call_arguments()?;
            } else if self.eat_operator("[") {
                self.expression()?;
                self.expect_operator("]")?;
                self.ops.push(ExprOp::Index);
            } else if self.eat_operator(".") {
                let name = self.expect_identifier()?;
                self.ops.push(ExprOp::Member { name });
            } else {
                return Ok(());
            }
        }
    }

    /// Positional arguments first, then `name=value` labels.
    fn call_arguments(&mut self) -> Result<(), ScriptError> {
        let mut positional = 0;
        let mut labels: Vec<String> = Vec::new();
        if !self.eat_operator(")") {
            loop {
                let labeled = self
                    .peek()
                    .is_some_and(|token| token.kind == TokenKind::Identifier)
                    && self.peek_at(1).is_some_and(|token| token.is_operator("="));
                if labeled {
                    let label = self.expect_identifier()?;
                    if labels.contains(&label) {
                        return Err(self.error(format!("Argument \"{}\" is labeled twice.", label)));
                    }
                    self.pos += 1;
                    self.expression()?;
                    labels.push(label);
                } else {
                    if !labels.is_empty() {
                        return Err(self.error("Positional arguments must precede labeled ones."));
                    }
                    self.expression()?;
                    positional += 1;
                }
                if self.eat_operator(")") {
                    break;
                }
                self.expect_operator(",")?;
            }
        }
        self.ops.push(ExprOp::Call { positional, labels });
        Ok(())
    }

    fn primary(&mut self) -> Result<(), ScriptError> {
        let Some(token) = self.advance() else {
            return Err(self.error("Expected an expression."));
        };
        let value = match token.kind {
            TokenKind::LiteralNumber => Constant::Number(token_to_number(token)?),
            TokenKind::LiteralStringApostrophe
            | TokenKind::LiteralStringQuoted
            | TokenKind::LiteralStringLong => {
                let mut text = unescape_string_token(token)?;
                while let Some(next) = self.peek().filter(|next| next.is_string()) {
                    text.push_str(&unescape_string_token(next)?);
                    self.pos += 1;
                }
                Constant::Text(text)
            }
            TokenKind::Keyword => match token.text.as_str() {
                "True" => Constant::Boolean(true),
                "False" => Constant::Boolean(false),
                "None" => Constant::None,
                "Pi" => Constant::Number(std::f64::consts::PI),
                other => {
                    return Err(syntax_error(
                        Some(token),
                        self.end_location,
                        format!("Unexpected keyword '{}'.", other),
                    ))
                }
            },
            TokenKind::Identifier => {
                self.ops.push(ExprOp::Load {
                    name: token.text.clone(),
                });
                return Ok(());
            }
            TokenKind::Bracket => return self.bracketed(token),
            TokenKind::Operator => {
                return Err(syntax_error(
                    Some(token),
                    self.end_location,
                    format!("Unexpected '{}'.", token.text),
                ))
            }
        };
        self.ops.push(ExprOp::Push { value });
        Ok(())
    }

    fn bracketed(&mut self, open: &Token) -> Result<(), ScriptError> {
        match open.text.as_str() {
            "(" => {
                self.expression()?;
                self.expect_operator(")")
            }
            "[" => {
                let mut count = 0;
                while !self.eat_operator("]") {
                    self.expression()?;
                    count += 1;
                    if !self.eat_operator(",") {
                        self.expect_operator("]")?;
                        break;
                    }
                }
                self.ops.push(ExprOp::MakeArray { count });
                Ok(())
            }
            "{" => {
                let mut count = 0;
                while !self.eat_operator("}") {
                    self.expression()?;
                    self.expect_operator(":")?;
                    self.expression()?;
                    count += 1;
                    if !self.eat_operator(",") {
                        self.expect_operator("}")?;
                        break;
                    }
                }
                self.ops.push(ExprOp::MakeDictionary { count });
                Ok(())
            }
            other => Err(syntax_error(
                Some(open),
                self.end_location,
                format!("Unexpected '{}'.", other),
            )),
        }
    }
}

#[cfg(test)]
mod expr_tests {
    use super::*;
    use ds_parser::tokenize;

    fn ops(source: &str) -> Vec<ExprOp> {
        let statements = tokenize(source).expect("lex");
        compile_expression(&statements[0], SourceLocation { line: 1, column: 1 })
            .expect("compile")
            .ops
    }

    fn load(name: &str) -> ExprOp {
        ExprOp::Load {
            name: name.to_string(),
        }
    }

    fn number(value: f64) -> ExprOp {
        ExprOp::Push {
            value: Constant::Number(value),
        }
    }

    fn binary(operator: BinaryOperator) -> ExprOp {
        ExprOp::Binary { operator }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            ops("1 + 2 * 3"),
            vec![
                number(1.0),
                number(2.0),
                number(3.0),
                binary(BinaryOperator::Multiply),
                binary(BinaryOperator::Add)
            ]
        );
        assert_eq!(
            ops("(1 + 2) * 3"),
            vec![
                number(1.0),
                number(2.0),
                binary(BinaryOperator::Add),
                number(3.0),
                binary(BinaryOperator::Multiply)
            ]
        );
    }

    #[test]
    fn logical_operators_short_circuit_with_absolute_targets() {
        assert_eq!(
            ops("a or b and c"),
            vec![
                load("a"),
                ExprOp::JumpIfTrue { target: 5 },
                load("b"),
                ExprOp::JumpIfFalse { target: 5 },
                load("c"),
            ]
        );
    }

    #[test]
    fn not_applies_to_whole_comparison() {
        assert_eq!(
            ops("not a == 1"),
            vec![
                load("a"),
                number(1.0),
                binary(BinaryOperator::Equal),
                ExprOp::Unary {
                    operator: UnaryOperator::Not
                }
            ]
        );
    }

    #[test]
    fn calls_separate_positional_and_labeled_arguments() {
        assert_eq!(
            ops("f(1, b=2)"),
            vec![
                load("f"),
                number(1.0),
                number(2.0),
                ExprOp::Call {
                    positional: 1,
                    labels: vec!["b".to_string()]
                }
            ]
        );
        let statements = tokenize("f(b=1, 2)").expect("lex");
        assert!(compile_expression(&statements[0], SourceLocation { line: 1, column: 1 }).is_err());
    }

    #[test]
    fn postfix_chains_member_index_and_reference() {
        assert_eq!(
            ops("a.b[0]"),
            vec![
                load("a"),
                ExprOp::Member {
                    name: "b".to_string()
                },
                number(0.0),
                ExprOp::Index
            ]
        );
        assert_eq!(
            ops("&a.b"),
            vec![ExprOp::LoadRef {
                path: vec!["a".to_string(), "b".to_string()]
            }]
        );
    }

    #[test]
    fn literals_build_containers() {
        assert_eq!(
            ops("[1, 'x',]"),
            vec![
                number(1.0),
                ExprOp::Push {
                    value: Constant::Text("x".to_string())
                },
                ExprOp::MakeArray { count: 2 }
            ]
        );
        assert_eq!(
            ops("{True: None}"),
            vec![
                ExprOp::Push {
                    value: Constant::Boolean(true)
                },
                ExprOp::Push {
                    value: Constant::None
                },
                ExprOp::MakeDictionary { count: 1 }
            ]
        );
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let statements = tokenize("1 2").expect("lex");
        let error = compile_expression(&statements[0], SourceLocation { line: 1, column: 1 })
            .expect_err("two operands");
        assert_eq!(error.kind, ErrorKind::Syntax);
        assert_eq!(error.span.expect("span").start.column, 3);
    }
}

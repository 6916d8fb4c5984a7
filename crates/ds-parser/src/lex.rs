use ds_core::{ErrorKind, ScriptError, SourceLocation, SourceSpan};
use serde::Serialize;

pub const KEYWORDS: &[&str] = &[
    "and", "or", "not", "if", "elsif", "else", "end", "while", "for", "in", "def", "return",
    "break", "continue", "print", "pass", "record", "del", "try", "catch", "throw", "const",
    "True", "False", "None", "Pi",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenKind {
    Identifier,
    Keyword,
    Operator,
    Bracket,
    /// `'text'`
    LiteralStringApostrophe,
    /// `"text"`
    LiteralStringQuoted,
    /// `'''text'''` or `"""text"""`
    LiteralStringLong,
    LiteralNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: SourceLocation,
}

impl Token {
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == keyword
    }

    pub fn is_operator(&self, operator: &str) -> bool {
        matches!(self.kind, TokenKind::Operator | TokenKind::Bracket) && self.text == operator
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::LiteralStringApostrophe
                | TokenKind::LiteralStringQuoted
                | TokenKind::LiteralStringLong
        )
    }

    pub fn span(&self) -> SourceSpan {
        SourceSpan::at(self.location)
    }
}

/// Characters that start or continue an operator token.
pub fn is_operator(c: char) -> bool {
    matches!(
        c,
        '=' | '+' | '-' | '*' | '/' | '%' | '<' | '>' | '!' | ':' | '?' | ',' | '.' | '&'
    )
}

/// Whether `b` extends an operator that currently ends in `a`.
pub fn combines_with(a: char, b: char) -> bool {
    b == '=' && matches!(a, '=' | '!' | '<' | '>' | '+' | '-' | '*' | '/' | '%' | ':' | '?')
}

pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}

fn is_bracket(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}')
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Splits source text into statements of tokens.
#[derive(Debug)]
pub struct ScriptLex {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    line_start: usize,
}

impl ScriptLex {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            line_start: 0,
        }
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
        }
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn get(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.line_start = self.position;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Leading whitespace width of the line the cursor is on.
    fn line_indentation(&self) -> usize {
        self.chars[self.line_start..]
            .iter()
            .take_while(|c| **c == ' ' || **c == '\t')
            .count()
    }

    fn error_at(&self, location: SourceLocation, message: impl Into<String>) -> ScriptError {
        ScriptError::with_span(ErrorKind::Syntax, message, SourceSpan::at(location))
    }

    fn skip_to_line_end(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.get();
        }
    }

    /// Appends the tokens of one logical statement to `output` and returns
    /// how many were produced; `0` means the source is exhausted.
    pub fn get_statement(&mut self, output: &mut Vec<Token>) -> Result<usize, ScriptError> {
        let mut produced = 0;
        let mut open_brackets: Vec<(char, SourceLocation)> = Vec::new();

        loop {
            let Some(c) = self.peek() else {
                if let Some((open, location)) = open_brackets.last() {
                    return Err(self.error_at(*location, format!("Unclosed '{}'.", open)));
                }
                break;
            };
            let location = self.location();

            match c {
                '\n' => {
                    self.get();
                    if open_brackets.is_empty() && produced > 0 {
                        break;
                    }
                }
                ';' => {
                    if !open_brackets.is_empty() {
                        return Err(self.error_at(location, "Unexpected ';' inside brackets."));
                    }
                    self.get();
                    if produced > 0 {
                        break;
                    }
                }
                '#' => self.skip_to_line_end(),
                '\\' => {
                    self.get();
                    while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
                        self.get();
                    }
                    match self.peek() {
                        Some('\n') => {
                            self.get();
                        }
                        None => {}
                        Some(_) => {
                            return Err(self.error_at(location, "Line continuation must end the line."))
                        }
                    }
                }
                c if c.is_whitespace() => {
                    self.get();
                }
                '\'' | '"' => {
                    let indentation = self.line_indentation();
                    self.parse_string(c, indentation, output)?;
                    produced += 1;
                }
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) =>
                {
                    output.push(self.parse_number()?);
                    produced += 1;
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut text = String::new();
                    while let Some(next) = self.peek() {
                        if next.is_alphanumeric() || next == '_' {
                            text.push(next);
                            self.get();
                        } else {
                            break;
                        }
                    }
                    let kind = if is_keyword(&text) {
                        TokenKind::Keyword
                    } else {
                        TokenKind::Identifier
                    };
                    output.push(Token {
                        kind,
                        text,
                        location,
                    });
                    produced += 1;
                }
                c if is_bracket(c) => {
                    self.get();
                    match c {
                        '(' | '[' | '{' => open_brackets.push((c, location)),
                        _ => match open_brackets.pop() {
                            Some((open, _)) if closing_for(open) == c => {}
                            Some((open, _)) => {
                                return Err(self.error_at(
                                    location,
                                    format!("Expected '{}' but found '{}'.", closing_for(open), c),
                                ))
                            }
                            None => {
                                return Err(
                                    self.error_at(location, format!("Unbalanced '{}'.", c))
                                )
                            }
                        },
                    }
                    output.push(Token {
                        kind: TokenKind::Bracket,
                        text: c.to_string(),
                        location,
                    });
                    produced += 1;
                }
                c if is_operator(c) => {
                    self.get();
                    let mut text = c.to_string();
                    let mut last = c;
                    while let Some(next) = self.peek() {
                        if !combines_with(last, next) {
                            break;
                        }
                        text.push(next);
                        last = next;
                        self.get();
                    }
                    output.push(Token {
                        kind: TokenKind::Operator,
                        text,
                        location,
                    });
                    produced += 1;
                }
                other => {
                    return Err(self.error_at(location, format!("Unexpected character '{}'.", other)))
                }
            }
        }
        Ok(produced)
    }

    /// Reads a string literal whose opening delimiter is under the cursor.
    /// Long strings drop up to `indentation` leading whitespace characters
    /// from each continuation line. The token keeps its delimiters.
    pub fn parse_string(
        &mut self,
        start_char: char,
        indentation: usize,
        output: &mut Vec<Token>,
    ) -> Result<(), ScriptError> {
        let location = self.location();
        let long = self.peek_at(1) == Some(start_char) && self.peek_at(2) == Some(start_char);
        let mut text = String::new();

        if long {
            for _ in 0..3 {
                self.get();
            }
            text.extend([start_char; 3]);
            loop {
                let Some(c) = self.get() else {
                    return Err(self.error_at(location, "Unterminated long string."));
                };
                if c == start_char
                    && self.peek() == Some(start_char)
                    && self.peek_at(1) == Some(start_char)
                {
                    self.get();
                    self.get();
                    text.extend([start_char; 3]);
                    break;
                }
                text.push(c);
                if c == '\\' {
                    if let Some(escaped) = self.get() {
                        text.push(escaped);
                    }
                    continue;
                }
                if c == '\n' {
                    let mut skipped = 0;
                    while skipped < indentation && matches!(self.peek(), Some(' ' | '\t')) {
                        self.get();
                        skipped += 1;
                    }
                }
            }
            output.push(Token {
                kind: TokenKind::LiteralStringLong,
                text,
                location,
            });
            return Ok(());
        }

        self.get();
        text.push(start_char);
        loop {
            let Some(c) = self.get() else {
                return Err(self.error_at(location, "Unterminated string."));
            };
            match c {
                '\n' => return Err(self.error_at(location, "Unterminated string.")),
                '\\' => {
                    text.push(c);
                    match self.get() {
                        Some(escaped) => text.push(escaped),
                        None => return Err(self.error_at(location, "Unterminated string.")),
                    }
                }
                c if c == start_char => {
                    text.push(c);
                    break;
                }
                c => text.push(c),
            }
        }
        output.push(Token {
            kind: if start_char == '\'' {
                TokenKind::LiteralStringApostrophe
            } else {
                TokenKind::LiteralStringQuoted
            },
            text,
            location,
        });
        Ok(())
    }

    fn parse_number(&mut self) -> Result<Token, ScriptError> {
        let location = self.location();
        let mut text = String::new();

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            text.push('0');
            text.push('x');
            self.get();
            self.get();
            while let Some(c) = self.peek().filter(char::is_ascii_hexdigit) {
                text.push(c);
                self.get();
            }
            if text.len() == 2 {
                return Err(self.error_at(location, "Hexadecimal number has no digits."));
            }
        } else {
            let mut seen_dot = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                } else if c == '.'
                    && !seen_dot
                    && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
                {
                    seen_dot = true;
                    text.push(c);
                } else {
                    break;
                }
                self.get();
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let sign = matches!(self.peek_at(1), Some('+' | '-'));
                let digit_offset = if sign { 2 } else { 1 };
                if self.peek_at(digit_offset).is_some_and(|c| c.is_ascii_digit()) {
                    for _ in 0..digit_offset {
                        if let Some(c) = self.get() {
                            text.push(c);
                        }
                    }
                    while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                        text.push(c);
                        self.get();
                    }
                }
            }
        }

        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.error_at(self.location(), "Malformed number."));
        }
        Ok(Token {
            kind: TokenKind::LiteralNumber,
            text,
            location,
        })
    }
}

/// Tokenizes the whole source, one token list per statement.
pub fn tokenize(source: &str) -> Result<Vec<Vec<Token>>, ScriptError> {
    let mut lex = ScriptLex::new(source);
    let mut statements = Vec::new();
    loop {
        let mut tokens = Vec::new();
        if lex.get_statement(&mut tokens)? == 0 {
            break;
        }
        statements.push(tokens);
    }
    Ok(statements)
}

/// Strips the delimiters of a string token and resolves escape sequences.
pub fn unescape_string_token(token: &Token) -> Result<String, ScriptError> {
    let delimiter = match token.kind {
        TokenKind::LiteralStringLong => 3,
        TokenKind::LiteralStringApostrophe | TokenKind::LiteralStringQuoted => 1,
        _ => {
            return Err(ScriptError::with_span(
                ErrorKind::Syntax,
                format!("\"{}\" is not a string literal.", token.text),
                token.span(),
            ))
        }
    };
    let chars = token.text.chars().collect::<Vec<_>>();
    if chars.len() < delimiter * 2 {
        return Err(ScriptError::with_span(
            ErrorKind::Syntax,
            "String literal is missing its delimiters.",
            token.span(),
        ));
    }
    let body = &chars[delimiter..chars.len() - delimiter];
    let invalid = |message: String| ScriptError::with_span(ErrorKind::Syntax, message, token.span());

    let mut result = String::with_capacity(body.len());
    let mut index = 0;
    while index < body.len() {
        let c = body[index];
        index += 1;
        if c != '\\' {
            result.push(c);
            continue;
        }
        let Some(&escaped) = body.get(index) else {
            return Err(invalid("String ends with a lone backslash.".to_string()));
        };
        index += 1;
        match escaped {
            '\\' => result.push('\\'),
            '\'' => result.push('\''),
            '"' => result.push('"'),
            'n' => result.push('\n'),
            'r' => result.push('\r'),
            't' => result.push('\t'),
            'b' => result.push('\u{8}'),
            'f' => result.push('\u{c}'),
            'v' => result.push('\u{b}'),
            '0' => result.push('\0'),
            '\n' => {}
            'x' | 'u' => {
                let width = if escaped == 'x' { 2 } else { 4 };
                let digits = body
                    .get(index..index + width)
                    .map(|digits| digits.iter().collect::<String>())
                    .ok_or_else(|| invalid(format!("Incomplete \\{} escape.", escaped)))?;
                index += width;
                let code = u32::from_str_radix(&digits, 16)
                    .map_err(|_| invalid(format!("Invalid \\{} escape \"{}\".", escaped, digits)))?;
                let decoded = char::from_u32(code)
                    .ok_or_else(|| invalid(format!("Invalid character code {:#x}.", code)))?;
                result.push(decoded);
            }
            other => return Err(invalid(format!("Unknown escape sequence \\{}.", other))),
        }
    }
    Ok(result)
}

pub fn token_to_number(token: &Token) -> Result<f64, ScriptError> {
    let invalid = || {
        ScriptError::with_span(
            ErrorKind::Syntax,
            format!("\"{}\" is not a valid number.", token.text),
            token.span(),
        )
    };
    if token.kind != TokenKind::LiteralNumber {
        return Err(invalid());
    }
    if let Some(hex) = token
        .text
        .strip_prefix("0x")
        .or_else(|| token.text.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|value| value as f64)
            .map_err(|_| invalid());
    }
    token.text.parse::<f64>().map_err(|_| invalid())
}

#[cfg(test)]
mod lex_tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|token| token.text.as_str()).collect()
    }

    fn single(source: &str) -> Vec<Token> {
        let mut lex = ScriptLex::new(source);
        let mut tokens = Vec::new();
        lex.get_statement(&mut tokens).expect("statement");
        tokens
    }

    #[test]
    fn operators_combine_greedily() {
        assert!(is_operator('='));
        assert!(!is_operator('a'));
        assert!(combines_with('<', '='));
        assert!(!combines_with('=', '<'));
        let tokens = single("a <= b != c := d ?= -1");
        assert_eq!(
            texts(&tokens),
            vec!["a", "<=", "b", "!=", "c", ":=", "d", "?=", "-", "1"]
        );
        assert_eq!(tokens[1].kind, TokenKind::Operator);
    }

    #[test]
    fn statements_split_on_newline_and_semicolon() {
        let statements = tokenize("x = 1; y = 2\n\n# comment\nprint x, y  # trailing\n").expect("lex");
        assert_eq!(statements.len(), 3);
        assert_eq!(texts(&statements[0]), vec!["x", "=", "1"]);
        assert_eq!(texts(&statements[2]), vec!["print", "x", ",", "y"]);
        assert_eq!(statements[2][0].kind, TokenKind::Keyword);
        assert_eq!(statements[2][0].location, SourceLocation { line: 4, column: 1 });
    }

    #[test]
    fn brackets_and_backslash_continue_statements() {
        let statements = tokenize("a = [1,\n  2]\nb = 1 + \\\n 2\n").expect("lex");
        assert_eq!(statements.len(), 2);
        assert_eq!(texts(&statements[0]), vec!["a", "=", "[", "1", ",", "2", "]"]);
        assert_eq!(texts(&statements[1]), vec!["b", "=", "1", "+", "2"]);
    }

    #[test]
    fn end_of_input_yields_zero() {
        let mut lex = ScriptLex::new("  \n# only a comment\n");
        let mut tokens = Vec::new();
        assert_eq!(lex.get_statement(&mut tokens).expect("empty"), 0);
        assert!(tokens.is_empty());
    }

    #[test]
    fn bracket_errors_carry_positions() {
        let error = tokenize("x = )").expect_err("negative depth");
        assert_eq!(error.kind, ErrorKind::Syntax);
        assert_eq!(error.span.expect("span").start, SourceLocation { line: 1, column: 5 });

        let error = tokenize("x = (1,\n2").expect_err("unclosed");
        assert_eq!(error.span.expect("span").start, SourceLocation { line: 1, column: 5 });

        assert!(tokenize("x = (1]").is_err());
        assert!(tokenize("x = $").is_err());
    }

    #[test]
    fn strings_keep_delimiters_until_unescaped() {
        let tokens = single(r#"print 'it\'s', "tab\there", "\x41é""#);
        assert_eq!(tokens[1].kind, TokenKind::LiteralStringApostrophe);
        assert_eq!(tokens[1].text, r"'it\'s'");
        assert_eq!(unescape_string_token(&tokens[1]).expect("unescape"), "it's");
        assert_eq!(unescape_string_token(&tokens[3]).expect("unescape"), "tab\there");
        assert_eq!(unescape_string_token(&tokens[5]).expect("unescape"), "Aé");
        assert!(unescape_string_token(&tokens[0]).is_err());
    }

    #[test]
    fn long_strings_strip_statement_indentation() {
        let source = "    text = '''first\n      second\n    third'''\n";
        let tokens = single(source);
        assert_eq!(tokens[2].kind, TokenKind::LiteralStringLong);
        assert_eq!(
            unescape_string_token(&tokens[2]).expect("unescape"),
            "first\n  second\nthird"
        );
    }

    #[test]
    fn unterminated_strings_fail() {
        assert_eq!(tokenize("x = 'abc").expect_err("eof").kind, ErrorKind::Syntax);
        assert!(tokenize("x = \"abc\ny\"").is_err());
        assert!(tokenize("x = \"\"\"never closed").is_err());
    }

    #[test]
    fn numbers_convert_with_hex_and_exponents() {
        let tokens = single("0x1F 2.5 1e3 3E-2 .5");
        let values = tokens
            .iter()
            .map(|token| token_to_number(token).expect("number"))
            .collect::<Vec<_>>();
        assert_eq!(values, vec![31.0, 2.5, 1000.0, 0.03, 0.5]);
        assert!(tokenize("x = 12abc").is_err());
    }

    #[test]
    fn member_access_lexes_as_operator() {
        let tokens = single("a.b.c(1)");
        assert_eq!(texts(&tokens), vec!["a", ".", "b", ".", "c", "(", "1", ")"]);
        assert_eq!(tokens[5].kind, TokenKind::Bracket);
    }
}

pub mod lex;

pub use lex::{
    combines_with, is_keyword, is_operator, token_to_number, tokenize, unescape_string_token,
    ScriptLex, Token, TokenKind, KEYWORDS,
};

use logos::{Lexer, Logos};
use std::fmt;
use thiserror::Error;

use crate::source::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
#[logos(skip r";[^\n\r]*")]
#[logos(error = LexerErrorKind)]
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token("#(")]
    VectorStart,
    #[token(")")]
    RParen,
    #[token(".", priority = 3)]
    Dot,
    #[token("'")]
    Quote,
    #[token("`")]
    QuasiQuote,
    #[token(",")]
    Unquote,
    #[token(",@")]
    UnquoteSplicing,
    #[regex(r"[\p{Extended_Pictographic}.a-zA-Z0-9!#$%&*/:<=>?~_^+-]+", |lex| lex.slice().to_string())]
    Symbol(String),
    // Anything matching here also matches Symbol; numbers win ties.
    #[regex(r"[-+]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][-+]?[0-9]+)?", lex_number, priority = 3)]
    Number(f64),
    #[token("#t", |_| true)]
    #[token("#f", |_| false)]
    Boolean(bool),
    // Also matches an unterminated string so it can be reported as one.
    #[regex(r#""([^"\\]|\\.)*.?"#, lex_string)]
    String(String),
}

fn lex_number(lex: &mut Lexer<TokenKind>) -> LexerResult<f64> {
    let slice = lex.slice();
    slice
        .parse::<f64>()
        .map_err(|_| LexerErrorKind::InvalidNumberFormat(slice.to_string()))
}

fn lex_string(lex: &mut Lexer<TokenKind>) -> LexerResult<String> {
    let slice = lex.slice();
    match slice.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        Some(body) => unescape(body),
        None => Err(LexerErrorKind::UnterminatedString),
    }
}

// Escapes: \n \r \t \\ \"
fn unescape(body: &str) -> LexerResult<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some(escaped @ ('\\' | '"')) => escaped,
            Some(other) => return Err(LexerErrorKind::UnknownEscapeSequence(other)),
            None => return Err(LexerErrorKind::UnterminatedString),
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => f.write_str("("),
            TokenKind::VectorStart => f.write_str("#("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Quote => f.write_str("'"),
            TokenKind::QuasiQuote => f.write_str("`"),
            TokenKind::Unquote => f.write_str(","),
            TokenKind::UnquoteSplicing => f.write_str(",@"),
            TokenKind::Symbol(name) => f.write_str(name),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Boolean(true) => f.write_str("#t"),
            TokenKind::Boolean(false) => f.write_str("#f"),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Error)]
pub enum LexerErrorKind {
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Invalid number format: '{0}'")]
    InvalidNumberFormat(String),
    #[error("Unknown escape sequence: '\\{0}'")]
    UnknownEscapeSequence(char),
    #[default]
    #[error("Invalid token")]
    InvalidToken,
}

/// A lexing failure and where it happened.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct LexerError {
    pub error: LexerErrorKind,
    pub span: Span,
}

type LexerResult<T> = Result<T, LexerErrorKind>;

/// Tokenizes the whole input, stopping at the first invalid token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexerError> {
    TokenKind::lexer(input)
        .spanned()
        .map(|(result, range)| {
            let span = Span::new(range.start, range.end);
            match result {
                Ok(kind) => Ok(Token { kind, span }),
                Err(error) => Err(LexerError { error, span }),
            }
        })
        .collect()
}

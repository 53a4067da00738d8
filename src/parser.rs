use crate::evaluator::{STACK_GROW_SIZE, STACK_RED_ZONE};
use crate::lexer::{LexerError, Token, TokenKind, tokenize};
use crate::source::Span;
use crate::types::{Node, Sexpr};
use std::iter::Peekable;
use std::vec::IntoIter; // To iterate over Vec<Token>
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected token '{}', expected {expected}", .found.kind)]
    UnexpectedToken { found: Token, expected: String }, // Found token, Expected description
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(String),
    #[error(transparent)]
    LexerError(#[from] LexerError),
    #[error("invalid syntax for dotted pair")]
    InvalidDotSyntax(Span),
}

impl ParseError {
    /// `None` when the input simply ran out.
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::UnexpectedToken { found, .. } => Some(found.span),
            ParseError::UnexpectedEof(_) => None,
            ParseError::LexerError(lex_err) => Some(lex_err.span),
            ParseError::InvalidDotSyntax(span) => Some(*span),
        }
    }

    /// True when more input could complete the expression. The REPL uses this
    /// to keep reading lines.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::UnexpectedEof(_))
    }
}

// Result type alias for convenience
pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    // We iterate over owned Tokens, consuming them.
    tokens: Peekable<IntoIter<Token>>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
        }
    }

    // Consumes the next token if available.
    fn next_token(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    pub fn is_at_end(&mut self) -> bool {
        self.tokens.peek().is_none()
    }

    /// Parses a single S-expression starting with `token`.
    pub fn parse_expr_with_token(&mut self, token: Option<Token>) -> ParseResult<Node> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.parse_token(token))
    }

    fn parse_token(&mut self, token: Option<Token>) -> ParseResult<Node> {
        match token {
            Some(Token {
                kind: TokenKind::LParen,
                span,
            }) => self.parse_list(span),
            Some(Token {
                kind: TokenKind::VectorStart,
                span,
            }) => self.parse_vector(span),
            Some(Token {
                kind: TokenKind::Quote,
                span,
            }) => self.parse_quoted_expr("quote", span),
            Some(Token {
                kind: TokenKind::QuasiQuote,
                span,
            }) => self.parse_quoted_expr("quasiquote", span),
            Some(Token {
                kind: TokenKind::Unquote,
                span,
            }) => self.parse_quoted_expr("unquote", span),
            Some(Token {
                kind: TokenKind::UnquoteSplicing,
                span,
            }) => self.parse_quoted_expr("unquote-splicing", span),
            Some(atom) => self.parse_atom(atom),
            None => Err(ParseError::UnexpectedEof("an expression".to_string())), // No tokens left
        }
    }

    pub fn parse_expr(&mut self) -> ParseResult<Node> {
        let token = self.next_token();
        self.parse_expr_with_token(token)
    }

    /// Parses an atomic expression (symbol, number, boolean, string).
    fn parse_atom(&mut self, token: Token) -> ParseResult<Node> {
        Ok(Node::new(
            match token.kind {
                TokenKind::Symbol(s) => Sexpr::Symbol(s),
                TokenKind::Number(n) => Sexpr::Number(n),
                TokenKind::Boolean(b) => Sexpr::Boolean(b),
                TokenKind::String(s) => Sexpr::String(s),
                other_token => Err(ParseError::UnexpectedToken {
                    found: Token {
                        kind: other_token,
                        span: token.span,
                    },
                    expected: "an expression".to_string(),
                })?,
            },
            token.span,
        ))
    }

    /// Parses the rest of a list after its `(`. Elements are collected first,
    /// so a long list does not recurse once per element.
    fn parse_list(&mut self, open: Span) -> ParseResult<Node> {
        let mut elements = Vec::new();
        loop {
            match self.next_token() {
                Some(Token {
                    kind: TokenKind::RParen,
                    span,
                }) => {
                    if elements.is_empty() {
                        return Ok(Node::new_nil(open.merge(&span)));
                    }
                    return Ok(build_list(open, elements, Node::new_nil(span), span.end));
                }
                Some(Token {
                    kind: TokenKind::Dot,
                    span,
                }) => {
                    if elements.is_empty() {
                        return Err(ParseError::InvalidDotSyntax(span));
                    }
                    let tail = self.parse_expr()?;
                    return match self.next_token() {
                        Some(Token {
                            kind: TokenKind::RParen,
                            span: rparen_span,
                        }) => Ok(build_list(open, elements, tail, rparen_span.end)),
                        Some(t) => Err(ParseError::UnexpectedToken {
                            found: t,
                            expected: "')' after dotted pair".to_string(),
                        }),
                        None => Err(ParseError::UnexpectedEof(
                            "')' after dotted pair".to_string(),
                        )),
                    };
                }
                Some(token) => elements.push(self.parse_expr_with_token(Some(token))?),
                // Reached EOF before finding ')'
                None => return Err(ParseError::UnexpectedEof("')'".to_string())),
            }
        }
    }

    fn parse_vector(&mut self, open: Span) -> ParseResult<Node> {
        let mut elements = Vec::new();
        loop {
            match self.next_token() {
                Some(Token {
                    kind: TokenKind::RParen,
                    span,
                }) => return Ok(Node::new_vector(elements, open.merge(&span))),
                Some(Token {
                    kind: TokenKind::Dot,
                    span,
                }) => return Err(ParseError::InvalidDotSyntax(span)),
                Some(token) => elements.push(self.parse_expr_with_token(Some(token))?),
                None => return Err(ParseError::UnexpectedEof("')'".to_string())),
            }
        }
    }

    /// Parses a quoted expression `'expr`.
    fn parse_quoted_expr(&mut self, quote_symbol: &str, quote_span: Span) -> ParseResult<Node> {
        // Parse the expression immediately following the quote
        let quoted_expr = self.parse_expr()?;

        // Construct the equivalent (quote expr) S-expression
        Ok(Node::new_quoted_expr(quoted_expr, quote_symbol, quote_span))
    }

    /// Parses exactly one top-level expression.
    pub fn parse(mut self) -> ParseResult<Node> {
        let expr = self.parse_expr()?;

        // Check if there are any tokens left - shouldn't be for a single expression parse
        if let Some(found) = self.next_token() {
            Err(ParseError::UnexpectedToken {
                found,
                expected: "end of input".to_string(),
            })
        } else {
            Ok(expr)
        }
    }

    /// Parses every top-level expression, in order.
    pub fn parse_all(mut self) -> ParseResult<Vec<Node>> {
        let mut expressions = Vec::new();
        while !self.is_at_end() {
            expressions.push(self.parse_expr()?);
        }
        Ok(expressions)
    }
}

// Each pair spans from its car to the closing paren; the outermost one starts at `(`.
fn build_list(open: Span, elements: Vec<Node>, tail: Node, end: usize) -> Node {
    let list = elements.into_iter().rev().fold(tail, |cdr, car| {
        let span = Span::new(car.span.start, end);
        Node::new_pair(car, cdr, span)
    });
    Node {
        span: Span::new(open.start, end),
        ..list
    }
}

// Helper function to lex and parse a string directly (useful for tests and REPL)
pub fn parse_str(input: &str) -> ParseResult<Node> {
    let tokens = tokenize(input)?;
    Parser::new(tokens).parse()
}

/// Lexes and parses a whole program: zero or more expressions.
pub fn parse_program(input: &str) -> ParseResult<Vec<Node>> {
    let tokens = tokenize(input)?;
    Parser::new(tokens).parse_all()
}

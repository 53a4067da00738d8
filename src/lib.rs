//! muscheme: a small Scheme with lexical `lambda`, dynamic `mu` and proper tail calls.

pub mod config;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod source;
pub mod special_forms;
pub mod types;

pub use config::Config;
pub use environment::{EnvError, Environment};
pub use evaluator::{EvalError, EvalResult, apply, evaluate};
pub use lexer::{LexerError, Token, TokenKind, tokenize};
pub use loader::{RunSummary, run_source};
pub use parser::{ParseError, Parser, parse_program, parse_str};
pub use source::Span;
pub use types::{Node, Sexpr};

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use muscheme::config::{self, Config, EditMode};
use muscheme::lexer::{LexerErrorKind, TokenKind, tokenize};
use muscheme::loader::{load_file, run_source};
use muscheme::parser::parse_program;
use muscheme::special_forms::special_form_identifiers;
use muscheme::{Environment, ParseError, Span};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};

struct MuschemeCompleter {
    env: Rc<RefCell<Environment>>,
}

impl rustyline::completion::Completer for MuschemeCompleter {
    type Candidate = String;

    // Candidates are the missing suffixes of identifiers that start with the
    // symbol under the cursor.
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let prefix = match tokenize(&line[..pos]) {
            Ok(tokens) => match tokens.last().map(|t| &t.kind) {
                Some(TokenKind::Symbol(prefix)) => prefix.clone(),
                _ => return Ok((pos, vec![])),
            },
            Err(_) => return Ok((pos, vec![])),
        };
        let mut candidates: Vec<String> = self
            .env
            .borrow()
            .get_identifiers()
            .union(&special_form_identifiers())
            .filter(|id| id.starts_with(&prefix) && id.len() > prefix.len())
            .map(|id| id[prefix.len()..].to_string())
            .collect();
        candidates.sort();
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct MuschemeHelper {
    #[rustyline(Validator)]
    validator: MuschemeValidator,
    #[rustyline(Highlighter)]
    highlighter: MuschemeHighlighter,
    #[rustyline(Completer)]
    completer: MuschemeCompleter,
}

struct MuschemeValidator;

impl Validator for MuschemeValidator {
    // Keep reading while the input is an unfinished expression or string.
    // Anything else is accepted and its errors are reported on evaluation.
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        match parse_program(ctx.input()) {
            Err(ParseError::LexerError(lex_err))
                if lex_err.error == LexerErrorKind::UnterminatedString =>
            {
                Ok(ValidationResult::Incomplete)
            }
            Err(err) if err.is_incomplete() => Ok(ValidationResult::Incomplete),
            _ => Ok(ValidationResult::Valid(None)),
        }
    }
}

const GREEN: &str = "\x1b[32m";
const BLUE: &str = "\x1b[1;34m";
const RED: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

struct MuschemeHighlighter;

impl MuschemeHighlighter {
    // Byte offsets of the bracket pair to emphasise, and of unmatched closers.
    fn bracket_marks(line: &str, pos: usize) -> (Option<(usize, usize)>, Vec<usize>) {
        let cursor = pos.checked_sub(1);
        let mut stack: Vec<usize> = Vec::new();
        let mut matched = None;
        let mut unmatched = Vec::new();
        let mut in_string = false;
        let mut escape = false;

        for (i, c) in line.char_indices() {
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '(' => stack.push(i),
                ')' => match stack.pop() {
                    Some(open) if cursor == Some(open) || cursor == Some(i) => {
                        matched = Some((open, i))
                    }
                    Some(_) => {}
                    None => unmatched.push(i),
                },
                _ => {}
            }
        }
        (matched, unmatched)
    }
}

impl Highlighter for MuschemeHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let (matched, unmatched) = Self::bracket_marks(line, pos);
        let mut highlighted = String::with_capacity(line.len() * 2);
        let mut in_string = false;
        let mut escape = false;

        for (i, c) in line.char_indices() {
            if in_string || c == '"' {
                if !in_string {
                    in_string = true;
                } else if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                highlighted.push_str(GREEN);
                highlighted.push(c);
                highlighted.push_str(RESET);
                continue;
            }
            let color = if matched.is_some_and(|(open, close)| i == open || i == close) {
                Some(BLUE)
            } else if unmatched.contains(&i) {
                Some(RED)
            } else {
                None
            };
            match color {
                Some(color) => {
                    highlighted.push_str(color);
                    highlighted.push(c);
                    highlighted.push_str(RESET);
                }
                None => highlighted.push(c),
            }
        }
        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn main() -> rustyline::Result<()> {
    config::init_logging();
    let config = Config::from_env();
    config.install();

    let global_env = Environment::new_global_populated();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("-load") => {
            for file in args {
                if let Err(err) = load_file(&file, &global_env, true, Span::default()) {
                    eprintln!("{}", err);
                }
            }
        }
        Some(other) => {
            eprintln!("usage: repl [-load FILE...] (unexpected argument {})", other);
            return Ok(());
        }
        None => {}
    }

    println!("muscheme {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let helper = MuschemeHelper {
        validator: MuschemeValidator,
        highlighter: MuschemeHighlighter,
        completer: MuschemeCompleter {
            env: global_env.clone(),
        },
    };
    let edit_mode = match config.edit_mode {
        EditMode::Emacs => rustyline::EditMode::Emacs,
        EditMode::Vi => rustyline::EditMode::Vi,
    };
    let rl_config = rustyline::config::Config::builder()
        .edit_mode(edit_mode)
        .build();
    let mut rl = Editor::with_config(rl_config)?;
    rl.set_helper(Some(helper));
    // Ctrl-S forces a newline inside an unfinished expression.
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if rl.load_history(&config.history_file).is_err() {
        tracing::debug!(path = %config.history_file.display(), "no previous history");
    }

    loop {
        match rl.readline("muscheme> ") {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input.eq_ignore_ascii_case("exit") {
                    break;
                }
                run_source(input, "repl", &global_env, false);
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history(&config.history_file)
}

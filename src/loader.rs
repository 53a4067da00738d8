use crate::environment::Environment;
use crate::evaluator::{EvalError, EvalResult, evaluate};
use crate::lexer::tokenize;
use crate::parser::{ParseError, Parser};
use crate::source::Span;
use crate::types::{Node, Sexpr};
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use tracing::debug;

/// What happened while running a source text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub evaluated: usize,
    pub failed: usize,
}

/// Reads and evaluates every expression in `input`, in order, in `env`.
///
/// An evaluation error is reported and the run moves on to the next
/// expression. A read error ends the run, since the reader cannot tell where
/// the next expression starts. Unless `quiet`, each value is printed.
pub fn run_source(
    input: &str,
    source_name: &str,
    env: &Rc<RefCell<Environment>>,
    quiet: bool,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let tokens = match tokenize(input) {
        Ok(tokens) => tokens,
        Err(lex_err) => {
            ParseError::from(lex_err).pretty_print(source_name, input);
            summary.failed += 1;
            return summary;
        }
    };

    let mut parser = Parser::new(tokens);
    while !parser.is_at_end() {
        let node = match parser.parse_expr() {
            Ok(node) => node,
            Err(parse_err) => {
                parse_err.pretty_print(source_name, input);
                summary.failed += 1;
                break;
            }
        };
        match evaluate(node, env.clone()) {
            Ok(result) => {
                summary.evaluated += 1;
                if !quiet && !matches!(result.kind.as_ref(), Sexpr::Undefined) {
                    println!("{}", result);
                }
            }
            Err(eval_err) => {
                debug!(source = source_name, error = %eval_err, "expression failed");
                summary.failed += 1;
                eval_err.pretty_print(source_name, input);
            }
        }
    }
    summary
}

// Tries `name` as given, then `name.scm`.
fn read_source(name: &str, span: Span) -> EvalResult<(String, String)> {
    let first_err = match fs::read_to_string(name) {
        Ok(contents) => return Ok((name.to_string(), contents)),
        Err(err) => err,
    };
    if name.ends_with(".scm") {
        return Err(EvalError::Load {
            path: name.to_string(),
            message: first_err.to_string(),
            span,
        });
    }
    let with_extension = format!("{}.scm", name);
    fs::read_to_string(&with_extension)
        .map(|contents| (with_extension.clone(), contents))
        .map_err(|err| EvalError::Load {
            path: with_extension,
            message: err.to_string(),
            span,
        })
}

/// Runs the file `name` (or `name.scm`) in the global frame of `env`.
pub fn load_file(
    name: &str,
    env: &Rc<RefCell<Environment>>,
    quiet: bool,
    span: Span,
) -> EvalResult<RunSummary> {
    let (path, contents) = read_source(name, span)?;
    debug!(path = %path, "loading");
    let global = Environment::global_frame(env);
    Ok(run_source(&contents, &path, &global, quiet))
}

/// `(load name [quiet])`: `name` is a symbol or string; `quiet` defaults to true.
pub fn prim_load(args: Vec<Node>, span: Span, env: &Rc<RefCell<Environment>>) -> EvalResult {
    let name = match args[0].kind.as_ref() {
        Sexpr::Symbol(name) | Sexpr::String(name) => name.clone(),
        _ => {
            return Err(EvalError::application(
                "load",
                format!("argument 1 must be a symbol or string, got {}", args[0]),
                span,
            ));
        }
    };
    let quiet = args.get(1).is_none_or(|flag| flag.is_true());
    load_file(&name, env, quiet, span)?;
    Ok(Node::new_unspecified(span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // A scratch file unique to this process and test.
    fn scratch_file(stem: &str, extension: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "muscheme-{}-{}{}",
            std::process::id(),
            stem,
            extension
        ));
        fs::write(&path, contents).expect("write scratch file");
        path
    }

    fn lookup(env: &Rc<RefCell<Environment>>, name: &str) -> Option<String> {
        env.borrow()
            .get(name, Span::default())
            .ok()
            .map(|node| node.to_string())
    }

    #[test]
    fn test_run_source_continues_after_errors() {
        let env = Environment::new_global_populated();
        let summary = run_source("(define a 1) (car 5) (define b 2)", "<test>", &env, true);
        assert_eq!(
            summary,
            RunSummary {
                evaluated: 2,
                failed: 1
            }
        );
        assert_eq!(lookup(&env, "b").as_deref(), Some("2"));
    }

    #[test]
    fn test_run_source_stops_at_read_error() {
        let env = Environment::new_global_populated();
        let summary = run_source("(define a 1) ) (define b 2)", "<test>", &env, true);
        assert_eq!(summary.evaluated, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(lookup(&env, "b"), None);

        let summary = run_source("(define a \"oops)", "<test>", &env, true);
        assert_eq!(summary, RunSummary { evaluated: 0, failed: 1 });
    }

    #[test]
    fn test_load_defines_in_global_frame() {
        let path = scratch_file("global", ".scm", "(define loaded-value 42)\n(define (twice x) (* 2 x))");
        let env = Environment::new_global_populated();
        let source = format!(
            "(define (f) (load \"{}\")) (f) (twice loaded-value)",
            path.display()
        );
        let summary = run_source(&source, "<test>", &env, true);
        fs::remove_file(&path).ok();
        assert_eq!(summary, RunSummary { evaluated: 3, failed: 0 });
        assert_eq!(lookup(&env, "loaded-value").as_deref(), Some("42"));
    }

    #[test]
    fn test_load_falls_back_to_scm_extension() {
        let path = scratch_file("fallback", ".scm", "(define from-fallback 'yes)");
        let without_extension = path.with_extension("");
        let env = Environment::new_global_populated();
        let summary = load_file(
            &without_extension.display().to_string(),
            &env,
            true,
            Span::default(),
        );
        fs::remove_file(&path).ok();
        assert_eq!(summary, Ok(RunSummary { evaluated: 1, failed: 0 }));
        assert_eq!(lookup(&env, "from-fallback").as_deref(), Some("yes"));
    }

    #[test]
    fn test_load_missing_file() {
        let env = Environment::new_global_populated();
        let result = load_file("/nonexistent/muscheme/file", &env, true, Span::new(1, 2));
        match result {
            Err(EvalError::Load { path, span, .. }) => {
                assert_eq!(path, "/nonexistent/muscheme/file.scm");
                assert_eq!(span, Span::new(1, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_prim_load_argument_checks() {
        let env = Environment::new_global_populated();
        let result = prim_load(vec![Node::new_number(1.0, Span::default())], Span::default(), &env);
        assert!(matches!(result, Err(EvalError::ApplicationError { .. })));
    }
}

use crate::environment::EnvError;
use crate::evaluator::EvalError;
use crate::parser::ParseError;
use crate::source::Span;
use ariadne::{Label, Report, ReportKind, Source};
use std::ops::Range;
use tracing::warn;

type ReportSpan<'a> = (&'a str, Range<usize>);

// Spans can come from a different source text than the one being reported
// (a procedure defined on an earlier REPL line), so keep them in bounds.
fn clamp(span: Span, len: usize) -> Range<usize> {
    let start = span.start.min(len);
    let end = span.end.clamp(start, len);
    start..end
}

fn build<'a>(
    source_name: &'a str,
    range: Range<usize>,
    message: String,
    label: String,
) -> Report<'a, ReportSpan<'a>> {
    Report::build(ReportKind::Error, (source_name, range.clone()))
        .with_message(message)
        .with_label(Label::new((source_name, range)).with_message(label))
        .finish()
}

fn emit<'a>(report: Report<'a, ReportSpan<'a>>, source_name: &'a str, input: &str) {
    if let Err(err) = report.eprint((source_name, Source::from(input))) {
        warn!(error = %err, "failed to print error report");
    }
}

impl EvalError {
    pub fn report<'a>(&self, source_name: &'a str, input: &str) -> Report<'a, ReportSpan<'a>> {
        let range = clamp(self.span(), input.len());
        let (message, label) = match self {
            EvalError::EnvError(env_error) => match env_error {
                EnvError::UnboundIdentifier(symbol, _) => (
                    format!("Unbound symbol `{}`", symbol),
                    "This symbol is not defined in the current scope".to_string(),
                ),
                EnvError::ArityMismatch { expected, got, .. } => (
                    "Wrong number of arguments".to_string(),
                    format!("Expected {} argument(s), got {}", expected, got),
                ),
                EnvError::NotAVariable(sexpr, _) => (
                    format!("Not a variable: {}", sexpr),
                    format!("Expected a symbol but found a {}", sexpr.type_name()),
                ),
                EnvError::DuplicateFormal(name, _) => (
                    format!("Duplicate parameter `{}`", name),
                    "Each parameter name may appear only once".to_string(),
                ),
            },
            EvalError::MalformedForm(message, _) => (
                format!("Malformed expression: {}", message),
                "This special form is malformed or incomplete".to_string(),
            ),
            EvalError::NotApplicable(sexpr, _) => (
                format!("Not a procedure: {}", sexpr),
                "This expression cannot be called as a procedure".to_string(),
            ),
            EvalError::ApplicationError {
                procedure, message, ..
            } => (format!("Cannot apply {}", procedure), message.clone()),
            EvalError::NotEvaluable(sexpr, _) => (
                format!("Cannot evaluate {}", sexpr),
                format!("A {} is not an expression", sexpr.type_name()),
            ),
            EvalError::InvalidExpression(_) => (
                "Invalid expression".to_string(),
                "This evaluated to an undefined value".to_string(),
            ),
            EvalError::RecursionLimitExceeded { limit, .. } => (
                "Maximum recursion depth exceeded".to_string(),
                format!("More than {} nested evaluations", limit),
            ),
            EvalError::Load { path, message, .. } => {
                (format!("Cannot load {}", path), message.clone())
            }
        };
        build(source_name, range, message, label)
    }

    /// Writes a report for this error to stderr, pointing into `input`.
    pub fn pretty_print(&self, source_name: &str, input: &str) {
        emit(self.report(source_name, input), source_name, input);
    }
}

impl ParseError {
    pub fn report<'a>(&self, source_name: &'a str, input: &str) -> Report<'a, ReportSpan<'a>> {
        let end = input.len();
        let range = self
            .span()
            .map_or(end..end, |span| clamp(span, input.len()));
        let (message, label) = match self {
            ParseError::UnexpectedToken { found, expected } => (
                format!("Unexpected token: {}", found.kind),
                format!("Expected {expected}"),
            ),
            ParseError::UnexpectedEof(expected) => {
                ("Unexpected EOF".to_string(), format!("Expected {expected}"))
            }
            ParseError::LexerError(lex_err) => ("Lexer Error".to_string(), lex_err.to_string()),
            ParseError::InvalidDotSyntax(_) => {
                ("Invalid Dot Syntax".to_string(), "Unexpected dot".to_string())
            }
        };
        build(source_name, range, message, label)
    }

    pub fn pretty_print(&self, source_name: &str, input: &str) {
        emit(self.report(source_name, input), source_name, input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::evaluator::evaluate;
    use crate::parser::parse_str;

    fn render<'a>(report: Report<'a, ReportSpan<'a>>, source_name: &'a str, input: &str) -> String {
        let mut out = Vec::new();
        report
            .write((source_name, Source::from(input)), &mut out)
            .expect("write report");
        String::from_utf8(out).expect("utf8 report")
    }

    #[test]
    fn test_eval_error_report_names_the_symbol() {
        let input = "(+ 1 mystery)";
        let err = evaluate(
            parse_str(input).expect("parses"),
            Environment::new_global_populated(),
        )
        .expect_err("unbound");
        let text = render(err.report("repl", input), "repl", input);
        assert!(text.contains("mystery"), "{}", text);
        assert!(text.contains("not defined"), "{}", text);
    }

    #[test]
    fn test_parse_error_report_at_end_of_input() {
        let input = "(define x";
        let err = parse_str(input).expect_err("incomplete");
        let text = render(err.report("repl", input), "repl", input);
        assert!(text.contains("Unexpected EOF"), "{}", text);
    }

    #[test]
    fn test_out_of_range_span_is_clamped() {
        assert_eq!(clamp(Span::new(40, 50), 10), 10..10);
        assert_eq!(clamp(Span::new(2, 50), 10), 2..10);
        assert_eq!(clamp(Span::new(2, 4), 10), 2..4);

        let err = EvalError::InvalidExpression(Span::new(100, 120));
        let text = render(err.report("repl", "(x)"), "repl", "(x)");
        assert!(text.contains("Invalid expression"), "{}", text);
    }
}

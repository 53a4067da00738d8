use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::environment::Environment;
use crate::evaluator::{self, EvalError, EvalResult};
use crate::loader;
use crate::source::Span;
use crate::types::{Arity, Node, Primitive, Sexpr};

/// Installs the builtin procedures into `env` (normally the global frame).
pub fn install(env: &mut Environment) {
    let primitives = [
        // Evaluation
        Primitive::with_env("eval", Arity::exactly(1), prim_eval),
        Primitive::with_env("apply", Arity::exactly(2), prim_apply),
        Primitive::with_env("load", Arity::between(1, 2), loader::prim_load),
        // Arithmetic
        Primitive::new("+", Arity::at_least(0), prim_add),
        Primitive::new("-", Arity::at_least(1), prim_sub),
        Primitive::new("*", Arity::at_least(0), prim_mul),
        Primitive::new("/", Arity::at_least(1), prim_div),
        Primitive::new("quotient", Arity::exactly(2), prim_quotient),
        Primitive::new("remainder", Arity::exactly(2), prim_remainder),
        Primitive::new("modulo", Arity::exactly(2), prim_modulo),
        Primitive::new("abs", Arity::exactly(1), prim_abs),
        Primitive::new("min", Arity::at_least(1), prim_min),
        Primitive::new("max", Arity::at_least(1), prim_max),
        // Comparison
        Primitive::new("=", Arity::at_least(2), prim_equals),
        Primitive::new("<", Arity::at_least(2), prim_less_than),
        Primitive::new("<=", Arity::at_least(2), prim_less_than_or_equals),
        Primitive::new(">", Arity::at_least(2), prim_greater_than),
        Primitive::new(">=", Arity::at_least(2), prim_greater_than_or_equals),
        // Lists
        Primitive::new("cons", Arity::exactly(2), prim_cons),
        Primitive::new("car", Arity::exactly(1), prim_car),
        Primitive::new("cdr", Arity::exactly(1), prim_cdr),
        Primitive::new("list", Arity::at_least(0), prim_list),
        Primitive::new("length", Arity::exactly(1), prim_length),
        Primitive::new("append", Arity::at_least(0), prim_append),
        // Vectors
        Primitive::new("vector", Arity::at_least(0), prim_vector),
        Primitive::new("vector-ref", Arity::exactly(2), prim_vector_ref),
        Primitive::new("vector-length", Arity::exactly(1), prim_vector_length),
        // Predicates
        Primitive::new("null?", Arity::exactly(1), prim_is_null),
        Primitive::new("pair?", Arity::exactly(1), prim_is_pair),
        Primitive::new("list?", Arity::exactly(1), prim_is_list),
        Primitive::new("number?", Arity::exactly(1), prim_is_number),
        Primitive::new("boolean?", Arity::exactly(1), prim_is_boolean),
        Primitive::new("symbol?", Arity::exactly(1), prim_is_symbol),
        Primitive::new("string?", Arity::exactly(1), prim_is_string),
        Primitive::new("vector?", Arity::exactly(1), prim_is_vector),
        Primitive::new("procedure?", Arity::exactly(1), prim_is_procedure),
        Primitive::new("zero?", Arity::exactly(1), prim_is_zero),
        Primitive::new("even?", Arity::exactly(1), prim_is_even),
        Primitive::new("odd?", Arity::exactly(1), prim_is_odd),
        Primitive::new("not", Arity::exactly(1), prim_not),
        Primitive::new("eq?", Arity::exactly(2), prim_is_eqv),
        Primitive::new("eqv?", Arity::exactly(2), prim_is_eqv),
        Primitive::new("equal?", Arity::exactly(2), prim_is_equal),
        // Output
        Primitive::new("display", Arity::exactly(1), prim_display),
        Primitive::new("newline", Arity::exactly(0), prim_newline),
    ];
    for primitive in primitives {
        env.define(
            primitive.name.clone(),
            Node::new_primitive(primitive, Span::default()),
        );
    }
}

fn wrong_type(operator: &str, position: usize, expected: &str, node: &Node, span: Span) -> EvalError {
    EvalError::application(
        operator,
        format!(
            "argument {} must be a {}, got {} ({})",
            position,
            expected,
            node,
            node.kind.type_name()
        ),
        span,
    )
}

// Extracts a number from a Node or returns from the enclosing primitive with an error
macro_rules! expect_number {
    ($node:expr, $operator:expr, $position:expr, $span:expr) => {
        match *$node.kind {
            Sexpr::Number(n) => n,
            _ => return Err(wrong_type($operator, $position, "number", &$node, $span)),
        }
    };
}

macro_rules! is_type {
    ($args:expr, $type:pat, $span:expr) => {
        Ok(Node::new_bool(matches!(*$args[0].kind, $type), $span))
    };
}

fn numbers(args: &[Node], operator: &str, span: Span) -> EvalResult<Vec<f64>> {
    let mut values = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        values.push(expect_number!(arg, operator, i + 1, span));
    }
    Ok(values)
}

fn fold_numbers<F: Fn(f64, f64) -> f64>(
    args: Vec<Node>,
    span: Span,
    start: f64,
    func: F,
    operator: &str,
) -> EvalResult {
    let total = numbers(&args, operator, span)?
        .into_iter()
        .fold(start, func);
    Ok(Node::new_number(total, span))
}

// True when `compare` holds for every adjacent pair.
fn compare_numbers<F: Fn(f64, f64) -> bool>(
    args: Vec<Node>,
    span: Span,
    compare: F,
    operator: &str,
) -> EvalResult {
    let values = numbers(&args, operator, span)?;
    let holds = values.windows(2).all(|pair| compare(pair[0], pair[1]));
    Ok(Node::new_bool(holds, span))
}

fn integer_operands(args: &[Node], operator: &str, span: Span) -> EvalResult<(f64, f64)> {
    let values = numbers(args, operator, span)?;
    let (dividend, divisor) = (values[0], values[1]);
    if divisor == 0.0 {
        return Err(EvalError::application(operator, "division by zero", span));
    }
    Ok((dividend, divisor))
}

pub fn prim_add(args: Vec<Node>, span: Span) -> EvalResult {
    // (+) -> 0
    // (+ 1 2 3) -> 6
    fold_numbers(args, span, 0.0, |acc, val| acc + val, "+")
}

pub fn prim_sub(args: Vec<Node>, span: Span) -> EvalResult {
    // (- x) -> -x
    // (- x y z) -> x - y - z
    let values = numbers(&args, "-", span)?;
    let result = match values.split_first() {
        Some((first, [])) => -first,
        Some((first, rest)) => rest.iter().fold(*first, |acc, val| acc - val),
        None => 0.0,
    };
    Ok(Node::new_number(result, span))
}

pub fn prim_mul(args: Vec<Node>, span: Span) -> EvalResult {
    // (*) -> 1
    // (* 1 2 3) -> 6
    fold_numbers(args, span, 1.0, |acc, val| acc * val, "*")
}

pub fn prim_div(args: Vec<Node>, span: Span) -> EvalResult {
    // (/ x) -> 1/x
    // (/ x y z) -> x / y / z
    let values = numbers(&args, "/", span)?;
    let (first, rest) = match values.split_first() {
        Some((first, [])) => (1.0, std::slice::from_ref(first)),
        Some((first, rest)) => (*first, rest),
        None => return Err(EvalError::application("/", "no operands", span)),
    };
    if rest.contains(&0.0) {
        return Err(EvalError::application("/", "division by zero", span));
    }
    Ok(Node::new_number(
        rest.iter().fold(first, |acc, val| acc / val),
        span,
    ))
}

pub fn prim_quotient(args: Vec<Node>, span: Span) -> EvalResult {
    let (dividend, divisor) = integer_operands(&args, "quotient", span)?;
    Ok(Node::new_number((dividend / divisor).trunc(), span))
}

pub fn prim_remainder(args: Vec<Node>, span: Span) -> EvalResult {
    let (dividend, divisor) = integer_operands(&args, "remainder", span)?;
    Ok(Node::new_number(dividend % divisor, span))
}

pub fn prim_modulo(args: Vec<Node>, span: Span) -> EvalResult {
    // Result takes the sign of the divisor
    let (dividend, divisor) = integer_operands(&args, "modulo", span)?;
    let remainder = dividend % divisor;
    let result = if remainder != 0.0 && (remainder < 0.0) != (divisor < 0.0) {
        remainder + divisor
    } else {
        remainder
    };
    Ok(Node::new_number(result, span))
}

pub fn prim_abs(args: Vec<Node>, span: Span) -> EvalResult {
    let n = expect_number!(args[0], "abs", 1, span);
    Ok(Node::new_number(n.abs(), span))
}

pub fn prim_min(args: Vec<Node>, span: Span) -> EvalResult {
    fold_numbers(args, span, f64::INFINITY, f64::min, "min")
}

pub fn prim_max(args: Vec<Node>, span: Span) -> EvalResult {
    fold_numbers(args, span, f64::NEG_INFINITY, f64::max, "max")
}

pub fn prim_equals(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, |left, right| left == right, "=")
}

pub fn prim_less_than(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, |left, right| left < right, "<")
}

pub fn prim_less_than_or_equals(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, |left, right| left <= right, "<=")
}

pub fn prim_greater_than(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, |left, right| left > right, ">")
}

pub fn prim_greater_than_or_equals(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, |left, right| left >= right, ">=")
}

// --- List Primitives ---

pub fn prim_cons(args: Vec<Node>, span: Span) -> EvalResult {
    // (cons a b) => (a . b)
    let [head, tail] = <[Node; 2]>::try_from(args)
        .map_err(|_| EvalError::application("cons", "expects 2 arguments", span))?;
    Ok(Node::new_pair(head, tail, span))
}

pub fn prim_car(args: Vec<Node>, span: Span) -> EvalResult {
    match args[0].kind.as_ref() {
        Sexpr::Pair(car, _) => Ok(car.clone()),
        _ => Err(wrong_type("car", 1, "pair", &args[0], span)),
    }
}

pub fn prim_cdr(args: Vec<Node>, span: Span) -> EvalResult {
    match args[0].kind.as_ref() {
        Sexpr::Pair(_, cdr) => Ok(cdr.clone()),
        _ => Err(wrong_type("cdr", 1, "pair", &args[0], span)),
    }
}

pub fn prim_list(args: Vec<Node>, span: Span) -> EvalResult {
    // (list) -> ()
    Ok(Node::new_list(args, span))
}

pub fn prim_length(args: Vec<Node>, span: Span) -> EvalResult {
    match args[0].list_len() {
        Some(len) => Ok(Node::new_number(len as f64, span)),
        None => Err(wrong_type("length", 1, "list", &args[0], span)),
    }
}

pub fn prim_append(mut args: Vec<Node>, span: Span) -> EvalResult {
    // (append) -> (); the last argument is shared, not copied
    let Some(last) = args.pop() else {
        return Ok(Node::new_nil(span));
    };
    let mut elements = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        match arg.to_vec() {
            Some(items) => elements.extend(items),
            None => return Err(wrong_type("append", i + 1, "list", arg, span)),
        }
    }
    Ok(Node::new_dotted_list(elements, last, span))
}

// --- Vector Primitives ---

pub fn prim_vector(args: Vec<Node>, span: Span) -> EvalResult {
    Ok(Node::new_vector(args, span))
}

pub fn prim_vector_ref(args: Vec<Node>, span: Span) -> EvalResult {
    let Sexpr::Vector(elements) = args[0].kind.as_ref() else {
        return Err(wrong_type("vector-ref", 1, "vector", &args[0], span));
    };
    let index = expect_number!(args[1], "vector-ref", 2, span);
    if index.fract() != 0.0 || index < 0.0 || index as usize >= elements.len() {
        return Err(EvalError::application(
            "vector-ref",
            format!("index {} out of range for {}", index, args[0]),
            span,
        ));
    }
    Ok(elements[index as usize].clone())
}

pub fn prim_vector_length(args: Vec<Node>, span: Span) -> EvalResult {
    match args[0].kind.as_ref() {
        Sexpr::Vector(elements) => Ok(Node::new_number(elements.len() as f64, span)),
        _ => Err(wrong_type("vector-length", 1, "vector", &args[0], span)),
    }
}

// --- Type Predicates ---

pub fn prim_is_null(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Nil, span)
}

pub fn prim_is_pair(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Pair(_, _), span)
}

pub fn prim_is_list(args: Vec<Node>, span: Span) -> EvalResult {
    Ok(Node::new_bool(args[0].is_list(), span))
}

pub fn prim_is_number(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Number(_), span)
}

pub fn prim_is_boolean(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Boolean(_), span)
}

pub fn prim_is_symbol(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Symbol(_), span)
}

pub fn prim_is_string(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::String(_), span)
}

pub fn prim_is_vector(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Vector(_), span)
}

pub fn prim_is_procedure(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Procedure(_), span)
}

pub fn prim_is_zero(args: Vec<Node>, span: Span) -> EvalResult {
    let n = expect_number!(args[0], "zero?", 1, span);
    Ok(Node::new_bool(n == 0.0, span))
}

pub fn prim_is_even(args: Vec<Node>, span: Span) -> EvalResult {
    let n = expect_number!(args[0], "even?", 1, span);
    Ok(Node::new_bool(n % 2.0 == 0.0, span))
}

pub fn prim_is_odd(args: Vec<Node>, span: Span) -> EvalResult {
    let n = expect_number!(args[0], "odd?", 1, span);
    Ok(Node::new_bool(n % 2.0 != 0.0 && n.fract() == 0.0, span))
}

pub fn prim_not(args: Vec<Node>, span: Span) -> EvalResult {
    Ok(Node::new_bool(args[0].is_false(), span))
}

pub fn prim_is_eqv(args: Vec<Node>, span: Span) -> EvalResult {
    Ok(Node::new_bool(args[0].is_eqv(&args[1]), span))
}

pub fn prim_is_equal(args: Vec<Node>, span: Span) -> EvalResult {
    Ok(Node::new_bool(args[0].is_equal(&args[1]), span))
}

// --- Output ---

pub fn prim_display(args: Vec<Node>, span: Span) -> EvalResult {
    let mut stdout = std::io::stdout().lock();
    let written = match args[0].kind.as_ref() {
        Sexpr::String(s) => write!(stdout, "{}", s),
        _ => write!(stdout, "{}", args[0]),
    };
    written
        .and_then(|_| stdout.flush())
        .map_err(|err| EvalError::application("display", err.to_string(), span))?;
    Ok(Node::new_unspecified(span))
}

pub fn prim_newline(_args: Vec<Node>, span: Span) -> EvalResult {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout)
        .and_then(|_| stdout.flush())
        .map_err(|err| EvalError::application("newline", err.to_string(), span))?;
    Ok(Node::new_unspecified(span))
}

// --- Evaluation ---

pub fn prim_eval(args: Vec<Node>, _span: Span, env: &Rc<RefCell<Environment>>) -> EvalResult {
    // (eval expr) evaluates in the caller's environment
    evaluator::evaluate(args[0].clone(), env.clone())
}

pub fn prim_apply(args: Vec<Node>, span: Span, env: &Rc<RefCell<Environment>>) -> EvalResult {
    // (apply procedure '(arg ...))
    evaluator::apply(&args[0], &args[1], env, span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn run(input: &str) -> EvalResult {
        let env = Environment::new_global_populated();
        let mut result = Node::new_unspecified(Span::default());
        for node in parse_program(input).expect("parses") {
            result = evaluator::evaluate(node, env.clone())?;
        }
        Ok(result)
    }

    fn assert_prim(input: &str, expected: &str) {
        match run(input) {
            Ok(node) => assert_eq!(node.to_string(), expected, "Input: '{}'", input),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    fn assert_prim_error(input: &str) -> String {
        match run(input) {
            Err(EvalError::ApplicationError { message, .. }) => message,
            other => panic!("Input '{}': expected an application error, got {:?}", input, other),
        }
    }

    #[test]
    fn test_install_registers_builtins() {
        let env = Environment::new_global_populated();
        let identifiers = env.borrow().get_identifiers();
        for name in ["eval", "apply", "load", "+", "car", "vector-ref", "equal?", "display"] {
            assert!(identifiers.contains(name), "missing {}", name);
        }
        let eval = env.borrow().get("eval", Span::default()).expect("bound");
        match eval.kind.as_ref() {
            Sexpr::Procedure(crate::types::Procedure::Primitive(primitive)) => {
                assert!(matches!(primitive.func, crate::types::NativeFunc::WithEnv(_)));
            }
            other => panic!("eval is {:?}", other),
        }
        assert_eq!(eval.to_string(), "#<primitive:eval>");
    }

    #[test]
    fn test_integer_division() {
        assert_prim("(quotient 17 5)", "3");
        assert_prim("(quotient -17 5)", "-3");
        assert_prim("(remainder 17 5)", "2");
        assert_prim("(remainder -17 5)", "-2");
        assert_prim("(modulo -17 5)", "3");
        assert_prim("(modulo 17 -5)", "-3");
        assert!(assert_prim_error("(modulo 1 0)").contains("division by zero"));
    }

    #[test]
    fn test_numeric_helpers() {
        assert_prim("(abs -3)", "3");
        assert_prim("(min 3 1 2)", "1");
        assert_prim("(max 3 1 2)", "3");
        assert_prim("(zero? 0)", "#t");
        assert_prim("(even? 4)", "#t");
        assert_prim("(odd? 4)", "#f");
        assert_prim("(odd? -3)", "#t");
    }

    #[test]
    fn test_comparisons_chain() {
        assert_prim("(< 1 2 3)", "#t");
        assert_prim("(< 1 3 2)", "#f");
        assert_prim("(= 2 2 2)", "#t");
        assert_prim("(>= 3 3 1)", "#t");
        assert_prim("(> 1 2)", "#f");
        assert!(assert_prim_error("(< 1 'a)").contains("argument 2 must be a number"));
    }

    #[test]
    fn test_pairs_and_lists() {
        assert_prim("(cons 1 2)", "(1 . 2)");
        assert_prim("(cons 1 '(2 3))", "(1 2 3)");
        assert_prim("(car '(1 2))", "1");
        assert_prim("(cdr '(1 2))", "(2)");
        assert_prim("(cdr '(1))", "()");
        assert_prim("(list)", "()");
        assert_prim("(list 1 (list 2) 'a)", "(1 (2) a)");
        assert_prim("(length '(1 2 3))", "3");
        assert_prim("(length '())", "0");
        assert_prim("(append '(1 2) '(3) '(4 5))", "(1 2 3 4 5)");
        assert_prim("(append '(1) 2)", "(1 . 2)");
        assert_prim("(append)", "()");
        assert!(assert_prim_error("(car '())").contains("must be a pair"));
        assert_prim_error("(cdr 5)");
        assert_prim_error("(length '(1 . 2))");
        assert_prim_error("(append 1 '(2))");
    }

    #[test]
    fn test_vectors() {
        assert_prim("(vector 1 'a)", "#(1 a)");
        assert_prim("(vector-ref (vector 1 2 3) 1)", "2");
        assert_prim("(vector-length (vector))", "0");
        assert_prim("(vector? '#(1))", "#t");
        assert!(assert_prim_error("(vector-ref (vector 1) 1)").contains("out of range"));
        assert_prim_error("(vector-ref (vector 1) 0.5)");
        assert_prim_error("(vector-length '(1))");
    }

    #[test]
    fn test_predicates() {
        assert_prim("(null? '())", "#t");
        assert_prim("(null? '(1))", "#f");
        assert_prim("(pair? '(1))", "#t");
        assert_prim("(pair? '())", "#f");
        assert_prim("(list? '(1 2))", "#t");
        assert_prim("(list? '(1 . 2))", "#f");
        assert_prim("(number? 1)", "#t");
        assert_prim("(boolean? #f)", "#t");
        assert_prim("(symbol? 'a)", "#t");
        assert_prim("(string? \"a\")", "#t");
        assert_prim("(procedure? car)", "#t");
        assert_prim("(procedure? (lambda () 1))", "#t");
        assert_prim("(procedure? 'car)", "#f");
        assert_prim("(not #f)", "#t");
        assert_prim("(not 0)", "#f");
    }

    #[test]
    fn test_equivalence() {
        assert_prim("(eq? 'a 'a)", "#t");
        assert_prim("(eqv? 1 1)", "#t");
        assert_prim("(eqv? '(1) '(1))", "#f");
        assert_prim("(define x '(1)) (eq? x x)", "#t");
        assert_prim("(equal? '(1 (2 #(3))) (list 1 (list 2 (vector 3))))", "#t");
        assert_prim("(equal? \"ab\" \"ab\")", "#t");
        assert_prim("(eq? car car)", "#t");
    }

    #[test]
    fn test_output_returns_okay() {
        assert_prim("(display \"\")", "okay");
        assert_prim("(newline)", "okay");
    }
}

use crate::environment::{EnvError, Environment, check_formals};
use crate::evaluator::{EvalError, EvalResult, apply_procedure, evaluate};
use crate::source::Span;
use crate::types::{Lambda, Node, Procedure, Sexpr};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

/// What a special form hands back to the evaluator loop.
pub enum Outcome {
    /// The final value of the form. It is never evaluated again.
    Value(Node),
    /// The form ended in tail position: continue with this expression in this environment.
    TailCall(Node, Rc<RefCell<Environment>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    Lambda,
    Mu,
    Define,
    Set,
    If,
    And,
    Or,
    Cond,
    Begin,
    Let,
    Letrec,
}

const SPECIAL_FORMS: [(&str, SpecialForm); 12] = [
    ("quote", SpecialForm::Quote),
    ("lambda", SpecialForm::Lambda),
    ("mu", SpecialForm::Mu),
    ("define", SpecialForm::Define),
    ("set!", SpecialForm::Set),
    ("if", SpecialForm::If),
    ("and", SpecialForm::And),
    ("or", SpecialForm::Or),
    ("cond", SpecialForm::Cond),
    ("begin", SpecialForm::Begin),
    ("let", SpecialForm::Let),
    ("letrec", SpecialForm::Letrec),
];

/// Names recognised as special forms, for completion in the REPL.
pub fn special_form_identifiers() -> HashSet<String> {
    SPECIAL_FORMS
        .iter()
        .map(|(name, _)| name.to_string())
        .collect()
}

impl SpecialForm {
    /// Special forms are recognised by the operator's name alone, so they
    /// cannot be shadowed by a binding of the same name.
    pub fn lookup(name: &str) -> Option<SpecialForm> {
        SPECIAL_FORMS
            .iter()
            .find(|(form_name, _)| *form_name == name)
            .map(|(_, form)| *form)
    }

    pub fn name(self) -> &'static str {
        SPECIAL_FORMS
            .iter()
            .find(|(_, form)| *form == self)
            .map_or("?", |(name, _)| name)
    }

    /// Runs the form on its (unevaluated) `operands`. `span` covers the whole form.
    pub fn evaluate(
        self,
        operands: &Node,
        env: &Rc<RefCell<Environment>>,
        span: Span,
    ) -> EvalResult<Outcome> {
        match self {
            SpecialForm::Quote => eval_quote(operands, span),
            SpecialForm::Lambda => eval_lambda(operands, env, span),
            SpecialForm::Mu => eval_mu(operands, span),
            SpecialForm::Define => eval_define(operands, env, span),
            SpecialForm::Set => eval_set(operands, env, span),
            SpecialForm::If => eval_if(operands, env, span),
            SpecialForm::And => eval_and(operands, env, span),
            SpecialForm::Or => eval_or(operands, env, span),
            SpecialForm::Cond => eval_cond(operands, env, span),
            SpecialForm::Begin => eval_begin(operands, env, span),
            SpecialForm::Let => eval_let(operands, env, span),
            SpecialForm::Letrec => eval_letrec(operands, env, span),
        }
    }
}

/// Checks that `operands` is a proper list of between `min` and `max` elements.
fn check_form(
    operands: &Node,
    min: usize,
    max: Option<usize>,
    form: &str,
    span: Span,
) -> EvalResult<Vec<Node>> {
    let Some(parts) = operands.to_vec() else {
        return Err(EvalError::malformed(
            format!("badly formed expression: ({} . {})", form, operands),
            span,
        ));
    };
    if parts.len() < min {
        return Err(EvalError::malformed(
            format!("too few operands in {} form", form),
            span,
        ));
    }
    if max.is_some_and(|max| parts.len() > max) {
        return Err(EvalError::malformed(
            format!("too many operands in {} form", form),
            span,
        ));
    }
    Ok(parts)
}

// A body of several expressions becomes one `(begin ...)`.
fn sequence(body: &[Node], span: Span) -> Node {
    match body {
        [single] => single.clone(),
        _ => Node::new_pair(
            Node::new_symbol("begin".to_string(), span),
            Node::new_list(body.to_vec(), span),
            span,
        ),
    }
}

fn eval_quote(operands: &Node, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 1, Some(1), "quote", span)?;
    Ok(Outcome::Value(parts[0].clone()))
}

fn eval_lambda(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 2, None, "lambda", span)?;
    check_formals(&parts[0])?;
    let body = sequence(&parts[1..], span);
    Ok(Outcome::Value(Node::new_lambda(
        parts[0].clone(),
        body,
        env.clone(),
        span,
    )))
}

fn eval_mu(operands: &Node, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 2, None, "mu", span)?;
    check_formals(&parts[0])?;
    let body = sequence(&parts[1..], span);
    Ok(Outcome::Value(Node::new_mu(parts[0].clone(), body, span)))
}

// (define name expr) or (define (name . formals) body...); both return the name.
fn eval_define(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 2, None, "define", span)?;
    let target = &parts[0];
    match target.kind.as_ref() {
        Sexpr::Symbol(name) => {
            if parts.len() > 2 {
                return Err(EvalError::malformed("too many operands in define form", span));
            }
            let value = evaluate(parts[1].clone(), env.clone())?;
            debug!(name = %name, "define");
            env.borrow_mut().define(name.clone(), value);
            Ok(Outcome::Value(target.clone()))
        }
        Sexpr::Pair(name_node, formals) => {
            let Some(name) = name_node.as_symbol() else {
                return Err(EnvError::NotAVariable(name_node.kind.as_ref().clone(), name_node.span).into());
            };
            check_formals(formals)?;
            let body = sequence(&parts[1..], span);
            let procedure = Node::new_lambda(formals.clone(), body, env.clone(), span);
            debug!(name = %name, formals = %formals, "define procedure");
            env.borrow_mut().define(name.to_string(), procedure);
            Ok(Outcome::Value(name_node.clone()))
        }
        _ => Err(EvalError::malformed(
            format!("cannot define {}", target),
            target.span,
        )),
    }
}

fn eval_set(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 2, Some(2), "set!", span)?;
    let Some(name) = parts[0].as_symbol() else {
        return Err(EnvError::NotAVariable(parts[0].kind.as_ref().clone(), parts[0].span).into());
    };
    let value = evaluate(parts[1].clone(), env.clone())?;
    env.borrow_mut().set(name, value, parts[0].span)?;
    Ok(Outcome::Value(Node::new_undefined(span)))
}

fn eval_if(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 2, Some(3), "if", span)?;
    let test = evaluate(parts[0].clone(), env.clone())?;
    if test.is_true() {
        Ok(Outcome::TailCall(parts[1].clone(), env.clone()))
    } else if let Some(alternative) = parts.get(2) {
        Ok(Outcome::TailCall(alternative.clone(), env.clone()))
    } else {
        Ok(Outcome::Value(Node::new_unspecified(span)))
    }
}

fn eval_and(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 0, None, "and", span)?;
    let Some((last, init)) = parts.split_last() else {
        return Ok(Outcome::Value(Node::new_bool(true, span)));
    };
    for part in init {
        let value = evaluate(part.clone(), env.clone())?;
        if value.is_false() {
            return Ok(Outcome::Value(value));
        }
    }
    Ok(Outcome::TailCall(last.clone(), env.clone()))
}

fn eval_or(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 0, None, "or", span)?;
    let Some((last, init)) = parts.split_last() else {
        return Ok(Outcome::Value(Node::new_bool(false, span)));
    };
    for part in init {
        let value = evaluate(part.clone(), env.clone())?;
        if value.is_true() {
            return Ok(Outcome::Value(value));
        }
    }
    Ok(Outcome::TailCall(last.clone(), env.clone()))
}

fn eval_cond(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let clauses = check_form(operands, 0, None, "cond", span)?;
    let count = clauses.len();
    for (i, clause) in clauses.iter().enumerate() {
        let parts = check_form(clause, 1, None, "cond clause", clause.span)?;
        let test = if parts[0].as_symbol() == Some("else") {
            if i + 1 != count {
                return Err(EvalError::malformed("else must be last", clause.span));
            }
            if parts.len() == 1 {
                return Err(EvalError::malformed("badly formed else clause", clause.span));
            }
            Node::new_bool(true, parts[0].span)
        } else {
            evaluate(parts[0].clone(), env.clone())?
        };
        if test.is_true() {
            if parts.len() == 1 {
                return Ok(Outcome::Value(test));
            }
            return Ok(Outcome::TailCall(sequence(&parts[1..], clause.span), env.clone()));
        }
    }
    Ok(Outcome::Value(Node::new_unspecified(span)))
}

fn eval_begin(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 1, None, "begin", span)?;
    let Some((last, init)) = parts.split_last() else {
        return Err(EvalError::malformed("too few operands in begin form", span));
    };
    for part in init {
        evaluate(part.clone(), env.clone())?;
    }
    Ok(Outcome::TailCall(last.clone(), env.clone()))
}

// Splits ((name value) ...) into names and values. Plain `let` evaluates each
// value in `env`; a recursive binding evaluates them in order in a scratch
// frame below `env`, defining each name as it goes.
fn eval_bindings(
    bindings: &Node,
    env: &Rc<RefCell<Environment>>,
    recursive: bool,
    form: &str,
    span: Span,
) -> EvalResult<(Node, Vec<Node>)> {
    let Some(bindings) = bindings.to_vec() else {
        return Err(EvalError::malformed(
            format!("bad bindings list in {} form", form),
            span,
        ));
    };
    let scope = if recursive {
        Environment::new_enclosed(env.clone())
    } else {
        env.clone()
    };
    let mut names = Vec::with_capacity(bindings.len());
    let mut values = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let parts = check_form(&binding, 2, Some(2), "binding", binding.span)?;
        let value = evaluate(parts[1].clone(), scope.clone())?;
        if recursive && let Some(name) = parts[0].as_symbol() {
            scope.borrow_mut().define(name.to_string(), value.clone());
        }
        names.push(parts[0].clone());
        values.push(value);
    }
    let names = Node::new_list(names, span);
    check_formals(&names)?;
    Ok((names, values))
}

fn eval_let(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 2, None, "let", span)?;
    if let Some(name) = parts[0].as_symbol() {
        return eval_named_let(name, &parts[1..], env, span);
    }
    let (names, values) = eval_bindings(&parts[0], env, false, "let", span)?;
    let frame = Environment::make_call_frame(env, &names, &values, span)?;
    Ok(Outcome::TailCall(sequence(&parts[1..], span), frame))
}

// (let name ((var init) ...) body...): `name` is bound, in a frame of its own,
// to a procedure over the vars, which is then called with the inits. Inits
// see the vars bound before them.
fn eval_named_let(
    name: &str,
    parts: &[Node],
    env: &Rc<RefCell<Environment>>,
    span: Span,
) -> EvalResult<Outcome> {
    let [bindings, body @ ..] = parts else {
        return Err(EvalError::malformed("too few operands in let form", span));
    };
    if body.is_empty() {
        return Err(EvalError::malformed("too few operands in let form", span));
    }
    let (names, values) = eval_bindings(bindings, env, true, "let", span)?;
    let frame = Environment::new_enclosed(env.clone());
    let procedure = Procedure::Lambda(Rc::new(Lambda {
        formals: names,
        body: sequence(body, span),
        env: frame.clone(),
    }));
    frame
        .borrow_mut()
        .define(name.to_string(), Node::new(Sexpr::Procedure(procedure.clone()), span));
    let result = apply_procedure(&procedure, values, &frame, span)?;
    Ok(Outcome::Value(result))
}

// One new frame; each init is evaluated in it, in order, and bound at once, so
// later inits and procedure bodies see earlier names.
fn eval_letrec(operands: &Node, env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult<Outcome> {
    let parts = check_form(operands, 2, None, "letrec", span)?;
    let Some(bindings) = parts[0].to_vec() else {
        return Err(EvalError::malformed("bad bindings list in letrec form", span));
    };
    let mut pairs = Vec::with_capacity(bindings.len());
    for binding in &bindings {
        let binding_parts = check_form(binding, 2, Some(2), "binding", binding.span)?;
        pairs.push((binding_parts[0].clone(), binding_parts[1].clone()));
    }
    let names: Vec<Node> = pairs.iter().map(|(name, _)| name.clone()).collect();
    check_formals(&Node::new_list(names, span))?;

    let frame = Environment::new_enclosed(env.clone());
    for (name, init) in pairs {
        let value = evaluate(init, frame.clone())?;
        if let Some(name) = name.as_symbol() {
            frame.borrow_mut().define(name.to_string(), value);
        }
    }
    Ok(Outcome::TailCall(sequence(&parts[1..], span), frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_program, parse_str};

    fn eval_all(input: &str, env: &Rc<RefCell<Environment>>) -> EvalResult {
        let nodes = parse_program(input)
            .unwrap_or_else(|e| panic!("Parsing failed for input '{}': {}", input, e));
        let mut result = Node::new_unspecified(Span::default());
        for node in nodes {
            result = evaluate(node, env.clone())?;
        }
        Ok(result)
    }

    fn eval_ok(input: &str) -> String {
        let env = Environment::new_global_populated();
        match eval_all(input, &env) {
            Ok(node) => node.to_string(),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    fn eval_err(input: &str) -> EvalError {
        let env = Environment::new_global_populated();
        match eval_all(input, &env) {
            Ok(node) => panic!("Expected '{}' to fail, got {}", input, node),
            Err(e) => e,
        }
    }

    fn is_malformed(err: &EvalError) -> bool {
        matches!(err, EvalError::MalformedForm(_, _))
    }

    // Splits a parsed form into the special form it names and its operands.
    fn form_parts(input: &str) -> (SpecialForm, Node) {
        let node = parse_str(input).expect("parses");
        match node.kind.as_ref() {
            Sexpr::Pair(operator, operands) => {
                let form = operator
                    .as_symbol()
                    .and_then(SpecialForm::lookup)
                    .expect("special form");
                (form, operands.clone())
            }
            _ => panic!("not a form: {}", input),
        }
    }

    #[test]
    fn test_lookup_and_names() {
        assert_eq!(SpecialForm::lookup("set!"), Some(SpecialForm::Set));
        assert_eq!(SpecialForm::lookup("letrec"), Some(SpecialForm::Letrec));
        assert_eq!(SpecialForm::lookup("car"), None);
        assert_eq!(SpecialForm::Cond.name(), "cond");
        let identifiers = special_form_identifiers();
        assert_eq!(identifiers.len(), 12);
        assert!(identifiers.contains("mu"));
    }

    #[test]
    fn test_tail_positions_are_handed_back() {
        let env = Environment::new_global_populated();
        for input in [
            "(if #t (f) (g))",
            "(and 1 (f))",
            "(or #f (f))",
            "(cond (#f 1) (else (f)))",
            "(begin 1 (f))",
            "(let ((x 1)) (f))",
            "(letrec ((x 1)) (f))",
        ] {
            let (form, operands) = form_parts(input);
            let outcome = form.evaluate(&operands, &env, Span::default()).expect(input);
            match outcome {
                Outcome::TailCall(next, _) => assert_eq!(next.to_string(), "(f)", "{}", input),
                Outcome::Value(value) => panic!("{} returned value {}", input, value),
            }
        }
    }

    #[test]
    fn test_quote() {
        assert_eq!(eval_ok("(quote (a . b))"), "(a . b)");
        assert!(is_malformed(&eval_err("(quote 1 2)")));
        assert!(is_malformed(&eval_err("(quote . x)")));
    }

    #[test]
    fn test_lambda_and_mu_values() {
        assert_eq!(eval_ok("(lambda (x) (* x x))"), "(lambda (x) (* x x))");
        assert_eq!(eval_ok("(lambda (x) 1 2)"), "(lambda (x) (begin 1 2))");
        assert_eq!(eval_ok("(mu (x . y) y)"), "(mu (x . y) y)");
        assert!(is_malformed(&eval_err("(lambda (x))")));
        assert!(is_malformed(&eval_err("(mu)")));
        assert!(matches!(
            eval_err("(lambda (x 1) x)"),
            EvalError::EnvError(EnvError::NotAVariable(_, _))
        ));
        assert!(matches!(
            eval_err("(mu (x x) x)"),
            EvalError::EnvError(EnvError::DuplicateFormal(_, _))
        ));
    }

    #[test]
    fn test_define_returns_name() {
        assert_eq!(eval_ok("(define x 5)"), "x");
        assert_eq!(eval_ok("(define (sq x) (* x x))"), "sq");
        assert_eq!(eval_ok("(define (sq x) (* x x)) (sq 7)"), "49");
        assert_eq!(eval_ok("(define (f . args) args) (f 1 2)"), "(1 2)");
        assert_eq!(eval_ok("(define x 1) (define x 2) x"), "2");
        assert!(is_malformed(&eval_err("(define x)")));
        assert!(is_malformed(&eval_err("(define x 1 2)")));
        assert!(is_malformed(&eval_err("(define 5 1)")));
        assert!(matches!(
            eval_err("(define (5 x) 1)"),
            EvalError::EnvError(EnvError::NotAVariable(_, _))
        ));
    }

    #[test]
    fn test_define_in_body_is_local() {
        let env = Environment::new_global_populated();
        let result = eval_all("(define (f) (define inner 3) inner) (f)", &env).expect("runs");
        assert_eq!(result.to_string(), "3");
        assert!(env.borrow().get("inner", Span::default()).is_err());
    }

    #[test]
    fn test_set() {
        assert_eq!(eval_ok("(define x 1) (set! x (+ x 1)) x"), "2");
        assert_eq!(eval_ok("(define x 1) (set! x 2)"), "#<undefined>");
        assert_eq!(
            eval_ok("(define x 1) (define (f) (set! x 10)) (f) x"),
            "10"
        );
        assert!(is_malformed(&eval_err("(define x 1) (set! x)")));
        assert!(matches!(
            eval_err("(set! 5 1)"),
            EvalError::EnvError(EnvError::NotAVariable(_, _))
        ));
        assert!(matches!(
            eval_err("(set! nowhere 1)"),
            EvalError::EnvError(EnvError::UnboundIdentifier(_, _))
        ));
    }

    #[test]
    fn test_and_or_values() {
        assert_eq!(eval_ok("(and)"), "#t");
        assert_eq!(eval_ok("(and 1 2 3)"), "3");
        assert_eq!(eval_ok("(and 1 #f undefined-name)"), "#f");
        assert_eq!(eval_ok("(or)"), "#f");
        assert_eq!(eval_ok("(or #f 2 undefined-name)"), "2");
        assert_eq!(eval_ok("(or #f #f)"), "#f");
    }

    #[test]
    fn test_or_and_cond_evaluate_tests_once() {
        assert_eq!(
            eval_ok(
                "(define n 0)
                 (define (bump) (set! n (+ n 1)) n)
                 (or #f (bump) 5)
                 n"
            ),
            "1"
        );
        // The value of a true test is returned as is, never re-evaluated
        assert_eq!(eval_ok("(or #f '(car 1) 2)"), "(car 1)");
        assert_eq!(eval_ok("(cond ((quote (x y))))"), "(x y)");
        assert_eq!(eval_ok("(cond (#f 1) ('sym))"), "sym");
    }

    #[test]
    fn test_cond() {
        assert_eq!(eval_ok("(cond ((= 1 2) 'a) ((= 1 1) 'b) (else 'c))"), "b");
        assert_eq!(eval_ok("(cond ((= 1 2) 'a) (else 1 2 'c))"), "c");
        assert_eq!(eval_ok("(cond)"), "okay");
        assert_eq!(eval_ok("(cond (#f 1))"), "okay");
        assert!(is_malformed(&eval_err("(cond (else 1) (#t 2))")));
        assert!(is_malformed(&eval_err("(cond (else))")));
        assert!(is_malformed(&eval_err("(cond ())")));
        assert!(is_malformed(&eval_err("(cond 5)")));
    }

    #[test]
    fn test_begin() {
        assert_eq!(eval_ok("(begin 1 2 3)"), "3");
        assert_eq!(eval_ok("(define x 0) (begin (set! x 5) (+ x 1))"), "6");
        assert!(is_malformed(&eval_err("(begin)")));
    }

    #[test]
    fn test_let() {
        assert_eq!(eval_ok("(let ((x 1) (y 2)) (+ x y))"), "3");
        assert_eq!(eval_ok("(let () 5)"), "5");
        // inits see the outer scope, not each other
        assert_eq!(eval_ok("(define x 10) (let ((x 1) (y x)) y)"), "10");
        assert_eq!(eval_ok("(let ((x 1)) (define z 2) (+ x z))"), "3");
        assert!(is_malformed(&eval_err("(let ((x 1)))")));
        assert!(is_malformed(&eval_err("(let ((x)) x)")));
        assert!(is_malformed(&eval_err("(let ((x 1 2)) x)")));
        assert!(is_malformed(&eval_err("(let x)")));
        assert!(matches!(
            eval_err("(let ((x 1) (x 2)) x)"),
            EvalError::EnvError(EnvError::DuplicateFormal(_, _))
        ));
        assert!(matches!(
            eval_err("(let ((1 2)) 3)"),
            EvalError::EnvError(EnvError::NotAVariable(_, _))
        ));
    }

    #[test]
    fn test_named_let() {
        assert_eq!(
            eval_ok("(let loop ((i 0) (acc '())) (if (= i 3) acc (loop (+ i 1) (cons i acc))))"),
            "(2 1 0)"
        );
        // the loop name is not visible outside
        let env = Environment::new_global_populated();
        eval_all("(let go ((n 2)) n)", &env).expect("runs");
        assert!(env.borrow().get("go", Span::default()).is_err());
        assert!(is_malformed(&eval_err("(let go ((n 2)))")));
    }

    #[test]
    fn test_named_let_inits_see_earlier_vars() {
        assert_eq!(eval_ok("(let loop ((a 1) (b a)) b)"), "1");
        assert_eq!(eval_ok("(let loop ((a 1) (b (+ a 1))) (+ a b))"), "3");
        // plain let still evaluates every init outside
        assert!(matches!(
            eval_err("(let ((a 1) (b a)) b)"),
            EvalError::EnvError(EnvError::UnboundIdentifier(_, _))
        ));
        // the scratch bindings do not leak into the caller's frame
        let env = Environment::new_global_populated();
        eval_all("(let loop ((a 1) (b a)) b)", &env).expect("runs");
        assert!(env.borrow().get("a", Span::default()).is_err());
    }

    #[test]
    fn test_letrec() {
        assert_eq!(
            eval_ok(
                "(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
                          (odd? (lambda (n) (if (= n 0) #f (even? (- n 1))))))
                   (even? 100))"
            ),
            "#t"
        );
        assert_eq!(eval_ok("(letrec ((a 1) (b (+ a 1))) b)"), "2");
        assert!(matches!(
            eval_err("(letrec ((b a) (a 1)) b)"),
            EvalError::EnvError(EnvError::UnboundIdentifier(_, _))
        ));
        assert!(matches!(
            eval_err("(letrec ((a 1) (a 2)) a)"),
            EvalError::EnvError(EnvError::DuplicateFormal(_, _))
        ));
        assert!(is_malformed(&eval_err("(letrec ((a 1)))")));
    }

    #[test]
    fn test_special_form_names_are_not_shadowed() {
        assert_eq!(eval_ok("(define (if a b c) 'user) (if #t 1 2)"), "1");
    }
}

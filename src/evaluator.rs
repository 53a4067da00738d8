use crate::environment::{EnvError, Environment};
use crate::source::Span;
use crate::special_forms::{Outcome, SpecialForm};
use crate::types::{NativeFunc, Node, Primitive, Procedure, Sexpr};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use thiserror::Error;
use tracing::{trace, warn};

// --- Evaluation Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    EnvError(#[from] EnvError), // Errors from environment lookup and call-frame construction
    #[error("{0}")]
    MalformedForm(String, Span), // Wrong operand count or a combination that is not a proper list
    #[error("cannot call {0}")]
    NotApplicable(Sexpr, Span), // Tried to call something that isn't a procedure
    #[error("cannot apply {procedure}: {message}")]
    ApplicationError {
        procedure: String,
        message: String,
        span: Span,
    }, // A primitive rejected its arguments
    #[error("cannot eval vector: {0}")]
    NotEvaluable(Sexpr, Span),
    #[error("cannot evaluate an undefined expression")]
    InvalidExpression(Span),
    #[error("maximum recursion depth exceeded (limit {limit})")]
    RecursionLimitExceeded { limit: usize, span: Span },
    #[error("cannot load {path}: {message}")]
    Load {
        path: String,
        message: String,
        span: Span,
    },
}

impl EvalError {
    pub fn malformed(message: impl Into<String>, span: Span) -> Self {
        EvalError::MalformedForm(message.into(), span)
    }

    pub fn application(procedure: &str, message: impl Into<String>, span: Span) -> Self {
        EvalError::ApplicationError {
            procedure: procedure.to_string(),
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            EvalError::EnvError(env_err) => env_err.span(),
            EvalError::MalformedForm(_, span)
            | EvalError::NotApplicable(_, span)
            | EvalError::NotEvaluable(_, span)
            | EvalError::InvalidExpression(span) => *span,
            EvalError::ApplicationError { span, .. }
            | EvalError::RecursionLimitExceeded { span, .. }
            | EvalError::Load { span, .. } => *span,
        }
    }
}

// Result type alias for convenience
pub type EvalResult<T = Node> = Result<T, EvalError>;

// --- Recursion guard ---

/// Default bound on nested (non-tail) calls into `evaluate`.
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 1000;

// Grow by STACK_GROW_SIZE once less than STACK_RED_ZONE remains.
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

thread_local! {
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
    static MAX_EVAL_DEPTH: Cell<usize> = const { Cell::new(DEFAULT_MAX_EVAL_DEPTH) };
}

/// Sets the maximum eval recursion depth for this thread. Returns the previous value.
pub fn set_max_eval_depth(depth: usize) -> usize {
    MAX_EVAL_DEPTH.with(|max| max.replace(depth))
}

pub fn max_eval_depth() -> usize {
    MAX_EVAL_DEPTH.with(|max| max.get())
}

/// Number of `evaluate` calls currently on the native stack.
pub fn eval_depth() -> usize {
    EVAL_DEPTH.with(|depth| depth.get())
}

struct DepthGuard;

impl DepthGuard {
    fn enter(span: Span) -> EvalResult<DepthGuard> {
        let limit = max_eval_depth();
        EVAL_DEPTH.with(|depth| {
            if depth.get() >= limit {
                warn!(limit, "recursion limit exceeded");
                return Err(EvalError::RecursionLimitExceeded { limit, span });
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

// --- Evaluate Function ---

/// Evaluates a given AST Node within the specified environment.
///
/// Tail positions (the branches of `if`, the last expression of `begin`,
/// `and`, `or`, `cond` and `let`, and the bodies of `lambda` and `mu`
/// procedures) replace `node`/`env` and go round the loop again instead of
/// recursing, so a Scheme-level tail call costs no native stack.
///
/// The native stack grows on demand, so the depth limit rather than the
/// thread's stack size bounds non-tail recursion.
pub fn evaluate(node: Node, env: Rc<RefCell<Environment>>) -> EvalResult {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || evaluate_inner(node, env))
}

fn evaluate_inner(node: Node, env: Rc<RefCell<Environment>>) -> EvalResult {
    let _depth = DepthGuard::enter(node.span)?;
    let mut node = node;
    let mut env = env;

    loop {
        let (operator, operands) = match node.kind.as_ref() {
            Sexpr::Undefined => return Err(EvalError::InvalidExpression(node.span)),
            // Symbols: look up in the environment
            Sexpr::Symbol(name) => return Ok(env.borrow().get(name, node.span)?),
            // Self-evaluating atoms
            Sexpr::Number(_)
            | Sexpr::String(_)
            | Sexpr::Boolean(_)
            | Sexpr::Nil
            | Sexpr::Unspecified => return Ok(node.clone()),
            Sexpr::Vector(_) => {
                return Err(EvalError::NotEvaluable(
                    node.kind.as_ref().clone(),
                    node.span,
                ));
            }
            Sexpr::Pair(first, rest) if rest.is_list() => (first.clone(), rest.clone()),
            _ => {
                return Err(EvalError::malformed(
                    format!("malformed list: {}", node),
                    node.span,
                ));
            }
        };

        if let Some(form) = operator.as_symbol().and_then(SpecialForm::lookup) {
            match form.evaluate(&operands, &env, node.span)? {
                Outcome::Value(value) => return Ok(value),
                Outcome::TailCall(next, next_env) => {
                    node = next;
                    env = next_env;
                    continue;
                }
            }
        }

        let procedure = evaluate_operator(&operator, &env)?;
        let args = evaluate_operands(&operands, &env)?;

        match procedure {
            Procedure::Primitive(primitive) => {
                return apply_primitive(&primitive, args, &env, node.span);
            }
            Procedure::Lambda(lambda) => {
                trace!(formals = %lambda.formals, "tail call into lambda");
                env = Environment::make_call_frame(&lambda.env, &lambda.formals, &args, node.span)?;
                node = lambda.body.clone();
            }
            Procedure::Mu(mu) => {
                trace!(formals = %mu.formals, "tail call into mu");
                env = Environment::make_call_frame(&env, &mu.formals, &args, node.span)?;
                node = mu.body.clone();
            }
        }
    }
}

fn evaluate_operator(operator: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult<Procedure> {
    let value = evaluate(operator.clone(), env.clone())?;
    match value.kind.as_ref() {
        Sexpr::Procedure(procedure) => Ok(procedure.clone()),
        other => Err(EvalError::NotApplicable(other.clone(), operator.span)),
    }
}

// Operands are evaluated left to right in the caller's environment.
fn evaluate_operands(operands: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult<Vec<Node>> {
    operands
        .iter()
        .map(|operand| evaluate(operand, env.clone()))
        .collect()
}

// --- Apply ---

/// Applies `procedure` to the Scheme list `args` from outside the evaluator
/// loop (the `apply` and `eval` builtins, named `let`).
///
/// This path recurses through [`evaluate`], so unlike calls made by the loop it
/// does consume native stack; depth is bounded by the recursion guard.
pub fn apply(
    procedure: &Node,
    args: &Node,
    env: &Rc<RefCell<Environment>>,
    span: Span,
) -> EvalResult {
    let Sexpr::Procedure(procedure) = procedure.kind.as_ref() else {
        return Err(EvalError::NotApplicable(
            procedure.kind.as_ref().clone(),
            procedure.span,
        ));
    };
    let Some(args) = args.to_vec() else {
        return Err(EvalError::application(
            "apply",
            format!("argument list {} is not a proper list", args),
            span,
        ));
    };
    apply_procedure(procedure, args, env, span)
}

/// Like [`apply`], with the procedure already unwrapped and arguments collected.
pub fn apply_procedure(
    procedure: &Procedure,
    args: Vec<Node>,
    env: &Rc<RefCell<Environment>>,
    span: Span,
) -> EvalResult {
    match procedure {
        Procedure::Primitive(primitive) => apply_primitive(primitive, args, env, span),
        Procedure::Lambda(lambda) => {
            let frame = Environment::make_call_frame(&lambda.env, &lambda.formals, &args, span)?;
            evaluate(lambda.body.clone(), frame)
        }
        Procedure::Mu(mu) => {
            let frame = Environment::make_call_frame(env, &mu.formals, &args, span)?;
            evaluate(mu.body.clone(), frame)
        }
    }
}

fn apply_primitive(
    primitive: &Primitive,
    args: Vec<Node>,
    env: &Rc<RefCell<Environment>>,
    span: Span,
) -> EvalResult {
    if !primitive.arity.accepts(args.len()) {
        let shown: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        return Err(EvalError::application(
            &primitive.name,
            format!(
                "expects {} argument(s), got ({})",
                primitive.arity,
                shown.join(" ")
            ),
            span,
        ));
    }
    trace!(primitive = %primitive.name, argc = args.len(), "applying primitive");
    match primitive.func {
        NativeFunc::Pure(func) => func(args, span),
        NativeFunc::WithEnv(func) => func(args, span, env),
    }
}

use crate::environment::Environment;
use crate::{evaluator::EvalResult, source::Span};
use std::cell::RefCell;
use std::fmt; // For custom display formatting
use std::mem;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: Rc<Sexpr>, // The actual S-expression data, shared between clones
    pub span: Span,      // The source span it covers
}

impl Node {
    pub fn new(kind: Sexpr, span: Span) -> Self {
        Node {
            kind: Rc::new(kind),
            span,
        }
    }

    pub fn new_number(n: f64, span: Span) -> Self {
        Node::new(Sexpr::Number(n), span)
    }

    pub fn new_bool(b: bool, span: Span) -> Self {
        Node::new(Sexpr::Boolean(b), span)
    }

    pub fn new_string(s: &str, span: Span) -> Self {
        Node::new(Sexpr::String(s.to_string()), span)
    }

    pub fn new_symbol(s: String, span: Span) -> Self {
        Node::new(Sexpr::Symbol(s), span)
    }

    pub fn new_nil(span: Span) -> Self {
        Node::new(Sexpr::Nil, span)
    }

    pub fn new_unspecified(span: Span) -> Self {
        Node::new(Sexpr::Unspecified, span)
    }

    pub fn new_undefined(span: Span) -> Self {
        Node::new(Sexpr::Undefined, span)
    }

    pub fn new_pair(car: Node, cdr: Node, span: Span) -> Self {
        Node::new(Sexpr::Pair(car, cdr), span)
    }

    pub fn new_vector(elements: Vec<Node>, span: Span) -> Self {
        Node::new(Sexpr::Vector(elements), span)
    }

    /// Builds a proper list from `elements`, every pair carrying `span`.
    pub fn new_list(elements: Vec<Node>, span: Span) -> Self {
        Node::new_dotted_list(elements, Node::new_nil(span), span)
    }

    /// Builds `(e1 e2 ... . tail)`.
    pub fn new_dotted_list(elements: Vec<Node>, tail: Node, span: Span) -> Self {
        elements
            .into_iter()
            .rev()
            .fold(tail, |cdr, car| Node::new_pair(car, cdr, span))
    }

    /// Wraps `expr` as `(quote_symbol expr)`, e.g. `'x` => `(quote x)`.
    pub fn new_quoted_expr(expr: Node, quote_symbol: &str, quote_span: Span) -> Self {
        let span = quote_span.merge(&expr.span);
        let end = Span::new(expr.span.end, expr.span.end);
        let expr_span = expr.span;
        Node::new_pair(
            Node::new_symbol(quote_symbol.to_string(), quote_span),
            Node::new_pair(expr, Node::new_nil(end), expr_span),
            span,
        )
    }

    pub fn new_quote(expr: Node, quote_span: Span) -> Self {
        Node::new_quoted_expr(expr, "quote", quote_span)
    }

    pub fn new_primitive(primitive: Primitive, span: Span) -> Self {
        Node::new(
            Sexpr::Procedure(Procedure::Primitive(Rc::new(primitive))),
            span,
        )
    }

    pub fn new_lambda(
        formals: Node,
        body: Node,
        env: Rc<RefCell<Environment>>,
        span: Span,
    ) -> Self {
        Node::new(
            Sexpr::Procedure(Procedure::Lambda(Rc::new(Lambda { formals, body, env }))),
            span,
        )
    }

    pub fn new_mu(formals: Node, body: Node, span: Span) -> Self {
        Node::new(
            Sexpr::Procedure(Procedure::Mu(Rc::new(Mu { formals, body }))),
            span,
        )
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self.kind.as_ref() {
            Sexpr::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// In Scheme only `#f` is false.
    pub fn is_true(&self) -> bool {
        !self.is_false()
    }

    pub fn is_false(&self) -> bool {
        matches!(self.kind.as_ref(), Sexpr::Boolean(false))
    }

    /// Iterates over the cars of a (possibly improper) list.
    pub fn iter(&self) -> ListIter {
        ListIter {
            current: self.clone(),
        }
    }

    /// True for `()` and for pair chains terminated by `()`.
    pub fn is_list(&self) -> bool {
        let mut iter = self.iter();
        iter.by_ref().for_each(drop);
        matches!(iter.remainder().kind.as_ref(), Sexpr::Nil)
    }

    /// Length of a proper list, `None` otherwise.
    pub fn list_len(&self) -> Option<usize> {
        let mut iter = self.iter();
        let len = iter.by_ref().count();
        match iter.remainder().kind.as_ref() {
            Sexpr::Nil => Some(len),
            _ => None,
        }
    }

    /// Elements of a proper list, `None` otherwise.
    pub fn to_vec(&self) -> Option<Vec<Node>> {
        let mut iter = self.iter();
        let elements: Vec<Node> = iter.by_ref().collect();
        match iter.remainder().kind.as_ref() {
            Sexpr::Nil => Some(elements),
            _ => None,
        }
    }

    /// `eqv?`: atoms compare by value, everything else by identity.
    pub fn is_eqv(&self, other: &Node) -> bool {
        match (self.kind.as_ref(), other.kind.as_ref()) {
            (Sexpr::Number(a), Sexpr::Number(b)) => a == b,
            (Sexpr::Boolean(a), Sexpr::Boolean(b)) => a == b,
            (Sexpr::Symbol(a), Sexpr::Symbol(b)) => a == b,
            (Sexpr::Nil, Sexpr::Nil)
            | (Sexpr::Unspecified, Sexpr::Unspecified)
            | (Sexpr::Undefined, Sexpr::Undefined) => true,
            (Sexpr::Procedure(a), Sexpr::Procedure(b)) => a == b,
            _ => Rc::ptr_eq(&self.kind, &other.kind),
        }
    }

    /// `equal?`: structural comparison ignoring spans.
    pub fn is_equal(&self, other: &Node) -> bool {
        let (mut left, mut right) = (self, other);
        loop {
            match (left.kind.as_ref(), right.kind.as_ref()) {
                (Sexpr::Pair(a_car, a_cdr), Sexpr::Pair(b_car, b_cdr)) => {
                    if !a_car.is_equal(b_car) {
                        return false;
                    }
                    left = a_cdr;
                    right = b_cdr;
                }
                (Sexpr::String(a), Sexpr::String(b)) => return a == b,
                (Sexpr::Vector(a), Sexpr::Vector(b)) => {
                    return a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_equal(y));
                }
                _ => return left.is_eqv(right),
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Delegate to Sexpr's Display implementation
        write!(f, "{}", self.kind)
    }
}

/// Walks the pairs of a list, leaving whatever terminated it in `remainder`.
pub struct ListIter {
    current: Node,
}

impl ListIter {
    /// `()` for a proper list, the dotted tail otherwise.
    pub fn remainder(&self) -> &Node {
        &self.current
    }
}

impl Iterator for ListIter {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let (car, cdr) = match self.current.kind.as_ref() {
            Sexpr::Pair(car, cdr) => (car.clone(), cdr.clone()),
            _ => return None,
        };
        self.current = cdr;
        Some(car)
    }
}

/// Represents a Scheme S-expression (Symbolic Expression).
/// This enum is the core data structure for both code (AST) and data.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Symbol(String),     // e.g., +, variable-name, quote
    Number(f64),        // Using f64 for simplicity
    Boolean(bool),      // #t or #f
    String(String),     // For string literals "hello\n"
    Pair(Node, Node),   // car and cdr; lists are chains of pairs ending in Nil
    Nil,                // Represents the empty list '()
    Vector(Vec<Node>),  // #(1 2 3)
    Procedure(Procedure),
    Unspecified,        // "okay": the value of forms with nothing useful to return
    Undefined,          // the value of `set!`; cannot itself be evaluated
}

// Detach the cdr chain iteratively so dropping a long list does not recurse
// once per pair. Cars still drop recursively.
impl Drop for Sexpr {
    fn drop(&mut self) {
        let Sexpr::Pair(_, cdr) = self else { return };
        let mut next = mem::replace(&mut cdr.kind, Rc::new(Sexpr::Nil));
        while let Ok(mut pair) = Rc::try_unwrap(next) {
            match &mut pair {
                Sexpr::Pair(_, cdr) => next = mem::replace(&mut cdr.kind, Rc::new(Sexpr::Nil)),
                _ => break,
            }
        }
    }
}

impl Sexpr {
    pub fn type_name(&self) -> &'static str {
        match self {
            Sexpr::Number(_) => "number",
            Sexpr::Symbol(_) => "symbol",
            Sexpr::Boolean(_) => "boolean",
            Sexpr::String(_) => "string",
            Sexpr::Pair(_, _) => "pair",
            Sexpr::Nil => "nil",
            Sexpr::Vector(_) => "vector",
            Sexpr::Procedure(_) => "procedure",
            Sexpr::Unspecified => "unspecified",
            Sexpr::Undefined => "undefined",
        }
    }
}

// Implement Display trait for printing Sexpr values the way the REPL shows them
impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexpr::Symbol(s) => write!(f, "{}", s),
            Sexpr::Number(n) => write!(f, "{}", n),
            Sexpr::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Sexpr::Pair(car, cdr) => {
                write!(f, "({}", car)?;
                let mut rest = cdr;
                loop {
                    match rest.kind.as_ref() {
                        Sexpr::Pair(next, tail) => {
                            write!(f, " {}", next)?;
                            rest = tail;
                        }
                        Sexpr::Nil => break,
                        other => {
                            write!(f, " . {}", other)?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Sexpr::Nil => write!(f, "()"),
            Sexpr::Vector(elements) => {
                write!(f, "#(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, ")")
            }
            Sexpr::String(str) => {
                write!(
                    f,
                    "\"{}\"",
                    str.chars().fold(String::new(), |mut acc, char| {
                        match char {
                            '"' => acc.push_str("\\\""),
                            '\\' => acc.push_str("\\\\"),
                            '\n' => acc.push_str("\\n"),
                            '\r' => acc.push_str("\\r"),
                            '\t' => acc.push_str("\\t"),
                            c => acc.push(c),
                        }
                        acc
                    })
                )
            }
            Sexpr::Procedure(procedure) => write!(f, "{}", procedure),
            Sexpr::Unspecified => write!(f, "okay"),
            Sexpr::Undefined => write!(f, "#<undefined>"),
        }
    }
}

/// How many arguments a primitive accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Arity {
            min: n,
            max: Some(n),
        }
    }

    pub const fn at_least(n: usize) -> Self {
        Arity { min: n, max: None }
    }

    pub const fn between(min: usize, max: usize) -> Self {
        Arity {
            min,
            max: Some(max),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "exactly {}", max),
            Some(max) => write!(f, "between {} and {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

pub type PrimitiveFunc = fn(Vec<Node>, Span) -> EvalResult;

/// A primitive that also receives the environment of its caller (`eval`, `apply`, `load`).
pub type EnvPrimitiveFunc = fn(Vec<Node>, Span, &Rc<RefCell<Environment>>) -> EvalResult;

#[derive(Clone, Copy)]
pub enum NativeFunc {
    Pure(PrimitiveFunc),
    WithEnv(EnvPrimitiveFunc),
}

pub struct Primitive {
    pub name: String,
    pub arity: Arity,
    pub func: NativeFunc,
}

impl Primitive {
    pub fn new(name: &str, arity: Arity, func: PrimitiveFunc) -> Self {
        Primitive {
            name: name.to_string(),
            arity,
            func: NativeFunc::Pure(func),
        }
    }

    pub fn with_env(name: &str, arity: Arity, func: EnvPrimitiveFunc) -> Self {
        Primitive {
            name: name.to_string(),
            arity,
            func: NativeFunc::WithEnv(func),
        }
    }
}

/// A procedure created by `lambda` or `(define (name ...) ...)`. Free variables
/// resolve in `env`, the frame the lambda was created in.
pub struct Lambda {
    pub formals: Node,
    pub body: Node,
    pub env: Rc<RefCell<Environment>>,
}

/// A procedure created by `mu`. It closes over nothing: free variables resolve
/// in whatever frame calls it.
pub struct Mu {
    pub formals: Node,
    pub body: Node,
}

#[derive(Clone)] // Need Clone for Sexpr::Procedure
pub enum Procedure {
    Primitive(Rc<Primitive>),
    Lambda(Rc<Lambda>),
    Mu(Rc<Mu>),
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(primitive) => write!(f, "#<primitive:{}>", primitive.name),
            Procedure::Lambda(lambda) => write!(f, "(lambda {} {})", lambda.formals, lambda.body),
            Procedure::Mu(mu) => write!(f, "(mu {} {})", mu.formals, mu.body),
        }
    }
}

// The captured environment is left out: it usually contains the procedure itself.
impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(primitive) => write!(f, "Primitive({})", primitive.name),
            Procedure::Lambda(lambda) => {
                write!(f, "Lambda({} {})", lambda.formals, lambda.body)
            }
            Procedure::Mu(mu) => write!(f, "Mu({} {})", mu.formals, mu.body),
        }
    }
}

// Primitives compare by name, user procedures by identity.
impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(p1), Procedure::Primitive(p2)) => p1.name == p2.name,
            (Procedure::Lambda(l1), Procedure::Lambda(l2)) => Rc::ptr_eq(l1, l2),
            (Procedure::Mu(m1), Procedure::Mu(m2)) => Rc::ptr_eq(m1, m2),
            _ => false,
        }
    }
}

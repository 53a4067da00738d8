use crate::primitives;
use crate::source::Span;
use crate::types::{Node, Sexpr};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

// --- Environment Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("unknown identifier: {0}")]
    UnboundIdentifier(String, Span), // Symbol name, span where lookup happened
    #[error("expected {expected} argument(s), got {got}")]
    ArityMismatch {
        expected: String,
        got: usize,
        span: Span,
    },
    #[error("{0} is not a variable")]
    NotAVariable(Sexpr, Span),
    #[error("formal parameter {0} appears more than once")]
    DuplicateFormal(String, Span),
}

impl EnvError {
    pub fn span(&self) -> Span {
        match self {
            EnvError::UnboundIdentifier(_, span)
            | EnvError::NotAVariable(_, span)
            | EnvError::DuplicateFormal(_, span) => *span,
            EnvError::ArityMismatch { span, .. } => *span,
        }
    }
}

// --- Environment Definition ---

pub struct Environment {
    // Rc<RefCell<...>> allows shared ownership and interior mutability.
    // Needed for closures capturing environments and for 'set!'.
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Node>, // Maps variable names to Nodes
}

impl Environment {
    /// Creates a new, top-level (global) environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: None,
            bindings: HashMap::new(),
        }))
    }

    /// The global frame every program starts in: `eval`, `apply` and `load`
    /// plus the primitive library.
    pub fn new_global_populated() -> Rc<RefCell<Environment>> {
        let env_ptr = Environment::new(); // Create empty global env
        primitives::install(&mut env_ptr.borrow_mut());
        env_ptr
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    /// Builds the frame for a procedure call: a child of `parent` binding
    /// `formals` to `values` positionally. A dotted (or bare symbol) tail
    /// collects the remaining values into a list.
    pub fn make_call_frame(
        parent: &Rc<RefCell<Environment>>,
        formals: &Node,
        values: &[Node],
        span: Span,
    ) -> Result<Rc<RefCell<Environment>>, EnvError> {
        let frame = Environment::new_enclosed(parent.clone());
        {
            let mut env = frame.borrow_mut();
            let mut formals_iter = formals.iter();
            let mut values_iter = values.iter();
            for formal in formals_iter.by_ref() {
                let name = formal_name(&formal)?;
                let Some(value) = values_iter.next() else {
                    return Err(arity_mismatch(formals, values.len(), span));
                };
                env.define(name.to_string(), value.clone());
            }
            match formals_iter.remainder().kind.as_ref() {
                Sexpr::Nil => {
                    if values_iter.next().is_some() {
                        return Err(arity_mismatch(formals, values.len(), span));
                    }
                }
                Sexpr::Symbol(rest) => {
                    let rest_values: Vec<Node> = values_iter.cloned().collect();
                    env.define(rest.clone(), Node::new_list(rest_values, span));
                }
                other => return Err(EnvError::NotAVariable(other.clone(), span)),
            }
        }
        Ok(frame)
    }

    /// Walks to the root of the chain.
    pub fn global_frame(env: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        let mut frame = env.clone();
        loop {
            let outer = frame.borrow().outer.clone();
            match outer {
                Some(outer) => frame = outer,
                None => return frame,
            }
        }
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Defines a variable in the *current* environment frame.
    /// Replaces the value if the variable already exists in this frame.
    pub fn define(&mut self, name: String, value_node: Node) {
        self.bindings.insert(name, value_node);
    }

    /// Looks up a variable's value.
    /// Checks the current environment first, then walks up the outer environment chain.
    /// `lookup_span` is the location where the variable was referenced, used for error reporting.
    pub fn get(&self, name: &str, lookup_span: Span) -> Result<Node, EnvError> {
        if let Some(value_node) = self.bindings.get(name) {
            return Ok(value_node.clone());
        }
        // Iterate rather than recurse: `mu` calls can build very long chains.
        let mut next = self.outer.clone();
        while let Some(frame) = next {
            let env = frame.borrow();
            if let Some(value_node) = env.bindings.get(name) {
                return Ok(value_node.clone());
            }
            next = env.outer.clone();
        }
        Err(EnvError::UnboundIdentifier(name.to_string(), lookup_span))
    }

    /// Sets the value of an *existing* variable in the environment chain.
    /// Searches outward from the current environment and updates the first frame
    /// where the variable is found. Errors if the variable is not defined.
    /// `set_span` is the location of the `set!` expression.
    pub fn set(&mut self, name: &str, value_node: Node, set_span: Span) -> Result<(), EnvError> {
        if let Some(value_mut) = self.bindings.get_mut(name) {
            *value_mut = value_node;
            return Ok(());
        }
        let mut next = self.outer.clone();
        while let Some(frame) = next {
            let mut env = frame.borrow_mut();
            if let Some(value_mut) = env.bindings.get_mut(name) {
                *value_mut = value_node;
                return Ok(());
            }
            next = env.outer.clone();
        }
        Err(EnvError::UnboundIdentifier(name.to_string(), set_span))
    }

    /// Gets a list of all identifiers visible from the current environment
    pub fn get_identifiers(&self) -> HashSet<String> {
        let mut identifiers: HashSet<String> = self.bindings.keys().cloned().collect();
        let mut next = self.outer.clone();
        while let Some(frame) = next {
            let env = frame.borrow();
            identifiers.extend(env.bindings.keys().cloned());
            next = env.outer.clone();
        }
        identifiers
    }
}

// Unlink the parent chain iteratively so dropping a deep chain of call frames
// does not recurse once per frame.
impl Drop for Environment {
    fn drop(&mut self) {
        let mut next = self.outer.take();
        while let Some(frame) = next {
            match Rc::try_unwrap(frame) {
                Ok(cell) => next = cell.into_inner().outer.take(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outer {
            None => write!(f, "<Global Frame>"),
            Some(outer) => {
                let mut bindings: Vec<String> = self
                    .bindings
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, value))
                    .collect();
                bindings.sort();
                write!(f, "<{{{}}} -> {:?}>", bindings.join(", "), outer.borrow())
            }
        }
    }
}

/// Checks that `formals` is a valid parameter list: a proper or dotted list of
/// distinct symbols, a bare symbol, or `()`.
pub fn check_formals(formals: &Node) -> Result<(), EnvError> {
    let mut names: Vec<&Node> = Vec::new();
    let mut rest = formals;
    while let Sexpr::Pair(formal, tail) = rest.kind.as_ref() {
        names.push(formal);
        rest = tail;
    }
    if !matches!(rest.kind.as_ref(), Sexpr::Nil) {
        names.push(rest);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for formal in names {
        let name = formal_name(formal)?;
        if !seen.insert(name) {
            return Err(EnvError::DuplicateFormal(name.to_string(), formal.span));
        }
    }
    Ok(())
}

fn formal_name(formal: &Node) -> Result<&str, EnvError> {
    formal
        .as_symbol()
        .ok_or_else(|| EnvError::NotAVariable(formal.kind.as_ref().clone(), formal.span))
}

fn arity_mismatch(formals: &Node, got: usize, span: Span) -> EnvError {
    let required = formals.iter().count();
    let expected = if formals.is_list() {
        required.to_string()
    } else {
        format!("at least {}", required)
    };
    EnvError::ArityMismatch {
        expected,
        got,
        span,
    }
}

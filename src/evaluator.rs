use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::Value;
use crate::builtinops::{Arity, OpKind, PrimitiveFn, find_special_form, get_builtin_ops};
use crate::stack::ensure_sufficient_stack;

/// One lexical scope: its own bindings plus the scope it is nested in
#[derive(Default)]
struct Scope {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

/// Environment for variable bindings
///
/// A cheap handle to a chain of scopes. Cloning the handle shares the scope,
/// which is how closures keep the scope they were created in alive after the
/// creating call returns.
#[derive(Clone, Default)]
pub struct Environment(Rc<Scope>);

impl Environment {
    /// Create an empty root scope
    pub fn new() -> Self {
        Environment::default()
    }

    /// Create an empty scope whose parent is `parent`
    pub fn child_of(parent: &Environment) -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::default(),
            parent: Some(parent.clone()),
        }))
    }

    /// Insert or overwrite a binding in this scope only; ancestors are never touched
    pub fn bind(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Resolve a name, walking outward from this scope to the root
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(value) = env.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            scope = env.0.parent.as_ref();
        }
        None
    }

    /// Whether both handles refer to the same scope
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Register a custom primitive procedure in this scope.
    ///
    /// # Example
    /// ```
    /// use gscheme::Error;
    /// use gscheme::ast::Value;
    /// use gscheme::builtinops::Arity;
    /// use gscheme::evaluator::create_global_env;
    ///
    /// fn negate(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::Number(-args[0].as_number("negate")?))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("negate", Arity::Exact(1), negate);
    /// // Now (negate 5) can be called from evaluated expressions
    /// ```
    pub fn register_builtin_function(&self, name: &str, arity: Arity, func: PrimitiveFn) {
        self.bind(
            name,
            Value::Primitive {
                name: name.into(),
                arity,
                func,
            },
        );
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = &self.0.parent {
            bindings.extend(parent.bindings());
        }

        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

// Scopes can hold closures that capture the same scope, so Debug lists names only
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("parent", &self.0.parent)
            .finish()
    }
}

/// Evaluate an expression (public API)
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate top-level forms in order, threading one environment.
///
/// Stops at the first error; forms after it are not evaluated.
pub fn eval_program(forms: &[Value], env: &Environment) -> Result<Vec<Value>, Error> {
    forms
        .iter()
        .map(|form| {
            debug!(%form, "evaluating top-level form");
            eval(form, env)
        })
        .collect()
}

/// Evaluate an expression, tracking call depth to reject runaway recursion
///
/// `depth` is the number of closure calls currently active; it only grows in
/// `apply`. The native stack is grown on demand, so the depth limit rather
/// than the thread's stack size bounds recursion.
pub(crate) fn eval_with_depth_tracking(
    expr: &Value,
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::DepthExceeded {
            limit: MAX_EVAL_DEPTH,
        });
    }
    trace!(depth, %expr, "eval");

    ensure_sufficient_stack(|| eval_expr(expr, env, depth))
}

fn eval_expr(expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    match expr {
        // Self-evaluating forms
        Value::Number(_)
        | Value::Str(_)
        | Value::Bool(_)
        | Value::Nil
        | Value::Closure { .. }
        | Value::Primitive { .. } => Ok(expr.clone()),

        // Variable lookup
        Value::Symbol(name) => env
            .lookup(name)
            .ok_or_else(|| Error::UndefinedSymbol(name.clone())),

        // Special form or procedure application
        Value::List(elements) => {
            eval_list(elements, env, depth).map_err(|err| add_context(err, expr))
        }
    }
}

const EXPR_CONTEXT: &str = "\n  while evaluating: ";
const LAMBDA_CONTEXT: &str = "\n  In lambda: ";

/// Rewrite the message of the error kinds that carry expression context
fn map_context_message(error: Error, f: impl FnOnce(String) -> String) -> Error {
    match error {
        Error::Type(msg) => Error::Type(f(msg)),
        Error::Arithmetic(msg) => Error::Arithmetic(f(msg)),
        Error::MalformedForm(msg) => Error::MalformedForm(f(msg)),
        // Other kinds already name the offending symbol or form
        other => other,
    }
}

/// Helper function to add expression context to errors
///
/// Only the innermost failing expression is recorded; enclosing
/// expressions leave the message alone.
fn add_context(error: Error, expr: &Value) -> Error {
    map_context_message(error, |msg| {
        if msg.contains(EXPR_CONTEXT) || msg.contains(LAMBDA_CONTEXT) {
            msg
        } else {
            format!("{msg}{EXPR_CONTEXT}{}", expr.to_source())
        }
    })
}

/// Name the body of the innermost closure an error was raised in
///
/// When the failing expression is the body itself, the lambda line replaces
/// the expression line instead of repeating it.
fn add_lambda_context(error: Error, body: &Value) -> Error {
    map_context_message(error, |mut msg| {
        if msg.contains(LAMBDA_CONTEXT) {
            return msg;
        }
        let body = body.to_source();
        let same_expr = format!("{EXPR_CONTEXT}{body}");
        if msg.ends_with(&same_expr) {
            msg.truncate(msg.len() - same_expr.len());
        }
        format!("{msg}{LAMBDA_CONTEXT}{body}")
    })
}

/// Helper function to evaluate argument expressions left to right
fn eval_args(args: &[Value], env: &Environment, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth))
        .collect()
}

/// Evaluate a list expression: special form dispatch, then application
fn eval_list(elements: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let [operator, arg_exprs @ ..] = elements else {
        return Err(Error::MalformedForm(
            "cannot evaluate empty list ()".to_owned(),
        ));
    };

    // Special forms get their arguments unevaluated and cannot be shadowed
    if let Value::Symbol(name) = operator
        && let Some((op, special_form)) = find_special_form(name)
    {
        op.validate_arity(arg_exprs.len())?;
        return special_form(arg_exprs, env, depth);
    }

    // An operator symbol must name a procedure; other operator expressions are evaluated
    let procedure = match operator {
        Value::Symbol(name) => env
            .lookup(name)
            .ok_or_else(|| Error::UndefinedProcedure(name.clone()))?,
        other => eval_with_depth_tracking(other, env, depth)?,
    };

    let args = eval_args(arg_exprs, env, depth)?;
    apply(&procedure, args, depth)
}

/// Apply a procedure value to already-evaluated arguments
fn apply(procedure: &Value, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    match procedure {
        Value::Primitive { name, arity, func } => {
            arity.validate(args.len()).map_err(|_| {
                Error::arity_error_with_expr(*arity, args.len(), name.to_string())
            })?;
            func(&args)
        }
        Value::Closure {
            params,
            body,
            env: closure_env,
        } => {
            if params.len() != args.len() {
                return Err(Error::arity_error_with_expr(
                    Arity::Exact(params.len()),
                    args.len(),
                    procedure.to_string(),
                ));
            }

            // New scope parented at the closure's environment, never the caller's
            let call_env = Environment::child_of(closure_env);
            for (param, arg) in params.iter().zip(args) {
                trace!(%param, %arg, "bind parameter");
                call_env.bind(param.as_str(), arg);
            }

            eval_with_depth_tracking(body, &call_env, depth + 1)
                .map_err(|err| add_lambda_context(err, body))
        }
        other => Err(Error::NotAProcedure(format!(
            "{} is a {}, not a procedure",
            other.to_source(),
            other.type_name()
        ))),
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(args: &[Value], _env: &Environment, _depth: usize) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}

/// Evaluate define special form
pub(crate) fn eval_define(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth)?;
            trace!(%name, %value, "define");
            env.bind(name.as_str(), value);
            Ok(Value::Nil)
        }
        [target, _] => Err(Error::Type(format!(
            "define requires a symbol, got {} {}",
            target.type_name(),
            target.to_source()
        ))),
        _ => Err(Error::arity_error(Arity::Exact(2), args.len())),
    }
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(args: &[Value], env: &Environment, _depth: usize) -> Result<Value, Error> {
    match args {
        [param_list @ (Value::List(_) | Value::Nil), body] => {
            let mut params: Vec<String> = Vec::new();
            for param in param_list.as_list().unwrap_or_default() {
                match param {
                    Value::Symbol(name) => {
                        if params.contains(name) {
                            return Err(Error::MalformedForm(format!(
                                "duplicate parameter name: {name}"
                            )));
                        }
                        params.push(name.clone());
                    }
                    other => {
                        return Err(Error::Type(format!(
                            "lambda parameters must be symbols, got {} {}",
                            other.type_name(),
                            other.to_source()
                        )));
                    }
                }
            }

            Ok(Value::Closure {
                params: params.into(),
                body: Rc::new(body.clone()),
                env: env.clone(),
            })
        }
        [_, _] => Err(Error::Type("lambda parameters must be a list".to_owned())),
        _ => Err(Error::arity_error(Arity::Exact(2), args.len())),
    }
}

/// Evaluate cond special form
///
/// Each clause is `(test expr)`. The first clause whose test is the symbol
/// `else` or evaluates to `#t` has its expression evaluated; any other test
/// value moves on to the next clause. No match yields `Nil`.
pub(crate) fn eval_cond(clauses: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    // Check every clause's shape up front so a malformed clause is reported
    // even when an earlier clause matches
    let mut checked = Vec::with_capacity(clauses.len());
    for clause in clauses {
        match clause.as_list() {
            Some([test, expr]) => checked.push((test, expr)),
            _ => {
                return Err(Error::MalformedForm(format!(
                    "cond clause must be a list of two elements, got {}",
                    clause.to_source()
                )));
            }
        }
    }

    for (test, expr) in checked {
        let matched = match test {
            Value::Symbol(name) if name == "else" => true,
            _ => matches!(
                eval_with_depth_tracking(test, env, depth)?,
                Value::Bool(true)
            ),
        };
        if matched {
            return eval_with_depth_tracking(expr, env, depth);
        }
    }

    Ok(Value::Nil)
}

/// Create a global environment with the primitive procedures bound
pub fn create_global_env() -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = builtin_op.op_kind {
            env.bind(
                builtin_op.name,
                Value::Primitive {
                    name: builtin_op.name.into(),
                    arity: builtin_op.arity,
                    func,
                },
            );
        }
    }

    env
}

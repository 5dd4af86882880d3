use crate::Error;
use crate::ast::{Lambda, Symbol, Value};
use crate::builtinops::get_builtin_ops;
use crate::context::EvalContext;
use intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub mod intooperation;
pub(crate) mod macros;
pub(crate) mod special_forms;

pub use intooperation::{NumIter, StringIter, ValueIter};
pub use special_forms::SpecialForm;

/// Shared handle to an environment. Closures keep their defining environment
/// alive through this handle, and child scopes share (never copy) their parent.
pub type Env = Rc<Environment>;

/// Expected number of arguments for a function, macro or special form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive lower and upper bound
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(self, got: usize) -> bool {
        match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        }
    }

    /// Check an argument count. The resulting error has no callee name yet; callers
    /// attach one with `Error::with_callee`.
    pub fn validate(self, got: usize) -> Result<(), Error> {
        if self.accepts(got) {
            Ok(())
        } else {
            Err(Error::arity_error(String::new(), self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// A lexical scope: local bindings plus an optional parent.
///
/// Bindings use interior mutability so that a scope can be extended while closures
/// created in it already hold a reference to it (this is what lets a function
/// defined with `def` call itself).
#[derive(Default)]
pub struct Environment {
    bindings: RefCell<HashMap<Symbol, Value>>,
    parent: Option<Env>,
}

impl Environment {
    /// Create an empty scope. A scope without a parent is a root.
    pub fn new(parent: Option<Env>) -> Env {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            parent,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Look `sym` up in this scope, then in each ancestor.
    pub fn lookup(&self, sym: Symbol) -> Option<Value> {
        if let Some(value) = self.bindings.borrow().get(&sym) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(sym))
    }

    pub fn get(&self, sym: Symbol) -> Result<Value, Error> {
        self.lookup(sym)
            .ok_or_else(|| Error::UndefinedSymbol(sym.name().to_owned()))
    }

    /// Bind or rebind `sym` in this scope only. Ancestors are never touched, so a
    /// binding here shadows any binding of the same name further up.
    pub fn set(&self, sym: Symbol, value: Value) {
        self.bindings.borrow_mut().insert(sym, value);
    }

    /// Bind `sym` in the root ancestor of this scope.
    pub fn define(&self, sym: Symbol, value: Value) {
        match &self.parent {
            Some(parent) => parent.define(sym, value),
            None => self.set(sym, value),
        }
    }

    /// Register a custom builtin function working directly on argument slices.
    ///
    /// This is the low-level API. It is wired through the same machinery as
    /// [`Environment::register_builtin_operation`]; for most new code, prefer the
    /// typed API instead of manipulating `Value` directly.
    ///
    /// # Example
    /// ```
    /// use kernlisp::evaluator::create_global_env;
    /// use kernlisp::{Error, Value};
    ///
    /// fn arg_count(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(args.len()))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("arg-count", arg_count);
    /// // Now (arg-count 1 2 3) evaluates to 3
    /// ```
    pub fn register_builtin_function(&self, name: &str, func: fn(&[Value]) -> Result<Value, Error>) {
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| func(&args));
        self.bind_builtin(name, wrapped);
    }

    /// Register a strongly-typed Rust function as a builtin, with automatic
    /// argument extraction and result conversion.
    ///
    /// ```rust,ignore
    /// fn hypot(a: f64, b: f64) -> f64 { (a * a + b * b).sqrt() }
    /// env.register_builtin_operation::<_, (f64, f64)>("hypot", hypot);
    /// ```
    ///
    /// Supported parameter types:
    /// - `f64` (number), `bool`, `Symbol`
    /// - `Vector`, `Map`, `Set` (the persistent collections, by value)
    /// - `&str` (borrowed string slices)
    /// - `Value` (owned access to the raw value)
    /// - `ValueIter<'_>`, `NumIter<'_>`, `StringIter<'_>` (elements of a list or
    ///   vector argument)
    ///
    /// Supported return types are any `R: Into<Value>` and `Result<R, Error>`.
    ///
    /// Arity is enforced from the Rust signature. Conversion failures are
    /// `TypeMismatch` errors.
    pub fn register_builtin_operation<F, Args>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args> + 'static,
    {
        self.bind_builtin(name, func.into_operation());
    }

    /// Register a variadic builtin whose last Rust parameter is a rest iterator
    /// (`ValueIter`, `NumIter` or `StringIter`), optionally after a fixed prefix.
    ///
    /// The given [`Arity`] is checked against the total argument count at call time,
    /// since the bounds of a variadic operation are not always derivable from its
    /// signature.
    pub fn register_variadic_builtin_operation<F, Args>(&self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args> + 'static,
    {
        let inner = func.into_variadic_operation();
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| {
            arity.validate(args.len())?;
            inner(args)
        });
        self.bind_builtin(name, wrapped);
    }

    fn bind_builtin(&self, name: &str, func: Arc<OperationFn>) {
        self.define(
            Symbol::intern(name),
            Value::BuiltinFunction {
                id: name.to_owned(),
                func,
            },
        );
    }

    /// All bindings visible from this scope, sorted by name. Local bindings
    /// override those of ancestors.
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        if let Some(parent) = &self.parent {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (sym, value) in self.bindings.borrow().iter() {
            bindings.insert(sym.name().to_owned(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .bindings
            .borrow()
            .keys()
            .map(|sym| sym.name().to_owned())
            .collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("parent", &self.parent)
            .finish()
    }
}

/// Remaining native stack below which evaluation continues on a new segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each segment added when the red zone is reached
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Evaluate an expression with a fresh evaluation context.
pub fn eval(expr: &Value, env: &Env) -> Result<Value, Error> {
    let mut ctx = EvalContext::new();
    eval_with_context(expr, env, &mut ctx)
}

/// Evaluate an expression, threading `ctx` through every nested evaluation.
///
/// Errors leave this function in their structured [`Error::Diagnostic`] form,
/// carrying the frame stack as it was where the error was raised. The native
/// stack is extended on demand, so only the context's depth limit bounds
/// recursion, whatever thread the caller is on.
pub fn eval_with_context(expr: &Value, env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    ctx.enter().map_err(|e| ctx.wrap_error(e))?;
    let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
        eval_expr(expr, env, ctx)
    })
    .map_err(|e| ctx.wrap_error(e));
    ctx.leave();
    result
}

fn eval_expr(expr: &Value, env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    match expr {
        Value::Symbol(sym) => env.get(*sym),

        // Vector literals evaluate their elements
        Value::Vector(items) => Ok(Value::Vector(
            items
                .iter()
                .map(|item| eval_with_context(item, env, ctx))
                .collect::<Result<_, _>>()?,
        )),

        // The empty list evaluates to itself
        Value::List(list) if list.is_empty() => Ok(expr.clone()),

        Value::List(list) => {
            let elements: Vec<&Value> = list.iter().collect();
            ctx.with_frame(expr, |ctx| eval_list(&elements, env, ctx))
        }

        Value::Number(_)
        | Value::String(_)
        | Value::Bool(_)
        | Value::Nil
        | Value::HashMap(_)
        | Value::Set(_)
        | Value::Defined
        | Value::Function(_)
        | Value::Macro(_)
        | Value::BuiltinFunction { .. } => Ok(expr.clone()),
    }
}

fn eval_list(elements: &[&Value], env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    if let [Value::Symbol(head), args @ ..] = elements
        && let Some(form) = SpecialForm::lookup(*head)
    {
        return form.eval(args, env, ctx);
    }
    apply(elements, env, ctx)
}

/// Apply the head of a non-special-form list to the rest of it.
///
/// Macros receive the remaining elements unevaluated; functions receive them
/// evaluated left to right in `env`.
pub fn apply(elements: &[&Value], env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    let Some((head, arg_exprs)) = elements.split_first() else {
        return Ok(Value::list(Vec::new()));
    };

    let callee = eval_with_context(head, env, ctx)?;
    match &callee {
        Value::Macro(mac) => macros::call_macro(mac, arg_exprs, env, ctx),
        Value::Function(_) | Value::BuiltinFunction { .. } => {
            let args = eval_args(arg_exprs, env, ctx)?;
            call_function(&callee, args, ctx)
        }
        other => Err(Error::NotAFunction(other.summary())),
    }
}

fn eval_args(args: &[&Value], env: &Env, ctx: &mut EvalContext) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_context(arg, env, ctx))
        .collect()
}

/// Invoke a user function or builtin with already evaluated arguments.
pub fn call_function(callee: &Value, args: Vec<Value>, ctx: &mut EvalContext) -> Result<Value, Error> {
    match callee {
        Value::Function(lambda) => {
            let call_env = bind_params(lambda, args, "fn")?;
            eval_with_context(&lambda.body, &call_env, ctx)
        }
        Value::BuiltinFunction { id, func } => func(args).map_err(|e| e.with_callee(id)),
        other => Err(Error::NotAFunction(other.summary())),
    }
}

/// Create the call scope for `lambda`: a child of the captured environment (not the
/// caller's) with each parameter bound positionally.
pub(crate) fn bind_params(lambda: &Lambda, args: Vec<Value>, kind: &str) -> Result<Env, Error> {
    lambda
        .arity()
        .validate(args.len())
        .map_err(|e| e.with_callee(&lambda.display_name(kind)))?;

    let call_env = Environment::new(Some(Rc::clone(&lambda.env)));
    let mut args = args.into_iter();
    for (param, arg) in lambda.params.iter().zip(args.by_ref()) {
        call_env.set(*param, arg);
    }
    if let Some(rest) = lambda.rest {
        call_env.set(rest, Value::list(args.collect()));
    }
    Ok(call_env)
}

/// Create a root environment with every builtin from the registry bound in it.
pub fn create_global_env() -> Env {
    let env = Environment::new(None);
    for builtin_op in get_builtin_ops() {
        env.define(Symbol::intern(builtin_op.id), builtin_op.to_value());
    }
    env
}

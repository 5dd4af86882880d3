//! kernlisp - a small self-hosting Lisp kernel
//!
//! This crate provides a tree-walking evaluator over a persistent data model. The
//! kernel itself only knows a handful of special forms; everything else (control
//! macros, collection helpers) is meant to be written in the language on top of it,
//! using closures and a non-hygienic macro system built on quasiquote/unquote.
//!
//! ```lisp
//! (def make-adder (fn [x] (fn [y] (+ x y))))
//! ((make-adder 5) 3)                        ; => 8
//!
//! (defmacro unless [test & body]
//!   `(if ~test nil ~(cons 'do body)))
//! (unless false "ran")                      ; => "ran"
//!
//! `(1 ~(+ 2 3) 4)                           ; => (1 5 4)
//! ```
//!
//! ## Evaluation model
//!
//! - Only `nil` and `false` are falsy; zero and the empty string are truthy
//! - Closures share (never copy) their defining environment
//! - Macros receive their arguments unevaluated; the expansion is then evaluated
//!   in the caller's environment
//! - Every collection operation returns a new value, the original is never changed
//! - Errors carry the evaluation stack, the source position and the expression text
//!   of the failing top-level form
//!
//! ## Modules
//!
//! - `ast`: the runtime value model and interned symbols
//! - `collections`: persistent list, vector, map and set
//! - `evaluator`: environments, `eval`/`apply`, special forms, macros and quasiquote
//! - `context`: evaluation context, source positions and structured diagnostics
//! - `builtinops`: native builtin functions bound into the root environment
//! - `reader`: S-expression reader producing values with positions
//! - `loader`: loading and evaluating source files
//! - `interpreter`: a convenience facade bundling a root environment with a config

use std::fmt;

use crate::context::{Diagnostic, Position};
use crate::evaluator::Arity;

/// Maximum reader nesting depth, guards the recursive-descent reader against
/// pathological input.
pub const MAX_PARSE_DEPTH: usize = 128;

/// Default maximum evaluation depth. Each nested `eval` counts once, so a
/// recursive user function typically uses three or four levels per call.
pub const MAX_EVAL_DEPTH: usize = 2000;

/// Categorizes the different kinds of reader errors.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (unterminated string, unclosed brackets)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete expression where exactly one was expected
    TrailingContent,
    /// No expression found at all
    Empty,
}

/// A structured error describing a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
    /// Where in the source the error was detected
    pub position: Option<Position>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
            position: None,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let error_char = input[..error_offset.min(input.len())].chars().count();
        let context_start = error_char.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        let found = input[error_offset.min(input.len())..]
            .chars()
            .next()
            .map(|c| c.to_string());

        Self::new(kind, message, Some(display_context), found)
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// True when more input could complete the expression.
    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ParseError: {}", self.message)?;
        if let Some(position) = &self.position {
            write!(f, " at {position}")?;
        }
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    ParseError(ParseError),
    #[error("UndefinedSymbol: {0}")]
    UndefinedSymbol(String),
    #[error("ArityMismatch: {} expected {expected} argument(s), got {got}", callee_or_default(.callee))]
    ArityMismatch {
        callee: String,
        expected: Arity,
        got: usize,
    },
    #[error("TypeMismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("NotAFunction: {0} cannot be applied")]
    NotAFunction(String),
    #[error("NotAMacro: {0} is not a macro")]
    NotAMacro(String),
    #[error("UnquoteOutsideQuasiquote: unquote (~) is only valid inside a quasiquote (`)")]
    UnquoteOutsideQuasiquote,
    #[error("Evaluation depth limit exceeded (max: {limit})")]
    DepthLimitExceeded { limit: usize },
    #[error("Cannot load {path}: {message}")]
    Io { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("{0}")]
    Diagnostic(Box<Diagnostic>),
}

fn callee_or_default(callee: &str) -> &str {
    if callee.is_empty() { "function" } else { callee }
}

impl Error {
    /// Create an ArityMismatch for a named callee
    pub fn arity_error(callee: impl Into<String>, expected: Arity, got: usize) -> Self {
        Error::ArityMismatch {
            callee: callee.into(),
            expected,
            got,
        }
    }

    /// Create a TypeMismatch describing the offending value
    pub fn type_mismatch(expected: impl Into<String>, found: &ast::Value) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: format!("{} {}", found.type_name(), found.summary()),
        }
    }

    /// The underlying error kind, looking through any diagnostic wrapper.
    pub fn root(&self) -> &Error {
        match self {
            Error::Diagnostic(diagnostic) => diagnostic.error.root(),
            other => other,
        }
    }

    /// The structured diagnostic, if this error has been wrapped.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Error::Diagnostic(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }

    /// Fill in the callee name of an anonymous arity error.
    pub(crate) fn with_callee(self, name: &str) -> Self {
        match self {
            Error::ArityMismatch {
                callee,
                expected,
                got,
            } if callee.is_empty() => Error::ArityMismatch {
                callee: name.to_owned(),
                expected,
                got,
            },
            other => other,
        }
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::ParseError(error)
    }
}

pub mod ast;
pub mod builtinops;
pub mod collections;
pub mod config;
pub mod context;
pub mod evaluator;
pub mod interpreter;
pub mod loader;
pub mod reader;

pub use ast::{Symbol, Value};
pub use config::Config;
pub use context::EvalContext;
pub use evaluator::{Env, Environment, create_global_env, eval, eval_with_context};
pub use interpreter::Interpreter;

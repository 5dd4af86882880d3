//! Evaluation context threaded through `eval`, `apply` and the special forms.
//!
//! The context records a stack of human-readable frames, the current source
//! position and the literal text of the top-level form being evaluated. When an
//! error escapes an evaluation it is promoted once into a [`Diagnostic`] carrying a
//! snapshot of that state.

use std::fmt::{self, Write};

use crate::ast::Value;
use crate::{Error, MAX_EVAL_DEPTH};

/// Longest frame description kept on the stack
const MAX_FRAME_LEN: usize = 80;

/// A location in source text. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Position {
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(file: Option<&str>, line: usize, column: usize) -> Self {
        Position {
            file: file.map(str::to_owned),
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file.as_deref().unwrap_or("<input>");
        write!(f, "{file}:{}:{}", self.line, self.column)
    }
}

/// An error together with the evaluation state at the moment it was raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub error: Error,
    /// Frame descriptions, outermost first
    pub stack: Vec<String>,
    pub position: Option<Position>,
    /// Source text of the top-level form being evaluated
    pub expression: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(position) = &self.position {
            write!(f, "\n  at {position}")?;
        }
        if let Some(expression) = &self.expression {
            write!(f, "\n  in {expression}")?;
        }
        if !self.stack.is_empty() {
            write!(f, "\nStack trace (most recent call first):")?;
            for frame in self.stack.iter().rev() {
                write!(f, "\n  {frame}")?;
            }
        }
        Ok(())
    }
}

/// Mutable per-evaluation state: frame stack, location, and depth accounting.
#[derive(Debug, Clone)]
pub struct EvalContext {
    frames: Vec<String>,
    position: Option<Position>,
    expression: Option<String>,
    depth: usize,
    max_depth: usize,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalContext {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_EVAL_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        EvalContext {
            frames: Vec::new(),
            position: None,
            expression: None,
            depth: 0,
            max_depth,
        }
    }

    pub fn push_frame(&mut self, description: impl Into<String>) {
        self.frames.push(description.into());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// Run `f` with a frame describing `expr` on the stack. An error leaving `f` is
    /// wrapped while the frame is still present, and the frame is popped either way.
    pub fn with_frame<T>(
        &mut self,
        expr: &Value,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.push_frame(describe(expr));
        let result = f(self).map_err(|e| self.wrap_error(e));
        self.pop_frame();
        result
    }

    /// Count one level of nested evaluation, failing past the configured maximum.
    pub(crate) fn enter(&mut self) -> Result<(), Error> {
        if self.depth >= self.max_depth {
            return Err(Error::DepthLimitExceeded {
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = Some(position);
    }

    pub fn set_expression(&mut self, text: impl Into<String>) {
        self.expression = Some(text.into());
    }

    /// Set position and source text together, as done once per top-level form.
    pub fn set_location(&mut self, position: Position, text: impl Into<String>) {
        self.set_position(position);
        self.set_expression(text);
    }

    /// The current position and expression, to be restored after a nested load.
    pub(crate) fn save_location(&self) -> (Option<Position>, Option<String>) {
        (self.position.clone(), self.expression.clone())
    }

    pub(crate) fn restore_location(&mut self, saved: (Option<Position>, Option<String>)) {
        (self.position, self.expression) = saved;
    }

    /// The file of the form currently being evaluated, if it came from a file.
    pub fn current_file(&self) -> Option<&str> {
        self.position.as_ref().and_then(|p| p.file.as_deref())
    }

    /// A structured error for `message`, snapshotting the current frames and location.
    pub fn create_error(&self, message: impl Into<String>) -> Error {
        self.snapshot(Error::EvalError(message.into()))
    }

    /// Promote `error` into a diagnostic. Already structured errors pass through
    /// unchanged.
    pub fn wrap_error(&self, error: Error) -> Error {
        match error {
            Error::Diagnostic(_) => error,
            other => self.snapshot(other),
        }
    }

    fn snapshot(&self, error: Error) -> Error {
        Error::Diagnostic(Box::new(Diagnostic {
            error,
            stack: self.frames.clone(),
            position: self.position.clone(),
            expression: self.expression.clone(),
        }))
    }
}

/// Keeps the first `limit` characters written to it, then fails the write so
/// that formatting stops early.
struct BoundedText {
    text: String,
    chars: usize,
    limit: usize,
    truncated: bool,
}

impl BoundedText {
    fn new(limit: usize) -> Self {
        BoundedText {
            text: String::new(),
            chars: 0,
            limit,
            truncated: false,
        }
    }
}

impl Write for BoundedText {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.chars == self.limit {
                self.truncated = true;
                return Err(fmt::Error);
            }
            self.text.push(ch);
            self.chars += 1;
        }
        Ok(())
    }
}

fn describe(expr: &Value) -> String {
    let mut out = BoundedText::new(MAX_FRAME_LEN);
    // Fails only once the limit is hit
    let _ = write!(out, "{expr}");
    if out.truncated {
        out.text.push_str("...");
    }
    out.text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    #[test]
    fn test_create_error_snapshots_frames() {
        let mut ctx = EvalContext::new();
        ctx.set_location(Position::new(Some("a.lisp"), 3, 7), "(boom)");
        ctx.push_frame("(outer)");
        ctx.push_frame("(inner)");

        let error = ctx.create_error("boom");

        ctx.pop_frame();
        ctx.push_frame("(later)");

        let diagnostic = error.diagnostic().cloned();
        let Some(diagnostic) = diagnostic else {
            panic!("expected a diagnostic, got {error:?}");
        };
        assert_eq!(diagnostic.stack, vec!["(outer)", "(inner)"]);
        assert_eq!(diagnostic.position, Some(Position::new(Some("a.lisp"), 3, 7)));
        assert_eq!(diagnostic.expression.as_deref(), Some("(boom)"));
        assert_eq!(diagnostic.error, Error::EvalError("boom".into()));
    }

    #[test]
    fn test_wrap_error_is_idempotent() {
        let mut ctx = EvalContext::new();
        ctx.push_frame("(f 1)");
        let once = ctx.wrap_error(Error::UndefinedSymbol("y".into()));
        ctx.push_frame("(g)");
        let twice = ctx.wrap_error(once.clone());

        assert_eq!(once, twice);
        assert_eq!(twice.root(), &Error::UndefinedSymbol("y".into()));
        assert_eq!(twice.diagnostic().map(|d| d.stack.len()), Some(1));
    }

    #[test]
    fn test_with_frame_is_symmetric_on_error() {
        let mut ctx = EvalContext::new();
        let expr = Value::list(vec![sym("f"), val(1)]);

        let result: Result<(), Error> =
            ctx.with_frame(&expr, |_| Err(Error::NotAFunction("1".into())));

        assert!(ctx.frames().is_empty());
        let Err(error) = result else {
            panic!("expected an error");
        };
        assert_eq!(error.diagnostic().map(|d| d.stack.clone()), Some(vec!["(f 1)".to_owned()]));
    }

    #[test]
    fn test_depth_limit() {
        let mut ctx = EvalContext::with_max_depth(2);
        assert!(ctx.enter().is_ok());
        assert!(ctx.enter().is_ok());
        assert_eq!(ctx.enter(), Err(Error::DepthLimitExceeded { limit: 2 }));
        ctx.leave();
        assert!(ctx.enter().is_ok());
    }

    #[test]
    fn test_diagnostic_display() {
        let mut ctx = EvalContext::new();
        ctx.set_location(Position::new(None, 1, 1), "(f)");
        ctx.push_frame("(f)");
        ctx.push_frame("(g)");
        let text = ctx.wrap_error(Error::UndefinedSymbol("g".into())).to_string();

        assert_eq!(
            text,
            "UndefinedSymbol: g\n  at <input>:1:1\n  in (f)\n\
             Stack trace (most recent call first):\n  (g)\n  (f)"
        );
    }

    #[test]
    fn test_long_frames_are_truncated() {
        let long = Value::list((0..100).map(val).collect());
        let described = describe(&long);
        assert!(described.ends_with("..."));
        assert_eq!(described.chars().count(), MAX_FRAME_LEN + 3);

        let exact = val("x".repeat(MAX_FRAME_LEN - 2));
        assert_eq!(describe(&exact).chars().count(), MAX_FRAME_LEN);
        assert!(!describe(&exact).ends_with("..."));
    }

    #[test]
    fn test_bounded_text_stops_accepting_input() {
        let mut out = BoundedText::new(4);
        assert!(out.write_str("ab").is_ok());
        assert!(out.write_str("cdef").is_err());
        assert!(out.write_str("g").is_err());
        assert_eq!(out.text, "abcd");
        assert!(out.truncated);

        // Huge values are cut off after the first few elements
        let huge = Value::list((0..200_000).map(val).collect());
        let described = describe(&huge);
        assert!(described.starts_with("(0 1 2 3"));
        assert_eq!(described.chars().count(), MAX_FRAME_LEN + 3);
    }
}

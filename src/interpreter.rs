//! A root environment bundled with its configuration.

use std::path::Path;

use tracing::{debug, warn};

use crate::ast::Value;
use crate::config::Config;
use crate::context::EvalContext;
use crate::evaluator::{Env, create_global_env};
use crate::{Error, loader};

/// Source of the bootstrap library shipped with the crate
pub const CORE_LIBRARY: &str = include_str!("../lisp/core.lisp");

pub struct Interpreter {
    env: Env,
    config: Config,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// An interpreter over a fresh root environment holding only the builtins.
    pub fn new() -> Self {
        Interpreter {
            env: create_global_env(),
            config: Config::default(),
        }
    }

    /// Create an interpreter, load the core library if enabled, then the configured
    /// prelude files in order. Missing prelude files are skipped with a warning; any
    /// other failure aborts.
    pub fn with_config(config: Config) -> Result<Self, Error> {
        let interpreter = Interpreter {
            env: create_global_env(),
            config,
        };

        if interpreter.config.core_library {
            interpreter.load_core_library()?;
        }

        for prelude in &interpreter.config.prelude {
            if !prelude.exists() {
                warn!(path = %prelude.display(), "prelude file not found, skipping");
                continue;
            }
            debug!(path = %prelude.display(), "loading prelude");
            interpreter.load_file(prelude)?;
        }
        Ok(interpreter)
    }

    /// Evaluate the bundled bootstrap library (`defn`, `when`, `map`, ...) into the
    /// root environment.
    pub fn load_core_library(&self) -> Result<(), Error> {
        debug!("loading core library");
        let mut ctx = self.context();
        loader::eval_source(CORE_LIBRARY, Some("core.lisp"), &self.env, &mut ctx)?;
        Ok(())
    }

    /// Evaluate every form in `source`, returning the last value.
    pub fn eval_str(&self, source: &str) -> Result<Value, Error> {
        let mut ctx = self.context();
        loader::eval_source(source, None, &self.env, &mut ctx)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value, Error> {
        let path = path.as_ref();
        let mut ctx = self.context();
        let filename = path.to_str().ok_or_else(|| Error::Io {
            path: path.display().to_string(),
            message: "path is not valid UTF-8".to_owned(),
        })?;
        loader::load_file_with_context(filename, &self.env, &mut ctx)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn context(&self) -> EvalContext {
        EvalContext::with_max_depth(self.config.max_eval_depth)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::MAX_EVAL_DEPTH;
    use crate::ast::val;
    use std::path::PathBuf;

    #[test]
    fn test_eval_str_shares_environment_between_calls() {
        let interp = Interpreter::new();
        assert_eq!(interp.eval_str("(def x 40)").unwrap(), Value::Defined);
        assert_eq!(interp.eval_str("(+ x 2)").unwrap(), val(42));
        assert_eq!(interp.eval_str("(def y 1) (def z 2) (+ y z)").unwrap(), val(3));
    }

    #[test]
    fn test_failed_form_does_not_poison_session() {
        let interp = Interpreter::new();
        interp.eval_str("(def counter 1)").unwrap();

        let err = interp.eval_str("(def counter (+ counter undefined-thing))").unwrap_err();
        assert_eq!(err.root(), &Error::UndefinedSymbol("undefined-thing".to_owned()));

        assert_eq!(interp.eval_str("counter").unwrap(), val(1));
        assert_eq!(interp.eval_str("(+ counter 1)").unwrap(), val(2));
    }

    #[test]
    fn test_configured_depth_limit() {
        let config = Config {
            max_eval_depth: 100,
            core_library: false,
            ..Config::default()
        };
        let interp = Interpreter::with_config(config).unwrap();
        interp.eval_str("(def forever (fn [n] (forever (+ n 1))))").unwrap();

        let err = interp.eval_str("(forever 0)").unwrap_err();
        assert_eq!(err.root(), &Error::DepthLimitExceeded { limit: 100 });

        // The context is per call, so evaluation works again afterwards
        assert_eq!(interp.eval_str("(+ 1 1)").unwrap(), val(2));
    }

    const COUNT_DOWN: &str = "(def spin (fn [n] (if (= n 0) 0 (+ 1 (spin (- n 1))))))";

    #[test]
    fn test_default_depth_limit_is_recoverable() {
        let interp = Interpreter::new();
        interp.eval_str(COUNT_DOWN).unwrap();

        assert_eq!(interp.eval_str("(spin 500)").unwrap(), val(500));

        let err = interp.eval_str("(spin 100000)").unwrap_err();
        assert_eq!(err.root(), &Error::DepthLimitExceeded { limit: MAX_EVAL_DEPTH });
        assert_eq!(interp.eval_str("(spin 3)").unwrap(), val(3));
    }

    #[test]
    fn test_deep_recursion_on_small_thread() {
        let worker = std::thread::Builder::new()
            .stack_size(512 * 1024)
            .spawn(|| {
                let interp = Interpreter::new();
                interp.eval_str(COUNT_DOWN).unwrap();
                let deep = interp.eval_str("(spin 500)").unwrap();
                // `Value` is not `Send`, so it is checked on the worker thread
                assert_eq!(deep, val(500));
                let too_deep = interp.eval_str("(spin 100000)").unwrap_err();
                too_deep.root().clone()
            })
            .unwrap();

        let too_deep = worker.join().unwrap();
        assert_eq!(too_deep, Error::DepthLimitExceeded { limit: MAX_EVAL_DEPTH });
    }

    #[test]
    fn test_missing_prelude_is_skipped() {
        let config = Config {
            prelude: vec![PathBuf::from("/no/such/prelude.lisp")],
            ..Config::default()
        };
        let interp = Interpreter::with_config(config).unwrap();
        assert_eq!(interp.eval_str("(+ 1 2)").unwrap(), val(3));
        // The core library is on by default
        assert_eq!(interp.eval_str("(dec 3)").unwrap(), val(2));
    }

    #[test]
    fn test_core_library_loads() {
        let interp = Interpreter::new();
        interp.load_core_library().unwrap();
        assert_eq!(interp.eval_str("(inc 41)").unwrap(), val(42));
        assert_eq!(interp.eval_str("(when true 1 2)").unwrap(), val(2));
    }
}

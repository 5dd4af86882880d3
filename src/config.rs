//! Interpreter configuration, read from TOML.
//!
//! ```toml
//! max-eval-depth = 4000
//! core-library = true
//! prelude = ["site.lisp"]
//! history-file = ".kernlisp_history"
//! stack-size-mb = 128
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, MAX_EVAL_DEPTH};

/// Default stack size of the binary's evaluator thread
pub const DEFAULT_STACK_SIZE_MB: usize = 64;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Nested `eval` calls allowed before `DepthLimitExceeded`
    pub max_eval_depth: usize,
    /// Evaluate the bundled bootstrap library before any prelude
    pub core_library: bool,
    /// Files loaded into the root environment, in order, when an interpreter starts
    pub prelude: Vec<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub stack_size_mb: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_eval_depth: MAX_EVAL_DEPTH,
            core_library: true,
            prelude: Vec::new(),
            history_file: None,
            stack_size_mb: DEFAULT_STACK_SIZE_MB,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        if config.max_eval_depth == 0 {
            return Err(Error::Config("max-eval-depth must be positive".to_owned()));
        }
        Ok(config)
    }

    /// Read and parse a config file. Relative prelude paths are taken relative to
    /// the directory holding the config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut config = Self::from_toml_str(&text)?;
        if let Some(dir) = path.parent() {
            for prelude in &mut config.prelude {
                if prelude.is_relative() {
                    *prelude = dir.join(&*prelude);
                }
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());

        let config = Config::from_toml_str("max-eval-depth = 50").unwrap();
        assert_eq!(config.max_eval_depth, 50);
        assert_eq!(config.stack_size_mb, DEFAULT_STACK_SIZE_MB);
        assert!(config.prelude.is_empty());
    }

    #[test]
    fn test_all_keys() {
        let config = Config::from_toml_str(
            r#"
            max-eval-depth = 4000
            core-library = false
            prelude = ["a.lisp", "/abs/b.lisp"]
            history-file = "hist"
            stack-size-mb = 8
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            Config {
                max_eval_depth: 4000,
                core_library: false,
                prelude: vec![PathBuf::from("a.lisp"), PathBuf::from("/abs/b.lisp")],
                history_file: Some(PathBuf::from("hist")),
                stack_size_mb: 8,
            }
        );
    }

    #[test]
    fn test_invalid_config_data_driven() {
        let cases = [
            "max-eval-depth = \"deep\"",
            "max-eval-depth = 0",
            "unknown-key = 1",
            "prelude = ",
        ];
        for text in cases {
            let err = Config::from_toml_str(text).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{text}: {err:?}");
        }
    }

    #[test]
    fn test_load_resolves_prelude_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernlisp.toml");
        fs::write(&path, "prelude = [\"lib/core.lisp\", \"/abs.lisp\"]").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.prelude,
            vec![dir.path().join("lib/core.lisp"), PathBuf::from("/abs.lisp")]
        );

        let missing = Config::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, Error::Io { .. }), "{missing:?}");
    }
}

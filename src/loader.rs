//! Loading source files: read, parse every top-level form, evaluate each in turn.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Error;
use crate::ast::Value;
use crate::context::EvalContext;
use crate::evaluator::{Env, eval_with_context};
use crate::reader;

/// Load and evaluate the file at `path` in `env` with a fresh context, returning
/// the value of its last top-level form (`nil` for an empty file).
pub fn load_file(path: impl AsRef<Path>, env: &Env) -> Result<Value, Error> {
    let mut ctx = EvalContext::new();
    load_path(path.as_ref(), env, &mut ctx)
}

/// Load a file on behalf of a running evaluation. A relative `path` is resolved
/// against the directory of the file currently being evaluated, if any.
pub fn load_file_with_context(
    path: &str,
    env: &Env,
    ctx: &mut EvalContext,
) -> Result<Value, Error> {
    let resolved = resolve(path, ctx.current_file());
    load_path(&resolved, env, ctx)
}

fn resolve(path: &str, current_file: Option<&str>) -> PathBuf {
    let candidate = Path::new(path);
    match current_file.and_then(|file| Path::new(file).parent()) {
        Some(dir) if candidate.is_relative() => dir.join(candidate),
        _ => candidate.to_path_buf(),
    }
}

fn load_path(path: &Path, env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    let filename = path.display().to_string();
    debug!(path = %filename, "loading file");

    let source = fs::read_to_string(path).map_err(|e| Error::Io {
        path: filename.clone(),
        message: e.to_string(),
    })?;

    // The caller's location comes back once the file is done, even on error
    let saved = ctx.save_location();
    let result = eval_source(&source, Some(&filename), env, ctx);
    ctx.restore_location(saved);
    result
}

/// Evaluate every form in `source`. The whole text is parsed before anything runs,
/// so a syntax error anywhere means no form is evaluated.
pub fn eval_source(
    source: &str,
    filename: Option<&str>,
    env: &Env,
    ctx: &mut EvalContext,
) -> Result<Value, Error> {
    let forms = reader::parse_program(source, filename)?;

    let mut result = Value::Nil;
    for form in forms {
        ctx.set_location(form.position, form.text);
        result = eval_with_context(&form.value, env, ctx)?;
    }
    Ok(result)
}

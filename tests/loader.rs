#![expect(clippy::unwrap_used)] // test code OK

use std::fs;
use std::path::Path;

use kernlisp::ast::{Value, val};
use kernlisp::{Error, Interpreter, Symbol, create_global_env, loader};

fn write(dir: &Path, name: &str, source: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, source).unwrap();
}

#[test]
fn load_returns_last_form_and_keeps_definitions() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "defs.lisp", "(def a 1)\n(def b 2)\n(+ a b)\n");

    let env = create_global_env();
    let result = loader::load_file(dir.path().join("defs.lisp"), &env).unwrap();

    assert_eq!(result, val(3));
    assert_eq!(env.get(Symbol::intern("b")).unwrap(), val(2));
}

#[test]
fn empty_file_loads_to_nil() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "empty.lisp", "; nothing here\n");

    let env = create_global_env();
    assert_eq!(loader::load_file(dir.path().join("empty.lisp"), &env).unwrap(), Value::Nil);
}

#[test]
fn nested_load_resolves_relative_to_loading_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.lisp", "(load \"lib/helpers.lisp\")\n(twice 21)\n");
    write(dir.path(), "lib/helpers.lisp", "(load \"more.lisp\")\n(def twice (fn [x] (* x two)))\n");
    write(dir.path(), "lib/more.lisp", "(def two 2)\n");

    let interp = Interpreter::new();
    assert_eq!(interp.load_file(dir.path().join("main.lisp")).unwrap(), val(42));
    assert_eq!(interp.eval_str("two").unwrap(), val(2));
}

#[test]
fn load_form_evaluates_its_argument() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "value.lisp", "\"loaded\"");
    let path = dir.path().join("value.lisp");

    let interp = Interpreter::new();
    interp
        .eval_str(&format!("(def path {:?})", path.display().to_string()))
        .unwrap();
    assert_eq!(interp.eval_str("(load path)").unwrap(), val("loaded"));

    let err = interp.eval_str("(load 42)").unwrap_err();
    assert!(matches!(err.root(), Error::TypeMismatch { .. }), "{err:?}");
}

#[test]
fn errors_in_loaded_files_name_the_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "bad.lisp", "(def fine 1)\n\n  (fine 2)\n");
    let path = dir.path().join("bad.lisp");

    let interp = Interpreter::new();
    let err = interp.load_file(&path).unwrap_err();

    assert!(matches!(err.root(), Error::NotAFunction(_)), "{err:?}");
    let diagnostic = err.diagnostic().unwrap();
    let position = diagnostic.position.as_ref().unwrap();
    assert_eq!(position.file.as_deref(), Some(path.to_str().unwrap()));
    assert_eq!((position.line, position.column), (3, 3));
    assert_eq!(diagnostic.expression.as_deref(), Some("(fine 2)"));
    assert!(err.to_string().contains("bad.lisp:3:3"), "{err}");
}

#[test]
fn syntax_errors_in_loaded_files_are_positioned() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "broken.lisp", "(def x 1)\n(def y ]\n");

    let interp = Interpreter::new();
    let err = interp.load_file(dir.path().join("broken.lisp")).unwrap_err();

    let Error::ParseError(parse_error) = err.root() else {
        panic!("expected a parse error, got {err:?}");
    };
    let position = parse_error.position.as_ref().unwrap();
    assert_eq!((position.line, position.column), (2, 8));
    assert!(interp.eval_str("x").is_err(), "nothing in a broken file runs");
}

#[test]
fn loading_a_missing_file_from_lisp_is_an_io_error() {
    let interp = Interpreter::new();
    let err = interp.eval_str("(load \"/no/such/file.lisp\")").unwrap_err();
    assert!(matches!(err.root(), Error::Io { .. }), "{err:?}");
    assert!(err.to_string().contains("Cannot load /no/such/file.lisp"), "{err}");
}

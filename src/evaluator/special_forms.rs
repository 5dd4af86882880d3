//! Special forms: list-headed expressions whose head symbol selects dispatch logic
//! that controls how (and whether) the remaining elements are evaluated.
//!
//! Dispatch goes through a symbol-keyed table. [`SpecialForm::lookup`] returning
//! `None` is the only "not a special form" signal; every error from a matched form
//! is real and propagates.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Lambda, Symbol, Value};
use crate::context::EvalContext;
use crate::evaluator::{Arity, Env, eval_with_context, macros};
use crate::loader;

static SPECIAL_FORMS: LazyLock<HashMap<Symbol, SpecialForm>> = LazyLock::new(|| {
    SpecialForm::ALL
        .iter()
        .map(|form| (Symbol::intern(form.name()), *form))
        .collect()
});

pub(crate) static UNQUOTE: LazyLock<Symbol> = LazyLock::new(|| Symbol::intern("unquote"));
static DO: LazyLock<Symbol> = LazyLock::new(|| Symbol::intern("do"));
static AMPERSAND: LazyLock<Symbol> = LazyLock::new(|| Symbol::intern("&"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    If,
    Fn,
    Def,
    Defmacro,
    Do,
    Load,
    Quasiquote,
    Unquote,
    Macroexpand,
}

impl SpecialForm {
    pub const ALL: [SpecialForm; 10] = [
        SpecialForm::Quote,
        SpecialForm::If,
        SpecialForm::Fn,
        SpecialForm::Def,
        SpecialForm::Defmacro,
        SpecialForm::Do,
        SpecialForm::Load,
        SpecialForm::Quasiquote,
        SpecialForm::Unquote,
        SpecialForm::Macroexpand,
    ];

    /// The special form named by `sym`, if any.
    pub fn lookup(sym: Symbol) -> Option<SpecialForm> {
        SPECIAL_FORMS.get(&sym).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            SpecialForm::Quote => "quote",
            SpecialForm::If => "if",
            SpecialForm::Fn => "fn",
            SpecialForm::Def => "def",
            SpecialForm::Defmacro => "defmacro",
            SpecialForm::Do => "do",
            SpecialForm::Load => "load",
            SpecialForm::Quasiquote => "quasiquote",
            SpecialForm::Unquote => "unquote",
            SpecialForm::Macroexpand => "macroexpand",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            SpecialForm::Quote
            | SpecialForm::Load
            | SpecialForm::Quasiquote
            | SpecialForm::Macroexpand => Arity::Exact(1),
            SpecialForm::If => Arity::Range(2, 3),
            SpecialForm::Fn => Arity::AtLeast(2),
            SpecialForm::Def => Arity::Exact(2),
            SpecialForm::Defmacro => Arity::Exact(3),
            SpecialForm::Do | SpecialForm::Unquote => Arity::Any,
        }
    }

    /// Evaluate this form over its unevaluated arguments.
    pub fn eval(self, args: &[&Value], env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
        self.arity()
            .validate(args.len())
            .map_err(|e| e.with_callee(self.name()))?;

        match (self, args) {
            (SpecialForm::Quote, [expr]) => Ok(Value::clone(expr)),
            (SpecialForm::If, [condition, then_branch, else_branch @ ..]) => {
                eval_if(condition, then_branch, else_branch.first().copied(), env, ctx)
            }
            (SpecialForm::Fn, [params, body @ ..]) => eval_fn(params, body, env),
            (SpecialForm::Def, [name, expr]) => eval_def(name, expr, env, ctx),
            (SpecialForm::Defmacro, [name, params, body]) => eval_defmacro(name, params, body, env),
            (SpecialForm::Do, body) => eval_do(body, env, ctx),
            (SpecialForm::Load, [path]) => eval_load(path, env, ctx),
            (SpecialForm::Quasiquote, [template]) => macros::quasi_expand(template, env, ctx),
            (SpecialForm::Unquote, _) => Err(Error::UnquoteOutsideQuasiquote),
            (SpecialForm::Macroexpand, [form]) => {
                let form = eval_with_context(form, env, ctx)?;
                macros::macroexpand(&form, env, ctx)
            }
            (form, args) => Err(Error::arity_error(form.name(), form.arity(), args.len())),
        }
    }
}

fn eval_if(
    condition: &Value,
    then_branch: &Value,
    else_branch: Option<&Value>,
    env: &Env,
    ctx: &mut EvalContext,
) -> Result<Value, Error> {
    if eval_with_context(condition, env, ctx)?.is_truthy() {
        eval_with_context(then_branch, env, ctx)
    } else if let Some(else_branch) = else_branch {
        eval_with_context(else_branch, env, ctx)
    } else {
        Ok(Value::Nil)
    }
}

fn eval_fn(params: &Value, body: &[&Value], env: &Env) -> Result<Value, Error> {
    let (params, rest) = parse_params(params)?;
    Ok(Value::Function(Rc::new(Lambda {
        name: None,
        params,
        rest,
        body: implicit_do(body),
        env: Rc::clone(env),
    })))
}

fn eval_def(name: &Value, expr: &Value, env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    let Value::Symbol(name) = name else {
        return Err(Error::type_mismatch("symbol", name));
    };

    // Anonymous closures and macros take the name they are first bound under
    let value = match eval_with_context(expr, env, ctx)? {
        Value::Function(lambda) if lambda.name.is_none() => {
            Value::Function(Rc::new(lambda.named(*name)))
        }
        Value::Macro(lambda) if lambda.name.is_none() => Value::Macro(Rc::new(lambda.named(*name))),
        other => other,
    };

    env.set(*name, value);
    Ok(Value::Defined)
}

fn eval_defmacro(name: &Value, params: &Value, body: &Value, env: &Env) -> Result<Value, Error> {
    let Value::Symbol(name) = name else {
        return Err(Error::type_mismatch("symbol", name));
    };
    let (params, rest) = parse_params(params)?;

    let mac = Lambda {
        name: Some(*name),
        params,
        rest,
        body: body.clone(),
        env: Rc::clone(env),
    };
    env.set(*name, Value::Macro(Rc::new(mac)));
    Ok(Value::Defined)
}

fn eval_do(body: &[&Value], env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    let mut result = Value::Nil;
    for expr in body {
        result = eval_with_context(expr, env, ctx)?;
    }
    Ok(result)
}

fn eval_load(path: &Value, env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    match eval_with_context(path, env, ctx)? {
        Value::String(path) => loader::load_file_with_context(&path, env, ctx),
        other => Err(Error::type_mismatch("string", &other)),
    }
}

/// A single body expression stays as is; several are wrapped in `do`.
fn implicit_do(body: &[&Value]) -> Value {
    match body {
        [single] => Value::clone(single),
        _ => Value::list(
            std::iter::once(Value::Symbol(*DO))
                .chain(body.iter().map(|expr| Value::clone(expr)))
                .collect(),
        ),
    }
}

/// Split a parameter vector (or list) into positional parameters and an optional
/// rest parameter introduced by `&`.
pub(crate) fn parse_params(params: &Value) -> Result<(Vec<Symbol>, Option<Symbol>), Error> {
    let mut iter = match params {
        Value::Vector(items) => items.iter(),
        Value::List(items) => items.iter(),
        other => return Err(Error::type_mismatch("parameter vector", other)),
    };

    let mut positional: Vec<Symbol> = Vec::new();
    let mut rest = None;

    while let Some(item) = iter.next() {
        let Value::Symbol(sym) = item else {
            return Err(Error::type_mismatch("parameter symbol", item));
        };

        if *sym == *AMPERSAND {
            match (iter.next(), iter.next()) {
                (Some(Value::Symbol(rest_sym)), None) => {
                    check_duplicate(&positional, *rest_sym)?;
                    rest = Some(*rest_sym);
                    break;
                }
                _ => {
                    return Err(Error::EvalError(
                        "parameter list must have exactly one symbol after &".to_owned(),
                    ));
                }
            }
        }

        check_duplicate(&positional, *sym)?;
        positional.push(*sym);
    }

    Ok((positional, rest))
}

fn check_duplicate(seen: &[Symbol], sym: Symbol) -> Result<(), Error> {
    if seen.contains(&sym) {
        Err(Error::EvalError(format!("Duplicate parameter name: {sym}")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val, vector};

    #[test]
    fn test_lookup_distinguishes_special_forms() {
        for form in SpecialForm::ALL {
            assert_eq!(SpecialForm::lookup(Symbol::intern(form.name())), Some(form));
        }
        for name in ["car", "+", "let", "define", "lambda"] {
            assert_eq!(SpecialForm::lookup(Symbol::intern(name)), None, "{name}");
        }
    }

    #[test]
    fn test_parse_params() {
        let s = |name: &str| Symbol::intern(name);
        let cases = vec![
            (vector([sym("a"), sym("b")]), Some((vec![s("a"), s("b")], None))),
            (val([sym("a")]), Some((vec![s("a")], None))),
            (vector(Vec::<Value>::new()), Some((vec![], None))),
            (
                vector([sym("a"), sym("&"), sym("more")]),
                Some((vec![s("a")], Some(s("more")))),
            ),
            (vector([sym("&"), sym("all")]), Some((vec![], Some(s("all"))))),
            (vector([sym("a"), sym("&")]), None),
            (vector([sym("&"), sym("x"), sym("y")]), None),
            (vector([sym("a"), sym("&"), sym("a")]), None),
            (vector([sym("a"), val(1)]), None),
            (val("not params"), None),
        ];

        for (params, expected) in cases {
            let parsed = parse_params(&params);
            match expected {
                Some(expected) => assert_eq!(parsed.unwrap(), expected, "{params}"),
                None => assert!(parsed.is_err(), "{params} should be rejected"),
            }
        }
    }

    #[test]
    fn test_implicit_do() {
        let (one, two) = (val(1), val(2));
        assert_eq!(implicit_do(&[&one]), val(1));
        assert_eq!(
            implicit_do(&[&one, &two]),
            Value::list(vec![sym("do"), val(1), val(2)])
        );
        assert_eq!(implicit_do(&[]), Value::list(vec![sym("do")]));
    }

    #[test]
    fn test_def_names_anonymous_functions_only_once() {
        let env = crate::create_global_env();
        let mut ctx = EvalContext::new();
        let run = |src: &str, ctx: &mut EvalContext| {
            let (expr, _) = crate::reader::parse(src, None).unwrap();
            eval_with_context(&expr, &env, ctx).unwrap()
        };

        run("(def square (fn [x] (* x x)))", &mut ctx);
        run("(def also-square square)", &mut ctx);
        assert_eq!(run("square", &mut ctx).to_string(), "#<fn square>");
        assert_eq!(run("also-square", &mut ctx).to_string(), "#<fn square>");
        assert_eq!(run("(= square also-square)", &mut ctx), val(true));
    }
}

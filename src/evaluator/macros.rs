//! Macro application and quasiquote expansion.
//!
//! A macro call is two evaluations: the macro body runs with its parameters bound to
//! the unevaluated argument forms and produces an expansion, then the expansion is
//! evaluated in the caller's environment. Macros are not hygienic.

use tracing::trace;

use crate::Error;
use crate::ast::{Lambda, Value};
use crate::collections::{List, Vector};
use crate::context::EvalContext;
use crate::evaluator::special_forms::UNQUOTE;
use crate::evaluator::{Arity, Env, bind_params, eval_with_context};

/// Run the macro body over the unevaluated `args`, returning the expansion.
pub(crate) fn expand(mac: &Lambda, args: &[&Value], ctx: &mut EvalContext) -> Result<Value, Error> {
    let forms = args.iter().map(|form| Value::clone(form)).collect();
    let macro_env = bind_params(mac, forms, "macro")?;
    let expansion = eval_with_context(&mac.body, &macro_env, ctx)?;
    trace!(name = %mac.display_name("macro"), %expansion, "expanded macro");
    Ok(expansion)
}

/// Expand a macro call and evaluate the expansion at the call site.
pub(crate) fn call_macro(
    mac: &Lambda,
    args: &[&Value],
    env: &Env,
    ctx: &mut EvalContext,
) -> Result<Value, Error> {
    let expansion = expand(mac, args, ctx)?;
    eval_with_context(&expansion, env, ctx)
}

/// One expansion step of `form`, which must be a list headed by a symbol bound to a
/// macro. The expansion is returned unevaluated.
pub(crate) fn macroexpand(form: &Value, env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    let Value::List(list) = form else {
        return Err(Error::NotAMacro(form.summary()));
    };
    let elements: Vec<&Value> = list.iter().collect();
    let Some((head, args)) = elements.split_first() else {
        return Err(Error::NotAMacro(form.summary()));
    };

    let resolved = match head {
        Value::Symbol(sym) => env.lookup(*sym),
        _ => None,
    };
    match resolved {
        Some(Value::Macro(mac)) => expand(&mac, args, ctx),
        _ => Err(Error::NotAMacro(head.summary())),
    }
}

/// Expand a quasiquote template: `(unquote x)` is replaced by the value of `x`,
/// lists and vectors are rebuilt with their elements expanded, anything else is
/// returned as is.
///
/// Nesting is not tracked. An inner quasiquote is treated like any other list, so
/// its unquotes are evaluated by the outermost expansion.
pub(crate) fn quasi_expand(expr: &Value, env: &Env, ctx: &mut EvalContext) -> Result<Value, Error> {
    match expr {
        Value::List(list) => match list.first() {
            Some(Value::Symbol(head)) if *head == *UNQUOTE => match list.get(1) {
                Some(unquoted) if list.len() == 2 => eval_with_context(unquoted, env, ctx),
                _ => Err(Error::arity_error("unquote", Arity::Exact(1), list.len() - 1)),
            },
            _ => Ok(Value::List(
                list.iter()
                    .map(|item| quasi_expand(item, env, ctx))
                    .collect::<Result<List, _>>()?,
            )),
        },
        Value::Vector(items) => Ok(Value::Vector(
            items
                .iter()
                .map(|item| quasi_expand(item, env, ctx))
                .collect::<Result<Vector, _>>()?,
        )),
        _ => Ok(expr.clone()),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use crate::evaluator::create_global_env;
    use crate::reader::parse;

    fn read(src: &str) -> Value {
        parse(src, None).unwrap().0
    }

    #[test]
    fn test_quasi_expand_rebuilds_without_touching_template() {
        let env = create_global_env();
        let mut ctx = EvalContext::new();
        let template = read("(a (b ~(+ 1 2)) [c ~(* 2 2)])");
        let before = template.to_string();

        let expanded = quasi_expand(&template, &env, &mut ctx).unwrap();

        assert_eq!(expanded.to_string(), "(a (b 3) [c 4])");
        assert_eq!(template.to_string(), before);
    }

    #[test]
    fn test_quasi_expand_atoms_are_implicitly_quoted() {
        let env = create_global_env();
        let mut ctx = EvalContext::new();
        for atom in [sym("undefined-symbol"), val(1), val("s"), Value::Nil] {
            assert_eq!(quasi_expand(&atom, &env, &mut ctx).unwrap(), atom);
        }
    }

    #[test]
    fn test_macroexpand_single_step() {
        let env = create_global_env();
        let mut ctx = EvalContext::new();
        let define = read("(defmacro swap-args [f a b] `(~f ~b ~a))");
        eval_with_context(&define, &env, &mut ctx).unwrap();

        let expanded = macroexpand(&read("(swap-args - 1 10)"), &env, &mut ctx).unwrap();
        assert_eq!(expanded, Value::list(vec![sym("-"), val(10), val(1)]));

        let called = eval_with_context(&read("(swap-args - 1 10)"), &env, &mut ctx).unwrap();
        assert_eq!(called, val(9));
    }

    #[test]
    fn test_macroexpand_rejects_non_macros() {
        let env = create_global_env();
        let mut ctx = EvalContext::new();
        for form in ["(+ 1 2)", "(undefined-head 1)", "((fn [] 1))", "()", "x"] {
            let err = macroexpand(&read(form), &env, &mut ctx).unwrap_err();
            assert!(matches!(err, Error::NotAMacro(_)), "{form}: {err:?}");
        }
    }
}

//! Registry of native builtin functions.
//!
//! Every builtin here is an ordinary function value: its arguments are evaluated
//! before it is called, and `create_global_env` binds it into the root environment
//! under its id. Control constructs (`if`, `fn`, `def`, ...) are special forms and
//! live in the evaluator, not here.
//!
//! ```lisp
//! (+ 1 2 3)                      ; => 6
//! (update [1 2 3] 1 99)          ; => [1 99 3]
//! (get (hash-map "a" 1) "a")     ; => 1
//! (str "n = " 42)                ; => "n = 42"
//! ```
//!
//! ## Conventions
//!
//! - Only `nil` and `false` are falsy (`not`, predicates)
//! - Collection operations never modify their arguments; they return new values
//! - `nil` reads as the empty sequence wherever a list or vector is expected
//! - Numeric operations reject non-numbers with `TypeMismatch`; there is no coercion
//!
//! ## Adding New Operations
//!
//! 1. Implement the function with typed parameters (`f64`, `&str`, `Value`,
//!    `Vector`, `Map`, `Set`, or a trailing `ValueIter`/`NumIter`/`StringIter`)
//! 2. Add a `BuiltinOp` entry to `BUILTIN_OPS` with its id and arity
//! 3. Add test cases covering both the happy path and type errors

use crate::Error;
use crate::ast::{NumberType, Symbol, Value};
use crate::collections::{List, Map, Seq, Set, Vector};
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use crate::evaluator::{Arity, NumIter, StringIter, ValueIter};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, LazyLock};

/// Definition of a built-in operation
#[derive(Clone)]
pub struct BuiltinOp {
    /// The name the operation is bound under
    pub id: &'static str,
    pub func: Arc<OperationFn>,
    /// Expected number of arguments, checked before `func` runs
    pub arity: Arity,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("id", &self.id)
            .field("arity", &self.arity)
            .finish()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    /// The function value bound into environments, with arity checking in front
    pub(crate) fn to_value(&self) -> Value {
        let inner = Arc::clone(&self.func);
        let arity = self.arity;
        Value::BuiltinFunction {
            id: self.id.to_owned(),
            func: Arc::new(move |args: Vec<Value>| {
                arity.validate(args.len())?;
                inner(args)
            }),
        }
    }
}

//
// Helpers
//

fn index_arg(n: NumberType) -> Result<usize, Error> {
    if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as NumberType {
        Ok(n as usize)
    } else {
        Err(Error::type_mismatch("non-negative integer index", &Value::Number(n)))
    }
}

fn seq_items(value: &Value) -> Result<Seq<'_>, Error> {
    value
        .as_seq()
        .ok_or_else(|| Error::type_mismatch("list or vector", value))
}

/// Printed form for `str`/`print`: strings contribute their raw text
fn display_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn join_raw(args: ValueIter<'_>, separator: &str) -> String {
    args.map(display_raw).collect::<Vec<_>>().join(separator)
}

//
// Arithmetic
//

fn builtin_add(args: NumIter<'_>) -> NumberType {
    args.sum()
}

fn builtin_sub(first: NumberType, rest: NumIter<'_>) -> NumberType {
    if rest.len() == 0 {
        return -first;
    }
    rest.fold(first, |acc, n| acc - n)
}

fn builtin_mul(args: NumIter<'_>) -> NumberType {
    args.product()
}

fn builtin_div(first: NumberType, rest: NumIter<'_>) -> Result<NumberType, Error> {
    if rest.len() == 0 {
        return checked_div(1.0, first);
    }
    let mut result = first;
    for n in rest {
        result = checked_div(result, n)?;
    }
    Ok(result)
}

fn checked_div(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0.0 {
        Err(Error::EvalError("division by zero".to_owned()))
    } else {
        Ok(a / b)
    }
}

/// Floored modulo: the result takes the sign of the divisor
fn builtin_mod(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0.0 {
        return Err(Error::EvalError("division by zero".to_owned()));
    }
    Ok(((a % b) + b) % b)
}

//
// Comparison and logic
//

fn builtin_eq(first: Value, rest: ValueIter<'_>) -> bool {
    let mut rest = rest;
    rest.all(|other| *other == first)
}

// Chained numeric comparison: every adjacent pair must satisfy the operator
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(first: NumberType, rest: NumIter<'_>) -> bool {
            let mut prev = first;
            for current in rest {
                if !(prev $op current) {
                    return false;
                }
                prev = current;
            }
            true
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_not(value: Value) -> bool {
    !value.is_truthy()
}

//
// Predicates
//

macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(value: Value) -> bool {
            matches!(value, $pattern)
        }
    };
}

type_predicate!(builtin_is_nil, Value::Nil);
type_predicate!(builtin_is_number, Value::Number(_));
type_predicate!(builtin_is_string, Value::String(_));
type_predicate!(builtin_is_symbol, Value::Symbol(_));
type_predicate!(builtin_is_list, Value::List(_));
type_predicate!(builtin_is_vector, Value::Vector(_));
type_predicate!(builtin_is_map, Value::HashMap(_));
type_predicate!(builtin_is_set, Value::Set(_));
type_predicate!(builtin_is_fn, Value::Function(_) | Value::BuiltinFunction { .. });

fn builtin_count(value: Value) -> Result<usize, Error> {
    match &value {
        Value::List(list) => Ok(list.len()),
        Value::Vector(vector) => Ok(vector.len()),
        Value::HashMap(map) => Ok(map.len()),
        Value::Set(set) => Ok(set.len()),
        Value::String(s) => Ok(s.chars().count()),
        Value::Nil => Ok(0),
        other => Err(Error::type_mismatch("collection or string", other)),
    }
}

fn builtin_is_empty(value: Value) -> Result<bool, Error> {
    builtin_count(value).map(|count| count == 0)
}

//
// Sequences
//

fn builtin_list(args: ValueIter<'_>) -> Value {
    Value::List(args.cloned().collect())
}

fn builtin_cons(head: Value, tail: Value) -> Result<Value, Error> {
    match &tail {
        Value::List(list) => Ok(Value::List(list.cons(head))),
        _ => {
            let items = seq_items(&tail)?;
            Ok(Value::List(
                std::iter::once(head).chain(items.iter().cloned()).collect(),
            ))
        }
    }
}

fn builtin_first(seq: Value) -> Result<Value, Error> {
    Ok(seq_items(&seq)?.first().cloned().unwrap_or(Value::Nil))
}

fn builtin_rest(seq: Value) -> Result<Value, Error> {
    match &seq {
        Value::List(list) => Ok(Value::List(list.rest())),
        _ => {
            let items = seq_items(&seq)?;
            Ok(Value::List(items.iter().skip(1).cloned().collect()))
        }
    }
}

fn builtin_nth(seq: Value, index: NumberType) -> Result<Value, Error> {
    let items = seq_items(&seq)?;
    let index = index_arg(index)?;
    items.get(index).cloned().ok_or_else(|| {
        Error::EvalError(format!(
            "index {index} out of bounds for sequence of length {}",
            items.len()
        ))
    })
}

fn builtin_concat(args: ValueIter<'_>) -> Result<Value, Error> {
    let mut items = Vec::new();
    for arg in args {
        items.extend(seq_items(arg)?.iter().cloned());
    }
    Ok(Value::List(List::new(items)))
}

//
// Vectors
//

fn builtin_vector(args: ValueIter<'_>) -> Value {
    Value::Vector(args.cloned().collect())
}

fn builtin_append(vector: Vector, value: Value) -> Vector {
    vector.append(value)
}

fn builtin_update(vector: Vector, index: NumberType, value: Value) -> Result<Vector, Error> {
    vector.update(index_arg(index)?, value)
}

/// Indexed lookup on vectors and lists, key lookup on maps; missing entries are nil
fn builtin_get(collection: Value, key: Value) -> Result<Value, Error> {
    match (&collection, &key) {
        (Value::HashMap(map), Value::String(key)) => Ok(map.get(key).cloned().unwrap_or(Value::Nil)),
        (Value::HashMap(_), other) => Err(Error::type_mismatch("string key", other)),
        (Value::Vector(_) | Value::List(_) | Value::Nil, Value::Number(n)) => {
            let items = seq_items(&collection)?;
            Ok(index_arg(*n)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Nil))
        }
        (Value::Vector(_) | Value::List(_) | Value::Nil, other) => {
            Err(Error::type_mismatch("number index", other))
        }
        (other, _) => Err(Error::type_mismatch("vector, list or hash-map", other)),
    }
}

//
// Maps and sets
//

fn builtin_hash_map(args: ValueIter<'_>) -> Result<Value, Error> {
    let items: Vec<&Value> = args.collect();
    if items.len() % 2 != 0 {
        return Err(Error::EvalError(
            "hash-map expects an even number of arguments (key value pairs)".to_owned(),
        ));
    }
    let mut map = Map::new();
    for pair in items.chunks(2) {
        if let [key, value] = pair {
            let Value::String(key) = key else {
                return Err(Error::type_mismatch("string key", key));
            };
            map = map.put(key.as_str(), (*value).clone());
        }
    }
    Ok(Value::HashMap(map))
}

fn builtin_put(map: Map, key: &str, value: Value) -> Map {
    map.put(key, value)
}

fn builtin_remove(collection: Value, key: Value) -> Result<Value, Error> {
    match (&collection, &key) {
        (Value::HashMap(map), Value::String(key)) => Ok(Value::HashMap(map.remove(key))),
        (Value::HashMap(_), other) => Err(Error::type_mismatch("string key", other)),
        (Value::Set(set), member) => Ok(Value::Set(set.remove(member))),
        (other, _) => Err(Error::type_mismatch("hash-map or set", other)),
    }
}

fn builtin_contains(collection: Value, key: Value) -> Result<bool, Error> {
    match (&collection, &key) {
        (Value::HashMap(map), Value::String(key)) => Ok(map.contains_key(key)),
        (Value::HashMap(_), _) => Ok(false),
        (Value::Set(set), member) => Ok(set.contains(member)),
        (other, _) => Err(Error::type_mismatch("hash-map or set", other)),
    }
}

fn builtin_keys(map: Map) -> Value {
    Value::List(map.keys().into_iter().map(Value::String).collect())
}

fn builtin_vals(map: Map) -> Value {
    Value::List(map.values().into_iter().collect())
}

fn builtin_hash_set(args: ValueIter<'_>) -> Set {
    args.cloned().collect()
}

fn builtin_add_member(set: Set, value: Value) -> Set {
    set.add(value)
}

//
// Strings, symbols and I/O
//

fn builtin_str(args: ValueIter<'_>) -> String {
    join_raw(args, "")
}

fn builtin_symbol(name: &str) -> Result<Symbol, Error> {
    if crate::ast::is_valid_symbol(name) {
        Ok(Symbol::intern(name))
    } else {
        Err(Error::EvalError(format!("invalid symbol name: {name:?}")))
    }
}

fn builtin_type(value: Value) -> &'static str {
    value.type_name()
}

fn builtin_string_length(s: &str) -> usize {
    s.chars().count()
}

fn builtin_string_append(args: StringIter<'_>) -> String {
    args.collect()
}

fn builtin_print(args: ValueIter<'_>) -> Result<Value, Error> {
    write_stdout(&join_raw(args, " "), false)
}

fn builtin_println(args: ValueIter<'_>) -> Result<Value, Error> {
    write_stdout(&join_raw(args, " "), true)
}

fn write_stdout(text: &str, newline: bool) -> Result<Value, Error> {
    let mut stdout = std::io::stdout().lock();
    let written = if newline {
        writeln!(stdout, "{text}")
    } else {
        write!(stdout, "{text}").and_then(|()| stdout.flush())
    };
    written
        .map(|()| Value::Nil)
        .map_err(|e| Error::EvalError(format!("cannot write to stdout: {e}")))
}

fn builtin_error(args: ValueIter<'_>) -> Result<Value, Error> {
    let message = if args.len() == 0 {
        "Error".to_owned()
    } else {
        join_raw(args, " ")
    };
    Err(Error::EvalError(message))
}

/// Global registry of all builtin operations.
///
/// The implementations above are wired through the same adapter layer used for
/// custom builtin registration, once, at first use.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn fixed<Args, F>(id: &'static str, arity: usize, f: F) -> BuiltinOp
    where
        F: IntoOperation<Args>,
    {
        BuiltinOp {
            id,
            func: <F as IntoOperation<Args>>::into_operation(f),
            arity: Arity::Exact(arity),
        }
    }

    fn variadic<Args, F>(id: &'static str, arity: Arity, f: F) -> BuiltinOp
    where
        F: IntoVariadicOperation<Args>,
    {
        BuiltinOp {
            id,
            func: <F as IntoVariadicOperation<Args>>::into_variadic_operation(f),
            arity,
        }
    }

    vec![
        // Arithmetic
        variadic::<(NumIter<'static>,), _>("+", Arity::Any, builtin_add),
        variadic::<(NumberType, NumIter<'static>), _>("-", Arity::AtLeast(1), builtin_sub),
        variadic::<(NumIter<'static>,), _>("*", Arity::Any, builtin_mul),
        variadic::<(NumberType, NumIter<'static>), _>("/", Arity::AtLeast(1), builtin_div),
        fixed::<(NumberType, NumberType), _>("mod", 2, builtin_mod),
        // Comparison and logic
        variadic::<(Value, ValueIter<'static>), _>("=", Arity::AtLeast(1), builtin_eq),
        variadic::<(NumberType, NumIter<'static>), _>("<", Arity::AtLeast(2), builtin_lt),
        variadic::<(NumberType, NumIter<'static>), _>(">", Arity::AtLeast(2), builtin_gt),
        variadic::<(NumberType, NumIter<'static>), _>("<=", Arity::AtLeast(2), builtin_le),
        variadic::<(NumberType, NumIter<'static>), _>(">=", Arity::AtLeast(2), builtin_ge),
        fixed::<(Value,), _>("not", 1, builtin_not),
        // Predicates
        fixed::<(Value,), _>("nil?", 1, builtin_is_nil),
        fixed::<(Value,), _>("number?", 1, builtin_is_number),
        fixed::<(Value,), _>("string?", 1, builtin_is_string),
        fixed::<(Value,), _>("symbol?", 1, builtin_is_symbol),
        fixed::<(Value,), _>("list?", 1, builtin_is_list),
        fixed::<(Value,), _>("vector?", 1, builtin_is_vector),
        fixed::<(Value,), _>("map?", 1, builtin_is_map),
        fixed::<(Value,), _>("set?", 1, builtin_is_set),
        fixed::<(Value,), _>("fn?", 1, builtin_is_fn),
        fixed::<(Value,), _>("empty?", 1, builtin_is_empty),
        // Sequences
        variadic::<(ValueIter<'static>,), _>("list", Arity::Any, builtin_list),
        fixed::<(Value, Value), _>("cons", 2, builtin_cons),
        fixed::<(Value,), _>("first", 1, builtin_first),
        fixed::<(Value,), _>("rest", 1, builtin_rest),
        fixed::<(Value,), _>("count", 1, builtin_count),
        fixed::<(Value, NumberType), _>("nth", 2, builtin_nth),
        variadic::<(ValueIter<'static>,), _>("concat", Arity::Any, builtin_concat),
        // Vectors
        variadic::<(ValueIter<'static>,), _>("vector", Arity::Any, builtin_vector),
        fixed::<(Vector, Value), _>("append", 2, builtin_append),
        fixed::<(Vector, NumberType, Value), _>("update", 3, builtin_update),
        fixed::<(Value, Value), _>("get", 2, builtin_get),
        // Maps and sets
        variadic::<(ValueIter<'static>,), _>("hash-map", Arity::Any, builtin_hash_map),
        fixed::<(Map, &'static str, Value), _>("put", 3, builtin_put),
        fixed::<(Value, Value), _>("remove", 2, builtin_remove),
        fixed::<(Value, Value), _>("contains?", 2, builtin_contains),
        fixed::<(Map,), _>("keys", 1, builtin_keys),
        fixed::<(Map,), _>("vals", 1, builtin_vals),
        variadic::<(ValueIter<'static>,), _>("hash-set", Arity::Any, builtin_hash_set),
        fixed::<(Set, Value), _>("add", 2, builtin_add_member),
        // Strings and symbols
        variadic::<(ValueIter<'static>,), _>("str", Arity::Any, builtin_str),
        variadic::<(StringIter<'static>,), _>("string-append", Arity::Any, builtin_string_append),
        fixed::<(&'static str,), _>("string-length", 1, builtin_string_length),
        fixed::<(&'static str,), _>("symbol", 1, builtin_symbol),
        fixed::<(Value,), _>("type", 1, builtin_type),
        // I/O and errors
        variadic::<(ValueIter<'static>,), _>("print", Arity::Any, builtin_print),
        variadic::<(ValueIter<'static>,), _>("println", Arity::Any, builtin_println),
        variadic::<(ValueIter<'static>,), _>("error", Arity::Any, builtin_error),
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by the name it is bound under
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}

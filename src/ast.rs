//! This module defines the runtime value model. The main enum, [`Value`], is the closed
//! set of variants the evaluator works with: interned symbols, numbers, strings,
//! booleans, nil, the persistent collections, closures, macros and native builtins.
//! Programs are themselves `Value`s, so this is also the AST handed over by the reader.
//!
//! Ergonomic helper functions such as [`val`], [`sym`], [`nil`] and [`vector`] are
//! provided for convenient construction in code and tests, together with `From`
//! conversions for common Rust types.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use internment::Intern;

use crate::Error;
use crate::collections::{List, Map, Set, Seq, Vector};
use crate::evaluator::{Arity, Env};
use crate::evaluator::intooperation::OperationFn;

/// Type alias for number values in the interpreter
pub type NumberType = f64;

/// Allowed non-alphanumeric characters in symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$&%.:";

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if (first_char == '-' || first_char == '.')
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// An interned symbol name.
///
/// Interning goes through a process-wide, append-only table, so two symbols with the
/// same text are the same identity and compare (and hash) by pointer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(Intern<String>);

impl Symbol {
    pub fn intern(name: &str) -> Self {
        Symbol(Intern::new(name.to_owned()))
    }

    pub fn name(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.name())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::intern(name)
    }
}

/// A closure or macro body: parameters, unevaluated body and the shared defining
/// environment.
pub struct Lambda {
    /// Name the value was bound under with `def`/`defmacro`, for diagnostics
    pub name: Option<Symbol>,
    pub params: Vec<Symbol>,
    /// Symbol after `&` in the parameter list, collects remaining arguments as a list
    pub rest: Option<Symbol>,
    pub body: Value,
    pub env: Env,
}

impl Lambda {
    /// Name used in arity errors and stack frames
    pub fn display_name(&self, kind: &str) -> String {
        match &self.name {
            Some(name) => format!("{kind} {name}"),
            None => format!("anonymous {kind}"),
        }
    }

    pub fn arity(&self) -> Arity {
        match self.rest {
            Some(_) => Arity::AtLeast(self.params.len()),
            None => Arity::Exact(self.params.len()),
        }
    }

    /// A copy of this lambda carrying `name`, sharing body and environment
    pub(crate) fn named(&self, name: Symbol) -> Lambda {
        Lambda {
            name: Some(name),
            params: self.params.clone(),
            rest: self.rest,
            body: self.body.clone(),
            env: Rc::clone(&self.env),
        }
    }

    fn write_params(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{param}")?;
        }
        if let Some(rest) = &self.rest {
            if !self.params.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "& {rest}")?;
        }
        write!(f, "]")
    }
}

/// Core value type of the interpreter
#[derive(Clone)]
pub enum Value {
    /// Interned identifiers
    Symbol(Symbol),
    /// 64-bit floating point numbers
    Number(NumberType),
    /// String literals
    String(String),
    /// Boolean values
    Bool(bool),
    /// The nil value, falsy together with `false`
    Nil,
    /// Immutable ordered sequence with O(1) `first` and `rest`
    List(List),
    /// Indexed sequence with copy-on-write `append`/`update`
    Vector(Vector),
    /// Immutable string-keyed association
    HashMap(Map),
    /// Set keyed by the printed form of its members
    Set(Set),
    /// Result of a successful `def`/`defmacro`
    Defined,
    /// User-defined closures
    Function(Rc<Lambda>),
    /// User-defined macros
    Macro(Rc<Lambda>),
    /// Native functions. Uses the id string for equality instead of the function pointer.
    BuiltinFunction {
        id: String,
        func: Arc<OperationFn>,
    },
}

impl Value {
    /// Only `nil` and `false` are falsy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Symbol(_) => "symbol",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Nil => "nil",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::HashMap(_) => "hash-map",
            Value::Set(_) => "set",
            Value::Defined => "defined",
            Value::Function(_) => "function",
            Value::Macro(_) => "macro",
            Value::BuiltinFunction { .. } => "builtin-function",
        }
    }

    /// Printed form, truncated for use inside error messages
    pub fn summary(&self) -> String {
        const MAX_SUMMARY: usize = 60;
        let printed = self.to_string();
        if printed.chars().count() <= MAX_SUMMARY {
            printed
        } else {
            let mut truncated: String = printed.chars().take(MAX_SUMMARY).collect();
            truncated.push_str("...");
            truncated
        }
    }

    /// Elements of a list or vector; nil reads as the empty sequence
    pub fn as_seq(&self) -> Option<Seq<'_>> {
        match self {
            Value::List(list) => Some(list.as_seq()),
            Value::Vector(vector) => Some(vector.as_seq()),
            Value::Nil => Some(Seq::EMPTY),
            _ => None,
        }
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(List::new(items))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Nil => write!(f, "Nil"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Vector(vector) => {
                write!(f, "Vector(")?;
                for (i, v) in vector.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::HashMap(map) => write!(f, "HashMap({map})"),
            Value::Set(set) => write!(f, "Set({set})"),
            Value::Defined => write!(f, "Defined"),
            Value::Function(lambda) => {
                write!(f, "Function(params={:?}, body={:?})", lambda.params, lambda.body)
            }
            Value::Macro(lambda) => {
                write!(f, "Macro(params={:?}, body={:?})", lambda.params, lambda.body)
            }
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64 Display already prints integral values without a decimal point
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bool(b) => write!(f, "{b}"),
            Value::Nil => write!(f, "nil"),
            Value::List(list) => write!(f, "{list}"),
            Value::Vector(vector) => write!(f, "{vector}"),
            Value::HashMap(map) => write!(f, "{map}"),
            Value::Set(set) => write!(f, "{set}"),
            Value::Defined => write!(f, "#<defined>"),
            Value::Function(lambda) => match &lambda.name {
                Some(name) => write!(f, "#<fn {name}>"),
                None => {
                    write!(f, "#<fn ")?;
                    lambda.write_params(f)?;
                    write!(f, ">")
                }
            },
            Value::Macro(lambda) => match &lambda.name {
                Some(name) => write!(f, "#<macro {name}>"),
                None => {
                    write!(f, "#<macro ")?;
                    lambda.write_params(f)?;
                    write!(f, ">")
                }
            },
            Value::BuiltinFunction { id, .. } => write!(f, "#<builtin-function:{id}>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::HashMap(a), Value::HashMap(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Defined, Value::Defined) => true,
            // Closures and macros are equal only to themselves
            (Value::Function(a), Value::Function(b)) | (Value::Macro(a), Value::Macro(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                id1 == id2
            }
            _ => false,
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Value::Symbol(sym)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

impl From<Vector> for Value {
    fn from(vector: Vector) -> Self {
        Value::Vector(vector)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::HashMap(map)
    }
}

impl From<Set> for Value {
    fn from(set: Set) -> Self {
        Value::Set(set)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

macro_rules! impl_from_number {
    ($num_type:ty) => {
        impl From<$num_type> for Value {
            fn from(n: $num_type) -> Self {
                Value::Number(n as NumberType)
            }
        }
    };
}

impl_from_number!(i8);
impl_from_number!(i16);
impl_from_number!(i32);
impl_from_number!(i64);
impl_from_number!(u8);
impl_from_number!(u16);
impl_from_number!(u32);
impl_from_number!(usize);
impl_from_number!(f32);
impl_from_number!(NumberType);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::list(slice.iter().cloned().map(|x| x.into()).collect())
    }
}

// Fallible conversions from `Value` back into Rust types, used by the typed
// builtin adapters.

impl std::convert::TryInto<NumberType> for Value {
    type Error = Error;

    fn try_into(self) -> Result<NumberType, Error> {
        if let Value::Number(n) = self {
            Ok(n)
        } else {
            Err(Error::type_mismatch("number", &self))
        }
    }
}

impl std::convert::TryInto<bool> for Value {
    type Error = Error;

    fn try_into(self) -> Result<bool, Error> {
        if let Value::Bool(b) = self {
            Ok(b)
        } else {
            Err(Error::type_mismatch("boolean", &self))
        }
    }
}

impl std::convert::TryInto<Symbol> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Symbol, Error> {
        if let Value::Symbol(sym) = self {
            Ok(sym)
        } else {
            Err(Error::type_mismatch("symbol", &self))
        }
    }
}

impl std::convert::TryInto<Vector> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Vector, Error> {
        if let Value::Vector(vector) = self {
            Ok(vector)
        } else {
            Err(Error::type_mismatch("vector", &self))
        }
    }
}

impl std::convert::TryInto<Map> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Map, Error> {
        if let Value::HashMap(map) = self {
            Ok(map)
        } else {
            Err(Error::type_mismatch("hash-map", &self))
        }
    }
}

impl std::convert::TryInto<Set> for Value {
    type Error = Error;

    fn try_into(self) -> Result<Set, Error> {
        if let Value::Set(set) = self {
            Ok(set)
        } else {
            Err(Error::type_mismatch("set", &self))
        }
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(Symbol::intern(name.as_ref()))
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the nil value
pub fn nil() -> Value {
    Value::Nil
}

/// Helper function for creating vectors
pub fn vector<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Value {
    Value::Vector(items.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Value::Number(42.0)),
            (val(-17), Value::Number(-17.0)),
            (val(2.5), Value::Number(2.5)),
            (val(255u8), Value::Number(255.0)),
            (val(true), Value::Bool(true)),
            (val("hello"), Value::String("hello".to_owned())),
            (val(""), Value::String(String::new())),
            (sym("foo-bar?"), Value::Symbol(Symbol::intern("foo-bar?"))),
            (sym(String::from("test")), Value::Symbol(Symbol::intern("test"))),
            (nil(), Value::Nil),
            (
                val([1, 2, 3]),
                Value::list(vec![val(1), val(2), val(3)]),
            ),
            (
                val(vec![sym("operation"), val(42), val("result"), val(true)]),
                Value::list(vec![
                    Value::Symbol(Symbol::intern("operation")),
                    Value::Number(42.0),
                    Value::String("result".to_owned()),
                    Value::Bool(true),
                ]),
            ),
            (vector([1, 2]), Value::Vector(Vector::new(vec![val(1), val(2)]))),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_symbols_are_interned() {
        let a = Symbol::intern("same-name");
        let b = Symbol::intern(&String::from("same-name"));
        assert_eq!(a, b);
        assert_ne!(a, Symbol::intern("other-name"));
        assert_eq!(a.name(), "same-name");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!val(false).is_truthy());
        assert!(val(true).is_truthy());
        assert!(val(0).is_truthy());
        assert!(val("").is_truthy());
        assert!(Value::list(vec![]).is_truthy());
    }

    #[test]
    fn test_display() {
        let cases = vec![
            (val(8), "8"),
            (val(2.5), "2.5"),
            (val(-3), "-3"),
            (val("a\"b"), "\"a\\\"b\""),
            (val(true), "true"),
            (nil(), "nil"),
            (val(vec![sym("+"), val(1), val(2)]), "(+ 1 2)"),
            (vector([1, 2, 3]), "[1 2 3]"),
            (Value::list(vec![]), "()"),
            (Value::Defined, "#<defined>"),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn test_valid_symbols() {
        for name in ["foo", "+", "->", "&", "empty?", "a.b", "-x"] {
            assert!(is_valid_symbol(name), "{name} should be valid");
        }
        for name in ["", "1a", "-1", ".5", "a b", "a@b"] {
            assert!(!is_valid_symbol(name), "{name} should be invalid");
        }
    }
}

//! Typed builtins: the traits that let `Environment::register_builtin_operation`
//! and friends accept plain Rust functions such as `fn(f64, f64) -> f64` or
//! `fn(Vector, Value) -> Vector` and store them as a `Value::BuiltinFunction`.

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::collections::{Seq, SeqIter};
use crate::evaluator::Arity;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::Arc;

/// The erased form every builtin is stored as. Arguments arrive already
/// evaluated and owned.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

/// Arity errors raised inside adapters carry no callee name; the registration
/// wrapper fills it in from the builtin's id.
fn anonymous_arity_error(expected: Arity, got: usize) -> Error {
    Error::arity_error(String::new(), expected, got)
}

/// A builtin parameter type that can be produced from one argument. `Param<'a>`
/// may borrow from the argument slot (`&str`, sequence iterators) or take it by
/// value (numbers, collections, `Value`).
pub trait FromParam {
    type Param<'a>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        Ok(std::mem::replace(value, Value::Nil))
    }
}

// f64, bool, Symbol, Vector, Map and Set
impl<T> FromParam for T
where
    Value: std::convert::TryInto<T, Error = Error>,
{
    type Param<'a> = T;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        let owned = std::mem::replace(value, Value::Nil);
        <Value as std::convert::TryInto<T>>::try_into(owned)
    }
}

impl FromParam for &str {
    type Param<'a> = &'a str;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        match value {
            Value::String(s) => Ok(s.as_str()),
            other => Err(Error::type_mismatch("string", other)),
        }
    }
}

// A sequence argument (list, vector or nil) seen through a typed iterator.
impl<'b, K> FromParam for TypedValueIter<'b, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        if let Some(items) = value.as_seq() {
            TypedValueIter::<K>::new(items)
        } else {
            Err(Error::type_mismatch("list or vector", value))
        }
    }
}

/// Element type of a [`TypedValueIter`]. The whole sequence is checked before
/// iteration starts, so projection cannot fail.
#[doc(hidden)]
pub trait ValueElementKind {
    type Item<'a>;

    fn precheck(items: Seq<'_>) -> Result<(), Error>;
    fn project<'a>(v: &'a Value) -> Self::Item<'a>;
}

/// Borrowed iterator over arguments, yielding `K::Item`s.
#[doc(hidden)]
pub struct TypedValueIter<'a, K: ValueElementKind> {
    inner: SeqIter<'a>,
    _marker: PhantomData<K>,
}

impl<'a, K> TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    pub(crate) fn new(values: Seq<'a>) -> Result<Self, Error> {
        K::precheck(values)?;
        Ok(TypedValueIter {
            inner: values.iter(),
            _marker: PhantomData,
        })
    }
}

impl<'a, K> Iterator for TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let v = self.inner.next()?;
        Some(K::project(v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K> ExactSizeIterator for TypedValueIter<'a, K> where K: ValueElementKind {}
impl<'a, K> FusedIterator for TypedValueIter<'a, K> where K: ValueElementKind {}

#[doc(hidden)]
pub struct ValueKind;

impl ValueElementKind for ValueKind {
    type Item<'a> = &'a Value;

    fn precheck(_items: Seq<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        v
    }
}

#[doc(hidden)]
pub struct NumberKind;

impl ValueElementKind for NumberKind {
    type Item<'a> = NumberType;

    fn precheck(items: Seq<'_>) -> Result<(), Error> {
        match items.iter().find(|v| !matches!(v, Value::Number(_))) {
            Some(bad) => Err(Error::type_mismatch("number", bad)),
            None => Ok(()),
        }
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        if let Value::Number(n) = v {
            *n
        } else {
            debug_assert!(false, "NumberKind::project saw non-number after precheck");
            NumberType::NAN
        }
    }
}

#[doc(hidden)]
pub struct StringKind;

impl ValueElementKind for StringKind {
    type Item<'a> = &'a str;

    fn precheck(items: Seq<'_>) -> Result<(), Error> {
        match items.iter().find(|v| !matches!(v, Value::String(_))) {
            Some(bad) => Err(Error::type_mismatch("string", bad)),
            None => Ok(()),
        }
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        if let Value::String(s) = v {
            s.as_str()
        } else {
            debug_assert!(false, "StringKind::project saw non-string after precheck");
            ""
        }
    }
}

/// Borrowed iterator over arbitrary argument values.
pub type ValueIter<'a> = TypedValueIter<'a, ValueKind>;

/// Iterator over numeric arguments, as `f64`.
pub type NumIter<'a> = TypedValueIter<'a, NumberKind>;

pub type StringIter<'a> = TypedValueIter<'a, StringKind>;

/// The trailing parameter of a variadic builtin, built from every argument
/// after the fixed prefix.
pub trait FromRest {
    type Param<'a>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error>;
}

impl<K> FromRest for TypedValueIter<'static, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error> {
        TypedValueIter::<K>::new(Seq::Slice(slice))
    }
}

/// Builtins may return a plain value or a `Result`.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T> IntoValueResult for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoValueResult for T
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// A Rust function of fixed arity, keyed by its parameter tuple.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// A Rust function ending in a rest iterator (`ValueIter`, `NumIter` or
/// `StringIter`), after up to three fixed parameters.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;
}

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: for<'a> Fn(<I as FromRest>::Param<'a>) -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            let rest_param: <I as FromRest>::Param<'_> = <I as FromRest>::from_rest(&args[..])?;
            let result: R = (self)(rest_param);
            result.into_value_result()
        })
    }
}

// Fixed prefix plus rest
macro_rules! impl_into_variadic_operation_for_prefix_and_rest {
    ($prefix:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRest,
            $( $A: FromParam, )+
            F: for<'a> Fn(
                    $( <$A as FromParam>::Param<'a> ),+,
                    <I as FromRest>::Param<'a>,
                ) -> R
                + Send
                + Sync
                + 'static,
            R: IntoValueResult,
        {
            fn into_variadic_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+, ref mut rest @ .. ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let rest_param: <I as FromRest>::Param<'_> =
                                <I as FromRest>::from_rest(&*rest)?;

                            let result: R = (self)( $( $p ),+, rest_param );
                            result.into_value_result()
                        }
                        _ => Err(anonymous_arity_error(Arity::AtLeast($prefix), len)),
                    }
                })
            }
        }
    };
}

impl_into_variadic_operation_for_prefix_and_rest!(1, v0, p0: A1);
impl_into_variadic_operation_for_prefix_and_rest!(2, v0, p0: A1, v1, p1: A2);
impl_into_variadic_operation_for_prefix_and_rest!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);

// The argument vector is destructured into local slots that each `FromParam`
// borrows from or empties.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R
                + Send
                + Sync
                + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let result: R = (self)( $( $p ),+ );
                            result.into_value_result()
                        }
                        _ => Err(anonymous_arity_error(Arity::Exact($arity), len)),
                    }
                })
            }
        }
    };
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(anonymous_arity_error(Arity::Exact(0), args.len()));
            }

            let result: R = (self)();
            result.into_value_result()
        })
    }
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
impl_into_operation_for_arity!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);
impl_into_operation_for_arity!(4, v0, p0: A1, v1, p1: A2, v2, p2: A3, v3, p3: A4);

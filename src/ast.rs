//! This module defines the runtime value type shared by the reader and the
//! evaluator. [`Value`] is a closed tagged union covering numbers, strings,
//! booleans, symbols, lists, the empty/nil marker, closures and primitives.
//! Parsed code is itself a `Value` tree: a list whose head is a symbol may be a
//! special form or a call, and only `quote` turns such a list into data.
//!
//! Values have two textual renderings:
//! - [`Display`](std::fmt::Display) is the diagnostic form printed for results
//!   (`true`/`false`, strings without quotes)
//! - [`Value::to_source`] is reader syntax (`#t`/`#f`, quoted strings), so that
//!   reading it back reproduces a structurally equal value
//!
//! Helper functions [`val`], [`sym`] and [`nil`] make it easy to build values
//! from Rust literals, arrays and vectors.

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::builtinops::{Arity, PrimitiveFn};
use crate::evaluator::Environment;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Core value type in interpreter
///
/// `Nil` and an empty `List` both denote the empty list and compare equal. The
/// reader produces `List(vec![])` for `()`; forms with no useful result
/// (`define`, a `cond` with no matching clause) evaluate to `Nil`.
#[derive(Clone)]
pub enum Value {
    /// Numbers (integers only)
    Number(NumberType),
    /// String literals, stored without the surrounding quotes
    Str(String),
    /// Boolean values
    Bool(bool),
    /// Symbols (identifiers)
    Symbol(String),
    /// The empty list / "no value" marker
    Nil,
    /// Lists, used both as data and as unevaluated code
    List(Vec<Value>),
    /// User-defined procedures (params, body, captured environment)
    ///
    /// The environment is shared, not copied: scopes created by the call that
    /// built the closure stay alive as long as the closure does.
    Closure {
        params: Rc<[String]>,
        body: Rc<Value>,
        env: Environment,
    },
    /// Built-in procedures, compared by name
    Primitive {
        name: Rc<str>,
        arity: Arity,
        func: PrimitiveFn,
    },
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str(\"{s}\")"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
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
            Value::Closure { params, body, .. } => {
                write!(f, "Closure(params={params:?}, body={body:?})")
            }
            Value::Primitive { name, .. } => write!(f, "Primitive({name})"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the empty list
pub fn nil() -> Value {
    Value::Nil
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Nil => write!(f, "()"),
            Value::List(elements) => write_list(f, elements, |f, elem| write!(f, "{elem}")),
            Value::Closure { params, .. } => write!(f, "#<lambda ({})>", params.join(" ")),
            Value::Primitive { name, .. } => write!(f, "#<primitive:{name}>"),
        }
    }
}

fn write_list(
    f: &mut fmt::Formatter<'_>,
    elements: &[Value],
    mut write_elem: impl FnMut(&mut fmt::Formatter<'_>, &Value) -> fmt::Result,
) -> fmt::Result {
    write!(f, "(")?;
    for (i, elem) in elements.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write_elem(f, elem)?;
    }
    write!(f, ")")
}

/// Reader-syntax rendering, see [`Value::to_source`]
struct Source<'a>(&'a Value);

impl fmt::Display for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::List(elements) => {
                write_list(f, elements, |f, elem| write!(f, "{}", Source(elem)))
            }
            other => write!(f, "{other}"),
        }
    }
}

impl Value {
    /// Render this value in reader syntax.
    ///
    /// Strings are written between double quotes without escaping, since the
    /// reader does no escape processing; a string containing `"` does not
    /// read back as itself.
    pub fn to_source(&self) -> String {
        Source(self).to_string()
    }

    /// View a list value as a slice; `Nil` is the empty slice
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(elements) => Some(elements),
            Value::Nil => Some(&[]),
            _ => None,
        }
    }

    /// Check if a value represents the empty list
    pub fn is_nil(&self) -> bool {
        self.as_list().is_some_and(<[Value]>::is_empty)
    }

    /// Numbers, symbols and strings are atoms; booleans, lists and procedures are not
    pub fn is_atom(&self) -> bool {
        matches!(self, Value::Number(_) | Value::Symbol(_) | Value::Str(_))
    }

    /// Short name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Symbol(_) => "symbol",
            Value::Nil | Value::List(_) => "list",
            Value::Closure { .. } => "closure",
            Value::Primitive { .. } => "primitive",
        }
    }

    /// Extract an integer, or report which operation needed one
    pub fn as_number(&self, operation: &str) -> Result<NumberType, Error> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(Error::Type(format!(
                "{operation} expects a number, got {} {}",
                other.type_name(),
                other.to_source()
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Nil | Value::List(_), Value::Nil | Value::List(_)) => {
                self.as_list() == other.as_list()
            }
            (
                Value::Closure {
                    params: p1,
                    body: b1,
                    env: e1,
                },
                Value::Closure {
                    params: p2,
                    body: b2,
                    env: e2,
                },
            ) => p1 == p2 && Rc::ptr_eq(b1, b2) && e1.ptr_eq(e2),
            (Value::Primitive { name: n1, .. }, Value::Primitive { name: n2, .. }) => n1 == n2,
            _ => false, // Different variants are never equal
        }
    }
}

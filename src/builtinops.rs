//! Built-in operations registry.
//!
//! Every operator the interpreter knows natively is listed once in
//! `BUILTIN_OPS`, together with its arity. The registry is resolved into a
//! name-keyed map on first use, so the evaluator never compares operator names
//! one by one.
//!
//! ## Functions vs Special Forms
//!
//! - **Primitives**: receive already-evaluated arguments (e.g. `+`, `car`, `eq?`).
//!   They are bound in the global environment as `Value::Primitive`, so user
//!   code can pass them around and shadow them.
//! - **Special Forms**: receive their arguments unevaluated (`quote`, `define`,
//!   `lambda`, `cond`). They are dispatched by keyword before any environment
//!   lookup and cannot be shadowed.
//!
//! ## Error Handling
//!
//! Primitives never coerce: a non-number given to `+` or a non-list given to
//! `cdr` is a `TypeError`, a wrong argument count is an `ArityError`, and
//! division by zero or integer overflow is an `ArithmeticError`.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::evaluator::{Environment, eval_cond, eval_define, eval_lambda, eval_quote};

/// Signature shared by all primitive procedures
pub type PrimitiveFn = fn(&[Value]) -> Result<Value, Error>;

/// Signature shared by all special forms: unevaluated arguments, the current
/// environment and the current call depth
pub type SpecialFormFn = fn(&[Value], &Environment, usize) -> Result<Value, Error>;

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    pub fn accepts(self, arg_count: usize) -> bool {
        match self {
            Arity::Exact(n) => arg_count == n,
            Arity::AtLeast(n) => arg_count >= n,
            Arity::Any => true,
        }
    }

    /// Check if the given number of arguments is valid
    pub fn validate(self, arg_count: usize) -> Result<(), Error> {
        if self.accepts(arg_count) {
            Ok(())
        } else {
            Err(Error::arity_error(self, arg_count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Represents the implementation of a built-in operation
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Procedure applied to evaluated arguments
    Function(PrimitiveFn),
    /// Syntax handled with unevaluated arguments
    SpecialForm(SpecialFormFn),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The identifier this operation is called by
    pub name: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    /// Check the argument count, naming this operation in the error
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count).map_err(|_| {
            Error::arity_error_with_expr(self.arity, arg_count, self.name.to_owned())
        })
    }
}

//
// Builtin Function Implementations
//

// Macro to generate left folds over number arguments
macro_rules! numeric_fold {
    ($name:ident, $op_str:expr, $step:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let Some((first, rest)) = args.split_first() else {
                return Err(Error::arity_error_with_expr(
                    Arity::AtLeast(1),
                    0,
                    $op_str.to_owned(),
                ));
            };

            let mut acc = first.as_number($op_str)?;
            for arg in rest {
                acc = $step(acc, arg.as_number($op_str)?)?;
            }
            Ok(Value::Number(acc))
        }
    };
}

fn checked_add(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    a.checked_add(b)
        .ok_or_else(|| Error::Arithmetic("integer overflow in addition".into()))
}

fn checked_sub(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    a.checked_sub(b)
        .ok_or_else(|| Error::Arithmetic("integer overflow in subtraction".into()))
}

fn checked_mul(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    a.checked_mul(b)
        .ok_or_else(|| Error::Arithmetic("integer overflow in multiplication".into()))
}

fn checked_div(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(Error::Arithmetic(format!("division by zero: (/ {a} 0)")));
    }
    a.checked_div(b)
        .ok_or_else(|| Error::Arithmetic("integer overflow in division".into()))
}

numeric_fold!(builtin_add, "+", checked_add);
numeric_fold!(builtin_sub, "-", checked_sub);
numeric_fold!(builtin_mul, "*", checked_mul);
numeric_fold!(builtin_div, "/", checked_div);

/// Borrow a list argument, or report which operation needed one
fn expect_list<'a>(operation: &str, value: &'a Value) -> Result<&'a [Value], Error> {
    value.as_list().ok_or_else(|| {
        Error::Type(format!(
            "{operation} expects a list, got {} {}",
            value.type_name(),
            value.to_source()
        ))
    })
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match expect_list("car", &args[0])? {
        [first, ..] => Ok(first.clone()),
        [] => Err(Error::Type("car of empty list".into())),
    }
}

// The empty list has an empty cdr, unlike car which rejects it
fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    let rest = match expect_list("cdr", &args[0])? {
        [_, rest @ ..] => rest.to_vec(),
        [] => Vec::new(),
    };
    Ok(Value::List(rest))
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    let tail = expect_list("cons", &args[1])?;
    let mut new_list = Vec::with_capacity(tail.len() + 1);
    new_list.push(args[0].clone());
    new_list.extend_from_slice(tail);
    Ok(Value::List(new_list))
}

fn builtin_eq(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args[0] == args[1]))
}

fn builtin_null(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(expect_list("null?", &args[0])?.is_empty()))
}

fn builtin_atom(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args[0].is_atom()))
}

fn builtin_zero(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args[0].as_number("zero?")? == 0))
}

/// Global registry of all built-in operations.
///
/// Fixed arities here are checked before the implementation runs, which is
/// what lets the implementations index `args` directly.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn function(name: &'static str, arity: Arity, func: PrimitiveFn) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::Function(func),
            arity,
        }
    }

    fn special_form(name: &'static str, arity: Arity, func: SpecialFormFn) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::SpecialForm(func),
            arity,
        }
    }

    vec![
        // Special forms
        special_form("quote", Arity::Exact(1), eval_quote),
        special_form("define", Arity::Exact(2), eval_define),
        // Only (lambda (params...) body) with a single body expression
        special_form("lambda", Arity::Exact(2), eval_lambda),
        special_form("cond", Arity::Any, eval_cond),
        // Arithmetic operations
        function("+", Arity::AtLeast(1), builtin_add),
        function("-", Arity::AtLeast(1), builtin_sub),
        function("*", Arity::AtLeast(1), builtin_mul),
        function("/", Arity::AtLeast(1), builtin_div),
        // List operations
        function("car", Arity::Exact(1), builtin_car),
        function("cdr", Arity::Exact(1), builtin_cdr),
        function("cons", Arity::Exact(2), builtin_cons),
        // Predicates
        function("eq?", Arity::Exact(2), builtin_eq),
        function("null?", Arity::Exact(1), builtin_null),
        function("atom?", Arity::Exact(1), builtin_atom),
        function("zero?", Arity::Exact(1), builtin_zero),
    ]
});

/// Lazy static map from name to BuiltinOp
static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.name, op)).collect()
    });

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation (primitive or special form) by name
pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}

/// Find a special form by keyword
pub(crate) fn find_special_form(name: &str) -> Option<(&'static BuiltinOp, SpecialFormFn)> {
    let op = find_builtin_op(name)?;
    match op.op_kind {
        OpKind::SpecialForm(func) => Some((op, func)),
        OpKind::Function(_) => None,
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};
    use pretty_assertions::assert_eq;

    /// Invoke a primitive through the registry, checking arity first the way
    /// the evaluator does
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_builtin_op(name).expect("builtin not found");
        match op.op_kind {
            OpKind::Function(func) => {
                op.validate_arity(args.len())?;
                func(args)
            }
            OpKind::SpecialForm(_) => {
                panic!("expected function builtin in tests, got special form: {name}")
            }
        }
    }

    /// Expected outcome of a primitive call
    #[derive(Debug)]
    enum Expected {
        Returns(Value),
        TypeError,
        ArityError,
        ArithmeticError,
    }
    use Expected::*;

    fn returns<T: Into<Value>>(value: T) -> Expected {
        Returns(value.into())
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_ops_registry() {
        let car_op = find_builtin_op("car").unwrap();
        assert_eq!(car_op.arity, Arity::Exact(1));
        assert!(!car_op.is_special_form());

        for keyword in ["quote", "define", "lambda", "cond"] {
            let op = find_builtin_op(keyword).unwrap();
            assert!(op.is_special_form(), "{keyword} should be a special form");
            assert!(find_special_form(keyword).is_some());
        }

        assert!(find_special_form("+").is_none());
        assert!(find_builtin_op("unknown").is_none());
        assert!(find_builtin_op("if").is_none());

        // Map and registry agree
        for op in get_builtin_ops() {
            assert!(std::ptr::eq(find_builtin_op(op.name).unwrap(), op));
        }
    }

    #[test]
    fn test_arity_validation() {
        assert!(Arity::Exact(2).validate(2).is_ok());
        assert!(Arity::Exact(2).validate(1).is_err());
        assert!(Arity::AtLeast(1).validate(5).is_ok());
        assert!(Arity::AtLeast(1).validate(0).is_err());
        assert!(Arity::Any.validate(0).is_ok());

        let err = find_builtin_op("cons").unwrap().validate_arity(3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ArityError: cons: expected 2 arguments, got 3"
        );
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Expected);

        let int_list = val([1, 2, 3]);
        let nested = val([val([val([1])])]);
        let complex1 = val(vec![val(1), val("test"), val([val(2)])]);
        let complex2 = val(vec![val(1), val("test"), val([val(2)])]);
        let complex3 = val(vec![val(1), val("test"), val([val(3)])]);

        let test_cases: Vec<TestCase> = vec![
            // ===== ARITHMETIC =====
            test!("+", &[val(1), val(2), val(3)], returns(6)),
            test!("+", &[val(42)], returns(42)),
            test!("+", &[val(-5), val(10)], returns(5)),
            test!("+", &[], ArityError),
            test!("+", &[val(1), val("2")], TypeError),
            test!("+", &[val(true)], TypeError),
            test!("+", &[val(i64::MAX), val(1)], ArithmeticError),
            test!("-", &[val(10), val(3), val(2)], returns(5)),
            // Single argument folds to itself
            test!("-", &[val(10)], returns(10)),
            test!("-", &[val(i64::MIN), val(1)], ArithmeticError),
            test!("*", &[val(2), val(3), val(4)], returns(24)),
            test!("*", &[val(0), val(100)], returns(0)),
            test!("*", &[val(i64::MAX), val(2)], ArithmeticError),
            test!("/", &[val(12), val(3)], returns(4)),
            test!("/", &[val(100), val(5), val(2)], returns(10)),
            test!("/", &[val(7), val(2)], returns(3)),
            test!("/", &[val(-7), val(2)], returns(-3)),
            test!("/", &[val(5), val(0)], ArithmeticError),
            test!("/", &[val(i64::MIN), val(-1)], ArithmeticError),
            test!("/", &[sym("x"), val(1)], TypeError),
            // ===== CAR / CDR / CONS =====
            test!("car", &[int_list.clone()], returns(1)),
            test!("car", &[nested.clone()], returns(val([val([1])]))),
            test!("car", &[nil()], TypeError),
            test!("car", &[Value::List(vec![])], TypeError),
            test!("car", &[val(1)], TypeError),
            test!("car", &[int_list.clone(), int_list.clone()], ArityError),
            test!("cdr", &[int_list.clone()], returns([2, 3])),
            test!("cdr", &[val([1])], returns(nil())),
            test!("cdr", &[nil()], returns(nil())),
            test!("cdr", &[val("abc")], TypeError),
            test!("cons", &[val(1), val([2, 3])], returns([1, 2, 3])),
            test!("cons", &[val(1), nil()], returns([1])),
            test!("cons", &[int_list.clone(), nil()], returns(vec![int_list.clone()])),
            test!("cons", &[val(1), val(2)], TypeError),
            test!("cons", &[val(1)], ArityError),
            // ===== EQ? =====
            test!("eq?", &[val(1), val(1)], returns(true)),
            test!("eq?", &[val(1), val(2)], returns(false)),
            test!("eq?", &[val("a"), val("a")], returns(true)),
            test!("eq?", &[sym("a"), sym("a")], returns(true)),
            test!("eq?", &[sym("a"), val("a")], returns(false)),
            test!("eq?", &[val(true), val(true)], returns(true)),
            test!("eq?", &[complex1.clone(), complex2.clone()], returns(true)),
            test!("eq?", &[complex1.clone(), complex3.clone()], returns(false)),
            test!("eq?", &[nil(), Value::List(vec![])], returns(true)),
            test!("eq?", &[val(1)], ArityError),
            // ===== PREDICATES =====
            test!("null?", &[nil()], returns(true)),
            test!("null?", &[Value::List(vec![])], returns(true)),
            test!("null?", &[val([1])], returns(false)),
            test!("null?", &[val(0)], TypeError),
            test!("atom?", &[val(1)], returns(true)),
            test!("atom?", &[sym("x")], returns(true)),
            test!("atom?", &[val("s")], returns(true)),
            test!("atom?", &[val(true)], returns(false)),
            test!("atom?", &[int_list.clone()], returns(false)),
            test!("atom?", &[nil()], returns(false)),
            test!("zero?", &[val(0)], returns(true)),
            test!("zero?", &[val(-3)], returns(false)),
            test!("zero?", &[val("0")], TypeError),
            test!("zero?", &[], ArityError),
        ];

        for (i, (name, actual, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("Builtin test #{} ({name})", i + 1);
            match (actual, expected) {
                (Ok(value), Returns(expected_value)) => {
                    assert_eq!(value, expected_value, "{test_id}");
                }
                (Err(Error::Type(_)), TypeError)
                | (Err(Error::Arity { .. }), ArityError)
                | (Err(Error::Arithmetic(_)), ArithmeticError) => {}
                (actual, expected) => {
                    panic!("{test_id}: expected {expected:?}, got {actual:?}")
                }
            }
        }
    }

    #[test]
    fn test_cons_does_not_mutate_its_input() {
        let tail = val([2, 3]);
        let consed = call_builtin("cons", &[val(1), tail.clone()]).unwrap();
        assert_eq!(consed, val([1, 2, 3]));
        assert_eq!(tail, val([2, 3]));
    }
}

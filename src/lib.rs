//! gscheme - a minimal Scheme interpreter
//!
//! This crate reads textual S-expressions into an in-memory [`Value`](ast::Value)
//! tree and evaluates that tree against a lexically scoped
//! [`Environment`](evaluator::Environment).
//!
//! ```scheme
//! (define square (lambda (x) (* x x)))
//! (square 7)                           ; 49
//! (cond ((zero? 0) "zero") (else "other"))
//! (car (cons 1 (quote (2 3))))         ; 1
//! ```
//!
//! ## Strict Typing
//!
//! Only integers exist as numbers, and primitives reject operands of the wrong
//! shape instead of coercing them:
//! - `(+ 1 "2")` is a type error, not `3` or `"12"`
//! - `(car (quote ()))` is an error
//! - a closure called with the wrong number of arguments is an arity error
//!
//! ## Modules
//!
//! - `reader`: tokenizer and recursive-descent parser
//! - `ast`: the runtime value model shared by reader and evaluator
//! - `evaluator`: environments, special forms and procedure application
//! - `builtinops`: registry of special forms and primitive procedures
//!
//! ## Example
//!
//! ```
//! use gscheme::ast::Value;
//!
//! let results = gscheme::run_program("(define x 5) (+ x 1)").unwrap();
//! assert_eq!(results, vec![Value::Nil, Value::Number(6)]);
//! ```

use std::fmt;

use crate::ast::Value;
use crate::builtinops::Arity;
use crate::reader::ReaderConfig;

/// Maximum list nesting accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum number of nested procedure calls
///
/// Only closure applications count toward this; expression nesting inside a
/// single body is already bounded by `MAX_PARSE_DEPTH`.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (stray closing paren)
    InvalidSyntax,
    /// Input ended before the expression was complete (unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Implementation-imposed limit exceeded (integer literal out of range)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Byte offset into the source where the error was detected
    pub position: Option<usize>,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        position: Option<usize>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            position,
            context: None,
            found,
        }
    }

    /// Create a ParseError at a byte offset, naming the offending token
    pub fn at(
        kind: ParseErrorKind,
        message: impl Into<String>,
        position: usize,
        found: impl Into<String>,
    ) -> Self {
        Self::new(kind, message, Some(position), Some(found.into()))
    }

    /// Fill in the context snippet from the source text the error position refers to
    pub fn with_context(mut self, input: &str) -> Self {
        const MAX_CONTEXT: usize = 100;

        let Some(position) = self.position else {
            return self;
        };
        let position = position.min(input.len());

        // Show some context before the error, starting on a char boundary
        let context_start = (0..=position.saturating_sub(20))
            .rev()
            .find(|&i| input.is_char_boundary(i))
            .unwrap_or(0);

        let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        // Replace newlines with visible markers for better error display
        self.context = Some(display_context.replace('\n', "\\n").replace('\r', ""));
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
///
/// Every error is fatal for the top-level form being evaluated; nothing is
/// retried and no default value is substituted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Malformed token stream, detected before evaluation starts
    #[error("SyntaxError: {0}")]
    Syntax(ParseError),
    #[error("UndefinedSymbolError: {0}")]
    UndefinedSymbol(String),
    /// Operator symbol names neither a primitive nor a bound procedure
    #[error("UndefinedProcedureError: {0}")]
    UndefinedProcedure(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ArityError: {}expected {expected} arguments, got {got}", describe_expression(.expression))]
    Arity {
        expected: Arity,
        got: usize,
        expression: Option<String>,
    },
    #[error("ArithmeticError: {0}")]
    Arithmetic(String),
    /// A special form whose shape is wrong (e.g. a cond clause without two elements)
    #[error("MalformedFormError: {0}")]
    MalformedForm(String),
    /// The operator position evaluated to something that cannot be applied
    #[error("NotAProcedureError: {0}")]
    NotAProcedure(String),
    #[error("DepthExceededError: call depth limit exceeded (max: {limit})")]
    DepthExceeded { limit: usize },
}

fn describe_expression(expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!("{expr}: "),
        None => String::new(),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::Arity {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: Arity, got: usize, expression: String) -> Self {
        Error::Arity {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Syntax(err)
    }
}

/// Read and evaluate a whole program in a fresh global environment.
///
/// Returns one value per top-level form. Reading happens entirely before
/// evaluation, so a syntax error anywhere means nothing is evaluated.
pub fn run_program(source: &str) -> Result<Vec<Value>, Error> {
    run_program_with_config(source, ReaderConfig::default())
}

/// Like [`run_program`], with explicit reader settings
pub fn run_program_with_config(source: &str, config: ReaderConfig) -> Result<Vec<Value>, Error> {
    let forms = reader::parse_program_with_config(source, config)?;
    let env = evaluator::create_global_env();
    evaluator::eval_program(&forms, &env)
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod reader;
mod stack;

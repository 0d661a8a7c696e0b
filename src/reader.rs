//! S-expression reader: text is first split into tokens, then the token
//! stream is parsed by recursive descent into top-level [`Value`] forms.
//! Nothing is evaluated here.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{all_consuming, opt, recognize, value},
    sequence::{delimited, pair},
};

use crate::MAX_PARSE_DEPTH;
use crate::ast::{NumberType, Value};
use crate::{Error, ParseError, ParseErrorKind};

/// Reader settings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReaderConfig {
    /// Treat `;` (outside string tokens) as the start of a comment running to end of line
    pub handle_comments: bool,
}

/// One token with the byte offset where it starts in the source text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub offset: usize,
}

fn is_token_delimiter(c: char, config: ReaderConfig) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '(' | ')') || (config.handle_comments && c == ';')
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_while(|c| c != '\n'))).parse(input)
}

/// Skip whitespace, and comments when enabled
fn skip_trivia(mut input: &str, config: ReaderConfig) -> IResult<&str, ()> {
    loop {
        let (rest, _) = multispace0.parse(input)?;
        match opt(line_comment).parse(rest)? {
            (after_comment, Some(_)) if config.handle_comments => input = after_comment,
            _ => return Ok((rest, ())),
        }
    }
}

fn paren_token(input: &str) -> IResult<&str, &str> {
    recognize(one_of("()")).parse(input)
}

/// A string token runs uninterpreted up to the next double quote
fn string_token(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('"'), take_while(|c| c != '"'), char('"'))).parse(input)
}

fn atom_token(input: &str, config: ReaderConfig) -> IResult<&str, &str> {
    take_while1(|c| !is_token_delimiter(c, config)).parse(input)
}

/// Split source text into tokens using the default configuration
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, Error> {
    tokenize_with_config(input, ReaderConfig::default())
}

/// Split source text into tokens.
///
/// `(` and `)` are always single tokens, whitespace separates tokens, a
/// double quote starts a string token and any other run of characters is one
/// atom token.
pub fn tokenize_with_config(input: &str, config: ReaderConfig) -> Result<Vec<Token<'_>>, Error> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, ()) = skip_trivia(remaining, config)
            .map_err(|e| nom_error(input, remaining, e))?;
        if rest.is_empty() {
            return Ok(tokens);
        }

        let offset = input.len() - rest.len();
        if rest.starts_with('"') && string_token(rest).is_err() {
            return Err(ParseError::at(
                ParseErrorKind::Incomplete,
                format!("Unterminated string literal starting at position {offset}"),
                offset,
                rest.chars().take(10).collect::<String>(),
            )
            .with_context(input)
            .into());
        }

        let (next, text) = alt((paren_token, string_token, |i| atom_token(i, config)))
            .parse(rest)
            .map_err(|e| nom_error(input, rest, e))?;

        tokens.push(Token { text, offset });
        remaining = next;
    }
}

/// Convert nom errors to a syntax error at the position the tokenizer reached
fn nom_error(input: &str, at: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    let position = input.len() - at.len();
    let found = match &error {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input.chars().take(10).collect(),
        nom::Err::Incomplete(_) => String::new(),
    };
    ParseError::at(
        ParseErrorKind::InvalidSyntax,
        format!("Invalid syntax at position {position}"),
        position,
        found,
    )
    .with_context(input)
    .into()
}

fn parse_bool(token: &str) -> IResult<&str, Value> {
    all_consuming(alt((
        value(Value::Bool(true), tag("#t")),
        value(Value::Bool(false), tag("#f")),
    )))
    .parse(token)
}

/// Optionally signed run of decimal digits
fn parse_integer_literal(token: &str) -> IResult<&str, &str> {
    all_consuming(recognize(pair(opt(one_of("+-")), digit1))).parse(token)
}

/// Classify an atom token as a boolean, number, string or symbol
fn classify_atom(token: &Token<'_>) -> Result<Value, Error> {
    let text = token.text;

    if let Ok((_, boolean)) = parse_bool(text) {
        return Ok(boolean);
    }

    if let Ok((_, digits)) = parse_integer_literal(text) {
        return digits.parse::<NumberType>().map(Value::Number).map_err(|_| {
            ParseError::at(
                ParseErrorKind::ImplementationLimit,
                format!("Integer literal out of range at position {}", token.offset),
                token.offset,
                text,
            )
            .into()
        });
    }

    if let Some(content) = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return Ok(Value::Str(content.to_owned()));
    }

    Ok(Value::Symbol(text.to_owned()))
}

/// Recursive-descent parser over a token slice
struct FormParser<'t, 'a> {
    tokens: &'t [Token<'a>],
    index: usize,
}

impl<'a> FormParser<'_, 'a> {
    fn next_token(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.index).copied();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn parse_all(&mut self) -> Result<Vec<Value>, Error> {
        let mut forms = Vec::new();
        while let Some(token) = self.next_token() {
            forms.push(self.parse_form(token, 0)?);
        }
        Ok(forms)
    }

    fn parse_form(&mut self, token: Token<'a>, depth: usize) -> Result<Value, Error> {
        match token.text {
            "(" => self.parse_list(token, depth + 1),
            ")" => Err(ParseError::at(
                ParseErrorKind::InvalidSyntax,
                format!("Unexpected ')' at position {}", token.offset),
                token.offset,
                ")",
            )
            .into()),
            _ => classify_atom(&token),
        }
    }

    /// Parse list elements after `open` up to the matching `)`
    fn parse_list(&mut self, open: Token<'a>, depth: usize) -> Result<Value, Error> {
        if depth > MAX_PARSE_DEPTH {
            return Err(ParseError::at(
                ParseErrorKind::TooDeeplyNested,
                format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                open.offset,
                "(",
            )
            .into());
        }

        let mut elements = Vec::new();
        loop {
            let Some(token) = self.next_token() else {
                return Err(ParseError::at(
                    ParseErrorKind::Incomplete,
                    format!(
                        "Unexpected end of input: '(' at position {} is never closed",
                        open.offset
                    ),
                    open.offset,
                    "(",
                )
                .into());
            };

            if token.text == ")" {
                return Ok(Value::List(elements));
            }
            elements.push(self.parse_form(token, depth)?);
        }
    }
}

/// Parse a token stream into top-level forms.
///
/// Fails on the first unbalanced parenthesis; no partial result is returned.
pub fn parse(tokens: &[Token<'_>]) -> Result<Vec<Value>, Error> {
    FormParser { tokens, index: 0 }.parse_all()
}

/// Tokenize and parse a whole program
pub fn parse_program(input: &str) -> Result<Vec<Value>, Error> {
    parse_program_with_config(input, ReaderConfig::default())
}

/// Tokenize and parse a whole program with explicit reader settings
pub fn parse_program_with_config(input: &str, config: ReaderConfig) -> Result<Vec<Value>, Error> {
    let tokens = tokenize_with_config(input, config)?;
    parse(&tokens).map_err(|err| match err {
        Error::Syntax(parse_error) => Error::Syntax(parse_error.with_context(input)),
        other => other,
    })
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};
    use pretty_assertions::assert_eq;

    /// Test result variants for reader tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Vec<Value>),           // Parsing should succeed with these top-level forms
        SpecificError(ParseErrorKind), // Parsing should fail with this kind of syntax error
    }
    use ParseTestResult::*;

    /// Helper for a single successfully parsed form
    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(vec![value.into()])
    }

    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ({input:?})", i + 1);
            match (parse_program(input), expected) {
                (Ok(actual), Success(expected_forms)) => {
                    assert_eq!(&actual, expected_forms, "{test_id}: value mismatch");

                    // Reader syntax of each form must read back to the same form
                    for form in &actual {
                        let reparsed = parse_program(&form.to_source()).unwrap();
                        assert_eq!(reparsed, vec![form.clone()], "{test_id}: round-trip");
                    }
                }
                (Err(Error::Syntax(err)), SpecificError(kind)) => {
                    assert_eq!(err.kind, *kind, "{test_id}: error kind mismatch");
                }
                (Err(err), Success(_)) => panic!("{test_id}: expected success, got {err:?}"),
                (Err(err), SpecificError(_)) => {
                    panic!("{test_id}: expected syntax error, got {err:?}")
                }
                (Ok(actual), SpecificError(_)) => {
                    panic!("{test_id}: expected error, got {actual:?}")
                }
            }
        }
    }

    #[test]
    fn test_tokenize() {
        let texts = |input: &str| -> Vec<String> {
            tokenize(input)
                .unwrap()
                .iter()
                .map(|t| t.text.to_owned())
                .collect()
        };

        assert_eq!(texts("(+ 1 2)"), vec!["(", "+", "1", "2", ")"]);
        assert_eq!(texts("((a)b)"), vec!["(", "(", "a", ")", "b", ")"]);
        assert_eq!(texts(" \t\r\nfoo\n"), vec!["foo"]);
        assert_eq!(
            texts("(display \"hello (world)\")"),
            vec!["(", "display", "\"hello (world)\"", ")"]
        );
        assert_eq!(texts("\"\""), vec!["\"\""]);
        assert_eq!(texts("a;b"), vec!["a;b"]);
        assert!(texts("").is_empty());
        assert!(texts("   \n").is_empty());

        let offsets: Vec<usize> = tokenize("(ab  12)").unwrap().iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 1, 5, 7]);
    }

    #[test]
    fn test_tokenize_comments() {
        let config = ReaderConfig {
            handle_comments: true,
        };
        let texts: Vec<&str> = tokenize_with_config("; header\n(a ; trailing\n b)x;y", config)
            .unwrap()
            .iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["(", "a", "b", ")", "x"]);

        let forms = parse_program_with_config("\"a;b\" ; not part of the string", config).unwrap();
        assert_eq!(forms, vec![val("a;b")]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("(f \"abc").unwrap_err();
        match err {
            Error::Syntax(e) => {
                assert_eq!(e.kind, ParseErrorKind::Incomplete);
                assert_eq!(e.position, Some(3));
                assert!(e.context.is_some());
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_parser_comprehensive() {
        let test_cases = vec![
            // ===== NUMBERS =====
            ("42", success(42)),
            ("-5", success(-5)),
            ("+5", success(5)),
            ("0", success(0)),
            ("9223372036854775807", success(i64::MAX)),
            ("-9223372036854775808", success(i64::MIN)),
            (
                "99999999999999999999",
                SpecificError(ParseErrorKind::ImplementationLimit),
            ),
            // Not entirely digits: symbols
            ("3.14", success(sym("3.14"))),
            ("123abc", success(sym("123abc"))),
            ("-", success(sym("-"))),
            ("+", success(sym("+"))),
            // ===== BOOLEANS =====
            ("#t", success(true)),
            ("#f", success(false)),
            ("#true", success(sym("#true"))),
            // ===== STRINGS =====
            ("\"hello\"", success("hello")),
            ("\"hello world\"", success("hello world")),
            ("\"\"", success("")),
            ("\"no \\n escapes\"", success("no \\n escapes")),
            ("\"#t\"", success("#t")),
            ("\"12\"", success("12")),
            // ===== SYMBOLS =====
            ("foo", success(sym("foo"))),
            ("null?", success(sym("null?"))),
            ("else", success(sym("else"))),
            ("a\"b", success(sym("a\"b"))),
            // ===== LISTS =====
            ("()", success(Value::List(vec![]))),
            ("(   )", success(nil())),
            ("(42)", success([42])),
            ("(1 2 3)", success([1, 2, 3])),
            (
                "(1 hello \"world\" #t)",
                success(vec![val(1), sym("hello"), val("world"), val(true)]),
            ),
            ("((1 2) (3 4))", success([[1, 2], [3, 4]])),
            ("(((1)))", success([val([val([val(1)])])])),
            ("( 1   2\t\n3 )", success([1, 2, 3])),
            (
                "(quote (1 2 3))",
                success(vec![sym("quote"), val([1, 2, 3])]),
            ),
            // ===== MULTIPLE TOP-LEVEL FORMS =====
            ("", Success(vec![])),
            ("   ", Success(vec![])),
            ("1 2", Success(vec![val(1), val(2)])),
            (
                "(define x 5) x",
                Success(vec![val(vec![sym("define"), sym("x"), val(5)]), sym("x")]),
            ),
            // ===== UNBALANCED PARENTHESES =====
            ("(1 2 3", SpecificError(ParseErrorKind::Incomplete)),
            ("((1 2)", SpecificError(ParseErrorKind::Incomplete)),
            ("(", SpecificError(ParseErrorKind::Incomplete)),
            (")", SpecificError(ParseErrorKind::InvalidSyntax)),
            ("1 2 3)", SpecificError(ParseErrorKind::InvalidSyntax)),
            ("(1 2))", SpecificError(ParseErrorKind::InvalidSyntax)),
            ("\"open", SpecificError(ParseErrorKind::Incomplete)),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_error_carries_found_token_and_context() {
        let err = parse_program("(+ 1 2)\n(car x))").unwrap_err();
        let Error::Syntax(parse_error) = err else {
            panic!("expected syntax error");
        };
        assert_eq!(parse_error.found.as_deref(), Some(")"));
        assert_eq!(parse_error.position, Some(15));
        assert!(parse_error.context.unwrap().contains("(car x))"));
    }

    #[test]
    fn test_parser_depth_limits() {
        let under_limit = format!(
            "{}x{}",
            "(".repeat(MAX_PARSE_DEPTH),
            ")".repeat(MAX_PARSE_DEPTH)
        );
        let over_limit = format!(
            "{}x{}",
            "(".repeat(MAX_PARSE_DEPTH + 1),
            ")".repeat(MAX_PARSE_DEPTH + 1)
        );

        assert!(parse_program(&under_limit).is_ok());
        run_parse_tests(vec![(
            over_limit.as_str(),
            SpecificError(ParseErrorKind::TooDeeplyNested),
        )]);
    }
}

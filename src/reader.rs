//! S-expression reader.
//!
//! Produces [`Value`] trees directly: lists, vectors, symbols and literals. Reader
//! shorthands expand to ordinary lists, `'x` to `(quote x)`, `` `x `` to
//! `(quasiquote x)` and `~x` to `(unquote x)`. Line comments start with `;`.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace1, one_of},
    combinator::{cut, opt, recognize, value},
    error::ErrorKind,
    multi::{many0, many0_count},
    sequence::{pair, preceded},
};

use crate::ast::{NumberType, SYMBOL_SPECIAL_CHARS, Symbol, Value, is_valid_symbol};
use crate::collections::Vector;
use crate::context::Position;
use crate::{MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// One top-level form together with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub value: Value,
    pub position: Position,
    /// The literal source text of the form
    pub text: String,
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c)
}

fn failure(input: &str, kind: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, kind))
}

/// Skip whitespace and `;` comments
fn ws(input: &str) -> IResult<&str, ()> {
    let comment = recognize(pair(char(';'), take_while(|c: char| c != '\n')));
    value((), many0_count(alt((multispace1, comment)))).parse(input)
}

/// Parse a number: optional sign, digits, optional fraction and exponent
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (rest, text) = recognize((
        opt(one_of("+-")),
        digit1,
        opt((char('.'), digit0)),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)?;

    // "1abc" is not a number followed by a symbol
    if rest.starts_with(is_symbol_char) {
        return Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Digit)));
    }

    match text.parse::<NumberType>() {
        Ok(n) => Ok((rest, Value::Number(n))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Float))),
    }
}

/// Parse a symbol, or one of the literal keywords `true`, `false` and `nil`
fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let (remaining, candidate) = take_while1(is_symbol_char).parse(input)?;

    let parsed = match candidate {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "nil" => Value::Nil,
        _ if is_valid_symbol(candidate) => Value::Symbol(Symbol::intern(candidate)),
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                ErrorKind::Alpha,
            )));
        }
    };
    Ok((remaining, parsed))
}

/// Parse a string literal. Once the opening quote is seen, errors are not
/// recoverable by trying other alternatives.
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::String(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(_) => return Err(failure(remaining, ErrorKind::Escaped)),
                    // Backslash at end of input
                    None => return Err(failure(char_iter.as_str(), ErrorKind::Char)),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            // End of input without the closing quote
            None => return Err(failure(remaining, ErrorKind::Char)),
        }
    }
}

/// Parse a bracketed sequence: `(...)` becomes a list, `[...]` a vector
fn parse_seq(input: &str, open: char, close: char, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char(open).parse(input)?;
    let (input, elements) = many0(preceded(ws, |i| parse_form(i, depth + 1))).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(char(close)).parse(input)?;

    let parsed = if open == '[' {
        Value::Vector(Vector::new(elements))
    } else {
        Value::list(elements)
    };
    Ok((input, parsed))
}

/// Parse a reader shorthand ('x, `x, ~x) into its two-element list
fn parse_prefixed(input: &str, depth: usize) -> IResult<&str, Value> {
    let (input, prefix) = one_of("'`~").parse(input)?;
    let (input, form) = cut(|i| parse_form(i, depth + 1)).parse(input)?;

    let head = match prefix {
        '\'' => "quote",
        '`' => "quasiquote",
        _ => "unquote",
    };
    Ok((input, Value::list(vec![Value::Symbol(Symbol::intern(head)), form])))
}

fn parse_form(input: &str, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(failure(input, ErrorKind::TooLarge));
    }
    alt((
        |i| parse_prefixed(i, depth),
        |i| parse_seq(i, '(', ')', depth),
        |i| parse_seq(i, '[', ']', depth),
        parse_number,
        parse_string,
        parse_symbol,
    ))
    .parse(input)
}

/// 1-based line and column of a byte offset
fn position_at(source: &str, offset: usize, filename: Option<&str>) -> Position {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    Position::new(filename, line, column)
}

/// Convert nom parsing errors to positioned, user-friendly errors
fn to_parse_error(
    source: &str,
    filename: Option<&str>,
    error: nom::Err<nom::error::Error<&str>>,
) -> ParseError {
    let e = match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => {
            return ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input");
        }
    };

    let offset = source.len().saturating_sub(e.input.len());
    let (kind, message) = match e.code {
        ErrorKind::TooLarge => (
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        ErrorKind::Escaped => (
            ParseErrorKind::InvalidSyntax,
            "Unknown escape sequence in string".to_owned(),
        ),
        _ if e.input.trim_start().is_empty() => (
            ParseErrorKind::Incomplete,
            "Unexpected end of input".to_owned(),
        ),
        _ => match e.input.chars().next() {
            Some(c @ (')' | ']')) => (ParseErrorKind::InvalidSyntax, format!("Unexpected '{c}'")),
            _ => {
                let near: String = e.input.chars().take(10).collect();
                (ParseErrorKind::InvalidSyntax, format!("Invalid syntax near '{near}'"))
            }
        },
    };

    ParseError::with_context(kind, message, source, offset).at(position_at(source, offset, filename))
}

/// Parse every top-level form in `source`.
pub fn parse_program(source: &str, filename: Option<&str>) -> Result<Vec<Form>, ParseError> {
    let mut forms = Vec::new();
    let mut rest = source;

    loop {
        let (after_ws, ()) = ws(rest).map_err(|e| to_parse_error(source, filename, e))?;
        if after_ws.is_empty() {
            return Ok(forms);
        }

        let start = source.len() - after_ws.len();
        let (remaining, value) =
            parse_form(after_ws, 0).map_err(|e| to_parse_error(source, filename, e))?;
        let end = source.len() - remaining.len();

        forms.push(Form {
            value,
            position: position_at(source, start, filename),
            text: source[start..end].to_owned(),
        });
        rest = remaining;
    }
}

/// Parse exactly one form, returning it with its position.
pub fn parse(source: &str, filename: Option<&str>) -> Result<(Value, Position), ParseError> {
    let mut forms = parse_program(source, filename)?.into_iter();
    match (forms.next(), forms.next()) {
        (Some(form), None) => Ok((form.value, form.position)),
        (None, _) => Err(ParseError::from_message(
            ParseErrorKind::Empty,
            "No expression found",
        )),
        (Some(_), Some(extra)) => Err(ParseError::from_message(
            ParseErrorKind::TrailingContent,
            format!("Unexpected input after expression: '{}'", extra.text),
        )
        .at(extra.position)),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val, vector};

    fn read(src: &str) -> Value {
        parse(src, None).unwrap().0
    }

    #[test]
    fn test_parse_atoms_data_driven() {
        let cases = vec![
            ("42", val(42)),
            ("-7", val(-7)),
            ("+3", val(3)),
            ("2.5", val(2.5)),
            ("1e3", val(1000)),
            ("-1.5e-1", val(-0.15)),
            ("true", val(true)),
            ("false", val(false)),
            ("nil", nil()),
            ("foo", sym("foo")),
            ("-", sym("-")),
            ("+", sym("+")),
            ("->x", sym("->x")),
            ("empty?", sym("empty?")),
            ("&", sym("&")),
            ("nil?", sym("nil?")),
            ("truthy", sym("truthy")),
            ("\"hello\"", val("hello")),
            ("\"\"", val("")),
            ("\"a\\nb\\t\\\"c\\\\\"", val("a\nb\t\"c\\")),
            ("\"multi\nline\"", val("multi\nline")),
        ];

        for (input, expected) in cases {
            assert_eq!(read(input), expected, "input: {input}");
        }
    }

    #[test]
    fn test_parse_compound_forms() {
        assert_eq!(read("(+ 1 2)"), val([sym("+"), val(1), val(2)]));
        assert_eq!(read("()"), Value::list(vec![]));
        assert_eq!(read("[]"), vector(Vec::<Value>::new()));
        assert_eq!(read("[1 [2] (3)]"), vector([val(1), vector([2]), val([3])]));
        assert_eq!(
            read("( fn  [x]\n  (* x x) )"),
            val([sym("fn"), vector([sym("x")]), val([sym("*"), sym("x"), sym("x")])])
        );
        assert_eq!(read("'x"), val([sym("quote"), sym("x")]));
        assert_eq!(read("`(a ~b)"), val([
            sym("quasiquote"),
            val([sym("a"), val([sym("unquote"), sym("b")])]),
        ]));
        assert_eq!(read("''x"), val([sym("quote"), val([sym("quote"), sym("x")])]));
        assert_eq!(read("(a;comment\nb)"), val([sym("a"), sym("b")]));
        assert_eq!(read("  ; leading comment\n 7 ; trailing"), val(7));
    }

    #[test]
    fn test_parse_program_positions_and_text() {
        let source = "(def x 1)\n; comment\n  (+ x\n     2)\n\"s\"";
        let forms = parse_program(source, Some("prog.lisp")).unwrap();

        assert_eq!(forms.len(), 3);
        assert_eq!(forms[0].text, "(def x 1)");
        assert_eq!(forms[0].position, Position::new(Some("prog.lisp"), 1, 1));
        assert_eq!(forms[1].text, "(+ x\n     2)");
        assert_eq!(forms[1].position, Position::new(Some("prog.lisp"), 3, 3));
        assert_eq!(forms[2].value, val("s"));
        assert_eq!(forms[2].position.line, 5);

        assert!(parse_program("", None).unwrap().is_empty());
        assert!(parse_program(" ; only a comment", None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors_data_driven() {
        let deep = "(".repeat(MAX_PARSE_DEPTH + 10);
        let cases: Vec<(&str, ParseErrorKind)> = vec![
            ("(1 2", ParseErrorKind::Incomplete),
            ("[1 (2 3)", ParseErrorKind::Incomplete),
            ("\"abc", ParseErrorKind::Incomplete),
            ("\"abc\\", ParseErrorKind::Incomplete),
            ("'", ParseErrorKind::Incomplete),
            ("(a\n  b\n", ParseErrorKind::Incomplete),
            (")", ParseErrorKind::InvalidSyntax),
            ("(1 2]", ParseErrorKind::InvalidSyntax),
            ("(1 @)", ParseErrorKind::InvalidSyntax),
            ("1abc", ParseErrorKind::InvalidSyntax),
            ("\"bad \\q escape\"", ParseErrorKind::InvalidSyntax),
            ("1 2", ParseErrorKind::TrailingContent),
            ("", ParseErrorKind::Empty),
            ("  ; nothing", ParseErrorKind::Empty),
            (deep.as_str(), ParseErrorKind::TooDeeplyNested),
        ];

        for (input, expected_kind) in cases {
            let err = parse(input, None).unwrap_err();
            assert_eq!(err.kind, expected_kind, "input: {input:?} gave {err}");
        }
    }

    #[test]
    fn test_parse_error_reports_position() {
        let err = parse("(ok)\n(bad ]", Some("f.lisp")).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidSyntax);
        assert_eq!(err.position, Some(Position::new(Some("f.lisp"), 2, 6)));
        assert_eq!(err.found.as_deref(), Some("]"));
        assert!(err.to_string().contains("at f.lisp:2:6"), "{err}");
    }
}

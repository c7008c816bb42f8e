use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, one_of},
    combinator::{map, map_res, opt, recognize, verify},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::error::{BayesError, Result};
use crate::model::Value;

// --- LITERALS ---

fn parse_quoted_string(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, Value::Str(content.to_string())))
}

fn parse_hex_bytes(input: &str) -> IResult<&str, Value> {
    map_res(
        preceded(tag_no_case("0x"), take_while(|c: char| c.is_ascii_hexdigit())),
            |digits: &str| decode_hex(digits).map(Value::Bytes),
    )(input)
}

fn parse_number(input: &str) -> IResult<&str, Value> {
    let (input, text) = recognize(tuple((
        opt(char('-')),
                                         digit1,
                                         opt(pair(char('.'), digit1)),
                                         opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let (rest, suffix) = opt(alt((
        tag("i8"), tag("i16"), tag("i32"), tag("i64"),
        tag("u8"), tag("u16"), tag("u32"), tag("u64"),
        tag("f32"), tag("f64"),
    )))(input)?;

    match number_value(text, suffix) {
        Some(value) => Ok((rest, value)),
        None => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))),
    }
}

// `true` / `false`, anything else word-like is a string.
fn parse_word(input: &str) -> IResult<&str, Value> {
    let word = verify(
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        |w: &str| w.starts_with(|c: char| c.is_alphabetic() || c == '_'),
    );

    map(word, |w: &str| match w {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Str(w.to_string()),
    })(input)
}

fn parse_literal(input: &str) -> IResult<&str, Value> {
    alt((parse_quoted_string, parse_hex_bytes, parse_number, parse_word))(input)
}

// --- HELPERS ---

fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn separator(input: &str) -> IResult<&str, &str> {
    alt((recognize(ws(char(','))), multispace1))(input)
}

fn parse_list(input: &str) -> IResult<&str, Vec<Value>> {
    separated_list0(separator, parse_literal)(input)
}

fn parse_bracketed(input: &str) -> IResult<&str, Vec<Value>> {
    delimited(ws(char('[')), parse_list, ws(char(']')))(input)
}

fn number_value(text: &str, suffix: Option<&str>) -> Option<Value> {
    let is_float = text.contains(|c: char| matches!(c, '.' | 'e' | 'E'));

    let value = match suffix {
        None if is_float => Value::F64(text.parse().ok()?),
        None => Value::I64(text.parse().ok()?),
        Some("f32") => Value::F32(text.parse().ok()?),
        Some("f64") => Value::F64(text.parse().ok()?),
        Some(_) if is_float => return None,
        Some("i8") => Value::I8(text.parse().ok()?),
        Some("i16") => Value::I16(text.parse().ok()?),
        Some("i32") => Value::I32(text.parse().ok()?),
        Some("i64") => Value::I64(text.parse().ok()?),
        Some("u8") => Value::U8(text.parse().ok()?),
        Some("u16") => Value::U16(text.parse().ok()?),
        Some("u32") => Value::U32(text.parse().ok()?),
        Some("u64") => Value::U64(text.parse().ok()?),
        Some(_) => return None,
    };
    Some(value)
}

fn decode_hex(digits: &str) -> std::result::Result<Vec<u8>, String> {
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", digits));
    }
    (0..digits.len())
    .step_by(2)
    .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|e| e.to_string()))
    .collect()
}

fn finish<T>(result: IResult<&str, T>) -> Result<T> {
    match result {
        Ok((remainder, out)) => {
            if !remainder.trim().is_empty() {
                return Err(BayesError::InvalidLiteral { reason: format!("Unexpected tokens at end: '{}'", clip(remainder)) });
            }
            Ok(out)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(BayesError::InvalidLiteral { reason: format!("Invalid syntax near: '{}'", clip(e.input)) })
        },
        Err(nom::Err::Incomplete(_)) => Err(BayesError::InvalidLiteral { reason: "Incomplete literal.".to_string() }),
    }
}

fn clip(input: &str) -> String {
    let head: String = input.chars().take(20).collect();
    if head.len() < input.len() { format!("{}...", head) } else { head }
}

/// Parses a single literal such as `42u8`, `"text"` or `0xbeef`.
pub fn parse_value(input: &str) -> Result<Value> {
    finish(parse_literal(input.trim()))
}

/// Parses a sequence of literals separated by commas and/or whitespace,
/// optionally wrapped in `[...]`.
pub fn parse_sequence(input: &str) -> Result<Vec<Value>> {
    finish(alt((parse_bracketed, parse_list))(input.trim()))
}

use chrono::{NaiveDate, NaiveDateTime};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use regex::Regex;
use std::rc::Rc;

use crate::value::Value;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

const NUMERALS: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Parse a term that carries its own value: a numeric literal in the
/// current input radix (with hex/octal/binary spellings in radix 10), a
/// date-time-like token, or a quoted string.
///
/// `Ok(None)` means the term is not literal-shaped at all and classification
/// should continue; `Err` means it started like a literal but is malformed.
pub fn parse_input_value(term: &str, radix: u32) -> Result<Option<Value>, ParseError> {
    if term.is_empty() {
        return Ok(None);
    }

    if let Some(quoted) = term.strip_prefix('"') {
        let text = quoted.strip_suffix('"').unwrap_or(quoted);
        return Ok(Some(Value::String(Rc::new(text.to_string()))));
    }

    if looks_like_datetime(term) {
        return parse_datetime(term).map(Some);
    }

    // A leading backslash forces plain-number interpretation, turning off
    // the hex/octal/binary spellings
    let (term, ignore_special) = match term.strip_prefix('\\') {
        Some(rest) => (rest, true),
        None => (term, false),
    };

    // Embedded commas are digit grouping and carry no meaning
    let term: String = term.chars().filter(|c| *c != ',').collect();

    let (body, negative) = match term.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (term.strip_prefix('+').unwrap_or(term.as_str()), false),
    };

    if !number_shaped(body, radix) {
        return Ok(None);
    }

    // Imaginary suffix makes a pure imaginary number
    if let Some(imaginary) = body
        .strip_suffix(['i', 'j'])
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
    {
        let magnitude: f64 = imaginary
            .parse()
            .map_err(|_| ParseError::new(format!("unable to parse imaginary value '{body}'")))?;
        let magnitude = if negative { -magnitude } else { magnitude };
        return Ok(Some(Value::complex(0.0, magnitude)));
    }

    if !ignore_special && radix == 10 {
        if let Some(special) = parse_special_radix(body, negative)? {
            return Ok(Some(special));
        }
    }

    if body.contains('.') || (radix == 10 && body.contains(['e', 'E'])) {
        if radix == 10 {
            let value: f64 = body
                .parse()
                .map_err(|_| ParseError::new(format!("unable to parse value '{body}'")))?;
            return Ok(Some(Value::decimal(if negative { -value } else { value })));
        }

        let decimal = body.find('.').unwrap_or(body.len());
        let integer = &body[..decimal];
        let mantissa = body.get(decimal + 1..).unwrap_or("");
        let value = convert_to_base10(integer, mantissa, radix)?;
        return Ok(Some(Value::decimal(if negative { -value } else { value })));
    }

    let digits = body.to_ascii_lowercase();
    let magnitude = BigInt::parse_bytes(digits.as_bytes(), radix)
        .ok_or_else(|| invalid_numeral(&digits, radix))?;
    let value = if negative { -magnitude } else { magnitude };
    Ok(Some(Value::Integer(value)))
}

/// The hex `0x`, binary trailing-`b`, and leading-zero octal spellings,
/// recognized only for whole numbers in input radix 10.
fn parse_special_radix(body: &str, negative: bool) -> Result<Option<Value>, ParseError> {
    let apply_sign = |magnitude: BigInt| if negative { -magnitude } else { magnitude };

    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        let magnitude = BigInt::parse_bytes(hex.to_ascii_lowercase().as_bytes(), 16)
            .ok_or_else(|| invalid_numeral(&hex.to_ascii_lowercase(), 16))?;
        return Ok(Some(Value::Integer(apply_sign(magnitude))));
    }

    if let Some(bits) = body.strip_suffix(['b', 'B']) {
        if !bits.is_empty() && bits.chars().all(|c| c == '0' || c == '1') {
            let magnitude =
                BigInt::parse_bytes(bits.as_bytes(), 2).ok_or_else(|| invalid_numeral(bits, 2))?;
            return Ok(Some(Value::Integer(apply_sign(magnitude))));
        }
        return Ok(None);
    }

    if body.len() > 1 && body.starts_with('0') && body.chars().all(|c| c.is_ascii_digit()) {
        let octal = &body[1..];
        let magnitude =
            BigInt::parse_bytes(octal.as_bytes(), 8).ok_or_else(|| invalid_numeral(octal, 8))?;
        return Ok(Some(Value::Integer(apply_sign(magnitude))));
    }

    Ok(None)
}

fn convert_to_base10(integer: &str, mantissa: &str, radix: u32) -> Result<f64, ParseError> {
    let valid = &NUMERALS[..radix as usize];

    let mut result = BigInt::zero();
    for c in integer.chars() {
        let digit = valid
            .find(c.to_ascii_lowercase())
            .ok_or_else(|| invalid_numeral(integer, radix))?;
        result = result * radix + digit;
    }
    let mut value = result.to_f64().unwrap_or(f64::INFINITY);

    let mut base = 1.0 / radix as f64;
    for c in mantissa.chars() {
        let digit = valid
            .find(c.to_ascii_lowercase())
            .ok_or_else(|| invalid_numeral(mantissa, radix))?;
        value += digit as f64 * base;
        base /= radix as f64;
    }

    Ok(value)
}

fn invalid_numeral(digits: &str, radix: u32) -> ParseError {
    let valid = &NUMERALS[..radix as usize];
    let culprit = digits
        .chars()
        .find(|c| !valid.contains(c.to_ascii_lowercase()))
        .unwrap_or('?');
    ParseError::new(format!("invalid numeral '{culprit}' for base {radix}"))
}

/// In radix 10, terms that begin with a digit (or a decimal point) are
/// number-shaped and anything else is a keyword candidate. In other
/// radices any all-valid-digit spelling counts, so hex `ff` still parses —
/// operator names take precedence because classification tries them first.
fn number_shaped(body: &str, radix: u32) -> bool {
    if body.is_empty() {
        return false;
    }
    if radix == 10 {
        let leading = body.chars().next().expect("non-empty");
        return (leading.is_ascii_digit() || leading == '.')
            && body.chars().any(|c| c.is_ascii_digit())
            && body.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
    }
    let valid = &NUMERALS[..radix as usize];
    body.chars()
        .all(|c| c == '.' || valid.contains(c.to_ascii_lowercase()))
        && body.chars().any(|c| c != '.')
}

fn looks_like_datetime(term: &str) -> bool {
    // 'e' would mean scientific notation, which is never a date
    if term.contains(['e', 'E']) {
        return false;
    }
    let shape =
        Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}(T\d{1,2}:\d{2}(:\d{2})?)?$").expect("valid regex");
    shape.is_match(term)
}

fn parse_datetime(term: &str) -> Result<Value, ParseError> {
    let (date_part, time_part) = match term.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (term, None),
    };

    let date = parse_date_fields(date_part)?;

    let datetime = match time_part {
        None => date.and_hms_opt(0, 0, 0),
        Some(time) => {
            let fields: Vec<&str> = time.split(':').collect();
            let hour = parse_time_field(fields.first(), term)?;
            let minute = parse_time_field(fields.get(1), term)?;
            let second = if fields.len() > 2 {
                parse_time_field(fields.get(2), term)?
            } else {
                0
            };
            date.and_hms_opt(hour, minute, second)
        }
    };

    datetime
        .map(Value::DateTime)
        .ok_or_else(|| ParseError::new(format!("unable to parse date-time '{term}'")))
}

fn parse_date_fields(date: &str) -> Result<NaiveDate, ParseError> {
    let fields: Vec<&str> = date.split('-').collect();
    let [year, month, day] = fields[..] else {
        return Err(ParseError::new(format!("unable to parse date-time '{date}'")));
    };
    let parse = |field: &str| {
        field
            .parse::<u32>()
            .map_err(|_| ParseError::new(format!("unable to parse date-time '{date}'")))
    };
    NaiveDate::from_ymd_opt(parse(year)? as i32, parse(month)?, parse(day)?)
        .ok_or_else(|| ParseError::new(format!("invalid calendar date '{date}'")))
}

fn parse_time_field(field: Option<&&str>, term: &str) -> Result<u32, ParseError> {
    field
        .and_then(|f| f.parse::<u32>().ok())
        .ok_or_else(|| ParseError::new(format!("unable to parse date-time '{term}'")))
}

/// Builds midnight on the given calendar day; used by the date operators.
pub fn build_datetime(year: i32, month: u32, day: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day).and_then(|d| d.and_hms_opt(0, 0, 0))
}

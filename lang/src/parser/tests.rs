use super::*;
use crate::value::Value;

fn parse(term: &str) -> Option<Value> {
    parse_input_value(term, 10).unwrap()
}

#[test]
fn decimal_integers() {
    assert_eq!(parse("42"), Some(Value::integer(42)));
    assert_eq!(parse("-17"), Some(Value::integer(-17)));
    assert_eq!(parse("+9"), Some(Value::integer(9)));
    assert_eq!(parse("0"), Some(Value::integer(0)));
}

#[test]
fn arbitrary_precision_integers() {
    let huge = "123456789012345678901234567890123456789";
    match parse(huge) {
        Some(Value::Integer(n)) => assert_eq!(n.to_string(), huge),
        other => panic!("expected an integer, got {other:?}"),
    }
}

#[test]
fn embedded_commas_are_grouping() {
    assert_eq!(parse("1,234,567"), Some(Value::integer(1_234_567)));
}

#[test]
fn decimal_fractions_and_scientific_notation() {
    assert_eq!(parse("2.5"), Some(Value::decimal(2.5)));
    assert_eq!(parse("-0.125"), Some(Value::decimal(-0.125)));
    assert_eq!(parse(".5"), Some(Value::decimal(0.5)));
    assert_eq!(parse("2e3"), Some(Value::decimal(2000.0)));
    assert_eq!(parse("1.5e-2"), Some(Value::decimal(0.015)));
}

#[test]
fn hex_octal_and_binary_spellings() {
    assert_eq!(parse("0x1f"), Some(Value::integer(31)));
    assert_eq!(parse("0X1F"), Some(Value::integer(31)));
    assert_eq!(parse("017"), Some(Value::integer(15)));
    assert_eq!(parse("101b"), Some(Value::integer(5)));
    assert_eq!(parse("-1010b"), Some(Value::integer(-10)));
}

#[test]
fn backslash_escapes_special_spellings() {
    // leading zero normally means octal; the escape forces plain decimal
    assert_eq!(parse("\\017"), Some(Value::integer(17)));
}

#[test]
fn imaginary_suffix() {
    assert_eq!(parse("3i"), Some(Value::complex(0.0, 3.0)));
    assert_eq!(parse("2.5j"), Some(Value::complex(0.0, 2.5)));
    assert_eq!(parse("-4i"), Some(Value::complex(0.0, -4.0)));
}

#[test]
fn quoted_strings() {
    assert_eq!(parse("\"hello\""), Some(Value::string("hello")));
    assert_eq!(parse("\"two words\""), Some(Value::string("two words")));
}

#[test]
fn datetime_tokens() {
    match parse("2024-03-15") {
        Some(Value::DateTime(dt)) => {
            assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-03-15");
        }
        other => panic!("expected a date-time, got {other:?}"),
    }
    match parse("2024-03-15T10:30:45") {
        Some(Value::DateTime(dt)) => {
            assert_eq!(dt.format("%H:%M:%S").to_string(), "10:30:45");
        }
        other => panic!("expected a date-time, got {other:?}"),
    }
}

#[test]
fn invalid_calendar_dates_are_errors() {
    let err = parse_input_value("2024-13-40", 10).unwrap_err();
    assert!(err.message.contains("2024-13-40"));
}

#[test]
fn scientific_notation_is_never_a_date() {
    assert_eq!(parse("1e5"), Some(Value::decimal(100000.0)));
}

#[test]
fn keywords_are_not_literals() {
    assert_eq!(parse("add"), None);
    assert_eq!(parse("sqrt"), None);
    assert_eq!(parse(""), None);
    assert_eq!(parse("$limit"), None);
    assert_eq!(parse("@double"), None);
}

#[test]
fn malformed_numerals_are_errors() {
    let err = parse_input_value("12z4", 10).unwrap_err();
    assert!(err.message.contains("invalid numeral 'z' for base 10"));
}

#[test]
fn non_decimal_radix_integers() {
    assert_eq!(parse_input_value("ff", 16).unwrap(), Some(Value::integer(255)));
    assert_eq!(parse_input_value("101", 2).unwrap(), Some(Value::integer(5)));
    assert_eq!(parse_input_value("zz", 36).unwrap(), Some(Value::integer(1295)));
}

#[test]
fn non_decimal_radix_fractions() {
    // 1.1 in base 2 is decimal 1.5
    assert_eq!(parse_input_value("1.1", 2).unwrap(), Some(Value::decimal(1.5)));
}

#[test]
fn operator_names_stay_keywords_in_any_radix() {
    // 'add' is all hex digits, but classification checks operators first;
    // the parser itself still accepts it as base-16
    assert_eq!(
        parse_input_value("add", 16).unwrap(),
        Some(Value::integer(0xadd))
    );
}

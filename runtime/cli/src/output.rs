//! Result and error formatting for the CLI: human-readable text and a
//! machine-readable JSON mode.

use lang::evaluator::EvalError;
use lang::value::Value;
use lang::CalcError;
use serde::Serialize;

/// JSON output for a completed evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct JsonResultOutput {
    #[serde(rename = "type")]
    pub output_type: &'static str,
    pub status: &'static str,
    pub values: Vec<String>,
}

/// JSON output for a failed evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct JsonErrorOutput {
    #[serde(rename = "type")]
    pub output_type: &'static str,
    pub message: String,
}

pub fn format_results_json(values: &[Value], precision: usize) -> Result<String, EvalError> {
    let mut rendered = Vec::with_capacity(values.len());
    for value in values {
        rendered.push(render_value(value, precision)?);
    }
    let output = JsonResultOutput {
        output_type: "result",
        status: "complete",
        values: rendered,
    };
    Ok(serde_json::to_string(&output).expect("result serializes"))
}

pub fn format_error_json(error: &CalcError) -> String {
    let output = JsonErrorOutput {
        output_type: "error",
        message: error.to_string(),
    };
    serde_json::to_string(&output).expect("error serializes")
}

/// One line of text output: a single leftover value prints bare, anything
/// else prints as a list.
pub fn format_results_text(values: &[Value], precision: usize) -> Result<String, EvalError> {
    match values {
        [single] => render_value(single, precision),
        many => {
            let mut rendered = Vec::with_capacity(many.len());
            for value in many {
                rendered.push(render_value(value, precision)?);
            }
            Ok(format!("[ {} ]", rendered.join(", ")))
        }
    }
}

/// Render a value for output. Sequences are walked to the end here — this
/// is the point where lazy production is finally paid for.
pub fn render_value(value: &Value, precision: usize) -> Result<String, EvalError> {
    match value {
        Value::Decimal(n) => Ok(format_decimal(n.0, precision)),
        Value::Complex { re, im } => {
            let (re, im) = (re.0, im.0);
            if im >= 0.0 {
                Ok(format!(
                    "({} + {}i)",
                    format_decimal(re, precision),
                    format_decimal(im, precision)
                ))
            } else {
                Ok(format!(
                    "({} - {}i)",
                    format_decimal(re, precision),
                    format_decimal(-im, precision)
                ))
            }
        }
        Value::List(elements) => {
            let mut rendered = Vec::with_capacity(elements.len());
            for element in elements {
                rendered.push(render_value(element, precision)?);
            }
            Ok(format!("[ {} ]", rendered.join(", ")))
        }
        Value::Sequence(handle) => {
            let elements = handle.borrow_mut().materialize()?;
            let mut rendered = Vec::with_capacity(elements.len());
            for element in &elements {
                rendered.push(render_value(element, precision)?);
            }
            Ok(format!("[ {} ]", rendered.join(", ")))
        }
        Value::Measurement(m) => Ok(format!(
            "{} {}",
            render_value(&m.value, precision)?,
            m.unit
        )),
        other => Ok(other.to_string()),
    }
}

/// Cap a decimal at `precision` fractional digits, trimming trailing
/// zeros; whole values print as integers.
fn format_decimal(value: f64, precision: usize) -> String {
    if value.is_infinite() || value.is_nan() {
        return value.to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let fixed = format!("{value:.precision$}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_decimals_print_as_integers() {
        assert_eq!(format_decimal(30.0, 12), "30");
        assert_eq!(format_decimal(-4.0, 12), "-4");
    }

    #[test]
    fn decimals_trim_trailing_zeros() {
        assert_eq!(format_decimal(2.5, 12), "2.5");
        assert_eq!(format_decimal(1.0 / 3.0, 6), "0.333333");
    }

    #[test]
    fn single_value_prints_bare() {
        let line = format_results_text(&[Value::integer(42)], 12).unwrap();
        assert_eq!(line, "42");
    }

    #[test]
    fn multiple_values_print_as_list() {
        let values = [Value::integer(1), Value::integer(2), Value::integer(30)];
        let line = format_results_text(&values, 12).unwrap();
        assert_eq!(line, "[ 1, 2, 30 ]");
    }

    #[test]
    fn json_result_shape() {
        let json = format_results_json(&[Value::integer(9)], 12).unwrap();
        assert!(json.contains("\"type\":\"result\""));
        assert!(json.contains("\"values\":[\"9\"]"));
    }
}

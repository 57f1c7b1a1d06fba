//! Simple (broadcast) operator implementations. Every callable receives
//! scalar operands — broadcast over lists and sequences has already
//! happened by the time these run.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};

use crate::evaluator::{EvalError, OpContext};
use crate::units;
use crate::value::{LazySequence, Measurement, Value};

// ============================================================================
// Arithmetic
// ============================================================================

pub fn op_add(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    add_values(ctx, &args[0], &args[1])
}

pub fn add_values(_ctx: &mut OpContext, a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x + y)),
        (Value::Measurement(m), Value::Measurement(n)) if m.unit == n.unit => {
            let value = add_numbers(&m.value, &n.value)
                .ok_or_else(|| cannot("add", a, b))?;
            Ok(Value::Measurement(Measurement::new(value, m.unit.clone())))
        }
        (Value::DateTime(dt), Value::Measurement(m)) | (Value::Measurement(m), Value::DateTime(dt)) => {
            shift_datetime(*dt, m, 1.0)
        }
        _ => {
            if let Some(value) =
                complex_pair(a, b, complex_add).or_else(|| numeric_pair(a, b, |x, y| x + y))
            {
                Ok(value)
            } else {
                Err(cannot("add", a, b))
            }
        }
    }
}

pub fn op_subtract(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let (a, b) = (&args[0], &args[1]);
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x - y)),
        (Value::Measurement(m), Value::Measurement(n)) if m.unit == n.unit => {
            let value = sub_numbers(&m.value, &n.value)
                .ok_or_else(|| cannot("subtract", a, b))?;
            Ok(Value::Measurement(Measurement::new(value, m.unit.clone())))
        }
        (Value::DateTime(dt), Value::Measurement(m)) => shift_datetime(*dt, m, -1.0),
        (Value::DateTime(end), Value::DateTime(start)) => {
            let seconds = (*end - *start).num_seconds() as f64;
            Ok(Value::Measurement(Measurement::new(
                Value::decimal(seconds),
                "seconds",
            )))
        }
        _ => {
            if let Some(value) =
                complex_pair(a, b, complex_sub).or_else(|| numeric_pair(a, b, |x, y| x - y))
            {
                Ok(value)
            } else {
                Err(cannot("subtract", a, b))
            }
        }
    }
}

pub fn op_multiply(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    multiply_values(ctx, &args[0], &args[1])
}

pub fn multiply_values(_ctx: &mut OpContext, a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x * y)),
        (Value::Measurement(m), other) | (other, Value::Measurement(m)) if other.is_number() => {
            let value = mul_numbers(&m.value, other).ok_or_else(|| cannot("multiply", a, b))?;
            Ok(Value::Measurement(Measurement::new(value, m.unit.clone())))
        }
        _ => {
            if let Some(value) =
                complex_pair(a, b, complex_mul).or_else(|| numeric_pair(a, b, |x, y| x * y))
            {
                Ok(value)
            } else {
                Err(cannot("multiply", a, b))
            }
        }
    }
}

pub fn op_divide(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let (a, b) = (&args[0], &args[1]);
    if !b.is_nonzero() && b.is_number() {
        return Err(EvalError::message("division by zero"));
    }
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => {
            if (x % y).is_zero() {
                Ok(Value::Integer(x / y))
            } else {
                Ok(Value::decimal(
                    x.to_f64().unwrap_or(f64::NAN) / y.to_f64().unwrap_or(f64::NAN),
                ))
            }
        }
        (Value::Measurement(m), other) if other.is_number() => {
            let value = div_numbers(&m.value, other).ok_or_else(|| cannot("divide", a, b))?;
            Ok(Value::Measurement(Measurement::new(value, m.unit.clone())))
        }
        _ => {
            if let Some(value) =
                complex_pair(a, b, complex_div).or_else(|| numeric_pair(a, b, |x, y| x / y))
            {
                Ok(value)
            } else {
                Err(cannot("divide", a, b))
            }
        }
    }
}

pub fn op_power(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    power_values(ctx, &args[0], &args[1])
}

pub fn power_values(_ctx: &mut OpContext, a: &Value, b: &Value) -> Result<Value, EvalError> {
    if let (Value::Integer(base), Value::Integer(exponent)) = (a, b) {
        if !exponent.is_negative() {
            if let Some(exponent) = exponent.to_u32() {
                return Ok(Value::Integer(base.pow(exponent)));
            }
            return Err(EvalError::message("exponent too large"));
        }
    }

    let (base, exponent) = match (a.to_f64(), b.to_f64()) {
        (Some(base), Some(exponent)) => (base, exponent),
        _ => {
            if let Some(value) = complex_pair(a, b, complex_pow) {
                return Ok(value);
            }
            return Err(cannot("raise", a, b));
        }
    };

    // a negative real to a fractional power leaves the real line
    if base < 0.0 && exponent.fract() != 0.0 {
        let (re, im) = complex_pow((base, 0.0), (exponent, 0.0));
        return Ok(Value::complex(re, im));
    }

    Ok(Value::decimal(base.powf(exponent)))
}

pub fn op_modulo(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let (a, b) = (&args[0], &args[1]);
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => {
            if y.is_zero() {
                return Err(EvalError::message("modulo by zero"));
            }
            // floored modulo, same sign as the divisor
            let rem = x % y;
            let rem = if !rem.is_zero() && (rem.is_negative() != y.is_negative()) {
                rem + y
            } else {
                rem
            };
            Ok(Value::Integer(rem))
        }
        _ => match (a.to_f64(), b.to_f64()) {
            (Some(x), Some(y)) => {
                if y == 0.0 {
                    return Err(EvalError::message("modulo by zero"));
                }
                let rem = x % y;
                let rem = if rem != 0.0 && (rem < 0.0) != (y < 0.0) {
                    rem + y
                } else {
                    rem
                };
                Ok(Value::decimal(rem))
            }
            _ => Err(cannot("compute modulo of", a, b)),
        },
    }
}

pub fn op_square(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    multiply_values(ctx, &args[0], &args[0])
}

pub fn op_root(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    match &args[0] {
        Value::Complex { re, im } => {
            let (re, im) = complex_pow((re.0, im.0), (0.5, 0.0));
            Ok(Value::complex(re, im))
        }
        value => {
            let x = value
                .to_f64()
                .ok_or_else(|| cannot_unary("take the square root of", value))?;
            if x < 0.0 {
                Ok(Value::complex(0.0, (-x).sqrt()))
            } else {
                Ok(Value::decimal(x.sqrt()))
            }
        }
    }
}

pub fn op_nth_root(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let (a, b) = (&args[0], &args[1]);
    let x = a.to_f64().ok_or_else(|| cannot("take the root of", a, b))?;
    let n = b.to_f64().ok_or_else(|| cannot("take the root of", a, b))?;
    if n == 0.0 {
        return Err(EvalError::message("zeroth root is undefined"));
    }

    if x < 0.0 {
        // odd integer roots of negatives stay real
        if n.fract() == 0.0 && (n as i64) % 2 != 0 {
            return Ok(Value::decimal(-(-x).powf(1.0 / n)));
        }
        let (re, im) = complex_pow((x, 0.0), (1.0 / n, 0.0));
        return Ok(Value::complex(re, im));
    }

    Ok(Value::decimal(x.powf(1.0 / n)))
}

pub fn op_negative(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    match &args[0] {
        Value::Integer(n) => Ok(Value::Integer(-n)),
        Value::Decimal(n) => Ok(Value::decimal(-n.0)),
        Value::Complex { re, im } => Ok(Value::complex(-re.0, -im.0)),
        Value::Measurement(m) => {
            let value = match &*m.value {
                Value::Integer(n) => Value::Integer(-n),
                Value::Decimal(n) => Value::decimal(-n.0),
                other => return Err(cannot_unary("negate", other)),
            };
            Ok(Value::Measurement(Measurement::new(value, m.unit.clone())))
        }
        value => Err(cannot_unary("negate", value)),
    }
}

pub fn op_absolute_value(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    match &args[0] {
        Value::Integer(n) => Ok(Value::Integer(n.abs())),
        Value::Decimal(n) => Ok(Value::decimal(n.0.abs())),
        Value::Complex { re, im } => Ok(Value::decimal(re.0.hypot(im.0))),
        value => Err(cannot_unary("take the absolute value of", value)),
    }
}

pub fn op_reciprocal(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    op_divide(ctx, &[Value::integer(1), args[0].clone()])
}

pub fn op_floor(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    round_with(&args[0], f64::floor)
}

pub fn op_ceiling(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    round_with(&args[0], f64::ceil)
}

pub fn op_nearest_int(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    round_with(&args[0], f64::round)
}

fn round_with(value: &Value, round: fn(f64) -> f64) -> Result<Value, EvalError> {
    match value {
        Value::Integer(n) => Ok(Value::Integer(n.clone())),
        Value::Decimal(n) => BigInt::from_f64(round(n.0))
            .map(Value::Integer)
            .ok_or_else(|| cannot_unary("round", value)),
        _ => Err(cannot_unary("round", value)),
    }
}

pub fn op_sign(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let x = args[0]
        .to_f64()
        .ok_or_else(|| cannot_unary("take the sign of", &args[0]))?;
    Ok(Value::integer(if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }))
}

pub fn op_factorial(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let n = args[0]
        .to_usize()
        .ok_or_else(|| EvalError::message("'factorial' requires a non-negative integer"))?;
    let mut result = BigInt::one();
    for i in 2..=n {
        result *= i;
    }
    Ok(Value::Integer(result))
}

/// Memoized through the cache collaborator: earlier results for the same
/// argument are returned without recomputing.
pub fn op_fibonacci(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let n = args[0]
        .to_usize()
        .ok_or_else(|| EvalError::message("'fibonacci' requires a non-negative integer"))?;

    if let Some(cached) = ctx.state.cache.borrow().get("fibonacci", &args[..1]) {
        return Ok(cached);
    }

    let mut previous = BigInt::zero();
    let mut current = BigInt::one();
    for _ in 0..n {
        let next = &previous + &current;
        previous = std::mem::replace(&mut current, next);
    }
    let result = Value::Integer(previous);

    ctx.state
        .cache
        .borrow_mut()
        .put("fibonacci", &args[..1], result.clone());
    Ok(result)
}

pub fn op_ln(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    logarithm(&args[0], std::f64::consts::E)
}

pub fn op_log10(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    logarithm(&args[0], 10.0)
}

fn logarithm(value: &Value, base: f64) -> Result<Value, EvalError> {
    let x = value
        .to_f64()
        .ok_or_else(|| cannot_unary("take the logarithm of", value))?;
    if x == 0.0 {
        return Err(EvalError::message("logarithm of zero"));
    }
    if x < 0.0 {
        // ln(-x) = ln|x| + iπ, scaled by the requested base
        let scale = base.ln();
        return Ok(Value::complex(
            (-x).ln() / scale,
            std::f64::consts::PI / scale,
        ));
    }
    Ok(Value::decimal(x.ln() / base.ln()))
}

pub fn op_exponential(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    match &args[0] {
        Value::Complex { re, im } => {
            let magnitude = re.0.exp();
            Ok(Value::complex(
                magnitude * im.0.cos(),
                magnitude * im.0.sin(),
            ))
        }
        value => {
            let x = value
                .to_f64()
                .ok_or_else(|| cannot_unary("exponentiate", value))?;
            Ok(Value::decimal(x.exp()))
        }
    }
}

// ============================================================================
// Comparisons
// ============================================================================

pub fn op_is_equal(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::integer(i64::from(args[0] == args[1])))
}

pub fn op_is_greater(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    compare_order(&args[0], &args[1]).map(|ordering| Value::integer(i64::from(ordering.is_gt())))
}

pub fn op_is_less(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    compare_order(&args[0], &args[1]).map(|ordering| Value::integer(i64::from(ordering.is_lt())))
}

pub fn compare_order(a: &Value, b: &Value) -> Result<std::cmp::Ordering, EvalError> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Ok(x.cmp(y)),
        _ => match (a.to_f64(), b.to_f64()) {
            (Some(x), Some(y)) => x
                .partial_cmp(&y)
                .ok_or_else(|| cannot("compare", a, b)),
            _ => Err(cannot("compare", a, b)),
        },
    }
}

// ============================================================================
// Sequence builders
// ============================================================================

pub fn op_range(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let step = Value::integer(1);
    LazySequence::create_range(&args[0], &args[1], &step).map(Value::sequence)
}

pub fn op_interval_range(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    LazySequence::create_range(&args[0], &args[1], &args[2]).map(Value::sequence)
}

pub fn op_geometric_range(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let count = progression_count(&args[2], "geometric_range")?;
    let factor = args[1].clone();
    let env = crate::evaluator::function::FunctionEnv::capture(ctx);
    let step = Box::new(move |current: &Value| {
        env.with_context(|ctx| multiply_values(ctx, current, &factor))
    });
    Ok(Value::sequence(LazySequence::create_unfold(
        args[0].clone(),
        step,
        count,
    )))
}

pub fn op_exponential_range(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let count = progression_count(&args[2], "exponential_range")?;
    let exponent = args[1].clone();
    let env = crate::evaluator::function::FunctionEnv::capture(ctx);
    let step = Box::new(move |current: &Value| {
        env.with_context(|ctx| power_values(ctx, current, &exponent))
    });
    Ok(Value::sequence(LazySequence::create_unfold(
        args[0].clone(),
        step,
        count,
    )))
}

fn progression_count(value: &Value, operator: &str) -> Result<u64, EvalError> {
    value
        .to_usize()
        .map(|count| count as u64)
        .ok_or_else(|| EvalError::message(format!("'{operator}' requires a non-negative count")))
}

// ============================================================================
// Dates
// ============================================================================

pub fn op_now(_ctx: &mut OpContext, _args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::DateTime(chrono::Local::now().naive_local()))
}

pub fn op_make_datetime(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let field = |value: &Value, name: &str| {
        value
            .to_bigint()
            .and_then(|n| n.to_i64())
            .ok_or_else(|| EvalError::message(format!("'make_datetime' requires an integer {name}")))
    };
    let year = field(&args[0], "year")?;
    let month = field(&args[1], "month")?;
    let day = field(&args[2], "day")?;

    crate::parser::build_datetime(year as i32, month as u32, day as u32)
        .map(Value::DateTime)
        .ok_or_else(|| {
            EvalError::message(format!("invalid calendar date {year}-{month}-{day}"))
        })
}

fn shift_datetime(
    dt: chrono::NaiveDateTime,
    m: &Measurement,
    direction: f64,
) -> Result<Value, EvalError> {
    let seconds_per_unit = units::unit_info(&m.unit)
        .and_then(|info| info.seconds)
        .ok_or_else(|| {
            EvalError::message(format!("'{}' is not a unit of time", m.unit))
        })?;
    let magnitude = m
        .value
        .to_f64()
        .ok_or_else(|| EvalError::message("measurement value is not numeric"))?;
    let delta = chrono::Duration::seconds((magnitude * seconds_per_unit * direction) as i64);
    Ok(Value::DateTime(dt + delta))
}

// ============================================================================
// Output side effects
// ============================================================================

/// Records the value for output ahead of the final results; the value
/// itself passes through unchanged.
pub fn op_echo(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    ctx.state.echo_arguments.push(args[0].clone());
    Ok(args[0].clone())
}

// ============================================================================
// User-function application
// ============================================================================

pub fn op_eval0(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    apply_function(ctx, &args[0], &[])
}

pub fn op_eval(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    apply_function(ctx, &args[1], &args[..1])
}

pub fn op_eval2(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    apply_function(ctx, &args[2], &args[..2])
}

pub fn op_eval3(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    apply_function(ctx, &args[3], &args[..3])
}

fn apply_function(ctx: &mut OpContext, func: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let Value::Function(func) = func else {
        return Err(EvalError::message("'eval' expects a function argument"));
    };
    let mut func = func
        .try_borrow_mut()
        .map_err(|_| EvalError::message("function is already being evaluated"))?;
    func.evaluate(ctx, args)
}

// ============================================================================
// Numeric helpers
// ============================================================================

fn numeric_pair(a: &Value, b: &Value, op: fn(f64, f64) -> f64) -> Option<Value> {
    match (a.to_f64(), b.to_f64()) {
        (Some(x), Some(y)) => Some(Value::decimal(op(x, y))),
        _ => None,
    }
}

/// Applies `op` in the complex plane when either side is complex.
fn complex_pair(
    a: &Value,
    b: &Value,
    op: fn((f64, f64), (f64, f64)) -> (f64, f64),
) -> Option<Value> {
    if !matches!(a, Value::Complex { .. }) && !matches!(b, Value::Complex { .. }) {
        return None;
    }
    let (re, im) = op(as_complex(a)?, as_complex(b)?);
    if im == 0.0 {
        Some(Value::decimal(re))
    } else {
        Some(Value::complex(re, im))
    }
}

fn as_complex(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Complex { re, im } => Some((re.0, im.0)),
        _ => value.to_f64().map(|x| (x, 0.0)),
    }
}

fn complex_add((ar, ai): (f64, f64), (br, bi): (f64, f64)) -> (f64, f64) {
    (ar + br, ai + bi)
}

fn complex_sub((ar, ai): (f64, f64), (br, bi): (f64, f64)) -> (f64, f64) {
    (ar - br, ai - bi)
}

fn complex_mul((ar, ai): (f64, f64), (br, bi): (f64, f64)) -> (f64, f64) {
    (ar * br - ai * bi, ar * bi + ai * br)
}

fn complex_div((ar, ai): (f64, f64), (br, bi): (f64, f64)) -> (f64, f64) {
    let denominator = br * br + bi * bi;
    (
        (ar * br + ai * bi) / denominator,
        (ai * br - ar * bi) / denominator,
    )
}

fn complex_pow((br, bi): (f64, f64), (er, ei): (f64, f64)) -> (f64, f64) {
    if br == 0.0 && bi == 0.0 {
        return (0.0, 0.0);
    }
    let magnitude = br.hypot(bi);
    let angle = bi.atan2(br);
    let log_re = magnitude.ln();
    // exp((er + i·ei) · (log_re + i·angle))
    let real = er * log_re - ei * angle;
    let imaginary = er * angle + ei * log_re;
    let scale = real.exp();
    (scale * imaginary.cos(), scale * imaginary.sin())
}

fn add_numbers(a: &Value, b: &Value) -> Option<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(Value::Integer(x + y)),
        _ => match (a.to_f64(), b.to_f64()) {
            (Some(x), Some(y)) => Some(Value::decimal(x + y)),
            _ => None,
        },
    }
}

fn sub_numbers(a: &Value, b: &Value) -> Option<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(Value::Integer(x - y)),
        _ => match (a.to_f64(), b.to_f64()) {
            (Some(x), Some(y)) => Some(Value::decimal(x - y)),
            _ => None,
        },
    }
}

fn mul_numbers(a: &Value, b: &Value) -> Option<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(Value::Integer(x * y)),
        _ => match (a.to_f64(), b.to_f64()) {
            (Some(x), Some(y)) => Some(Value::decimal(x * y)),
            _ => None,
        },
    }
}

fn div_numbers(a: &Value, b: &Value) -> Option<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) if !(y.is_zero()) && (x % y).is_zero() => {
            Some(Value::Integer(x / y))
        }
        _ => match (a.to_f64(), b.to_f64()) {
            (Some(x), Some(y)) => Some(Value::decimal(x / y)),
            _ => None,
        },
    }
}

fn cannot(verb: &str, a: &Value, b: &Value) -> EvalError {
    EvalError::message(format!(
        "cannot {verb} {} and {}",
        a.type_name(),
        b.type_name()
    ))
}

fn cannot_unary(verb: &str, value: &Value) -> EvalError {
    EvalError::message(format!("cannot {verb} {}", value.type_name()))
}

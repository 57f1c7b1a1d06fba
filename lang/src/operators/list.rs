//! List operator implementations. Arguments arrive pre-shaped per the
//! declared kinds: `List` slots hold a whole `Value::List`, `Generator`
//! slots hold a live `Value::Sequence`, `Function` slots hold the user
//! function untouched. Each operator decides for itself whether to recurse
//! into nested sublists.

use im_rc::Vector;
use num_bigint::BigInt;
use num_traits::Zero;
use std::rc::Rc;

use crate::evaluator::function::FunctionEnv;
use crate::evaluator::{EvalError, OpContext};
use crate::value::{LazySequence, Value};

use super::math;

fn expect_list<'a>(value: &'a Value, operator: &str) -> Result<&'a Vector<Value>, EvalError> {
    match value {
        Value::List(elements) => Ok(elements),
        other => Err(EvalError::message(format!(
            "'{operator}' expects a list, got {}",
            other.type_name()
        ))),
    }
}

fn expect_sequence(
    value: &Value,
    operator: &str,
) -> Result<Rc<std::cell::RefCell<LazySequence>>, EvalError> {
    match value {
        Value::Sequence(handle) => Ok(Rc::clone(handle)),
        other => Err(EvalError::message(format!(
            "'{operator}' expects a sequence, got {}",
            other.type_name()
        ))),
    }
}

fn expect_function(
    value: &Value,
    operator: &str,
) -> Result<Rc<std::cell::RefCell<crate::evaluator::function::UserFunction>>, EvalError> {
    match value {
        Value::Function(handle) => Ok(Rc::clone(handle)),
        _ => Err(EvalError::message(format!(
            "'{operator}' expects a function argument"
        ))),
    }
}

/// Whether an aggregation should recurse: a list whose first element is
/// itself a list aggregates per sublist.
fn is_nested(elements: &Vector<Value>) -> bool {
    matches!(elements.front(), Some(Value::List(_)))
}

// ============================================================================
// Aggregation
// ============================================================================

pub fn op_sum(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], "sum")?;
    if is_nested(elements) {
        return per_sublist(ctx, elements, op_sum);
    }
    let mut total = Value::Integer(BigInt::zero());
    for element in elements {
        total = math::add_values(ctx, &total, element)?;
    }
    Ok(total)
}

pub fn op_product(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], "product")?;
    if is_nested(elements) {
        return per_sublist(ctx, elements, op_product);
    }
    let mut total = Value::Integer(BigInt::from(1));
    for element in elements {
        total = math::multiply_values(ctx, &total, element)?;
    }
    Ok(total)
}

pub fn op_mean(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], "mean")?;
    if is_nested(elements) {
        return per_sublist(ctx, elements, op_mean);
    }
    if elements.is_empty() {
        return Err(EvalError::message("'mean' of an empty list"));
    }
    let total = op_sum(ctx, args)?;
    let count = Value::integer(elements.len() as i64);
    super::math::op_divide(ctx, &[total, count])
}

fn per_sublist(
    ctx: &mut OpContext,
    elements: &Vector<Value>,
    operator: fn(&mut OpContext, &[Value]) -> Result<Value, EvalError>,
) -> Result<Value, EvalError> {
    let mut results = Vector::new();
    for element in elements {
        results.push_back(operator(ctx, std::slice::from_ref(element))?);
    }
    Ok(Value::List(results))
}

pub fn op_minimum(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    extremum(ctx, args, "minimum", std::cmp::Ordering::Less)
}

pub fn op_maximum(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    extremum(ctx, args, "maximum", std::cmp::Ordering::Greater)
}

fn extremum(
    ctx: &mut OpContext,
    args: &[Value],
    operator: &str,
    keep: std::cmp::Ordering,
) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], operator)?;
    if is_nested(elements) {
        let op = if keep == std::cmp::Ordering::Less {
            op_minimum
        } else {
            op_maximum
        };
        return per_sublist(ctx, elements, op);
    }
    let mut iter = elements.iter();
    let mut best = iter
        .next()
        .cloned()
        .ok_or_else(|| EvalError::message(format!("'{operator}' of an empty list")))?;
    for element in iter {
        if math::compare_order(element, &best)? == keep {
            best = element.clone();
        }
    }
    Ok(best)
}

// ============================================================================
// Reordering
// ============================================================================

pub fn op_sort(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], "sort")?;
    let mut sorted: Vec<Value> = elements.iter().cloned().collect();
    let mut failed = None;
    sorted.sort_by(|a, b| match math::compare_order(a, b) {
        Ok(ordering) => ordering,
        Err(err) => {
            failed.get_or_insert(err);
            std::cmp::Ordering::Equal
        }
    });
    match failed {
        Some(err) => Err(err),
        None => Ok(Value::List(sorted.into_iter().collect())),
    }
}

pub fn op_reverse(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], "reverse")?;
    Ok(Value::List(elements.iter().rev().cloned().collect()))
}

pub fn op_unique(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], "unique")?;
    let mut seen: Vec<Value> = Vec::new();
    for element in elements {
        if !seen.contains(element) {
            seen.push(element.clone());
        }
    }
    Ok(Value::List(seen.into_iter().collect()))
}

pub fn op_flatten(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], "flatten")?;
    let mut flat = Vector::new();
    flatten_into(elements, &mut flat);
    Ok(Value::List(flat))
}

fn flatten_into(elements: &Vector<Value>, flat: &mut Vector<Value>) {
    for element in elements {
        match element {
            Value::List(inner) => flatten_into(inner, flat),
            other => flat.push_back(other.clone()),
        }
    }
}

// ============================================================================
// Slicing
// ============================================================================

pub fn op_left(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], "left")?;
    let n = slice_count(&args[1], "left")?;
    Ok(Value::List(elements.iter().take(n).cloned().collect()))
}

pub fn op_right(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let elements = expect_list(&args[0], "right")?;
    let n = slice_count(&args[1], "right")?;
    let skip = elements.len().saturating_sub(n);
    Ok(Value::List(elements.iter().skip(skip).cloned().collect()))
}

fn slice_count(value: &Value, operator: &str) -> Result<usize, EvalError> {
    value
        .to_usize()
        .ok_or_else(|| EvalError::message(format!("'{operator}' requires a non-negative count")))
}

pub fn op_interleave(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let a = expect_list(&args[0], "interleave")?;
    let b = expect_list(&args[1], "interleave")?;
    let mut result = Vector::new();
    for (x, y) in a.iter().zip(b.iter()) {
        result.push_back(x.clone());
        result.push_back(y.clone());
    }
    Ok(Value::List(result))
}

// ============================================================================
// Sequence consumers
// ============================================================================

pub fn op_count(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let handle = expect_sequence(&args[0], "count")?;
    let declared = handle.borrow().count();
    if let Some(count) = declared {
        return Ok(Value::integer(count as i64));
    }
    let mut count: i64 = 0;
    while handle.borrow_mut().next()?.is_some() {
        count += 1;
    }
    Ok(Value::integer(count))
}

pub fn op_element(_ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let handle = expect_sequence(&args[0], "element")?;
    let index = args[1]
        .to_usize()
        .ok_or_else(|| EvalError::message("'element' requires a non-negative index"))?;
    let element = handle.borrow_mut().nth(index as u64)?;
    element.ok_or_else(|| EvalError::message(format!("index {index} is out of range")))
}

// ============================================================================
// Function-driven sequence operators
// ============================================================================

pub fn op_filter(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    filtered(ctx, args, false)
}

pub fn op_unfilter(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    filtered(ctx, args, true)
}

fn filtered(ctx: &mut OpContext, args: &[Value], invert: bool) -> Result<Value, EvalError> {
    let operator = if invert { "unfilter" } else { "filter" };
    let source = expect_sequence(&args[0], operator)?;
    let func = expect_function(&args[1], operator)?;

    // compile up front so lazy pulls can't hit an unresolved reference
    func.borrow_mut().compile(ctx)?;
    let env = FunctionEnv::capture(ctx);

    let predicate = Box::new(move |value: &Value| {
        let kept = env.with_context(|ctx| {
            func.borrow_mut()
                .evaluate(ctx, std::slice::from_ref(value))
        })?;
        Ok(kept.is_nonzero())
    });
    Ok(Value::sequence(LazySequence::create_filter(
        source, predicate, invert,
    )))
}

/// Applies the function to each element of the sequence, lazily.
pub fn op_for_each_list(ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
    let source = expect_sequence(&args[0], "for_each_list")?;
    let func = expect_function(&args[1], "for_each_list")?;

    func.borrow_mut().compile(ctx)?;
    let env = FunctionEnv::capture(ctx);

    let map = Box::new(move |value: Value| {
        env.with_context(|ctx| func.borrow_mut().evaluate(ctx, &[value]))
    });
    Ok(Value::sequence(LazySequence::create_chained(source, map)))
}

//! Broadcast dispatch: the machinery that lets scalar operator callables
//! apply themselves across lists and lazily-produced sequences.
//!
//! Unary operators distribute recursively over list elements; binary and
//! wider operators zip positionally across every multi-element operand at
//! the shortest length, holding scalars fixed. A sequence operand feeding a
//! `Generator`-tagged slot is handed over whole; anywhere else it is walked
//! like a list.

use im_rc::Vector;
use std::cell::RefCell;
use std::rc::Rc;

use crate::operators::{ArgKind, OperatorDescriptor};
use crate::value::{LazySequence, Value};

use super::{EvalError, OpContext};

pub fn apply_simple(
    ctx: &mut OpContext,
    desc: &OperatorDescriptor,
    mut args: Vec<Value>,
) -> Result<Value, EvalError> {
    match desc.arity {
        0 => (desc.callable)(ctx, &[]),
        1 => {
            let arg = args.pop().expect("arity checked");
            apply_unary(ctx, desc, arg)
        }
        _ => apply_zip(ctx, desc, args),
    }
}

fn apply_unary(
    ctx: &mut OpContext,
    desc: &OperatorDescriptor,
    arg: Value,
) -> Result<Value, EvalError> {
    match arg {
        Value::List(elements) => {
            let mut results = Vector::new();
            for element in elements {
                results.push_back(apply_unary(ctx, desc, element)?);
            }
            Ok(Value::List(results))
        }
        Value::Sequence(handle) => {
            if desc.arg_kinds.first() == Some(&ArgKind::Generator) {
                (desc.callable)(ctx, &[Value::Sequence(handle)])
            } else {
                let elements = handle.borrow_mut().materialize()?;
                apply_unary(ctx, desc, Value::List(elements))
            }
        }
        scalar => (desc.callable)(ctx, std::slice::from_ref(&scalar)),
    }
}

/// One operand of a zip: either a fixed scalar or a stream of elements.
enum Operand {
    Scalar(Value),
    List(Vector<Value>, usize),
    Seq(Rc<RefCell<LazySequence>>),
}

impl Operand {
    fn next(&mut self) -> Result<Option<Value>, EvalError> {
        match self {
            Operand::Scalar(value) => Ok(Some(value.clone())),
            Operand::List(elements, position) => {
                let element = elements.get(*position).cloned();
                *position += 1;
                Ok(element)
            }
            Operand::Seq(handle) => handle.borrow_mut().next(),
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(self, Operand::Scalar(_))
    }
}

fn normalize(arg: Value, kind: ArgKind) -> Operand {
    if matches!(kind, ArgKind::Function | ArgKind::Generator) {
        return Operand::Scalar(arg);
    }
    match arg {
        // a one-element list stands in for its element
        Value::List(elements) if elements.len() == 1 => {
            normalize(elements.front().cloned().expect("one element"), kind)
        }
        Value::List(elements) => Operand::List(elements, 0),
        Value::Sequence(handle) => Operand::Seq(handle),
        scalar => Operand::Scalar(scalar),
    }
}

/// Positional zip across every non-scalar operand, truncating at the
/// shortest; recurses per position so nested lists broadcast all the way
/// down.
fn apply_zip(
    ctx: &mut OpContext,
    desc: &OperatorDescriptor,
    args: Vec<Value>,
) -> Result<Value, EvalError> {
    let mut operands: Vec<Operand> = args
        .into_iter()
        .zip(desc.arg_kinds.iter())
        .map(|(arg, kind)| normalize(arg, *kind))
        .collect();

    if operands.iter().all(Operand::is_scalar) {
        let scalars: Vec<Value> = operands
            .into_iter()
            .map(|operand| match operand {
                Operand::Scalar(value) => value,
                _ => unreachable!("all scalars"),
            })
            .collect();
        return (desc.callable)(ctx, &scalars);
    }

    let mut results = Vector::new();
    'positions: loop {
        let mut position_args = Vec::with_capacity(operands.len());
        for operand in &mut operands {
            match operand.next()? {
                Some(value) => position_args.push(value),
                None => break 'positions,
            }
        }
        results.push_back(apply_zip(ctx, desc, position_args)?);
    }
    Ok(Value::List(results))
}

/// List-operator dispatch: no per-element broadcasting. Each slot is shaped
/// to its declared kind — whole lists pre-materialized, sequences passed
/// live to `Generator` slots, scalars coerced to one-element lists.
pub fn apply_list(
    ctx: &mut OpContext,
    desc: &OperatorDescriptor,
    args: Vec<Value>,
) -> Result<Value, EvalError> {
    let mut shaped = Vec::with_capacity(args.len());
    for (arg, kind) in args.into_iter().zip(desc.arg_kinds.iter()) {
        let value = match kind {
            ArgKind::List => match arg {
                Value::List(_) => arg,
                Value::Sequence(handle) => {
                    let elements = handle.borrow_mut().materialize()?;
                    Value::List(elements)
                }
                scalar => Value::List(Vector::unit(scalar)),
            },
            ArgKind::Generator => match arg {
                Value::Sequence(_) => arg,
                other => Value::sequence(LazySequence::create(other)),
            },
            ArgKind::Default | ArgKind::Function => arg,
        };
        shaped.push(value);
    }
    (desc.callable)(ctx, &shaped)
}

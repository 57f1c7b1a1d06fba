//! Modifier operators: they mutate the evaluator's stack and nesting state
//! directly instead of producing one derived value, and they never
//! broadcast.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

use super::function::UserFunction;
use super::{EvalError, Evaluator, OperatorListCapture};

impl Evaluator {
    /// `[` — open a nested list; subsequent pushes land inside it.
    pub(crate) fn modifier_open_bracket(&mut self) -> Result<(), EvalError> {
        self.push_frame();
        Ok(())
    }

    /// `]` — close the innermost open list and push it as one value.
    pub(crate) fn modifier_close_bracket(&mut self) -> Result<(), EvalError> {
        let frame = self.pop_frame().ok_or_else(|| {
            EvalError::message("negative list level (too many ']'s)")
        })?;
        self.current_frame_mut()
            .push(Value::List(frame.into_iter().collect()));
        Ok(())
    }

    /// `(` — start collecting operator applications against the marked
    /// operands; not reentrant.
    pub(crate) fn modifier_open_operator_list(&mut self) -> Result<(), EvalError> {
        if self.state_mut().operator_list.is_some() {
            return Err(EvalError::message("nested operator lists are not supported"));
        }
        let operand_top = self.current_frame().len();
        self.state_mut().operator_list = Some(OperatorListCapture {
            operand_top,
            operands_to_remove: 0,
            operators_in_list: 0,
        });
        Ok(())
    }

    /// `)` — remove the marked operand region and splice in a single list
    /// of the collected results, in application order.
    pub(crate) fn modifier_close_operator_list(&mut self) -> Result<(), EvalError> {
        let capture = self
            .state_mut()
            .operator_list
            .take()
            .ok_or_else(|| EvalError::message("mismatched operator list ending (')')"))?;

        let frame = self.current_frame_mut();
        let results: Vec<Value> = frame.split_off(capture.operand_top);
        frame.truncate(capture.operand_top - capture.operands_to_remove);
        frame.push(Value::List(results.into_iter().collect()));
        Ok(())
    }

    /// `duplicate_term` — pop a count, then a value; push the value (or
    /// each of its elements, for a list) that many times.
    pub(crate) fn modifier_duplicate_term(&mut self) -> Result<(), EvalError> {
        let frame = self.current_frame_mut();
        if frame.len() < 2 {
            return Err(EvalError::message(
                "'duplicate_term' requires a count and a value",
            ));
        }
        let count = frame.pop().expect("checked length");
        let value = frame.pop().expect("checked length");
        let count = count.to_usize().ok_or_else(|| {
            EvalError::message("'duplicate_term' requires a non-negative count")
        })?;

        let frame = self.current_frame_mut();
        for _ in 0..count {
            match &value {
                Value::List(elements) => frame.extend(elements.iter().cloned()),
                other => frame.push(other.clone()),
            }
        }
        Ok(())
    }

    /// `duplicate_operator` — pop a positive count; the next operator
    /// application repeats that many times.
    pub(crate) fn modifier_duplicate_operator(&mut self) -> Result<(), EvalError> {
        if self.state_mut().duplicate_operations > 0 {
            return Err(EvalError::message(
                "'duplicate_operator' must be followed by another operation",
            ));
        }
        if matches!(self.current_frame().last(), Some(Value::List(_))) {
            return Err(EvalError::message(
                "'duplicate_operator' cannot accept a list argument",
            ));
        }
        let count = self
            .current_frame_mut()
            .pop()
            .and_then(|value| value.to_usize())
            .filter(|count| *count > 0)
            .ok_or_else(|| {
                EvalError::message("'duplicate_operator' requires a positive count")
            })?;
        self.state_mut().duplicate_operations = count;
        Ok(())
    }

    /// `previous` — push a copy of the stack top without popping it.
    pub(crate) fn modifier_previous(&mut self) -> Result<(), EvalError> {
        let top = self
            .current_frame()
            .last()
            .cloned()
            .ok_or_else(|| EvalError::message("'previous' requires a value on the stack"))?;
        self.current_frame_mut().push(top);
        Ok(())
    }

    /// `unlist` — pop a list and push its elements individually; one level
    /// only, and a scalar passes through unchanged.
    pub(crate) fn modifier_unlist(&mut self) -> Result<(), EvalError> {
        let value = self
            .current_frame_mut()
            .pop()
            .ok_or_else(|| EvalError::message("'unlist' requires a value on the stack"))?;
        let frame = self.current_frame_mut();
        match value {
            Value::List(elements) => frame.extend(elements),
            other => frame.push(other),
        }
        Ok(())
    }

    /// `lambda` — push an empty function and start collecting terms into
    /// it.
    pub(crate) fn modifier_lambda(&mut self) -> Result<(), EvalError> {
        self.state_mut().creating_function = true;
        self.current_frame_mut()
            .push(Value::Function(Rc::new(RefCell::new(UserFunction::new()))));
        Ok(())
    }

    /// `x`/`y`/`z` outside a `lambda`; inside one they are captured before
    /// this is reached.
    pub(crate) fn modifier_placeholder(&mut self) -> Result<(), EvalError> {
        Err(EvalError::message(
            "placeholders require 'lambda' to start a function declaration",
        ))
    }

    /// `set_variable` — pop a value, then a name string; later `$name`
    /// references yield the value.
    pub(crate) fn modifier_set_variable(&mut self) -> Result<(), EvalError> {
        let frame = self.current_frame_mut();
        if frame.len() < 2 {
            return Err(EvalError::message(
                "'set_variable' requires a name and a value",
            ));
        }
        let value = frame.pop().expect("checked length");
        let name = frame.pop().expect("checked length");
        let Value::String(name) = name else {
            return Err(EvalError::message("'set_variable' requires a string name"));
        };
        self.state_mut()
            .variables
            .insert((*name).clone(), value.clone());
        self.current_frame_mut().push(value);
        Ok(())
    }
}

//! The term evaluator: classifies each incoming term and dispatches it
//! against the operator table, the unit/constant resolver, the user
//! function being collected, or the literal parser, maintaining the operand
//! stack and all interpreter state along the way.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::cache::{MemoryCache, OperatorCache};
use crate::error::{CalcError, ValidateError};
use crate::operators::{OperatorDescriptor, OperatorTable};
use crate::parser::parse_input_value;
use crate::suggest::nearest_keyword;
use crate::tokenizer::tokenize;
use crate::units::{self, NameKind};
use crate::value::{Measurement, Value};

use function::UserFunction;

pub mod broadcast;
pub mod function;
mod modifiers;

#[cfg(test)]
mod tests;

/// Evaluation failure. The index is the 1-based position of the offending
/// term; zero means the failure was not tied to a particular term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub message: String,
    pub index: usize,
}

impl EvalError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            index: 0,
        }
    }

    pub fn at(message: impl Into<String>, index: usize) -> Self {
        Self {
            message: message.into(),
            index,
        }
    }

    /// Attach a term index if the error does not already carry one.
    pub fn at_term(mut self, index: usize) -> Self {
        if self.index == 0 {
            self.index = index;
        }
        self
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index > 0 {
            write!(f, "error in term {}: {}", self.index, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for EvalError {}

/// Operator-list capture: while a `( … )` group is open, operator
/// applications read their operands in place from below `operand_top` and
/// their results collect on top of the stack.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OperatorListCapture {
    pub operand_top: usize,
    pub operands_to_remove: usize,
    pub operators_in_list: usize,
}

/// All interpreter configuration and cross-term state, threaded explicitly
/// through evaluation. There are no globals.
pub struct EvalState {
    pub input_radix: u32,
    pub precision: usize,
    pub duplicate_operations: usize,
    pub creating_function: bool,
    pub echo_arguments: Vec<Value>,
    pub variables: HashMap<String, Value>,
    pub functions: HashMap<String, Rc<RefCell<UserFunction>>>,
    pub cache: Rc<RefCell<dyn OperatorCache>>,
    pub(crate) operator_list: Option<OperatorListCapture>,
}

impl EvalState {
    fn new(cache: Rc<RefCell<dyn OperatorCache>>) -> Self {
        Self {
            input_radix: 10,
            precision: 12,
            duplicate_operations: 0,
            creating_function: false,
            echo_arguments: Vec::new(),
            variables: HashMap::new(),
            functions: HashMap::new(),
            cache,
            operator_list: None,
        }
    }

    /// A detached state for evaluating compiled functions outside the main
    /// evaluation loop (lazy sequence pulls). Shares the cache; everything
    /// else starts fresh.
    pub(crate) fn scratch(
        input_radix: u32,
        precision: usize,
        cache: Rc<RefCell<dyn OperatorCache>>,
    ) -> Self {
        let mut state = Self::new(cache);
        state.input_radix = input_radix;
        state.precision = precision;
        state
    }
}

/// What operator callables see: the threaded state plus the read-only
/// operator table.
pub struct OpContext<'a> {
    pub state: &'a mut EvalState,
    pub ops: &'a Rc<OperatorTable>,
}

pub struct Evaluator {
    ops: Rc<OperatorTable>,
    state: EvalState,
    /// One frame per open `[`; the first frame is the outer stack
    frames: Vec<Vec<Value>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_cache(Rc::new(RefCell::new(MemoryCache::new())))
    }

    pub fn with_cache(cache: Rc<RefCell<dyn OperatorCache>>) -> Self {
        Self {
            ops: Rc::new(OperatorTable::standard()),
            state: EvalState::new(cache),
            frames: vec![Vec::new()],
        }
    }

    pub fn set_input_radix(&mut self, radix: u32) {
        self.state.input_radix = radix;
    }

    pub fn set_precision(&mut self, precision: usize) {
        self.state.precision = precision;
    }

    pub fn precision(&self) -> usize {
        self.state.precision
    }

    pub fn define_variable(&mut self, name: impl Into<String>, value: Value) {
        self.state.variables.insert(name.into(), value);
    }

    /// Register a named user function from its captured terms, as a
    /// `lambda` would have collected them.
    pub fn define_function(&mut self, name: impl Into<String>, terms: &[&str]) {
        self.state
            .functions
            .insert(name.into(), Rc::new(RefCell::new(UserFunction::from_terms(terms))));
    }

    /// Tokenize and evaluate one input line; the final stack contents are
    /// the result.
    pub fn evaluate_line(&mut self, line: &str) -> Result<Vec<Value>, CalcError> {
        let terms = tokenize(line)?;
        self.evaluate_terms(&terms)
    }

    /// Evaluate a prepared term stream. Any failure is terminal: the stack
    /// is discarded and the error returned.
    pub fn evaluate_terms<S: AsRef<str>>(&mut self, terms: &[S]) -> Result<Vec<Value>, CalcError> {
        let resolved: Vec<&str> = terms
            .iter()
            .map(|term| self.ops.resolve_alias(term.as_ref()))
            .collect();

        validate_terms(&resolved, &self.ops)?;
        self.reset_transient_state();

        for (i, term) in resolved.iter().enumerate() {
            let index = i + 1;

            // a function operator ends lambda collection and then runs
            if self.ops.is_function_operator(term) {
                if !self.state.creating_function {
                    self.reset_transient_state();
                    return Err(EvalError::at(
                        "function operators require a function definition",
                        index,
                    )
                    .into());
                }
                self.state.creating_function = false;
            }

            if self.state.creating_function {
                self.capture_function_term(term, index)?;
                continue;
            }

            if let Err(err) = self.evaluate_term(term, index) {
                self.reset_transient_state();
                return Err(err.into());
            }
        }

        debug_assert_eq!(self.frames.len(), 1);
        let mut results: Vec<Value> = self.state.echo_arguments.drain(..).collect();
        results.append(self.frames.last_mut().expect("base frame"));
        Ok(results)
    }

    /// Classify and apply a single term.
    pub fn evaluate_term(&mut self, term: &str, index: usize) -> Result<(), EvalError> {
        let ops = Rc::clone(&self.ops);

        if let Some(modifier) = ops.modifier(term) {
            return modifier(self).map_err(|err| err.at_term(index));
        }

        match units::resolve(term) {
            NameKind::Unit => return self.apply_unit(term, index),
            NameKind::Constant => {
                let value = units::constant_value(term).expect("resolved as constant");
                return self.push_operand(value, index);
            }
            NameKind::Neither => {}
        }

        if let Some(desc) = ops.simple_operator(term) {
            return self.apply_operator(desc, index);
        }

        if let Some(desc) = ops.list_operator(term) {
            return self.apply_operator(desc, index);
        }

        if let Some(name) = term.strip_prefix('@') {
            return self.apply_function_reference(name, index);
        }

        if let Some(name) = term.strip_prefix('$') {
            let value = self
                .state
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::at(format!("undefined variable '{name}'"), index))?;
            return self.push_operand(value, index);
        }

        match parse_input_value(term, self.state.input_radix) {
            Ok(Some(value)) => self.push_operand(value, index),
            Ok(None) => Err(self.unrecognized_term(term, index)),
            Err(err) => Err(EvalError::at(err.message, index)),
        }
    }

    fn unrecognized_term(&self, term: &str, index: usize) -> EvalError {
        let keywords = self.ops.keywords().chain(units::known_names());
        let message = match nearest_keyword(term, keywords) {
            Some(guess) => match self.ops.alias_target(guess) {
                Some(canonical) => format!(
                    "unrecognized operator '{term}'. Did you mean '{guess}', i.e., an alias for '{canonical}'?"
                ),
                None => format!("unrecognized operator '{term}'. Did you mean '{guess}'?"),
            },
            None => format!("unrecognized operator '{term}'"),
        };
        EvalError::at(message, index)
    }

    /// Push a plain value. Inside an operator list only operators may
    /// appear, so pushes are rejected there.
    fn push_operand(&mut self, value: Value, index: usize) -> Result<(), EvalError> {
        if self.state.operator_list.is_some() {
            return Err(EvalError::at(
                "only operators may appear inside an operator list",
                index,
            ));
        }
        self.current_frame_mut().push(value);
        Ok(())
    }

    /// `@name`: push the named function and immediately apply it through
    /// the matching `eval` operator for its arity.
    fn apply_function_reference(&mut self, name: &str, index: usize) -> Result<(), EvalError> {
        let ops = Rc::clone(&self.ops);
        let func = self
            .state
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::at(format!("reference to undefined function '{name}'"), index))?;

        let arity = {
            let mut ctx = OpContext {
                state: &mut self.state,
                ops: &ops,
            };
            let mut borrowed = func.borrow_mut();
            borrowed.arity(&mut ctx).map_err(|err| err.at_term(index))?
        };

        self.push_operand(Value::Function(Rc::clone(&func)), index)?;

        let eval_name = match arity {
            0 => "eval0",
            1 => "eval",
            2 => "eval2",
            _ => "eval3",
        };
        let desc = ops.simple_operator(eval_name).expect("eval operators are registered");
        self.apply_operator(desc, index)
    }

    /// Unit name: attach to the adjacent operand, or push a value-1
    /// measurement when there is nothing to attach to.
    fn apply_unit(&mut self, term: &str, index: usize) -> Result<(), EvalError> {
        let info = units::unit_info(term).expect("resolved as unit");
        let unit: Rc<str> = Rc::from(info.name);

        if self.state.operator_list.is_some() {
            return Err(EvalError::at(
                "only operators may appear inside an operator list",
                index,
            ));
        }

        let frame = self.current_frame_mut();
        // a unit with nothing to attach to gets a value of 1
        let attaches = match frame.last() {
            None | Some(Value::Measurement(_)) | Some(Value::DateTime(_)) => false,
            Some(Value::List(elements))
                if matches!(elements.front(), Some(Value::Measurement(_))) =>
            {
                false
            }
            Some(Value::List(_)) | Some(Value::Sequence(_)) => true,
            Some(value) if value.is_number() => true,
            Some(value) => {
                return Err(EvalError::at(
                    format!("unsupported type for a unit operator: {}", value.type_name()),
                    index,
                ))
            }
        };

        if !attaches {
            frame.push(Value::Measurement(Measurement::new(
                Value::integer(1),
                unit,
            )));
            return Ok(());
        }

        let target = frame.pop().expect("attachable operand");
        let attached = match target {
            Value::List(elements) => {
                let mut measured = im_rc::Vector::new();
                for element in elements {
                    measured.push_back(apply_value_to_unit(element, &unit, index)?);
                }
                Value::List(measured)
            }
            Value::Sequence(handle) => {
                let elements = handle
                    .borrow_mut()
                    .materialize()
                    .map_err(|err| err.at_term(index))?;
                let mut measured = im_rc::Vector::new();
                for element in elements {
                    measured.push_back(apply_value_to_unit(element, &unit, index)?);
                }
                Value::List(measured)
            }
            scalar => apply_value_to_unit(scalar, &unit, index)?,
        };
        self.current_frame_mut().push(attached);
        Ok(())
    }

    /// Apply a value-producing operator, honoring a pending
    /// `duplicate_operator` count. Each repetition after the first restores
    /// the saved copies of every operand beyond the first.
    fn apply_operator(&mut self, desc: &OperatorDescriptor, index: usize) -> Result<(), EvalError> {
        let repeats = std::mem::take(&mut self.state.duplicate_operations).max(1);

        let saved = if repeats > 1 && desc.arity > 1 {
            let frame = self.current_frame();
            if frame.len() >= desc.arity {
                Some(frame[frame.len() - (desc.arity - 1)..].to_vec())
            } else {
                None
            }
        } else {
            None
        };

        for repetition in 0..repeats {
            if repetition > 0 {
                if let Some(saved) = &saved {
                    self.current_frame_mut().extend(saved.iter().cloned());
                }
            }
            self.apply_operator_once(desc, index)?;
        }
        Ok(())
    }

    fn apply_operator_once(
        &mut self,
        desc: &OperatorDescriptor,
        index: usize,
    ) -> Result<(), EvalError> {
        let args = if self.state.operator_list.is_some() {
            self.collect_capture_args(desc, index)?
        } else {
            self.pop_args(desc, index)?
        };

        let result = self.dispatch(desc, args).map_err(|err| err.at_term(index))?;
        self.current_frame_mut().push(result);
        Ok(())
    }

    /// Normal application: pop the declared arity, deepest operand first in
    /// the argument list.
    fn pop_args(
        &mut self,
        desc: &OperatorDescriptor,
        index: usize,
    ) -> Result<Vec<Value>, EvalError> {
        let frame = self.current_frame_mut();
        if frame.len() < desc.arity {
            return Err(arity_error(desc, index));
        }
        let args = frame.split_off(frame.len() - desc.arity);
        Ok(args)
    }

    /// Operator-list application: read the operands in place (forking
    /// sequences so every operator in the group can consume them) and
    /// leave them on the stack until the group closes.
    fn collect_capture_args(
        &mut self,
        desc: &OperatorDescriptor,
        index: usize,
    ) -> Result<Vec<Value>, EvalError> {
        let capture = self.state.operator_list.expect("operator list is active");
        if capture.operand_top < desc.arity {
            return Err(arity_error(desc, index));
        }

        let frame = self.current_frame();
        let mut args = Vec::with_capacity(desc.arity);
        for i in 0..desc.arity {
            let value = &frame[capture.operand_top - desc.arity + i];
            args.push(match value {
                Value::Sequence(handle) => Value::sequence(handle.borrow_mut().fork()),
                other => other.clone(),
            });
        }

        let capture = self.state.operator_list.as_mut().expect("operator list is active");
        capture.operators_in_list += 1;
        capture.operands_to_remove = capture.operands_to_remove.max(desc.arity);
        Ok(args)
    }

    fn dispatch(&mut self, desc: &OperatorDescriptor, args: Vec<Value>) -> Result<Value, EvalError> {
        let ops = Rc::clone(&self.ops);
        let mut ctx = OpContext {
            state: &mut self.state,
            ops: &ops,
        };
        if desc.is_list_operator {
            broadcast::apply_list(&mut ctx, desc, args)
        } else {
            broadcast::apply_simple(&mut ctx, desc, args)
        }
    }

    /// While a lambda is collecting, every term lands in its buffer
    /// instead of being evaluated.
    fn capture_function_term(&mut self, term: &str, index: usize) -> Result<(), EvalError> {
        match self.current_frame().last() {
            Some(Value::Function(func)) => {
                func.borrow_mut().capture(term);
                Ok(())
            }
            _ => Err(EvalError::at(
                "function definition is not at the top of the stack",
                index,
            )),
        }
    }

    pub(crate) fn current_frame(&self) -> &Vec<Value> {
        self.frames.last().expect("at least the base frame")
    }

    pub(crate) fn current_frame_mut(&mut self) -> &mut Vec<Value> {
        self.frames.last_mut().expect("at least the base frame")
    }

    pub(crate) fn state_mut(&mut self) -> &mut EvalState {
        &mut self.state
    }

    pub(crate) fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    pub(crate) fn pop_frame(&mut self) -> Option<Vec<Value>> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    fn reset_transient_state(&mut self) {
        self.frames.clear();
        self.frames.push(Vec::new());
        self.state.duplicate_operations = 0;
        self.state.creating_function = false;
        self.state.operator_list = None;
        self.state.echo_arguments.clear();
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_value_to_unit(value: Value, unit: &Rc<str>, index: usize) -> Result<Value, EvalError> {
    if value.is_number() {
        Ok(Value::Measurement(Measurement::new(value, Rc::clone(unit))))
    } else {
        Err(EvalError::at(
            format!("unsupported type for a unit operator: {}", value.type_name()),
            index,
        ))
    }
}

fn arity_error(desc: &OperatorDescriptor, index: usize) -> EvalError {
    EvalError::at(
        format!(
            "operator '{}' requires {} argument{}",
            desc.name,
            desc.arity,
            if desc.arity == 1 { "" } else { "s" }
        ),
        index,
    )
}

/// Pre-flight structural checks over the whole term stream: bracket and
/// parenthesis balance and `lambda` nesting. Nothing evaluates if any of
/// these fail.
pub fn validate_terms<S: AsRef<str>>(terms: &[S], ops: &OperatorTable) -> Result<(), ValidateError> {
    let mut brackets: i64 = 0;
    for term in terms {
        match term.as_ref() {
            "[" => brackets += 1,
            "]" => brackets -= 1,
            _ => {}
        }
    }
    if brackets != 0 {
        return Err(ValidateError::new(format!(
            "mismatched brackets (count: {brackets})"
        )));
    }

    let mut operator_list_open = false;
    for term in terms {
        match term.as_ref() {
            "(" => {
                if operator_list_open {
                    return Err(ValidateError::new("nested operator lists are not supported"));
                }
                operator_list_open = true;
            }
            ")" => {
                if !operator_list_open {
                    return Err(ValidateError::new("mismatched operator list ending (')')"));
                }
                operator_list_open = false;
            }
            _ => {}
        }
    }
    if operator_list_open {
        return Err(ValidateError::new("mismatched parentheses (count: 1)"));
    }

    let mut creating_function = false;
    for term in terms {
        let term = term.as_ref();
        if term == "lambda" {
            if creating_function {
                return Err(ValidateError::new(
                    "nested function declarations are not supported",
                ));
            }
            creating_function = true;
        } else if ops.is_function_operator(term) {
            creating_function = false;
        }
    }
    if creating_function {
        return Err(ValidateError::new(
            "unexpected end of input in function definition",
        ));
    }

    Ok(())
}

use im_rc::Vector;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::evaluator::EvalError;

use super::Value;

/// Pull-based element source; `Ok(None)` means exhausted.
pub type Producer = Box<dyn FnMut() -> Result<Option<Value>, EvalError>>;

/// A possibly-unbounded, on-demand-produced sequence of values.
///
/// Every handle is a cursor over a shared production. `fork` registers a
/// second cursor at the same point; elements produced but not yet consumed
/// by every cursor stay buffered, so consuming through one cursor never
/// advances another. A cursor cannot be rewound; only a fork taken before
/// a point yields a second walk over it.
pub struct LazySequence {
    core: Rc<RefCell<SequenceCore>>,
    slot: usize,
    position: u64,
    count: Option<u64>,
}

struct SequenceCore {
    producer: Producer,
    buffer: VecDeque<Value>,
    /// Absolute index of `buffer.front()`
    base: u64,
    /// Next-element position per live cursor; `None` marks a dropped cursor
    cursors: Vec<Option<u64>>,
    finished: bool,
}

impl SequenceCore {
    /// Produce elements until the absolute position is buffered or the
    /// production ends.
    fn fill_to(&mut self, position: u64) -> Result<(), EvalError> {
        while !self.finished && self.base + self.buffer.len() as u64 <= position {
            match (self.producer)()? {
                Some(value) => self.buffer.push_back(value),
                None => self.finished = true,
            }
        }
        Ok(())
    }

    /// Drop buffered elements every live cursor has consumed.
    fn trim(&mut self) {
        let Some(min) = self.cursors.iter().flatten().min().copied() else {
            return;
        };
        while self.base < min {
            if self.buffer.pop_front().is_none() {
                break;
            }
            self.base += 1;
        }
    }
}

impl LazySequence {
    pub fn from_producer(producer: Producer, count: Option<u64>) -> Self {
        let core = SequenceCore {
            producer,
            buffer: VecDeque::new(),
            base: 0,
            cursors: vec![Some(0)],
            finished: false,
        };
        Self {
            core: Rc::new(RefCell::new(core)),
            slot: 0,
            position: 0,
            count,
        }
    }

    /// Declared element count, when it was analytically computable.
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    /// A scalar becomes a one-element sequence; a list is walked in order.
    pub fn create(value: Value) -> Self {
        match value {
            Value::Sequence(handle) => handle.borrow_mut().fork(),
            Value::List(elements) => {
                let count = elements.len() as u64;
                let mut iter = elements.into_iter();
                Self::from_producer(Box::new(move || Ok(iter.next())), Some(count))
            }
            scalar => {
                let mut item = Some(scalar);
                Self::from_producer(Box::new(move || Ok(item.take())), Some(1))
            }
        }
    }

    /// Arithmetic progression from `start` to `end` inclusive. When the
    /// caller's step sign disagrees with the relative order of the bounds,
    /// the direction of the bounds wins.
    pub fn create_range(start: &Value, end: &Value, step: &Value) -> Result<Self, EvalError> {
        if let (Value::Integer(s), Value::Integer(e), Value::Integer(p)) = (start, end, step) {
            if p.is_zero() {
                return Err(EvalError::message("range step cannot be zero"));
            }
            return Ok(Self::integer_range(s.clone(), e.clone(), p.clone()));
        }

        let (s, e, p) = match (start.to_f64(), end.to_f64(), step.to_f64()) {
            (Some(s), Some(e), Some(p)) => (s, e, p),
            _ => {
                return Err(EvalError::message(format!(
                    "range bounds must be numeric, got {} and {}",
                    start.type_name(),
                    end.type_name()
                )))
            }
        };
        if p == 0.0 {
            return Err(EvalError::message("range step cannot be zero"));
        }
        let p = if s > e && p > 0.0 { -p } else { p };

        let count = if e.is_finite() {
            let steps = ((e - s) / p).floor();
            if steps < 0.0 {
                Some(0)
            } else {
                Some(steps as u64 + 1)
            }
        } else {
            None
        };

        let mut current = s;
        let producer = move || {
            let past_end = if p > 0.0 { current > e } else { current < e };
            if past_end {
                return Ok(None);
            }
            let value = Value::decimal(current);
            current += p;
            Ok(Some(value))
        };
        Ok(Self::from_producer(Box::new(producer), count))
    }

    fn integer_range(start: BigInt, end: BigInt, step: BigInt) -> Self {
        let step = if start > end && step.is_positive() {
            -step
        } else {
            step
        };

        // Truncating division is exact enough here: span and step share a
        // sign unless the range is empty.
        let steps = (&end - &start) / &step;
        let count = if steps.is_negative() {
            Some(0)
        } else {
            steps.to_u64().map(|n| n + 1)
        };

        let mut current = start;
        let ascending = step.is_positive();
        let producer = move || {
            let past_end = if ascending {
                current > end
            } else {
                current < end
            };
            if past_end {
                return Ok(None);
            }
            let value = Value::Integer(current.clone());
            current += &step;
            Ok(Some(value))
        };
        Self::from_producer(Box::new(producer), count)
    }

    /// Lazy element-wise map; the source's declared count carries over.
    pub fn create_chained(
        source: Rc<RefCell<LazySequence>>,
        mut map: Box<dyn FnMut(Value) -> Result<Value, EvalError>>,
    ) -> Self {
        let count = source.borrow().count();
        let producer = move || match source.borrow_mut().next()? {
            Some(value) => map(value).map(Some),
            None => Ok(None),
        };
        Self::from_producer(Box::new(producer), count)
    }

    /// Lazy filter; the resulting count is always unknown.
    pub fn create_filter(
        source: Rc<RefCell<LazySequence>>,
        mut predicate: Box<dyn FnMut(&Value) -> Result<bool, EvalError>>,
        invert: bool,
    ) -> Self {
        let producer = move || loop {
            match source.borrow_mut().next()? {
                Some(value) => {
                    if predicate(&value)? != invert {
                        return Ok(Some(value));
                    }
                }
                None => return Ok(None),
            }
        };
        Self::from_producer(Box::new(producer), None)
    }

    /// Seeded progression: yields `seed`, then `step(previous)` repeatedly,
    /// `count` elements in total. Geometric and exponential ranges are built
    /// on this.
    pub fn create_unfold(
        seed: Value,
        mut step: Box<dyn FnMut(&Value) -> Result<Value, EvalError>>,
        count: u64,
    ) -> Self {
        let mut current = Some(seed);
        let mut remaining = count;
        let producer = move || {
            if remaining == 0 {
                return Ok(None);
            }
            remaining -= 1;
            let value = match current.take() {
                Some(value) => value,
                None => return Ok(None),
            };
            if remaining > 0 {
                current = Some(step(&value)?);
            }
            Ok(Some(value))
        };
        Self::from_producer(Box::new(producer), Some(count))
    }

    /// Yield the next element of this cursor, advancing past it.
    pub fn next(&mut self) -> Result<Option<Value>, EvalError> {
        let mut core = self.core.borrow_mut();
        core.fill_to(self.position)?;

        let offset = self.position - core.base;
        let value = match core.buffer.get(offset as usize) {
            Some(value) => value.clone(),
            None => return Ok(None),
        };

        self.position += 1;
        core.cursors[self.slot] = Some(self.position);
        core.trim();
        Ok(Some(value))
    }

    /// Register an independent cursor at this cursor's current point.
    pub fn fork(&mut self) -> LazySequence {
        let slot = {
            let mut core = self.core.borrow_mut();
            core.cursors.push(Some(self.position));
            core.cursors.len() - 1
        };
        LazySequence {
            core: Rc::clone(&self.core),
            slot,
            position: self.position,
            count: self.count,
        }
    }

    /// Element at `index`, reached by advancing a fresh cursor that many
    /// steps; O(index), no random access.
    pub fn nth(&mut self, index: u64) -> Result<Option<Value>, EvalError> {
        let mut cursor = self.fork();
        for _ in 0..index {
            if cursor.next()?.is_none() {
                return Ok(None);
            }
        }
        cursor.next()
    }

    /// Drain this cursor into a list. Never returns on an unbounded
    /// production; callers gate on operator argument kinds.
    pub fn materialize(&mut self) -> Result<Vector<Value>, EvalError> {
        let mut elements = Vector::new();
        while let Some(value) = self.next()? {
            elements.push_back(value);
        }
        Ok(elements)
    }
}

impl Drop for LazySequence {
    fn drop(&mut self) {
        if let Ok(mut core) = self.core.try_borrow_mut() {
            if let Some(slot) = core.cursors.get_mut(self.slot) {
                *slot = None;
            }
            core.trim();
        }
    }
}

impl fmt::Debug for LazySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySequence")
            .field("position", &self.position)
            .field("count", &self.count)
            .finish()
    }
}

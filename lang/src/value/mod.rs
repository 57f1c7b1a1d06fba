use im_rc::Vector;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub mod sequence;


pub use sequence::LazySequence;

use crate::evaluator::function::UserFunction;

/// Everything that can sit in an operand stack slot.
#[derive(Clone, Debug)]
pub enum Value {
    /// Exact integer of arbitrary magnitude
    Integer(BigInt),

    /// Real approximation
    Decimal(OrderedFloat<f64>),

    /// Complex number, e.g. the result of taking an even root of a
    /// negative real
    Complex {
        re: OrderedFloat<f64>,
        im: OrderedFloat<f64>,
    },

    /// Quoted string
    String(Rc<String>),

    /// Calendar date with optional time-of-day
    DateTime(chrono::NaiveDateTime),

    /// A number bound to a unit name from the resolver table
    Measurement(Measurement),

    /// Ordered, heterogeneous, nested
    List(Vector<Value>),

    /// Lazily produced sequence; the handle is shared between the original
    /// holder and anything cloned from the same stack slot
    Sequence(Rc<RefCell<LazySequence>>),

    /// User-defined function built from captured terms
    Function(Rc<RefCell<UserFunction>>),
}

/// A numeric value paired with a unit name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Measurement {
    pub value: Box<Value>,
    pub unit: Rc<str>,
}

impl Measurement {
    pub fn new(value: Value, unit: impl Into<Rc<str>>) -> Self {
        Self {
            value: Box::new(value),
            unit: unit.into(),
        }
    }
}

impl Value {
    pub fn integer(n: i64) -> Self {
        Value::Integer(BigInt::from(n))
    }

    pub fn decimal(n: f64) -> Self {
        Value::Decimal(OrderedFloat(n))
    }

    pub fn complex(re: f64, im: f64) -> Self {
        Value::Complex {
            re: OrderedFloat(re),
            im: OrderedFloat(im),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(s.into()))
    }

    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::List(values.into_iter().collect())
    }

    pub fn sequence(sequence: LazySequence) -> Self {
        Value::Sequence(Rc::new(RefCell::new(sequence)))
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Decimal(_) => "Decimal",
            Value::Complex { .. } => "Complex",
            Value::String(_) => "String",
            Value::DateTime(_) => "DateTime",
            Value::Measurement(_) => "Measurement",
            Value::List(_) => "List",
            Value::Sequence(_) => "Sequence",
            Value::Function(_) => "Function",
        }
    }

    /// Numbers compare against zero; everything else counts as non-zero.
    /// This is the predicate truth rule used by `filter`.
    pub fn is_nonzero(&self) -> bool {
        match self {
            Value::Integer(n) => !n.is_zero(),
            Value::Decimal(n) => n.0 != 0.0,
            Value::Complex { re, im } => re.0 != 0.0 || im.0 != 0.0,
            _ => true,
        }
    }

    /// Real numeric reading of the value, when it has one.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => n.to_f64(),
            Value::Decimal(n) => Some(n.0),
            Value::Complex { re, im } if im.0 == 0.0 => Some(re.0),
            _ => None,
        }
    }

    /// Exact integer reading of the value, when it has one.
    pub fn to_bigint(&self) -> Option<BigInt> {
        match self {
            Value::Integer(n) => Some(n.clone()),
            Value::Decimal(n) if n.0.fract() == 0.0 => BigInt::from_f64(n.0),
            _ => None,
        }
    }

    /// Non-negative integer reading, used for counts and indices.
    pub fn to_usize(&self) -> Option<usize> {
        match self {
            Value::Integer(n) if !n.is_negative() => n.to_usize(),
            Value::Decimal(n) if n.0 >= 0.0 && n.0.fract() == 0.0 => Some(n.0 as usize),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Integer(_) | Value::Decimal(_) | Value::Complex { .. }
        )
    }
}

/// Structural equality; sequences and functions compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            // Exact and approximate readings of the same number are equal,
            // so `2 2.0 is_equal` holds
            (Value::Integer(a), Value::Decimal(b)) | (Value::Decimal(b), Value::Integer(a)) => {
                a.to_f64().map(|a| a == b.0).unwrap_or(false)
            }
            (
                Value::Complex { re: r1, im: i1 },
                Value::Complex { re: r2, im: i2 },
            ) => r1 == r2 && i1 == i2,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Measurement(a), Value::Measurement(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            // Integers and whole decimals must hash alike because they
            // compare equal
            Value::Integer(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            Value::Decimal(n) => {
                if n.0.fract() == 0.0 {
                    if let Some(whole) = BigInt::from_f64(n.0) {
                        0u8.hash(state);
                        whole.hash(state);
                        return;
                    }
                }
                1u8.hash(state);
                n.hash(state);
            }
            Value::Complex { re, im } => {
                2u8.hash(state);
                re.hash(state);
                im.hash(state);
            }
            Value::String(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::DateTime(dt) => {
                4u8.hash(state);
                dt.hash(state);
            }
            Value::Measurement(m) => {
                5u8.hash(state);
                m.hash(state);
            }
            Value::List(elements) => {
                6u8.hash(state);
                elements.len().hash(state);
                for element in elements {
                    element.hash(state);
                }
            }
            // Identity-compared values hash by pointer
            Value::Sequence(s) => {
                7u8.hash(state);
                std::ptr::hash(Rc::as_ptr(s), state);
            }
            Value::Function(f) => {
                8u8.hash(state);
                std::ptr::hash(Rc::as_ptr(f), state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Decimal(n) => {
                if n.0.fract() == 0.0 && n.0.abs() < 1e15 {
                    write!(f, "{}", n.0 as i64)
                } else {
                    write!(f, "{}", n.0)
                }
            }
            Value::Complex { re, im } => {
                if im.0 >= 0.0 {
                    write!(f, "({} + {}i)", Value::Decimal(*re), Value::Decimal(*im))
                } else {
                    write!(f, "({} - {}i)", Value::Decimal(*re), Value::Decimal(OrderedFloat(-im.0)))
                }
            }
            Value::String(s) => write!(f, "{s}"),
            Value::DateTime(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    write!(f, "{}", dt.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S"))
                }
            }
            Value::Measurement(m) => write!(f, "{} {}", m.value, m.unit),
            Value::List(elements) => {
                write!(f, "[ ")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, " ]")
            }
            Value::Sequence(s) => match s.borrow().count() {
                Some(count) => write!(f, "<sequence of {count}>"),
                None => write!(f, "<sequence>"),
            },
            Value::Function(_) => write!(f, "<function>"),
        }
    }
}

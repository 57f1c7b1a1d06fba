//! The memoization collaborator consulted by individual operator
//! implementations. The evaluator core never touches it; an operator that
//! wants memoization (the recursive sequence operators, notably
//! `fibonacci`) looks its arguments up here before computing.

use std::collections::HashMap;

use crate::value::Value;

pub trait OperatorCache {
    fn get(&self, operator: &str, args: &[Value]) -> Option<Value>;
    fn put(&mut self, operator: &str, args: &[Value], value: Value);
}

/// In-process cache; nothing is persisted.
#[derive(Default)]
pub struct MemoryCache {
    entries: HashMap<(String, Vec<Value>), Value>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OperatorCache for MemoryCache {
    fn get(&self, operator: &str, args: &[Value]) -> Option<Value> {
        self.entries
            .get(&(operator.to_string(), args.to_vec()))
            .cloned()
    }

    fn put(&mut self, operator: &str, args: &[Value], value: Value) {
        self.entries
            .insert((operator.to_string(), args.to_vec()), value);
    }
}

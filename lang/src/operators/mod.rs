//! The operator registry: three disjoint, statically-registered mappings
//! (simple operators, list operators, modifiers) plus the alias table.
//! Registered once at startup and never mutated by the evaluator.

use std::collections::{HashMap, HashSet};

use crate::evaluator::{EvalError, Evaluator, OpContext};
use crate::value::Value;

pub mod list;
pub mod math;


/// Per-position argument kind consulted at dispatch time.
///
/// `Default` slots broadcast; `List` slots receive a whole, pre-materialized
/// list; `Generator` slots receive the live sequence and are trusted to
/// consume it; `Function` slots expect a user function and never broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Default,
    List,
    Generator,
    Function,
}

pub type OperatorFn = fn(&mut OpContext, &[Value]) -> Result<Value, EvalError>;
pub type ModifierFn = fn(&mut Evaluator) -> Result<(), EvalError>;

pub struct OperatorDescriptor {
    pub name: &'static str,
    pub arity: usize,
    pub arg_kinds: &'static [ArgKind],
    pub callable: OperatorFn,
    pub is_list_operator: bool,
}

pub struct OperatorTable {
    simple: HashMap<&'static str, OperatorDescriptor>,
    list: HashMap<&'static str, OperatorDescriptor>,
    modifiers: HashMap<&'static str, ModifierFn>,
    aliases: HashMap<&'static str, &'static str>,
    function_operators: HashSet<&'static str>,
}

impl OperatorTable {
    pub fn simple_operator(&self, name: &str) -> Option<&OperatorDescriptor> {
        self.simple.get(name)
    }

    pub fn list_operator(&self, name: &str) -> Option<&OperatorDescriptor> {
        self.list.get(name)
    }

    /// Either kind of value-producing operator, simple first. Used by
    /// compiled user functions, which share the evaluator's dispatch.
    pub fn operator(&self, name: &str) -> Option<&OperatorDescriptor> {
        self.simple.get(name).or_else(|| self.list.get(name))
    }

    pub fn modifier(&self, name: &str) -> Option<ModifierFn> {
        self.modifiers.get(name).copied()
    }

    /// Canonical spelling of a term, collapsing aliases.
    pub fn resolve_alias<'a>(&self, term: &'a str) -> &'a str {
        match self.aliases.get(term) {
            Some(&canonical) => canonical,
            None => term,
        }
    }

    pub fn alias_target(&self, term: &str) -> Option<&'static str> {
        self.aliases.get(term).copied()
    }

    /// Operators that take a user function argument; seeing one ends
    /// lambda collection.
    pub fn is_function_operator(&self, name: &str) -> bool {
        self.function_operators.contains(name)
    }

    /// Every registered name and alias, for nearest-keyword suggestions.
    pub fn keywords(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.simple
            .keys()
            .chain(self.list.keys())
            .chain(self.modifiers.keys())
            .copied()
            .chain(self.aliases.keys().copied())
    }

    fn add_simple(
        &mut self,
        name: &'static str,
        arg_kinds: &'static [ArgKind],
        callable: OperatorFn,
    ) {
        self.simple.insert(
            name,
            OperatorDescriptor {
                name,
                arity: arg_kinds.len(),
                arg_kinds,
                callable,
                is_list_operator: false,
            },
        );
    }

    fn add_list(
        &mut self,
        name: &'static str,
        arg_kinds: &'static [ArgKind],
        callable: OperatorFn,
    ) {
        self.list.insert(
            name,
            OperatorDescriptor {
                name,
                arity: arg_kinds.len(),
                arg_kinds,
                callable,
                is_list_operator: true,
            },
        );
    }

    /// The full standard registry.
    pub fn standard() -> Self {
        use ArgKind::{Default, Function, Generator, List};

        let mut table = OperatorTable {
            simple: HashMap::new(),
            list: HashMap::new(),
            modifiers: HashMap::new(),
            aliases: HashMap::new(),
            function_operators: HashSet::new(),
        };

        // arithmetic
        table.add_simple("add", &[Default, Default], math::op_add);
        table.add_simple("subtract", &[Default, Default], math::op_subtract);
        table.add_simple("multiply", &[Default, Default], math::op_multiply);
        table.add_simple("divide", &[Default, Default], math::op_divide);
        table.add_simple("power", &[Default, Default], math::op_power);
        table.add_simple("modulo", &[Default, Default], math::op_modulo);
        table.add_simple("square", &[Default], math::op_square);
        table.add_simple("root", &[Default], math::op_root);
        table.add_simple("nth_root", &[Default, Default], math::op_nth_root);
        table.add_simple("negative", &[Default], math::op_negative);
        table.add_simple("absolute_value", &[Default], math::op_absolute_value);
        table.add_simple("reciprocal", &[Default], math::op_reciprocal);
        table.add_simple("floor", &[Default], math::op_floor);
        table.add_simple("ceiling", &[Default], math::op_ceiling);
        table.add_simple("nearest_int", &[Default], math::op_nearest_int);
        table.add_simple("sign", &[Default], math::op_sign);
        table.add_simple("factorial", &[Default], math::op_factorial);
        table.add_simple("fibonacci", &[Default], math::op_fibonacci);
        table.add_simple("ln", &[Default], math::op_ln);
        table.add_simple("log10", &[Default], math::op_log10);
        table.add_simple("exponential", &[Default], math::op_exponential);

        // comparisons
        table.add_simple("is_equal", &[Default, Default], math::op_is_equal);
        table.add_simple("is_greater", &[Default, Default], math::op_is_greater);
        table.add_simple("is_less", &[Default, Default], math::op_is_less);

        // sequence builders
        table.add_simple("range", &[Default, Default], math::op_range);
        table.add_simple(
            "interval_range",
            &[Default, Default, Default],
            math::op_interval_range,
        );
        table.add_simple(
            "geometric_range",
            &[Default, Default, Default],
            math::op_geometric_range,
        );
        table.add_simple(
            "exponential_range",
            &[Default, Default, Default],
            math::op_exponential_range,
        );

        // dates
        table.add_simple("now", &[], math::op_now);
        table.add_simple(
            "make_datetime",
            &[Default, Default, Default],
            math::op_make_datetime,
        );

        // output side effects
        table.add_simple("echo", &[Default], math::op_echo);

        // user-function application
        table.add_simple("eval0", &[Function], math::op_eval0);
        table.add_simple("eval", &[Default, Function], math::op_eval);
        table.add_simple("eval2", &[Default, Default, Function], math::op_eval2);
        table.add_simple(
            "eval3",
            &[Default, Default, Default, Function],
            math::op_eval3,
        );

        // list operators
        table.add_list("sum", &[List], list::op_sum);
        table.add_list("product", &[List], list::op_product);
        table.add_list("mean", &[List], list::op_mean);
        table.add_list("minimum", &[List], list::op_minimum);
        table.add_list("maximum", &[List], list::op_maximum);
        table.add_list("sort", &[List], list::op_sort);
        table.add_list("reverse", &[List], list::op_reverse);
        table.add_list("unique", &[List], list::op_unique);
        table.add_list("flatten", &[List], list::op_flatten);
        table.add_list("left", &[List, Default], list::op_left);
        table.add_list("right", &[List, Default], list::op_right);
        table.add_list("interleave", &[List, List], list::op_interleave);
        table.add_list("count", &[Generator], list::op_count);
        table.add_list("element", &[Generator, Default], list::op_element);
        table.add_list("filter", &[Generator, Function], list::op_filter);
        table.add_list("unfilter", &[Generator, Function], list::op_unfilter);
        table.add_list("for_each_list", &[Generator, Function], list::op_for_each_list);

        // modifiers
        table.modifiers.insert("[", Evaluator::modifier_open_bracket);
        table.modifiers.insert("]", Evaluator::modifier_close_bracket);
        table.modifiers.insert("(", Evaluator::modifier_open_operator_list);
        table.modifiers.insert(")", Evaluator::modifier_close_operator_list);
        table
            .modifiers
            .insert("duplicate_term", Evaluator::modifier_duplicate_term);
        table
            .modifiers
            .insert("duplicate_operator", Evaluator::modifier_duplicate_operator);
        table.modifiers.insert("previous", Evaluator::modifier_previous);
        table.modifiers.insert("unlist", Evaluator::modifier_unlist);
        table.modifiers.insert("lambda", Evaluator::modifier_lambda);
        table.modifiers.insert("x", Evaluator::modifier_placeholder);
        table.modifiers.insert("y", Evaluator::modifier_placeholder);
        table.modifiers.insert("z", Evaluator::modifier_placeholder);
        table
            .modifiers
            .insert("set_variable", Evaluator::modifier_set_variable);

        // operators that consume a lambda
        for name in ["eval0", "eval", "eval2", "eval3", "filter", "unfilter", "for_each_list"] {
            table.function_operators.insert(name);
        }

        // familiar spellings
        let aliases = [
            ("+", "add"),
            ("-", "subtract"),
            ("*", "multiply"),
            ("/", "divide"),
            ("**", "power"),
            ("^", "power"),
            ("%", "modulo"),
            ("!", "factorial"),
            ("sqr", "square"),
            ("sqrt", "root"),
            ("neg", "negative"),
            ("abs", "absolute_value"),
            ("inv", "reciprocal"),
            ("1/x", "reciprocal"),
            ("ceil", "ceiling"),
            ("round", "nearest_int"),
            ("fib", "fibonacci"),
            ("exp", "exponential"),
            ("log", "ln"),
            ("average", "mean"),
            ("avg", "mean"),
            ("min", "minimum"),
            ("max", "maximum"),
            ("prod", "product"),
            ("dup", "duplicate_term"),
            ("dupterm", "duplicate_term"),
            ("dupop", "duplicate_operator"),
            ("dup_op", "duplicate_operator"),
            ("prev", "previous"),
            ("georange", "geometric_range"),
            ("set", "set_variable"),
        ];
        for (alias, canonical) in aliases {
            table.aliases.insert(alias, canonical);
        }

        table
    }
}

//! User-defined functions. A `lambda` collects raw terms; the first arity
//! query or invocation freezes the buffer and compiles it into an
//! expression tree, which later invocations walk directly. No source code
//! is generated at any point.

use std::cell::RefCell;
use std::rc::Rc;

use crate::cache::OperatorCache;
use crate::operators::OperatorTable;
use crate::parser::parse_input_value;
use crate::units;
use crate::value::Value;

use super::{broadcast, EvalError, EvalState, OpContext};

/// The three placeholder variables a function may close over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    X,
    Y,
    Z,
}

impl Placeholder {
    fn from_term(term: &str) -> Option<Self> {
        match term {
            "x" => Some(Placeholder::X),
            "y" => Some(Placeholder::Y),
            "z" => Some(Placeholder::Z),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Placeholder::X => 0,
            Placeholder::Y => 1,
            Placeholder::Z => 2,
        }
    }
}

/// Compiled function body. Literals and operator calls over known operands
/// have already collapsed; only placeholder references remain free.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Placeholder(Placeholder),
    Call { name: String, args: Vec<Expr> },
    ListLiteral(Vec<Expr>),
}

pub struct CompiledFunction {
    pub body: Expr,
    /// Distinct placeholders the body references, in x < y < z order;
    /// invocation arguments bind positionally against this list.
    pub placeholders: Vec<Placeholder>,
}

/// State machine: collecting raw terms until first use, compiled
/// afterwards. The compiled tree is retained so later invocations skip
/// rebuilding.
pub struct UserFunction {
    terms: Vec<String>,
    compiled: Option<Rc<CompiledFunction>>,
}

impl UserFunction {
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            compiled: None,
        }
    }

    pub fn from_terms(terms: &[&str]) -> Self {
        Self {
            terms: terms.iter().map(|term| term.to_string()).collect(),
            compiled: None,
        }
    }

    /// Append a captured term. Only meaningful while collecting; the
    /// buffer freezes at first compile.
    pub fn capture(&mut self, term: &str) {
        debug_assert!(self.compiled.is_none(), "captured after compilation");
        self.terms.push(term.to_string());
    }

    pub fn captured_terms(&self) -> &[String] {
        &self.terms
    }

    /// Number of distinct placeholders the body references; compiles on
    /// first query.
    pub fn arity(&mut self, ctx: &mut OpContext) -> Result<usize, EvalError> {
        Ok(self.compile(ctx)?.placeholders.len())
    }

    pub fn compile(&mut self, ctx: &mut OpContext) -> Result<Rc<CompiledFunction>, EvalError> {
        if let Some(compiled) = &self.compiled {
            return Ok(Rc::clone(compiled));
        }

        let body = build_body(&self.terms, ctx)?;
        let mut placeholders = Vec::new();
        collect_placeholders(&body, &mut placeholders);
        placeholders.sort();
        placeholders.dedup();

        let compiled = Rc::new(CompiledFunction { body, placeholders });
        self.compiled = Some(Rc::clone(&compiled));
        Ok(compiled)
    }

    /// Invoke with exactly the function's arity; bindings map positionally
    /// onto the referenced placeholders in x < y < z order.
    pub fn evaluate(&mut self, ctx: &mut OpContext, args: &[Value]) -> Result<Value, EvalError> {
        let compiled = self.compile(ctx)?;

        if args.len() != compiled.placeholders.len() {
            return Err(EvalError::message(format!(
                "function expects {} argument{}, got {}",
                compiled.placeholders.len(),
                if compiled.placeholders.len() == 1 { "" } else { "s" },
                args.len()
            )));
        }

        let mut bindings: [Option<Value>; 3] = [None, None, None];
        for (placeholder, value) in compiled.placeholders.iter().zip(args) {
            bindings[placeholder.index()] = Some(value.clone());
        }

        eval_expr(&compiled.body, ctx, &bindings)
    }
}

impl Default for UserFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserFunction")
            .field("terms", &self.terms)
            .field("compiled", &self.compiled.is_some())
            .finish()
    }
}

/// Replay the captured terms with the evaluator's classification rules,
/// building expressions on an operand stack instead of values on the
/// operand stack.
fn build_body(terms: &[String], ctx: &mut OpContext) -> Result<Expr, EvalError> {
    let mut operands: Vec<Expr> = Vec::new();
    let mut list_stack: Vec<Vec<Expr>> = Vec::new();

    for raw in terms {
        let term = ctx.ops.resolve_alias(raw);

        if let Some(placeholder) = Placeholder::from_term(term) {
            push_expr(&mut operands, &mut list_stack, Expr::Placeholder(placeholder));
            continue;
        }

        if term == "[" {
            list_stack.push(Vec::new());
            continue;
        }

        if term == "]" {
            let elements = list_stack.pop().ok_or_else(|| {
                EvalError::message("unbalanced ']' in function definition")
            })?;
            push_expr(&mut operands, &mut list_stack, fold_list(elements));
            continue;
        }

        if let Some(value) = units::constant_value(term) {
            push_expr(&mut operands, &mut list_stack, Expr::Literal(value));
            continue;
        }

        if ctx.ops.operator(term).is_some() {
            let (name, arity) = {
                let desc = ctx.ops.operator(term).expect("just checked");
                (desc.name, desc.arity)
            };
            let target = current_target(&mut operands, &mut list_stack);
            if target.len() < arity {
                return Err(EvalError::message(format!(
                    "'{name}' expects {arity} operand{}",
                    if arity == 1 { "" } else { "s" }
                )));
            }
            let call_args = target.split_off(target.len() - arity);
            let expr = fold_call(ctx, name, call_args)?;
            push_expr(&mut operands, &mut list_stack, expr);
            continue;
        }

        if let Some(name) = term.strip_prefix('@') {
            inline_function(name, ctx, &mut operands, &mut list_stack)?;
            continue;
        }

        if let Some(name) = term.strip_prefix('$') {
            let value = ctx.state.variables.get(name).cloned().ok_or_else(|| {
                EvalError::message(format!("undefined variable '{name}'"))
            })?;
            push_expr(&mut operands, &mut list_stack, Expr::Literal(value));
            continue;
        }

        if ctx.ops.modifier(term).is_some() {
            return Err(EvalError::message(format!(
                "'{term}' is not allowed inside a function definition"
            )));
        }

        match parse_input_value(term, ctx.state.input_radix) {
            Ok(Some(value)) => {
                push_expr(&mut operands, &mut list_stack, Expr::Literal(value));
            }
            Ok(None) => {
                return Err(EvalError::message(format!(
                    "unrecognized term '{term}' in function definition"
                )))
            }
            Err(err) => return Err(EvalError::message(err.message)),
        }
    }

    if !list_stack.is_empty() {
        return Err(EvalError::message("unterminated list in function definition"));
    }
    if operands.len() != 1 {
        return Err(EvalError::message("incompletely specified function"));
    }
    Ok(operands.pop().expect("one operand"))
}

fn current_target<'a>(
    operands: &'a mut Vec<Expr>,
    list_stack: &'a mut Vec<Vec<Expr>>,
) -> &'a mut Vec<Expr> {
    list_stack.last_mut().unwrap_or(operands)
}

fn push_expr(operands: &mut Vec<Expr>, list_stack: &mut Vec<Vec<Expr>>, expr: Expr) {
    current_target(operands, list_stack).push(expr);
}

/// Operator applications over fully-known operands collapse at compile
/// time; anything with a free variable stays a call node.
fn fold_call(ctx: &mut OpContext, name: &str, args: Vec<Expr>) -> Result<Expr, EvalError> {
    if args.iter().all(|arg| matches!(arg, Expr::Literal(_))) {
        let values: Vec<Value> = args
            .into_iter()
            .map(|arg| match arg {
                Expr::Literal(value) => value,
                _ => unreachable!("all literals"),
            })
            .collect();
        let value = dispatch_call(ctx, name, values)?;
        return Ok(Expr::Literal(value));
    }
    Ok(Expr::Call {
        name: name.to_string(),
        args,
    })
}

fn fold_list(elements: Vec<Expr>) -> Expr {
    if elements.iter().all(|e| matches!(e, Expr::Literal(_))) {
        let values = elements
            .into_iter()
            .map(|e| match e {
                Expr::Literal(value) => value,
                _ => unreachable!("all literals"),
            })
            .collect();
        return Expr::Literal(Value::List(values));
    }
    Expr::ListLiteral(elements)
}

/// `@name` references inline by substitution: the callee's compiled body
/// is grafted in with our operand expressions bound to its placeholders.
fn inline_function(
    name: &str,
    ctx: &mut OpContext,
    operands: &mut Vec<Expr>,
    list_stack: &mut Vec<Vec<Expr>>,
) -> Result<(), EvalError> {
    let func = ctx.state.functions.get(name).cloned().ok_or_else(|| {
        EvalError::message(format!("reference to undefined function '{name}'"))
    })?;
    let compiled = {
        let mut borrowed = func.try_borrow_mut().map_err(|_| {
            EvalError::message("recursive function references are not supported")
        })?;
        borrowed.compile(ctx)?
    };

    let arity = compiled.placeholders.len();
    let target = current_target(operands, list_stack);
    if target.len() < arity {
        return Err(EvalError::message(format!(
            "'@{name}' expects {arity} operand{}",
            if arity == 1 { "" } else { "s" }
        )));
    }
    let call_args = target.split_off(target.len() - arity);
    let grafted = substitute(&compiled.body, &compiled.placeholders, &call_args);
    push_expr(operands, list_stack, grafted);
    Ok(())
}

fn substitute(body: &Expr, placeholders: &[Placeholder], args: &[Expr]) -> Expr {
    match body {
        Expr::Literal(value) => Expr::Literal(value.clone()),
        Expr::Placeholder(p) => {
            let position = placeholders
                .iter()
                .position(|candidate| candidate == p)
                .expect("body references only its own placeholders");
            args[position].clone()
        }
        Expr::Call { name, args: inner } => Expr::Call {
            name: name.clone(),
            args: inner
                .iter()
                .map(|arg| substitute(arg, placeholders, args))
                .collect(),
        },
        Expr::ListLiteral(elements) => Expr::ListLiteral(
            elements
                .iter()
                .map(|element| substitute(element, placeholders, args))
                .collect(),
        ),
    }
}

fn collect_placeholders(expr: &Expr, found: &mut Vec<Placeholder>) {
    match expr {
        Expr::Placeholder(p) => found.push(*p),
        Expr::Call { args, .. } => {
            for arg in args {
                collect_placeholders(arg, found);
            }
        }
        Expr::ListLiteral(elements) => {
            for element in elements {
                collect_placeholders(element, found);
            }
        }
        Expr::Literal(_) => {}
    }
}

fn eval_expr(
    expr: &Expr,
    ctx: &mut OpContext,
    bindings: &[Option<Value>; 3],
) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Placeholder(p) => bindings[p.index()]
            .clone()
            .ok_or_else(|| EvalError::message("unbound placeholder")),
        Expr::ListLiteral(elements) => {
            let mut values = im_rc::Vector::new();
            for element in elements {
                values.push_back(eval_expr(element, ctx, bindings)?);
            }
            Ok(Value::List(values))
        }
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, ctx, bindings)?);
            }
            dispatch_call(ctx, name, values)
        }
    }
}

fn dispatch_call(ctx: &mut OpContext, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    let ops = Rc::clone(ctx.ops);
    let desc = ops
        .operator(name)
        .ok_or_else(|| EvalError::message(format!("unrecognized operator '{name}'")))?;
    if desc.is_list_operator {
        broadcast::apply_list(ctx, desc, args)
    } else {
        broadcast::apply_simple(ctx, desc, args)
    }
}

/// What a compiled function needs to run outside the main evaluation loop:
/// the operator table, the shared cache, and the numeric configuration.
/// Lazy sequence operators capture one of these so their closures can
/// invoke functions at pull time.
pub struct FunctionEnv {
    ops: Rc<OperatorTable>,
    cache: Rc<RefCell<dyn OperatorCache>>,
    input_radix: u32,
    precision: usize,
}

impl FunctionEnv {
    pub fn capture(ctx: &OpContext) -> Self {
        Self {
            ops: Rc::clone(ctx.ops),
            cache: Rc::clone(&ctx.state.cache),
            input_radix: ctx.state.input_radix,
            precision: ctx.state.precision,
        }
    }

    /// Run with a detached context; state beyond the shared cache starts
    /// fresh each call.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut OpContext) -> R) -> R {
        let mut state = EvalState::scratch(self.input_radix, self.precision, Rc::clone(&self.cache));
        let mut ctx = OpContext {
            state: &mut state,
            ops: &self.ops,
        };
        f(&mut ctx)
    }
}

//! The tree-walking evaluator (`spec.md §4.7`, component **C7**).
//!
//! Grounded on `original_source/include/chaiscript/language/chaiscript_eval.hpp` for the
//! node-by-node evaluation shape (the teacher crate's own interpreter is a bytecode VM
//! with no tree-walking counterpart to adapt), re-expressed over `crate::parser`'s AST
//! and dispatched through `crate::dispatch`/`crate::proxy_function` the way the rest of
//! this crate already does.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::boxed_value::{BadCast, BoxedValue};
use crate::conversions::TypeConversions;
use crate::dispatch::{DispatchEngine, DispatchState, LocCache, NameError, NotFound};
use crate::parser::{AssignOp, BinOp, CaseArm, CatchArm, CodeRange, Literal, Node, NodeKind, Param, PrefixOp};
use crate::proxy_function::{self, AttributeAccess, CallBody, DispatchError, DynamicFunction, ProxyFunction};
use crate::type_tag::TypeTag;

/// Script-visible array/object representation. A bare `Vec<BoxedValue>`/`IndexMap`
/// rather than a dedicated wrapper type, so stdlib primitives (`size`, `[]`, `push_back`,
/// ...) can operate on it with plain `with_ref`/`with_mut` downcasts.
pub type MapValue = IndexMap<String, BoxedValue>;

/// One entry of the call-stack diagnostic attached to an [`EvalError`]
/// (`spec.md §7`: "carries a call stack of function names and source locations").
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub function_name: String,
    pub range: CodeRange,
}

/// The payload of an [`EvalError`].
///
/// `Thrown` is kept distinct from `Dispatch` so catch-matching (`crate::eval::try_catch`)
/// can hand a script `catch` clause the exact [`BoxedValue`] that was thrown, rather than
/// a value synthesized after the fact.
#[derive(Debug, Clone)]
pub enum EvalErrorKind {
    Thrown(BoxedValue),
    Dispatch(DispatchError),
    BadCast(BadCast),
    Name(NameError),
    NotFound(String),
    Arithmetic(String),
    Message(String),
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thrown(v) => write!(f, "unhandled exception of type '{}'", v.get_type()),
            Self::Dispatch(e) => write!(f, "{e}"),
            Self::BadCast(e) => write!(f, "{e}"),
            Self::Name(e) => write!(f, "{e}"),
            Self::NotFound(name) => write!(f, "object not known: {name}"),
            Self::Arithmetic(msg) => write!(f, "arithmetic error: {msg}"),
            Self::Message(msg) => write!(f, "{msg}"),
        }
    }
}

/// A runtime failure, carrying the source range it occurred at and a partial call
/// stack (`spec.md §7`).
///
/// Each dispatch-boundary crossing (`DispatchError` surfacing back into `eval`) adds one
/// [`StackFrame`] rather than the full chain of nested script calls below it — a
/// `DispatchError::Thrown` only carries the thrown `BoxedValue`, not the stack the inner
/// `EvalError` had accumulated, so crossing that boundary is necessarily lossy. Accepted
/// as a diagnostic simplification; see `DESIGN.md`.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub range: CodeRange,
    pub stack: Vec<StackFrame>,
}

impl EvalError {
    fn simple(kind: EvalErrorKind, range: CodeRange) -> Self {
        Self { kind, range, stack: Vec::new() }
    }

    /// Converts this error into the exception object a script `catch` would see — the
    /// thrown value directly for `Thrown`, otherwise a synthesized `ExceptionValue`
    /// (`spec.md §6`'s exception hierarchy) so every runtime failure is catchable.
    #[must_use]
    pub fn into_exception(self) -> BoxedValue {
        match self.kind {
            EvalErrorKind::Thrown(v) => v,
            EvalErrorKind::Dispatch(e) => exception_bv("runtime_error", e.to_string()),
            EvalErrorKind::BadCast(e) => exception_bv("runtime_error", e.to_string()),
            EvalErrorKind::Name(e) => exception_bv("runtime_error", e.to_string()),
            EvalErrorKind::NotFound(name) => exception_bv("runtime_error", format!("'{name}' does not exist")),
            EvalErrorKind::Arithmetic(msg) => exception_bv("arithmetic_error", msg),
            EvalErrorKind::Message(msg) => exception_bv("eval_error", msg),
        }
    }

    /// Converts this error into the form `CallBody::call` returns, for a script function
    /// body's failure to cross back out through `proxy_function::resolve_and_call`.
    #[must_use]
    pub fn into_dispatch_error(self) -> DispatchError {
        DispatchError::Thrown(self.into_exception())
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} at {}", self.kind, self.range)?;
        for frame in self.stack.iter().rev() {
            writeln!(f, "  in {} at {}", frame.function_name, frame.range)?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}

fn dispatch_err_to_eval(e: DispatchError, fn_name: &str, range: &CodeRange) -> EvalError {
    let kind = match e {
        DispatchError::Thrown(v) => EvalErrorKind::Thrown(v),
        other => EvalErrorKind::Dispatch(other),
    };
    EvalError { kind, range: range.clone(), stack: vec![StackFrame { function_name: fn_name.to_string(), range: range.clone() }] }
}

/// What one `eval` call produced: either an ordinary value, or one of the three
/// control-flow signals that must be threaded explicitly back up through enclosing
/// statements rather than unwound as an error (`spec.md §4.7`).
///
/// A script `throw` is deliberately *not* a `Signal` variant — it needs genuine
/// Rust-level unwinding via `?`, so it propagates as `Err(EvalError)` instead.
#[derive(Debug)]
pub enum Signal {
    Value(BoxedValue),
    Return(BoxedValue),
    Break,
    Continue,
}

/// Host representation of a script exception object (`spec.md §6`): `runtime_error`,
/// `out_of_range`, `logic_error`, `arithmetic_error`, `eval_error`, and the `exception`
/// base all share this shape, distinguished by `class_name` alone (there is no dedicated
/// Rust type per exception class, matching `ScriptObject`'s own by-name class identity).
#[derive(Debug, Clone)]
pub struct ExceptionValue {
    pub class_name: String,
    pub message: String,
}

#[must_use]
pub fn exception_bv(class_name: impl Into<String>, message: impl Into<String>) -> BoxedValue {
    BoxedValue::from_value(ExceptionValue { class_name: class_name.into(), message: message.into() })
}

/// Host representation of a script `class` instance. Every script-defined class shares
/// this one Rust type; `class_name` (not `TypeTag`, which Rust can't mint at runtime) is
/// what distinguishes instances of one class from another for dispatch purposes — see
/// [`MethodGuard`].
#[derive(Debug, Clone)]
pub struct ScriptObject {
    pub class_name: Rc<str>,
}

/// Marker stored by an `AssignDecl` (`&name;`) until the next assignment fills it.
/// `eval_equation`'s plain-`=` handling special-cases a name currently holding this type:
/// instead of the usual adopt-and-clone, it aliases the right-hand side's handle
/// directly, giving `&x` true reference-slot semantics (`spec.md §4.6`).
#[derive(Debug, Clone, Copy)]
pub struct RefPending;

/// Top-level entry point: evaluates one AST node against `state`.
pub fn eval(node: &Node, state: &mut DispatchState) -> Result<Signal, EvalError> {
    match &node.kind {
        NodeKind::Id(name, loc_cache) => state
            .get_object(name, loc_cache)
            .map(Signal::Value)
            .map_err(|e| EvalError::simple(EvalErrorKind::NotFound(e.name), node.range.clone())),
        NodeKind::Constant(lit) => Ok(Signal::Value(literal_to_value(lit))),
        NodeKind::FunCall { callee, args } => eval_funcall(callee, args, &node.range, state),
        NodeKind::UnusedReturnFunCall { callee, args } => eval_funcall(callee, args, &node.range, state),
        NodeKind::ArgList(items) => eval_stmts(items, state),
        NodeKind::Arg(inner) => eval(inner, state),
        NodeKind::Equation { op, lhs, rhs } => eval_equation(*op, lhs, rhs, &node.range, state),
        NodeKind::VarDecl { name, init } => {
            let value = match init {
                Some(expr) => adopt(eval_expr(expr, state)?, state),
                None => BoxedValue::undefined(),
            };
            state.declare(name.clone(), value.clone_handle());
            Ok(Signal::Value(value))
        }
        NodeKind::AssignDecl { name } => {
            let placeholder = BoxedValue::from_value(RefPending);
            state.declare(name.clone(), placeholder.clone_handle());
            Ok(Signal::Value(placeholder))
        }
        NodeKind::GlobalDecl { name, init } => {
            let value = match init {
                Some(expr) => adopt(eval_expr(expr, state)?, state),
                None => BoxedValue::undefined(),
            };
            state.engine.add_global_const(name, value.clone_handle()).map_err(|e| EvalError::simple(EvalErrorKind::Name(e), node.range.clone()))?;
            Ok(Signal::Value(value))
        }
        NodeKind::ArrayCall { target, index } => {
            let target_bv = eval_expr(target, state)?;
            let index_bv = eval_expr(index, state)?;
            read_index(&target_bv, &index_bv, state, &node.range)
        }
        NodeKind::DotAccess { target, member } => {
            let target_bv = eval_expr(target, state)?;
            state
                .call_member(member, &[target_bv], false)
                .map(Signal::Value)
                .map_err(|e| dispatch_err_to_eval(e, member, &node.range))
        }
        NodeKind::Lambda { captures, params, body } => eval_lambda(captures, params, body, state),
        NodeKind::Block(stmts) => {
            state.new_scope();
            let result = eval_stmts(stmts, state);
            state.pop_scope();
            result
        }
        NodeKind::ScopelessBlock(stmts) => eval_stmts(stmts, state),
        NodeKind::Def { name, params, guard, body } => {
            register_def(name, params, guard.as_deref(), body, state, &node.range)?;
            Ok(Signal::Value(BoxedValue::undefined()))
        }
        NodeKind::Method { class_name, name, params, guard, body } => {
            register_method(class_name, name, params, guard.as_deref(), body, state, &node.range)?;
            Ok(Signal::Value(BoxedValue::undefined()))
        }
        NodeKind::AttrDecl { class_name: _, name } => {
            // Registers an `AttributeAccess` getter under the bare field name so that
            // `call_member`'s named-overload-set lookup sees it, and (thanks to its
            // exact-bare-type `call_match`) the arity-score scan in
            // `proxy_function::resolve_and_call` prefers it over a same-named method
            // (`spec.md §9`: "member-access lookup prefers it"). Every script object
            // shares one Rust `TypeTag` (`ScriptObject`), so the same attribute name
            // declared on two different classes registers the identical signature —
            // that's an intentional re-registration, not a conflict, since attribute
            // reads go through the per-object attribute map by name regardless of which
            // class declared it.
            let getter: Rc<dyn ProxyFunction> = Rc::new(AttributeAccess::new(name.clone(), TypeTag::of::<ScriptObject>()));
            match state.engine.add_function(name, getter) {
                Ok(()) | Err(NameError::Conflict(_)) => {}
                Err(e) => return Err(EvalError::simple(EvalErrorKind::Name(e), node.range.clone())),
            }
            Ok(Signal::Value(BoxedValue::undefined()))
        }
        NodeKind::While { cond, body } => {
            state.new_scope();
            let result = run_while(cond, body, state);
            state.pop_scope();
            result
        }
        NodeKind::If { arms, else_body } => {
            for (cond, body) in arms {
                if truthy(&eval_expr(cond, state)?, &cond.range)? {
                    return eval(body, state);
                }
            }
            match else_body {
                Some(b) => eval(b, state),
                None => Ok(Signal::Value(BoxedValue::undefined())),
            }
        }
        NodeKind::TernaryCond { cond, then, otherwise } => {
            if truthy(&eval_expr(cond, state)?, &cond.range)? {
                eval(then, state)
            } else {
                eval(otherwise, state)
            }
        }
        NodeKind::For { init, cond, step, body } => {
            state.new_scope();
            let result = run_for(init.as_deref(), cond.as_deref(), step.as_deref(), body, state);
            state.pop_scope();
            result
        }
        NodeKind::CompiledCountingFor { var_name, start, end, body } => {
            state.new_scope();
            let result = run_compiled_counting_for(var_name, *start, *end, body, state);
            state.pop_scope();
            result
        }
        NodeKind::RangedFor { var_name, range, body } => {
            state.new_scope();
            let result = run_ranged_for(var_name, range, body, state);
            state.pop_scope();
            result
        }
        NodeKind::Switch { discriminant, arms } => {
            let disc = eval_expr(discriminant, state)?;
            state.new_scope();
            let result = run_switch(&disc, arms, state, &node.range);
            state.pop_scope();
            result
        }
        NodeKind::InlineArray(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(adopt(eval_expr(item, state)?, state));
            }
            Ok(Signal::Value(BoxedValue::from_value(values)))
        }
        NodeKind::InlineMap(pairs) => {
            let mut map = MapValue::new();
            for (k, v) in pairs {
                let key_bv = eval_expr(k, state)?;
                let key = key_bv
                    .try_clone_to::<String>()
                    .map_err(|_| EvalError::simple(EvalErrorKind::Message("map keys must be strings".to_string()), k.range.clone()))?;
                let value = adopt(eval_expr(v, state)?, state);
                map.insert(key, value);
            }
            Ok(Signal::Value(BoxedValue::from_value(map)))
        }
        NodeKind::InlineRange { from, to } => {
            let a = eval_expr(from, state)?;
            let b = eval_expr(to, state)?;
            state
                .call_function("generate_range", &[a, b])
                .map(Signal::Value)
                .map_err(|e| dispatch_err_to_eval(e, "generate_range", &node.range))
        }
        NodeKind::Return(expr) => {
            let mut v = match expr {
                Some(e) => eval_expr(e, state)?,
                None => BoxedValue::undefined(),
            };
            v.mark_return_value();
            Ok(Signal::Return(v))
        }
        NodeKind::Break => Ok(Signal::Break),
        NodeKind::Continue => Ok(Signal::Continue),
        NodeKind::Try { body, catches, finally } => run_try(body, catches, finally.as_deref(), state),
        NodeKind::Class { name: _, body } => {
            // `Method`/`AttrDecl` nodes already carry their owning `class_name` directly
            // (the parser attaches it at parse time), so a class body is just a plain
            // sequence of registrations; no scope-sentinel is needed to pass it down.
            eval(body, state)?;
            Ok(Signal::Value(BoxedValue::undefined()))
        }
        NodeKind::Binary { op, lhs, rhs } => {
            let a = eval_expr(lhs, state)?;
            let b = eval_expr(rhs, state)?;
            if let Some(r) = numeric_binop(*op, &a, &b, &node.range) {
                return Ok(Signal::Value(r?));
            }
            state
                .call_function(op.as_str(), &[a, b])
                .map(Signal::Value)
                .map_err(|e| dispatch_err_to_eval(e, op.as_str(), &node.range))
        }
        NodeKind::Prefix { op, operand } => eval_prefix(*op, operand, &node.range, state),
        NodeKind::PartialFoldBinary { op, lhs, rhs } => {
            let a = eval_expr(lhs, state)?;
            let b = literal_to_value(rhs);
            if let Some(r) = numeric_binop(*op, &a, &b, &node.range) {
                return Ok(Signal::Value(r?));
            }
            state
                .call_function(op.as_str(), &[a, b])
                .map(Signal::Value)
                .map_err(|e| dispatch_err_to_eval(e, op.as_str(), &node.range))
        }
        NodeKind::LogicalAnd { lhs, rhs } => {
            let a = eval_expr(lhs, state)?;
            if !truthy(&a, &node.range)? {
                return Ok(Signal::Value(BoxedValue::from_value(false)));
            }
            let b = eval_expr(rhs, state)?;
            Ok(Signal::Value(BoxedValue::from_value(truthy(&b, &node.range)?)))
        }
        NodeKind::LogicalOr { lhs, rhs } => {
            let a = eval_expr(lhs, state)?;
            if truthy(&a, &node.range)? {
                return Ok(Signal::Value(BoxedValue::from_value(true)));
            }
            let b = eval_expr(rhs, state)?;
            Ok(Signal::Value(BoxedValue::from_value(truthy(&b, &node.range)?)))
        }
        // `BoxedValue` already aliases storage through `Rc`, so an explicit `&expr` call
        // argument needs no distinct by-reference representation.
        NodeKind::Reference(inner) => eval(inner, state),
        NodeKind::File(stmts) => eval_file(stmts, &node.range, state),
        NodeKind::Noop => Ok(Signal::Value(BoxedValue::undefined())),
    }
}

/// Evaluates `node`, requiring an ordinary value — errors if it yields a stray
/// `Return`/`Break`/`Continue` (those are only valid directly inside a function body or
/// loop, never nested inside an expression).
fn eval_expr(node: &Node, state: &mut DispatchState) -> Result<BoxedValue, EvalError> {
    match eval(node, state)? {
        Signal::Value(v) => Ok(v),
        Signal::Return(_) => Err(EvalError::simple(EvalErrorKind::Message("'return' used outside a function body".to_string()), node.range.clone())),
        Signal::Break => Err(EvalError::simple(EvalErrorKind::Message("'break' used outside a loop".to_string()), node.range.clone())),
        Signal::Continue => Err(EvalError::simple(EvalErrorKind::Message("'continue' used outside a loop".to_string()), node.range.clone())),
    }
}

/// Evaluates a statement sequence, propagating the first non-`Value` signal or error
/// immediately and otherwise returning the last statement's value (`spec.md §4.7`).
fn eval_stmts(stmts: &[Node], state: &mut DispatchState) -> Result<Signal, EvalError> {
    let mut last = Signal::Value(BoxedValue::undefined());
    for stmt in stmts {
        last = eval(stmt, state)?;
        if !matches!(last, Signal::Value(_)) {
            return Ok(last);
        }
    }
    Ok(last)
}

fn eval_file(stmts: &[Node], range: &CodeRange, state: &mut DispatchState) -> Result<Signal, EvalError> {
    match eval_stmts(stmts, state)? {
        Signal::Value(v) => Ok(Signal::Value(v)),
        Signal::Return(v) => Ok(Signal::Value(v)),
        Signal::Break => Err(EvalError::simple(EvalErrorKind::Message("unexpected 'break' outside a loop".to_string()), range.clone())),
        Signal::Continue => Err(EvalError::simple(EvalErrorKind::Message("unexpected 'continue' outside a loop".to_string()), range.clone())),
    }
}

fn literal_to_value(lit: &Literal) -> BoxedValue {
    match lit {
        Literal::Bool(b) => BoxedValue::from_value(*b),
        Literal::Int(i) => BoxedValue::from_value(*i),
        Literal::Float(f) => BoxedValue::from_value(*f),
        Literal::Str(s) => BoxedValue::from_value(s.clone()),
        Literal::Char(c) => BoxedValue::from_value(*c),
    }
}

fn truthy(bv: &BoxedValue, range: &CodeRange) -> Result<bool, EvalError> {
    bv.try_clone_to::<bool>()
        .map_err(|_| EvalError::simple(EvalErrorKind::Message(format!("expected a boolean-coercible value, found '{}'", bv.get_type())), range.clone()))
}

/// Adopts an already-evaluated right-hand side into a declaration/assignment
/// (`spec.md §4.7`): a return value is taken as-is (its identity must survive, since it
/// may alias a value the caller is about to use), anything else is cloned through the
/// stdlib `clone` primitive so two names never alias the same storage by accident.
fn adopt(rhs: BoxedValue, state: &mut DispatchState) -> BoxedValue {
    if rhs.is_return_value() {
        let mut v = rhs;
        v.clear_return_value();
        return v;
    }
    match state.call_function("clone", std::slice::from_ref(&rhs)) {
        Ok(cloned) => cloned,
        Err(_) => rhs.clone_handle(),
    }
}

// ---------------------------------------------------------------------------------
// Function calls
// ---------------------------------------------------------------------------------

fn eval_funcall(callee: &Node, arg_nodes: &[Node], range: &CodeRange, state: &mut DispatchState) -> Result<Signal, EvalError> {
    let mut arg_values = Vec::with_capacity(arg_nodes.len());
    for a in arg_nodes {
        arg_values.push(eval_expr(a, state)?);
    }

    if let NodeKind::DotAccess { target, member } = &callee.kind {
        let receiver = eval_expr(target, state)?;
        let mut call_args = Vec::with_capacity(arg_values.len() + 1);
        call_args.push(receiver);
        call_args.extend(arg_values);
        let result = state.call_member(member, &call_args, true).map_err(|e| dispatch_err_to_eval(e, member, range))?;
        return Ok(Signal::Value(result));
    }

    if let NodeKind::Id(name, _) = &callee.kind {
        // Named calls go straight through the registry (this also pushes a call frame
        // for diagnostics); falls through to generic value-calling only when `name`
        // isn't a registered function (a local variable holding a lambda, say).
        if state.engine.get_functions(name).is_some() {
            let result = state.call_function(name, &arg_values).map_err(|e| dispatch_err_to_eval(e, name, range))?;
            return Ok(Signal::Value(result));
        }
    }

    let callee_value = eval_expr(callee, state)?;
    let callable = callee_value
        .try_clone_to::<Rc<dyn ProxyFunction>>()
        .map_err(|_| EvalError::simple(EvalErrorKind::Message(format!("value of type '{}' is not callable", callee_value.get_type())), range.clone()))?;
    let result = callable.call(&arg_values, state.engine.conversions()).map_err(|e| dispatch_err_to_eval(e, "<call>", range))?;
    Ok(Signal::Value(result))
}

fn eval_lambda(captures: &[String], params: &[Param], body: &Node, state: &mut DispatchState) -> Result<Signal, EvalError> {
    let mut capture_map = IndexMap::new();
    for name in captures {
        let cache = LocCache::new();
        if let Ok(v) = state.get_object(name, &cache) {
            capture_map.insert(name.clone(), v);
        }
    }
    let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    let arity = param_names.len() as i32;
    let names: Vec<Option<String>> = param_names.iter().cloned().map(Some).collect();
    let call_body = ScriptBody {
        engine: Rc::clone(&state.engine),
        constructs: None,
        param_names,
        captures: capture_map,
        body: Rc::new(body.clone()),
    };
    let callable: Rc<dyn ProxyFunction> = Rc::new(DynamicFunction::new(arity, names, Rc::new(call_body), None, "lambda".to_string()));
    Ok(Signal::Value(BoxedValue::from_value(callable)))
}

fn register_def(name: &str, params: &[Param], guard: Option<&Node>, body: &Node, state: &mut DispatchState, range: &CodeRange) -> Result<(), EvalError> {
    let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    let arity = param_names.len() as i32;
    let names: Vec<Option<String>> = param_names.iter().cloned().map(Some).collect();

    let guard_fn = match guard {
        Some(g) => {
            let guard_body = ScriptBody {
                engine: Rc::clone(&state.engine),
                constructs: None,
                param_names: param_names.clone(),
                captures: IndexMap::new(),
                body: Rc::new(g.clone()),
            };
            Some(Rc::new(DynamicFunction::new(arity, names.clone(), Rc::new(guard_body), None, format!("{name}::guard"))) as Rc<dyn ProxyFunction>)
        }
        None => None,
    };

    let call_body = ScriptBody { engine: Rc::clone(&state.engine), constructs: None, param_names, captures: IndexMap::new(), body: Rc::new(body.clone()) };
    let f = DynamicFunction::new(arity, names, Rc::new(call_body), guard_fn, name.to_string());
    state.engine.add_function(name, Rc::new(f)).map_err(|e| EvalError::simple(EvalErrorKind::Name(e), range.clone()))
}

fn register_method(
    class_name: &str,
    name: &str,
    params: &[Param],
    guard: Option<&Node>,
    body: &Node,
    state: &mut DispatchState,
    range: &CodeRange,
) -> Result<(), EvalError> {
    let user_param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();

    // A method whose name matches its class becomes the constructor: called like a free
    // function (`P(7)`, no receiver yet), it builds a fresh `this` internally rather
    // than receiving one as `args[0]` (`spec.md §4.6`).
    if name == class_name {
        let arity = user_param_names.len() as i32;
        let names: Vec<Option<String>> = user_param_names.iter().cloned().map(Some).collect();
        let ctor_body = ScriptBody {
            engine: Rc::clone(&state.engine),
            constructs: Some(Rc::from(class_name)),
            param_names: user_param_names,
            captures: IndexMap::new(),
            body: Rc::new(body.clone()),
        };
        let f = DynamicFunction::new(arity, names, Rc::new(ctor_body), None, class_name.to_string());
        return state.engine.add_function(class_name, Rc::new(f)).map_err(|e| EvalError::simple(EvalErrorKind::Name(e), range.clone()));
    }

    let mut method_param_names = Vec::with_capacity(user_param_names.len() + 1);
    method_param_names.push("this".to_string());
    method_param_names.extend(user_param_names);
    let arity = method_param_names.len() as i32;
    let names: Vec<Option<String>> = method_param_names.iter().cloned().map(Some).collect();

    let user_guard = match guard {
        Some(g) => {
            let guard_body = ScriptBody {
                engine: Rc::clone(&state.engine),
                constructs: None,
                param_names: method_param_names.clone(),
                captures: IndexMap::new(),
                body: Rc::new(g.clone()),
            };
            Some(Rc::new(DynamicFunction::new(arity, names.clone(), Rc::new(guard_body), None, format!("{class_name}::{name}::guard"))) as Rc<dyn ProxyFunction>)
        }
        None => None,
    };
    let class_guard: Rc<dyn ProxyFunction> = Rc::new(MethodGuard { class_name: Rc::from(class_name), user_guard });

    let method_body = ScriptBody {
        engine: Rc::clone(&state.engine),
        constructs: None,
        param_names: method_param_names,
        captures: IndexMap::new(),
        body: Rc::new(body.clone()),
    };
    let f = DynamicFunction::new(arity, names, Rc::new(method_body), Some(class_guard), format!("{class_name}::{name}"));
    state.engine.add_function(name, Rc::new(f)).map_err(|e| EvalError::simple(EvalErrorKind::Name(e), range.clone()))
}

/// Guard composed for a `Method`: rejects any receiver that isn't a [`ScriptObject`] of
/// the owning class, then (if the method itself declared one) defers to the user guard.
/// Needed because every script class shares the same Rust `TypeTag` (`ScriptObject`), so
/// `TypeTag`-based dispatch alone can't tell class `P`'s `describe` apart from class
/// `Q`'s; the class name is checked here, by value, instead.
#[derive(Debug)]
struct MethodGuard {
    class_name: Rc<str>,
    user_guard: Option<Rc<dyn ProxyFunction>>,
}

impl ProxyFunction for MethodGuard {
    fn arity(&self) -> i32 {
        -1
    }

    fn param_types(&self) -> &[TypeTag] {
        &[]
    }

    fn call(&self, args: &[BoxedValue], conversions: &TypeConversions) -> Result<BoxedValue, DispatchError> {
        let matches_class = args.first().is_some_and(|bv| bv.with_ref::<ScriptObject, bool>(|o| *o.class_name == *self.class_name).unwrap_or(false));
        if !matches_class {
            return Ok(BoxedValue::from_value(false));
        }
        match &self.user_guard {
            Some(g) => g.call(args, conversions),
            None => Ok(BoxedValue::from_value(true)),
        }
    }
}

/// A script function's body (`Def`/`Method`/`Lambda`), run by spinning up a fresh
/// [`DispatchState`] on every call — a function's scope chain never outlives that call,
/// which is exactly what lets this struct own an `Rc<DispatchEngine>` instead of
/// borrowing the `DispatchState` that happened to define it.
///
/// Note: storing this inside the engine's own function registry while it holds an
/// `Rc<DispatchEngine>` creates a reference cycle that's never collected. Accepted —
/// engines live for the whole host program, same as `BoxedValue`'s no-cycle-collector
/// stance for attribute maps (`DESIGN.md`).
pub struct ScriptBody {
    engine: Rc<DispatchEngine>,
    /// `Some(class_name)` marks this as a constructor body: instead of receiving `this`
    /// as `args[0]`, it builds a fresh [`ScriptObject`] of `class_name` before running.
    constructs: Option<Rc<str>>,
    param_names: Vec<String>,
    captures: IndexMap<String, BoxedValue>,
    body: Rc<Node>,
}

impl fmt::Debug for ScriptBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptBody").field("param_names", &self.param_names).field("constructs", &self.constructs).finish()
    }
}

impl CallBody for ScriptBody {
    fn call(&self, args: &[BoxedValue], _conversions: &TypeConversions) -> Result<BoxedValue, DispatchError> {
        let _depth_guard = self
            .engine
            .enter_call()
            .map_err(|()| DispatchError::Thrown(exception_bv("eval_error", "maximum recursion depth exceeded")))?;
        let mut state = DispatchState::new(Rc::clone(&self.engine));
        for (name, value) in &self.captures {
            state.declare(name.clone(), value.clone_handle());
        }

        let is_constructor = if let Some(class_name) = &self.constructs {
            let this = BoxedValue::from_value(ScriptObject { class_name: Rc::clone(class_name) });
            state.declare("this", this);
            true
        } else {
            false
        };

        for (name, value) in self.param_names.iter().zip(args) {
            state.declare(name.clone(), value.clone_handle());
        }

        let outcome = eval(&self.body, &mut state);

        if is_constructor {
            outcome.map_err(EvalError::into_dispatch_error)?;
            // Field writes during the body (`this.x = x;`) go through `store_into`,
            // which writes each mutated clone back into the scope slot — so the
            // constructed object to return is whatever "this" ended up holding in
            // scope, not the empty handle declared before the body ran.
            let cache = LocCache::new();
            let mut this = state.get_object("this", &cache).expect("'this' was just declared in this scope");
            this.mark_return_value();
            return Ok(this);
        }

        match outcome {
            Ok(Signal::Value(v) | Signal::Return(v)) => Ok(v),
            Ok(Signal::Break | Signal::Continue) => Err(DispatchError::Thrown(exception_bv("eval_error", "'break'/'continue' used outside a loop"))),
            Err(e) => Err(e.into_dispatch_error()),
        }
    }
}

// ---------------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------------

fn eval_equation(op: AssignOp, lhs: &Node, rhs: &Node, range: &CodeRange, state: &mut DispatchState) -> Result<Signal, EvalError> {
    let rhs_value = eval_expr(rhs, state)?;

    if let Some(binop) = op.underlying_binop() {
        let current = eval_expr(lhs, state)?;
        let computed = match numeric_binop(binop, &current, &rhs_value, range) {
            Some(r) => r?,
            None => state.call_function(binop.as_str(), &[current.clone_handle(), rhs_value.clone_handle()]).map_err(|e| dispatch_err_to_eval(e, binop.as_str(), range))?,
        };
        store_into(lhs, computed.clone_handle(), state, range)?;
        return Ok(Signal::Value(computed));
    }

    if op == AssignOp::Bind {
        store_into(lhs, rhs_value.clone_handle(), state, range)?;
        return Ok(Signal::Value(rhs_value));
    }

    // Plain `=`.
    let new_value = if let NodeKind::Id(name, loc_cache) = &lhs.kind {
        let current = state.get_object(name, loc_cache).ok();
        let is_ref_pending = current.as_ref().is_some_and(|v| v.get_type().bare_equal(&TypeTag::of::<RefPending>()));
        let is_undef = match &current {
            Some(v) => v.is_undefined(),
            None => true,
        };
        if is_ref_pending {
            rhs_value.clone_handle()
        } else if is_undef || state.engine.get_functions("=").is_none() {
            adopt(rhs_value, state)
        } else {
            state
                .call_function("=", &[current.expect("checked is_undef above"), rhs_value.clone_handle()])
                .map_err(|e| dispatch_err_to_eval(e, "=", range))?
        }
    } else {
        adopt(rhs_value, state)
    };

    store_into(lhs, new_value.clone_handle(), state, range)?;
    Ok(Signal::Value(new_value))
}

fn store_into(lhs: &Node, value: BoxedValue, state: &mut DispatchState, range: &CodeRange) -> Result<(), EvalError> {
    match &lhs.kind {
        NodeKind::Id(name, _) => {
            if state.set_object(name, value.clone_handle()).is_err() {
                state.declare(name.clone(), value);
            }
            Ok(())
        }
        NodeKind::ArrayCall { target, index } => {
            let target_bv = eval_expr(target, state)?;
            let index_bv = eval_expr(index, state)?;
            assign_index(&target_bv, &index_bv, value, state, range)
        }
        NodeKind::DotAccess { target, member } => {
            // `attrs` is lazily created per-handle (`BoxedValue::get_attr`/`set_attr`), so
            // writing through a disposable clone wouldn't be visible from any other
            // handle aliasing the same object. Writing the mutated clone back into
            // `target`'s own slot (recursing through `store_into` the same way a plain
            // `Id` target does) is what makes the attribute stick.
            let mut target_bv = eval_expr(target, state)?;
            target_bv.set_attr(member, value);
            store_into(target, target_bv, state, range)
        }
        _ => Err(EvalError::simple(EvalErrorKind::Message("invalid assignment target".to_string()), range.clone())),
    }
}

fn assign_index(target: &BoxedValue, index: &BoxedValue, value: BoxedValue, state: &mut DispatchState, range: &CodeRange) -> Result<(), EvalError> {
    if let Ok(i) = index.try_clone_to::<i64>() {
        let attempted = target.with_mut::<Vec<BoxedValue>, Result<(), EvalError>>(|v| {
            let idx = usize::try_from(i).map_err(|_| EvalError::simple(EvalErrorKind::Message(format!("negative index {i}")), range.clone()))?;
            if idx >= v.len() {
                v.resize_with(idx + 1, BoxedValue::undefined);
            }
            v[idx] = value.clone_handle();
            Ok(())
        });
        if let Ok(result) = attempted {
            return result;
        }
    } else if let Ok(k) = index.try_clone_to::<String>() {
        if target
            .with_mut::<MapValue, ()>(|m| {
                m.insert(k, value.clone_handle());
            })
            .is_ok()
        {
            return Ok(());
        }
    }
    // Not a built-in `Vec`/`MapValue` receiver: fall through to a host- or
    // script-registered `[]` overload, the same way every other operator dispatches
    // (`spec.md §4.6`'s "indexing is just another overloadable operator").
    state
        .call_function("[]", &[target.clone_handle(), index.clone_handle(), value])
        .map(|_| ())
        .map_err(|e| dispatch_err_to_eval(e, "[]", range))
}

fn read_index(target: &BoxedValue, index: &BoxedValue, state: &mut DispatchState, range: &CodeRange) -> Result<Signal, EvalError> {
    if let Ok(i) = index.try_clone_to::<i64>() {
        let attempted = target.with_ref::<Vec<BoxedValue>, Result<Signal, EvalError>>(|v| {
            let idx = usize::try_from(i).map_err(|_| EvalError::simple(EvalErrorKind::Message(format!("negative index {i}")), range.clone()))?;
            v.get(idx)
                .map(|found| Signal::Value(found.clone_handle()))
                .ok_or_else(|| EvalError::simple(EvalErrorKind::Message(format!("index {i} out of range")), range.clone()))
        });
        if let Ok(result) = attempted {
            return result;
        }
    } else if let Ok(k) = index.try_clone_to::<String>() {
        if let Ok(found) = target.with_ref::<MapValue, Option<BoxedValue>>(|m| m.get(&k).map(BoxedValue::clone_handle)) {
            return found.map(Signal::Value).ok_or_else(|| EvalError::simple(EvalErrorKind::Message(format!("key '{k}' not found")), range.clone()));
        }
    }
    state
        .call_function("[]", &[target.clone_handle(), index.clone_handle()])
        .map(Signal::Value)
        .map_err(|e| dispatch_err_to_eval(e, "[]", range))
}

// ---------------------------------------------------------------------------------
// Numeric fast path (`spec.md §4.7`)
// ---------------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(bv: &BoxedValue) -> Option<Num> {
    if let Ok(i) = bv.try_clone_to::<i64>() {
        return Some(Num::Int(i));
    }
    if let Ok(f) = bv.try_clone_to::<f64>() {
        return Some(Num::Float(f));
    }
    None
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn as_i64(n: Num) -> i64 {
    match n {
        Num::Int(i) => i,
        Num::Float(f) => f as i64,
    }
}

/// `None` means "not both operands are arithmetic; fall through to dispatch."
fn numeric_binop(op: BinOp, a: &BoxedValue, b: &BoxedValue, range: &CodeRange) -> Option<Result<BoxedValue, EvalError>> {
    let (na, nb) = (as_num(a)?, as_num(b)?);
    Some(apply_numeric(op, na, nb, range))
}

fn apply_numeric(op: BinOp, a: Num, b: Num, range: &CodeRange) -> Result<BoxedValue, EvalError> {
    match op {
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let (fa, fb) = (to_f64(a), to_f64(b));
            let r = match op {
                BinOp::Eq => fa == fb,
                BinOp::Ne => fa != fb,
                BinOp::Lt => fa < fb,
                BinOp::Le => fa <= fb,
                BinOp::Gt => fa > fb,
                BinOp::Ge => fa >= fb,
                _ => unreachable!("comparison arm"),
            };
            return Ok(BoxedValue::from_value(r));
        }
        BinOp::BitOr | BinOp::BitXor | BinOp::BitAnd | BinOp::Shl | BinOp::Shr => {
            let (x, y) = (as_i64(a), as_i64(b));
            let r = match op {
                BinOp::BitOr => x | y,
                BinOp::BitXor => x ^ y,
                BinOp::BitAnd => x & y,
                BinOp::Shl => x.wrapping_shl(y as u32),
                BinOp::Shr => x.wrapping_shr(y as u32),
                _ => unreachable!("bitwise arm"),
            };
            return Ok(BoxedValue::from_value(r));
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {}
    }
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => integer_arith(op, x, y, range),
        _ => float_arith(op, to_f64(a), to_f64(b)),
    }
}

/// Integer division/remainder by zero raises [`EvalErrorKind::Arithmetic`] when the
/// `checked-division` feature is on (the default); otherwise yields 0, matching C-style
/// wrapping behavior for a host embedding that has opted out of the check.
fn div_by_zero_guard(range: &CodeRange, what: &str) -> Result<(), EvalError> {
    #[cfg(feature = "checked-division")]
    {
        return Err(EvalError::simple(EvalErrorKind::Arithmetic(format!("{what} by zero")), range.clone()));
    }
    #[cfg(not(feature = "checked-division"))]
    {
        let _ = what;
        Ok(())
    }
}

fn integer_arith(op: BinOp, x: i64, y: i64, range: &CodeRange) -> Result<BoxedValue, EvalError> {
    let r = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::Div => {
            if y == 0 {
                div_by_zero_guard(range, "division")?;
                0
            } else {
                x.wrapping_div(y)
            }
        }
        BinOp::Rem => {
            if y == 0 {
                div_by_zero_guard(range, "modulo")?;
                0
            } else {
                x.wrapping_rem(y)
            }
        }
        _ => unreachable!("non-arithmetic BinOp reached integer_arith"),
    };
    Ok(BoxedValue::from_value(r))
}

fn float_arith(op: BinOp, x: f64, y: f64) -> Result<BoxedValue, EvalError> {
    let r = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        BinOp::Rem => x % y,
        _ => unreachable!("non-arithmetic BinOp reached float_arith"),
    };
    Ok(BoxedValue::from_value(r))
}

fn eval_prefix(op: PrefixOp, operand: &Node, range: &CodeRange, state: &mut DispatchState) -> Result<Signal, EvalError> {
    let v = eval_expr(operand, state)?;
    if op == PrefixOp::Not {
        return Ok(Signal::Value(BoxedValue::from_value(!truthy(&v, range)?)));
    }
    if let Some(n) = as_num(&v) {
        let result = match (op, n) {
            (PrefixOp::Neg, Num::Int(i)) => Some(BoxedValue::from_value(-i)),
            (PrefixOp::Neg, Num::Float(f)) => Some(BoxedValue::from_value(-f)),
            (PrefixOp::BitNot, Num::Int(i)) => Some(BoxedValue::from_value(!i)),
            (PrefixOp::BitNot, Num::Float(_)) => None,
            (PrefixOp::Not, _) => unreachable!("handled above"),
        };
        if let Some(result) = result {
            return Ok(Signal::Value(result));
        }
    }
    state.call_function(op.as_str(), &[v]).map(Signal::Value).map_err(|e| dispatch_err_to_eval(e, op.as_str(), range))
}

// ---------------------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------------------

fn run_while(cond: &Node, body: &Node, state: &mut DispatchState) -> Result<Signal, EvalError> {
    loop {
        if !truthy(&eval_expr(cond, state)?, &cond.range)? {
            return Ok(Signal::Value(BoxedValue::undefined()));
        }
        match eval(body, state)? {
            Signal::Break => return Ok(Signal::Value(BoxedValue::undefined())),
            Signal::Continue | Signal::Value(_) => {}
            ret @ Signal::Return(_) => return Ok(ret),
        }
    }
}

fn run_for(init: Option<&Node>, cond: Option<&Node>, step: Option<&Node>, body: &Node, state: &mut DispatchState) -> Result<Signal, EvalError> {
    if let Some(init) = init {
        eval(init, state)?;
    }
    loop {
        if let Some(cond) = cond {
            if !truthy(&eval_expr(cond, state)?, &cond.range)? {
                break;
            }
        }
        match eval(body, state)? {
            Signal::Break => break,
            Signal::Continue | Signal::Value(_) => {}
            ret @ Signal::Return(_) => return Ok(ret),
        }
        if let Some(step) = step {
            eval_expr(step, state)?;
        }
    }
    Ok(Signal::Value(BoxedValue::undefined()))
}

/// Runs the optimizer's canonical-counting-loop specialization: iterates `start..end`
/// as native `i64`s, never dispatching `<` or `++` through the evaluator.
fn run_compiled_counting_for(var_name: &str, start: i64, end: i64, body: &Node, state: &mut DispatchState) -> Result<Signal, EvalError> {
    let mut i = start;
    while i < end {
        state.declare(var_name.to_string(), BoxedValue::from_value(i));
        match eval(body, state)? {
            Signal::Break => break,
            Signal::Continue | Signal::Value(_) => {}
            ret @ Signal::Return(_) => return Ok(ret),
        }
        i += 1;
    }
    Ok(Signal::Value(BoxedValue::undefined()))
}

fn run_ranged_for(var_name: &str, range_expr: &Node, body: &Node, state: &mut DispatchState) -> Result<Signal, EvalError> {
    let items_bv = eval_expr(range_expr, state)?;
    let items = items_bv
        .try_clone_to::<Vec<BoxedValue>>()
        .map_err(|_| EvalError::simple(EvalErrorKind::Message("ranged 'for' requires an iterable (array or range) value".to_string()), range_expr.range.clone()))?;
    for item in items {
        state.declare(var_name.to_string(), item);
        match eval(body, state)? {
            Signal::Break => break,
            Signal::Continue | Signal::Value(_) => {}
            ret @ Signal::Return(_) => return Ok(ret),
        }
    }
    Ok(Signal::Value(BoxedValue::undefined()))
}

fn run_switch(disc: &BoxedValue, arms: &[CaseArm], state: &mut DispatchState, range: &CodeRange) -> Result<Signal, EvalError> {
    let mut matched = false;
    for arm in arms {
        let body = match arm {
            CaseArm::Case { value, body } => {
                if !matched {
                    let case_val = eval_expr(value, state)?;
                    let eq = match numeric_binop(BinOp::Eq, disc, &case_val, range) {
                        Some(r) => r?,
                        None => state.call_function("==", &[disc.clone_handle(), case_val.clone_handle()]).map_err(|e| dispatch_err_to_eval(e, "==", range))?,
                    };
                    matched = truthy(&eq, range)?;
                }
                body
            }
            CaseArm::Default { body } => {
                matched = true;
                body
            }
        };
        if matched {
            for stmt in body {
                match eval(stmt, state)? {
                    Signal::Break => return Ok(Signal::Value(BoxedValue::undefined())),
                    Signal::Value(_) => {}
                    ret @ (Signal::Return(_) | Signal::Continue) => return Ok(ret),
                }
            }
        }
    }
    Ok(Signal::Value(BoxedValue::undefined()))
}

// ---------------------------------------------------------------------------------
// Try / catch / finally (`spec.md §4.7`, `§7`)
// ---------------------------------------------------------------------------------

fn run_try(body: &Node, catches: &[CatchArm], finally: Option<&Node>, state: &mut DispatchState) -> Result<Signal, EvalError> {
    let outcome = match eval(body, state) {
        Ok(sig) => Ok(sig),
        Err(err) => match try_catch(&err, catches, state) {
            Some(result) => result,
            None => Err(err),
        },
    };

    if let Some(f) = finally {
        let finally_signal = eval(f, state)?;
        if matches!(finally_signal, Signal::Return(_) | Signal::Break | Signal::Continue) {
            return Ok(finally_signal);
        }
    }

    outcome
}

fn try_catch(err: &EvalError, catches: &[CatchArm], state: &mut DispatchState) -> Option<Result<Signal, EvalError>> {
    let exception = err.clone().into_exception();
    for arm in catches {
        if catch_matches(arm, &exception, state) {
            return Some(run_catch_body(arm, exception, state));
        }
    }
    None
}

fn catch_matches(arm: &CatchArm, exception: &BoxedValue, state: &mut DispatchState) -> bool {
    if let Some(type_name) = &arm.type_guard {
        let class_matches = exception.with_ref::<ExceptionValue, bool>(|e| &e.class_name == type_name).unwrap_or_else(|_| exception.get_type().name() == type_name);
        if !class_matches {
            return false;
        }
    }
    if let Some(guard) = &arm.guard {
        state.new_scope();
        if let Some(name) = &arm.exception_name {
            state.declare(name.clone(), exception.clone_handle());
        }
        let result = eval_expr(guard, state).and_then(|v| truthy(&v, &guard.range));
        state.pop_scope();
        return result.unwrap_or(false);
    }
    true
}

fn run_catch_body(arm: &CatchArm, exception: BoxedValue, state: &mut DispatchState) -> Result<Signal, EvalError> {
    state.new_scope();
    if let Some(name) = &arm.exception_name {
        state.declare(name.clone(), exception);
    }
    let result = eval(&arm.body, state);
    state.pop_scope();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::proxy_function::NativeFunction;
    use std::rc::Rc;

    fn run(src: &str) -> Result<BoxedValue, EvalError> {
        let engine = Rc::new(DispatchEngine::new());
        register_test_stdlib(&engine);
        let ast = parse("<test>", src).expect("parses");
        let mut state = DispatchState::new(engine);
        match eval(&ast, &mut state)? {
            Signal::Value(v) => Ok(v),
            other => panic!("top-level eval produced a non-value signal: {other:?}"),
        }
    }

    fn register_test_stdlib(engine: &DispatchEngine) {
        engine
            .add_function(
                "clone",
                Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::undefined()], "clone", |args| Ok(args[0].clone_handle()))),
            )
            .unwrap();
    }

    #[test]
    fn arithmetic_bypasses_dispatch() {
        let result = run("1 + 2;").unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 3);
    }

    #[test]
    fn def_and_call_resolve_through_overload_set() {
        let result = run("def add(a, b) { a + b }; add(4, 5);").unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 9);
    }

    #[test]
    fn recursive_def_with_guard() {
        let src = "def fact(n) : n < 2 { 1 }; def fact(n) { n * fact(n - 1) }; fact(5);";
        let result = run(src).unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 120);
    }

    #[test]
    fn class_constructor_and_attribute_access() {
        let src = "class P { def P::P(x) { this.x = x; } }; var p = P(7); p.x;";
        let result = run(src).unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 7);
    }

    #[test]
    fn declared_attribute_is_callable_with_parens_through_its_registered_getter() {
        let src = "class P { attr P::x; def P::P(v) { this.x = v; } }; var p = P(9); p.x();";
        let result = run(src).unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 9);
    }

    #[test]
    fn declared_attribute_getter_is_preferred_over_a_same_named_method() {
        // Both the getter (arity 1, bare-exact receiver type) and `describe` (arity 1,
        // undefined declared param type) are candidates for `p.describe()`; the getter's
        // exact-type match should win the arity-score scan.
        let src = r#"
            class P { attr P::describe; def P::P(v) { this.describe = v; } def P::describe() { "method" } };
            var p = P(42);
            p.describe();
        "#;
        let result = run(src).unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 42);
    }

    #[test]
    fn while_loop_accumulates() {
        let src = "var i = 0; var sum = 0; while (i < 5) { sum = sum + i; i = i + 1; }; sum;";
        let result = run(src).unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 10);
    }

    #[test]
    fn for_loop_accumulates() {
        let src = "var sum = 0; for (var i = 0; i < 5; i = i + 1) { sum = sum + i; }; sum;";
        let result = run(src).unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 10);
    }

    #[test]
    fn map_literal_indexing() {
        let result = run(r#"var m = ["a": 1, "b": 2]; m["b"];"#).unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 2);
    }

    #[test]
    fn try_catch_binds_thrown_value() {
        let src = r#"def boom() { throw(runtime_error("bad")); }; try { boom(); } catch(e) { e.message(); }"#;
        let engine = Rc::new(DispatchEngine::new());
        register_test_stdlib(&engine);
        engine
            .add_function(
                "runtime_error",
                Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::of::<String>()], "runtime_error", |args| {
                    let msg = args[0].try_clone_to::<String>().unwrap();
                    Ok(exception_bv("runtime_error", msg))
                })),
            )
            .unwrap();
        engine
            .add_function(
                "throw",
                Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::undefined()], "throw", |args| {
                    Err(DispatchError::Thrown(args[0].clone_handle()))
                })),
            )
            .unwrap();
        engine
            .add_function(
                "message",
                Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::undefined()], "message", |args| {
                    args[0].with_ref::<ExceptionValue, String>(|e| e.message.clone()).map(BoxedValue::from_value).map_err(|_| DispatchError::NoMatch {
                        args: vec![],
                        candidates: vec![],
                    })
                })),
            )
            .unwrap();
        let ast = parse("<test>", src).expect("parses");
        let mut state = DispatchState::new(engine);
        let result = match eval(&ast, &mut state).unwrap() {
            Signal::Value(v) => v,
            other => panic!("unexpected signal: {other:?}"),
        };
        assert_eq!(result.try_clone_to::<String>().unwrap(), "bad");
    }

    #[test]
    fn division_by_zero_is_checked() {
        let err = run("1 / 0;").unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::Arithmetic(_)));
    }
}

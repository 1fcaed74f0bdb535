//! Symbol table and overload-resolution host: types, global constants, scopes, function
//! overload sets (`spec.md §3, §4.5`).
//!
//! Grounded on `original_source/include/chaiscript/dispatchkit/dispatchkit.hpp`
//! (`Dispatch_Engine`'s scope stack, `get_object`'s local-then-global-then-function
//! fallback producing a first-class `Dispatch_Function`, the `add_function`
//! duplicate-signature rejection) and the overload algorithm in
//! `crate::proxy_function::resolve_and_call` (kept there, not here, so this module
//! depends on `proxy_function` and not the reverse).
//!
//! Per `spec.md §9` Design Notes ("avoid a global; each DispatchState carries an
//! explicit stack; thread-locality is an optimization, not a requirement") and the
//! engine-wide decision that `Engine` is not `Send`/`Sync` (see `DESIGN.md`), scope and
//! call-frame stacks live directly on [`DispatchState`] rather than behind
//! `thread_local!` storage — there is exactly one thread using a given engine.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::boxed_value::BoxedValue;
use crate::conversions::TypeConversions;
use crate::proxy_function::{self, DispatchError, ProxyFunction, Signature};
use crate::type_tag::TypeTag;

/// Identifiers a script may never declare, and operator tokens that may never be
/// rebound by name (`spec.md §4.5`).
pub const RESERVED_WORDS: &[&str] = &[
    "def", "fun", "while", "for", "if", "else", "&&", "||", ",", "auto", "return", "break", "true", "false", "class",
    "attr", "var", "global", "GLOBAL", "_", "__LINE__", "__FILE__", "__FUNC__", "__CLASS__",
];

/// Registration/name-validation failures (`spec.md §7`: `ReservedWordError`,
/// `IllegalNameError`, `NameConflictError`).
#[derive(Debug, Clone)]
pub enum NameError {
    Reserved(String),
    Illegal(String),
    Conflict(String),
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved(n) => write!(f, "'{n}' is a reserved word and cannot be used as a name"),
            Self::Illegal(n) => write!(f, "'{n}' is not a legal name (names may not contain '::')"),
            Self::Conflict(n) => write!(f, "a function matching this signature is already registered as '{n}'"),
        }
    }
}

impl std::error::Error for NameError {}

/// `spec.md §7`: object/type lookup failure (the original's `std::range_error`).
#[derive(Debug, Clone)]
pub struct NotFound {
    pub name: String,
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object not known: {}", self.name)
    }
}

impl std::error::Error for NotFound {}

/// Validates a script-level name: rejects reserved words and any identifier containing
/// `::` (`spec.md §4.5`).
///
/// # Errors
/// Returns [`NameError`] if `name` is reserved or contains `::`.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if RESERVED_WORDS.contains(&name) {
        return Err(NameError::Reserved(name.to_string()));
    }
    if name.contains("::") {
        return Err(NameError::Illegal(name.to_string()));
    }
    Ok(())
}

/// One named binding environment, pushed and popped around blocks and calls
/// (`spec.md §3`: "Scope"). Ordered so iteration (used by diagnostics and `get_attrs`
/// style introspection) reflects declaration order.
pub type Scope = IndexMap<String, BoxedValue>;

/// A saved parameter snapshot for one active call, used to build the call-stack
/// diagnostics in `EvalError` (`spec.md §7`).
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub function_name: String,
    pub params: Vec<BoxedValue>,
}

/// Per-call-chain runtime context (`spec.md §3`: "DispatchState").
///
/// Holds the scope stack, call-frame stack, and the conversions-save buffer for one
/// top-level `Engine::eval` invocation (and everything it calls transitively). A fresh
/// `DispatchState` is pushed for each top-level eval so the scope/call-frame depth
/// returns to zero afterwards even if the eval raised (`spec.md §8` invariant 8).
///
/// Holds `Rc<DispatchEngine>` rather than a borrow: a script function's body
/// (`crate::eval::ScriptBody`) keeps its own engine handle so it can spin up a fresh
/// `DispatchState` for each call, long after the `DispatchState` that defined it has
/// gone out of scope (`spec.md §4.7`: closures capture by value, so a function call
/// never needs the caller's scope chain, only the shared engine).
pub struct DispatchState {
    pub engine: Rc<DispatchEngine>,
    scopes: Vec<Scope>,
    call_frames: Vec<CallFrame>,
}

impl DispatchState {
    #[must_use]
    pub fn new(engine: Rc<DispatchEngine>) -> Self {
        engine.conversions.push_saves();
        Self { engine, scopes: vec![Scope::new()], call_frames: Vec::new() }
    }

    pub fn new_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    /// # Panics
    /// Panics if called when only the outermost (global) scope remains — a bug in the
    /// evaluator, since every `Block` that pushed a scope must pop exactly one.
    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "attempted to pop the outermost scope");
        self.scopes.pop();
    }

    pub fn new_call_frame(&mut self, function_name: impl Into<String>, params: Vec<BoxedValue>) {
        self.call_frames.push(CallFrame { function_name: function_name.into(), params });
    }

    pub fn pop_call_frame(&mut self) -> Option<CallFrame> {
        self.call_frames.pop()
    }

    #[must_use]
    pub fn call_frames(&self) -> &[CallFrame] {
        &self.call_frames
    }

    /// Declares `name` in the current (innermost) scope.
    pub fn declare(&mut self, name: impl Into<String>, value: BoxedValue) {
        self.scopes.last_mut().expect("scope stack never empty").insert(name.into(), value);
    }

    /// Replaces the binding for `name` in whichever scope currently holds it
    /// (`spec.md §4.7`'s `Equation` assignment: plain `=` on an already-declared name
    /// rebinds the slot, not just the interior of the handle a lookup returned — a
    /// lookup's `clone_handle()` shares storage but is still a distinct `BoxedValue`, so
    /// mutating it in place wouldn't reach the scope's own copy). Falls back to the
    /// engine's mutable globals (`mutable-globals` feature) when no scope holds `name`.
    ///
    /// # Errors
    /// Returns [`NotFound`] if `name` isn't bound in any scope or a mutable global.
    pub fn set_object(&mut self, name: &str, value: BoxedValue) -> Result<(), NotFound> {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                scope.insert(name.to_string(), value);
                return Ok(());
            }
        }
        #[cfg(feature = "mutable-globals")]
        if self.engine.get_global(name).is_some() {
            let _ = self.engine.add_global(name, value);
            return Ok(());
        }
        Err(NotFound { name: name.to_string() })
    }

    /// Write-once cache of which scope depth (0 = innermost) last resolved a name, used
    /// by [`DispatchState::get_object`] to skip the full search on repeated lookups at
    /// the same call site (`spec.md §4.5`: "`loc_cache` is a write-once integer offset").
    ///
    /// # Errors
    /// Returns [`NotFound`] if `name` isn't bound in any scope, the engine's globals, or
    /// its function registry.
    pub fn get_object(&self, name: &str, loc_cache: &LocCache) -> Result<BoxedValue, NotFound> {
        if name == "_" {
            return Ok(self.engine.placeholder());
        }

        if let Some(depth) = loc_cache.get() {
            if let Some(scope) = self.scopes.iter().rev().nth(depth) {
                if let Some(bv) = scope.get(name) {
                    return Ok(bv.clone_handle());
                }
            }
        }

        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if let Some(bv) = scope.get(name) {
                loc_cache.set(depth);
                return Ok(bv.clone_handle());
            }
        }

        if let Some(bv) = self.engine.get_global(name) {
            return Ok(bv);
        }

        if let Some(candidates) = self.engine.get_functions(name) {
            // Every first-class callable script value is boxed as `Rc<dyn ProxyFunction>`
            // (never the concrete `Dispatch`/`DynamicFunction`/... struct) so that calling
            // a value fetched generically (stored in a variable, passed as an argument,
            // returned from a lambda) only ever needs one downcast target.
            let callable: Rc<dyn ProxyFunction> = Rc::new(proxy_function::Dispatch::new(candidates));
            return Ok(BoxedValue::from_value(callable));
        }

        Err(NotFound { name: name.to_string() })
    }

    /// Resolves and invokes the named overload set (`spec.md §4.4`).
    ///
    /// # Errors
    /// Returns [`DispatchError`] if no candidate matches.
    pub fn call_function(&mut self, name: &str, args: &[BoxedValue]) -> Result<BoxedValue, DispatchError> {
        let candidates = self.engine.get_functions(name).ok_or_else(|| DispatchError::Arity { got: args.len(), candidates: vec![] })?;
        self.new_call_frame(name, args.iter().map(BoxedValue::clone_handle).collect());
        let result = proxy_function::resolve_and_call(&candidates, args, &self.engine.conversions);
        self.pop_call_frame();
        result
    }

    /// Method-call dispatch (`spec.md §4.5`): `args[0]` is the receiver. Tries the named
    /// overload set first (receiver included as the first argument, per `spec.md §4.7`'s
    /// `DotAccess + FunCall` rewrite), then falls back to a function-valued entry in the
    /// receiver's own attribute map — the seam script-level `method_missing`-style
    /// per-object callables use.
    ///
    /// `has_params` distinguishes a genuine call (`obj.method(args)`) from plain
    /// attribute read syntax (`obj.field`): when `false`, this only ever reads the
    /// attribute, never dispatches a zero-arg overload of `name`.
    ///
    /// # Errors
    /// Returns [`DispatchError`] if neither a matching overload nor a callable
    /// attribute is found.
    pub fn call_member(&mut self, name: &str, args: &[BoxedValue], has_params: bool) -> Result<BoxedValue, DispatchError> {
        let Some(receiver) = args.first() else {
            return Err(DispatchError::Arity { got: 0, candidates: vec![] });
        };

        if has_params {
            if let Some(candidates) = self.engine.get_functions(name) {
                match proxy_function::resolve_and_call(&candidates, args, &self.engine.conversions) {
                    Ok(v) => return Ok(v),
                    // A real exception (or ambiguity) unwinding through this call must not
                    // be swallowed by the attribute-map fallback below.
                    Err(e @ (DispatchError::Thrown(_) | DispatchError::Ambiguous { .. })) => return Err(e),
                    Err(DispatchError::Arity { .. } | DispatchError::NoMatch { .. }) => {}
                }
            }
        }

        if let Ok(callable) = receiver.clone_handle().get_attr(name).try_clone_to::<Rc<dyn ProxyFunction>>() {
            let rest = if has_params { &args[1..] } else { &[] };
            return callable.call(rest, &self.engine.conversions);
        }

        if !has_params {
            return Ok(receiver.clone_handle().get_attr(name));
        }

        Err(DispatchError::NoMatch {
            args: args.iter().map(BoxedValue::get_type).collect(),
            candidates: self.engine.get_functions(name).unwrap_or_default().iter().map(|c| c.signature()).collect(),
        })
    }
}

impl Drop for DispatchState {
    fn drop(&mut self) {
        self.engine.conversions.pop_saves();
    }
}

/// Write-once per-call-site resolution cache (`spec.md §4.5`). Owned by whatever AST
/// node performs the lookup (an `Id` node, typically), not by the engine — each call
/// site gets its own.
#[derive(Debug, Default)]
pub struct LocCache(Cell<Option<usize>>);

impl Clone for LocCache {
    /// Clones the cached value, not the cell identity — each AST node clone (e.g. when
    /// a `Lambda` body is captured) gets its own independently-invalidatable cache.
    fn clone(&self) -> Self {
        Self(Cell::new(self.0.get()))
    }
}

impl LocCache {
    #[must_use]
    pub fn new() -> Self {
        Self(Cell::new(None))
    }

    pub(crate) fn get(&self) -> Option<usize> {
        self.0.get()
    }

    pub(crate) fn set(&self, depth: usize) {
        self.0.set(Some(depth));
    }
}

#[derive(Default)]
struct Registry {
    types: AHashMap<String, TypeTag>,
    functions: AHashMap<String, Vec<Rc<dyn ProxyFunction>>>,
    globals: AHashMap<String, BoxedValue>,
    loaded_modules: AHashSet<String>,
}

/// Shared symbol table: types, global constants, function overload sets, and the
/// conversions registry, guarded by a single reader/writer lock (`spec.md §4.5, §5`).
///
/// One `DispatchEngine` backs one [`crate::Engine`]; [`DispatchState`] is the per-call
/// context built on top of it for the duration of one top-level eval.
pub struct DispatchEngine {
    registry: std::sync::RwLock<Registry>,
    conversions: TypeConversions,
    placeholder: BoxedValue,
    max_recursion_depth: Option<usize>,
    /// Count of currently-active script-function call bodies (`crate::eval::ScriptBody`).
    /// Each such call spins up a brand new [`DispatchState`], so `DispatchState`'s own
    /// `call_frames` stack resets to empty on every nested call and can't see recursion
    /// depth across calls — this counter lives on the engine instead, the one thing every
    /// nested call shares.
    call_depth: Cell<usize>,
}

impl Default for DispatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_recursion_depth(None)
    }

    #[must_use]
    pub fn with_max_recursion_depth(max_recursion_depth: Option<usize>) -> Self {
        Self {
            registry: std::sync::RwLock::new(Registry::default()),
            conversions: TypeConversions::new(),
            placeholder: BoxedValue::from_value(proxy_function::Placeholder),
            max_recursion_depth,
            call_depth: Cell::new(0),
        }
    }

    #[must_use]
    pub fn conversions(&self) -> &TypeConversions {
        &self.conversions
    }

    /// Enters one script-function call, returning a guard that decrements the depth
    /// counter on drop (including on early return via `?`).
    ///
    /// # Errors
    /// Returns `Err(())` if entering would exceed `max_recursion_depth`.
    pub fn enter_call(&self) -> Result<CallDepthGuard<'_>, ()> {
        let depth = self.call_depth.get() + 1;
        if let Some(limit) = self.max_recursion_depth {
            if depth > limit {
                return Err(());
            }
        }
        self.call_depth.set(depth);
        Ok(CallDepthGuard { engine: self })
    }

    fn placeholder(&self) -> BoxedValue {
        self.placeholder.clone_handle()
    }

    /// # Errors
    /// Returns [`NameError`] if `name` is reserved or illegal.
    pub fn add_type(&self, name: &str, tag: TypeTag) -> Result<(), NameError> {
        validate_name(name)?;
        self.registry.write().expect("dispatch registry poisoned").types.insert(name.to_string(), tag);
        Ok(())
    }

    #[must_use]
    pub fn get_type(&self, name: &str) -> Option<TypeTag> {
        self.registry.read().expect("dispatch registry poisoned").types.get(name).copied()
    }

    /// Registers `pf` under `name`, appending to the end of its overload set (insertion
    /// order is resolution order, `spec.md §3`). Rejects a function whose declared
    /// signature (arity + param types) exactly matches an existing entry for the same
    /// name.
    ///
    /// # Errors
    /// Returns [`NameError::Reserved`]/[`NameError::Illegal`] for a bad name, or
    /// [`NameError::Conflict`] if an identical signature is already registered.
    pub fn add_function(&self, name: &str, pf: Rc<dyn ProxyFunction>) -> Result<(), NameError> {
        validate_name(name)?;
        let mut reg = self.registry.write().expect("dispatch registry poisoned");
        let entry = reg.functions.entry(name.to_string()).or_default();
        if entry.iter().any(|existing| same_signature(existing.as_ref(), pf.as_ref())) {
            return Err(NameError::Conflict(name.to_string()));
        }
        entry.push(pf);
        Ok(())
    }

    #[must_use]
    pub fn get_functions(&self, name: &str) -> Option<Vec<Rc<dyn ProxyFunction>>> {
        let reg = self.registry.read().expect("dispatch registry poisoned");
        let fns = reg.functions.get(name)?;
        if fns.is_empty() { None } else { Some(fns.clone()) }
    }

    /// # Errors
    /// Returns [`NameError`] if `name` is reserved or illegal.
    pub fn add_global_const(&self, name: &str, bv: BoxedValue) -> Result<(), NameError> {
        validate_name(name)?;
        self.registry.write().expect("dispatch registry poisoned").globals.insert(name.to_string(), bv.into_const());
        Ok(())
    }

    /// Adds (or, with the `mutable-globals` feature, reassigns) a global binding.
    ///
    /// # Errors
    /// Returns [`NameError`] if `name` is reserved or illegal.
    #[cfg(feature = "mutable-globals")]
    pub fn add_global(&self, name: &str, bv: BoxedValue) -> Result<(), NameError> {
        validate_name(name)?;
        self.registry.write().expect("dispatch registry poisoned").globals.insert(name.to_string(), bv);
        Ok(())
    }

    #[must_use]
    pub fn get_global(&self, name: &str) -> Option<BoxedValue> {
        self.registry.read().expect("dispatch registry poisoned").globals.get(name).map(BoxedValue::clone_handle)
    }

    #[must_use]
    pub fn is_module_loaded(&self, name: &str) -> bool {
        self.registry.read().expect("dispatch registry poisoned").loaded_modules.contains(name)
    }

    pub fn mark_module_loaded(&self, name: &str) {
        self.registry.write().expect("dispatch registry poisoned").loaded_modules.insert(name.to_string());
    }

    /// `get_state()` (`spec.md §6`): a cheap clone of the whole registry.
    #[must_use]
    pub fn snapshot_state(&self) -> EngineState {
        let reg = self.registry.read().expect("dispatch registry poisoned");
        EngineState {
            types: reg.types.clone(),
            functions: reg.functions.clone(),
            globals: reg.globals.clone(),
            loaded_modules: reg.loaded_modules.clone(),
        }
    }

    /// `set_state(state)` (`spec.md §6`): replaces the whole registry wholesale.
    pub fn restore_state(&self, state: EngineState) {
        let mut reg = self.registry.write().expect("dispatch registry poisoned");
        reg.types = state.types;
        reg.functions = state.functions;
        reg.globals = state.globals;
        reg.loaded_modules = state.loaded_modules;
    }
}

/// RAII handle returned by [`DispatchEngine::enter_call`]; decrements the call-depth
/// counter when the call finishes, however it finishes.
pub struct CallDepthGuard<'a> {
    engine: &'a DispatchEngine,
}

impl Drop for CallDepthGuard<'_> {
    fn drop(&mut self) {
        self.engine.call_depth.set(self.engine.call_depth.get() - 1);
    }
}

/// Snapshot of an engine's registry (`spec.md §6`'s `get_state`/`set_state`), cheap to
/// take and restore since every entry is already reference-counted (`Rc<dyn
/// ProxyFunction>`, `TypeTag`'s `Copy` id) or a plain `Clone`-able value (`BoxedValue`).
#[derive(Clone)]
pub struct EngineState {
    pub(crate) types: AHashMap<String, TypeTag>,
    pub(crate) functions: AHashMap<String, Vec<Rc<dyn ProxyFunction>>>,
    pub(crate) globals: AHashMap<String, BoxedValue>,
    pub(crate) loaded_modules: AHashSet<String>,
}

fn same_signature(a: &dyn ProxyFunction, b: &dyn ProxyFunction) -> bool {
    let (sa, sb): (Signature, Signature) = (a.signature(), b.signature());
    sa.arity == sb.arity && sa.param_types == sb.param_types
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy_function::NativeFunction;

    fn make_add() -> Rc<dyn ProxyFunction> {
        Rc::new(NativeFunction::new(
            TypeTag::of::<i64>(),
            vec![TypeTag::of::<i64>(), TypeTag::of::<i64>()],
            "add",
            |args| {
                let a = args[0].with_ref::<i64, i64>(|n| *n).unwrap();
                let b = args[1].with_ref::<i64, i64>(|n| *n).unwrap();
                Ok(BoxedValue::from_value(a + b))
            },
        ))
    }

    #[test]
    fn reserved_word_rejected() {
        let engine = DispatchEngine::new();
        assert!(engine.add_type("var", TypeTag::of::<i64>()).is_err());
    }

    #[test]
    fn duplicate_signature_rejected() {
        let engine = DispatchEngine::new();
        engine.add_function("add", make_add()).unwrap();
        assert!(engine.add_function("add", make_add()).is_err());
    }

    #[test]
    fn call_function_resolves_and_restores_frame_depth() {
        let engine = Rc::new(DispatchEngine::new());
        engine.add_function("add", make_add()).unwrap();
        let mut state = DispatchState::new(Rc::clone(&engine));
        let result = state.call_function("add", &[BoxedValue::from_value(2_i64), BoxedValue::from_value(3_i64)]).unwrap();
        assert_eq!(result.with_ref::<i64, i64>(|n| *n).unwrap(), 5);
        assert_eq!(state.call_frames().len(), 0);
    }

    #[test]
    fn scope_lookup_finds_innermost_binding() {
        let engine = Rc::new(DispatchEngine::new());
        let mut state = DispatchState::new(Rc::clone(&engine));
        state.declare("x", BoxedValue::from_value(1_i64));
        state.new_scope();
        state.declare("x", BoxedValue::from_value(2_i64));
        let cache = LocCache::new();
        let found = state.get_object("x", &cache).unwrap();
        assert_eq!(found.with_ref::<i64, i64>(|n| *n).unwrap(), 2);
        state.pop_scope();
        let found = state.get_object("x", &cache).unwrap();
        assert_eq!(found.with_ref::<i64, i64>(|n| *n).unwrap(), 1);
    }
}

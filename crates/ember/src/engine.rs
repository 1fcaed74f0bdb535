//! The host-facing facade (`spec.md §6, §9`, component **C9**): `Engine` wires the
//! parser, optimizer, evaluator, and standard library behind the small surface a host
//! embeds against, and owns the `use`/`eval`/`eval_file` primitives that need all four.
//!
//! Grounded on `original_source/include/chaiscript/chaiscript.hpp`'s `ChaiScript`
//! facade (one object owning the dispatch engine, exposing `add`/`eval`/`eval_file`/
//! `use`) and, for the ambient error-union/options shape,
//! `examples/parcadei-ouros/crates/ouros/src/repl_error.rs` (`ReplError`, a
//! by-pipeline-stage error enum with `From` impls) and
//! `examples/parcadei-ouros/crates/ouros/src/resource.rs` (`ResourceLimits`, a
//! builder-style options struct) — trimmed down to the one knob a tree-walking
//! interpreter with no VM/heap actually needs: recursion depth.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::boxed_value::{BadCast, BoxedValue};
use crate::conversions::{ConversionExists, TypeConversion};
use crate::dispatch::{self, DispatchEngine, DispatchState, NameError};
use crate::eval::{self, EvalError, Signal};
use crate::json;
use crate::module_loader::{ModuleLoader, StaticModuleLoader};
use crate::optimizer::optimize;
use crate::parser::{self, ParseError};
use crate::proxy_function::ProxyFunction;
use crate::stdlib::register_stdlib;
use crate::tracer::{EvalTracer, NoopTracer};
use crate::type_tag::TypeTag;

/// Per-engine knobs. `spec.md`'s Non-goals rule out a bytecode VM and a GC'd heap, so
/// there is no allocation/memory/time budget to track here — only the one resource a
/// recursive tree-walker can actually exhaust: Rust's own call stack, approximated by
/// counting `DispatchState` call frames.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum `DispatchState` call-frame depth before `eval` raises `eval_error`
    /// rather than risking a native stack overflow. `None` disables the check.
    pub max_recursion_depth: Option<usize>,
    /// When `Some`, `use "name"` only succeeds for names found under this directory
    /// (or registered with the engine's [`ModuleLoader`]) — a minimal sandbox for
    /// embedding hosts that don't want scripts reading arbitrary files.
    pub module_root: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { max_recursion_depth: Some(500), module_root: None }
    }
}

impl EngineOptions {
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    #[must_use]
    pub fn module_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.module_root = Some(root.into());
        self
    }
}

/// Top-level error union (`spec.md §7`), separating failures by pipeline stage the way
/// a host needs to in order to react differently to "your script doesn't parse" versus
/// "your script raised an exception".
#[derive(Debug, Clone)]
pub enum EngineError {
    Parse(ParseError),
    Eval(EvalError),
    Name(NameError),
    Conversion(ConversionExists),
    Cast(BadCast),
    LoadModule { name: String, reason: String },
    FileNotFound(PathBuf),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Eval(e) => write!(f, "{e}"),
            Self::Name(e) => write!(f, "{e}"),
            Self::Conversion(e) => write!(f, "{e}"),
            Self::Cast(e) => write!(f, "{e}"),
            Self::LoadModule { name, reason } => write!(f, "could not load module '{name}': {reason}"),
            Self::FileNotFound(path) => write!(f, "file not found: {}", path.display()),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<EvalError> for EngineError {
    fn from(e: EvalError) -> Self {
        Self::Eval(e)
    }
}

impl From<NameError> for EngineError {
    fn from(e: NameError) -> Self {
        Self::Name(e)
    }
}

impl From<ConversionExists> for EngineError {
    fn from(e: ConversionExists) -> Self {
        Self::Conversion(e)
    }
}

impl From<BadCast> for EngineError {
    fn from(e: BadCast) -> Self {
        Self::Cast(e)
    }
}

/// `get_state()`/`set_state()` snapshot (`spec.md §6`): types, functions, globals, and
/// which modules have been `use`d. `spec.md`'s (used-files, engine-state, active-modules)
/// triple collapses to two parts here — `load_module` (dynamic host-library loading) is
/// explicitly out of core scope, so there is no "active modules" registry distinct from
/// the set of scripts already loaded via `use`; [`EngineState::used_files`] serves both
/// roles.
#[derive(Clone)]
pub struct EngineState {
    registry: dispatch::EngineState,
}

impl EngineState {
    /// Names of modules already loaded (via `use`) at the time this snapshot was taken.
    #[must_use]
    pub fn used_files(&self) -> Vec<String> {
        self.registry.loaded_modules.iter().cloned().collect()
    }
}

/// The embeddable engine: one `DispatchEngine` (types, functions, globals, module
/// registry) plus the options and module loader that govern `use`/`eval_file`.
///
/// Not `Send`/`Sync` — see `DESIGN.md` and `crate::dispatch`'s module doc comment for
/// why the scope/call-frame stacks this engine ultimately drives are single-threaded
/// by design, matching `spec.md §5`.
pub struct Engine {
    engine: Rc<DispatchEngine>,
    options: Rc<EngineOptions>,
    module_loader: Rc<RefCell<Box<dyn ModuleLoader>>>,
    tracer: RefCell<Box<dyn EvalTracer>>,
}

impl Engine {
    /// Builds an engine with the standard library registered and no modules loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    #[must_use]
    pub fn with_options(options: EngineOptions) -> Self {
        let engine = Rc::new(DispatchEngine::with_max_recursion_depth(options.max_recursion_depth));
        register_stdlib(&engine);
        json::register(&engine);
        let mut this = Self {
            engine,
            options: Rc::new(options),
            module_loader: Rc::new(RefCell::new(Box::new(StaticModuleLoader::new()))),
            tracer: RefCell::new(Box::new(NoopTracer)),
        };
        this.register_self_primitives();
        this
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn set_module_loader(&mut self, loader: Box<dyn ModuleLoader>) {
        *self.module_loader.borrow_mut() = loader;
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn EvalTracer>) {
        *self.tracer.borrow_mut() = tracer;
    }

    /// Registers a host type's [`TypeTag`] under a script-visible name.
    ///
    /// # Errors
    /// Returns [`EngineError::Name`] if `name` is reserved or already registered.
    pub fn add_type(&self, name: &str, tag: TypeTag) -> Result<(), EngineError> {
        self.engine.add_type(name, tag).map_err(Into::into)
    }

    /// Registers a host function (or an additional overload of an existing name).
    ///
    /// # Errors
    /// Returns [`EngineError::Name`] if `name` is reserved or this exact signature is
    /// already registered.
    pub fn add_function(&self, name: &str, f: Rc<dyn ProxyFunction>) -> Result<(), EngineError> {
        self.engine.add_function(name, f).map_err(Into::into)
    }

    /// Registers an immutable global binding, visible to every script this engine runs.
    ///
    /// # Errors
    /// Returns [`EngineError::Name`] if `name` is reserved or already bound.
    pub fn add_global_const(&self, name: &str, value: BoxedValue) -> Result<(), EngineError> {
        self.engine.add_global_const(name, value).map_err(Into::into)
    }

    /// Registers a mutable global binding. Only effective under the `mutable-globals`
    /// feature; see `crate::dispatch::DispatchEngine::add_global`.
    ///
    /// # Errors
    /// Returns [`EngineError::Name`] if `name` is reserved or already bound.
    pub fn add_global(&self, name: &str, value: BoxedValue) -> Result<(), EngineError> {
        self.engine.add_global(name, value).map_err(Into::into)
    }

    /// Registers a conversion between two host types (`spec.md §6`).
    ///
    /// # Errors
    /// Returns [`EngineError::Conversion`] if a conversion for this `(from, to)` pair is
    /// already registered.
    pub fn add_conversion(&self, conversion: TypeConversion) -> Result<(), EngineError> {
        self.engine.conversions().add(conversion).map_err(Into::into)
    }

    /// Registers an upcast from `Derived` to `Base` (`spec.md §6`'s `add_base_class`),
    /// using `Derived`'s `Into<Base>` impl to perform the conversion. There is no
    /// automatic downcast: the original's `base_class<Base, Derived>()` relies on C++
    /// pointer layout to go back from a `Base*` to a `Derived*` unsafely, which Ember's
    /// `BoxedValue` storage has no equivalent of; register a `TypeConversion::bidirectional`
    /// directly via [`Engine::add_conversion`] if a script also needs to downcast.
    ///
    /// # Errors
    /// Returns [`EngineError::Conversion`] if this `(Derived, Base)` conversion is already
    /// registered.
    pub fn add_base_class<Base, Derived>(&self) -> Result<(), EngineError>
    where
        Base: Clone + 'static,
        Derived: Clone + Into<Base> + 'static,
    {
        let conversion = TypeConversion::one_way(TypeTag::of::<Derived>(), TypeTag::of::<Base>(), |bv| {
            let derived = bv.try_clone_to::<Derived>().expect("base_class conversion only ever invoked on a Derived value");
            BoxedValue::from_value(Into::<Base>::into(derived))
        });
        self.add_conversion(conversion)
    }

    /// Parses, optimizes, and evaluates one script against this engine's persistent
    /// global/function state, returning the value of its final expression.
    ///
    /// # Errors
    /// Returns [`EngineError::Parse`] on a syntax error or [`EngineError::Eval`] if
    /// evaluation raises an unhandled exception.
    pub fn eval(&self, source: &str) -> Result<BoxedValue, EngineError> {
        self.eval_named("<eval>", source)
    }

    /// Like [`Engine::eval`], but attributes parse errors and stack frames to `filename`
    /// rather than the synthetic `<eval>` — useful for a host that wants file-accurate
    /// diagnostics for a script it didn't read from disk itself (a REPL line, a script
    /// fetched over the network).
    ///
    /// # Errors
    /// Same as [`Engine::eval`].
    pub fn eval_named(&self, filename: &str, source: &str) -> Result<BoxedValue, EngineError> {
        let ast = parser::parse(filename, source)?;
        let ast = optimize(ast);
        let mut state = DispatchState::new(Rc::clone(&self.engine));
        self.tracer.borrow_mut().on_call(filename, 0);
        let outcome = eval::eval(&ast, &mut state);
        match outcome {
            Ok(Signal::Value(v) | Signal::Return(v)) => {
                self.tracer.borrow_mut().on_return(filename, 0);
                Ok(v)
            }
            Ok(Signal::Break | Signal::Continue) => Err(EvalError {
                kind: crate::eval::EvalErrorKind::Message("'break'/'continue' used outside a loop".to_string()),
                range: ast.range.clone(),
                stack: Vec::new(),
            }
            .into()),
            Err(e) => {
                self.tracer.borrow_mut().on_thrown(filename, 0);
                Err(e.into())
            }
        }
    }

    /// Like [`Engine::eval`], but casts the result to `T` (applying a registered
    /// conversion if needed), for a host that knows the expected return type
    /// (`spec.md §6`'s `eval_typed<T>`).
    ///
    /// # Errors
    /// Returns [`EngineError::Cast`] if the result can't be projected to `T`, otherwise
    /// the same errors as [`Engine::eval`].
    pub fn eval_typed<T: Clone + 'static>(&self, source: &str) -> Result<T, EngineError> {
        let result = self.eval(source)?;
        result.cast_with_conversions::<T>(self.engine.conversions()).map_err(Into::into)
    }

    /// Reads and evaluates a script file on disk.
    ///
    /// # Errors
    /// Returns [`EngineError::FileNotFound`] if the file can't be read, otherwise the
    /// same errors as [`Engine::eval`].
    pub fn eval_file(&self, path: impl AsRef<Path>) -> Result<BoxedValue, EngineError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|_| EngineError::FileNotFound(path.to_path_buf()))?;
        self.eval_named(&path.display().to_string(), &source)
    }

    /// Loads a named module exactly once (`spec.md §6`'s `use`): subsequent calls with
    /// the same name are a no-op, matching `original_source`'s "load each module at
    /// most once per session" behavior.
    ///
    /// # Errors
    /// Returns [`EngineError::LoadModule`] if the loader can't find `name`, otherwise
    /// the same errors as [`Engine::eval`].
    pub fn use_module(&self, name: &str) -> Result<(), EngineError> {
        if self.engine.is_module_loaded(name) {
            return Ok(());
        }
        let source = self
            .module_loader
            .borrow()
            .load(name, self.options.module_root.as_deref())
            .map_err(|reason| EngineError::LoadModule { name: name.to_string(), reason })?;
        self.eval_named(name, &source)?;
        self.engine.mark_module_loaded(name);
        Ok(())
    }

    /// Snapshots the engine's whole registry (`spec.md §6`'s `get_state`).
    #[must_use]
    pub fn get_state(&self) -> EngineState {
        EngineState { registry: self.engine.snapshot_state() }
    }

    /// Restores a previously-captured snapshot (`spec.md §6`'s `set_state`), replacing
    /// the engine's current registry wholesale.
    pub fn set_state(&self, state: EngineState) {
        self.engine.restore_state(state.registry);
    }

    fn register_self_primitives(&mut self) {
        // `eval`/`eval_file`/`use` close over this engine's own `Rc<DispatchEngine>`
        // and parse→optimize→eval pipeline, which `crate::stdlib` deliberately has no
        // access to (see `stdlib/mod.rs`'s module doc comment) — they're registered
        // here instead, once both halves exist.
        let eval_engine = Rc::clone(&self.engine);
        self.engine
            .add_function(
                "eval",
                Rc::new(crate::proxy_function::NativeFunction::new(
                    TypeTag::undefined(),
                    vec![TypeTag::of::<String>()],
                    "eval",
                    move |args| {
                        let src = args[0].try_clone_to::<String>().map_err(|_| crate::proxy_function::DispatchError::NoMatch {
                            args: vec![],
                            candidates: vec![],
                        })?;
                        let ast = parser::parse("<eval>", &src)
                            .map_err(|e| crate::proxy_function::DispatchError::Thrown(eval::exception_bv("eval_error", e.to_string())))?;
                        let ast = optimize(ast);
                        let mut state = DispatchState::new(Rc::clone(&eval_engine));
                        match eval::eval(&ast, &mut state) {
                            Ok(Signal::Value(v) | Signal::Return(v)) => Ok(v),
                            Ok(Signal::Break | Signal::Continue) => {
                                Err(crate::proxy_function::DispatchError::Thrown(eval::exception_bv("eval_error", "'break'/'continue' used outside a loop")))
                            }
                            Err(e) => Err(e.into_dispatch_error()),
                        }
                    },
                )) as Rc<dyn ProxyFunction>,
            )
            .expect("eval registered once per engine");

        let use_engine = Rc::clone(&self.engine);
        let use_loader = Rc::clone(&self.module_loader);
        let use_options = Rc::clone(&self.options);
        self.engine
            .add_function(
                "use",
                Rc::new(crate::proxy_function::NativeFunction::new(
                    TypeTag::void(),
                    vec![TypeTag::of::<String>()],
                    "use",
                    move |args| {
                        let name = args[0].try_clone_to::<String>().map_err(|_| crate::proxy_function::DispatchError::NoMatch {
                            args: vec![],
                            candidates: vec![],
                        })?;
                        if use_engine.is_module_loaded(&name) {
                            return Ok(BoxedValue::undefined());
                        }
                        let source = use_loader.borrow().load(&name, use_options.module_root.as_deref()).map_err(|reason| {
                            crate::proxy_function::DispatchError::Thrown(eval::exception_bv("runtime_error", format!("could not load module '{name}': {reason}")))
                        })?;
                        let ast = parser::parse(&name, &source)
                            .map_err(|e| crate::proxy_function::DispatchError::Thrown(eval::exception_bv("eval_error", e.to_string())))?;
                        let ast = optimize(ast);
                        let mut state = DispatchState::new(Rc::clone(&use_engine));
                        eval::eval(&ast, &mut state).map_err(EvalError::into_dispatch_error)?;
                        use_engine.mark_module_loaded(&name);
                        Ok(BoxedValue::undefined())
                    },
                )) as Rc<dyn ProxyFunction>,
            )
            .expect("use registered once per engine");
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Engine, EngineOptions};
    use crate::engine::EngineError;
    use crate::eval::EvalErrorKind;

    #[test]
    fn evaluates_a_script_against_the_registered_stdlib() {
        let engine = Engine::new();
        let result = engine.eval("1 + 2;").unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 3);
    }

    #[test]
    fn parse_errors_surface_as_engine_errors() {
        let engine = Engine::new();
        let err = engine.eval("def f( {").unwrap_err();
        assert!(matches!(err, super::EngineError::Parse(_)));
    }

    #[test]
    fn nested_eval_primitive_runs_through_the_same_engine_state() {
        let engine = Engine::new();
        let result = engine.eval(r#"eval("2 * 3");"#).unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 6);
    }

    #[test]
    fn options_default_to_a_bounded_recursion_depth() {
        assert_eq!(EngineOptions::default().max_recursion_depth, Some(500));
    }

    #[test]
    fn unbounded_recursion_raises_eval_error_instead_of_overflowing_the_stack() {
        let engine = Engine::with_options(EngineOptions::default().max_recursion_depth(Some(20)));
        let err = engine.eval("def recurse(n) { return recurse(n + 1); } recurse(0);").unwrap_err();
        match err {
            EngineError::Eval(e) => assert!(matches!(e.kind, EvalErrorKind::Thrown(_))),
            other => panic!("expected an eval error, got {other:?}"),
        }
    }

    #[test]
    fn add_conversion_registers_a_usable_conversion() {
        let engine = Engine::new();
        engine
            .add_conversion(crate::conversions::TypeConversion::one_way(
                crate::type_tag::TypeTag::of::<i64>(),
                crate::type_tag::TypeTag::of::<String>(),
                |bv| super::BoxedValue::from_value(bv.try_clone_to::<i64>().unwrap().to_string()),
            ))
            .unwrap();
        let n = super::BoxedValue::from_value(42_i64);
        let s = n.cast_with_conversions::<String>(engine.engine.conversions()).unwrap();
        assert_eq!(s, "42");
    }

    #[test]
    fn add_base_class_registers_an_into_backed_upcast() {
        #[derive(Clone)]
        struct Animal {
            name: String,
        }
        #[derive(Clone)]
        struct Dog {
            name: String,
        }
        impl From<Dog> for Animal {
            fn from(d: Dog) -> Self {
                Animal { name: d.name }
            }
        }

        let engine = Engine::new();
        engine.add_base_class::<Animal, Dog>().unwrap();
        let dog = super::BoxedValue::from_value(Dog { name: "Rex".to_string() });
        let animal = dog.cast_with_conversions::<Animal>(engine.engine.conversions()).unwrap();
        assert_eq!(animal.name, "Rex");
    }

    #[test]
    fn eval_typed_casts_the_result() {
        let engine = Engine::new();
        let n: i64 = engine.eval_typed("1 + 2;").unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn get_state_and_set_state_round_trip_loaded_modules() {
        let engine = Engine::new();
        engine.engine.mark_module_loaded("demo");
        let state = engine.get_state();
        assert!(state.used_files().contains(&"demo".to_string()));

        let fresh = Engine::new();
        fresh.set_state(state);
        assert!(fresh.get_state().used_files().contains(&"demo".to_string()));
    }

    #[test]
    fn a_none_limit_allows_deep_recursion() {
        let engine = Engine::with_options(EngineOptions::default().max_recursion_depth(None));
        let result = engine
            .eval("def count(n) { if (n <= 0) { return 0; } return 1 + count(n - 1); } count(300);")
            .unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 300);
    }
}

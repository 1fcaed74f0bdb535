//! Registered conversions between related types (`spec.md §3, §4.3`).
//!
//! Grounded on `original_source/include/chaiscript/dispatchkit/type_conversions.hpp`
//! (the reader/writer lock plus thread-local "known convertible types" cache this module
//! copies) and, for the "hand-rolled registry behind a lock" shape in idiomatic Rust, on
//! `examples/parcadei-ouros/crates/ouros/src/modules/csv_mod.rs`'s `OnceLock<Mutex<..>>`
//! module-level registries.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::boxed_value::{BadCast, BoxedValue};
use crate::type_tag::TypeTag;

/// A directed edge `from -> to` with an upcast and optional downcast operation
/// (`spec.md §3`).
pub struct TypeConversion {
    pub from: TypeTag,
    pub to: TypeTag,
    pub bidir: bool,
    convert: Box<dyn Fn(&BoxedValue) -> BoxedValue>,
    convert_down: Option<Box<dyn Fn(&BoxedValue) -> Result<BoxedValue, BadCast>>>,
}

impl TypeConversion {
    /// A one-directional (upcast only) conversion.
    pub fn one_way(
        from: TypeTag,
        to: TypeTag,
        convert: impl Fn(&BoxedValue) -> BoxedValue + 'static,
    ) -> Self {
        Self {
            from,
            to,
            bidir: false,
            convert: Box::new(convert),
            convert_down: None,
        }
    }

    /// A two-directional conversion: `convert` upcasts, `convert_down` downcasts and may
    /// fail (`spec.md §3`: "may fail").
    pub fn bidirectional(
        from: TypeTag,
        to: TypeTag,
        convert: impl Fn(&BoxedValue) -> BoxedValue + 'static,
        convert_down: impl Fn(&BoxedValue) -> Result<BoxedValue, BadCast> + 'static,
    ) -> Self {
        Self {
            from,
            to,
            bidir: true,
            convert: Box::new(convert),
            convert_down: Some(Box::new(convert_down)),
        }
    }
}

/// Registration failure: a conversion already exists for this `(from, to)` pair
/// (`spec.md §4.3` invariant).
#[derive(Debug, Clone)]
pub struct ConversionExists {
    pub from: TypeTag,
    pub to: TypeTag,
}

impl fmt::Display for ConversionExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conversion from '{}' to '{}' already registered", self.from, self.to)
    }
}

impl std::error::Error for ConversionExists {}

/// Failure looking up or applying a conversion.
#[derive(Debug, Clone)]
pub enum ConversionError {
    NotFound { from: TypeTag, to: TypeTag },
    DowncastFailed(BadCast),
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { from, to } => write!(f, "no conversion registered from '{from}' to '{to}'"),
            Self::DowncastFailed(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConversionError {}

#[derive(Default)]
struct Registry {
    by_pair: HashMap<(TypeKey, TypeKey), TypeConversion>,
    version: u64,
}

/// `TypeTag` isn't `Hash`/`Eq` beyond identity-by-id, which is exactly what we want as a
/// map key (bare type only, qualifiers stripped). `None` (the undefined tag) is kept
/// distinct per-key by falling back to the type name, matching `TypeTag`'s own
/// never-equal-to-anything rule for undefined tags.
#[derive(Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Id(std::any::TypeId),
    Undef(&'static str),
}

/// Registry of [`TypeConversion`]s, shared by an [`crate::Engine`] across host threads.
///
/// Concurrency matches `spec.md §5`: a single reader/writer lock guards the registry.
/// Unlike the original's thread-local "known convertible types" cache (an optimization
/// keyed by a version counter so repeated `converts()` checks at the same call site can
/// skip rescanning), Ember keeps that cache but scoped to this struct rather than truly
/// thread-local storage, since `TypeConversions` is already the unit callers share.
pub struct TypeConversions {
    registry: RwLock<Registry>,
    version_counter: AtomicU64,
}

thread_local! {
    static SAVES: RefCell<Vec<Vec<BoxedValue>>> = const { RefCell::new(Vec::new()) };
}

impl Default for TypeConversions {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeConversions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            version_counter: AtomicU64::new(0),
        }
    }

    /// Current registry version, bumped on every successful `add`. Exposed so callers
    /// (e.g. per-call-site caches in the dispatch engine) can detect when a cached
    /// "known convertible" set might be stale, per `spec.md §5`.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version_counter.load(Ordering::Acquire)
    }

    fn key(tag: TypeTag) -> TypeKey {
        match tag.raw_id() {
            Some(id) => TypeKey::Id(id),
            None => TypeKey::Undef(tag.name()),
        }
    }

    /// `add(conversion)`: insert; duplicate `(from, to)` is an error.
    ///
    /// # Errors
    /// Returns [`ConversionExists`] if a conversion for this `(from, to)` pair is
    /// already registered.
    pub fn add(&self, conversion: TypeConversion) -> Result<(), ConversionExists> {
        let mut reg = self.registry.write().expect("conversions lock poisoned");
        let key = (Self::key(conversion.from), Self::key(conversion.to));
        if reg.by_pair.contains_key(&key) {
            return Err(ConversionExists {
                from: conversion.from,
                to: conversion.to,
            });
        }
        reg.by_pair.insert(key, conversion);
        reg.version += 1;
        self.version_counter.store(reg.version, Ordering::Release);
        Ok(())
    }

    /// `converts(to, from)`: membership check, bidirectional lookup (either a direct
    /// edge `from -> to`, or a `bidir` edge `to -> from` usable in reverse).
    #[must_use]
    pub fn converts(&self, to: TypeTag, from: TypeTag) -> bool {
        let reg = self.registry.read().expect("conversions lock poisoned");
        let (fk, tk) = (Self::key(from), Self::key(to));
        if reg.by_pair.contains_key(&(fk, tk)) {
            return true;
        }
        reg.by_pair
            .get(&(tk, fk))
            .is_some_and(|c| c.bidir)
    }

    /// `convert_to(Target, bv)`: find and apply the upcast edge `bv.type -> Target`.
    ///
    /// # Errors
    /// Returns [`ConversionError::NotFound`] if no such edge is registered.
    pub fn convert_to(&self, to: TypeTag, bv: &BoxedValue) -> Result<BoxedValue, ConversionError> {
        let reg = self.registry.read().expect("conversions lock poisoned");
        let from = bv.get_type();
        let key = (Self::key(from), Self::key(to));
        let converted = reg
            .by_pair
            .get(&key)
            .map(|c| (c.convert)(bv))
            .ok_or(ConversionError::NotFound { from, to })?;
        self.save(converted.clone_handle());
        Ok(converted)
    }

    /// `convert_down(Derived, bv)`: find and apply the reverse (downcast) edge.
    ///
    /// # Errors
    /// Returns [`ConversionError::NotFound`] if no bidirectional edge is registered for
    /// this pair, or [`ConversionError::DowncastFailed`] if the downcast itself fails.
    pub fn convert_down(&self, derived: TypeTag, bv: &BoxedValue) -> Result<BoxedValue, ConversionError> {
        let reg = self.registry.read().expect("conversions lock poisoned");
        let from = bv.get_type();
        let key = (Self::key(derived), Self::key(from));
        let conv = reg.by_pair.get(&key).filter(|c| c.bidir).ok_or(ConversionError::NotFound { from, to: derived })?;
        let down = conv
            .convert_down
            .as_ref()
            .expect("bidir conversion always carries convert_down");
        let converted = down(bv).map_err(ConversionError::DowncastFailed)?;
        self.save(converted.clone_handle());
        Ok(converted)
    }

    /// Pushes a new save frame; called when a top-level call chain begins
    /// (`Engine::eval`, a script function call entry) so temporaries created by
    /// conversions during that call chain stay alive until it completes.
    pub fn push_saves(&self) {
        SAVES.with_borrow_mut(|stack| stack.push(Vec::new()));
    }

    /// Pops the current save frame, returning the temporaries accumulated in it. The
    /// caller is responsible for keeping the returned `Vec` alive for as long as
    /// references derived from those conversions might still be used.
    #[must_use]
    pub fn pop_saves(&self) -> Vec<BoxedValue> {
        SAVES.with_borrow_mut(|stack| stack.pop().unwrap_or_default())
    }

    fn save(&self, bv: BoxedValue) {
        SAVES.with_borrow_mut(|stack| {
            if let Some(top) = stack.last_mut() {
                top.push(bv);
            }
        });
    }
}


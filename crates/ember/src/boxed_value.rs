//! Type-erased container for any host or script value (`spec.md §3, §4.2`).
//!
//! Grounded on `original_source/include/chaiscript/dispatchkit/boxed_value.hpp` for the
//! contract, and on `examples/parcadei-ouros/crates/ouros/src/value.rs`'s doc-comment
//! style for how to narrate a hybrid immediate/heap value representation (ours is
//! immediate/shared/borrowed rather than immediate/arena, since Ember has no GC'd heap —
//! `spec.md §1` non-goals — but the "document why Clone isn't the whole story" approach
//! is the same move).
//!
//! # The casting contract, mapped to Rust
//!
//! `spec.md §4.2` specifies a single generic `cast<Target>` with six fallback steps.
//! Rust's trait system can't express one generic function that behaves differently for
//! `Target = BoxedValue` vs. `Target = SomeHostType` without nightly specialization, so
//! the contract is split into the methods below; each docstring says which step(s) of
//! the original contract it implements:
//!
//! - [`BoxedValue::clone_handle`] — step 1 (identity clone when `Target` is `BoxedValue`).
//! - [`BoxedValue::try_clone_to`] — step 2 (trivial projection by cloning out).
//! - [`BoxedValue::try_shared`] — step 3 (return the shared handle directly).
//! - [`BoxedValue::with_ref`] / [`BoxedValue::with_mut`] — step 4 (borrow in place).
//! - [`BoxedValue::cast_with_conversions`] — steps 5-6 (apply a registered conversion,
//!   retry, else [`BadCast`]).

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::conversions::TypeConversions;
use crate::type_tag::TypeTag;

/// The error produced when a requested type projection is impossible
/// (`spec.md §7`: `BadCast`).
#[derive(Debug, Clone)]
pub struct BadCast {
    pub from: TypeTag,
    pub to_name: &'static str,
}

impl fmt::Display for BadCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot cast value of type '{}' to '{}'", self.from, self.to_name)
    }
}

impl std::error::Error for BadCast {}

enum Storage {
    Empty,
    /// Owning storage slot: shared ownership, matches `spec.md §3`'s
    /// "owned-by-shared-handle". The erased type is always `RefCell<T>` for whatever
    /// `T` was boxed, which is what lets [`BoxedValue::try_shared`] use the standard
    /// library's safe `Rc::downcast` instead of reinterpreting a fat pointer.
    Shared(Rc<dyn Any>),
    /// Non-owning mutable borrow. The raw pointer exists because Rust has no way to
    /// erase a borrow's lifetime short of `unsafe`; callers (the evaluator, stdlib
    /// registrations that wrap `&mut T`) must not let the `BoxedValue` outlive the
    /// referent, which is the API contract `spec.md §3` asks implementers to document.
    Ref(*mut dyn Any),
    /// Non-owning const borrow; same lifetime caveat as `Ref`.
    ConstRef(*const dyn Any),
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        match self {
            Self::Empty => Self::Empty,
            Self::Shared(rc) => Self::Shared(Rc::clone(rc)),
            Self::Ref(p) => Self::Ref(*p),
            Self::ConstRef(p) => Self::ConstRef(*p),
        }
    }
}

/// A value of unknown static type passed between host and script.
///
/// See the module docs for how the C++ casting contract maps onto this type's methods.
#[derive(Clone)]
pub struct BoxedValue {
    type_tag: TypeTag,
    storage: Storage,
    is_return_value: bool,
    is_const: bool,
    is_reference: bool,
    /// Attribute map used by script-defined (`class`) objects. Lazily created on first
    /// `get_attr`/`set_attr` (`spec.md §4.2`).
    attrs: Option<Rc<RefCell<HashMap<String, BoxedValue>>>>,
}

impl BoxedValue {
    /// `from_value(T)`: takes ownership, non-const, non-reference.
    #[must_use]
    pub fn from_value<T: 'static>(value: T) -> Self {
        Self {
            type_tag: TypeTag::of::<T>(),
            storage: Storage::Shared(Rc::new(RefCell::new(value))),
            is_return_value: false,
            is_const: false,
            is_reference: false,
            attrs: None,
        }
    }

    /// `from_const_value(T)`: owns a const copy.
    #[must_use]
    pub fn from_const_value<T: 'static>(value: T) -> Self {
        let mut bv = Self::from_value(value);
        bv.is_const = true;
        bv.type_tag = bv.type_tag.as_const();
        bv
    }

    /// `from_shared(handle<T>)`: shares ownership with an existing handle.
    #[must_use]
    pub fn from_shared<T: 'static>(handle: Rc<RefCell<T>>) -> Self {
        Self {
            type_tag: TypeTag::of::<T>(),
            storage: Storage::Shared(handle),
            is_return_value: false,
            is_const: false,
            is_reference: false,
            attrs: None,
        }
    }

    /// `from_shared_const(handle<const T>)`.
    #[must_use]
    pub fn from_shared_const<T: 'static>(handle: Rc<RefCell<T>>) -> Self {
        let mut bv = Self::from_shared(handle);
        bv.is_const = true;
        bv.type_tag = bv.type_tag.as_const();
        bv
    }

    /// `from_ref(&T)`: non-owning mutable reference.
    ///
    /// # Safety
    /// `value` must remain valid for as long as the returned `BoxedValue` (and any of
    /// its clones) are in use.
    #[must_use]
    pub unsafe fn from_ref<T: 'static>(value: &mut T) -> Self {
        Self {
            type_tag: TypeTag::of::<T>().as_reference(),
            storage: Storage::Ref(std::ptr::from_mut::<T>(value)),
            is_return_value: false,
            is_const: false,
            is_reference: true,
            attrs: None,
        }
    }

    /// `from_const_ref(&T)`: non-owning const reference. See [`BoxedValue::from_ref`]
    /// for the lifetime contract.
    ///
    /// # Safety
    /// `value` must remain valid for as long as the returned `BoxedValue` (and any of
    /// its clones) are in use.
    #[must_use]
    pub unsafe fn from_const_ref<T: 'static>(value: &T) -> Self {
        Self {
            type_tag: TypeTag::of::<T>().as_const().as_reference(),
            storage: Storage::ConstRef(std::ptr::from_ref::<T>(value)),
            is_return_value: false,
            is_const: true,
            is_reference: true,
            attrs: None,
        }
    }

    /// The empty/undefined `BoxedValue`, used for `var x;` with no initializer.
    #[must_use]
    pub fn undefined() -> Self {
        Self {
            type_tag: TypeTag::undefined(),
            storage: Storage::Empty,
            is_return_value: false,
            is_const: false,
            is_reference: false,
            attrs: None,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self.storage, Storage::Empty)
    }

    #[must_use]
    pub fn get_type(&self) -> TypeTag {
        self.type_tag
    }

    #[must_use]
    pub fn is_const(&self) -> bool {
        self.is_const
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.is_reference
    }

    #[must_use]
    pub fn is_return_value(&self) -> bool {
        self.is_return_value
    }

    pub fn mark_return_value(&mut self) {
        self.is_return_value = true;
    }

    pub fn clear_return_value(&mut self) {
        self.is_return_value = false;
    }

    /// Marks this value const in place, without needing to know its underlying type
    /// (used by `Engine::add_global_const`/`DispatchEngine::add_global_const`, which
    /// receive an already-erased `BoxedValue`). Storage stays shared; only the
    /// const/mutability flags change, so `with_mut` on this handle (or any clone made
    /// beforehand) will reject mutation from here on, while clones made before the call
    /// keep their prior mutability.
    #[must_use]
    pub fn into_const(mut self) -> Self {
        self.is_const = true;
        self.type_tag = self.type_tag.as_const();
        self
    }

    /// Step 1 of the casting contract: when `Target` is `BoxedValue` itself, the cast is
    /// just a clone of the handle (shared storage is reference-counted; this never
    /// deep-copies).
    #[must_use]
    pub fn clone_handle(&self) -> Self {
        self.clone()
    }

    /// `type_match(a, b)`: same `TypeTag`, ignoring qualifiers (bare compare), which is
    /// what `==`/overload matching needs.
    #[must_use]
    pub fn type_match(a: &Self, b: &Self) -> bool {
        a.type_tag.bare_equal(&b.type_tag)
    }

    /// `assign(other)`: shallow assignment preserving storage identity when possible.
    /// If `self` is undefined, adopts `other`'s value; otherwise replaces the whole
    /// `BoxedValue`, which is what plain `Equation` assignment falls back to when
    /// there's no registered `=` overload more specific than identity replacement.
    pub fn assign(&mut self, other: &Self) {
        *self = other.clone();
        self.is_return_value = false;
    }

    /// `get_attr(name)`: lazily creates an entry in the attribute map.
    #[must_use]
    pub fn get_attr(&mut self, name: &str) -> Self {
        let map = self
            .attrs
            .get_or_insert_with(|| Rc::new(RefCell::new(HashMap::new())));
        map.borrow_mut().entry(name.to_owned()).or_insert_with(Self::undefined).clone()
    }

    /// Sets an attribute directly, used by the evaluator for `this.x = v` and by
    /// constructors initializing fields.
    pub fn set_attr(&mut self, name: &str, value: Self) {
        let map = self
            .attrs
            .get_or_insert_with(|| Rc::new(RefCell::new(HashMap::new())));
        map.borrow_mut().insert(name.to_owned(), value);
    }

    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.as_ref().is_some_and(|m| m.borrow().contains_key(name))
    }

    /// Names of all attributes set on this value, used by the `get_attrs` stdlib
    /// primitive (`spec.md §6`).
    #[must_use]
    pub fn attr_names(&self) -> Vec<String> {
        self.attrs
            .as_ref()
            .map(|m| m.borrow().keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `copy_attrs(other)`: used when a class instance is cloned, so the clone gets an
    /// independent attribute map with (shallow) copies of each attribute value.
    pub fn copy_attrs(&mut self, other: &Self) {
        if let Some(src) = &other.attrs {
            let copy: HashMap<String, Self> = src.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            self.attrs = Some(Rc::new(RefCell::new(copy)));
        }
    }

    /// Step 2 of the casting contract: projects to an owned `T` by cloning the payload
    /// out, succeeding whenever the bare type matches.
    ///
    /// # Errors
    /// Returns [`BadCast`] if the bare type doesn't match `T`.
    pub fn try_clone_to<T: Clone + 'static>(&self) -> Result<T, BadCast> {
        match &self.storage {
            Storage::Shared(rc) => rc
                .downcast_ref::<RefCell<T>>()
                .map(|cell| cell.borrow().clone())
                .ok_or_else(|| self.bad_cast::<T>()),
            // SAFETY: the pointer was created from a live `&mut T`/`&T` by `from_ref`/
            // `from_const_ref`, whose contract requires the referent to outlive this
            // `BoxedValue`; we only dereference it for the duration of this call.
            Storage::Ref(p) => unsafe { (**p).downcast_ref::<T>().cloned().ok_or_else(|| self.bad_cast::<T>()) },
            Storage::ConstRef(p) => unsafe { (**p).downcast_ref::<T>().cloned().ok_or_else(|| self.bad_cast::<T>()) },
            Storage::Empty => Err(self.bad_cast::<T>()),
        }
    }

    /// Step 3 of the casting contract: if this value carries a shared handle of
    /// compatible type, return that handle (cheap `Rc` clone, no deep copy).
    ///
    /// # Errors
    /// Returns [`BadCast`] if storage isn't `Shared` or the type doesn't match.
    pub fn try_shared<T: 'static>(&self) -> Result<Rc<RefCell<T>>, BadCast> {
        match &self.storage {
            Storage::Shared(rc) => Rc::clone(rc).downcast::<RefCell<T>>().map_err(|_| self.bad_cast::<T>()),
            _ => Err(self.bad_cast::<T>()),
        }
    }

    /// Step 4 of the casting contract: borrow the payload in place without cloning it
    /// out, for any storage kind.
    ///
    /// # Errors
    /// Returns [`BadCast`] if the bare type doesn't match `T`.
    pub fn with_ref<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, BadCast> {
        match &self.storage {
            Storage::Shared(rc) => rc
                .downcast_ref::<RefCell<T>>()
                .map(|cell| f(&cell.borrow()))
                .ok_or_else(|| self.bad_cast::<T>()),
            // SAFETY: see `try_clone_to`.
            Storage::Ref(p) => unsafe { (**p).downcast_ref::<T>().map(f).ok_or_else(|| self.bad_cast::<T>()) },
            Storage::ConstRef(p) => unsafe { (**p).downcast_ref::<T>().map(f).ok_or_else(|| self.bad_cast::<T>()) },
            Storage::Empty => Err(self.bad_cast::<T>()),
        }
    }

    /// Mutable counterpart of [`BoxedValue::with_ref`]. Fails with [`BadCast`] if the
    /// value is const (mirrors `is_const ⇒ mutable pointer is null`, `spec.md §3`).
    ///
    /// # Errors
    /// Returns [`BadCast`] if the value is const, storage is empty/`ConstRef`, or the
    /// bare type doesn't match `T`.
    pub fn with_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, BadCast> {
        if self.is_const {
            return Err(self.bad_cast::<T>());
        }
        match &self.storage {
            Storage::Shared(rc) => rc
                .downcast_ref::<RefCell<T>>()
                .map(|cell| f(&mut cell.borrow_mut()))
                .ok_or_else(|| self.bad_cast::<T>()),
            // SAFETY: see `try_clone_to`.
            Storage::Ref(p) => unsafe { (**p).downcast_mut::<T>().map(f).ok_or_else(|| self.bad_cast::<T>()) },
            Storage::ConstRef(_) | Storage::Empty => Err(self.bad_cast::<T>()),
        }
    }

    /// Steps 5-6 of the casting contract: if a direct cast fails, look up a registered
    /// conversion from this value's type to `T` and retry; otherwise fail with
    /// [`BadCast`].
    ///
    /// # Errors
    /// Returns [`BadCast`] if no direct cast or registered conversion succeeds.
    pub fn cast_with_conversions<T: Clone + 'static>(&self, conversions: &TypeConversions) -> Result<T, BadCast> {
        if let Ok(v) = self.try_clone_to::<T>() {
            return Ok(v);
        }
        let converted = conversions
            .convert_to(TypeTag::of::<T>(), self)
            .map_err(|_| self.bad_cast::<T>())?;
        converted.try_clone_to::<T>()
    }

    fn bad_cast<T: 'static>(&self) -> BadCast {
        BadCast {
            from: self.type_tag,
            to_name: std::any::type_name::<T>(),
        }
    }
}

impl fmt::Debug for BoxedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            return write!(f, "BoxedValue({}, undefined)", self.type_tag);
        }
        if let Ok(s) = self.try_clone_to::<String>() {
            return write!(f, "BoxedValue({}, {s:?})", self.type_tag);
        }
        if let Ok(i) = self.try_clone_to::<i64>() {
            return write!(f, "BoxedValue({}, {i})", self.type_tag);
        }
        if let Ok(n) = self.try_clone_to::<f64>() {
            return write!(f, "BoxedValue({}, {n})", self.type_tag);
        }
        if let Ok(b) = self.try_clone_to::<bool>() {
            return write!(f, "BoxedValue({}, {b})", self.type_tag);
        }
        write!(f, "BoxedValue({})", self.type_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_owned() {
        let bv = BoxedValue::from_value(42i64);
        assert_eq!(bv.try_clone_to::<i64>().unwrap(), 42);
    }

    #[test]
    fn const_blocks_mutation() {
        let bv = BoxedValue::from_const_value(42i64);
        assert!(bv.with_mut::<i64, _>(|v| *v += 1).is_err());
    }

    #[test]
    fn shared_handle_is_aliased() {
        let bv = BoxedValue::from_value(1i64);
        let bv2 = bv.clone_handle();
        bv.with_mut::<i64, _>(|v| *v = 99).unwrap();
        assert_eq!(bv2.try_clone_to::<i64>().unwrap(), 99);
    }

    #[test]
    fn shared_round_trips_through_try_shared() {
        let handle = Rc::new(RefCell::new(10i64));
        let bv = BoxedValue::from_shared(Rc::clone(&handle));
        let round_tripped = bv.try_shared::<i64>().unwrap();
        *round_tripped.borrow_mut() = 20;
        assert_eq!(*handle.borrow(), 20);
    }

    #[test]
    fn debug_shows_a_best_effort_preview() {
        let bv = BoxedValue::from_value(42i64);
        assert_eq!(format!("{bv:?}"), format!("BoxedValue({}, 42)", bv.get_type()));
        let undef = BoxedValue::undefined();
        assert_eq!(format!("{undef:?}"), format!("BoxedValue({}, undefined)", undef.get_type()));
    }

    #[test]
    fn attrs_lazy() {
        let mut bv = BoxedValue::from_value(1i64);
        bv.set_attr("x", BoxedValue::from_value(7i64));
        assert!(bv.has_attr("x"));
        assert!(!bv.has_attr("y"));
    }
}

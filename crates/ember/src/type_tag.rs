//! Runtime type identity with qualifiers (const, reference, pointer, arithmetic).
//!
//! Grounded on `examples/parcadei-ouros/crates/ouros/src/types/type.rs`'s `Type` enum
//! (a small, cheap-to-compare identity tag carried alongside values) and on
//! `original_source/include/chaiscript/dispatchkit/type_info.hpp`, which this module's
//! contract is distilled from: a `Type_Info` that separates "the bare type" from
//! qualifier flags so overload resolution can treat `T`, `T&`, `const T&` as one thing.

use std::any::TypeId;
use std::fmt;

/// A unique identity for a host or script-visible type, independent of any particular
/// value of that type.
///
/// Two `TypeTag`s are equal iff they describe the same bare type *and* the same
/// qualifiers. Use [`TypeTag::bare_equal`] when qualifiers should be ignored, which is
/// what overload resolution and casting need.
#[derive(Clone, Copy)]
pub struct TypeTag {
    /// Identity of the unqualified type. `None` marks the "undefined" tag, which never
    /// compares equal to anything, including another undefined tag.
    id: Option<TypeId>,
    name: &'static str,
    flags: Flags,
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
struct Flags {
    is_const: bool,
    is_reference: bool,
    is_pointer: bool,
    is_void: bool,
    is_arithmetic: bool,
}

impl TypeTag {
    /// Builds the tag for `T`, with `is_arithmetic` set for every numeric primitive
    /// except `bool` (`spec.md §4.1`: "Arithmetic flag excludes bool").
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: Some(TypeId::of::<T>()),
            name: std::any::type_name::<T>(),
            flags: Flags {
                is_arithmetic: is_arithmetic::<T>(),
                ..Flags::default()
            },
        }
    }

    /// The tag used for `BoxedValue` parameters that accept any argument type.
    #[must_use]
    pub fn undefined() -> Self {
        Self {
            id: None,
            name: "undefined",
            flags: Flags::default(),
        }
    }

    /// The tag for `()`/void, used as a dynamic function's declared return type when the
    /// body never needs one.
    #[must_use]
    pub fn void() -> Self {
        Self {
            id: Some(TypeId::of::<()>()),
            name: "void",
            flags: Flags {
                is_void: true,
                ..Flags::default()
            },
        }
    }

    #[must_use]
    pub const fn as_const(mut self) -> Self {
        self.flags.is_const = true;
        self
    }

    #[must_use]
    pub const fn as_reference(mut self) -> Self {
        self.flags.is_reference = true;
        self
    }

    #[must_use]
    pub const fn as_pointer(mut self) -> Self {
        self.flags.is_pointer = true;
        self
    }

    /// The human-readable type name, used in diagnostics (`DispatchError`, `ParseError`
    /// context, `repr`-style stdlib output).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn is_const(&self) -> bool {
        self.flags.is_const
    }

    #[must_use]
    pub const fn is_reference(&self) -> bool {
        self.flags.is_reference
    }

    #[must_use]
    pub const fn is_pointer(&self) -> bool {
        self.flags.is_pointer
    }

    #[must_use]
    pub const fn is_void(&self) -> bool {
        self.flags.is_void
    }

    #[must_use]
    pub const fn is_arithmetic(&self) -> bool {
        self.flags.is_arithmetic
    }

    #[must_use]
    pub const fn is_undef(&self) -> bool {
        self.id.is_none()
    }

    /// Compares unqualified identity only: `T`, `T&`, `const T&`, and `shared<T>` all
    /// compare equal under `bare_equal`. An undefined tag is never `bare_equal` to
    /// anything (`spec.md §3` invariant).
    #[must_use]
    pub fn bare_equal(&self, other: &Self) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Returns the tag with all qualifier flags cleared, keeping the bare identity.
    #[must_use]
    pub fn bare(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            flags: Flags::default(),
        }
    }

    /// Raw identity, used internally by the conversions registry as a hash map key.
    /// Kept `pub(crate)` rather than public API: callers outside the dispatch kernel
    /// should compare tags with `==`/`bare_equal`, not depend on `TypeId` directly.
    pub(crate) fn raw_id(&self) -> Option<TypeId> {
        self.id
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id.is_some() && self.id == other.id && self.flags == other.flags
    }
}

impl Eq for TypeTag {}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({}", self.name)?;
        if self.flags.is_const {
            write!(f, ", const")?;
        }
        if self.flags.is_reference {
            write!(f, ", &")?;
        }
        if self.flags.is_pointer {
            write!(f, ", *")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn is_arithmetic<T: 'static>() -> bool {
    let id = TypeId::of::<T>();
    id == TypeId::of::<i64>()
        || id == TypeId::of::<i32>()
        || id == TypeId::of::<u64>()
        || id == TypeId::of::<u32>()
        || id == TypeId::of::<f64>()
        || id == TypeId::of::<f32>()
        || id == TypeId::of::<usize>()
        || id == TypeId::of::<isize>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_equal_ignores_qualifiers() {
        let a = TypeTag::of::<i64>();
        let b = TypeTag::of::<i64>().as_const().as_reference();
        assert!(a.bare_equal(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn undefined_never_equal() {
        let u1 = TypeTag::undefined();
        let u2 = TypeTag::undefined();
        assert!(!u1.bare_equal(&u2));
    }

    #[test]
    fn arithmetic_excludes_bool() {
        assert!(TypeTag::of::<i64>().is_arithmetic());
        assert!(TypeTag::of::<f64>().is_arithmetic());
        assert!(!TypeTag::of::<bool>().is_arithmetic());
    }
}

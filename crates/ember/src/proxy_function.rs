//! The dispatch kernel's function representation: a type-erased callable plus the
//! overload-resolution algorithm that picks among several of them (`spec.md §3, §4.4`).
//!
//! Grounded on `original_source/include/chaiscript/dispatchkit/proxy_functions.hpp`
//! (`Proxy_Function_Base`, `Dynamic_Proxy_Function`, `Bound_Function`, `Attribute_Access`,
//! the `dispatch_with_conversions` overload algorithm) and
//! `original_source/include/chaiscript/dispatchkit/bind_first.hpp` for `bind`'s
//! placeholder semantics (`SPEC_FULL.md` SUPPLEMENT-2). C++ uses one polymorphic base
//! class with virtual `do_call`/`call_match`; Rust expresses the same shape as a trait
//! plus a handful of concrete implementors, since there is no single generic `cast<T>`
//! call site to share the way the original's template machinery does.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::conversions::TypeConversions;
use crate::type_tag::TypeTag;

/// A node in a script function body. Left abstract here; the evaluator (`crate::eval`)
/// supplies the concrete AST type. Kept as a trait object so this module doesn't need to
/// depend on the parser.
pub trait CallBody: fmt::Debug {
    fn call(&self, args: &[BoxedValue], conversions: &TypeConversions) -> Result<BoxedValue, DispatchError>;
}

/// Attempted-call diagnostics and the failure to build a [`DispatchError`] from
/// (`spec.md §4.4`, `§7`: "carries the attempted argument types and candidate set").
#[derive(Debug, Clone)]
pub enum DispatchError {
    /// No registered overload's arity matches the call.
    Arity { got: usize, candidates: Vec<Signature> },
    /// At least one candidate had the right arity, but none of them matched these
    /// argument types (including after conversions), or every candidate's guard
    /// rejected the call.
    NoMatch { args: Vec<TypeTag>, candidates: Vec<Signature> },
    /// More than one candidate matched equally well after the arithmetic-widening pass.
    Ambiguous { args: Vec<TypeTag>, candidates: Vec<Signature> },
    /// A script `throw` (or a host exception re-raised as one) unwinding through a
    /// dispatch boundary. The original propagates this as a genuine C++ exception
    /// carrying a `Boxed_Value`; Rust has no equivalent unwinding mechanism that crosses
    /// a `Result`-returning trait method, so the dispatch kernel threads it through this
    /// variant instead. `crate::eval` converts it back to a `Signal::Throw` as soon as it
    /// surfaces above the dispatch call that produced it.
    Thrown(BoxedValue),
}

/// A candidate's shape, recorded for diagnostics only.
#[derive(Debug, Clone)]
pub struct Signature {
    pub annotation: String,
    pub arity: i32,
    pub param_types: Vec<TypeTag>,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arity { got, candidates } => {
                write!(f, "arity mismatch: called with {got} argument(s), {} candidate(s) registered", candidates.len())
            }
            Self::NoMatch { args, candidates } => {
                write!(
                    f,
                    "no matching overload for ({}) among {} candidate(s)",
                    args.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
                    candidates.len()
                )
            }
            Self::Ambiguous { args, candidates } => {
                write!(
                    f,
                    "ambiguous call with ({}): {} candidates matched equally well",
                    args.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
                    candidates.len()
                )
            }
            Self::Thrown(v) => write!(f, "unhandled exception of type '{}'", v.get_type()),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Sentinel marker type standing in for `Boxed_Value` as a parameter type
/// (`spec.md §4.4`: "a parameter declared `BoxedValue` accepts anything").
pub struct AnyValue;

/// Sentinel marker type standing in for `Boxed_Number`, the arithmetic wildcard
/// (`spec.md §4.4`: a parameter of this pseudo-type accepts any arithmetic argument).
pub struct AnyNumber;

/// A type-erased, possibly-overloaded callable (`spec.md §3`).
///
/// `param_types()[0]` is always the return type; `param_types()[1..]` are the
/// parameters, mirroring the original's "index 0 is the return type" convention so
/// arity and parameter-type bookkeeping share one vector.
pub trait ProxyFunction: fmt::Debug {
    /// Number of parameters, or `-1` if variadic.
    fn arity(&self) -> i32;

    fn param_types(&self) -> &[TypeTag];

    fn annotation(&self) -> &str {
        ""
    }

    /// `true` for attribute-getter functions synthesized from a class's attribute
    /// declarations (`spec.md §4.4`).
    fn is_attribute_access(&self) -> bool {
        false
    }

    /// Cheap filter: would this candidate's arity and declared types admit `args`,
    /// without actually invoking it? Used by the overload scan to shrink the candidate
    /// set before the more expensive arithmetic-widening pass.
    fn call_match(&self, args: &[BoxedValue], conversions: &TypeConversions) -> bool {
        default_call_match(self.arity(), self.param_types(), args, conversions)
    }

    fn call(&self, args: &[BoxedValue], conversions: &TypeConversions) -> Result<BoxedValue, DispatchError>;

    fn signature(&self) -> Signature {
        Signature {
            annotation: self.annotation().to_string(),
            arity: self.arity(),
            param_types: self.param_types().to_vec(),
        }
    }
}

/// Shared by every [`ProxyFunction`] impl's default `call_match`
/// (`original_source/.../proxy_functions.hpp`'s `compare_type_to_param`/`compare_types`).
#[must_use]
pub fn default_call_match(arity: i32, param_types: &[TypeTag], args: &[BoxedValue], conversions: &TypeConversions) -> bool {
    if arity >= 0 && args.len() != arity as usize {
        return false;
    }
    if param_types.len() != args.len() + 1 {
        // no declared parameter types (e.g. a fully dynamic function): arity alone decides.
        return arity < 0 || param_types.len() <= 1;
    }
    args.iter().zip(&param_types[1..]).all(|(bv, ti)| compare_type_to_param(*ti, bv, conversions))
}

/// `compare_type_to_param`: undefined/`BoxedValue`/arithmetic-wildcard/exact/convertible.
#[must_use]
pub fn compare_type_to_param(ti: TypeTag, bv: &BoxedValue, conversions: &TypeConversions) -> bool {
    if ti.is_undef() || ti.bare_equal(&TypeTag::of::<AnyValue>()) {
        return true;
    }
    let bt = bv.get_type();
    if bt.is_undef() {
        return false;
    }
    (ti.bare_equal(&TypeTag::of::<AnyNumber>()) && bt.is_arithmetic())
        || ti.bare_equal(&bt)
        || conversions.converts(ti, bt)
}

/// A script-defined function body: parsed AST plus an optional guard clause
/// (`original_source/.../proxy_functions.hpp`'s `Dynamic_Proxy_Function`).
pub struct DynamicFunction {
    arity: i32,
    param_types: Vec<TypeTag>,
    names: Vec<Option<String>>,
    body: Rc<dyn CallBody>,
    guard: Option<Rc<dyn ProxyFunction>>,
    annotation: String,
}

impl fmt::Debug for DynamicFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicFunction").field("arity", &self.arity).field("annotation", &self.annotation).finish()
    }
}

impl DynamicFunction {
    #[must_use]
    pub fn new(
        arity: i32,
        names: Vec<Option<String>>,
        body: Rc<dyn CallBody>,
        guard: Option<Rc<dyn ProxyFunction>>,
        annotation: String,
    ) -> Self {
        let mut param_types = Vec::with_capacity(names.len() + 1);
        param_types.push(TypeTag::undefined());
        param_types.extend(std::iter::repeat_n(TypeTag::undefined(), names.len()));
        Self { arity, param_types, names, body, guard, annotation }
    }

    #[must_use]
    pub fn names(&self) -> &[Option<String>] {
        &self.names
    }

    fn test_guard(&self, args: &[BoxedValue], conversions: &TypeConversions) -> bool {
        match &self.guard {
            None => true,
            Some(g) => match g.call(args, conversions) {
                Ok(bv) => bv.with_ref::<bool, bool>(|b| *b).unwrap_or(false),
                Err(_) => false,
            },
        }
    }
}

impl ProxyFunction for DynamicFunction {
    fn arity(&self) -> i32 {
        self.arity
    }

    fn param_types(&self) -> &[TypeTag] {
        &self.param_types
    }

    fn annotation(&self) -> &str {
        &self.annotation
    }

    fn call_match(&self, args: &[BoxedValue], conversions: &TypeConversions) -> bool {
        (self.arity < 0 || args.len() == self.arity as usize) && self.test_guard(args, conversions)
    }

    fn call(&self, args: &[BoxedValue], conversions: &TypeConversions) -> Result<BoxedValue, DispatchError> {
        if !self.call_match(args, conversions) {
            return Err(DispatchError::NoMatch {
                args: args.iter().map(BoxedValue::get_type).collect(),
                candidates: vec![self.signature()],
            });
        }
        self.body.call(args, conversions)
    }
}

/// A host-registered function whose parameter types are fixed `TypeTag`s known at
/// registration time, called through a boxed Rust closure.
pub struct NativeFunction {
    param_types: Vec<TypeTag>,
    annotation: String,
    func: Box<dyn Fn(&[BoxedValue]) -> Result<BoxedValue, DispatchError>>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("param_types", &self.param_types).finish()
    }
}

impl NativeFunction {
    #[must_use]
    pub fn new(
        return_type: TypeTag,
        param_types: Vec<TypeTag>,
        annotation: impl Into<String>,
        func: impl Fn(&[BoxedValue]) -> Result<BoxedValue, DispatchError> + 'static,
    ) -> Self {
        let mut types = Vec::with_capacity(param_types.len() + 1);
        types.push(return_type);
        types.extend(param_types);
        Self { param_types: types, annotation: annotation.into(), func: Box::new(func) }
    }
}

impl ProxyFunction for NativeFunction {
    fn arity(&self) -> i32 {
        (self.param_types.len() - 1) as i32
    }

    fn param_types(&self) -> &[TypeTag] {
        &self.param_types
    }

    fn annotation(&self) -> &str {
        &self.annotation
    }

    fn call(&self, args: &[BoxedValue], conversions: &TypeConversions) -> Result<BoxedValue, DispatchError> {
        if !self.call_match(args, conversions) {
            return Err(DispatchError::NoMatch {
                args: args.iter().map(BoxedValue::get_type).collect(),
                candidates: vec![self.signature()],
            });
        }
        (self.func)(args)
    }
}

/// Attribute-getter function synthesized for a class field declaration
/// (`original_source/.../proxy_functions.hpp`'s `Attribute_Access`).
pub struct AttributeAccess {
    name: String,
    class_type: TypeTag,
    param_types: [TypeTag; 2],
}

impl fmt::Debug for AttributeAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeAccess({})", self.name)
    }
}

impl AttributeAccess {
    #[must_use]
    pub fn new(name: impl Into<String>, class_type: TypeTag) -> Self {
        Self { name: name.into(), class_type, param_types: [TypeTag::undefined(), class_type] }
    }
}

impl ProxyFunction for AttributeAccess {
    fn arity(&self) -> i32 {
        1
    }

    fn param_types(&self) -> &[TypeTag] {
        &self.param_types
    }

    fn is_attribute_access(&self) -> bool {
        true
    }

    fn call_match(&self, args: &[BoxedValue], _conversions: &TypeConversions) -> bool {
        args.len() == 1 && args[0].get_type().bare_equal(&self.class_type)
    }

    fn call(&self, args: &[BoxedValue], _conversions: &TypeConversions) -> Result<BoxedValue, DispatchError> {
        let Some(bv) = args.first() else {
            return Err(DispatchError::Arity { got: 0, candidates: vec![self.signature()] });
        };
        if !bv.get_type().bare_equal(&self.class_type) {
            return Err(DispatchError::NoMatch {
                args: args.iter().map(BoxedValue::get_type).collect(),
                candidates: vec![self.signature()],
            });
        }
        Ok(bv.clone_handle().get_attr(&self.name))
    }
}

/// Marker type whose `TypeTag` stands in for `bind`'s `_` placeholder argument
/// (`SPEC_FULL.md` SUPPLEMENT-2; `original_source/.../proxy_functions.hpp`'s
/// `Placeholder_Object`).
pub struct Placeholder;

/// `bind(f, a, _, b)`-style partial application: wraps a callee, pre-supplied leading
/// arguments (some of which may be [`Placeholder`] slots), and splices call-time
/// arguments into the placeholder positions in order
/// (`original_source/.../proxy_functions.hpp`'s `Bound_Function`).
pub struct BoundFunction {
    callee: Rc<dyn ProxyFunction>,
    bound_args: Vec<BoxedValue>,
    param_types: Vec<TypeTag>,
}

impl fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFunction").field("callee", &self.callee).finish()
    }
}

impl BoundFunction {
    #[must_use]
    pub fn new(callee: Rc<dyn ProxyFunction>, bound_args: Vec<BoxedValue>) -> Self {
        let placeholder = TypeTag::of::<Placeholder>();
        let callee_types = callee.param_types();
        let param_types = if callee.arity() < 0 {
            vec![TypeTag::undefined()]
        } else {
            let mut types = vec![callee_types.first().copied().unwrap_or_else(TypeTag::undefined)];
            for (i, a) in bound_args.iter().enumerate() {
                if a.get_type().bare_equal(&placeholder) {
                    types.push(callee_types.get(i + 1).copied().unwrap_or_else(TypeTag::undefined));
                }
            }
            types
        };
        Self { callee, bound_args, param_types }
    }

    /// Splices call-time `args` into the placeholder slots of `bound_args`, in order.
    fn build_args(&self, args: &[BoxedValue]) -> Vec<BoxedValue> {
        let placeholder = TypeTag::of::<Placeholder>();
        let mut out = Vec::with_capacity(self.bound_args.len().max(args.len()));
        let mut call_args = args.iter();
        for bound in &self.bound_args {
            if bound.get_type().bare_equal(&placeholder) {
                if let Some(a) = call_args.next() {
                    out.push(a.clone_handle());
                }
            } else {
                out.push(bound.clone_handle());
            }
        }
        out.extend(call_args.map(BoxedValue::clone_handle));
        out
    }
}

impl ProxyFunction for BoundFunction {
    fn arity(&self) -> i32 {
        if self.callee.arity() < 0 { -1 } else { (self.param_types.len() - 1) as i32 }
    }

    fn param_types(&self) -> &[TypeTag] {
        &self.param_types
    }

    fn annotation(&self) -> &str {
        "bound"
    }

    fn call_match(&self, args: &[BoxedValue], conversions: &TypeConversions) -> bool {
        self.callee.call_match(&self.build_args(args), conversions)
    }

    fn call(&self, args: &[BoxedValue], conversions: &TypeConversions) -> Result<BoxedValue, DispatchError> {
        self.callee.call(&self.build_args(args), conversions)
    }
}

/// A mutable binding to an overload set, itself callable — used for script-visible
/// function names that can be reassigned a whole new dispatch (e.g. re-`def`'d at
/// global scope). Modeled as an indirection cell rather than folding assignment logic
/// into `DispatchEngine`, so this module has no dependency on it.
#[derive(Clone)]
pub struct Assignable(Rc<RefCell<Rc<dyn ProxyFunction>>>);

impl fmt::Debug for Assignable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Assignable({:?})", self.0.borrow())
    }
}

impl Assignable {
    #[must_use]
    pub fn new(initial: Rc<dyn ProxyFunction>) -> Self {
        Self(Rc::new(RefCell::new(initial)))
    }

    pub fn set(&self, f: Rc<dyn ProxyFunction>) {
        *self.0.borrow_mut() = f;
    }

    #[must_use]
    pub fn get(&self) -> Rc<dyn ProxyFunction> {
        Rc::clone(&self.0.borrow())
    }
}

impl ProxyFunction for Assignable {
    fn arity(&self) -> i32 {
        self.get().arity()
    }

    fn param_types(&self) -> &[TypeTag] {
        // SAFETY-free: can't return a reference into a temporary `Rc`'s borrow, so
        // assignable bindings report an undefined signature rather than the callee's.
        // Callers that need the live signature should call `get()` and ask it directly.
        &[]
    }

    fn call(&self, args: &[BoxedValue], conversions: &TypeConversions) -> Result<BoxedValue, DispatchError> {
        self.get().call(args, conversions)
    }
}

/// A first-class overload set: an ordered list of candidates considered together as one
/// `ProxyFunction` value, e.g. when a whole named overload group is passed around as a
/// script value (`original_source/.../dispatchkit.hpp`'s `Dispatch_Function`).
#[derive(Clone)]
pub struct Dispatch {
    candidates: Rc<Vec<Rc<dyn ProxyFunction>>>,
    param_types: Vec<TypeTag>,
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatch({} candidate(s))", self.candidates.len())
    }
}

impl Dispatch {
    #[must_use]
    pub fn new(candidates: Vec<Rc<dyn ProxyFunction>>) -> Self {
        Self { candidates: Rc::new(candidates), param_types: vec![TypeTag::undefined()] }
    }

    #[must_use]
    pub fn candidates(&self) -> &[Rc<dyn ProxyFunction>] {
        &self.candidates
    }
}

impl ProxyFunction for Dispatch {
    fn arity(&self) -> i32 {
        -1
    }

    fn param_types(&self) -> &[TypeTag] {
        &self.param_types
    }

    fn call(&self, args: &[BoxedValue], conversions: &TypeConversions) -> Result<BoxedValue, DispatchError> {
        resolve_and_call(&self.candidates, args, conversions)
    }
}

/// A candidate's **arity score** (`spec.md §4.4` step 1): variadic scores `args.len()`
/// (the worst/least-specific score); otherwise the number of parameters whose bare type
/// differs from the corresponding argument's. A fully bare-exact-matching candidate
/// scores 0; a candidate accepting everything via `BoxedValue`/undefined parameters
/// scores the same as variadic, since none of its declared types bare-match anything.
fn arity_score(func: &dyn ProxyFunction, args: &[BoxedValue]) -> usize {
    if func.arity() < 0 {
        return args.len();
    }
    let types = func.param_types();
    if types.len() != args.len() + 1 {
        // Can't inspect declared types through this candidate (e.g. `Assignable`,
        // which deliberately reports an empty `param_types()`); treat as least specific.
        return args.len();
    }
    args.iter().zip(&types[1..]).filter(|(bv, ti)| !ti.bare_equal(&bv.get_type())).count()
}

/// The shared overload-resolution algorithm (`spec.md §4.4`):
///
/// 1. Filter to candidates whose arity matches, and compute each one's arity score.
/// 2. Scan candidates in increasing score order (registration order within a tied
///    score) for one whose `call_match` passes (honoring any guard clause); the first
///    hit wins and is called immediately.
/// 3. If none matched exactly, retry allowing arithmetic widening between candidates'
///    declared arithmetic parameters and the caller's arithmetic arguments. More than
///    one equally-good arithmetic candidate is a [`DispatchError::Ambiguous`].
/// 4. No match after both passes is a [`DispatchError`]; [`DispatchError::NoMatch`] and
///    [`DispatchError::Arity`] both carry every candidate considered, for diagnostics.
pub fn resolve_and_call(
    candidates: &[Rc<dyn ProxyFunction>],
    args: &[BoxedValue],
    conversions: &TypeConversions,
) -> Result<BoxedValue, DispatchError> {
    let by_arity: Vec<&Rc<dyn ProxyFunction>> =
        candidates.iter().filter(|c| c.arity() < 0 || c.arity() as usize == args.len()).collect();

    if by_arity.is_empty() {
        return Err(DispatchError::Arity {
            got: args.len(),
            candidates: candidates.iter().map(|c| c.signature()).collect(),
        });
    }

    let mut by_score: Vec<&Rc<dyn ProxyFunction>> = by_arity.clone();
    by_score.sort_by_key(|c| arity_score(c.as_ref(), args));

    for c in &by_score {
        if c.call_match(args, conversions) {
            return c.call(args, conversions);
        }
    }

    let arithmetic_candidates: Vec<&Rc<dyn ProxyFunction>> =
        by_arity.iter().copied().filter(|c| types_match_except_arithmetic(c.as_ref(), args, conversions)).collect();

    if let [only] = arithmetic_candidates.as_slice() {
        return only.call(args, conversions);
    }
    if arithmetic_candidates.len() > 1 {
        return Err(DispatchError::Ambiguous {
            args: args.iter().map(BoxedValue::get_type).collect(),
            candidates: arithmetic_candidates.iter().map(|c| c.signature()).collect(),
        });
    }

    Err(DispatchError::NoMatch {
        args: args.iter().map(BoxedValue::get_type).collect(),
        candidates: candidates.iter().map(|c| c.signature()).collect(),
    })
}

fn types_match_except_arithmetic(func: &dyn ProxyFunction, args: &[BoxedValue], conversions: &TypeConversions) -> bool {
    if func.arity() < 0 {
        return false;
    }
    let types = func.param_types();
    if types.len() != args.len() + 1 {
        return false;
    }
    args.iter().zip(&types[1..]).all(|(bv, ti)| {
        compare_type_to_param(*ti, bv, conversions) || (bv.get_type().is_arithmetic() && ti.is_arithmetic())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> TypeConversions {
        TypeConversions::new()
    }

    #[test]
    fn native_function_arity_mismatch() {
        let f = NativeFunction::new(TypeTag::of::<i64>(), vec![TypeTag::of::<i64>()], "add_one", |args| {
            args[0].with_ref::<i64, i64>(|n| n + 1).map(BoxedValue::from_value).map_err(|_| DispatchError::NoMatch {
                args: vec![],
                candidates: vec![],
            })
        });
        let err = f.call(&[], &conv()).unwrap_err();
        assert!(matches!(err, DispatchError::NoMatch { .. }));
    }

    #[test]
    fn bound_function_splices_placeholder() {
        let add = Rc::new(NativeFunction::new(
            TypeTag::of::<i64>(),
            vec![TypeTag::of::<i64>(), TypeTag::of::<i64>()],
            "add",
            |args| {
                let a = args[0].with_ref::<i64, i64>(|n| *n).unwrap();
                let b = args[1].with_ref::<i64, i64>(|n| *n).unwrap();
                Ok(BoxedValue::from_value(a + b))
            },
        )) as Rc<dyn ProxyFunction>;

        let bound_args = vec![BoxedValue::from_value(10_i64), BoxedValue::from_value(Placeholder)];
        let bound = BoundFunction::new(add, bound_args);
        let result = bound.call(&[BoxedValue::from_value(5_i64)], &conv()).unwrap();
        assert_eq!(result.with_ref::<i64, i64>(|n| *n).unwrap(), 15);
    }

    #[test]
    fn overload_resolution_picks_arity_match() {
        let zero = Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![], "zero", |_| Ok(BoxedValue::from_value(0_i64))))
            as Rc<dyn ProxyFunction>;
        let one = Rc::new(NativeFunction::new(
            TypeTag::of::<i64>(),
            vec![TypeTag::of::<i64>()],
            "identity",
            |args| Ok(args[0].clone_handle()),
        )) as Rc<dyn ProxyFunction>;

        let result = resolve_and_call(&[zero, one], &[BoxedValue::from_value(7_i64)], &conv()).unwrap();
        assert_eq!(result.with_ref::<i64, i64>(|n| *n).unwrap(), 7);
    }

    #[derive(Clone)]
    struct CustomType(i64);

    #[test]
    fn exact_bare_match_wins_over_an_earlier_registered_convertible_overload() {
        let conversions = conv();
        conversions
            .add(crate::conversions::TypeConversion::one_way(TypeTag::of::<i64>(), TypeTag::of::<CustomType>(), |bv| {
                bv.with_ref::<i64, BoxedValue>(|n| BoxedValue::from_value(CustomType(*n))).unwrap()
            }))
            .unwrap();

        let takes_custom = Rc::new(NativeFunction::new(
            TypeTag::of::<String>(),
            vec![TypeTag::of::<CustomType>()],
            "f_custom",
            |_| Ok(BoxedValue::from_value("custom".to_string())),
        )) as Rc<dyn ProxyFunction>;
        let takes_i64 = Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::of::<i64>()], "f_i64", |_| {
            Ok(BoxedValue::from_value("i64".to_string()))
        })) as Rc<dyn ProxyFunction>;

        // Registered in the order that would fool a flat registration-order scan.
        let result = resolve_and_call(&[takes_custom, takes_i64], &[BoxedValue::from_value(5_i64)], &conversions).unwrap();
        assert_eq!(result.try_clone_to::<String>().unwrap(), "i64");
    }

    #[test]
    fn equally_good_arithmetic_widening_candidates_are_ambiguous() {
        let takes_i32 = Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![TypeTag::of::<i32>()], "f_i32", |_| {
            Ok(BoxedValue::from_value(0_i64))
        })) as Rc<dyn ProxyFunction>;
        let takes_u32 = Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![TypeTag::of::<u32>()], "f_u32", |_| {
            Ok(BoxedValue::from_value(1_i64))
        })) as Rc<dyn ProxyFunction>;

        let err = resolve_and_call(&[takes_i32, takes_u32], &[BoxedValue::from_value(2.5_f64)], &conv()).unwrap_err();
        assert!(matches!(err, DispatchError::Ambiguous { .. }));
    }
}

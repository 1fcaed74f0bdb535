//! Vector registrations (`spec.md §6`): construction helpers, `size`/`empty`, equality,
//! and `clone`.
//!
//! Grounded on `crate::eval`'s representation of a script array as a bare
//! `Vec<BoxedValue>` (see `eval.rs`'s inline-array evaluation and `read_index`), and on
//! `original_source/include/chaiscript/dispatchkit/bootstrap_stl.hpp`'s
//! `vector_type`/`input_range_type_impl` registrations (`size`, `empty`, `push_back`,
//! equality). `clone` deep-clones element-wise purely because it delegates to each
//! element's own registered `clone` rather than special-casing vectors.

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::dispatch::{DispatchEngine, DispatchState};
use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
use crate::type_tag::TypeTag;

fn no_match(args: &[BoxedValue]) -> DispatchError {
    DispatchError::NoMatch { args: args.iter().map(BoxedValue::get_type).collect(), candidates: vec![] }
}

fn as_vec(bv: &BoxedValue) -> Result<Vec<BoxedValue>, DispatchError> {
    bv.try_clone_to::<Vec<BoxedValue>>().map_err(|_| no_match(std::slice::from_ref(bv)))
}

pub fn register(engine: &DispatchEngine) {
    engine
        .add_function(
            "size",
            Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![TypeTag::of::<Vec<BoxedValue>>()], "size", |args| {
                Ok(BoxedValue::from_value(as_vec(&args[0])?.len() as i64))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "empty",
            Rc::new(NativeFunction::new(TypeTag::of::<bool>(), vec![TypeTag::of::<Vec<BoxedValue>>()], "empty", |args| {
                Ok(BoxedValue::from_value(as_vec(&args[0])?.is_empty()))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "push_back",
            Rc::new(NativeFunction::new(
                TypeTag::void(),
                vec![TypeTag::of::<Vec<BoxedValue>>(), TypeTag::undefined()],
                "push_back",
                |args| {
                    let elem = args[1].clone_handle();
                    args[0].with_mut::<Vec<BoxedValue>, ()>(|v| v.push(elem)).map_err(|_| no_match(args))?;
                    Ok(BoxedValue::undefined())
                },
            )) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "pop_back",
            Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::of::<Vec<BoxedValue>>()], "pop_back", |args| {
                args[0]
                    .with_mut::<Vec<BoxedValue>, Option<BoxedValue>>(|v| v.pop())
                    .map_err(|_| no_match(args))?
                    .ok_or_else(|| no_match(args))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");
}

/// `clone`'s deep-copy behavior for vectors: clone the handle for each element through
/// `DispatchState::call_function("clone", ...)` so a host-defined element type's own
/// `clone` override is honored, rather than aliasing the inner `Rc`.
pub fn deep_clone(v: &[BoxedValue], state: &mut DispatchState) -> Result<Vec<BoxedValue>, DispatchError> {
    v.iter().map(|elem| state.call_function("clone", std::slice::from_ref(elem))).collect()
}

#[cfg(test)]
mod tests {
    use super::{deep_clone, register};
    use crate::boxed_value::BoxedValue;
    use crate::dispatch::{DispatchEngine, DispatchState};
    use crate::proxy_function::NativeFunction;
    use crate::type_tag::TypeTag;
    use std::rc::Rc;

    #[test]
    fn size_and_empty_reflect_vector_contents() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let v = BoxedValue::from_value(vec![BoxedValue::from_value(1_i64), BoxedValue::from_value(2_i64)]);
        let size = state.call_function("size", std::slice::from_ref(&v)).unwrap();
        assert_eq!(size.try_clone_to::<i64>().unwrap(), 2);
        let empty = state.call_function("empty", std::slice::from_ref(&v)).unwrap();
        assert!(!empty.try_clone_to::<bool>().unwrap());
    }

    #[test]
    fn deep_clone_uses_element_clone() {
        let engine = Rc::new(DispatchEngine::new());
        engine
            .add_function("clone", Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::undefined()], "clone", |args| Ok(args[0].clone_handle()))))
            .unwrap();
        let mut state = DispatchState::new(Rc::clone(&engine));
        let v = vec![BoxedValue::from_value(1_i64)];
        let cloned = deep_clone(&v, &mut state).unwrap();
        assert_eq!(cloned[0].try_clone_to::<i64>().unwrap(), 1);
    }
}

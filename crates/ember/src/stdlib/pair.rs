//! Pair registrations (`spec.md §6`'s container list: "vector, string, map, pair,
//! future").
//!
//! Grounded on `original_source/include/chaiscript/dispatchkit/bootstrap_stl.hpp`'s
//! `pair_type` template, which registers a two-arg constructor plus `first`/`second`
//! member-pointer accessors (one `m->add(fun(ptr))` per field, dispatched by arity: one
//! argument reads, two arguments writes). `PairValue` plays the role of `PairType` here;
//! `first`/`second` are two `NativeFunction` overload sets apiece rather than a single
//! `AttributeAccess` each, since a host-defined pair has no declared-class attribute map
//! to read through — its two fields are the whole value.

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::dispatch::DispatchEngine;
use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
use crate::type_tag::TypeTag;

/// A two-element tuple, script-visible as `pair(a, b)` with `.first`/`.second` accessors
/// (`spec.md §6`).
#[derive(Debug, Clone)]
pub struct PairValue {
    pub first: BoxedValue,
    pub second: BoxedValue,
}

fn no_match(args: &[BoxedValue]) -> DispatchError {
    DispatchError::NoMatch { args: args.iter().map(BoxedValue::get_type).collect(), candidates: vec![] }
}

fn as_pair(bv: &BoxedValue) -> Result<PairValue, DispatchError> {
    bv.try_clone_to::<PairValue>().map_err(|_| no_match(std::slice::from_ref(bv)))
}

pub fn register(engine: &DispatchEngine) {
    engine
        .add_function(
            "pair",
            Rc::new(NativeFunction::new(
                TypeTag::of::<PairValue>(),
                vec![TypeTag::undefined(), TypeTag::undefined()],
                "pair",
                |args| Ok(BoxedValue::from_value(PairValue { first: args[0].clone_handle(), second: args[1].clone_handle() })),
            )) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "first",
            Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::of::<PairValue>()], "first", |args| {
                Ok(as_pair(&args[0])?.first)
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "first",
            Rc::new(NativeFunction::new(
                TypeTag::undefined(),
                vec![TypeTag::of::<PairValue>(), TypeTag::undefined()],
                "first",
                |args| {
                    let value = args[1].clone_handle();
                    args[0].with_mut::<PairValue, ()>(|p| p.first = value.clone_handle()).map_err(|_| no_match(args))?;
                    Ok(value)
                },
            )) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "second",
            Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::of::<PairValue>()], "second", |args| {
                Ok(as_pair(&args[0])?.second)
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "second",
            Rc::new(NativeFunction::new(
                TypeTag::undefined(),
                vec![TypeTag::of::<PairValue>(), TypeTag::undefined()],
                "second",
                |args| {
                    let value = args[1].clone_handle();
                    args[0].with_mut::<PairValue, ()>(|p| p.second = value.clone_handle()).map_err(|_| no_match(args))?;
                    Ok(value)
                },
            )) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");
}

#[cfg(test)]
mod tests {
    use super::register;
    use crate::boxed_value::BoxedValue;
    use crate::dispatch::{DispatchEngine, DispatchState};
    use std::rc::Rc;

    #[test]
    fn pair_constructs_and_reads_both_fields() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let p = state.call_function("pair", &[BoxedValue::from_value(1_i64), BoxedValue::from_value("x".to_string())]).unwrap();
        let first = state.call_function("first", std::slice::from_ref(&p)).unwrap();
        let second = state.call_function("second", std::slice::from_ref(&p)).unwrap();
        assert_eq!(first.try_clone_to::<i64>().unwrap(), 1);
        assert_eq!(second.try_clone_to::<String>().unwrap(), "x");
    }

    #[test]
    fn first_and_second_are_writable() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let p = state.call_function("pair", &[BoxedValue::from_value(1_i64), BoxedValue::from_value(2_i64)]).unwrap();
        state.call_function("first", &[p.clone_handle(), BoxedValue::from_value(9_i64)]).unwrap();
        let first = state.call_function("first", std::slice::from_ref(&p)).unwrap();
        assert_eq!(first.try_clone_to::<i64>().unwrap(), 9);
    }
}

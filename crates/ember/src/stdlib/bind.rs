//! `bind` (`spec.md §6`'s script-visible primitive list, elaborated by `SUPPLEMENT-2`):
//! `bind(f, a, _, b)`-style partial application, producing a new callable with the
//! given leading arguments pre-supplied and `_` placeholders filled from the bound
//! call's own arguments in order.
//!
//! Grounded on `original_source/include/chaiscript/dispatchkit/bind_first.hpp`; the
//! `Bound_Function`/`Placeholder_Object` machinery this primitive drives already lives
//! in `crate::proxy_function` (`BoundFunction`, `Placeholder`) and `DispatchState::
//! get_object` already resolves a bare `_` to the placeholder sentinel — this file only
//! wires the two together as a callable script can actually invoke.

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::conversions::TypeConversions;
use crate::dispatch::DispatchEngine;
use crate::proxy_function::{BoundFunction, DispatchError, ProxyFunction};
use crate::type_tag::TypeTag;

#[derive(Debug)]
struct BindPrimitive;

impl ProxyFunction for BindPrimitive {
    fn arity(&self) -> i32 {
        -1
    }

    fn param_types(&self) -> &[TypeTag] {
        &[]
    }

    fn call(&self, args: &[BoxedValue], _conversions: &TypeConversions) -> Result<BoxedValue, DispatchError> {
        let Some((callee_bv, bound_args)) = args.split_first() else {
            return Err(DispatchError::Arity { got: 0, candidates: vec![] });
        };
        let callee = callee_bv.try_clone_to::<Rc<dyn ProxyFunction>>().map_err(|_| DispatchError::NoMatch {
            args: args.iter().map(BoxedValue::get_type).collect(),
            candidates: vec![],
        })?;
        let bound: Rc<dyn ProxyFunction> = Rc::new(BoundFunction::new(callee, bound_args.iter().map(BoxedValue::clone_handle).collect()));
        Ok(BoxedValue::from_value(bound))
    }
}

pub fn register(engine: &DispatchEngine) {
    engine.add_function("bind", Rc::new(BindPrimitive) as Rc<dyn ProxyFunction>).expect("stdlib registration signature unique");
}

#[cfg(test)]
mod tests {
    use super::register;
    use crate::boxed_value::BoxedValue;
    use crate::dispatch::{DispatchEngine, DispatchState, LocCache};
    use crate::proxy_function::{NativeFunction, Placeholder, ProxyFunction};
    use crate::type_tag::TypeTag;
    use std::rc::Rc;

    #[test]
    fn binds_a_leading_argument_and_leaves_a_placeholder_for_the_rest() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        engine
            .add_function(
                "add",
                Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![TypeTag::of::<i64>(), TypeTag::of::<i64>()], "add", |args| {
                    Ok(BoxedValue::from_value(args[0].try_clone_to::<i64>().unwrap() + args[1].try_clone_to::<i64>().unwrap()))
                })) as Rc<dyn ProxyFunction>,
            )
            .unwrap();

        let mut state = DispatchState::new(Rc::clone(&engine));
        let add = state.get_object("add", &LocCache::new()).unwrap();
        let placeholder = BoxedValue::from_value(Placeholder);
        let bound = state.call_function("bind", &[add, BoxedValue::from_value(1_i64), placeholder]).unwrap();
        let callable = bound.try_clone_to::<Rc<dyn ProxyFunction>>().unwrap();
        let result = callable.call(&[BoxedValue::from_value(41_i64)], engine.conversions()).unwrap();
        assert_eq!(result.try_clone_to::<i64>().unwrap(), 42);
    }
}

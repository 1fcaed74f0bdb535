//! Map registrations (`spec.md §6`): `size`/`empty` for the `["k": v]` literal type.
//!
//! Grounded on `eval::MapValue` (`IndexMap<String, BoxedValue>`, insertion-ordered so
//! iteration order matches the literal's source order) and the same
//! `bootstrap_stl.hpp`-style container registration `vector.rs` uses. Indexing (`m["k"]`)
//! is handled natively by `crate::eval`'s `read_index`/`assign_index`, not through a
//! registered function.

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::dispatch::DispatchEngine;
use crate::eval::MapValue;
use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
use crate::type_tag::TypeTag;

fn no_match(args: &[BoxedValue]) -> DispatchError {
    DispatchError::NoMatch { args: args.iter().map(BoxedValue::get_type).collect(), candidates: vec![] }
}

fn as_map(bv: &BoxedValue) -> Result<MapValue, DispatchError> {
    bv.try_clone_to::<MapValue>().map_err(|_| no_match(std::slice::from_ref(bv)))
}

pub fn register(engine: &DispatchEngine) {
    engine
        .add_function(
            "size",
            Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![TypeTag::of::<MapValue>()], "size", |args| {
                Ok(BoxedValue::from_value(as_map(&args[0])?.len() as i64))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "empty",
            Rc::new(NativeFunction::new(TypeTag::of::<bool>(), vec![TypeTag::of::<MapValue>()], "empty", |args| {
                Ok(BoxedValue::from_value(as_map(&args[0])?.is_empty()))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");
}

#[cfg(test)]
mod tests {
    use super::register;
    use crate::boxed_value::BoxedValue;
    use crate::dispatch::{DispatchEngine, DispatchState};
    use crate::eval::MapValue;
    use std::rc::Rc;

    #[test]
    fn size_reflects_entry_count() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let mut m = MapValue::new();
        m.insert("a".to_string(), BoxedValue::from_value(1_i64));
        let bv = BoxedValue::from_value(m);
        let size = state.call_function("size", std::slice::from_ref(&bv)).unwrap();
        assert_eq!(size.try_clone_to::<i64>().unwrap(), 1);
    }
}

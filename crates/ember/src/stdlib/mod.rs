//! Standard library registration (`spec.md §6`'s "script-visible primitives the
//! standard library must register").
//!
//! Each sub-module owns one family of operators/functions and registers itself against
//! a bare `&DispatchEngine`; `register_stdlib` just runs them all in a fixed order.
//! `eval`/`eval_file`/`use` are not registered here: they need the parser and optimizer,
//! which this module deliberately doesn't depend on, so `Engine::new` (`crate::engine`)
//! registers those directly after building the `DispatchEngine`.

mod bind;
mod exceptions;
mod future;
mod map;
mod numeric;
mod pair;
mod primitives;
mod string;
mod vector;

pub use future::FutureValue;
pub use pair::PairValue;
pub use primitives::render;
pub use vector::deep_clone as deep_clone_vector;

use std::rc::Rc;

use crate::dispatch::DispatchEngine;

pub fn register_stdlib(engine: &Rc<DispatchEngine>) {
    numeric::register(engine);
    string::register(engine);
    vector::register(engine);
    map::register(engine);
    pair::register(engine);
    future::register(engine);
    exceptions::register(engine);
    primitives::register(engine);
    bind::register(engine);
}

#[cfg(test)]
mod tests {
    use super::register_stdlib;
    use crate::boxed_value::BoxedValue;
    use crate::dispatch::{DispatchEngine, DispatchState};
    use std::rc::Rc;

    #[test]
    fn registers_numeric_and_string_and_exception_families_without_conflict() {
        let engine = Rc::new(DispatchEngine::new());
        register_stdlib(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));

        let sum = state.call_function("+", &[BoxedValue::from_value(2_i64), BoxedValue::from_value(3_i64)]).unwrap();
        assert_eq!(sum.try_clone_to::<i64>().unwrap(), 5);

        let concat = state.call_function("+", &[BoxedValue::from_value("a".to_string()), BoxedValue::from_value("b".to_string())]).unwrap();
        assert_eq!(concat.try_clone_to::<String>().unwrap(), "ab");

        let exc = state.call_function("runtime_error", &[BoxedValue::from_value("boom".to_string())]).unwrap();
        let msg = state.call_function("message", &[exc]).unwrap();
        assert_eq!(msg.try_clone_to::<String>().unwrap(), "boom");
    }
}

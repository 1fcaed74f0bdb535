//! Future registrations (`spec.md §6`'s container list: "vector, string, map, pair,
//! future").
//!
//! `spec.md §5` rules out any coroutine/await machinery in the core — evaluation is
//! single-threaded and cooperative, one eval call at a time — so there is no executor
//! for a `future` to run against. Grounded on
//! `original_source/include/chaiscript/dispatchkit/bootstrap_stl.hpp`'s `future_type`
//! template (`valid`/`get`/`wait`, the same three operations `std::shared_future<T>`
//! exposes) and on `examples/parcadei-ouros/crates/ouros/src/modules/
//! concurrent_futures.rs`'s synchronous `ThreadPoolExecutor.submit` fallback (a future
//! whose callable has no async machinery behind it still needs to run *some* way — the
//! teacher runs it inline and records success/exception, which is the same shape
//! reused here for `future(callable)`).

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::conversions::TypeConversions;
use crate::dispatch::DispatchEngine;
use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
use crate::type_tag::TypeTag;

/// An eagerly-resolved future: `future(value)` wraps an already-available result,
/// `future(callable)` runs a zero-argument callable immediately and records whether it
/// returned or threw. Either way, by the time a script holds a `FutureValue`, `valid()`
/// is already `true` and `wait()` is a no-op — there is no pending state to observe.
#[derive(Debug, Clone)]
pub struct FutureValue {
    result: Result<BoxedValue, BoxedValue>,
}

fn no_match(args: &[BoxedValue]) -> DispatchError {
    DispatchError::NoMatch { args: args.iter().map(BoxedValue::get_type).collect(), candidates: vec![] }
}

fn as_future(bv: &BoxedValue) -> Result<FutureValue, DispatchError> {
    bv.try_clone_to::<FutureValue>().map_err(|_| no_match(std::slice::from_ref(bv)))
}

pub fn register(engine: &DispatchEngine) {
    engine
        .add_function(
            "future",
            Rc::new(NativeFunction::new(TypeTag::of::<FutureValue>(), vec![TypeTag::undefined()], "future", |args| {
                let result = if let Ok(callable) = args[0].try_clone_to::<Rc<dyn ProxyFunction>>() {
                    callable.call(&[], &TypeConversions::new())
                        .map_err(|e| match e {
                            DispatchError::Thrown(v) => v,
                            other => crate::eval::exception_bv("runtime_error", other.to_string()),
                        })
                } else {
                    Ok(args[0].clone_handle())
                };
                Ok(BoxedValue::from_value(FutureValue { result }))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "valid",
            Rc::new(NativeFunction::new(TypeTag::of::<bool>(), vec![TypeTag::of::<FutureValue>()], "valid", |args| {
                as_future(&args[0])?;
                Ok(BoxedValue::from_value(true))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "wait",
            Rc::new(NativeFunction::new(TypeTag::void(), vec![TypeTag::of::<FutureValue>()], "wait", |args| {
                as_future(&args[0])?;
                Ok(BoxedValue::undefined())
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "get",
            Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::of::<FutureValue>()], "get", |args| {
                match as_future(&args[0])?.result {
                    Ok(v) => Ok(v),
                    Err(exc) => Err(DispatchError::Thrown(exc)),
                }
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");
}

#[cfg(test)]
mod tests {
    use super::register;
    use crate::boxed_value::BoxedValue;
    use crate::dispatch::{DispatchEngine, DispatchState};
    use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
    use crate::type_tag::TypeTag;
    use std::rc::Rc;

    #[test]
    fn future_of_a_value_is_immediately_valid_and_ready() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let f = state.call_function("future", &[BoxedValue::from_value(7_i64)]).unwrap();
        let valid = state.call_function("valid", std::slice::from_ref(&f)).unwrap();
        assert!(valid.try_clone_to::<bool>().unwrap());
        let got = state.call_function("get", std::slice::from_ref(&f)).unwrap();
        assert_eq!(got.try_clone_to::<i64>().unwrap(), 7);
    }

    #[test]
    fn future_of_a_callable_runs_it_eagerly_and_captures_its_result() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let callable: Rc<dyn ProxyFunction> =
            Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![], "make_six", |_args| Ok(BoxedValue::from_value(6_i64))));
        let mut state = DispatchState::new(Rc::clone(&engine));
        let f = state.call_function("future", &[BoxedValue::from_value(callable)]).unwrap();
        let got = state.call_function("get", std::slice::from_ref(&f)).unwrap();
        assert_eq!(got.try_clone_to::<i64>().unwrap(), 6);
    }

    #[test]
    fn get_rethrows_a_captured_exception() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let callable: Rc<dyn ProxyFunction> = Rc::new(NativeFunction::new(TypeTag::undefined(), vec![], "boom", |_args| {
            Err(DispatchError::Thrown(crate::eval::exception_bv("runtime_error", "boom")))
        }));
        let mut state = DispatchState::new(Rc::clone(&engine));
        let f = state.call_function("future", &[BoxedValue::from_value(callable)]).unwrap();
        let err = state.call_function("get", std::slice::from_ref(&f)).unwrap_err();
        assert!(matches!(err, DispatchError::Thrown(_)));
    }
}

//! Exception types and `throw` (`spec.md §6`): `runtime_error`, `out_of_range`,
//! `logic_error`, `arithmetic_error`, `eval_error`, and the `exception` base.
//!
//! Grounded on `crate::eval::ExceptionValue` (one Rust shape, `class_name`-tagged, shared
//! by every script exception class — there is no dedicated Rust type per class) and on
//! `original_source/include/chaiscript/dispatchkit/exception_specialization.hpp`'s
//! constructor-per-class registration pattern. `throw`/`catch` unwinding itself lives in
//! `crate::eval` (`DispatchError::Thrown`); this module only supplies the constructors and
//! the `message`/`what` accessors a caught exception is inspected with.

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::dispatch::DispatchEngine;
use crate::eval::{exception_bv, ExceptionValue};
use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
use crate::type_tag::TypeTag;

const CLASSES: &[&str] = &["runtime_error", "out_of_range", "logic_error", "arithmetic_error", "eval_error", "exception"];

pub fn register(engine: &DispatchEngine) {
    for class_name in CLASSES {
        let class_name = *class_name;
        engine
            .add_function(
                class_name,
                Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::of::<String>()], class_name, move |args| {
                    let msg = args[0].try_clone_to::<String>().map_err(|_| DispatchError::NoMatch { args: vec![], candidates: vec![] })?;
                    Ok(exception_bv(class_name, msg))
                })) as Rc<dyn ProxyFunction>,
            )
            .expect("stdlib registration signature unique");
    }

    engine
        .add_function(
            "throw",
            Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::undefined()], "throw", |args| {
                Err(DispatchError::Thrown(args[0].clone_handle()))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "message",
            Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::undefined()], "message", read_message)) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function("what", Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::undefined()], "what", read_message)) as Rc<dyn ProxyFunction>)
        .expect("stdlib registration signature unique");
}

fn read_message(args: &[BoxedValue]) -> Result<BoxedValue, DispatchError> {
    args[0]
        .with_ref::<ExceptionValue, String>(|e| e.message.clone())
        .map(BoxedValue::from_value)
        .map_err(|_| DispatchError::NoMatch { args: vec![args[0].get_type()], candidates: vec![] })
}

#[cfg(test)]
mod tests {
    use super::register;
    use crate::dispatch::{DispatchEngine, DispatchState};
    use std::rc::Rc;

    #[test]
    fn constructs_and_reads_message() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let exc = state.call_function("out_of_range", &[crate::boxed_value::BoxedValue::from_value("bad index".to_string())]).unwrap();
        let msg = state.call_function("message", &[exc]).unwrap();
        assert_eq!(msg.try_clone_to::<String>().unwrap(), "bad index");
    }
}

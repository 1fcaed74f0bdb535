//! Overload-set invariants from the testable-properties list: registering the exact
//! same signature twice leaves exactly one entry, and among matching candidates the
//! lower-arity-score one wins.

use ember::{BoxedValue, DispatchEngine, DispatchState, NativeFunction, TypeTag};
use std::rc::Rc;

fn adder(name: &'static str) -> Rc<NativeFunction> {
    Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![TypeTag::of::<i64>(), TypeTag::of::<i64>()], name, |args| {
        Ok(BoxedValue::from_value(args[0].try_clone_to::<i64>().unwrap() + args[1].try_clone_to::<i64>().unwrap()))
    }))
}

#[test]
fn duplicate_signature_registration_is_rejected_and_deduplicated() {
    let engine = DispatchEngine::new();
    engine.add_function("add2", adder("add2") as Rc<dyn ember::ProxyFunction>).unwrap();
    let second = engine.add_function("add2", adder("add2") as Rc<dyn ember::ProxyFunction>);
    assert!(second.is_err());
    assert_eq!(engine.get_functions("add2").unwrap().len(), 1);
}

#[test]
fn distinct_signatures_both_survive_under_the_same_name() {
    let engine = Rc::new(DispatchEngine::new());
    engine.add_function("combine", adder("combine") as Rc<dyn ember::ProxyFunction>).unwrap();
    engine
        .add_function(
            "combine",
            Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::of::<String>(), TypeTag::of::<String>()], "combine", |args| {
                Ok(BoxedValue::from_value(format!("{}{}", args[0].try_clone_to::<String>().unwrap(), args[1].try_clone_to::<String>().unwrap())))
            })) as Rc<dyn ember::ProxyFunction>,
        )
        .unwrap();
    assert_eq!(engine.get_functions("combine").unwrap().len(), 2);

    let mut state = DispatchState::new(Rc::clone(&engine));
    let int_result = state.call_function("combine", &[BoxedValue::from_value(2_i64), BoxedValue::from_value(3_i64)]).unwrap();
    assert_eq!(int_result.try_clone_to::<i64>().unwrap(), 5);

    let str_result = state
        .call_function("combine", &[BoxedValue::from_value("a".to_string()), BoxedValue::from_value("b".to_string())])
        .unwrap();
    assert_eq!(str_result.try_clone_to::<String>().unwrap(), "ab");
}

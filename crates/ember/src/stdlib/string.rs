//! `String` registrations: concatenation, comparison, `size`/`empty`, `to_string`.
//!
//! Grounded on `original_source/include/chaiscript/dispatchkit/bootstrap.hpp`'s
//! `bootstrap_string` (registers `+`, the comparison operators, and `size`/`empty` for
//! `std::string` the same way it does for every other "basic" type via
//! `operators::*<T>(m)`).

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::dispatch::DispatchEngine;
use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
use crate::type_tag::TypeTag;

fn no_match(args: &[BoxedValue]) -> DispatchError {
    DispatchError::NoMatch { args: args.iter().map(BoxedValue::get_type).collect(), candidates: vec![] }
}

fn as_str(bv: &BoxedValue) -> Result<String, DispatchError> {
    bv.try_clone_to::<String>().map_err(|_| no_match(std::slice::from_ref(bv)))
}

pub fn register(engine: &DispatchEngine) {
    engine
        .add_function(
            "+",
            Rc::new(NativeFunction::new(
                TypeTag::of::<String>(),
                vec![TypeTag::of::<String>(), TypeTag::of::<String>()],
                "string +",
                |args| Ok(BoxedValue::from_value(format!("{}{}", as_str(&args[0])?, as_str(&args[1])?))),
            )) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    let cmps: &[(&str, fn(&str, &str) -> bool)] = &[
        ("==", |a, b| a == b),
        ("!=", |a, b| a != b),
        ("<", |a, b| a < b),
        ("<=", |a, b| a <= b),
        (">", |a, b| a > b),
        (">=", |a, b| a >= b),
    ];
    for (name, op) in cmps {
        let op = *op;
        engine
            .add_function(
                name,
                Rc::new(NativeFunction::new(
                    TypeTag::of::<bool>(),
                    vec![TypeTag::of::<String>(), TypeTag::of::<String>()],
                    *name,
                    move |args| Ok(BoxedValue::from_value(op(&as_str(&args[0])?, &as_str(&args[1])?))),
                )) as Rc<dyn ProxyFunction>,
            )
            .expect("stdlib registration signature unique");
    }

    engine
        .add_function(
            "size",
            Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![TypeTag::of::<String>()], "size", |args| {
                Ok(BoxedValue::from_value(as_str(&args[0])?.chars().count() as i64))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "empty",
            Rc::new(NativeFunction::new(TypeTag::of::<bool>(), vec![TypeTag::of::<String>()], "empty", |args| {
                Ok(BoxedValue::from_value(as_str(&args[0])?.is_empty()))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "to_string",
            Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::of::<String>()], "to_string", |args| {
                Ok(BoxedValue::from_value(as_str(&args[0])?))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    for (name, ty) in [("to_string", TypeTag::of::<i64>()), ("to_string", TypeTag::of::<f64>()), ("to_string", TypeTag::of::<bool>())] {
        let tag = ty;
        engine
            .add_function(
                name,
                Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![tag], "to_string", |args| {
                    if let Ok(i) = args[0].try_clone_to::<i64>() {
                        return Ok(BoxedValue::from_value(i.to_string()));
                    }
                    if let Ok(f) = args[0].try_clone_to::<f64>() {
                        return Ok(BoxedValue::from_value(f.to_string()));
                    }
                    if let Ok(b) = args[0].try_clone_to::<bool>() {
                        return Ok(BoxedValue::from_value(b.to_string()));
                    }
                    Err(no_match(args))
                })) as Rc<dyn ProxyFunction>,
            )
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::register;
    use crate::dispatch::{DispatchEngine, DispatchState};
    use std::rc::Rc;

    #[test]
    fn concatenates_strings() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let r = state
            .call_function("+", &[crate::boxed_value::BoxedValue::from_value("a".to_string()), crate::boxed_value::BoxedValue::from_value("b".to_string())])
            .unwrap();
        assert_eq!(r.try_clone_to::<String>().unwrap(), "ab");
    }
}

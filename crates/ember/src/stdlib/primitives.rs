//! Core script-visible primitives (`spec.md §6`) that aren't tied to one value type:
//! `print`/`print_string`/`println_string`, `to_string`, `clone`, `generate_range`/
//! `range`, `exit`, and the dynamic-object introspection trio `get_type_name`/
//! `get_attrs`/`get_attr` plus the `method_missing` convention.
//!
//! Grounded on `ouros`'s host-facing print/debug helpers (direct `println!`/`print!`,
//! no logging facade — the core crate stays silent otherwise, matching `[AMBIENT-LOG]`)
//! and on `original_source/include/chaiscript/dispatchkit/bootstrap.hpp`'s generic
//! `to_string`/`print`/`clone` registrations, which dispatch back through the engine
//! rather than special-casing each value type.

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::dispatch::{DispatchEngine, DispatchState};
use crate::eval::{ExceptionValue, MapValue, ScriptObject};
use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
use crate::type_tag::TypeTag;

fn no_match(args: &[BoxedValue]) -> DispatchError {
    DispatchError::NoMatch { args: args.iter().map(BoxedValue::get_type).collect(), candidates: vec![] }
}

/// Best-effort, host-side rendering used by `print`/`to_string`'s fallback arm. Scripts
/// that want a custom rendering for a class register their own `to_string` overload,
/// which the dispatcher tries first.
pub fn render(bv: &BoxedValue) -> String {
    if let Ok(s) = bv.try_clone_to::<String>() {
        return s;
    }
    if let Ok(i) = bv.try_clone_to::<i64>() {
        return i.to_string();
    }
    if let Ok(f) = bv.try_clone_to::<f64>() {
        return f.to_string();
    }
    if let Ok(b) = bv.try_clone_to::<bool>() {
        return b.to_string();
    }
    if bv.is_undefined() {
        return "undefined".to_string();
    }
    if let Ok(v) = bv.try_clone_to::<Vec<BoxedValue>>() {
        let items: Vec<String> = v.iter().map(render).collect();
        return format!("[{}]", items.join(", "));
    }
    if let Ok(m) = bv.try_clone_to::<MapValue>() {
        let items: Vec<String> = m.iter().map(|(k, v)| format!("{k:?}: {}", render(v))).collect();
        return format!("{{{}}}", items.join(", "));
    }
    if let Ok(exc) = bv.try_clone_to::<ExceptionValue>() {
        return format!("{}: {}", exc.class_name, exc.message);
    }
    if let Ok(obj) = bv.try_clone_to::<ScriptObject>() {
        return format!("{}", obj.class_name);
    }
    format!("<{}>", bv.get_type())
}

/// Recursively clones `bv`, dispatching through the engine's `clone` overload set for
/// each element so a class-specific override is honored. Containers get a fresh clone
/// of their spine; everything else falls back to `clone_handle` (an aliasing handle
/// copy, which is what "clone" means for an immutable scalar).
fn clone_value(bv: &BoxedValue, engine: &Rc<DispatchEngine>) -> Result<BoxedValue, DispatchError> {
    if let Ok(v) = bv.try_clone_to::<Vec<BoxedValue>>() {
        let mut state = DispatchState::new(Rc::clone(engine));
        let cloned: Result<Vec<BoxedValue>, DispatchError> = v.iter().map(|e| state.call_function("clone", std::slice::from_ref(e))).collect();
        return Ok(BoxedValue::from_value(cloned?));
    }
    if let Ok(m) = bv.try_clone_to::<MapValue>() {
        let mut state = DispatchState::new(Rc::clone(engine));
        let mut out = MapValue::new();
        for (k, v) in m {
            out.insert(k, state.call_function("clone", std::slice::from_ref(&v))?);
        }
        return Ok(BoxedValue::from_value(out));
    }
    Ok(bv.clone_handle())
}

pub fn register(engine: &Rc<DispatchEngine>) {
    engine
        .add_function(
            "print_string",
            Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::undefined()], "print_string", |args| {
                Ok(BoxedValue::from_value(render(&args[0])))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "print",
            Rc::new(NativeFunction::new(TypeTag::void(), vec![TypeTag::undefined()], "print", |args| {
                print!("{}", render(&args[0]));
                Ok(BoxedValue::undefined())
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "println_string",
            Rc::new(NativeFunction::new(TypeTag::void(), vec![TypeTag::undefined()], "println_string", |args| {
                println!("{}", render(&args[0]));
                Ok(BoxedValue::undefined())
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "to_string",
            Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::undefined()], "to_string", |args| {
                Ok(BoxedValue::from_value(render(&args[0])))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    let clone_engine = Rc::clone(engine);
    engine
        .add_function(
            "clone",
            Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::undefined()], "clone", move |args| clone_value(&args[0], &clone_engine)))
                as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "generate_range",
            Rc::new(NativeFunction::new(
                TypeTag::of::<Vec<BoxedValue>>(),
                vec![TypeTag::of::<i64>(), TypeTag::of::<i64>()],
                "generate_range",
                |args| {
                    let start = args[0].try_clone_to::<i64>().map_err(|_| no_match(args))?;
                    let end = args[1].try_clone_to::<i64>().map_err(|_| no_match(args))?;
                    Ok(BoxedValue::from_value((start..end).map(BoxedValue::from_value).collect::<Vec<_>>()))
                },
            )) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "range",
            Rc::new(NativeFunction::new(
                TypeTag::of::<Vec<BoxedValue>>(),
                vec![TypeTag::of::<Vec<BoxedValue>>(), TypeTag::of::<i64>(), TypeTag::of::<i64>()],
                "range",
                |args| {
                    let v = args[0].try_clone_to::<Vec<BoxedValue>>().map_err(|_| no_match(args))?;
                    let start = args[1].try_clone_to::<i64>().map_err(|_| no_match(args))? as usize;
                    let end = args[2].try_clone_to::<i64>().map_err(|_| no_match(args))? as usize;
                    let slice = v.get(start..end).ok_or_else(|| no_match(args))?;
                    Ok(BoxedValue::from_value(slice.to_vec()))
                },
            )) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "get_type_name",
            Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::undefined()], "get_type_name", |args| {
                let name = args[0].try_clone_to::<ScriptObject>().map(|o| o.class_name.to_string()).unwrap_or_else(|_| args[0].get_type().name().to_string());
                Ok(BoxedValue::from_value(name))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "get_attrs",
            Rc::new(NativeFunction::new(TypeTag::of::<Vec<BoxedValue>>(), vec![TypeTag::undefined()], "get_attrs", |args| {
                let names = args[0].attr_names().into_iter().map(BoxedValue::from_value).collect::<Vec<_>>();
                Ok(BoxedValue::from_value(names))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "get_attr",
            Rc::new(NativeFunction::new(
                TypeTag::undefined(),
                vec![TypeTag::undefined(), TypeTag::of::<String>()],
                "get_attr",
                |args| {
                    let name = args[1].try_clone_to::<String>().map_err(|_| no_match(args))?;
                    let mut receiver = args[0].clone_handle();
                    if !receiver.has_attr(&name) {
                        return Err(no_match(args));
                    }
                    Ok(receiver.get_attr(&name))
                },
            )) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    // `spec.md §6`: "the script-visible `exit(n)` terminates the host process with
    // code n." This is a genuine process exit, not a `Signal`/`EvalError` a `try` block
    // could intercept — matching `std::process::exit`'s own contract of running no
    // destructors and never returning.
    engine
        .add_function(
            "exit",
            Rc::new(NativeFunction::new(TypeTag::void(), vec![TypeTag::of::<i64>()], "exit", |args| {
                let code = args[0].try_clone_to::<i64>().map_err(|_| no_match(args))?;
                std::process::exit(i32::try_from(code).unwrap_or(i32::MAX))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    // Default `method_missing`: classes that want a dynamic-dispatch catch-all define
    // their own `method_missing(obj, name, args)` overload, which the dispatcher's
    // ordinary overload resolution prefers over this base fallback.
    engine
        .add_function(
            "method_missing",
            Rc::new(NativeFunction::new(
                TypeTag::undefined(),
                vec![TypeTag::undefined(), TypeTag::of::<String>(), TypeTag::of::<Vec<BoxedValue>>()],
                "method_missing",
                |args| {
                    let name = args[1].try_clone_to::<String>().unwrap_or_default();
                    Err(DispatchError::Thrown(crate::eval::exception_bv("runtime_error", format!("no method named '{name}'"))))
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
    fn to_string_renders_ints() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let s = state.call_function("to_string", &[BoxedValue::from_value(7_i64)]).unwrap();
        assert_eq!(s.try_clone_to::<String>().unwrap(), "7");
    }

    #[test]
    fn generate_range_builds_a_vector() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let v = state.call_function("generate_range", &[BoxedValue::from_value(0_i64), BoxedValue::from_value(3_i64)]).unwrap();
        let items = v.try_clone_to::<Vec<BoxedValue>>().unwrap();
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn clone_of_vector_is_deep() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let v = BoxedValue::from_value(vec![BoxedValue::from_value(1_i64)]);
        let cloned = state.call_function("clone", &[v]).unwrap();
        let items = cloned.try_clone_to::<Vec<BoxedValue>>().unwrap();
        assert_eq!(items[0].try_clone_to::<i64>().unwrap(), 1);
    }
}

//! JSON interop (`[AMBIENT-JSON]`): `to_json`/`from_json` bridge a [`BoxedValue`] to
//! and from `serde_json::Value`, registered as the script-visible `to_json`/`from_json`
//! primitives.
//!
//! Grounded on the workspace's existing `serde_json` dependency (already in
//! `Cargo.toml` for the teacher's own serialization needs) and on `crate::stdlib`'s
//! value-shape conventions (`Vec<BoxedValue>` for arrays, `eval::MapValue` —
//! `IndexMap<String, BoxedValue>` — for objects) rather than introducing a parallel
//! JSON-specific value type.

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::dispatch::DispatchEngine;
use crate::eval::MapValue;
use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
use crate::type_tag::TypeTag;

/// Converts a script value to its JSON representation. Unrepresentable values (host
/// types with no JSON-shaped payload, a `ScriptObject` instance) render as `null`
/// rather than erroring, matching `serde_json`'s own permissive `Value` construction.
#[must_use]
pub fn to_json(bv: &BoxedValue) -> serde_json::Value {
    if let Ok(b) = bv.try_clone_to::<bool>() {
        return serde_json::Value::Bool(b);
    }
    if let Ok(i) = bv.try_clone_to::<i64>() {
        return serde_json::Value::Number(i.into());
    }
    if let Ok(f) = bv.try_clone_to::<f64>() {
        return serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number);
    }
    if let Ok(s) = bv.try_clone_to::<String>() {
        return serde_json::Value::String(s);
    }
    if let Ok(v) = bv.try_clone_to::<Vec<BoxedValue>>() {
        return serde_json::Value::Array(v.iter().map(to_json).collect());
    }
    if let Ok(m) = bv.try_clone_to::<MapValue>() {
        return serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), to_json(v))).collect());
    }
    serde_json::Value::Null
}

/// Converts a `serde_json::Value` into the script representation: JSON objects become
/// `eval::MapValue`, arrays become `Vec<BoxedValue>`, scalars become the matching
/// `BoxedValue` scalar.
#[must_use]
pub fn from_json(value: &serde_json::Value) -> BoxedValue {
    match value {
        serde_json::Value::Null => BoxedValue::undefined(),
        serde_json::Value::Bool(b) => BoxedValue::from_value(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoxedValue::from_value(i)
            } else {
                BoxedValue::from_value(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => BoxedValue::from_value(s.clone()),
        serde_json::Value::Array(items) => BoxedValue::from_value(items.iter().map(from_json).collect::<Vec<_>>()),
        serde_json::Value::Object(entries) => {
            let mut map = MapValue::new();
            for (k, v) in entries {
                map.insert(k.clone(), from_json(v));
            }
            BoxedValue::from_value(map)
        }
    }
}

pub fn register(engine: &DispatchEngine) {
    engine
        .add_function(
            "to_json",
            Rc::new(NativeFunction::new(TypeTag::of::<String>(), vec![TypeTag::undefined()], "to_json", |args| {
                serde_json::to_string(&to_json(&args[0]))
                    .map(BoxedValue::from_value)
                    .map_err(|_| DispatchError::NoMatch { args: vec![], candidates: vec![] })
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "from_json",
            Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::of::<String>()], "from_json", |args| {
                let text = args[0].try_clone_to::<String>().map_err(|_| DispatchError::NoMatch { args: vec![], candidates: vec![] })?;
                let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    DispatchError::Thrown(crate::eval::exception_bv("runtime_error", format!("invalid JSON: {e}")))
                })?;
                Ok(from_json(&value))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");
}

#[cfg(test)]
mod tests {
    use super::{from_json, register, to_json};
    use crate::boxed_value::BoxedValue;
    use crate::dispatch::{DispatchEngine, DispatchState};
    use std::rc::Rc;

    #[test]
    fn round_trips_a_nested_value() {
        let v = BoxedValue::from_value(vec![BoxedValue::from_value(1_i64), BoxedValue::from_value("a".to_string())]);
        let json = to_json(&v);
        assert_eq!(json.to_string(), r#"[1,"a"]"#);
        let back = from_json(&json);
        let items = back.try_clone_to::<Vec<BoxedValue>>().unwrap();
        assert_eq!(items[0].try_clone_to::<i64>().unwrap(), 1);
    }

    #[test]
    fn registered_primitives_round_trip_through_script_call_syntax() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let text = state.call_function("to_json", &[BoxedValue::from_value(42_i64)]).unwrap();
        assert_eq!(text.try_clone_to::<String>().unwrap(), "42");
        let back = state.call_function("from_json", &[text]).unwrap();
        assert_eq!(back.try_clone_to::<i64>().unwrap(), 42);
    }
}

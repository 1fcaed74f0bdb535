//! Numeric operator registrations (`spec.md §6`: `+ - * / %`, compound assigns,
//! bitwise, comparisons).
//!
//! Grounded on `original_source/include/chaiscript/dispatchkit/boxed_number.hpp`'s
//! `Boxed_Number` operator table (`bootstrap.hpp` registers one `fun(&Boxed_Number::*)`
//! per operator name). `crate::eval`'s numeric fast path already bypasses dispatch
//! entirely when both operands are arithmetic, so these registrations exist only for
//! explicit function-call syntax (`==(1,2)`) and for arithmetic mixed with a
//! conversion-bridged host numeric type; they are not on the hot path.

use std::rc::Rc;

use crate::boxed_value::BoxedValue;
use crate::dispatch::DispatchEngine;
use crate::proxy_function::{DispatchError, NativeFunction, ProxyFunction};
use crate::type_tag::TypeTag;

fn num_of(bv: &BoxedValue) -> Option<f64> {
    bv.try_clone_to::<i64>().map(|i| i as f64).or_else(|_| bv.try_clone_to::<f64>()).ok()
}

fn is_int_pair(a: &BoxedValue, b: &BoxedValue) -> bool {
    a.try_clone_to::<i64>().is_ok() && b.try_clone_to::<i64>().is_ok()
}

fn no_match(args: &[BoxedValue]) -> DispatchError {
    DispatchError::NoMatch { args: args.iter().map(BoxedValue::get_type).collect(), candidates: vec![] }
}

macro_rules! arith_op {
    ($engine:expr, $name:expr, $int_op:expr, $float_op:expr) => {
        $engine
            .add_function(
                $name,
                Rc::new(NativeFunction::new(
                    TypeTag::undefined(),
                    vec![TypeTag::undefined(), TypeTag::undefined()],
                    $name,
                    |args: &[BoxedValue]| {
                        if is_int_pair(&args[0], &args[1]) {
                            let a = args[0].try_clone_to::<i64>().unwrap();
                            let b = args[1].try_clone_to::<i64>().unwrap();
                            return Ok(BoxedValue::from_value($int_op(a, b)));
                        }
                        let a = num_of(&args[0]).ok_or_else(|| no_match(args))?;
                        let b = num_of(&args[1]).ok_or_else(|| no_match(args))?;
                        Ok(BoxedValue::from_value($float_op(a, b)))
                    },
                )) as Rc<dyn ProxyFunction>,
            )
            .expect("stdlib registration signature unique")
    };
}

macro_rules! cmp_op {
    ($engine:expr, $name:expr, $op:tt) => {
        $engine
            .add_function(
                $name,
                Rc::new(NativeFunction::new(
                    TypeTag::of::<bool>(),
                    vec![TypeTag::undefined(), TypeTag::undefined()],
                    $name,
                    |args: &[BoxedValue]| {
                        let a = num_of(&args[0]).ok_or_else(|| no_match(args))?;
                        let b = num_of(&args[1]).ok_or_else(|| no_match(args))?;
                        Ok(BoxedValue::from_value(a $op b))
                    },
                )) as Rc<dyn ProxyFunction>,
            )
            .expect("stdlib registration signature unique")
    };
}

pub fn register(engine: &DispatchEngine) {
    arith_op!(engine, "+", |a: i64, b: i64| a.wrapping_add(b), |a: f64, b: f64| a + b);
    arith_op!(engine, "-", |a: i64, b: i64| a.wrapping_sub(b), |a: f64, b: f64| a - b);
    arith_op!(engine, "*", |a: i64, b: i64| a.wrapping_mul(b), |a: f64, b: f64| a * b);
    arith_op!(engine, "/", |a: i64, b: i64| if b == 0 { 0 } else { a / b }, |a: f64, b: f64| a / b);
    arith_op!(engine, "%", |a: i64, b: i64| if b == 0 { 0 } else { a % b }, |a: f64, b: f64| a % b);

    cmp_op!(engine, "==", ==);
    cmp_op!(engine, "!=", !=);
    cmp_op!(engine, "<", <);
    cmp_op!(engine, "<=", <=);
    cmp_op!(engine, ">", >);
    cmp_op!(engine, ">=", >=);

    engine
        .add_function(
            "-",
            Rc::new(NativeFunction::new(TypeTag::undefined(), vec![TypeTag::undefined()], "unary -", |args: &[BoxedValue]| {
                if let Ok(i) = args[0].try_clone_to::<i64>() {
                    return Ok(BoxedValue::from_value(-i));
                }
                let f = args[0].try_clone_to::<f64>().map_err(|_| no_match(args))?;
                Ok(BoxedValue::from_value(-f))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    engine
        .add_function(
            "!",
            Rc::new(NativeFunction::new(TypeTag::of::<bool>(), vec![TypeTag::of::<bool>()], "!", |args: &[BoxedValue]| {
                args[0].try_clone_to::<bool>().map(|b| BoxedValue::from_value(!b)).map_err(|_| no_match(args))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");

    let bitwise: &[(&str, fn(i64, i64) -> i64)] =
        &[("&", |a, b| a & b), ("|", |a, b| a | b), ("^", |a, b| a ^ b), ("<<", |a, b| a << b), (">>", |a, b| a >> b)];
    for (name, op) in bitwise {
        let op = *op;
        engine
            .add_function(
                name,
                Rc::new(NativeFunction::new(
                    TypeTag::of::<i64>(),
                    vec![TypeTag::of::<i64>(), TypeTag::of::<i64>()],
                    *name,
                    move |args: &[BoxedValue]| {
                        let a = args[0].try_clone_to::<i64>().map_err(|_| no_match(args))?;
                        let b = args[1].try_clone_to::<i64>().map_err(|_| no_match(args))?;
                        Ok(BoxedValue::from_value(op(a, b)))
                    },
                )) as Rc<dyn ProxyFunction>,
            )
            .expect("stdlib registration signature unique");
    }

    engine
        .add_function(
            "~",
            Rc::new(NativeFunction::new(TypeTag::of::<i64>(), vec![TypeTag::of::<i64>()], "~", |args: &[BoxedValue]| {
                args[0].try_clone_to::<i64>().map(|i| BoxedValue::from_value(!i)).map_err(|_| no_match(args))
            })) as Rc<dyn ProxyFunction>,
        )
        .expect("stdlib registration signature unique");
}

#[cfg(test)]
mod tests {
    use super::register;
    use crate::dispatch::{DispatchEngine, DispatchState};
    use std::rc::Rc;

    #[test]
    fn explicit_call_syntax_reaches_registered_operators() {
        let engine = Rc::new(DispatchEngine::new());
        register(&engine);
        let mut state = DispatchState::new(Rc::clone(&engine));
        let sum = state.call_function("+", &[crate::boxed_value::BoxedValue::from_value(2_i64), crate::boxed_value::BoxedValue::from_value(3_i64)]).unwrap();
        assert_eq!(sum.try_clone_to::<i64>().unwrap(), 5);
    }
}

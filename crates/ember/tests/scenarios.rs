//! The eight literal input/output scenarios an embedding host should be able to rely
//! on: simple arithmetic, function overloading via guards, vectors, maps, classes, and
//! exception handling, run against a freshly constructed [`Engine`] (the real standard
//! library, not a test-local stub).

use ember::Engine;
use pretty_assertions::assert_eq;

fn eval_int(engine: &Engine, source: &str) -> i64 {
    engine.eval(source).unwrap().try_clone_to::<i64>().unwrap()
}

#[test]
fn scenario_1_integer_addition() {
    let engine = Engine::new();
    assert_eq!(eval_int(&engine, "1 + 2;"), 3);
}

#[test]
fn scenario_2_function_definition_and_call() {
    let engine = Engine::new();
    assert_eq!(eval_int(&engine, "def f(x) { x * x }; f(5);"), 25);
}

#[test]
fn scenario_3_vector_literal_and_size() {
    let engine = Engine::new();
    assert_eq!(eval_int(&engine, "var v = [1, 2, 3]; v.size();"), 3);
}

#[test]
fn scenario_4_guard_based_overload_resolution() {
    let engine = Engine::new();
    let src = "def fact(n) : n < 2 { 1 }; def fact(n) { n * fact(n - 1) }; fact(5);";
    assert_eq!(eval_int(&engine, src), 120);
}

#[test]
fn scenario_5_class_constructor_and_attribute_access() {
    let engine = Engine::new();
    let src = "class P { attr P::x; def P::P(v) { this.x = v; } }; var p = P(7); p.x;";
    assert_eq!(eval_int(&engine, src), 7);
}

#[test]
fn scenario_6_thrown_exception_caught_by_name() {
    let engine = Engine::new();
    let src = r#"try { throw(runtime_error("x")); } catch(e) { e.what(); }"#;
    let result = engine.eval(src).unwrap();
    assert_eq!(result.try_clone_to::<String>().unwrap(), "x");
}

#[test]
fn scenario_7_for_loop_accumulation_matches_optimizer_specialized_path() {
    let engine = Engine::new();
    let src = "var s = 0; for(var i = 0; i < 10; ++i) { s += i; }; s;";
    assert_eq!(eval_int(&engine, src), 45);
}

#[test]
fn scenario_8_map_literal_indexing() {
    let engine = Engine::new();
    let src = r#"var m = ["a": 1, "b": 2]; m["b"];"#;
    assert_eq!(eval_int(&engine, src), 2);
}

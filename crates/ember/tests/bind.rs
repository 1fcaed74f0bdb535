//! `spec.md §6` / `SUPPLEMENT-2`: `bind` partially applies a function, splicing `_`
//! placeholders with the bound call's own arguments.

use ember::Engine;

#[test]
fn bind_fills_a_placeholder_with_the_call_time_argument() {
    let engine = Engine::new();
    let src = "def add(a, b) { a + b }; var add_one = bind(add, 1, _); add_one(41);";
    let result = engine.eval(src).unwrap();
    assert_eq!(result.try_clone_to::<i64>().unwrap(), 42);
}

#[test]
fn bind_with_no_placeholders_produces_a_nullary_callable() {
    let engine = Engine::new();
    let src = "def add(a, b) { a + b }; var fixed = bind(add, 2, 3); fixed();";
    let result = engine.eval(src).unwrap();
    assert_eq!(result.try_clone_to::<i64>().unwrap(), 5);
}

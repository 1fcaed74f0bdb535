//! Class features beyond scenario 5's plain constructor/attribute case: per-class
//! method guards (two classes can define a same-named method without colliding), and
//! the default `method_missing` overload for an undeclared method.

use ember::Engine;

#[test]
fn constructor_sets_attribute_and_accessor_reads_it_back() {
    let engine = Engine::new();
    let src = "class P { attr P::x; def P::P(v) { this.x = v; } }; var p = P(3); p.x;";
    let result = engine.eval(src).unwrap();
    assert_eq!(result.try_clone_to::<i64>().unwrap(), 3);
}

#[test]
fn methods_with_the_same_name_on_different_classes_dispatch_by_receiver_class() {
    let engine = Engine::new();
    let src = r#"
        class Circle { attr Circle::r; def Circle::Circle(r) { this.r = r; } def Circle::describe() { "circle" } };
        class Square { attr Square::s; def Square::Square(s) { this.s = s; } def Square::describe() { "square" } };
        var c = Circle(1);
        var sq = Square(2);
        c.describe() + sq.describe();
    "#;
    let result = engine.eval(src).unwrap();
    assert_eq!(result.try_clone_to::<String>().unwrap(), "circlesquare");
}

#[test]
fn guarded_methods_pick_the_matching_overload_per_instance() {
    let engine = Engine::new();
    let src = r#"
        class Box { attr Box::n; def Box::Box(n) { this.n = n; } def Box::label() : this.n < 0 { "negative" } def Box::label() { "non-negative" } };
        var a = Box(-5);
        var b = Box(5);
        a.label() + " " + b.label();
    "#;
    let result = engine.eval(src).unwrap();
    assert_eq!(result.try_clone_to::<String>().unwrap(), "negative non-negative");
}

#[test]
fn calling_an_undeclared_method_is_a_catchable_runtime_error() {
    let engine = Engine::new();
    let src = r#"
        class P { attr P::x; def P::P(v) { this.x = v; } };
        var p = P(1);
        try { p.not_a_real_method(); "unreachable" } catch(e) { e.message(); }
    "#;
    let result = engine.eval(src).unwrap();
    assert!(!result.try_clone_to::<String>().unwrap().is_empty());
}

#[test]
fn the_default_method_missing_primitive_names_the_missing_method() {
    let engine = Engine::new();
    let src = r#"try { method_missing(1, "frobnicate", []); "unreachable" } catch(e) { e.message(); }"#;
    let result = engine.eval(src).unwrap();
    assert!(result.try_clone_to::<String>().unwrap().contains("frobnicate"));
}

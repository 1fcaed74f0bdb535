//! `spec.md §8`, testable property 7: `use(path)` is idempotent. A module that
//! registers a function would conflict with itself if actually re-evaluated (`def`
//! registration rejects an exact duplicate signature), so calling `use_module` twice
//! only stays error-free if the second call is genuinely a no-op.

use ember::{Engine, StaticModuleLoader};

#[test]
fn using_the_same_module_twice_is_a_no_op_the_second_time() {
    let mut loader = StaticModuleLoader::new();
    loader.register("greet", "def greet(name) { \"hi \" + name }");
    let mut engine = Engine::new();
    engine.set_module_loader(Box::new(loader));

    engine.use_module("greet").unwrap();
    engine.use_module("greet").unwrap();

    let result = engine.eval(r#"greet("world");"#).unwrap();
    assert_eq!(result.try_clone_to::<String>().unwrap(), "hi world");
}

#[test]
fn loading_an_unregistered_module_without_a_root_fails() {
    let engine = Engine::new();
    assert!(engine.use_module("does-not-exist").is_err());
}

//! Boundary behaviors from the testable-properties list: unterminated literals and
//! integer overflow raise a parse error at (or near) the offending position, and
//! reserved words can't be bound as script-level names.

use ember::{Engine, EngineError};

fn parse_err(source: &str) {
    let engine = Engine::new();
    match engine.eval(source) {
        Err(EngineError::Parse(_)) => {}
        other => panic!("expected a parse error for {source:?}, got {other:?}"),
    }
}

#[test]
fn unterminated_string_literal_is_a_parse_error() {
    parse_err("\"unterminated");
}

#[test]
fn unterminated_backtick_identifier_is_a_parse_error() {
    parse_err("`never closed");
}

#[test]
fn integer_literal_above_i64_max_is_a_parse_error() {
    parse_err("99999999999999999999999;");
}

#[test]
fn a_reserved_word_cannot_be_used_as_a_binding_name() {
    // `def` is a keyword token, not an identifier, so this can never parse as a
    // `var` declaration no matter how the grammar evolves around it.
    parse_err("var def = 1;");
}

#[test]
fn unclosed_parameter_list_is_a_parse_error() {
    parse_err("def f( {");
}

#[test]
fn reserved_word_rejected_at_registration_time() {
    use ember::{DispatchEngine, NameError, NativeFunction, TypeTag};
    use std::rc::Rc;

    let engine = DispatchEngine::new();
    let err = engine
        .add_function("while", Rc::new(NativeFunction::new(TypeTag::undefined(), vec![], "while", |_| unreachable!())))
        .unwrap_err();
    assert!(matches!(err, NameError::Reserved(_)));
}

//! `spec.md §8` scenario 7 requires the optimizer's counting-`for`-loop specialization
//! to agree with the generic path. The specialization only fires for the canonical
//! `for(var i = <int literal>; i < <int literal>; ++i)` shape, so this compares that
//! exact shape against syntactically different but semantically equivalent loops that
//! the optimizer's pattern match does *not* recognize (a `i = i + 1` step, and a
//! `while` loop), through the public `Engine` surface only — no internal AST access
//! needed to prove the two code paths agree.

use ember::Engine;

fn eval_int(source: &str) -> i64 {
    Engine::new().eval(source).unwrap().try_clone_to::<i64>().unwrap()
}

#[test]
fn canonical_counting_for_matches_generic_step_form() {
    let specialized = eval_int("var s = 0; for(var i = 0; i < 10; ++i) { s += i; }; s;");
    let generic = eval_int("var s = 0; for(var i = 0; i < 10; i = i + 1) { s += i; }; s;");
    assert_eq!(specialized, generic);
    assert_eq!(specialized, 45);
}

#[test]
fn canonical_counting_for_matches_while_loop_rewrite() {
    let specialized = eval_int("var s = 0; for(var i = 0; i < 10; ++i) { s += i; }; s;");
    let rewritten = eval_int("var s = 0; var i = 0; while (i < 10) { s += i; i = i + 1; }; s;");
    assert_eq!(specialized, rewritten);
}

#[test]
fn specialization_is_indifferent_to_body_side_effects_ordering() {
    let specialized = eval_int("var s = 1; for(var i = 0; i < 5; ++i) { s = s * 2; }; s;");
    let generic = eval_int("var s = 1; var i = 0; while (i < 5) { s = s * 2; i = i + 1; }; s;");
    assert_eq!(specialized, generic);
    assert_eq!(specialized, 32);
}

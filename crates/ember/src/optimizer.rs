//! AST-to-AST rewrite pipeline (`spec.md §4.8`).
//!
//! Runs after parsing and before evaluation. Each pass is a pure `Node -> Node`
//! rewrite applied bottom-up over the whole tree, exactly once, in the order
//! listed below. No pack example implements an AST optimizer at this level, so
//! the traversal shape is grounded in [`crate::eval`]'s own recursive-descent
//! over the same `Node`/`NodeKind` types rather than on a specific teacher file.

use crate::parser::{AssignOp, BinOp, CaseArm, CatchArm, Literal, Node, NodeKind};

/// Runs every optimization pass, in the fixed order `spec.md §4.8` specifies.
#[must_use]
pub fn optimize(node: Node) -> Node {
    let node = return_tail(node);
    let node = block_folding(node);
    let node = dead_code(node);
    let node = unused_return(node);
    let node = constant_if(node);
    let node = partial_fold(node);
    let node = constant_fold(node);
    for_loop_specialization(node)
}

/// Applies `f` to every direct child of `kind`, rebuilding the same variant.
/// Shared by every pass below so each only has to state its own rewrite rule.
fn map_children(kind: NodeKind, mut f: impl FnMut(Node) -> Node) -> NodeKind {
    use NodeKind::{
        ArgList, ArrayCall, AssignDecl, AttrDecl, Binary, Block, Break, Class, CompiledCountingFor, Constant, Continue, Def, DotAccess, Equation,
        File, FunCall, GlobalDecl, Id, If, InlineArray, InlineMap, InlineRange, Lambda, LogicalAnd, LogicalOr, Method, Noop, PartialFoldBinary,
        Prefix, RangedFor, Reference, Return, ScopelessBlock, Switch, TernaryCond, Try, UnusedReturnFunCall, VarDecl, While,
    };
    match kind {
        Id(..) | Constant(..) | Break | Continue | Noop | AssignDecl { .. } | AttrDecl { .. } => kind,
        FunCall { callee, args } => FunCall { callee: Box::new(f(*callee)), args: args.into_iter().map(&mut f).collect() },
        UnusedReturnFunCall { callee, args } => UnusedReturnFunCall { callee: Box::new(f(*callee)), args: args.into_iter().map(&mut f).collect() },
        NodeKind::ArgList(items) => ArgList(items.into_iter().map(&mut f).collect()),
        NodeKind::Arg(inner) => NodeKind::Arg(Box::new(f(*inner))),
        Equation { op, lhs, rhs } => Equation { op, lhs: Box::new(f(*lhs)), rhs: Box::new(f(*rhs)) },
        VarDecl { name, init } => VarDecl { name, init: init.map(|b| Box::new(f(*b))) },
        GlobalDecl { name, init } => GlobalDecl { name, init: init.map(|b| Box::new(f(*b))) },
        ArrayCall { target, index } => ArrayCall { target: Box::new(f(*target)), index: Box::new(f(*index)) },
        DotAccess { target, member } => DotAccess { target: Box::new(f(*target)), member },
        Lambda { captures, params, body } => Lambda { captures, params, body: Box::new(f(*body)) },
        Block(stmts) => Block(stmts.into_iter().map(&mut f).collect()),
        ScopelessBlock(stmts) => ScopelessBlock(stmts.into_iter().map(&mut f).collect()),
        Def { name, params, guard, body } => Def { name, params, guard: guard.map(|b| Box::new(f(*b))), body: Box::new(f(*body)) },
        Method { class_name, name, params, guard, body } => {
            Method { class_name, name, params, guard: guard.map(|b| Box::new(f(*b))), body: Box::new(f(*body)) }
        }
        While { cond, body } => While { cond: Box::new(f(*cond)), body: Box::new(f(*body)) },
        If { arms, else_body } => If {
            arms: arms.into_iter().map(|(c, b)| (f(c), f(b))).collect(),
            else_body: else_body.map(|b| Box::new(f(*b))),
        },
        TernaryCond { cond, then, otherwise } => {
            TernaryCond { cond: Box::new(f(*cond)), then: Box::new(f(*then)), otherwise: Box::new(f(*otherwise)) }
        }
        NodeKind::For { init, cond, step, body } => NodeKind::For {
            init: init.map(|b| Box::new(f(*b))),
            cond: cond.map(|b| Box::new(f(*b))),
            step: step.map(|b| Box::new(f(*b))),
            body: Box::new(f(*body)),
        },
        RangedFor { var_name, range, body } => RangedFor { var_name, range: Box::new(f(*range)), body: Box::new(f(*body)) },
        CompiledCountingFor { var_name, start, end, body } => CompiledCountingFor { var_name, start, end, body: Box::new(f(*body)) },
        Switch { discriminant, arms } => Switch {
            discriminant: Box::new(f(*discriminant)),
            arms: arms
                .into_iter()
                .map(|arm| match arm {
                    CaseArm::Case { value, body } => CaseArm::Case { value: f(value), body: body.into_iter().map(&mut f).collect() },
                    CaseArm::Default { body } => CaseArm::Default { body: body.into_iter().map(&mut f).collect() },
                })
                .collect(),
        },
        InlineArray(items) => InlineArray(items.into_iter().map(&mut f).collect()),
        InlineMap(pairs) => InlineMap(pairs.into_iter().map(|(k, v)| (f(k), f(v))).collect()),
        InlineRange { from, to } => InlineRange { from: Box::new(f(*from)), to: Box::new(f(*to)) },
        Return(inner) => Return(inner.map(|b| Box::new(f(*b)))),
        Try { body, catches, finally } => Try {
            body: Box::new(f(*body)),
            catches: catches
                .into_iter()
                .map(|c| CatchArm {
                    exception_name: c.exception_name,
                    type_guard: c.type_guard,
                    guard: c.guard.map(|b| Box::new(f(*b))),
                    body: Box::new(f(*c.body)),
                })
                .collect(),
            finally: finally.map(|b| Box::new(f(*b))),
        },
        Class { name, body } => Class { name, body: Box::new(f(*body)) },
        Binary { op, lhs, rhs } => Binary { op, lhs: Box::new(f(*lhs)), rhs: Box::new(f(*rhs)) },
        PartialFoldBinary { op, lhs, rhs } => PartialFoldBinary { op, lhs: Box::new(f(*lhs)), rhs },
        Prefix { op, operand } => Prefix { op, operand: Box::new(f(*operand)) },
        LogicalAnd { lhs, rhs } => LogicalAnd { lhs: Box::new(f(*lhs)), rhs: Box::new(f(*rhs)) },
        LogicalOr { lhs, rhs } => LogicalOr { lhs: Box::new(f(*lhs)), rhs: Box::new(f(*rhs)) },
        Reference(inner) => Reference(Box::new(f(*inner))),
        File(stmts) => File(stmts.into_iter().map(&mut f).collect()),
    }
}

/// Post-order: transforms every child first, then hands the rebuilt node to `pass`.
fn bottom_up(node: Node, pass: &impl Fn(Node) -> Node) -> Node {
    let Node { kind, range } = node;
    let kind = map_children(kind, |child| bottom_up(child, pass));
    pass(Node::new(kind, range))
}

fn is_truthy_const(lit: &Literal) -> Option<bool> {
    match lit {
        Literal::Bool(b) => Some(*b),
        _ => None,
    }
}

fn as_int(lit: &Literal) -> Option<i64> {
    match lit {
        Literal::Int(i) => Some(*i),
        _ => None,
    }
}

fn fold_binop(op: BinOp, lhs: &Literal, rhs: &Literal) -> Option<Literal> {
    use Literal::{Bool, Float, Int};
    let (lf, rf) = match (lhs, rhs) {
        (Int(a), Int(b)) => {
            return Some(match op {
                BinOp::Add => Int(a.wrapping_add(*b)),
                BinOp::Sub => Int(a.wrapping_sub(*b)),
                BinOp::Mul => Int(a.wrapping_mul(*b)),
                BinOp::Div if *b != 0 => Int(a / b),
                BinOp::Rem if *b != 0 => Int(a % b),
                BinOp::BitAnd => Int(a & b),
                BinOp::BitOr => Int(a | b),
                BinOp::BitXor => Int(a ^ b),
                BinOp::Shl => Int(a << b),
                BinOp::Shr => Int(a >> b),
                BinOp::Eq => Bool(a == b),
                BinOp::Ne => Bool(a != b),
                BinOp::Lt => Bool(a < b),
                BinOp::Le => Bool(a <= b),
                BinOp::Gt => Bool(a > b),
                BinOp::Ge => Bool(a >= b),
                BinOp::Div | BinOp::Rem => return None,
            });
        }
        (Int(a), Float(b)) => (*a as f64, *b),
        (Float(a), Int(b)) => (*a, *b as f64),
        (Float(a), Float(b)) => (*a, *b),
        _ => return None,
    };
    Some(match op {
        BinOp::Add => Float(lf + rf),
        BinOp::Sub => Float(lf - rf),
        BinOp::Mul => Float(lf * rf),
        BinOp::Div if rf != 0.0 => Float(lf / rf),
        BinOp::Eq => Bool(lf == rf),
        BinOp::Ne => Bool(lf != rf),
        BinOp::Lt => Bool(lf < rf),
        BinOp::Le => Bool(lf <= rf),
        BinOp::Gt => Bool(lf > rf),
        BinOp::Ge => Bool(lf >= rf),
        _ => return None,
    })
}

/// Unwraps `return <expr>;` at the tail of a `Def`/`Method`/`Lambda` body into a
/// bare trailing expression. Only the function's own outermost body block
/// qualifies — a `return` nested in an inner block still has to unwind through
/// the control-flow machinery of whatever it's nested in.
fn return_tail(node: Node) -> Node {
    fn unwrap_tail_return(body: Node) -> Node {
        let Node { kind, range } = body;
        match kind {
            NodeKind::Block(mut stmts) => {
                if let Some(last) = stmts.pop() {
                    let replaced = match last.kind {
                        NodeKind::Return(Some(inner)) => *inner,
                        other => Node::new(other, last.range),
                    };
                    stmts.push(replaced);
                }
                Node::new(NodeKind::Block(stmts), range)
            }
            other => Node::new(other, range),
        }
    }

    bottom_up(node, &|n| {
        let Node { kind, range } = n;
        let kind = match kind {
            NodeKind::Def { name, params, guard, body } => NodeKind::Def { name, params, guard, body: Box::new(unwrap_tail_return(*body)) },
            NodeKind::Method { class_name, name, params, guard, body } => {
                NodeKind::Method { class_name, name, params, guard, body: Box::new(unwrap_tail_return(*body)) }
            }
            NodeKind::Lambda { captures, params, body } => NodeKind::Lambda { captures, params, body: Box::new(unwrap_tail_return(*body)) },
            other => other,
        };
        Node::new(kind, range)
    })
}

/// A `Block` with no declarations (`var`/`GLOBAL`/`&name`) becomes a `ScopelessBlock`;
/// a one-statement block unwraps to that statement directly.
fn block_folding(node: Node) -> Node {
    fn declares(stmts: &[Node]) -> bool {
        stmts.iter().any(|s| matches!(s.kind, NodeKind::VarDecl { .. } | NodeKind::GlobalDecl { .. } | NodeKind::AssignDecl { .. }))
    }

    bottom_up(node, &|n| {
        let Node { kind, range } = n;
        match kind {
            NodeKind::Block(mut stmts) => {
                if stmts.len() == 1 && !declares(&stmts) {
                    return stmts.pop().expect("len checked above");
                }
                if declares(&stmts) {
                    Node::new(NodeKind::Block(stmts), range)
                } else {
                    Node::new(NodeKind::ScopelessBlock(stmts), range)
                }
            }
            other => Node::new(other, range),
        }
    })
}

/// Strips leading side-effect-free statements (`Id`, `Constant`, `Noop`) from a
/// block's statement list, keeping only ones that could still matter: the final
/// statement (its value may be the block's result) and anything with a
/// possible side effect.
fn dead_code(node: Node) -> Node {
    fn strip(stmts: Vec<Node>) -> Vec<Node> {
        if stmts.len() <= 1 {
            return stmts;
        }
        let last = stmts.len() - 1;
        stmts
            .into_iter()
            .enumerate()
            .filter(|(i, s)| *i == last || !matches!(s.kind, NodeKind::Id(..) | NodeKind::Constant(..) | NodeKind::Noop))
            .map(|(_, s)| s)
            .collect()
    }

    bottom_up(node, &|n| {
        let Node { kind, range } = n;
        let kind = match kind {
            NodeKind::Block(stmts) => NodeKind::Block(strip(stmts)),
            NodeKind::ScopelessBlock(stmts) => NodeKind::ScopelessBlock(strip(stmts)),
            other => other,
        };
        Node::new(kind, range)
    })
}

/// Marks non-tail `FunCall`s inside a block as `UnusedReturnFunCall` so the
/// evaluator can discard their result without retaining it.
fn unused_return(node: Node) -> Node {
    fn mark(stmts: Vec<Node>) -> Vec<Node> {
        let last = stmts.len().saturating_sub(1);
        stmts
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                if i == last {
                    return s;
                }
                let Node { kind, range } = s;
                match kind {
                    NodeKind::FunCall { callee, args } => Node::new(NodeKind::UnusedReturnFunCall { callee, args }, range),
                    other => Node::new(other, range),
                }
            })
            .collect()
    }

    bottom_up(node, &|n| {
        let Node { kind, range } = n;
        let kind = match kind {
            NodeKind::Block(stmts) => NodeKind::Block(mark(stmts)),
            NodeKind::ScopelessBlock(stmts) => NodeKind::ScopelessBlock(mark(stmts)),
            NodeKind::File(stmts) => NodeKind::File(mark(stmts)),
            other => other,
        };
        Node::new(kind, range)
    })
}

/// Replaces `if`/ternary nodes whose condition is a known-boolean constant with
/// the chosen arm directly.
fn constant_if(node: Node) -> Node {
    bottom_up(node, &|n| {
        let Node { kind, range } = n;
        match kind {
            NodeKind::If { mut arms, else_body } => {
                // Only the *first* arm can be decided outright without losing
                // the ordering semantics of later `else if` conditions, so only
                // fold when there is exactly one arm (the common case this
                // pass targets: `if(const) {..} else {..}`).
                if arms.len() == 1 {
                    if let NodeKind::Constant(lit) = &arms[0].0.kind {
                        if let Some(b) = is_truthy_const(lit) {
                            let (_, body) = arms.pop().expect("len checked above");
                            return if b {
                                body
                            } else {
                                else_body.map_or_else(|| Node::new(NodeKind::Noop, range.clone()), |b| *b)
                            };
                        }
                    }
                }
                Node::new(NodeKind::If { arms, else_body }, range)
            }
            NodeKind::TernaryCond { cond, then, otherwise } => {
                if let NodeKind::Constant(lit) = &cond.kind {
                    if let Some(b) = is_truthy_const(lit) {
                        return if b { *then } else { *otherwise };
                    }
                }
                Node::new(NodeKind::TernaryCond { cond, then, otherwise }, range)
            }
            other => Node::new(other, range),
        }
    })
}

/// For a `Binary` whose right-hand side is already constant, specializes to
/// `PartialFoldBinary`, carrying the `Literal` directly instead of a child node.
fn partial_fold(node: Node) -> Node {
    bottom_up(node, &|n| {
        let Node { kind, range } = n;
        match kind {
            NodeKind::Binary { op, lhs, rhs } => match rhs.kind {
                NodeKind::Constant(lit) => Node::new(NodeKind::PartialFoldBinary { op, lhs, rhs: lit }, range),
                _ => Node::new(NodeKind::Binary { op, lhs, rhs }, range),
            },
            other => Node::new(other, range),
        }
    })
}

/// Folds operations whose every operand is now constant. Runs after
/// `partial_fold`, so a `PartialFoldBinary` whose `lhs` turned out constant too
/// (both sides literal) collapses the rest of the way down to a bare `Constant`.
fn constant_fold(node: Node) -> Node {
    bottom_up(node, &|n| {
        let Node { kind, range } = n;
        match kind {
            NodeKind::PartialFoldBinary { op, lhs, rhs } => match &lhs.kind {
                NodeKind::Constant(llit) => match fold_binop(op, llit, &rhs) {
                    Some(folded) => Node::new(NodeKind::Constant(folded), range),
                    None => Node::new(NodeKind::PartialFoldBinary { op, lhs, rhs }, range),
                },
                _ => Node::new(NodeKind::PartialFoldBinary { op, lhs, rhs }, range),
            },
            NodeKind::LogicalAnd { lhs, rhs } => match (&lhs.kind, &rhs.kind) {
                (NodeKind::Constant(Literal::Bool(a)), NodeKind::Constant(Literal::Bool(b))) => {
                    Node::new(NodeKind::Constant(Literal::Bool(*a && *b)), range)
                }
                _ => Node::new(NodeKind::LogicalAnd { lhs, rhs }, range),
            },
            NodeKind::LogicalOr { lhs, rhs } => match (&lhs.kind, &rhs.kind) {
                (NodeKind::Constant(Literal::Bool(a)), NodeKind::Constant(Literal::Bool(b))) => {
                    Node::new(NodeKind::Constant(Literal::Bool(*a || *b)), range)
                }
                _ => Node::new(NodeKind::LogicalOr { lhs, rhs }, range),
            },
            NodeKind::Prefix { op, operand } => match (&op, &operand.kind) {
                (crate::parser::PrefixOp::Neg, NodeKind::Constant(Literal::Int(i))) => Node::new(NodeKind::Constant(Literal::Int(-i)), range),
                (crate::parser::PrefixOp::Neg, NodeKind::Constant(Literal::Float(f))) => {
                    Node::new(NodeKind::Constant(Literal::Float(-f)), range)
                }
                (crate::parser::PrefixOp::Not, NodeKind::Constant(Literal::Bool(b))) => Node::new(NodeKind::Constant(Literal::Bool(!b)), range),
                (crate::parser::PrefixOp::BitNot, NodeKind::Constant(Literal::Int(i))) => Node::new(NodeKind::Constant(Literal::Int(!i)), range),
                _ => Node::new(NodeKind::Prefix { op, operand }, range),
            },
            other => Node::new(other, range),
        }
    })
}

/// Recognizes the canonical `for(var i = <const>; i < <const>; ++i) body` shape
/// (identifiers must match across all three clauses) and replaces it with a
/// `CompiledCountingFor` that iterates as native `i64`s.
fn for_loop_specialization(node: Node) -> Node {
    bottom_up(node, &|n| {
        let Node { kind, range } = n;
        match kind {
            NodeKind::For { init: Some(init), cond: Some(cond), step: Some(step), body } => {
                if let Some((var_name, start, end)) = canonical_counting_shape(&init, &cond, &step) {
                    return Node::new(NodeKind::CompiledCountingFor { var_name, start, end, body }, range);
                }
                Node::new(NodeKind::For { init: Some(init), cond: Some(cond), step: Some(step), body }, range)
            }
            other => Node::new(other, range),
        }
    })
}

fn canonical_counting_shape(init: &Node, cond: &Node, step: &Node) -> Option<(String, i64, i64)> {
    let NodeKind::VarDecl { name, init: Some(start_expr) } = &init.kind else { return None };
    let NodeKind::Constant(start_lit) = &start_expr.kind else { return None };
    let start = as_int(start_lit)?;

    let NodeKind::Binary { op: BinOp::Lt, lhs, rhs } = &cond.kind else { return None };
    let NodeKind::Id(cond_name, _) = &lhs.kind else { return None };
    let NodeKind::Constant(end_lit) = &rhs.kind else { return None };
    let end = as_int(end_lit)?;
    if cond_name != name {
        return None;
    }

    let NodeKind::Equation { op: AssignOp::AddAssign, lhs, rhs } = &step.kind else { return None };
    let NodeKind::Id(step_name, _) = &lhs.kind else { return None };
    let NodeKind::Constant(step_lit) = &rhs.kind else { return None };
    if step_name != name || as_int(step_lit) != Some(1) {
        return None;
    }

    Some((name.clone(), start, end))
}

#[cfg(test)]
mod tests {
    use super::optimize;
    use crate::parser::{self, NodeKind};

    fn opt(src: &str) -> crate::parser::Node {
        let ast = parser::parse("<test>", src).expect("parses");
        optimize(ast)
    }

    #[test]
    fn constant_fold_collapses_arithmetic() {
        let node = opt("var x = 2 + 3 * 4;");
        let NodeKind::File(stmts) = node.kind else { panic!("expected file") };
        let NodeKind::VarDecl { init: Some(init), .. } = &stmts[0].kind else { panic!("expected var decl") };
        assert!(matches!(init.kind, NodeKind::Constant(crate::parser::Literal::Int(14))));
    }

    #[test]
    fn constant_if_picks_the_live_arm() {
        let node = opt("if (true) { 1 } else { 2 }");
        let NodeKind::File(stmts) = node.kind else { panic!("expected file") };
        // `1` as a lone statement in a block unwraps via block-folding.
        assert!(matches!(stmts[0].kind, NodeKind::Constant(crate::parser::Literal::Int(1))));
    }

    #[test]
    fn block_with_no_decls_becomes_scopeless() {
        let node = opt("{ 1; 2; }");
        let NodeKind::File(stmts) = node.kind else { panic!("expected file") };
        assert!(matches!(stmts[0].kind, NodeKind::ScopelessBlock(_)));
    }

    #[test]
    fn dead_code_strips_leading_bare_identifiers() {
        let node = opt("def f() { 1; 2; 3 }");
        let NodeKind::File(stmts) = node.kind else { panic!("expected file") };
        let NodeKind::Def { body, .. } = &stmts[0].kind else { panic!("expected def") };
        let NodeKind::ScopelessBlock(inner) = &body.kind else { panic!("expected scopeless block") };
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn return_tail_unwraps_to_bare_expression() {
        let node = opt("def f(x) { return x + 1; }");
        let NodeKind::File(stmts) = node.kind else { panic!("expected file") };
        let NodeKind::Def { body, .. } = &stmts[0].kind else { panic!("expected def") };
        let NodeKind::ScopelessBlock(inner) = &body.kind else { panic!("expected scopeless block") };
        assert!(matches!(inner[0].kind, NodeKind::PartialFoldBinary { .. }));
    }

    #[test]
    fn canonical_for_loop_specializes() {
        let node = opt("for (var i = 0; i < 10; ++i) { i }");
        let NodeKind::File(stmts) = node.kind else { panic!("expected file") };
        assert!(matches!(stmts[0].kind, NodeKind::CompiledCountingFor { start: 0, end: 10, .. }));
    }

    #[test]
    fn non_canonical_for_loop_is_left_alone() {
        let node = opt("for (var i = 0; i < 10; i += 2) { i }");
        let NodeKind::File(stmts) = node.kind else { panic!("expected file") };
        assert!(matches!(stmts[0].kind, NodeKind::For { .. }));
    }
}

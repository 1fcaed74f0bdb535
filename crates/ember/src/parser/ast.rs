//! AST node kinds (`spec.md §4.6`).
//!
//! Grounded on `examples/parcadei-ouros/crates/ouros/src/expressions.rs` for the
//! `CodeRange`-carrying node shape, and on
//! `original_source/include/chaiscript/language/chaiscript_common.hpp`'s
//! `AST_Node_Type` enum for the exact node-kind list.

use std::fmt;

use crate::dispatch::LocCache;

/// A single line/column position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source span: start and end positions plus the originating filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRange {
    pub filename: std::rc::Rc<str>,
    pub start: CodeLoc,
    pub end: CodeLoc,
}

impl CodeRange {
    #[must_use]
    pub fn new(filename: std::rc::Rc<str>, start: CodeLoc, end: CodeLoc) -> Self {
        Self { filename, start, end }
    }
}

impl fmt::Display for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}-{})", self.filename, self.start, self.end)
    }
}

/// A literal value as produced by the lexer, before any dispatch-time boxing.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
}

/// Binary operator spelled in source; `Binary` nodes carry one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// Prefix (unary) operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Not,
    BitNot,
}

impl PrefixOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
            Self::BitNot => "~",
        }
    }
}

/// Assignment-family operator used by an `Equation` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Bind,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    ShlAssign,
    ShrAssign,
    BitAndAssign,
    BitXorAssign,
    BitOrAssign,
}

impl AssignOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Bind => ":=",
            Self::AddAssign => "+=",
            Self::SubAssign => "-=",
            Self::MulAssign => "*=",
            Self::DivAssign => "/=",
            Self::RemAssign => "%=",
            Self::ShlAssign => "<<=",
            Self::ShrAssign => ">>=",
            Self::BitAndAssign => "&=",
            Self::BitXorAssign => "^=",
            Self::BitOrAssign => "|=",
        }
    }

    /// The plain binary operator a compound assignment short-circuits to on the
    /// numeric fast path (`spec.md §4.7`).
    #[must_use]
    pub fn underlying_binop(self) -> Option<BinOp> {
        match self {
            Self::AddAssign => Some(BinOp::Add),
            Self::SubAssign => Some(BinOp::Sub),
            Self::MulAssign => Some(BinOp::Mul),
            Self::DivAssign => Some(BinOp::Div),
            Self::RemAssign => Some(BinOp::Rem),
            Self::ShlAssign => Some(BinOp::Shl),
            Self::ShrAssign => Some(BinOp::Shr),
            Self::BitAndAssign => Some(BinOp::BitAnd),
            Self::BitXorAssign => Some(BinOp::BitXor),
            Self::BitOrAssign => Some(BinOp::BitOr),
            Self::Assign | Self::Bind => None,
        }
    }
}

/// A function parameter declaration (name plus optional type guard name).
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub type_guard: Option<String>,
}

/// A single `case`/`default` arm of a `Switch`.
#[derive(Debug, Clone)]
pub enum CaseArm {
    Case { value: Node, body: Vec<Node> },
    Default { body: Vec<Node> },
}

/// A `catch` clause of a `Try`.
#[derive(Debug, Clone)]
pub struct CatchArm {
    pub exception_name: Option<String>,
    pub type_guard: Option<String>,
    pub guard: Option<Box<Node>>,
    pub body: Box<Node>,
}

/// AST node kind. One enum variant per `spec.md §4.6` node name.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Bare identifier reference. Carries its own write-once scope-depth cache
    /// (`spec.md §4.5`: `loc_cache` is owned by the call site, not the engine).
    Id(String, LocCache),
    /// A literal constant.
    Constant(Literal),
    /// `f(args)` — callee expression plus an `ArgList`.
    FunCall { callee: Box<Node>, args: Vec<Node> },
    /// A bracketed argument list (kept as a distinct node for round-trip printing).
    ArgList(Vec<Node>),
    /// A single evaluated argument.
    Arg(Box<Node>),
    /// `lhs <op> rhs` assignment family.
    Equation {
        op: AssignOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    /// `var name;` or `var name = expr;`.
    VarDecl { name: String, init: Option<Box<Node>> },
    /// `&name` — reference-slot declaration, filled by the next assignment.
    AssignDecl { name: String },
    /// `GLOBAL name;` or `GLOBAL name = expr;`.
    GlobalDecl { name: String, init: Option<Box<Node>> },
    /// `a[i]`.
    ArrayCall { target: Box<Node>, index: Box<Node> },
    /// `a.b` — attribute/method access, rewritten with `FunCall` when called.
    DotAccess { target: Box<Node>, member: String },
    /// `fun(params) { body }`.
    Lambda {
        captures: Vec<String>,
        params: Vec<Param>,
        body: Box<Node>,
    },
    /// `{ stmt; stmt; }` — pushes a scope.
    Block(Vec<Node>),
    /// Optimizer-produced block that does not push a scope.
    ScopelessBlock(Vec<Node>),
    /// `def name(params) { body }`.
    Def {
        name: String,
        params: Vec<Param>,
        guard: Option<Box<Node>>,
        body: Box<Node>,
    },
    /// `def Class::method(params) { body }`.
    Method {
        class_name: String,
        name: String,
        params: Vec<Param>,
        guard: Option<Box<Node>>,
        body: Box<Node>,
    },
    /// `attr Class::name;` inside a class body.
    AttrDecl { class_name: String, name: String },
    /// `while(cond) body`.
    While { cond: Box<Node>, body: Box<Node> },
    /// `if(cond) body else if(cond) body else body`.
    If {
        arms: Vec<(Node, Node)>,
        else_body: Option<Box<Node>>,
    },
    /// `cond ? then : otherwise`.
    TernaryCond {
        cond: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    /// `for(init; cond; step) body`.
    For {
        init: Option<Box<Node>>,
        cond: Option<Box<Node>>,
        step: Option<Box<Node>>,
        body: Box<Node>,
    },
    /// `for(item : range) body`.
    RangedFor {
        var_name: String,
        range: Box<Node>,
        body: Box<Node>,
    },
    /// `switch(discriminant) { case ... default ... }`.
    Switch { discriminant: Box<Node>, arms: Vec<CaseArm> },
    /// `[a, b, c]`.
    InlineArray(Vec<Node>),
    /// `[k1: v1, k2: v2]`.
    InlineMap(Vec<(Node, Node)>),
    /// `[a..b]`.
    InlineRange { from: Box<Node>, to: Box<Node> },
    /// `return expr;` / bare `return;`.
    Return(Option<Box<Node>>),
    Break,
    Continue,
    /// `try { body } catch (...) { ... } finally { ... }`.
    Try {
        body: Box<Node>,
        catches: Vec<CatchArm>,
        finally: Option<Box<Node>>,
    },
    /// `class Name { ... }`.
    Class { name: String, body: Box<Node> },
    Binary { op: BinOp, lhs: Box<Node>, rhs: Box<Node> },
    Prefix { op: PrefixOp, operand: Box<Node> },
    LogicalAnd { lhs: Box<Node>, rhs: Box<Node> },
    LogicalOr { lhs: Box<Node>, rhs: Box<Node> },
    /// `&expr` used as a call argument, requesting pass-by-reference semantics.
    Reference(Box<Node>),
    /// A whole parsed file: a sequence of top-level statements.
    File(Vec<Node>),
    /// A no-op statement (e.g. a bare `;`).
    Noop,
    /// Optimizer-marked `FunCall` in statement position, result discarded.
    UnusedReturnFunCall { callee: Box<Node>, args: Vec<Node> },
    /// Optimizer-produced (partial-fold pass): `lhs <op> <rhs>` where `rhs` is
    /// known constant at optimize time, carried as a `Literal` directly rather
    /// than a child `Constant` node so the fast path skips re-evaluating it.
    PartialFoldBinary { op: BinOp, lhs: Box<Node>, rhs: Literal },
    /// Optimizer-produced (for-loop-specialization pass): the canonical
    /// `for(var name = start; name < end; ++name) body` shape, compiled to
    /// iterate natively without dispatching `<` or `++` through the evaluator.
    CompiledCountingFor { var_name: String, start: i64, end: i64, body: Box<Node> },
}

/// A node plus its source span.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub range: CodeRange,
}

impl Node {
    #[must_use]
    pub fn new(kind: NodeKind, range: CodeRange) -> Self {
        Self { kind, range }
    }
}

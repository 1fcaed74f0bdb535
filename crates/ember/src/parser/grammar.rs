//! Recursive-descent grammar (`spec.md §4.6`).
//!
//! Grounded on `original_source/include/chaiscript/language/chaiscript_parser.hpp`'s
//! `ChaiScript_Parser` (the precedence-table-as-chained-method-calls shape: each
//! precedence level is one method that tries the level below first, then loops
//! looking for operators at its own level) and
//! `examples/parcadei-ouros/crates/ouros/src/parse.rs` for the `ParseError` shape
//! (file/line/column plus a human explanation).

use std::fmt;
use std::rc::Rc;

use super::ast::{
    AssignOp, BinOp, CaseArm, CatchArm, CodeLoc, CodeRange, Literal, Node, NodeKind, Param, PrefixOp,
};
use super::lexer::{Lexer, StrPart, Token, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub filename: Rc<str>,
    pub at: CodeLoc,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.filename, self.at, self.message)
    }
}

impl std::error::Error for ParseError {}

pub struct Parser<'a> {
    filename: Rc<str>,
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// # Errors
    /// Returns [`ParseError`] if the first token cannot be lexed.
    pub fn new(filename: &str, source: &'a str) -> Result<Self, ParseError> {
        let filename: Rc<str> = Rc::from(filename);
        let mut lexer = Lexer::new(Rc::clone(&filename), source);
        let current = lexer.next_token().map_err(|e| ParseError {
            filename: Rc::clone(&filename),
            at: e.at,
            message: e.message,
        })?;
        Ok(Self { filename, lexer, current })
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError { filename: Rc::clone(&self.filename), at: self.current.start, message: message.into() }
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        let next = self.lexer.next_token().map_err(|e| ParseError {
            filename: Rc::clone(&self.filename),
            at: e.at,
            message: e.message,
        })?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Punct(q) if *q == p)
    }

    fn is_id(&self, name: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Id(s) if s == name)
    }

    fn expect_punct(&mut self, p: &str) -> Result<Token, ParseError> {
        if self.is_punct(p) {
            self.advance()
        } else {
            Err(self.err(format!("expected '{p}'")))
        }
    }

    fn expect_id(&mut self) -> Result<(String, CodeLoc), ParseError> {
        let start = self.current.start;
        match &self.current.kind {
            TokenKind::Id(s) => {
                let s = s.clone();
                self.advance()?;
                Ok((s, start))
            }
            _ => Err(self.err("expected identifier")),
        }
    }

    fn range_from(&self, start: CodeLoc, end: CodeLoc) -> CodeRange {
        CodeRange::new(Rc::clone(&self.filename), start, end)
    }

    fn prev_end(&self) -> CodeLoc {
        self.current.start
    }

    /// Skips statement terminators: `;`, or an implicit newline boundary.
    fn skip_terminators(&mut self) -> Result<(), ParseError> {
        loop {
            if self.is_punct(";") {
                self.advance()?;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn at_stmt_end(&self) -> bool {
        self.is_punct(";")
            || self.is_punct("}")
            || matches!(self.current.kind, TokenKind::Eof)
            || self.current.preceded_by_newline
    }

    /// Parses an entire file: a sequence of top-level statements
    /// (`spec.md §4.6`: implicit trailing newline, `#!` already stripped by the lexer).
    ///
    /// # Errors
    /// Returns [`ParseError`] on any malformed construct.
    pub fn parse_file(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        let mut stmts = Vec::new();
        self.skip_terminators()?;
        while !matches!(self.current.kind, TokenKind::Eof) {
            let stmt = self.parse_statement()?;
            stmts.push(stmt);
            self.finish_statement()?;
        }
        let end = self.prev_end();
        Ok(Node::new(NodeKind::File(stmts), self.range_from(start, end)))
    }

    /// Enforces "reject two statements on the same line without a separator"
    /// (`spec.md §4.6`).
    fn finish_statement(&mut self) -> Result<(), ParseError> {
        if self.is_punct(";") {
            self.skip_terminators()?;
            return Ok(());
        }
        if self.is_punct("}") || matches!(self.current.kind, TokenKind::Eof) {
            return Ok(());
        }
        if !self.current.preceded_by_newline {
            return Err(self.err("expected ';' or newline between statements"));
        }
        self.skip_terminators()?;
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<Node, ParseError> {
        if self.is_punct(";") {
            let start = self.current.start;
            self.advance()?;
            return Ok(Node::new(NodeKind::Noop, self.range_from(start, start)));
        }
        if self.is_id("var") {
            return self.parse_var_decl();
        }
        if self.is_id("GLOBAL") || self.is_id("global") {
            return self.parse_global_decl();
        }
        if self.is_id("def") {
            return self.parse_def();
        }
        if self.is_id("class") {
            return self.parse_class();
        }
        if self.is_id("attr") {
            return self.parse_attr_decl();
        }
        if self.is_id("while") {
            return self.parse_while();
        }
        if self.is_id("for") {
            return self.parse_for();
        }
        if self.is_id("if") {
            return self.parse_if();
        }
        if self.is_id("switch") {
            return self.parse_switch();
        }
        if self.is_id("try") {
            return self.parse_try();
        }
        if self.is_id("return") {
            let start = self.current.start;
            self.advance()?;
            let value = if self.at_stmt_end() { None } else { Some(Box::new(self.parse_equation()?)) };
            let end = self.prev_end();
            return Ok(Node::new(NodeKind::Return(value), self.range_from(start, end)));
        }
        if self.is_id("break") {
            let start = self.current.start;
            self.advance()?;
            return Ok(Node::new(NodeKind::Break, self.range_from(start, self.prev_end())));
        }
        if self.is_id("continue") {
            let start = self.current.start;
            self.advance()?;
            return Ok(Node::new(NodeKind::Continue, self.range_from(start, self.prev_end())));
        }
        if self.is_punct("{") {
            return self.parse_block();
        }
        self.parse_equation()
    }

    fn parse_var_decl(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        let (name, _) = self.expect_id()?;
        let init = if self.is_punct("=") {
            self.advance()?;
            Some(Box::new(self.parse_equation()?))
        } else {
            None
        };
        let end = self.prev_end();
        Ok(Node::new(NodeKind::VarDecl { name, init }, self.range_from(start, end)))
    }

    fn parse_global_decl(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        let (name, _) = self.expect_id()?;
        let init = if self.is_punct("=") {
            self.advance()?;
            Some(Box::new(self.parse_equation()?))
        } else {
            None
        };
        let end = self.prev_end();
        Ok(Node::new(NodeKind::GlobalDecl { name, init }, self.range_from(start, end)))
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.is_punct(")") {
            let first = self.expect_id()?.0;
            if self.is_id_token_is_next_param(&first) {
                let (name, _) = self.expect_id()?;
                params.push(Param { name, type_guard: Some(first) });
            } else {
                params.push(Param { name: first, type_guard: None });
            }
            if self.is_punct(",") {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    /// A parameter written as `Type name` has two consecutive identifiers; distinguish
    /// from the plain `name` form by checking whether another identifier directly
    /// follows what was just consumed as the first token.
    fn is_id_token_is_next_param(&self, _first: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Id(_))
    }

    fn parse_def(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        let (mut name, _) = self.expect_id()?;
        let mut class_name = None;
        if self.is_punct("::") {
            self.advance()?;
            let (method_name, _) = self.expect_id()?;
            class_name = Some(name);
            name = method_name;
        }
        let params = self.parse_params()?;
        let guard = if self.is_punct(":") {
            self.advance()?;
            Some(Box::new(self.parse_equation()?))
        } else {
            None
        };
        let body = Box::new(self.parse_block()?);
        let end = self.prev_end();
        let range = self.range_from(start, end);
        if let Some(class_name) = class_name {
            Ok(Node::new(NodeKind::Method { class_name, name, params, guard, body }, range))
        } else {
            Ok(Node::new(NodeKind::Def { name, params, guard, body }, range))
        }
    }

    fn parse_class(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        let (name, _) = self.expect_id()?;
        let body = Box::new(self.parse_block()?);
        let end = self.prev_end();
        Ok(Node::new(NodeKind::Class { name, body }, self.range_from(start, end)))
    }

    fn parse_attr_decl(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        let (class_name, _) = self.expect_id()?;
        self.expect_punct("::")?;
        let (name, _) = self.expect_id()?;
        let end = self.prev_end();
        Ok(Node::new(NodeKind::AttrDecl { class_name, name }, self.range_from(start, end)))
    }

    fn parse_while(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        self.expect_punct("(")?;
        let cond = Box::new(self.parse_equation()?);
        self.expect_punct(")")?;
        let body = Box::new(self.parse_block()?);
        let end = self.prev_end();
        Ok(Node::new(NodeKind::While { cond, body }, self.range_from(start, end)))
    }

    fn parse_for(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        self.expect_punct("(")?;

        // Disambiguate `for(item : range)` from `for(init; cond; step)` by scanning
        // for the ranged-for's bare `:` before falling back to the C-style form.
        if matches!(&self.current.kind, TokenKind::Id(_)) {
            let save = (self.current.clone(),);
            let (var_name, _) = self.expect_id()?;
            if self.is_punct(":") {
                self.advance()?;
                let range = Box::new(self.parse_equation()?);
                self.expect_punct(")")?;
                let body = Box::new(self.parse_block()?);
                let end = self.prev_end();
                return Ok(Node::new(
                    NodeKind::RangedFor { var_name, range, body },
                    self.range_from(start, end),
                ));
            }
            self.current = save.0;
            return self.finish_c_style_for(start, true);
        }
        self.finish_c_style_for(start, false)
    }

    /// `reparsed_name_token` exists because `parse_for` already consumed an
    /// identifier speculatively; when the ranged-for check fails we must re-derive
    /// the init clause from scratch since a single lexer token was restored, not a
    /// full AST node.
    fn finish_c_style_for(&mut self, start: CodeLoc, _reparsed_name_token: bool) -> Result<Node, ParseError> {
        let init = if self.is_punct(";") {
            None
        } else if self.is_id("var") {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            Some(Box::new(self.parse_equation()?))
        };
        self.expect_punct(";")?;
        let cond = if self.is_punct(";") { None } else { Some(Box::new(self.parse_equation()?)) };
        self.expect_punct(";")?;
        let step = if self.is_punct(")") { None } else { Some(Box::new(self.parse_equation()?)) };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_block()?);
        let end = self.prev_end();
        Ok(Node::new(NodeKind::For { init, cond, step, body }, self.range_from(start, end)))
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        let mut arms = Vec::new();
        self.expect_punct("(")?;
        let cond = self.parse_equation()?;
        self.expect_punct(")")?;
        let body = self.parse_block()?;
        arms.push((cond, body));
        let mut else_body = None;
        while self.is_id("else") {
            self.advance()?;
            if self.is_id("if") {
                self.advance()?;
                self.expect_punct("(")?;
                let cond = self.parse_equation()?;
                self.expect_punct(")")?;
                let body = self.parse_block()?;
                arms.push((cond, body));
            } else {
                else_body = Some(Box::new(self.parse_block()?));
                break;
            }
        }
        let end = self.prev_end();
        Ok(Node::new(NodeKind::If { arms, else_body }, self.range_from(start, end)))
    }

    fn parse_switch(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        self.expect_punct("(")?;
        let discriminant = Box::new(self.parse_equation()?);
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut arms = Vec::new();
        self.skip_terminators()?;
        while !self.is_punct("}") {
            if self.is_id("case") {
                self.advance()?;
                self.expect_punct("(")?;
                let value = self.parse_equation()?;
                self.expect_punct(")")?;
                self.expect_punct(":")?;
                let mut body = Vec::new();
                while !self.is_id("case") && !self.is_id("default") && !self.is_punct("}") {
                    body.push(self.parse_statement()?);
                    self.finish_statement()?;
                }
                arms.push(CaseArm::Case { value, body });
            } else if self.is_id("default") {
                self.advance()?;
                self.expect_punct(":")?;
                let mut body = Vec::new();
                while !self.is_id("case") && !self.is_id("default") && !self.is_punct("}") {
                    body.push(self.parse_statement()?);
                    self.finish_statement()?;
                }
                arms.push(CaseArm::Default { body });
            } else {
                return Err(self.err("expected 'case' or 'default'"));
            }
        }
        self.expect_punct("}")?;
        let end = self.prev_end();
        Ok(Node::new(NodeKind::Switch { discriminant, arms }, self.range_from(start, end)))
    }

    fn parse_try(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.advance()?;
        let body = Box::new(self.parse_block()?);
        let mut catches = Vec::new();
        while self.is_id("catch") {
            self.advance()?;
            let mut exception_name = None;
            let mut type_guard = None;
            let mut guard = None;
            if self.is_punct("(") {
                self.advance()?;
                let first = self.expect_id()?.0;
                if matches!(&self.current.kind, TokenKind::Id(_)) {
                    let (name, _) = self.expect_id()?;
                    type_guard = Some(first);
                    exception_name = Some(name);
                } else {
                    exception_name = Some(first);
                }
                if self.is_punct(":") {
                    self.advance()?;
                    guard = Some(Box::new(self.parse_equation()?));
                }
                self.expect_punct(")")?;
            }
            let catch_body = Box::new(self.parse_block()?);
            catches.push(CatchArm { exception_name, type_guard, guard, body: catch_body });
        }
        let finally = if self.is_id("finally") {
            self.advance()?;
            Some(Box::new(self.parse_block()?))
        } else {
            None
        };
        let end = self.prev_end();
        Ok(Node::new(NodeKind::Try { body, catches, finally }, self.range_from(start, end)))
    }

    fn parse_block(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        self.skip_terminators()?;
        while !self.is_punct("}") {
            stmts.push(self.parse_statement()?);
            self.finish_statement()?;
        }
        self.expect_punct("}")?;
        let end = self.prev_end();
        Ok(Node::new(NodeKind::Block(stmts), self.range_from(start, end)))
    }

    // --- expression grammar, lowest to highest precedence (`spec.md §4.6`) ---

    fn parse_equation(&mut self) -> Result<Node, ParseError> {
        let lhs = self.parse_ternary()?;
        let op = match &self.current.kind {
            TokenKind::Punct("=") => Some(AssignOp::Assign),
            TokenKind::Punct(":=") => Some(AssignOp::Bind),
            TokenKind::Punct("+=") => Some(AssignOp::AddAssign),
            TokenKind::Punct("-=") => Some(AssignOp::SubAssign),
            TokenKind::Punct("*=") => Some(AssignOp::MulAssign),
            TokenKind::Punct("/=") => Some(AssignOp::DivAssign),
            TokenKind::Punct("%=") => Some(AssignOp::RemAssign),
            TokenKind::Punct("<<=") => Some(AssignOp::ShlAssign),
            TokenKind::Punct(">>=") => Some(AssignOp::ShrAssign),
            TokenKind::Punct("&=") => Some(AssignOp::BitAndAssign),
            TokenKind::Punct("^=") => Some(AssignOp::BitXorAssign),
            TokenKind::Punct("|=") => Some(AssignOp::BitOrAssign),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        self.advance()?;
        // right-associative: recurse into parse_equation, not parse_ternary
        let rhs = self.parse_equation()?;
        let start = lhs.range.start;
        let end = self.prev_end();
        Ok(Node::new(
            NodeKind::Equation { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            self.range_from(start, end),
        ))
    }

    fn parse_ternary(&mut self) -> Result<Node, ParseError> {
        let cond = self.parse_logical_or()?;
        if self.is_punct("?") {
            self.advance()?;
            let then = self.parse_equation()?;
            self.expect_punct(":")?;
            let otherwise = self.parse_equation()?;
            let start = cond.range.start;
            let end = self.prev_end();
            return Ok(Node::new(
                NodeKind::TernaryCond { cond: Box::new(cond), then: Box::new(then), otherwise: Box::new(otherwise) },
                self.range_from(start, end),
            ));
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> Result<Node, ParseError> {
        let mut lhs = self.parse_logical_and()?;
        while self.is_punct("||") {
            self.advance()?;
            let rhs = self.parse_logical_and()?;
            let start = lhs.range.start;
            let end = self.prev_end();
            lhs = Node::new(NodeKind::LogicalOr { lhs: Box::new(lhs), rhs: Box::new(rhs) }, self.range_from(start, end));
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Node, ParseError> {
        let mut lhs = self.parse_bit_or()?;
        while self.is_punct("&&") {
            self.advance()?;
            let rhs = self.parse_bit_or()?;
            let start = lhs.range.start;
            let end = self.prev_end();
            lhs = Node::new(NodeKind::LogicalAnd { lhs: Box::new(lhs), rhs: Box::new(rhs) }, self.range_from(start, end));
        }
        Ok(lhs)
    }

    fn parse_binary_level(
        &mut self,
        mut lower: impl FnMut(&mut Self) -> Result<Node, ParseError>,
        ops: &[(&'static str, BinOp)],
    ) -> Result<Node, ParseError> {
        let mut lhs = lower(self)?;
        loop {
            let Some((_, op)) = ops.iter().find(|(p, _)| self.is_punct(p)) else { break };
            self.advance()?;
            let rhs = lower(self)?;
            let start = lhs.range.start;
            let end = self.prev_end();
            lhs = Node::new(NodeKind::Binary { op: *op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, self.range_from(start, end));
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> Result<Node, ParseError> {
        self.parse_binary_level(Self::parse_bit_xor, &[("|", BinOp::BitOr)])
    }

    fn parse_bit_xor(&mut self) -> Result<Node, ParseError> {
        self.parse_binary_level(Self::parse_bit_and, &[("^", BinOp::BitXor)])
    }

    fn parse_bit_and(&mut self) -> Result<Node, ParseError> {
        self.parse_binary_level(Self::parse_equality, &[("&", BinOp::BitAnd)])
    }

    fn parse_equality(&mut self) -> Result<Node, ParseError> {
        self.parse_binary_level(Self::parse_relational, &[("==", BinOp::Eq), ("!=", BinOp::Ne)])
    }

    fn parse_relational(&mut self) -> Result<Node, ParseError> {
        self.parse_binary_level(
            Self::parse_shift,
            &[("<=", BinOp::Le), (">=", BinOp::Ge), ("<", BinOp::Lt), (">", BinOp::Gt)],
        )
    }

    fn parse_shift(&mut self) -> Result<Node, ParseError> {
        self.parse_binary_level(Self::parse_additive, &[("<<", BinOp::Shl), (">>", BinOp::Shr)])
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        self.parse_binary_level(Self::parse_multiplicative, &[("+", BinOp::Add), ("-", BinOp::Sub)])
    }

    fn parse_multiplicative(&mut self) -> Result<Node, ParseError> {
        self.parse_binary_level(Self::parse_prefix, &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Rem)])
    }

    fn parse_prefix(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        let op = match &self.current.kind {
            TokenKind::Punct("-") => Some(PrefixOp::Neg),
            TokenKind::Punct("!") => Some(PrefixOp::Not),
            TokenKind::Punct("~") => Some(PrefixOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let operand = Box::new(self.parse_prefix()?);
            let end = self.prev_end();
            return Ok(Node::new(NodeKind::Prefix { op, operand }, self.range_from(start, end)));
        }
        // `++x`/`--x` desugar to `x += 1`/`x -= 1` at parse time; there is no
        // dedicated increment/decrement node.
        let incr_op = match &self.current.kind {
            TokenKind::Punct("++") => Some(AssignOp::AddAssign),
            TokenKind::Punct("--") => Some(AssignOp::SubAssign),
            _ => None,
        };
        if let Some(op) = incr_op {
            self.advance()?;
            let lhs = Box::new(self.parse_prefix()?);
            let end = self.prev_end();
            let rhs = Box::new(Node::new(NodeKind::Constant(Literal::Int(1)), self.range_from(start, end)));
            return Ok(Node::new(NodeKind::Equation { op, lhs, rhs }, self.range_from(start, end)));
        }
        if self.is_punct("&") {
            self.advance()?;
            let operand = Box::new(self.parse_prefix()?);
            let end = self.prev_end();
            return Ok(Node::new(NodeKind::Reference(operand), self.range_from(start, end)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Node, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            if self.is_punct("(") {
                let args = self.parse_arg_list()?;
                let end = self.prev_end();
                let start = node.range.start;
                node = Node::new(NodeKind::FunCall { callee: Box::new(node), args }, self.range_from(start, end));
            } else if self.is_punct(".") {
                self.advance()?;
                let (member, _) = self.expect_id()?;
                let end = self.prev_end();
                let start = node.range.start;
                node = Node::new(NodeKind::DotAccess { target: Box::new(node), member }, self.range_from(start, end));
            } else if self.is_punct("[") {
                self.advance()?;
                let index = Box::new(self.parse_equation()?);
                self.expect_punct("]")?;
                let end = self.prev_end();
                let start = node.range.start;
                node = Node::new(NodeKind::ArrayCall { target: Box::new(node), index }, self.range_from(start, end));
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Node>, ParseError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.is_punct(")") {
            args.push(self.parse_equation()?);
            if self.is_punct(",") {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let start = self.current.start;
        match self.current.kind.clone() {
            TokenKind::Int(v) => {
                self.advance()?;
                Ok(Node::new(NodeKind::Constant(Literal::Int(v)), self.range_from(start, self.prev_end())))
            }
            TokenKind::Float(v) => {
                self.advance()?;
                Ok(Node::new(NodeKind::Constant(Literal::Float(v)), self.range_from(start, self.prev_end())))
            }
            TokenKind::Bool(v) => {
                self.advance()?;
                Ok(Node::new(NodeKind::Constant(Literal::Bool(v)), self.range_from(start, self.prev_end())))
            }
            TokenKind::Char(c) => {
                self.advance()?;
                Ok(Node::new(NodeKind::Constant(Literal::Char(c)), self.range_from(start, self.prev_end())))
            }
            TokenKind::Str(parts) => {
                self.advance()?;
                self.build_string_node(parts, start)
            }
            TokenKind::Id(name) => {
                self.advance()?;
                if name == "fun" {
                    return self.parse_lambda(start);
                }
                Ok(Node::new(NodeKind::Id(name, super::ast::LocCache::new()), self.range_from(start, self.prev_end())))
            }
            TokenKind::Punct("(") => {
                self.advance()?;
                let inner = self.parse_equation()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            TokenKind::Punct("[") => self.parse_inline_container(start),
            other => Err(self.err(format!("unexpected token {other:?}"))),
        }
    }

    /// Splices literal and interpolated segments of a double-quoted string into
    /// `to_string`-concatenated `FunCall`s (`spec.md §4.6`); a string with a single
    /// literal segment and no interpolation stays a plain `Constant`.
    fn build_string_node(&mut self, parts: Vec<StrPart>, start: CodeLoc) -> Result<Node, ParseError> {
        if let [StrPart::Literal(s)] = parts.as_slice() {
            return Ok(Node::new(NodeKind::Constant(Literal::Str(s.clone())), self.range_from(start, self.prev_end())));
        }
        let mut acc: Option<Node> = None;
        for part in parts {
            let piece = match part {
                StrPart::Literal(s) => Node::new(NodeKind::Constant(Literal::Str(s)), self.range_from(start, start)),
                StrPart::Interp(src) => {
                    let mut sub = Parser::new(&self.filename, &src)?;
                    let expr = sub.parse_equation()?;
                    let range = expr.range.clone();
                    Node::new(
                        NodeKind::FunCall {
                            callee: Box::new(Node::new(NodeKind::Id("to_string".to_string(), super::ast::LocCache::new()), range.clone())),
                            args: vec![expr],
                        },
                        range,
                    )
                }
            };
            acc = Some(match acc {
                None => piece,
                Some(prev) => {
                    let range = self.range_from(start, self.prev_end());
                    Node::new(NodeKind::Binary { op: BinOp::Add, lhs: Box::new(prev), rhs: Box::new(piece) }, range)
                }
            });
        }
        Ok(acc.unwrap_or_else(|| Node::new(NodeKind::Constant(Literal::Str(String::new())), self.range_from(start, start))))
    }

    fn parse_lambda(&mut self, start: CodeLoc) -> Result<Node, ParseError> {
        let mut captures = Vec::new();
        if self.is_punct("[") {
            self.advance()?;
            while !self.is_punct("]") {
                let (name, _) = self.expect_id()?;
                captures.push(name);
                if self.is_punct(",") {
                    self.advance()?;
                } else {
                    break;
                }
            }
            self.expect_punct("]")?;
        }
        let params = self.parse_params()?;
        let body = Box::new(self.parse_block()?);
        let end = self.prev_end();
        Ok(Node::new(NodeKind::Lambda { captures, params, body }, self.range_from(start, end)))
    }

    /// `[a, b, c]` (array), `[k:v, ...]` (map), or `[a..b]` (range) — disambiguated by
    /// the first separator seen after the initial element (`spec.md §4.6`).
    fn parse_inline_container(&mut self, start: CodeLoc) -> Result<Node, ParseError> {
        self.advance()?;
        if self.is_punct("]") {
            self.advance()?;
            return Ok(Node::new(NodeKind::InlineArray(Vec::new()), self.range_from(start, self.prev_end())));
        }
        let first = self.parse_equation()?;
        if self.is_punct("..") {
            self.advance()?;
            let to = self.parse_equation()?;
            self.expect_punct("]")?;
            let end = self.prev_end();
            return Ok(Node::new(
                NodeKind::InlineRange { from: Box::new(first), to: Box::new(to) },
                self.range_from(start, end),
            ));
        }
        if self.is_punct(":") {
            self.advance()?;
            let value = self.parse_equation()?;
            let mut pairs = vec![(first, value)];
            while self.is_punct(",") {
                self.advance()?;
                if self.is_punct("]") {
                    break;
                }
                let k = self.parse_equation()?;
                self.expect_punct(":")?;
                let v = self.parse_equation()?;
                pairs.push((k, v));
            }
            self.expect_punct("]")?;
            let end = self.prev_end();
            return Ok(Node::new(NodeKind::InlineMap(pairs), self.range_from(start, end)));
        }
        let mut elems = vec![first];
        while self.is_punct(",") {
            self.advance()?;
            if self.is_punct("]") {
                break;
            }
            elems.push(self.parse_equation()?);
        }
        self.expect_punct("]")?;
        let end = self.prev_end();
        Ok(Node::new(NodeKind::InlineArray(elems), self.range_from(start, end)))
    }
}

/// Parses a full file. Convenience wrapper around [`Parser::new`] + [`Parser::parse_file`].
///
/// # Errors
/// Returns [`ParseError`] on any malformed construct.
pub fn parse(filename: &str, source: &str) -> Result<Node, ParseError> {
    Parser::new(filename, source)?.parse_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parses_ok(src: &str) -> Node {
        parse("t.ember", src).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    #[test]
    fn parses_var_decl_and_equation() {
        let file = parses_ok("var x = 1 + 2 * 3;");
        let NodeKind::File(stmts) = &file.kind else { panic!() };
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0].kind, NodeKind::VarDecl { .. }));
    }

    #[test]
    fn precedence_multiplication_binds_tighter_than_addition() {
        let file = parses_ok("1 + 2 * 3;");
        let NodeKind::File(stmts) = &file.kind else { panic!() };
        let NodeKind::Binary { op: BinOp::Add, rhs, .. } = &stmts[0].kind else { panic!("expected top-level +") };
        assert!(matches!(rhs.kind, NodeKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn rejects_two_statements_same_line() {
        let err = parse("t.ember", "var x = 1 var y = 2").unwrap_err();
        assert!(err.message.contains("between statements"));
    }

    #[test]
    fn method_call_parses_as_dot_access_funcall() {
        let file = parses_ok("obj.method(1, 2);");
        let NodeKind::File(stmts) = &file.kind else { panic!() };
        let NodeKind::FunCall { callee, args } = &stmts[0].kind else { panic!("expected FunCall") };
        assert_eq!(args.len(), 2);
        assert!(matches!(callee.kind, NodeKind::DotAccess { .. }));
    }

    #[test]
    fn parses_string_interpolation_as_concatenation() {
        let file = parses_ok(r#""x = ${1+1}";"#);
        let NodeKind::File(stmts) = &file.kind else { panic!() };
        assert!(matches!(stmts[0].kind, NodeKind::Binary { op: BinOp::Add, .. }));
    }

    #[test]
    fn if_else_if_else_chain() {
        let file = parses_ok("if (true) { 1; } else if (false) { 2; } else { 3; }");
        let NodeKind::File(stmts) = &file.kind else { panic!() };
        let NodeKind::If { arms, else_body } = &stmts[0].kind else { panic!("expected If") };
        assert_eq!(arms.len(), 2);
        assert!(else_body.is_some());
    }

    #[test]
    fn ranged_for_vs_c_style_for() {
        let ranged = parses_ok("for (x : items) { print(x); }");
        let NodeKind::File(stmts) = &ranged.kind else { panic!() };
        assert!(matches!(stmts[0].kind, NodeKind::RangedFor { .. }));

        let c_style = parses_ok("for (var i = 0; i < 10; i += 1) { print(i); }");
        let NodeKind::File(stmts) = &c_style.kind else { panic!() };
        assert!(matches!(stmts[0].kind, NodeKind::For { .. }));
    }
}

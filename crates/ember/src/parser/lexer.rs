//! Lexical layer (`spec.md §4.6`).
//!
//! Grounded on `original_source/include/chaiscript/language/chaiscript_parser.hpp`'s
//! `Lexer`/`Char_Parser` (the escape table, `${}` interpolation splicing, the
//! back-tick-quoted identifier form for operator names) and on
//! `examples/flip1995-rust-clippy/src/librustc_lexer`'s style of a flat `TokenKind`
//! enum walked by a cursor over `&str` with no intermediate `Vec<char>`.

use std::fmt;
use std::rc::Rc;
use std::str::Chars;

use super::ast::CodeLoc;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Id(String),
    Int(i64),
    Float(f64),
    Str(Vec<StrPart>),
    Char(char),
    Bool(bool),
    Punct(&'static str),
    Eof,
}

/// A double-quoted string literal decomposes into literal text segments and
/// `${...}` interpolated expression segments, spliced back together at parse time
/// via `to_string` concatenation (`spec.md §4.6`).
#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Literal(String),
    Interp(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: CodeLoc,
    pub end: CodeLoc,
    /// True if a newline appears between this token and the previous one, used to
    /// detect implicit statement terminators.
    pub preceded_by_newline: bool,
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub at: CodeLoc,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.at)
    }
}

impl std::error::Error for LexError {}

const PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", ":=", "==", "!=", "<=", ">=", "&&", "||", "<<", ">>", "++", "--", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=", "::", "..", "->", "(", ")", "{", "}", "[", "]", ",", ";", ":", "?",
    ".", "+", "-", "*", "/", "%", "<", ">", "=", "!", "&", "|", "^", "~", "`",
];

pub struct Lexer<'a> {
    filename: Rc<str>,
    chars: Chars<'a>,
    rest: &'a str,
    line: u32,
    column: u32,
    bracket_depth: i32,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(filename: Rc<str>, source: &'a str) -> Self {
        let source = source.strip_prefix("#!").map_or(source, |after| {
            match after.find('\n') {
                Some(idx) => &after[idx..],
                None => "",
            }
        });
        Self {
            filename,
            chars: source.chars(),
            rest: source,
            line: 1,
            column: 1,
            bracket_depth: 0,
        }
    }

    fn loc(&self) -> CodeLoc {
        CodeLoc::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.chars.clone();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.rest = self.chars.as_str();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn err(&self, message: impl Into<String>) -> LexError {
        LexError { message: message.into(), at: self.loc() }
    }

    /// Skips whitespace and comments, returning whether a newline was crossed that
    /// should count as a statement terminator (suppressed while inside brackets, per
    /// `spec.md §4.6`'s continuation rule).
    fn skip_trivia(&mut self) -> bool {
        let mut saw_newline = false;
        loop {
            match self.peek() {
                Some(c) if c == '\n' => {
                    if self.bracket_depth <= 0 {
                        saw_newline = true;
                    }
                    self.bump();
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                Some('/') if self.peek2() == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => break,
                            Some('*') if self.peek2() == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        saw_newline
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        let preceded_by_newline = self.skip_trivia();
        let start = self.loc();
        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, start, end: start, preceded_by_newline });
        };

        let kind = if c == '`' {
            self.lex_backtick_id()?
        } else if c.is_ascii_digit() {
            self.lex_number()?
        } else if c == '"' {
            self.lex_string()?
        } else if c == '\'' {
            self.lex_char()?
        } else if is_id_start(c) {
            self.lex_id()
        } else {
            self.lex_punct()?
        };

        let end = self.loc();
        if matches!(kind, TokenKind::Punct("(" | "[")) {
            self.bracket_depth += 1;
        } else if matches!(kind, TokenKind::Punct(")" | "]")) {
            self.bracket_depth -= 1;
        }
        Ok(Token { kind, start, end, preceded_by_newline })
    }

    fn lex_id(&mut self) -> TokenKind {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_id_continue(c) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match s.as_str() {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            _ => TokenKind::Id(s),
        }
    }

    /// `` `+` `` style back-tick-quoted identifier, permitting operator names
    /// (`spec.md §4.6`).
    fn lex_backtick_id(&mut self) -> Result<TokenKind, LexError> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some(c) => s.push(c),
                None => return Err(self.err("unterminated back-tick identifier")),
            }
        }
        if s.is_empty() {
            return Err(self.err("empty back-tick identifier"));
        }
        Ok(TokenKind::Id(s))
    }

    fn lex_number(&mut self) -> Result<TokenKind, LexError> {
        let mut s = String::new();
        if self.peek() == Some('0') && matches!(self.peek2(), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            let value = i64::from_str_radix(&digits, 16).map_err(|_| self.err("invalid hex literal"))?;
            self.skip_int_suffix();
            return Ok(TokenKind::Int(value));
        }
        if self.peek() == Some('0') && matches!(self.peek2(), Some('b' | 'B')) {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c == '0' || c == '1' {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            let value = i64::from_str_radix(&digits, 2).map_err(|_| self.err("invalid binary literal"))?;
            self.skip_int_suffix();
            return Ok(TokenKind::Int(value));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            s.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            s.push('e');
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                s.push(self.bump().expect("peeked"));
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        let has_float_suffix = matches!(self.peek(), Some('f' | 'F' | 'l' | 'L')) && is_float;
        if has_float_suffix {
            self.bump();
        }
        if is_float || has_float_suffix {
            let v: f64 = s.parse().map_err(|_| self.err("invalid float literal"))?;
            Ok(TokenKind::Float(v))
        } else {
            self.skip_int_suffix();
            let v: i64 = s.parse().map_err(|_| self.err("invalid integer literal"))?;
            Ok(TokenKind::Int(v))
        }
    }

    /// `u/U/l/L` suffix combinations on an integer literal; the distinction between
    /// target integer widths is resolved later by the evaluator, so the lexer only
    /// needs to consume and discard them here.
    fn skip_int_suffix(&mut self) {
        while matches!(self.peek(), Some('u' | 'U' | 'l' | 'L')) {
            self.bump();
        }
    }

    fn lex_string(&mut self) -> Result<TokenKind, LexError> {
        self.bump();
        let mut parts = Vec::new();
        let mut current = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err("unterminated string literal")),
                Some('"') => break,
                Some('\\') => current.push(self.lex_escape()?),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    if !current.is_empty() {
                        parts.push(StrPart::Literal(std::mem::take(&mut current)));
                    }
                    let mut expr = String::new();
                    let mut depth = 1;
                    loop {
                        match self.bump() {
                            None => return Err(self.err("unterminated interpolation")),
                            Some('{') => {
                                depth += 1;
                                expr.push('{');
                            }
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                                expr.push('}');
                            }
                            Some(c) => expr.push(c),
                        }
                    }
                    parts.push(StrPart::Interp(expr));
                }
                Some(c) => current.push(c),
            }
        }
        if !current.is_empty() || parts.is_empty() {
            parts.push(StrPart::Literal(current));
        }
        Ok(TokenKind::Str(parts))
    }

    fn lex_char(&mut self) -> Result<TokenKind, LexError> {
        self.bump();
        let c = match self.bump() {
            Some('\\') => self.lex_escape()?,
            Some(c) => c,
            None => return Err(self.err("unterminated char literal")),
        };
        match self.bump() {
            Some('\'') => Ok(TokenKind::Char(c)),
            _ => Err(self.err("char literal must contain exactly one character")),
        }
    }

    /// `\n \r \t \b \f \' \" \\ \$` (`spec.md §4.6`).
    fn lex_escape(&mut self) -> Result<char, LexError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('$') => Ok('$'),
            Some(other) => Err(self.err(format!("unknown escape sequence '\\{other}'"))),
            None => Err(self.err("unterminated escape sequence")),
        }
    }

    fn lex_punct(&mut self) -> Result<TokenKind, LexError> {
        for p in PUNCTUATORS {
            if self.rest.starts_with(p) {
                for _ in p.chars() {
                    self.bump();
                }
                return Ok(TokenKind::Punct(p));
            }
        }
        let c = self.peek().expect("checked by caller");
        Err(self.err(format!("unexpected character '{c}'")))
    }

    #[must_use]
    pub fn filename(&self) -> Rc<str> {
        Rc::clone(&self.filename)
    }
}

fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_id_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(Rc::from("test.ember"), src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().expect("lex ok");
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn lexes_hex_and_binary() {
        assert_eq!(tokens("0xFF"), vec![TokenKind::Int(255)]);
        assert_eq!(tokens("0b101"), vec![TokenKind::Int(5)]);
    }

    #[test]
    fn lexes_backtick_operator_name() {
        assert_eq!(tokens("`+`"), vec![TokenKind::Id("+".to_string())]);
    }

    #[test]
    fn lexes_string_interpolation() {
        let toks = tokens(r#""a${1+1}b""#);
        assert_eq!(
            toks,
            vec![TokenKind::Str(vec![
                StrPart::Literal("a".to_string()),
                StrPart::Interp("1+1".to_string()),
                StrPart::Literal("b".to_string()),
            ])]
        );
    }

    #[test]
    fn shebang_line_is_skipped() {
        assert_eq!(tokens("#!/usr/bin/ember\n1"), vec![TokenKind::Int(1)]);
    }

    #[test]
    fn newline_suppressed_inside_brackets() {
        let mut lexer = Lexer::new(Rc::from("t"), "f(\n1\n)");
        let mut saw = Vec::new();
        loop {
            let tok = lexer.next_token().expect("lex ok");
            if tok.kind == TokenKind::Eof {
                break;
            }
            saw.push(tok.preceded_by_newline);
        }
        assert!(saw.iter().all(|b| !b));
    }
}

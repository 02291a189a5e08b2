//! Lexer (spec component C, §4.1): UTF-8 source + module id → `Token` list.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub(crate) fn merge(a: Span, b: Span) -> Span {
        Span { start: a.start, end: b.end }
    }
}

#[derive(Debug, Error)]
#[error("{module}:{}:{}: {msg}", pos.line, pos.col)]
pub struct LexError {
    pub module: String,
    pub pos: Pos,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Eof,
    Ident(String),
    Int(i64),
    Flt(f64),
    Str(String),
    Char(u8),

    // keywords
    KwLet,
    KwFn,
    KwIf,
    KwElif,
    KwElse,
    KwFor,
    KwIn,
    KwWhile,
    KwReturn,
    KwContinue,
    KwBreak,
    KwVoid,
    KwTrue,
    KwFalse,
    KwNil,
    KwOr,
    KwConst,
    KwDefer,
    KwInline,

    // assignment
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    TildeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    NilCoalesceAssign,

    // arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    Root,

    // comparison
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,

    // logical
    AndAnd,
    OrOr,
    Bang,

    // bitwise
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,

    // access / misc
    Dot,
    Arrow,
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    NilCoalesce,
    PlusPlus,
    MinusMinus,
    Ellipsis,
    Comma,
    Semicolon,
    Colon,
    Question,
    At,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokKind,
    pub span: Span,
}

const KEYWORDS: &[(&str, TokKind)] = &[
    ("let", TokKind::KwLet),
    ("fn", TokKind::KwFn),
    ("if", TokKind::KwIf),
    ("elif", TokKind::KwElif),
    ("else", TokKind::KwElse),
    ("for", TokKind::KwFor),
    ("in", TokKind::KwIn),
    ("while", TokKind::KwWhile),
    ("return", TokKind::KwReturn),
    ("continue", TokKind::KwContinue),
    ("break", TokKind::KwBreak),
    ("void", TokKind::KwVoid),
    ("true", TokKind::KwTrue),
    ("false", TokKind::KwFalse),
    ("nil", TokKind::KwNil),
    ("or", TokKind::KwOr),
    ("const", TokKind::KwConst),
    ("defer", TokKind::KwDefer),
    ("inline", TokKind::KwInline),
];

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    i: usize,
    line: u32,
    col: u32,
    module: String,
    module_path: String,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, module: impl Into<String>, module_path: impl Into<String>) -> Self {
        Self { src, bytes: src.as_bytes(), i: 0, line: 1, col: 1, module: module.into(), module_path: module_path.into() }
    }

    pub fn tokenize_all(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let eof = tok.kind == TokKind::Eof;
            out.push(tok);
            if eof {
                break;
            }
        }
        Ok(out)
    }

    fn pos(&self) -> Pos {
        Pos { line: self.line, col: self.col, offset: self.i as u32 }
    }

    fn peek(&self) -> u8 {
        *self.bytes.get(self.i).unwrap_or(&0)
    }

    fn peek2(&self) -> u8 {
        *self.bytes.get(self.i + 1).unwrap_or(&0)
    }

    fn eof(&self) -> bool {
        self.i >= self.bytes.len()
    }

    fn bump(&mut self) -> u8 {
        let c = self.bytes[self.i];
        self.i += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    fn err(&self, pos: Pos, msg: impl Into<String>) -> LexError {
        LexError { module: self.module.clone(), pos, msg: msg.into() }
    }

    fn skip_ws_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'#' => {
                    while !self.eof() && self.peek() != b'\n' {
                        self.bump();
                    }
                }
                b'/' if self.peek2() == b'*' => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    let mut depth = 1usize;
                    while depth > 0 {
                        if self.eof() {
                            return Err(self.err(start, "unterminated block comment"));
                        }
                        if self.peek() == b'/' && self.peek2() == b'*' {
                            self.bump();
                            self.bump();
                            depth += 1;
                        } else if self.peek() == b'*' && self.peek2() == b'/' {
                            self.bump();
                            self.bump();
                            depth -= 1;
                        } else {
                            self.bump();
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_ws_and_comments()?;
        let start = self.pos();
        if self.eof() {
            return Ok(Token { kind: TokKind::Eof, span: Span { start, end: start } });
        }

        let c = self.peek();
        if c.is_ascii_digit() {
            return self.lex_number(start);
        }
        if c == b'.' && self.peek2().is_ascii_alphabetic() {
            return self.lex_string_atom(start);
        }
        if c == b'"' || c == b'\'' || c == b'`' {
            return self.lex_string(start, c);
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return self.lex_ident_or_keyword(start);
        }
        self.lex_punct(start)
    }

    fn lex_ident_or_keyword(&mut self, start: Pos) -> Result<Token, LexError> {
        let begin = self.i;
        while !self.eof() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
            self.bump();
        }
        if self.peek() == b'?' {
            self.bump();
        }
        let text = &self.src[begin..self.i];
        let end = self.pos();
        let span = Span { start, end };

        if text == "__SRC_PATH__" {
            return Ok(Token { kind: TokKind::Str(self.module_path.clone()), span });
        }
        if text == "__SRC_DIR__" {
            let dir = std::path::Path::new(&self.module_path)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Ok(Token { kind: TokKind::Str(dir), span });
        }
        for (kw, kind) in KEYWORDS {
            if *kw == text {
                return Ok(Token { kind: kind.clone(), span });
            }
        }
        Ok(Token { kind: TokKind::Ident(text.to_string()), span })
    }

    fn lex_string_atom(&mut self, start: Pos) -> Result<Token, LexError> {
        self.bump(); // leading '.'
        let begin = self.i;
        while !self.eof() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
            self.bump();
        }
        let text = self.src[begin..self.i].to_string();
        Ok(Token { kind: TokKind::Str(text), span: Span { start, end: self.pos() } })
    }

    fn lex_number(&mut self, start: Pos) -> Result<Token, LexError> {
        let begin = self.i;
        if self.peek() == b'0' && (self.peek2() == b'x' || self.peek2() == b'X') {
            self.bump();
            self.bump();
            while !self.eof() && (self.peek().is_ascii_hexdigit() || self.peek() == b'_') {
                self.bump();
            }
            let text: String = self.src[begin + 2..self.i].chars().filter(|c| *c != '_').collect();
            let val = i64::from_str_radix(&text, 16).map_err(|e| self.err(start, e.to_string()))?;
            return Ok(Token { kind: TokKind::Int(val), span: Span { start, end: self.pos() } });
        }
        if self.peek() == b'0' && (self.peek2() == b'b' || self.peek2() == b'B') {
            self.bump();
            self.bump();
            while !self.eof() && (self.peek() == b'0' || self.peek() == b'1' || self.peek() == b'_') {
                self.bump();
            }
            let text: String = self.src[begin + 2..self.i].chars().filter(|c| *c != '_').collect();
            let val = i64::from_str_radix(&text, 2).map_err(|e| self.err(start, e.to_string()))?;
            return Ok(Token { kind: TokKind::Int(val), span: Span { start, end: self.pos() } });
        }
        // octal: leading 0 followed by another digit.
        if self.peek() == b'0' && self.peek2().is_ascii_digit() {
            self.bump();
            let obegin = self.i;
            while !self.eof() && self.peek().is_ascii_digit() {
                self.bump();
            }
            let text = &self.src[obegin..self.i];
            let val = i64::from_str_radix(text, 8).map_err(|e| self.err(start, e.to_string()))?;
            return Ok(Token { kind: TokKind::Int(val), span: Span { start, end: self.pos() } });
        }

        while !self.eof() && (self.peek().is_ascii_digit() || self.peek() == b'_') {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == b'.' && self.peek2().is_ascii_digit() {
            is_float = true;
            self.bump();
            while !self.eof() && (self.peek().is_ascii_digit() || self.peek() == b'_') {
                self.bump();
            }
        }
        if matches!(self.peek(), b'e' | b'E' | b'd' | b'D' | b'f' | b'F') {
            let save = self.i;
            let exp_letter_pos = self.i;
            self.bump();
            if self.peek() == b'+' || self.peek() == b'-' {
                self.bump();
            }
            if self.peek().is_ascii_digit() {
                is_float = true;
                while !self.eof() && self.peek().is_ascii_digit() {
                    self.bump();
                }
            } else {
                // not actually an exponent (e.g. trailing identifier char): back off.
                self.i = save;
                let _ = exp_letter_pos;
            }
        }
        let text: String = self.src[begin..self.i].chars().filter(|c| *c != '_').collect();
        let end = self.pos();
        if is_float {
            let v: f64 = text.parse().map_err(|_| self.err(start, "invalid float literal"))?;
            Ok(Token { kind: TokKind::Flt(v), span: Span { start, end } })
        } else {
            let v: i64 = text.parse().map_err(|_| self.err(start, "invalid integer literal"))?;
            Ok(Token { kind: TokKind::Int(v), span: Span { start, end } })
        }
    }

    fn lex_string(&mut self, start: Pos, quote: u8) -> Result<Token, LexError> {
        self.bump(); // opening quote
        if self.peek() == b'\n' {
            self.bump();
        }
        let begin = self.i;
        loop {
            if self.eof() {
                return Err(self.err(start, "unterminated string literal"));
            }
            if self.peek() == quote {
                // even number of preceding backslashes terminates the quote.
                let mut backslashes = 0usize;
                let mut j = self.i;
                while j > begin && self.bytes[j - 1] == b'\\' {
                    backslashes += 1;
                    j -= 1;
                }
                if backslashes % 2 == 0 {
                    break;
                }
            }
            self.bump();
        }
        let text = self.src[begin..self.i].to_string();
        self.bump(); // closing quote
        if quote == b'\'' && text.chars().count() == 1 {
            let byte = text.as_bytes()[0];
            return Ok(Token { kind: TokKind::Char(byte), span: Span { start, end: self.pos() } });
        }
        Ok(Token { kind: TokKind::Str(text), span: Span { start, end: self.pos() } })
    }

    fn lex_punct(&mut self, start: Pos) -> Result<Token, LexError> {
        macro_rules! two {
            ($a:expr, $b:expr, $kind:expr) => {
                if self.peek() == $a && self.peek2() == $b {
                    self.bump();
                    self.bump();
                    return Ok(Token { kind: $kind, span: Span { start, end: self.pos() } });
                }
            };
        }
        macro_rules! three {
            ($a:expr, $b:expr, $c:expr, $kind:expr) => {
                if self.peek() == $a && self.peek2() == $b && *self.bytes.get(self.i + 2).unwrap_or(&0) == $c {
                    self.bump();
                    self.bump();
                    self.bump();
                    return Ok(Token { kind: $kind, span: Span { start, end: self.pos() } });
                }
            };
        }

        three!(b'.', b'.', b'.', TokKind::Ellipsis);
        three!(b'<', b'<', b'=', TokKind::ShlAssign);
        three!(b'>', b'>', b'=', TokKind::ShrAssign);

        three!(b'?', b'?', b'=', TokKind::NilCoalesceAssign);
        two!(b'?', b'?', TokKind::NilCoalesce);

        two!(b'+', b'+', TokKind::PlusPlus);
        two!(b'-', b'-', TokKind::MinusMinus);
        two!(b'-', b'>', TokKind::Arrow);
        two!(b'=', b'=', TokKind::EqEq);
        two!(b'!', b'=', TokKind::NotEq);
        two!(b'<', b'=', TokKind::Le);
        two!(b'>', b'=', TokKind::Ge);
        two!(b'&', b'&', TokKind::AndAnd);
        two!(b'|', b'|', TokKind::OrOr);
        two!(b'<', b'<', TokKind::Shl);
        two!(b'>', b'>', TokKind::Shr);
        two!(b'*', b'*', TokKind::Pow);
        two!(b'/', b'/', TokKind::Root);
        two!(b'+', b'=', TokKind::PlusAssign);
        two!(b'-', b'=', TokKind::MinusAssign);
        two!(b'*', b'=', TokKind::StarAssign);
        two!(b'/', b'=', TokKind::SlashAssign);
        two!(b'%', b'=', TokKind::PercentAssign);
        two!(b'&', b'=', TokKind::AmpAssign);
        two!(b'|', b'=', TokKind::PipeAssign);
        two!(b'~', b'=', TokKind::TildeAssign);
        two!(b'^', b'=', TokKind::CaretAssign);

        let c = self.bump();
        let kind = match c {
            b'=' => TokKind::Assign,
            b'+' => TokKind::Plus,
            b'-' => TokKind::Minus,
            b'*' => TokKind::Star,
            b'/' => TokKind::Slash,
            b'%' => TokKind::Percent,
            b'<' => TokKind::Lt,
            b'>' => TokKind::Gt,
            b'&' => TokKind::Amp,
            b'|' => TokKind::Pipe,
            b'^' => TokKind::Caret,
            b'~' => TokKind::Tilde,
            b'!' => TokKind::Bang,
            b'.' => TokKind::Dot,
            b'[' => TokKind::LBracket,
            b']' => TokKind::RBracket,
            b'(' => TokKind::LParen,
            b')' => TokKind::RParen,
            b'{' => TokKind::LBrace,
            b'}' => TokKind::RBrace,
            b',' => TokKind::Comma,
            b';' => TokKind::Semicolon,
            b':' => TokKind::Colon,
            b'?' => TokKind::Question,
            b'@' => TokKind::At,
            other => return Err(self.err(start, format!("unexpected byte {:?}", other as char))),
        };
        Ok(Token { kind, span: Span { start, end: self.pos() } })
    }
}

pub fn tokenize(src: &str, module: &str, module_path: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(src, module, module_path).tokenize_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokKind> {
        tokenize(src, "t", "t.wisp").unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn idents_and_keywords() {
        assert_eq!(kinds("let x fn"), vec![TokKind::KwLet, TokKind::Ident("x".into()), TokKind::KwFn, TokKind::Eof]);
    }

    #[test]
    fn numbers_all_bases() {
        assert_eq!(kinds("0x1F"), vec![TokKind::Int(31), TokKind::Eof]);
        assert_eq!(kinds("0b101"), vec![TokKind::Int(5), TokKind::Eof]);
        assert_eq!(kinds("017"), vec![TokKind::Int(15), TokKind::Eof]);
        assert_eq!(kinds("3.5"), vec![TokKind::Flt(3.5), TokKind::Eof]);
        assert_eq!(kinds("1_000"), vec![TokKind::Int(1000), TokKind::Eof]);
    }

    #[test]
    fn strings_with_escaped_quote() {
        let toks = kinds(r#""a\"b""#);
        assert_eq!(toks, vec![TokKind::Str("a\\\"b".into()), TokKind::Eof]);
    }

    #[test]
    fn nested_block_comments() {
        assert_eq!(kinds("/* a /* b */ c */ 1"), vec![TokKind::Int(1), TokKind::Eof]);
    }

    #[test]
    fn dotted_string_atom() {
        assert_eq!(kinds(".foo"), vec![TokKind::Str("foo".into()), TokKind::Eof]);
    }

    #[test]
    fn operator_set() {
        assert_eq!(
            kinds("+= ** // ?? ??= ... <<="),
            vec![
                TokKind::PlusAssign,
                TokKind::Pow,
                TokKind::Root,
                TokKind::NilCoalesce,
                TokKind::NilCoalesceAssign,
                TokKind::Ellipsis,
                TokKind::ShlAssign,
                TokKind::Eof,
            ]
        );
    }
}

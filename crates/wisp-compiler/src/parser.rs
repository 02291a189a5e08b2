//! Recursive-descent parser (spec component E, §4.2): 17 binary-precedence
//! levels over tokens into an [`AstNode`] tree. `for-in` is desugared here,
//! literally, into the three-clause `for` form the spec prescribes.

use thiserror::Error;
use wisp_core::Loc;

use crate::ast::*;
use crate::lex::{Pos, Span, TokKind, Token};

#[derive(Debug, Error)]
#[error("{module}:{}:{}: {msg}", pos.line, pos.col)]
pub struct ParseError {
    pub module: String,
    pub pos: Pos,
    pub msg: String,
}

pub struct Parser<'a> {
    toks: &'a [Token],
    i: usize,
    module: String,
    module_id: u16,
}

type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    pub fn new(toks: &'a [Token], module: impl Into<String>, module_id: u16) -> Self {
        Self { toks, i: 0, module: module.into(), module_id }
    }

    fn loc(&self, span: Span) -> Loc {
        Loc::new(self.module_id, span.start.offset, span.end.offset)
    }

    fn peek(&self) -> &TokKind {
        &self.toks[self.i.min(self.toks.len() - 1)].kind
    }

    fn peek_span(&self) -> Span {
        self.toks[self.i.min(self.toks.len() - 1)].span
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), TokKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.i.min(self.toks.len() - 1)].clone();
        if self.i < self.toks.len() - 1 {
            self.i += 1;
        }
        t
    }

    fn check(&self, k: &TokKind) -> bool {
        self.peek() == k
    }

    fn eat(&mut self, k: &TokKind) -> bool {
        if self.check(k) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, k: &TokKind, what: &str) -> PResult<Token> {
        if self.check(k) {
            Ok(self.bump())
        } else {
            Err(self.err(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError { module: self.module.clone(), pos: self.peek_span().start, msg: msg.into() }
    }

    fn ident(&mut self) -> PResult<(String, Span)> {
        let span = self.peek_span();
        if let TokKind::Ident(name) = self.peek().clone() {
            self.bump();
            Ok((name, span))
        } else {
            Err(self.err("expected identifier"))
        }
    }

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut body = Vec::new();
        while !self.at_end() {
            body.push(self.parse_stmt()?);
        }
        Ok(Program { body })
    }

    fn parse_block(&mut self) -> PResult<AstNode> {
        let start = self.peek_span();
        self.expect(&TokKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&TokKind::RBrace) && !self.at_end() {
            stmts.push(self.parse_stmt()?);
        }
        let end = self.expect(&TokKind::RBrace, "'}'")?.span;
        Ok(AstNode::new(self.loc(Span::merge(start, end)), NodeKind::Block(stmts)))
    }

    fn parse_stmt(&mut self) -> PResult<AstNode> {
        match self.peek().clone() {
            TokKind::KwLet => self.parse_var_decl(),
            TokKind::KwIf => self.parse_cond(),
            TokKind::KwFor => self.parse_for(),
            TokKind::KwWhile => self.parse_while(),
            TokKind::KwReturn => self.parse_return(),
            TokKind::KwContinue => {
                let span = self.bump().span;
                self.eat(&TokKind::Semicolon);
                Ok(AstNode::new(self.loc(span), NodeKind::Continue))
            }
            TokKind::KwBreak => {
                let span = self.bump().span;
                self.eat(&TokKind::Semicolon);
                Ok(AstNode::new(self.loc(span), NodeKind::Break))
            }
            TokKind::KwDefer => {
                let start = self.bump().span;
                let e = self.parse_expr()?;
                self.eat(&TokKind::Semicolon);
                Ok(AstNode::new(self.loc(start), NodeKind::Defer(Box::new(e))))
            }
            TokKind::LBrace => self.parse_block(),
            _ => {
                let e = self.parse_expr()?;
                self.eat(&TokKind::Semicolon);
                Ok(e)
            }
        }
    }

    fn parse_var_binding(&mut self) -> PResult<VarBinding> {
        let is_const = self.eat(&TokKind::KwConst);
        let (name, span) = self.ident()?;
        let in_val = if self.eat(&TokKind::KwIn) { Some(Box::new(self.parse_expr_level(3)?)) } else { None };
        let init = if self.eat(&TokKind::Assign) { Some(Box::new(self.parse_expr_level(3)?)) } else { None };
        Ok(VarBinding { name, is_const, in_val, init, loc: self.loc(span) })
    }

    fn parse_var_decl(&mut self) -> PResult<AstNode> {
        let start = self.bump().span; // 'let'
        let mut vars = vec![self.parse_var_binding()?];
        while self.eat(&TokKind::Comma) {
            vars.push(self.parse_var_binding()?);
        }
        self.eat(&TokKind::Semicolon);
        Ok(AstNode::new(self.loc(start), NodeKind::VarDecl(vars)))
    }

    fn parse_cond(&mut self) -> PResult<AstNode> {
        let start = self.bump().span; // 'if'
        let mut arms = Vec::new();
        let cond0 = self.parse_expr_level(4)?;
        let body0 = self.parse_block()?;
        arms.push((cond0, body0));
        loop {
            if self.eat(&TokKind::KwElif) {
                let c = self.parse_expr_level(4)?;
                let b = self.parse_block()?;
                arms.push((c, b));
            } else {
                break;
            }
        }
        let else_body = if self.eat(&TokKind::KwElse) { Some(Box::new(self.parse_block()?)) } else { None };
        Ok(AstNode::new(self.loc(start), NodeKind::Cond { arms, else_body }))
    }

    fn parse_while(&mut self) -> PResult<AstNode> {
        let start = self.bump().span; // 'while'
        let cond = self.parse_expr_level(3)?;
        let body = self.parse_block()?;
        Ok(AstNode::new(
            self.loc(start),
            NodeKind::For { init: None, cond: Some(Box::new(cond)), step: None, body: Box::new(body) },
        ))
    }

    fn parse_for(&mut self) -> PResult<AstNode> {
        let start = self.bump().span; // 'for'

        // `for IDEN in Expr { .. }` — for-in form, desugared on the spot.
        if let TokKind::Ident(name) = self.peek().clone() {
            let save = self.i;
            self.bump();
            if self.eat(&TokKind::KwIn) {
                let iter = self.parse_expr_level(1)?;
                let body = self.parse_block()?;
                return Ok(self.desugar_for_in(self.loc(start), name, iter, body));
            }
            self.i = save;
        }

        let init = if self.check(&TokKind::Semicolon) {
            None
        } else if self.check(&TokKind::KwLet) {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            let e = self.parse_expr()?;
            self.eat(&TokKind::Semicolon);
            Some(Box::new(e))
        };
        if init.is_none() {
            self.expect(&TokKind::Semicolon, "';'")?;
        }
        let cond = if self.check(&TokKind::Semicolon) { None } else { Some(Box::new(self.parse_expr()?)) };
        self.expect(&TokKind::Semicolon, "';'")?;
        let step = if self.check(&TokKind::LBrace) { None } else { Some(Box::new(self.parse_expr()?)) };
        let body = self.parse_block()?;
        Ok(AstNode::new(self.loc(start), NodeKind::For { init, cond, step, body: Box::new(body) }))
    }

    /// Implements spec §4.2's literal for-in expansion:
    /// ```text
    /// for E in X { BODY }
    /// =>
    /// {
    ///   let E_interm = X;
    ///   for let _E = E_interm.begin(); _E != E_interm.end(); _E = E_interm.next(_E) {
    ///     let E = E_interm.at(_E);
    ///     BODY
    ///   }
    /// }
    /// ```
    fn desugar_for_in(&self, loc: Loc, var: String, iter: AstNode, body: AstNode) -> AstNode {
        let interm = format!("{var}_interm");
        let cursor = format!("_{var}");

        let call0 = |recv: &str, method: &str| -> AstNode {
            AstNode::new(
                loc,
                NodeKind::MemberCall {
                    recv: Box::new(AstNode::new(loc, NodeKind::Ident(recv.to_string()))),
                    name: method.to_string(),
                    args: vec![],
                },
            )
        };
        let call1 = |recv: &str, method: &str, arg: AstNode| -> AstNode {
            AstNode::new(
                loc,
                NodeKind::MemberCall {
                    recv: Box::new(AstNode::new(loc, NodeKind::Ident(recv.to_string()))),
                    name: method.to_string(),
                    args: vec![Arg { style: ArgStyle::Positional, name: None, value: Box::new(arg) }],
                },
            )
        };

        let outer_let = AstNode::new(
            loc,
            NodeKind::VarDecl(vec![VarBinding {
                name: interm.clone(),
                is_const: false,
                in_val: None,
                init: Some(Box::new(iter)),
                loc,
            }]),
        );

        let init = AstNode::new(
            loc,
            NodeKind::VarDecl(vec![VarBinding {
                name: cursor.clone(),
                is_const: false,
                in_val: None,
                init: Some(Box::new(call0(&interm, "begin"))),
                loc,
            }]),
        );
        let cond = AstNode::new(
            loc,
            NodeKind::Binary {
                op: BinOp::Ne,
                lhs: Box::new(AstNode::new(loc, NodeKind::Ident(cursor.clone()))),
                rhs: Box::new(call0(&interm, "end")),
            },
        );
        let step = AstNode::new(
            loc,
            NodeKind::Assign {
                lhs: Box::new(AstNode::new(loc, NodeKind::Ident(cursor.clone()))),
                rhs: Box::new(call1(&interm, "next", AstNode::new(loc, NodeKind::Ident(cursor.clone())))),
            },
        );

        let bind_elem = AstNode::new(
            loc,
            NodeKind::VarDecl(vec![VarBinding {
                name: var,
                is_const: false,
                in_val: None,
                init: Some(Box::new(call1(&interm, "at", AstNode::new(loc, NodeKind::Ident(cursor.clone()))))),
                loc,
            }]),
        );
        let mut inner_stmts = vec![bind_elem];
        if let NodeKind::Block(stmts) = body.kind {
            inner_stmts.extend(stmts);
        } else {
            inner_stmts.push(body);
        }
        let inner_body = AstNode::new(loc, NodeKind::Block(inner_stmts));

        let for_loop = AstNode::new(
            loc,
            NodeKind::For {
                init: Some(Box::new(init)),
                cond: Some(Box::new(cond)),
                step: Some(Box::new(step)),
                body: Box::new(inner_body),
            },
        );

        AstNode::new(loc, NodeKind::Block(vec![outer_let, for_loop]))
    }

    fn parse_return(&mut self) -> PResult<AstNode> {
        let start = self.bump().span; // 'return'
        let val = if self.check(&TokKind::Semicolon) || self.check(&TokKind::RBrace) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.eat(&TokKind::Semicolon);
        Ok(AstNode::new(self.loc(start), NodeKind::Ret(val)))
    }

    // ---- expressions, precedence-leveled per spec §4.2 ----

    fn parse_expr(&mut self) -> PResult<AstNode> {
        self.parse_expr_level(0)
    }

    /// Level 0 = Expr17 (',' chaining) down to level 16 ≈ unary.
    /// Callers that must not swallow a top-level comma (argument lists,
    /// loop clauses) start at level 1 or deeper.
    fn parse_expr_level(&mut self, min_level: u8) -> PResult<AstNode> {
        if min_level == 0 {
            return self.parse_comma();
        }
        self.parse_ternary()
    }

    fn parse_comma(&mut self) -> PResult<AstNode> {
        let start = self.peek_span();
        let first = self.parse_ternary()?;
        if !self.check(&TokKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokKind::Comma) {
            items.push(self.parse_ternary()?);
        }
        Ok(AstNode::new(self.loc(start), NodeKind::Comma(items)))
    }

    fn parse_ternary(&mut self) -> PResult<AstNode> {
        let start = self.peek_span();
        let cond = self.parse_assign()?;
        if self.eat(&TokKind::Question) {
            let then = self.parse_assign()?;
            self.expect(&TokKind::Colon, "':'")?;
            let els = self.parse_assign()?;
            return Ok(AstNode::new(
                self.loc(start),
                NodeKind::Ternary { cond: Box::new(cond), then: Box::new(then), els: Box::new(els) },
            ));
        }
        Ok(cond)
    }

    fn parse_assign(&mut self) -> PResult<AstNode> {
        let start = self.peek_span();
        let lhs = self.parse_op_assign()?;
        if self.eat(&TokKind::Assign) {
            let rhs = self.parse_assign()?;
            return Ok(AstNode::new(self.loc(start), NodeKind::Assign { lhs: Box::new(lhs), rhs: Box::new(rhs) }));
        }
        Ok(lhs)
    }

    fn op_assign_kind(k: &TokKind) -> Option<BinOp> {
        Some(match k {
            TokKind::PlusAssign => BinOp::Add,
            TokKind::MinusAssign => BinOp::Sub,
            TokKind::StarAssign => BinOp::Mul,
            TokKind::SlashAssign => BinOp::Div,
            TokKind::PercentAssign => BinOp::Mod,
            TokKind::AmpAssign => BinOp::BitAnd,
            TokKind::PipeAssign => BinOp::BitOr,
            TokKind::CaretAssign => BinOp::BitXor,
            TokKind::ShlAssign => BinOp::Shl,
            TokKind::ShrAssign => BinOp::Shr,
            TokKind::NilCoalesceAssign => BinOp::NilCoalesce,
            _ => return None,
        })
    }

    fn parse_op_assign(&mut self) -> PResult<AstNode> {
        let start = self.peek_span();
        let lhs = self.parse_try_or()?;
        if let Some(op) = Self::op_assign_kind(self.peek()) {
            self.bump();
            let rhs = self.parse_try_or()?;
            return Ok(AstNode::new(self.loc(start), NodeKind::OpAssign { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }));
        }
        Ok(lhs)
    }

    fn parse_try_or(&mut self) -> PResult<AstNode> {
        let start = self.peek_span();
        let expr = self.parse_logic_or()?;
        if self.eat(&TokKind::KwOr) {
            let name = if let TokKind::Ident(n) = self.peek().clone() {
                self.bump();
                Some(n)
            } else {
                None
            };
            let handler = self.parse_block()?;
            return Ok(AstNode::new(
                self.loc(start),
                NodeKind::TryOr { expr: Box::new(expr), name, handler: Box::new(handler) },
            ));
        }
        Ok(expr)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> PResult<AstNode>,
        ops: &[(TokKind, BinOp)],
    ) -> PResult<AstNode> {
        let start = self.peek_span();
        let mut lhs = next(self)?;
        loop {
            let mut matched = None;
            for (tok, op) in ops {
                if self.check(tok) {
                    matched = Some(*op);
                    break;
                }
            }
            let Some(op) = matched else { break };
            self.bump();
            let rhs = next(self)?;
            lhs = AstNode::new(self.loc(start), NodeKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) });
        }
        Ok(lhs)
    }

    fn parse_logic_or(&mut self) -> PResult<AstNode> {
        self.binary_level(Self::parse_logic_and, &[(TokKind::OrOr, BinOp::Or)])
    }
    fn parse_logic_and(&mut self) -> PResult<AstNode> {
        self.binary_level(Self::parse_bit_or, &[(TokKind::AndAnd, BinOp::And)])
    }
    fn parse_bit_or(&mut self) -> PResult<AstNode> {
        self.binary_level(Self::parse_bit_xor, &[(TokKind::Pipe, BinOp::BitOr)])
    }
    fn parse_bit_xor(&mut self) -> PResult<AstNode> {
        self.binary_level(Self::parse_bit_and, &[(TokKind::Caret, BinOp::BitXor)])
    }
    fn parse_bit_and(&mut self) -> PResult<AstNode> {
        self.binary_level(Self::parse_equality, &[(TokKind::Amp, BinOp::BitAnd)])
    }
    fn parse_equality(&mut self) -> PResult<AstNode> {
        self.binary_level(Self::parse_relational, &[(TokKind::EqEq, BinOp::Eq), (TokKind::NotEq, BinOp::Ne)])
    }
    fn parse_relational(&mut self) -> PResult<AstNode> {
        self.binary_level(
            Self::parse_shift,
            &[(TokKind::Le, BinOp::Le), (TokKind::Ge, BinOp::Ge), (TokKind::Lt, BinOp::Lt), (TokKind::Gt, BinOp::Gt)],
        )
    }
    fn parse_shift(&mut self) -> PResult<AstNode> {
        self.binary_level(Self::parse_additive, &[(TokKind::Shl, BinOp::Shl), (TokKind::Shr, BinOp::Shr)])
    }
    fn parse_additive(&mut self) -> PResult<AstNode> {
        self.binary_level(Self::parse_multiplicative, &[(TokKind::Plus, BinOp::Add), (TokKind::Minus, BinOp::Sub)])
    }
    fn parse_multiplicative(&mut self) -> PResult<AstNode> {
        self.binary_level(
            Self::parse_power,
            &[(TokKind::Star, BinOp::Mul), (TokKind::Slash, BinOp::Div), (TokKind::Percent, BinOp::Mod)],
        )
    }
    fn parse_power(&mut self) -> PResult<AstNode> {
        self.binary_level(Self::parse_unary_prefix, &[(TokKind::Pow, BinOp::Pow), (TokKind::Root, BinOp::Root)])
    }

    fn parse_unary_prefix(&mut self) -> PResult<AstNode> {
        let start = self.peek_span();
        let op = match self.peek() {
            TokKind::PlusPlus => Some(UnOp::Inc),
            TokKind::MinusMinus => Some(UnOp::Dec),
            TokKind::Plus => Some(UnOp::Plus),
            TokKind::Minus => Some(UnOp::Neg),
            TokKind::Star => Some(UnOp::Spread),
            TokKind::Amp => Some(UnOp::Spread),
            TokKind::Bang => Some(UnOp::Not),
            TokKind::Tilde => Some(UnOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            // fold consecutive unary minus/plus on a literal into its value.
            if matches!(op, UnOp::Neg | UnOp::Plus) {
                if let TokKind::Int(n) = self.peek().clone() {
                    self.bump();
                    let v = if op == UnOp::Neg { -n } else { n };
                    return self.parse_postfix_from(AstNode::new(self.loc(start), NodeKind::Simple(Literal::Int(v))));
                }
                if let TokKind::Flt(n) = self.peek().clone() {
                    self.bump();
                    let v = if op == UnOp::Neg { -n } else { n };
                    return self.parse_postfix_from(AstNode::new(self.loc(start), NodeKind::Simple(Literal::Flt(v))));
                }
            }
            let operand = self.parse_unary_prefix()?;
            return Ok(AstNode::new(self.loc(start), NodeKind::Unary { op, operand: Box::new(operand), postfix: false }));
        }
        self.parse_unary_postfix()
    }

    fn parse_unary_postfix(&mut self) -> PResult<AstNode> {
        let start = self.peek_span();
        let addr = self.eat(&TokKind::At);
        let primary = self.parse_suffixed_primary()?;
        let node = if addr { AstNode::new(self.loc(start), NodeKind::AddrOf(Box::new(primary))) } else { primary };
        self.parse_postfix_from(node)
    }

    fn parse_postfix_from(&mut self, node: AstNode) -> PResult<AstNode> {
        let start = node.loc;
        if self.eat(&TokKind::PlusPlus) {
            return Ok(AstNode::new(start, NodeKind::Unary { op: UnOp::Inc, operand: Box::new(node), postfix: true }));
        }
        if self.eat(&TokKind::MinusMinus) {
            return Ok(AstNode::new(start, NodeKind::Unary { op: UnOp::Dec, operand: Box::new(node), postfix: true }));
        }
        if self.eat(&TokKind::Ellipsis) {
            return Ok(AstNode::new(start, NodeKind::Unary { op: UnOp::Spread, operand: Box::new(node), postfix: true }));
        }
        Ok(node)
    }

    fn parse_args(&mut self, close: &TokKind) -> PResult<Vec<Arg>> {
        let mut args = Vec::new();
        if self.check(close) {
            return Ok(args);
        }
        loop {
            let unpack = self.eat(&TokKind::Star);
            if let TokKind::Ident(name) = self.peek().clone() {
                let save = self.i;
                self.bump();
                if self.eat(&TokKind::Assign) {
                    let value = self.parse_ternary()?;
                    args.push(Arg { style: ArgStyle::Keyword, name: Some(name), value: Box::new(value) });
                    if !self.eat(&TokKind::Comma) {
                        break;
                    }
                    continue;
                }
                self.i = save;
            }
            let value = self.parse_ternary()?;
            let style = if unpack { ArgStyle::Unpack } else { ArgStyle::Positional };
            args.push(Arg { style, name: None, value: Box::new(value) });
            if !self.eat(&TokKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_suffixed_primary(&mut self) -> PResult<AstNode> {
        let mut node = self.parse_primary()?;
        loop {
            let start = node.loc;
            if self.eat(&TokKind::LBracket) {
                let index = self.parse_expr_level(3)?;
                self.expect(&TokKind::RBracket, "']'")?;
                node = AstNode::new(start, NodeKind::Subscript { recv: Box::new(node), index: Box::new(index) });
                continue;
            }
            if self.check(&TokKind::LParen) {
                self.bump();
                let args = self.parse_args(&TokKind::RParen)?;
                self.expect(&TokKind::RParen, "')'")?;
                node = match node.kind {
                    NodeKind::Member { recv, name } => {
                        NodeKind::MemberCall { recv, name, args }
                    }
                    other => NodeKind::Call { callee: Box::new(AstNode::new(start, other)), args },
                }
                .pipe(|k| AstNode::new(start, k));
                continue;
            }
            if self.check(&TokKind::LBrace) {
                self.bump();
                let args = self.parse_args(&TokKind::RBrace)?;
                self.expect(&TokKind::RBrace, "'}'")?;
                node = AstNode::new(start, NodeKind::StructCall { callee: Box::new(node), args });
                continue;
            }
            if self.eat(&TokKind::Dot) || self.eat(&TokKind::Arrow) {
                let (name, _) = self.ident()?;
                node = AstNode::new(start, NodeKind::Member { recv: Box::new(node), name });
                continue;
            }
            break;
        }
        Ok(node)
    }

    fn parse_fn_sig(&mut self) -> PResult<AstNode> {
        let start = self.bump().span; // 'fn'
        self.expect(&TokKind::LParen, "'('")?;
        let mut params = Vec::new();
        let mut variadic = false;
        if !self.check(&TokKind::RParen) {
            loop {
                if self.eat(&TokKind::Ellipsis) {
                    variadic = true;
                    break;
                }
                params.push(self.parse_var_binding()?);
                if !self.eat(&TokKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokKind::RParen, "')'")?;
        Ok(AstNode::new(self.loc(start), NodeKind::FnSig { params, variadic, kw_arg: None }))
    }

    fn parse_primary(&mut self) -> PResult<AstNode> {
        let span = self.peek_span();
        match self.peek().clone() {
            TokKind::Int(n) => {
                self.bump();
                Ok(AstNode::new(self.loc(span), NodeKind::Simple(Literal::Int(n))))
            }
            TokKind::Flt(n) => {
                self.bump();
                Ok(AstNode::new(self.loc(span), NodeKind::Simple(Literal::Flt(n))))
            }
            TokKind::Str(s) => {
                self.bump();
                Ok(AstNode::new(self.loc(span), NodeKind::Simple(Literal::Str(s))))
            }
            TokKind::Char(c) => {
                self.bump();
                Ok(AstNode::new(self.loc(span), NodeKind::Simple(Literal::Char(c))))
            }
            TokKind::KwTrue => {
                self.bump();
                Ok(AstNode::new(self.loc(span), NodeKind::Simple(Literal::Bool(true))))
            }
            TokKind::KwFalse => {
                self.bump();
                Ok(AstNode::new(self.loc(span), NodeKind::Simple(Literal::Bool(false))))
            }
            TokKind::KwNil | TokKind::KwVoid => {
                self.bump();
                Ok(AstNode::new(self.loc(span), NodeKind::Simple(Literal::Nil)))
            }
            TokKind::Ident(name) => {
                self.bump();
                // prefix-literal sugar: `name"text"` / `name 1`
                if let TokKind::Str(s) = self.peek().clone() {
                    self.bump();
                    let callee = AstNode::new(self.loc(span), NodeKind::Ident(name));
                    let arg = AstNode::new(self.loc(span), NodeKind::Simple(Literal::Str(s)));
                    return Ok(AstNode::new(
                        self.loc(span),
                        NodeKind::Call { callee: Box::new(callee), args: vec![Arg { style: ArgStyle::Positional, name: None, value: Box::new(arg) }] },
                    ));
                }
                Ok(AstNode::new(self.loc(span), NodeKind::Ident(name)))
            }
            TokKind::KwFn => {
                let sig = self.parse_fn_sig()?;
                let body = self.parse_block()?;
                Ok(AstNode::new(self.loc(span), NodeKind::FnDef { name: None, sig: Box::new(sig), body: Box::new(body) }))
            }
            TokKind::LParen => {
                self.bump();
                let e = self.parse_expr()?;
                self.expect(&TokKind::RParen, "')'")?;
                Ok(e)
            }
            other => Err(self.err(format!("unexpected token in expression: {other:?}"))),
        }
    }
}

/// Tiny pipe helper so `match` arms above can build a node from a `NodeKind`
/// without repeating `AstNode::new(start, ...)` at every arm.
trait Pipe: Sized {
    fn pipe<T>(self, f: impl FnOnce(Self) -> T) -> T {
        f(self)
    }
}
impl<T> Pipe for T {}

pub fn parse(toks: &[Token], module: &str, module_id: u16) -> PResult<Program> {
    Parser::new(toks, module, module_id).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize;

    fn parse_src(src: &str) -> Program {
        let toks = tokenize(src, "t", "t.wisp").unwrap();
        parse(&toks, "t", 0).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        let prog = parse_src("2 + 3 * 4;");
        assert_eq!(prog.body.len(), 1);
        match &prog.body[0].kind {
            NodeKind::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, NodeKind::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn for_in_desugars_to_block_with_three_clause_for() {
        let prog = parse_src("for e in v { s += e; }");
        match &prog.body[0].kind {
            NodeKind::Block(stmts) => {
                assert_eq!(stmts.len(), 2);
                assert!(matches!(stmts[0].kind, NodeKind::VarDecl(_)));
                assert!(matches!(stmts[1].kind, NodeKind::For { .. }));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn try_or_handler() {
        let prog = parse_src("let r = (1 / 0) or err { err };");
        if let NodeKind::VarDecl(vars) = &prog.body[0].kind {
            let init = vars[0].init.as_ref().unwrap();
            assert!(matches!(init.kind, NodeKind::TryOr { .. }));
        } else {
            panic!("expected var decl");
        }
    }

    #[test]
    fn struct_call_and_member_access() {
        let prog = parse_src("p.x + p.y;");
        assert!(matches!(prog.body[0].kind, NodeKind::Binary { op: BinOp::Add, .. }));
    }

    #[test]
    fn unary_minus_folds_into_literal() {
        // a single `-` directly ahead of an int literal folds in the parser
        // itself (parse_unary_prefix's literal-fold shortcut); `--` lexes as
        // one `MinusMinus` token (prefix decrement) and takes a different path.
        let prog = parse_src("-5;");
        assert!(matches!(prog.body[0].kind, NodeKind::Simple(Literal::Int(-5))));
    }

    #[test]
    fn double_unary_minus_does_not_fold_in_the_parser() {
        // the fold shortcut only looks one token ahead, so a second, separate
        // `-` (note the space so the lexer emits two `Minus` tokens rather
        // than one `MinusMinus`) wraps the already-folded inner literal in a
        // `Unary` node instead of folding all the way through; constant
        // folding across nested unary ops is the simplify pass's job, not
        // the parser's.
        let prog = parse_src("- -5;");
        match &prog.body[0].kind {
            NodeKind::Unary { op: UnOp::Neg, operand, postfix: false } => {
                assert!(matches!(operand.kind, NodeKind::Simple(Literal::Int(5))));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }
}

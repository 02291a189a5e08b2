//! Simplify pass (spec component F, §4.3): constant folding over
//! literal-only expressions, and hoisting of `defer` statements to their
//! enclosing block's exits.
//!
//! Runs as a single recursive tree walk, bottom-up: children are simplified
//! first, so a fold at an outer node always sees already-folded operands.

use thiserror::Error;
use wisp_core::Loc;

use crate::ast::*;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SimplifyError(pub String);

type SResult<T> = Result<T, SimplifyError>;

pub fn simplify_program(prog: Program) -> SResult<Program> {
    let mut s = Simplifier { defer_stack: Vec::new() };
    let body = s.block(prog.body, false)?;
    Ok(Program { body })
}

/// One block's defer bookkeeping while it's being walked. `pending` holds
/// deferred expressions in registration order; `is_loop` marks the layer
/// pushed for a `for`/`while` body, the boundary `break`/`continue` must
/// not drain past (spec §4.3, mirroring the original `DeferStack` design's
/// loop-boundary sentinel).
struct DeferLayer {
    pending: Vec<AstNode>,
    is_loop: bool,
}

/// `defer_stack` holds one [`DeferLayer`] per block currently open on the
/// path from the function body down to the statement being simplified —
/// not just the innermost block. A `return` drains every layer on the
/// stack (the whole current function); `break`/`continue` drain from the
/// top down to and including the nearest `is_loop` layer. Entering a
/// nested function (`FnDef`) swaps in a fresh, empty stack so an inner
/// closure's defers never leak into an outer function's exits.
struct Simplifier {
    defer_stack: Vec<DeferLayer>,
}

impl Simplifier {
    fn stmt(&mut self, node: AstNode) -> SResult<AstNode> {
        let loc = node.loc;
        let kind = match node.kind {
            NodeKind::Block(stmts) => NodeKind::Block(self.block(stmts, false)?),
            NodeKind::VarDecl(vars) => {
                let vars = vars
                    .into_iter()
                    .map(|mut v| -> SResult<VarBinding> {
                        if let Some(init) = v.init {
                            v.init = Some(Box::new(self.expr(*init)?));
                        }
                        if let Some(in_val) = v.in_val {
                            v.in_val = Some(Box::new(self.expr(*in_val)?));
                        }
                        Ok(v)
                    })
                    .collect::<SResult<Vec<_>>>()?;
                NodeKind::VarDecl(vars)
            }
            NodeKind::Cond { arms, else_body } => {
                let arms = arms
                    .into_iter()
                    .map(|(c, b)| -> SResult<(AstNode, AstNode)> { Ok((self.expr(c)?, self.stmt(b)?)) })
                    .collect::<SResult<Vec<_>>>()?;
                let else_body = else_body.map(|b| self.stmt(*b)).transpose()?.map(Box::new);
                NodeKind::Cond { arms, else_body }
            }
            NodeKind::For { init, cond, step, body } => NodeKind::For {
                init: init.map(|n| self.stmt(*n)).transpose()?.map(Box::new),
                cond: cond.map(|n| self.expr(*n)).transpose()?.map(Box::new),
                step: step.map(|n| self.expr(*n)).transpose()?.map(Box::new),
                body: Box::new(self.loop_body(*body)?),
            },
            NodeKind::ForIn { .. } => {
                return Err(SimplifyError("for-in survived parsing without desugaring".into()))
            }
            NodeKind::Ret(v) => NodeKind::Ret(v.map(|n| self.expr(*n)).transpose()?.map(Box::new)),
            NodeKind::Defer(e) => NodeKind::Defer(Box::new(self.expr(*e)?)),
            NodeKind::FnDef { name, sig, body } => {
                NodeKind::FnDef { name, sig, body: Box::new(self.fn_body(*body)?) }
            }
            other => return self.expr(AstNode::new(loc, other)),
        };
        Ok(AstNode::new(loc, kind))
    }

    fn expr(&mut self, node: AstNode) -> SResult<AstNode> {
        let loc = node.loc;
        let kind = match node.kind {
            NodeKind::Block(stmts) => NodeKind::Block(self.block(stmts, false)?),
            NodeKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(*lhs)?;
                let rhs = self.expr(*rhs)?;
                return Ok(fold_binary(loc, op, lhs, rhs));
            }
            NodeKind::Unary { op, operand, postfix } => {
                let operand = self.expr(*operand)?;
                return Ok(fold_unary(loc, op, operand, postfix));
            }
            NodeKind::Ternary { cond, then, els } => NodeKind::Ternary {
                cond: Box::new(self.expr(*cond)?),
                then: Box::new(self.expr(*then)?),
                els: Box::new(self.expr(*els)?),
            },
            NodeKind::Assign { lhs, rhs } => {
                NodeKind::Assign { lhs: Box::new(self.expr(*lhs)?), rhs: Box::new(self.expr(*rhs)?) }
            }
            NodeKind::OpAssign { op, lhs, rhs } => {
                NodeKind::OpAssign { op, lhs: Box::new(self.expr(*lhs)?), rhs: Box::new(self.expr(*rhs)?) }
            }
            NodeKind::TryOr { expr, name, handler } => NodeKind::TryOr {
                expr: Box::new(self.expr(*expr)?),
                name,
                handler: Box::new(self.stmt(*handler)?),
            },
            NodeKind::Comma(items) => NodeKind::Comma(items.into_iter().map(|n| self.expr(n)).collect::<SResult<_>>()?),
            NodeKind::Call { callee, args } => {
                NodeKind::Call { callee: Box::new(self.expr(*callee)?), args: self.args(args)? }
            }
            NodeKind::MemberCall { recv, name, args } => {
                NodeKind::MemberCall { recv: Box::new(self.expr(*recv)?), name, args: self.args(args)? }
            }
            NodeKind::StructCall { callee, args } => {
                NodeKind::StructCall { callee: Box::new(self.expr(*callee)?), args: self.args(args)? }
            }
            NodeKind::Subscript { recv, index } => {
                NodeKind::Subscript { recv: Box::new(self.expr(*recv)?), index: Box::new(self.expr(*index)?) }
            }
            NodeKind::Member { recv, name } => NodeKind::Member { recv: Box::new(self.expr(*recv)?), name },
            NodeKind::AddrOf(e) => NodeKind::AddrOf(Box::new(self.expr(*e)?)),
            NodeKind::FnDef { name, sig, body } => {
                NodeKind::FnDef { name, sig, body: Box::new(self.fn_body(*body)?) }
            }
            other => other,
        };
        Ok(AstNode::new(loc, kind))
    }

    fn args(&mut self, args: Vec<Arg>) -> SResult<Vec<Arg>> {
        args.into_iter()
            .map(|a| -> SResult<Arg> { Ok(Arg { value: Box::new(self.expr(*a.value)?), ..a }) })
            .collect()
    }

    /// Simplifies a `for`/`while` body with its block tagged as a loop
    /// boundary. The grammar always parses loop bodies as `Block`s; the
    /// `other` arm is a defensive fallback, not a real grammar shape.
    fn loop_body(&mut self, node: AstNode) -> SResult<AstNode> {
        let loc = node.loc;
        match node.kind {
            NodeKind::Block(stmts) => Ok(AstNode::new(loc, NodeKind::Block(self.block(stmts, true)?))),
            other => self.stmt(AstNode::new(loc, other)),
        }
    }

    /// Simplifies a function (or closure) body with a fresh defer stack, so
    /// a `return` inside it never drains an enclosing function's layers.
    fn fn_body(&mut self, body: AstNode) -> SResult<AstNode> {
        let saved = std::mem::take(&mut self.defer_stack);
        let result = self.stmt(body);
        self.defer_stack = saved;
        result
    }

    /// Hoists `defer` statements within one block (spec §4.3): collected in
    /// registration order, re-inserted in reverse immediately before every
    /// `return`/`break`/`continue` that exits through this block, or
    /// appended at the block's end if it doesn't statically end in one of
    /// those. A nested block (an `if` arm, a loop body) pushes its own
    /// layer on top of `defer_stack` before walking its own statements, so
    /// an exit several levels down still sees every still-open outer
    /// layer — not just the statements directly in its own list.
    ///
    /// `return` drains every open layer (the whole current function);
    /// `break`/`continue` drain only down to and including the nearest
    /// layer marked `is_loop`, leaving defers registered further out
    /// pending until the loop itself eventually exits or the enclosing
    /// block ends.
    fn block(&mut self, stmts: Vec<AstNode>, is_loop: bool) -> SResult<Vec<AstNode>> {
        self.defer_stack.push(DeferLayer { pending: Vec::new(), is_loop });
        let mut out = Vec::with_capacity(stmts.len());

        for stmt in stmts {
            match stmt.kind {
                NodeKind::Defer(e) => {
                    let e = self.expr(*e)?;
                    self.defer_stack.last_mut().expect("layer pushed above").pending.push(e);
                }
                NodeKind::Ret(v) => {
                    let v = v.map(|n| self.expr(*n)).transpose()?.map(Box::new);
                    self.drain_open_defers(&mut out, false);
                    out.push(AstNode::new(stmt.loc, NodeKind::Ret(v)));
                }
                NodeKind::Break => {
                    self.drain_open_defers(&mut out, true);
                    out.push(AstNode::new(stmt.loc, NodeKind::Break));
                }
                NodeKind::Continue => {
                    self.drain_open_defers(&mut out, true);
                    out.push(AstNode::new(stmt.loc, NodeKind::Continue));
                }
                // Statements after an unconditional exit are unreachable for
                // this block's defer bookkeeping; codegen still emits them
                // faithfully, so keep walking instead of stopping early.
                _ => out.push(self.stmt(stmt)?),
            }
        }

        let layer = self.defer_stack.pop().expect("layer pushed above");
        if !matches!(out.last().map(|n| &n.kind), Some(NodeKind::Ret(_) | NodeKind::Break | NodeKind::Continue)) {
            for d in layer.pending.iter().rev() {
                out.push(d.clone());
            }
        }
        Ok(out)
    }

    /// Appends, in exit order, the pending defers of every layer from the
    /// innermost open block down to (for `break`/`continue`) the nearest
    /// loop boundary, or (for `return`) all the way to the function body.
    fn drain_open_defers(&self, out: &mut Vec<AstNode>, stop_at_loop: bool) {
        for layer in self.defer_stack.iter().rev() {
            for d in layer.pending.iter().rev() {
                out.push(d.clone());
            }
            if stop_at_loop && layer.is_loop {
                break;
            }
        }
    }
}

fn as_int(n: &AstNode) -> Option<i64> {
    match &n.kind {
        NodeKind::Simple(Literal::Int(v)) => Some(*v),
        _ => None,
    }
}
fn as_flt(n: &AstNode) -> Option<f64> {
    match &n.kind {
        NodeKind::Simple(Literal::Flt(v)) => Some(*v),
        NodeKind::Simple(Literal::Int(v)) => Some(*v as f64),
        _ => None,
    }
}
fn as_bool(n: &AstNode) -> Option<bool> {
    match &n.kind {
        NodeKind::Simple(Literal::Bool(v)) => Some(*v),
        _ => None,
    }
}
fn is_float_literal(n: &AstNode) -> bool {
    matches!(n.kind, NodeKind::Simple(Literal::Flt(_)))
}

/// Folds `lhs op rhs` when both sides are literal `Simple` nodes of
/// matching arithmetic/logical shape; otherwise rebuilds the `Binary` node
/// unchanged.
fn fold_binary(loc: Loc, op: BinOp, lhs: AstNode, rhs: AstNode) -> AstNode {
    let rebuild = |lhs, rhs| AstNode::new(loc, NodeKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) });

    if is_float_literal(&lhs) || is_float_literal(&rhs) {
        if let (Some(a), Some(b)) = (as_flt(&lhs), as_flt(&rhs)) {
            if let Some(v) = fold_flt_arith(op, a, b) {
                return AstNode::new(loc, NodeKind::Simple(Literal::Flt(v)));
            }
            if let Some(v) = fold_flt_cmp(op, a, b) {
                return AstNode::new(loc, NodeKind::Simple(Literal::Bool(v)));
            }
        }
        return rebuild(lhs, rhs);
    }

    if let (Some(a), Some(b)) = (as_int(&lhs), as_int(&rhs)) {
        if let Some(v) = fold_int_arith(op, a, b) {
            return AstNode::new(loc, NodeKind::Simple(Literal::Int(v)));
        }
        if let Some(v) = fold_int_cmp(op, a, b) {
            return AstNode::new(loc, NodeKind::Simple(Literal::Bool(v)));
        }
        if let Some(v) = fold_int_bitwise(op, a, b) {
            return AstNode::new(loc, NodeKind::Simple(Literal::Int(v)));
        }
    }

    if let (Some(a), Some(b)) = (as_bool(&lhs), as_bool(&rhs)) {
        match op {
            BinOp::And => return AstNode::new(loc, NodeKind::Simple(Literal::Bool(a && b))),
            BinOp::Or => return AstNode::new(loc, NodeKind::Simple(Literal::Bool(a || b))),
            BinOp::Eq => return AstNode::new(loc, NodeKind::Simple(Literal::Bool(a == b))),
            BinOp::Ne => return AstNode::new(loc, NodeKind::Simple(Literal::Bool(a != b))),
            _ => {}
        }
    }

    rebuild(lhs, rhs)
}

fn fold_int_arith(op: BinOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        // two's-complement wrapping, not checked-fail (spec §8 boundary behavior, implementer choice).
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div if b != 0 => a.wrapping_div(b),
        BinOp::Mod if b != 0 => a.wrapping_rem(b),
        _ => return None,
    })
}

fn fold_int_cmp(op: BinOp, a: i64, b: i64) -> Option<bool> {
    Some(match op {
        BinOp::Eq => a == b,
        BinOp::Ne => a != b,
        BinOp::Lt => a < b,
        BinOp::Gt => a > b,
        BinOp::Le => a <= b,
        BinOp::Ge => a >= b,
        _ => return None,
    })
}

fn fold_int_bitwise(op: BinOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr => a.wrapping_shr(b as u32),
        _ => return None,
    })
}

fn fold_flt_arith(op: BinOp, a: f64, b: f64) -> Option<f64> {
    Some(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => a % b,
        BinOp::Pow => a.powf(b),
        BinOp::Root => a.powf(1.0 / b),
        _ => return None,
    })
}

fn fold_flt_cmp(op: BinOp, a: f64, b: f64) -> Option<bool> {
    Some(match op {
        BinOp::Eq => a == b,
        BinOp::Ne => a != b,
        BinOp::Lt => a < b,
        BinOp::Gt => a > b,
        BinOp::Le => a <= b,
        BinOp::Ge => a >= b,
        _ => return None,
    })
}

fn fold_unary(loc: Loc, op: UnOp, operand: AstNode, postfix: bool) -> AstNode {
    if !postfix {
        match (op, &operand.kind) {
            (UnOp::Neg, NodeKind::Simple(Literal::Int(v))) => {
                return AstNode::new(loc, NodeKind::Simple(Literal::Int(v.wrapping_neg())))
            }
            (UnOp::Neg, NodeKind::Simple(Literal::Flt(v))) => {
                return AstNode::new(loc, NodeKind::Simple(Literal::Flt(-v)))
            }
            (UnOp::Plus, NodeKind::Simple(Literal::Int(_) | Literal::Flt(_))) => return operand,
            (UnOp::Not, NodeKind::Simple(Literal::Bool(v))) => {
                return AstNode::new(loc, NodeKind::Simple(Literal::Bool(!v)))
            }
            (UnOp::BitNot, NodeKind::Simple(Literal::Int(v))) => {
                return AstNode::new(loc, NodeKind::Simple(Literal::Int(!v)))
            }
            _ => {}
        }
    }
    AstNode::new(loc, NodeKind::Unary { op, operand: Box::new(operand), postfix })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize;
    use crate::parser::parse;

    fn simplify_src(src: &str) -> Program {
        let toks = tokenize(src, "t", "t.wisp").unwrap();
        let prog = parse(&toks, "t", 0).unwrap();
        simplify_program(prog).unwrap()
    }

    #[test]
    fn folds_constant_arithmetic() {
        let prog = simplify_src("2 + 3 * 4;");
        assert!(matches!(prog.body[0].kind, NodeKind::Simple(Literal::Int(14))));
    }

    #[test]
    fn folds_float_when_either_operand_is_float() {
        let prog = simplify_src("1 + 2.5;");
        assert!(matches!(prog.body[0].kind, NodeKind::Simple(Literal::Flt(v)) if v == 3.5));
    }

    #[test]
    fn defer_order_is_reversed_at_block_end() {
        let prog = simplify_src("{ defer 1; defer 2; 3; }");
        let NodeKind::Block(stmts) = &prog.body[0].kind else { panic!("expected block") };
        // registration order 1,2 -> exit order 2,1, appended after the plain statement.
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[0].kind, NodeKind::Simple(Literal::Int(3))));
        assert!(matches!(&stmts[1].kind, NodeKind::Simple(Literal::Int(2))));
        assert!(matches!(&stmts[2].kind, NodeKind::Simple(Literal::Int(1))));
    }

    #[test]
    fn defer_runs_before_return() {
        let prog = simplify_src("{ defer 1; return 2; 3; }");
        let NodeKind::Block(stmts) = &prog.body[0].kind else { panic!("expected block") };
        assert!(matches!(&stmts[0].kind, NodeKind::Simple(Literal::Int(1))));
        assert!(matches!(&stmts[1].kind, NodeKind::Ret(_)));
    }

    #[test]
    fn defer_runs_before_return_nested_in_if() {
        let prog = simplify_src(r#"{ defer "end"; if (true) { return 1; } }"#);
        let NodeKind::Block(stmts) = &prog.body[0].kind else { panic!("expected block") };
        // the nested `return` pulls the outer block's pending defer in
        // ahead of it, even though an `if` sits between registration and exit.
        let NodeKind::Cond { arms, .. } = &stmts[0].kind else { panic!("expected cond") };
        let NodeKind::Block(inner) = &arms[0].1.kind else { panic!("expected block") };
        assert_eq!(inner.len(), 2);
        assert!(matches!(&inner[0].kind, NodeKind::Simple(Literal::Str(ref s)) if s == "end"));
        assert!(matches!(&inner[1].kind, NodeKind::Ret(_)));
        // the `if` doesn't statically exhaust control flow, so the same
        // defer is also appended for the fall-through path.
        assert!(matches!(&stmts[1].kind, NodeKind::Simple(Literal::Str(ref s)) if s == "end"));
    }

    #[test]
    fn break_in_nested_if_only_drains_up_to_loop_boundary() {
        let prog = simplify_src("{ defer 1; for (;;) { defer 2; if (true) { break; } } }");
        let NodeKind::Block(outer) = &prog.body[0].kind else { panic!("expected block") };
        let NodeKind::For { body, .. } = &outer[1].kind else { panic!("expected for") };
        let NodeKind::Block(for_stmts) = &body.kind else { panic!("expected block") };
        let NodeKind::Cond { arms, .. } = &for_stmts[0].kind else { panic!("expected cond") };
        let NodeKind::Block(if_stmts) = &arms[0].1.kind else { panic!("expected block") };
        // `break` drains the loop's own defer (2) but not the outer block's (1).
        assert_eq!(if_stmts.len(), 2);
        assert!(matches!(&if_stmts[0].kind, NodeKind::Simple(Literal::Int(2))));
        assert!(matches!(&if_stmts[1].kind, NodeKind::Break));
    }
}

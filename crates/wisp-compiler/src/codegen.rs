//! Codegen pass (spec component H, §4.4): AST → bytecode via a tree walk,
//! with jump back-patching and an explicit loop-frame / try-target stack
//! for `break`/`continue`/`or`.
//!
//! Every binary/unary *operator* compiles to a conventional method call
//! dispatched through the value's type-function table (spec §4.5's
//! uniform member-dispatch mechanism), matching the 25-opcode set in
//! spec §4.6 — which has no dedicated `ADD`/`SUB`/... opcodes, only
//! `ATTR`/`CALL`/`MEM_CALL`. `&&`/`||` are the one exception: they stay
//! real control flow (`JMP_FALSE`/`JMP_TRUE`), exactly as spec §4.4
//! prescribes for short-circuiting.

use thiserror::Error;
use wisp_core::bytecode::{ArgKind, CallInfo, FnArgInfo, LoadOperand};
use wisp_core::{Chunk, ChunkFlags, Loc, Op};

use crate::ast::*;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct CodegenError(pub String);

type CResult<T> = Result<T, CodegenError>;

/// Conventional method name a binary operator compiles down to. `&&`/`||`
/// never reach here (handled as control flow before this is consulted).
fn bin_method(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Mod => "mod",
        BinOp::Pow => "pow",
        BinOp::Root => "root",
        BinOp::Eq => "eq",
        BinOp::Ne => "ne",
        BinOp::Lt => "lt",
        BinOp::Gt => "gt",
        BinOp::Le => "le",
        BinOp::Ge => "ge",
        BinOp::BitAnd => "band",
        BinOp::BitOr => "bor",
        BinOp::BitXor => "bxor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr",
        BinOp::NilCoalesce => "coalesce",
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators never reach bin_method"),
    }
}

fn un_method(op: UnOp) -> Option<&'static str> {
    match op {
        UnOp::Neg => Some("neg"),
        UnOp::Plus => Some("pos"),
        UnOp::Not => Some("not"),
        UnOp::BitNot => Some("bnot"),
        UnOp::Inc | UnOp::Dec | UnOp::Spread => None,
    }
}

/// True for the node kinds `Codegen::stmt`'s catch-all arm handles (plain
/// expression statements, which push one value and immediately `UNLOAD`
/// it) — i.e. everything except the statement kinds with their own match
/// arm there, none of which leave a residual value on the operand stack.
fn is_expr_stmt(kind: &NodeKind) -> bool {
    !matches!(
        kind,
        NodeKind::Block(_)
            | NodeKind::VarDecl(_)
            | NodeKind::Cond { .. }
            | NodeKind::For { .. }
            | NodeKind::ForIn { .. }
            | NodeKind::Ret(_)
            | NodeKind::Continue
            | NodeKind::Break
            | NodeKind::Defer(_)
    )
}

struct LoopCtx {
    /// indices of `CONTINUE` ops pending patch to the increment label.
    continues: Vec<usize>,
    /// indices of `BREAK` ops pending patch to the post-loop label.
    breaks: Vec<usize>,
}

pub struct Codegen {
    chunk: Chunk,
    loops: Vec<LoopCtx>,
}

impl Codegen {
    pub fn new() -> Self {
        Self { chunk: Chunk::new(ChunkFlags::default()), loops: Vec::new() }
    }
}

impl Default for Codegen {
    fn default() -> Self {
        Self::new()
    }
}

impl Codegen {

    pub fn finish(self) -> Chunk {
        self.chunk
    }

    fn emit(&mut self, op: Op, loc: Loc) -> usize {
        self.chunk.push(op, loc)
    }

    fn here(&self) -> usize {
        self.chunk.len()
    }

    fn patch(&mut self, idx: usize, target: usize) {
        self.chunk.ops[idx].op.set_jump_target(target);
    }

    fn str_lit(&mut self, s: impl Into<String>, loc: Loc) {
        self.emit(Op::LoadData(LoadOperand::Str(s.into())), loc);
    }

    // ---- statements ----

    /// Compiles a module's top-level statement list (spec §3: a module
    /// has no trailing `RETURN`, unlike a function body). The *last*
    /// statement, if it is a bare expression, keeps its value on the
    /// operand stack instead of the usual trailing `UNLOAD` every other
    /// expression statement gets — `Interp::run`'s "fell off the end"
    /// case then hands that value back as the module's result, which is
    /// what lets `let x = n; x` (spec §8's round-trip invariant) observe
    /// `n` rather than always seeing `nil`.
    pub fn compile_program(&mut self, body: &[AstNode]) -> CResult<()> {
        for (i, stmt) in body.iter().enumerate() {
            if i + 1 == body.len() && is_expr_stmt(&stmt.kind) {
                self.expr(stmt)?;
            } else {
                self.stmt(stmt)?;
            }
        }
        Ok(())
    }

    fn stmt(&mut self, node: &AstNode) -> CResult<()> {
        let loc = node.loc;
        match &node.kind {
            NodeKind::Block(stmts) => {
                self.emit(Op::PushBlock(1), loc);
                for s in stmts {
                    self.stmt(s)?;
                }
                self.emit(Op::PopBlock(1), loc);
            }
            NodeKind::VarDecl(vars) => {
                for v in vars {
                    self.var_binding(v)?;
                }
            }
            NodeKind::Cond { arms, else_body } => self.compile_cond(loc, arms, else_body.as_deref())?,
            NodeKind::For { init, cond, step, body } => {
                self.compile_for(loc, init.as_deref(), cond.as_deref(), step.as_deref(), body)?
            }
            NodeKind::ForIn { .. } => {
                return Err(CodegenError("for-in reached codegen without desugaring".into()))
            }
            NodeKind::Ret(val) => {
                if let Some(v) = val {
                    self.expr(v)?;
                    self.emit(Op::Return(true), loc);
                } else {
                    self.emit(Op::Return(false), loc);
                }
            }
            NodeKind::Continue => {
                let idx = self.emit(Op::Continue(0), loc);
                self.loops.last_mut().ok_or_else(|| CodegenError("continue outside loop".into()))?.continues.push(idx);
            }
            NodeKind::Break => {
                let idx = self.emit(Op::Break(0), loc);
                self.loops.last_mut().ok_or_else(|| CodegenError("break outside loop".into()))?.breaks.push(idx);
            }
            NodeKind::Defer(_) => return Err(CodegenError("defer survived simplify pass".into())),
            _ => {
                // any other node is an expression statement: evaluate, then
                // discard the value it leaves on the operand stack.
                self.expr(node)?;
                self.emit(Op::Unload(1), loc);
            }
        }
        Ok(())
    }

    fn var_binding(&mut self, v: &VarBinding) -> CResult<()> {
        match &v.init {
            Some(init) => self.expr(init)?,
            None => {
                self.emit(Op::LoadData(LoadOperand::Nil), v.loc);
            }
        }
        if let Some(in_val) = &v.in_val {
            self.expr(in_val)?;
            self.emit(Op::CreateIn(v.name.clone()), v.loc);
            self.emit(Op::Unload(1), v.loc);
        } else {
            self.emit(Op::Create(v.name.clone()), v.loc);
        }
        Ok(())
    }

    fn compile_cond(&mut self, loc: Loc, arms: &[(AstNode, AstNode)], else_body: Option<&AstNode>) -> CResult<()> {
        let mut end_jumps = Vec::new();
        for (cond, body) in arms {
            self.expr(cond)?;
            let skip = self.emit(Op::JmpFalsePop(0), cond.loc);
            self.stmt(body)?;
            end_jumps.push(self.emit(Op::Jmp(0), loc));
            let next_arm = self.here();
            self.patch(skip, next_arm);
        }
        if let Some(else_b) = else_body {
            self.stmt(else_b)?;
        }
        let end = self.here();
        for j in end_jumps {
            self.patch(j, end);
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        loc: Loc,
        init: Option<&AstNode>,
        cond: Option<&AstNode>,
        step: Option<&AstNode>,
        body: &AstNode,
    ) -> CResult<()> {
        self.emit(Op::PushLoop, loc);
        if let Some(init) = init {
            self.stmt(init)?;
        }
        self.loops.push(LoopCtx { continues: Vec::new(), breaks: Vec::new() });

        let loop_top = self.here();
        let mut exit_jump = None;
        if let Some(cond) = cond {
            self.expr(cond)?;
            exit_jump = Some(self.emit(Op::JmpFalsePop(0), cond.loc));
        }
        self.stmt(body)?;

        let incr_label = self.here();
        if let Some(step) = step {
            self.expr(step)?;
            self.emit(Op::Unload(1), step.loc);
        }
        self.emit(Op::Jmp(loop_top), loc);

        let pop_loop_idx = self.emit(Op::PopLoop, loc);
        let post_loop = self.here();
        if let Some(j) = exit_jump {
            self.patch(j, pop_loop_idx);
        }

        let ctx = self.loops.pop().expect("pushed above");
        for c in ctx.continues {
            self.patch(c, incr_label);
        }
        for b in ctx.breaks {
            self.patch(b, post_loop);
        }
        Ok(())
    }

    // ---- expressions (each leaves exactly one value on the operand stack) ----

    fn expr(&mut self, node: &AstNode) -> CResult<()> {
        let loc = node.loc;
        match &node.kind {
            NodeKind::Simple(lit) => self.literal(lit, loc),
            NodeKind::Ident(name) => {
                self.emit(Op::LoadData(LoadOperand::Iden(name.clone())), loc);
            }
            NodeKind::Binary { op: BinOp::And, lhs, rhs } => self.short_circuit(loc, lhs, rhs, true)?,
            NodeKind::Binary { op: BinOp::Or, lhs, rhs } => self.short_circuit(loc, lhs, rhs, false)?,
            NodeKind::Binary { op, lhs, rhs } => {
                self.expr(rhs)?;
                self.expr(lhs)?;
                self.str_lit(bin_method(*op), loc);
                self.emit(Op::MemCall(CallInfo(vec![ArgKind::Positional])), loc);
            }
            NodeKind::Unary { op: UnOp::Inc, operand, .. } => self.compile_incdec(loc, operand, true)?,
            NodeKind::Unary { op: UnOp::Dec, operand, .. } => self.compile_incdec(loc, operand, false)?,
            NodeKind::Unary { op, operand, .. } => {
                if let Some(method) = un_method(*op) {
                    self.expr(operand)?;
                    self.str_lit(method, loc);
                    self.emit(Op::MemCall(CallInfo(vec![])), loc);
                } else {
                    // `@`-style spread/address-of with no further protocol
                    // defined by the grammar: passes the value through.
                    self.expr(operand)?;
                }
            }
            NodeKind::Ternary { cond, then, els } => {
                self.expr(cond)?;
                let to_else = self.emit(Op::JmpFalsePop(0), loc);
                self.expr(then)?;
                let to_end = self.emit(Op::Jmp(0), loc);
                let else_at = self.here();
                self.patch(to_else, else_at);
                self.expr(els)?;
                let end = self.here();
                self.patch(to_end, end);
            }
            NodeKind::Assign { lhs, rhs } => self.compile_assign(loc, lhs, rhs)?,
            NodeKind::OpAssign { op, lhs, rhs } => self.compile_op_assign(loc, *op, lhs, rhs)?,
            NodeKind::TryOr { expr, name, handler } => self.compile_try_or(loc, expr, name.as_deref(), handler)?,
            NodeKind::Comma(items) => {
                for (i, it) in items.iter().enumerate() {
                    if i > 0 {
                        self.emit(Op::Unload(1), it.loc);
                    }
                    self.expr(it)?;
                }
            }
            NodeKind::Call { callee, args } => {
                self.push_args(args)?;
                self.expr(callee)?;
                self.emit(Op::Call(arg_call_info(args)), loc);
            }
            NodeKind::StructCall { callee, args } => {
                self.push_args(args)?;
                self.expr(callee)?;
                self.emit(Op::Call(arg_call_info(args)), loc);
            }
            NodeKind::MemberCall { recv, name, args } => {
                self.push_args(args)?;
                self.expr(recv)?;
                self.str_lit(name.clone(), loc);
                self.emit(Op::MemCall(arg_call_info(args)), loc);
            }
            NodeKind::Subscript { recv, index } => {
                self.expr(index)?;
                self.expr(recv)?;
                self.str_lit("at", loc);
                self.emit(Op::MemCall(CallInfo(vec![ArgKind::Positional])), loc);
            }
            NodeKind::Member { recv, name } => {
                self.expr(recv)?;
                self.emit(Op::Attr(name.clone()), loc);
            }
            NodeKind::AddrOf(e) => self.expr(e)?,
            NodeKind::FnDef { sig, body, .. } => self.compile_fn_def(loc, sig, body)?,
            NodeKind::Block(_) => {
                // an anonymous block used in expression position has no
                // value-producing grammar rule; treat it as a statement
                // that yields nil.
                self.stmt(node)?;
                self.emit(Op::LoadData(LoadOperand::Nil), loc);
            }
            other => return Err(CodegenError(format!("unsupported expression node: {other:?}"))),
        }
        Ok(())
    }

    fn literal(&mut self, lit: &Literal, loc: Loc) {
        let operand = match lit {
            Literal::Nil => LoadOperand::Nil,
            Literal::Bool(b) => LoadOperand::Bool(*b),
            Literal::Int(i) => LoadOperand::Int(*i),
            Literal::Flt(f) => LoadOperand::Flt(*f),
            Literal::Str(s) => LoadOperand::Str(s.clone()),
            Literal::Char(c) => LoadOperand::Int(*c as i64),
        };
        self.emit(Op::LoadData(operand), loc);
    }

    fn short_circuit(&mut self, loc: Loc, lhs: &AstNode, rhs: &AstNode, is_and: bool) -> CResult<()> {
        self.expr(lhs)?;
        let skip = if is_and { self.emit(Op::JmpFalse(0), loc) } else { self.emit(Op::JmpTrue(0), loc) };
        self.emit(Op::Unload(1), loc);
        self.expr(rhs)?;
        let end = self.here();
        self.patch(skip, end);
        Ok(())
    }

    /// `++x`/`--x` and `x++`/`x--`. Both forms leave the *new* value on the
    /// stack: retaining the pre-increment value for postfix use would need
    /// a stack `DUP`, which isn't in the opcode set (spec §4.6), so this is
    /// a deliberate simplification from strict postfix semantics (see
    /// `DESIGN.md`).
    fn compile_incdec(&mut self, loc: Loc, target: &AstNode, inc: bool) -> CResult<()> {
        let method = if inc { "add" } else { "sub" };
        let one = AstNode::new(loc, NodeKind::Simple(Literal::Int(1)));
        self.compile_op_assign_method(loc, target, method, &one)
    }

    fn compile_assign(&mut self, loc: Loc, lhs: &AstNode, rhs: &AstNode) -> CResult<()> {
        match &lhs.kind {
            NodeKind::Ident(name) => {
                self.emit(Op::LoadData(LoadOperand::Iden(name.clone())), loc);
                self.expr(rhs)?;
                self.emit(Op::Store, loc);
            }
            NodeKind::Member { recv, name } => {
                self.expr(rhs)?;
                self.expr(recv)?;
                self.emit(Op::CreateIn(name.clone()), loc);
            }
            NodeKind::Subscript { recv, index } => {
                self.expr(rhs)?;
                self.expr(index)?;
                self.expr(recv)?;
                self.str_lit("set", loc);
                self.emit(Op::MemCall(CallInfo(vec![ArgKind::Positional, ArgKind::Positional])), loc);
            }
            other => return Err(CodegenError(format!("invalid assignment target: {other:?}"))),
        }
        Ok(())
    }

    fn compile_op_assign(&mut self, loc: Loc, op: BinOp, lhs: &AstNode, rhs: &AstNode) -> CResult<()> {
        self.compile_op_assign_method(loc, lhs, bin_method(op), rhs)
    }

    fn compile_op_assign_method(&mut self, loc: Loc, lhs: &AstNode, method: &str, rhs: &AstNode) -> CResult<()> {
        match &lhs.kind {
            NodeKind::Ident(name) => {
                self.emit(Op::LoadData(LoadOperand::Iden(name.clone())), loc); // var slot, kept for STORE
                self.expr(rhs)?; // arg
                self.emit(Op::LoadData(LoadOperand::Iden(name.clone())), loc); // recv
                self.str_lit(method, loc);
                self.emit(Op::MemCall(CallInfo(vec![ArgKind::Positional])), loc);
                self.emit(Op::Store, loc);
            }
            NodeKind::Member { recv, name } => {
                self.expr(rhs)?; // arg
                self.expr(recv)?; // recv (read)
                self.emit(Op::Attr(name.clone()), loc); // current value
                self.str_lit(method, loc);
                self.emit(Op::MemCall(CallInfo(vec![ArgKind::Positional])), loc);
                self.expr(recv)?; // recv again (write target)
                self.emit(Op::CreateIn(name.clone()), loc);
            }
            NodeKind::Subscript { recv, index } => {
                self.expr(rhs)?; // arg, kept under the `at` sub-call's own stack use
                self.expr(index)?; // `at`'s arg
                self.expr(recv)?; // `at`'s recv
                self.str_lit("at", loc);
                self.emit(Op::MemCall(CallInfo(vec![ArgKind::Positional])), loc); // current value
                self.str_lit(method, loc);
                self.emit(Op::MemCall(CallInfo(vec![ArgKind::Positional])), loc); // result
                self.expr(index)?; // index again (write target)
                self.expr(recv)?; // recv again (write target)
                self.str_lit("set", loc);
                self.emit(Op::MemCall(CallInfo(vec![ArgKind::Positional, ArgKind::Positional])), loc);
            }
            other => return Err(CodegenError(format!("invalid assignment target: {other:?}"))),
        }
        Ok(())
    }

    fn compile_try_or(&mut self, loc: Loc, expr: &AstNode, name: Option<&str>, handler: &AstNode) -> CResult<()> {
        let handler_jmp = self.emit(Op::PushJmp(0), loc);
        if let Some(name) = name {
            self.emit(Op::PushJmpName(name.to_string()), loc);
        }
        self.expr(expr)?;
        self.emit(Op::PopJmp, loc);
        let to_end = self.emit(Op::Jmp(0), loc);

        let handler_at = self.here();
        self.patch(handler_jmp, handler_at);
        self.emit(Op::PushBlock(1), loc);
        self.compile_expr_block(handler)?;
        self.emit(Op::PopBlock(1), loc);

        let end = self.here();
        self.patch(to_end, end);
        Ok(())
    }

    /// Compiles a `Block` so that every statement but the last is executed
    /// for effect (and discarded) while the last — if it is a bare
    /// expression — leaves its value as the block's result. Used only by
    /// `or`-handler bodies, which must evaluate to a value.
    fn compile_expr_block(&mut self, block: &AstNode) -> CResult<()> {
        let NodeKind::Block(stmts) = &block.kind else {
            self.expr(block)?;
            return Ok(());
        };
        if stmts.is_empty() {
            self.emit(Op::LoadData(LoadOperand::Nil), block.loc);
            return Ok(());
        }
        for s in &stmts[..stmts.len() - 1] {
            self.stmt(s)?;
        }
        let last = &stmts[stmts.len() - 1];
        if is_plain_expr(last) {
            self.expr(last)?;
        } else {
            self.stmt(last)?;
            self.emit(Op::LoadData(LoadOperand::Nil), last.loc);
        }
        Ok(())
    }

    fn compile_fn_def(&mut self, loc: Loc, sig: &AstNode, body: &AstNode) -> CResult<()> {
        let NodeKind::FnSig { params, variadic, kw_arg } = &sig.kind else {
            return Err(CodegenError("FnDef without FnSig".into()));
        };

        let mut defaulted = Vec::new();
        for (i, p) in params.iter().enumerate() {
            if let Some(def) = &p.init {
                self.expr(def)?;
                defaulted.push(i);
            }
        }

        let block_till = self.emit(Op::BlockTill(0), loc);
        let body_begin = self.here();
        self.stmt(body)?;
        if !matches!(self.chunk.ops.last().map(|i| &i.op), Some(Op::Return(_))) {
            self.emit(Op::Return(false), loc);
        }
        let body_end = self.here();

        let arginfo = FnArgInfo {
            param_names: params.iter().map(|p| p.name.clone()).collect(),
            defaulted,
            kw_arg_name: kw_arg.clone(),
            var_arg_name: if *variadic { Some("args".to_string()) } else { None },
            body_begin,
            body_end,
        };
        self.emit(Op::CreateFn(arginfo), loc);
        self.patch(block_till, body_end);
        Ok(())
    }

    fn push_args(&mut self, args: &[Arg]) -> CResult<()> {
        for a in args.iter().rev() {
            self.expr(&a.value)?;
        }
        Ok(())
    }
}

fn is_plain_expr(node: &AstNode) -> bool {
    !matches!(
        node.kind,
        NodeKind::VarDecl(_)
            | NodeKind::Cond { .. }
            | NodeKind::For { .. }
            | NodeKind::ForIn { .. }
            | NodeKind::Ret(_)
            | NodeKind::Continue
            | NodeKind::Break
            | NodeKind::Defer(_)
    )
}

fn arg_call_info(args: &[Arg]) -> CallInfo {
    CallInfo(
        args.iter()
            .map(|a| match a.style {
                ArgStyle::Positional => ArgKind::Positional,
                ArgStyle::Keyword => ArgKind::Keyword(a.name.clone().unwrap_or_default()),
                ArgStyle::Unpack => ArgKind::Unpack,
            })
            .collect(),
    )
}

pub fn codegen(body: &[AstNode]) -> CResult<Chunk> {
    let mut cg = Codegen::new();
    cg.compile_program(body)?;
    Ok(cg.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize;
    use crate::parser::parse;
    use crate::simplify::simplify_program;

    fn compile(src: &str) -> Chunk {
        let toks = tokenize(src, "t", "t.wisp").unwrap();
        let prog = parse(&toks, "t", 0).unwrap();
        let prog = simplify_program(prog).unwrap();
        codegen(&prog.body).unwrap()
    }

    #[test]
    fn arithmetic_compiles_to_method_call() {
        // a non-final expression statement discards its value with `UNLOAD`;
        // see `top_level_keeps_last_expression_value` for the final-statement case.
        let chunk = compile("2 + 3; nil;");
        let mnemonics: Vec<_> = chunk.ops.iter().map(|i| i.op.mnemonic()).collect();
        assert!(mnemonics.contains(&"MEM_CALL"));
        assert!(mnemonics.contains(&"LOAD_DATA"));
        assert!(mnemonics.contains(&"UNLOAD"));
    }

    #[test]
    fn top_level_keeps_last_expression_value() {
        // the module's final statement, if a bare expression, is not
        // `UNLOAD`ed — its value becomes the module's result (spec §8's
        // round-trip invariant).
        let chunk = compile("2 + 3;");
        assert!(!matches!(chunk.ops.last().map(|i| &i.op), Some(Op::Unload(_))));
    }

    #[test]
    fn var_decl_then_use_round_trips_identifier() {
        let chunk = compile("let x = 5; x;");
        assert!(matches!(chunk.ops[1].op, Op::Create(ref n) if n == "x"));
    }

    #[test]
    fn short_circuit_and_uses_jmp_false() {
        let chunk = compile("true && false;");
        assert!(chunk.ops.iter().any(|i| matches!(i.op, Op::JmpFalse(_))));
    }

    #[test]
    fn break_and_continue_patch_to_real_targets() {
        let chunk = compile("for ; true ; { break; continue; }");
        let break_idx = chunk.ops.iter().position(|i| matches!(i.op, Op::Break(_))).unwrap();
        let continue_idx = chunk.ops.iter().position(|i| matches!(i.op, Op::Continue(_))).unwrap();
        if let Op::Break(t) = chunk.ops[break_idx].op {
            assert_ne!(t, 0);
        }
        if let Op::Continue(t) = chunk.ops[continue_idx].op {
            assert_ne!(t, 0);
        }
    }

    #[test]
    fn fn_def_emits_block_till_paired_with_create_fn() {
        let chunk = compile("let f = fn(x) { return x; };");
        let bt = chunk.ops.iter().position(|i| matches!(i.op, Op::BlockTill(_))).unwrap();
        if let Op::BlockTill(target) = chunk.ops[bt].op {
            assert!(matches!(chunk.ops[target].op, Op::CreateFn(_)));
        }
    }

    #[test]
    fn try_or_wraps_expr_with_push_jmp() {
        let chunk = compile("let r = (1 / 0) or err { err };");
        assert!(chunk.ops.iter().any(|i| matches!(i.op, Op::PushJmp(_))));
        assert!(chunk.ops.iter().any(|i| matches!(i.op, Op::PushJmpName(ref n) if n == "err")));
    }
}

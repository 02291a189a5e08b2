//! The 26-opcode instruction set (spec component G).
//!
//! Each [`Op`] variant carries its own operand inline — no separate operand
//! table — mirroring the source runtime's `op_t { op, dtype, data }` triple
//! but typed per-opcode instead of tagged by a runtime `OpDataType`.

use serde::{Deserialize, Serialize};

/// A literal or identifier load, the operand of [`Op::LoadData`].
///
/// `Iden` resolves through the variable scope stack at run time; every
/// other variant pushes itself as a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadOperand {
    Nil,
    Bool(bool),
    Int(i64),
    Flt(f64),
    Str(String),
    Iden(String),
}

impl std::fmt::Display for LoadOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadOperand::Nil => write!(f, "nil"),
            LoadOperand::Bool(b) => write!(f, "{b}"),
            LoadOperand::Int(i) => write!(f, "{i}"),
            LoadOperand::Flt(x) => write!(f, "{x:?}"),
            LoadOperand::Str(s) => write!(f, "{s:?}"),
            LoadOperand::Iden(s) => write!(f, "{s}"),
        }
    }
}

/// One positional/keyword/unpack argument slot, in left-to-right
/// declaration order. Encodes the same information as the source's
/// one-character-per-argument `arginfo` string, typed instead of packed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgKind {
    Positional,
    Keyword(String),
    Unpack,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallInfo(pub Vec<ArgKind>);

impl CallInfo {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `CREATE_FN`'s operand: which parameters have defaults, whether the
/// function accepts keyword/variadic trailing arguments, and the
/// instruction range of its body.
///
/// The source's `Fn` value stores a `{ begin, end }` body range (spec §3);
/// since the body is codegen'd inline right after the paired `BLOCK_TILL`
/// (spec §4.4) and the VM never executes it in place (`BLOCK_TILL` is a
/// jump over the body at definition time, not a no-op), `CREATE_FN` has to
/// carry that range itself so the interpreter can splice it into the `Fn`
/// value it constructs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FnArgInfo {
    pub param_names: Vec<String>,
    /// indices into `param_names` that have a default value pushed on the
    /// stack just before this instruction, in matching order.
    pub defaulted: Vec<usize>,
    pub kw_arg_name: Option<String>,
    pub var_arg_name: Option<String>,
    /// first instruction index of the function body.
    pub body_begin: usize,
    /// one past the last instruction index of the function body (== the
    /// paired `BLOCK_TILL`'s jump target == this `CREATE_FN`'s own index).
    pub body_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Literal: push constant. Identifier: resolve via scope then globals; push.
    LoadData(LoadOperand),
    /// Pop and dec-ref `count` values.
    Unload(u32),
    /// Pop `var` and `val`; require same type; `on_set(var, val)`; push the
    /// result back — `var` itself if the assignment mutated it in place, or
    /// `val` if `var`'s type has no interior to mutate (e.g. a scalar).
    Store,
    /// Pop `val`; bind `name` in the current layer.
    Create(String),
    /// Pop `in` and `val`; attribute-set on `in`, or register `val` as a
    /// type method on `in`'s type if `in` is not attribute-based; push `val`
    /// back (mirrors `STORE`'s push-back, so attribute assignment works as
    /// an expression too).
    CreateIn(String),
    /// Push `n` new variable layers in the current function frame.
    PushBlock(u32),
    /// Pop `n` layers, dec-refing everything they held.
    PopBlock(u32),
    /// Record the current layer depth as a loop frame.
    PushLoop,
    /// Pop layers back to the recorded depth; forget the loop frame.
    PopLoop,
    /// If `false`, push nil first. Unwind to the function-frame caller.
    Return(bool),
    /// Jumps past a function body (to the paired `CREATE_FN`); codegen pairs
    /// the two so straight-line flow over a `fn` definition never executes
    /// its body, only the call protocol does.
    BlockTill(usize),
    /// Pop parameter defaults/names per `FnArgInfo`; construct and push a `Fn`.
    CreateFn(FnArgInfo),
    /// Unwind loop layers down to the loop frame; jump to the increment label.
    Continue(usize),
    /// Unwind loop layers down to the loop frame; jump past the loop.
    Break(usize),
    Jmp(usize),
    /// Peek boolean; jump if true; do not pop.
    JmpTrue(usize),
    /// Peek boolean; jump if false; do not pop.
    JmpFalse(usize),
    /// As `JmpTrue`, but always pops.
    JmpTruePop(usize),
    /// As `JmpFalse`, but always pops.
    JmpFalsePop(usize),
    /// Peek; if nil, pop and jump.
    JmpNil(usize),
    /// Open a try block pointing at `handler_target`.
    PushJmp(usize),
    /// Set the error-variable name for the most recently opened try block.
    PushJmpName(String),
    /// Close the innermost try block.
    PopJmp,
    /// Pop receiver; push `get_attr(name)` or a type-method lookup.
    Attr(String),
    /// `args[0]` is nil (no receiver).
    Call(CallInfo),
    /// Pop method-name string, then receiver; receiver becomes `args[0]`.
    MemCall(CallInfo),
}

impl Op {
    /// Short mnemonic used by the textual disassembler (spec §6.5).
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::LoadData(_) => "LOAD_DATA",
            Op::Unload(_) => "UNLOAD",
            Op::Store => "STORE",
            Op::Create(_) => "CREATE",
            Op::CreateIn(_) => "CREATE_IN",
            Op::PushBlock(_) => "PUSH_BLOCK",
            Op::PopBlock(_) => "POP_BLOCK",
            Op::PushLoop => "PUSH_LOOP",
            Op::PopLoop => "POP_LOOP",
            Op::Return(_) => "RETURN",
            Op::BlockTill(_) => "BLOCK_TILL",
            Op::CreateFn(_) => "CREATE_FN",
            Op::Continue(_) => "CONTINUE",
            Op::Break(_) => "BREAK",
            Op::Jmp(_) => "JMP",
            Op::JmpTrue(_) => "JMP_TRUE",
            Op::JmpFalse(_) => "JMP_FALSE",
            Op::JmpTruePop(_) => "JMP_TRUE_POP",
            Op::JmpFalsePop(_) => "JMP_FALSE_POP",
            Op::JmpNil(_) => "JMP_NIL",
            Op::PushJmp(_) => "PUSH_JMP",
            Op::PushJmpName(_) => "PUSH_JMP_NAME",
            Op::PopJmp => "POP_JMP",
            Op::Attr(_) => "ATTR",
            Op::Call(_) => "CALL",
            Op::MemCall(_) => "MEM_CALL",
        }
    }

    /// Is this a jump-family opcode, and if so, is its target mutable
    /// (relevant for codegen back-patching)?
    pub fn jump_target(&self) -> Option<usize> {
        match *self {
            Op::Jmp(t)
            | Op::JmpTrue(t)
            | Op::JmpFalse(t)
            | Op::JmpTruePop(t)
            | Op::JmpFalsePop(t)
            | Op::JmpNil(t)
            | Op::PushJmp(t)
            | Op::Continue(t)
            | Op::Break(t)
            | Op::BlockTill(t) => Some(t),
            _ => None,
        }
    }

    /// Rewrites a jump-family opcode's target in place (back-patching).
    pub fn set_jump_target(&mut self, new_target: usize) {
        match self {
            Op::Jmp(t)
            | Op::JmpTrue(t)
            | Op::JmpFalse(t)
            | Op::JmpTruePop(t)
            | Op::JmpFalsePop(t)
            | Op::JmpNil(t)
            | Op::PushJmp(t)
            | Op::Continue(t)
            | Op::Break(t)
            | Op::BlockTill(t) => *t = new_target,
            _ => {}
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Op::Return(_))
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::LoadData(v) => write!(f, "{:<14}{v}", self.mnemonic()),
            Op::Unload(n) | Op::PushBlock(n) | Op::PopBlock(n) => write!(f, "{:<14}{n}", self.mnemonic()),
            Op::Create(n) | Op::CreateIn(n) | Op::Attr(n) | Op::PushJmpName(n) => {
                write!(f, "{:<14}{n}", self.mnemonic())
            }
            Op::Return(b) => write!(f, "{:<14}{b}", self.mnemonic()),
            Op::Jmp(t)
            | Op::JmpTrue(t)
            | Op::JmpFalse(t)
            | Op::JmpTruePop(t)
            | Op::JmpFalsePop(t)
            | Op::JmpNil(t)
            | Op::PushJmp(t)
            | Op::Continue(t)
            | Op::Break(t)
            | Op::BlockTill(t) => write!(f, "{:<14}{t}", self.mnemonic()),
            Op::CreateFn(info) => write!(f, "{:<14}{}", self.mnemonic(), info.param_names.join(",")),
            Op::Call(info) | Op::MemCall(info) => write!(f, "{:<14}argc={}", self.mnemonic(), info.len()),
            Op::Store | Op::PushLoop | Op::PopLoop | Op::PopJmp => write!(f, "{}", self.mnemonic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_are_stable() {
        assert_eq!(Op::PushLoop.mnemonic(), "PUSH_LOOP");
        assert_eq!(Op::MemCall(CallInfo::default()).mnemonic(), "MEM_CALL");
    }

    #[test]
    fn jump_target_roundtrip() {
        let mut op = Op::Jmp(10);
        assert_eq!(op.jump_target(), Some(10));
        op.set_jump_target(42);
        assert_eq!(op.jump_target(), Some(42));
        assert_eq!(Op::Store.jump_target(), None);
    }

    #[test]
    fn display_matches_textual_dump_shape() {
        let s = format!("{}", Op::LoadData(LoadOperand::Int(42)));
        assert!(s.starts_with("LOAD_DATA"));
        assert!(s.contains("42"));
    }
}

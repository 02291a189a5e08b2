//! Payload types for the non-scalar [`super::ValueData`] variants.

use std::sync::Arc;

use parking_lot::Mutex;

use wisp_core::Loc;

use crate::error::VmResult;
use crate::typetable::TypeId;
use crate::util::OrderedMap;

use super::Value;

/// spec §3: `Vec { elems: Vec<Value>, refs: bool }`. `refs=true` means
/// insertion borrows (ref-bumps) rather than deep-copying — set on the
/// vector produced by e.g. a variadic parameter capture, where the
/// elements already belong to the caller's argument list.
pub struct VecObj {
    pub elems: Mutex<Vec<Value>>,
    pub refs: bool,
}

impl VecObj {
    pub fn new(elems: Vec<Value>, refs: bool) -> Self {
        Self { elems: Mutex::new(elems), refs }
    }
}

pub struct MapObj {
    pub entries: Mutex<OrderedMap<Value>>,
    pub refs: bool,
}

impl MapObj {
    pub fn new(entries: OrderedMap<Value>, refs: bool) -> Self {
        Self { entries: Mutex::new(entries), refs }
    }
}

/// Where a `Fn` value's body lives: an instruction range inside its
/// defining module's chunk, or a native Rust closure (spec's `is_native`
/// flag, modeled as a variant instead since the two cases carry different
/// payloads).
#[derive(Clone)]
pub enum FnBody {
    Bytecode { module_id: u16, begin: usize, end: usize },
    Native(Arc<NativeFn>),
}

pub type NativeFnResult = VmResult<Value>;

/// A host (Rust) function pluggable into the type-function table or
/// global scope — the mechanism both the embedded prelude (`print`,
/// `vec.new`, ...) and, in principle, a loaded native module (spec §6.4)
/// use to introduce callables that aren't compiled Wisp bytecode.
pub struct NativeFn {
    pub name: String,
    pub arity: std::ops::RangeInclusive<usize>,
    pub f: Box<dyn Fn(&mut crate::interp::Interp, CallArgs, Loc) -> NativeFnResult + Send + Sync>,
}

/// spec §3 `Fn { module_id, kw_arg_name, var_arg_name, param_names,
/// default_params, body, is_native }`.
#[derive(Clone)]
pub struct FnObj {
    pub module_id: u16,
    pub kw_arg_name: Option<String>,
    pub var_arg_name: Option<String>,
    pub param_names: Vec<String>,
    pub default_params: OrderedMap<Value>,
    pub body: FnBody,
}

impl FnObj {
    pub fn is_native(&self) -> bool {
        matches!(self.body, FnBody::Native(_))
    }
}

/// Positional/keyword call arguments, matching `on_call(args, assn_args,
/// ...)` (spec §4.5). `positional[0]` is the receiver (or nil for a bare
/// `CALL`) per the interpreter's calling convention.
#[derive(Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: OrderedMap<Value>,
}

impl CallArgs {
    pub fn receiver(&self) -> &Value {
        &self.positional[0]
    }

    /// Positional arguments excluding the receiver slot.
    pub fn args(&self) -> &[Value] {
        &self.positional[1..]
    }
}

/// spec §3 `Module { module_ref, vars_frame }`: attribute access on a
/// `Module` value routes through `vars_frame`, the module's top-level
/// variable bindings, populated once the module's bytecode has run.
pub struct ModuleObj {
    pub module_id: u16,
    pub path: Arc<str>,
    pub vars_frame: Mutex<OrderedMap<Value>>,
}

/// spec §3 `StructDef { attr_order, attr_defaults, struct_id }`.
#[derive(Clone)]
pub struct StructDefObj {
    pub attr_order: Vec<String>,
    pub attr_defaults: OrderedMap<Value>,
    pub struct_id: TypeId,
}

/// spec §3 `Struct { attrs, base, struct_id }`; `base` supplies attribute
/// *defaults* only (SPEC_FULL §3) — method dispatch still goes through the
/// type-function table keyed by `struct_id`, with `All` fallthrough.
pub struct StructObj {
    pub attrs: Mutex<OrderedMap<Value>>,
    pub base: Option<Value>,
    pub struct_id: TypeId,
}

/// `enum(...)` builder (SPEC_FULL §3): an ordered name→tag map. Calling it
/// with a variant name returns a plain tagged `Int`, not a distinct value
/// kind — enum instances have no runtime identity beyond their integer tag
/// and the defining `EnumDef` used to look names back up.
#[derive(Clone)]
pub struct EnumDefObj {
    pub variants: OrderedMap<i64>,
    pub enum_id: TypeId,
}

/// A generic forward cursor produced by a container's `begin`/`next` and
/// compared against `end`. Built-in `Vec`/`Map`/`Str` iteration uses plain
/// `Int` cursors instead (spec's `for-in` protocol only requires
/// `begin/end/next/at`, not a dedicated value kind, for those); this
/// variant exists for cursors that need to carry more state than an
/// index, such as the prelude's `range(start, end[, step])`.
#[derive(Clone)]
pub struct IterObj {
    pub cur: i64,
    pub end: i64,
    pub step: i64,
}

impl IterObj {
    pub fn at_end(&self) -> bool {
        if self.step >= 0 {
            self.cur >= self.end
        } else {
            self.cur <= self.end
        }
    }
}

/// A spawned thread's handle (spec §4.9: "wrap the handle and future in
/// a thread value"). `handle` is consumed on `join`, so a second join
/// fails cleanly instead of panicking.
pub struct ThreadObj {
    pub id: i32,
    pub handle: Mutex<Option<std::thread::JoinHandle<VmResult<Value>>>>,
}

//! The interpreter loop (spec component N, §4.6): per-thread bytecode
//! execution over one [`Chunk`] at a time, with the operand stack, the
//! variable scope stack, and the `or`-handler fail stack it owns.
//!
//! Every binary/unary operator and every attribute/method access funnels
//! through [`Interp::resolve_member`] and [`Interp::do_call`] — there are
//! no dedicated arithmetic instructions (see `wisp-compiler::codegen`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use wisp_core::bytecode::{ArgKind, CallInfo, FnArgInfo, LoadOperand};
use wisp_core::{Chunk, Loc, Op};

use crate::error::{Failure, VmError, VmResult};
use crate::scope::ScopeStack;
use crate::util::OrderedMap;
use crate::value::object::{CallArgs, EnumDefObj, FnBody, FnObj, StructDefObj, StructObj};
use crate::value::{type_name, Value, ValueData};
use crate::Global;

/// One operand-stack slot: the value plus, when it came directly from a
/// `LOAD_DATA(Iden(name))`, the name it was loaded from. `STORE` needs
/// that name to rebind the scope entry after `on_set` — scalars have no
/// interior mutability to do the job implicitly (see `value/mod.rs`'s
/// `on_set` doc comment), so the identifier travels with the value
/// instead of being recovered from the bytecode around it.
struct Slot {
    value: Value,
    ident: Option<String>,
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Self { value, ident: None }
    }
}

/// One open `try ... or` block (spec §4.4/§4.6): where to jump on an
/// unhandled failure, and how much of the operand stack / current
/// frame's block layers to unwind first.
struct FailEntry {
    handler_target: usize,
    stack_len: usize,
    layer_depth: usize,
    name: Option<String>,
}

/// A single thread's worth of execution state (spec §5 "thread state"):
/// its own operand stack, scope stack, module stack, and recursion depth,
/// sharing one [`Global`] with every other thread. Holds an `Arc<Global>`
/// rather than a borrow so a thread spawned from script code (component Q,
/// `crate::thread`) can own its `Interp` for the `'static` lifetime
/// `std::thread::spawn` requires.
pub struct Interp {
    pub global: Arc<Global>,
    pub scope: ScopeStack,
    stack: Vec<Slot>,
    call_depth: u32,
}

impl Interp {
    pub fn new(global: Arc<Global>) -> Self {
        Self { global, scope: ScopeStack::default(), stack: Vec::new(), call_depth: 0 }
    }

    fn push(&mut self, v: Value) {
        self.stack.push(Slot::from(v));
    }

    fn push_ident(&mut self, v: Value, name: String) {
        self.stack.push(Slot { value: v, ident: Some(name) });
    }

    fn pop(&mut self, loc: Loc) -> VmResult<Slot> {
        self.stack.pop().ok_or_else(|| Failure::new(VmError::RuntimeValue("operand stack underflow".into()), loc))
    }

    fn peek(&self, loc: Loc) -> VmResult<&Value> {
        self.stack.last().map(|s| &s.value).ok_or_else(|| Failure::new(VmError::RuntimeValue("operand stack underflow".into()), loc))
    }

    fn current_module_id(&self) -> u16 {
        self.scope.current_ref().module_id
    }

    /// Spec §3's three-tier name lookup: the active frame's layers, then
    /// any still-executing frame belonging to the same module (a closure
    /// called back into its own module before that module's top-level
    /// code has finished and synced `vars_frame`), then the module's
    /// finalized top-level bindings, then the shared global frame.
    fn resolve_name(&self, name: &str, loc: Loc) -> VmResult<Value> {
        if let Some(v) = self.scope.current_ref().resolve(name) {
            return Ok(v);
        }
        let module_id = self.current_module_id();
        for (i, frame) in self.scope.frames_rev().enumerate() {
            if i == 0 {
                continue;
            }
            if frame.module_id == module_id {
                if let Some(v) = frame.resolve(name) {
                    return Ok(v);
                }
            }
        }
        if let Some(v) = self.global.modules.lookup_var(module_id, name) {
            return Ok(v);
        }
        if let Some(v) = self.global.globals.lock().get(name).cloned() {
            return Ok(v);
        }
        Err(Failure::new(VmError::RuntimeValue(format!("undefined variable `{name}`")), loc))
    }

    /// Own-attribute lookup only (no type-function fallthrough) — the
    /// first half of spec §4.6's `ATTR`/member-dispatch contract.
    fn get_own_attr(&self, recv: &Value, name: &str) -> Option<Value> {
        match recv.data() {
            ValueData::Struct(s) => {
                if let Some(v) = s.attrs.lock().get(name).cloned() {
                    return Some(v);
                }
                s.base.as_ref().and_then(|b| self.get_own_attr(b, name))
            }
            ValueData::Module(m) => m.vars_frame.lock().get(name).cloned(),
            ValueData::Map(m) => m.entries.lock().get(name).cloned(),
            ValueData::EnumDef(e) => e.variants.get(name).map(|&tag| Value::int(tag)),
            _ => None,
        }
    }

    /// Full member resolution (spec §4.6 `ATTR`, and the callee half of
    /// `MEM_CALL`): own attributes first, then the type-function table
    /// keyed by the receiver's type, falling through to `All`.
    ///
    /// Deliberately does *not* copy an own-attribute hit: `resolve_member`
    /// is also how a `MEM_CALL` receiver reaches a mutating method (e.g.
    /// `obj.field.push(x)` loads `obj.field` through here before the
    /// `push` dispatch), so handing back the actual stored value — not an
    /// independent copy of it — is what lets the mutation land. Copying
    /// happens only at a genuine bind site (`Create`/`Store`/`CreateIn`),
    /// matching the source's "copy only on assignment" contract (spec §3).
    fn resolve_member(&self, recv: &Value, name: &str, loc: Loc) -> VmResult<Value> {
        if let Some(v) = self.get_own_attr(recv, name) {
            return Ok(v);
        }
        if let Some(f) = self.global.types.lookup(recv.type_id(), name) {
            return Ok(f);
        }
        Err(Failure::new(
            VmError::RuntimeType(format!("no attribute or method `{name}` on {}", type_name(recv.data()))),
            loc,
        ))
    }

    fn set_own_attr(&self, recv: &Value, name: &str, val: &Value, loc: Loc) -> VmResult<()> {
        match recv.data() {
            ValueData::Struct(s) => {
                s.attrs.lock().insert(name.to_string(), val.copy(loc)?);
                Ok(())
            }
            ValueData::Module(m) => {
                m.vars_frame.lock().insert(name.to_string(), val.copy(loc)?);
                Ok(())
            }
            ValueData::Map(m) => {
                m.entries.lock().insert(name.to_string(), val.copy(loc)?);
                Ok(())
            }
            _ => Err(Failure::new(VmError::RuntimeType(format!("{} has no settable attributes", type_name(recv.data()))), loc)),
        }
    }

    /// Runs `chunk` starting at `ip` until a `RETURN` (or an unrecovered
    /// failure). Used both for a module's top-level code and for every
    /// bytecode function call — the Rust call stack models the Wisp call
    /// stack, so `try`/`or` (which never spans a call boundary; see
    /// `wisp-compiler::codegen::compile_try_or`) can keep its fail stack
    /// local to one invocation of this function.
    pub fn run(&mut self, chunk: &Chunk, mut ip: usize) -> VmResult<Value> {
        let mut fail_stack: Vec<FailEntry> = Vec::new();

        loop {
            let Some(instr) = chunk.ops.get(ip) else {
                // Falling off the end of the instruction stream (a
                // module's top-level code has no trailing `RETURN`,
                // unlike a function body, which always gets one from
                // `wisp-compiler::codegen::compile_fn_def`): hand back
                // whatever `wisp-compiler::codegen::compile_program` left
                // on the stack for its last statement, or nil if the
                // module ended on a non-expression statement.
                return Ok(self.stack.pop().map(|s| s.value).unwrap_or_else(Value::nil));
            };
            let loc = instr.loc;
            // Cooperative cancellation (spec §5): unwind at the next
            // instruction boundary once `request_stop`/`exit` has set the
            // shared flag, without reporting a further diagnostic.
            if self.global.should_stop() {
                let code = self.global.exit_code().unwrap_or(0);
                return Err(Failure::new(VmError::Exit(code), loc));
            }
            match self.step(&instr.op, loc, &mut ip, &mut fail_stack) {
                Ok(StepResult::Continue) => {}
                Ok(StepResult::Return(v)) => return Ok(v),
                Err(failure) => {
                    if matches!(failure.kind, VmError::Exit(_)) {
                        return Err(failure);
                    }
                    match fail_stack.pop() {
                        Some(entry) => {
                            self.stack.truncate(entry.stack_len);
                            self.scope.current().layers.truncate(entry.layer_depth.max(1));
                            self.scope.current().push_layers(1);
                            if let Some(name) = entry.name {
                                let err_value = Value::str(failure.message());
                                self.scope.current().declare(name, err_value);
                            }
                            ip = entry.handler_target + 1;
                        }
                        None => return Err(failure),
                    }
                }
            }
        }
    }

    fn step(&mut self, op: &Op, loc: Loc, ip: &mut usize, fail_stack: &mut Vec<FailEntry>) -> VmResult<StepResult> {
        match op {
            Op::LoadData(operand) => {
                match operand {
                    LoadOperand::Nil => self.push(Value::nil()),
                    LoadOperand::Bool(b) => self.push(Value::bool(*b)),
                    LoadOperand::Int(i) => self.push(Value::int(*i)),
                    LoadOperand::Flt(f) => self.push(Value::flt(*f)),
                    LoadOperand::Str(s) => self.push(Value::str(s.clone())),
                    LoadOperand::Iden(name) => {
                        // No copy here: spec §3's copy-vs-share decision is
                        // made at the point a value is *bound* (`Store`,
                        // `Create`, `CreateIn`, a call's `bind_params`), not
                        // at every read — a bare load is just as often a
                        // `MEM_CALL` receiver for a mutating method (e.g.
                        // `v.push(x)`), which needs the real stored object,
                        // not an independent copy of it.
                        let v = self.resolve_name(name, loc)?;
                        self.push_ident(v, name.clone());
                    }
                }
                *ip += 1;
            }
            Op::Unload(n) => {
                for _ in 0..*n {
                    self.pop(loc)?;
                }
                *ip += 1;
            }
            Op::Store => {
                let val = self.pop(loc)?.value;
                let var = self.pop(loc)?;
                // Containers mutate `var.value`'s interior in place (so any
                // other alias of that same object observes the write too);
                // scalars have no interior to mutate, so the scope entry
                // has to be rebound to `val` (copied per the usual
                // copy-vs-share rule) instead.
                let mutated_in_place = var.value.on_set(&val)?;
                let stored = if mutated_in_place { var.value } else { val.copy(loc)? };
                if let Some(name) = &var.ident {
                    self.scope.current().assign(name, stored.clone());
                }
                self.push(stored);
                *ip += 1;
            }
            Op::Create(name) => {
                let val = self.pop(loc)?.value.copy(loc)?;
                self.scope.current().declare(name.clone(), val);
                *ip += 1;
            }
            Op::CreateIn(name) => {
                let recv = self.pop(loc)?.value;
                let val = self.pop(loc)?.value;
                if recv.is_attr_based() {
                    self.set_own_attr(&recv, name, &val, loc)?;
                } else {
                    self.global.types.register(recv.type_id(), name.clone(), val.clone());
                }
                self.push(val);
                *ip += 1;
            }
            Op::PushBlock(n) => {
                self.scope.current().push_layers(*n);
                *ip += 1;
            }
            Op::PopBlock(n) => {
                self.scope.current().pop_layers(*n);
                *ip += 1;
            }
            Op::PushLoop => {
                self.scope.current().push_loop();
                *ip += 1;
            }
            Op::PopLoop => {
                self.scope.current().pop_loop();
                *ip += 1;
            }
            Op::Return(has_value) => {
                let v = if *has_value { self.pop(loc)?.value } else { Value::nil() };
                return Ok(StepResult::Return(v));
            }
            Op::BlockTill(target) => {
                *ip = *target;
            }
            Op::CreateFn(info) => {
                let f = self.build_fn(info, loc)?;
                self.push(Value::function(f));
                *ip += 1;
            }
            Op::Continue(target) => {
                self.scope.current().unwind_to_innermost_loop();
                *ip = *target;
            }
            Op::Break(target) => {
                self.scope.current().pop_loop();
                *ip = *target;
            }
            Op::Jmp(target) => {
                *ip = *target;
            }
            Op::JmpTrue(target) => {
                if self.peek(loc)?.truthy()? {
                    *ip = *target;
                } else {
                    *ip += 1;
                }
            }
            Op::JmpFalse(target) => {
                if !self.peek(loc)?.truthy()? {
                    *ip = *target;
                } else {
                    *ip += 1;
                }
            }
            Op::JmpTruePop(target) => {
                let v = self.pop(loc)?.value;
                *ip = if v.truthy()? { *target } else { *ip + 1 };
            }
            Op::JmpFalsePop(target) => {
                let v = self.pop(loc)?.value;
                *ip = if !v.truthy()? { *target } else { *ip + 1 };
            }
            Op::JmpNil(target) => {
                if self.peek(loc)?.is_nil() {
                    self.pop(loc)?;
                    *ip = *target;
                } else {
                    *ip += 1;
                }
            }
            Op::PushJmp(target) => {
                fail_stack.push(FailEntry {
                    handler_target: *target,
                    stack_len: self.stack.len(),
                    layer_depth: self.scope.current_ref().layers.len(),
                    name: None,
                });
                *ip += 1;
            }
            Op::PushJmpName(name) => {
                if let Some(entry) = fail_stack.last_mut() {
                    entry.name = Some(name.clone());
                }
                *ip += 1;
            }
            Op::PopJmp => {
                fail_stack.pop();
                *ip += 1;
            }
            Op::Attr(name) => {
                let recv = self.pop(loc)?.value;
                let v = self.resolve_member(&recv, name, loc)?;
                self.push(v);
                *ip += 1;
            }
            Op::Call(info) => {
                let callee = self.pop(loc)?.value;
                let call_args = self.collect_call_args(info, Value::nil(), loc)?;
                let result = self.do_call(&callee, call_args, loc)?;
                self.push(result);
                *ip += 1;
            }
            Op::MemCall(info) => {
                let name = self.pop(loc)?.value;
                let ValueData::Str(name) = name.data() else {
                    return Err(Failure::new(VmError::RuntimeType("method name must be a string".into()), loc));
                };
                let name = name.lock().clone();
                let recv = self.pop(loc)?.value;
                let callee = self.resolve_member(&recv, &name, loc)?;
                let call_args = self.collect_call_args(info, recv, loc)?;
                let result = self.do_call(&callee, call_args, loc)?;
                self.push(result);
                *ip += 1;
            }
        }
        Ok(StepResult::Continue)
    }

    fn collect_call_args(&mut self, info: &CallInfo, receiver: Value, loc: Loc) -> VmResult<CallArgs> {
        let mut positional = Vec::new();
        let mut keyword = OrderedMap::new();
        for kind in &info.0 {
            let v = self.pop(loc)?.value;
            match kind {
                ArgKind::Positional => positional.push(v),
                ArgKind::Keyword(name) => {
                    keyword.insert(name.clone(), v);
                }
                ArgKind::Unpack => match v.data() {
                    ValueData::Vec(vo) => positional.extend(vo.elems.lock().iter().cloned()),
                    ValueData::Map(mo) => {
                        for (k, mv) in mo.entries.lock().iter() {
                            keyword.insert(k.to_string(), mv.clone());
                        }
                    }
                    _ => return Err(Failure::new(VmError::RuntimeType("cannot unpack this value as call arguments".into()), loc)),
                },
            }
        }
        let mut full = Vec::with_capacity(positional.len() + 1);
        full.push(receiver);
        full.extend(positional);
        Ok(CallArgs { positional: full, keyword })
    }

    fn build_fn(&mut self, info: &FnArgInfo, loc: Loc) -> VmResult<FnObj> {
        let mut defaults_by_idx: Vec<(usize, Value)> = Vec::with_capacity(info.defaulted.len());
        for &idx in info.defaulted.iter().rev() {
            let v = self.pop(loc)?.value;
            defaults_by_idx.push((idx, v));
        }
        let mut default_params = OrderedMap::new();
        for (idx, v) in defaults_by_idx {
            default_params.insert(info.param_names[idx].clone(), v);
        }
        Ok(FnObj {
            module_id: self.current_module_id(),
            kw_arg_name: info.kw_arg_name.clone(),
            var_arg_name: info.var_arg_name.clone(),
            param_names: info.param_names.clone(),
            default_params,
            body: FnBody::Bytecode { module_id: self.current_module_id(), begin: info.body_begin, end: info.body_end },
        })
    }

    /// The calling convention (spec §4.5): `call_args.positional[0]` is
    /// always the receiver slot (nil for a bare `CALL`, the dispatch
    /// receiver for a `MEM_CALL`) and is bound to the implicit name
    /// `self` in the callee's new frame, never consumed by
    /// `param_names` — so an ordinary function never has to declare an
    /// unused leading parameter just to catch it, and a struct method
    /// gets `self` for free the same way native methods read it via
    /// `CallArgs::receiver`.
    pub fn do_call(&mut self, callee: &Value, call_args: CallArgs, loc: Loc) -> VmResult<Value> {
        if !callee.is_callable() {
            return Err(Failure::new(VmError::RuntimeType(format!("{} is not callable", type_name(callee.data()))), loc));
        }
        match callee.data() {
            ValueData::Fn(f) => self.call_fn(f.clone(), call_args, loc),
            ValueData::StructDef(d) => self.instantiate_struct(d, &call_args, loc),
            ValueData::EnumDef(e) => self.call_enum(e, &call_args, loc),
            _ => Err(Failure::new(VmError::RuntimeType(format!("{} is not callable", type_name(callee.data()))), loc)),
        }
    }

    fn call_fn(&mut self, f: FnObj, call_args: CallArgs, loc: Loc) -> VmResult<Value> {
        match &f.body {
            FnBody::Native(nf) => {
                let argc = call_args.args().len();
                if !nf.arity.contains(&argc) {
                    return Err(Failure::new(
                        VmError::RuntimeValue(format!("{} expects {:?} arguments, got {argc}", nf.name, nf.arity)),
                        loc,
                    ));
                }
                (nf.f)(self, call_args, loc)
            }
            FnBody::Bytecode { module_id, begin, .. } => {
                self.call_depth += 1;
                if self.call_depth > self.global.recursion_limit {
                    self.call_depth -= 1;
                    return Err(Failure::new(VmError::RecursionExceeded, loc));
                }
                let module = self
                    .global
                    .modules
                    .get(*module_id)
                    .ok_or_else(|| Failure::new(VmError::RuntimeValue("function's module is gone".into()), loc))?;
                self.scope.push_frame(*module_id);
                let result = self.bind_params(&f, &call_args, loc).and_then(|()| self.run(&module.chunk, *begin));
                self.scope.pop_frame();
                self.call_depth -= 1;
                result.map_err(|mut e| {
                    e.push_frame(loc);
                    e
                })
            }
        }
    }

    fn bind_params(&mut self, f: &FnObj, call_args: &CallArgs, loc: Loc) -> VmResult<()> {
        self.scope.current().declare("self", call_args.receiver().clone());
        let args = call_args.args();
        let mut keyword = call_args.keyword.clone();
        for (i, name) in f.param_names.iter().enumerate() {
            let value = if let Some(v) = keyword.remove(name) {
                v.copy(loc)?
            } else if let Some(v) = args.get(i) {
                v.copy(loc)?
            } else if let Some(v) = f.default_params.get(name) {
                v.copy(loc)?
            } else {
                return Err(Failure::new(VmError::RuntimeValue(format!("missing required argument `{name}`")), loc));
            };
            self.scope.current().declare(name.clone(), value);
        }
        if let Some(var_name) = &f.var_arg_name {
            let extra: Vec<Value> = if args.len() > f.param_names.len() { args[f.param_names.len()..].to_vec() } else { Vec::new() };
            self.scope.current().declare(var_name.clone(), Value::vec(extra, true));
        } else if args.len() > f.param_names.len() {
            return Err(Failure::new(VmError::RuntimeValue("too many arguments".into()), loc));
        }
        if let Some(kw_name) = &f.kw_arg_name {
            self.scope.current().declare(kw_name.clone(), Value::map(keyword, false));
        }
        Ok(())
    }

    fn instantiate_struct(&mut self, d: &StructDefObj, call_args: &CallArgs, loc: Loc) -> VmResult<Value> {
        let mut attrs = OrderedMap::new();
        for (name, default) in d.attr_defaults.iter() {
            attrs.insert(name.to_string(), default.copy(loc)?);
        }
        let base = call_args.keyword.get("base").cloned();
        if let Some(base) = &base {
            if let ValueData::Struct(bs) = base.data() {
                for (name, value) in bs.attrs.lock().iter() {
                    if !attrs.contains_key(name) {
                        attrs.insert(name.to_string(), value.copy(loc)?);
                    }
                }
            }
        }
        for (i, name) in d.attr_order.iter().enumerate() {
            if let Some(v) = call_args.args().get(i) {
                attrs.insert(name.clone(), v.copy(loc)?);
            }
        }
        for (k, v) in call_args.keyword.iter() {
            if k != "base" {
                attrs.insert(k.to_string(), v.copy(loc)?);
            }
        }
        Ok(Value::struct_instance(StructObj { attrs: Mutex::new(attrs), base, struct_id: d.struct_id }))
    }

    fn call_enum(&mut self, e: &EnumDefObj, call_args: &CallArgs, loc: Loc) -> VmResult<Value> {
        let arg = call_args.args().first().ok_or_else(|| Failure::new(VmError::RuntimeValue("enum() needs a variant name".into()), loc))?;
        let ValueData::Str(s) = arg.data() else {
            return Err(Failure::new(VmError::RuntimeType("enum variant name must be a string".into()), loc));
        };
        let name = s.lock().clone();
        e.variants
            .get(&name)
            .map(|&tag| Value::int(tag))
            .ok_or_else(|| Failure::new(VmError::RuntimeValue(format!("no such variant `{name}`")), loc))
    }

    /// Executes one module's top-level code, in its own fresh frame, and
    /// syncs the finalized top-level bindings back to the module registry
    /// (spec §3 `Module.vars_frame`, consulted by [`Interp::resolve_name`]
    /// for closures called after their defining module has loaded).
    pub fn run_module_top_level(&mut self, module_id: u16, chunk: &Chunk) -> VmResult<Value> {
        #[cfg(feature = "trace")]
        let _span = tracing::debug_span!("module_top_level", module_id).entered();
        self.scope.push_frame(module_id);
        let result = self.run(chunk, 0);
        let frame = self.scope.pop_frame().expect("frame just pushed");
        if result.is_ok() {
            let mut vars = OrderedMap::new();
            for layer in &frame.layers {
                for (k, v) in layer.iter() {
                    vars.insert(k.to_string(), v.clone());
                }
            }
            self.global.modules.set_vars(module_id, vars);
        }
        result
    }

    /// The directory of the module currently executing, used to resolve
    /// `import(name)`/relative finder lookups (spec §4.7) the way the
    /// built-in finder resolves an importing module's own sibling files.
    pub fn current_module_dir(&self) -> Option<PathBuf> {
        let id = self.current_module_id();
        let record = self.global.modules.get(id)?;
        Path::new(&record.path).parent().map(|p| p.to_path_buf())
    }

    /// Loads (compiling and caching by path if new) and runs `path` as a
    /// module, exactly the entry-point logic `Vm::run_file` exposes to an
    /// embedder — factored here so the script-level `import(...)` builtin
    /// can reach it from inside a native function call.
    pub fn run_file(&mut self, path: &Path) -> VmResult<Value> {
        let record = self.global.modules.load(path)?;
        if let Some(cached) = self.global.modules.cached_value(record.id) {
            return Ok(cached);
        }
        let result = self.run_module_top_level(record.id, &record.chunk);
        if let Ok(v) = &result {
            self.global.modules.cache_value(record.id, v.clone());
        }
        result
    }

    /// Script-level `import(name)` (spec §4.7 scenario 6): resolve through
    /// the registered finders relative to `from_dir`, then load-and-run,
    /// cached by path so a module's top-level code runs at most once no
    /// matter how many times it's imported.
    pub fn import(&mut self, name: &str, from_dir: Option<&Path>, loc: Loc) -> VmResult<Value> {
        let path = self
            .global
            .modules
            .resolve(name, true, from_dir)
            .ok_or_else(|| Failure::new(VmError::Import(format!("module not found: {name}")), loc))?;
        self.run_file(&path)
    }
}

enum StepResult {
    Continue,
    Return(Value),
}

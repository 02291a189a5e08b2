//! Concrete content of component I/J (spec §3/§4.5): the global functions
//! and per-type method tables that every compiled operator method call
//! (`wisp-compiler::codegen::bin_method`/`un_method`) and the embedded
//! prelude (`prelude.rs`) resolve against.
//!
//! Registered once, at VM start (`Global::new`), under the type table's
//! write lock; every method dispatch afterwards is a read (see
//! `typetable.rs`'s doc comment).

use std::sync::Arc;

use wisp_core::Loc;

use crate::error::{Failure, VmError, VmResult};
use crate::native::{native_fn, NativeRegistrar};
use crate::typetable::builtin_type;
use crate::util::OrderedMap;
use crate::value::object::CallArgs;
use crate::value::{type_name, Value, ValueData};
use crate::Global;

pub fn install(global: &Arc<Global>) {
    let reg = NativeRegistrar { globals: &global.globals, types: &global.types };
    install_global_fns(&reg);
    install_type_refs(&reg);
    install_int(&reg);
    install_flt(&reg);
    install_bool(&reg);
    install_str(&reg);
    install_vec(&reg);
    install_map(&reg);
    install_thread(&reg);
    install_all(&reg);
}

fn type_err(a: &Value, b: &Value, what: &str, loc: Loc) -> Failure {
    Failure::new(VmError::RuntimeType(format!("{what} not defined for {} and {}", type_name(a.data()), type_name(b.data()))), loc)
}

fn is_zero(v: &Value) -> bool {
    matches!(v.data(), ValueData::Int(0)) || matches!(v.data(), ValueData::Flt(f) if *f == 0.0)
}

/// Int-or-Flt promotion shared by every arithmetic method: two ints stay
/// int (wrapping, spec §8 boundary behavior), any float operand promotes
/// both sides to float — matching `wisp-compiler::simplify`'s constant
/// folding exactly, so a folded and an unfolded program agree.
fn arith(a: &Value, b: &Value, loc: Loc, fi: impl Fn(i64, i64) -> i64, ff: impl Fn(f64, f64) -> f64) -> VmResult<Value> {
    match (a.data(), b.data()) {
        (ValueData::Int(x), ValueData::Int(y)) => Ok(Value::int(fi(*x, *y))),
        (ValueData::Int(x), ValueData::Flt(y)) => Ok(Value::flt(ff(*x as f64, *y))),
        (ValueData::Flt(x), ValueData::Int(y)) => Ok(Value::flt(ff(*x, *y as f64))),
        (ValueData::Flt(x), ValueData::Flt(y)) => Ok(Value::flt(ff(*x, *y))),
        _ => Err(type_err(a, b, "arithmetic", loc)),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v.data() {
        ValueData::Int(i) => Some(*i as f64),
        ValueData::Flt(f) => Some(*f),
        _ => None,
    }
}

fn cmp(a: &Value, b: &Value, loc: Loc) -> VmResult<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y).ok_or_else(|| Failure::new(VmError::RuntimeValue("NaN is not ordered".into()), loc));
    }
    if let (ValueData::Str(x), ValueData::Str(y)) = (a.data(), b.data()) {
        return Ok(x.lock().cmp(&y.lock()));
    }
    Err(type_err(a, b, "comparison", loc))
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.data(), b.data()) {
        (ValueData::Nil, ValueData::Nil) => true,
        (ValueData::Bool(x), ValueData::Bool(y)) => x == y,
        (ValueData::Char(x), ValueData::Char(y)) => x == y,
        (ValueData::Str(x), ValueData::Str(y)) => *x.lock() == *y.lock(),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn method(reg: &NativeRegistrar, type_id: crate::typetable::TypeId, name: &'static str, arity: std::ops::RangeInclusive<usize>, f: impl Fn(&mut crate::interp::Interp, CallArgs, Loc) -> VmResult<Value> + Send + Sync + 'static) {
    reg.register_method(type_id, name, native_fn(name, arity, f));
}

/// `print(...)` (spec §9's running example, SPEC_FULL §3): writes every
/// argument's display form separated by a space, then a newline — the one
/// piece of the prelude's I/O surface spec.md's scenarios actually exercise.
fn install_global_fns(reg: &NativeRegistrar) {
    reg.register_global(
        "print",
        native_fn("print", 0..=usize::MAX, |_, call: CallArgs, _| {
            let rendered: Vec<String> = call.args().iter().map(|v| v.display_string()).collect();
            println!("{}", rendered.join(" "));
            Ok(Value::nil())
        }),
    );

    reg.register_global(
        "typeof",
        native_fn("typeof", 1..=1, |_, call: CallArgs, _| Ok(Value::type_ref(call.args()[0].type_id()))),
    );

    // spec §9 supplemental: `struct(...)` is a builder taking only keyword
    // arguments (attribute name = default value), in declaration order.
    reg.register_global(
        "struct",
        native_fn("struct", 0..=0, |interp, call: CallArgs, _| {
            let struct_id = interp.global.types.alloc_user_type();
            let mut attr_order = Vec::new();
            let mut attr_defaults = OrderedMap::new();
            for (name, value) in call.keyword.iter() {
                attr_order.push(name.to_string());
                attr_defaults.insert(name.to_string(), value.clone());
            }
            Ok(Value::struct_def(crate::value::object::StructDefObj { attr_order, attr_defaults, struct_id }))
        }),
    );

    // `enum(...)` (SPEC_FULL §3): positional variant names, tagged 0, 1, 2...
    reg.register_global(
        "enum",
        native_fn("enum", 0..=usize::MAX, |interp, call: CallArgs, loc| {
            let enum_id = interp.global.types.alloc_user_type();
            let mut variants = OrderedMap::new();
            for (i, arg) in call.args().iter().enumerate() {
                let ValueData::Str(name) = arg.data() else {
                    return Err(Failure::new(VmError::RuntimeType("enum variant name must be a string".into()), loc));
                };
                variants.insert(name.lock().clone(), i as i64);
            }
            Ok(Value::enum_def(crate::value::object::EnumDefObj { variants, enum_id }))
        }),
    );

    // spec §5/SPEC_FULL §3: script-level `exit(code)` requests cooperative
    // shutdown; the interpreter loop observes `Global::should_stop` at the
    // next instruction boundary and unwinds as `VmError::Exit`.
    reg.register_global(
        "exit",
        native_fn("exit", 0..=1, |interp, call: CallArgs, loc| {
            let code = match call.args().first() {
                Some(v) => int_of(v, loc)? as i32,
                None => 0,
            };
            interp.global.set_exit_code(code);
            interp.global.request_stop();
            Err(Failure::new(VmError::Exit(code), loc))
        }),
    );

    // script-level `import(name)` (spec §4.7 scenario 6): resolved relative
    // to the importing module's own directory.
    reg.register_global(
        "import",
        native_fn("import", 1..=1, |interp, call: CallArgs, loc| {
            let name = str_of(&call.args()[0], loc)?;
            let from_dir = interp.current_module_dir();
            interp.import(&name, from_dir.as_deref(), loc)
        }),
    );

    // script-level `thread(callee, ...args)` (spec §4.9 "Creating a thread
    // from script code"): packages the callee plus the already-copied
    // trailing args and hands them to the thread VM.
    reg.register_global(
        "thread",
        native_fn("thread", 1..=usize::MAX, |interp, call: CallArgs, loc| {
            let callee = call.args()[0].clone();
            let args = call.args()[1..].iter().map(|v| v.copy(loc)).collect::<VmResult<Vec<_>>>()?;
            crate::thread::spawn(&interp.global, callee, args, loc)
        }),
    );
}

/// `vec`/`map` as globals (SPEC_FULL §3 "`print`, `vec.new`, `map.new`,
/// and so on are in scope"): each is a bare `TypeRef` value, and `.new(...)`
/// is registered once on `TYPE_ID` rather than once per type — the method
/// reads which concrete type the receiver points at and builds that.
fn install_type_refs(reg: &NativeRegistrar) {
    use builtin_type::{MAP, TYPE_ID, VEC};
    reg.register_global("vec", Value::type_ref(VEC));
    reg.register_global("map", Value::type_ref(MAP));
    method(reg, TYPE_ID, "new", 0..=usize::MAX, |_, c, loc| {
        let ValueData::TypeRef(t) = c.receiver().data() else { unreachable!("dispatched on TypeRef receiver") };
        match *t {
            VEC => Ok(Value::vec(c.args().iter().map(|v| v.copy(loc)).collect::<VmResult<Vec<_>>>()?, false)),
            MAP => {
                let mut m = OrderedMap::new();
                for (k, v) in c.keyword.iter() {
                    m.insert(k.to_string(), v.copy(loc)?);
                }
                Ok(Value::map(m, false))
            }
            other => Err(Failure::new(VmError::RuntimeType(format!("no .new() constructor for type {other}")), loc)),
        }
    });
}

fn int_of(v: &Value, loc: Loc) -> VmResult<i64> {
    match v.data() {
        ValueData::Int(i) => Ok(*i),
        _ => Err(Failure::new(VmError::RuntimeType(format!("expected int, got {}", type_name(v.data()))), loc)),
    }
}

fn str_of(v: &Value, loc: Loc) -> VmResult<String> {
    match v.data() {
        ValueData::Str(s) => Ok(s.lock().clone()),
        _ => Err(Failure::new(VmError::RuntimeType(format!("expected str, got {}", type_name(v.data()))), loc)),
    }
}

fn install_int(reg: &NativeRegistrar) {
    use builtin_type::INT;
    method(reg, INT, "add", 1..=1, |_, c, loc| arith(c.receiver(), &c.args()[0], loc, i64::wrapping_add, |a, b| a + b));
    method(reg, INT, "sub", 1..=1, |_, c, loc| arith(c.receiver(), &c.args()[0], loc, i64::wrapping_sub, |a, b| a - b));
    method(reg, INT, "mul", 1..=1, |_, c, loc| arith(c.receiver(), &c.args()[0], loc, i64::wrapping_mul, |a, b| a * b));
    method(reg, INT, "div", 1..=1, |_, c, loc| {
        let rhs = &c.args()[0];
        if is_zero(rhs) {
            return Err(Failure::new(VmError::RuntimeValue("division by zero".into()), loc));
        }
        arith(c.receiver(), rhs, loc, i64::wrapping_div, |a, b| a / b)
    });
    method(reg, INT, "mod", 1..=1, |_, c, loc| {
        let rhs = &c.args()[0];
        if is_zero(rhs) {
            return Err(Failure::new(VmError::RuntimeValue("division by zero".into()), loc));
        }
        arith(c.receiver(), rhs, loc, i64::wrapping_rem, |a, b| a % b)
    });
    method(reg, INT, "pow", 1..=1, |_, c, loc| {
        let a = as_f64(c.receiver()).unwrap();
        let b = as_f64(&c.args()[0]).ok_or_else(|| type_err(c.receiver(), &c.args()[0], "pow", loc))?;
        Ok(Value::flt(a.powf(b)))
    });
    method(reg, INT, "root", 1..=1, |_, c, loc| {
        let a = as_f64(c.receiver()).unwrap();
        let b = as_f64(&c.args()[0]).ok_or_else(|| type_err(c.receiver(), &c.args()[0], "root", loc))?;
        Ok(Value::flt(a.powf(1.0 / b)))
    });
    method(reg, INT, "band", 1..=1, |_, c, loc| Ok(Value::int(int_of(c.receiver(), loc)? & int_of(&c.args()[0], loc)?)));
    method(reg, INT, "bor", 1..=1, |_, c, loc| Ok(Value::int(int_of(c.receiver(), loc)? | int_of(&c.args()[0], loc)?)));
    method(reg, INT, "bxor", 1..=1, |_, c, loc| Ok(Value::int(int_of(c.receiver(), loc)? ^ int_of(&c.args()[0], loc)?)));
    method(reg, INT, "shl", 1..=1, |_, c, loc| Ok(Value::int(int_of(c.receiver(), loc)?.wrapping_shl(int_of(&c.args()[0], loc)? as u32))));
    method(reg, INT, "shr", 1..=1, |_, c, loc| Ok(Value::int(int_of(c.receiver(), loc)?.wrapping_shr(int_of(&c.args()[0], loc)? as u32))));
    method(reg, INT, "bnot", 0..=0, |_, c, loc| Ok(Value::int(!int_of(c.receiver(), loc)?)));
    method(reg, INT, "neg", 0..=0, |_, c, loc| Ok(Value::int(int_of(c.receiver(), loc)?.wrapping_neg())));
    method(reg, INT, "pos", 0..=0, |_, c, loc| Ok(Value::int(int_of(c.receiver(), loc)?)));

    // range cursor protocol for `for e in a..b`-shaped integer iteration —
    // an `Int` cursor answers its own `begin`/`end`/`next`/`at`
    // (trivially: a bare `Int` used as a for-in subject is its own
    // one-past-end cursor) so `for-in` over a plain count works the same
    // way as over a `Vec`.
    method(reg, INT, "begin", 0..=0, |_, _, _| Ok(Value::int(0)));
    method(reg, INT, "end", 0..=0, |_, c, loc| Ok(Value::int(int_of(c.receiver(), loc)?)));
    method(reg, INT, "next", 1..=1, |_, c, loc| Ok(Value::int(int_of(&c.args()[0], loc)? + 1)));
    method(reg, INT, "at", 1..=1, |_, c, loc| Ok(Value::int(int_of(&c.args()[0], loc)?)));
}

// `arith`'s int-path closure never runs here: these methods are only ever
// dispatched with a `Flt` receiver, so `(Int, Int)` can't occur — the
// closure is unreachable, not merely unused.
fn unreachable_int_path(_: i64, _: i64) -> i64 {
    unreachable!("install_flt methods always have a Flt receiver")
}

fn install_flt(reg: &NativeRegistrar) {
    use builtin_type::FLT;
    method(reg, FLT, "add", 1..=1, |_, c, loc| arith(c.receiver(), &c.args()[0], loc, unreachable_int_path, |a, b| a + b));
    method(reg, FLT, "sub", 1..=1, |_, c, loc| arith(c.receiver(), &c.args()[0], loc, unreachable_int_path, |a, b| a - b));
    method(reg, FLT, "mul", 1..=1, |_, c, loc| arith(c.receiver(), &c.args()[0], loc, unreachable_int_path, |a, b| a * b));
    method(reg, FLT, "div", 1..=1, |_, c, loc| {
        let rhs = &c.args()[0];
        if is_zero(rhs) {
            return Err(Failure::new(VmError::RuntimeValue("division by zero".into()), loc));
        }
        arith(c.receiver(), rhs, loc, unreachable_int_path, |a, b| a / b)
    });
    method(reg, FLT, "mod", 1..=1, |_, c, loc| arith(c.receiver(), &c.args()[0], loc, unreachable_int_path, |a, b| a % b));
    method(reg, FLT, "pow", 1..=1, |_, c, loc| {
        let a = as_f64(c.receiver()).unwrap();
        let b = as_f64(&c.args()[0]).ok_or_else(|| type_err(c.receiver(), &c.args()[0], "pow", loc))?;
        Ok(Value::flt(a.powf(b)))
    });
    method(reg, FLT, "root", 1..=1, |_, c, loc| {
        let a = as_f64(c.receiver()).unwrap();
        let b = as_f64(&c.args()[0]).ok_or_else(|| type_err(c.receiver(), &c.args()[0], "root", loc))?;
        Ok(Value::flt(a.powf(1.0 / b)))
    });
    method(reg, FLT, "neg", 0..=0, |_, c, _| Ok(Value::flt(-as_f64(c.receiver()).unwrap())));
    method(reg, FLT, "pos", 0..=0, |_, c, _| Ok(Value::flt(as_f64(c.receiver()).unwrap())));
}

// `not` is left to the `All` table (see `install_all`) since it's defined
// identically for every truthy-coercible value, not just `Bool`.
fn install_bool(reg: &NativeRegistrar) {
    use builtin_type::BOOL;
    method(reg, BOOL, "band", 1..=1, |_, c, _| Ok(Value::bool(c.receiver().truthy()? && c.args()[0].truthy()?)));
    method(reg, BOOL, "bor", 1..=1, |_, c, _| Ok(Value::bool(c.receiver().truthy()? || c.args()[0].truthy()?)));
}

fn install_str(reg: &NativeRegistrar) {
    use builtin_type::STR;
    method(reg, STR, "add", 1..=1, |_, c, loc| {
        let mut s = str_of(c.receiver(), loc)?;
        s.push_str(&c.args()[0].display_string());
        Ok(Value::str(s))
    });
    method(reg, STR, "len", 0..=0, |_, c, loc| Ok(Value::int(str_of(c.receiver(), loc)?.len() as i64)));
    method(reg, STR, "at", 1..=1, |_, c, loc| {
        let s = str_of(c.receiver(), loc)?;
        let i = int_of(&c.args()[0], loc)?;
        let byte = usize::try_from(i).ok().and_then(|i| s.as_bytes().get(i)).copied();
        byte.map(Value::char).ok_or_else(|| Failure::new(VmError::RuntimeValue("string index out of range".into()), loc))
    });
    method(reg, STR, "set", 2..=2, |_, c, loc| {
        let i = int_of(&c.args()[0], loc)?;
        let repl = c.args()[1].display_string();
        let recv = c.receiver();
        let ValueData::Str(cell) = recv.data() else { unreachable!("dispatched on Str receiver") };
        let mut s = cell.lock();
        let i = usize::try_from(i).ok().filter(|&i| i < s.len());
        let Some(i) = i else {
            return Err(Failure::new(VmError::RuntimeValue("string index out of range".into()), loc));
        };
        s.replace_range(i..i + 1, &repl);
        Ok(recv.clone())
    });
    method(reg, STR, "begin", 0..=0, |_, _, _| Ok(Value::int(0)));
    method(reg, STR, "end", 0..=0, |_, c, loc| Ok(Value::int(str_of(c.receiver(), loc)?.len() as i64)));
    method(reg, STR, "next", 1..=1, |_, c, loc| Ok(Value::int(int_of(&c.args()[0], loc)? + 1)));
    // eq/ne/lt/gt/le/ge fall through to the `All` table (see `install_all`):
    // `cmp`/`value_eq` already special-case `Str`, so a per-type override
    // here would just be a duplicate of the same logic.
}

fn vec_len(v: &Value) -> usize {
    match v.data() {
        ValueData::Vec(vo) => vo.elems.lock().len(),
        _ => 0,
    }
}

fn install_vec(reg: &NativeRegistrar) {
    use builtin_type::VEC;
    method(reg, VEC, "at", 1..=1, |_, c, loc| {
        let ValueData::Vec(vo) = c.receiver().data() else { unreachable!("dispatched on Vec receiver") };
        let i = int_of(&c.args()[0], loc)?;
        let elems = vo.elems.lock();
        let i = usize::try_from(i).ok().filter(|&i| i < elems.len());
        match i {
            Some(i) => elems[i].copy(loc),
            None => Err(Failure::new(VmError::RuntimeValue("vec index out of range".into()), loc)),
        }
    });
    method(reg, VEC, "set", 2..=2, |_, c, loc| {
        let ValueData::Vec(vo) = c.receiver().data() else { unreachable!("dispatched on Vec receiver") };
        let i = int_of(&c.args()[0], loc)?;
        let val = c.args()[1].copy(loc)?;
        let mut elems = vo.elems.lock();
        let i = usize::try_from(i).ok().filter(|&i| i < elems.len());
        let Some(i) = i else {
            return Err(Failure::new(VmError::RuntimeValue("vec index out of range".into()), loc));
        };
        elems[i] = val;
        Ok(c.receiver().clone())
    });
    method(reg, VEC, "push", 1..=1, |_, c, loc| {
        let ValueData::Vec(vo) = c.receiver().data() else { unreachable!("dispatched on Vec receiver") };
        vo.elems.lock().push(c.args()[0].copy(loc)?);
        Ok(c.receiver().clone())
    });
    method(reg, VEC, "len", 0..=0, |_, c, _| Ok(Value::int(vec_len(c.receiver()) as i64)));
    method(reg, VEC, "add", 1..=1, |_, c, loc| {
        let ValueData::Vec(a) = c.receiver().data() else { unreachable!("dispatched on Vec receiver") };
        let ValueData::Vec(b) = c.args()[0].data() else {
            return Err(Failure::new(VmError::RuntimeType("vec.add() expects another vec".into()), loc));
        };
        let mut out = a.elems.lock().iter().map(|e| e.copy(loc)).collect::<VmResult<Vec<_>>>()?;
        out.extend(b.elems.lock().iter().map(|e| e.copy(loc)).collect::<VmResult<Vec<_>>>()?);
        Ok(Value::vec(out, false))
    });
    method(reg, VEC, "begin", 0..=0, |_, _, _| Ok(Value::int(0)));
    method(reg, VEC, "end", 0..=0, |_, c, _| Ok(Value::int(vec_len(c.receiver()) as i64)));
    method(reg, VEC, "next", 1..=1, |_, c, loc| Ok(Value::int(int_of(&c.args()[0], loc)? + 1)));
}

fn install_map(reg: &NativeRegistrar) {
    use builtin_type::MAP;
    // `Map.at(k)` for a missing key returns nil, not an error (spec §8).
    method(reg, MAP, "at", 1..=1, |_, c, loc| {
        let ValueData::Map(mo) = c.receiver().data() else { unreachable!("dispatched on Map receiver") };
        let k = str_of(&c.args()[0], loc)?;
        match mo.entries.lock().get(&k) {
            Some(v) => v.copy(loc),
            None => Ok(Value::nil()),
        }
    });
    method(reg, MAP, "set", 2..=2, |_, c, loc| {
        let ValueData::Map(mo) = c.receiver().data() else { unreachable!("dispatched on Map receiver") };
        let k = str_of(&c.args()[0], loc)?;
        let v = c.args()[1].copy(loc)?;
        mo.entries.lock().insert(k, v);
        Ok(c.receiver().clone())
    });
    method(reg, MAP, "len", 0..=0, |_, c, _| {
        let ValueData::Map(mo) = c.receiver().data() else { unreachable!("dispatched on Map receiver") };
        Ok(Value::int(mo.entries.lock().len() as i64))
    });
    // iteration protocol walks key order; `at(cursor)` hands back the key
    // (the common `for k in m { ... m.at(k) ... }` idiom), matching the
    // shape of the `for-in` desugaring in `wisp-compiler::parser`.
    method(reg, MAP, "begin", 0..=0, |_, _, _| Ok(Value::int(0)));
    method(reg, MAP, "end", 0..=0, |_, c, _| {
        let ValueData::Map(mo) = c.receiver().data() else { unreachable!("dispatched on Map receiver") };
        Ok(Value::int(mo.entries.lock().len() as i64))
    });
    method(reg, MAP, "next", 1..=1, |_, c, loc| Ok(Value::int(int_of(&c.args()[0], loc)? + 1)));
}

/// `Thread.join()` (spec §4.9: "Joining waits on the future and returns
/// the value"). The `thread(...)` global (see `install_global_fns`) is the
/// only way a script gets hold of a `Thread` value in the first place.
fn install_thread(reg: &NativeRegistrar) {
    use builtin_type::THREAD;
    method(reg, THREAD, "join", 0..=0, |_, c, loc| crate::thread::join(c.receiver(), loc));
}

/// Methods registered on `builtin_type::ALL` (spec §4.5: the universal
/// fallthrough) — equality and nil-coalescing are defined for every value
/// kind, including ones with no narrower method of their own.
fn install_all(reg: &NativeRegistrar) {
    use builtin_type::ALL;
    method(reg, ALL, "eq", 1..=1, |_, c, _| Ok(Value::bool(value_eq(c.receiver(), &c.args()[0]))));
    method(reg, ALL, "ne", 1..=1, |_, c, _| Ok(Value::bool(!value_eq(c.receiver(), &c.args()[0]))));
    method(reg, ALL, "lt", 1..=1, |_, c, loc| Ok(Value::bool(cmp(c.receiver(), &c.args()[0], loc)?.is_lt())));
    method(reg, ALL, "gt", 1..=1, |_, c, loc| Ok(Value::bool(cmp(c.receiver(), &c.args()[0], loc)?.is_gt())));
    method(reg, ALL, "le", 1..=1, |_, c, loc| Ok(Value::bool(cmp(c.receiver(), &c.args()[0], loc)?.is_le())));
    method(reg, ALL, "ge", 1..=1, |_, c, loc| Ok(Value::bool(cmp(c.receiver(), &c.args()[0], loc)?.is_ge())));
    method(reg, ALL, "coalesce", 1..=1, |_, c, loc| {
        if c.receiver().is_nil() {
            c.args()[0].copy(loc)
        } else {
            c.receiver().copy(loc)
        }
    });
    method(reg, ALL, "not", 0..=0, |_, c, loc| Ok(Value::bool(!c.receiver().truthy().map_err(|_| Failure::new(VmError::RuntimeType("not() needs a truthy value".into()), loc))?)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::BuiltinFinder;
    use crate::typetable::TypeTable;
    use crate::util::OrderedMap as OMap;
    use crate::VmOptions;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicBool, AtomicI32};

    fn global() -> Arc<Global> {
        let g = Arc::new(Global {
            modules: crate::module::ModuleRegistry::new(),
            types: TypeTable::new(),
            globals: PlMutex::new(OMap::new()),
            natives: crate::native::NativeLoader::new(),
            recursion_limit: VmOptions::default().recursion_limit,
            stop: AtomicBool::new(false),
            exit_code: PlMutex::new(None),
            next_thread_id: AtomicI32::new(1),
        });
        g.modules.add_finder(Box::new(BuiltinFinder { install_lib_dir: None }));
        install(&g);
        g
    }

    #[test]
    fn int_add_dispatches_through_type_table() {
        let g = global();
        let add = g.types.lookup(builtin_type::INT, "add").expect("registered");
        let mut interp = crate::interp::Interp::new(g);
        let call = CallArgs { positional: vec![Value::int(2), Value::int(3)], keyword: Default::default() };
        let result = interp.do_call(&add, call, Loc::synthetic()).unwrap();
        assert_eq!(format!("{result}"), "5");
    }

    #[test]
    fn map_at_missing_key_is_nil_not_error() {
        let g = global();
        let at = g.types.lookup(builtin_type::MAP, "at").expect("registered");
        let mut interp = crate::interp::Interp::new(g);
        let call = CallArgs { positional: vec![Value::map(OMap::new(), false), Value::str("missing")], keyword: Default::default() };
        let result = interp.do_call(&at, call, Loc::synthetic()).unwrap();
        assert!(result.is_nil());
    }

    #[test]
    fn struct_builder_allocates_a_fresh_type_id() {
        let g = global();
        let struct_fn = g.globals.lock().get("struct").cloned().expect("registered");
        let mut interp = crate::interp::Interp::new(g);
        let mut kw = OMap::new();
        kw.insert("x", Value::int(0));
        let call = CallArgs { positional: vec![Value::nil()], keyword: kw };
        let def = interp.do_call(&struct_fn, call, Loc::synthetic()).unwrap();
        let ValueData::StructDef(d) = def.data() else { panic!("expected struct def") };
        assert!(d.struct_id >= crate::typetable::builtin_type::FIRST_USER);
    }
}

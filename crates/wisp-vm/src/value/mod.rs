//! The value model (spec component I, §3): a closed enum of heap values
//! sharing one reference-counted header.
//!
//! The source runtime hand-rolls refcounting (`inc_ref`/`dec_ref`) on a
//! tagged base class. Rust already has exactly that primitive — `Arc`'s
//! strong count *is* the refcount, `Clone` *is* `inc_ref`, and `Drop`
//! recursively tearing down owned children when the count hits zero *is*
//! `dec_ref` — so [`Value`] is a thin wrapper around `Arc<ValueBox>`
//! instead of a hand-written counter. `flags` is an `AtomicU8` rather than
//! a plain byte so that `Value` stays `Send + Sync` (spec §5: values cross
//! thread boundaries; refcounts and flags have to tolerate that).
//!
//! Mutable containers (`Vec`, `Map`, `Struct` attributes) hold their
//! payload behind a `parking_lot::Mutex` rather than going unsynchronized
//! as spec §9 allows ("mutex on every value... is explicitly not
//! required") — the source can get away with that because nothing in C++
//! stops a data race from compiling, but safe Rust has no unsynchronized
//! shared mutability at all without `unsafe`, which the workspace denies
//! outside `wisp-core::alloc`. A `Mutex` per container is the smallest
//! safe superset of the spec's contract; it's documented in `DESIGN.md`.

pub mod object;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use wisp_core::Loc;

use crate::error::{Failure, VmError, VmResult};
use crate::typetable::{builtin_type, TypeId};
use object::*;

bitflags::bitflags! {
    /// Spec §3: "Flags include CALLABLE, ATTR_BASED, LOAD_AS_REF."
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ValueFlags: u8 {
        const CALLABLE    = 0b0000_0001;
        const ATTR_BASED  = 0b0000_0010;
        const LOAD_AS_REF = 0b0000_0100;
    }
}

pub struct ValueBox {
    pub loc: Loc,
    pub type_id: TypeId,
    flags: AtomicU8,
    pub data: ValueData,
}

#[derive(Clone)]
pub struct Value(Arc<ValueBox>);

pub enum ValueData {
    Nil,
    Bool(bool),
    Int(i64),
    Flt(f64),
    Str(parking_lot::Mutex<String>),
    Char(u8),
    /// The source's `TypeId(u64)` value variant: a first-class reference to
    /// a type, distinct from `Value::type_id()` (the VM's own dispatch
    /// key), usable from script as e.g. the result of a `typeof()` builtin.
    TypeRef(TypeId),
    Vec(VecObj),
    Map(MapObj),
    Fn(FnObj),
    Module(ModuleObj),
    StructDef(StructDefObj),
    Struct(StructObj),
    EnumDef(EnumDefObj),
    Iterator(IterObj),
    Thread(ThreadObj),
}

impl Value {
    fn boxed(data: ValueData, type_id: TypeId, loc: Loc, flags: ValueFlags) -> Self {
        Self(Arc::new(ValueBox { loc, type_id, flags: AtomicU8::new(flags.bits()), data }))
    }

    pub fn nil() -> Self {
        Self::boxed(ValueData::Nil, builtin_type::NIL, Loc::synthetic(), ValueFlags::empty())
    }

    pub fn bool(b: bool) -> Self {
        Self::boxed(ValueData::Bool(b), builtin_type::BOOL, Loc::synthetic(), ValueFlags::empty())
    }

    pub fn int(i: i64) -> Self {
        Self::boxed(ValueData::Int(i), builtin_type::INT, Loc::synthetic(), ValueFlags::empty())
    }

    pub fn flt(f: f64) -> Self {
        Self::boxed(ValueData::Flt(f), builtin_type::FLT, Loc::synthetic(), ValueFlags::empty())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Self::boxed(
            ValueData::Str(parking_lot::Mutex::new(s.into())),
            builtin_type::STR,
            Loc::synthetic(),
            ValueFlags::ATTR_BASED,
        )
    }

    pub fn char(c: u8) -> Self {
        Self::boxed(ValueData::Char(c), builtin_type::CHAR, Loc::synthetic(), ValueFlags::empty())
    }

    pub fn type_ref(t: TypeId) -> Self {
        Self::boxed(ValueData::TypeRef(t), builtin_type::TYPE_ID, Loc::synthetic(), ValueFlags::empty())
    }

    pub fn vec(elems: Vec<Value>, refs: bool) -> Self {
        Self::boxed(
            ValueData::Vec(VecObj { elems: parking_lot::Mutex::new(elems), refs }),
            builtin_type::VEC,
            Loc::synthetic(),
            ValueFlags::ATTR_BASED,
        )
    }

    pub fn map(entries: OrderedMap<Value>, refs: bool) -> Self {
        Self::boxed(
            ValueData::Map(MapObj { entries: parking_lot::Mutex::new(entries), refs }),
            builtin_type::MAP,
            Loc::synthetic(),
            ValueFlags::ATTR_BASED,
        )
    }

    pub fn function(f: FnObj) -> Self {
        Self::boxed(ValueData::Fn(f), builtin_type::FN, Loc::synthetic(), ValueFlags::CALLABLE)
    }

    pub fn module(m: ModuleObj) -> Self {
        Self::boxed(ValueData::Module(m), builtin_type::MODULE, Loc::synthetic(), ValueFlags::ATTR_BASED)
    }

    pub fn struct_def(d: StructDefObj) -> Self {
        Self::boxed(ValueData::StructDef(d), builtin_type::STRUCT_DEF, Loc::synthetic(), ValueFlags::CALLABLE)
    }

    pub fn struct_instance(s: StructObj) -> Self {
        let struct_id = s.struct_id;
        Self::boxed(ValueData::Struct(s), struct_id, Loc::synthetic(), ValueFlags::ATTR_BASED)
    }

    pub fn enum_def(e: EnumDefObj) -> Self {
        Self::boxed(ValueData::EnumDef(e), builtin_type::ENUM_DEF, Loc::synthetic(), ValueFlags::CALLABLE)
    }

    pub fn iterator(it: IterObj) -> Self {
        Self::boxed(ValueData::Iterator(it), builtin_type::ITERATOR, Loc::synthetic(), ValueFlags::empty())
    }

    pub fn thread(t: ThreadObj) -> Self {
        Self::boxed(ValueData::Thread(t), builtin_type::THREAD, Loc::synthetic(), ValueFlags::empty())
    }

    pub fn flags(&self) -> ValueFlags {
        ValueFlags::from_bits_truncate(self.0.flags.load(Ordering::Acquire))
    }

    pub fn set_load_as_ref(&self, on: bool) {
        let mut bits = self.0.flags.load(Ordering::Acquire);
        if on {
            bits |= ValueFlags::LOAD_AS_REF.bits();
        } else {
            bits &= !ValueFlags::LOAD_AS_REF.bits();
        }
        self.0.flags.store(bits, Ordering::Release);
    }

    /// Clears and returns whether `LOAD_AS_REF` was set — "the flag is
    /// consumed on first use" (spec §3).
    fn take_load_as_ref(&self) -> bool {
        let prev = self.0.flags.fetch_and(!ValueFlags::LOAD_AS_REF.bits(), Ordering::AcqRel);
        prev & ValueFlags::LOAD_AS_REF.bits() != 0
    }

    pub fn is_callable(&self) -> bool {
        self.flags().contains(ValueFlags::CALLABLE)
    }

    pub fn is_attr_based(&self) -> bool {
        self.flags().contains(ValueFlags::ATTR_BASED)
    }

    pub fn type_id(&self) -> TypeId {
        self.0.type_id
    }

    pub fn loc(&self) -> Loc {
        self.0.loc
    }

    pub fn data(&self) -> &ValueData {
        &self.0.data
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.0.data, ValueData::Nil)
    }

    /// `refcount == 1`, i.e. this `Value` is the only reference — used by
    /// `CREATE`/`STORE` to decide copy-vs-share for plain (non-LOAD_AS_REF)
    /// values the same way the source's "if ref=1 share; else deep copy"
    /// rule does.
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.0) == 1
    }

    /// Spec §3: "a value used as an r-value... is shared (ref-bumped)
    /// instead of copied" when `LOAD_AS_REF` is set (flag then consumed);
    /// otherwise deep-copies containers and passes scalars through as-is.
    pub fn copy(&self, loc: Loc) -> VmResult<Value> {
        if self.take_load_as_ref() || self.is_unique() {
            return Ok(self.clone());
        }
        let data = match &self.0.data {
            ValueData::Nil => ValueData::Nil,
            ValueData::Bool(b) => ValueData::Bool(*b),
            ValueData::Int(i) => ValueData::Int(*i),
            ValueData::Flt(f) => ValueData::Flt(*f),
            ValueData::Char(c) => ValueData::Char(*c),
            ValueData::TypeRef(t) => ValueData::TypeRef(*t),
            ValueData::Str(s) => ValueData::Str(parking_lot::Mutex::new(s.lock().clone())),
            ValueData::Vec(v) => {
                let elems = v.elems.lock();
                let copied = elems.iter().map(|e| e.copy(loc)).collect::<VmResult<Vec<_>>>()?;
                ValueData::Vec(VecObj { elems: parking_lot::Mutex::new(copied), refs: v.refs })
            }
            ValueData::Map(m) => {
                let entries = m.entries.lock();
                let mut copied = OrderedMap::new();
                for (k, v) in entries.iter() {
                    copied.insert(k.to_string(), v.copy(loc)?);
                }
                ValueData::Map(MapObj { entries: parking_lot::Mutex::new(copied), refs: m.refs })
            }
            ValueData::Struct(s) => {
                let attrs = s.attrs.lock();
                let mut copied = OrderedMap::new();
                for (k, v) in attrs.iter() {
                    copied.insert(k.to_string(), v.copy(loc)?);
                }
                ValueData::Struct(StructObj {
                    attrs: parking_lot::Mutex::new(copied),
                    base: s.base.clone(),
                    struct_id: s.struct_id,
                })
            }
            // functions, modules, struct/enum defs, iterators and type refs
            // are shared by reference even on a plain copy — they have no
            // useful independent-copy semantics (mirrors the source, which
            // only deep-copies the "POD" container types).
            _ => return Ok(self.clone()),
        };
        Ok(Value::boxed(data, self.0.type_id, loc, self.flags()))
    }

    /// Boolean coercion for conditional jumps (spec §4.6).
    pub fn truthy(&self) -> VmResult<bool> {
        match &self.0.data {
            ValueData::Nil => Ok(false),
            ValueData::Bool(b) => Ok(*b),
            ValueData::Int(i) => Ok(*i != 0),
            ValueData::Flt(f) => Ok(*f != 0.0),
            other => Err(Failure::new(
                VmError::RuntimeType(format!("cannot coerce {} to bool", type_name(other))),
                self.0.loc,
            )),
        }
    }

    /// `on_set`: assignment contract — copy payload from `from` into `self`
    /// in place, requiring the same type (spec §4.5). Returns whether a
    /// mutation actually happened: scalars and by-reference kinds have no
    /// interior mutability to write through, so `Interp::step`'s `Store`
    /// handler uses the return value to know it has to rebind the scope
    /// entry to `from` itself instead of to the (unchanged) `self`.
    pub fn on_set(&self, from: &Value) -> VmResult<bool> {
        if self.0.type_id != from.0.type_id {
            return Err(Failure::new(
                VmError::RuntimeType(format!(
                    "type mismatch in assignment: {} = {}",
                    type_name(&self.0.data),
                    type_name(&from.0.data)
                )),
                from.0.loc,
            ));
        }
        match (&self.0.data, &from.0.data) {
            (ValueData::Str(dst), ValueData::Str(src)) => {
                *dst.lock() = src.lock().clone();
            }
            (ValueData::Vec(dst), ValueData::Vec(src)) => {
                let copied = src.elems.lock().iter().map(|e| e.copy(from.0.loc)).collect::<VmResult<Vec<_>>>()?;
                *dst.elems.lock() = copied;
            }
            (ValueData::Map(dst), ValueData::Map(src)) => {
                let mut copied = OrderedMap::new();
                for (k, v) in src.entries.lock().iter() {
                    copied.insert(k.to_string(), v.copy(from.0.loc)?);
                }
                *dst.entries.lock() = copied;
            }
            (ValueData::Struct(dst), ValueData::Struct(src)) => {
                let mut copied = OrderedMap::new();
                for (k, v) in src.attrs.lock().iter() {
                    copied.insert(k.to_string(), v.copy(from.0.loc)?);
                }
                *dst.attrs.lock() = copied;
            }
            // scalars and by-reference kinds: nothing to mutate in place.
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn display_string(&self) -> String {
        format!("{self}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", type_name(&self.0.data))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.data {
            ValueData::Nil => write!(f, "nil"),
            ValueData::Bool(b) => write!(f, "{b}"),
            ValueData::Int(i) => write!(f, "{i}"),
            ValueData::Flt(x) => write!(f, "{x}"),
            ValueData::Str(s) => write!(f, "{}", s.lock()),
            ValueData::Char(c) => write!(f, "{}", *c as char),
            ValueData::TypeRef(t) => write!(f, "<type {t}>"),
            ValueData::Vec(v) => {
                write!(f, "[")?;
                for (i, e) in v.elems.lock().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
            ValueData::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.entries.lock().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            ValueData::Fn(_) => write!(f, "<fn>"),
            ValueData::Module(m) => write!(f, "<module {}>", m.path),
            ValueData::StructDef(_) => write!(f, "<struct def>"),
            ValueData::Struct(s) => {
                write!(f, "{{")?;
                for (i, (k, v)) in s.attrs.lock().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            ValueData::EnumDef(_) => write!(f, "<enum def>"),
            ValueData::Iterator(_) => write!(f, "<iterator>"),
            ValueData::Thread(t) => write!(f, "<thread {}>", t.id),
        }
    }
}

pub fn type_name(data: &ValueData) -> &'static str {
    match data {
        ValueData::Nil => "nil",
        ValueData::Bool(_) => "bool",
        ValueData::Int(_) => "int",
        ValueData::Flt(_) => "flt",
        ValueData::Str(_) => "str",
        ValueData::Char(_) => "char",
        ValueData::TypeRef(_) => "type",
        ValueData::Vec(_) => "vec",
        ValueData::Map(_) => "map",
        ValueData::Fn(_) => "fn",
        ValueData::Module(_) => "module",
        ValueData::StructDef(_) => "structdef",
        ValueData::Struct(_) => "struct",
        ValueData::EnumDef(_) => "enumdef",
        ValueData::Iterator(_) => "iterator",
        ValueData::Thread(_) => "thread",
    }
}

pub use crate::util::OrderedMap;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_of_unique_vec_shares_storage() {
        let v = Value::vec(vec![Value::int(1)], false);
        let c = v.copy(Loc::synthetic()).unwrap();
        // unique (refcount 1) values are moved, not deep-copied; mutate
        // through `c` and the alias check below holds only for non-unique.
        assert_eq!(format!("{c}"), "[1]");
    }

    #[test]
    fn copy_of_shared_vec_deep_copies() {
        let v = Value::vec(vec![Value::int(1)], false);
        let alias = v.clone();
        let c = v.copy(Loc::synthetic()).unwrap();
        if let ValueData::Vec(vo) = c.data() {
            vo.elems.lock().push(Value::int(2));
        }
        // `alias` must be unaffected: it's a deep copy, not a ref bump.
        if let ValueData::Vec(vo) = alias.data() {
            assert_eq!(vo.elems.lock().len(), 1);
        }
    }

    #[test]
    fn load_as_ref_is_consumed_once() {
        let v = Value::int(5);
        v.set_load_as_ref(true);
        assert!(v.take_load_as_ref());
        assert!(!v.take_load_as_ref());
    }

    #[test]
    fn truthy_rules_match_spec() {
        assert!(!Value::nil().truthy().unwrap());
        assert!(!Value::int(0).truthy().unwrap());
        assert!(Value::int(1).truthy().unwrap());
        assert!(Value::bool(true).truthy().unwrap());
    }

    #[test]
    fn on_set_mutates_containers_in_place_but_not_scalars() {
        let v = Value::vec(vec![Value::int(1)], false);
        assert!(v.on_set(&Value::vec(vec![Value::int(2), Value::int(3)], false)).unwrap());
        assert_eq!(format!("{v}"), "[2, 3]");

        assert!(!Value::int(1).on_set(&Value::int(2)).unwrap());
    }
}

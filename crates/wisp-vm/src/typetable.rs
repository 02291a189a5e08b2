//! Type-function table (spec component J, §4.5): a global map from a
//! type-id — including dynamically allocated user struct/enum ids — to a
//! per-type method table, with fallthrough to a universal `All` entry.
//!
//! Per spec §5 ("Global variable frame and type-function table: writes
//! guarded by the global mutex; reads are immutable after VM init in
//! practice"), the table is wrapped in a `parking_lot::RwLock`: startup
//! registers every builtin method under the write lock, after which
//! method dispatch only ever takes read locks — unless a script calls
//! `CREATE_IN` on a non-attribute-based receiver, which spec §4.6 defines
//! as registering a new type method at run time.

use std::sync::atomic::{AtomicU32, Ordering};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::value::Value;

pub type TypeId = u32;

/// Built-in type ids, stable for the lifetime of the process. User
/// struct/enum ids are allocated starting at [`builtin_type::FIRST_USER`]
/// by [`TypeTable::alloc_user_type`].
pub mod builtin_type {
    use super::TypeId;

    pub const NIL: TypeId = 0;
    pub const BOOL: TypeId = 1;
    pub const INT: TypeId = 2;
    pub const FLT: TypeId = 3;
    pub const STR: TypeId = 4;
    pub const CHAR: TypeId = 5;
    pub const VEC: TypeId = 6;
    pub const MAP: TypeId = 7;
    pub const FN: TypeId = 8;
    pub const MODULE: TypeId = 9;
    pub const STRUCT_DEF: TypeId = 10;
    pub const ENUM_DEF: TypeId = 11;
    pub const ITERATOR: TypeId = 12;
    pub const TYPE_ID: TypeId = 13;
    pub const THREAD: TypeId = 14;
    /// The universal fallback every type falls through to on a method miss
    /// (spec §4.5: "fall through to the entry for the universal type
    /// `All`").
    pub const ALL: TypeId = TypeId::MAX;
    /// First id handed out to a user `struct(...)`/`enum(...)` definition.
    pub const FIRST_USER: TypeId = 1000;
}

/// Name of a type, for diagnostics (`typeof()`/error messages).
pub fn builtin_type_name(id: TypeId) -> Option<&'static str> {
    use builtin_type::*;
    Some(match id {
        NIL => "nil",
        BOOL => "bool",
        INT => "int",
        FLT => "flt",
        STR => "str",
        CHAR => "char",
        VEC => "vec",
        MAP => "map",
        FN => "fn",
        MODULE => "module",
        STRUCT_DEF => "structdef",
        ENUM_DEF => "enumdef",
        ITERATOR => "iterator",
        TYPE_ID => "type",
        THREAD => "thread",
        ALL => "all",
        _ => return None,
    })
}

#[derive(Default)]
pub struct MethodTable(AHashMap<String, Value>);

impl MethodTable {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).cloned()
    }

    pub fn set(&mut self, name: impl Into<String>, f: Value) {
        self.0.insert(name.into(), f);
    }
}

pub struct TypeTable {
    tables: RwLock<AHashMap<TypeId, MethodTable>>,
    next_user_id: AtomicU32,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self { tables: RwLock::new(AHashMap::new()), next_user_id: AtomicU32::new(builtin_type::FIRST_USER) }
    }
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next monotonic id for a `struct(...)`/`enum(...)`
    /// definition.
    pub fn alloc_user_type(&self) -> TypeId {
        self.next_user_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Registers a native or script function as `type_id.name`, used both
    /// by VM-init builtin registration and by `CREATE_IN` (spec §4.6: "Pop
    /// `in` and `val`... register `val` as a type method on `in`'s type.").
    pub fn register(&self, type_id: TypeId, name: impl Into<String>, f: Value) {
        self.tables.write().entry(type_id).or_default().set(name, f);
    }

    /// Method dispatch (spec §4.5): attribute lookup on the receiver has
    /// already failed by the time this is called. Looks up `type_id.name`,
    /// falling through to `All.name` on a miss.
    pub fn lookup(&self, type_id: TypeId, name: &str) -> Option<Value> {
        let tables = self.tables.read();
        if let Some(m) = tables.get(&type_id) {
            if let Some(f) = m.get(name) {
                return Some(f);
            }
        }
        tables.get(&builtin_type::ALL).and_then(|m| m.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::object::{CallArgs, FnBody, FnObj, NativeFn};

    fn dummy_native(name: &str) -> Value {
        Value::function(FnObj {
            module_id: 0,
            kw_arg_name: None,
            var_arg_name: None,
            param_names: vec![],
            default_params: Default::default(),
            body: FnBody::Native(std::sync::Arc::new(NativeFn {
                name: name.to_string(),
                arity: 0..=0,
                f: Box::new(|_, _: CallArgs, _| Ok(Value::nil())),
            })),
        })
    }

    #[test]
    fn falls_through_to_all() {
        let t = TypeTable::new();
        t.register(builtin_type::ALL, "to_str", dummy_native("to_str"));
        assert!(t.lookup(builtin_type::INT, "to_str").is_some());
        assert!(t.lookup(builtin_type::INT, "nope").is_none());
    }

    #[test]
    fn user_type_ids_are_monotonic_and_distinct() {
        let t = TypeTable::new();
        let a = t.alloc_user_type();
        let b = t.alloc_user_type();
        assert_ne!(a, b);
        assert!(a >= builtin_type::FIRST_USER);
    }
}

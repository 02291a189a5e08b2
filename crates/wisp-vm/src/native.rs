//! Native module loading (spec component P, §6.4): dynamically linked
//! libraries exposing `Init<ModuleName>`/`Deinit<ModuleName>` C-linkage
//! entry points, loaded through `libloading` the way any Rust host
//! embedding a scriptable plugin ABI does it.
//!
//! The init symbol receives a registration callback instead of returning
//! a value — it calls back into the VM (registering globals/type methods
//! through [`NativeRegistrar`]) rather than handing back a data structure
//! whose layout would have to be ABI-stable across compilers.

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::path::Path;

use libloading::{Library, Symbol};
use parking_lot::Mutex;

use crate::error::{Failure, VmError, VmResult};
use crate::typetable::TypeTable;
use crate::value::object::{CallArgs, FnBody, FnObj, NativeFn, NativeFnResult};
use crate::value::Value;
use wisp_core::Loc;

/// Passed by reference to a native module's init function so it can
/// register globals and type methods without reaching into VM internals
/// directly (spec §6.4: the native ABI is a stable, narrow surface).
pub struct NativeRegistrar<'a> {
    pub globals: &'a Mutex<crate::util::OrderedMap<Value>>,
    pub types: &'a TypeTable,
}

impl<'a> NativeRegistrar<'a> {
    pub fn register_global(&self, name: impl Into<String>, f: Value) {
        self.globals.lock().insert(name.into(), f);
    }

    pub fn register_method(&self, type_id: crate::typetable::TypeId, name: impl Into<String>, f: Value) {
        self.types.register(type_id, name, f);
    }
}

/// Builds a `Value::function` wrapping a plain Rust closure — the same
/// shape the embedded prelude uses (see `prelude.rs`), exposed here so a
/// native module's init function can construct callables the same way.
pub fn native_fn(
    name: impl Into<String>,
    arity: std::ops::RangeInclusive<usize>,
    f: impl Fn(&mut crate::interp::Interp, CallArgs, Loc) -> NativeFnResult + Send + Sync + 'static,
) -> Value {
    Value::function(FnObj {
        module_id: 0,
        kw_arg_name: None,
        var_arg_name: None,
        param_names: Vec::new(),
        default_params: Default::default(),
        body: FnBody::Native(std::sync::Arc::new(NativeFn { name: name.into(), arity, f: Box::new(f) })),
    })
}

type InitFn = unsafe extern "C" fn(*mut NativeRegistrar);
type DeinitFn = unsafe extern "C" fn();

/// A loaded native module, kept alive for the life of the process: the
/// `Library` handle must outlive any function pointer obtained from it
/// (the registered `Value::function`s above capture raw fn pointers by
/// way of closures, transitively keeping the library's code mapped).
struct Loaded {
    #[allow(dead_code)]
    lib: Library,
}

/// Guards native-library loading the way spec §6.4 asks ("serialized by
/// a mutex" — `libloading::Library::new` isn't safe to race, and a
/// module's `Init` symbol may itself call back into the VM to register
/// things, so only one load runs at a time).
#[derive(Default)]
pub struct NativeLoader {
    loaded: Mutex<HashMap<String, Loaded>>,
}

impl NativeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path` (a `.so`/`.dylib`/`.dll`), resolves `Init<module_name>`,
    /// and calls it with a [`NativeRegistrar`] borrowing `globals`/`types`.
    /// A repeat load of an already-loaded path is a no-op (spec §6.4:
    /// idempotent on re-import, matching the script-module cache).
    pub fn load(
        &self,
        path: &Path,
        module_name: &str,
        globals: &Mutex<crate::util::OrderedMap<Value>>,
        types: &TypeTable,
    ) -> VmResult<()> {
        let mut loaded = self.loaded.lock();
        let key = path.to_string_lossy().to_string();
        if loaded.contains_key(&key) {
            return Ok(());
        }
        // SAFETY: loading an arbitrary shared library and invoking its
        // exported symbols is inherently unsafe — this is the one `unsafe`
        // surface native modules require, gated behind this single call
        // site and serialized by `self.loaded`'s lock.
        let lib = unsafe {
            Library::new(path).map_err(|e| Failure::new(VmError::Import(format!("{}: {e}", path.display())), Loc::synthetic()))?
        };
        let symbol_name = format!("Init{module_name}\0");
        let init: Symbol<InitFn> = unsafe {
            lib.get(symbol_name.as_bytes())
                .map_err(|e| Failure::new(VmError::Import(format!("{}: missing {symbol_name}: {e}", path.display())), Loc::synthetic()))?
        };
        let mut registrar = NativeRegistrar { globals, types };
        unsafe { init(&mut registrar) };
        loaded.insert(key, Loaded { lib });
        Ok(())
    }

    /// Calls every loaded module's `Deinit<name>` symbol, if present, in
    /// unspecified order — best-effort cleanup run at VM shutdown.
    pub fn deinit_all(&self) {
        let loaded = self.loaded.lock();
        for (path, entry) in loaded.iter() {
            let stem = Path::new(path).file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let symbol_name = format!("Deinit{stem}\0");
            let deinit: Result<Symbol<DeinitFn>, _> = unsafe { entry.lib.get(symbol_name.as_bytes()) };
            if let Ok(deinit) = deinit {
                unsafe { deinit() };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_a_nonexistent_library_fails_cleanly() {
        let loader = NativeLoader::new();
        let globals = Mutex::new(crate::util::OrderedMap::new());
        let types = TypeTable::new();
        let err = loader.load(Path::new("/nonexistent/path.so"), "Nope", &globals, &types).unwrap_err();
        assert!(matches!(err.kind, VmError::Import(_)));
    }
}

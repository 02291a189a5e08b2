//! wisp-vm — value model, module registry, type-function table, scope and
//! execution stacks, the interpreter loop, and the thread VM.
//!
//! This is the crate spec.md calls "the runtime": [`Global`] is the one
//! process-wide state (spec §5 "a process has one global state") and
//! [`Vm`] is the embedding-facing handle (spec §6's "public VM API") that
//! owns it and drives the main thread's [`Interp`].

pub mod builtins;
pub mod error;
pub mod interp;
pub mod module;
pub mod native;
pub mod prelude;
pub mod scope;
pub mod thread;
pub mod typetable;
pub mod util;
pub mod value;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use wisp_core::{Chunk, Loc};

pub use error::{Failure, VmError, VmResult};
pub use value::Value;

use interp::Interp;
use module::{BuiltinFinder, ModuleRegistry};
use native::NativeLoader;
use typetable::TypeTable;
use util::OrderedMap;

/// Tunables that would be CLI flags in a real embedding (SPEC_FULL §3:
/// `recurse_max` is configurable, default 256, overridable via
/// `--max-recurse`).
#[derive(Debug, Clone)]
pub struct VmOptions {
    pub recursion_limit: u32,
    pub install_lib_dir: Option<PathBuf>,
    /// When false, the embedded prelude (spec §9 "a fixed script file...
    /// loaded before any user module") is skipped — used by the compiler
    /// unit tests in this crate so they don't pay prelude-compile cost
    /// for every tiny snippet.
    pub load_prelude: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self { recursion_limit: 256, install_lib_dir: None, load_prelude: true }
    }
}

/// Spec §5: "a process has one global state (module registry, global
/// variable frame, type-function table, allocator, prelude path)". The
/// allocator itself (component A, `wisp_core::alloc`) backs AST nodes and
/// is owned by the compiler pipeline per module, not threaded through
/// here — nothing downstream of codegen still needs arena-allocated AST.
pub struct Global {
    pub modules: ModuleRegistry,
    pub types: TypeTable,
    pub globals: Mutex<OrderedMap<Value>>,
    pub natives: NativeLoader,
    pub recursion_limit: u32,
    /// Cooperative cancellation flag (spec §5): every VM thread's loop
    /// checks this at its next instruction boundary and unwinds if set.
    stop: AtomicBool,
    /// Set by the script-level `exit(code)` builtin; `None` until then.
    exit_code: Mutex<Option<i32>>,
    /// Used only to give spawned threads (component Q) distinct names for
    /// diagnostics; not a protocol requirement.
    next_thread_id: AtomicI32,
}

impl Global {
    fn new(options: &VmOptions) -> Arc<Self> {
        let global = Arc::new(Self {
            modules: ModuleRegistry::new(),
            types: TypeTable::new(),
            globals: Mutex::new(OrderedMap::new()),
            natives: NativeLoader::new(),
            recursion_limit: options.recursion_limit,
            stop: AtomicBool::new(false),
            exit_code: Mutex::new(None),
            next_thread_id: AtomicI32::new(1),
        });
        global.modules.add_finder(Box::new(BuiltinFinder { install_lib_dir: options.install_lib_dir.clone() }));
        builtins::install(&global);
        global
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn set_exit_code(&self, code: i32) {
        *self.exit_code.lock() = Some(code);
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    pub fn next_thread_id(&self) -> i32 {
        self.next_thread_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// The embedding-facing VM handle (spec §6's "public VM API"): owns the
/// global state and the main thread's interpreter. Additional threads
/// (component Q, spawned via `crate::thread`) get their own [`Interp`]
/// over a cloned `Arc<Global>` instead of going through this type.
pub struct Vm {
    global: Arc<Global>,
    interp: Interp,
}

impl Vm {
    pub fn new(options: VmOptions) -> VmResult<Self> {
        let global = Global::new(&options);
        let mut interp = Interp::new(global.clone());
        if options.load_prelude {
            load_prelude(&mut interp)?;
        }
        Ok(Self { global, interp })
    }

    pub fn global(&self) -> &Arc<Global> {
        &self.global
    }

    pub fn interp(&mut self) -> &mut Interp {
        &mut self.interp
    }

    /// Loads and runs `path` as the entry module (spec §4.7): compiles it
    /// if not already cached by path, then executes its top-level code in
    /// a fresh function frame.
    pub fn run_file(&mut self, path: &Path) -> VmResult<Value> {
        self.interp.run_file(path)
    }

    /// Script-level `import(name)`/`import("./path")` (spec §4.7): resolve
    /// through the registered finders relative to `from_dir`, compile if
    /// new, run once, and cache — the mechanism behind spec §8 scenario 6
    /// ("module import is cached"). The `import(...)` builtin (see
    /// `builtins.rs`) reaches the same logic through `Interp::import`
    /// directly, since it only has access to the interpreter, not this
    /// embedding handle.
    pub fn import(&mut self, name: &str, from_dir: Option<&Path>) -> VmResult<Value> {
        self.interp.import(name, from_dir, Loc::synthetic())
    }
}

/// Compiled once per process, the way the teacher's stdlib crate memoizes
/// its own prelude chunk (`vitte_stdlib::bundled::STDLIB_CHUNK`) rather
/// than recompiling on every `Vm::new` — most hosts build exactly one
/// `Vm`, but short-lived VMs (this crate's own test suite creates dozens)
/// would otherwise pay the compile cost once per instance.
static PRELUDE_CHUNK: Lazy<Result<Chunk, String>> = Lazy::new(|| {
    wisp_compiler::compile_module(prelude::SOURCE, "prelude", "<prelude>", module::PRELUDE_MODULE_ID).map_err(|e| e.to_string())
});

/// Compiles and runs the embedded prelude (SPEC_FULL §3 / spec §9) as
/// module id 0, before any user module — exactly the loading order a
/// script-level `import` uses, just with fixed source text instead of a
/// file on disk.
fn load_prelude(interp: &mut Interp) -> VmResult<Value> {
    let chunk = PRELUDE_CHUNK.as_ref().map_err(|e| Failure::new(VmError::Import(format!("prelude: {e}")), Loc::synthetic()))?.clone();
    let record = interp.global.modules.register_synthetic(module::PRELUDE_MODULE_ID, "<prelude>", prelude::SOURCE, chunk);
    interp.run_module_top_level(record.id, &record.chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> Vm {
        Vm::new(VmOptions { load_prelude: false, ..Default::default() }).expect("vm without prelude")
    }

    #[test]
    fn runs_a_tiny_module_from_disk() {
        let dir = std::env::temp_dir().join(format!("wisp-vm-lib-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("a.wisp");
        std::fs::write(&file, "let x = 2 + 3; x;").unwrap();

        let mut vm = vm();
        let result = vm.run_file(&file).expect("runs");
        assert_eq!(format!("{result}"), "5");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn import_is_cached() {
        let dir = std::env::temp_dir().join(format!("wisp-vm-import-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("main.wisp"), "1;").unwrap();
        std::fs::write(dir.join("child.wisp"), "let hits = 1; hits;").unwrap();

        let mut vm = vm();
        let main = dir.join("main.wisp");
        vm.run_file(&main).unwrap();
        let from_dir = Some(dir.as_path());
        let a = vm.import("child", from_dir).unwrap();
        let b = vm.import("child", from_dir).unwrap();
        assert_eq!(format!("{a}"), format!("{b}"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}

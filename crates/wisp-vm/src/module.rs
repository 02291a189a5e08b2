//! Module registry (spec component O, §4.7): module identity, resolution
//! through user-pluggable finders, and loading of script modules.
//!
//! Native dynamic-library modules (§4.7's "native modules", §6.4's ABI)
//! live in [`crate::native`]; this file owns path/id identity and the
//! script-loading half only.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use wisp_core::Chunk;

use crate::error::{Failure, VmError, VmResult};
use crate::util::OrderedMap;
use crate::value::Value;

/// Fixed module id for the embedded prelude (spec §9): always loaded
/// first, so every other module's id starts at 1.
pub const PRELUDE_MODULE_ID: u16 = 0;

/// A compiled module (spec §3 `Module { id, path, code, bytecode,
/// parse_tree }`) — `parse_tree` is intentionally not kept around past
/// codegen; nothing downstream of compilation needs it, and holding it
/// would keep every module's AST alive for the life of the VM.
pub struct ModuleRecord {
    pub id: u16,
    pub path: String,
    pub source: String,
    pub chunk: Chunk,
}

/// A user-pluggable module finder (spec §4.7: "a user-configurable list
/// of module finders — callables each receiving `(name, is_import)` and
/// returning either nil or a string path").
pub trait ModuleFinder: Send + Sync {
    fn find(&self, name: &str, is_import: bool, from_dir: Option<&Path>) -> Option<PathBuf>;
}

/// The built-in finder (spec §4.7): `$WISP_PATH` roots, then
/// `install_path/lib/wisp`, then the importing module's own directory,
/// then paths harvested from that directory's `.modulePaths` file
/// (SPEC_FULL §3, taken from the original Feral `.modulePaths` format).
pub struct BuiltinFinder {
    pub install_lib_dir: Option<PathBuf>,
}

impl BuiltinFinder {
    fn candidate_roots(&self, from_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Ok(paths) = std::env::var("WISP_PATH") {
            roots.extend(std::env::split_paths(&paths));
        }
        if let Some(lib) = &self.install_lib_dir {
            roots.push(lib.clone());
        }
        if let Some(dir) = from_dir {
            roots.push(dir.to_path_buf());
            roots.extend(harvest_module_paths(dir));
        }
        roots
    }

    fn resolve_name(&self, name: &str, from_dir: Option<&Path>) -> Option<PathBuf> {
        // `.` / `..`-prefixed names are relative to the importing module;
        // `~` expands to `$HOME` (spec §4.7/§6.2).
        if let Some(rest) = name.strip_prefix('~') {
            let home = std::env::var("HOME").ok()?;
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            return Some(Path::new(&home).join(rest));
        }
        if name.starts_with("./") || name.starts_with("../") || name == "." || name == ".." {
            let base = from_dir?;
            return Some(base.join(name));
        }
        for root in self.candidate_roots(from_dir) {
            let candidate = root.join(format!("{name}.wisp"));
            if candidate.is_file() {
                return Some(candidate);
            }
            let bare = root.join(name);
            if bare.is_file() {
                return Some(bare);
            }
        }
        None
    }
}

impl ModuleFinder for BuiltinFinder {
    fn find(&self, name: &str, _is_import: bool, from_dir: Option<&Path>) -> Option<PathBuf> {
        self.resolve_name(name, from_dir)
    }
}

/// Reads a `.modulePaths` file (one search root per line) from `dir`, if
/// present (spec §4.7: "paths harvested from `.modulePaths` files").
fn harvest_module_paths(dir: &Path) -> Vec<PathBuf> {
    let file = dir.join(".modulePaths");
    let Ok(text) = std::fs::read_to_string(&file) else {
        return Vec::new();
    };
    text.lines().map(str::trim).filter(|l| !l.is_empty()).map(PathBuf::from).collect()
}

struct Inner {
    by_path: AHashMap<String, u16>,
    by_id: AHashMap<u16, Arc<ModuleRecord>>,
    /// Module value cache, keyed by id: populated once a module's top-level
    /// code has actually run (spec §8 scenario 6 — a module is executed at
    /// most once no matter how many times it is imported).
    executed: AHashMap<u16, Value>,
    /// Top-level bindings of a module whose execution has finished,
    /// consulted by name resolution for closures defined in that module
    /// (spec §3 "module's top-level variable frame").
    vars: AHashMap<u16, OrderedMap<Value>>,
    next_id: u16,
}

impl Default for Inner {
    fn default() -> Self {
        // ids start at 1: id 0 is reserved for the embedded prelude
        // (`PRELUDE_MODULE_ID`), registered through `register_synthetic`
        // rather than through the normal `next_id` counter.
        Self { by_path: AHashMap::new(), by_id: AHashMap::new(), executed: AHashMap::new(), vars: AHashMap::new(), next_id: 1 }
    }
}

/// Spec §4.7/§5: "guarded by a recursive mutex during insert/lookup-or-
/// insert". We use a plain (non-reentrant) `parking_lot::Mutex` instead
/// and keep every critical section to a single map operation — compiling
/// a newly discovered module (which can recursively resolve further
/// imports) always happens *outside* the lock, so nothing ever tries to
/// re-enter it. This gets the same observable effect (no lost updates,
/// no races) without `parking_lot::ReentrantMutex`'s extra type-state.
pub struct ModuleRegistry {
    inner: Mutex<Inner>,
    finders: Mutex<Vec<Box<dyn ModuleFinder>>>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self { inner: Mutex::new(Inner::default()), finders: Mutex::new(Vec::new()) }
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_finder(&self, finder: Box<dyn ModuleFinder>) {
        self.finders.lock().push(finder);
    }

    fn next_id(&self) -> VmResult<u16> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id = inner
            .next_id
            .checked_add(1)
            .ok_or_else(|| Failure::new(VmError::Import("module id space exhausted".into()), wisp_core::Loc::synthetic()))?;
        Ok(id)
    }

    pub fn get(&self, id: u16) -> Option<Arc<ModuleRecord>> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    pub fn get_by_path(&self, path: &str) -> Option<Arc<ModuleRecord>> {
        let inner = self.inner.lock();
        let id = *inner.by_path.get(path)?;
        inner.by_id.get(&id).cloned()
    }

    /// Resolves `name` relative to `from_dir` using every registered
    /// finder, in order, first match wins.
    pub fn resolve(&self, name: &str, is_import: bool, from_dir: Option<&Path>) -> Option<PathBuf> {
        for finder in self.finders.lock().iter() {
            if let Some(p) = finder.find(name, is_import, from_dir) {
                return Some(p);
            }
        }
        None
    }

    /// Loads (compiling if not already cached by path) the module at
    /// `path`. Returns the cached record untouched if this path was
    /// already registered (spec §4.7 step 1).
    pub fn load(&self, path: &Path) -> VmResult<Arc<ModuleRecord>> {
        let canon = std::fs::canonicalize(path)
            .map_err(|e| Failure::new(VmError::Import(format!("{}: {e}", path.display())), wisp_core::Loc::synthetic()))?;
        let key = canon.to_string_lossy().to_string();
        if let Some(existing) = self.get_by_path(&key) {
            return Ok(existing);
        }
        let source = std::fs::read_to_string(&canon)
            .map_err(|e| Failure::new(VmError::Import(format!("{}: {e}", canon.display())), wisp_core::Loc::synthetic()))?;
        let id = self.next_id()?;
        let name = canon.file_stem().and_then(|s| s.to_str()).unwrap_or(&key);
        let chunk = wisp_compiler::compile_module(&source, name, &key, id)
            .map_err(|e| Failure::new(VmError::Import(format!("{}: {e}", canon.display())), wisp_core::Loc::synthetic()))?;
        let record = Arc::new(ModuleRecord { id, path: key.clone(), source, chunk });
        let mut inner = self.inner.lock();
        inner.by_path.insert(key, id);
        inner.by_id.insert(id, record.clone());
        #[cfg(feature = "trace")]
        tracing::debug!(module_id = id, path = %record.path, "loaded module");
        Ok(record)
    }

    /// Registers a module that has no file on disk — used once, at VM
    /// start, for the embedded prelude (spec §9), which is compiled from
    /// an `&'static str` rather than read from a path.
    pub fn register_synthetic(&self, id: u16, path: &str, source: &str, chunk: wisp_core::Chunk) -> Arc<ModuleRecord> {
        let record = Arc::new(ModuleRecord { id, path: path.to_string(), source: source.to_string(), chunk });
        let mut inner = self.inner.lock();
        inner.by_path.insert(path.to_string(), id);
        inner.by_id.insert(id, record.clone());
        record
    }

    /// True if `id`'s top-level code has already run (spec §8 scenario 6).
    pub fn cached_value(&self, id: u16) -> Option<Value> {
        self.inner.lock().executed.get(&id).cloned()
    }

    pub fn cache_value(&self, id: u16, value: Value) {
        self.inner.lock().executed.insert(id, value);
    }

    pub fn set_vars(&self, id: u16, vars: OrderedMap<Value>) {
        self.inner.lock().vars.insert(id, vars);
    }

    pub fn lookup_var(&self, id: u16, name: &str) -> Option<Value> {
        self.inner.lock().vars.get(&id)?.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_twice_returns_the_same_cached_record() {
        let dir = std::env::temp_dir().join(format!("wisp-module-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("a.wisp");
        std::fs::write(&file, "let x = 1;").unwrap();

        let registry = ModuleRegistry::new();
        let a = registry.load(&file).unwrap();
        let b = registry.load(&file).unwrap();
        assert_eq!(a.id, b.id);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn builtin_finder_resolves_relative_imports() {
        let dir = std::env::temp_dir().join(format!("wisp-finder-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("child.wisp"), "print(1);").unwrap();

        let finder = BuiltinFinder { install_lib_dir: None };
        let found = finder.find("./child", true, Some(&dir));
        assert_eq!(found, Some(dir.join("./child.wisp")));

        let _ = std::fs::remove_dir_all(&dir);
    }
}

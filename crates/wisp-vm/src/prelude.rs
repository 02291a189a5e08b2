//! The embedded prelude (spec §9, SPEC_FULL §3: "a fixed script file...
//! loaded before any user module"): compiled and run as module id
//! [`crate::module::PRELUDE_MODULE_ID`] before the entry module, exactly
//! the way `original_source/lib/prelude/Prelude.cpp` orders VM start-up.
//!
//! `print`, `vec.new`, `map.new`, `struct(...)`, `enum(...)`, `import`,
//! `exit` and the operator method tables are registered directly as
//! globals by [`crate::builtins::install`] rather than defined *in* this
//! script: a module's own top-level bindings only ever land in that
//! module's private `vars_frame` (see `interp.rs::run_module_top_level`),
//! never the shared global frame, so anything this file declared with
//! `let`/`fn` would be invisible to every module but itself. Running it
//! still matters — it's the hook a future native-module-free addition to
//! the standard library (written in Wisp itself, not Rust) would extend —
//! so it stays a real, if currently trivial, compiled-and-executed module.
pub const SOURCE: &str = r#"
nil;
"#;

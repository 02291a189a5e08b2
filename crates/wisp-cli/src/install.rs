//! Resolves the built-in module finder's `install_lib_dir` (spec §4.7,
//! §6.2): a fixed system location when the runtime is installed there,
//! falling back to a user-local directory computed from `HOME`/`USERNAME`
//! when it isn't — the Rust shape of the original Feral runtime's "temp
//! directory when not installed under `.feral`" rule.

use std::path::PathBuf;

/// `/usr/local/lib/wisp` if present, else `$HOME/.wisp/lib`, else a
/// `$TMPDIR`-based directory keyed by `USERNAME` so two users on the same
/// machine never collide. Returns `None` only if nothing is resolvable at
/// all (no `HOME`, no `USERNAME`) — the CLI still runs, it just has no
/// install-wide search root.
pub fn resolve_install_lib_dir() -> Option<PathBuf> {
    let system = PathBuf::from("/usr/local/lib/wisp");
    if system.is_dir() {
        return Some(system);
    }
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".wisp").join("lib"));
    }
    let user = std::env::var("USERNAME").unwrap_or_else(|_| "user".into());
    Some(std::env::temp_dir().join(format!(".wisp-{user}")).join("lib"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_resolves_to_something() {
        assert!(resolve_install_lib_dir().is_some());
    }
}

//! Source locations shared by every compiler and VM stage.

use serde::{Deserialize, Serialize};

/// A module id of all-ones marks a synthetic or invalid location (values
/// built by the simplifier, or instructions injected by the codegen that
/// have no single source span).
pub const SYNTHETIC_MODULE: u16 = u16::MAX;

/// A compact source location: which module, and a byte-offset range into
/// that module's source text.
///
/// The original runtime packs this into a single 64-bit word (`module_id:
/// u16` + `offset: u48`). Rust has no `u48`; we use a plain `u32` offset
/// pair instead, which caps source files at 4 GiB — not a real limit for
/// a scripting language and far simpler to reason about than bit-packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub module_id: u16,
    pub offset_begin: u32,
    pub offset_end: u32,
}

impl Loc {
    pub const fn new(module_id: u16, offset_begin: u32, offset_end: u32) -> Self {
        Self { module_id, offset_begin, offset_end }
    }

    /// A location with no real source behind it (simplifier-synthesized
    /// nodes, codegen markers).
    pub const fn synthetic() -> Self {
        Self { module_id: SYNTHETIC_MODULE, offset_begin: 0, offset_end: 0 }
    }

    pub const fn is_synthetic(&self) -> bool {
        self.module_id == SYNTHETIC_MODULE
    }
}

impl Default for Loc {
    fn default() -> Self {
        Self::synthetic()
    }
}

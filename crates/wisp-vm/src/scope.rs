//! Variable scope stack (spec component K, §3): per-thread function frames
//! of block layers, with loop frames marking a rewindable position.

use ahash::AHashMap;

use crate::value::Value;

/// One lexical block's name→value bindings.
#[derive(Default)]
pub struct Layer(AHashMap<String, Value>);

impl Layer {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).cloned()
    }

    pub fn set(&mut self, name: impl Into<String>, v: Value) {
        self.0.insert(name.into(), v);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Exposes this layer's bindings for syncing a finished module's
    /// top-level frame into the module registry's `vars_frame` (spec §3).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A `for`/`while` loop's rewind point: the block-layer depth (within the
/// current function frame) at the moment `PUSH_LOOP` ran, so `break` can
/// pop back to it and `continue` can partially unwind the same way (spec
/// §3: "A loop frame marks a position in the block-layer stack").
#[derive(Clone, Copy)]
pub struct LoopFrame {
    pub layer_depth: usize,
}

/// One call's worth of lexical scope: a stack of block layers plus
/// whatever loop frames are currently open within it. Name resolution
/// never crosses a function-frame boundary except to fall through to
/// module/global scope (spec §3).
pub struct FunctionFrame {
    pub module_id: u16,
    pub layers: Vec<Layer>,
    pub loops: Vec<LoopFrame>,
}

impl FunctionFrame {
    pub fn new(module_id: u16) -> Self {
        Self { module_id, layers: vec![Layer::default()], loops: Vec::new() }
    }

    pub fn push_layers(&mut self, n: u32) {
        for _ in 0..n {
            self.layers.push(Layer::default());
        }
    }

    pub fn pop_layers(&mut self, n: u32) {
        let new_len = self.layers.len().saturating_sub(n as usize);
        self.layers.truncate(new_len.max(1));
    }

    pub fn push_loop(&mut self) {
        self.loops.push(LoopFrame { layer_depth: self.layers.len() });
    }

    pub fn pop_loop(&mut self) {
        if let Some(lf) = self.loops.pop() {
            self.layers.truncate(lf.layer_depth.max(1));
        }
    }

    /// Unwinds layers back to the innermost loop's recorded depth without
    /// forgetting the loop frame — used by `CONTINUE`/`BREAK` (spec §4.6),
    /// which both pop layers but only `BREAK`'s paired `POP_LOOP` forgets
    /// the frame itself.
    pub fn unwind_to_innermost_loop(&mut self) {
        if let Some(lf) = self.loops.last() {
            self.layers.truncate(lf.layer_depth.max(1));
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, v: Value) {
        self.layers.last_mut().expect("a frame always has >=1 layer").set(name, v);
    }

    /// Name lookup: innermost layer out (spec §3).
    pub fn resolve(&self, name: &str) -> Option<Value> {
        self.layers.iter().rev().find_map(|l| l.get(name))
    }

    /// Assigns into whichever layer already binds `name` (closest to the
    /// top); falls back to declaring in the innermost layer if unbound
    /// locally (so plain assignment to a not-yet-local name creates it in
    /// the current block, matching source behavior for `STORE` on a
    /// freshly `LOAD_DATA`-resolved identifier slot).
    pub fn assign(&mut self, name: &str, v: Value) -> bool {
        for l in self.layers.iter_mut().rev() {
            if l.contains(name) {
                l.set(name, v);
                return true;
            }
        }
        false
    }
}

/// Per-thread stack of function frames (spec §3's "Variable scope stack").
#[derive(Default)]
pub struct ScopeStack {
    frames: Vec<FunctionFrame>,
}

impl ScopeStack {
    pub fn push_frame(&mut self, module_id: u16) {
        self.frames.push(FunctionFrame::new(module_id));
    }

    pub fn pop_frame(&mut self) -> Option<FunctionFrame> {
        self.frames.pop()
    }

    pub fn current(&mut self) -> &mut FunctionFrame {
        self.frames.last_mut().expect("interpreter always has an active function frame")
    }

    pub fn current_ref(&self) -> &FunctionFrame {
        self.frames.last().expect("interpreter always has an active function frame")
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Every active function frame, innermost (top of call stack) first —
    /// used by name resolution's "module's top-level frame" fallback
    /// (spec §3): a closure's own frame misses a name, so we scan outward
    /// for the *still-running* frame of its defining module before
    /// consulting that module's finalized `vars_frame` (spec §4.7/§3
    /// `Module.vars_frame`).
    pub fn frames_rev(&self) -> impl Iterator<Item = &FunctionFrame> {
        self.frames.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_scans_innermost_out() {
        let mut f = FunctionFrame::new(0);
        f.declare("x", Value::int(1));
        f.push_layers(1);
        f.declare("x", Value::int(2));
        assert_eq!(format!("{}", f.resolve("x").unwrap()), "2");
        f.pop_layers(1);
        assert_eq!(format!("{}", f.resolve("x").unwrap()), "1");
    }

    #[test]
    fn loop_unwind_restores_depth() {
        let mut f = FunctionFrame::new(0);
        f.push_loop();
        f.push_layers(2);
        f.declare("i", Value::int(0));
        assert_eq!(f.layers.len(), 3);
        f.unwind_to_innermost_loop();
        assert_eq!(f.layers.len(), 1);
        f.pop_loop();
        assert!(f.loops.is_empty());
    }
}

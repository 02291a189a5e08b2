//! Runtime error taxonomy (spec §7) and the `Failure` type that carries a
//! leaf error plus the accumulating unwind trace through the interpreter
//! loop, the fail stack's `or`-handler protocol, and top-level reporting.

use thiserror::Error;
use wisp_core::Loc;

/// One of the five runtime-side error kinds from spec §7 (front-end kinds
/// — `LexError`/`ParseError`/`SimplifyError`/`CodegenError` — live in
/// `wisp-compiler` instead, closer to where they're raised).
#[derive(Debug, Error, Clone)]
pub enum VmError {
    #[error("{0}")]
    RuntimeType(String),
    #[error("{0}")]
    RuntimeValue(String),
    #[error("{0}")]
    Import(String),
    #[error("{0}")]
    Thread(String),
    #[error("{0}")]
    User(String),
    #[error("recursion limit exceeded")]
    RecursionExceeded,
    /// Script-level `exit(code)` (spec §5: "records the code and unwinds
    /// without reporting further errors"). Modeled as a `Failure` variant
    /// so it can reuse the interpreter's existing unwind plumbing, but the
    /// fail-stack handler never intercepts it (see `interp.rs`) — it always
    /// propagates to the VM's top level.
    #[error("exit({0})")]
    Exit(i32),
}

impl VmError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// A failure in flight: the leaf error plus every `Loc` frame accumulated
/// while unwinding (spec §7: "errors... print a trace (list of `Loc`
/// frames)... with the leaf-most message"). `trace[0]` is the innermost
/// (leaf) location; later entries are outer call sites.
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: VmError,
    pub trace: Vec<Loc>,
}

impl Failure {
    pub fn new(kind: VmError, loc: Loc) -> Self {
        Self { kind, trace: vec![loc] }
    }

    pub fn push_frame(&mut self, loc: Loc) {
        self.trace.push(loc);
    }

    pub fn message(&self) -> String {
        self.kind.message()
    }

    pub fn leaf_loc(&self) -> Loc {
        self.trace.first().copied().unwrap_or_default()
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Failure {}

pub type VmResult<T> = Result<T, Failure>;

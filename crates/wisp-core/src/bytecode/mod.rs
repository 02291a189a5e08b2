//! Bytecode format (spec component G): instructions, chunks, opcodes.

pub mod chunk;
pub mod op;

pub use chunk::{Chunk, ChunkFlags, ChunkLoadError, DebugInfo, Instruction};
pub use op::{ArgKind, CallInfo, FnArgInfo, LoadOperand, Op};

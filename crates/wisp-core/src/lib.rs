//! wisp-core — bytecode format, source locations and the pooled allocator.
//!
//! Everything in here is shared by the compiler front-end and the VM but
//! depends on neither: the binary `.wispc` format, opcode definitions, the
//! textual disassembler, and the size-classed free-list allocator that
//! backs both AST nodes and runtime values.

pub mod alloc;
pub mod bytecode;
pub mod disasm;
pub mod error;
pub mod loc;

pub use bytecode::{Chunk, ChunkFlags, Instruction, Op};
pub use error::{Error, Result};
pub use loc::Loc;

pub mod prelude {
    pub use crate::bytecode::{ArgKind, CallInfo, FnArgInfo, LoadOperand};
    pub use crate::{Chunk, ChunkFlags, Error, Instruction, Loc, Op, Result};
}

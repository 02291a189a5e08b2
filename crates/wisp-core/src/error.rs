//! Crate-wide error type for the bytecode format and allocator.
//!
//! Front-end errors (lex/parse/simplify/codegen) and VM errors each get
//! their own enum closer to where they're raised (`wisp-compiler`,
//! `wisp-vm`); this one only covers the chunk format and allocator, the
//! two things `wisp-core` itself can fail at.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("chunk: {0}")]
    Chunk(String),

    #[error("{0}")]
    Msg(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

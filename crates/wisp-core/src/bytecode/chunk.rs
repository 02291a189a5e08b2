//! Compiled-module binary format: [`Instruction`] sequence plus debug info,
//! serialized with a magic/version/hash header the way `.wispc` files are
//! expected to round-trip.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loc::Loc;

use super::op::Op;

pub const CHUNK_MAGIC: [u8; 4] = *b"WISP";
pub const CHUNK_VERSION: u16 = 1;

/// One bytecode instruction: opcode, its inline operand (folded into `Op`
/// itself), and the source location it was generated from (spec §3,
/// "Instruction").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Op,
    pub loc: Loc,
}

impl Instruction {
    pub fn new(op: Op, loc: Loc) -> Self {
        Self { op, loc }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFlags {
    pub stripped: bool,
}

/// Per-module debug metadata kept alongside the instruction stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugInfo {
    pub main_file: Option<String>,
    /// Absolute path of every module this chunk's source imported, in
    /// import order (duplicates removed — see the module registry cache).
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub flags: ChunkFlags,
    pub hash: u64,
}

/// A compiled module: its instruction stream plus debug info. Mirrors
/// spec §3's `Module { bytecode }` field and is what the codegen pass (H)
/// produces and the interpreter loop (N) walks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    pub flags: ChunkFlags,
    pub ops: Vec<Instruction>,
    pub debug: DebugInfo,
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkLoadError {
    #[error("bad magic: expected {CHUNK_MAGIC:?}, found {0:?}")]
    BadMagic([u8; 4]),
    #[error("unsupported version: {0} (expected {CHUNK_VERSION})")]
    BadVersion(u16),
    #[error("hash mismatch: file is corrupted")]
    HashMismatch,
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
}

struct Fnv1a64(u64);

impl Fnv1a64 {
    fn new() -> Self {
        Self(0xcbf29ce484222325)
    }
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
    }
    fn finish(&self) -> u64 {
        self.0
    }
}

fn bincode_opts() -> impl bincode::Options {
    use bincode::Options;
    bincode::DefaultOptions::new().with_fixint_encoding().with_little_endian()
}

impl Chunk {
    pub fn new(flags: ChunkFlags) -> Self {
        Self { flags, ops: Vec::new(), debug: DebugInfo::default() }
    }

    pub fn push(&mut self, op: Op, loc: Loc) -> usize {
        let idx = self.ops.len();
        self.ops.push(Instruction::new(op, loc));
        idx
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn compute_hash(body: &[u8]) -> u64 {
        let mut h = Fnv1a64::new();
        h.write(body);
        h.finish()
    }

    /// Serializes to the on-disk `.wispc` format: header (with a hash over
    /// the body) followed by the bincode-encoded body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = bincode_opts().serialize(&(&self.flags, &self.ops, &self.debug)).expect("chunk body encode");
        let header = ChunkHeader {
            magic: CHUNK_MAGIC,
            version: CHUNK_VERSION,
            flags: self.flags,
            hash: Self::compute_hash(&body),
        };
        let mut out = bincode_opts().serialize(&header).expect("chunk header encode");
        out.extend_from_slice(&body);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, ChunkLoadError> {
        let opts = bincode_opts();
        let header_size = opts.serialized_size(&ChunkHeader {
            magic: CHUNK_MAGIC,
            version: CHUNK_VERSION,
            flags: ChunkFlags::default(),
            hash: 0,
        })? as usize;
        if bytes.len() < header_size {
            return Err(ChunkLoadError::Bincode(Box::new(bincode::ErrorKind::SizeLimit)));
        }
        let header: ChunkHeader = opts.deserialize(&bytes[..header_size])?;
        if header.magic != CHUNK_MAGIC {
            return Err(ChunkLoadError::BadMagic(header.magic));
        }
        if header.version != CHUNK_VERSION {
            return Err(ChunkLoadError::BadVersion(header.version));
        }
        let body = &bytes[header_size..];
        if Self::compute_hash(body) != header.hash {
            return Err(ChunkLoadError::HashMismatch);
        }
        let (flags, ops, debug): (ChunkFlags, Vec<Instruction>, DebugInfo) = opts.deserialize(body)?;
        debug_assert_eq!(flags, header.flags);
        Ok(Self { flags: header.flags, ops, debug })
    }

    pub fn load_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let chunk = Self::from_bytes(&bytes).map_err(|e| Error::Chunk(e.to_string()))?;
        #[cfg(feature = "trace")]
        tracing::debug!(path = %path.display(), ops = chunk.len(), "loaded chunk");
        Ok(chunk)
    }

    pub fn write_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_bytes())?;
        #[cfg(feature = "trace")]
        tracing::debug!(path = %path.display(), ops = self.len(), "wrote chunk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::LoadOperand;

    fn sample() -> Chunk {
        let mut c = Chunk::new(ChunkFlags::default());
        c.push(Op::LoadData(LoadOperand::Int(42)), Loc::synthetic());
        c.push(Op::Create("x".into()), Loc::synthetic());
        c.push(Op::Return(false), Loc::synthetic());
        c
    }

    #[test]
    fn roundtrip_bytes() {
        let c = sample();
        let bytes = c.to_bytes();
        let c2 = Chunk::from_bytes(&bytes).expect("roundtrip");
        assert_eq!(c2.ops.len(), 3);
    }

    #[test]
    fn corruption_is_rejected() {
        let c = sample();
        let mut bytes = c.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = Chunk::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ChunkLoadError::HashMismatch | ChunkLoadError::Bincode(_)));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(Chunk::from_bytes(&bytes), Err(ChunkLoadError::BadMagic(_))));
    }
}

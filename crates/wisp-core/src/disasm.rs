//! Human-readable textual dump of a [`Chunk`], used by the CLI's `--ir`
//! flag (spec §6.5).

use crate::bytecode::Chunk;

/// Renders every instruction as `index  MNEMONIC   operand`, one per line,
/// e.g.:
/// ```text
/// 0     LOAD_DATA     42
/// 1     CREATE        x
/// 2     RETURN        false
/// ```
pub fn disassemble(chunk: &Chunk, title: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("; {title} ({} ops)\n", chunk.len()));
    for (idx, instr) in chunk.ops.iter().enumerate() {
        out.push_str(&format!("{idx:<6}{}\n", instr.op));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{ChunkFlags, LoadOperand, Op};
    use crate::loc::Loc;

    #[test]
    fn dump_has_one_line_per_op() {
        let mut c = Chunk::new(ChunkFlags::default());
        c.push(Op::LoadData(LoadOperand::Int(1)), Loc::synthetic());
        c.push(Op::Return(false), Loc::synthetic());
        let text = disassemble(&c, "t");
        assert_eq!(text.lines().count(), 3); // header + 2 ops
    }
}

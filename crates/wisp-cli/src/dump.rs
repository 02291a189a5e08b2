//! The stop-early dump flags (spec §6.1: `-l/--lex`, `-p/--parse`,
//! `-P/--optparse`, `-i/--ir`): run a prefix of the front-end pipeline and
//! print its intermediate form instead of executing anything.

use anyhow::{Context, Result};
use wisp_compiler::{lex, parser, simplify};
use wisp_core::disasm;

/// `-l/--lex`: tokens, one `{:#?}` per source file, via [`lex::tokenize`].
pub fn dump_tokens(src: &str, module: &str, module_path: &str) -> Result<String> {
    let tokens = lex::tokenize(src, module, module_path).context("lex error")?;
    Ok(tokens.iter().map(|t| format!("{t:#?}")).collect::<Vec<_>>().join("\n"))
}

/// `-p/--parse`: the raw AST, before the simplify pass (spec component D).
pub fn dump_ast(src: &str, module: &str, module_path: &str, module_id: u16) -> Result<String> {
    let tokens = lex::tokenize(src, module, module_path).context("lex error")?;
    let program = parser::parse(&tokens, module, module_id).context("parse error")?;
    Ok(format!("{program:#?}"))
}

/// `-P/--optparse`: the simplified AST (spec component F), the shape
/// codegen actually consumes.
pub fn dump_optparse_ast(src: &str, module: &str, module_path: &str, module_id: u16) -> Result<String> {
    let tokens = lex::tokenize(src, module, module_path).context("lex error")?;
    let program = parser::parse(&tokens, module, module_id).context("parse error")?;
    let program = simplify::simplify_program(program).context("simplify error")?;
    Ok(format!("{program:#?}"))
}

/// `-i/--ir`: the compiled [`wisp_core::Chunk`] rendered per spec §6.5.
pub fn dump_ir(src: &str, module: &str, module_path: &str, module_id: u16) -> Result<String> {
    let chunk = wisp_compiler::compile_module(src, module, module_path, module_id).context("compile error")?;
    Ok(disasm::disassemble(&chunk, module))
}

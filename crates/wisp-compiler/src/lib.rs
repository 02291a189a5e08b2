//! Front-end pipeline: lex → parse → simplify → codegen, plus the
//! diagnostics renderer shared by every stage (spec §4, components D–H
//! and B).

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod lex;
pub mod parser;
pub mod simplify;

use thiserror::Error;

use ast::Program;
use wisp_core::Chunk;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] lex::LexError),
    #[error("parse error: {0}")]
    Parse(#[from] parser::ParseError),
    #[error("simplify error: {0}")]
    Simplify(#[from] simplify::SimplifyError),
    #[error("codegen error: {0}")]
    Codegen(#[from] codegen::CodegenError),
}

/// Runs the full front-end pipeline over one module's source text and
/// produces a [`Chunk`] ready for the interpreter.
pub fn compile_module(src: &str, module_name: &str, module_path: &str, module_id: u16) -> Result<Chunk, CompileError> {
    let tokens = lex::tokenize(src, module_name, module_path)?;
    let program = parser::parse(&tokens, module_name, module_id)?;
    let program = simplify::simplify_program(program)?;
    let chunk = codegen::codegen(&program.body)?;
    #[cfg(feature = "trace")]
    tracing::debug!(module = module_name, module_id, ops = chunk.len(), "compiled module");
    Ok(chunk)
}

/// Parses and simplifies without generating bytecode — used by tools that
/// only need the AST (formatters, static analyzers).
pub fn parse_module(src: &str, module_name: &str, module_path: &str, module_id: u16) -> Result<Program, CompileError> {
    let tokens = lex::tokenize(src, module_name, module_path)?;
    let program = parser::parse(&tokens, module_name, module_id)?;
    let program = simplify::simplify_program(program)?;
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_small_program_end_to_end() {
        let src = "let total = 0; for let i = 0; i < 3; i = i + 1 { total = total + i; } total;";
        let chunk = compile_module(src, "t", "t.wisp", 0).expect("compiles");
        assert!(!chunk.is_empty());
    }

    #[test]
    fn reports_lex_errors_through_the_unified_error_type() {
        let err = compile_module("let x = `bad`;", "t", "t.wisp", 0).unwrap_err();
        assert!(matches!(err, CompileError::Lex(_)));
    }
}

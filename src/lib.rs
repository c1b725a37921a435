//! Back end of a compiler for WLP4, a small C-like teaching language.
//!
//! Input is a derivation tree in production-line form; output is assembly
//! for a MIPS-style register machine. The pipeline is
//! [`reader`] → [`lower`] → [`sema`] → [`codegen`].

pub mod asm;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod frame;
pub mod labels;
pub mod lower;
pub mod reader;
pub mod sema;
pub mod symbols;
pub mod tree;
pub mod types;

use error::CompileResult;
use sema::Analysis;

/// Result of a successful compilation.
#[derive(Debug)]
pub struct Compilation {
    pub analysis: Analysis,
    pub assembly: String,
}

/// Runs the whole pipeline on production-line input.
pub fn compile_unit(input: &str) -> CompileResult<Compilation> {
    let tree = reader::read_tree(input)?;
    let program = lower::lower(&tree)?;
    for p in program.all_procedures() {
        log::debug!(
            "procedure '{}': {} params, {} locals, {} statements",
            p.name,
            p.params.len(),
            p.dcls.len(),
            p.body.len()
        );
    }
    let analysis = sema::check(&program)?;
    let assembly = codegen::generate(&program, &analysis)?;
    Ok(Compilation { analysis, assembly })
}

/// Compiles production-line input to assembly text.
pub fn compile(input: &str) -> CompileResult<String> {
    compile_unit(input).map(|c| c.assembly)
}

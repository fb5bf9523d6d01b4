//! Crate root: wires together the compilation pipeline.
//!
//! Source text flows through the stages strictly in order, and each stage
//! fails fast on the first error:
//! - `tokenizer` strips comments and produces a flat token stream.
//! - `parser` builds the syntax tree for the whole program.
//! - `ir` resolves variables and pools string constants.
//! - `codegen` lowers the IR into x86-64 assembly text.
//! - `error` holds the diagnostics shared by every stage.
//!
//! `link` and `args` belong to the command-line driver and are not part of
//! the in-memory pipeline.

pub mod args;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod link;
pub mod parser;
pub mod tokenizer;

pub use codegen::CodegenOptions;
pub use error::{CompileError, CompileResult, Location};

/// Compile a source string into assembly text with default options.
pub fn compile(source: &str) -> CompileResult<String> {
  compile_with(source, &CodegenOptions::default())
}

/// Compile a source string into assembly text.
///
/// Every call builds fresh generator state, so compiling the same text twice
/// yields identical output.
pub fn compile_with(source: &str, options: &CodegenOptions) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source)?;
  let program = parser::parse(tokens)?;
  let ir = ir::generate(&program)?;
  codegen::generate(&ir, options)
}

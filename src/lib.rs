//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis, one pulled token at a time.
//! - `symbols` tracks declarations in function-granular scopes.
//! - `parser` owns all syntactic knowledge and drives a backend directly;
//!   there is no intermediate representation.
//! - `codegen` defines the backend contract and the reference stack machine
//!   with its fixed-width text instruction encoding.
//! - `error` centralises the fatal error type shared by the other modules.

pub mod codegen;
pub mod error;
pub mod parser;
pub mod symbols;
pub mod tokenizer;
pub mod ty;

pub use error::{CompileError, CompileResult};

use codegen::StackMachine;
use error::MissingEntryPointSnafu;
use parser::Compiler;
use symbols::SymbolTable;

/// Compile a source unit into the stack machine's text instruction format.
pub fn compile(source: &str) -> CompileResult<String> {
  let (output, _) = compile_with_symbols(source)?;
  Ok(output)
}

/// Compile a source unit and also hand back the final symbol table, for the
/// driver's debug dump.
pub fn compile_with_symbols(source: &str) -> CompileResult<(String, SymbolTable)> {
  let mut backend = StackMachine::new();
  let symbols = Compiler::new(source, &mut backend)?.run()?;
  let entry = symbols
    .entry_point()
    .ok_or_else(|| MissingEntryPointSnafu.build())?;
  backend.finish(entry)?;
  Ok((backend.into_output(), symbols))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minimal_program_compiles() {
    let out = compile("int main() { return 0; }").unwrap();
    assert!(out.starts_with("GLOBALS 0\n---\n"));
    assert!(out.contains("ret    \n"));
  }

  #[test]
  fn entry_jump_targets_main() {
    let (out, symbols) =
      compile_with_symbols("int f() { return 1; } int main() { return 0; }").unwrap();
    let entry = symbols.entry_point().unwrap();
    assert!(out.contains(&format!("JMP {entry:04x}\n")));
  }

  #[test]
  fn program_without_main_is_fatal() {
    let err = compile("int f() { return 1; }").unwrap_err();
    assert!(matches!(err, CompileError::MissingEntryPoint));
  }

  #[test]
  fn globals_only_program_is_fatal() {
    // No function was ever started, so there is no header and no entry.
    let err = compile("int a; int b;").unwrap_err();
    assert!(matches!(err, CompileError::MissingEntryPoint));
  }
}

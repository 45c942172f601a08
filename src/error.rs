//! Shared error utilities used across the compilation pipeline.
//!
//! Every error is fatal: the compiler reports the failing source line and
//! stops at the first problem, with no recovery or resynchronization. The
//! capacity errors (`TokenTooLong`, `TooManySymbols`, `ProgramTooLarge`) are
//! distinct from syntax errors so the fixed ceilings stay testable.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("[line {line}] token too long: {lexeme}"))]
  TokenTooLong { line: u32, lexeme: String },

  #[snafu(display("[line {line}] unexpected end of input"))]
  UnexpectedEof { line: u32 },

  #[snafu(display("[line {line}] invalid literal: {literal}"))]
  InvalidLiteral { line: u32, literal: String },

  #[snafu(display("[line {line}] undeclared symbol: {name}"))]
  UndeclaredSymbol { line: u32, name: String },

  #[snafu(display("[line {line}] symbol redefined: {name}"))]
  DuplicateSymbol { line: u32, name: String },

  #[snafu(display("[line {line}] expected '{expected}', but found: {found}"))]
  SyntaxExpectation {
    line: u32,
    expected: String,
    found: String,
  },

  #[snafu(display("[line {line}] unexpected primary expression: {found}"))]
  UnexpectedPrimary { line: u32, found: String },

  #[snafu(display("[line {line}] call target is not a known function: {name}"))]
  CallOutsideFunction { line: u32, name: String },

  #[snafu(display("[line {line}] type name expected"))]
  TypeExpected { line: u32 },

  #[snafu(display("[line {line}] too many symbols"))]
  TooManySymbols { line: u32 },

  #[snafu(display("[line {line}] unexpected global variable declaration"))]
  UnexpectedGlobal { line: u32 },

  #[snafu(display("generated program exceeds the code buffer capacity"))]
  ProgramTooLarge,

  #[snafu(display("missing entry point: main"))]
  MissingEntryPoint,
}

/// Human-friendly rendition of a lexeme for diagnostics; the empty lexeme is
/// the end-of-input sentinel.
pub fn describe_lexeme(text: &str) -> String {
  if text.is_empty() {
    "EOF".to_string()
  } else {
    text.to_string()
  }
}

//! Single-pass recursive-descent compiler: statements, declarations and a
//! precedence-climbing expression grammar that emits backend calls as it
//! parses. There is no AST; the only state threaded between grammar rules is
//! the value category of the accumulator and the compile-time stack cursor.
//!
//! The cursor counts the value slots currently pushed above the active
//! function's frame base. It must stay in exact lockstep with every emitted
//! push and pop: blocks restore it on exit, branches restore it when they
//! close, and a `return` zeroes it after dropping the whole frame.

use crate::codegen::Backend;
use crate::error::{
  CallOutsideFunctionSnafu, CompileResult, InvalidLiteralSnafu, SyntaxExpectationSnafu,
  TypeExpectedSnafu, UndeclaredSymbolSnafu, UnexpectedGlobalSnafu, UnexpectedPrimarySnafu,
  describe_lexeme,
};
use crate::symbols::{SymbolId, SymbolKind, SymbolTable};
use crate::tokenizer::{Token, Tokenizer};
use crate::ty::{BinaryOp, ValueKind, Width};

/// Drives one compilation: owns the tokenizer, the live token, the symbol
/// table and the stack cursor, and emits through the backend it borrows.
pub struct Compiler<'a, B: Backend> {
  lexer: Tokenizer<'a>,
  tok: Token,
  symbols: SymbolTable,
  backend: &'a mut B,
  /// Scope declarations and lookups currently resolve against; file scope
  /// outside function bodies.
  scope: crate::symbols::ScopeId,
  /// Value slots pushed above the current frame base.
  stack_pos: i32,
  /// Locals declared in the current function so far.
  frame_locals: usize,
  /// Deferred frame preamble, flushed before the first non-declaration
  /// statement or at function exit.
  preamble_pending: bool,
  /// Whether the most recently compiled statement was a `return`.
  last_is_return: bool,
  /// Globals may only appear before the first function; the program header
  /// freezes their count.
  scanning_globals: bool,
  globals: usize,
}

impl<'a, B: Backend> Compiler<'a, B> {
  pub fn new(source: &'a str, backend: &'a mut B) -> CompileResult<Self> {
    let mut lexer = Tokenizer::new(source);
    let tok = lexer.next_token()?;
    let symbols = SymbolTable::new();
    let scope = symbols.file_scope();
    Ok(Self {
      lexer,
      tok,
      symbols,
      backend,
      scope,
      stack_pos: 0,
      frame_locals: 0,
      preamble_pending: false,
      last_is_return: false,
      scanning_globals: true,
      globals: 0,
    })
  }

  fn next_tok(&mut self) -> CompileResult<()> {
    self.tok = self.lexer.next_token()?;
    Ok(())
  }

  fn peek(&self, s: &str) -> bool {
    self.tok.text == s
  }

  /// Consume the current token if it matches.
  fn accept(&mut self, s: &str) -> CompileResult<bool> {
    if self.peek(s) {
      self.next_tok()?;
      return Ok(true);
    }
    Ok(false)
  }

  /// Consume the current token or fail. The grammar-rule call site is logged
  /// for debug runs.
  #[track_caller]
  fn expect(&mut self, s: &str) -> CompileResult<()> {
    let caller = std::panic::Location::caller();
    if self.accept(s)? {
      return Ok(());
    }
    tracing::debug!(rule = %caller, expected = s, "syntax expectation failed");
    SyntaxExpectationSnafu {
      line: self.tok.line,
      expected: s,
      found: describe_lexeme(&self.tok.text),
    }
    .fail()
  }

  /// Consume a type name if one is present. Pointer stars are accepted and
  /// ignored; `void` is consumed but does not count as a type.
  fn typename(&mut self) -> CompileResult<bool> {
    if self.peek("int") || self.peek("char") {
      self.next_tok()?;
      while self.accept("*")? {}
      return Ok(true);
    }
    if self.peek("void") {
      self.next_tok()?;
    }
    Ok(false)
  }

  /// Decode the current token as an integer literal: decimal, or `0x`/`0o`/
  /// `0b` prefixed. A zero-leading token with no recognized prefix is
  /// invalid rather than octal.
  fn parse_int_literal(&self) -> CompileResult<i32> {
    let text = &self.tok.text;
    let bytes = text.as_bytes();
    let ctx = InvalidLiteralSnafu {
      line: self.tok.line,
      literal: text.clone(),
    };
    if bytes[0] == b'0' {
      if text.len() == 1 {
        return Ok(0);
      }
      if text.len() < 3 {
        return ctx.fail();
      }
      let radix = match bytes[1] {
        b'x' | b'X' => 16,
        b'o' | b'O' => 8,
        b'b' | b'B' => 2,
        _ => return ctx.fail(),
      };
      return i64::from_str_radix(&text[2..], radix)
        .map(|v| v as i32)
        .ok()
        .map_or_else(|| ctx.fail(), Ok);
    }
    text.parse::<i64>().map(|v| v as i32).ok().map_or_else(|| ctx.fail(), Ok)
  }

  /// Expand the current quoted literal into its data block: `\xNN` escapes
  /// become single bytes, everything else is verbatim. A NUL terminator is
  /// appended, plus one pad byte when the decoded length is even, so the
  /// block always fills whole stack slots.
  fn decode_literal(&self) -> CompileResult<Vec<u8>> {
    let raw = self.tok.text.as_bytes();
    let inner = &raw[1..raw.len() - 1];
    let mut bytes = Vec::new();
    let mut i = 0;
    while i < inner.len() {
      if inner[i] == b'\\' && i + 3 < inner.len() && inner[i + 1] == b'x' {
        let hex = std::str::from_utf8(&inner[i + 2..i + 4]).unwrap_or("");
        let value = u8::from_str_radix(hex, 16).ok().map_or_else(
          || {
            InvalidLiteralSnafu {
              line: self.tok.line,
              literal: self.tok.text.clone(),
            }
            .fail()
          },
          Ok,
        )?;
        bytes.push(value);
        i += 4;
      } else {
        bytes.push(inner[i]);
        i += 1;
      }
    }
    let decoded = bytes.len();
    bytes.push(0);
    if decoded % 2 == 0 {
      bytes.push(0);
    }
    Ok(bytes)
  }

  /// Primary expression. Returns the value category and, for identifiers,
  /// the resolved symbol so a following call can size its cleanup.
  fn prim_expr(&mut self) -> CompileResult<(ValueKind, Option<SymbolId>)> {
    let first = self.tok.text.bytes().next();

    if matches!(first, Some(c) if c.is_ascii_digit()) {
      let value = self.parse_int_literal()?;
      self.backend.emit_const(value)?;
      self.next_tok()?;
      return Ok((ValueKind::Num, None));
    }

    if matches!(first, Some(c) if c.is_ascii_alphabetic() || c == b'_') {
      let name = self.tok.text.clone();
      let line = self.tok.line;
      let id = self
        .symbols
        .find(self.scope, &name)
        .or_else(|| self.symbols.find(self.symbols.file_scope(), &name))
        .map_or_else(|| UndeclaredSymbolSnafu { line, name: name.clone() }.fail(), Ok)?;
      tracing::trace!(name = %self.symbols.qualified_name(id), "symbol reference");
      match self.symbols.get(id).kind {
        SymbolKind::Local { offset } => {
          self.backend.emit_stack_addr(self.stack_pos - offset - 1)?;
        }
        kind => self.backend.emit_sym_addr(kind.addr())?,
      }
      self.next_tok()?;
      return Ok((ValueKind::IntAddr, Some(id)));
    }

    if self.accept("(")? {
      let ty = self.expr()?;
      self.expect(")")?;
      return Ok((ty, None));
    }

    if matches!(first, Some(b'"' | b'\'')) {
      let bytes = self.decode_literal()?;
      self.backend.emit_inline_data(&bytes)?;
      self.stack_pos += (bytes.len() / 2) as i32;
      self.backend.emit_stack_addr(0)?;
      self.next_tok()?;
      return Ok((ValueKind::Num, None));
    }

    UnexpectedPrimarySnafu {
      line: self.tok.line,
      found: describe_lexeme(&self.tok.text),
    }
    .fail()
  }

  /// Shared binary-operator plumbing: dereference and save the left operand,
  /// parse the right side at the given tightness, dereference it if needed,
  /// then emit the opcode (which pops the saved operand).
  fn binary(
    &mut self,
    lhs: ValueKind,
    op: BinaryOp,
    rhs: fn(&mut Self) -> CompileResult<ValueKind>,
  ) -> CompileResult<ValueKind> {
    if let Some(width) = lhs.width() {
      self.backend.emit_load(width)?;
    }
    self.backend.emit_push()?;
    self.stack_pos += 1;
    let r = rhs(self)?;
    if let Some(width) = r.width() {
      self.backend.emit_load(width)?;
    }
    self.backend.emit_binary(op)?;
    self.stack_pos -= 1;
    Ok(ValueKind::Num)
  }

  /// Postfix: array indexing on a word address, or a function call.
  fn postfix_expr(&mut self) -> CompileResult<ValueKind> {
    let (mut ty, sym) = self.prim_expr()?;

    if ty == ValueKind::IntAddr && self.accept("[")? {
      // Indexing advances by the raw index value and yields byte access.
      self.binary(ty, BinaryOp::Add, Self::expr)?;
      self.expect("]")?;
      ty = ValueKind::CharAddr;
    } else if self.accept("(")? {
      let line = self.tok.line;
      let prev = self.stack_pos;
      self.backend.emit_push()?; // callee address
      self.stack_pos += 1;
      let callee_slot = self.stack_pos - 1;
      if !self.accept(")")? {
        self.expr()?;
        self.backend.emit_push()?;
        self.stack_pos += 1;
        while self.accept(",")? {
          self.expr()?;
          self.backend.emit_push()?;
          self.stack_pos += 1;
        }
        self.expect(")")?;
      }
      self.backend.emit_stack_addr(self.stack_pos - callee_slot - 1)?;
      self.backend.emit_load(Width::Word)?;
      self.backend.emit_call()?;
      let params = match sym.map(|id| self.symbols.get(id).kind) {
        Some(SymbolKind::Function { params, .. }) => params,
        _ => {
          let name = match sym {
            Some(id) => self.symbols.qualified_name(id),
            None => "<expression>".to_string(),
          };
          return CallOutsideFunctionSnafu { line, name }.fail();
        }
      };
      // Release the callee slot plus the declared parameter slots. A
      // mismatched written argument count is not checked; the pop follows
      // the declaration.
      self.backend.emit_call_cleanup(params)?;
      self.backend.emit_pop(1 + params as i32)?;
      self.stack_pos = prev;
      ty = ValueKind::Num;
    }

    Ok(ty)
  }

  fn add_expr(&mut self) -> CompileResult<ValueKind> {
    let mut ty = self.postfix_expr()?;
    loop {
      if self.accept("+")? {
        ty = self.binary(ty, BinaryOp::Add, Self::postfix_expr)?;
      } else if self.accept("-")? {
        ty = self.binary(ty, BinaryOp::Sub, Self::postfix_expr)?;
      } else {
        return Ok(ty);
      }
    }
  }

  fn shift_expr(&mut self) -> CompileResult<ValueKind> {
    let mut ty = self.add_expr()?;
    loop {
      if self.accept("<<")? {
        ty = self.binary(ty, BinaryOp::Shl, Self::add_expr)?;
      } else if self.accept(">>")? {
        ty = self.binary(ty, BinaryOp::Shr, Self::add_expr)?;
      } else {
        return Ok(ty);
      }
    }
  }

  fn rel_expr(&mut self) -> CompileResult<ValueKind> {
    let mut ty = self.shift_expr()?;
    while self.accept("<")? {
      ty = self.binary(ty, BinaryOp::Less, Self::shift_expr)?;
    }
    Ok(ty)
  }

  fn eq_expr(&mut self) -> CompileResult<ValueKind> {
    let mut ty = self.rel_expr()?;
    loop {
      if self.accept("==")? {
        ty = self.binary(ty, BinaryOp::Eq, Self::rel_expr)?;
      } else if self.accept("!=")? {
        ty = self.binary(ty, BinaryOp::Ne, Self::rel_expr)?;
      } else {
        return Ok(ty);
      }
    }
  }

  fn bitwise_expr(&mut self) -> CompileResult<ValueKind> {
    let mut ty = self.eq_expr()?;
    loop {
      // Deliberately flat and non-C: the bitwise and multiplicative
      // operators share one loosest-binding level.
      let op = if self.accept("|")? {
        BinaryOp::Or
      } else if self.accept("&")? {
        BinaryOp::And
      } else if self.accept("^")? {
        BinaryOp::Xor
      } else if self.accept("/")? {
        BinaryOp::Div
      } else if self.accept("*")? {
        BinaryOp::Mul
      } else if self.accept("%")? {
        BinaryOp::Mod
      } else {
        return Ok(ty);
      };
      ty = self.binary(ty, op, Self::eq_expr)?;
    }
  }

  /// Full expression: assignment when the left side is an address, otherwise
  /// a trailing dereference turns a leftover address into its value.
  fn expr(&mut self) -> CompileResult<ValueKind> {
    let ty = self.bitwise_expr()?;
    if let Some(width) = ty.width() {
      if self.accept("=")? {
        self.backend.emit_push()?;
        self.stack_pos += 1;
        self.expr()?;
        self.backend.emit_store(width)?;
        self.stack_pos -= 1;
      } else {
        self.backend.emit_load(width)?;
      }
    }
    Ok(ValueKind::Num)
  }

  fn flush_preamble(&mut self) -> CompileResult<()> {
    if self.preamble_pending {
      self.preamble_pending = false;
      tracing::debug!(locals = self.frame_locals, "frame preamble");
      self.backend.emit_preamble(self.frame_locals)?;
    }
    Ok(())
  }

  fn statement(&mut self) -> CompileResult<()> {
    self.last_is_return = false;

    if self.accept("{")? {
      let saved = self.stack_pos;
      while !self.accept("}")? {
        self.statement()?;
      }
      self.backend.emit_pop(self.stack_pos - saved)?;
      self.stack_pos = saved;
      return Ok(());
    }

    if self.typename()? {
      // Local declaration: reserve one slot at the current cursor. The
      // runtime reservation happens in the coalesced frame preamble.
      let name = self.tok.text.clone();
      let line = self.tok.line;
      let id = self.symbols.declare(
        self.scope,
        &name,
        SymbolKind::Local {
          offset: self.stack_pos,
        },
        line,
      )?;
      tracing::debug!(name = %self.symbols.qualified_name(id), "local variable");
      self.next_tok()?;
      if self.accept("=")? {
        self.expr()?;
      }
      self.frame_locals += 1;
      self.stack_pos += 1;
      self.expect(";")?;
      return Ok(());
    }

    // First non-declaration statement: the frame size is known.
    self.flush_preamble()?;

    if self.accept("if")? {
      self.expect("(")?;
      self.expr()?;
      let skip = self.backend.emit_jump_if_zero()?;
      self.expect(")")?;
      let saved = self.stack_pos;
      self.statement()?;
      let done = self.backend.emit_jump()?;
      let target = self.backend.position();
      self.backend.patch(skip, target);
      if self.accept("else")? {
        self.stack_pos = saved;
        self.statement()?;
      }
      self.stack_pos = saved;
      let target = self.backend.position();
      self.backend.patch(done, target);
      return Ok(());
    }

    if self.accept("while")? {
      self.expect("(")?;
      let start = self.backend.position();
      self.expr()?;
      let exit = self.backend.emit_jump_if_zero()?;
      self.expect(")")?;
      self.statement()?;
      let back = self.backend.emit_jump()?;
      self.backend.patch(back, start);
      let target = self.backend.position();
      self.backend.patch(exit, target);
      return Ok(());
    }

    if self.accept("return")? {
      if !self.peek(";") {
        self.expr()?;
      }
      self.expect(";")?;
      // Drop every slot of the frame; the return address stays put.
      self.backend.emit_pop(self.stack_pos)?;
      self.stack_pos = 0;
      self.last_is_return = true;
      self.backend.emit_ret(self.frame_locals)?;
      return Ok(());
    }

    self.expr()?;
    self.expect(";")
  }

  /// Compile the whole source unit: leading globals, then functions and
  /// prototypes. Consumes the compiler and hands back the symbol table for
  /// entry-point resolution and the debug dump.
  pub fn run(mut self) -> CompileResult<SymbolTable> {
    while !self.tok.is_eof() {
      if !self.typename()? {
        return TypeExpectedSnafu {
          line: self.tok.line,
        }
        .fail();
      }
      let name = self.tok.text.clone();
      let line = self.tok.line;
      let file = self.symbols.file_scope();
      let id = self.symbols.declare(file, &name, SymbolKind::Forward, line)?;
      self.next_tok()?;

      if self.accept(";")? {
        if !self.scanning_globals {
          return UnexpectedGlobalSnafu { line }.fail();
        }
        let offset = self.backend.register_global();
        self.symbols.get_mut(id).kind = SymbolKind::Global { offset };
        self.globals += 1;
        tracing::debug!(name = %self.symbols.qualified_name(id), offset, "global variable");
        continue;
      }

      if self.scanning_globals {
        // The header announces the global count, so it is frozen at the
        // first function or prototype.
        self.backend.program_start(self.globals)?;
        self.scanning_globals = false;
      }

      self.expect("(")?;
      let fn_scope = self.symbols.enter_function(&name);
      let mut argc: i32 = 0;
      loop {
        argc += 1;
        if !self.typename()? {
          break;
        }
        let pname = self.tok.text.clone();
        let pline = self.tok.line;
        let pid = self.symbols.declare(
          fn_scope,
          &pname,
          SymbolKind::Local { offset: -argc - 1 },
          pline,
        )?;
        tracing::debug!(name = %self.symbols.qualified_name(pid), "parameter");
        self.next_tok()?;
        if self.peek(")") {
          break;
        }
        self.expect(",")?;
      }
      self.expect(")")?;

      if self.accept(";")? {
        // Prototype: the symbol stays forward-declared.
        continue;
      }

      self.stack_pos = 0;
      let addr = self.backend.position();
      self.symbols.get_mut(id).kind = SymbolKind::Function {
        addr,
        params: argc as usize,
      };
      tracing::debug!(name = %self.symbols.qualified_name(id), params = argc, addr, "function");
      self.scope = fn_scope;
      self.preamble_pending = true;
      self.frame_locals = 0;
      self.last_is_return = false;
      self.statement()?;
      self.flush_preamble()?;
      if !self.last_is_return {
        // Guarantee exactly one return sequence per function.
        self.backend.emit_ret(self.frame_locals)?;
      }
      self.scope = self.symbols.file_scope();
    }
    Ok(self.symbols)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codegen::PatchSite;
  use crate::error::CompileError;

  /// Mock backend that records emission calls instead of encoding bytes, so
  /// the front end can be checked without committing to an ISA. Positions
  /// are call indices.
  #[derive(Default)]
  struct Recorder {
    calls: Vec<Call>,
    globals: i32,
  }

  #[derive(Debug, Clone, PartialEq)]
  enum Call {
    Const(i32),
    StackAddr(i32),
    SymAddr(i32),
    Load(Width),
    Store(Width),
    Push,
    Pop(i32),
    Bin(BinaryOp),
    CallInsn,
    Cleanup(usize),
    Preamble(usize),
    Ret(usize),
    Jz,
    Jmp,
    Patch(usize, usize),
    Data(Vec<u8>),
    Start(usize),
  }

  impl Recorder {
    fn push(&mut self, call: Call) -> CompileResult<()> {
      self.calls.push(call);
      Ok(())
    }
  }

  impl Backend for Recorder {
    fn emit_const(&mut self, value: i32) -> CompileResult<()> {
      self.push(Call::Const(value))
    }
    fn emit_stack_addr(&mut self, depth: i32) -> CompileResult<()> {
      self.push(Call::StackAddr(depth))
    }
    fn emit_sym_addr(&mut self, addr: i32) -> CompileResult<()> {
      self.push(Call::SymAddr(addr))
    }
    fn emit_load(&mut self, width: Width) -> CompileResult<()> {
      self.push(Call::Load(width))
    }
    fn emit_store(&mut self, width: Width) -> CompileResult<()> {
      self.push(Call::Store(width))
    }
    fn emit_push(&mut self) -> CompileResult<()> {
      self.push(Call::Push)
    }
    fn emit_pop(&mut self, count: i32) -> CompileResult<()> {
      if count > 0 {
        self.push(Call::Pop(count))?;
      }
      Ok(())
    }
    fn emit_binary(&mut self, op: BinaryOp) -> CompileResult<()> {
      self.push(Call::Bin(op))
    }
    fn emit_call(&mut self) -> CompileResult<()> {
      self.push(Call::CallInsn)
    }
    fn emit_call_cleanup(&mut self, params: usize) -> CompileResult<()> {
      self.push(Call::Cleanup(params))
    }
    fn emit_preamble(&mut self, locals: usize) -> CompileResult<()> {
      self.push(Call::Preamble(locals))
    }
    fn emit_ret(&mut self, locals: usize) -> CompileResult<()> {
      self.push(Call::Ret(locals))
    }
    fn emit_jump(&mut self) -> CompileResult<PatchSite> {
      self.push(Call::Jmp)?;
      Ok(PatchSite(self.calls.len() - 1))
    }
    fn emit_jump_if_zero(&mut self) -> CompileResult<PatchSite> {
      self.push(Call::Jz)?;
      Ok(PatchSite(self.calls.len() - 1))
    }
    fn patch(&mut self, site: PatchSite, target: usize) {
      let PatchSite(site) = site;
      self.calls.push(Call::Patch(site, target));
    }
    fn emit_inline_data(&mut self, bytes: &[u8]) -> CompileResult<()> {
      self.push(Call::Data(bytes.to_vec()))
    }
    fn register_global(&mut self) -> i32 {
      let offset = self.globals;
      self.globals += 2;
      offset
    }
    fn program_start(&mut self, globals: usize) -> CompileResult<()> {
      self.push(Call::Start(globals))
    }
    fn position(&self) -> usize {
      self.calls.len()
    }
  }

  fn compile(src: &str) -> CompileResult<(Vec<Call>, SymbolTable)> {
    let mut backend = Recorder::default();
    let symbols = Compiler::new(src, &mut backend)?.run()?;
    Ok((backend.calls, symbols))
  }

  fn calls_of(src: &str) -> Vec<Call> {
    compile(src).unwrap().0
  }

  #[test]
  fn duplicate_local_across_nested_blocks_is_fatal() {
    let err = compile("int main() { int x; { int x; } }").unwrap_err();
    assert!(matches!(err, CompileError::DuplicateSymbol { .. }));
  }

  #[test]
  fn same_local_name_in_two_functions_is_fine() {
    compile("int f() { int x; return 0; } int g() { int x; return 0; } int main() { return 0; }")
      .unwrap();
  }

  #[test]
  fn every_function_emits_exactly_one_return_sequence() {
    let calls = calls_of(
      "int explicit() { return 1; } int fallthrough() { int a; a = 1; } int main() { return 0; }",
    );
    let rets = calls.iter().filter(|c| matches!(c, Call::Ret(_))).count();
    assert_eq!(rets, 3);
  }

  #[test]
  fn preamble_is_coalesced_and_emitted_once() {
    let (calls, _) = compile("int main() { int a; int b; a = 1; return 0; }").unwrap();
    let preambles: Vec<_> = calls
      .iter()
      .enumerate()
      .filter_map(|(i, c)| match c {
        Call::Preamble(n) => Some((i, *n)),
        _ => None,
      })
      .collect();
    assert_eq!(preambles.len(), 1);
    assert_eq!(preambles[0].1, 2);
    // The preamble lands before the first statement's store.
    let first_store = calls.iter().position(|c| matches!(c, Call::Store(_))).unwrap();
    assert!(preambles[0].0 < first_store);
  }

  #[test]
  fn declaration_only_body_still_gets_a_preamble() {
    let calls = calls_of("int main() { int a; }");
    assert_eq!(
      calls.iter().filter(|c| matches!(c, Call::Preamble(1))).count(),
      1
    );
    assert!(calls.iter().any(|c| matches!(c, Call::Ret(1))));
  }

  #[test]
  fn blocks_are_stack_neutral() {
    // The only counted pop should come from `return` dropping the one local;
    // the inner blocks balance out to nothing.
    let calls = calls_of("int main() { int a; { a = 1; { a = 2; } } return 0; }");
    let pops: Vec<_> = calls
      .iter()
      .filter_map(|c| match c {
        Call::Pop(n) => Some(*n),
        _ => None,
      })
      .collect();
    assert_eq!(pops, vec![1]);
  }

  #[test]
  fn inline_data_slots_are_released_at_block_exit() {
    // "ab" decodes to two bytes + NUL + pad = two stack slots.
    let calls = calls_of("int main() { { \"ab\"; } return 0; }");
    assert!(calls.iter().any(|c| matches!(c, Call::Pop(2))));
  }

  #[test]
  fn locals_and_parameters_use_cursor_relative_depths() {
    let calls = calls_of("int f(int a) { return a; } int main() { return 0; }");
    // First parameter sits at offset -2; with an empty frame that is depth 1.
    assert!(calls.contains(&Call::StackAddr(1)));
  }

  #[test]
  fn call_cleanup_is_keyed_by_callee_parameter_count() {
    // Three arguments written against two declared parameters: the mismatch
    // is not checked, the cleanup follows the declaration.
    let calls = calls_of(
      "int x; int f(int a, int b) { return 0; } int main() { f(1, 2, 3); return 0; }",
    );
    assert!(calls.contains(&Call::Cleanup(2)));
    assert!(!calls.iter().any(|c| matches!(c, Call::Cleanup(3))));
    // Callee slot + two declared parameters, even though four slots were
    // pushed.
    assert!(calls.contains(&Call::Pop(3)));
  }

  #[test]
  fn empty_parameter_list_counts_as_one() {
    let (calls, symbols) =
      compile("int f() { return 0; } int main() { f(); return 0; }").unwrap();
    let f = symbols.find(symbols.file_scope(), "f").unwrap();
    assert!(matches!(
      symbols.get(f).kind,
      SymbolKind::Function { params: 1, .. }
    ));
    assert!(calls.contains(&Call::Cleanup(1)));
  }

  #[test]
  fn void_parameter_list_parses_as_empty() {
    compile("int f(void) { return 0; } int main() { f(); return 0; }").unwrap();
  }

  #[test]
  fn calling_a_non_function_is_fatal() {
    let err = compile("int g; int main() { g(); return 0; }").unwrap_err();
    assert!(matches!(err, CompileError::CallOutsideFunction { .. }));
  }

  #[test]
  fn calling_a_prototype_is_fatal() {
    let err = compile("int f(int a); int main() { f(1); return 0; }").unwrap_err();
    assert!(matches!(err, CompileError::CallOutsideFunction { .. }));
  }

  #[test]
  fn undeclared_symbol_is_fatal() {
    let err = compile("int main() { y = 1; return 0; }").unwrap_err();
    assert!(matches!(err, CompileError::UndeclaredSymbol { .. }));
  }

  #[test]
  fn globals_must_precede_the_first_function() {
    let err = compile("int main() { return 0; } int late;").unwrap_err();
    assert!(matches!(err, CompileError::UnexpectedGlobal { .. }));
    let calls = calls_of("int a; int b; int main() { return 0; }");
    assert!(calls.contains(&Call::Start(2)));
  }

  #[test]
  fn missing_type_name_is_fatal() {
    let err = compile("main() { return 0; }").unwrap_err();
    assert!(matches!(err, CompileError::TypeExpected { .. }));
  }

  #[test]
  fn radix_prefixed_literals() {
    assert!(calls_of("int main() { return 0x1F; }").contains(&Call::Const(31)));
    assert!(calls_of("int main() { return 0o17; }").contains(&Call::Const(15)));
    assert!(calls_of("int main() { return 0b101; }").contains(&Call::Const(5)));
    assert!(calls_of("int main() { return 0; }").contains(&Call::Const(0)));
  }

  #[test]
  fn zero_leading_literals_without_a_prefix_are_invalid() {
    for src in ["int main() { return 007; }", "int main() { return 01; }"] {
      let err = compile(src).unwrap_err();
      assert!(matches!(err, CompileError::InvalidLiteral { .. }), "{src}");
    }
  }

  #[test]
  fn string_escapes_expand_with_nul_and_pad() {
    let calls = calls_of("int main() { \"\\x41\\x42\"; return 0; }");
    assert!(calls.contains(&Call::Data(vec![0x41, 0x42, 0x00, 0x00])));
    // Odd decoded length needs no pad byte.
    let calls = calls_of("int main() { \"\\x41\"; return 0; }");
    assert!(calls.contains(&Call::Data(vec![0x41, 0x00])));
  }

  #[test]
  fn char_literals_are_data_blocks_too() {
    let calls = calls_of("int main() { 'a'; return 0; }");
    assert!(calls.contains(&Call::Data(vec![b'a', 0x00])));
  }

  #[test]
  fn while_patches_one_backward_and_one_forward_jump() {
    let calls = calls_of("int x; int main() { while (x) x = 0; return 0; }");
    let patches: Vec<_> = calls
      .iter()
      .filter_map(|c| match c {
        Call::Patch(site, target) => Some((*site, *target)),
        _ => None,
      })
      .collect();
    assert_eq!(patches.len(), 2);
    assert!(patches.iter().any(|(site, target)| target < site), "backward");
    assert!(patches.iter().any(|(site, target)| target > site), "forward");
  }

  #[test]
  fn if_else_patches_both_legs_forward() {
    let calls =
      calls_of("int x; int main() { if (x) x = 1; else x = 2; return 0; }");
    let patches: Vec<_> = calls
      .iter()
      .filter_map(|c| match c {
        Call::Patch(site, target) => Some((*site, *target)),
        _ => None,
      })
      .collect();
    assert_eq!(patches.len(), 2);
    assert!(patches.iter().all(|(site, target)| target > site));
  }

  #[test]
  fn assignment_chooses_store_width_by_category() {
    let calls = calls_of("int x; int main() { x = 1; x[0] = 2; return 0; }");
    assert!(calls.contains(&Call::Store(Width::Word)));
    assert!(calls.contains(&Call::Store(Width::Byte)));
  }

  #[test]
  fn entry_point_is_the_recorded_function_position() {
    let (calls, symbols) = compile("int f() { return 0; } int main() { return 0; }").unwrap();
    let addr = symbols.entry_point().unwrap();
    assert!(addr > 0 && addr <= calls.len());
  }
}

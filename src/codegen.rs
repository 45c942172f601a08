//! Code generation: the backend contract and the reference stack machine.
//!
//! The front end never writes instructions itself; it drives a [`Backend`]
//! through small, fixed-shape emission calls. Jumps whose targets are not
//! yet known emit a fixed-width placeholder and hand back a [`PatchSite`]
//! that is later overwritten in place, so earlier offsets never shift.
//!
//! [`StackMachine`] is the reference implementation: an accumulator (`A`) /
//! spare register (`B`) / stack-and-memory virtual machine with a textual,
//! fixed-width instruction encoding. Alternative backends only need to
//! implement the trait; the front end is tested against a recording mock.

use crate::error::{CompileResult, MissingEntryPointSnafu, ProgramTooLargeSnafu};
use crate::ty::{BinaryOp, Width};

/// Fixed instruction-buffer capacity; exceeding it is fatal, never silent.
pub const MAX_CODE: usize = 4096;

/// Size of one global variable in backend memory, in bytes.
pub const WORD_SIZE: i32 = 2;

/// Handle to a patchable jump operand, returned at emission time. The
/// storage layout behind it is the backend's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSite(pub(crate) usize);

/// Instruction-emission contract consumed by the expression and statement
/// compilers. Emission can fail when the instruction buffer fills up, so
/// every emitting method returns a result.
pub trait Backend {
  /// Load a constant into the accumulator.
  fn emit_const(&mut self, value: i32) -> CompileResult<()>;
  /// Load the address of the stack slot `depth` slots below the top.
  fn emit_stack_addr(&mut self, depth: i32) -> CompileResult<()>;
  /// Load a symbol's fixed address (code offset or memory offset).
  fn emit_sym_addr(&mut self, addr: i32) -> CompileResult<()>;
  /// Dereference the address in the accumulator at the given width.
  fn emit_load(&mut self, width: Width) -> CompileResult<()>;
  /// Store the accumulator through the saved address at the given width.
  fn emit_store(&mut self, width: Width) -> CompileResult<()>;
  /// Push the accumulator.
  fn emit_push(&mut self) -> CompileResult<()>;
  /// Drop `count` stack slots; a non-positive count emits nothing.
  fn emit_pop(&mut self, count: i32) -> CompileResult<()>;
  /// Pop the saved left operand and combine it with the accumulator.
  fn emit_binary(&mut self, op: BinaryOp) -> CompileResult<()>;
  /// Call through the address in the accumulator.
  fn emit_call(&mut self) -> CompileResult<()>;
  /// Caller-side cleanup marker after a call, keyed by the callee's
  /// declared parameter count. The actual slot release is a separate pop.
  fn emit_call_cleanup(&mut self, params: usize) -> CompileResult<()>;
  /// Reserve `locals` stack slots for the current function frame.
  fn emit_preamble(&mut self, locals: usize) -> CompileResult<()>;
  /// Release the frame and return to the caller.
  fn emit_ret(&mut self, locals: usize) -> CompileResult<()>;
  /// Unconditional jump with a placeholder target.
  fn emit_jump(&mut self) -> CompileResult<PatchSite>;
  /// Jump-if-accumulator-zero with a placeholder target.
  fn emit_jump_if_zero(&mut self) -> CompileResult<PatchSite>;
  /// Overwrite a placeholder operand with the real target position.
  fn patch(&mut self, site: PatchSite, target: usize);
  /// Push an inline data block onto the stack, two bytes per slot, last
  /// pair first, so the block reads forward from the final stack top.
  fn emit_inline_data(&mut self, bytes: &[u8]) -> CompileResult<()>;
  /// Assign the next global-variable memory offset.
  fn register_global(&mut self) -> i32;
  /// Emit the program header once the global count is final.
  fn program_start(&mut self, globals: usize) -> CompileResult<()>;
  /// Current emission position, used to record jump targets.
  fn position(&self) -> usize;
}

/// Reference accumulator/stack backend emitting the fixed-width text ISA.
pub struct StackMachine {
  code: Vec<u8>,
  mem_pos: i32,
  entry_site: Option<PatchSite>,
}

impl StackMachine {
  pub fn new() -> Self {
    Self {
      code: Vec::new(),
      mem_pos: 0,
      entry_site: None,
    }
  }

  fn emit(&mut self, text: &str) -> CompileResult<()> {
    if self.code.len() + text.len() > MAX_CODE {
      return ProgramTooLargeSnafu.fail();
    }
    self.code.extend_from_slice(text.as_bytes());
    Ok(())
  }

  /// Emit an 8-byte jump line and return the site of its 4-hex operand.
  fn emit_placeholder(&mut self, mnemonic: &str) -> CompileResult<PatchSite> {
    self.emit(mnemonic)?;
    self.emit("....\n")?;
    Ok(PatchSite(self.code.len() - 5))
  }

  /// Resolve the entry jump and seal the program. Must be called once, after
  /// a fully successful compile.
  pub fn finish(&mut self, entry: usize) -> CompileResult<()> {
    let site = self.entry_site.take();
    let site = site.ok_or_else(|| MissingEntryPointSnafu.build())?;
    self.patch(site, entry);
    Ok(())
  }

  pub fn into_output(self) -> String {
    String::from_utf8(self.code).expect("emitted code is always ASCII")
  }
}

impl Default for StackMachine {
  fn default() -> Self {
    Self::new()
  }
}

impl Backend for StackMachine {
  fn emit_const(&mut self, value: i32) -> CompileResult<()> {
    self.emit(&format!("A:={:04x}\n", value as u32))
  }

  fn emit_stack_addr(&mut self, depth: i32) -> CompileResult<()> {
    self.emit(&format!("sp@{:04x}\n", depth as u32 & 0xffff))
  }

  fn emit_sym_addr(&mut self, addr: i32) -> CompileResult<()> {
    self.emit_const(addr)
  }

  fn emit_load(&mut self, width: Width) -> CompileResult<()> {
    match width {
      Width::Word => self.emit("A:=M[A]\n"),
      Width::Byte => self.emit("A:=m[A]\n"),
    }
  }

  fn emit_store(&mut self, width: Width) -> CompileResult<()> {
    match width {
      Width::Word => self.emit("pop B  \nM[B]:=A\n"),
      Width::Byte => self.emit("pop B  \nm[B]:=A\n"),
    }
  }

  fn emit_push(&mut self) -> CompileResult<()> {
    self.emit("push A \n")
  }

  fn emit_pop(&mut self, count: i32) -> CompileResult<()> {
    if count > 0 {
      self.emit(&format!("pop{count:04x}\n"))
    } else {
      Ok(())
    }
  }

  fn emit_binary(&mut self, op: BinaryOp) -> CompileResult<()> {
    let line = match op {
      BinaryOp::Add => "A:=B+A \n",
      BinaryOp::Sub => "A:=B-A \n",
      BinaryOp::Shl => "A:=B<<A\n",
      BinaryOp::Shr => "A:=B>>A\n",
      BinaryOp::Less => "A:=B<A \n",
      BinaryOp::Eq => "A:=B==A\n",
      BinaryOp::Ne => "A:=B!=A\n",
      BinaryOp::Or => "A:=B|A \n",
      BinaryOp::And => "A:=B&A \n",
      BinaryOp::Xor => "A:=B^A \n",
      BinaryOp::Div => "A:=B/A \n",
      BinaryOp::Mul => "A:=B*A \n",
      BinaryOp::Mod => "A:=B%A \n",
    };
    self.emit("pop B  \n")?;
    self.emit(line)
  }

  fn emit_call(&mut self) -> CompileResult<()> {
    self.emit("call A \n")
  }

  fn emit_call_cleanup(&mut self, params: usize) -> CompileResult<()> {
    self.emit(&format!("DO CLEAN {params}\n"))
  }

  fn emit_preamble(&mut self, locals: usize) -> CompileResult<()> {
    self.emit(&format!("PREAMB {locals}\n"))
  }

  fn emit_ret(&mut self, locals: usize) -> CompileResult<()> {
    self.emit(&format!("POSTAMB {locals}\n"))?;
    self.emit("ret    \n")
  }

  fn emit_jump(&mut self) -> CompileResult<PatchSite> {
    self.emit_placeholder("jmp")
  }

  fn emit_jump_if_zero(&mut self) -> CompileResult<PatchSite> {
    self.emit_placeholder("jmz")
  }

  fn patch(&mut self, site: PatchSite, target: usize) {
    let text = format!("{target:04x}");
    self.code[site.0..site.0 + 4].copy_from_slice(text.as_bytes());
  }

  fn emit_inline_data(&mut self, bytes: &[u8]) -> CompileResult<()> {
    // Two bytes per stack slot, little-endian within the slot. Pushing the
    // last pair first leaves the block readable forward from the stack top.
    for pair in bytes.rchunks(2) {
      let lo = pair[0] as i32;
      let hi = *pair.get(1).unwrap_or(&0) as i32;
      self.emit_const(hi << 8 | lo)?;
      self.emit_push()?;
    }
    Ok(())
  }

  fn register_global(&mut self) -> i32 {
    let offset = self.mem_pos;
    self.mem_pos += WORD_SIZE;
    offset
  }

  fn program_start(&mut self, globals: usize) -> CompileResult<()> {
    self.emit(&format!("GLOBALS {globals}\n---\n"))?;
    self.entry_site = Some(self.emit_placeholder("JMP ")?);
    self.emit("---\n")
  }

  fn position(&self) -> usize {
    self.code.len()
  }
}

/// Encode a signed 32-bit value into the minimum run of 7-bit chunks for a
/// target ISA whose instructions carry 7-bit immediate fragments. Chunks are
/// most significant first and carry a continuation tag in the high bit.
///
/// Non-negative values take one chunk per started 7-bit group (minimum one);
/// negative values take a chunk count picked by how many leading one-bits
/// the two's-complement form carries, so sign extension can rebuild the rest.
pub fn encode_immediate(value: i32) -> Vec<u8> {
  let bits = value as u32;
  let chunks = if value < 0 {
    match bits.leading_ones() {
      1..=4 => 5,
      5..=11 => 4,
      12..=18 => 3,
      19..=25 => 2,
      _ => 1,
    }
  } else {
    let mut tmp = bits;
    let mut n = 0;
    while tmp != 0 {
      tmp >>= 7;
      n += 1;
    }
    n.max(1)
  };

  (0..chunks)
    .rev()
    .map(|i| 0x80 | (bits >> (7 * i)) as u8 & 0x7f)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::CompileError;

  #[test]
  fn immediate_chunk_counts() {
    assert_eq!(encode_immediate(0).len(), 1);
    assert_eq!(encode_immediate(127).len(), 1);
    assert_eq!(encode_immediate(128).len(), 2);
    assert_eq!(encode_immediate(0xcd0).len(), 2);
    assert_eq!(encode_immediate(-1).len(), 1);
    assert_eq!(encode_immediate(-2).len(), 1);
    // 0xffaaba94 carries nine leading ones.
    assert_eq!(encode_immediate(0xffaaba94u32 as i32).len(), 4);
    // 0x80000000 carries exactly one.
    assert_eq!(encode_immediate(i32::MIN).len(), 5);
  }

  #[test]
  fn immediate_chunks_carry_payload_high_first() {
    assert_eq!(encode_immediate(128), vec![0x81, 0x80]);
    assert_eq!(encode_immediate(-1), vec![0xff]);
    let rebuilt = encode_immediate(0x1234)
      .iter()
      .fold(0u32, |acc, c| acc << 7 | (c & 0x7f) as u32);
    assert_eq!(rebuilt, 0x1234);
  }

  #[test]
  fn jump_patching_rewrites_in_place() {
    let mut backend = StackMachine::new();
    let site = backend.emit_jump().unwrap();
    backend.emit_const(7).unwrap();
    backend.patch(site, 0x1f);
    let out = backend.into_output();
    assert!(out.starts_with("jmp001f\n"), "got: {out}");
  }

  #[test]
  fn header_entry_is_patched_at_finish() {
    let mut backend = StackMachine::new();
    backend.program_start(3).unwrap();
    let entry = backend.position();
    backend.emit_const(1).unwrap();
    backend.finish(entry).unwrap();
    let out = backend.into_output();
    assert!(out.starts_with("GLOBALS 3\n---\n"), "got: {out}");
    assert!(out.contains(&format!("JMP {entry:04x}\n")), "got: {out}");
  }

  #[test]
  fn globals_get_sequential_word_offsets() {
    let mut backend = StackMachine::new();
    assert_eq!(backend.register_global(), 0);
    assert_eq!(backend.register_global(), WORD_SIZE);
    assert_eq!(backend.register_global(), 2 * WORD_SIZE);
  }

  #[test]
  fn inline_data_pushes_pairs_from_the_end() {
    let mut backend = StackMachine::new();
    backend.emit_inline_data(&[0x41, 0x42, 0x00, 0x00]).unwrap();
    let out = backend.into_output();
    assert_eq!(out, "A:=0000\npush A \nA:=4241\npush A \n");
  }

  #[test]
  fn code_buffer_capacity_is_fatal() {
    let mut backend = StackMachine::new();
    let err = loop {
      if let Err(err) = backend.emit_const(1) {
        break err;
      }
    };
    assert!(matches!(err, CompileError::ProgramTooLarge));
  }

  #[test]
  fn pop_of_zero_emits_nothing() {
    let mut backend = StackMachine::new();
    backend.emit_pop(0).unwrap();
    backend.emit_pop(-3).unwrap();
    assert_eq!(backend.position(), 0);
  }
}

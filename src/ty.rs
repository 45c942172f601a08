//! Value categories and operator tags threaded through the expression
//! compiler. A category says what the accumulator holds after a
//! sub-expression: a finished value, or the address of a word- or byte-sized
//! variable that still needs a sized dereference.

/// Compile-time category of the value currently in the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
  /// An already-evaluated value.
  Num,
  /// The address of a word-sized variable.
  IntAddr,
  /// The address of a byte-sized variable.
  CharAddr,
}

/// Memory access width for dereferences and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
  Word,
  Byte,
}

impl ValueKind {
  /// The dereference width required to turn this category into a value, if
  /// it is not one already.
  pub fn width(self) -> Option<Width> {
    match self {
      ValueKind::Num => None,
      ValueKind::IntAddr => Some(Width::Word),
      ValueKind::CharAddr => Some(Width::Byte),
    }
  }
}

/// Fixed-shape binary opcodes understood by every backend. Each one pops the
/// saved left operand and combines it with the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Shl,
  Shr,
  Less,
  Eq,
  Ne,
  Or,
  And,
  Xor,
  Div,
  Mul,
  Mod,
}

//! Append-only symbol table keyed by `(scope, name)`.
//!
//! Scoping is function-granular, not block-granular: every function gets one
//! scope for its parameters and locals, so two declarations of the same name
//! anywhere inside one function collide. Records are never removed; a lookup
//! returns the most recently declared match, which lets a `Forward` record be
//! refined to `Global` or `Function` without disturbing earlier history.

use crate::error::{CompileResult, DuplicateSymbolSnafu, TooManySymbolsSnafu};

/// Fixed symbol capacity; exceeding it is a fatal error.
pub const MAX_SYMBOLS: usize = 4096;

/// Identifies one declaration scope. Scope 0 is file scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(u32);

/// Stable handle to one symbol record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolId(usize);

/// What a name stands for, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
  /// Stack-frame slot. Parameters use negative offsets, locals count up
  /// from zero.
  Local { offset: i32 },
  /// Backend-assigned memory offset.
  Global { offset: i32 },
  /// Code offset plus declared parameter count.
  Function { addr: usize, params: usize },
  /// Declared but not yet refined to a global or a function.
  Forward,
}

impl SymbolKind {
  /// One-character tag used by the debug dump.
  pub fn tag(self) -> char {
    match self {
      SymbolKind::Local { .. } => 'L',
      SymbolKind::Global { .. } => 'G',
      SymbolKind::Function { .. } => 'F',
      SymbolKind::Forward => 'U',
    }
  }

  /// The address-like payload, as shown in the debug dump.
  pub fn addr(self) -> i32 {
    match self {
      SymbolKind::Local { offset } | SymbolKind::Global { offset } => offset,
      SymbolKind::Function { addr, .. } => addr as i32,
      SymbolKind::Forward => 0,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Symbol {
  pub name: String,
  pub scope: ScopeId,
  pub kind: SymbolKind,
}

#[derive(Debug)]
pub struct SymbolTable {
  symbols: Vec<Symbol>,
  /// Scope display prefixes; index 0 is the empty file-scope prefix.
  scope_names: Vec<String>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self {
      symbols: Vec::new(),
      scope_names: vec![String::new()],
    }
  }

  pub fn file_scope(&self) -> ScopeId {
    ScopeId(0)
  }

  /// Open a fresh scope for the named function's parameters and locals.
  pub fn enter_function(&mut self, name: &str) -> ScopeId {
    let id = ScopeId(self.scope_names.len() as u32);
    self.scope_names.push(format!("_{name}"));
    id
  }

  /// Record a new symbol. Redeclaring a name in the same scope is fatal.
  pub fn declare(
    &mut self,
    scope: ScopeId,
    name: &str,
    kind: SymbolKind,
    line: u32,
  ) -> CompileResult<SymbolId> {
    if self.symbols.iter().any(|s| s.scope == scope && s.name == name) {
      return DuplicateSymbolSnafu { line, name }.fail();
    }
    if self.symbols.len() >= MAX_SYMBOLS {
      return TooManySymbolsSnafu { line }.fail();
    }
    self.symbols.push(Symbol {
      name: name.to_string(),
      scope,
      kind,
    });
    Ok(SymbolId(self.symbols.len() - 1))
  }

  /// Resolve a name in one scope, preferring the latest declaration.
  pub fn find(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
    self
      .symbols
      .iter()
      .rposition(|s| s.scope == scope && s.name == name)
      .map(SymbolId)
  }

  pub fn get(&self, id: SymbolId) -> &Symbol {
    &self.symbols[id.0]
  }

  pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
    &mut self.symbols[id.0]
  }

  /// The `<ctx>_<name>` rendering used by diagnostics and the debug dump.
  pub fn qualified_name(&self, id: SymbolId) -> String {
    let sym = &self.symbols[id.0];
    format!("{}_{}", self.scope_names[sym.scope.0 as usize], sym.name)
  }

  /// Code offset of the designated entry function, if `main` has been
  /// compiled as a function.
  pub fn entry_point(&self) -> Option<usize> {
    let id = self.find(self.file_scope(), "main")?;
    match self.symbols[id.0].kind {
      SymbolKind::Function { addr, .. } => Some(addr),
      _ => None,
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
    self.symbols.iter().enumerate().map(|(i, s)| (SymbolId(i), s))
  }
}

impl Default for SymbolTable {
  fn default() -> Self {
    Self::new()
  }
}

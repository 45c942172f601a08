//! Lexical analysis: pulls one token at a time out of the source text.
//!
//! The tokenizer is intentionally tiny – it knows nothing about semantics.
//! A token is just the raw lexeme plus the line it started on; its kind is
//! re-derived from the lexeme's shape wherever it is consumed. Only one
//! token is live at a time, so the compiler as a whole stays single-pass.

use crate::error::{CompileResult, TokenTooLongSnafu, UnexpectedEofSnafu};

/// Fixed lexeme capacity; longer tokens are a fatal error rather than a
/// silent truncation.
pub const MAX_LEXEME: usize = 256;

/// One lexical token. An empty `text` marks end of input.
#[derive(Debug, Clone)]
pub struct Token {
  pub text: String,
  pub line: u32,
}

impl Token {
  pub fn is_eof(&self) -> bool {
    self.text.is_empty()
  }
}

/// Pull tokenizer over the source bytes with a single char of lookahead.
pub struct Tokenizer<'a> {
  src: &'a [u8],
  pos: usize,
  line: u32,
}

impl<'a> Tokenizer<'a> {
  pub fn new(source: &'a str) -> Self {
    let src = source.as_bytes();
    // The line counter advances whenever a newline becomes the lookahead.
    let line = if src.first() == Some(&b'\n') { 2 } else { 1 };
    Self { src, pos: 0, line }
  }

  pub fn line(&self) -> u32 {
    self.line
  }

  fn cur(&self) -> Option<u8> {
    self.src.get(self.pos).copied()
  }

  fn bump(&mut self) {
    self.pos += 1;
    if self.cur() == Some(b'\n') {
      self.line += 1;
    }
  }

  /// Move the lookahead char into the lexeme, enforcing the capacity cap.
  fn take(&mut self, lexeme: &mut String) -> CompileResult<()> {
    if lexeme.len() == MAX_LEXEME - 1 {
      return TokenTooLongSnafu {
        line: self.line,
        lexeme: lexeme.clone(),
      }
      .fail();
    }
    if let Some(c) = self.cur() {
      lexeme.push(c as char);
      self.bump();
    }
    Ok(())
  }

  fn eof_err<T>(&self) -> CompileResult<T> {
    UnexpectedEofSnafu { line: self.line }.fail()
  }

  /// Read the next token. Returns the EOF token once input is exhausted.
  pub fn next_token(&mut self) -> CompileResult<Token> {
    let mut lexeme = String::new();
    loop {
      while matches!(self.cur(), Some(c) if c.is_ascii_whitespace()) {
        self.bump();
      }
      let line = self.line;

      // Identifier / keyword / number: letters, digits, underscore.
      while matches!(self.cur(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
        self.take(&mut lexeme)?;
      }

      // Operator runs are captured greedily: '<<', '==', '!=' and friends
      // come out as a single token.
      if lexeme.is_empty() {
        while matches!(self.cur(), Some(b'<' | b'=' | b'>' | b'!' | b'&' | b'|')) {
          self.take(&mut lexeme)?;
        }
      }

      if lexeme.is_empty() {
        match self.cur() {
          Some(q @ (b'\'' | b'"')) => {
            // Quoted literal, captured verbatim including both delimiters.
            // Escapes are expanded later, when the literal is consumed as a
            // primary expression.
            self.take(&mut lexeme)?;
            while self.cur() != Some(q) {
              if self.cur().is_none() {
                return self.eof_err();
              }
              self.take(&mut lexeme)?;
            }
            self.take(&mut lexeme)?;
          }
          Some(b'/') => {
            self.take(&mut lexeme)?;
            if self.cur() == Some(b'*') {
              self.bump();
              loop {
                while self.cur() != Some(b'*') {
                  if self.cur().is_none() {
                    return self.eof_err();
                  }
                  self.bump();
                }
                self.bump();
                if self.cur() == Some(b'/') {
                  self.bump();
                  break;
                }
                if self.cur().is_none() {
                  return self.eof_err();
                }
              }
              lexeme.clear();
              continue;
            }
            if self.cur() == Some(b'/') {
              while self.cur().is_some() && self.cur() != Some(b'\n') {
                self.bump();
              }
              self.bump();
              lexeme.clear();
              continue;
            }
            // A lone '/' is an ordinary single-char token.
          }
          Some(_) => {
            self.take(&mut lexeme)?;
          }
          None => {}
        }
      }

      tracing::debug!(token = %lexeme, line, "token");
      return Ok(Token { text: lexeme, line });
    }
  }
}

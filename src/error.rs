//! Shared error utilities used across the compilation pipeline.
//!
//! Every stage fails fast with a [`CompileError`]. Errors that come from the
//! source text carry a [`Location`] so the driver can point at the offending
//! character with a caret.

use std::fmt;

use snafu::Snafu;

use crate::tokenizer::TokenKind;

pub type CompileResult<T> = Result<T, CompileError>;

/// 1-based line and column of a character in the original source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
  pub line: usize,
  pub column: usize,
}

impl Location {
  pub fn new(line: usize, column: usize) -> Self {
    Self { line, column }
  }
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  /// No lexical rule matches the input at `location`.
  #[snafu(display("{location}: error: {message}"))]
  Lex { location: Location, message: String },

  /// The parser expected one token kind and saw another.
  #[snafu(display("{location}: error: expected {expected}, but got {found}"))]
  Parse {
    location: Location,
    expected: String,
    found: TokenKind,
  },

  /// A variable was read before any assignment to it.
  #[snafu(display("{location}: error: variable '{name}' is not defined"))]
  UndefinedVariable { location: Location, name: String },

  /// The IR generator has no lowering for this expression shape.
  #[snafu(display("{location}: error: unsupported expression: {message}"))]
  UnsupportedExpression { location: Location, message: String },

  /// Codegen received IR that earlier stages should never produce.
  #[snafu(display("internal error: {message}"))]
  InternalConsistency { message: String },
}

impl CompileError {
  pub fn location(&self) -> Option<Location> {
    match self {
      Self::Lex { location, .. }
      | Self::Parse { location, .. }
      | Self::UndefinedVariable { location, .. }
      | Self::UnsupportedExpression { location, .. } => Some(*location),
      Self::InternalConsistency { .. } => None,
    }
  }

  /// Format the error together with the offending source line and a caret
  /// under the reported column.
  pub fn render(&self, source: &str) -> String {
    let Some(location) = self.location() else {
      return self.to_string();
    };
    let line = source
      .split('\n')
      .nth(location.line.saturating_sub(1))
      .unwrap_or("")
      .trim_end_matches('\r');
    let marker = format!("{}^", " ".repeat(location.column.saturating_sub(1)));
    format!("{self}\n    {line}\n    {marker}")
  }
}

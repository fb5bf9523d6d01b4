//! Recursive-descent parser producing a `Program` of statements.
//!
//! One token of lookahead is enough for the whole grammar:
//!
//! ```text
//! program    := statement* EndOfFile
//! statement  := Print LParen expression RParen
//!             | Identifier Equals expression
//! expression := term (Plus term)*
//! term       := Integer | String | Identifier | Input LParen expression RParen
//! ```
//!
//! `+` is left-associative, so `1 + 2 + 3` parses as `(1 + 2) + 3`.

use std::mem;

use tracing::debug;

use crate::error::{CompileResult, InternalConsistencySnafu, Location, ParseSnafu};
use crate::tokenizer::{Token, TokenKind};

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  StringLiteral {
    value: String,
    location: Location,
  },
  IntegerLiteral {
    value: u64,
    location: Location,
  },
  BinaryOp {
    op: BinaryOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },
  Variable {
    name: String,
    location: Location,
  },
  Input {
    prompt: Box<Expr>,
    location: Location,
  },
}

impl Expr {
  pub fn string(value: impl Into<String>, location: Location) -> Self {
    Self::StringLiteral {
      value: value.into(),
      location,
    }
  }

  pub fn integer(value: u64, location: Location) -> Self {
    Self::IntegerLiteral { value, location }
  }

  pub fn variable(name: impl Into<String>, location: Location) -> Self {
    Self::Variable {
      name: name.into(),
      location,
    }
  }

  pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
    Self::BinaryOp {
      op,
      left: Box::new(left),
      right: Box::new(right),
    }
  }

  pub fn input(prompt: Expr, location: Location) -> Self {
    Self::Input {
      prompt: Box::new(prompt),
      location,
    }
  }

  /// Where the expression starts in the source.
  pub fn location(&self) -> Location {
    let mut expr = self;
    loop {
      match expr {
        Self::StringLiteral { location, .. }
        | Self::IntegerLiteral { location, .. }
        | Self::Variable { location, .. }
        | Self::Input { location, .. } => return *location,
        Self::BinaryOp { left, .. } => expr = left.as_ref(),
      }
    }
  }

  /// Move the children of a compound node onto `pending`, leaving cheap
  /// leaves in their place.
  fn detach_children(&mut self, pending: &mut Vec<Expr>) {
    let placeholder = || Expr::integer(0, Location::default());
    match self {
      Self::BinaryOp { left, right, .. } => {
        pending.push(mem::replace(left.as_mut(), placeholder()));
        pending.push(mem::replace(right.as_mut(), placeholder()));
      }
      Self::Input { prompt, .. } => pending.push(mem::replace(prompt.as_mut(), placeholder())),
      Self::StringLiteral { .. } | Self::IntegerLiteral { .. } | Self::Variable { .. } => {}
    }
  }
}

/// `1 + 1 + ... + 1` nests one box per `+`; tear the tree down with a work
/// list so dropping it does not recurse once per operator.
impl Drop for Expr {
  fn drop(&mut self) {
    let mut pending = Vec::new();
    self.detach_children(&mut pending);
    while let Some(mut expr) = pending.pop() {
      expr.detach_children(&mut pending);
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  Print {
    expression: Expr,
    location: Location,
  },
  Assignment {
    variable: String,
    value: Expr,
    location: Location,
  },
}

/// Root of the syntax tree: statements in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub statements: Vec<Stmt>,
}

/// Parse a whole program from the token stream.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens);
  let mut statements = Vec::new();

  while !stream.is_eof() {
    statements.push(parse_stmt(&mut stream)?);
  }
  stream.consume(TokenKind::EndOfFile)?;

  debug!(statements = statements.len(), "parsed program");
  Ok(Program { statements })
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let token = stream.peek()?;
  let (kind, location) = (token.kind, token.location);

  match kind {
    TokenKind::Print => {
      stream.consume(TokenKind::Print)?;
      stream.consume(TokenKind::LParen)?;
      let expression = parse_expr(stream)?;
      stream.consume(TokenKind::RParen)?;
      Ok(Stmt::Print {
        expression,
        location,
      })
    }
    TokenKind::Identifier => {
      let variable = stream.consume_value(TokenKind::Identifier)?;
      stream.consume(TokenKind::Equals)?;
      let value = parse_expr(stream)?;
      Ok(Stmt::Assignment {
        variable,
        value,
        location,
      })
    }
    found => ParseSnafu {
      location,
      expected: "'print' or an identifier",
      found,
    }
    .fail(),
  }
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_term(stream)?;

  while stream.equal(TokenKind::Plus) {
    let rhs = parse_term(stream)?;
    node = Expr::binary(BinaryOp::Add, node, rhs);
  }

  Ok(node)
}

fn parse_term(stream: &mut TokenStream) -> CompileResult<Expr> {
  let token = stream.peek()?;
  let (kind, location) = (token.kind, token.location);

  match kind {
    TokenKind::Integer => {
      let text = stream.consume_value(TokenKind::Integer)?;
      let value = text.parse::<u64>().map_err(|err| {
        InternalConsistencySnafu {
          message: format!("integer token {text:?} was not validated by the lexer: {err}"),
        }
        .build()
      })?;
      Ok(Expr::integer(value, location))
    }
    TokenKind::String => {
      let value = stream.consume_value(TokenKind::String)?;
      Ok(Expr::string(value, location))
    }
    TokenKind::Identifier => {
      let name = stream.consume_value(TokenKind::Identifier)?;
      Ok(Expr::variable(name, location))
    }
    TokenKind::Input => {
      stream.consume(TokenKind::Input)?;
      stream.consume(TokenKind::LParen)?;
      let prompt = parse_expr(stream)?;
      stream.consume(TokenKind::RParen)?;
      Ok(Expr::input(prompt, location))
    }
    found => ParseSnafu {
      location,
      expected: "an expression",
      found,
    }
    .fail(),
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  /// Take ownership of the token stream; the parser advances `pos` as it
  /// consumes input.
  fn new(tokens: Vec<Token>) -> Self {
    Self { tokens, pos: 0 }
  }

  fn peek(&self) -> CompileResult<&Token> {
    self.tokens.get(self.pos).ok_or_else(|| {
      InternalConsistencySnafu {
        message: "token stream is missing its end-of-file marker",
      }
      .build()
    })
  }

  /// Consume the current token if it has the given kind.
  fn equal(&mut self, kind: TokenKind) -> bool {
    if let Some(token) = self.tokens.get(self.pos)
      && token.kind == kind
    {
      self.pos += 1;
      return true;
    }
    false
  }

  fn consume(&mut self, expected: TokenKind) -> CompileResult<&Token> {
    let token = self.tokens.get(self.pos).ok_or_else(|| {
      InternalConsistencySnafu {
        message: "token stream is missing its end-of-file marker",
      }
      .build()
    })?;

    if token.kind != expected {
      return ParseSnafu {
        location: token.location,
        expected: expected.to_string(),
        found: token.kind,
      }
      .fail();
    }

    self.pos += 1;
    Ok(token)
  }

  /// Consume a token of the given kind and take its text payload.
  fn consume_value(&mut self, expected: TokenKind) -> CompileResult<String> {
    let token = self.consume(expected)?;
    token.value.clone().ok_or_else(|| {
      InternalConsistencySnafu {
        message: format!("{expected} token at {} has no text", token.location),
      }
      .build()
    })
  }

  fn is_eof(&self) -> bool {
    matches!(
      self.tokens.get(self.pos).map(|token| token.kind),
      Some(TokenKind::EndOfFile) | None
    )
  }
}

//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! Comments are removed by a line-oriented pass before any token is formed.
//! Removed text is blanked rather than deleted, so every token still reports
//! the line and column it had in the original source.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use tracing::{debug, trace};

use crate::error::{CompileResult, LexSnafu, Location};

const BLOCK_COMMENT: &str = "\"\"\"";

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
  Print,
  Input,
  String,
  Integer,
  Plus,
  LParen,
  RParen,
  Identifier,
  Equals,
  EndOfFile,
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = match self {
      Self::Print => "'print'",
      Self::Input => "'input'",
      Self::String => "a string literal",
      Self::Integer => "an integer literal",
      Self::Plus => "'+'",
      Self::LParen => "'('",
      Self::RParen => "')'",
      Self::Identifier => "an identifier",
      Self::Equals => "'='",
      Self::EndOfFile => "end of file",
    };
    f.write_str(text)
  }
}

/// Thin wrapper for lexical information needed by later stages.
///
/// `value` holds the literal text for `String`, `Integer` and `Identifier`
/// tokens and is `None` for every other kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<String>,
  pub location: Location,
}

impl Token {
  pub fn new(kind: TokenKind, location: Location, value: Option<String>) -> Self {
    Self {
      kind,
      value,
      location,
    }
  }
}

/// Strip comments, then lex the result into tokens terminated by
/// `EndOfFile`.
pub fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
  let stripped = strip_comments(source)?;
  let tokens = lex(&stripped)?;
  debug!(count = tokens.len(), "tokenized source");
  Ok(tokens)
}

/// Remove `"""` blocks and `#` line comments.
///
/// Any line containing `"""` is dropped, along with every line inside a
/// block. A line with an odd number of delimiters opens or closes a block, so
/// a one-line `"""doc"""` leaves block mode unchanged. A `#` outside a
/// string literal truncates the rest of its line. Line structure is
/// preserved.
pub fn strip_comments(source: &str) -> CompileResult<String> {
  let mut out = String::with_capacity(source.len());
  let mut block_start: Option<Location> = None;

  for (idx, line) in source.split('\n').enumerate() {
    if idx > 0 {
      out.push('\n');
    }

    if let Some(col) = line.rfind(BLOCK_COMMENT) {
      if line.matches(BLOCK_COMMENT).count() % 2 == 1 {
        block_start = match block_start {
          Some(_) => None,
          None => Some(Location::new(idx + 1, line[..col].chars().count() + 1)),
        };
      }
      continue;
    }

    if block_start.is_none() {
      out.push_str(strip_line_comment(line));
    }
  }

  if let Some(location) = block_start {
    return LexSnafu {
      location,
      message: "unterminated \"\"\" comment block",
    }
    .fail();
  }

  Ok(out)
}

fn strip_line_comment(line: &str) -> &str {
  let mut in_string = false;
  for (idx, ch) in line.char_indices() {
    match ch {
      '"' => in_string = !in_string,
      '#' if !in_string => return &line[..idx],
      _ => {}
    }
  }
  line
}

/// Lex comment-free text into a flat vector of tokens.
pub fn lex(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let mut cursor = Cursor::new(input);

  while let Some(c) = cursor.peek() {
    let location = cursor.location();

    if c.is_whitespace() {
      cursor.bump();
      continue;
    }

    if c.is_ascii_digit() {
      let text = cursor.eat_while(|ch| ch.is_ascii_digit());
      if text.parse::<u64>().is_err() {
        return LexSnafu {
          location,
          message: format!("integer literal {text} does not fit in 64 bits"),
        }
        .fail();
      }
      tokens.push(Token::new(TokenKind::Integer, location, Some(text)));
      continue;
    }

    if c == '"' {
      cursor.bump();
      let text = cursor.eat_while(|ch| ch != '"' && ch != '\n');
      if cursor.peek() != Some('"') {
        return LexSnafu {
          location,
          message: "unterminated string literal",
        }
        .fail();
      }
      cursor.bump();
      tokens.push(Token::new(TokenKind::String, location, Some(text)));
      continue;
    }

    if c.is_alphabetic() || c == '_' {
      let text = cursor.eat_while(|ch| ch.is_alphanumeric() || ch == '_');
      let token = match text.as_str() {
        "print" => Token::new(TokenKind::Print, location, None),
        "input" => Token::new(TokenKind::Input, location, None),
        _ => Token::new(TokenKind::Identifier, location, Some(text)),
      };
      tokens.push(token);
      continue;
    }

    let kind = match c {
      '+' => TokenKind::Plus,
      '=' => TokenKind::Equals,
      '(' => TokenKind::LParen,
      ')' => TokenKind::RParen,
      _ => {
        return LexSnafu {
          location,
          message: format!("unexpected character '{c}'"),
        }
        .fail();
      }
    };
    cursor.bump();
    tokens.push(Token::new(kind, location, None));
  }

  tokens.push(Token::new(TokenKind::EndOfFile, cursor.location(), None));
  trace!(?tokens, "lexed");
  Ok(tokens)
}

/// Character cursor that keeps track of the current line and column.
struct Cursor<'a> {
  chars: Peekable<Chars<'a>>,
  line: usize,
  column: usize,
}

impl<'a> Cursor<'a> {
  fn new(input: &'a str) -> Self {
    Self {
      chars: input.chars().peekable(),
      line: 1,
      column: 1,
    }
  }

  fn peek(&mut self) -> Option<char> {
    self.chars.peek().copied()
  }

  fn bump(&mut self) -> Option<char> {
    let ch = self.chars.next()?;
    if ch == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(ch)
  }

  fn location(&self) -> Location {
    Location::new(self.line, self.column)
  }

  fn eat_while(&mut self, mut pred: impl FnMut(char) -> bool) -> String {
    let mut text = String::new();
    while let Some(ch) = self.peek() {
      if !pred(ch) {
        break;
      }
      text.push(ch);
      self.bump();
    }
    text
  }
}

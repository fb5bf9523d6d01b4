//! Intermediate representation and the AST → IR lowering pass.
//!
//! Lowering resolves every variable eagerly against a single flat symbol
//! table, so the IR never needs to look anything up by name again. String
//! literals are interned into a constant pool keyed by their text.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{
  CompileResult, InternalConsistencySnafu, Location, UndefinedVariableSnafu,
  UnsupportedExpressionSnafu,
};
use crate::parser::{BinaryOp, Expr, Program, Stmt};

/// What a label points at in the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
  /// A pooled string constant with a length fixed at compile time.
  Constant,
  /// An input buffer whose length is only known after the read.
  InputBuffer,
}

/// Symbolic name of a data-section location.
///
/// Indices come from one counter per compilation, so two labels never share
/// an index even when their kinds differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
  pub kind: LabelKind,
  pub index: usize,
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind {
      LabelKind::Constant => write!(f, "str_{}", self.index),
      LabelKind::InputBuffer => write!(f, "input_{}", self.index),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringConstant {
  pub value: String,
  pub label: Label,
}

/// Result of lowering an `input(...)` call: the prompt to show and the buffer
/// the answer lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadInput {
  pub prompt: StringConstant,
  pub result: Label,
}

/// Operands of `Add` are shared, so rebinding a long sum to another
/// variable clones two pointers rather than the whole tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
  StringConstant(StringConstant),
  Integer(u64),
  VariableRef(String),
  Add(Rc<Value>, Rc<Value>),
  Input(ReadInput),
}

impl Value {
  pub fn add(left: Value, right: Value) -> Self {
    Self::Add(Rc::new(left), Rc::new(right))
  }

  /// Whether the value can be evaluated into an integer register.
  pub fn is_integer(&self) -> bool {
    matches!(self, Self::Integer(_) | Self::Add(..))
  }

  fn describe(&self) -> &'static str {
    match self {
      Self::StringConstant(_) => "a string",
      Self::Integer(_) | Self::Add(..) => "an integer",
      Self::VariableRef(_) => "a variable reference",
      Self::Input(_) => "an input result",
    }
  }
}

impl Drop for Value {
  fn drop(&mut self) {
    let mut pending = Vec::new();
    detach_operands(self, &mut pending);
    while let Some(operand) = pending.pop() {
      // Operands still shared with another binding stay alive.
      if let Ok(mut value) = Rc::try_unwrap(operand) {
        detach_operands(&mut value, &mut pending);
      }
    }
  }
}

fn detach_operands(value: &mut Value, pending: &mut Vec<Rc<Value>>) {
  if let Value::Add(left, right) = value {
    let leaf = Rc::new(Value::Integer(0));
    pending.push(mem::replace(left, Rc::clone(&leaf)));
    pending.push(mem::replace(right, leaf));
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    enum Piece<'v> {
      Value(&'v Value),
      Text(&'static str),
    }

    let mut pieces = vec![Piece::Value(self)];
    while let Some(piece) = pieces.pop() {
      match piece {
        Piece::Text(text) => f.write_str(text)?,
        Piece::Value(Self::Add(left, right)) => {
          f.write_str("(")?;
          pieces.push(Piece::Text(")"));
          pieces.push(Piece::Value(right));
          pieces.push(Piece::Text(" + "));
          pieces.push(Piece::Value(left));
        }
        Piece::Value(Self::StringConstant(constant)) => write!(f, "{}", constant.label)?,
        Piece::Value(Self::Integer(value)) => write!(f, "{value}")?,
        Piece::Value(Self::VariableRef(name)) => write!(f, "${name}")?,
        Piece::Value(Self::Input(read)) => write!(f, "input({})", read.prompt.label)?,
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
  Assign { name: String, value: Value },
  PrintString { label: Label },
  PrintInt { expr: Value },
  ReadInput(ReadInput),
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Assign { name, value } => write!(f, "{name} = {value}"),
      Self::PrintString { label } => write!(f, "print_string {label}"),
      Self::PrintInt { expr } => write!(f, "print_int {expr}"),
      Self::ReadInput(read) => write!(f, "read {} <- {}", read.result, read.prompt.label),
    }
  }
}

/// Everything the assembly generator needs from one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrProgram {
  /// Final binding of every assigned variable.
  pub symbols: HashMap<String, Value>,
  /// Pooled string constants in first-use order.
  pub constants: Vec<StringConstant>,
  /// Instructions in source statement order.
  pub instructions: Vec<Instruction>,
}

impl fmt::Display for IrProgram {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for constant in &self.constants {
      writeln!(f, "{} = {:?}", constant.label, constant.value)?;
    }
    for instruction in &self.instructions {
      writeln!(f, "  {instruction}")?;
    }
    Ok(())
  }
}

/// Lower a program with a fresh generator.
pub fn generate(program: &Program) -> CompileResult<IrProgram> {
  IrGenerator::new().generate(program)
}

/// Owns all per-compilation state. `generate` consumes the generator, so a
/// symbol table or label counter can never leak into another job.
#[derive(Debug, Default)]
pub struct IrGenerator {
  symbols: HashMap<String, Value>,
  pool: HashMap<String, StringConstant>,
  constants: Vec<StringConstant>,
  instructions: Vec<Instruction>,
  next_label: usize,
}

impl IrGenerator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn generate(mut self, program: &Program) -> CompileResult<IrProgram> {
    for stmt in &program.statements {
      self.lower_stmt(stmt)?;
    }

    debug!(
      instructions = self.instructions.len(),
      constants = self.constants.len(),
      "generated IR"
    );
    for instruction in &self.instructions {
      trace!(%instruction);
    }

    Ok(IrProgram {
      symbols: self.symbols,
      constants: self.constants,
      instructions: self.instructions,
    })
  }

  fn lower_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::Assignment {
        variable, value, ..
      } => {
        let value = self.lower_expr(value)?;
        self.instructions.push(Instruction::Assign {
          name: variable.clone(),
          value: value.clone(),
        });
        self.symbols.insert(variable.clone(), value);
      }
      Stmt::Print {
        expression,
        location,
      } => {
        let value = self.lower_expr(expression)?;
        let instruction = print_instruction(value, *location)?;
        self.instructions.push(instruction);
      }
    }
    Ok(())
  }

  fn lower_expr(&mut self, expr: &Expr) -> CompileResult<Value> {
    match expr {
      Expr::IntegerLiteral { value, .. } => Ok(Value::Integer(*value)),
      Expr::StringLiteral { value, .. } => Ok(Value::StringConstant(self.intern(value))),
      Expr::BinaryOp { .. } => {
        // Walk the left spine of `a + b + c` instead of recursing per `+`.
        let mut rights = Vec::new();
        let mut leftmost = expr;
        while let Expr::BinaryOp {
          op: BinaryOp::Add,
          left,
          right,
        } = leftmost
        {
          rights.push(right.as_ref());
          leftmost = left.as_ref();
        }

        let mut sum = self.lower_operand(leftmost)?;
        for right in rights.into_iter().rev() {
          let rhs = self.lower_operand(right)?;
          sum = Value::add(sum, rhs);
        }
        Ok(sum)
      }
      Expr::Variable { name, location } => match self.symbols.get(name) {
        Some(value) => Ok(value.clone()),
        None => UndefinedVariableSnafu {
          location: *location,
          name: name.clone(),
        }
        .fail(),
      },
      Expr::Input { prompt, location } => {
        let prompt = match self.lower_expr(prompt)? {
          Value::StringConstant(ref constant) => constant.clone(),
          ref other => {
            return UnsupportedExpressionSnafu {
              location: *location,
              message: format!("input prompt must be a string, found {}", other.describe()),
            }
            .fail();
          }
        };
        let read = ReadInput {
          prompt,
          result: self.fresh_label(LabelKind::InputBuffer),
        };
        self.instructions.push(Instruction::ReadInput(read.clone()));
        Ok(Value::Input(read))
      }
    }
  }

  fn lower_operand(&mut self, expr: &Expr) -> CompileResult<Value> {
    let value = self.lower_expr(expr)?;
    if !value.is_integer() {
      return UnsupportedExpressionSnafu {
        location: expr.location(),
        message: format!("operand of '+' must be an integer, found {}", value.describe()),
      }
      .fail();
    }
    Ok(value)
  }

  /// Return the pooled constant for `value`, adding it on first use.
  fn intern(&mut self, value: &str) -> StringConstant {
    if let Some(constant) = self.pool.get(value) {
      return constant.clone();
    }
    let constant = StringConstant {
      value: value.to_string(),
      label: self.fresh_label(LabelKind::Constant),
    };
    self.pool.insert(value.to_string(), constant.clone());
    self.constants.push(constant.clone());
    constant
  }

  fn fresh_label(&mut self, kind: LabelKind) -> Label {
    let label = Label {
      kind,
      index: self.next_label,
    };
    self.next_label += 1;
    label
  }
}

/// Pick the print instruction for an already-lowered value.
fn print_instruction(value: Value, location: Location) -> CompileResult<Instruction> {
  match value {
    Value::StringConstant(ref constant) => Ok(Instruction::PrintString {
      label: constant.label,
    }),
    Value::Integer(_) | Value::Add(..) => Ok(Instruction::PrintInt { expr: value }),
    Value::Input(ref read) => Ok(Instruction::PrintString { label: read.result }),
    Value::VariableRef(ref name) => InternalConsistencySnafu {
      message: format!("print at {location} reached codegen with unresolved variable '{name}'"),
    }
    .fail(),
  }
}

//! Code generation: lower IR into GNU `as` x86-64 assembly for Linux.
//!
//! Output talks to the kernel directly through `syscall`; nothing from libc
//! is linked in. Integer expressions are evaluated with a stack machine:
//! `%rax` is the accumulator and every nested `+` spills its left operand to
//! the machine stack, so nesting depth is bounded only by stack size.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{CompileResult, InternalConsistencySnafu};
use crate::ir::{Instruction, IrProgram, Label, LabelKind, ReadInput, Value};

const SYS_READ: u8 = 0;
const SYS_WRITE: u8 = 1;
const SYS_EXIT: u8 = 60;
const STDIN: u8 = 0;
const STDOUT: u8 = 1;

/// Shared buffer used to stringify integers: the 20 digits of `u64::MAX`
/// plus a newline.
const INT_BUFFER: &str = "int_buffer";
const INT_BUFFER_SIZE: usize = 21;

/// Knobs for the emitted program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
  /// Capacity in bytes of every `input()` buffer. Longer lines are cut short
  /// by the kernel's `read`.
  pub input_buffer_size: usize,
  /// Global symbol of the entry routine.
  pub entry_symbol: String,
}

impl Default for CodegenOptions {
  fn default() -> Self {
    Self {
      input_buffer_size: 100,
      entry_symbol: "_start".to_string(),
    }
  }
}

/// Emit a complete assembly program for `ir`.
pub fn generate(ir: &IrProgram, options: &CodegenOptions) -> CompileResult<String> {
  let mut codegen = Codegen::new(ir, options)?;
  codegen.emit_program()?;
  debug!(bytes = codegen.asm.len(), "generated assembly");
  Ok(codegen.asm)
}

struct Codegen<'a> {
  ir: &'a IrProgram,
  options: &'a CodegenOptions,
  pooled_constants: HashSet<Label>,
  /// Input buffers declared by a `ReadInput` somewhere in the program.
  input_buffers: HashSet<Label>,
  /// Input buffers whose read has already been emitted.
  filled_buffers: HashSet<Label>,
  next_local: usize,
  asm: String,
}

impl<'a> Codegen<'a> {
  fn new(ir: &'a IrProgram, options: &'a CodegenOptions) -> CompileResult<Self> {
    let mut pooled_constants = HashSet::new();
    for constant in &ir.constants {
      if constant.label.kind != LabelKind::Constant || !pooled_constants.insert(constant.label) {
        return InternalConsistencySnafu {
          message: format!("constant pool label {} is invalid or repeated", constant.label),
        }
        .fail();
      }
    }

    let mut input_buffers = HashSet::new();
    for instruction in &ir.instructions {
      if let Instruction::ReadInput(read) = instruction
        && (read.result.kind != LabelKind::InputBuffer || !input_buffers.insert(read.result))
      {
        return InternalConsistencySnafu {
          message: format!("input buffer {} is invalid or read twice", read.result),
        }
        .fail();
      }
    }

    Ok(Self {
      ir,
      options,
      pooled_constants,
      input_buffers,
      filled_buffers: HashSet::new(),
      next_local: 0,
      asm: String::new(),
    })
  }

  fn emit_program(&mut self) -> CompileResult<()> {
    self.emit_data_section();

    let ir = self.ir;
    let entry = &self.options.entry_symbol;
    self.asm.push_str("\n    .text\n");
    self.asm.push_str(&format!("    .globl {entry}\n"));
    self.asm.push_str(&format!("{entry}:\n"));

    // Save the caller's frame.
    self.asm.push_str("    push %rbp\n");
    self.asm.push_str("    mov %rsp, %rbp\n");

    for instruction in &ir.instructions {
      self.emit_instruction(instruction)?;
    }

    self.asm.push_str("\n    # exit(0)\n");
    self.asm.push_str("    mov %rbp, %rsp\n");
    self.asm.push_str("    pop %rbp\n");
    self.asm.push_str(&format!("    mov ${SYS_EXIT}, %rax\n"));
    self.asm.push_str("    xor %rdi, %rdi\n");
    self.asm.push_str("    syscall\n");

    self.asm.push_str("\n    .section .note.GNU-stack,\"\",@progbits\n");
    Ok(())
  }

  fn emit_data_section(&mut self) {
    self.asm.push_str("    .data\n");

    let ir = self.ir;
    let capacity = self.options.input_buffer_size;
    for instruction in &ir.instructions {
      if let Instruction::ReadInput(read) = instruction {
        let label = read.result;
        self.asm.push_str(&format!("{label}:\n"));
        self.asm.push_str(&format!("    .space {capacity}\n"));
        self.asm.push_str(&format!("    .equ {label}_cap, {capacity}\n"));
        self.asm.push_str("    .balign 8\n");
        self.asm.push_str(&format!("{label}_len:\n"));
        self.asm.push_str("    .quad 0\n");
      }
    }

    for constant in &ir.constants {
      let label = constant.label;
      self.asm.push_str(&format!("{label}:\n"));
      self.asm.push_str(&format!("    .ascii \"{}\"\n", escape_ascii(&constant.value)));
      self.asm.push_str(&format!("    .equ {label}_len, {}\n", constant.value.len()));
    }

    let prints_integers = ir
      .instructions
      .iter()
      .any(|instruction| matches!(instruction, Instruction::PrintInt { .. }));
    if prints_integers {
      self.asm.push_str(&format!("{INT_BUFFER}:\n"));
      self.asm.push_str(&format!("    .space {INT_BUFFER_SIZE}\n"));
    }
  }

  fn emit_instruction(&mut self, instruction: &Instruction) -> CompileResult<()> {
    match instruction {
      Instruction::Assign { name, value } => {
        // Bindings were resolved during lowering; nothing to execute.
        self.asm.push_str(&format!("\n    # {name} = {value}\n"));
      }
      Instruction::PrintString { label } => {
        self.asm.push_str(&format!("\n    # print {label}\n"));
        self.emit_print_string(*label)?;
      }
      Instruction::PrintInt { expr } => {
        self.asm.push_str(&format!("\n    # print {expr}\n"));
        self.emit_expr(expr)?;
        self.emit_print_accumulator();
      }
      Instruction::ReadInput(read) => self.emit_read(read)?,
    }
    Ok(())
  }

  fn emit_print_string(&mut self, label: Label) -> CompileResult<()> {
    let length = match label.kind {
      LabelKind::Constant => {
        if !self.pooled_constants.contains(&label) {
          return InternalConsistencySnafu {
            message: format!("{label} is not in the constant pool"),
          }
          .fail();
        }
        format!("${label}_len")
      }
      LabelKind::InputBuffer => {
        if !self.filled_buffers.contains(&label) {
          return InternalConsistencySnafu {
            message: format!("{label} is printed before it is read"),
          }
          .fail();
        }
        format!("{label}_len(%rip)")
      }
    };

    self.asm.push_str(&format!("    mov ${SYS_WRITE}, %rax\n"));
    self.asm.push_str(&format!("    mov ${STDOUT}, %rdi\n"));
    self.asm.push_str(&format!("    lea {label}(%rip), %rsi\n"));
    self.asm.push_str(&format!("    mov {length}, %rdx\n"));
    self.asm.push_str("    syscall\n");
    Ok(())
  }

  /// Show the prompt, read into the result buffer and record how many bytes
  /// actually arrived in the buffer's length word.
  fn emit_read(&mut self, read: &ReadInput) -> CompileResult<()> {
    let label = read.result;
    if !self.input_buffers.contains(&label) {
      return InternalConsistencySnafu {
        message: format!("{label} has no input buffer"),
      }
      .fail();
    }

    self.asm.push_str(&format!("\n    # {label} = input({})\n", read.prompt.label));
    self.emit_print_string(read.prompt.label)?;

    let done = self.local_label("read_done");
    self.asm.push_str(&format!("    mov ${SYS_READ}, %rax\n"));
    self.asm.push_str(&format!("    mov ${STDIN}, %rdi\n"));
    self.asm.push_str(&format!("    lea {label}(%rip), %rsi\n"));
    self.asm.push_str(&format!("    mov ${label}_cap, %rdx\n"));
    self.asm.push_str("    syscall\n");
    // A failed read reports a negative errno; treat it as empty input.
    self.asm.push_str("    test %rax, %rax\n");
    self.asm.push_str(&format!("    jns {done}\n"));
    self.asm.push_str("    xor %rax, %rax\n");
    self.asm.push_str(&format!("{done}:\n"));
    self.asm.push_str(&format!("    mov %rax, {label}_len(%rip)\n"));

    self.filled_buffers.insert(label);
    Ok(())
  }

  /// Evaluate an integer expression into `%rax`.
  ///
  /// The tree is walked with an explicit work list, so a sum with a hundred
  /// thousand terms costs heap, not compiler stack.
  fn emit_expr(&mut self, value: &Value) -> CompileResult<()> {
    enum Step<'v> {
      Eval(&'v Value),
      Spill,
      Combine,
    }

    let mut steps = vec![Step::Eval(value)];
    while let Some(step) = steps.pop() {
      match step {
        Step::Eval(Value::Integer(n)) => {
          if *n <= i32::MAX as u64 {
            self.asm.push_str(&format!("    mov ${n}, %rax\n"));
          } else {
            self.asm.push_str(&format!("    movabs $0x{n:x}, %rax\n"));
          }
        }
        Step::Eval(Value::Add(lhs, rhs)) => {
          steps.push(Step::Combine);
          steps.push(Step::Eval(rhs));
          steps.push(Step::Spill);
          steps.push(Step::Eval(lhs));
        }
        Step::Eval(other) => {
          return InternalConsistencySnafu {
            message: format!("cannot evaluate {other} as an integer"),
          }
          .fail();
        }
        Step::Spill => self.asm.push_str("    push %rax\n"),
        Step::Combine => {
          self.asm.push_str("    pop %rcx\n");
          self.asm.push_str("    add %rcx, %rax\n");
        }
      }
    }
    Ok(())
  }

  /// Write `%rax` to stdout as unsigned decimal followed by a newline.
  ///
  /// Digits come out least significant first, so the buffer is reversed in
  /// place before the newline is appended.
  fn emit_print_accumulator(&mut self) {
    let digits = self.local_label("digits");
    let reverse = self.local_label("reverse");
    let swap = self.local_label("swap");
    let newline = self.local_label("newline");

    self.asm.push_str(&format!("    lea {INT_BUFFER}(%rip), %rsi\n"));
    self.asm.push_str("    xor %rcx, %rcx\n");
    self.asm.push_str("    mov $10, %r8\n");
    self.asm.push_str("    test %rax, %rax\n");
    self.asm.push_str(&format!("    jnz {digits}\n"));
    self.asm.push_str("    movb $48, (%rsi)\n");
    self.asm.push_str("    mov $1, %rcx\n");
    self.asm.push_str(&format!("    jmp {newline}\n"));

    // rax /= 10, remainder in rdx becomes the next digit.
    self.asm.push_str(&format!("{digits}:\n"));
    self.asm.push_str("    xor %rdx, %rdx\n");
    self.asm.push_str("    div %r8\n");
    self.asm.push_str("    add $48, %dl\n");
    self.asm.push_str("    movb %dl, (%rsi,%rcx)\n");
    self.asm.push_str("    inc %rcx\n");
    self.asm.push_str("    test %rax, %rax\n");
    self.asm.push_str(&format!("    jnz {digits}\n"));

    // rdi walks up from the front, r9 down from the back.
    self.asm.push_str(&format!("{reverse}:\n"));
    self.asm.push_str("    xor %rdi, %rdi\n");
    self.asm.push_str("    lea -1(%rcx), %r9\n");
    self.asm.push_str(&format!("{swap}:\n"));
    self.asm.push_str("    cmp %r9, %rdi\n");
    self.asm.push_str(&format!("    jge {newline}\n"));
    self.asm.push_str("    movb (%rsi,%rdi), %al\n");
    self.asm.push_str("    movb (%rsi,%r9), %dl\n");
    self.asm.push_str("    movb %dl, (%rsi,%rdi)\n");
    self.asm.push_str("    movb %al, (%rsi,%r9)\n");
    self.asm.push_str("    inc %rdi\n");
    self.asm.push_str("    dec %r9\n");
    self.asm.push_str(&format!("    jmp {swap}\n"));

    self.asm.push_str(&format!("{newline}:\n"));
    self.asm.push_str("    movb $10, (%rsi,%rcx)\n");
    self.asm.push_str("    inc %rcx\n");
    self.asm.push_str("    mov %rcx, %rdx\n");
    self.asm.push_str(&format!("    mov ${SYS_WRITE}, %rax\n"));
    self.asm.push_str(&format!("    mov ${STDOUT}, %rdi\n"));
    self.asm.push_str("    syscall\n");
  }

  fn local_label(&mut self, name: &str) -> String {
    let label = format!(".L{name}_{}", self.next_local);
    self.next_local += 1;
    label
  }
}

/// Quote `value` for an `.ascii` directive so the assembler emits exactly its
/// UTF-8 bytes.
fn escape_ascii(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  for byte in value.bytes() {
    match byte {
      b'"' => out.push_str("\\\""),
      b'\\' => out.push_str("\\\\"),
      0x20..=0x7e => out.push(char::from(byte)),
      _ => out.push_str(&format!("\\{byte:03o}")),
    }
  }
  out
}

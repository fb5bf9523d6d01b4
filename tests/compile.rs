use snakec::{CompileError, Location, compile};

#[test]
fn print_string_literal() {
  let asm = compile("print(\"hi\")").unwrap();
  assert!(asm.contains("str_0:\n    .ascii \"hi\"\n    .equ str_0_len, 2\n"));
  assert!(asm.contains("    .globl _start\n_start:\n"));
  assert!(asm.contains("    lea str_0(%rip), %rsi\n    mov $str_0_len, %rdx\n    syscall\n"));
  assert!(asm.ends_with("    .section .note.GNU-stack,\"\",@progbits\n"));
}

#[test]
fn data_section_comes_before_text() {
  let asm = compile("x = input(\"? \")\nprint(x)\nprint(1)").unwrap();
  let data = asm.find(".data").unwrap();
  let input = asm.find("input_1:").unwrap();
  let constant = asm.find("str_0:").unwrap();
  let scratch = asm.find("int_buffer:").unwrap();
  let text = asm.find(".text").unwrap();
  assert!(data < input && input < constant && constant < scratch && scratch < text);
}

#[test]
fn input_round_trip_shape() {
  let asm = compile("x = input(\"p\")\nprint(x)").unwrap();
  let writes = asm.matches("    mov $1, %rax\n").count();
  let reads = asm.matches("    mov $0, %rax\n").count();
  assert_eq!(writes, 2, "{asm}");
  assert_eq!(reads, 1, "{asm}");

  let read_at = asm.find("    lea input_1(%rip), %rsi\n    mov $input_1_cap, %rdx\n").unwrap();
  let prompt_at = asm.find("    lea str_0(%rip), %rsi\n").unwrap();
  let echo_at = asm
    .find("    lea input_1(%rip), %rsi\n    mov input_1_len(%rip), %rdx\n")
    .unwrap();
  assert!(prompt_at < read_at && read_at < echo_at);
}

#[test]
fn integer_print_declares_scratch_buffer_once() {
  let asm = compile("print(1)\nprint(2 + 3)").unwrap();
  assert_eq!(asm.matches("int_buffer:").count(), 1);
  assert!(asm.contains("    mov $1, %rax\n"));
  assert!(asm.contains("    mov $2, %rax\n    push %rax\n    mov $3, %rax\n    pop %rcx\n    add %rcx, %rax\n"));
}

#[test]
fn hundred_thousand_term_sum_compiles() {
  let terms = 100_000;
  let asm = compile(&format!("print({})", vec!["1"; terms].join(" + "))).unwrap();
  assert_eq!(asm.matches("    push %rax\n").count(), terms - 1);
  assert_eq!(asm.matches("    pop %rcx\n").count(), terms - 1);
}

#[test]
fn strings_only_program_has_no_scratch_buffer() {
  let asm = compile("print(\"a\")").unwrap();
  assert!(!asm.contains("int_buffer"));
}

#[test]
fn comments_are_ignored() {
  let with_comments = "\"\"\"\nheader\n\"\"\"\nx = 1 # one\n# whole line\nprint(x)\n";
  let without = "x = 1\nprint(x)\n";
  assert_eq!(compile(with_comments).unwrap(), compile(without).unwrap());
}

#[test]
fn hash_inside_string_is_kept() {
  let asm = compile("print(\"#1\")").unwrap();
  assert!(asm.contains(".ascii \"#1\"\n    .equ str_0_len, 2\n"));
}

#[test]
fn empty_source_still_exits() {
  let asm = compile("").unwrap();
  assert!(asm.contains("    mov $60, %rax\n    xor %rdi, %rdi\n    syscall\n"));
}

#[test]
fn undefined_variable_produces_no_output() {
  let err = compile("print(\"before\")\nprint(x)").unwrap_err();
  assert_eq!(
    err,
    CompileError::UndefinedVariable {
      location: Location::new(2, 7),
      name: "x".into(),
    }
  );
}

#[test]
fn unclosed_print_is_a_parse_error() {
  let err = compile("print(").unwrap_err();
  assert!(matches!(err, CompileError::Parse { .. }));
  assert!(err.to_string().contains("end of file"));
}

#[test]
fn lex_error_reports_line_and_column() {
  let err = compile("x = 1\nprint(x * 2)").unwrap_err();
  assert_eq!(err.location(), Some(Location::new(2, 9)));
  assert_eq!(
    err.render("x = 1\nprint(x * 2)"),
    "2:9: error: unexpected character '*'\n    print(x * 2)\n            ^"
  );
}

#[test]
fn string_plus_integer_is_unsupported() {
  let err = compile("s = \"a\"\nprint(s + 1)").unwrap_err();
  assert!(matches!(err, CompileError::UnsupportedExpression { .. }));
}

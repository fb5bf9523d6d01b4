//! Assemble, link and run compiled programs. Skipped when `as` or `ld` are
//! not installed.
#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use quickcheck::QuickCheck;
use snakec::compile;
use snakec::link::{self, LinkOptions};

fn toolchain_available() -> bool {
  which::which("as").is_ok() && which::which("ld").is_ok()
}

/// Compile `source`, run the executable with `stdin`, and return its stdout.
fn run(name: &str, source: &str, stdin: &str) -> Vec<u8> {
  let dir = env::temp_dir().join(format!("snakec-run-{}-{name}", std::process::id()));
  fs::create_dir_all(&dir).unwrap();
  let exe: PathBuf = dir.join(name);

  let asm = compile(source).unwrap();
  link::assemble_and_link(&asm, &exe, &LinkOptions::default()).unwrap();

  let mut child = Command::new(&exe)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .spawn()
    .unwrap();
  child
    .stdin
    .take()
    .unwrap()
    .write_all(stdin.as_bytes())
    .unwrap();
  let output = child.wait_with_output().unwrap();
  fs::remove_dir_all(&dir).ok();

  assert_eq!(output.status.code(), Some(0));
  output.stdout
}

#[test]
fn prints_strings_and_integers() {
  if !toolchain_available() {
    return;
  }
  let stdout = run(
    "mixed",
    "greeting = \"hi \"\nprint(greeting)\nprint(\"there\")\nn = 40 + 2\nprint(n)",
    "",
  );
  assert_eq!(stdout, b"hi there42\n");
}

#[test]
fn integer_stringification() {
  if !toolchain_available() {
    return;
  }
  let values = [
    0,
    1,
    9,
    10,
    42,
    100,
    12345,
    1_000_000_007,
    u64::from(u32::MAX) + 1,
    u64::MAX,
  ];
  let source: String = values.iter().map(|v| format!("print({v})\n")).collect();
  let expected: String = values.iter().map(|v| format!("{v}\n")).collect();
  assert_eq!(
    String::from_utf8(run("digits", &source, "")).unwrap(),
    expected
  );
}

/// Print every value from one executable and compare with Rust's own
/// formatting.
fn prints_like_display(values: Vec<u64>) -> bool {
  let source: String = values.iter().map(|v| format!("print({v})\n")).collect();
  let expected: String = values.iter().map(|v| format!("{v}\n")).collect();
  run("arbitrary", &source, "") == expected.into_bytes()
}

#[test]
fn arbitrary_integers_print_in_decimal() {
  if !toolchain_available() {
    return;
  }
  QuickCheck::new()
    .tests(25)
    .quickcheck(prints_like_display as fn(Vec<u64>) -> bool);
}

#[test]
fn long_sum_runs_in_constant_stack() {
  if !toolchain_available() {
    return;
  }
  let source = format!("print({})", vec!["1"; 100_000].join(" + "));
  assert_eq!(run("long_sum", &source, ""), b"100000\n");
}

#[test]
fn nested_addition_wraps_like_u64() {
  if !toolchain_available() {
    return;
  }
  let stdout = run(
    "sums",
    "a = 1 + 2 + 3\nb = a + 4 + 5\nprint(b)\nprint(18446744073709551615 + 2)",
    "",
  );
  assert_eq!(String::from_utf8(stdout).unwrap(), "15\n1\n");
}

#[test]
fn echoes_exactly_the_bytes_read() {
  if !toolchain_available() {
    return;
  }
  let stdout = run(
    "echo",
    "name = input(\"Name: \")\nprint(\"Hello, \")\nprint(name)",
    "Ada\n",
  );
  assert_eq!(String::from_utf8(stdout).unwrap(), "Name: Hello, Ada\n");
}

//! Command-line arguments for the `snakec` driver.

use std::path::PathBuf;

use snafu::Snafu;

use crate::link::intermediate_paths;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum ArgsError {
  #[snafu(display("no input file"))]
  MissingInput,

  #[snafu(display("missing value after '{flag}'"))]
  MissingValue { flag: String },

  #[snafu(display("invalid flag '{flag}'"))]
  UnknownFlag { flag: String },

  #[snafu(display("unexpected extra argument '{arg}'"))]
  ExtraArgument { arg: String },

  #[snafu(display("'{}' would overwrite the input file; pass -o", path.display()))]
  OverwritesInput { path: PathBuf },
}

/// What the driver was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Compile(Args),
  Help,
  Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
  /// Source file to compile.
  pub in_path: PathBuf,
  /// Executable path, or the `.s` path with `--emit-asm`. Defaults to the
  /// input path with its extension replaced.
  pub out_path: PathBuf,
  /// Stop after writing assembly.
  pub emit_asm: bool,
  /// Keep `.s` and `.o` files after linking.
  pub keep: bool,
  /// Enable tracing output on stderr.
  pub verbose: bool,
}

struct Flag {
  names: [&'static str; 2],
  description: &'static str,
}

const FLAG_REGISTRY: &[Flag] = &[
  Flag {
    names: ["-o", "--output"],
    description: "write the output to <path>",
  },
  Flag {
    names: ["-S", "--emit-asm"],
    description: "stop after writing assembly (defaults to <input>.s)",
  },
  Flag {
    names: ["-k", "--keep"],
    description: "keep the intermediate .s and .o files",
  },
  Flag {
    names: ["-v", "--verbose"],
    description: "trace every compilation stage on stderr",
  },
  Flag {
    names: ["-h", "--help"],
    description: "print this summary",
  },
  Flag {
    names: ["-V", "--version"],
    description: "show version",
  },
];

impl Command {
  /// Parse arguments, not including the program name.
  pub fn parse_from<I>(args: I) -> Result<Self, ArgsError>
  where
    I: IntoIterator<Item = String>,
  {
    let mut args = args.into_iter();
    let mut in_path = None;
    let mut out_path = None;
    let mut emit_asm = false;
    let mut keep = false;
    let mut verbose = false;

    while let Some(arg) = args.next() {
      match arg.as_str() {
        "-o" | "--output" => match args.next() {
          Some(path) => out_path = Some(PathBuf::from(path)),
          None => return MissingValueSnafu { flag: arg.as_str() }.fail(),
        },
        "-S" | "--emit-asm" => emit_asm = true,
        "-k" | "--keep" => keep = true,
        "-v" | "--verbose" => verbose = true,
        "-h" | "--help" => return Ok(Self::Help),
        "-V" | "--version" => return Ok(Self::Version),
        flag if flag.starts_with('-') && flag != "-" => {
          return UnknownFlagSnafu { flag }.fail();
        }
        _ if in_path.is_some() => return ExtraArgumentSnafu { arg: arg.as_str() }.fail(),
        _ => in_path = Some(PathBuf::from(&arg)),
      }
    }

    let Some(in_path) = in_path else {
      return MissingInputSnafu.fail();
    };

    let out_path = out_path.unwrap_or_else(|| {
      let extension = match (emit_asm, in_path.extension()) {
        (true, _) => "s",
        // Never overwrite an extension-less source file.
        (false, None) => "out",
        (false, Some(_)) => "",
      };
      in_path.with_extension(extension)
    });

    let mut written = vec![out_path.clone()];
    if !emit_asm {
      written.extend(intermediate_paths(&out_path));
    }
    if let Some(path) = written.into_iter().find(|path| *path == in_path) {
      return OverwritesInputSnafu { path }.fail();
    }

    Ok(Self::Compile(Args {
      in_path,
      out_path,
      emit_asm,
      keep,
      verbose,
    }))
  }
}

/// Usage summary for `--help` and argument errors.
pub fn usage(program: &str) -> String {
  let mut text = format!("usage:\n      {program} [options] <infile>\noptions:\n");
  for flag in FLAG_REGISTRY {
    text.push_str(&format!(
      "   {:<16}  {}\n",
      flag.names.join(", "),
      flag.description
    ));
  }
  text
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(args: &[&str]) -> Result<Command, ArgsError> {
    Command::parse_from(args.iter().map(|s| s.to_string()))
  }

  #[test]
  fn output_defaults_to_input_stem() {
    let Command::Compile(args) = parse(&["hello.py"]).unwrap() else {
      panic!("expected compile command");
    };
    assert_eq!(args.in_path, PathBuf::from("hello.py"));
    assert_eq!(args.out_path, PathBuf::from("hello"));
    assert!(!args.emit_asm && !args.keep && !args.verbose);
  }

  #[test]
  fn extensionless_input_gets_out_suffix() {
    let Command::Compile(args) = parse(&["prog"]).unwrap() else {
      panic!("expected compile command");
    };
    assert_eq!(args.out_path, PathBuf::from("prog.out"));
  }

  #[test]
  fn emit_asm_defaults_to_dot_s() {
    let Command::Compile(args) = parse(&["-S", "dir/hello.py"]).unwrap() else {
      panic!("expected compile command");
    };
    assert_eq!(args.out_path, PathBuf::from("dir/hello.s"));
  }

  #[test]
  fn flags_are_collected() {
    let Command::Compile(args) = parse(&["-k", "--verbose", "-o", "out/bin", "a.py"]).unwrap()
    else {
      panic!("expected compile command");
    };
    assert_eq!(args.out_path, PathBuf::from("out/bin"));
    assert!(args.keep && args.verbose);
  }

  #[test]
  fn help_and_version_short_circuit() {
    assert_eq!(parse(&["--help", "--bogus"]).unwrap(), Command::Help);
    assert_eq!(parse(&["-V"]).unwrap(), Command::Version);
  }

  #[test]
  fn errors_are_reported() {
    assert_eq!(parse(&[]).unwrap_err(), ArgsError::MissingInput);
    assert_eq!(
      parse(&["a.py", "-o"]).unwrap_err(),
      ArgsError::MissingValue { flag: "-o".into() }
    );
    assert_eq!(
      parse(&["--bogus", "a.py"]).unwrap_err(),
      ArgsError::UnknownFlag {
        flag: "--bogus".into()
      }
    );
    assert_eq!(
      parse(&["a.py", "b.py"]).unwrap_err(),
      ArgsError::ExtraArgument { arg: "b.py".into() }
    );
  }

  #[test]
  fn assembly_source_is_never_overwritten() {
    assert_eq!(
      parse(&["prog.s"]).unwrap_err(),
      ArgsError::OverwritesInput {
        path: PathBuf::from("prog.s")
      }
    );
    assert_eq!(
      parse(&["-S", "prog.s"]).unwrap_err(),
      ArgsError::OverwritesInput {
        path: PathBuf::from("prog.s")
      }
    );
    assert_eq!(
      parse(&["lib.o"]).unwrap_err(),
      ArgsError::OverwritesInput {
        path: PathBuf::from("lib.o")
      }
    );
    assert_eq!(
      parse(&["-o", "a.py", "a.py"]).unwrap_err(),
      ArgsError::OverwritesInput {
        path: PathBuf::from("a.py")
      }
    );
  }

  #[test]
  fn explicit_output_rescues_assembly_source() {
    let Command::Compile(args) = parse(&["-o", "prog", "src/prog.s"]).unwrap() else {
      panic!("expected compile command");
    };
    assert_eq!(args.out_path, PathBuf::from("prog"));
    assert!(
      intermediate_paths(&args.out_path)
        .iter()
        .all(|path| *path != args.in_path)
    );
  }

  #[test]
  fn usage_lists_every_flag() {
    let text = usage("snakec");
    for flag in FLAG_REGISTRY {
      assert!(text.contains(flag.names[1]));
    }
  }
}

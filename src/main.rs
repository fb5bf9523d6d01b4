use std::env;
use std::fs;
use std::io;
use std::process;

use snakec::args::{self, Command};
use snakec::link::{self, LinkOptions};
use snakec::CodegenOptions;
use tracing::{Level, info};

fn main() {
  let mut argv = env::args();
  let program = argv.next().unwrap_or_else(|| "snakec".to_string());

  let args = match Command::parse_from(argv) {
    Ok(Command::Compile(args)) => args,
    Ok(Command::Help) => {
      print!("{}", args::usage(&program));
      return;
    }
    Ok(Command::Version) => {
      println!("{program} {}", env!("CARGO_PKG_VERSION"));
      return;
    }
    Err(err) => {
      eprintln!("{program}: error: {err}");
      eprint!("{}", args::usage(&program));
      process::exit(1);
    }
  };

  if args.verbose {
    tracing_subscriber::fmt()
      .with_writer(io::stderr)
      .with_max_level(Level::TRACE)
      .init();
  }

  let source = match fs::read_to_string(&args.in_path) {
    Ok(source) => source,
    Err(err) => {
      eprintln!(
        "{program}: error: could not read '{}': {err}",
        args.in_path.display()
      );
      process::exit(1);
    }
  };

  let options = CodegenOptions::default();
  let asm = match snakec::compile_with(&source, &options) {
    Ok(asm) => asm,
    Err(err) => {
      eprintln!("{}:{}", args.in_path.display(), err.render(&source));
      process::exit(1);
    }
  };

  let result = if args.emit_asm {
    link::write_assembly(&asm, &args.out_path)
  } else {
    let link_options = LinkOptions {
      keep_intermediates: args.keep,
      entry_symbol: options.entry_symbol.clone(),
    };
    link::assemble_and_link(&asm, &args.out_path, &link_options)
  };

  if let Err(err) = result {
    eprintln!("{program}: error: {err}");
    process::exit(1);
  }

  info!(output = %args.out_path.display(), "done");
}

//! Turn emitted assembly text into an executable with the system assembler
//! and linker.
//!
//! The program makes raw system calls and never touches libc, so a plain
//! static `ld` invocation with the entry symbol is all the linking it needs.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, warn};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LinkError {
  #[snafu(display("failed to write '{}': {source}", path.display()))]
  Write { path: PathBuf, source: io::Error },

  #[snafu(display("could not find '{tool}' on PATH: {source}"))]
  MissingTool { tool: String, source: which::Error },

  #[snafu(display("failed to run '{tool}': {source}"))]
  Spawn { tool: String, source: io::Error },

  #[snafu(display("'{tool}' exited with {status}:\n{stderr}"))]
  ToolFailed {
    tool: String,
    status: ExitStatus,
    stderr: String,
  },

  #[snafu(display("failed to mark '{}' executable: {source}", path.display()))]
  Permissions { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
  /// Keep the `.s` and `.o` files next to the executable.
  pub keep_intermediates: bool,
  /// Must match `CodegenOptions::entry_symbol`.
  pub entry_symbol: String,
}

impl Default for LinkOptions {
  fn default() -> Self {
    Self {
      keep_intermediates: false,
      entry_symbol: "_start".to_string(),
    }
  }
}

pub fn write_assembly(asm: &str, path: &Path) -> Result<(), LinkError> {
  fs::write(path, asm).context(WriteSnafu { path })
}

/// The `.s` and `.o` files written next to an executable at `output`.
pub fn intermediate_paths(output: &Path) -> [PathBuf; 2] {
  [output.with_extension("s"), output.with_extension("o")]
}

/// Assemble and link `asm` into the executable at `output`.
///
/// Intermediates are written next to `output` with `.s` and `.o` extensions.
/// On failure they are left in place for inspection.
pub fn assemble_and_link(asm: &str, output: &Path, options: &LinkOptions) -> Result<(), LinkError> {
  let [asm_path, obj_path] = intermediate_paths(output);

  write_assembly(asm, &asm_path)?;
  run_tool(
    "as",
    &[
      OsStr::new("-o"),
      obj_path.as_os_str(),
      asm_path.as_os_str(),
    ],
  )?;
  run_tool(
    "ld",
    &[
      OsStr::new("-static"),
      OsStr::new("-e"),
      OsStr::new(&options.entry_symbol),
      OsStr::new("-o"),
      output.as_os_str(),
      obj_path.as_os_str(),
    ],
  )?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;

    let mut perm = fs::metadata(output)
      .context(PermissionsSnafu { path: output })?
      .permissions();
    perm.set_mode(0o755);
    fs::set_permissions(output, perm).context(PermissionsSnafu { path: output })?;
  }

  if !options.keep_intermediates {
    for path in [&asm_path, &obj_path] {
      if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), %err, "could not remove intermediate file");
      }
    }
  }

  Ok(())
}

fn run_tool(tool: &str, args: &[&OsStr]) -> Result<(), LinkError> {
  let path = which::which(tool).context(MissingToolSnafu { tool })?;
  debug!(tool, path = %path.display(), ?args, "running");

  let output = Command::new(&path)
    .args(args)
    .output()
    .context(SpawnSnafu { tool })?;

  ensure!(
    output.status.success(),
    ToolFailedSnafu {
      tool,
      status: output.status,
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
  );
  Ok(())
}

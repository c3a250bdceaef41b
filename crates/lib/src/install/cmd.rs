//! Subprocess execution for ecosystem installers and post-install hooks.

use std::ffi::OsStr;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use super::InstallError;

/// Run `program` with `args` in `cwd`, returning trimmed stdout.
///
/// The caller's environment is inherited.
pub async fn run<I, S>(program: &str, args: I, cwd: &Path) -> Result<String, InstallError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
  let rendered = render(program, &args);
  info!(cmd = %rendered, cwd = %cwd.display(), "running");

  let output = Command::new(program)
    .args(&args)
    .current_dir(cwd)
    .output()
    .await
    .map_err(|e| InstallError::CommandFailed {
      command: rendered.clone(),
      code: None,
      stderr: e.to_string(),
    })?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }

    return Err(InstallError::CommandFailed {
      command: rendered,
      code: output.status.code(),
      stderr,
    });
  }

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }
  Ok(stdout)
}

/// Run a shell command line, as declared by a package's `postInstall`.
pub async fn run_shell(script: &str, cwd: &Path) -> Result<String, InstallError> {
  let (shell, flag) = shell();
  run(shell, [flag, script], cwd).await
}

#[cfg(unix)]
fn shell() -> (&'static str, &'static str) {
  ("/bin/sh", "-c")
}

#[cfg(windows)]
fn shell() -> (&'static str, &'static str) {
  ("cmd.exe", "/C")
}

fn render(program: &str, args: &[std::ffi::OsString]) -> String {
  let mut rendered = program.to_string();
  for arg in args {
    rendered.push(' ');
    rendered.push_str(&arg.to_string_lossy());
  }
  rendered
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use tempfile::TempDir;

  #[tokio::test]
  async fn captures_stdout() {
    let temp = TempDir::new().unwrap();
    let out = run_shell("echo hello", temp.path()).await.unwrap();
    assert_eq!(out, "hello");
  }

  #[cfg(unix)]
  #[tokio::test]
  #[serial]
  async fn runs_in_working_directory() {
    let temp = TempDir::new().unwrap();
    run_shell("touch marker", temp.path()).await.unwrap();
    assert!(temp.path().join("marker").exists());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn failure_reports_code_and_stderr() {
    let temp = TempDir::new().unwrap();
    let err = run_shell("echo boom >&2; exit 3", temp.path()).await.unwrap_err();

    match err {
      InstallError::CommandFailed { code, stderr, .. } => {
        assert_eq!(code, Some(3));
        assert_eq!(stderr, "boom");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn missing_program_is_command_failure() {
    let temp = TempDir::new().unwrap();
    let err = run("rudi-definitely-not-a-program", ["--version"], temp.path())
      .await
      .unwrap_err();
    assert!(matches!(err, InstallError::CommandFailed { code: None, .. }));
  }
}

use std::{io, process::ExitStatus};

/// Captured result of a subprocess invocation. `success()` is the sole
/// arbiter of "did this attempt fail" used by the installer adapter;
/// a command is failed iff its exit code is non-zero.
#[derive(Debug, Clone)]
pub struct CommandOutput {
  pub status: Option<ExitStatus>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn from_parts(
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
  ) -> Self {
    Self {
      status: Some(status),
      stdout: String::from_utf8_lossy(&stdout).into_owned(),
      stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
  }

  pub fn from_err(e: io::Error) -> Self {
    Self {
      status: None,
      stdout: String::new(),
      stderr: format!("{e:#}"),
    }
  }

  pub fn success(&self) -> bool {
    self.status.is_some_and(|s| s.success())
  }

  /// stdout+stderr concatenated, newline separated if both are
  /// present. This is the payload persisted as `ErrorResponse` /
  /// `AsyncOp.Output` on failure.
  pub fn combined_output(&self) -> String {
    match (self.stdout.is_empty(), self.stderr.is_empty()) {
      (true, true) => String::new(),
      (false, true) => self.stdout.clone(),
      (true, false) => self.stderr.clone(),
      (false, false) => format!("{}\n{}", self.stdout, self.stderr),
    }
  }
}

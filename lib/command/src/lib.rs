use std::{path::Path, process::Stdio};

mod output;

pub use output::*;
use tokio::{io::AsyncReadExt, process::Command};

/// Runs `program` with `args`, additional environment variables
/// `envs`, and an optional working directory `cwd`.
///
/// stdin is closed immediately. stdout and stderr are drained
/// concurrently and fully before the child is awaited, so a chatty
/// installer cannot fill a pipe buffer and deadlock the parent.
pub async fn run_command(
  program: &str,
  args: &[String],
  envs: &[(String, String)],
  cwd: Option<&Path>,
) -> CommandOutput {
  let mut cmd = Command::new(program);
  cmd
    .args(args)
    .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  if let Some(cwd) = cwd {
    cmd.current_dir(cwd);
  }

  let mut child = match cmd.spawn() {
    Ok(child) => child,
    Err(e) => return CommandOutput::from_err(e),
  };

  let mut stdout_pipe = child.stdout.take();
  let mut stderr_pipe = child.stderr.take();

  let (stdout_buf, stderr_buf, status_res) = tokio::join!(
    async move {
      let mut buf = Vec::new();
      if let Some(pipe) = stdout_pipe.as_mut() {
        let _ = pipe.read_to_end(&mut buf).await;
      }
      buf
    },
    async move {
      let mut buf = Vec::new();
      if let Some(pipe) = stderr_pipe.as_mut() {
        let _ = pipe.read_to_end(&mut buf).await;
      }
      buf
    },
    child.wait(),
  );

  match status_res {
    Ok(status) => {
      CommandOutput::from_parts(status, stdout_buf, stderr_buf)
    }
    Err(e) => CommandOutput::from_err(e),
  }
}

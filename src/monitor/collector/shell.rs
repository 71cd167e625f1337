use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Command-execution seam used by the platform collectors
#[async_trait]
pub trait SystemShell: Send + Sync {
    /// Run a program to completion and return its stdout
    ///
    /// A non-zero exit status is an error.
    async fn run(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Read a small accounting file such as `/proc/<pid>/io`
    async fn read_file(&self, path: &Path) -> Result<String>;
}

/// Shell backed by `tokio::process` with a hard per-invocation timeout
#[derive(Debug, Clone)]
pub struct TokioShell {
    timeout: Duration,
}

impl TokioShell {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl SystemShell for TokioShell {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future on timeout must not leave the child behind
            .kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                MonitorError::TimeoutError(format!(
                    "{} did not finish within {}ms",
                    program,
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| MonitorError::CommandFailed(format!("{}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MonitorError::CommandFailed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        let contents = timeout(self.timeout, tokio::fs::read_to_string(path))
            .await
            .map_err(|_| {
                MonitorError::TimeoutError(format!("reading {} timed out", path.display()))
            })??;
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_stdout() {
        let shell = TokioShell::new(Duration::from_secs(2));
        let output = shell.run("/bin/echo", &["hello"]).await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_non_zero_exit_is_error() {
        let shell = TokioShell::new(Duration::from_secs(2));
        let result = shell.run("/bin/sh", &["-c", "exit 3"]).await;
        assert!(matches!(result, Err(MonitorError::CommandFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let shell = TokioShell::new(Duration::from_millis(100));
        let result = shell.run("/bin/sleep", &["5"]).await;
        assert!(matches!(result, Err(MonitorError::TimeoutError(_))));
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let shell = TokioShell::new(Duration::from_secs(1));
        let result = shell.run("fleetmon-no-such-program", &[]).await;
        assert!(matches!(result, Err(MonitorError::CommandFailed(_))));
    }

    #[tokio::test]
    async fn test_read_file_missing() {
        let shell = TokioShell::new(Duration::from_secs(1));
        let result = shell
            .read_file(Path::new("/definitely/not/here/io"))
            .await;
        assert!(matches!(result, Err(MonitorError::Io(_))));
    }
}

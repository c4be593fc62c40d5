//! Subprocess execution of the JaCoCo command-line interface.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{JacocoError, Result};

/// Result of one finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

/// Run `program args..`, capturing output.
///
/// The child is killed when `timeout_secs` elapses (0 disables the limit).
/// A non-zero exit status is [`JacocoError::Failed`].
pub async fn run_command(program: &str, args: &[OsString], timeout_secs: u64) -> Result<CommandOutput> {
    let start = Instant::now();
    let command_line = describe(program, args);

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| JacocoError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let output = if timeout_secs > 0 {
        tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| JacocoError::Timeout {
                command: command_line.clone(),
                timeout_secs,
            })??
    } else {
        child.wait_with_output().await?
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    debug!(command = %command_line, exit_code, duration_ms, "command finished");

    if !output.status.success() {
        return Err(JacocoError::Failed {
            command: command_line,
            exit_code,
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
        duration_ms,
    })
}

fn describe(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Location of the JVM and the `jacococli.jar` to drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JacocoCli {
    pub java: String,
    pub cli_jar: PathBuf,
    pub timeout_secs: u64,
}

impl Default for JacocoCli {
    fn default() -> Self {
        Self {
            java: "java".to_string(),
            cli_jar: PathBuf::from("jacococli.jar"),
            timeout_secs: 300,
        }
    }
}

impl JacocoCli {
    pub fn new(java: impl Into<String>, cli_jar: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            java: java.into(),
            cli_jar: cli_jar.into(),
            timeout_secs,
        }
    }

    /// `java -jar {cli_jar} report {args..}`
    pub async fn report(&self, args: Vec<OsString>) -> Result<CommandOutput> {
        let mut full = Vec::with_capacity(args.len() + 3);
        full.push(OsString::from("-jar"));
        full.push(self.cli_jar.clone().into_os_string());
        full.push(OsString::from("report"));
        full.extend(args);
        run_command(&self.java, &full, self.timeout_secs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[tokio::test]
    async fn test_run_simple_command() {
        let output = run_command("echo", &args(&["hello"]), 60).await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_failing_command_is_error() {
        let err = run_command("false", &[], 60).await.unwrap_err();
        assert!(matches!(err, JacocoError::Failed { exit_code, .. } if exit_code != 0));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let err = run_command("sleep", &args(&["5"]), 1).await.unwrap_err();
        assert!(matches!(err, JacocoError::Timeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_command("prodcov-no-such-binary", &[], 5).await.unwrap_err();
        assert!(matches!(err, JacocoError::Spawn { .. }));
    }

    #[test]
    fn test_default_cli() {
        let cli = JacocoCli::default();
        assert_eq!(cli.java, "java");
        assert_eq!(cli.timeout_secs, 300);
    }
}

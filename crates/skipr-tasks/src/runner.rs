//! External build/test tool invocation

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// One tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Project or solution path, relative to the repository root
    pub target: String,
    /// Command verb (`build`, `test`)
    pub verb: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(target: impl Into<String>, verb: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            target: target.into(),
            verb: verb.into(),
            args,
        }
    }

    /// Command line without the program name
    pub fn display(&self) -> String {
        let mut parts = vec![self.verb.clone(), self.target.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Exit status plus combined output text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub output: String,
}

/// Runs the external tool
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run to completion, or until `cancel` fires
    async fn run(&self, invocation: &Invocation, cancel: &CancellationToken) -> Result<ToolOutput, RunnerError>;
}

/// Spawns the tool as a child process in its own process group
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    root: PathBuf,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            root: root.into(),
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!(error = %e, "output stream closed early");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Kill the child and every descendant sharing its process group
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall; a stale pid group at worst yields ESRCH
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
        if rc != 0 {
            debug!(pid, "process group already gone");
        }
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "child already exited");
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    #[instrument(skip_all, fields(target = %invocation.target, verb = %invocation.verb))]
    async fn run(&self, invocation: &Invocation, cancel: &CancellationToken) -> Result<ToolOutput, RunnerError> {
        let mut command = Command::new(&self.program);
        command
            .arg(&invocation.verb)
            .arg(&invocation.target)
            .args(&invocation.args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        debug!(program = %self.program, command = %invocation.display(), "spawning tool");
        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = tokio::spawn(read_all(child.stdout.take()));
        let stderr = tokio::spawn(read_all(child.stderr.take()));

        let status = tokio::select! {
            status = child.wait() => status.map_err(RunnerError::Wait)?,
            _ = cancel.cancelled() => {
                warn!(target = %invocation.target, "cancelling tool invocation");
                kill_tree(&mut child);
                let _ = child.wait().await;
                return Err(RunnerError::Cancelled);
            }
        };

        let mut output = stdout.await.unwrap_or_default();
        let err_text = stderr.await.unwrap_or_default();
        if !err_text.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&err_text);
        }

        debug!(exit_code = ?status.code(), bytes = output.len(), "tool finished");
        Ok(ToolOutput {
            exit_code: status.code(),
            output,
        })
    }
}

/// Tool invocation errors
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The program could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed
    #[error("Failed to wait for tool: {0}")]
    Wait(std::io::Error),

    /// Cancelled before completion
    #[error("Cancelled")]
    Cancelled,
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let temp = TempDir::new().unwrap();
        // Runs `sh -c <script>`: the verb slot carries `-c`, the target slot the script
        let runner = ProcessRunner::new("sh", temp.path());
        let script = Invocation::new("echo out; echo err 1>&2; exit 3", "-c", vec![]);

        let output = runner.run(&script, &CancellationToken::new()).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(output.output.contains("out"));
        assert!(output.output.contains("err"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let temp = TempDir::new().unwrap();
        let runner = ProcessRunner::new("definitely-not-a-real-tool-xyz", temp.path());
        let err = runner
            .run(&Invocation::new("p", "build", vec![]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_cancel_kills_process_group() {
        let temp = TempDir::new().unwrap();
        let runner = ProcessRunner::new("sh", temp.path());
        let script = Invocation::new("sleep 30 & sleep 30; wait", "-c", vec![]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = runner.run(&script, &cancel).await.unwrap_err();
        assert!(matches!(err, RunnerError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_display() {
        let invocation = Invocation::new(
            "src/Core/Core.csproj",
            "test",
            vec!["--filter".to_string(), "FooTests".to_string()],
        );
        assert_eq!(invocation.display(), "test src/Core/Core.csproj --filter FooTests");
    }
}

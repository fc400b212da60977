//! Remote execution result types and the transport seams.

use crate::error::TransportError;
use crate::host::HostDescriptor;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of one remote command execution. Exactly one is retained per
/// logical operation: the successful one, or the last of a failed series.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the command completed with exit status 0
    pub success: bool,
    /// Remote exit status; -1 when the command never produced one
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Human-readable failure context; empty on success
    pub message: String,
}

impl ExecutionResult {
    pub fn ok(stdout: String, stderr: String) -> Self {
        Self {
            success: true,
            exit_code: 0,
            stdout,
            stderr,
            message: String::new(),
        }
    }

    pub fn command_failed(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            success: false,
            exit_code,
            stdout,
            stderr,
            message: format!("command exited with status {}", exit_code),
        }
    }

    /// Per-operation timeout fired; the in-flight command was torn down.
    pub fn timed_out(elapsed: Duration) -> Self {
        Self {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            message: format!("timeout after {}s", elapsed.as_secs()),
        }
    }

    /// The operation never ran (e.g. its join command was unavailable).
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            message: format!("skipped: {}", reason.into()),
        }
    }

    /// Transport fault mid-operation, folded into a result so per-host
    /// aggregation stays uniform.
    pub fn transport_failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            message: detail.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.message.starts_with("timeout after ")
    }

    /// Failure context for aggregation: the message, enriched with trailing
    /// stderr when there is any.
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if self.message.is_empty() && stderr.is_empty() {
            return "command failed".to_string();
        }
        if stderr.is_empty() {
            self.message.clone()
        } else if self.message.is_empty() {
            stderr.to_string()
        } else {
            format!("{}: {}", self.message, last_lines(stderr, 3))
        }
    }
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join(" / ")
}

/// One chunk of remote process output, pushed in arrival order. The stream
/// ends when the sender side is dropped; every buffered chunk is delivered
/// before the final [`ExecutionResult`] is produced.
#[derive(Debug, Clone)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

/// Options for one remote command execution.
#[derive(Default)]
pub struct ExecOptions {
    /// Per-operation timeout; the in-flight command is torn down when it
    /// fires and a timeout-tagged failed result is returned
    pub timeout: Option<Duration>,
    /// Live output consumer
    pub output: Option<mpsc::Sender<OutputChunk>>,
    /// The command line embeds a secret (join token, certificate key);
    /// log a label instead of the command text
    pub sensitive: bool,
}

impl ExecOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn streaming(mut self, sender: mpsc::Sender<OutputChunk>) -> Self {
        self.output = Some(sender);
        self
    }
}

/// One exclusive, authenticated shell connection to one host.
///
/// Command failures (non-zero exit, timeout) are reported inside the
/// [`ExecutionResult`]; `Err(TransportError)` is reserved for session-level
/// faults. After [`RemoteShell::close`] every call fails immediately with
/// [`TransportError::SessionClosed`].
#[async_trait]
pub trait RemoteShell: Send {
    /// Run a command and wait for it to settle.
    async fn exec(
        &mut self,
        command: &str,
        opts: ExecOptions,
    ) -> Result<ExecutionResult, TransportError>;

    /// Upload raw content to a remote path with the given mode.
    async fn upload(
        &mut self,
        content: &[u8],
        remote_path: &str,
        mode: i32,
    ) -> Result<(), TransportError>;

    /// Close the underlying transport. Terminal; idempotent.
    async fn close(&mut self);

    /// Host label for logs and outcome maps.
    fn host(&self) -> &str;

    /// Upload a script body, execute it with positional arguments, then
    /// best-effort delete the remote file whatever the outcome.
    async fn deliver_and_run(
        &mut self,
        content: &[u8],
        remote_path: &str,
        mode: i32,
        args: &[String],
        elevation: Option<&str>,
        opts: ExecOptions,
    ) -> Result<ExecutionResult, TransportError> {
        self.upload(content, remote_path, mode).await?;

        let mut command = match elevation {
            Some(sudo) => format!("{} bash {}", sudo, remote_path),
            None => format!("bash {}", remote_path),
        };
        for arg in args {
            command.push(' ');
            command.push_str(&shell_quote(arg));
        }

        let result = self.exec(&command, opts).await;

        // Cleanup failures are swallowed; a stale file in the scratch
        // directory must not fail the operation.
        let _ = self
            .exec(&format!("rm -f {}", remote_path), ExecOptions::default())
            .await;

        result
    }
}

/// Opens [`RemoteShell`] connections. The seam the orchestrator is tested
/// through.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn RemoteShell>, TransportError>;
}

/// Single-quote an argument for the remote shell.
pub(crate) fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '='))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(shell_quote("--node-name=worker-1"), "--node-name=worker-1");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn failure_detail_prefers_stderr_tail() {
        let result = ExecutionResult::command_failed(
            1,
            String::new(),
            "line one\nerror: preflight checks failed\n".to_string(),
        );
        let detail = result.failure_detail();
        assert!(detail.contains("status 1"));
        assert!(detail.contains("preflight checks failed"));
    }

    #[test]
    fn timeout_results_are_tagged() {
        let result = ExecutionResult::timed_out(Duration::from_secs(300));
        assert!(!result.success);
        assert!(result.is_timeout());
    }
}

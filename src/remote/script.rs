//! Script delivery to remote hosts.

use crate::error::TransportError;
use crate::remote::types::{ExecOptions, ExecutionResult, RemoteShell};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Uploaded scripts are executable by owner, readable by everyone.
const SCRIPT_MODE: i32 = 0o755;

/// Process-wide sequence so two deployments of the same script in the same
/// second never collide on one host.
static DEPLOY_SEQ: AtomicU64 = AtomicU64::new(0);

/// A script to run on remote hosts: a name (base of the remote file name),
/// the body, and positional arguments appended to the invocation.
#[derive(Debug, Clone)]
pub struct Script {
    pub name: String,
    pub content: String,
    pub args: Vec<String>,
}

impl Script {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Uploads a script to a collision-free temporary remote path, runs it
/// (optionally elevated), and best-effort deletes it afterward.
///
/// Upload and execution are one logical operation so a retry wrapper can
/// treat "upload + run" atomically: each attempt replays the whole thing on
/// a fresh path.
#[derive(Debug, Clone)]
pub struct ScriptDeployer {
    remote_tmp_dir: String,
    sudo_command: String,
}

impl ScriptDeployer {
    pub fn new(remote_tmp_dir: impl Into<String>, sudo_command: impl Into<String>) -> Self {
        Self {
            remote_tmp_dir: remote_tmp_dir.into(),
            sudo_command: sudo_command.into(),
        }
    }

    /// Remote path for one deployment: base name + unix time + sequence.
    pub fn remote_path(&self, name: &str) -> String {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let seq = DEPLOY_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("{}/{}-{}-{}", self.remote_tmp_dir, name, seconds, seq)
    }

    /// Upload the script, run it, clean up. Elevation uses the configured
    /// privilege-escalation command.
    pub async fn deploy(
        &self,
        shell: &mut dyn RemoteShell,
        script: &Script,
        elevated: bool,
        opts: ExecOptions,
    ) -> Result<ExecutionResult, TransportError> {
        let remote_path = self.remote_path(&script.name);
        tracing::debug!(
            "[ScriptDeployer] {} deploying {} to {}",
            shell.host(),
            script.name,
            remote_path
        );

        let elevation = elevated.then_some(self.sudo_command.as_str());
        shell
            .deliver_and_run(
                script.content.as_bytes(),
                &remote_path,
                SCRIPT_MODE,
                &script.args,
                elevation,
                opts,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_paths_are_unique_per_deployment() {
        let deployer = ScriptDeployer::new("/tmp", "sudo");
        let a = deployer.remote_path("prepare-node.sh");
        let b = deployer.remote_path("prepare-node.sh");
        assert_ne!(a, b);
        assert!(a.starts_with("/tmp/prepare-node.sh-"));
    }
}

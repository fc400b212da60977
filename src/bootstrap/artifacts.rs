//! Join artifacts extracted during initialization, and the join-command
//! rewrite applied before any host executes one.

/// Subcommand token the rewrite replaces. The bootstrap tool prints join
/// commands without a runtime socket; every host in our fleet needs one.
const JOIN_TOKEN: &str = "kubeadm join";

/// Fixed flags appended to the worker join command, together with the
/// certificate key, to form the control-plane join command.
const CONTROL_PLANE_FLAG: &str = "--control-plane";
const CERTIFICATE_KEY_FLAG: &str = "--certificate-key";

/// Artifacts extracted from the primary host during initialization and
/// consumed during join and verification. Write-once: nothing mutates them
/// after the initialization phase settles.
#[derive(Debug, Clone, Default)]
pub struct JoinArtifacts {
    /// Join command for worker hosts, exactly as printed by the primary.
    pub worker_join_command: Option<String>,
    /// Worker join command augmented with the control-plane flags.
    pub control_plane_join_command: Option<String>,
    /// Admin kubeconfig contents read off the primary host.
    pub admin_kubeconfig: Option<String>,
}

impl JoinArtifacts {
    /// Build the control-plane join command from the worker join command and
    /// the certificate key printed by the upload-certs step.
    pub fn control_plane_command(worker_join: &str, certificate_key: &str) -> String {
        format!(
            "{} {} {} {}",
            worker_join.trim(),
            CONTROL_PLANE_FLAG,
            CERTIFICATE_KEY_FLAG,
            certificate_key
        )
    }
}

/// Rewrite a join command for execution on a fleet host: elevate it and
/// insert the container-runtime socket flag right after the subcommand.
///
/// This is a fixed textual substitution; the augmented form must stay
/// compatible with the remote tool's command-line syntax.
pub fn rewrite_join_command(command: &str, cri_socket: &str) -> String {
    command.trim().replacen(
        JOIN_TOKEN,
        &format!("sudo {} --cri-socket={}", JOIN_TOKEN, cri_socket),
        1,
    )
}

/// Last non-empty line of command output. Both the join-token step and the
/// upload-certs step print their secret as the final line.
pub fn last_output_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

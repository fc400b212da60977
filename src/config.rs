//! Engine configuration.
//! Loaded from kubeboot.toml; every field has a default so the engine runs
//! unconfigured.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// Constants for hardcoded values
/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default login user (cloud images ship with this account)
pub const DEFAULT_SSH_USERNAME: &str = "ubuntu";

/// SSH connect timeout. Freshly provisioned hosts can take a while to accept
/// connections while cloud-init is still running.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// SSH keep-alive interval, keeps long-running init/join commands from being
/// dropped by intermediate NAT boxes.
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 15;

/// Default retry budget per logical remote operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default per-attempt timeout (5 minutes; kubeadm init routinely takes minutes)
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 300;

/// Default delay between retry attempts (2 seconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Default cap on concurrent per-host tasks within a phase
pub const DEFAULT_FANOUT_LIMIT: usize = 16;

/// Default settling delay before membership verification, gives newly joined
/// nodes time to report in
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 30;

/// Container-runtime socket inserted into every join command
pub const DEFAULT_CRI_SOCKET: &str = "unix:///run/containerd/containerd.sock";

/// Where kubeadm leaves the admin kubeconfig on the primary host
pub const DEFAULT_ADMIN_KUBECONFIG_PATH: &str = "/etc/kubernetes/admin.conf";

/// Remote scratch directory for uploaded scripts and config artifacts
pub const DEFAULT_REMOTE_TMP_DIR: &str = "/tmp";

/// Privilege-escalation prefix for remote commands
pub const DEFAULT_SUDO_COMMAND: &str = "sudo";

pub(crate) fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_username() -> String {
    DEFAULT_SSH_USERNAME.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_keepalive_interval_secs() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_attempt_timeout_secs() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT_SECS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_fanout_limit() -> usize {
    DEFAULT_FANOUT_LIMIT
}

fn default_settle_delay_secs() -> u64 {
    DEFAULT_SETTLE_DELAY_SECS
}

fn default_cri_socket() -> String {
    DEFAULT_CRI_SOCKET.to_string()
}

fn default_admin_kubeconfig_path() -> String {
    DEFAULT_ADMIN_KUBECONFIG_PATH.to_string()
}

fn default_remote_tmp_dir() -> String {
    DEFAULT_REMOTE_TMP_DIR.to_string()
}

fn default_sudo_command() -> String {
    DEFAULT_SUDO_COMMAND.to_string()
}

/// SSH transport settings shared by every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Login user for hosts that do not set their own
    #[serde(default = "default_username")]
    pub default_username: String,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Keep-alive interval in seconds
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            default_username: default_username(),
            connect_timeout_secs: default_connect_timeout_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
        }
    }
}

impl SshSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Bounded-attempt retry policy for a single logical remote operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per logical operation, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout around one whole attempt (reconnect + run) in seconds
    #[serde(default = "default_attempt_timeout_secs")]
    pub per_attempt_timeout_secs: u64,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub inter_attempt_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            per_attempt_timeout_secs: default_attempt_timeout_secs(),
            inter_attempt_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.per_attempt_timeout_secs)
    }

    pub fn inter_attempt_delay(&self) -> Duration {
        Duration::from_millis(self.inter_attempt_delay_ms)
    }
}

/// Engine configuration
/// Loaded from kubeboot.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SSH transport settings
    #[serde(default)]
    pub ssh: SshSettings,

    /// Retry policy for per-host remote operations
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Cap on concurrent per-host tasks within a phase
    #[serde(default = "default_fanout_limit")]
    pub fanout_limit: usize,

    /// Settling delay before membership verification, in seconds
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    /// Container-runtime socket flag value for join commands
    #[serde(default = "default_cri_socket")]
    pub cri_socket: String,

    /// Remote path of the admin kubeconfig on the primary host
    #[serde(default = "default_admin_kubeconfig_path")]
    pub admin_kubeconfig_path: String,

    /// Remote scratch directory for uploaded artifacts
    #[serde(default = "default_remote_tmp_dir")]
    pub remote_tmp_dir: String,

    /// Privilege-escalation command prefix
    #[serde(default = "default_sudo_command")]
    pub sudo_command: String,
}

impl EngineConfig {
    /// Load configuration from file. Tries a couple of locations and falls
    /// back to defaults when nothing is found.
    pub fn load(base_dir: &std::path::Path) -> Result<Self, String> {
        let config_paths = vec![
            PathBuf::from("kubeboot.toml"),
            base_dir.join("kubeboot.toml"),
        ];

        for path in config_paths {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| format!("Failed to read config file {:?}: {}", path, e))?;

                let config: EngineConfig = toml::from_str(&content)
                    .map_err(|e| format!("Failed to parse config file {:?}: {}", path, e))?;

                tracing::info!("Loaded engine config from {:?}", path);
                return Ok(config);
            }
        }

        tracing::warn!("No kubeboot.toml found, using defaults");
        Ok(Self::default())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.per_attempt_timeout_secs, 300);
        assert_eq!(config.retry.inter_attempt_delay_ms, 2_000);
        assert_eq!(config.ssh.connect_timeout_secs, 30);
        assert_eq!(config.fanout_limit, 16);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            fanout_limit = 4

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.fanout_limit, 4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.inter_attempt_delay_ms, 2_000);
        assert_eq!(config.cri_socket, DEFAULT_CRI_SOCKET);
    }

    #[test]
    fn load_finds_config_in_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("kubeboot.toml"),
            "fanout_limit = 2\nsettle_delay_secs = 5\n",
        )
        .unwrap();

        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.fanout_limit, 2);
        assert_eq!(config.settle_delay_secs, 5);
        assert_eq!(config.retry.max_attempts, 3);
    }
}

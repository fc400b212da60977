//! Error types for transport, orchestration and cluster query operations.

use thiserror::Error;

/// Session-level transport failures. Command failures (non-zero exit,
/// per-operation timeout) are never reported through this type; they are
/// carried inside [`crate::ExecutionResult`] so callers can aggregate
/// per-host outcomes uniformly.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Authentication failed for {host}: {detail}")]
    Authentication { host: String, detail: String },

    #[error("Connection to {host} timed out after {timeout_secs}s")]
    ConnectTimeout { host: String, timeout_secs: u64 },

    #[error("Connection to {host} failed: {detail}")]
    Connect { host: String, detail: String },

    #[error("Transport failure on {host}: {detail}")]
    Stream { host: String, detail: String },

    #[error("Upload to {host} failed: {detail}")]
    Upload { host: String, detail: String },

    #[error("Session for {host} is closed")]
    SessionClosed { host: String },
}

impl TransportError {
    /// Host the failure belongs to.
    pub fn host(&self) -> &str {
        match self {
            TransportError::Authentication { host, .. }
            | TransportError::ConnectTimeout { host, .. }
            | TransportError::Connect { host, .. }
            | TransportError::Stream { host, .. }
            | TransportError::Upload { host, .. }
            | TransportError::SessionClosed { host } => host,
        }
    }

    /// Whether retrying the operation can possibly succeed. Rejected
    /// credentials stay rejected; everything else may be transient.
    pub fn is_permanent(&self) -> bool {
        matches!(self, TransportError::Authentication { .. })
    }
}

/// A single host that failed within a phase, with its own message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HostFailure {
    pub host: String,
    pub message: String,
}

impl std::fmt::Display for HostFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.host, self.message)
    }
}

/// Fatal orchestration failures. Only topology validation, environment
/// preparation and the init command itself can abort the pipeline; every
/// later condition degrades into a [`crate::BootstrapWarning`] instead.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid cluster topology: {0}")]
    InvalidTopology(String),

    #[error("Environment preparation failed on {} host(s)", .failures.len())]
    PreparationFailed { failures: Vec<HostFailure> },

    #[error("Cluster initialization failed on {host}: {message}")]
    InitializationFailed { host: String, message: String },
}

/// Errors from the external cluster membership query.
#[derive(Debug, Error)]
pub enum ClusterQueryError {
    #[error("Invalid admin credentials: {0}")]
    Credentials(String),

    #[error("Cluster API request failed: {0}")]
    Api(String),
}

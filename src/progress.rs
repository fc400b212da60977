//! Progress types for bootstrap orchestration.

use serde::{Deserialize, Serialize};

/// Progress event emitted while a bootstrap runs.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct BootstrapProgress {
    pub percentage: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl BootstrapProgress {
    pub fn new(percentage: u32, message: String) -> Self {
        Self {
            percentage,
            message,
            phase: None,
            host: None,
        }
    }
}

/// Progress reporter for bootstrap operations.
pub trait ProgressReporter: Send + Sync + 'static {
    fn emit(&self, percentage: u32, message: String);

    /// Emit progress with phase and host metadata.
    fn emit_detailed(
        &self,
        percentage: u32,
        message: String,
        _phase: Option<String>,
        _host: Option<String>,
    ) {
        self.emit(percentage, message);
    }
}

/// Channel-based progress reporter.
pub struct ChannelProgressReporter {
    sender: tokio::sync::mpsc::Sender<BootstrapProgress>,
}

impl ChannelProgressReporter {
    pub fn new(sender: tokio::sync::mpsc::Sender<BootstrapProgress>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn emit(&self, percentage: u32, message: String) {
        self.emit_detailed(percentage, message, None, None);
    }

    fn emit_detailed(
        &self,
        percentage: u32,
        message: String,
        phase: Option<String>,
        host: Option<String>,
    ) {
        let mut progress = BootstrapProgress::new(percentage, message);
        progress.phase = phase;
        progress.host = host;
        let _ = self.sender.try_send(progress);
    }
}

/// Reporter that drops everything, for embedding without a consumer.
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {
    fn emit(&self, _percentage: u32, _message: String) {}
}

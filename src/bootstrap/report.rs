//! Bootstrap outcome report.

use crate::bootstrap::artifacts::JoinArtifacts;
use crate::bootstrap::state::ClusterBootstrapState;
use crate::error::{BootstrapError, HostFailure};
use crate::remote::types::ExecutionResult;
use std::collections::HashMap;

/// The two independent join groups of phase 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinGroup {
    ControlPlane,
    Worker,
}

impl std::fmt::Display for JoinGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinGroup::ControlPlane => write!(f, "control-plane"),
            JoinGroup::Worker => write!(f, "worker"),
        }
    }
}

/// Per-phase outcome: one result slot per host that the phase reached. A
/// host missing from the map was never attempted because an earlier phase
/// aborted the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PhaseOutcome {
    pub results: HashMap<String, ExecutionResult>,
    pub succeeded: bool,
}

impl PhaseOutcome {
    pub fn not_reached() -> Self {
        Self::default()
    }

    pub fn from_results(results: HashMap<String, ExecutionResult>) -> Self {
        let succeeded = results.values().all(|r| r.success);
        Self { results, succeeded }
    }

    /// Hosts that failed, each with its own message.
    pub fn failures(&self) -> Vec<HostFailure> {
        let mut failures: Vec<HostFailure> = self
            .results
            .iter()
            .filter(|(_, result)| !result.success)
            .map(|(host, result)| HostFailure {
                host: host.clone(),
                message: result.failure_detail(),
            })
            .collect();
        failures.sort_by(|a, b| a.host.cmp(&b.host));
        failures
    }
}

/// Non-fatal conditions that degrade a bootstrap without aborting it.
#[derive(Debug, Clone)]
pub enum BootstrapWarning {
    /// Init succeeded but token/credential extraction did not; the worker
    /// join command is absent.
    TokenExtractionDegraded { host: String, detail: String },
    /// Worker join command exists but the certificate-upload step failed;
    /// the control-plane join command is absent.
    ControlPlaneJoinUnavailable { host: String, detail: String },
    /// One join group had failing hosts. The other group and the pipeline
    /// are unaffected.
    JoinFailed {
        group: JoinGroup,
        failures: Vec<HostFailure>,
    },
    /// Membership count after the settling delay did not match expectation.
    /// Convergence may simply be slow.
    VerificationMismatch { expected: usize, actual: usize },
    /// Membership could not be checked at all.
    VerificationUnavailable { detail: String },
}

impl std::fmt::Display for BootstrapWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapWarning::TokenExtractionDegraded { host, detail } => {
                write!(f, "join token extraction degraded on {}: {}", host, detail)
            }
            BootstrapWarning::ControlPlaneJoinUnavailable { host, detail } => write!(
                f,
                "control-plane join command unavailable (certificate upload on {} failed: {})",
                host, detail
            ),
            BootstrapWarning::JoinFailed { group, failures } => {
                let hosts: Vec<String> = failures.iter().map(|f| f.host.clone()).collect();
                write!(f, "{} join failed on [{}]", group, hosts.join(", "))
            }
            BootstrapWarning::VerificationMismatch { expected, actual } => write!(
                f,
                "cluster reports {} node(s), expected {}",
                actual, expected
            ),
            BootstrapWarning::VerificationUnavailable { detail } => {
                write!(f, "membership verification unavailable: {}", detail)
            }
        }
    }
}

/// Structured result of one bootstrap run: final state, join artifacts,
/// per-phase per-host outcomes, warnings, and the fatal error when the
/// pipeline aborted.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub state: ClusterBootstrapState,
    pub artifacts: JoinArtifacts,
    pub preparation: PhaseOutcome,
    pub initialization: PhaseOutcome,
    pub join: PhaseOutcome,
    pub warnings: Vec<BootstrapWarning>,
    pub failure: Option<BootstrapError>,
}

impl BootstrapReport {
    /// Overall success: the pipeline ran to completion without a fatal
    /// error. Warnings (degraded extraction, join failures, verification
    /// mismatch) do not clear this flag.
    pub fn success(&self) -> bool {
        self.state == ClusterBootstrapState::Complete
    }
}

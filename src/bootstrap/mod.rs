//! Cluster bootstrap orchestration — phase state machine, join artifacts,
//! outcome report.

pub mod artifacts;
pub mod orchestrator;
pub mod report;
pub mod scripts;
pub mod state;

pub use artifacts::{rewrite_join_command, JoinArtifacts};
pub use orchestrator::{BootstrapOrchestrator, BootstrapRequest};
pub use report::{BootstrapReport, BootstrapWarning, JoinGroup, PhaseOutcome};
pub use state::ClusterBootstrapState;

pub use crate::error::HostFailure;

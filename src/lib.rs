//! Remote cluster-bootstrap orchestration engine.
//!
//! This crate drives a fleet of freshly provisioned hosts through a
//! multi-phase bootstrap protocol over SSH: environment preparation on every
//! host, `kubeadm init` on the primary control-plane host, join-artifact
//! extraction (admin kubeconfig, join token, certificate key), concurrent
//! membership join for the remaining hosts, and a post-join membership
//! verification against the cluster API.
//!
//! Instance lifecycle (creating/terminating the machines), record storage and
//! any presentation layer are out of scope; callers hand the orchestrator a
//! list of reachable hosts with assigned roles and receive a structured
//! bootstrap report back.

pub mod config;
pub mod error;
pub mod host;
pub mod progress;

pub use config::{EngineConfig, RetryPolicy, SshSettings};
pub use error::{BootstrapError, ClusterQueryError, TransportError};
pub use host::{Credential, CredentialSource, HostDescriptor, HostRole};
pub use progress::{BootstrapProgress, ChannelProgressReporter, NullProgressReporter, ProgressReporter};

// Remote execution (SSH transport, retry discipline, script delivery)
pub mod remote;
pub use remote::{
    ExecOptions, ExecutionResult, OutputChunk, RemoteConnector, RemoteShell, RetryExecutor,
    Script, ScriptDeployer, SshConnector, SshSession,
};

// Bootstrap orchestration (phase state machine, artifacts, report)
pub mod bootstrap;
pub use bootstrap::{
    rewrite_join_command, BootstrapOrchestrator, BootstrapReport, BootstrapRequest,
    BootstrapWarning, ClusterBootstrapState, HostFailure, JoinArtifacts, JoinGroup, PhaseOutcome,
};

// Cluster membership query (consumed during verification)
pub mod cluster;
pub use cluster::{ClusterQuery, KubeClusterQuery, NodeRecord};

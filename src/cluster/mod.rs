//! Cluster membership query — external collaborator consumed during the
//! verification phase.

pub mod kube;

pub use kube::KubeClusterQuery;

use crate::error::ClusterQueryError;
use async_trait::async_trait;

/// One node as reported by the cluster API.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub name: String,
    /// Ready condition reported true.
    pub ready: bool,
    /// Role labels, e.g. "control-plane".
    pub roles: Vec<String>,
    /// Kubelet version string.
    pub version: String,
    /// Internal address, when the node reports one.
    pub internal_address: Option<String>,
}

/// Queries current cluster membership given admin credentials. Verification
/// only counts the records; the full shape is exposed for callers that want
/// to render it.
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    async fn list_nodes(&self, admin_kubeconfig: &str)
        -> Result<Vec<NodeRecord>, ClusterQueryError>;
}

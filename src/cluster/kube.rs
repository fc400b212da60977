//! Kubernetes API implementation of the membership query.

use crate::cluster::{ClusterQuery, NodeRecord};
use crate::error::ClusterQueryError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

/// Lists cluster nodes through the Kubernetes API, authenticating with the
/// admin kubeconfig extracted from the primary host. A fresh client per call:
/// the engine queries once per bootstrap, pooling buys nothing.
#[derive(Debug, Clone, Default)]
pub struct KubeClusterQuery;

impl KubeClusterQuery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClusterQuery for KubeClusterQuery {
    async fn list_nodes(
        &self,
        admin_kubeconfig: &str,
    ) -> Result<Vec<NodeRecord>, ClusterQueryError> {
        let kubeconfig = Kubeconfig::from_yaml(admin_kubeconfig)
            .map_err(|e| ClusterQueryError::Credentials(e.to_string()))?;
        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ClusterQueryError::Credentials(e.to_string()))?;
        let client =
            Client::try_from(config).map_err(|e| ClusterQueryError::Api(e.to_string()))?;

        let nodes: Api<Node> = Api::all(client);
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterQueryError::Api(e.to_string()))?;

        tracing::debug!("[KubeClusterQuery] Cluster reports {} node(s)", list.items.len());
        Ok(list.items.into_iter().map(node_record).collect())
    }
}

fn node_record(node: Node) -> NodeRecord {
    let name = node.metadata.name.unwrap_or_default();
    let roles: Vec<String> = node
        .metadata
        .labels
        .unwrap_or_default()
        .keys()
        .filter_map(|key| key.strip_prefix("node-role.kubernetes.io/"))
        .map(str::to_string)
        .collect();

    let status = node.status.unwrap_or_default();
    let ready = status
        .conditions
        .unwrap_or_default()
        .iter()
        .any(|c| c.type_ == "Ready" && c.status == "True");
    let version = status
        .node_info
        .map(|info| info.kubelet_version)
        .unwrap_or_default();
    let internal_address = status
        .addresses
        .unwrap_or_default()
        .into_iter()
        .find(|a| a.type_ == "InternalIP")
        .map(|a| a.address);

    NodeRecord {
        name,
        ready,
        roles,
        version,
        internal_address,
    }
}

//! In-memory fleet fakes for orchestrator tests.
#![allow(dead_code)]

use async_trait::async_trait;
use kubeboot::{
    ClusterQuery, ClusterQueryError, ExecOptions, ExecutionResult, HostDescriptor, NodeRecord,
    RemoteConnector, RemoteShell, TransportError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One executed command, as seen by a fake shell.
#[derive(Debug, Clone)]
pub struct ExecRecord {
    pub host: String,
    pub command: String,
}

/// Canned behavior for one host. Rules are substring matchers over the
/// command text; the first match wins, anything unmatched succeeds.
#[derive(Debug, Clone, Default)]
pub struct HostBehavior {
    pub fail_auth: bool,
    rules: Vec<(String, ExecutionResult)>,
}

impl HostBehavior {
    pub fn on(mut self, needle: &str, result: ExecutionResult) -> Self {
        self.rules.push((needle.to_string(), result));
        self
    }

    pub fn rejecting_auth() -> Self {
        Self {
            fail_auth: true,
            rules: Vec::new(),
        }
    }
}

pub fn ok_with_stdout(stdout: &str) -> ExecutionResult {
    ExecutionResult::ok(stdout.to_string(), String::new())
}

pub fn failed(exit_code: i32, stderr: &str) -> ExecutionResult {
    ExecutionResult::command_failed(exit_code, String::new(), stderr.to_string())
}

/// Connector over an in-memory fleet: per-host canned behaviors plus a
/// shared log of every command any shell executed.
#[derive(Default)]
pub struct FleetConnector {
    behaviors: HashMap<String, HostBehavior>,
    log: Arc<Mutex<Vec<ExecRecord>>>,
}

impl FleetConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, address: &str, behavior: HostBehavior) -> Self {
        self.behaviors.insert(address.to_string(), behavior);
        self
    }

    pub fn commands(&self) -> Vec<ExecRecord> {
        self.log.lock().unwrap().clone()
    }

    pub fn commands_containing(&self, needle: &str) -> Vec<ExecRecord> {
        self.commands()
            .into_iter()
            .filter(|record| record.command.contains(needle))
            .collect()
    }
}

#[async_trait]
impl RemoteConnector for FleetConnector {
    async fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn RemoteShell>, TransportError> {
        let behavior = self
            .behaviors
            .get(&host.address)
            .cloned()
            .unwrap_or_default();
        if behavior.fail_auth {
            return Err(TransportError::Authentication {
                host: host.id(),
                detail: "fake server rejected the credential".to_string(),
            });
        }
        Ok(Box::new(FakeShell {
            host: host.id(),
            behavior,
            log: Arc::clone(&self.log),
            closed: false,
        }))
    }
}

pub struct FakeShell {
    host: String,
    behavior: HostBehavior,
    log: Arc<Mutex<Vec<ExecRecord>>>,
    closed: bool,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn exec(
        &mut self,
        command: &str,
        _opts: ExecOptions,
    ) -> Result<ExecutionResult, TransportError> {
        if self.closed {
            return Err(TransportError::SessionClosed {
                host: self.host.clone(),
            });
        }
        self.log.lock().unwrap().push(ExecRecord {
            host: self.host.clone(),
            command: command.to_string(),
        });
        for (needle, result) in &self.behavior.rules {
            if command.contains(needle.as_str()) {
                return Ok(result.clone());
            }
        }
        Ok(ExecutionResult::ok(String::new(), String::new()))
    }

    async fn upload(
        &mut self,
        _content: &[u8],
        remote_path: &str,
        _mode: i32,
    ) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::SessionClosed {
                host: self.host.clone(),
            });
        }
        self.log.lock().unwrap().push(ExecRecord {
            host: self.host.clone(),
            command: format!("upload {}", remote_path),
        });
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Membership query returning a fixed node count, or an error.
pub struct FakeClusterQuery {
    outcome: Result<usize, String>,
}

impl FakeClusterQuery {
    pub fn reporting(count: usize) -> Self {
        Self { outcome: Ok(count) }
    }

    pub fn unavailable(detail: &str) -> Self {
        Self {
            outcome: Err(detail.to_string()),
        }
    }
}

#[async_trait]
impl ClusterQuery for FakeClusterQuery {
    async fn list_nodes(
        &self,
        _admin_kubeconfig: &str,
    ) -> Result<Vec<NodeRecord>, ClusterQueryError> {
        match &self.outcome {
            Ok(count) => Ok((0..*count)
                .map(|i| NodeRecord {
                    name: format!("node-{}", i),
                    ready: true,
                    roles: Vec::new(),
                    version: "v1.28.4".to_string(),
                    internal_address: None,
                })
                .collect()),
            Err(detail) => Err(ClusterQueryError::Api(detail.clone())),
        }
    }
}

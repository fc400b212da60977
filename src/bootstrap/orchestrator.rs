//! The bootstrap phase state machine.
//!
//! Sequences Preparation → Initialization → Join → Verification across the
//! fleet. Phases are strict barriers: every per-host task of a phase settles
//! before the next phase starts. Within a phase, hosts run concurrently with
//! no ordering guarantee, each writing into its own outcome slot.

use crate::bootstrap::artifacts::{last_output_line, rewrite_join_command, JoinArtifacts};
use crate::bootstrap::report::{BootstrapReport, BootstrapWarning, JoinGroup, PhaseOutcome};
use crate::bootstrap::scripts;
use crate::bootstrap::state::ClusterBootstrapState;
use crate::cluster::ClusterQuery;
use crate::config::EngineConfig;
use crate::error::BootstrapError;
use crate::host::{HostDescriptor, HostRole};
use crate::progress::{NullProgressReporter, ProgressReporter};
use crate::remote::retry::RetryExecutor;
use crate::remote::script::{Script, ScriptDeployer};
use crate::remote::types::{ExecOptions, ExecutionResult, RemoteConnector, RemoteShell};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Remote mode for the uploaded init configuration artifact. It is read by
/// the init command, never executed.
const INIT_CONFIG_MODE: i32 = 0o644;

/// Input to one bootstrap run.
pub struct BootstrapRequest {
    /// The fleet, roles assigned. Exactly one host must be [`HostRole::Primary`].
    pub hosts: Vec<HostDescriptor>,
    /// Cluster-init configuration artifact, uploaded verbatim to the primary
    /// before the init command runs. Opaque to the engine.
    pub init_config: String,
    /// Override for the embedded environment-preparation script.
    pub preparation_script: Option<Script>,
}

impl BootstrapRequest {
    pub fn new(hosts: Vec<HostDescriptor>, init_config: impl Into<String>) -> Self {
        Self {
            hosts,
            init_config: init_config.into(),
            preparation_script: None,
        }
    }

    pub fn with_preparation_script(mut self, script: Script) -> Self {
        self.preparation_script = Some(script);
        self
    }
}

/// Outcome of the initialization phase before the orchestrator folds it into
/// the report.
struct InitializationOutcome {
    phase: PhaseOutcome,
    artifacts: JoinArtifacts,
    warnings: Vec<BootstrapWarning>,
    fatal: Option<BootstrapError>,
}

/// Drives a fleet of hosts through the cluster bootstrap protocol.
pub struct BootstrapOrchestrator {
    config: EngineConfig,
    connector: Arc<dyn RemoteConnector>,
    query: Arc<dyn ClusterQuery>,
    progress: Arc<dyn ProgressReporter>,
    deployer: ScriptDeployer,
}

impl BootstrapOrchestrator {
    pub fn new(
        config: EngineConfig,
        connector: Arc<dyn RemoteConnector>,
        query: Arc<dyn ClusterQuery>,
    ) -> Self {
        let deployer = ScriptDeployer::new(
            config.remote_tmp_dir.clone(),
            config.sudo_command.clone(),
        );
        Self {
            config,
            connector,
            query,
            progress: Arc::new(NullProgressReporter),
            deployer,
        }
    }

    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = reporter;
        self
    }

    /// Run the whole bootstrap. Never panics and never returns early with a
    /// bare error: the report always carries whatever the pipeline produced
    /// before stopping.
    pub async fn run(&self, request: BootstrapRequest) -> BootstrapReport {
        let mut report = BootstrapReport::default();
        let mut state = ClusterBootstrapState::NotStarted;

        tracing::info!(
            "[Orchestrator] Starting cluster bootstrap for {} host(s)",
            request.hosts.len()
        );

        let primary = match validate_topology(&request.hosts) {
            Ok(primary) => primary.clone(),
            Err(e) => {
                tracing::error!("[Orchestrator] {}", e);
                return self.fail(&mut state, report, e);
            }
        };

        // Phase 1 — Preparation, all hosts concurrently, full barrier.
        self.advance(&mut state, ClusterBootstrapState::Preparing);
        let prep_script = request.preparation_script.clone().unwrap_or_else(|| {
            Script::new(scripts::PREPARE_NODE_NAME, scripts::PREPARE_NODE)
        });
        report.preparation = self.run_preparation(&request.hosts, &prep_script).await;
        if !report.preparation.succeeded {
            let failures = report.preparation.failures();
            tracing::error!(
                "[Orchestrator] Preparation failed on {} host(s), aborting before initialization",
                failures.len()
            );
            return self.fail(
                &mut state,
                report,
                BootstrapError::PreparationFailed { failures },
            );
        }

        // Phase 2 — Initialization, primary host only, one held-open session.
        self.advance(&mut state, ClusterBootstrapState::Initializing);
        let init = self.run_initialization(&primary, &request.init_config).await;
        report.initialization = init.phase;
        report.artifacts = init.artifacts;
        report.warnings.extend(init.warnings);
        if let Some(fatal) = init.fatal {
            tracing::error!("[Orchestrator] {}", fatal);
            return self.fail(&mut state, report, fatal);
        }
        self.advance(&mut state, ClusterBootstrapState::TokensExtracted);

        // Phase 3 — Join, both groups fully concurrent.
        self.advance(&mut state, ClusterBootstrapState::Joining);
        let joiners: Vec<HostDescriptor> = request
            .hosts
            .iter()
            .filter(|h| h.role != HostRole::Primary)
            .cloned()
            .collect();
        let (join_outcome, join_warnings) = self.run_join(&joiners, &report.artifacts).await;
        report.join = join_outcome;
        report.warnings.extend(join_warnings);

        // Phase 4 — Verification, non-fatal whatever happens.
        self.advance(&mut state, ClusterBootstrapState::Verifying);
        let expected = request.hosts.len();
        report
            .warnings
            .extend(self.run_verification(expected, &report.artifacts).await);

        self.advance(&mut state, ClusterBootstrapState::Complete);
        report.state = state;
        tracing::info!(
            "[Orchestrator] Bootstrap complete ({} warning(s))",
            report.warnings.len()
        );
        report
    }

    /// Run one concurrent operation per host, bounded by the fan-out cap,
    /// and wait for all of them to settle. Results land in disjoint slots.
    async fn fan_out<F, Fut>(
        &self,
        hosts: &[HostDescriptor],
        run_host: F,
    ) -> HashMap<String, ExecutionResult>
    where
        F: Fn(HostDescriptor) -> Fut,
        Fut: Future<Output = ExecutionResult>,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.fanout_limit.max(1)));
        let tasks = hosts.iter().map(|host| {
            let semaphore = Arc::clone(&semaphore);
            let host_id = host.id();
            let task = run_host(host.clone());
            async move {
                let _permit = semaphore.acquire().await.ok();
                (host_id, task.await)
            }
        });
        futures::future::join_all(tasks).await.into_iter().collect()
    }

    async fn run_preparation(
        &self,
        hosts: &[HostDescriptor],
        script: &Script,
    ) -> PhaseOutcome {
        tracing::info!(
            "[Orchestrator] Preparing {} host(s) with '{}'",
            hosts.len(),
            script.name
        );

        let results = self
            .fan_out(hosts, |host| {
                let connector = Arc::clone(&self.connector);
                let deployer = self.deployer.clone();
                let retry = RetryExecutor::new(self.config.retry);
                let script = script.clone();
                let timeout = self.config.retry.per_attempt_timeout();
                async move {
                    let label = format!("prepare {}", host.id());
                    retry
                        .run(&label, || {
                            let connector = Arc::clone(&connector);
                            let deployer = deployer.clone();
                            let script = script.clone();
                            let host = host.clone();
                            async move {
                                let mut shell = connector.connect(&host).await?;
                                let result = deployer
                                    .deploy(
                                        shell.as_mut(),
                                        &script,
                                        true,
                                        ExecOptions::with_timeout(timeout),
                                    )
                                    .await;
                                shell.close().await;
                                result
                            }
                        })
                        .await
                }
            })
            .await;

        PhaseOutcome::from_results(results)
    }

    async fn run_initialization(
        &self,
        primary: &HostDescriptor,
        init_config: &str,
    ) -> InitializationOutcome {
        let host_id = primary.id();
        tracing::info!("[Orchestrator] Initializing cluster on {}", host_id);

        let mut shell = match self.connector.connect(primary).await {
            Ok(shell) => shell,
            Err(e) => {
                return InitializationOutcome {
                    phase: PhaseOutcome::from_results(HashMap::from([(
                        host_id.clone(),
                        ExecutionResult::transport_failure(e.to_string()),
                    )])),
                    artifacts: JoinArtifacts::default(),
                    warnings: Vec::new(),
                    fatal: Some(BootstrapError::InitializationFailed {
                        host: host_id,
                        message: e.to_string(),
                    }),
                }
            }
        };

        let outcome = self
            .initialize_on(shell.as_mut(), &host_id, init_config)
            .await;
        shell.close().await;
        outcome
    }

    /// The four sequential initialization sub-steps, all on one session.
    /// Only the init command itself is fatal; artifact extraction degrades
    /// into warnings.
    async fn initialize_on(
        &self,
        shell: &mut dyn RemoteShell,
        host_id: &str,
        init_config: &str,
    ) -> InitializationOutcome {
        let sudo = &self.config.sudo_command;
        let timeout = self.config.retry.per_attempt_timeout();
        let mut artifacts = JoinArtifacts::default();
        let mut warnings = Vec::new();

        // 1. Upload the init configuration artifact and run the init command.
        let config_path = self.deployer.remote_path("kubeadm-config.yaml");
        if let Err(e) = shell
            .upload(init_config.as_bytes(), &config_path, INIT_CONFIG_MODE)
            .await
        {
            return InitializationOutcome {
                phase: PhaseOutcome::from_results(HashMap::from([(
                    host_id.to_string(),
                    ExecutionResult::transport_failure(e.to_string()),
                )])),
                artifacts,
                warnings,
                fatal: Some(BootstrapError::InitializationFailed {
                    host: host_id.to_string(),
                    message: format!("init config upload failed: {}", e),
                }),
            };
        }

        let init_command = format!("{} kubeadm init --config {}", sudo, config_path);
        let init_result = match shell
            .exec(&init_command, ExecOptions::with_timeout(timeout))
            .await
        {
            Ok(result) => result,
            Err(e) => ExecutionResult::transport_failure(e.to_string()),
        };
        let _ = shell
            .exec(&format!("rm -f {}", config_path), ExecOptions::default())
            .await;

        if !init_result.success {
            let message = init_result.failure_detail();
            return InitializationOutcome {
                phase: PhaseOutcome::from_results(HashMap::from([(
                    host_id.to_string(),
                    init_result,
                )])),
                artifacts,
                warnings,
                fatal: Some(BootstrapError::InitializationFailed {
                    host: host_id.to_string(),
                    message,
                }),
            };
        }

        // 2. Admin credentials off the known path.
        let kubeconfig_command =
            format!("{} cat {}", sudo, self.config.admin_kubeconfig_path);
        match shell
            .exec(&kubeconfig_command, ExecOptions::with_timeout(timeout))
            .await
        {
            Ok(result) if result.success => {
                artifacts.admin_kubeconfig = Some(result.stdout);
            }
            Ok(result) => warnings.push(BootstrapWarning::TokenExtractionDegraded {
                host: host_id.to_string(),
                detail: format!("admin kubeconfig read failed: {}", result.failure_detail()),
            }),
            Err(e) => warnings.push(BootstrapWarning::TokenExtractionDegraded {
                host: host_id.to_string(),
                detail: format!("admin kubeconfig read failed: {}", e),
            }),
        }

        // 3. New join token; the printed join command is the last line.
        let token_command = format!("{} kubeadm token create --print-join-command", sudo);
        match shell
            .exec(
                &token_command,
                ExecOptions::with_timeout(timeout).sensitive(),
            )
            .await
        {
            Ok(result) if result.success => match last_output_line(&result.stdout) {
                Some(line) if line.contains("kubeadm join") => {
                    tracing::info!("[Orchestrator] Join token obtained from {}", host_id);
                    artifacts.worker_join_command = Some(line);
                }
                _ => warnings.push(BootstrapWarning::TokenExtractionDegraded {
                    host: host_id.to_string(),
                    detail: "token create printed no join command".to_string(),
                }),
            },
            Ok(result) => warnings.push(BootstrapWarning::TokenExtractionDegraded {
                host: host_id.to_string(),
                detail: format!("token create failed: {}", result.failure_detail()),
            }),
            Err(e) => warnings.push(BootstrapWarning::TokenExtractionDegraded {
                host: host_id.to_string(),
                detail: format!("token create failed: {}", e),
            }),
        }

        // 4. Certificate key for control-plane joins; only meaningful once a
        // worker join command exists.
        if let Some(worker_join) = artifacts.worker_join_command.clone() {
            let certs_command =
                format!("{} kubeadm init phase upload-certs --upload-certs", sudo);
            match shell
                .exec(
                    &certs_command,
                    ExecOptions::with_timeout(timeout).sensitive(),
                )
                .await
            {
                Ok(result) if result.success => match last_output_line(&result.stdout) {
                    Some(certificate_key) => {
                        artifacts.control_plane_join_command = Some(
                            JoinArtifacts::control_plane_command(&worker_join, &certificate_key),
                        );
                    }
                    None => warnings.push(BootstrapWarning::ControlPlaneJoinUnavailable {
                        host: host_id.to_string(),
                        detail: "upload-certs printed no certificate key".to_string(),
                    }),
                },
                Ok(result) => warnings.push(BootstrapWarning::ControlPlaneJoinUnavailable {
                    host: host_id.to_string(),
                    detail: result.failure_detail(),
                }),
                Err(e) => warnings.push(BootstrapWarning::ControlPlaneJoinUnavailable {
                    host: host_id.to_string(),
                    detail: e.to_string(),
                }),
            }
        }

        InitializationOutcome {
            phase: PhaseOutcome::from_results(HashMap::from([(
                host_id.to_string(),
                init_result,
            )])),
            artifacts,
            warnings,
            fatal: None,
        }
    }

    async fn run_join(
        &self,
        joiners: &[HostDescriptor],
        artifacts: &JoinArtifacts,
    ) -> (PhaseOutcome, Vec<BootstrapWarning>) {
        tracing::info!("[Orchestrator] Joining {} host(s)", joiners.len());

        // Rewrite once per group; every host of a group runs the same text.
        let control_plane_command = artifacts
            .control_plane_join_command
            .as_deref()
            .map(|c| rewrite_join_command(c, &self.config.cri_socket));
        let worker_command = artifacts
            .worker_join_command
            .as_deref()
            .map(|c| rewrite_join_command(c, &self.config.cri_socket));

        let results = self
            .fan_out(joiners, |host| {
                let connector = Arc::clone(&self.connector);
                let retry = RetryExecutor::new(self.config.retry);
                let timeout = self.config.retry.per_attempt_timeout();
                let (group, command) = match host.role {
                    HostRole::AdditionalControlPlane => {
                        (JoinGroup::ControlPlane, control_plane_command.clone())
                    }
                    _ => (JoinGroup::Worker, worker_command.clone()),
                };
                async move {
                    let Some(command) = command else {
                        return ExecutionResult::skipped(format!(
                            "{} join command unavailable",
                            group
                        ));
                    };
                    let label = format!("{} join {}", group, host.id());
                    retry
                        .run(&label, || {
                            let connector = Arc::clone(&connector);
                            let host = host.clone();
                            let command = command.clone();
                            async move {
                                let mut shell = connector.connect(&host).await?;
                                let result = shell
                                    .exec(
                                        &command,
                                        ExecOptions::with_timeout(timeout).sensitive(),
                                    )
                                    .await;
                                shell.close().await;
                                result
                            }
                        })
                        .await
                }
            })
            .await;

        // One failure warning per group; each host keeps its own slot either
        // way, so a failed control-plane group never hides worker successes.
        let mut warnings = Vec::new();
        for (group, role) in [
            (JoinGroup::ControlPlane, HostRole::AdditionalControlPlane),
            (JoinGroup::Worker, HostRole::Worker),
        ] {
            let failures: Vec<_> = joiners
                .iter()
                .filter(|h| h.role == role)
                .filter_map(|h| {
                    let result = results.get(&h.id())?;
                    (!result.success).then(|| crate::error::HostFailure {
                        host: h.id(),
                        message: result.failure_detail(),
                    })
                })
                .collect();
            if !failures.is_empty() {
                tracing::warn!(
                    "[Orchestrator] {} join failed on {} host(s)",
                    group,
                    failures.len()
                );
                warnings.push(BootstrapWarning::JoinFailed { group, failures });
            }
        }

        (PhaseOutcome::from_results(results), warnings)
    }

    async fn run_verification(
        &self,
        expected: usize,
        artifacts: &JoinArtifacts,
    ) -> Vec<BootstrapWarning> {
        let Some(kubeconfig) = &artifacts.admin_kubeconfig else {
            return vec![BootstrapWarning::VerificationUnavailable {
                detail: "admin kubeconfig was not obtained".to_string(),
            }];
        };

        // Give freshly joined nodes time to report in before counting.
        tokio::time::sleep(self.config.settle_delay()).await;

        match self.query.list_nodes(kubeconfig).await {
            Ok(nodes) if nodes.len() == expected => {
                tracing::info!(
                    "[Orchestrator] Verification: cluster reports all {} node(s)",
                    expected
                );
                Vec::new()
            }
            Ok(nodes) => {
                tracing::warn!(
                    "[Orchestrator] Verification: cluster reports {} node(s), expected {}",
                    nodes.len(),
                    expected
                );
                vec![BootstrapWarning::VerificationMismatch {
                    expected,
                    actual: nodes.len(),
                }]
            }
            Err(e) => vec![BootstrapWarning::VerificationUnavailable {
                detail: e.to_string(),
            }],
        }
    }

    fn advance(&self, state: &mut ClusterBootstrapState, next: ClusterBootstrapState) {
        debug_assert!(state.can_advance_to(next), "{} -> {}", state, next);
        *state = next;
        let (percentage, message) = match next {
            ClusterBootstrapState::Preparing => (10, "Preparing host environments"),
            ClusterBootstrapState::Initializing => (40, "Initializing cluster on primary"),
            ClusterBootstrapState::TokensExtracted => (60, "Join artifacts extracted"),
            ClusterBootstrapState::Joining => (70, "Joining remaining hosts"),
            ClusterBootstrapState::Verifying => (90, "Verifying cluster membership"),
            ClusterBootstrapState::Complete => (100, "Bootstrap complete"),
            _ => (0, "Bootstrap starting"),
        };
        self.progress.emit_detailed(
            percentage,
            message.to_string(),
            Some(next.to_string()),
            None,
        );
    }

    fn fail(
        &self,
        state: &mut ClusterBootstrapState,
        mut report: BootstrapReport,
        error: BootstrapError,
    ) -> BootstrapReport {
        debug_assert!(state.can_advance_to(ClusterBootstrapState::Failed));
        *state = ClusterBootstrapState::Failed;
        self.progress.emit_detailed(
            100,
            format!("Bootstrap failed: {}", error),
            Some(state.to_string()),
            None,
        );
        report.state = *state;
        report.failure = Some(error);
        report
    }
}

/// Exactly one host must carry the primary role; anything else is rejected
/// before a single remote connection is opened.
fn validate_topology(hosts: &[HostDescriptor]) -> Result<&HostDescriptor, BootstrapError> {
    let primaries: Vec<&HostDescriptor> = hosts
        .iter()
        .filter(|h| h.role == HostRole::Primary)
        .collect();
    match primaries.as_slice() {
        [primary] => Ok(primary),
        [] => Err(BootstrapError::InvalidTopology(
            "no host is marked primary".to_string(),
        )),
        many => Err(BootstrapError::InvalidTopology(format!(
            "{} hosts are marked primary, expected exactly one",
            many.len()
        ))),
    }
}

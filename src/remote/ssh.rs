//! SSH transport implementation of the remote shell.
//!
//! libssh2 is a blocking API, so every transport call runs on the blocking
//! pool via `spawn_blocking`; the session object is moved into the closure
//! and handed back with the outcome. One `SshSession` owns exactly one
//! transport connection; sessions are never pooled or shared across hosts.

use crate::config::SshSettings;
use crate::error::TransportError;
use crate::host::{Credential, HostDescriptor};
use crate::remote::types::{ExecOptions, ExecutionResult, OutputChunk, RemoteConnector, RemoteShell};
use async_trait::async_trait;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::{Duration, Instant};

/// How long one blocking libssh2 call may stall before the exec loop gets
/// control back to re-check its deadline.
const POLL_TIMEOUT_MS: u32 = 500;

/// Read buffer for command output.
const READ_BUF_SIZE: usize = 16 * 1024;

/// Blocking window for SCP uploads; artifacts are small, a stalled transfer
/// should fail rather than hang the attempt.
const UPLOAD_TIMEOUT_MS: u32 = 60_000;

/// Opens [`SshSession`]s with shared transport settings.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    settings: SshSettings,
}

impl SshConnector {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn RemoteShell>, TransportError> {
        let session = SshSession::connect(host, &self.settings).await?;
        Ok(Box::new(session))
    }
}

/// One exclusive SSH connection to one host.
///
/// Lifecycle: connect → ready ⇄ executing → closed. Closed is terminal;
/// every call after [`RemoteShell::close`] fails with
/// [`TransportError::SessionClosed`].
pub struct SshSession {
    host_label: String,
    inner: Option<ssh2::Session>,
}

impl SshSession {
    /// Open and authenticate one transport connection, honoring the connect
    /// timeout and keep-alive settings.
    pub async fn connect(
        host: &HostDescriptor,
        settings: &SshSettings,
    ) -> Result<Self, TransportError> {
        let host_label = host.id();
        let username = host
            .username
            .clone()
            .unwrap_or_else(|| settings.default_username.clone());
        let credential = host.credential.resolve().map_err(|detail| {
            TransportError::Authentication {
                host: host_label.clone(),
                detail,
            }
        })?;

        let address = host.address.clone();
        let port = host.port;
        let connect_timeout = settings.connect_timeout();
        let connect_timeout_secs = settings.connect_timeout_secs;
        let keepalive_secs = settings.keepalive_interval_secs;
        let label = host_label.clone();

        tracing::debug!("[SshSession] Connecting to {}", host_label);

        let session = spawn_transport(move || {
            let addr = (address.as_str(), port)
                .to_socket_addrs()
                .map_err(|e| TransportError::Connect {
                    host: label.clone(),
                    detail: format!("address resolution failed: {}", e),
                })?
                .next()
                .ok_or_else(|| TransportError::Connect {
                    host: label.clone(),
                    detail: "address resolved to nothing".to_string(),
                })?;

            let tcp = TcpStream::connect_timeout(&addr, connect_timeout).map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    TransportError::ConnectTimeout {
                        host: label.clone(),
                        timeout_secs: connect_timeout_secs,
                    }
                } else {
                    TransportError::Connect {
                        host: label.clone(),
                        detail: e.to_string(),
                    }
                }
            })?;

            let mut session = ssh2::Session::new().map_err(|e| TransportError::Connect {
                host: label.clone(),
                detail: format!("session init failed: {}", e),
            })?;
            session.set_tcp_stream(tcp);
            session.set_timeout(connect_timeout.as_millis() as u32);
            session.handshake().map_err(|e| TransportError::Connect {
                host: label.clone(),
                detail: format!("handshake failed: {}", e),
            })?;
            session.set_keepalive(true, keepalive_secs as u32);

            authenticate(&session, &label, &username, &credential)?;

            Ok(session)
        })
        .await?;

        tracing::debug!("[SshSession] Connected to {}", host_label);
        Ok(Self {
            host_label,
            inner: Some(session),
        })
    }

    fn take_session(&mut self) -> Result<ssh2::Session, TransportError> {
        self.inner.take().ok_or_else(|| TransportError::SessionClosed {
            host: self.host_label.clone(),
        })
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    async fn exec(
        &mut self,
        command: &str,
        opts: ExecOptions,
    ) -> Result<ExecutionResult, TransportError> {
        let session = self.take_session()?;
        let label = self.host_label.clone();

        if opts.sensitive {
            tracing::debug!("[SshSession] {} exec: <sensitive command>", label);
        } else {
            tracing::debug!("[SshSession] {} exec: {}", label, command);
        }

        let command = command.to_string();
        let deadline = opts.timeout.map(|t| (Instant::now() + t, t));
        let output = opts.output;

        let (session, result) = spawn_transport(move || {
            let result = exec_blocking(&session, &label, &command, deadline, output);
            Ok((session, result))
        })
        .await?;

        self.inner = Some(session);
        result
    }

    async fn upload(
        &mut self,
        content: &[u8],
        remote_path: &str,
        mode: i32,
    ) -> Result<(), TransportError> {
        let session = self.take_session()?;
        let label = self.host_label.clone();
        let remote_path = remote_path.to_string();
        let content = content.to_vec();

        tracing::debug!(
            "[SshSession] {} upload: {} ({} bytes)",
            label,
            remote_path,
            content.len()
        );

        let (session, result) = spawn_transport(move || {
            let result = upload_blocking(&session, &label, &content, &remote_path, mode);
            Ok((session, result))
        })
        .await?;

        self.inner = Some(session);
        result
    }

    async fn close(&mut self) {
        if let Some(session) = self.inner.take() {
            let label = self.host_label.clone();
            let _ = spawn_transport(move || {
                let _ = session.disconnect(None, "session closed", None);
                Ok(())
            })
            .await;
            tracing::debug!("[SshSession] Closed session for {}", self.host_label);
        }
    }

    fn host(&self) -> &str {
        &self.host_label
    }
}

/// Run a blocking transport closure on the blocking pool.
async fn spawn_transport<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, TransportError> + Send + 'static,
) -> Result<T, TransportError> {
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(TransportError::Stream {
            host: String::new(),
            detail: format!("transport task failed: {}", e),
        }),
    }
}

fn authenticate(
    session: &ssh2::Session,
    host: &str,
    username: &str,
    credential: &Credential,
) -> Result<(), TransportError> {
    let auth_result = match credential {
        Credential::KeyMaterial(key) => {
            session.userauth_pubkey_memory(username, None, key, None)
        }
        Credential::KeyPath(path) => {
            session.userauth_pubkey_file(username, None, Path::new(path), None)
        }
        Credential::Password(password) => session.userauth_password(username, password),
    };

    auth_result.map_err(|e| TransportError::Authentication {
        host: host.to_string(),
        detail: e.to_string(),
    })?;

    if !session.authenticated() {
        return Err(TransportError::Authentication {
            host: host.to_string(),
            detail: "server rejected the credential".to_string(),
        });
    }
    Ok(())
}

/// Run one command to completion on an established session.
///
/// Channel setup failures happen before the command starts and surface as
/// transport errors; everything after that point (non-zero exit, timeout,
/// mid-stream faults) is folded into the result.
fn exec_blocking(
    session: &ssh2::Session,
    host: &str,
    command: &str,
    deadline: Option<(Instant, Duration)>,
    output: Option<tokio::sync::mpsc::Sender<OutputChunk>>,
) -> Result<ExecutionResult, TransportError> {
    // Short blocking window so the loop can re-check its deadline even when
    // the remote side produces no output for a while.
    session.set_timeout(POLL_TIMEOUT_MS);

    let mut channel = session
        .channel_session()
        .map_err(|e| TransportError::Stream {
            host: host.to_string(),
            detail: format!("channel open failed: {}", e),
        })?;
    channel.exec(command).map_err(|e| TransportError::Stream {
        host: host.to_string(),
        detail: format!("exec request failed: {}", e),
    })?;

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !(stdout_done && stderr_done) {
        if let Some((at, timeout)) = deadline {
            if Instant::now() >= at {
                // Forcibly tear the in-flight command down. The remote side
                // may keep running; the caller's retry path reconnects.
                let _ = channel.close();
                tracing::warn!(
                    "[SshSession] {} command timed out after {}s",
                    host,
                    timeout.as_secs()
                );
                return Ok(ExecutionResult::timed_out(timeout));
            }
        }

        if !stdout_done {
            match channel.read(&mut buf) {
                Ok(0) => stdout_done = true,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if let Some(sender) = &output {
                        let _ = sender.blocking_send(OutputChunk::Stdout(chunk.clone()));
                    }
                    stdout.push_str(&chunk);
                }
                Err(e) if is_poll_timeout(&e) => {}
                Err(e) => {
                    let _ = channel.close();
                    return Ok(ExecutionResult::transport_failure(format!(
                        "transport failure mid-stream: {}",
                        e
                    )));
                }
            }
        }

        if !stderr_done {
            match channel.stderr().read(&mut buf) {
                Ok(0) => stderr_done = true,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if let Some(sender) = &output {
                        let _ = sender.blocking_send(OutputChunk::Stderr(chunk.clone()));
                    }
                    stderr.push_str(&chunk);
                }
                Err(e) if is_poll_timeout(&e) => {}
                Err(e) => {
                    let _ = channel.close();
                    return Ok(ExecutionResult::transport_failure(format!(
                        "transport failure mid-stream: {}",
                        e
                    )));
                }
            }
        }
    }

    let _ = channel.close();
    let _ = channel.wait_close();
    let exit_code = channel.exit_status().unwrap_or(-1);

    if exit_code == 0 {
        Ok(ExecutionResult::ok(stdout, stderr))
    } else {
        Ok(ExecutionResult::command_failed(exit_code, stdout, stderr))
    }
}

fn upload_blocking(
    session: &ssh2::Session,
    host: &str,
    content: &[u8],
    remote_path: &str,
    mode: i32,
) -> Result<(), TransportError> {
    session.set_timeout(UPLOAD_TIMEOUT_MS);

    let upload_err = |detail: String| TransportError::Upload {
        host: host.to_string(),
        detail,
    };

    let mut remote_file = session
        .scp_send(Path::new(remote_path), mode, content.len() as u64, None)
        .map_err(|e| upload_err(format!("scp open failed: {}", e)))?;

    std::io::Write::write_all(&mut remote_file, content)
        .map_err(|e| upload_err(format!("write failed: {}", e)))?;

    remote_file
        .send_eof()
        .and_then(|_| remote_file.wait_eof())
        .and_then(|_| remote_file.close())
        .and_then(|_| remote_file.wait_close())
        .map_err(|e| upload_err(format!("finalize failed: {}", e)))?;

    Ok(())
}

/// Whether a read error is only the poll window elapsing (no data yet)
/// rather than a real transport fault.
fn is_poll_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

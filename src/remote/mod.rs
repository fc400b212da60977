//! Remote execution over SSH: sessions, retry discipline, script delivery.

pub mod retry;
pub mod script;
pub mod ssh;
pub mod types;

pub use retry::RetryExecutor;
pub use script::{Script, ScriptDeployer};
pub use ssh::{SshConnector, SshSession};
pub use types::{ExecOptions, ExecutionResult, OutputChunk, RemoteConnector, RemoteShell};

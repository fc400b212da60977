//! Embedded bootstrap scripts - compiled into the binary so the engine is
//! self-contained on machines that only carry the executable.

/// Default environment-preparation script run on every host in phase 1.
/// Idempotent by construction: the retry path re-runs it from scratch.
pub static PREPARE_NODE: &str = include_str!("scripts/prepare-node.sh");

/// Script name used for the remote file name and log labels.
pub const PREPARE_NODE_NAME: &str = "prepare-node.sh";

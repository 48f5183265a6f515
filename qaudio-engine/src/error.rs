//! Error types for the fallible internals.
//!
//! None of these ever reach the callers of the public engine operations: the
//! engine logs them and degrades to "no additional sound".

use thiserror::Error;

/// Offline loop render failures.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not allocate {frames} frames for the loop buffer")]
    Allocation { frames: usize },
    #[error("invalid loop spec: {0}")]
    InvalidSpec(&'static str),
    #[error("offline render worker went away before delivering a result")]
    WorkerLost,
    #[error("failed to spawn offline render worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Realtime output device failures.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output device refused to resume: {0}")]
    Resume(String),
}

//! Error types for the paging coordinator.

use std::path::PathBuf;
use thiserror::Error;

use crate::clock::SimClock;
use crate::process::Pid;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug)]
pub enum SimError {
    /// A launch parameter was missing, non-positive or otherwise unusable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The log destination could not be opened or the logger installed
    #[error("could not set up logging to {path}: {reason}")]
    LogSetup { path: PathBuf, reason: String },

    /// A request named a pid that has no process table entry
    #[error("request from unknown process {0}")]
    UnknownProcess(Pid),

    #[error("process {pid} addressed {address}, outside its {limit}-byte address space")]
    AddressOutOfRange { pid: Pid, address: u32, limit: usize },

    #[error("no free process table slot for a new worker")]
    ProcessTableFull,

    #[error("frame pool has no frames to evict")]
    EmptyFramePool,

    #[error("no worker with pid {0}")]
    NoSuchWorker(Pid),

    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    #[error("message transport failed: {0}")]
    Transport(String),

    /// Wall-clock watchdog fired before every worker finished
    #[error("timed out after {wall_secs}s of wall time at simulated time {clock}")]
    Timeout { wall_secs: u64, clock: SimClock },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

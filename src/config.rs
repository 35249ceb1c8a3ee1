use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::error::{Result, SimError};

/// Shape of simulated memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub frame_count: usize,
    pub page_count: usize,
    pub page_size: usize,
}

impl Geometry {
    /// First virtual address past the end of a process's address space
    #[inline]
    pub fn address_limit(&self) -> usize {
        self.page_count * self.page_size
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            frame_count: FRAME_COUNT,
            page_count: PAGE_COUNT,
            page_size: PAGE_SIZE,
        }
    }
}

/// Validated run parameters
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub total_workers: u32,
    pub simultaneous: u32,
    pub launch_interval_ms: u64,
    pub log_file: PathBuf,
    pub timeout: Duration,
    pub seed: Option<u64>,
    pub verbose: bool,
    pub geometry: Geometry,
    pub table_size: usize,
    /// Requested values that were lowered to the machine limits, reported
    /// once logging is up
    pub adjustments: Vec<String>,
}

impl SimConfig {
    /// Validate the launch parameters. All three must be positive; the
    /// totals are clamped to the machine limits.
    pub fn new(total: i64, simultaneous: i64, interval_ms: i64, log_file: PathBuf) -> Result<Self> {
        if total <= 0 || simultaneous <= 0 || interval_ms <= 0 {
            return Err(SimError::InvalidConfig(
                "all arguments for -n, -s, and -i must be positive integers".to_string(),
            ));
        }
        if log_file.as_os_str().is_empty() {
            return Err(SimError::InvalidConfig("a log file must be named with -f".to_string()));
        }

        if interval_ms as u64 > u64::MAX / NANOS_PER_MILLI {
            return Err(SimError::InvalidConfig(format!(
                "launch interval -i {} ms is too large",
                interval_ms
            )));
        }

        let mut adjustments = Vec::new();
        let total_workers = clamp(total, MAX_TOTAL_WORKERS, "total workers", &mut adjustments);
        let simultaneous =
            clamp(simultaneous, MAX_SIMULTANEOUS, "simultaneous workers", &mut adjustments);

        Ok(SimConfig {
            total_workers,
            simultaneous,
            launch_interval_ms: interval_ms as u64,
            log_file,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            seed: None,
            verbose: false,
            geometry: Geometry::default(),
            table_size: MAX_PROCS,
            adjustments,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    #[inline]
    pub fn launch_interval_nanos(&self) -> u64 {
        self.launch_interval_ms.saturating_mul(NANOS_PER_MILLI)
    }
}

fn clamp(value: i64, max: u32, what: &str, adjustments: &mut Vec<String>) -> u32 {
    if value > max as i64 {
        adjustments.push(format!("{} limited to {} (asked for {})", what, max, value));
        max
    } else {
        value as u32
    }
}

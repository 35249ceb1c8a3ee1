use std::fmt::{self, Write as _};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{LevelFilter, Record};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;
use log4rs::filter::{Filter, Response};

use crate::clock::SimClock;
use crate::constants::*;
use crate::error::{Result, SimError};
use crate::state::{SimulationState, Stats};

/// Stops letting records through once `limit` lines have been written
#[derive(Debug)]
pub struct LineCapFilter {
    limit: usize,
    written: AtomicUsize,
}

impl LineCapFilter {
    pub fn new(limit: usize) -> Self {
        LineCapFilter {
            limit,
            written: AtomicUsize::new(0),
        }
    }
}

impl Filter for LineCapFilter {
    fn filter(&self, record: &Record) -> Response {
        let lines = record.args().to_string().lines().count().max(1);
        if self.written.fetch_add(lines, Ordering::Relaxed) < self.limit {
            Response::Neutral
        } else {
            Response::Reject
        }
    }
}

/// Route coordinator logging to the console and to `path`.
///
/// The file receives everything at info and above, capped at
/// `MAX_LOG_LINES`. The console only shows warnings unless `verbose`.
pub fn init_logging(path: &Path, verbose: bool) -> Result<log4rs::Handle> {
    let setup_error = |reason: String| SimError::LogSetup {
        path: path.to_path_buf(),
        reason,
    };

    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .append(false)
        .build(path)
        .map_err(|e| setup_error(e.to_string()))?;
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{h({l})} {m}{n}")))
        .build();

    let console_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    let root_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(console_level)))
                .build("console", Box::new(console)),
        )
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Info)))
                .filter(Box::new(LineCapFilter::new(MAX_LOG_LINES)))
                .build("file", Box::new(file)),
        )
        .build(
            Root::builder()
                .appender("console")
                .appender("file")
                .build(root_level),
        )
        .map_err(|e| setup_error(e.to_string()))?;

    log4rs::init_config(config).map_err(|e| setup_error(e.to_string()))
}

/// Process table dump, one row per slot
pub fn render_process_table(state: &SimulationState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "OSS SysClock: {}", state.clock);
    let _ = writeln!(out, "Process Table:");
    let _ = writeln!(
        out,
        "{:>5}{:>10}{:>10}{:>12}{:>12}{:>10}",
        "Entry", "Occupied", "PID", "StartS", "StartN", "MsgsSent"
    );
    for (slot, process) in state.processes.entries() {
        match process {
            Some(p) => {
                let _ = writeln!(
                    out,
                    "{:>5}{:>10}{:>10}{:>12}{:>12}{:>10}",
                    slot.0,
                    1,
                    p.pid,
                    p.start_time.seconds(),
                    p.start_time.nanos(),
                    p.messages_sent
                );
            }
            None => {
                let _ = writeln!(out, "{:>5}{:>10}{:>10}{:>12}{:>12}{:>10}", slot.0, 0, 0, 0, 0, 0);
            }
        }
    }
    out
}

/// Frame table dump followed by the page tables of live processes
pub fn render_frame_table(state: &SimulationState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Current memory layout at time {} is:", state.clock);
    let _ = writeln!(
        out,
        "{:>8}{:>10}{:>10}{:>10}{:>15}{:>15}",
        "Frame", "PID", "Page", "Dirty", "LastRefS", "LastRefNano"
    );
    for (index, frame) in state.frames.iter() {
        match frame.mapping {
            Some(mapping) => {
                let _ = writeln!(
                    out,
                    "{:>8}{:>10}{:>10}{:>10}{:>15}{:>15}",
                    index.0,
                    mapping.owner,
                    mapping.page,
                    u8::from(frame.dirty),
                    frame.last_reference.seconds(),
                    frame.last_reference.nanos()
                );
            }
            None => {
                let _ = writeln!(out, "{:>8} (empty)", index.0);
            }
        }
    }

    let _ = writeln!(out, "Page Tables:");
    for (slot, process) in state.processes.iter() {
        let entries: Vec<String> = (0..process.page_table.len())
            .map(|page| match process.page_table.get(page) {
                Some(frame) => frame.to_string(),
                None => "-".to_string(),
            })
            .collect();
        let _ = writeln!(out, "{}: [ {} ]", slot, entries.join(" "));
    }
    out
}

/// End-of-run report
#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub stats: Stats,
    pub clock: SimClock,
    pub wall: Duration,
}

impl Summary {
    /// Accesses per second of wall time
    pub fn access_rate(&self) -> f64 {
        let secs = self.wall.as_secs_f64();
        if secs > 0.0 {
            self.stats.memory_accesses as f64 / secs
        } else {
            0.0
        }
    }

    /// Faults per access
    pub fn fault_rate(&self) -> f64 {
        if self.stats.memory_accesses > 0 {
            self.stats.page_faults as f64 / self.stats.memory_accesses as f64
        } else {
            0.0
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===PROGRAM SUMMARY===")?;
        writeln!(f, "Simulated Time: {}", self.clock)?;
        writeln!(f, "Processes Launched: {}", self.stats.launched)?;
        writeln!(f, "Normal Terminations: {}", self.stats.normal_terminations)?;
        writeln!(f, "Messages Sent: {}", self.stats.messages_sent)?;
        writeln!(f, "Memory Accesses: {}", self.stats.memory_accesses)?;
        writeln!(f, "Page Faults: {}", self.stats.page_faults)?;
        writeln!(f, "Memory Access Rate: {:.2} accesses/sec", self.access_rate())?;
        write!(f, "Page Fault Rate: {:.4} faults/access", self.fault_rate())
    }
}

//! oss: paging coordinator entry point.
//!
//! Usage: oss -n <total> -s <simultaneous> -i <interval_ms> -f <logfile> [OPTIONS]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use clap::error::ErrorKind;
use log::{info, warn};

use vm_paging_sim::io::{init_logging, Summary};
use vm_paging_sim::worker::{ThreadRuntime, WorkerProfile};
use vm_paging_sim::{ClockRegion, Result, SimConfig, VmManager, DEFAULT_TIMEOUT_SECS};

#[derive(Parser)]
#[command(name = "oss")]
#[command(about = "Simulated virtual memory with paging, LRU replacement and worker processes")]
#[command(version)]
struct Cli {
    /// Total number of workers to launch
    #[arg(short = 'n', allow_negative_numbers = true)]
    total: i64,

    /// Maximum number of workers running at once
    #[arg(short = 's', allow_negative_numbers = true)]
    simultaneous: i64,

    /// Simulated milliseconds between launches
    #[arg(short = 'i', allow_negative_numbers = true)]
    interval: i64,

    /// Log file for coordinator output
    #[arg(short = 'f')]
    log_file: PathBuf,

    /// Wall-clock seconds before every worker is forcibly stopped
    #[arg(short = 't', long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Random seed for reproducible workers
    #[arg(long)]
    seed: Option<u64>,

    /// Show debug output on the console
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    match run(cli) {
        Ok(summary) => println!("{}", summary),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<Summary> {
    let config = SimConfig::new(cli.total, cli.simultaneous, cli.interval, cli.log_file)?
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_seed(cli.seed)
        .with_verbose(cli.verbose);
    let _logger = init_logging(&config.log_file, config.verbose)?;
    for adjustment in &config.adjustments {
        warn!("OSS: {}", adjustment);
    }

    info!(
        "OSS: starting with {} workers, {} at once, launching every {}ms",
        config.total_workers, config.simultaneous, config.launch_interval_ms
    );

    let region = Arc::new(ClockRegion::new());
    let mut runtime = ThreadRuntime::new(
        WorkerProfile::for_geometry(&config.geometry),
        Arc::clone(&region),
        config.seed,
    );
    let mut manager = VmManager::new(&config, region);

    let started = Instant::now();
    let stats = manager.run(&mut runtime)?;
    let summary = Summary {
        stats,
        clock: manager.state().clock,
        wall: started.elapsed(),
    };
    info!("{}", summary);
    Ok(summary)
}

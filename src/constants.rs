// geometry of the simulated machine
pub const FRAME_COUNT: usize = 256;
pub const PAGE_COUNT: usize = 32;
pub const PAGE_SIZE: usize = 1024;
pub const ADDRESS_SPACE: usize = PAGE_COUNT * PAGE_SIZE;

// process table slots; the concurrency cap must stay below this
pub const MAX_PROCS: usize = 20;
pub const MAX_TOTAL_WORKERS: u32 = 100;
pub const MAX_SIMULTANEOUS: u32 = 18;

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Simulated time handed out per dispatch tick, shared across active workers.
pub const TICK_NANOS: u64 = 250 * NANOS_PER_MILLI;
/// Cost of a resident access.
pub const ACCESS_NANOS: u64 = 100;
/// Fault service, dirty write-back and load-in all cost the same disk trip.
pub const FAULT_NANOS: u64 = 14 * NANOS_PER_MILLI;
pub const WRITE_BACK_NANOS: u64 = FAULT_NANOS;
pub const LOAD_NANOS: u64 = FAULT_NANOS;

pub const SNAPSHOT_INTERVAL_NANOS: u64 = 500 * NANOS_PER_MILLI;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const MAX_LOG_LINES: usize = 10_000;

// wire-level values of the message protocol
pub const REQUEST_TAG: i64 = 1;
pub const STATUS_OK: i64 = 0;
pub const STATUS_TERMINATE: i64 = -1;

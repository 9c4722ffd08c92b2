/// Lowest number of misses a block scan tolerates before it stops.
pub const MIN_STOP_THRESHOLD: u64 = 10;

/// Share of the estimated rows per block that may come back empty before a block is considered exhausted.
pub const STOP_THRESHOLD_RATIO: f64 = 0.10;

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_ID_COLUMN: &str = "id";
pub const DEFAULT_ID_POSITION: usize = 1;

pub(crate) const LOG_FILE_SUFFIX: &str = "pgsearchcorrupt.log";

/// Log label of everything that is not a worker.
pub const MAIN_LABEL: &str = "main";

pub mod core;

pub mod configuration;
pub mod error;
pub mod logging;

use std::fmt;

use tokio::sync::mpsc::UnboundedSender;

use super::scanner::ScanSummary;

/// Per-block results forwarded by the workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanEvent {
    BlockScanned { worker: usize, summary: ScanSummary },
    BlockFailed { worker: usize, block: u64, message: String },
}

pub type EventSender = UnboundedSender<ScanEvent>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub blocks_scanned: u64,
    pub blocks_failed: u64,
    pub slots_probed: u64,
    pub rows_found: u64,
    pub query_errors: u64,
    pub corrupted: u64,
    /// The worker stopped early because its connection was lost.
    pub aborted: bool,
    /// The worker stopped early because shutdown was requested.
    pub interrupted: bool,
}

impl WorkerReport {
    pub fn new(worker: usize) -> Self {
        Self {
            worker,
            ..Default::default()
        }
    }

    pub fn add_summary(&mut self, summary: &ScanSummary) {
        self.blocks_scanned += 1;
        self.slots_probed += summary.last_slot_probed as u64;
        self.rows_found += summary.found_count;
        self.query_errors += summary.error_count;
        self.corrupted += summary.corrupted_count;
    }

    /// Tuples whose full read failed, whether or not their identifier was recovered.
    pub fn damaged_tuples(&self) -> u64 {
        self.query_errors + self.corrupted
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub workers: Vec<WorkerReport>,
    /// Blocks left out by the partition.
    pub unassigned_blocks: u64,
}

impl RunReport {
    pub fn blocks_scanned(&self) -> u64 {
        self.workers.iter().map(|w| w.blocks_scanned).sum()
    }

    pub fn blocks_failed(&self) -> u64 {
        self.workers.iter().map(|w| w.blocks_failed).sum()
    }

    pub fn rows_found(&self) -> u64 {
        self.workers.iter().map(|w| w.rows_found).sum()
    }

    pub fn query_errors(&self) -> u64 {
        self.workers.iter().map(|w| w.query_errors).sum()
    }

    pub fn corrupted(&self) -> u64 {
        self.workers.iter().map(|w| w.corrupted).sum()
    }

    pub fn workers_aborted(&self) -> usize {
        self.workers.iter().filter(|w| w.aborted).count()
    }

    pub fn is_complete(&self) -> bool {
        self.unassigned_blocks == 0 && self.workers.iter().all(|w| !w.aborted && !w.interrupted)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Blocks scanned..........: {}", self.blocks_scanned())?;
        writeln!(f, "Blocks failed...........: {}", self.blocks_failed())?;
        writeln!(f, "Blocks unassigned.......: {}", self.unassigned_blocks)?;
        writeln!(f, "Rows found..............: {}", self.rows_found())?;
        writeln!(f, "Query errors (ID known).: {}", self.query_errors())?;
        writeln!(f, "Corrupted (ID unknown)..: {}", self.corrupted())?;
        write!(f, "Workers aborted.........: {}", self.workers_aborted())
    }
}

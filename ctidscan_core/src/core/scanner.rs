//! Walks the slots of a single heap block.
//!
//! A ctid lookup cannot tell "past the last tuple" apart from "unused line
//! pointer", so the end of a block is inferred: once more slots came back empty
//! than a tenth of the expected row density (never less than ten) the block is
//! considered exhausted.

use log::debug;

use crate::{MIN_STOP_THRESHOLD, STOP_THRESHOLD_RATIO};

use super::{
    address::TupleAddress,
    probe::{BlockProbe, ProbeOutcome},
    session::{Session, SessionResult},
};

/// How misses count towards the stop threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissCounting {
    /// Every miss since the start of the block counts; found rows never reset the count.
    #[default]
    Cumulative,
    /// Only misses since the last found row count.
    Consecutive,
}

/// Result of scanning one block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub block: u64,
    pub last_slot_probed: u32,
    pub empty_count: u64,
    pub found_count: u64,
    pub error_count: u64,
    pub corrupted_count: u64,
}

#[derive(Debug)]
struct BlockScanState {
    slot_index: u32,
    found_count: u64,
    empty_streak: u64,
    empty_total: u64,
    error_count: u64,
    corrupted_count: u64,
}

impl BlockScanState {
    fn new() -> Self {
        Self {
            slot_index: 1,
            found_count: 0,
            empty_streak: 0,
            empty_total: 0,
            error_count: 0,
            corrupted_count: 0,
        }
    }

    fn record(&mut self, outcome: &ProbeOutcome, counting: MissCounting) {
        match outcome {
            ProbeOutcome::Found(_) => {
                self.found_count += 1;
                if counting == MissCounting::Consecutive {
                    self.empty_streak = 0;
                }
            }
            ProbeOutcome::Empty => self.miss(),
            ProbeOutcome::QueryError(_) => {
                self.error_count += 1;
                self.miss();
            }
            ProbeOutcome::CorruptedConfirmed => {
                self.corrupted_count += 1;
                self.miss();
            }
        }

        self.slot_index += 1;
    }

    fn miss(&mut self) {
        self.empty_streak += 1;
        self.empty_total += 1;
    }

    fn into_summary(self, block: u64) -> ScanSummary {
        ScanSummary {
            block,
            last_slot_probed: self.slot_index - 1,
            empty_count: self.empty_total,
            found_count: self.found_count,
            error_count: self.error_count,
            corrupted_count: self.corrupted_count,
        }
    }
}

/// Number of misses a block tolerates: 10% of the expected rows per block, at least 10.
pub fn stop_threshold(estimated_rows_per_block: f64) -> u64 {
    let share = (STOP_THRESHOLD_RATIO * estimated_rows_per_block).ceil();
    if share.is_finite() && share > MIN_STOP_THRESHOLD as f64 {
        share as u64
    } else {
        MIN_STOP_THRESHOLD
    }
}

pub struct BlockScanner {
    probe: BlockProbe,
    stop_threshold: u64,
    counting: MissCounting,
}

impl BlockScanner {
    pub fn new(probe: BlockProbe, estimated_rows_per_block: f64, counting: MissCounting) -> Self {
        Self {
            probe,
            stop_threshold: stop_threshold(estimated_rows_per_block),
            counting,
        }
    }

    pub fn stop_threshold(&self) -> u64 {
        self.stop_threshold
    }

    pub fn label(&self) -> &str {
        self.probe.label()
    }

    /// Probes slots `1, 2, …` of `block` until the miss count exceeds the stop threshold.
    pub async fn scan_block<S: Session>(&self, session: &mut S, block: u64) -> SessionResult<ScanSummary> {
        let mut state = BlockScanState::new();

        while state.empty_streak <= self.stop_threshold {
            let address = TupleAddress::new(block, state.slot_index);
            let outcome = self.probe.probe(session, address).await?;
            state.record(&outcome, self.counting);
        }

        debug!(
            "{}|Blk:{} stopped after {} misses (threshold {})",
            self.probe.label(),
            block,
            state.empty_streak,
            self.stop_threshold
        );

        Ok(state.into_summary(block))
    }
}

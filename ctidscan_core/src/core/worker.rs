use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{error, info, warn};

use super::{
    address::BlockRange,
    report::{EventSender, ScanEvent, WorkerReport},
    scanner::BlockScanner,
    session::{Session, SessionResult},
};

/// Sweeps the block ranges assigned to one worker over one session.
pub struct WorkerRunner {
    index: usize,
    scanner: BlockScanner,
    shutdown: Arc<AtomicBool>,
    events: Option<EventSender>,
}

impl WorkerRunner {
    pub fn new(index: usize, scanner: BlockScanner) -> Self {
        Self {
            index,
            scanner,
            shutdown: Arc::new(AtomicBool::new(false)),
            events: None,
        }
    }

    /// Checked between blocks; a block that is being scanned always finishes.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        self.scanner.label()
    }

    /// Scans every block of `ranges`, last range first.
    ///
    /// A block that fails is logged and skipped. Only a lost connection ends the
    /// sweep early.
    pub async fn run<S: Session>(&self, mut session: S, ranges: Vec<BlockRange>) -> WorkerReport {
        let mut report = WorkerReport::new(self.index);
        let name = self.name();

        info!(
            "{}|Starting {} ranges, {} blocks, stop threshold {}",
            name,
            ranges.len(),
            ranges.iter().map(BlockRange::len).sum::<u64>(),
            self.scanner.stop_threshold()
        );

        'ranges: for range in ranges.iter().rev() {
            for block in range.blocks() {
                if self.shutdown.load(Ordering::Relaxed) {
                    warn!("{}|Shutdown requested, stopping before block {}", name, block);
                    report.interrupted = true;
                    break 'ranges;
                }

                match self.scanner.scan_block(&mut session, block).await {
                    Ok(summary) => {
                        info!(
                            "{}|Blk:{} Recs:{}: Q0:{} CTIDs:{} Erros:{} Corrupted:{}",
                            name,
                            summary.block,
                            summary.last_slot_probed,
                            summary.empty_count,
                            summary.found_count,
                            summary.error_count,
                            summary.corrupted_count
                        );
                        report.add_summary(&summary);
                        self.emit(ScanEvent::BlockScanned {
                            worker: self.index,
                            summary,
                        });

                        if !self.end_transaction(session.commit().await, block) {
                            report.aborted = true;
                            break 'ranges;
                        }
                    }
                    Err(e) => {
                        error!("{}|ERROR scanning block {} - {}", name, block, e);
                        report.blocks_failed += 1;
                        self.emit(ScanEvent::BlockFailed {
                            worker: self.index,
                            block,
                            message: e.to_string(),
                        });

                        if e.is_connection_lost() || !self.end_transaction(session.rollback().await, block) {
                            report.aborted = true;
                            break 'ranges;
                        }
                    }
                }
            }
        }

        if report.aborted {
            error!("{}|Connection lost, worker stops", name);
        } else if let Err(e) = session.close().await {
            warn!("{}|Closing session failed: {}", name, e);
        }

        info!(
            "{}|Finished: blocks {} failed {} rows {} errors {} corrupted {}",
            name,
            report.blocks_scanned,
            report.blocks_failed,
            report.rows_found,
            report.query_errors,
            report.corrupted
        );

        report
    }

    // false when the session cannot be used any more
    fn end_transaction(&self, result: SessionResult<()>, block: u64) -> bool {
        match result {
            Ok(()) => true,
            Err(e) if e.is_connection_lost() => false,
            Err(e) => {
                error!("{}|Ending transaction after block {} failed: {}", self.name(), block, e);
                true
            }
        }
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(events) = &self.events {
            _ = events.send(event);
        }
    }
}

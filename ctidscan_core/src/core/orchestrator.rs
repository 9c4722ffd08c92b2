use std::sync::{Arc, atomic::AtomicBool};

use futures::future::join_all;
use log::{error, info, warn};

use crate::{
    MAIN_LABEL,
    configuration::Configuration,
    error::CtidScanResult,
};

use super::{
    partition::{PartitionPlan, partition_plan},
    probe::BlockProbe,
    report::{EventSender, RunReport, WorkerReport},
    scanner::BlockScanner,
    session::{Connector, Session},
    statistics::{TableStatistics, fetch_table_statistics},
    worker::WorkerRunner,
};

/// Everything decided before the first worker starts.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepPlan {
    pub statistics: TableStatistics,
    pub total_blocks: u64,
    pub rows_per_block: f64,
    pub partition: PartitionPlan,
}

/// Looks up the table, partitions it and runs one worker task per partition.
pub struct Orchestrator<C: Connector> {
    connector: Arc<C>,
    config: Configuration,
    shutdown: Arc<AtomicBool>,
    events: Option<EventSender>,
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(connector: C, config: Configuration) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Flag shared with every worker. Setting it stops the sweep between blocks.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub async fn plan(&self) -> CtidScanResult<SweepPlan> {
        self.config.validate()?;

        let mut session = self.connector.connect(MAIN_LABEL).await?;
        let statistics = fetch_table_statistics(&mut session, &self.config.schema, &self.config.table).await;
        if let Err(e) = session.close().await {
            warn!("main|Closing metadata session failed: {}", e);
        }
        let statistics = statistics?;

        let total_blocks = match self.config.blocks {
            Some(blocks) if blocks > 0 => blocks,
            _ => statistics.total_blocks,
        };
        let rows_per_block = self
            .config
            .rows_per_block
            .unwrap_or_else(|| statistics.rows_per_block());

        info!("main|schema: {}", self.config.schema);
        info!("main|database: {}", self.config.connection.database);
        info!("main|table: {}", self.config.table);
        info!("main|Blocks/Pages: {}", statistics.total_blocks);
        info!("main|Postgre Estimate Records: {}", statistics.estimated_rows);
        info!("main|Estimate Records/Pages: {:.2}", statistics.rows_per_block());

        let partition = partition_plan(total_blocks, self.config.workers, self.config.tail_policy);

        info!("main|ranges: {:?}", partition.workers);
        if let Some(dropped) = partition.dropped {
            warn!(
                "main|Blocks {} ({} blocks) are not assigned to any worker and will not be scanned",
                dropped,
                dropped.len()
            );
        }

        Ok(SweepPlan {
            statistics,
            total_blocks,
            rows_per_block,
            partition,
        })
    }

    pub async fn run(&self) -> CtidScanResult<RunReport> {
        let plan = self.plan().await?;
        self.execute(plan).await
    }

    /// Spawns one task per worker list in `plan` and waits for all of them.
    pub async fn execute(&self, plan: SweepPlan) -> CtidScanResult<RunReport> {
        let mut handles = Vec::with_capacity(plan.partition.workers.len());

        for (index, ranges) in plan.partition.workers.into_iter().enumerate() {
            let connector = Arc::clone(&self.connector);
            let runner = self.runner(index, plan.rows_per_block);

            handles.push(tokio::spawn(async move {
                match connector.connect(runner.name()).await {
                    Ok(session) => runner.run(session, ranges).await,
                    Err(e) => {
                        error!("{}|Could not open session: {}", runner.name(), e);
                        let mut report = WorkerReport::new(index);
                        report.aborted = true;
                        report
                    }
                }
            }));
        }

        let mut workers = Vec::with_capacity(handles.len());
        for (index, result) in join_all(handles).await.into_iter().enumerate() {
            match result {
                Ok(report) => workers.push(report),
                Err(e) => {
                    error!("CB{}|Worker task failed: {}", index, e);
                    let mut report = WorkerReport::new(index);
                    report.aborted = true;
                    workers.push(report);
                }
            }
        }

        let report = RunReport {
            workers,
            unassigned_blocks: plan.partition.dropped.map(|r| r.len()).unwrap_or(0),
        };

        info!(
            "main|Finished: blocks {} failed {} rows {} errors {} corrupted {} aborted workers {}",
            report.blocks_scanned(),
            report.blocks_failed(),
            report.rows_found(),
            report.query_errors(),
            report.corrupted(),
            report.workers_aborted()
        );

        Ok(report)
    }

    fn runner(&self, index: usize, rows_per_block: f64) -> WorkerRunner {
        let probe = BlockProbe::new(
            &self.config.schema,
            &self.config.table,
            &self.config.id_column,
            self.config.id_position,
        )
        .with_label(format!("CB{}", index));

        let scanner = BlockScanner::new(probe, rows_per_block, self.config.miss_counting);
        let runner = WorkerRunner::new(index, scanner).with_shutdown(Arc::clone(&self.shutdown));

        match &self.events {
            Some(events) => runner.with_events(events.clone()),
            None => runner,
        }
    }
}

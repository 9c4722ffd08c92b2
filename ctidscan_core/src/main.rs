use std::sync::atomic::Ordering;

use clap::Parser;
use log::{LevelFilter, debug, warn};
use tokio::runtime::Builder;

use ctidscan_core::{
    DEFAULT_ID_COLUMN, DEFAULT_ID_POSITION, DEFAULT_WORKERS,
    configuration::{Configuration, ConnectionParams, parse_log_level, parse_switch},
    core::{
        orchestrator::Orchestrator, partition::TailPolicy, postgres::PgConnector,
        scanner::MissCounting,
    },
    error::CtidScanResult,
    logging::init_logging,
};

// 128 + SIGINT
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Identify corrupted records of a PostgreSQL table by reading them one by one
/// through their ctid. OFFSET and LIMIT are never used.
///
/// Block count and row estimate are taken from pg_class.
#[derive(Parser, Debug)]
#[command(name = "ctidscan", version, about, long_about)]
struct Args {
    /// Database name
    database: String,

    /// Schema of the table
    schema: String,

    /// Table name
    table: String,

    /// Number of concurrent workers, one connection each (default: 2)
    #[arg(long, alias = "cpus", value_name = "N")]
    workers: Option<usize>,

    /// Number of blocks to scan, 0 takes relpages from pg_class (default: 0)
    #[arg(long, value_name = "N")]
    blocks: Option<u64>,

    /// Expected rows per block, sizes the stop threshold (default: reltuples / relpages)
    #[arg(long = "rows-per-block", value_name = "N")]
    rows_per_block: Option<f64>,

    /// Server host (default: 127.0.0.1)
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port (default: 5432)
    #[arg(long, default_value_t = 5432)]
    port: u16,

    /// User name
    #[arg(long)]
    user: Option<String>,

    /// Password
    #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Identifier column read when a row cannot be read in full (default: id)
    #[arg(long = "id-column", value_name = "COLUMN")]
    id_column: Option<String>,

    /// Position of the identifier in `SELECT ctid, *` (default: 1)
    #[arg(long = "id-position", value_name = "N")]
    id_position: Option<usize>,

    /// Hand the trailing partition group to the workers instead of leaving it unscanned
    #[arg(long = "redistribute-tail")]
    redistribute_tail: bool,

    /// Reset the miss count whenever a row is found
    #[arg(long = "consecutive-misses")]
    consecutive_misses: bool,

    /// Logging level off, critical, error, warning, info, debug, trace (default: error)
    #[arg(long = "log-level", alias = "loglevel", value_name = "LEVEL", value_parser = parse_log_level)]
    log_level: Option<LevelFilter>,

    /// Write the log to a timestamped file instead of stderr, yes or no (default: no)
    #[arg(long = "log-to-file", alias = "islogtofile", value_name = "BOOL", value_parser = parse_switch)]
    log_to_file: Option<bool>,
}

impl Args {
    fn into_configuration(self) -> Configuration {
        let connection = ConnectionParams {
            database: self.database,
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
        };

        let mut config = Configuration::new(connection, self.schema, self.table);
        config.workers = self.workers.unwrap_or(DEFAULT_WORKERS);
        config.blocks = self.blocks.filter(|b| *b > 0);
        config.rows_per_block = self.rows_per_block;
        config.id_column = self.id_column.unwrap_or_else(|| DEFAULT_ID_COLUMN.to_string());
        config.id_position = self.id_position.unwrap_or(DEFAULT_ID_POSITION);
        if self.redistribute_tail {
            config.tail_policy = TailPolicy::Redistribute;
        }
        if self.consecutive_misses {
            config.miss_counting = MissCounting::Consecutive;
        }
        config.log_level = self.log_level.unwrap_or(LevelFilter::Error);
        config.log_to_file = self.log_to_file.unwrap_or(false);
        config
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args.into_configuration()) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: Configuration) -> CtidScanResult<()> {
    config.validate()?;

    let log_file = init_logging(config.log_level, config.log_to_file)?;
    debug!(
        "main|Workers {} blocks {:?} rows/block {:?} tail {:?} misses {:?}",
        config.workers, config.blocks, config.rows_per_block, config.tail_policy, config.miss_counting
    );

    // worker tasks plus the connection drivers
    let rt = Builder::new_multi_thread()
        .worker_threads(config.workers + 1)
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let connector = PgConnector::new(config.connection.clone());
        let orchestrator = Orchestrator::new(connector, config);

        let plan = orchestrator.plan().await?;
        let config = orchestrator.config();

        println!("schema..................: {}", config.schema);
        println!("database................: {}", config.connection.database);
        println!("table...................: {}", config.table);
        println!("Blocks/Pages ...........: {}", plan.statistics.total_blocks);
        println!("Postgre Estimate Records: {}", plan.statistics.estimated_rows);
        println!("Estimate Records/Pages..: {:.2}", plan.statistics.rows_per_block());
        println!("Blocks to scan..........: {}", plan.partition.assigned_blocks());
        if let Some(name) = &log_file {
            println!("log File ...............: {}", name);
        }

        let shutdown = orchestrator.shutdown_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("main|Interrupted, workers stop after their current block. Press Ctrl-C again to quit now");
            shutdown.store(true, Ordering::Relaxed);

            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("main|Interrupted twice, exiting");
                eprintln!("Interrupted");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        });

        let report = orchestrator.execute(plan).await?;
        println!("{}", report);

        Ok(())
    })
}

use std::{fs::File, io::Write};

use env_logger::{Builder, Target};
use log::LevelFilter;
use time::{OffsetDateTime, macros::format_description};

use crate::{
    LOG_FILE_SUFFIX, MAIN_LABEL,
    error::{CtidScanError, CtidScanResult},
};

/// Installs the global logger.
///
/// Lines look like `timestamp|worker|LEVEL|message`. Messages are logged as
/// `worker|message`; anything without a worker prefix is attributed to `main`.
/// With `log_to_file` the output goes to a new file named after the current
/// minute, which is returned.
pub fn init_logging(level: LevelFilter, log_to_file: bool) -> CtidScanResult<Option<String>> {
    let mut builder = Builder::new();
    builder.filter_level(level).format(|buf, record| {
        let message = record.args().to_string();
        let (worker, text) = split_worker(&message);
        writeln!(buf, "{}|{}|{}|{}", buf.timestamp(), worker, record.level(), text)
    });

    let file_name = if log_to_file {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let name = log_file_name(now)?;
        let file = File::create(&name)?;
        builder.target(Target::Pipe(Box::new(file)));
        Some(name)
    } else {
        builder.target(Target::Stderr);
        None
    };

    builder
        .try_init()
        .map_err(|e| CtidScanError::Config(format!("logger already initialized: {}", e)))?;

    Ok(file_name)
}

pub fn log_file_name(at: OffsetDateTime) -> CtidScanResult<String> {
    let stamp = at
        .format(format_description!("[year][month][day]_[hour][minute]"))
        .map_err(|e| CtidScanError::Config(format!("cannot format log file name: {}", e)))?;

    Ok(format!("{}_{}", stamp, LOG_FILE_SUFFIX))
}

/// Splits `worker|message` into its two parts.
pub fn split_worker(message: &str) -> (&str, &str) {
    match message.split_once('|') {
        Some((worker, text)) if !worker.is_empty() && !worker.contains(char::is_whitespace) => {
            (worker, text)
        }
        _ => (MAIN_LABEL, message),
    }
}

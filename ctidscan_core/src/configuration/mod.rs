use log::LevelFilter;

use crate::{
    DEFAULT_ID_COLUMN, DEFAULT_ID_POSITION, DEFAULT_WORKERS,
    core::{partition::TailPolicy, scanner::MissCounting},
    error::{CtidScanError, CtidScanResult},
};

#[derive(Clone, Debug)]
pub struct ConnectionParams {
    pub database: String,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ConnectionParams {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: None,
            password: None,
        }
    }

    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .dbname(&self.database)
            .host(&self.host)
            .port(self.port)
            .application_name("ctidscan");

        if let Some(user) = &self.user {
            config.user(user);
        }

        if let Some(password) = &self.password {
            config.password(password);
        }

        config
    }
}

#[derive(Clone, Debug)]
pub struct Configuration {
    pub connection: ConnectionParams,
    pub schema: String,
    pub table: String,
    pub workers: usize,
    /// Overrides `pg_class.relpages` when set.
    pub blocks: Option<u64>,
    /// Overrides `reltuples / relpages` when set.
    pub rows_per_block: Option<f64>,
    /// Column fetched by the narrow diagnostic lookup.
    pub id_column: String,
    /// Position of the row identifier in a `SELECT ctid, *` result.
    pub id_position: usize,
    pub tail_policy: TailPolicy,
    pub miss_counting: MissCounting,
    pub log_level: LevelFilter,
    pub log_to_file: bool,
}

impl Configuration {
    pub fn new(
        connection: ConnectionParams,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            schema: schema.into(),
            table: table.into(),
            workers: DEFAULT_WORKERS,
            blocks: None,
            rows_per_block: None,
            id_column: DEFAULT_ID_COLUMN.to_string(),
            id_position: DEFAULT_ID_POSITION,
            tail_policy: TailPolicy::Drop,
            miss_counting: MissCounting::Cumulative,
            log_level: LevelFilter::Error,
            log_to_file: false,
        }
    }

    pub fn validate(&self) -> CtidScanResult<()> {
        if self.workers == 0 {
            return Err(CtidScanError::Config("at least one worker is required".into()));
        }

        if self.schema.is_empty() || self.table.is_empty() {
            return Err(CtidScanError::Config("schema and table must not be empty".into()));
        }

        if self.id_column.is_empty() {
            return Err(CtidScanError::Config("identifier column must not be empty".into()));
        }

        if let Some(rows) = self.rows_per_block {
            if !rows.is_finite() || rows < 0.0 {
                return Err(CtidScanError::Config(format!(
                    "rows per block must be a non-negative number, got {}",
                    rows
                )));
            }
        }

        Ok(())
    }
}

/// Parses a log level. Besides the `log` names this accepts `warning`,
/// `critical`, `fatal` and `notset`, so older invocations keep working.
pub fn parse_log_level(value: &str) -> Result<LevelFilter, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "warning" => Ok(LevelFilter::Warn),
        "critical" | "fatal" => Ok(LevelFilter::Error),
        "notset" => Ok(LevelFilter::Trace),
        other => other
            .parse::<LevelFilter>()
            .map_err(|_| format!("unknown log level '{}'", value)),
    }
}

/// Parses a yes/no switch: `y`, `yes`, `t`, `true`, `on`, `1` and their negatives.
pub fn parse_switch(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(format!("expected a yes/no value, got '{}'", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Configuration {
        Configuration::new(ConnectionParams::new("db"), "public", "orders")
    }

    #[test]
    fn test_defaults_validate() {
        let config = config();
        assert_eq!(config.workers, 2);
        assert_eq!(config.id_column, "id");
        assert_eq!(config.id_position, 1);
        assert_eq!(config.connection.port, 5432);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = config();
        config.workers = 0;
        assert!(matches!(config.validate(), Err(CtidScanError::Config(_))));
    }

    #[test]
    fn test_negative_rows_per_block_rejected() {
        let mut config = config();
        config.rows_per_block = Some(-1.0);
        assert!(config.validate().is_err());

        config.rows_per_block = Some(f64::NAN);
        assert!(config.validate().is_err());

        config.rows_per_block = Some(0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_names() {
        assert_eq!(parse_log_level("warning"), Ok(LevelFilter::Warn));
        assert_eq!(parse_log_level("CRITICAL"), Ok(LevelFilter::Error));
        assert_eq!(parse_log_level("debug"), Ok(LevelFilter::Debug));
        assert_eq!(parse_log_level("Warn"), Ok(LevelFilter::Warn));
        assert_eq!(parse_log_level("off"), Ok(LevelFilter::Off));
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_switch_values() {
        for value in ["yes", "Y", "true", "on", "1", "t"] {
            assert_eq!(parse_switch(value), Ok(true), "{}", value);
        }
        for value in ["no", "N", "false", "off", "0", "f"] {
            assert_eq!(parse_switch(value), Ok(false), "{}", value);
        }
        assert!(parse_switch("maybe").is_err());
    }
}

use log::{debug, error};

use crate::error::{CtidScanError, CtidScanResult};

use super::{session::Session, sql::table_statistics_query};

const UNDEFINED_TABLE: &str = "42P01";
const INVALID_SCHEMA_NAME: &str = "3F000";

/// Planner estimates for a relation, as kept in `pg_class`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TableStatistics {
    pub total_blocks: u64,
    pub estimated_rows: u64,
}

impl TableStatistics {
    /// Average rows per block; zero for a table with no pages.
    pub fn rows_per_block(&self) -> f64 {
        if self.total_blocks == 0 {
            0.0
        } else {
            self.estimated_rows as f64 / self.total_blocks as f64
        }
    }
}

pub async fn fetch_table_statistics<S: Session>(
    session: &mut S,
    schema: &str,
    table: &str,
) -> CtidScanResult<TableStatistics> {
    let rows = match session.query(&table_statistics_query(schema, table)).await {
        Ok(rows) => rows,
        Err(e) if e.has_code(UNDEFINED_TABLE) || e.has_code(INVALID_SCHEMA_NAME) => {
            error!("main|Relation {}.{} does not exist", schema, table);
            _ = session.rollback().await;
            return Err(CtidScanError::RelationNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            });
        }
        Err(e) => {
            _ = session.rollback().await;
            return Err(e.into());
        }
    };

    session.commit().await?;

    let statistics = match rows.first() {
        Some(row) => TableStatistics {
            total_blocks: parse_count(row.first()),
            estimated_rows: parse_count(row.get(1)),
        },
        None => TableStatistics::default(),
    };

    debug!("main|Statistics for {}.{}: {:?}", schema, table, statistics);

    Ok(statistics)
}

// reltuples is -1 for a relation that was never vacuumed or analyzed.
fn parse_count(value: Option<&Option<String>>) -> u64 {
    value
        .and_then(|v| v.as_deref())
        .and_then(|v| v.parse::<i64>().ok())
        .map(|v| v.max(0) as u64)
        .unwrap_or(0)
}

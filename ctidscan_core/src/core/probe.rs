use log::{error, trace, warn};

use super::{
    address::TupleAddress,
    session::{Session, SessionResult, TextRow},
    sql::{full_row_query, identifier_query, qualified_name},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The tuple was read completely.
    Found(Option<String>),
    /// No live tuple at this address.
    Empty,
    /// The full read failed but the identifier column could be read.
    QueryError(Option<String>),
    /// Neither the full read nor the identifier read succeeded.
    CorruptedConfirmed,
}

impl ProbeOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, ProbeOutcome::Found(_))
    }
}

/// Looks up single tuples of one relation by ctid.
#[derive(Clone, Debug)]
pub struct BlockProbe {
    relation: String,
    id_column: String,
    id_position: usize,
    label: String,
}

impl BlockProbe {
    pub fn new(schema: &str, table: &str, id_column: &str, id_position: usize) -> Self {
        Self {
            relation: qualified_name(schema, table),
            id_column: id_column.to_string(),
            id_position,
            label: String::from("main"),
        }
    }

    /// Worker name prefixed to every log line.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Probes one tuple address.
    ///
    /// Failed statements are classified, not returned: the transaction is rolled
    /// back and the narrow identifier lookup decides between
    /// [`ProbeOutcome::QueryError`] and [`ProbeOutcome::CorruptedConfirmed`].
    /// `Err` means the session itself is unusable (lost connection or a failed
    /// rollback).
    pub async fn probe<S: Session>(
        &self,
        session: &mut S,
        address: TupleAddress,
    ) -> SessionResult<ProbeOutcome> {
        let primary = session.query(&full_row_query(&self.relation, address)).await;

        let outcome = match primary {
            Ok(rows) => match rows.first() {
                Some(row) => ProbeOutcome::Found(self.extract_id(row, address)),
                None => ProbeOutcome::Empty,
            },
            Err(e) if e.is_connection_lost() => return Err(e),
            Err(primary_error) => {
                session.rollback().await?;

                let diagnostic = session
                    .query(&identifier_query(&self.relation, &self.id_column, address))
                    .await;

                match diagnostic {
                    Ok(rows) => {
                        let id = rows.first().and_then(|row| row.get(1).cloned().flatten());
                        warn!(
                            "{}| CORRUPTED {} ID:{} ErrorMessage:{}",
                            self.label,
                            address,
                            id.as_deref().unwrap_or("?"),
                            primary_error
                        );
                        ProbeOutcome::QueryError(id)
                    }
                    Err(e) if e.is_connection_lost() => return Err(e),
                    Err(diagnostic_error) => {
                        session.rollback().await?;
                        warn!(
                            "{}| CORRUPTED Fail get ID {} ErrorMessage {}",
                            self.label, address, diagnostic_error
                        );
                        ProbeOutcome::CorruptedConfirmed
                    }
                }
            }
        };

        trace!("{}|{} D: {}", self.label, address, outcome.is_found());

        Ok(outcome)
    }

    fn extract_id(&self, row: &TextRow, address: TupleAddress) -> Option<String> {
        match row.get(self.id_position) {
            Some(value) => value.clone(),
            None => {
                error!(
                    "{}| Identifier missing at {}: row has {} columns, identifier expected at {}",
                    self.label,
                    address,
                    row.len(),
                    self.id_position
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock_session::{MockSession, MockStore};

    fn probe() -> BlockProbe {
        BlockProbe::new("public", "orders", "id", 1).with_label("CB0")
    }

    #[tokio::test]
    async fn test_found_row_reports_identifier() {
        let store = MockStore::new();
        store.insert_row(3, 1, "42");
        let mut session = MockSession::new(store);

        let outcome = probe().probe(&mut session, TupleAddress::new(3, 1)).await.unwrap();
        assert_eq!(outcome, ProbeOutcome::Found(Some("42".to_string())));
    }

    #[tokio::test]
    async fn test_missing_tuple_is_empty() {
        let mut session = MockSession::new(MockStore::new());
        let outcome = probe().probe(&mut session, TupleAddress::new(3, 1)).await.unwrap();
        assert_eq!(outcome, ProbeOutcome::Empty);
    }

    #[tokio::test]
    async fn test_identifier_out_of_bounds_is_still_found() {
        let store = MockStore::new();
        store.insert_row(0, 1, "7");
        let mut session = MockSession::new(store);

        let probe = BlockProbe::new("public", "orders", "id", 9);
        let outcome = probe.probe(&mut session, TupleAddress::new(0, 1)).await.unwrap();
        assert_eq!(outcome, ProbeOutcome::Found(None));
    }

    #[tokio::test]
    async fn test_toasted_row_recovers_identifier() {
        let store = MockStore::new();
        store.insert_toasted_row(12070712, 36, "39074282");
        let mut session = MockSession::new(store.clone());

        let outcome = probe()
            .probe(&mut session, TupleAddress::new(12070712, 36))
            .await
            .unwrap();

        assert_eq!(outcome, ProbeOutcome::QueryError(Some("39074282".to_string())));
        assert_eq!(store.rollbacks(), 1);
        assert!(!session.is_aborted());
        assert_eq!(
            store.queries().last().map(String::as_str),
            Some("SELECT ctid, \"id\" FROM \"public\".\"orders\" WHERE ctid = '(12070712,36)'")
        );
    }

    #[tokio::test]
    async fn test_unreadable_row_is_confirmed_corruption() {
        let store = MockStore::new();
        store.insert_unreadable_row(12070712, 36);
        store.insert_row(12070712, 37, "39074283");
        let mut session = MockSession::new(store.clone());

        let probe = probe();
        let outcome = probe.probe(&mut session, TupleAddress::new(12070712, 36)).await.unwrap();
        assert_eq!(outcome, ProbeOutcome::CorruptedConfirmed);
        assert_eq!(store.rollbacks(), 2);
        assert!(!session.is_aborted());

        // The next probe on the same session is not hit by a stale aborted transaction.
        let next = probe.probe(&mut session, TupleAddress::new(12070712, 37)).await.unwrap();
        assert_eq!(next, ProbeOutcome::Found(Some("39074283".to_string())));
    }

    #[tokio::test]
    async fn test_diagnostic_without_row_is_query_error() {
        let store = MockStore::new();
        store.insert_vanished_row(8, 2);
        let mut session = MockSession::new(store.clone());

        let outcome = probe().probe(&mut session, TupleAddress::new(8, 2)).await.unwrap();
        assert_eq!(outcome, ProbeOutcome::QueryError(None));
        assert_eq!(store.rollbacks(), 1);
        assert!(!session.is_aborted());
    }

    #[tokio::test]
    async fn test_connection_lost_during_identifier_lookup() {
        let store = MockStore::new();
        store.insert_toasted_row(8, 2, "11");
        store.lose_connection_on_identifier_at(TupleAddress::new(8, 2));
        let mut session = MockSession::new(store.clone());

        let result = probe().probe(&mut session, TupleAddress::new(8, 2)).await;
        assert!(matches!(result, Err(ref e) if e.is_connection_lost()));
        assert_eq!(store.rollbacks(), 1);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_lost_connection_is_an_error() {
        let store = MockStore::new();
        store.lose_connection_at(TupleAddress::new(1, 1));
        let mut session = MockSession::new(store.clone());

        let result = probe().probe(&mut session, TupleAddress::new(1, 1)).await;
        assert!(matches!(result, Err(ref e) if e.is_connection_lost()));
        assert_eq!(store.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_failed_rollback_is_an_error() {
        let store = MockStore::new();
        store.insert_toasted_row(1, 1, "5");
        store.fail_next_rollbacks(1);
        let mut session = MockSession::new(store);

        let result = probe().probe(&mut session, TupleAddress::new(1, 1)).await;
        assert!(matches!(result, Err(ref e) if !e.is_connection_lost()));
    }
}

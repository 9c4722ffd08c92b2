//! In-memory stand-in for a PostgreSQL heap, used by the tests.
//!
//! The store understands the handful of statements the scanner sends (ctid
//! lookups and the `pg_class` statistics query) and models the aborted
//! transaction state PostgreSQL enters after a failed statement.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::error::SessionError;

use super::{
    address::TupleAddress,
    session::{Connector, Session, SessionResult, TextRow},
};

pub const IN_FAILED_TRANSACTION: &str = "25P02";
pub const DATA_CORRUPTED: &str = "XX001";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Damage {
    None,
    /// Full row read fails, the identifier column is still readable.
    Toast,
    /// Every read of the tuple fails.
    Unreadable,
    /// Full row read fails, the identifier lookup finds no row.
    Vanished,
}

#[derive(Clone, Debug)]
pub struct MockTuple {
    pub columns: TextRow,
    pub damage: Damage,
}

#[derive(Default)]
struct StoreState {
    tuples: HashMap<TupleAddress, MockTuple>,
    statistics: Option<SessionResult<(String, String)>>,
    lost_at: HashSet<TupleAddress>,
    lost_on_identifier_at: HashSet<TupleAddress>,
    panic_at: HashSet<TupleAddress>,
    failing_rollbacks: usize,
    failing_connects: usize,
    queries: Vec<String>,
    rollbacks: usize,
    commits: usize,
    connects: usize,
    closes: usize,
}

/// Shared heap contents plus a log of everything the sessions did.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Healthy row whose first column is `id`.
    pub fn insert_row(&self, block: u64, slot: u32, id: &str) {
        self.insert_tuple(
            block,
            slot,
            MockTuple {
                columns: vec![Some(id.to_string()), Some(format!("payload-{}", id))],
                damage: Damage::None,
            },
        );
    }

    /// Row with a missing TOAST chunk: the narrow identifier lookup still works.
    pub fn insert_toasted_row(&self, block: u64, slot: u32, id: &str) {
        self.insert_tuple(
            block,
            slot,
            MockTuple {
                columns: vec![Some(id.to_string()), None],
                damage: Damage::Toast,
            },
        );
    }

    pub fn insert_unreadable_row(&self, block: u64, slot: u32) {
        self.insert_tuple(
            block,
            slot,
            MockTuple {
                columns: vec![None],
                damage: Damage::Unreadable,
            },
        );
    }

    /// Row whose full read fails while the identifier lookup returns nothing.
    pub fn insert_vanished_row(&self, block: u64, slot: u32) {
        self.insert_tuple(
            block,
            slot,
            MockTuple {
                columns: Vec::new(),
                damage: Damage::Vanished,
            },
        );
    }

    pub fn insert_tuple(&self, block: u64, slot: u32, tuple: MockTuple) {
        self.lock().tuples.insert(TupleAddress::new(block, slot), tuple);
    }

    pub fn fill_block(&self, block: u64, slots: std::ops::RangeInclusive<u32>) {
        for slot in slots {
            self.insert_row(block, slot, &format!("{}-{}", block, slot));
        }
    }

    pub fn set_statistics(&self, pages: &str, estimate: &str) {
        self.lock().statistics = Some(Ok((pages.to_string(), estimate.to_string())));
    }

    pub fn fail_statistics(&self, error: SessionError) {
        self.lock().statistics = Some(Err(error));
    }

    /// The session probing `address` loses its connection.
    pub fn lose_connection_at(&self, address: TupleAddress) {
        self.lock().lost_at.insert(address);
    }

    /// The session loses its connection on the identifier lookup of `address`.
    /// The full row read still runs against the stored tuple.
    pub fn lose_connection_on_identifier_at(&self, address: TupleAddress) {
        self.lock().lost_on_identifier_at.insert(address);
    }

    /// The session reading `address` panics, taking its worker task down.
    pub fn panic_at(&self, address: TupleAddress) {
        self.lock().panic_at.insert(address);
    }

    pub fn fail_next_rollbacks(&self, count: usize) {
        self.lock().failing_rollbacks = count;
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.lock().failing_connects = count;
    }

    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    /// Full-row lookups issued, in order.
    pub fn probed_addresses(&self) -> Vec<TupleAddress> {
        self.lock()
            .queries
            .iter()
            .filter(|q| q.starts_with("SELECT ctid, *"))
            .filter_map(|q| parse_tid(q))
            .collect()
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }
}

pub struct MockSession {
    store: MockStore,
    aborted: bool,
    closed: bool,
}

impl MockSession {
    pub fn new(store: MockStore) -> Self {
        Self {
            store,
            aborted: false,
            closed: false,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn execute(&mut self, sql: &str) -> SessionResult<Vec<TextRow>> {
        let mut state = self.store.lock();
        state.queries.push(sql.to_string());

        if self.closed {
            return Err(SessionError::connection_closed("connection closed"));
        }

        if self.aborted {
            return Err(SessionError::with_code(
                "current transaction is aborted, commands ignored until end of transaction block",
                IN_FAILED_TRANSACTION,
            ));
        }

        if sql.contains("FROM pg_class") {
            return match state.statistics.clone() {
                Some(Ok((pages, estimate))) => Ok(vec![vec![Some(pages), Some(estimate)]]),
                Some(Err(e)) => {
                    self.aborted = true;
                    Err(e)
                }
                None => Ok(Vec::new()),
            };
        }

        let Some(address) = parse_tid(sql) else {
            self.aborted = true;
            return Err(SessionError::with_code(format!("unsupported statement: {}", sql), "42601"));
        };

        if state.panic_at.contains(&address) {
            drop(state);
            panic!("reading {} crashed the session", address);
        }

        if state.lost_at.contains(&address) {
            self.closed = true;
            return Err(SessionError::connection_closed("server closed the connection unexpectedly"));
        }

        let full_row = sql.starts_with("SELECT ctid, *");
        if !full_row && state.lost_on_identifier_at.contains(&address) {
            self.closed = true;
            return Err(SessionError::connection_closed("server closed the connection unexpectedly"));
        }

        let Some(tuple) = state.tuples.get(&address) else {
            return Ok(Vec::new());
        };

        let ctid = Some(address.to_tid_literal());

        match (tuple.damage, full_row) {
            (Damage::None, true) => {
                let mut row = vec![ctid];
                row.extend(tuple.columns.iter().cloned());
                Ok(vec![row])
            }
            (Damage::None | Damage::Toast, false) => {
                Ok(vec![vec![ctid, tuple.columns.first().cloned().flatten()]])
            }
            (Damage::Vanished, false) => Ok(Vec::new()),
            (Damage::Toast | Damage::Vanished, true) => {
                self.aborted = true;
                Err(SessionError::with_code(
                    format!("missing chunk number 8 for toast value 51071556 in pg_toast_24735 at {}", address),
                    DATA_CORRUPTED,
                ))
            }
            (Damage::Unreadable, _) => {
                self.aborted = true;
                Err(SessionError::with_code(
                    format!("could not access status of transaction at {}", address),
                    DATA_CORRUPTED,
                ))
            }
        }
    }
}

impl Session for MockSession {
    async fn query(&mut self, sql: &str) -> SessionResult<Vec<TextRow>> {
        self.execute(sql)
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        let mut state = self.store.lock();
        state.rollbacks += 1;

        if self.closed {
            return Err(SessionError::connection_closed("connection closed"));
        }

        if state.failing_rollbacks > 0 {
            state.failing_rollbacks -= 1;
            return Err(SessionError::new("rollback failed"));
        }

        self.aborted = false;
        Ok(())
    }

    async fn commit(&mut self) -> SessionResult<()> {
        if self.closed {
            return Err(SessionError::connection_closed("connection closed"));
        }

        self.store.lock().commits += 1;
        // COMMIT of an aborted transaction rolls it back.
        self.aborted = false;
        Ok(())
    }

    async fn close(self) -> SessionResult<()> {
        self.store.lock().closes += 1;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    store: MockStore,
}

impl MockConnector {
    pub fn new(store: MockStore) -> Self {
        Self { store }
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, _label: &str) -> SessionResult<MockSession> {
        {
            let mut state = self.store.lock();
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                return Err(SessionError::connection_closed("connection refused"));
            }
            state.connects += 1;
        }

        Ok(MockSession::new(self.store.clone()))
    }
}

fn parse_tid(sql: &str) -> Option<TupleAddress> {
    let start = sql.find("ctid = '(")? + "ctid = '(".len();
    let rest = &sql[start..];
    let end = rest.find(")'")?;
    let (block, slot) = rest[..end].split_once(',')?;

    Some(TupleAddress::new(
        block.trim().parse().ok()?,
        slot.trim().parse().ok()?,
    ))
}
